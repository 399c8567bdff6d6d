mod doctor;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use leadflow_core::event::EventBus;
use leadflow_core::feedback::{CampaignOutcome, FeedbackProposal};
use leadflow_core::types::RunStatus;

use leadflow_agents::{AgentRegistry, HttpTransport};
use leadflow_engine::{ConfigStore, FeedbackLoop, GraphExecutor, RunLogger, RunReport, WorkflowGraph};

#[derive(Parser)]
#[command(name = "leadflow", version, about = "Lead generation and outreach pipeline runner")]
struct Cli {
    /// Path to the pipeline document (TOML, or legacy JSON)
    #[arg(short, long, default_value = "pipeline.toml")]
    pipeline: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute the pipeline once
    Run {
        /// Directory for JSONL run logs
        #[arg(long, default_value = "logs")]
        log_dir: PathBuf,
        /// 1 = step boundaries, 2 = plus provider calls, 3 = everything
        #[arg(long, default_value = "2", value_parser = clap::value_parser!(u8).range(1..=3))]
        log_level: u8,
        /// Report format
        #[arg(long, value_enum, default_value = "table")]
        output: OutputFormat,
        /// Do not hand the run's proposals to the feedback loop
        #[arg(long)]
        no_feedback: bool,
    },
    /// Parse and plan the pipeline without running it
    Validate,
    /// Check credentials and state directory
    Check,
    /// Inspect and decide on scoring weight proposals
    Feedback {
        #[command(subcommand)]
        action: FeedbackAction,
    },
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand)]
enum FeedbackAction {
    /// Build a proposal from a JSON file of campaign outcomes
    Analyze {
        outcomes: PathBuf,
        /// Store the proposal (or apply it, with auto_apply_feedback)
        #[arg(long)]
        submit: bool,
    },
    /// List proposals
    List {
        /// Only pending proposals
        #[arg(long)]
        pending: bool,
    },
    /// Merge a pending proposal into the scoring weights
    Approve { id: String },
    /// Discard a pending proposal
    Reject { id: String },
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("leadflow=info,warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "leadflow", &mut std::io::stdout());
        return Ok(());
    }

    let store = Arc::new(ConfigStore::load(&cli.pipeline)?);

    match cli.command {
        Commands::Run {
            log_dir,
            log_level,
            output,
            no_feedback,
        } => {
            let report = run_pipeline(store.clone(), &log_dir, log_level).await?;
            if !no_feedback {
                let feedback = FeedbackLoop::open(store).await?;
                for proposal in feedback.record_run(&report).await? {
                    info!(proposal_id = %proposal.id, status = %proposal.status, "Feedback proposal recorded");
                }
            }
            match output {
                OutputFormat::Table => print!("{}", report.render_table()),
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
            }
            if report.status == RunStatus::Aborted {
                std::process::exit(1);
            }
        }
        Commands::Validate => {
            let graph = WorkflowGraph::plan(store.document().clone())?;
            println!(
                "{}: {} steps, order: {}",
                graph.workflow_name(),
                graph.len(),
                graph.ordered_ids().join(" -> ")
            );
        }
        Commands::Check => {
            let env = store.env_snapshot();
            let config = store.snapshot().await;
            if doctor::run_doctor(&store, &config, &env) > 0 {
                std::process::exit(1);
            }
        }
        Commands::Feedback { action } => {
            let feedback = FeedbackLoop::open(store).await?;
            run_feedback(&feedback, action).await?;
        }
        Commands::Completions { .. } => unreachable!("handled before pipeline load"),
    }

    Ok(())
}

async fn run_pipeline(store: Arc<ConfigStore>, log_dir: &Path, log_level: u8) -> anyhow::Result<RunReport> {
    let graph = WorkflowGraph::plan(store.document().clone())?;
    let config = store.snapshot().await;
    let env = Arc::new(store.env_snapshot());

    let bus = Arc::new(EventBus::default());
    let logger = RunLogger::new(log_dir, log_level);
    let log_path = logger.log_path(graph.workflow_name());
    let log_cancel = CancellationToken::new();
    let log_handle = logger.spawn(&bus, log_path.clone(), log_cancel.clone());

    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        warn!("Interrupted, finishing the running step...");
        cancel_clone.cancel();
    });

    let registry = Arc::new(AgentRegistry::with_builtins(Arc::new(HttpTransport::new())));
    let executor = GraphExecutor::new(registry)
        .with_event_bus(bus)
        .with_cancellation(cancel);
    let report = executor.execute(&graph, config, env).await;

    log_cancel.cancel();
    log_handle.await.ok();
    let report = report?;
    info!(
        run_id = %report.run_id,
        status = ?report.status,
        log = %log_path.display(),
        "Run finished"
    );
    Ok(report)
}

async fn run_feedback(feedback: &FeedbackLoop, action: FeedbackAction) -> anyhow::Result<()> {
    match action {
        FeedbackAction::Analyze { outcomes, submit } => {
            let content = std::fs::read_to_string(&outcomes)?;
            let outcomes = parse_outcomes(&serde_json::from_str(&content)?)?;
            let mut proposal = feedback.analyze(&outcomes).await;
            if submit {
                proposal = feedback.submit(proposal).await?;
            }
            println!("{}", serde_json::to_string_pretty(&proposal)?);
        }
        FeedbackAction::List { pending } => {
            let proposals = if pending {
                feedback.pending().await
            } else {
                feedback.proposals().await
            };
            if proposals.is_empty() {
                println!("No proposals.");
            }
            for p in &proposals {
                print_proposal(p);
            }
        }
        FeedbackAction::Approve { id } => {
            let config = feedback.approve(&id).await?;
            println!("Approved. Scoring weights now:");
            for (name, weight) in &config.scoring.weights {
                println!("  {:<22} {:.4}", name, weight);
            }
        }
        FeedbackAction::Reject { id } => {
            let proposal = feedback.reject(&id).await?;
            println!("Rejected {}", proposal.id);
        }
    }
    Ok(())
}

/// Accepts a bare array or a `{"responses": [...]}` response-tracking output.
fn parse_outcomes(value: &serde_json::Value) -> anyhow::Result<Vec<CampaignOutcome>> {
    let items = value
        .as_array()
        .or_else(|| value.get("responses").and_then(|r| r.as_array()))
        .ok_or_else(|| anyhow::anyhow!("expected an array of outcomes or a {{\"responses\": [...]}} object"))?;
    Ok(items
        .iter()
        .map(|v| serde_json::from_value(v.clone()))
        .collect::<Result<Vec<_>, _>>()?)
}

fn print_proposal(p: &FeedbackProposal) {
    let short = p.id.get(..8).unwrap_or(&p.id);
    println!(
        "{}  {:<12} {}  samples={}",
        short,
        p.status.as_str(),
        p.created_at.format("%Y-%m-%d %H:%M"),
        p.evidence.overall.samples
    );
    for (dim, delta) in &p.deltas {
        if delta.abs() > 0.0 {
            println!("    {:<22} {:+.4}", dim, delta);
        }
    }
}
