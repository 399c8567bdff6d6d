use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::FutureExt;
use serde_json::{json, Value};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use leadflow_agents::AgentRegistry;
use leadflow_core::config::{ConfigTree, GraphMode, InputFailurePolicy, ResolvedTool, StepDefinition};
use leadflow_core::error::{LeadflowError, Result};
use leadflow_core::event::{redact, Event, EventBus, EventKind};
use leadflow_core::traits::{AgentInvocation, AgentOutput};
use leadflow_core::types::{EnvSnapshot, RunId, RunStatus, StepStatus};

use super::plan::WorkflowGraph;
use super::state::ExecutionState;
use crate::report::{RunReport, RunSummary, StepReport};
use crate::resolver::{scan_expressions, PlaceholderResolver, ResolutionFailure};

/// Why no further steps are started.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Stop {
    /// A required input failed under the `halt` policy.
    Halted,
    /// A critical step failed.
    Aborted,
    Cancelled,
}

impl Stop {
    fn reason(&self) -> &'static str {
        match self {
            Self::Halted => "run halted after an input resolution failure",
            Self::Aborted => "run aborted after a critical step failed",
            Self::Cancelled => "run cancelled",
        }
    }
}

type TaskResult = (usize, Result<AgentOutput>, u64);

/// Walks a planned workflow, one agent invocation per step.
///
/// Linear workflows and DAGs without `parallel_branches` run one step at a
/// time. Otherwise every ready step is spawned onto a `JoinSet` and fan-in
/// waits for all of a step's predecessors.
pub struct GraphExecutor {
    registry: Arc<AgentRegistry>,
    bus: Option<Arc<EventBus>>,
    cancel: CancellationToken,
}

impl GraphExecutor {
    pub fn new(registry: Arc<AgentRegistry>) -> Self {
        Self {
            registry,
            bus: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Mirror every run event onto `bus`.
    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Execute every step of `graph`. Only structural problems return `Err`;
    /// step failures are reported in the returned `RunReport`.
    pub async fn execute(
        &self,
        graph: &WorkflowGraph,
        config: Arc<ConfigTree>,
        env: Arc<EnvSnapshot>,
    ) -> Result<RunReport> {
        for step in &graph.document().steps {
            self.registry.get(step.agent)?;
        }

        let started_at = Utc::now();
        let start = Instant::now();
        let mut state = ExecutionState::new(RunId::new());
        if let Some(bus) = &self.bus {
            state = state.with_bus(bus.clone());
        }
        info!(
            run_id = %state.run_id(),
            workflow = %graph.workflow_name(),
            steps = graph.len(),
            "Run started"
        );

        emit_env_loading(&mut state, &config, &env);

        let resolver = PlaceholderResolver::new(&config, env.clone());
        let parallel = config.execution.graph_mode == GraphMode::Dag && config.features.parallel_branches;
        let mut tasks: JoinSet<TaskResult> = JoinSet::new();
        let mut running = 0usize;
        let mut stop: Option<Stop> = None;

        loop {
            if stop.is_none() && self.cancel.is_cancelled() {
                info!(run_id = %state.run_id(), "Cancellation requested");
                stop = Some(Stop::Cancelled);
            }

            let progressed = self.schedule(
                graph,
                &mut state,
                &resolver,
                &config,
                &env,
                &mut tasks,
                &mut running,
                &mut stop,
                parallel,
            );

            if running == 0 {
                let done = graph.order().iter().all(|&i| state.status(&graph.step(i).id).is_terminal());
                if done {
                    break;
                }
                if !progressed {
                    // Only reachable if a task vanished without reporting back.
                    for &i in graph.order() {
                        let id = graph.step(i).id.clone();
                        if state.status(&id) == StepStatus::Running {
                            fail_step(&mut state, &id, &LeadflowError::AgentExecution {
                                step: id.clone(),
                                message: "agent task ended without a result".into(),
                            });
                        }
                    }
                    stop.get_or_insert(Stop::Aborted);
                }
                continue;
            }

            match tasks.join_next().await {
                Some(Ok((idx, result, elapsed_ms))) => {
                    running -= 1;
                    let step = graph.step(idx);
                    let failed = complete_step(&mut state, step, result, elapsed_ms);
                    if failed && step.critical {
                        error!(step_id = %step.id, "Critical step failed, aborting run");
                        stop = Some(Stop::Aborted);
                    }
                }
                Some(Err(e)) => {
                    running -= 1;
                    error!(error = %e, "Agent task failed to join");
                    stop.get_or_insert(Stop::Aborted);
                }
                None => running = 0,
            }
        }

        let steps: Vec<StepReport> = graph
            .order()
            .iter()
            .map(|&i| {
                let step = graph.step(i);
                StepReport {
                    id: step.id.clone(),
                    agent: step.agent,
                    status: state.status(&step.id),
                    output: state.output(&step.id).cloned(),
                    error: state.error(&step.id).map(String::from),
                    elapsed_ms: state.elapsed_ms(&step.id),
                }
            })
            .collect();

        let status = match stop {
            Some(Stop::Aborted) | Some(Stop::Cancelled) => RunStatus::Aborted,
            _ if steps
                .iter()
                .any(|s| matches!(s.status, StepStatus::Failed | StepStatus::Skipped)) =>
            {
                RunStatus::PartiallyFailed
            }
            _ => RunStatus::Completed,
        };

        let events = state.events().to_vec();
        let summary = RunSummary::from_parts(&steps, &events);
        let elapsed_ms = start.elapsed().as_millis() as u64;
        info!(
            run_id = %state.run_id(),
            status = ?status,
            completed = summary.completed,
            degraded = summary.degraded,
            failed = summary.failed,
            skipped = summary.skipped,
            elapsed_ms,
            "Run finished"
        );

        Ok(RunReport {
            run_id: state.run_id().to_string(),
            workflow_name: graph.workflow_name().to_string(),
            status,
            started_at,
            finished_at: Utc::now(),
            elapsed_ms,
            steps,
            events,
            summary,
        })
    }

    /// Start, skip or fail every step whose predecessors are all terminal.
    /// Returns whether any step changed state.
    #[allow(clippy::too_many_arguments)]
    fn schedule(
        &self,
        graph: &WorkflowGraph,
        state: &mut ExecutionState,
        resolver: &PlaceholderResolver,
        config: &Arc<ConfigTree>,
        env: &Arc<EnvSnapshot>,
        tasks: &mut JoinSet<TaskResult>,
        running: &mut usize,
        stop: &mut Option<Stop>,
        parallel: bool,
    ) -> bool {
        let mut progressed = false;
        for &idx in graph.order() {
            let step = graph.step(idx);
            if state.status(&step.id) != StepStatus::Pending {
                continue;
            }
            let ready = graph
                .dependencies(idx)
                .iter()
                .all(|&d| state.status(&graph.step(d).id).is_terminal());
            if !ready {
                continue;
            }

            if let Some(reason) = *stop {
                skip_step(state, &step.id, reason.reason());
                progressed = true;
                continue;
            }
            let broken = graph
                .data_dependencies(idx)
                .iter()
                .map(|&d| &graph.step(d).id)
                .find(|dep| !state.status(dep).succeeded());
            if let Some(dep) = broken {
                let reason = format!("dependency '{}' did not complete", dep);
                skip_step(state, &step.id, &reason);
                progressed = true;
                continue;
            }

            if !parallel && *running > 0 {
                break;
            }

            progressed = true;
            match prepare(step, resolver, state, config, env) {
                Ok(invocation) => {
                    let agent = match self.registry.get(step.agent) {
                        Ok(agent) => agent,
                        Err(e) => {
                            fail_step(state, &step.id, &e);
                            continue;
                        }
                    };
                    state.set_status(&step.id, StepStatus::Running);
                    let step_id = step.id.clone();
                    tasks.spawn(async move {
                        let started = Instant::now();
                        let result = match AssertUnwindSafe(agent.execute(invocation)).catch_unwind().await {
                            Ok(result) => result,
                            Err(panic) => Err(LeadflowError::AgentExecution {
                                step: step_id,
                                message: panic_message(panic),
                            }),
                        };
                        (idx, result, started.elapsed().as_millis() as u64)
                    });
                    *running += 1;
                    if !parallel {
                        break;
                    }
                }
                Err(err) => {
                    fail_step(state, &step.id, &err);
                    if step.critical {
                        error!(step_id = %step.id, "Critical step could not resolve its inputs");
                        *stop = Some(Stop::Aborted);
                    } else if config.execution.on_input_failure == InputFailurePolicy::Halt {
                        warn!(step_id = %step.id, "Halting run after input resolution failure");
                        *stop = Some(Stop::Halted);
                    }
                }
            }
        }
        progressed
    }
}

fn emit_env_loading(state: &mut ExecutionState, config: &ConfigTree, env: &EnvSnapshot) {
    let keys = config
        .env
        .required
        .iter()
        .map(|k| (k, true))
        .chain(config.env.optional.iter().map(|k| (k, false)));
    for (key, required) in keys {
        let value = env.credential(key);
        if required && value.is_none() {
            warn!(key = %key, "Required credential not set, dependent tools will simulate");
        }
        state.push(Event::new(
            EventKind::EnvLoading,
            json!({
                "key": key,
                "required": required,
                "loaded": value.is_some(),
                "length": value.map(|v| v.len()).unwrap_or(0),
            }),
        ));
    }
}

/// Resolve inputs and tools, emitting `resolution_error` and `step_start`.
fn prepare(
    step: &StepDefinition,
    resolver: &PlaceholderResolver,
    state: &mut ExecutionState,
    config: &Arc<ConfigTree>,
    env: &Arc<EnvSnapshot>,
) -> Result<AgentInvocation> {
    let resolved = resolver.resolve(&step.inputs, state.outputs());
    report_failures(state, &step.id, &resolved.failures);

    let (tools, tool_failures) = resolve_tools(step, resolver, state, env, config.execution.default_timeout_secs);
    report_failures(state, &step.id, &tool_failures);

    state.emit(
        &step.id,
        EventKind::StepStart,
        json!({
            "agent": step.agent.as_str(),
            "inputs": redact(&resolved.value),
            "tools": tools.iter().map(ResolvedTool::redacted).collect::<Vec<_>>(),
        }),
    );

    for field in &step.required_inputs {
        let failure = resolved.failures_under(field).next();
        let present = value_at(&resolved.value, field).is_some_and(|v| !v.is_null());
        if failure.is_some() || !present {
            return Err(LeadflowError::InputResolution {
                step: step.id.clone(),
                field: field.clone(),
                reason: failure
                    .map(|f| f.error.to_string())
                    .unwrap_or_else(|| "value is missing or null".to_string()),
            });
        }
    }

    Ok(AgentInvocation {
        step_id: step.id.clone(),
        inputs: resolved.value,
        tools,
        config: config.clone(),
        env: env.clone(),
        timeout: Duration::from_secs(config.execution.default_timeout_secs),
    })
}

fn report_failures(state: &mut ExecutionState, step_id: &str, failures: &[ResolutionFailure]) {
    for f in failures {
        warn!(step_id = %step_id, field = %f.field, reference = %f.reference, error = %f.error, "Unresolved reference");
        state.emit(
            step_id,
            EventKind::ResolutionError,
            json!({
                "field": f.field,
                "reference": f.reference,
                "error": f.error.to_string(),
            }),
        );
    }
}

fn resolve_tools(
    step: &StepDefinition,
    resolver: &PlaceholderResolver,
    state: &ExecutionState,
    env: &EnvSnapshot,
    default_timeout_secs: u64,
) -> (Vec<ResolvedTool>, Vec<ResolutionFailure>) {
    let outputs = state.outputs();
    let mut failures = Vec::new();
    let mut resolve = |value: &Value, field: String| {
        let mut r = resolver.resolve(value, outputs);
        for f in &mut r.failures {
            f.field = if f.field.is_empty() {
                field.clone()
            } else {
                format!("{}.{}", field, f.field)
            };
        }
        failures.append(&mut r.failures);
        r.value
    };

    let mut tools = Vec::with_capacity(step.tools.len());
    for tool in &step.tools {
        let prefix = format!("tools.{}", tool.name);
        let (credential_key, credential) = match (&tool.credential, &tool.api_key) {
            (Some(key), _) => (Some(key.clone()), env.credential(key).map(String::from)),
            (None, Some(template)) => {
                let template = Value::String(template.clone());
                // An absent credential means simulation, not a resolution error.
                let value = resolver.resolve(&template, outputs).value;
                let key = scan_expressions(&template).into_iter().next();
                let credential = value
                    .as_str()
                    .map(str::trim)
                    .filter(|v| !v.is_empty() && !v.starts_with("${"))
                    .map(String::from);
                (key, credential)
            }
            (None, None) => (None, None),
        };

        let endpoint = match resolve(&Value::String(tool.endpoint.clone()), format!("{}.endpoint", prefix)) {
            Value::String(s) => s,
            _ => String::new(),
        };
        let params = tool
            .params
            .iter()
            .filter_map(|(k, v)| match resolve(v, format!("{}.params.{}", prefix, k)) {
                Value::Null => None,
                Value::String(s) => Some((k.clone(), s)),
                other => Some((k.clone(), other.to_string())),
            })
            .collect();
        let body = tool.body.as_ref().map(|b| resolve(b, format!("{}.body", prefix)));

        tools.push(ResolvedTool {
            name: tool.name.clone(),
            endpoint,
            credential_key,
            credential,
            credential_param: tool.credential_param.clone(),
            timeout_secs: tool.timeout_secs.unwrap_or(default_timeout_secs),
            method: tool.method,
            params,
            body,
        });
    }
    (tools, failures)
}

fn value_at<'a>(root: &'a Value, field: &str) -> Option<&'a Value> {
    field.split('.').try_fold(root, |current, segment| match current {
        Value::Array(items) => items.get(segment.parse::<usize>().ok()?),
        Value::Object(map) => map.get(segment),
        _ => None,
    })
}

/// Record an agent's result. Returns true when the step failed.
fn complete_step(
    state: &mut ExecutionState,
    step: &StepDefinition,
    result: Result<AgentOutput>,
    elapsed_ms: u64,
) -> bool {
    state.set_elapsed_ms(&step.id, elapsed_ms);
    match result {
        Ok(out) => {
            for event in out.events {
                state.push(event);
            }
            let status = if out.degraded {
                StepStatus::Degraded
            } else {
                StepStatus::Completed
            };
            state.record_output(&step.id, out.output);
            state.set_status(&step.id, status);
            state.emit(
                &step.id,
                EventKind::StepEnd,
                json!({ "status": status, "elapsed_ms": elapsed_ms, "degraded": out.degraded }),
            );
            info!(step_id = %step.id, agent = %step.agent, status = ?status, elapsed_ms, "Step finished");
            false
        }
        Err(err) => {
            state.emit(
                &step.id,
                EventKind::ApiError,
                json!({ "agent": step.agent.as_str(), "error": err.to_string() }),
            );
            fail_step(state, &step.id, &err);
            true
        }
    }
}

fn fail_step(state: &mut ExecutionState, step_id: &str, err: &LeadflowError) {
    error!(step_id = %step_id, error = %err, "Step failed");
    state.set_error(step_id, err.to_string());
    state.set_status(step_id, StepStatus::Failed);
    state.emit(
        step_id,
        EventKind::StepEnd,
        json!({ "status": StepStatus::Failed, "error": err.to_string() }),
    );
}

fn skip_step(state: &mut ExecutionState, step_id: &str, reason: &str) {
    debug!(step_id = %step_id, reason = %reason, "Step skipped");
    state.set_status(step_id, StepStatus::Skipped);
    state.emit(
        step_id,
        EventKind::StepEnd,
        json!({ "status": StepStatus::Skipped, "reason": reason }),
    );
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("agent panicked: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("agent panicked: {}", s)
    } else {
        "agent panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::BoxFuture;
    use leadflow_core::config::{DocumentFormat, PipelineDocument};
    use leadflow_core::traits::Agent;
    use leadflow_core::types::AgentKind;

    /// Echoes its inputs; `fail` or `panic` inputs make it misbehave.
    struct EchoAgent(AgentKind);

    impl Agent for EchoAgent {
        fn kind(&self) -> AgentKind {
            self.0
        }

        fn execute(&self, inv: AgentInvocation) -> BoxFuture<'_, Result<AgentOutput>> {
            Box::pin(async move {
                if inv.input("panic").is_some() {
                    panic!("boom");
                }
                if inv.input("fail").is_some() {
                    return Err(LeadflowError::AgentExecution {
                        step: inv.step_id.clone(),
                        message: "asked to fail".into(),
                    });
                }
                Ok(AgentOutput {
                    output: json!({ "echo": inv.inputs, "leads": [1, 2, 3] }),
                    events: vec![],
                    degraded: inv.input("degrade").is_some(),
                })
            })
        }
    }

    fn registry() -> Arc<AgentRegistry> {
        let mut registry = AgentRegistry::new();
        for kind in [AgentKind::Search, AgentKind::Enrichment, AgentKind::IntentSignal, AgentKind::Delivery] {
            registry.register(EchoAgent(kind));
        }
        Arc::new(registry)
    }

    async fn run(toml: &str, env: &[(&str, &str)]) -> RunReport {
        let doc = PipelineDocument::parse(toml, DocumentFormat::Toml).unwrap();
        let config = Arc::new(doc.config.clone());
        let graph = WorkflowGraph::plan(doc).unwrap();
        let env = Arc::new(EnvSnapshot::from_pairs(env.iter().map(|(k, v)| (*k, *v))));
        GraphExecutor::new(registry()).execute(&graph, config, env).await.unwrap()
    }

    #[tokio::test]
    async fn test_outputs_thread_through_steps() {
        let report = run(
            r#"
[[steps]]
id = "search"
agent = "search"
inputs = { icp = "saas" }

[[steps]]
id = "enrich"
agent = "enrichment"
inputs = { leads = "{{search.output.leads}}", first = "{{search.output.leads.0}}" }
"#,
            &[],
        )
        .await;
        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(report.output("enrich").unwrap()["echo"]["leads"], json!([1, 2, 3]));
        assert_eq!(report.output("enrich").unwrap()["echo"]["first"], json!(1));
        let kinds: Vec<EventKind> = report.step_events("enrich").map(|e| e.kind).collect();
        assert_eq!(kinds, vec![EventKind::StepStart, EventKind::StepEnd]);
    }

    #[tokio::test]
    async fn test_env_loading_reports_presence_only() {
        let report = run(
            r#"
[config.env]
required = ["APOLLO_API_KEY"]
optional = ["HUNTER_API_KEY"]

[[steps]]
id = "search"
agent = "search"
"#,
            &[("APOLLO_API_KEY", "sk-secret")],
        )
        .await;
        let loading: Vec<&Event> = report.events_of(EventKind::EnvLoading).collect();
        assert_eq!(loading.len(), 2);
        assert_eq!(loading[0].payload["loaded"], true);
        assert_eq!(loading[0].payload["length"], 9);
        assert_eq!(loading[1].payload["loaded"], false);
        let log = serde_json::to_string(&report.events).unwrap();
        assert!(!log.contains("sk-secret"));
    }

    #[tokio::test]
    async fn test_optional_unresolved_input_becomes_null() {
        let report = run(
            r#"
[[steps]]
id = "search"
agent = "search"
inputs = { icp = "{{config.icp}}" }
"#,
            &[],
        )
        .await;
        assert_eq!(report.status_of("search"), Some(StepStatus::Completed));
        assert_eq!(report.output("search").unwrap()["echo"]["icp"], Value::Null);
        assert_eq!(report.events_of(EventKind::ResolutionError).count(), 1);
    }

    #[tokio::test]
    async fn test_required_input_failure_halts_by_default() {
        let report = run(
            r#"
[[steps]]
id = "search"
agent = "search"
inputs = { icp = "{{config.icp}}" }
required_inputs = ["icp"]

[[steps]]
id = "enrich"
agent = "enrichment"
"#,
            &[],
        )
        .await;
        assert_eq!(report.status, RunStatus::PartiallyFailed);
        assert_eq!(report.status_of("search"), Some(StepStatus::Failed));
        assert_eq!(report.status_of("enrich"), Some(StepStatus::Skipped));
        let err = report.step("search").unwrap().error.clone().unwrap();
        assert!(err.contains("'icp'"), "{}", err);
    }

    #[tokio::test]
    async fn test_skip_branch_continues_independent_steps() {
        let report = run(
            r#"
[config.execution]
graph_mode = "dag"
on_input_failure = "skip_branch"

[[steps]]
id = "search"
agent = "search"
inputs = { icp = "{{config.icp}}" }
required_inputs = ["icp"]

[[steps]]
id = "enrich"
agent = "enrichment"
inputs = { leads = "{{search.output.leads}}" }

[[steps]]
id = "intent"
agent = "intent_signal"
inputs = { domain = "acme.io" }
"#,
            &[],
        )
        .await;
        assert_eq!(report.status, RunStatus::PartiallyFailed);
        assert_eq!(report.status_of("search"), Some(StepStatus::Failed));
        assert_eq!(report.status_of("enrich"), Some(StepStatus::Skipped));
        assert_eq!(report.status_of("intent"), Some(StepStatus::Completed));
    }

    #[tokio::test]
    async fn test_agent_error_and_panic_are_step_failures() {
        let report = run(
            r#"
[config.execution]
graph_mode = "dag"

[[steps]]
id = "search"
agent = "search"
inputs = { fail = true }

[[steps]]
id = "intent"
agent = "intent_signal"
inputs = { panic = true }

[[steps]]
id = "send"
agent = "delivery"
inputs = { degrade = true }
"#,
            &[],
        )
        .await;
        assert_eq!(report.status, RunStatus::PartiallyFailed);
        assert_eq!(report.status_of("search"), Some(StepStatus::Failed));
        assert_eq!(report.status_of("intent"), Some(StepStatus::Failed));
        assert!(report.step("intent").unwrap().error.as_deref().unwrap().contains("boom"));
        assert_eq!(report.status_of("send"), Some(StepStatus::Degraded));
        assert_eq!(report.events_of(EventKind::ApiError).count(), 2);
        assert_eq!(report.summary.degraded, 1);
    }

    #[tokio::test]
    async fn test_critical_failure_aborts() {
        let report = run(
            r#"
[[steps]]
id = "search"
agent = "search"
inputs = { fail = true }
critical = true

[[steps]]
id = "intent"
agent = "intent_signal"
"#,
            &[],
        )
        .await;
        assert_eq!(report.status, RunStatus::Aborted);
        assert_eq!(report.status_of("intent"), Some(StepStatus::Skipped));
    }

    #[tokio::test]
    async fn test_parallel_branches_fan_in() {
        let report = run(
            r#"
[config.features]
parallel_branches = true

[config.execution]
graph_mode = "dag"

[[steps]]
id = "search"
agent = "search"

[[steps]]
id = "enrich"
agent = "enrichment"
inputs = { leads = "{{search.output.leads}}" }

[[steps]]
id = "intent"
agent = "intent_signal"
inputs = { leads = "{{search.output.leads}}" }

[[steps]]
id = "send"
agent = "delivery"
inputs = { a = "{{enrich.output.leads}}", b = "{{intent.output.leads}}" }
"#,
            &[],
        )
        .await;
        assert_eq!(report.status, RunStatus::Completed);
        let starts: Vec<&str> = report
            .events_of(EventKind::StepStart)
            .filter_map(|e| e.step_id.as_deref())
            .collect();
        assert_eq!(starts.first(), Some(&"search"));
        assert_eq!(starts.last(), Some(&"send"));
        assert_eq!(report.output("send").unwrap()["echo"]["b"], json!([1, 2, 3]));
    }

    #[tokio::test]
    async fn test_cancelled_run_skips_remaining_steps() {
        let doc = PipelineDocument::parse(
            r#"
[[steps]]
id = "search"
agent = "search"

[[steps]]
id = "enrich"
agent = "enrichment"
"#,
            DocumentFormat::Toml,
        )
        .unwrap();
        let config = Arc::new(doc.config.clone());
        let graph = WorkflowGraph::plan(doc).unwrap();
        let token = CancellationToken::new();
        token.cancel();
        let report = GraphExecutor::new(registry())
            .with_cancellation(token)
            .execute(&graph, config, Arc::new(EnvSnapshot::default()))
            .await
            .unwrap();
        assert_eq!(report.status, RunStatus::Aborted);
        assert!(report.steps.iter().all(|s| s.status == StepStatus::Skipped));
    }

    #[tokio::test]
    async fn test_unregistered_agent_fails_before_any_step() {
        let doc = PipelineDocument::parse(
            "[[steps]]\nid = \"x\"\nagent = \"feedback_train\"\n",
            DocumentFormat::Toml,
        )
        .unwrap();
        let config = Arc::new(doc.config.clone());
        let graph = WorkflowGraph::plan(doc).unwrap();
        let err = GraphExecutor::new(registry())
            .execute(&graph, config, Arc::new(EnvSnapshot::default()))
            .await
            .unwrap_err();
        assert!(matches!(err, LeadflowError::UnknownAgent(_)));
    }

    #[test]
    fn test_tool_credentials_from_env_or_template() {
        let doc = PipelineDocument::parse(
            r#"
[[steps]]
id = "search"
agent = "search"
tools = [
  { name = "apollo", endpoint = "https://a.test", credential = "APOLLO_API_KEY", timeout_secs = 3 },
  { name = "clay", endpoint = "https://c.test", api_key = "{{CLAY_API_KEY}}", params = { q = "{{config.model.name}}", n = 5 } },
]
"#,
            DocumentFormat::Toml,
        )
        .unwrap();
        let env = EnvSnapshot::from_pairs([("APOLLO_API_KEY", "k1")]);
        let resolver = PlaceholderResolver::new(&doc.config, Arc::new(env.clone()));
        let state = ExecutionState::new(RunId::new());
        let (tools, failures) = resolve_tools(&doc.steps[0], &resolver, &state, &env, 10);
        assert!(failures.is_empty());
        assert_eq!(tools[0].credential.as_deref(), Some("k1"));
        assert_eq!(tools[0].timeout_secs, 3);
        assert_eq!(tools[1].credential, None);
        assert_eq!(tools[1].credential_key.as_deref(), Some("CLAY_API_KEY"));
        assert_eq!(tools[1].timeout_secs, 10);
        assert!(tools[1].params.contains(&("q".to_string(), "gpt-4o-mini".to_string())));
        assert!(tools[1].params.contains(&("n".to_string(), "5".to_string())));
    }
}
