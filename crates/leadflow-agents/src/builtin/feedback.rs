use std::collections::BTreeMap;

use futures::future::BoxFuture;
use serde_json::{json, Value};
use tracing::info;

use leadflow_core::error::Result;
use leadflow_core::feedback::{self, CampaignOutcome, FeedbackProposal, ProposalStatus};
use leadflow_core::traits::{Agent, AgentInvocation, AgentOutput};
use leadflow_core::types::AgentKind;

use super::text;
use crate::provider::{CallSpec, ProviderCaller, StepRecorder};

/// Turns campaign responses into a weight-adjustment proposal and appends
/// the metrics rows to the metrics log.
pub struct FeedbackTrainAgent {
    caller: ProviderCaller,
}

impl FeedbackTrainAgent {
    pub fn new(caller: ProviderCaller) -> Self {
        Self { caller }
    }
}

impl Agent for FeedbackTrainAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::FeedbackTrain
    }

    fn execute(&self, inv: AgentInvocation) -> BoxFuture<'_, Result<AgentOutput>> {
        Box::pin(async move {
            let mut rec = StepRecorder::new(&inv.step_id);
            let outcomes = outcomes_input(inv.input("responses"));
            let mut proposal = feedback::analyze(&outcomes, &inv.config.scoring, &inv.config.feedback);
            let auto_apply = inv.config.features.auto_apply_feedback;
            if auto_apply {
                proposal.status = ProposalStatus::AutoApplied;
            }

            let rows = metric_rows(&proposal);
            let spec = CallSpec::new(format!("{} rows", rows.len())).body(json!({ "rows": rows }));
            let status = self
                .caller
                .real_or_simulated(&mut rec, &inv.tools, spec, |_| Some("written"), || "simulated")
                .await;

            info!(
                step_id = %inv.step_id,
                samples = proposal.evidence.overall.samples,
                noop = proposal.is_noop(),
                "Feedback proposal computed"
            );
            rec.intermediate(json!({ "samples": outcomes.len(), "deltas": proposal.deltas }));

            Ok(rec.finish(json!({
                "proposal": proposal,
                "metrics": proposal.evidence,
                "sheets_write": { "status": status, "rows": rows.len() },
                "approval": {
                    "required": !auto_apply,
                    "status": proposal.status.as_str(),
                    "proposal_id": proposal.id,
                },
            })))
        })
    }
}

fn outcomes_input(value: Option<&Value>) -> Vec<CampaignOutcome> {
    value
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|v| serde_json::from_value(v.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}

/// One row for the whole campaign, one per grade and one per dominant dimension.
fn metric_rows(proposal: &FeedbackProposal) -> Vec<Value> {
    let ev = &proposal.evidence;
    let row = |scope: &str, group: &str, r: &feedback::OutcomeRates| {
        json!({
            "proposal_id": proposal.id,
            "scope": scope,
            "group": group,
            "samples": r.samples,
            "open_rate": r.open_rate,
            "click_rate": r.click_rate,
            "reply_rate": r.reply_rate,
            "engagement": r.engagement,
            "delta": proposal.deltas.get(group),
        })
    };
    std::iter::once(row("overall", "all", &ev.overall))
        .chain(ev.by_grade.iter().map(|(g, r)| row("grade", g.as_str(), r)))
        .chain(ev.by_dimension.iter().map(|(d, r)| row("dimension", d.as_str(), r)))
        .collect()
}

/// Merges an approved (or auto-applied) proposal into the run's scoring
/// section. The result is a preview; persistence happens between runs.
pub struct FeedbackApplyAgent;

impl Agent for FeedbackApplyAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::FeedbackApply
    }

    fn execute(&self, inv: AgentInvocation) -> BoxFuture<'_, Result<AgentOutput>> {
        Box::pin(async move {
            let mut rec = StepRecorder::new(&inv.step_id);
            let deltas = deltas_input(inv.input("proposal"));
            let approval = inv
                .input("approval")
                .and_then(|a| text(a, &["status"]))
                .unwrap_or_else(|| "pending".to_string());

            let status = if inv.config.features.auto_apply_feedback || approval == "auto_applied" {
                ProposalStatus::AutoApplied
            } else {
                match approval.as_str() {
                    "approved" => ProposalStatus::Approved,
                    "rejected" => ProposalStatus::Rejected,
                    _ => ProposalStatus::Pending,
                }
            };
            let applied = matches!(status, ProposalStatus::AutoApplied | ProposalStatus::Approved);

            let current = &inv.config.scoring;
            let updated = if applied {
                feedback::merge(current, &deltas, inv.config.feedback.weight_bounds)
            } else {
                current.clone()
            };
            if !applied {
                rec.reasoning(format!("Proposal {}, scoring weights unchanged", status));
            }

            Ok(rec.finish(json!({
                "updated_scoring": updated,
                "applied": applied,
                "status": status.as_str(),
            })))
        })
    }
}

/// Deltas from a full proposal or a bare `{deltas}` object.
fn deltas_input(value: Option<&Value>) -> BTreeMap<String, f64> {
    let Some(value) = value else {
        return BTreeMap::new();
    };
    if let Ok(proposal) = serde_json::from_value::<FeedbackProposal>(value.clone()) {
        return proposal.deltas;
    }
    value
        .get("deltas")
        .and_then(|d| serde_json::from_value(d.clone()).ok())
        .unwrap_or_default()
}
