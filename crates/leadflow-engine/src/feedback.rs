use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use leadflow_core::config::ConfigTree;
use leadflow_core::error::{LeadflowError, Result};
use leadflow_core::feedback::{self, CampaignOutcome, FeedbackProposal, ProposalStatus};
use leadflow_core::types::AgentKind;

use crate::approval::ProposalLedger;
use crate::report::RunReport;
use crate::store::ConfigStore;

/// Applies weight proposals back into the ConfigStore between runs.
///
/// Every mutation of the scoring section goes through one writer lock, so
/// two approvals never merge against the same base weights.
pub struct FeedbackLoop {
    store: Arc<ConfigStore>,
    ledger: ProposalLedger,
    writer: Mutex<()>,
}

impl FeedbackLoop {
    /// Open the proposal ledger under the store's state directory.
    pub async fn open(store: Arc<ConfigStore>) -> Result<Self> {
        let ledger = ProposalLedger::open(store.proposals_path()).await?;
        Ok(Self {
            store,
            ledger,
            writer: Mutex::new(()),
        })
    }

    pub fn store(&self) -> &Arc<ConfigStore> {
        &self.store
    }

    /// Derive a proposal against the current scoring snapshot.
    pub async fn analyze(&self, outcomes: &[CampaignOutcome]) -> FeedbackProposal {
        let config = self.store.snapshot().await;
        feedback::analyze(outcomes, &config.scoring, &config.feedback)
    }

    /// Record a proposal. With `auto_apply_feedback` it is merged right away,
    /// otherwise it waits as pending.
    pub async fn submit(&self, mut proposal: FeedbackProposal) -> Result<FeedbackProposal> {
        let _guard = self.writer.lock().await;
        let config = self.store.snapshot().await;
        if config.features.auto_apply_feedback {
            self.merge(&config, &proposal).await?;
            proposal.status = ProposalStatus::AutoApplied;
            proposal.resolved_at = Some(Utc::now());
        } else {
            proposal.status = ProposalStatus::Pending;
            proposal.resolved_at = None;
        }
        self.ledger.insert(proposal.clone()).await?;
        Ok(proposal)
    }

    /// Merge a pending proposal and return the new configuration snapshot.
    pub async fn approve(&self, id: &str) -> Result<Arc<ConfigTree>> {
        let _guard = self.writer.lock().await;
        let proposal = self.pending_proposal(id).await?;
        let config = self.store.snapshot().await;
        let next = self.merge(&config, &proposal).await?;
        self.ledger.set_status(&proposal.id, ProposalStatus::Approved).await?;
        Ok(next)
    }

    /// Discard a pending proposal; weights stay as they are.
    pub async fn reject(&self, id: &str) -> Result<FeedbackProposal> {
        let _guard = self.writer.lock().await;
        let proposal = self.pending_proposal(id).await?;
        let rejected = self.ledger.set_status(&proposal.id, ProposalStatus::Rejected).await?;
        info!(proposal_id = %rejected.id, "Feedback proposal rejected");
        Ok(rejected)
    }

    pub async fn pending(&self) -> Vec<FeedbackProposal> {
        self.ledger.pending().await
    }

    pub async fn proposals(&self) -> Vec<FeedbackProposal> {
        self.ledger.list().await
    }

    /// Submit the proposals produced by the run's feedback-train steps.
    /// Proposals already in the ledger are left alone.
    pub async fn record_run(&self, report: &RunReport) -> Result<Vec<FeedbackProposal>> {
        let mut recorded = Vec::new();
        for step in &report.steps {
            if step.agent != AgentKind::FeedbackTrain || !step.status.succeeded() {
                continue;
            }
            let Some(raw) = step.output.as_ref().and_then(|o| o.get("proposal")) else {
                continue;
            };
            let proposal: FeedbackProposal = match serde_json::from_value(raw.clone()) {
                Ok(p) => p,
                Err(e) => {
                    warn!(step_id = %step.id, error = %e, "Unreadable feedback proposal");
                    continue;
                }
            };
            if self.ledger.get(&proposal.id).await.is_some() {
                continue;
            }
            recorded.push(self.submit(proposal).await?);
        }
        Ok(recorded)
    }

    async fn pending_proposal(&self, id: &str) -> Result<FeedbackProposal> {
        let proposal = self
            .ledger
            .get(id)
            .await
            .ok_or_else(|| LeadflowError::ProposalNotFound(id.to_string()))?;
        if proposal.status != ProposalStatus::Pending {
            return Err(LeadflowError::ProposalState {
                id: proposal.id,
                status: proposal.status.to_string(),
            });
        }
        Ok(proposal)
    }

    async fn merge(&self, config: &ConfigTree, proposal: &FeedbackProposal) -> Result<Arc<ConfigTree>> {
        let merged = feedback::merge(&config.scoring, &proposal.deltas, config.feedback.weight_bounds);
        info!(
            proposal_id = %proposal.id,
            dimensions = merged.weights.len(),
            "Merging feedback proposal"
        );
        self.store.persist_scoring(merged).await
    }
}
