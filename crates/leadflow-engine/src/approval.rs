use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use leadflow_core::error::{LeadflowError, Result};
use leadflow_core::feedback::{FeedbackProposal, ProposalStatus};

/// Feedback proposals awaiting (or past) a decision, persisted as a JSON array.
pub struct ProposalLedger {
    path: PathBuf,
    proposals: Mutex<Vec<FeedbackProposal>>,
}

impl ProposalLedger {
    /// Open the ledger at `path`; a missing file is an empty ledger.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let proposals = match tokio::fs::read_to_string(&path).await {
            Ok(content) if content.trim().is_empty() => Vec::new(),
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        debug!(path = %path.display(), count = proposals.len(), "Opened proposal ledger");
        Ok(Self {
            path,
            proposals: Mutex::new(proposals),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Store a proposal, replacing any earlier entry with the same id.
    pub async fn insert(&self, proposal: FeedbackProposal) -> Result<()> {
        let mut proposals = self.proposals.lock().await;
        proposals.retain(|p| p.id != proposal.id);
        info!(proposal_id = %proposal.id, status = %proposal.status, "Recorded feedback proposal");
        proposals.push(proposal);
        write_ledger(&self.path, &proposals).await
    }

    /// Look up by full id, falling back to an id prefix.
    pub async fn get(&self, id: &str) -> Option<FeedbackProposal> {
        let proposals = self.proposals.lock().await;
        find(&proposals, id).map(|i| proposals[i].clone())
    }

    pub async fn pending(&self) -> Vec<FeedbackProposal> {
        self.proposals
            .lock()
            .await
            .iter()
            .filter(|p| p.status == ProposalStatus::Pending)
            .cloned()
            .collect()
    }

    pub async fn list(&self) -> Vec<FeedbackProposal> {
        self.proposals.lock().await.clone()
    }

    /// Move a pending proposal to `status`. Only pending proposals can change.
    pub async fn set_status(&self, id: &str, status: ProposalStatus) -> Result<FeedbackProposal> {
        let mut proposals = self.proposals.lock().await;
        let idx = find(&proposals, id).ok_or_else(|| LeadflowError::ProposalNotFound(id.to_string()))?;
        let proposal = &mut proposals[idx];
        if proposal.status != ProposalStatus::Pending {
            return Err(LeadflowError::ProposalState {
                id: proposal.id.clone(),
                status: proposal.status.to_string(),
            });
        }
        proposal.status = status;
        proposal.resolved_at = Some(Utc::now());
        let updated = proposal.clone();
        write_ledger(&self.path, &proposals).await?;
        info!(proposal_id = %updated.id, status = %status, "Feedback proposal resolved");
        Ok(updated)
    }
}

fn find(proposals: &[FeedbackProposal], id: &str) -> Option<usize> {
    if id.is_empty() {
        return None;
    }
    proposals
        .iter()
        .position(|p| p.id == id)
        .or_else(|| proposals.iter().position(|p| p.id.starts_with(id)))
}

async fn write_ledger(path: &Path, proposals: &[FeedbackProposal]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let json = serde_json::to_string_pretty(proposals)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, json).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}
