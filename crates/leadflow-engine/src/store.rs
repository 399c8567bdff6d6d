use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use leadflow_core::config::{ConfigTree, PipelineDocument, ScoringConfig};
use leadflow_core::error::{LeadflowError, Result};
use leadflow_core::types::EnvSnapshot;

const SCORING_FILE: &str = "scoring.json";
const PROPOSALS_FILE: &str = "proposals.json";

/// Owns the configuration tree of one pipeline document.
///
/// Runs take an immutable `Arc<ConfigTree>` snapshot; a scoring update swaps
/// in a new tree, so runs already holding a snapshot never see it change.
pub struct ConfigStore {
    document: PipelineDocument,
    base_dir: PathBuf,
    current: RwLock<Arc<ConfigTree>>,
}

impl ConfigStore {
    /// Load a document and overlay the persisted scoring section, if any.
    pub fn load(path: &Path) -> Result<Self> {
        let document = PipelineDocument::load(path)?;
        let base_dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        Self::from_document(document, base_dir)
    }

    /// `base_dir` anchors the relative state directory and dotenv file.
    pub fn from_document(mut document: PipelineDocument, base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        let scoring_path = state_dir_of(&base_dir, &document.config).join(SCORING_FILE);
        if let Some(scoring) = read_scoring(&scoring_path)? {
            info!(path = %scoring_path.display(), "Applying persisted scoring weights");
            document.config = document.config.with_scoring(scoring);
        }
        document.validate()?;
        let current = RwLock::new(Arc::new(document.config.clone()));
        Ok(Self {
            document,
            base_dir,
            current,
        })
    }

    /// The document as loaded, including any persisted scoring overlay.
    pub fn document(&self) -> &PipelineDocument {
        &self.document
    }

    pub async fn snapshot(&self) -> Arc<ConfigTree> {
        self.current.read().await.clone()
    }

    pub fn state_dir(&self) -> PathBuf {
        state_dir_of(&self.base_dir, &self.document.config)
    }

    pub fn scoring_path(&self) -> PathBuf {
        self.state_dir().join(SCORING_FILE)
    }

    pub fn proposals_path(&self) -> PathBuf {
        self.state_dir().join(PROPOSALS_FILE)
    }

    /// Validate, write `scoring.json` and publish a new snapshot.
    pub async fn persist_scoring(&self, scoring: ScoringConfig) -> Result<Arc<ConfigTree>> {
        self.current.read().await.with_scoring(scoring.clone()).validate()?;
        let path = self.scoring_path();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_string_pretty(&scoring)?).await?;
        tokio::fs::rename(&tmp, &path).await?;

        let mut current = self.current.write().await;
        let next = Arc::new(current.with_scoring(scoring));
        *current = next.clone();
        info!(path = %path.display(), "Scoring weights updated");
        Ok(next)
    }

    /// Process environment plus `env.load_from` dotenv entries. Variables
    /// already set in the process win over the file.
    pub fn env_snapshot(&self) -> EnvSnapshot {
        let mut env = EnvSnapshot::capture();
        let Some(source) = self.document.config.env.load_from.as_deref() else {
            return env;
        };
        if source.is_empty() || source == "env" {
            return env;
        }
        let path = self.base_dir.join(source);
        match std::fs::read_to_string(&path) {
            Ok(content) => {
                let mut loaded = 0;
                for (key, value) in parse_dotenv(&content) {
                    if env.get(&key).is_none() {
                        env.set(key, value);
                        loaded += 1;
                    }
                }
                debug!(path = %path.display(), loaded, "Loaded dotenv file");
            }
            Err(e) => warn!(path = %path.display(), error = %e, "Could not read env file"),
        }
        env
    }
}

fn state_dir_of(base_dir: &Path, config: &ConfigTree) -> PathBuf {
    let dir = Path::new(&config.feedback.state_dir);
    if dir.is_absolute() {
        dir.to_path_buf()
    } else {
        base_dir.join(dir)
    }
}

fn read_scoring(path: &Path) -> Result<Option<ScoringConfig>> {
    match std::fs::read_to_string(path) {
        Ok(content) => {
            let scoring: ScoringConfig = serde_json::from_str(&content).map_err(|e| {
                LeadflowError::Config(format!("invalid {}: {}", path.display(), e))
            })?;
            Ok(Some(scoring))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// `KEY=VALUE` lines; blank lines, comments and malformed lines are skipped.
fn parse_dotenv(content: &str) -> Vec<(String, String)> {
    content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .filter_map(|line| {
            let line = line.strip_prefix("export ").unwrap_or(line);
            let (key, value) = line.split_once('=')?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            let value = value.trim();
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
                .unwrap_or(value);
            Some((key.to_string(), value.to_string()))
        })
        .collect()
}
