use thiserror::Error;

#[derive(Debug, Error)]
pub enum LeadflowError {
    // Credential / reference errors
    #[error("Missing credential: {key}")]
    MissingCredential { key: String },

    #[error("Unresolved reference {{{{{reference}}}}}: {reason}")]
    Resolution { reference: String, reason: String },

    #[error("Required input '{field}' of step '{step}' could not be resolved: {reason}")]
    InputResolution {
        step: String,
        field: String,
        reason: String,
    },

    // Provider errors
    #[error("Provider timeout after {timeout_secs}s: {provider}")]
    ProviderTimeout { provider: String, timeout_secs: u64 },

    #[error("Provider transport error: {provider}: {message}")]
    ProviderTransport { provider: String, message: String },

    // Agent errors
    #[error("Agent execution failed in step {step}: {message}")]
    AgentExecution { step: String, message: String },

    #[error("Unknown agent: {0}")]
    UnknownAgent(String),

    // Structural document errors
    #[error("Dependency cycle between steps: {}", .0.join(" -> "))]
    GraphCycle(Vec<String>),

    #[error("Duplicate step id: {0}")]
    DuplicateStepId(String),

    #[error("Step '{step}' depends on unknown step '{dependency}'")]
    UnknownDependency { step: String, dependency: String },

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // Feedback errors
    #[error("Feedback proposal not found: {0}")]
    ProposalNotFound(String),

    #[error("Feedback proposal {id} is already {status}")]
    ProposalState { id: String, status: String },

    #[error("Run cancelled")]
    Cancelled,

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LeadflowError {
    /// Structural errors are raised before any step executes.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::UnknownAgent(_)
                | Self::GraphCycle(_)
                | Self::DuplicateStepId(_)
                | Self::UnknownDependency { .. }
                | Self::Config(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, LeadflowError>;
