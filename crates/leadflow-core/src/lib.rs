pub mod config;
pub mod error;
pub mod event;
pub mod feedback;
pub mod scoring;
pub mod traits;
pub mod types;

pub use config::{ConfigTree, PipelineDocument, StepDefinition};
pub use error::{LeadflowError, Result};
pub use event::{redact, Event, EventBus, EventKind};
pub use scoring::{Dimension, ScoreResult, ScoringEngine};
pub use traits::{Agent, AgentInvocation, AgentOutput, Transport};
pub use types::*;
