use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::Value;

use crate::config::{ConfigTree, ResolvedTool};
use crate::error::Result;
use crate::event::Event;
use crate::types::{AgentKind, CallFailure, EnvSnapshot, ProviderRequest};

/// Everything an agent sees for one step execution.
#[derive(Debug, Clone)]
pub struct AgentInvocation {
    pub step_id: String,
    /// Input template after reference resolution.
    pub inputs: Value,
    pub tools: Vec<ResolvedTool>,
    /// Snapshot taken at run start; never changes during the run.
    pub config: Arc<ConfigTree>,
    pub env: Arc<EnvSnapshot>,
    /// Default per-call timeout for tools that declare none.
    pub timeout: Duration,
}

impl AgentInvocation {
    pub fn input(&self, key: &str) -> Option<&Value> {
        self.inputs.get(key).filter(|v| !v.is_null())
    }
}

/// What an agent hands back to the executor.
#[derive(Debug, Clone, Default)]
pub struct AgentOutput {
    pub output: Value,
    pub events: Vec<Event>,
    /// At least one tool call used simulated data.
    pub degraded: bool,
}

/// One pipeline capability.
pub trait Agent: Send + Sync + 'static {
    fn kind(&self) -> AgentKind;

    /// Run the step. Provider failures are absorbed into simulation;
    /// an `Err` here is an agent-level failure of the step.
    fn execute(&self, invocation: AgentInvocation) -> BoxFuture<'_, Result<AgentOutput>>;
}

/// How a provider call leaves the process.
pub trait Transport: Send + Sync + 'static {
    fn send(&self, request: ProviderRequest) -> BoxFuture<'_, std::result::Result<Value, CallFailure>>;
}
