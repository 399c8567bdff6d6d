use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tracing::{debug, warn};

use leadflow_core::config::ResolvedTool;
use leadflow_core::error::LeadflowError;
use leadflow_core::event::{Event, EventKind};
use leadflow_core::traits::{AgentOutput, Transport};
use leadflow_core::types::{CallFailure, ProviderRequest};

/// Collects the events and degradation flag of one step execution.
#[derive(Debug)]
pub struct StepRecorder {
    step_id: String,
    events: Vec<Event>,
    degraded: bool,
    simulated_tools: HashSet<String>,
}

impl StepRecorder {
    pub fn new(step_id: impl Into<String>) -> Self {
        Self {
            step_id: step_id.into(),
            events: Vec::new(),
            degraded: false,
            simulated_tools: HashSet::new(),
        }
    }

    pub fn step_id(&self) -> &str {
        &self.step_id
    }

    pub fn emit(&mut self, kind: EventKind, payload: Value) {
        self.events
            .push(Event::for_step(self.step_id.clone(), kind, payload));
    }

    pub fn reasoning(&mut self, message: impl Into<String>) {
        self.emit(EventKind::Reasoning, json!({ "message": message.into() }));
    }

    pub fn intermediate(&mut self, payload: Value) {
        self.emit(EventKind::Intermediate, payload);
    }

    pub fn mark_degraded(&mut self) {
        self.degraded = true;
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn finish(self, output: Value) -> AgentOutput {
        AgentOutput {
            output,
            events: self.events,
            degraded: self.degraded,
        }
    }
}

/// One provider call: what to send beyond the tool's static params.
#[derive(Debug, Clone, Default)]
pub struct CallSpec {
    /// Short description of the call target, e.g. a domain or email.
    pub target: String,
    pub params: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl CallSpec {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            ..Default::default()
        }
    }

    pub fn param(mut self, key: &str, value: impl Into<String>) -> Self {
        self.params.push((key.to_string(), value.into()));
        self
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Real-or-simulated provider calls.
///
/// A call only goes out when the tool's credential is present. Timeouts and
/// transport failures are recorded as `api_error` and reported as `None`, the
/// caller then substitutes simulated data.
#[derive(Clone)]
pub struct ProviderCaller {
    transport: Arc<dyn Transport>,
}

impl ProviderCaller {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Attempt a single call against `tool`.
    pub async fn call(
        &self,
        rec: &mut StepRecorder,
        tool: &ResolvedTool,
        spec: CallSpec,
    ) -> Option<Value> {
        let Some(credential) = tool.credential.clone() else {
            if rec.simulated_tools.insert(tool.name.clone()) {
                let reason = LeadflowError::MissingCredential {
                    key: tool.credential_key.clone().unwrap_or_else(|| tool.name.clone()),
                };
                debug!(step_id = %rec.step_id, tool = %tool.name, "Credential absent, simulating");
                rec.emit(
                    EventKind::Reasoning,
                    json!({
                        "message": format!("No credential for {}, using simulated data", tool.name),
                        "tool": tool.redacted(),
                        "simulated": true,
                        "reason": reason.to_string(),
                    }),
                );
            }
            return None;
        };

        let mut params = tool.params.clone();
        params.extend(spec.params);
        let request = ProviderRequest {
            provider: tool.name.clone(),
            method: tool.method,
            endpoint: tool.endpoint.clone(),
            credential,
            credential_param: tool.credential_param.clone(),
            params,
            body: spec.body.or_else(|| tool.body.clone()),
        };

        rec.emit(
            EventKind::ApiCall,
            json!({ "tool": tool.redacted(), "target": spec.target }),
        );

        let timeout = Duration::from_secs(tool.timeout_secs);
        let outcome = match tokio::time::timeout(timeout, self.transport.send(request)).await {
            Ok(result) => result,
            Err(_) => Err(CallFailure::Timeout {
                after_secs: tool.timeout_secs,
            }),
        };

        match outcome {
            Ok(value) => {
                rec.emit(
                    EventKind::ApiSuccess,
                    json!({ "tool": tool.name, "target": spec.target }),
                );
                Some(value)
            }
            Err(failure) => {
                let error = failure.into_error(&tool.name);
                warn!(step_id = %rec.step_id, tool = %tool.name, error = %error, "Provider call failed, simulating");
                rec.emit(
                    EventKind::ApiError,
                    json!({
                        "tool": tool.name,
                        "target": spec.target,
                        "error": error.to_string(),
                        "fallback": "simulated",
                    }),
                );
                None
            }
        }
    }

    /// Try each tool in order and return the first real response.
    pub async fn first_real(
        &self,
        rec: &mut StepRecorder,
        tools: &[ResolvedTool],
        spec: &CallSpec,
    ) -> Option<(String, Value)> {
        if tools.is_empty() {
            if rec.simulated_tools.insert(String::new()) {
                rec.emit(
                    EventKind::Reasoning,
                    json!({ "message": "No provider declared, using simulated data", "simulated": true }),
                );
            }
            return None;
        }
        for tool in tools {
            if let Some(value) = self.call(rec, tool, spec.clone()).await {
                return Some((tool.name.clone(), value));
            }
        }
        None
    }

    /// Parse a real response, or fall back to `simulate` and mark the step degraded.
    pub async fn real_or_simulated<T>(
        &self,
        rec: &mut StepRecorder,
        tools: &[ResolvedTool],
        spec: CallSpec,
        parse: impl Fn(&Value) -> Option<T>,
        simulate: impl FnOnce() -> T,
    ) -> T {
        let target = spec.target.clone();
        if let Some((tool, value)) = self.first_real(rec, tools, &spec).await {
            if let Some(parsed) = parse(&value) {
                return parsed;
            }
            rec.emit(
                EventKind::ApiError,
                json!({
                    "tool": tool,
                    "target": target,
                    "error": CallFailure::Parse("unexpected response shape".into()).to_string(),
                    "fallback": "simulated",
                }),
            );
        }
        rec.mark_degraded();
        simulate()
    }
}
