use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use leadflow_core::event::{Event, EventBus, EventKind};
use leadflow_core::types::{RunId, StepStatus};

/// Everything one run accumulates: outputs, statuses, errors and the event log.
///
/// Owned by exactly one run. Events are mirrored onto the event bus when one
/// is attached.
pub struct ExecutionState {
    run_id: RunId,
    outputs: HashMap<String, Value>,
    statuses: HashMap<String, StepStatus>,
    errors: HashMap<String, String>,
    elapsed: HashMap<String, u64>,
    events: Vec<Event>,
    bus: Option<Arc<EventBus>>,
}

impl ExecutionState {
    pub fn new(run_id: RunId) -> Self {
        Self {
            run_id,
            outputs: HashMap::new(),
            statuses: HashMap::new(),
            errors: HashMap::new(),
            elapsed: HashMap::new(),
            events: Vec::new(),
            bus: None,
        }
    }

    pub fn with_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn push(&mut self, event: Event) {
        if let Some(bus) = &self.bus {
            bus.publish(event.clone());
        }
        self.events.push(event);
    }

    pub fn emit(&mut self, step_id: &str, kind: EventKind, payload: Value) {
        self.push(Event::for_step(step_id, kind, payload));
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn events_for<'a>(&'a self, step_id: &'a str) -> impl Iterator<Item = &'a Event> {
        self.events
            .iter()
            .filter(move |e| e.step_id.as_deref() == Some(step_id))
    }

    pub fn outputs(&self) -> &HashMap<String, Value> {
        &self.outputs
    }

    pub fn output(&self, step_id: &str) -> Option<&Value> {
        self.outputs.get(step_id)
    }

    pub fn record_output(&mut self, step_id: &str, output: Value) {
        self.outputs.insert(step_id.to_string(), output);
    }

    pub fn status(&self, step_id: &str) -> StepStatus {
        self.statuses
            .get(step_id)
            .copied()
            .unwrap_or(StepStatus::Pending)
    }

    pub fn set_status(&mut self, step_id: &str, status: StepStatus) {
        self.statuses.insert(step_id.to_string(), status);
    }

    pub fn error(&self, step_id: &str) -> Option<&str> {
        self.errors.get(step_id).map(|s| s.as_str())
    }

    pub fn set_error(&mut self, step_id: &str, error: impl Into<String>) {
        self.errors.insert(step_id.to_string(), error.into());
    }

    pub fn elapsed_ms(&self, step_id: &str) -> u64 {
        self.elapsed.get(step_id).copied().unwrap_or(0)
    }

    pub fn set_elapsed_ms(&mut self, step_id: &str, ms: u64) {
        self.elapsed.insert(step_id.to_string(), ms);
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.events.iter().filter(|e| e.kind == kind).count()
    }
}
