use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of an execution log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    EnvLoading,
    StepStart,
    StepEnd,
    ApiCall,
    ApiSuccess,
    ApiError,
    Reasoning,
    Intermediate,
    ResolutionError,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EnvLoading => "env_loading",
            Self::StepStart => "step_start",
            Self::StepEnd => "step_end",
            Self::ApiCall => "api_call",
            Self::ApiSuccess => "api_success",
            Self::ApiError => "api_error",
            Self::Reasoning => "reasoning",
            Self::Intermediate => "intermediate",
            Self::ResolutionError => "resolution_error",
        }
    }
}

/// One timestamped entry in a run's event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
    pub kind: EventKind,
    pub payload: Value,
}

impl Event {
    pub fn new(kind: EventKind, payload: Value) -> Self {
        Self {
            timestamp: Utc::now(),
            step_id: None,
            kind,
            payload,
        }
    }

    pub fn for_step(step_id: impl Into<String>, kind: EventKind, payload: Value) -> Self {
        Self {
            timestamp: Utc::now(),
            step_id: Some(step_id.into()),
            kind,
            payload,
        }
    }
}

const SENSITIVE_KEYS: [&str; 6] = ["api_key", "apikey", "authorization", "token", "secret", "password"];

/// Copy of `value` with every credential-looking field masked.
pub fn redact(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| {
                    let lower = k.to_lowercase();
                    if SENSITIVE_KEYS.iter().any(|s| lower.contains(s)) && !v.is_null() {
                        (k.clone(), Value::String("***".into()))
                    } else {
                        (k.clone(), redact(v))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact).collect()),
        other => other.clone(),
    }
}

/// Event bus using tokio broadcast channel.
/// All subscribers receive all events.
pub struct EventBus {
    tx: tokio::sync::broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = tokio::sync::broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, event: Event) {
        // No receivers is fine.
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
