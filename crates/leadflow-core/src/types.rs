use std::collections::HashMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::HttpMethod;
use crate::error::LeadflowError;

/// Unique run identifier.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The closed set of agent variants a step can be bound to.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    Search,
    PreEnrichment,
    Enrichment,
    ThirdPartyEnrichment,
    IntentSignal,
    Scoring,
    EmailVerification,
    ContentGeneration,
    Delivery,
    ResponseTracking,
    FeedbackTrain,
    FeedbackApply,
}

impl AgentKind {
    pub const ALL: [AgentKind; 12] = [
        Self::Search,
        Self::PreEnrichment,
        Self::Enrichment,
        Self::ThirdPartyEnrichment,
        Self::IntentSignal,
        Self::Scoring,
        Self::EmailVerification,
        Self::ContentGeneration,
        Self::Delivery,
        Self::ResponseTracking,
        Self::FeedbackTrain,
        Self::FeedbackApply,
    ];

    /// Canonical snake_case identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Search => "search",
            Self::PreEnrichment => "pre_enrichment",
            Self::Enrichment => "enrichment",
            Self::ThirdPartyEnrichment => "third_party_enrichment",
            Self::IntentSignal => "intent_signal",
            Self::Scoring => "scoring",
            Self::EmailVerification => "email_verification",
            Self::ContentGeneration => "content_generation",
            Self::Delivery => "delivery",
            Self::ResponseTracking => "response_tracking",
            Self::FeedbackTrain => "feedback_train",
            Self::FeedbackApply => "feedback_apply",
        }
    }

    /// Whether this variant talks to an external provider.
    pub fn is_provider_backed(&self) -> bool {
        !matches!(
            self,
            Self::PreEnrichment | Self::Scoring | Self::FeedbackApply
        )
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentKind {
    type Err = LeadflowError;

    /// Accepts snake_case, kebab-case and the legacy `*Agent` class names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().replace('-', "_").to_lowercase();
        let kind = match normalized.as_str() {
            "search" | "prospect_search" | "prospectsearchagent" => Self::Search,
            "pre_enrichment" | "llmpreenrichmentagent" => Self::PreEnrichment,
            "enrichment" | "data_enrichment" | "dataenrichmentagent" => Self::Enrichment,
            "third_party_enrichment" | "thirdpartyenrichmentagent" => Self::ThirdPartyEnrichment,
            "intent_signal" | "intent_signals" | "anonymizedintentsignalagent" => {
                Self::IntentSignal
            }
            "scoring" | "scoringagent" => Self::Scoring,
            "email_verification" | "emailverificationagent" => Self::EmailVerification,
            "content_generation" | "outreach_content" | "outreachcontentagent" => {
                Self::ContentGeneration
            }
            "delivery" | "send" | "outreach_executor" | "outreachexecutoragent" => Self::Delivery,
            "response_tracking" | "response_tracker" | "responsetrackeragent" => {
                Self::ResponseTracking
            }
            "feedback_train" | "feedback_trainer" | "feedbacktraineragent" => Self::FeedbackTrain,
            "feedback_apply" | "feedbackapplyagent" => Self::FeedbackApply,
            _ => return Err(LeadflowError::UnknownAgent(s.to_string())),
        };
        Ok(kind)
    }
}

/// Lifecycle of a single step within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    /// Completed, but at least one tool call used simulated data.
    Degraded,
    Failed,
    /// Never started: halted run, cancelled run, or a failed data dependency.
    Skipped,
}

impl StepStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending | Self::Running)
    }

    /// Completed or Degraded: the step produced an output.
    pub fn succeeded(&self) -> bool {
        matches!(self, Self::Completed | Self::Degraded)
    }
}

/// Terminal state of a whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    PartiallyFailed,
    Aborted,
}

/// Snapshot of the process environment taken at run start.
///
/// Agents and the resolver read credentials only through this snapshot, so a
/// run never observes environment changes made after it started.
#[derive(Debug, Clone, Default)]
pub struct EnvSnapshot {
    vars: HashMap<String, String>,
}

impl EnvSnapshot {
    /// Capture every variable of the current process.
    pub fn capture() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(|s| s.as_str())
    }

    /// A credential counts as present only when it is a non-empty string.
    pub fn credential(&self, key: &str) -> Option<&str> {
        self.get(key).map(str::trim).filter(|v| !v.is_empty())
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }
}

/// Intent data attached to a record by the intent-signal step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntentSignal {
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub intent_score: f64,
    #[serde(default)]
    pub traffic_score: f64,
    #[serde(default)]
    pub news_sentiment: f64,
}

/// Deliverability classification returned by email verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Deliverability {
    Deliverable,
    Risky,
    Undeliverable,
    Unknown,
}

impl Deliverability {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "deliverable" | "valid" | "ok" => Self::Deliverable,
            "risky" | "accept_all" | "catch_all" => Self::Risky,
            "undeliverable" | "invalid" => Self::Undeliverable,
            _ => Self::Unknown,
        }
    }
}

/// A prospect flowing through the pipeline.
///
/// Known attributes are typed; anything else a provider returns is kept in
/// `extra` so later steps and the run report still see it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(default)]
    pub company: String,
    #[serde(default, alias = "contact")]
    pub contact_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub emails: Vec<String>,
    #[serde(default)]
    pub domain: String,
    #[serde(default, alias = "title")]
    pub role: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub linkedin: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub signal: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub technologies: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub employee_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<IntentSignal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deliverability: Option<Deliverability>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grade: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dominant_dimension: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Record {
    /// Identity key: lower-cased email, else `company::contact`.
    pub fn key(&self) -> String {
        let email = self.primary_email();
        if !email.is_empty() {
            return email.to_lowercase();
        }
        format!(
            "{}::{}",
            self.company.trim().to_lowercase(),
            self.contact_name.trim().to_lowercase()
        )
    }

    /// The `email` field, or the first entry of `emails`.
    pub fn primary_email(&self) -> &str {
        if !self.email.trim().is_empty() {
            return self.email.trim();
        }
        self.emails
            .iter()
            .map(|e| e.trim())
            .find(|e| !e.is_empty())
            .unwrap_or("")
    }

    /// Domain part of the primary email, if any.
    pub fn email_domain(&self) -> Option<&str> {
        self.primary_email()
            .rsplit_once('@')
            .map(|(_, d)| d)
            .filter(|d| !d.is_empty())
    }

    /// Decode a JSON array of records, skipping entries that are not objects.
    pub fn list_from_value(value: &serde_json::Value) -> Vec<Record> {
        value
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter(|v| v.is_object())
                    .filter_map(|v| serde_json::from_value(v.clone()).ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn list_to_value(records: &[Record]) -> serde_json::Value {
        serde_json::to_value(records).unwrap_or(serde_json::Value::Array(vec![]))
    }
}

/// A request handed to a provider transport.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderRequest {
    /// Tool name as declared in the document (e.g. "apollo").
    pub provider: String,
    pub method: HttpMethod,
    pub endpoint: String,
    #[serde(skip_serializing)]
    pub credential: String,
    /// Query parameter carrying the credential.
    pub credential_param: String,
    pub params: Vec<(String, String)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
}

/// Why a single provider call did not produce a usable response.
#[derive(Debug, Clone, PartialEq)]
pub enum CallFailure {
    Timeout { after_secs: u64 },
    Transport(String),
    Status(u16),
    Parse(String),
}

impl std::fmt::Display for CallFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout { after_secs } => write!(f, "timed out after {}s", after_secs),
            Self::Transport(msg) => write!(f, "transport error: {}", msg),
            Self::Status(code) => write!(f, "HTTP status {}", code),
            Self::Parse(msg) => write!(f, "unparseable response: {}", msg),
        }
    }
}

impl CallFailure {
    pub fn into_error(self, provider: &str) -> LeadflowError {
        match self {
            Self::Timeout { after_secs } => LeadflowError::ProviderTimeout {
                provider: provider.to_string(),
                timeout_secs: after_secs,
            },
            other => LeadflowError::ProviderTransport {
                provider: provider.to_string(),
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_kind_accepts_legacy_names() {
        assert_eq!(
            "ProspectSearchAgent".parse::<AgentKind>().unwrap(),
            AgentKind::Search
        );
        assert_eq!(
            "third-party-enrichment".parse::<AgentKind>().unwrap(),
            AgentKind::ThirdPartyEnrichment
        );
        assert_eq!(
            "OutreachExecutorAgent".parse::<AgentKind>().unwrap(),
            AgentKind::Delivery
        );
        for kind in AgentKind::ALL {
            assert_eq!(kind.as_str().parse::<AgentKind>().unwrap(), kind);
        }
    }

    #[test]
    fn agent_kind_unknown() {
        let err = "CrystalBallAgent".parse::<AgentKind>().unwrap_err();
        assert!(matches!(err, LeadflowError::UnknownAgent(ref s) if s == "CrystalBallAgent"));
    }

    #[test]
    fn record_key_prefers_email() {
        let rec = Record {
            company: "Acme".into(),
            contact_name: "Jo Park".into(),
            email: "Jo.Park@Acme.io".into(),
            ..Default::default()
        };
        assert_eq!(rec.key(), "jo.park@acme.io");
        assert_eq!(rec.email_domain(), Some("Acme.io"));

        let anon = Record {
            company: "Acme ".into(),
            contact_name: "Jo Park".into(),
            ..Default::default()
        };
        assert_eq!(anon.key(), "acme::jo park");
    }

    #[test]
    fn record_accepts_legacy_field_names() {
        let value = serde_json::json!({
            "company": "Acme",
            "contact": "Jo",
            "title": "VP Sales",
            "emails": ["jo@acme.io"],
            "campaign_note": "keep me"
        });
        let rec: Record = serde_json::from_value(value).unwrap();
        assert_eq!(rec.contact_name, "Jo");
        assert_eq!(rec.role, "VP Sales");
        assert_eq!(rec.primary_email(), "jo@acme.io");
        assert_eq!(rec.extra["campaign_note"], "keep me");
    }

    #[test]
    fn env_snapshot_credential_requires_non_empty() {
        let env = EnvSnapshot::from_pairs([("A", "  "), ("B", "secret")]);
        assert_eq!(env.credential("A"), None);
        assert_eq!(env.credential("B"), Some("secret"));
        assert_eq!(env.credential("C"), None);
    }

    #[test]
    fn step_status_terminality() {
        assert!(!StepStatus::Pending.is_terminal());
        assert!(!StepStatus::Running.is_terminal());
        assert!(StepStatus::Degraded.is_terminal());
        assert!(StepStatus::Degraded.succeeded());
        assert!(!StepStatus::Skipped.succeeded());
    }
}
