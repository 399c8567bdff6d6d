//! Mocks and fixtures shared by the Leadflow test suites.

use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use futures::future::BoxFuture;
use serde_json::Value;

use leadflow_core::feedback::{FeedbackEvidence, FeedbackProposal, ProposalStatus};
use leadflow_core::traits::Transport;
use leadflow_core::types::{CallFailure, EnvSnapshot, ProviderRequest};

#[derive(Default)]
struct Script {
    response: Option<Value>,
    matched: Vec<(String, Value)>,
    failure: Option<CallFailure>,
    delay: Option<Duration>,
}

/// Scripted transport. Providers without a script fail with a transport error.
#[derive(Default)]
pub struct MockTransport {
    scripts: HashMap<String, Script>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every call to `provider` with `response`.
    pub fn respond(mut self, provider: &str, response: Value) -> Self {
        self.scripts.entry(provider.to_string()).or_default().response = Some(response);
        self
    }

    /// Answer calls whose params or body mention `needle`. Checked before `respond`.
    pub fn respond_for(mut self, provider: &str, needle: &str, response: Value) -> Self {
        self.scripts
            .entry(provider.to_string())
            .or_default()
            .matched
            .push((needle.to_string(), response));
        self
    }

    pub fn fail(mut self, provider: &str, failure: CallFailure) -> Self {
        self.scripts.entry(provider.to_string()).or_default().failure = Some(failure);
        self
    }

    /// Sleep before answering. Pair with a paused clock.
    pub fn delay(mut self, provider: &str, delay: Duration) -> Self {
        self.scripts.entry(provider.to_string()).or_default().delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Requests sent to one provider.
    pub fn requests_for(&self, provider: &str) -> Vec<ProviderRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.provider == provider)
            .collect()
    }

    fn answer(&self, request: &ProviderRequest) -> Result<Value, CallFailure> {
        let Some(script) = self.scripts.get(&request.provider) else {
            return Err(CallFailure::Transport(format!("no script for {}", request.provider)));
        };
        if let Some(failure) = &script.failure {
            return Err(failure.clone());
        }
        let body = request.body.as_ref().map(|b| b.to_string()).unwrap_or_default();
        let hit = script.matched.iter().find(|(needle, _)| {
            request.params.iter().any(|(_, v)| v.contains(needle.as_str())) || body.contains(needle.as_str())
        });
        if let Some((_, response)) = hit {
            return Ok(response.clone());
        }
        script
            .response
            .clone()
            .ok_or_else(|| CallFailure::Transport(format!("no response scripted for {}", request.provider)))
    }
}

impl Transport for MockTransport {
    fn send(&self, request: ProviderRequest) -> BoxFuture<'_, Result<Value, CallFailure>> {
        Box::pin(async move {
            if let Ok(mut log) = self.requests.lock() {
                log.push(request.clone());
            }
            if let Some(delay) = self.scripts.get(&request.provider).and_then(|s| s.delay) {
                tokio::time::sleep(delay).await;
            }
            self.answer(&request)
        })
    }
}

/// Environment snapshot from literal pairs.
pub fn env(pairs: &[(&str, &str)]) -> EnvSnapshot {
    EnvSnapshot::from_pairs(pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())))
}

/// Write `content` to a temp file with the given extension.
/// Keep the returned handle alive for as long as the path is used.
pub fn write_document(content: &str, extension: &str) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join(format!("pipeline.{}", extension));
    let mut file = std::fs::File::create(&path).expect("create document");
    file.write_all(content.as_bytes()).expect("write document");
    (dir, path)
}

pub fn fixed_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0)
        .single()
        .expect("valid timestamp")
}

/// A pending proposal with the given deltas.
pub fn proposal(id: &str, deltas: &[(&str, f64)]) -> FeedbackProposal {
    FeedbackProposal {
        id: id.to_string(),
        created_at: fixed_time(),
        deltas: deltas
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .collect::<BTreeMap<_, _>>(),
        evidence: FeedbackEvidence::default(),
        status: ProposalStatus::Pending,
        resolved_at: None,
    }
}

/// Full discovery-to-feedback pipeline in linear mode. Credentials come from
/// `APOLLO_API_KEY`, `CLEARBIT_API_KEY`, `HUNTER_API_KEY` and `OPENAI_API_KEY`.
pub const OUTBOUND_PIPELINE: &str = r#"
workflow_name = "outbound"

[config]
icp = "B2B SaaS, 50-500 employees"

[config.env]
required = ["APOLLO_API_KEY"]
optional = ["CLEARBIT_API_KEY", "HUNTER_API_KEY", "OPENAI_API_KEY"]

[config.scoring.weights]
tech_stack_match = 0.25
role_function_match = 0.2
email_validity = 0.15
intent_score = 0.2
domain_traffic = 0.1
news_sentiment = 0.1

[config.scoring.criteria]
preferred_technologies = ["Salesforce", "HubSpot"]

[[steps]]
id = "search"
agent = "search"
inputs = { icp = "{{config.icp}}", signals = ["recent_funding", "hiring"], target_count = 4 }
tools = [{ name = "apollo", endpoint = "https://apollo.provider.test/search", credential = "APOLLO_API_KEY" }]

[[steps]]
id = "enrich"
agent = "enrichment"
inputs = { leads = "{{search.output.leads}}" }
tools = [{ name = "clearbit", endpoint = "https://clearbit.provider.test", credential = "CLEARBIT_API_KEY" }]

[[steps]]
id = "intent"
agent = "intent_signal"
inputs = { leads = "{{enrich.output.enriched_leads}}" }

[[steps]]
id = "score"
agent = "scoring"
inputs = { enriched_leads = "{{enrich.output.enriched_leads}}", intent_signals = "{{intent.output.intent_signals}}" }
required_inputs = ["enriched_leads"]

[[steps]]
id = "verify"
agent = "email_verification"
inputs = { leads = "{{score.output.ranked_leads}}" }
tools = [{ name = "hunter", endpoint = "https://hunter.provider.test", credential = "HUNTER_API_KEY" }]

[[steps]]
id = "content"
agent = "content_generation"
inputs = { ranked_leads = "{{verify.output.verified_leads}}", persona = "SDR", tone = "friendly" }
tools = [{ name = "openai", endpoint = "https://openai.provider.test", credential = "OPENAI_API_KEY", method = "post" }]

[[steps]]
id = "send"
agent = "delivery"
inputs = { messages = "{{content.output.messages}}" }

[[steps]]
id = "track"
agent = "response_tracking"
inputs = { sent_status = "{{send.output.sent_status}}", campaign_id = "{{send.output.campaign_id}}", ranked_leads = "{{score.output.ranked_leads}}" }

[[steps]]
id = "train"
agent = "feedback_train"
inputs = { responses = "{{track.output.responses}}" }
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(provider: &str, params: &[(&str, &str)]) -> ProviderRequest {
        ProviderRequest {
            provider: provider.into(),
            method: leadflow_core::config::HttpMethod::Get,
            endpoint: "https://x.test".into(),
            credential: "k".into(),
            credential_param: "api_key".into(),
            params: params.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            body: None,
        }
    }

    #[tokio::test]
    async fn matched_response_wins() {
        let mock = MockTransport::new()
            .respond("p", json!(1))
            .respond_for("p", "special", json!(2));
        assert_eq!(mock.send(request("p", &[("q", "a special one")])).await, Ok(json!(2)));
        assert_eq!(mock.send(request("p", &[("q", "plain")])).await, Ok(json!(1)));
        assert!(mock.send(request("other", &[])).await.is_err());
        assert_eq!(mock.call_count(), 3);
        assert_eq!(mock.requests_for("p").len(), 2);
    }

    #[test]
    fn outbound_pipeline_parses() {
        let value: toml::Value = toml::from_str(OUTBOUND_PIPELINE).unwrap();
        assert_eq!(value["steps"].as_array().unwrap().len(), 9);
    }
}
