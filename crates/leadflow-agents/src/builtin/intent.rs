use std::collections::BTreeMap;

use futures::future::BoxFuture;
use serde_json::{json, Value};

use leadflow_core::error::Result;
use leadflow_core::traits::{Agent, AgentInvocation, AgentOutput};
use leadflow_core::types::{AgentKind, IntentSignal, Record};

use super::records_input;
use crate::provider::{CallSpec, ProviderCaller, StepRecorder};
use crate::simulate;

/// Anonymized intent data per company domain.
pub struct IntentSignalAgent {
    caller: ProviderCaller,
}

impl IntentSignalAgent {
    pub fn new(caller: ProviderCaller) -> Self {
        Self { caller }
    }
}

impl Agent for IntentSignalAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::IntentSignal
    }

    fn execute(&self, inv: AgentInvocation) -> BoxFuture<'_, Result<AgentOutput>> {
        Box::pin(async move {
            let mut rec = StepRecorder::new(&inv.step_id);
            let mut leads = records_input(&inv, &["leads", "enriched_leads"]);

            let mut signals: BTreeMap<String, IntentSignal> = BTreeMap::new();
            for lead in &leads {
                let domain = domain_of(lead);
                if domain.is_empty() || signals.contains_key(&domain) {
                    continue;
                }
                let spec = CallSpec::new(domain.clone()).param("domain", domain.clone());
                let signal = self
                    .caller
                    .real_or_simulated(
                        &mut rec,
                        &inv.tools,
                        spec,
                        |v| parse_signal(v, &domain),
                        || simulated_signal(&domain, &lead.signal),
                    )
                    .await;
                signals.insert(domain, signal);
            }

            for lead in &mut leads {
                if let Some(signal) = signals.get(&domain_of(lead)) {
                    lead.intent = Some(signal.clone());
                }
            }

            let list: Vec<&IntentSignal> = signals.values().collect();
            rec.intermediate(json!({ "domains": list.len() }));
            Ok(rec.finish(json!({
                "intent_signals": list,
                "leads": Record::list_to_value(&leads),
            })))
        })
    }
}

fn domain_of(lead: &Record) -> String {
    if lead.domain.is_empty() {
        lead.email_domain().unwrap_or_default().to_lowercase()
    } else {
        lead.domain.to_lowercase()
    }
}

/// Accepts either `[0, 1]` fractions or `[0, 100]` percentages.
fn fraction(v: &Value) -> Option<f64> {
    let n = v.as_f64()?;
    let n = if n > 1.0 { n / 100.0 } else { n };
    Some(n.clamp(0.0, 1.0))
}

fn parse_signal(response: &Value, domain: &str) -> Option<IntentSignal> {
    let data = response.get("data").unwrap_or(response);
    let field = |keys: &[&str]| keys.iter().find_map(|k| data.get(*k).and_then(fraction));
    let intent = field(&["intent_score", "intent"]);
    let traffic = field(&["traffic_score", "traffic"]);
    let news = field(&["news_sentiment", "sentiment"]);
    if intent.is_none() && traffic.is_none() && news.is_none() {
        return None;
    }
    Some(IntentSignal {
        domain: domain.to_string(),
        intent_score: intent.unwrap_or(0.0),
        traffic_score: traffic.unwrap_or(0.0),
        news_sentiment: news.unwrap_or(0.0),
    })
}

/// Hash-derived traffic and sentiment; funding news lifts intent.
pub fn simulated_signal(domain: &str, lead_signal: &str) -> IntentSignal {
    let h = simulate::digest(domain);
    let boost = if lead_signal == "recent_funding" { 0.5 } else { 0.0 };
    IntentSignal {
        domain: domain.to_string(),
        intent_score: 0.5 + boost,
        traffic_score: (h % 100) as f64 / 100.0,
        news_sentiment: ((h / 100) % 100) as f64 / 100.0,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::builtin::testing::{invocation, live_tool, offline_tool};
    use leadflow_test_utils::MockTransport;

    #[tokio::test]
    async fn simulated_signals_follow_funding() {
        let agent = IntentSignalAgent::new(ProviderCaller::new(Arc::new(MockTransport::new())));
        let inv = invocation(
            json!({"leads": [
                {"company": "Acme", "domain": "acme.io", "signal": "recent_funding"},
                {"company": "Beta", "domain": "beta.io", "signal": "hiring"}
            ]}),
            vec![offline_tool("builtwith")],
        );
        let out = agent.execute(inv).await.unwrap();
        assert!(out.degraded);
        let signals: Vec<IntentSignal> = serde_json::from_value(out.output["intent_signals"].clone()).unwrap();
        assert_eq!(signals.len(), 2);
        assert_eq!(signals[0].domain, "acme.io");
        assert_eq!(signals[0].intent_score, 1.0);
        assert_eq!(signals[1].intent_score, 0.5);
        assert_eq!(signals[0], simulated_signal("acme.io", "recent_funding"));

        let leads = Record::list_from_value(&out.output["leads"]);
        assert_eq!(leads[1].intent.as_ref().unwrap().domain, "beta.io");
    }

    #[tokio::test]
    async fn real_percentages_are_scaled() {
        let transport = Arc::new(MockTransport::new().respond(
            "intentdata",
            json!({"intent": 80, "traffic_score": 0.4, "sentiment": 0.9}),
        ));
        let agent = IntentSignalAgent::new(ProviderCaller::new(transport));
        let inv = invocation(
            json!({"leads": [{"email": "jo@acme.io"}]}),
            vec![live_tool("intentdata")],
        );
        let out = agent.execute(inv).await.unwrap();
        assert!(!out.degraded);
        assert_eq!(out.output["intent_signals"][0]["intent_score"], 0.8);
        assert_eq!(out.output["intent_signals"][0]["domain"], "acme.io");
    }
}
