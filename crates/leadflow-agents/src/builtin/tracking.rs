use std::collections::HashMap;

use futures::future::BoxFuture;
use serde_json::{json, Value};

use leadflow_core::error::Result;
use leadflow_core::traits::{Agent, AgentInvocation, AgentOutput};
use leadflow_core::types::{AgentKind, Record};

use super::{array_at, records_input, text};
use crate::provider::{CallSpec, ProviderCaller, StepRecorder};
use crate::simulate;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Interaction {
    opens: u32,
    clicks: u32,
    replies: u32,
}

/// Pulls opens, clicks and replies for a campaign's deliveries.
pub struct ResponseTrackingAgent {
    caller: ProviderCaller,
}

impl ResponseTrackingAgent {
    pub fn new(caller: ProviderCaller) -> Self {
        Self { caller }
    }
}

impl Agent for ResponseTrackingAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::ResponseTracking
    }

    fn execute(&self, inv: AgentInvocation) -> BoxFuture<'_, Result<AgentOutput>> {
        Box::pin(async move {
            let mut rec = StepRecorder::new(&inv.step_id);
            let deliveries: Vec<Value> = inv
                .input("sent_status")
                .and_then(|v| v.as_array())
                .map(|items| {
                    items
                        .iter()
                        .filter(|d| d["status"] != "skipped" && !d["delivery_id"].is_null())
                        .cloned()
                        .collect()
                })
                .unwrap_or_default();
            let campaign_id = inv
                .input("campaign_id")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            let ranked: HashMap<String, Record> = records_input(&inv, &["ranked_leads"])
                .into_iter()
                .map(|r| (r.key(), r))
                .collect();

            // one call per campaign
            let spec = CallSpec::new(campaign_id.clone()).param("campaign_id", campaign_id.clone());
            let real = self
                .caller
                .real_or_simulated(&mut rec, &inv.tools, spec, |v| parse_events(v).map(Some), || None)
                .await;

            let mut responses = Vec::with_capacity(deliveries.len());
            for d in &deliveries {
                let key = text(d, &["key"]).unwrap_or_default();
                let delivery_id = text(d, &["delivery_id"]).unwrap_or_default();
                let lead = ranked.get(&key);
                let score = d["score"]
                    .as_f64()
                    .or_else(|| lead.and_then(|l| l.score))
                    .unwrap_or(50.0);
                let grade = text(d, &["grade"])
                    .or_else(|| lead.and_then(|l| l.grade.clone()))
                    .unwrap_or_default();
                let dominant = text(d, &["dominant_dimension"])
                    .or_else(|| lead.and_then(|l| l.dominant_dimension.clone()));

                let interaction = match &real {
                    Some(events) => events
                        .get(&delivery_id)
                        .or_else(|| events.get(&key))
                        .copied()
                        .unwrap_or_default(),
                    None => simulated_interaction(&delivery_id, score),
                };

                responses.push(json!({
                    "key": key,
                    "delivery_id": delivery_id,
                    "campaign_id": campaign_id,
                    "grade": grade,
                    "score": score,
                    "dominant_dimension": dominant,
                    "sent": 1,
                    "opens": interaction.opens,
                    "clicks": interaction.clicks,
                    "replies": interaction.replies,
                }));
            }

            let replies: u32 = responses.iter().filter_map(|r| r["replies"].as_u64()).map(|n| n as u32).sum();
            rec.intermediate(json!({ "tracked": responses.len(), "replies": replies }));
            Ok(rec.finish(json!({ "responses": responses })))
        })
    }
}

/// Interaction counts keyed by delivery id (or record key).
fn parse_events(response: &Value) -> Option<HashMap<String, Interaction>> {
    let items = array_at(response, &["responses", "events", "messages"])?;
    let mut out: HashMap<String, Interaction> = HashMap::new();
    for item in items {
        let Some(id) = text(item, &["delivery_id", "message_id", "id", "key"]) else {
            continue;
        };
        let count = |k: &str| match item.get(k) {
            Some(Value::Bool(b)) => u32::from(*b),
            Some(v) => v.as_u64().unwrap_or(0) as u32,
            None => 0,
        };
        let entry = out.entry(id).or_default();
        entry.opens += count("opened").max(count("opens"));
        entry.clicks += count("clicked").max(count("clicks"));
        entry.replies += count("replied").max(count("replies"));
    }
    Some(out)
}

/// Engagement odds rise with score.
fn simulated_interaction(delivery_id: &str, score: f64) -> Interaction {
    let p = (score / 100.0).clamp(0.0, 1.0);
    let u = simulate::unit("engagement", delivery_id);
    Interaction {
        opens: u32::from(u < 0.3 + 0.5 * p),
        clicks: u32::from(u < 0.1 + 0.3 * p),
        replies: u32::from(u < 0.05 + 0.2 * p),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::builtin::testing::{invocation, live_tool, offline_tool};
    use leadflow_test_utils::MockTransport;

    fn sent() -> Value {
        json!({
            "sent_status": [
                {"key": "jo@acme.io", "delivery_id": "d-1", "status": "sent", "grade": "A", "score": 90.0},
                {"key": "sam@beta.io", "delivery_id": "d-2", "status": "sent"},
                {"key": "ghost::x", "delivery_id": null, "status": "skipped"}
            ],
            "campaign_id": "cmp-1",
            "ranked_leads": [{"email": "sam@beta.io", "grade": "C", "score": 41.0, "dominant_dimension": "tech_stack_match"}]
        })
    }

    #[tokio::test]
    async fn real_events_by_delivery_id() {
        let transport = Arc::new(MockTransport::new().respond(
            "tracker",
            json!({"events": [
                {"delivery_id": "d-1", "opened": true, "replied": true},
                {"delivery_id": "d-2", "opened": true, "clicks": 2}
            ]}),
        ));
        let agent = ResponseTrackingAgent::new(ProviderCaller::new(transport.clone()));
        let out = agent.execute(invocation(sent(), vec![live_tool("tracker")])).await.unwrap();
        assert!(!out.degraded);
        assert_eq!(transport.call_count(), 1);
        let responses = out.output["responses"].as_array().unwrap();
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["replies"], 1);
        assert_eq!(responses[1]["clicks"], 2);
        // grade and dominant dimension recovered from ranked leads
        assert_eq!(responses[1]["grade"], "C");
        assert_eq!(responses[1]["dominant_dimension"], "tech_stack_match");
    }

    #[tokio::test]
    async fn simulated_responses_are_outcomes() {
        let agent = ResponseTrackingAgent::new(ProviderCaller::new(Arc::new(MockTransport::new())));
        let out = agent.execute(invocation(sent(), vec![offline_tool("tracker")])).await.unwrap();
        assert!(out.degraded);
        let outcomes: Vec<leadflow_core::feedback::CampaignOutcome> =
            serde_json::from_value(out.output["responses"].clone()).unwrap();
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].record_key, "jo@acme.io");
        assert!(outcomes.iter().all(|o| o.replies <= o.sent));
    }

    #[test]
    fn engagement_never_exceeds_opens() {
        for i in 0..100 {
            let it = simulated_interaction(&format!("d-{}", i), 70.0);
            assert!(it.replies <= it.opens && it.clicks <= it.opens);
        }
    }
}
