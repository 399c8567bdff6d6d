use futures::future::BoxFuture;
use serde_json::{json, Value};

use leadflow_core::error::Result;
use leadflow_core::traits::{Agent, AgentInvocation, AgentOutput};
use leadflow_core::types::AgentKind;

use super::text;
use crate::provider::{CallSpec, ProviderCaller, StepRecorder};
use crate::simulate;

/// Sends each message and records a delivery id under one campaign.
pub struct DeliveryAgent {
    caller: ProviderCaller,
}

impl DeliveryAgent {
    pub fn new(caller: ProviderCaller) -> Self {
        Self { caller }
    }
}

impl Agent for DeliveryAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Delivery
    }

    fn execute(&self, inv: AgentInvocation) -> BoxFuture<'_, Result<AgentOutput>> {
        Box::pin(async move {
            let mut rec = StepRecorder::new(&inv.step_id);
            let messages: Vec<Value> = inv
                .input("messages")
                .and_then(|v| v.as_array())
                .cloned()
                .unwrap_or_default();

            let campaign_id = campaign_id(&messages);
            let mut sent_status = Vec::with_capacity(messages.len());
            for msg in &messages {
                let key = text(msg, &["key"]).unwrap_or_default();
                let Some(to) = text(msg, &["to", "email"]) else {
                    sent_status.push(status_entry(msg, &key, "", None, "skipped"));
                    continue;
                };

                let spec = CallSpec::new(to.clone()).body(json!({
                    "to": to,
                    "subject": msg.get("subject"),
                    "body": msg.get("body"),
                    "campaign_id": campaign_id,
                }));
                let (delivery_id, status) = self
                    .caller
                    .real_or_simulated(
                        &mut rec,
                        &inv.tools,
                        spec,
                        |v| text(v, &["id", "message_id", "delivery_id"]).map(|id| (id, "sent")),
                        || (simulate::short_id("sim", &format!("{}:{}", campaign_id, key)), "simulated"),
                    )
                    .await;
                sent_status.push(status_entry(msg, &key, &to, Some(delivery_id), status));
            }

            rec.intermediate(json!({ "campaign_id": campaign_id, "messages": sent_status.len() }));
            Ok(rec.finish(json!({
                "sent_status": sent_status,
                "campaign_id": campaign_id,
            })))
        })
    }
}

/// Stable id over the message keys, so reruns of the same batch share a campaign.
fn campaign_id(messages: &[Value]) -> String {
    let keys: Vec<String> = messages
        .iter()
        .map(|m| text(m, &["key", "to"]).unwrap_or_default())
        .collect();
    simulate::short_id("cmp", &keys.join("|"))
}

fn status_entry(msg: &Value, key: &str, to: &str, delivery_id: Option<String>, status: &str) -> Value {
    json!({
        "key": key,
        "to": to,
        "delivery_id": delivery_id,
        "status": status,
        "grade": msg.get("grade"),
        "score": msg.get("score"),
        "dominant_dimension": msg.get("dominant_dimension"),
    })
}
