use futures::future::BoxFuture;
use serde_json::{json, Value};

use leadflow_core::error::Result;
use leadflow_core::scoring::is_valid_email;
use leadflow_core::traits::{Agent, AgentInvocation, AgentOutput};
use leadflow_core::types::{AgentKind, Deliverability, Record};

use super::{bool_input, records_input, text};
use crate::provider::{CallSpec, ProviderCaller, StepRecorder};
use crate::simulate;

const FREE_PROVIDERS: [&str; 4] = ["gmail.com", "yahoo.com", "outlook.com", "hotmail.com"];

/// Deliverability check per email. Undeliverable and (by default)
/// free-provider addresses are dropped.
pub struct EmailVerificationAgent {
    caller: ProviderCaller,
}

impl EmailVerificationAgent {
    pub fn new(caller: ProviderCaller) -> Self {
        Self { caller }
    }
}

impl Agent for EmailVerificationAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::EmailVerification
    }

    fn execute(&self, inv: AgentInvocation) -> BoxFuture<'_, Result<AgentOutput>> {
        Box::pin(async move {
            let mut rec = StepRecorder::new(&inv.step_id);
            let leads = records_input(&inv, &["leads", "ranked_leads", "enriched_leads"]);
            let allow_free = bool_input(inv.input("allow_free_providers"), false);

            let mut verified = Vec::new();
            let mut dropped = Vec::new();
            for mut lead in leads {
                let email = lead.primary_email().to_lowercase();
                if email.is_empty() {
                    dropped.push(drop_entry(&lead, "no_email"));
                    continue;
                }
                let domain = lead.email_domain().unwrap_or_default().to_lowercase();
                if !allow_free && FREE_PROVIDERS.contains(&domain.as_str()) {
                    dropped.push(drop_entry(&lead, "free_provider"));
                    continue;
                }

                let spec = CallSpec::new(email.clone()).param("email", email.clone());
                let status = self
                    .caller
                    .real_or_simulated(&mut rec, &inv.tools, spec, parse_status, || simulated_status(&email))
                    .await;
                lead.deliverability = Some(status);
                if status == Deliverability::Undeliverable {
                    dropped.push(drop_entry(&lead, "undeliverable"));
                } else {
                    verified.push(lead);
                }
            }

            rec.intermediate(json!({ "verified": verified.len(), "dropped": dropped.len() }));
            Ok(rec.finish(json!({
                "verified_leads": Record::list_to_value(&verified),
                "dropped": dropped,
            })))
        })
    }
}

fn drop_entry(lead: &Record, reason: &str) -> Value {
    json!({ "key": lead.key(), "email": lead.primary_email(), "reason": reason })
}

fn parse_status(response: &Value) -> Option<Deliverability> {
    let data = response.get("data").unwrap_or(response);
    text(data, &["result", "status", "deliverability"]).map(|s| Deliverability::parse(&s))
}

fn simulated_status(email: &str) -> Deliverability {
    if !is_valid_email(email) {
        return Deliverability::Undeliverable;
    }
    match simulate::digest(email) % 10 {
        0 => Deliverability::Risky,
        9 => Deliverability::Undeliverable,
        _ => Deliverability::Deliverable,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::builtin::testing::{invocation, live_tool};
    use leadflow_test_utils::MockTransport;

    #[tokio::test]
    async fn drops_free_and_undeliverable() {
        let transport = Arc::new(
            MockTransport::new()
                .respond_for("hunter", "bad@acme.io", json!({"data": {"result": "undeliverable"}}))
                .respond("hunter", json!({"data": {"result": "deliverable"}})),
        );
        let agent = EmailVerificationAgent::new(ProviderCaller::new(transport));
        let inv = invocation(
            json!({"leads": [
                {"company": "Acme", "email": "jo@acme.io"},
                {"company": "Acme", "email": "bad@acme.io"},
                {"company": "Home", "email": "me@gmail.com"},
                {"company": "Ghost", "contact": "Nobody"}
            ]}),
            vec![live_tool("hunter")],
        );
        let out = agent.execute(inv).await.unwrap();
        let verified = Record::list_from_value(&out.output["verified_leads"]);
        assert_eq!(verified.len(), 1);
        assert_eq!(verified[0].deliverability, Some(Deliverability::Deliverable));
        let reasons: Vec<&str> = out.output["dropped"]
            .as_array()
            .unwrap()
            .iter()
            .map(|d| d["reason"].as_str().unwrap())
            .collect();
        assert_eq!(reasons, vec!["undeliverable", "free_provider", "no_email"]);
    }

    #[tokio::test]
    async fn free_providers_allowed_on_request() {
        let transport = Arc::new(MockTransport::new().respond("hunter", json!({"status": "valid"})));
        let agent = EmailVerificationAgent::new(ProviderCaller::new(transport));
        let inv = invocation(
            json!({"leads": [{"email": "me@gmail.com"}], "allow_free_providers": true}),
            vec![live_tool("hunter")],
        );
        let out = agent.execute(inv).await.unwrap();
        assert_eq!(out.output["verified_leads"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn malformed_addresses_never_simulate_deliverable() {
        assert_eq!(simulated_status("not-an-email"), Deliverability::Undeliverable);
    }
}
