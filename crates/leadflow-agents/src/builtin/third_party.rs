use futures::future::BoxFuture;
use serde_json::{json, Value};

use leadflow_core::error::Result;
use leadflow_core::traits::{Agent, AgentInvocation, AgentOutput};
use leadflow_core::types::{AgentKind, Record};

use super::{records_input, string_list, text};
use crate::provider::{CallSpec, ProviderCaller, StepRecorder};
use crate::simulate::{self, LOCATIONS, TITLES};

#[derive(Debug, Clone, Default)]
struct ContactProfile {
    role: Option<String>,
    linkedin: Option<String>,
    location: Option<String>,
    emails: Vec<String>,
}

/// Person-level enrichment: title, LinkedIn profile, location and emails.
pub struct ThirdPartyEnrichmentAgent {
    caller: ProviderCaller,
}

impl ThirdPartyEnrichmentAgent {
    pub fn new(caller: ProviderCaller) -> Self {
        Self { caller }
    }
}

impl Agent for ThirdPartyEnrichmentAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::ThirdPartyEnrichment
    }

    fn execute(&self, inv: AgentInvocation) -> BoxFuture<'_, Result<AgentOutput>> {
        Box::pin(async move {
            let mut rec = StepRecorder::new(&inv.step_id);
            let mut leads = records_input(&inv, &["leads", "enriched_leads"]);

            for lead in &mut leads {
                let key = lead.key();
                let spec = CallSpec::new(key.clone())
                    .param("email", lead.primary_email())
                    .param("name", lead.contact_name.clone())
                    .param("company", lead.company.clone());
                let profile = self
                    .caller
                    .real_or_simulated(&mut rec, &inv.tools, spec, parse_contact, || {
                        simulated_contact(lead, &key)
                    })
                    .await;
                apply(lead, profile);
            }

            rec.intermediate(json!({ "contacts": leads.len() }));
            Ok(rec.finish(json!({ "enriched_leads": Record::list_to_value(&leads) })))
        })
    }
}

fn apply(lead: &mut Record, profile: ContactProfile) {
    if let Some(role) = profile.role {
        if lead.role.is_empty() {
            lead.role = role;
        }
    }
    if let Some(linkedin) = profile.linkedin {
        if lead.linkedin.is_empty() {
            lead.linkedin = linkedin;
        }
    }
    if lead.location.is_none() {
        lead.location = profile.location;
    }
    for email in profile.emails {
        let email = email.to_lowercase();
        if email != lead.email.to_lowercase() && !lead.emails.contains(&email) {
            lead.emails.push(email);
        }
    }
}

fn parse_contact(response: &Value) -> Option<ContactProfile> {
    let data = response
        .get("person")
        .or_else(|| response.get("data"))
        .unwrap_or(response);
    if !data.is_object() {
        return None;
    }
    let location = text(data, &["location"]).or_else(|| {
        let parts: Vec<String> = ["city", "country"]
            .iter()
            .filter_map(|k| text(data, &[*k]))
            .collect();
        (!parts.is_empty()).then(|| parts.join(", "))
    });
    let mut emails = string_list(data.get("emails"));
    if let Some(email) = text(data, &["email"]) {
        emails.push(email);
    }
    Some(ContactProfile {
        role: text(data, &["role", "title", "position"]),
        linkedin: text(data, &["linkedin", "linkedin_url"]),
        location,
        emails,
    })
}

fn simulated_contact(lead: &Record, key: &str) -> ContactProfile {
    let handle = if lead.contact_name.is_empty() {
        simulate::short_id("member", key)
    } else {
        format!("{}-{:04x}", simulate::slug(&lead.contact_name), simulate::digest(key) % 0x10000)
    };
    ContactProfile {
        role: Some(simulate::pick(&TITLES, "title", key).to_string()),
        linkedin: Some(format!("https://www.linkedin.com/in/{}", handle)),
        location: Some(simulate::pick(&LOCATIONS, "location", key).to_string()),
        emails: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::builtin::testing::{invocation, live_tool, offline_tool};
    use leadflow_test_utils::MockTransport;

    #[tokio::test]
    async fn real_profile_fills_gaps_only() {
        let transport = Arc::new(MockTransport::new().respond(
            "peopledata",
            json!({"person": {"title": "CTO", "linkedin_url": "https://linkedin.com/in/jo",
                              "city": "Austin", "country": "United States",
                              "emails": ["jo.park@acme.io", "JO@acme.io"]}}),
        ));
        let agent = ThirdPartyEnrichmentAgent::new(ProviderCaller::new(transport));
        let inv = invocation(
            json!({"leads": [{"company": "Acme", "contact": "Jo Park", "email": "jo@acme.io", "title": "VP Sales"}]}),
            vec![live_tool("peopledata")],
        );
        let out = agent.execute(inv).await.unwrap();
        let leads = Record::list_from_value(&out.output["enriched_leads"]);
        let lead = &leads[0];
        assert_eq!(lead.role, "VP Sales");
        assert_eq!(lead.linkedin, "https://linkedin.com/in/jo");
        assert_eq!(lead.location.as_deref(), Some("Austin, United States"));
        assert_eq!(lead.emails, vec!["jo.park@acme.io"]);
        assert!(!out.degraded);
    }

    #[tokio::test]
    async fn simulated_contact_has_profile() {
        let agent = ThirdPartyEnrichmentAgent::new(ProviderCaller::new(Arc::new(MockTransport::new())));
        let inv = invocation(
            json!({"leads": [{"company": "Acme", "contact": "Jo Park", "email": "jo@acme.io"}]}),
            vec![offline_tool("peopledata")],
        );
        let out = agent.execute(inv).await.unwrap();
        assert!(out.degraded);
        let leads = Record::list_from_value(&out.output["enriched_leads"]);
        let lead = &leads[0];
        assert!(lead.linkedin.starts_with("https://www.linkedin.com/in/jo-park-"));
        assert!(!lead.role.is_empty());
        assert!(lead.location.is_some());
    }
}
