use std::collections::BTreeMap;

use futures::future::BoxFuture;
use serde_json::{json, Value};

use leadflow_core::error::Result;
use leadflow_core::traits::{Agent, AgentInvocation, AgentOutput};
use leadflow_core::types::{AgentKind, Record};

use super::{records_input, text};
use crate::provider::{CallSpec, ProviderCaller, StepRecorder};
use crate::simulate::{self, INDUSTRIES, TECHNOLOGIES};

/// Company-level data for one domain.
#[derive(Debug, Clone, Default, PartialEq)]
struct DomainProfile {
    company: Option<String>,
    technologies: Vec<String>,
    industry: Option<String>,
    employee_count: Option<u64>,
}

/// Domain enrichment: technologies, industry and headcount per company.
pub struct EnrichmentAgent {
    caller: ProviderCaller,
}

impl EnrichmentAgent {
    pub fn new(caller: ProviderCaller) -> Self {
        Self { caller }
    }
}

impl Agent for EnrichmentAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Enrichment
    }

    fn execute(&self, inv: AgentInvocation) -> BoxFuture<'_, Result<AgentOutput>> {
        Box::pin(async move {
            let mut rec = StepRecorder::new(&inv.step_id);
            let mut leads = records_input(&inv, &["leads", "enriched_leads"]);

            let mut profiles: BTreeMap<String, DomainProfile> = BTreeMap::new();
            for lead in &leads {
                let domain = lead_domain(lead);
                if domain.is_empty() || profiles.contains_key(&domain) {
                    continue;
                }
                let spec = CallSpec::new(domain.clone()).param("domain", domain.clone());
                let profile = self
                    .caller
                    .real_or_simulated(&mut rec, &inv.tools, spec, parse_profile, || simulated_profile(&domain))
                    .await;
                profiles.insert(domain, profile);
            }

            for lead in &mut leads {
                if let Some(profile) = profiles.get(&lead_domain(lead)) {
                    merge(lead, profile);
                }
            }

            rec.intermediate(json!({ "domains": profiles.len(), "leads": leads.len() }));
            Ok(rec.finish(json!({ "enriched_leads": Record::list_to_value(&leads) })))
        })
    }
}

fn lead_domain(lead: &Record) -> String {
    if lead.domain.is_empty() {
        lead.email_domain().unwrap_or_default().to_lowercase()
    } else {
        lead.domain.to_lowercase()
    }
}

fn merge(lead: &mut Record, profile: &DomainProfile) {
    if lead.company.is_empty() {
        if let Some(company) = &profile.company {
            lead.company = company.clone();
        }
    }
    for tech in &profile.technologies {
        if !lead.technologies.iter().any(|t| t.eq_ignore_ascii_case(tech)) {
            lead.technologies.push(tech.clone());
        }
    }
    if lead.industry.is_none() {
        lead.industry = profile.industry.clone();
    }
    if lead.employee_count.is_none() {
        lead.employee_count = profile.employee_count;
    }
}

fn parse_profile(response: &Value) -> Option<DomainProfile> {
    let data = response.get("data").unwrap_or(response);
    if !data.is_object() {
        return None;
    }
    let technologies = data
        .get("technologies")
        .or_else(|| data.get("tech"))
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|t| match t {
                    Value::String(s) => Some(s.clone()),
                    other => text(other, &["name"]),
                })
                .collect()
        })
        .unwrap_or_default();
    let employee_count = ["employee_count", "employees", "estimated_num_employees"]
        .iter()
        .find_map(|k| data.get(*k).and_then(|v| v.as_u64()))
        .or_else(|| data.pointer("/metrics/employees").and_then(|v| v.as_u64()));

    Some(DomainProfile {
        company: text(data, &["company", "name", "organization"]),
        technologies,
        industry: text(data, &["industry", "category"]),
        employee_count,
    })
}

fn simulated_profile(domain: &str) -> DomainProfile {
    let first = simulate::pick(&TECHNOLOGIES, "stack-1", domain);
    let second = simulate::pick(&TECHNOLOGIES, "stack-2", domain);
    let mut technologies = vec![first.to_string()];
    if second != first {
        technologies.push(second.to_string());
    }
    DomainProfile {
        company: None,
        technologies,
        industry: Some(simulate::pick(&INDUSTRIES, "industry", domain).to_string()),
        employee_count: Some(20 + simulate::digest(domain) % 480),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::builtin::testing::{invocation, live_tool, offline_tool};
    use leadflow_test_utils::MockTransport;

    fn leads() -> Value {
        json!({"leads": [
            {"company": "Acme", "email": "jo@acme.io", "technologies": ["Stripe"]},
            {"company": "Acme", "email": "kim@acme.io"},
            {"company": "Beta", "domain": "beta.io"}
        ]})
    }

    #[tokio::test]
    async fn one_call_per_domain() {
        let transport = Arc::new(MockTransport::new().respond(
            "builtwith",
            json!({"data": {"technologies": [{"name": "Salesforce"}, "Stripe"], "industry": "SaaS", "employees": 120}}),
        ));
        let agent = EnrichmentAgent::new(ProviderCaller::new(transport.clone()));
        let out = agent.execute(invocation(leads(), vec![live_tool("builtwith")])).await.unwrap();
        assert!(!out.degraded);
        assert_eq!(transport.call_count(), 2);

        let enriched = Record::list_from_value(&out.output["enriched_leads"]);
        assert_eq!(enriched.len(), 3);
        assert_eq!(enriched[0].technologies, vec!["Stripe", "Salesforce"]);
        assert_eq!(enriched[0].industry.as_deref(), Some("SaaS"));
        assert_eq!(enriched[1].employee_count, Some(120));
    }

    #[tokio::test]
    async fn simulated_profile_is_deterministic() {
        let agent = EnrichmentAgent::new(ProviderCaller::new(Arc::new(MockTransport::new())));
        let a = agent.execute(invocation(leads(), vec![offline_tool("builtwith")])).await.unwrap();
        let b = agent.execute(invocation(leads(), vec![offline_tool("builtwith")])).await.unwrap();
        assert!(a.degraded);
        assert_eq!(a.output, b.output);
        let enriched = Record::list_from_value(&a.output["enriched_leads"]);
        assert!(enriched.iter().all(|l| l.industry.is_some() && l.employee_count.is_some()));
    }
}
