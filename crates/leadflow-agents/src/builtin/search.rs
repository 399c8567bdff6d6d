use futures::future::BoxFuture;
use serde_json::{json, Value};

use leadflow_core::error::Result;
use leadflow_core::traits::{Agent, AgentInvocation, AgentOutput};
use leadflow_core::types::{AgentKind, Record};

use super::{array_at, as_query, count_input, string_list};
use crate::provider::{CallSpec, ProviderCaller, StepRecorder};
use crate::simulate::{self, COMPANIES, FIRST_NAMES, LAST_NAMES, TECHNOLOGIES, TITLES};

const DEFAULT_TARGET: usize = 3;

/// Lead discovery. Declared tools are tried in order until `target_count`
/// records are collected; if none produce records the step simulates them.
pub struct SearchAgent {
    caller: ProviderCaller,
}

impl SearchAgent {
    pub fn new(caller: ProviderCaller) -> Self {
        Self { caller }
    }
}

impl Agent for SearchAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Search
    }

    fn execute(&self, inv: AgentInvocation) -> BoxFuture<'_, Result<AgentOutput>> {
        Box::pin(async move {
            let mut rec = StepRecorder::new(&inv.step_id);
            let icp = as_query(inv.input("icp"));
            let mut signals = string_list(inv.input("signals"));
            if signals.is_empty() {
                signals = vec!["recent_funding".into(), "hiring".into()];
            }
            let target = count_input(inv.input("target_count"), DEFAULT_TARGET);

            let mut leads: Vec<Record> = Vec::new();
            let spec_for = |remaining: usize| {
                CallSpec::new(format!("icp ({} wanted)", remaining))
                    .param("query", icp.clone())
                    .param("signals", signals.join(","))
                    .param("limit", remaining.to_string())
            };

            if inv.tools.is_empty() {
                // records nothing, just the reasoning event
                self.caller.first_real(&mut rec, &[], &spec_for(target)).await;
            }
            for tool in &inv.tools {
                if leads.len() >= target {
                    break;
                }
                let Some(response) = self
                    .caller
                    .call(&mut rec, tool, spec_for(target - leads.len()))
                    .await
                else {
                    continue;
                };
                let found = parse_leads(&response);
                rec.intermediate(json!({ "tool": tool.name, "found": found.len() }));
                for mut lead in found {
                    if leads.len() >= target {
                        break;
                    }
                    if lead.signal.is_empty() {
                        lead.signal = signals[leads.len() % signals.len()].clone();
                    }
                    if !leads.iter().any(|l| l.key() == lead.key()) {
                        leads.push(lead);
                    }
                }
            }

            if leads.is_empty() && target > 0 {
                rec.mark_degraded();
                rec.reasoning(format!("Simulating {} leads for the given profile", target));
                leads = simulated_leads(&icp, &signals, target);
            }

            rec.intermediate(json!({ "leads": leads.len(), "target": target }));
            Ok(rec.finish(json!({ "leads": Record::list_to_value(&leads) })))
        })
    }
}

fn parse_leads(response: &Value) -> Vec<Record> {
    array_at(response, &["leads", "people", "contacts", "results"])
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    let mut lead: Record = serde_json::from_value(item.clone()).ok()?;
                    if lead.contact_name.is_empty() {
                        lead.contact_name = super::text(item, &["name", "full_name"]).unwrap_or_default();
                    }
                    if lead.company.is_empty() {
                        lead.company = item
                            .get("organization")
                            .and_then(|o| super::text(o, &["name"]))
                            .unwrap_or_default();
                    }
                    if lead.domain.is_empty() {
                        lead.domain = lead.email_domain().unwrap_or_default().to_lowercase();
                    }
                    (!lead.company.is_empty() || !lead.primary_email().is_empty()).then_some(lead)
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Deterministic leads for a profile. Signals rotate by position.
pub fn simulated_leads(icp: &str, signals: &[String], count: usize) -> Vec<Record> {
    let seed = simulate::digest(icp) as usize;
    (0..count)
        .map(|i| {
            let company = COMPANIES[(seed + i) % COMPANIES.len()];
            let first = FIRST_NAMES[(seed / 7 + i) % FIRST_NAMES.len()];
            let last = LAST_NAMES[(seed / 13 + i * 3) % LAST_NAMES.len()];
            let domain = format!("{}.io", simulate::slug(company));
            let key = format!("{}:{}", icp, i);
            let tech_a = simulate::pick(&TECHNOLOGIES, "tech-a", &key);
            let tech_b = simulate::pick(&TECHNOLOGIES, "tech-b", &key);
            let mut technologies = vec![tech_a.to_string()];
            if tech_b != tech_a {
                technologies.push(tech_b.to_string());
            }
            Record {
                company: company.to_string(),
                contact_name: format!("{} {}", first, last),
                email: format!("{}.{}@{}", first.to_lowercase(), last.to_lowercase(), domain),
                domain,
                role: TITLES[i % TITLES.len()].to_string(),
                signal: signals
                    .get(i % signals.len().max(1))
                    .cloned()
                    .unwrap_or_default(),
                technologies,
                ..Default::default()
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::builtin::testing::{invocation, live_tool, offline_tool};
    use leadflow_core::event::EventKind;
    use leadflow_test_utils::MockTransport;

    #[tokio::test]
    async fn simulates_without_credentials() {
        let agent = SearchAgent::new(ProviderCaller::new(Arc::new(MockTransport::new())));
        let inv = invocation(
            json!({"icp": "B2B SaaS", "signals": ["recent_funding", "hiring"], "target_count": 3}),
            vec![offline_tool("clay"), offline_tool("apollo")],
        );
        let out = agent.execute(inv).await.unwrap();
        assert!(out.degraded);
        let leads = Record::list_from_value(&out.output["leads"]);
        assert_eq!(leads.len(), 3);
        assert_eq!(leads[0].signal, "recent_funding");
        assert_eq!(leads[1].signal, "hiring");
        assert_eq!(leads[2].signal, "recent_funding");
        assert!(leads[0].role.contains("Manager"));
        let reasoning = out.events.iter().filter(|e| e.kind == EventKind::Reasoning).count();
        assert!(reasoning >= 2);
        assert_eq!(leads, simulated_leads("B2B SaaS", &["recent_funding".into(), "hiring".into()], 3));
    }

    #[tokio::test]
    async fn tools_tried_in_order_until_target() {
        let transport = MockTransport::new()
            .respond("clay", json!({"leads": [
                {"company": "Acme", "contact": "Jo", "email": "jo@acme.io", "title": "CEO"}
            ]}))
            .respond("apollo", json!({"people": [
                {"name": "Sam Lee", "email": "sam@beta.io", "organization": {"name": "Beta"}},
                {"name": "Kim", "email": "kim@gamma.io", "organization": {"name": "Gamma"}}
            ]}));
        let transport = Arc::new(transport);
        let agent = SearchAgent::new(ProviderCaller::new(transport.clone()));
        let inv = invocation(
            json!({"icp": "fintech", "signals": ["hiring"], "target_count": 2}),
            vec![live_tool("clay"), live_tool("apollo")],
        );
        let out = agent.execute(inv).await.unwrap();
        assert!(!out.degraded);
        let leads = Record::list_from_value(&out.output["leads"]);
        assert_eq!(leads.len(), 2);
        assert_eq!(leads[0].company, "Acme");
        assert_eq!(leads[0].role, "CEO");
        assert_eq!(leads[1].company, "Beta");
        assert_eq!(leads[1].contact_name, "Sam Lee");
        assert_eq!(leads[1].domain, "beta.io");
        assert_eq!(leads[1].signal, "hiring");
        assert_eq!(transport.call_count(), 2);
    }

    #[tokio::test]
    async fn no_tools_still_produces_leads() {
        let agent = SearchAgent::new(ProviderCaller::new(Arc::new(MockTransport::new())));
        let out = agent
            .execute(invocation(json!({"target_count": "2"}), vec![]))
            .await
            .unwrap();
        assert!(out.degraded);
        assert_eq!(out.output["leads"].as_array().unwrap().len(), 2);
    }
}
