use std::collections::{BTreeMap, HashSet};

use futures::future::BoxFuture;
use serde_json::json;

use leadflow_core::error::Result;
use leadflow_core::traits::{Agent, AgentInvocation, AgentOutput};
use leadflow_core::types::{AgentKind, Record};

use super::records_input;
use crate::provider::StepRecorder;

/// Local cleanup before any paid enrichment: trims fields, lower-cases
/// emails and domains, derives missing domains and drops duplicates.
pub struct PreEnrichmentAgent;

impl Agent for PreEnrichmentAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::PreEnrichment
    }

    fn execute(&self, inv: AgentInvocation) -> BoxFuture<'_, Result<AgentOutput>> {
        Box::pin(async move {
            let mut rec = StepRecorder::new(&inv.step_id);
            let input = records_input(&inv, &["leads", "enriched_leads"]);
            let total = input.len();

            let mut seen = HashSet::new();
            let mut leads = Vec::with_capacity(total);
            for lead in input {
                let lead = normalize(lead);
                if seen.insert(lead.key()) {
                    leads.push(lead);
                }
            }

            let mut clusters: BTreeMap<String, Vec<String>> = BTreeMap::new();
            for lead in &leads {
                let signal = if lead.signal.is_empty() { "none" } else { lead.signal.as_str() };
                clusters.entry(signal.to_string()).or_default().push(lead.key());
            }

            let removed = total - leads.len();
            rec.intermediate(json!({ "input": total, "kept": leads.len(), "duplicates_removed": removed }));
            Ok(rec.finish(json!({
                "leads": Record::list_to_value(&leads),
                "clusters": clusters,
                "duplicates_removed": removed,
            })))
        })
    }
}

fn normalize(mut lead: Record) -> Record {
    lead.company = lead.company.trim().to_string();
    lead.contact_name = lead.contact_name.split_whitespace().collect::<Vec<_>>().join(" ");
    lead.email = lead.email.trim().to_lowercase();
    lead.emails = lead
        .emails
        .iter()
        .map(|e| e.trim().to_lowercase())
        .filter(|e| !e.is_empty())
        .collect();
    lead.role = lead.role.trim().to_string();
    lead.signal = lead.signal.trim().to_lowercase().replace([' ', '-'], "_");
    lead.domain = lead
        .domain
        .trim()
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_start_matches("www.")
        .trim_end_matches('/')
        .to_lowercase();
    if lead.domain.is_empty() {
        lead.domain = lead.email_domain().unwrap_or_default().to_string();
    }
    lead
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::testing::invocation;

    #[tokio::test]
    async fn normalizes_and_dedupes() {
        let inv = invocation(
            json!({"leads": [
                {"company": " Acme ", "contact": "Jo  Park", "email": "Jo@Acme.IO", "signal": "Recent Funding"},
                {"company": "Acme", "contact": "Jo Park", "email": "jo@acme.io"},
                {"company": "Beta", "contact": "Sam", "domain": "https://www.Beta.io/", "signal": "hiring"}
            ]}),
            vec![],
        );
        let out = PreEnrichmentAgent.execute(inv).await.unwrap();
        assert!(!out.degraded);
        let leads = Record::list_from_value(&out.output["leads"]);
        assert_eq!(leads.len(), 2);
        assert_eq!(leads[0].email, "jo@acme.io");
        assert_eq!(leads[0].domain, "acme.io");
        assert_eq!(leads[0].contact_name, "Jo Park");
        assert_eq!(leads[1].domain, "beta.io");
        assert_eq!(out.output["duplicates_removed"], 1);
        assert_eq!(out.output["clusters"]["recent_funding"][0], "jo@acme.io");
        assert_eq!(out.output["clusters"]["hiring"][0], "beta::sam");
    }
}
