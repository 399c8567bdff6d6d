use std::collections::{BTreeMap, HashMap};

use futures::future::BoxFuture;
use serde_json::{json, Value};
use tracing::debug;

use leadflow_core::config::ScoringConfig;
use leadflow_core::error::{LeadflowError, Result};
use leadflow_core::scoring::ScoringEngine;
use leadflow_core::traits::{Agent, AgentInvocation, AgentOutput};
use leadflow_core::types::{AgentKind, IntentSignal, Record};

use super::records_input;
use crate::provider::StepRecorder;

/// Scores and ranks records. Runs locally, never degraded.
pub struct ScoringAgent;

impl Agent for ScoringAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Scoring
    }

    fn execute(&self, inv: AgentInvocation) -> BoxFuture<'_, Result<AgentOutput>> {
        Box::pin(async move {
            let mut rec = StepRecorder::new(&inv.step_id);
            let scoring = effective_scoring(&inv)?;
            let engine = ScoringEngine::new(&scoring)?;

            let mut leads = records_input(&inv, &["enriched_leads", "leads", "verified_leads"]);
            let intents = intent_map(inv.input("intent_signals"));

            for lead in &mut leads {
                let domain = if lead.domain.is_empty() {
                    lead.email_domain().unwrap_or_default().to_lowercase()
                } else {
                    lead.domain.to_lowercase()
                };
                if let Some(signal) = intents.get(&domain) {
                    lead.intent = Some(signal.clone());
                }
                let result = engine.apply(lead);
                lead.extra.insert(
                    "score_breakdown".into(),
                    serde_json::to_value(&result.contributions)?,
                );
                debug!(step_id = %inv.step_id, key = %lead.key(), score = result.score, grade = %result.grade, "Scored");
            }

            // stable: equal scores keep input order
            leads.sort_by(|a, b| {
                b.score
                    .unwrap_or(0.0)
                    .total_cmp(&a.score.unwrap_or(0.0))
            });

            let mut distribution: BTreeMap<String, usize> = BTreeMap::new();
            for lead in &leads {
                if let Some(grade) = &lead.grade {
                    *distribution.entry(grade.clone()).or_default() += 1;
                }
            }

            rec.intermediate(json!({ "ranked": leads.len(), "grade_distribution": distribution }));
            Ok(rec.finish(json!({
                "ranked_leads": Record::list_to_value(&leads),
                "grade_distribution": distribution,
            })))
        })
    }
}

/// The run's scoring section, overlaid key by key with a `scoring` input.
fn effective_scoring(inv: &AgentInvocation) -> Result<ScoringConfig> {
    let Some(overlay) = inv
        .input("scoring")
        .or_else(|| inv.input("scoring_criteria"))
        .and_then(|v| v.as_object())
    else {
        return Ok(inv.config.scoring.clone());
    };
    let mut base = serde_json::to_value(&inv.config.scoring)?;
    if let Some(map) = base.as_object_mut() {
        for (k, v) in overlay {
            if !v.is_null() {
                map.insert(k.clone(), v.clone());
            }
        }
    }
    serde_json::from_value(base)
        .map_err(|e| LeadflowError::Config(format!("invalid scoring override: {}", e)))
}

fn intent_map(value: Option<&Value>) -> HashMap<String, IntentSignal> {
    value
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|v| serde_json::from_value::<IntentSignal>(v.clone()).ok())
                .filter(|s| !s.domain.is_empty())
                .map(|s| (s.domain.to_lowercase(), s))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::testing::invocation;

    #[tokio::test]
    async fn ranks_by_score_with_override() {
        let inv = invocation(
            json!({
                "enriched_leads": [
                    {"company": "Low", "email": "a@low.io", "title": "Analyst"},
                    {"company": "High", "email": "b@high.io", "title": "Sales Manager"}
                ],
                "intent_signals": [{"domain": "high.io", "intent_score": 1.0}],
                "scoring": {"weights": {"intent": 0.6, "role": 0.4}}
            }),
            vec![],
        );
        let out = ScoringAgent.execute(inv).await.unwrap();
        assert!(!out.degraded);
        let ranked = Record::list_from_value(&out.output["ranked_leads"]);
        assert_eq!(ranked[0].company, "High");
        assert_eq!(ranked[0].score, Some(80.0));
        assert_eq!(ranked[0].grade.as_deref(), Some("A"));
        assert_eq!(ranked[0].dominant_dimension.as_deref(), Some("intent_score"));
        assert_eq!(ranked[1].score, Some(10.0));
        assert_eq!(ranked[1].grade.as_deref(), Some("D"));
        assert_eq!(out.output["grade_distribution"]["A"], 1);
        assert_eq!(out.output["grade_distribution"]["D"], 1);
        assert_eq!(ranked[0].extra["score_breakdown"]["intent_score"], 60.0);
    }

    #[tokio::test]
    async fn invalid_override_fails_step() {
        let inv = invocation(
            json!({"leads": [], "scoring": {"weights": {"astrology": 1.0}}}),
            vec![],
        );
        assert!(ScoringAgent.execute(inv).await.is_err());
    }
}
