use futures::future::BoxFuture;
use serde_json::{json, Value};

use leadflow_core::config::ConfigTree;
use leadflow_core::error::Result;
use leadflow_core::traits::{Agent, AgentInvocation, AgentOutput};
use leadflow_core::types::{AgentKind, Record};

use super::{as_query, records_input, text};
use crate::provider::{CallSpec, ProviderCaller, StepRecorder};

struct Draft {
    subject: String,
    body: String,
}

/// Personalized outreach copy per ranked record.
pub struct ContentGenerationAgent {
    caller: ProviderCaller,
}

impl ContentGenerationAgent {
    pub fn new(caller: ProviderCaller) -> Self {
        Self { caller }
    }
}

impl Agent for ContentGenerationAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::ContentGeneration
    }

    fn execute(&self, inv: AgentInvocation) -> BoxFuture<'_, Result<AgentOutput>> {
        Box::pin(async move {
            let mut rec = StepRecorder::new(&inv.step_id);
            let leads = records_input(&inv, &["ranked_leads", "verified_leads", "leads"]);
            let persona = non_empty(as_query(inv.input("persona")), "SDR");
            let tone = non_empty(as_query(inv.input("tone")), "friendly");
            let min_grade = inv.input("min_grade").and_then(|v| v.as_str()).map(String::from);

            let mut messages = Vec::new();
            let mut skipped = 0usize;
            for lead in &leads {
                if let Some(min) = &min_grade {
                    if !meets_grade(&inv.config, lead.grade.as_deref(), min) {
                        skipped += 1;
                        continue;
                    }
                }
                let body = json!({
                    "model": inv.config.model.name,
                    "temperature": inv.config.model.temperature,
                    "max_tokens": inv.config.model.max_tokens,
                    "persona": persona,
                    "tone": tone,
                    "contact": lead.contact_name,
                    "company": lead.company,
                    "role": lead.role,
                    "signal": lead.signal,
                });
                let spec = CallSpec::new(lead.key()).body(body);
                let draft = self
                    .caller
                    .real_or_simulated(&mut rec, &inv.tools, spec, parse_draft, || {
                        simulated_draft(lead, &persona, &tone)
                    })
                    .await;
                messages.push(json!({
                    "key": lead.key(),
                    "to": lead.primary_email(),
                    "contact": lead.contact_name,
                    "company": lead.company,
                    "subject": draft.subject,
                    "body": draft.body,
                    "grade": lead.grade,
                    "score": lead.score,
                    "dominant_dimension": lead.dominant_dimension,
                }));
            }

            rec.intermediate(json!({ "messages": messages.len(), "below_min_grade": skipped }));
            Ok(rec.finish(json!({ "messages": messages })))
        })
    }
}

fn non_empty(s: String, default: &str) -> String {
    if s.trim().is_empty() {
        default.to_string()
    } else {
        s
    }
}

/// Grades rank by descending cutoff with the floor grade last.
fn meets_grade(config: &ConfigTree, grade: Option<&str>, min: &str) -> bool {
    let mut order: Vec<(&String, f64)> = config
        .scoring
        .thresholds
        .iter()
        .map(|(g, c)| (g, *c))
        .collect();
    order.sort_by(|a, b| b.1.total_cmp(&a.1));
    let rank = |g: &str| {
        order
            .iter()
            .position(|(name, _)| name.as_str() == g)
            .or_else(|| (g == config.scoring.floor_grade).then_some(order.len()))
    };
    match (grade.and_then(rank), rank(min)) {
        (Some(have), Some(need)) => have <= need,
        _ => false,
    }
}

fn parse_draft(response: &Value) -> Option<Draft> {
    let content = text(response, &["body", "content", "text"]).or_else(|| {
        response
            .pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .map(String::from)
    })?;
    Some(Draft {
        subject: text(response, &["subject"]).unwrap_or_else(|| "Quick question".to_string()),
        body: content,
    })
}

fn simulated_draft(lead: &Record, persona: &str, tone: &str) -> Draft {
    let first = lead.contact_name.split_whitespace().next().unwrap_or("there");
    let company = if lead.company.is_empty() { "your team" } else { lead.company.as_str() };
    let hook = match lead.signal.as_str() {
        "recent_funding" => format!("Congrats on the recent funding at {}.", company),
        "hiring" => format!("Saw that {} is hiring.", company),
        "leadership_change" => format!("Noticed the leadership changes at {}.", company),
        _ => format!("I have been following {}.", company),
    };
    Draft {
        subject: format!("Quick idea for {}", company),
        body: format!(
            "Hi {},\n\n{} Teams like yours use us to cut prospecting time in half. \
             Open to a short call next week?\n\n-- your {} ({})",
            first, hook, persona, tone
        ),
    }
}
