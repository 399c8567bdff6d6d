use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use leadflow_core::event::{Event, EventKind};
use leadflow_core::types::{AgentKind, RunStatus, StepStatus};

/// Final state of one step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepReport {
    pub id: String,
    pub agent: AgentKind,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total_steps: usize,
    pub completed: usize,
    pub degraded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub api_calls: usize,
    pub api_successes: usize,
    pub api_errors: usize,
    /// Share of provider calls that succeeded; 0 when no call was made.
    pub success_rate: f64,
}

impl RunSummary {
    pub fn from_parts(steps: &[StepReport], events: &[Event]) -> Self {
        let count_status = |s: StepStatus| steps.iter().filter(|r| r.status == s).count();
        let count_kind = |k: EventKind| events.iter().filter(|e| e.kind == k).count();
        let api_calls = count_kind(EventKind::ApiCall);
        let api_successes = count_kind(EventKind::ApiSuccess);
        let success_rate = if api_calls == 0 {
            0.0
        } else {
            ((api_successes as f64 / api_calls as f64) * 1000.0).round() / 1000.0
        };
        Self {
            total_steps: steps.len(),
            completed: count_status(StepStatus::Completed),
            degraded: count_status(StepStatus::Degraded),
            failed: count_status(StepStatus::Failed),
            skipped: count_status(StepStatus::Skipped),
            api_calls,
            api_successes,
            api_errors: count_kind(EventKind::ApiError),
            success_rate,
        }
    }
}

/// JSON-serializable result of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub workflow_name: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    /// Steps in evaluation order.
    pub steps: Vec<StepReport>,
    pub events: Vec<Event>,
    pub summary: RunSummary,
}

impl RunReport {
    pub fn step(&self, id: &str) -> Option<&StepReport> {
        self.steps.iter().find(|s| s.id == id)
    }

    pub fn output(&self, id: &str) -> Option<&Value> {
        self.step(id).and_then(|s| s.output.as_ref())
    }

    pub fn status_of(&self, id: &str) -> Option<StepStatus> {
        self.step(id).map(|s| s.status)
    }

    pub fn events_of(&self, kind: EventKind) -> impl Iterator<Item = &Event> {
        self.events.iter().filter(move |e| e.kind == kind)
    }

    pub fn step_events<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a Event> {
        self.events
            .iter()
            .filter(move |e| e.step_id.as_deref() == Some(id))
    }

    /// One line per step, for terminal output.
    pub fn render_table(&self) -> String {
        let mut out = format!(
            "{} [{}] {:?} in {}ms\n",
            self.workflow_name, self.run_id, self.status, self.elapsed_ms
        );
        for step in &self.steps {
            out.push_str(&format!(
                "  {:<20} {:<24} {:<10} {:>6}ms",
                step.id,
                step.agent.as_str(),
                format!("{:?}", step.status).to_lowercase(),
                step.elapsed_ms
            ));
            if let Some(err) = &step.error {
                out.push_str(&format!("  {}", err));
            }
            out.push('\n');
        }
        let s = &self.summary;
        out.push_str(&format!(
            "  completed={} degraded={} failed={} skipped={} api_calls={} errors={} success_rate={:.3}\n",
            s.completed, s.degraded, s.failed, s.skipped, s.api_calls, s.api_errors, s.success_rate
        ));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn step(id: &str, status: StepStatus) -> StepReport {
        StepReport {
            id: id.into(),
            agent: AgentKind::Scoring,
            status,
            output: None,
            error: None,
            elapsed_ms: 1,
        }
    }

    #[test]
    fn test_summary_counts() {
        let steps = vec![
            step("a", StepStatus::Completed),
            step("b", StepStatus::Degraded),
            step("c", StepStatus::Failed),
            step("d", StepStatus::Skipped),
        ];
        let events = vec![
            Event::for_step("a", EventKind::ApiCall, json!({})),
            Event::for_step("a", EventKind::ApiSuccess, json!({})),
            Event::for_step("b", EventKind::ApiCall, json!({})),
            Event::for_step("b", EventKind::ApiError, json!({})),
            Event::for_step("b", EventKind::ApiCall, json!({})),
        ];
        let s = RunSummary::from_parts(&steps, &events);
        assert_eq!((s.completed, s.degraded, s.failed, s.skipped), (1, 1, 1, 1));
        assert_eq!((s.api_calls, s.api_successes, s.api_errors), (3, 1, 1));
        assert_eq!(s.success_rate, 0.333);
    }

    #[test]
    fn test_no_calls_means_zero_rate() {
        let s = RunSummary::from_parts(&[step("a", StepStatus::Completed)], &[]);
        assert_eq!(s.success_rate, 0.0);
        assert_eq!(s.total_steps, 1);
    }
}
