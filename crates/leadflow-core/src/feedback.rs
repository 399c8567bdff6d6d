use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{FeedbackConfig, ScoringConfig};
use crate::scoring::Dimension;

const EPSILON: f64 = 1e-9;

/// Engagement observed for one contacted record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignOutcome {
    #[serde(default, alias = "key")]
    pub record_key: String,
    #[serde(default)]
    pub grade: String,
    #[serde(default)]
    pub score: f64,
    /// Dominant scoring dimension at send time.
    #[serde(default)]
    pub dominant_dimension: Option<String>,
    #[serde(default = "default_sent")]
    pub sent: u32,
    #[serde(default)]
    pub opens: u32,
    #[serde(default)]
    pub clicks: u32,
    #[serde(default)]
    pub replies: u32,
}

fn default_sent() -> u32 {
    1
}

/// Aggregated rates over a group of outcomes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutcomeRates {
    pub samples: usize,
    pub open_rate: f64,
    pub click_rate: f64,
    pub reply_rate: f64,
    /// `reply_rate + 0.5 * click_rate`
    pub engagement: f64,
}

impl OutcomeRates {
    pub fn from_outcomes<'a>(outcomes: impl IntoIterator<Item = &'a CampaignOutcome>) -> Self {
        let (mut samples, mut sent, mut opens, mut clicks, mut replies) = (0usize, 0u64, 0u64, 0u64, 0u64);
        for o in outcomes {
            samples += 1;
            sent += u64::from(o.sent.max(1));
            opens += u64::from(o.opens);
            clicks += u64::from(o.clicks);
            replies += u64::from(o.replies);
        }
        if sent == 0 {
            return Self::default();
        }
        let sent = sent as f64;
        let click_rate = clicks as f64 / sent;
        let reply_rate = replies as f64 / sent;
        Self {
            samples,
            open_rate: opens as f64 / sent,
            click_rate,
            reply_rate,
            engagement: reply_rate + 0.5 * click_rate,
        }
    }
}

/// The metrics a proposal was derived from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedbackEvidence {
    pub overall: OutcomeRates,
    pub by_grade: BTreeMap<String, OutcomeRates>,
    pub by_dimension: BTreeMap<String, OutcomeRates>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    Pending,
    Approved,
    Rejected,
    AutoApplied,
}

impl ProposalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::AutoApplied => "auto_applied",
        }
    }
}

impl std::fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Proposed weight deltas plus the evidence behind them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackProposal {
    pub id: String,
    pub created_at: DateTime<Utc>,
    /// Canonical dimension name to weight delta.
    pub deltas: BTreeMap<String, f64>,
    pub evidence: FeedbackEvidence,
    pub status: ProposalStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl FeedbackProposal {
    /// True when no delta would change anything.
    pub fn is_noop(&self) -> bool {
        self.deltas.values().all(|d| d.abs() < EPSILON)
    }
}

/// Derive one delta per configured dimension from campaign outcomes.
pub fn analyze(
    outcomes: &[CampaignOutcome],
    scoring: &ScoringConfig,
    tuning: &FeedbackConfig,
) -> FeedbackProposal {
    let overall = OutcomeRates::from_outcomes(outcomes);

    let mut grade_groups: BTreeMap<String, Vec<&CampaignOutcome>> = BTreeMap::new();
    let mut dim_groups: BTreeMap<String, Vec<&CampaignOutcome>> = BTreeMap::new();
    for o in outcomes {
        let grade = if o.grade.is_empty() { "ungraded" } else { o.grade.as_str() };
        grade_groups.entry(grade.to_string()).or_default().push(o);
        if let Some(dim) = o.dominant_dimension.as_deref().and_then(Dimension::parse) {
            dim_groups.entry(dim.as_str().to_string()).or_default().push(o);
        }
    }
    let by_grade: BTreeMap<String, OutcomeRates> = grade_groups
        .into_iter()
        .map(|(g, os)| (g, OutcomeRates::from_outcomes(os)))
        .collect();
    let by_dimension: BTreeMap<String, OutcomeRates> = dim_groups
        .into_iter()
        .map(|(d, os)| (d, OutcomeRates::from_outcomes(os)))
        .collect();

    let (lo, hi) = tuning.weight_bounds;
    let mut deltas = BTreeMap::new();
    for (name, weight) in &scoring.weights {
        let Some(dim) = Dimension::parse(name) else {
            continue;
        };
        let raw = match by_dimension.get(dim.as_str()) {
            Some(rates) if rates.samples >= tuning.min_samples.max(1) => {
                if rates.engagement <= 0.0 {
                    -tuning.learning_rate
                } else {
                    tuning.learning_rate * (rates.engagement - overall.engagement)
                        / overall.engagement.max(EPSILON)
                }
            }
            _ => 0.0,
        };
        let capped = raw.clamp(-tuning.max_adjustment, tuning.max_adjustment);
        // only shrinks toward zero: never past the cap, never against the evidence
        let room_down = (lo - weight).min(0.0);
        let room_up = (hi - weight).max(0.0);
        let bounded = capped.clamp(room_down, room_up);
        deltas.insert(dim.as_str().to_string(), round6(bounded));
    }

    FeedbackProposal {
        id: uuid::Uuid::new_v4().to_string(),
        created_at: Utc::now(),
        deltas,
        evidence: FeedbackEvidence {
            overall,
            by_grade,
            by_dimension,
        },
        status: ProposalStatus::Pending,
        resolved_at: None,
    }
}

/// Apply deltas to existing dimensions only, keep the pre-merge total, clamp to bounds.
///
/// Clamping runs after the rescale, so a weight pinned at a bound leaves the
/// merged total off the pre-merge total. Bounds win.
pub fn merge(
    scoring: &ScoringConfig,
    deltas: &BTreeMap<String, f64>,
    bounds: (f64, f64),
) -> ScoringConfig {
    let (lo, hi) = bounds;
    let before: f64 = scoring.total_weight();

    let mut weights: BTreeMap<String, f64> = scoring
        .weights
        .iter()
        .map(|(name, w)| {
            let delta = Dimension::parse(name)
                .and_then(|d| deltas.get(d.as_str()))
                .copied()
                .unwrap_or(0.0);
            (name.clone(), (w + delta).max(0.0))
        })
        .collect();

    let after: f64 = weights.values().sum();
    if after > EPSILON && before > 0.0 {
        let factor = before / after;
        for w in weights.values_mut() {
            *w *= factor;
        }
    }
    for w in weights.values_mut() {
        *w = round6(*w).clamp(lo, hi);
    }
    let merged: f64 = weights.values().sum();
    if (merged - before).abs() > 1e-6 {
        debug!(before, merged, lo, hi, "Weight bounds changed the merged total");
    }

    ScoringConfig {
        weights,
        ..scoring.clone()
    }
}

fn round6(v: f64) -> f64 {
    (v * 1_000_000.0).round() / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(dim: &str, grade: &str, clicks: u32, replies: u32) -> CampaignOutcome {
        CampaignOutcome {
            record_key: format!("{}-{}-{}", dim, clicks, replies),
            grade: grade.into(),
            score: 70.0,
            dominant_dimension: Some(dim.into()),
            sent: 1,
            opens: 1,
            clicks,
            replies,
        }
    }

    fn scoring(weights: &[(&str, f64)]) -> ScoringConfig {
        ScoringConfig {
            weights: weights.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn engaged_dimension_grows_silent_one_shrinks() {
        let cfg = scoring(&[("intent", 0.5), ("tech", 0.5)]);
        let tuning = FeedbackConfig {
            min_samples: 2,
            ..Default::default()
        };
        let outcomes = vec![
            outcome("intent_score", "A", 1, 1),
            outcome("intent_score", "A", 0, 1),
            outcome("tech_stack_match", "C", 0, 0),
            outcome("tech_stack_match", "C", 0, 0),
        ];
        let p = analyze(&outcomes, &cfg, &tuning);
        assert!(p.deltas["intent_score"] > 0.0);
        assert_eq!(p.deltas["tech_stack_match"], -tuning.learning_rate);
        assert_eq!(p.status, ProposalStatus::Pending);
        assert_eq!(p.evidence.by_grade["A"].samples, 2);
        assert_eq!(p.evidence.by_grade["C"].reply_rate, 0.0);
    }

    #[test]
    fn thin_evidence_gives_zero_delta() {
        let cfg = scoring(&[("intent", 0.5), ("geo", 0.5)]);
        let outcomes = vec![outcome("intent_score", "A", 0, 0)];
        let p = analyze(&outcomes, &cfg, &FeedbackConfig::default());
        assert_eq!(p.deltas["intent_score"], 0.0);
        assert_eq!(p.deltas["geo_match"], 0.0);
        assert!(p.is_noop());
    }

    #[test]
    fn deltas_respect_max_adjustment_and_bounds() {
        let cfg = scoring(&[("intent", 0.98), ("tech", 0.02)]);
        let tuning = FeedbackConfig {
            learning_rate: 5.0,
            max_adjustment: 0.1,
            min_samples: 1,
            weight_bounds: (0.0, 1.0),
            ..Default::default()
        };
        let outcomes = vec![
            outcome("intent_score", "A", 0, 3),
            outcome("tech_stack_match", "D", 0, 0),
        ];
        let p = analyze(&outcomes, &cfg, &tuning);
        for (name, weight) in &cfg.weights {
            let dim = Dimension::parse(name).unwrap();
            let delta = p.deltas[dim.as_str()];
            assert!(delta.abs() <= 0.1 + 1e-12);
            let moved = weight + delta;
            assert!((0.0..=1.0).contains(&moved), "{} moved to {}", name, moved);
        }
        assert!((p.deltas["intent_score"] - 0.02).abs() < 1e-9);
        assert!((p.deltas["tech_stack_match"] + 0.02).abs() < 1e-9);
    }

    #[test]
    fn test_percent_scale_weights_move_by_the_cap() {
        let cfg = scoring(&[("intent", 60.0), ("role", 40.0)]);
        let tuning = FeedbackConfig {
            learning_rate: 0.5,
            max_adjustment: 0.1,
            min_samples: 1,
            weight_bounds: (0.0, 100.0),
            ..Default::default()
        };
        let outcomes = vec![
            outcome("intent_score", "A", 0, 1),
            outcome("role_seniority", "C", 0, 0),
        ];
        let p = analyze(&outcomes, &cfg, &tuning);
        assert_eq!(p.deltas["intent_score"], 0.1);
        assert_eq!(p.deltas["role_seniority"], -0.1);

        let merged = merge(&cfg, &p.deltas, tuning.weight_bounds);
        assert!((merged.weights["intent"] - 60.1).abs() < 1e-9);
        assert!((merged.weights["role"] - 39.9).abs() < 1e-9);
    }

    #[test]
    fn test_weight_outside_bounds_never_jumps() {
        // default bounds are [0, 1]; these weights never pass load validation
        let cfg = scoring(&[("intent", 60.0), ("role", 40.0)]);
        let tuning = FeedbackConfig {
            min_samples: 1,
            ..Default::default()
        };
        let outcomes = vec![
            outcome("intent_score", "A", 0, 1),
            outcome("role_seniority", "C", 0, 0),
        ];
        let p = analyze(&outcomes, &cfg, &tuning);
        assert_eq!(p.deltas["intent_score"], 0.0);
        assert_eq!(p.deltas["role_seniority"], -tuning.learning_rate);
        assert!(p.deltas.values().all(|d| d.abs() <= tuning.max_adjustment));
    }

    #[test]
    fn merge_keeps_dimension_count_and_total() {
        let cfg = scoring(&[("intent", 0.6), ("role", 0.4)]);
        let deltas = BTreeMap::from([
            ("intent_score".to_string(), 0.1),
            ("role_seniority".to_string(), -0.05),
            ("geo_match".to_string(), 0.3),
        ]);
        let merged = merge(&cfg, &deltas, (0.0, 1.0));
        assert_eq!(merged.weights.len(), 2);
        assert!(!merged.weights.contains_key("geo_match"));
        assert!((merged.total_weight() - 1.0).abs() < 1e-6);
        assert!(merged.weights["intent"] > 0.6);
        assert!(merged.weights["role"] < 0.4);
    }

    #[test]
    fn merge_clamps_to_bounds() {
        let cfg = scoring(&[("intent", 0.5), ("role", 0.5)]);
        let deltas = BTreeMap::from([("intent_score".to_string(), 0.5)]);
        let merged = merge(&cfg, &deltas, (0.1, 0.6));
        for w in merged.weights.values() {
            assert!((0.1..=0.6).contains(w));
        }
        // intent pinned at 0.6, role rescaled to 1/3: bounds win over the total
        assert!((merged.total_weight() - 0.933333).abs() < 1e-6);
    }

    #[test]
    fn rates_by_sent_count() {
        let o = CampaignOutcome {
            record_key: "k".into(),
            grade: "B".into(),
            score: 61.0,
            dominant_dimension: None,
            sent: 4,
            opens: 2,
            clicks: 2,
            replies: 1,
        };
        let r = OutcomeRates::from_outcomes([&o]);
        assert_eq!(r.open_rate, 0.5);
        assert_eq!(r.reply_rate, 0.25);
        assert_eq!(r.engagement, 0.5);
    }
}
