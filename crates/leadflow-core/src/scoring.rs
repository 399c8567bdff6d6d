use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::{ScoringConfig, ScoringCriteria};
use crate::error::Result;
use crate::types::{Deliverability, Record};

/// A scoring dimension. Declaration order breaks ties for the dominant dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    TechStackMatch,
    RoleFunctionMatch,
    RoleSeniority,
    EmailValidity,
    Deliverability,
    IntentScore,
    DomainTraffic,
    NewsSentiment,
    IndustryMatch,
    CompanySizeFit,
    GeoMatch,
    SignalStrength,
    LinkedinPresence,
    DataCompleteness,
}

impl Dimension {
    pub const ALL: [Dimension; 14] = [
        Self::TechStackMatch,
        Self::RoleFunctionMatch,
        Self::RoleSeniority,
        Self::EmailValidity,
        Self::Deliverability,
        Self::IntentScore,
        Self::DomainTraffic,
        Self::NewsSentiment,
        Self::IndustryMatch,
        Self::CompanySizeFit,
        Self::GeoMatch,
        Self::SignalStrength,
        Self::LinkedinPresence,
        Self::DataCompleteness,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TechStackMatch => "tech_stack_match",
            Self::RoleFunctionMatch => "role_function_match",
            Self::RoleSeniority => "role_seniority",
            Self::EmailValidity => "email_validity",
            Self::Deliverability => "deliverability",
            Self::IntentScore => "intent_score",
            Self::DomainTraffic => "domain_traffic",
            Self::NewsSentiment => "news_sentiment",
            Self::IndustryMatch => "industry_match",
            Self::CompanySizeFit => "company_size_fit",
            Self::GeoMatch => "geo_match",
            Self::SignalStrength => "signal_strength",
            Self::LinkedinPresence => "linkedin_presence",
            Self::DataCompleteness => "data_completeness",
        }
    }

    /// Canonical name or one of the short aliases (`intent`, `role`, `tech`, ...).
    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim().to_lowercase();
        let dim = match name.as_str() {
            "tech_stack_match" | "tech" => Self::TechStackMatch,
            "role_function_match" | "function" => Self::RoleFunctionMatch,
            "role_seniority" | "role" | "seniority" => Self::RoleSeniority,
            "email_validity" | "email" => Self::EmailValidity,
            "deliverability" => Self::Deliverability,
            "intent_score" | "intent" => Self::IntentScore,
            "domain_traffic" | "traffic" => Self::DomainTraffic,
            "news_sentiment" | "news" => Self::NewsSentiment,
            "industry_match" | "industry" => Self::IndustryMatch,
            "company_size_fit" | "firmographic" | "size" => Self::CompanySizeFit,
            "geo_match" | "geo" => Self::GeoMatch,
            "signal_strength" | "signal" => Self::SignalStrength,
            "linkedin_presence" | "linkedin" => Self::LinkedinPresence,
            "data_completeness" | "completeness" => Self::DataCompleteness,
            _ => return None,
        };
        Some(dim)
    }

    /// Normalized sub-score in `[0, 1]`. Missing evidence scores zero.
    pub fn sub_score(&self, record: &Record, criteria: &ScoringCriteria) -> f64 {
        let raw = match self {
            Self::TechStackMatch => {
                let hit = record.technologies.iter().any(|t| {
                    criteria
                        .preferred_technologies
                        .iter()
                        .any(|p| p.eq_ignore_ascii_case(t.trim()))
                });
                flag(hit)
            }
            Self::RoleFunctionMatch => {
                let role = record.role.to_lowercase();
                let hit = if criteria.target_functions.is_empty() {
                    ["sales", "revenue"].iter().any(|f| role.contains(f))
                } else {
                    criteria
                        .target_functions
                        .iter()
                        .any(|f| !f.trim().is_empty() && role.contains(&f.trim().to_lowercase()))
                };
                flag(hit)
            }
            Self::RoleSeniority => seniority(&record.role),
            Self::EmailValidity => flag(is_valid_email(record.primary_email())),
            Self::Deliverability => match record.deliverability {
                Some(Deliverability::Deliverable) => 1.0,
                Some(Deliverability::Risky) => 0.5,
                _ => 0.0,
            },
            Self::IntentScore => record.intent.as_ref().map_or(0.0, |i| i.intent_score),
            Self::DomainTraffic => record.intent.as_ref().map_or(0.0, |i| i.traffic_score),
            Self::NewsSentiment => record.intent.as_ref().map_or(0.0, |i| i.news_sentiment),
            Self::IndustryMatch => {
                let hit = record.industry.as_deref().is_some_and(|ind| {
                    criteria
                        .icp
                        .industries
                        .iter()
                        .any(|i| i.eq_ignore_ascii_case(ind.trim()))
                });
                flag(hit)
            }
            Self::CompanySizeFit => match (criteria.icp.employee_range, record.employee_count) {
                (Some(range), Some(count)) => size_fit(range, count),
                _ => 0.0,
            },
            Self::GeoMatch => {
                let hit = record.location.as_deref().is_some_and(|loc| {
                    let loc = loc.to_lowercase();
                    criteria
                        .icp
                        .geographies
                        .iter()
                        .any(|g| !g.trim().is_empty() && loc.contains(&g.trim().to_lowercase()))
                });
                flag(hit)
            }
            Self::SignalStrength => signal_strength(&record.signal),
            Self::LinkedinPresence => flag(!record.linkedin.trim().is_empty()),
            Self::DataCompleteness => completeness(record),
        };
        clamp_unit(raw)
    }
}

fn flag(hit: bool) -> f64 {
    if hit {
        1.0
    } else {
        0.0
    }
}

fn clamp_unit(v: f64) -> f64 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 1.0)
    }
}

/// Categorical seniority table over the words of a job title.
pub fn seniority(role: &str) -> f64 {
    let lower = role.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    if words.is_empty() {
        return 0.0;
    }
    let has = |set: &[&str]| words.iter().any(|w| set.contains(w));

    let vice = has(&["vp", "svp", "evp", "vice"]);
    if has(&[
        "ceo", "cto", "cfo", "coo", "cmo", "cro", "cio", "chief", "founder", "cofounder", "owner",
    ]) || (!vice && has(&["president"]))
    {
        1.0
    } else if vice || has(&["head"]) {
        0.9
    } else if has(&["director"]) {
        0.75
    } else if has(&["manager", "lead", "mgr", "supervisor"]) {
        0.5
    } else {
        0.25
    }
}

/// `local@domain.tld` with no whitespace.
pub fn is_valid_email(email: &str) -> bool {
    let email = email.trim();
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}

fn size_fit((min, max): (u64, u64), count: u64) -> f64 {
    let (min, max) = (min.min(max) as f64, min.max(max) as f64);
    let n = count as f64;
    if n >= min && n <= max {
        1.0
    } else if n < min {
        n / min
    } else if max <= 0.0 {
        0.0
    } else {
        1.0 - (n - max) / max
    }
}

fn signal_strength(signal: &str) -> f64 {
    match signal.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
        "" => 0.0,
        "recent_funding" | "funding" => 1.0,
        "hiring" => 0.8,
        "leadership_change" => 0.7,
        _ => 0.4,
    }
}

fn completeness(record: &Record) -> f64 {
    let present = [
        !record.company.trim().is_empty(),
        !record.contact_name.trim().is_empty(),
        !record.primary_email().is_empty(),
        !record.domain.trim().is_empty(),
        !record.role.trim().is_empty(),
        !record.linkedin.trim().is_empty(),
        !record.technologies.is_empty(),
        record.industry.is_some(),
        record.employee_count.is_some(),
        record.location.is_some(),
    ];
    present.iter().filter(|p| **p).count() as f64 / present.len() as f64
}

/// Score, grade and per-dimension breakdown for one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    pub score: f64,
    pub grade: String,
    pub sub_scores: BTreeMap<String, f64>,
    /// Share of the final score each dimension contributed.
    pub contributions: BTreeMap<String, f64>,
    pub dominant_dimension: Option<String>,
}

/// Weighted fitness scoring over the configured dimensions.
#[derive(Debug, Clone)]
pub struct ScoringEngine {
    weights: Vec<(Dimension, f64)>,
    /// Sorted by cutoff, highest first.
    thresholds: Vec<(String, f64)>,
    floor_grade: String,
    max_score: f64,
    criteria: ScoringCriteria,
}

impl ScoringEngine {
    pub fn new(config: &ScoringConfig) -> Result<Self> {
        config.validate()?;
        let mut weights: Vec<(Dimension, f64)> = config
            .weights
            .iter()
            .filter_map(|(name, w)| Dimension::parse(name).map(|d| (d, *w)))
            .collect();
        weights.sort_by_key(|(d, _)| *d);

        let mut thresholds: Vec<(String, f64)> = config
            .thresholds
            .iter()
            .map(|(g, c)| (g.clone(), *c))
            .collect();
        thresholds.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        Ok(Self {
            weights,
            thresholds,
            floor_grade: config.floor_grade.clone(),
            max_score: config.max_score,
            criteria: config.criteria.clone(),
        })
    }

    pub fn dimensions(&self) -> impl Iterator<Item = Dimension> + '_ {
        self.weights.iter().map(|(d, _)| *d)
    }

    pub fn score(&self, record: &Record) -> ScoreResult {
        let subs: BTreeMap<Dimension, f64> = self
            .weights
            .iter()
            .map(|(d, _)| (*d, d.sub_score(record, &self.criteria)))
            .collect();
        self.score_subscores(&subs)
    }

    /// Combine precomputed sub-scores. Dimensions absent from `subs` score zero.
    pub fn score_subscores(&self, subs: &BTreeMap<Dimension, f64>) -> ScoreResult {
        let total: f64 = self.weights.iter().map(|(_, w)| w).sum();
        let mut sub_scores = BTreeMap::new();
        let mut contributions = BTreeMap::new();
        let mut dominant: Option<(Dimension, f64)> = None;
        let mut weighted = 0.0;

        for (dim, weight) in &self.weights {
            let s = clamp_unit(subs.get(dim).copied().unwrap_or(0.0));
            weighted += weight * s;
            let contribution = if total > 0.0 {
                self.max_score * weight * s / total
            } else {
                0.0
            };
            sub_scores.insert(dim.as_str().to_string(), s);
            contributions.insert(dim.as_str().to_string(), round3(contribution));
            // strict comparison keeps the earliest dimension on ties
            if contribution > 0.0 && dominant.map_or(true, |(_, best)| contribution > best) {
                dominant = Some((*dim, contribution));
            }
        }

        let raw = if total > 0.0 {
            self.max_score * weighted / total
        } else {
            0.0
        };
        let score = round3(raw.clamp(0.0, self.max_score));

        ScoreResult {
            score,
            grade: self.grade(score),
            sub_scores,
            contributions,
            dominant_dimension: dominant.map(|(d, _)| d.as_str().to_string()),
        }
    }

    /// First grade whose cutoff is at or below `score`.
    pub fn grade(&self, score: f64) -> String {
        grade_for(score, &self.thresholds, &self.floor_grade)
    }

    /// Score a record and write score, grade and dominant dimension onto it.
    pub fn apply(&self, record: &mut Record) -> ScoreResult {
        let result = self.score(record);
        record.score = Some(result.score);
        record.grade = Some(result.grade.clone());
        record.dominant_dimension = result.dominant_dimension.clone();
        result
    }
}

/// Grade lookup over thresholds sorted descending by cutoff.
pub fn grade_for(score: f64, thresholds: &[(String, f64)], floor: &str) -> String {
    thresholds
        .iter()
        .find(|(_, cutoff)| score >= *cutoff)
        .map(|(g, _)| g.clone())
        .unwrap_or_else(|| floor.to_string())
}

pub fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}
