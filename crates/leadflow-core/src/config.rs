use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{LeadflowError, Result};
use crate::scoring::Dimension;
use crate::types::AgentKind;

/// A parsed pipeline document: configuration plus the ordered step list.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineDocument {
    pub workflow_name: String,
    pub config: ConfigTree,
    pub steps: Vec<StepDefinition>,
}

/// Source format of a pipeline document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Toml,
    Json,
}

impl DocumentFormat {
    /// `.json` selects JSON, everything else TOML.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Toml,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawDocument {
    #[serde(default = "default_workflow_name")]
    workflow_name: String,
    #[serde(default)]
    config: ConfigTree,
    #[serde(default)]
    steps: Vec<RawStep>,
}

#[derive(Debug, Deserialize)]
struct RawStep {
    id: String,
    #[serde(alias = "agent_type", alias = "type")]
    agent: String,
    #[serde(default, alias = "input")]
    inputs: Value,
    #[serde(default)]
    tools: Vec<ToolConfig>,
    #[serde(default, alias = "output")]
    output_schema: Option<Value>,
    #[serde(default)]
    required_inputs: Vec<String>,
    #[serde(default)]
    critical: bool,
    #[serde(default)]
    depends_on: Vec<String>,
}

impl PipelineDocument {
    /// Load a document from disk. `${VAR}` patterns are expanded in TOML files.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| LeadflowError::ConfigNotFound(path.display().to_string()))?;
        let doc = Self::parse(&content, DocumentFormat::from_path(path))?;
        tracing::debug!(
            path = %path.display(),
            workflow = %doc.workflow_name,
            steps = doc.steps.len(),
            "Loaded pipeline document"
        );
        Ok(doc)
    }

    pub fn parse(content: &str, format: DocumentFormat) -> Result<Self> {
        let raw: RawDocument = match format {
            DocumentFormat::Toml => {
                let expanded = expand_env_vars(content);
                toml::from_str(&expanded).map_err(|e| LeadflowError::Config(e.to_string()))?
            }
            DocumentFormat::Json => {
                serde_json::from_str(content).map_err(|e| LeadflowError::Config(e.to_string()))?
            }
        };

        let steps = raw
            .steps
            .into_iter()
            .map(StepDefinition::try_from)
            .collect::<Result<Vec<_>>>()?;

        let doc = Self {
            workflow_name: raw.workflow_name,
            config: raw.config,
            steps,
        };
        doc.validate()?;
        Ok(doc)
    }

    /// Structural checks that must pass before any step runs.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for step in &self.steps {
            if step.id.trim().is_empty() {
                return Err(LeadflowError::Config("step with empty id".into()));
            }
            if !seen.insert(step.id.as_str()) {
                return Err(LeadflowError::DuplicateStepId(step.id.clone()));
            }
        }
        for step in &self.steps {
            for dep in &step.depends_on {
                if !seen.contains(dep.as_str()) {
                    return Err(LeadflowError::UnknownDependency {
                        step: step.id.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }
        self.config.validate()
    }

    pub fn step(&self, id: &str) -> Option<&StepDefinition> {
        self.steps.iter().find(|s| s.id == id)
    }
}

/// One declared unit of work, bound to a single agent variant.
#[derive(Debug, Clone, Serialize)]
pub struct StepDefinition {
    pub id: String,
    pub agent: AgentKind,
    /// Input template; string leaves may carry `{{...}}` references.
    pub inputs: Value,
    pub tools: Vec<ToolConfig>,
    /// Advisory only; never enforced.
    pub output_schema: Option<Value>,
    /// Input field paths (e.g. `leads` or `scoring.weights`) that must resolve.
    pub required_inputs: Vec<String>,
    pub critical: bool,
    /// Ordering-only predecessors.
    pub depends_on: Vec<String>,
}

impl TryFrom<RawStep> for StepDefinition {
    type Error = LeadflowError;

    fn try_from(raw: RawStep) -> Result<Self> {
        Ok(Self {
            agent: raw.agent.parse()?,
            id: raw.id,
            inputs: raw.inputs,
            tools: raw.tools,
            output_schema: raw.output_schema,
            required_inputs: raw.required_inputs,
            critical: raw.critical,
            depends_on: raw.depends_on,
        })
    }
}

/// HTTP verb used by the default transport.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
}

/// A provider declared on a step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolConfig {
    pub name: String,
    #[serde(default)]
    pub endpoint: String,
    /// Environment variable holding the credential.
    #[serde(default, alias = "credential_key", alias = "api_key_env")]
    pub credential: Option<String>,
    /// Credential template, typically `{{SOME_API_KEY}}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_credential_param")]
    pub credential_param: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub method: HttpMethod,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

fn default_credential_param() -> String {
    "api_key".to_string()
}
fn default_workflow_name() -> String {
    "workflow".to_string()
}

/// A tool with its credential looked up and templates resolved.
#[derive(Clone)]
pub struct ResolvedTool {
    pub name: String,
    pub endpoint: String,
    /// Environment key the credential was looked up under, if declared.
    pub credential_key: Option<String>,
    pub credential: Option<String>,
    pub credential_param: String,
    pub timeout_secs: u64,
    pub method: HttpMethod,
    pub params: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ResolvedTool {
    /// Event-safe view: the credential is reduced to presence and length.
    pub fn redacted(&self) -> Value {
        serde_json::json!({
            "name": self.name,
            "endpoint": self.endpoint,
            "credential_key": self.credential_key,
            "credential": self.credential.as_ref().map(|c| format!("***({} chars)", c.len())),
            "timeout_secs": self.timeout_secs,
        })
    }
}

impl std::fmt::Debug for ResolvedTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedTool")
            .field("name", &self.name)
            .field("endpoint", &self.endpoint)
            .field("credential", &self.credential.as_ref().map(|_| "***"))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// The `config` section of a pipeline document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigTree {
    #[serde(default)]
    pub env: EnvRequirements,
    #[serde(default)]
    pub model: ModelSettings,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub features: FeatureFlags,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub feedback: FeedbackConfig,
    /// Keys this crate does not interpret, still addressable by `{{config.*}}`.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl ConfigTree {
    /// JSON view used for `{{config.path}}` lookups.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Copy of this tree with the scoring section replaced.
    pub fn with_scoring(&self, scoring: ScoringConfig) -> Self {
        Self {
            scoring,
            ..self.clone()
        }
    }

    pub fn is_required_credential(&self, key: &str) -> bool {
        self.env.required.iter().any(|k| k == key)
    }

    /// Scoring and feedback sections, plus every weight inside the feedback bounds.
    pub fn validate(&self) -> Result<()> {
        self.scoring.validate()?;
        self.feedback.validate()?;
        let (lo, hi) = self.feedback.weight_bounds;
        for (name, weight) in &self.scoring.weights {
            if *weight < lo || *weight > hi {
                return Err(LeadflowError::Config(format!(
                    "weight for '{}' is {}, outside feedback.weight_bounds [{}, {}]",
                    name, weight, lo, hi
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvRequirements {
    #[serde(default)]
    pub required: Vec<String>,
    #[serde(default)]
    pub optional: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_from: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSettings {
    #[serde(default = "default_model_provider")]
    pub provider: String,
    #[serde(default = "default_model_name", alias = "model_id")]
    pub name: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            provider: default_model_provider(),
            name: default_model_name(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_model_provider() -> String {
    "openai".to_string()
}
fn default_model_name() -> String {
    "gpt-4o-mini".to_string()
}
fn default_temperature() -> f64 {
    0.7
}
fn default_max_tokens() -> u32 {
    512
}

/// Weights, grade cutoffs and matching criteria for the ScoringEngine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Dimension name (or alias) to weight.
    #[serde(default = "default_weights")]
    pub weights: BTreeMap<String, f64>,
    /// Grade to inclusive lower cutoff.
    #[serde(default = "default_thresholds")]
    pub thresholds: BTreeMap<String, f64>,
    #[serde(default)]
    pub criteria: ScoringCriteria,
    #[serde(default = "default_floor_grade")]
    pub floor_grade: String,
    #[serde(default = "default_max_score")]
    pub max_score: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: default_weights(),
            thresholds: default_thresholds(),
            criteria: ScoringCriteria::default(),
            floor_grade: default_floor_grade(),
            max_score: default_max_score(),
        }
    }
}

impl ScoringConfig {
    /// Every weight key must name a known dimension, once.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for (name, weight) in &self.weights {
            let dim = Dimension::parse(name).ok_or_else(|| {
                LeadflowError::Config(format!("unknown scoring dimension '{}'", name))
            })?;
            if !seen.insert(dim) {
                return Err(LeadflowError::Config(format!(
                    "scoring dimension '{}' configured twice",
                    dim.as_str()
                )));
            }
            if !weight.is_finite() || *weight < 0.0 {
                return Err(LeadflowError::Config(format!(
                    "weight for '{}' must be a non-negative number",
                    name
                )));
            }
        }
        if self.max_score <= 0.0 {
            return Err(LeadflowError::Config("max_score must be positive".into()));
        }
        Ok(())
    }

    pub fn total_weight(&self) -> f64 {
        self.weights.values().sum()
    }
}

fn default_weights() -> BTreeMap<String, f64> {
    [
        ("tech_stack_match", 0.25),
        ("role_function_match", 0.2),
        ("email_validity", 0.15),
        ("intent_score", 0.2),
        ("domain_traffic", 0.1),
        ("news_sentiment", 0.1),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}
fn default_thresholds() -> BTreeMap<String, f64> {
    [("A", 80.0), ("B", 60.0), ("C", 40.0)]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}
fn default_floor_grade() -> String {
    "D".to_string()
}
fn default_max_score() -> f64 {
    100.0
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoringCriteria {
    #[serde(default, alias = "tech_stack_preferred")]
    pub preferred_technologies: Vec<String>,
    #[serde(default)]
    pub target_functions: Vec<String>,
    #[serde(default)]
    pub icp: IcpCriteria,
}

/// Ideal customer profile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IcpCriteria {
    #[serde(default)]
    pub industries: Vec<String>,
    /// Inclusive `[min, max]` employee count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub employee_range: Option<(u64, u64)>,
    #[serde(default)]
    pub geographies: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeatureFlags {
    #[serde(default)]
    pub auto_apply_feedback: bool,
    #[serde(default)]
    pub parallel_branches: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GraphMode {
    /// Document order chains every step after its predecessor.
    #[default]
    Linear,
    /// Only data and explicit edges order steps.
    Dag,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputFailurePolicy {
    #[default]
    Halt,
    SkipBranch,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    #[serde(default)]
    pub graph_mode: GraphMode,
    #[serde(default)]
    pub on_input_failure: InputFailurePolicy,
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            graph_mode: GraphMode::default(),
            on_input_failure: InputFailurePolicy::default(),
            default_timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackConfig {
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    #[serde(default = "default_max_adjustment")]
    pub max_adjustment: f64,
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,
    /// Inclusive `[min, max]` for every weight.
    #[serde(default = "default_weight_bounds")]
    pub weight_bounds: (f64, f64),
    #[serde(default = "default_state_dir")]
    pub state_dir: String,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            learning_rate: default_learning_rate(),
            max_adjustment: default_max_adjustment(),
            min_samples: default_min_samples(),
            weight_bounds: default_weight_bounds(),
            state_dir: default_state_dir(),
        }
    }
}

impl FeedbackConfig {
    pub fn validate(&self) -> Result<()> {
        let (lo, hi) = self.weight_bounds;
        if !lo.is_finite() || !hi.is_finite() || lo < 0.0 || lo > hi {
            return Err(LeadflowError::Config(format!(
                "feedback.weight_bounds must be finite with 0 <= min <= max, got [{}, {}]",
                lo, hi
            )));
        }
        if !self.max_adjustment.is_finite() || self.max_adjustment < 0.0 {
            return Err(LeadflowError::Config(
                "feedback.max_adjustment must be a non-negative number".into(),
            ));
        }
        if !self.learning_rate.is_finite() || self.learning_rate < 0.0 {
            return Err(LeadflowError::Config(
                "feedback.learning_rate must be a non-negative number".into(),
            ));
        }
        Ok(())
    }
}

fn default_learning_rate() -> f64 {
    0.05
}
fn default_max_adjustment() -> f64 {
    0.1
}
fn default_min_samples() -> usize {
    3
}
fn default_weight_bounds() -> (f64, f64) {
    (0.0, 1.0)
}
fn default_state_dir() -> String {
    ".leadflow".to_string()
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                // Unset variables stay literal.
                Err(_) => result.push_str(&format!("${{{}}}", var_name)),
            }
        } else {
            result.push(c);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
workflow_name = "minimal"

[[steps]]
id = "search"
agent = "ProspectSearchAgent"

[steps.inputs]
target_count = 3
"#;

    #[test]
    fn test_expand_env_vars() {
        std::env::set_var("TEST_LEADFLOW_VAR", "hello");
        let result = expand_env_vars("key = \"${TEST_LEADFLOW_VAR}\"");
        assert_eq!(result, "key = \"hello\"");
        std::env::remove_var("TEST_LEADFLOW_VAR");
    }

    #[test]
    fn test_expand_env_vars_missing() {
        let result = expand_env_vars("key = \"${NONEXISTENT_LEADFLOW_VAR}\"");
        assert_eq!(result, "key = \"${NONEXISTENT_LEADFLOW_VAR}\"");
    }

    #[test]
    fn defaults_from_minimal_document() {
        let doc = PipelineDocument::parse(MINIMAL, DocumentFormat::Toml).unwrap();
        assert_eq!(doc.workflow_name, "minimal");
        assert_eq!(doc.steps[0].agent, AgentKind::Search);
        assert_eq!(doc.config.execution.default_timeout_secs, 10);
        assert_eq!(doc.config.execution.graph_mode, GraphMode::Linear);
        assert_eq!(doc.config.scoring.floor_grade, "D");
        assert_eq!(doc.config.scoring.thresholds["A"], 80.0);
        assert!(!doc.config.features.auto_apply_feedback);
        assert_eq!(doc.config.feedback.weight_bounds, (0.0, 1.0));
    }

    #[test]
    fn legacy_json_document() {
        let json = r#"{
            "workflow_name": "legacy",
            "config": {
                "env": {"required": ["APOLLO_API_KEY"], "load_from": "env"},
                "scoring": {
                    "weights": {"intent": 0.6, "role": 0.4},
                    "criteria": {"tech_stack_preferred": ["Salesforce"]}
                },
                "sheets": {"spreadsheet_id": "abc"}
            },
            "steps": [
                {"id": "search", "agent": "ProspectSearchAgent",
                 "tools": [{"name": "apollo", "endpoint": "https://example.test", "api_key": "{{APOLLO_API_KEY}}"}]},
                {"id": "score", "agent": "ScoringAgent",
                 "inputs": {"enriched_leads": "{{search.output.leads}}"}}
            ]
        }"#;
        let doc = PipelineDocument::parse(json, DocumentFormat::Json).unwrap();
        assert_eq!(doc.steps.len(), 2);
        assert_eq!(doc.steps[1].agent, AgentKind::Scoring);
        assert_eq!(doc.steps[0].tools[0].credential_param, "api_key");
        assert!(doc.config.is_required_credential("APOLLO_API_KEY"));
        assert_eq!(
            doc.config.scoring.criteria.preferred_technologies,
            vec!["Salesforce".to_string()]
        );
        // unknown sections survive and are reachable by path
        let tree = doc.config.to_value();
        assert_eq!(tree["sheets"]["spreadsheet_id"], "abc");
    }

    #[test]
    fn duplicate_step_id_rejected() {
        let toml_str = r#"
[[steps]]
id = "a"
agent = "search"

[[steps]]
id = "a"
agent = "scoring"
"#;
        let err = PipelineDocument::parse(toml_str, DocumentFormat::Toml).unwrap_err();
        assert!(matches!(err, LeadflowError::DuplicateStepId(ref id) if id == "a"));
    }

    #[test]
    fn unknown_agent_rejected_at_parse() {
        let toml_str = r#"
[[steps]]
id = "a"
agent = "TeleportAgent"
"#;
        let err = PipelineDocument::parse(toml_str, DocumentFormat::Toml).unwrap_err();
        assert!(matches!(err, LeadflowError::UnknownAgent(_)));
    }

    #[test]
    fn unknown_scoring_dimension_rejected() {
        let toml_str = r#"
[config.scoring.weights]
vibes = 1.0
"#;
        let err = PipelineDocument::parse(toml_str, DocumentFormat::Toml).unwrap_err();
        assert!(err.is_structural());
        assert!(err.to_string().contains("vibes"));
    }

    #[test]
    fn alias_and_canonical_name_conflict() {
        let toml_str = r#"
[config.scoring.weights]
intent = 0.5
intent_score = 0.5
"#;
        assert!(PipelineDocument::parse(toml_str, DocumentFormat::Toml).is_err());
    }

    #[test]
    fn unknown_depends_on_rejected() {
        let toml_str = r#"
[[steps]]
id = "a"
agent = "search"
depends_on = ["ghost"]
"#;
        let err = PipelineDocument::parse(toml_str, DocumentFormat::Toml).unwrap_err();
        assert!(matches!(err, LeadflowError::UnknownDependency { .. }));
    }

    #[test]
    fn resolved_tool_never_prints_credential() {
        let tool = ResolvedTool {
            name: "apollo".into(),
            endpoint: "https://example.test".into(),
            credential_key: Some("APOLLO_API_KEY".into()),
            credential: Some("sk-very-secret".into()),
            credential_param: "api_key".into(),
            timeout_secs: 10,
            method: HttpMethod::Get,
            params: vec![],
            body: None,
        };
        assert!(!format!("{:?}", tool).contains("sk-very-secret"));
        assert!(!tool.redacted().to_string().contains("sk-very-secret"));
    }

    #[test]
    fn load_from_disk_and_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wf.toml");
        std::fs::write(&path, MINIMAL).unwrap();
        let doc = PipelineDocument::load(&path).unwrap();
        assert_eq!(doc.steps.len(), 1);

        let err = PipelineDocument::load(&dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, LeadflowError::ConfigNotFound(_)));
    }

    #[test]
    fn test_bad_feedback_section_rejected() {
        for section in [
            "weight_bounds = [1.0, 0.0]",
            "max_adjustment = -0.1",
            "learning_rate = nan",
            "weight_bounds = [0.0, inf]",
        ] {
            let doc = format!("{}\n[config.feedback]\n{}\n", MINIMAL, section);
            let err = PipelineDocument::parse(&doc, DocumentFormat::Toml).unwrap_err();
            assert!(matches!(err, LeadflowError::Config(_)), "{}: {}", section, err);
        }
    }

    #[test]
    fn test_weights_must_sit_inside_feedback_bounds() {
        let percent = format!(
            "{}\n[config.scoring.weights]\nintent = 60.0\nrole = 40.0\n",
            MINIMAL
        );
        let err = PipelineDocument::parse(&percent, DocumentFormat::Toml).unwrap_err();
        assert!(err.to_string().contains("weight_bounds"), "{}", err);

        let widened = format!("{}\n[config.feedback]\nweight_bounds = [0.0, 100.0]\n", percent);
        let doc = PipelineDocument::parse(&widened, DocumentFormat::Toml).unwrap();
        assert_eq!(doc.config.scoring.weights["intent"], 60.0);
    }

    #[test]
    fn format_from_extension() {
        assert_eq!(
            DocumentFormat::from_path(Path::new("wf.JSON")),
            DocumentFormat::Json
        );
        assert_eq!(
            DocumentFormat::from_path(Path::new("wf.toml")),
            DocumentFormat::Toml
        );
    }
}
