pub mod content;
pub mod delivery;
pub mod enrichment;
pub mod feedback;
pub mod intent;
pub mod pre_enrichment;
pub mod scoring;
pub mod search;
pub mod third_party;
pub mod tracking;
pub mod verification;

use serde_json::Value;

use leadflow_core::traits::AgentInvocation;
use leadflow_core::types::Record;

/// Records from the first of `keys` present in the inputs.
pub(crate) fn records_input(inv: &AgentInvocation, keys: &[&str]) -> Vec<Record> {
    keys.iter()
        .find_map(|k| inv.input(k))
        .map(Record::list_from_value)
        .unwrap_or_default()
}

/// An array of strings, or a single comma-separated string.
pub(crate) fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        Some(Value::String(s)) => s
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

/// A count given as a number or a numeric string.
pub(crate) fn count_input(value: Option<&Value>, default: usize) -> usize {
    match value {
        Some(Value::Number(n)) => n.as_u64().map(|n| n as usize).unwrap_or(default),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(default),
        _ => default,
    }
}

pub(crate) fn bool_input(value: Option<&Value>, default: bool) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => matches!(s.trim().to_lowercase().as_str(), "true" | "yes" | "1"),
        _ => default,
    }
}

/// First non-empty string among `keys` of an object.
pub(crate) fn text(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| value.get(*k))
        .filter_map(|v| v.as_str())
        .map(|s| s.trim())
        .find(|s| !s.is_empty())
        .map(String::from)
}

/// The first array found under `keys` (also looking inside `data`), or the value itself.
pub(crate) fn array_at<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Vec<Value>> {
    if let Some(arr) = value.as_array() {
        return Some(arr);
    }
    let scopes = [Some(value), value.get("data")];
    scopes
        .into_iter()
        .flatten()
        .flat_map(|scope| keys.iter().filter_map(move |k| scope.get(*k)))
        .find_map(|v| v.as_array())
}

/// Text form of a JSON input, used as a simulation seed or query parameter.
pub(crate) fn as_query(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::Value;

    use leadflow_core::config::{ConfigTree, HttpMethod, ResolvedTool};
    use leadflow_core::traits::AgentInvocation;
    use leadflow_core::types::EnvSnapshot;

    pub fn invocation(inputs: Value, tools: Vec<ResolvedTool>) -> AgentInvocation {
        invocation_with(inputs, tools, ConfigTree::default())
    }

    pub fn invocation_with(inputs: Value, tools: Vec<ResolvedTool>, config: ConfigTree) -> AgentInvocation {
        AgentInvocation {
            step_id: "step".into(),
            inputs,
            tools,
            config: Arc::new(config),
            env: Arc::new(EnvSnapshot::default()),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn live_tool(name: &str) -> ResolvedTool {
        ResolvedTool {
            name: name.into(),
            endpoint: format!("https://{}.provider.test", name),
            credential_key: Some(format!("{}_API_KEY", name.to_uppercase())),
            credential: Some("live-key".into()),
            credential_param: "api_key".into(),
            timeout_secs: 10,
            method: HttpMethod::Get,
            params: vec![],
            body: None,
        }
    }

    pub fn offline_tool(name: &str) -> ResolvedTool {
        ResolvedTool {
            credential: None,
            ..live_tool(name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn input_helpers() {
        assert_eq!(string_list(Some(&json!("a, b,,c"))), vec!["a", "b", "c"]);
        assert_eq!(string_list(Some(&json!(["x", 1, " y "]))), vec!["x", "y"]);
        assert_eq!(count_input(Some(&json!("5")), 3), 5);
        assert_eq!(count_input(Some(&json!(null)), 3), 3);
        assert!(bool_input(Some(&json!("yes")), false));
        assert_eq!(text(&json!({"a": "", "b": "x"}), &["a", "b"]).as_deref(), Some("x"));
    }

    #[test]
    fn array_lookup_descends_into_data() {
        let v = json!({"data": {"people": [{"name": "a"}]}});
        assert_eq!(array_at(&v, &["leads", "people"]).unwrap().len(), 1);
        let root = json!([1, 2]);
        assert_eq!(array_at(&root, &["x"]).unwrap().len(), 2);
        assert!(array_at(&json!({"x": 1}), &["x"]).is_none());
    }
}
