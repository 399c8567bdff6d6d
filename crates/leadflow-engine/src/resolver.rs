use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde_json::Value;

use leadflow_core::config::ConfigTree;
use leadflow_core::error::{LeadflowError, Result};
use leadflow_core::types::EnvSnapshot;

fn reference_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{\{\s*([^}]+?)\s*\}\}").expect("valid reference pattern"))
}

fn is_env_name(expr: &str) -> bool {
    let mut chars = expr.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_uppercase())
        && chars.all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

/// A reference that could not be resolved, and where in the template it sat.
#[derive(Debug)]
pub struct ResolutionFailure {
    /// Dotted field path inside the template (`leads`, `scoring.weights`, `items.0`).
    pub field: String,
    pub reference: String,
    pub error: LeadflowError,
}

/// Outcome of resolving one template: the substituted value plus every failure.
/// Failed leaves are `null`.
#[derive(Debug)]
pub struct Resolved {
    pub value: Value,
    pub failures: Vec<ResolutionFailure>,
}

impl Resolved {
    /// Failures at `field` or anywhere beneath it.
    pub fn failures_under<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a ResolutionFailure> {
        self.failures.iter().filter(move |f| {
            f.field == field
                || f.field
                    .strip_prefix(field)
                    .is_some_and(|rest| rest.starts_with('.'))
        })
    }
}

/// Resolves `{{...}}` references against the environment snapshot, the
/// configuration tree and recorded step outputs, in that order.
pub struct PlaceholderResolver {
    config: Value,
    required_env: HashSet<String>,
    env: Arc<EnvSnapshot>,
}

impl PlaceholderResolver {
    pub fn new(config: &ConfigTree, env: Arc<EnvSnapshot>) -> Self {
        Self {
            config: config.to_value(),
            required_env: config.env.required.iter().cloned().collect(),
            env,
        }
    }

    /// Resolve a single reference expression (without braces).
    pub fn resolve_reference(&self, expr: &str, outputs: &HashMap<String, Value>) -> Result<Value> {
        let expr = expr.trim();
        let fail = |reason: String| LeadflowError::Resolution {
            reference: expr.to_string(),
            reason,
        };

        if !expr.contains('.') && is_env_name(expr) {
            return match self.env.get(expr) {
                Some(v) => Ok(Value::String(v.to_string())),
                None if self.required_env.contains(expr) => Err(LeadflowError::MissingCredential {
                    key: expr.to_string(),
                }),
                None => Err(fail(format!("environment variable {} is not set", expr))),
            };
        }

        let mut segments = expr.split('.');
        let head = segments.next().unwrap_or_default();
        let rest: Vec<&str> = segments.collect();

        if head == "config" {
            return walk(&self.config, &rest).ok_or_else(|| fail("no such config path".into()));
        }

        let Some(output) = outputs.get(head) else {
            return Err(fail(format!("step '{}' has no recorded output", head)));
        };
        let path = match rest.first() {
            Some(&"output") => &rest[1..],
            _ => &rest[..],
        };
        walk(output, path).ok_or_else(|| fail(format!("output of step '{}' has no such path", head)))
    }

    /// Resolve every reference in `template`. Never fails as a whole.
    pub fn resolve(&self, template: &Value, outputs: &HashMap<String, Value>) -> Resolved {
        let mut failures = Vec::new();
        let value = self.resolve_value(template, outputs, "", &mut failures);
        Resolved { value, failures }
    }

    fn resolve_value(
        &self,
        value: &Value,
        outputs: &HashMap<String, Value>,
        field: &str,
        failures: &mut Vec<ResolutionFailure>,
    ) -> Value {
        match value {
            Value::String(s) => self.resolve_string(s, outputs, field, failures),
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .enumerate()
                    .map(|(i, v)| self.resolve_value(v, outputs, &join(field, &i.to_string()), failures))
                    .collect(),
            ),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.resolve_value(v, outputs, &join(field, k), failures)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    fn resolve_string(
        &self,
        s: &str,
        outputs: &HashMap<String, Value>,
        field: &str,
        failures: &mut Vec<ResolutionFailure>,
    ) -> Value {
        let pattern = reference_pattern();
        let matches: Vec<_> = pattern.captures_iter(s).collect();
        if matches.is_empty() {
            return Value::String(s.to_string());
        }

        // Exactly one reference: keep the referenced type.
        if let [caps] = matches.as_slice() {
            if caps.get(0).is_some_and(|m| m.start() == 0 && m.end() == s.len()) {
                let expr = &caps[1];
                return match self.resolve_reference(expr, outputs) {
                    Ok(v) => v,
                    Err(error) => {
                        failures.push(ResolutionFailure {
                            field: field.to_string(),
                            reference: expr.to_string(),
                            error,
                        });
                        Value::Null
                    }
                };
            }
        }

        let mut rendered = String::with_capacity(s.len());
        let mut last = 0;
        let mut ok = true;
        for caps in &matches {
            let Some(m) = caps.get(0) else { continue };
            rendered.push_str(&s[last..m.start()]);
            last = m.end();
            match self.resolve_reference(&caps[1], outputs) {
                Ok(Value::String(v)) => rendered.push_str(&v),
                Ok(other) => rendered.push_str(&other.to_string()),
                Err(error) => {
                    ok = false;
                    failures.push(ResolutionFailure {
                        field: field.to_string(),
                        reference: caps[1].to_string(),
                        error,
                    });
                }
            }
        }
        rendered.push_str(&s[last..]);
        if ok {
            Value::String(rendered)
        } else {
            Value::Null
        }
    }
}

fn join(prefix: &str, segment: &str) -> String {
    if prefix.is_empty() {
        segment.to_string()
    } else {
        format!("{}.{}", prefix, segment)
    }
}

fn walk(root: &Value, path: &[&str]) -> Option<Value> {
    let mut current = root;
    for segment in path {
        current = match current {
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            Value::Object(map) => map.get(*segment)?,
            _ => return None,
        };
    }
    Some(current.clone())
}

/// Every reference expression inside `template`.
pub fn scan_expressions(template: &Value) -> Vec<String> {
    let mut out = Vec::new();
    collect(template, &mut out);
    out
}

fn collect(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) => out.extend(
            reference_pattern()
                .captures_iter(s)
                .map(|caps| caps[1].trim().to_string()),
        ),
        Value::Array(items) => items.iter().for_each(|v| collect(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect(v, out)),
        _ => {}
    }
}

/// Names a template may refer to as steps: the first segment of every
/// reference that is neither an environment variable nor `config`.
pub fn scan_references(template: &Value) -> BTreeSet<String> {
    scan_expressions(template)
        .into_iter()
        .filter_map(|expr| {
            if !expr.contains('.') && is_env_name(&expr) {
                return None;
            }
            let head = expr.split('.').next()?.to_string();
            (head != "config").then_some(head)
        })
        .collect()
}
