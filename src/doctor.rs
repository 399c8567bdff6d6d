use std::collections::BTreeSet;

use leadflow_core::config::ConfigTree;
use leadflow_core::types::EnvSnapshot;
use leadflow_engine::ConfigStore;

struct CheckResult {
    label: String,
    ok: bool,
    detail: String,
}

/// Print pre-flight checks for a pipeline. Returns the number of issues.
pub fn run_doctor(store: &ConfigStore, config: &ConfigTree, env: &EnvSnapshot) -> usize {
    let mut checks = Vec::new();

    checks.extend(check_declared_credentials(store, env));
    checks.push(check_tool_credentials(store, env));
    checks.push(check_state_dir(store));
    checks.push(check_weights(store, config));

    let mut ok_count = 0;
    let mut fail_count = 0;

    for check in &checks {
        let icon = if check.ok { "[OK]" } else { "[!!]" };
        println!("  {} {}: {}", icon, check.label, check.detail);
        if check.ok {
            ok_count += 1;
        } else {
            fail_count += 1;
        }
    }

    println!();
    println!("  {} passed, {} issues found", ok_count, fail_count);
    fail_count
}

fn is_present(env: &EnvSnapshot, key: &str) -> bool {
    env.credential(key).map_or(false, |v| !v.starts_with("${"))
}

/// Required keys must be present; optional ones only degrade to simulation.
fn check_declared_credentials(store: &ConfigStore, env: &EnvSnapshot) -> Vec<CheckResult> {
    let declared = &store.document().config.env;
    let mut checks = Vec::new();
    for key in &declared.required {
        let ok = is_present(env, key);
        checks.push(CheckResult {
            label: key.clone(),
            ok,
            detail: if ok {
                "set (required)".into()
            } else {
                "missing (required)".into()
            },
        });
    }
    for key in &declared.optional {
        checks.push(CheckResult {
            label: key.clone(),
            ok: true,
            detail: if is_present(env, key) {
                "set (optional)".into()
            } else {
                "missing (optional, steps will simulate)".into()
            },
        });
    }
    checks
}

fn check_tool_credentials(store: &ConfigStore, env: &EnvSnapshot) -> CheckResult {
    let doc = store.document();
    let mut missing = BTreeSet::new();
    let mut tools = 0;
    for step in &doc.steps {
        for tool in &step.tools {
            tools += 1;
            if let Some(key) = &tool.credential {
                if !is_present(env, key) {
                    missing.insert(format!("{}.{} ({})", step.id, tool.name, key));
                }
            }
        }
    }
    if missing.is_empty() {
        CheckResult {
            label: "Tools".into(),
            ok: true,
            detail: format!("{} tools, all credentials present", tools),
        }
    } else {
        CheckResult {
            label: "Tools".into(),
            ok: true,
            detail: format!(
                "{} of {} will simulate: {}",
                missing.len(),
                tools,
                missing.into_iter().collect::<Vec<_>>().join(", ")
            ),
        }
    }
}

fn check_state_dir(store: &ConfigStore) -> CheckResult {
    let dir = store.state_dir();
    if let Err(e) = std::fs::create_dir_all(&dir) {
        return CheckResult {
            label: "State dir".into(),
            ok: false,
            detail: format!("{} ({})", dir.display(), e),
        };
    }
    let test_file = dir.join(".doctor_test");
    match std::fs::write(&test_file, "test") {
        Ok(_) => {
            std::fs::remove_file(&test_file).ok();
            CheckResult {
                label: "State dir".into(),
                ok: true,
                detail: format!("{}", dir.display()),
            }
        }
        Err(e) => CheckResult {
            label: "State dir".into(),
            ok: false,
            detail: format!("{} (not writable: {})", dir.display(), e),
        },
    }
}

fn check_weights(store: &ConfigStore, config: &ConfigTree) -> CheckResult {
    let scoring = &config.scoring;
    let overlay = if store.scoring_path().exists() {
        ", from scoring.json"
    } else {
        ""
    };
    CheckResult {
        label: "Scoring".into(),
        ok: scoring.total_weight() > 0.0,
        detail: format!(
            "{} dimensions, total weight {:.3}{}",
            scoring.weights.len(),
            scoring.total_weight(),
            overlay
        ),
    }
}
