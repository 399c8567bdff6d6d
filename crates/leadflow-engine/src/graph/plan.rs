use std::collections::{BTreeSet, HashMap};

use leadflow_core::config::{GraphMode, PipelineDocument, StepDefinition};
use leadflow_core::error::{LeadflowError, Result};

use crate::resolver::scan_references;

/// A pipeline document planned into an evaluation order.
///
/// Data edges come from `{{step...}}` references, ordering edges from
/// `depends_on` and, in linear mode, from document order.
#[derive(Debug, Clone)]
pub struct WorkflowGraph {
    document: PipelineDocument,
    index: HashMap<String, usize>,
    /// Steps whose output each step reads.
    data_deps: Vec<BTreeSet<usize>>,
    /// Data plus ordering-only predecessors.
    all_deps: Vec<BTreeSet<usize>>,
    order: Vec<usize>,
}

impl WorkflowGraph {
    pub fn plan(document: PipelineDocument) -> Result<Self> {
        document.validate()?;
        let steps = &document.steps;
        let index: HashMap<String, usize> = steps
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id.clone(), i))
            .collect();

        let mut data_deps = vec![BTreeSet::new(); steps.len()];
        let mut all_deps = vec![BTreeSet::new(); steps.len()];
        for (i, step) in steps.iter().enumerate() {
            let mut referenced = scan_references(&step.inputs);
            for tool in &step.tools {
                if let Ok(tool_value) = serde_json::to_value(tool) {
                    referenced.extend(scan_references(&tool_value));
                }
            }
            for name in referenced {
                // Unknown names are left to fail at resolution time.
                if let Some(&dep) = index.get(&name) {
                    data_deps[i].insert(dep);
                    all_deps[i].insert(dep);
                }
            }
            for name in &step.depends_on {
                if let Some(&dep) = index.get(name) {
                    all_deps[i].insert(dep);
                }
            }
            if document.config.execution.graph_mode == GraphMode::Linear && i > 0 {
                all_deps[i].insert(i - 1);
            }
        }

        let order = topological_order(&all_deps).ok_or_else(|| {
            LeadflowError::GraphCycle(
                find_cycle(&all_deps)
                    .into_iter()
                    .map(|i| steps[i].id.clone())
                    .collect(),
            )
        })?;

        tracing::debug!(
            workflow = %document.workflow_name,
            steps = steps.len(),
            mode = ?document.config.execution.graph_mode,
            "Planned workflow graph"
        );

        Ok(Self {
            document,
            index,
            data_deps,
            all_deps,
            order,
        })
    }

    pub fn document(&self) -> &PipelineDocument {
        &self.document
    }

    pub fn workflow_name(&self) -> &str {
        &self.document.workflow_name
    }

    pub fn len(&self) -> usize {
        self.document.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.document.steps.is_empty()
    }

    pub fn step(&self, idx: usize) -> &StepDefinition {
        &self.document.steps[idx]
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Step indices in evaluation order.
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    /// Step ids in evaluation order.
    pub fn ordered_ids(&self) -> Vec<&str> {
        self.order.iter().map(|&i| self.step(i).id.as_str()).collect()
    }

    pub fn data_dependencies(&self, idx: usize) -> &BTreeSet<usize> {
        &self.data_deps[idx]
    }

    pub fn dependencies(&self, idx: usize) -> &BTreeSet<usize> {
        &self.all_deps[idx]
    }
}

/// Kahn's algorithm; among ready steps the earliest in the document goes first.
fn topological_order(deps: &[BTreeSet<usize>]) -> Option<Vec<usize>> {
    let n = deps.len();
    let mut remaining: Vec<usize> = deps.iter().map(|d| d.len()).collect();
    let mut dependents = vec![Vec::new(); n];
    for (i, ds) in deps.iter().enumerate() {
        for &d in ds {
            dependents[d].push(i);
        }
    }

    let mut ready: BTreeSet<usize> = (0..n).filter(|&i| remaining[i] == 0).collect();
    let mut order = Vec::with_capacity(n);
    while let Some(next) = ready.pop_first() {
        order.push(next);
        for &dependent in &dependents[next] {
            remaining[dependent] -= 1;
            if remaining[dependent] == 0 {
                ready.insert(dependent);
            }
        }
    }
    (order.len() == n).then_some(order)
}

/// One cycle as a closed path (`a -> b -> a`).
fn find_cycle(deps: &[BTreeSet<usize>]) -> Vec<usize> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        New,
        Active,
        Done,
    }

    fn visit(node: usize, deps: &[BTreeSet<usize>], marks: &mut [Mark], stack: &mut Vec<usize>) -> Option<Vec<usize>> {
        marks[node] = Mark::Active;
        stack.push(node);
        for &dep in &deps[node] {
            match marks[dep] {
                Mark::Active => {
                    let start = stack.iter().position(|&n| n == dep).unwrap_or(0);
                    let mut cycle: Vec<usize> = stack[start..].to_vec();
                    cycle.reverse();
                    cycle.insert(0, dep);
                    return Some(cycle);
                }
                Mark::New => {
                    if let Some(cycle) = visit(dep, deps, marks, stack) {
                        return Some(cycle);
                    }
                }
                Mark::Done => {}
            }
        }
        stack.pop();
        marks[node] = Mark::Done;
        None
    }

    let mut marks = vec![Mark::New; deps.len()];
    for start in 0..deps.len() {
        if marks[start] == Mark::New {
            let mut stack = Vec::new();
            if let Some(cycle) = visit(start, deps, &mut marks, &mut stack) {
                return cycle;
            }
        }
    }
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadflow_core::config::DocumentFormat;

    fn plan(toml: &str) -> Result<WorkflowGraph> {
        WorkflowGraph::plan(PipelineDocument::parse(toml, DocumentFormat::Toml)?)
    }

    #[test]
    fn test_linear_mode_keeps_document_order() {
        let graph = plan(
            r#"
[[steps]]
id = "search"
agent = "search"

[[steps]]
id = "score"
agent = "scoring"
inputs = { enriched_leads = "{{search.output.leads}}" }

[[steps]]
id = "verify"
agent = "email_verification"
"#,
        )
        .unwrap();
        assert_eq!(graph.ordered_ids(), vec!["search", "score", "verify"]);
        assert!(graph.data_dependencies(2).is_empty());
        assert!(graph.dependencies(2).contains(&1));
        assert!(graph.data_dependencies(1).contains(&0));
    }

    #[test]
    fn test_dag_mode_reorders_by_data() {
        let graph = plan(
            r#"
[config.execution]
graph_mode = "dag"

[[steps]]
id = "score"
agent = "scoring"
inputs = { enriched_leads = "{{enrich.output.enriched_leads}}", intent_signals = "{{intent.output.intent_signals}}" }

[[steps]]
id = "intent"
agent = "intent_signal"
inputs = { leads = "{{search.output.leads}}" }

[[steps]]
id = "enrich"
agent = "enrichment"
inputs = { leads = "{{search.output.leads}}" }

[[steps]]
id = "search"
agent = "search"
"#,
        )
        .unwrap();
        assert_eq!(graph.ordered_ids(), vec!["search", "intent", "enrich", "score"]);
        assert_eq!(graph.data_dependencies(0).len(), 2);
    }

    #[test]
    fn test_forward_reference_in_linear_mode_is_a_cycle() {
        let err = plan(
            r#"
[[steps]]
id = "score"
agent = "scoring"
inputs = { enriched_leads = "{{search.output.leads}}" }

[[steps]]
id = "search"
agent = "search"
"#,
        )
        .unwrap_err();
        match err {
            LeadflowError::GraphCycle(path) => {
                assert_eq!(path.first(), path.last());
                assert!(path.contains(&"search".to_string()));
                assert!(path.contains(&"score".to_string()));
            }
            other => panic!("expected GraphCycle, got {:?}", other),
        }
    }

    #[test]
    fn test_dag_cycle_detected() {
        let err = plan(
            r#"
[config.execution]
graph_mode = "dag"

[[steps]]
id = "a"
agent = "scoring"
inputs = { leads = "{{b.output.ranked_leads}}" }

[[steps]]
id = "b"
agent = "scoring"
inputs = { leads = "{{a.output.ranked_leads}}" }
"#,
        )
        .unwrap_err();
        assert!(err.is_structural());
        assert_eq!(err.to_string(), "Dependency cycle between steps: a -> b -> a");
    }

    #[test]
    fn test_depends_on_is_ordering_only() {
        let graph = plan(
            r#"
[config.execution]
graph_mode = "dag"

[[steps]]
id = "report"
agent = "feedback_apply"
depends_on = ["train"]

[[steps]]
id = "train"
agent = "feedback_train"
"#,
        )
        .unwrap();
        assert_eq!(graph.ordered_ids(), vec!["train", "report"]);
        assert!(graph.data_dependencies(0).is_empty());
    }

    #[test]
    fn test_self_reference_is_a_cycle() {
        let err = plan(
            r#"
[config.execution]
graph_mode = "dag"

[[steps]]
id = "loop"
agent = "scoring"
inputs = { leads = "{{loop.output.ranked_leads}}" }
"#,
        )
        .unwrap_err();
        assert!(matches!(err, LeadflowError::GraphCycle(_)));
    }
}
