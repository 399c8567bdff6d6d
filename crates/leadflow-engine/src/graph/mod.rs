//! Workflow graph: planning, per-run state and execution.
//!
//! A pipeline document is planned once into a `WorkflowGraph` (topological
//! order over reference, `depends_on` and, in linear mode, document-order
//! edges). `GraphExecutor` then walks that order, resolving each step's
//! inputs against the `ExecutionState` and invoking the step's agent.

pub mod executor;
pub mod plan;
pub mod state;

pub use executor::GraphExecutor;
pub use plan::WorkflowGraph;
pub use state::ExecutionState;
