pub mod approval;
pub mod feedback;
pub mod graph;
pub mod report;
pub mod resolver;
pub mod run_log;
pub mod store;

pub use approval::ProposalLedger;
pub use feedback::FeedbackLoop;
pub use graph::{ExecutionState, GraphExecutor, WorkflowGraph};
pub use report::{RunReport, RunSummary, StepReport};
pub use resolver::PlaceholderResolver;
pub use run_log::RunLogger;
pub use store::ConfigStore;
