pub mod builtin;
pub mod http;
pub mod provider;
pub mod registry;
pub mod simulate;

pub use http::HttpTransport;
pub use provider::{CallSpec, ProviderCaller, StepRecorder};
pub use registry::AgentRegistry;
