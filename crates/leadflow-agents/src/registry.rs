use std::collections::HashMap;
use std::sync::Arc;

use leadflow_core::error::{LeadflowError, Result};
use leadflow_core::traits::{Agent, Transport};
use leadflow_core::types::AgentKind;

use crate::builtin;
use crate::provider::ProviderCaller;

/// Registry of available agents, keyed by kind.
pub struct AgentRegistry {
    agents: HashMap<AgentKind, Arc<dyn Agent>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self {
            agents: HashMap::new(),
        }
    }

    /// Register an agent, replacing any previous one of the same kind.
    pub fn register(&mut self, agent: impl Agent) {
        self.agents.insert(agent.kind(), Arc::new(agent));
    }

    pub fn get(&self, kind: AgentKind) -> Result<Arc<dyn Agent>> {
        self.agents
            .get(&kind)
            .cloned()
            .ok_or_else(|| LeadflowError::UnknownAgent(kind.to_string()))
    }

    pub fn contains(&self, kind: AgentKind) -> bool {
        self.agents.contains_key(&kind)
    }

    /// Registered kinds, sorted.
    pub fn kinds(&self) -> Vec<AgentKind> {
        let mut kinds: Vec<AgentKind> = self.agents.keys().copied().collect();
        kinds.sort();
        kinds
    }

    /// Create a registry with all built-in agents registered.
    pub fn with_builtins(transport: Arc<dyn Transport>) -> Self {
        let caller = ProviderCaller::new(transport);
        let mut registry = Self::new();

        // Discovery and enrichment
        registry.register(builtin::search::SearchAgent::new(caller.clone()));
        registry.register(builtin::pre_enrichment::PreEnrichmentAgent);
        registry.register(builtin::enrichment::EnrichmentAgent::new(caller.clone()));
        registry.register(builtin::third_party::ThirdPartyEnrichmentAgent::new(caller.clone()));
        registry.register(builtin::intent::IntentSignalAgent::new(caller.clone()));

        // Qualification
        registry.register(builtin::scoring::ScoringAgent);
        registry.register(builtin::verification::EmailVerificationAgent::new(caller.clone()));

        // Outreach
        registry.register(builtin::content::ContentGenerationAgent::new(caller.clone()));
        registry.register(builtin::delivery::DeliveryAgent::new(caller.clone()));
        registry.register(builtin::tracking::ResponseTrackingAgent::new(caller.clone()));

        // Feedback
        registry.register(builtin::feedback::FeedbackTrainAgent::new(caller));
        registry.register(builtin::feedback::FeedbackApplyAgent);

        registry
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}
