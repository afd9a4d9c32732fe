use super::{Agent, AgentServices, CoderAgent, DiscoveryAgent, SolutionDesignerAgent};
use crate::config::{ConfigError, ConfigTree};
use std::collections::BTreeMap;

pub type AgentFactory =
    fn(&ConfigTree, &AgentServices) -> Result<Box<dyn Agent>, ConfigError>;

/// Compile-time registry mapping `agent_kind` strings to constructors.
/// Configuration references a kind, never a type. New kinds are added by
/// registering; nothing else changes.
#[derive(Clone, Default)]
pub struct AgentRegistry {
    factories: BTreeMap<String, AgentFactory>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the built-in kinds.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register("discovery", DiscoveryAgent::factory);
        registry.register("solution_designer", SolutionDesignerAgent::factory);
        registry.register("coder", CoderAgent::factory);
        registry
    }

    pub fn register(&mut self, kind: &str, factory: AgentFactory) {
        self.factories.insert(kind.to_string(), factory);
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    pub fn build(
        &self,
        kind: &str,
        config: &ConfigTree,
        services: &AgentServices,
    ) -> Result<Box<dyn Agent>, ConfigError> {
        let factory = self
            .factories
            .get(kind)
            .ok_or_else(|| ConfigError::UnknownAgentKind(kind.to_string()))?;
        factory(config, services)
    }
}
