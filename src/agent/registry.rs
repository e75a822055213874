//! Agent Registry
//!
//! In-memory, thread-safe mapping from agent name to [`AgentDescriptor`]. Registration
//! order is preserved because the workflow always picks the first agent of a type.

use crate::error::{WorkflowError, WorkflowResult};
use crate::protocol::{AgentDescriptor, AgentSummary, AgentType};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

/// Thread-safe registry of remote agents
///
/// Lookups return owned clones, so no lock is held while a caller talks to an agent.
/// Mutations take the write lock and are therefore serialized against in-flight lookups.
#[derive(Debug, Default)]
pub struct AgentRegistry {
    agents: RwLock<Vec<AgentDescriptor>>,
}

impl AgentRegistry {
    /// Create a new empty agent registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new agent; names are unique
    pub fn register(&self, descriptor: AgentDescriptor) -> WorkflowResult<()> {
        let mut agents = self.write();
        if agents.iter().any(|agent| agent.name() == descriptor.name()) {
            debug!(agent = %descriptor.name(), "Rejected duplicate registration");
            return Err(WorkflowError::already_exists(descriptor.name()));
        }

        info!(
            agent = %descriptor.name(),
            agent_type = %descriptor.agent_type(),
            service = %descriptor.service_endpoint(),
            "Registered agent"
        );
        agents.push(descriptor);
        Ok(())
    }

    /// Remove an agent by name, returning its descriptor
    pub fn unregister(&self, name: &str) -> WorkflowResult<AgentDescriptor> {
        let mut agents = self.write();
        let position = agents
            .iter()
            .position(|agent| agent.name() == name)
            .ok_or_else(|| WorkflowError::not_found(name))?;

        let removed = agents.remove(position);
        info!(agent = %name, "Unregistered agent");
        Ok(removed)
    }

    /// Get agent by name
    pub fn get(&self, name: &str) -> WorkflowResult<AgentDescriptor> {
        self.read()
            .iter()
            .find(|agent| agent.name() == name)
            .cloned()
            .ok_or_else(|| WorkflowError::not_found(name))
    }

    /// All agents of a type, in registration order
    pub fn get_by_type(&self, agent_type: AgentType) -> Vec<AgentDescriptor> {
        self.read()
            .iter()
            .filter(|agent| agent.agent_type() == agent_type)
            .cloned()
            .collect()
    }

    /// First registered agent of a type
    pub fn first_of_type(&self, agent_type: AgentType) -> Option<AgentDescriptor> {
        self.read()
            .iter()
            .find(|agent| agent.agent_type() == agent_type)
            .cloned()
    }

    /// Every registered agent, in registration order
    pub fn all(&self) -> Vec<AgentDescriptor> {
        self.read().clone()
    }

    /// Summaries of the FUNCTION agents currently registered
    pub fn describe_function_agents(&self) -> Vec<AgentSummary> {
        self.read()
            .iter()
            .filter(|agent| agent.is_function_agent())
            .map(AgentSummary::from)
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read().iter().any(|agent| agent.name() == name)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<AgentDescriptor>> {
        self.agents.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<AgentDescriptor>> {
        self.agents.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent(name: &str, agent_type: AgentType) -> AgentDescriptor {
        AgentDescriptor::from_urls(
            name,
            agent_type,
            format!("http://localhost/{name}/health"),
            format!("http://localhost/{name}/service"),
        )
        .unwrap()
    }

    #[test]
    fn test_register_and_get() {
        let registry = AgentRegistry::new();
        assert!(registry.is_empty());

        registry.register(agent("session", AgentType::Session)).unwrap();

        assert_eq!(registry.len(), 1);
        assert!(registry.contains("session"));
        let retrieved = registry.get("session").unwrap();
        assert_eq!(retrieved.agent_type(), AgentType::Session);
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let registry = AgentRegistry::new();
        registry.register(agent("session", AgentType::Session)).unwrap();

        let result = registry.register(agent("session", AgentType::Mission));
        assert!(matches!(result, Err(WorkflowError::AlreadyExists { .. })));
        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.get("session").unwrap().agent_type(),
            AgentType::Session
        );
    }

    #[test]
    fn test_unknown_name_fails() {
        let registry = AgentRegistry::new();
        assert!(matches!(
            registry.get("ghost"),
            Err(WorkflowError::NotFound { .. })
        ));
        assert!(matches!(
            registry.unregister("ghost"),
            Err(WorkflowError::NotFound { .. })
        ));
    }

    #[test]
    fn test_unregister_removes_agent() {
        let registry = AgentRegistry::new();
        registry.register(agent("a", AgentType::Function)).unwrap();
        registry.register(agent("b", AgentType::Function)).unwrap();

        let removed = registry.unregister("a").unwrap();
        assert_eq!(removed.name(), "a");
        assert!(!registry.contains("a"));

        let names: Vec<_> = registry
            .get_by_type(AgentType::Function)
            .iter()
            .map(|a| a.name().to_string())
            .collect();
        assert_eq!(names, vec!["b"]);
    }

    #[test]
    fn test_get_by_type_preserves_registration_order() {
        let registry = AgentRegistry::new();
        registry.register(agent("zeta", AgentType::Function)).unwrap();
        registry.register(agent("session", AgentType::Session)).unwrap();
        registry.register(agent("alpha", AgentType::Function)).unwrap();
        registry.register(agent("mid", AgentType::Function)).unwrap();

        let names: Vec<_> = registry
            .get_by_type(AgentType::Function)
            .iter()
            .map(|a| a.name().to_string())
            .collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
        assert!(registry.get_by_type(AgentType::Checker).is_empty());
        assert_eq!(
            registry.first_of_type(AgentType::Function).unwrap().name(),
            "zeta"
        );
    }

    #[test]
    fn test_describe_function_agents() {
        let registry = AgentRegistry::new();
        registry
            .register(agent("calculator", AgentType::Function).with_property("capability", "math"))
            .unwrap();
        registry.register(agent("translator", AgentType::Function)).unwrap();
        registry.register(agent("checker", AgentType::Checker)).unwrap();

        let summaries = registry.describe_function_agents();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].name, "calculator");
        assert_eq!(summaries[0].capabilities, "math");
        assert_eq!(summaries[1].capabilities, "");
    }
}
