use std::collections::HashMap;

use crate::agent::{AgentDescriptor, RoleKey};
use crate::error::CrewError;
use crate::provider::ProviderSettings;

/// Agents of one crew, keyed by role.
///
/// Registering a role twice is rejected; the first descriptor stays, so
/// lookups always return the same agent.
#[derive(Debug)]
pub struct AgentRegistry {
    settings: ProviderSettings,
    agents: Vec<AgentDescriptor>,
    by_role: HashMap<RoleKey, usize>,
}

impl AgentRegistry {
    pub fn new(settings: ProviderSettings) -> Self {
        Self {
            settings,
            agents: Vec::new(),
            by_role: HashMap::new(),
        }
    }

    pub fn register(&mut self, descriptor: AgentDescriptor) -> Result<(), CrewError> {
        descriptor.validate()?;
        self.settings.check_model(&descriptor.model).map_err(|err| {
            CrewError::config(format!("agent '{}': {}", descriptor.role, strip_prefix(&err)))
        })?;
        for tool in &descriptor.tools {
            self.settings.check_tool(*tool).map_err(|err| {
                CrewError::config(format!("agent '{}': {}", descriptor.role, strip_prefix(&err)))
            })?;
        }

        if let Some(existing) = self.by_role.get(&descriptor.role) {
            return Err(CrewError::config(format!(
                "agent role '{}' is already registered as '{}'",
                descriptor.role, self.agents[*existing].role
            )));
        }

        tracing::debug!(role = %descriptor.role, model = %descriptor.model, "agent registered");
        self.by_role
            .insert(descriptor.role.clone(), self.agents.len());
        self.agents.push(descriptor);
        Ok(())
    }

    pub fn get(&self, role: &RoleKey) -> Result<&AgentDescriptor, CrewError> {
        self.by_role
            .get(role)
            .map(|idx| &self.agents[*idx])
            .ok_or_else(|| CrewError::not_found("agent", role.as_str()))
    }

    pub fn get_by_name(&self, role: &str) -> Result<&AgentDescriptor, CrewError> {
        self.get(&RoleKey::parse(role)?)
    }

    pub fn contains(&self, role: &RoleKey) -> bool {
        self.by_role.contains_key(role)
    }

    /// Agents in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &AgentDescriptor> {
        self.agents.iter()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

fn strip_prefix(err: &CrewError) -> String {
    match err {
        CrewError::InvalidConfiguration(message) => message.clone(),
        other => other.to_string(),
    }
}
