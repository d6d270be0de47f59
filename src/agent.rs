use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::error::CrewError;
use crate::provider::ModelRef;

/// Validated agent role name.
///
/// Keeps the display form ("Email Classifier") but compares on a normalized key
/// (`email-classifier`), so `"email classifier"`, `"Email_Classifier"` and
/// `"EMAIL CLASSIFIER"` all address the same agent.
#[derive(Debug, Clone)]
pub struct RoleKey {
    display: String,
    key: String,
}

impl RoleKey {
    pub fn parse(value: &str) -> Result<Self, CrewError> {
        let display = value.split_whitespace().collect::<Vec<_>>().join(" ");
        if display.is_empty() {
            return Err(CrewError::config("agent role cannot be empty"));
        }
        if display.chars().any(|ch| ch.is_control()) {
            return Err(CrewError::config(format!(
                "agent role '{}' contains control characters",
                display.escape_debug()
            )));
        }

        let key = display
            .split(|ch: char| ch.is_whitespace() || ch == '_' || ch == '-')
            .filter(|part| !part.is_empty())
            .map(str::to_lowercase)
            .collect::<Vec<_>>()
            .join("-");
        if key.is_empty() {
            return Err(CrewError::config(format!(
                "agent role '{display}' has no name characters"
            )));
        }

        Ok(Self { display, key })
    }

    pub fn as_str(&self) -> &str {
        &self.display
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl PartialEq for RoleKey {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for RoleKey {}

impl Hash for RoleKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl fmt::Display for RoleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display)
    }
}

impl Serialize for RoleKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.display)
    }
}

impl<'de> Deserialize<'de> for RoleKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        RoleKey::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Tools an agent is permitted to use. Declarative only: the crew validates
/// the credentials a tool needs but never invokes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolRef {
    WebSearch,
}

impl ToolRef {
    pub fn name(self) -> &'static str {
        match self {
            ToolRef::WebSearch => "web_search",
        }
    }

    /// Environment credential the tool backend needs.
    pub fn required_credential(self) -> Option<&'static str> {
        match self {
            ToolRef::WebSearch => Some("SERPER_API_KEY"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentDescriptor {
    pub role: RoleKey,
    pub goal: String,
    pub backstory: String,
    pub tools: BTreeSet<ToolRef>,
    pub model: ModelRef,
    pub allow_delegation: bool,
}

impl AgentDescriptor {
    pub fn new(
        role: RoleKey,
        goal: impl Into<String>,
        backstory: impl Into<String>,
        model: ModelRef,
    ) -> Self {
        Self {
            role,
            goal: goal.into(),
            backstory: backstory.into(),
            tools: BTreeSet::new(),
            model,
            allow_delegation: false,
        }
    }

    pub fn with_tool(mut self, tool: ToolRef) -> Self {
        self.tools.insert(tool);
        self
    }

    pub fn with_delegation(mut self, allow: bool) -> Self {
        self.allow_delegation = allow;
        self
    }

    pub fn with_model(mut self, model: ModelRef) -> Self {
        self.model = model;
        self
    }

    /// Field-level checks that need no backend knowledge.
    pub fn validate(&self) -> Result<(), CrewError> {
        if self.goal.trim().is_empty() {
            return Err(CrewError::config(format!(
                "agent '{}' has an empty goal",
                self.role
            )));
        }
        if self.backstory.trim().is_empty() {
            return Err(CrewError::config(format!(
                "agent '{}' has an empty backstory",
                self.role
            )));
        }
        Ok(())
    }
}
