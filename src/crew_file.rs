//! TOML crew definitions.
//!
//! ```toml
//! name = "triage"
//! max_rpm = 30
//!
//! [inputs]
//! ticket = "printer on fire"
//!
//! [[agents]]
//! role = "Triage Lead"
//! goal = "Sort {ticket} by urgency"
//! backstory = "You have run a help desk for a decade."
//! provider = "ollama"            # optional, defaults to openai
//! model = "llama3:instruct"      # optional, provider default
//!
//! [[tasks]]
//! id = "rate"
//! agent = "Triage Lead"
//! description = "Rate this ticket: {ticket}"
//! expected_output = "low, medium or high"
//! one_of = ["low", "medium", "high"]
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::agent::{AgentDescriptor, RoleKey, ToolRef};
use crate::cli::Provider;
use crate::error::CrewError;
use crate::provider::{ModelRef, default_model};
use crate::task::{OutputContract, ShortCircuit, TaskDescriptor, TaskId};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CrewSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Requests-per-minute ceiling the crew asks for; runtime config wins.
    pub max_rpm: Option<u32>,
    /// Default values for `{placeholder}` inputs.
    #[serde(default)]
    pub inputs: BTreeMap<String, String>,
    pub agents: Vec<AgentSpec>,
    pub tasks: Vec<TaskSpec>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentSpec {
    pub role: RoleKey,
    pub goal: String,
    pub backstory: String,
    pub provider: Option<Provider>,
    pub model: Option<String>,
    #[serde(default)]
    pub tools: Vec<ToolRef>,
    #[serde(default)]
    pub allow_delegation: bool,
}

impl AgentSpec {
    pub fn model_ref(&self) -> ModelRef {
        let provider = self.provider.unwrap_or(Provider::Openai);
        let model = self
            .model
            .clone()
            .unwrap_or_else(|| default_model(provider).to_string());
        ModelRef::new(provider, model)
    }

    pub fn descriptor(&self) -> AgentDescriptor {
        self.tools.iter().fold(
            AgentDescriptor::new(
                self.role.clone(),
                self.goal.clone(),
                self.backstory.clone(),
                self.model_ref(),
            )
            .with_delegation(self.allow_delegation),
            |agent, tool| agent.with_tool(*tool),
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskSpec {
    pub id: TaskId,
    pub agent: RoleKey,
    pub description: String,
    pub expected_output: String,
    #[serde(default)]
    pub context: Vec<TaskId>,
    pub output_file: Option<PathBuf>,
    /// Restricts the output to one of these labels.
    pub one_of: Option<Vec<String>>,
    pub short_circuit: Option<ShortCircuit>,
}

impl TaskSpec {
    pub fn descriptor(&self) -> TaskDescriptor {
        let mut task = TaskDescriptor::new(
            self.id.clone(),
            self.agent.clone(),
            self.description.clone(),
            self.expected_output.clone(),
        );
        for dependency in &self.context {
            task = task.with_context(dependency.clone());
        }
        if let Some(path) = &self.output_file {
            task = task.with_output_file(path.clone());
        }
        if let Some(labels) = &self.one_of {
            task = task.with_contract(OutputContract::OneOf(labels.clone()));
        }
        if let Some(rule) = &self.short_circuit {
            task = task.with_short_circuit(rule.clone());
        }
        task
    }
}

impl CrewSpec {
    pub fn agent_descriptors(&self) -> Vec<AgentDescriptor> {
        self.agents.iter().map(AgentSpec::descriptor).collect()
    }

    pub fn task_descriptors(&self) -> Vec<TaskDescriptor> {
        self.tasks.iter().map(TaskSpec::descriptor).collect()
    }

    /// Placeholder defaults overlaid with caller-supplied values.
    pub fn merged_inputs(&self, overrides: &BTreeMap<String, String>) -> BTreeMap<String, String> {
        let mut inputs = self.inputs.clone();
        inputs.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
        inputs
    }

    fn check_shape(&self) -> Result<(), CrewError> {
        if self.name.trim().is_empty() {
            return Err(CrewError::config("crew name cannot be empty"));
        }
        if self.agents.is_empty() {
            return Err(CrewError::config(format!(
                "crew '{}' declares no agents",
                self.name
            )));
        }
        for task in &self.tasks {
            if let Some(labels) = &task.one_of
                && labels.iter().all(|label| label.trim().is_empty())
            {
                return Err(CrewError::config(format!(
                    "task '{}' has an empty one_of list",
                    task.id
                )));
            }
        }
        Ok(())
    }
}

/// Parses crew TOML. `origin` names the source in error messages.
pub fn parse_crew_spec(text: &str, origin: &str) -> Result<CrewSpec, CrewError> {
    let spec: CrewSpec = toml::from_str(text)
        .map_err(|e| CrewError::config(format!("invalid crew definition '{origin}': {e}")))?;
    spec.check_shape()?;
    Ok(spec)
}

pub fn load_crew_file(path: &Path) -> Result<CrewSpec, CrewError> {
    let text = std::fs::read_to_string(path).map_err(|source| CrewError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let spec = parse_crew_spec(&text, &path.display().to_string())?;
    tracing::debug!(
        crew = %spec.name,
        path = %path.display(),
        agents = spec.agents.len(),
        tasks = spec.tasks.len(),
        "crew file loaded"
    );
    Ok(spec)
}
