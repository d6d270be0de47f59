use std::path::Path;

use crate::cli::CrewSelector;
use crate::config::RuntimeConfig;
use crate::crew_file::{CrewSpec, load_crew_file, parse_crew_spec};
use crate::error::CrewError;
use crate::graph::TaskGraph;
use crate::provider::{ProviderSettings, apply_model_override};
use crate::registry::AgentRegistry;

const BUILTIN_CREWS: &[(&str, &str)] = &[
    ("tech-blog", include_str!("../crews/tech-blog.toml")),
    ("email-reply", include_str!("../crews/email-reply.toml")),
];

pub fn builtin_crew_names() -> Vec<&'static str> {
    BUILTIN_CREWS.iter().map(|(name, _)| *name).collect()
}

pub fn builtin_crews() -> Result<Vec<CrewSpec>, CrewError> {
    BUILTIN_CREWS
        .iter()
        .map(|(name, text)| parse_crew_spec(text, name))
        .collect()
}

pub fn find_builtin(name: &str) -> Result<CrewSpec, CrewError> {
    let wanted = name.trim();
    BUILTIN_CREWS
        .iter()
        .find(|(builtin, _)| builtin.eq_ignore_ascii_case(wanted))
        .map(|(builtin, text)| parse_crew_spec(text, builtin))
        .unwrap_or_else(|| Err(CrewError::not_found("crew", wanted)))
}

/// Exactly one of a built-in name or `--crew-file` must be given.
pub fn resolve_crew(selector: &CrewSelector) -> Result<CrewSpec, CrewError> {
    match (selector.crew.as_deref(), selector.crew_file.as_deref()) {
        (Some(name), None) => find_builtin(name),
        (None, Some(path)) => load_crew_file(Path::new(path)),
        (Some(_), Some(_)) => Err(CrewError::config(
            "pass either a built-in crew name or --crew-file, not both",
        )),
        (None, None) => Err(CrewError::config(format!(
            "no crew selected. Built-in crews: {}",
            builtin_crew_names().join(", ")
        ))),
    }
}

/// Registers the crew's agents (with `--provider`/`--model` applied) and
/// validates its task graph.
pub fn assemble(
    spec: &CrewSpec,
    cfg: &RuntimeConfig,
    settings: ProviderSettings,
) -> Result<(AgentRegistry, TaskGraph), CrewError> {
    let mut registry = AgentRegistry::new(settings);
    for agent in spec.agent_descriptors() {
        let model = apply_model_override(&agent.model, cfg);
        if model != agent.model {
            tracing::debug!(
                role = %agent.role,
                declared = %agent.model,
                effective = %model,
                "model override applied"
            );
        }
        registry.register(agent.with_model(model))?;
    }

    let graph = TaskGraph::new(spec.task_descriptors())?;
    graph.validate_agents(&registry)?;
    Ok((registry, graph))
}
