use anyhow::Result;

use crate::agent::AgentDescriptor;
use crate::cli::CrewSelector;
use crate::crews::{builtin_crews, resolve_crew};
use crate::error::CrewError;

pub fn run_crews_list() -> Result<()> {
    println!("Built-in crews:");
    for crew in builtin_crews()? {
        let tasks = crew
            .tasks
            .iter()
            .map(|task| task.id.as_str())
            .collect::<Vec<_>>()
            .join(" -> ");
        println!("- {}: {}", crew.name, crew.description);
        println!("    tasks: {tasks}");
        if !crew.inputs.is_empty() {
            let inputs = crew.inputs.keys().cloned().collect::<Vec<_>>();
            println!("    inputs: {}", inputs.join(", "));
        }
    }
    Ok(())
}

pub fn run_agents_list(selector: &CrewSelector) -> Result<()> {
    let spec = resolve_crew(selector)?;
    println!("Agents of crew '{}':", spec.name);
    for agent in spec.agent_descriptors() {
        let delegation = if agent.allow_delegation {
            ", delegates"
        } else {
            ""
        };
        println!("- {} ({}{delegation})", agent.role, agent.model);
    }
    Ok(())
}

pub fn run_agents_show(selector: &CrewSelector, role: &str) -> Result<()> {
    let spec = resolve_crew(selector)?;
    let agent = find_agent(&spec.agent_descriptors(), role)?;

    println!("Role: {}", agent.role);
    println!("Model: {}", agent.model);
    println!("Goal: {}", agent.goal);
    println!("Backstory: {}", agent.backstory);
    println!(
        "Tools: {}",
        if agent.tools.is_empty() {
            "<none>".to_string()
        } else {
            agent
                .tools
                .iter()
                .map(|tool| tool.name())
                .collect::<Vec<_>>()
                .join(", ")
        }
    );
    println!("Allow delegation: {}", agent.allow_delegation);

    let tasks = spec
        .tasks
        .iter()
        .filter(|task| task.agent == agent.role)
        .map(|task| task.id.as_str())
        .collect::<Vec<_>>();
    println!(
        "Tasks: {}",
        if tasks.is_empty() {
            "<none>".to_string()
        } else {
            tasks.join(", ")
        }
    );
    Ok(())
}

fn find_agent(agents: &[AgentDescriptor], role: &str) -> Result<AgentDescriptor, CrewError> {
    let wanted = crate::agent::RoleKey::parse(role)?;
    agents
        .iter()
        .find(|agent| agent.role == wanted)
        .cloned()
        .ok_or_else(|| {
            let names = agents
                .iter()
                .map(|agent| agent.role.to_string())
                .collect::<Vec<_>>();
            CrewError::not_found(
                "agent",
                format!("{} (available: {})", role.trim(), names.join(", ")),
            )
        })
}
