use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde_json::json;

use crate::cli::{CrewSelector, OutputFormat};
use crate::config::{Credentials, RuntimeConfig, parse_inputs};
use crate::crew_file::CrewSpec;
use crate::crews::{assemble, resolve_crew};
use crate::error::CrewError;
use crate::pipeline::Pipeline;
use crate::provider::{BackendFactory, HttpBackendFactory, ProviderSettings};
use crate::report::{render_json, render_text, summary_line};
use crate::result::PipelineResult;
use crate::retry::RetryPolicy;
use crate::telemetry::TelemetrySink;

/// Crew-declared ceiling unless the runtime config sets one. A configured 0
/// lifts the ceiling entirely.
pub fn effective_max_rpm(cfg: &RuntimeConfig, spec: &CrewSpec) -> Option<u32> {
    match cfg.max_rpm {
        Some(0) => None,
        Some(rpm) => Some(rpm),
        None => spec.max_rpm.filter(|rpm| *rpm > 0),
    }
}

/// Builds a ready-to-run pipeline for `spec`. Every configuration error
/// surfaces here, before any backend is contacted.
pub fn build_pipeline(
    spec: &CrewSpec,
    cfg: &RuntimeConfig,
    credentials: Credentials,
    factory: &dyn BackendFactory,
    telemetry: TelemetrySink,
) -> Result<Pipeline, CrewError> {
    let settings = ProviderSettings::new(cfg, credentials);
    let (registry, graph) = assemble(spec, cfg, settings)?;
    Ok(Pipeline::new(spec.name.clone(), registry, graph, factory)?
        .with_retry(RetryPolicy::new(cfg.retry_attempts, cfg.retry_delay_ms))
        .with_max_rpm(effective_max_rpm(cfg, spec))
        .with_execution(cfg.execution)
        .with_output_dir(PathBuf::from(&cfg.output_dir))
        .with_telemetry(telemetry))
}

/// Runs `spec` with `inputs` layered over the crew's defaults.
pub async fn execute_crew(
    spec: &CrewSpec,
    cfg: &RuntimeConfig,
    credentials: Credentials,
    factory: &dyn BackendFactory,
    inputs: &BTreeMap<String, String>,
    telemetry: TelemetrySink,
) -> Result<PipelineResult, CrewError> {
    let pipeline = build_pipeline(spec, cfg, credentials, factory, telemetry)?;
    pipeline.kickoff(&spec.merged_inputs(inputs)).await
}

pub async fn run_crew(
    cfg: &RuntimeConfig,
    credentials: Credentials,
    selector: &CrewSelector,
    raw_inputs: &[String],
    full_output: bool,
    format: OutputFormat,
    telemetry: &TelemetrySink,
) -> Result<()> {
    let spec = resolve_crew(selector)?;
    let inputs = parse_inputs(raw_inputs)?;
    let factory = HttpBackendFactory::new(ProviderSettings::new(cfg, credentials.clone()))?;

    let result = execute_crew(
        &spec,
        cfg,
        credentials,
        &factory,
        &inputs,
        telemetry.clone(),
    )
    .await
    .with_context(|| format!("crew '{}' could not run", spec.name))?;

    match format {
        OutputFormat::Text => println!("{}", render_text(&result, full_output)),
        OutputFormat::Json => println!(
            "{}",
            render_json(&result, full_output).context("failed to serialize crew result")?
        ),
    }
    tracing::info!("{}", summary_line(&result));

    result.ensure_success()?;
    Ok(())
}

/// Validates a crew without contacting any backend: agents, task graph and
/// template inputs.
pub fn check_crew(
    cfg: &RuntimeConfig,
    credentials: Credentials,
    selector: &CrewSelector,
    raw_inputs: &[String],
    telemetry: &TelemetrySink,
) -> Result<()> {
    let spec = resolve_crew(selector)?;
    let inputs = spec.merged_inputs(&parse_inputs(raw_inputs)?);
    let settings = ProviderSettings::new(cfg, credentials);
    let (registry, graph) = assemble(&spec, cfg, settings)?;

    // backends are not built here, so render templates directly
    for task in graph.tasks() {
        let agent = registry.get(&task.agent)?;
        for template in [
            &agent.goal,
            &agent.backstory,
            &task.description,
            &task.expected_output,
        ] {
            crate::task::interpolate(template, &inputs)
                .with_context(|| format!("task '{}' cannot be rendered", task.id))?;
        }
    }

    telemetry.emit(
        "crew.checked",
        json!({
            "crew": spec.name,
            "agents": registry.len(),
            "tasks": graph.len(),
        }),
    );

    println!("Crew '{}' is valid.", spec.name);
    println!("Agents:");
    for agent in registry.iter() {
        println!("- {} ({})", agent.role, agent.model);
    }
    println!("Tasks:");
    for task in graph.tasks() {
        let context = if task.context.is_empty() {
            String::new()
        } else {
            format!(
                " <- {}",
                task.context
                    .iter()
                    .map(|id| id.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            )
        };
        let output = task
            .output_file
            .as_ref()
            .map(|p| format!(" -> {}", p.display()))
            .unwrap_or_default();
        println!("- {} [{}]{}{}", task.id, task.agent, context, output);
    }
    println!("Final output: {}", graph.task(graph.final_task()).id);
    Ok(())
}
