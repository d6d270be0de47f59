use anyhow::Result;
use clap::Parser;
use serde_json::json;
use tracing::level_filters::LevelFilter;

use crewline::agents::{run_agents_list, run_agents_show, run_crews_list};
use crewline::cli::{
    AgentCommands, Cli, Commands, CrewCommands, ProfileCommands, TelemetryCommands, command_label,
};
use crewline::config::{Credentials, load_profiles, resolve_runtime_config};
use crewline::doctor::run_doctor;
use crewline::error::{categorize_error, format_cli_error};
use crewline::profiles::{run_profiles_list, run_profiles_show};
use crewline::runner::{check_crew, run_crew};
use crewline::telemetry::{TelemetrySink, run_telemetry_report};

#[tokio::main]
async fn main() -> Result<()> {
    // a missing .env is fine
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    if let Err(err) = run_cli(cli).await {
        eprintln!("{}", format_cli_error(&err));
        tracing::error!(category = %categorize_error(&err).code(), error = %err, "command failed");
        std::process::exit(1);
    }

    Ok(())
}

async fn run_cli(cli: Cli) -> Result<()> {
    init_tracing(&cli.log_filter)?;
    let profiles = load_profiles(&cli.config_path)?;
    let cfg = resolve_runtime_config(&cli, &profiles)?;
    let credentials = Credentials::from_env();
    tracing::debug!(profile = %cfg.profile, credentials = ?credentials, "runtime configuration resolved");

    let label = command_label(&cli.command);
    let telemetry = TelemetrySink::new(&cfg, label);
    let started = std::time::Instant::now();

    let outcome = match &cli.command {
        Commands::Run {
            selector,
            inputs,
            full_output,
            format,
        } => {
            tokio::select! {
                result = run_crew(&cfg, credentials, selector, inputs, *full_output, *format, &telemetry) => result,
                _ = tokio::signal::ctrl_c() => Err(anyhow::anyhow!("interrupted; tasks still running were abandoned")),
            }
        }
        Commands::Check { selector, inputs } => {
            check_crew(&cfg, credentials, selector, inputs, &telemetry)
        }
        Commands::Crews { command } => match command {
            CrewCommands::List => run_crews_list(),
        },
        Commands::Agents { command } => match command {
            AgentCommands::List { selector } => run_agents_list(selector),
            AgentCommands::Show { selector, role } => run_agents_show(selector, role),
        },
        Commands::Doctor => run_doctor(&cfg, &credentials),
        Commands::Profiles { command } => match command {
            ProfileCommands::List => run_profiles_list(&profiles, &cfg),
            ProfileCommands::Show => run_profiles_show(&cfg),
        },
        Commands::Telemetry { command } => match command {
            TelemetryCommands::Report { path, limit } => {
                run_telemetry_report(&cfg, path.clone(), *limit)
            }
        },
    };

    let duration_ms = started.elapsed().as_millis() as u64;
    match &outcome {
        Ok(()) => telemetry.emit("command.completed", json!({ "duration_ms": duration_ms })),
        Err(err) => telemetry.emit(
            "command.failed",
            json!({
                "duration_ms": duration_ms,
                "category": categorize_error(err).code(),
            }),
        ),
    }
    outcome
}

fn init_tracing(log_filter: &str) -> Result<()> {
    let level = log_filter
        .parse::<LevelFilter>()
        .unwrap_or(LevelFilter::INFO);
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_env_filter(log_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing subscriber: {e}"))
}
