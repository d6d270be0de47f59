use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Openai,
    Ollama,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    Sequential,
    Concurrent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Args)]
pub struct CrewSelector {
    #[arg(help = "Built-in crew name (see `crews list`)")]
    pub crew: Option<String>,

    #[arg(long, help = "Load the crew from a TOML crew file instead")]
    pub crew_file: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum CrewCommands {
    #[command(about = "List built-in crews")]
    List,
}

#[derive(Debug, Subcommand)]
pub enum AgentCommands {
    #[command(about = "List the agents a crew declares")]
    List {
        #[command(flatten)]
        selector: CrewSelector,
    },
    #[command(about = "Show one agent descriptor")]
    Show {
        #[command(flatten)]
        selector: CrewSelector,
        #[arg(long)]
        role: String,
    },
}

#[derive(Debug, Subcommand)]
pub enum ProfileCommands {
    #[command(about = "List configured profiles and highlight the active profile")]
    List,
    #[command(about = "Show the active profile's resolved runtime settings")]
    Show,
}

#[derive(Debug, Subcommand)]
pub enum TelemetryCommands {
    #[command(about = "Summarize telemetry events from a JSONL stream")]
    Report {
        #[arg(long)]
        path: Option<String>,
        #[arg(long, default_value_t = 5000)]
        limit: usize,
    },
}

const CLI_EXAMPLES: &str = "Examples:\n\
  crewline run tech-blog --input topic=\"AI in healthcare\"\n\
  crewline run email-reply --input email=\"Hi, this is John your neighbour - your house is on fire!\"\n\
  crewline --provider ollama --model llama3:instruct run email-reply\n\
  crewline run --crew-file crews/triage.toml --full-output --format json\n\
  crewline check tech-blog\n\
  crewline crews list\n\
  crewline agents show email-reply --role \"Email Classifier\"\n\
  crewline doctor\n\
  crewline telemetry report --limit 2000\n\
\n\
Credentials:\n\
  - OPENAI_API_KEY and SERPER_API_KEY are read from the environment or a local .env file.\n\
  - --provider/--model override the backend of every agent in the crew.";

#[derive(Debug, Parser)]
#[command(name = "crewline")]
#[command(about = "Run declarative multi-agent crews against OpenAI or Ollama")]
#[command(after_long_help = CLI_EXAMPLES)]
pub struct Cli {
    #[arg(long, env = "CREWLINE_PROVIDER", value_enum)]
    pub provider: Option<Provider>,

    #[arg(long, env = "CREWLINE_MODEL")]
    pub model: Option<String>,

    #[arg(long, env = "CREWLINE_PROFILE", default_value = "default")]
    pub profile: String,

    #[arg(long, env = "CREWLINE_CONFIG", default_value = ".crewline/config.toml")]
    pub config_path: String,

    #[arg(long, env = "OPENAI_BASE_URL")]
    pub openai_base_url: Option<String>,

    #[arg(long, env = "OLLAMA_HOST")]
    pub ollama_host: Option<String>,

    #[arg(long, env = "CREWLINE_REQUEST_TIMEOUT_SECS")]
    pub request_timeout_secs: Option<u64>,

    #[arg(
        long,
        env = "CREWLINE_MAX_RPM",
        help = "Requests per minute across all agents; 0 disables the crew's ceiling"
    )]
    pub max_rpm: Option<u32>,

    #[arg(long, env = "CREWLINE_RETRY_ATTEMPTS")]
    pub retry_attempts: Option<u32>,

    #[arg(long, env = "CREWLINE_RETRY_DELAY_MS")]
    pub retry_delay_ms: Option<u64>,

    #[arg(long, env = "CREWLINE_EXECUTION", value_enum)]
    pub execution: Option<ExecutionMode>,

    #[arg(long, env = "CREWLINE_OUTPUT_DIR")]
    pub output_dir: Option<String>,

    #[arg(long, env = "CREWLINE_TELEMETRY_ENABLED", action = clap::ArgAction::Set)]
    pub telemetry_enabled: Option<bool>,

    #[arg(long, env = "CREWLINE_TELEMETRY_PATH")]
    pub telemetry_path: Option<String>,

    #[arg(long, env = "RUST_LOG", default_value = "warn")]
    pub log_filter: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    #[command(about = "Run a crew and write its output files")]
    Run {
        #[command(flatten)]
        selector: CrewSelector,
        #[arg(long = "input", value_name = "KEY=VALUE")]
        inputs: Vec<String>,
        #[arg(long, default_value_t = false)]
        full_output: bool,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    #[command(about = "Validate a crew's agents, task graph and templates without calling a model")]
    Check {
        #[command(flatten)]
        selector: CrewSelector,
        #[arg(long = "input", value_name = "KEY=VALUE")]
        inputs: Vec<String>,
    },
    #[command(about = "Inspect built-in crews")]
    Crews {
        #[command(subcommand)]
        command: CrewCommands,
    },
    #[command(about = "Inspect the agents of a crew")]
    Agents {
        #[command(subcommand)]
        command: AgentCommands,
    },
    #[command(about = "Validate credentials and backend configuration")]
    Doctor,
    #[command(about = "Inspect profile configuration and active resolved profile state")]
    Profiles {
        #[command(subcommand)]
        command: ProfileCommands,
    },
    #[command(about = "Telemetry utilities and reporting")]
    Telemetry {
        #[command(subcommand)]
        command: TelemetryCommands,
    },
}

pub fn command_label(command: &Commands) -> String {
    match command {
        Commands::Run { .. } => "run".to_string(),
        Commands::Check { .. } => "check".to_string(),
        Commands::Crews { command } => match command {
            CrewCommands::List => "crews.list".to_string(),
        },
        Commands::Agents { command } => match command {
            AgentCommands::List { .. } => "agents.list".to_string(),
            AgentCommands::Show { .. } => "agents.show".to_string(),
        },
        Commands::Doctor => "doctor".to_string(),
        Commands::Profiles { command } => match command {
            ProfileCommands::List => "profiles.list".to_string(),
            ProfileCommands::Show => "profiles.show".to_string(),
        },
        Commands::Telemetry { command } => match command {
            TelemetryCommands::Report { .. } => "telemetry.report".to_string(),
        },
    }
}
