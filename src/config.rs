use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::cli::*;
use crate::provider::{DEFAULT_OLLAMA_HOST, DEFAULT_OPENAI_BASE_URL};

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub profile: String,
    pub config_path: String,
    pub provider: Option<Provider>,
    pub model: Option<String>,
    pub openai_base_url: String,
    pub ollama_host: String,
    pub request_timeout_secs: u64,
    pub max_rpm: Option<u32>,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
    pub execution: ExecutionMode,
    pub output_dir: String,
    pub telemetry_enabled: bool,
    pub telemetry_path: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfilesFile {
    #[serde(default)]
    pub profiles: HashMap<String, ProfileConfig>,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileConfig {
    pub provider: Option<Provider>,
    pub model: Option<String>,
    pub openai_base_url: Option<String>,
    pub ollama_host: Option<String>,
    pub request_timeout_secs: Option<u64>,
    pub max_rpm: Option<u32>,
    pub retry_attempts: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    pub execution: Option<ExecutionMode>,
    pub output_dir: Option<String>,
    pub telemetry_enabled: Option<bool>,
    pub telemetry_path: Option<String>,
}

/// Backend and tool credentials, captured once at startup and passed
/// explicitly to whatever needs them.
#[derive(Clone, Default)]
pub struct Credentials {
    openai_api_key: Option<String>,
    serper_api_key: Option<String>,
}

impl Credentials {
    pub fn new(openai_api_key: Option<String>, serper_api_key: Option<String>) -> Self {
        Self {
            openai_api_key: non_empty(openai_api_key),
            serper_api_key: non_empty(serper_api_key),
        }
    }

    /// Reads `OPENAI_API_KEY` and `SERPER_API_KEY`. Call after `.env` has been loaded.
    pub fn from_env() -> Self {
        Self::new(
            std::env::var("OPENAI_API_KEY").ok(),
            std::env::var("SERPER_API_KEY").ok(),
        )
    }

    pub fn openai_api_key(&self) -> Option<&str> {
        self.openai_api_key.as_deref()
    }

    pub fn is_set(&self, var: &str) -> bool {
        match var {
            "OPENAI_API_KEY" => self.openai_api_key.is_some(),
            "SERPER_API_KEY" => self.serper_api_key.is_some(),
            _ => false,
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = |value: &Option<String>| if value.is_some() { "set" } else { "missing" };
        f.debug_struct("Credentials")
            .field("openai_api_key", &state(&self.openai_api_key))
            .field("serper_api_key", &state(&self.serper_api_key))
            .finish()
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn load_profiles(config_path: &str) -> Result<ProfilesFile> {
    let path = Path::new(config_path);
    if !path.exists() {
        return Ok(ProfilesFile::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read profile config file at '{}'", path.display()))?;
    toml::from_str::<ProfilesFile>(&content).with_context(|| {
        format!(
            "invalid profile configuration in '{}'. Check provider/execution values and field names.",
            path.display()
        )
    })
}

pub fn resolve_runtime_config(cli: &Cli, profiles: &ProfilesFile) -> Result<RuntimeConfig> {
    let selected = cli.profile.trim();
    if selected.is_empty() {
        return Err(anyhow::anyhow!(
            "profile name cannot be empty. Set --profile <name>."
        ));
    }

    let profile = if selected == "default" && !profiles.profiles.contains_key("default") {
        ProfileConfig::default()
    } else {
        profiles.profiles.get(selected).cloned().ok_or_else(|| {
            let mut names = profiles.profiles.keys().cloned().collect::<Vec<String>>();
            names.sort();
            if names.is_empty() {
                anyhow::anyhow!(
                    "profile '{}' not found in '{}'. No profiles are defined yet.",
                    selected,
                    cli.config_path
                )
            } else {
                anyhow::anyhow!(
                    "profile '{}' not found in '{}'. Available profiles: {}",
                    selected,
                    cli.config_path,
                    names.join(", ")
                )
            }
        })?
    };

    Ok(RuntimeConfig {
        profile: selected.to_string(),
        config_path: cli.config_path.clone(),
        provider: cli.provider.or(profile.provider),
        model: cli
            .model
            .clone()
            .or(profile.model)
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty()),
        openai_base_url: cli
            .openai_base_url
            .clone()
            .or(profile.openai_base_url)
            .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
        ollama_host: cli
            .ollama_host
            .clone()
            .or(profile.ollama_host)
            .unwrap_or_else(|| DEFAULT_OLLAMA_HOST.to_string()),
        request_timeout_secs: cli
            .request_timeout_secs
            .or(profile.request_timeout_secs)
            .unwrap_or(300)
            .max(1),
        max_rpm: cli.max_rpm.or(profile.max_rpm),
        retry_attempts: cli
            .retry_attempts
            .or(profile.retry_attempts)
            .unwrap_or(2)
            .max(1),
        retry_delay_ms: cli
            .retry_delay_ms
            .or(profile.retry_delay_ms)
            .unwrap_or(500),
        execution: cli
            .execution
            .or(profile.execution)
            .unwrap_or(ExecutionMode::Sequential),
        output_dir: cli
            .output_dir
            .clone()
            .or(profile.output_dir)
            .unwrap_or_else(|| ".".to_string()),
        telemetry_enabled: cli
            .telemetry_enabled
            .or(profile.telemetry_enabled)
            .unwrap_or(true),
        telemetry_path: cli
            .telemetry_path
            .clone()
            .or(profile.telemetry_path)
            .unwrap_or_else(|| ".crewline/telemetry/events.jsonl".to_string()),
    })
}

/// Parses repeated `--input key=value` arguments. Later keys win.
pub fn parse_inputs(raw: &[String]) -> Result<BTreeMap<String, String>> {
    let mut inputs = BTreeMap::new();
    for entry in raw {
        let (key, value) = entry.split_once('=').ok_or_else(|| {
            anyhow::anyhow!("invalid value '{entry}' for --input: expected KEY=VALUE")
        })?;
        let key = key.trim();
        if key.is_empty() {
            return Err(anyhow::anyhow!(
                "invalid value '{entry}' for --input: key cannot be empty"
            ));
        }
        inputs.insert(key.to_string(), value.to_string());
    }
    Ok(inputs)
}
