use anyhow::Result;

use crate::config::{ProfilesFile, RuntimeConfig};

pub fn run_profiles_list(profiles: &ProfilesFile, cfg: &RuntimeConfig) -> Result<()> {
    let mut names = profiles.profiles.keys().cloned().collect::<Vec<String>>();
    if !names.iter().any(|name| name == "default") {
        names.push("default".to_string());
    }
    names.sort();

    println!("Configured profiles (active='{}'):", cfg.profile);
    for name in names {
        let marker = if name == cfg.profile { "*" } else { " " };
        let source = if profiles.profiles.contains_key(&name) {
            "configured"
        } else {
            "implicit"
        };
        println!("{marker} {name} ({source})");
    }

    Ok(())
}

pub fn run_profiles_show(cfg: &RuntimeConfig) -> Result<()> {
    println!("Active profile: {}", cfg.profile);
    println!("Config path: {}", cfg.config_path);
    println!(
        "Provider override: {}",
        cfg.provider
            .map(|p| format!("{:?}", p).to_lowercase())
            .unwrap_or_else(|| "<crew-declared>".to_string())
    );
    println!(
        "Model override: {}",
        cfg.model.as_deref().unwrap_or("<crew-declared>")
    );
    println!("OpenAI base URL: {}", cfg.openai_base_url);
    println!("Ollama host: {}", cfg.ollama_host);
    println!("Request timeout (secs): {}", cfg.request_timeout_secs);
    println!(
        "Max requests per minute: {}",
        match cfg.max_rpm {
            Some(0) => "unlimited".to_string(),
            Some(rpm) => rpm.to_string(),
            None => "<crew-declared>".to_string(),
        }
    );
    println!("Retry attempts: {}", cfg.retry_attempts);
    println!("Retry delay (ms): {}", cfg.retry_delay_ms);
    println!("Execution: {:?}", cfg.execution);
    println!("Output dir: {}", cfg.output_dir);
    println!("Telemetry enabled: {}", cfg.telemetry_enabled);
    println!("Telemetry path: {}", cfg.telemetry_path);
    Ok(())
}
