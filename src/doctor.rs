use anyhow::Result;

use crate::config::{Credentials, RuntimeConfig};
use crate::crews::{assemble, builtin_crews};
use crate::provider::{ProviderSettings, detect_provider, env_present};

pub fn run_doctor(cfg: &RuntimeConfig, credentials: &Credentials) -> Result<()> {
    println!(
        "Active profile: '{}' (config: {})",
        cfg.profile, cfg.config_path
    );

    let checks = [
        ("OPENAI_API_KEY", credentials.is_set("OPENAI_API_KEY")),
        ("SERPER_API_KEY", credentials.is_set("SERPER_API_KEY")),
        ("OLLAMA_HOST", env_present("OLLAMA_HOST")),
        ("OPENAI_BASE_URL", env_present("OPENAI_BASE_URL")),
    ];

    println!("Environment check:");
    for (key, ok) in checks {
        let status = if ok { "set" } else { "missing" };
        println!("- {key}: {status}");
    }

    match detect_provider(cfg, credentials) {
        Some(provider) => println!("Usable provider: {:?}", provider),
        None => {
            println!("Usable provider: none");
            println!("Tip: export OPENAI_API_KEY or run with --provider ollama");
        }
    }

    println!(
        "Backends: openai_base_url={} ollama_host={} timeout_secs={}",
        cfg.openai_base_url, cfg.ollama_host, cfg.request_timeout_secs
    );
    println!(
        "Runner: execution={:?} retry_attempts={} retry_delay_ms={} max_rpm={}",
        cfg.execution,
        cfg.retry_attempts,
        cfg.retry_delay_ms,
        match cfg.max_rpm {
            Some(0) => "unlimited".to_string(),
            Some(rpm) => rpm.to_string(),
            None => "<crew-declared>".to_string(),
        }
    );
    println!(
        "Telemetry: enabled={} path={}",
        cfg.telemetry_enabled, cfg.telemetry_path
    );

    println!("Built-in crews:");
    for spec in builtin_crews()? {
        let settings = ProviderSettings::new(cfg, credentials.clone());
        match assemble(&spec, cfg, settings) {
            Ok((registry, _)) => {
                let models = registry
                    .iter()
                    .map(|agent| agent.model.to_string())
                    .collect::<std::collections::BTreeSet<_>>();
                println!(
                    "- {}: ready ({})",
                    spec.name,
                    models.into_iter().collect::<Vec<_>>().join(", ")
                );
            }
            Err(err) => println!("- {}: not ready ({err})", spec.name),
        }
    }

    Ok(())
}
