//! Command handlers for CLI operations
//!
//! - run: start personas until Ctrl-C
//! - check: validate prompt files and secrets for every persona
//! - personas: list configured personas
//! - secret set: store a key in the OS keychain

use anyhow::{bail, Context, Result};
use serde::Serialize;
use serde_json::json;
use std::io::BufRead;
use std::sync::Arc;

use crate::config::Config;
use crate::fleet::Fleet;
use crate::secrets::{SecretCache, SecretManager};

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

/// One line of the `check` report
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CheckItem {
    pub persona: String,
    pub item: String,
    pub ok: bool,
    pub detail: String,
}

impl CheckItem {
    fn new(persona: &str, item: &str, result: std::result::Result<String, String>) -> Self {
        let (ok, detail) = match result {
            Ok(detail) => (true, detail),
            Err(detail) => (false, detail),
        };
        Self {
            persona: persona.to_string(),
            item: item.to_string(),
            ok,
            detail,
        }
    }
}

/// Start the selected personas (all when `personas` is empty)
pub async fn handle_run(config: &Config, personas: &[String]) -> Result<()> {
    let manager = Arc::new(SecretManager::new(config.core.secrets_service.clone()));
    let secrets = Arc::new(SecretCache::new(manager));

    let fleet = Fleet::build(config, secrets, personas)?;
    for persona in fleet.personas() {
        tracing::info!("Prepared persona {}", persona.name());
    }
    fleet.run().await
}

/// Inspect every persona without connecting anywhere
pub fn check_config(config: &Config, secrets: &SecretManager) -> Vec<CheckItem> {
    let mut items = Vec::new();

    for persona in &config.personas {
        items.push(CheckItem::new(
            &persona.name,
            "prompt",
            persona
                .load_prompt()
                .map(|prompt| format!("{} ({} chars)", persona.prompt_file.display(), prompt.len()))
                .map_err(|e| e.to_string()),
        ));

        items.push(CheckItem::new(
            &persona.name,
            "token",
            if secrets.has_secret(&persona.token_secret) {
                Ok(persona.token_secret.clone())
            } else {
                Err(format!(
                    "'{}' not found (set {})",
                    persona.token_secret,
                    SecretManager::env_var_name(&persona.token_secret)
                ))
            },
        ));

        let provider = persona.provider(&config.llm);
        let provider_result = if provider == "openai" {
            let key = &config.llm.openai.api_key_secret;
            if secrets.has_secret(key) {
                Ok(format!("openai ({})", key))
            } else {
                Err(format!(
                    "openai key '{}' not found (set {})",
                    key,
                    SecretManager::env_var_name(key)
                ))
            }
        } else {
            Ok(provider.to_string())
        };
        items.push(CheckItem::new(&persona.name, "provider", provider_result));
    }

    items
}

pub async fn handle_check(config: &Config, format: OutputFormat) -> Result<()> {
    let secrets = SecretManager::new(config.core.secrets_service.clone());
    let items = check_config(config, &secrets);
    let failures = items.iter().filter(|item| !item.ok).count();

    match format {
        OutputFormat::Text => {
            if config.personas.is_empty() {
                println!("Configuration is valid but defines no personas.");
            }
            for item in &items {
                let mark = if item.ok { "ok  " } else { "FAIL" };
                println!("[{}] {:<12} {:<9} {}", mark, item.persona, item.item, item.detail);
            }
        }
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({ "checks": items, "failures": failures }))?
            );
        }
    }

    if failures > 0 {
        bail!("{} check(s) failed", failures);
    }
    Ok(())
}

pub fn handle_personas(config: &Config, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            if config.personas.is_empty() {
                println!("No personas configured.");
                return Ok(());
            }
            for persona in &config.personas {
                println!(
                    "{:<12} channel {:<20} {} / {}",
                    persona.name,
                    persona.channel_id,
                    persona.provider(&config.llm),
                    persona.model.as_deref().unwrap_or("default model")
                );
            }
        }
        OutputFormat::Json => {
            let personas: Vec<_> = config
                .personas
                .iter()
                .map(|p| {
                    json!({
                        "name": p.name,
                        "channel_id": p.channel_id,
                        "provider": p.provider(&config.llm),
                        "model": p.model,
                        "prompt_file": p.prompt_file,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&personas)?);
        }
    }
    Ok(())
}

/// Store a secret read as one line from stdin
pub fn handle_secret_set(config: &Config, key: &str) -> Result<()> {
    eprintln!("Enter value for '{}' and press Enter:", key);
    let mut value = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut value)
        .context("Failed to read secret from stdin")?;

    let manager = SecretManager::new(config.core.secrets_service.clone());
    manager.set_secret(key, value.trim())?;
    println!("Stored '{}' in the keychain.", key);
    Ok(())
}
