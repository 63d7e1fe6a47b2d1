//! Fleet
//!
//! Builds one session per configured persona and runs them side by side.
//! Personas share no state; each owns its buffer, scheduler, gateway and
//! completion client.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use sdk::ChatGateway;
use tracing::{info, info_span, Instrument};

use crate::agent::{PersonaState, ResponseSelector, Scheduler};
use crate::bot::DiscordGateway;
use crate::config::{Config, DiscordConfig, PersonaConfig, RuntimeSettings};
use crate::llm::ollama::OllamaProvider;
use crate::llm::openai::OpenAIProvider;
use crate::llm::{LLMProvider, TimedProvider};
use crate::secrets::SecretCache;
use crate::session::BotSession;

/// Everything needed to start one persona
pub struct PersonaRuntime {
    name: String,
    session: BotSession,
    scheduler: Scheduler,
    gateway: Arc<DiscordGateway>,
}

impl PersonaRuntime {
    pub fn name(&self) -> &str {
        &self.name
    }
}

pub struct Fleet {
    personas: Vec<PersonaRuntime>,
    discord: DiscordConfig,
}

/// Build the completion client for a persona, wrapped in the request deadline
pub fn build_provider(
    config: &Config,
    persona: &PersonaConfig,
    secrets: &Arc<SecretCache>,
) -> Result<Arc<dyn LLMProvider>> {
    let inner: Arc<dyn LLMProvider> = match persona.provider(&config.llm) {
        "openai" => {
            let provider = OpenAIProvider::new(config.llm.openai.clone(), Arc::clone(secrets));
            match &persona.model {
                Some(model) => Arc::new(provider.with_model(model.clone())),
                None => Arc::new(provider),
            }
        }
        "ollama" => {
            let model = persona
                .model
                .clone()
                .unwrap_or_else(|| config.llm.ollama.model.clone());
            Arc::new(OllamaProvider::new(config.llm.ollama.base_url.clone(), model))
        }
        other => bail!("Unknown provider '{}' for persona '{}'", other, persona.name),
    };

    Ok(Arc::new(TimedProvider::new(
        inner,
        Duration::from_secs(config.llm.request_timeout_secs),
    )))
}

impl Fleet {
    /// Build sessions for the selected personas (all when `only` is empty)
    pub fn build(config: &Config, secrets: Arc<SecretCache>, only: &[String]) -> Result<Self> {
        for name in only {
            if !config.personas.iter().any(|p| &p.name == name) {
                bail!("No persona named '{}' in configuration", name);
            }
        }

        let selected: Vec<&PersonaConfig> = config
            .personas
            .iter()
            .filter(|p| only.is_empty() || only.contains(&p.name))
            .collect();
        if selected.is_empty() {
            bail!("No personas configured. Add a [[personas]] section to the config file.");
        }

        if selected.iter().any(|p| p.provider(&config.llm) == "openai") {
            let key = config.llm.openai.api_key_secret.as_str();
            secrets
                .preload(&[key])
                .with_context(|| format!("OpenAI key '{}' is not available", key))?;
        }

        let mut personas = Vec::with_capacity(selected.len());
        for persona in selected {
            personas.push(
                Self::build_persona(config, persona, &secrets)
                    .with_context(|| format!("Failed to set up persona '{}'", persona.name))?,
            );
        }

        Ok(Self {
            personas,
            discord: config.discord.clone(),
        })
    }

    fn build_persona(
        config: &Config,
        persona: &PersonaConfig,
        secrets: &Arc<SecretCache>,
    ) -> Result<PersonaRuntime> {
        let prompt = persona.load_prompt()?;
        let settings = RuntimeSettings::from_timing(&persona.timing)?;
        let state = Arc::new(PersonaState::new(
            persona.name.clone(),
            config.core.command_prefix.clone(),
            settings,
            prompt,
        )?);

        let token = secrets.get_secret(&persona.token_secret)?;
        let gateway = Arc::new(DiscordGateway::new(&config.discord, persona.channel_id, token));
        let chat: Arc<dyn ChatGateway> = Arc::<DiscordGateway>::clone(&gateway);

        let provider = build_provider(config, persona, secrets)?;
        info!(
            "Persona '{}' completes with {} ({})",
            persona.name,
            provider.name(),
            if provider.is_local() { "local" } else { "remote" }
        );
        let selector = ResponseSelector::new(provider).with_max_attempts(config.llm.max_attempts);
        let scheduler = Scheduler::new(Arc::clone(&state), selector, Arc::clone(&chat));

        let session = BotSession::new(state, chat, persona.prompt_file.clone())
            .with_history_timeout(Duration::from_secs(config.core.history_timeout_secs));

        Ok(PersonaRuntime {
            name: persona.name.clone(),
            session,
            scheduler,
            gateway,
        })
    }

    pub fn personas(&self) -> &[PersonaRuntime] {
        &self.personas
    }

    /// Start every persona and wait for Ctrl-C
    pub async fn run(self) -> Result<()> {
        let mut tasks = Vec::with_capacity(self.personas.len());

        for persona in self.personas {
            let span = info_span!("persona", name = %persona.name);
            let events = span.in_scope(|| persona.gateway.connect(&self.discord));
            info!(parent: &span, "Starting persona");
            tasks.push(tokio::spawn(
                persona.session.run(events, persona.scheduler).instrument(span),
            ));
        }

        info!("{} persona(s) running. Press Ctrl-C to stop.", tasks.len());
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl-C")?;

        info!("Shutting down");
        for task in tasks {
            task.abort();
        }
        Ok(())
    }
}
