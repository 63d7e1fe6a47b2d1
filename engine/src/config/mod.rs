//! Configuration management
//!
//! This module handles loading, validation, and management of the chorus
//! configuration. Configuration is stored in TOML format at
//! ~/.chorus/config.toml.
//!
//! # Configuration Sections
//!
//! - **core**: log level, admin command prefix, history fetch timeout
//! - **llm**: completion provider settings
//! - **discord**: REST and gateway endpoints
//! - **personas**: one entry per bot instance (channel, prompt, timing)
//!
//! Secrets (bot tokens, API keys) never live in this file. Each persona names
//! the secret key its token is stored under; see `crate::secrets`.
//!
//! # Examples
//!
//! ```no_run
//! use chorus_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load_or_create()?;
//! for persona in &config.personas {
//!     println!("{} -> channel {}", persona.name, persona.channel_id);
//! }
//! # Ok(())
//! # }
//! ```

use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

pub mod runtime;

pub use runtime::{DelayRange, RuntimeSettings};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Core engine settings
    pub core: CoreConfig,

    /// Completion provider configuration
    pub llm: LLMConfig,

    /// Discord endpoints
    #[serde(default)]
    pub discord: DiscordConfig,

    /// Configured personas
    #[serde(default)]
    pub personas: Vec<PersonaConfig>,
}

/// Core engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Prefix marking administrative commands; such messages never enter memory
    #[serde(default = "default_command_prefix")]
    pub command_prefix: String,

    /// Upper bound on channel history prefetch at startup (seconds)
    #[serde(default = "default_history_timeout")]
    pub history_timeout_secs: u64,

    /// Keychain service name secrets are stored under
    #[serde(default = "default_secrets_service")]
    pub secrets_service: String,
}

/// Completion provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMConfig {
    /// Default provider (openai, ollama)
    pub default_provider: String,

    /// Per-call timeout applied around the completion service (seconds)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Completion attempts per tick before giving up on echoed output
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,

    /// OpenAI provider settings
    #[serde(default)]
    pub openai: OpenAIConfig,

    /// Ollama provider settings
    #[serde(default)]
    pub ollama: OllamaConfig,
}

/// OpenAI provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIConfig {
    /// Base URL for OpenAI API
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,

    /// Model name
    #[serde(default = "default_openai_model")]
    pub model: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f64,

    /// Presence penalty discouraging repeated topics
    #[serde(default = "default_presence_penalty")]
    pub presence_penalty: f64,

    /// Completion token cap
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Secret key the API key is stored under
    #[serde(default = "default_openai_secret")]
    pub api_key_secret: String,
}

/// Ollama provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    /// Base URL for Ollama API
    #[serde(default = "default_ollama_base_url")]
    pub base_url: String,

    /// Model name
    #[serde(default = "default_ollama_model")]
    pub model: String,
}

/// Discord endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    /// REST API base URL
    #[serde(default = "default_discord_api_base")]
    pub api_base: String,

    /// Gateway websocket URL
    #[serde(default = "default_discord_gateway_url")]
    pub gateway_url: String,

    /// Delay before reconnecting a dropped gateway connection (seconds)
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_secs: u64,
}

/// One bot instance bound to one channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaConfig {
    /// Display name, also used in the status line
    pub name: String,

    /// Channel the persona listens and speaks in
    pub channel_id: u64,

    /// Secret key the bot token is stored under
    pub token_secret: String,

    /// Persona prompt file (supports ~ expansion)
    pub prompt_file: PathBuf,

    /// Provider override (defaults to `llm.default_provider`)
    #[serde(default)]
    pub provider: Option<String>,

    /// Model override
    #[serde(default)]
    pub model: Option<String>,

    /// Memory and pacing
    #[serde(default)]
    pub timing: TimingConfig,
}

/// Memory size and pacing for a persona
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    #[serde(default = "default_memory_size")]
    pub memory_size: usize,

    #[serde(default = "default_delay_min")]
    pub delay_min: u64,

    #[serde(default = "default_delay_max")]
    pub delay_max: u64,

    #[serde(default = "default_true")]
    pub night_mode: bool,

    #[serde(default = "default_night_delay_min")]
    pub night_delay_min: u64,

    #[serde(default = "default_night_delay_max")]
    pub night_delay_max: u64,

    /// Countdown granularity (seconds)
    #[serde(default = "default_countdown_tick")]
    pub countdown_tick_secs: u64,

    /// Start with the debug context echo enabled
    #[serde(default)]
    pub debug: bool,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            memory_size: default_memory_size(),
            delay_min: default_delay_min(),
            delay_max: default_delay_max(),
            night_mode: true,
            night_delay_min: default_night_delay_min(),
            night_delay_max: default_night_delay_max(),
            countdown_tick_secs: default_countdown_tick(),
            debug: false,
        }
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_command_prefix() -> String {
    "#".to_string()
}

fn default_history_timeout() -> u64 {
    20
}

fn default_secrets_service() -> String {
    "chorus".to_string()
}

fn default_request_timeout() -> u64 {
    60
}

fn default_max_attempts() -> usize {
    3
}

fn default_true() -> bool {
    true
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_temperature() -> f64 {
    0.8
}

fn default_presence_penalty() -> f64 {
    1.5
}

fn default_max_tokens() -> u32 {
    256
}

fn default_openai_secret() -> String {
    "openai_api_key".to_string()
}

fn default_ollama_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_ollama_model() -> String {
    "llama3.1:8b".to_string()
}

fn default_discord_api_base() -> String {
    "https://discord.com/api/v10".to_string()
}

fn default_discord_gateway_url() -> String {
    "wss://gateway.discord.gg/?v=10&encoding=json".to_string()
}

fn default_reconnect_delay() -> u64 {
    5
}

fn default_memory_size() -> usize {
    10
}

fn default_delay_min() -> u64 {
    15
}

fn default_delay_max() -> u64 {
    25
}

fn default_night_delay_min() -> u64 {
    40
}

fn default_night_delay_max() -> u64 {
    60
}

fn default_countdown_tick() -> u64 {
    3
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            base_url: default_openai_base_url(),
            model: default_openai_model(),
            temperature: default_temperature(),
            presence_penalty: default_presence_penalty(),
            max_tokens: default_max_tokens(),
            api_key_secret: default_openai_secret(),
        }
    }
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: default_ollama_base_url(),
            model: default_ollama_model(),
        }
    }
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            api_base: default_discord_api_base(),
            gateway_url: default_discord_gateway_url(),
            reconnect_delay_secs: default_reconnect_delay(),
        }
    }
}

/// Providers a persona may use
pub const VALID_PROVIDERS: [&str; 2] = ["openai", "ollama"];

impl PersonaConfig {
    /// Provider this persona talks to
    pub fn provider<'a>(&'a self, llm: &'a LLMConfig) -> &'a str {
        self.provider.as_deref().unwrap_or(&llm.default_provider)
    }

    /// Read the persona prompt from disk
    pub fn load_prompt(&self) -> Result<String, EngineError> {
        fs::read_to_string(&self.prompt_file).map_err(|e| EngineError::PromptLoad {
            persona: self.name.clone(),
            reason: format!("{}: {}", self.prompt_file.display(), e),
        })
    }
}

impl Config {
    /// Load configuration from the default location (~/.chorus/config.toml)
    ///
    /// If the configuration file doesn't exist, creates a default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    pub fn load_or_create() -> Result<Self, EngineError> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            Self::create_default(&config_path)
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_toml_str(&contents)
    }

    /// Parse and validate configuration text
    pub fn from_toml_str(contents: &str) -> Result<Self, EngineError> {
        let mut config: Config = toml::from_str(contents)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate_and_process()?;

        Ok(config)
    }

    /// Create default configuration and save to path
    fn create_default(path: &Path) -> Result<Self, EngineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                EngineError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let mut config = Self::default_config();
        config.validate_and_process()?;

        let toml_string = toml::to_string_pretty(&config)
            .map_err(|e| EngineError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| EngineError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(config)
    }

    /// Get the default configuration file path (~/.chorus/config.toml)
    fn default_config_path() -> Result<PathBuf, EngineError> {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".chorus").join("config.toml"))
    }

    /// Create a default configuration with no personas
    fn default_config() -> Self {
        Self {
            core: CoreConfig {
                log_level: default_log_level(),
                command_prefix: default_command_prefix(),
                history_timeout_secs: default_history_timeout(),
                secrets_service: default_secrets_service(),
            },
            llm: LLMConfig {
                default_provider: "openai".to_string(),
                request_timeout_secs: default_request_timeout(),
                max_attempts: default_max_attempts(),
                openai: OpenAIConfig::default(),
                ollama: OllamaConfig::default(),
            },
            discord: DiscordConfig::default(),
            personas: Vec::new(),
        }
    }

    /// Validate and process configuration
    ///
    /// This method:
    /// - Validates log level, providers and numeric ranges
    /// - Checks persona names are unique and non-empty
    /// - Validates each persona's timing through `RuntimeSettings`
    /// - Expands ~ in prompt file paths
    fn validate_and_process(&mut self) -> Result<(), EngineError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        if self.core.command_prefix.trim().is_empty() {
            return Err(EngineError::Config(
                "command_prefix must not be empty".to_string(),
            ));
        }

        if self.core.history_timeout_secs == 0 {
            return Err(EngineError::Config(
                "history_timeout_secs must be at least 1".to_string(),
            ));
        }

        if !VALID_PROVIDERS.contains(&self.llm.default_provider.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid default provider '{}'. Must be one of: {}",
                self.llm.default_provider,
                VALID_PROVIDERS.join(", ")
            )));
        }

        if self.llm.request_timeout_secs == 0 {
            return Err(EngineError::Config(
                "request_timeout_secs must be at least 1".to_string(),
            ));
        }

        if !(1..=10).contains(&self.llm.max_attempts) {
            return Err(EngineError::Config(
                "max_attempts must be between 1 and 10".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for persona in &mut self.personas {
            if persona.name.trim().is_empty() {
                return Err(EngineError::Config("Persona name must not be empty".to_string()));
            }
            if !seen.insert(persona.name.clone()) {
                return Err(EngineError::Config(format!(
                    "Duplicate persona name '{}'",
                    persona.name
                )));
            }
            if let Some(provider) = &persona.provider {
                if !VALID_PROVIDERS.contains(&provider.as_str()) {
                    return Err(EngineError::Config(format!(
                        "Invalid provider '{}' for persona '{}'",
                        provider, persona.name
                    )));
                }
            }

            RuntimeSettings::from_timing(&persona.timing).map_err(|e| {
                EngineError::Config(format!("Persona '{}': {}", persona.name, e))
            })?;

            persona.prompt_file = expand_path(&persona.prompt_file)?;
        }

        Ok(())
    }
}

/// Expand ~ in path to user's home directory
fn expand_path(path: &Path) -> Result<PathBuf, EngineError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| EngineError::Config("Invalid UTF-8 in path".to_string()))?;

    if let Some(rest) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(rest))
    } else if path_str == "~" {
        dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}
