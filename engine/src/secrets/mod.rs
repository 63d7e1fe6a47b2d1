pub mod cache;
pub mod string;

pub use cache::SecretCache;
pub use string::SecretString;

use keyring::Entry;
use regex::Regex;
use sdk::errors::EngineError;
use std::sync::OnceLock;

/// SecretManager resolves bot tokens and API keys by key name.
///
/// Lookup order:
/// 1. Environment variable `CHORUS_<KEY>` (key upper-cased), for containers
///    and CI where no keychain exists
/// 2. The OS keychain under the configured service name
///
/// The SecretManager also provides secret scrubbing for anything that may be
/// logged or posted back into a channel.
pub struct SecretManager {
    service_name: String,
}

/// Regex patterns for detecting common secret formats, each with the text
/// that replaces a match. Compiled once and reused.
static SECRET_PATTERNS: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();

/// Initializes and returns the secret detection patterns.
///
/// Patterns match:
/// - OpenAI API keys: `sk-` (optionally `sk-proj-`) at a word start, then 20+ key characters
/// - Discord bot tokens: three dot-separated base64url segments
/// - `Authorization:` headers carrying a Bearer or Bot credential (the
///   header name is kept)
fn get_secret_patterns() -> &'static Vec<(Regex, &'static str)> {
    SECRET_PATTERNS.get_or_init(|| {
        vec![
            (
                Regex::new(r"\bsk-(?:proj-)?[A-Za-z0-9_\-]{20,}").expect("Invalid OpenAI pattern"),
                "[REDACTED]",
            ),
            (
                Regex::new(r"\b[MNO][a-zA-Z0-9_\-]{23,27}\.[a-zA-Z0-9_\-]{6}\.[a-zA-Z0-9_\-]{27,40}")
                    .expect("Invalid Discord pattern"),
                "[REDACTED]",
            ),
            (
                Regex::new(r"(?i)(authorization:\s*)(?:bearer|bot)\s+\S+")
                    .expect("Invalid authorization pattern"),
                "${1}[REDACTED]",
            ),
        ]
    })
}

impl SecretManager {
    /// Creates a new SecretManager with the given keychain service name.
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
        }
    }

    /// Environment variable consulted before the keychain
    pub fn env_var_name(key: &str) -> String {
        format!("CHORUS_{}", key.to_uppercase().replace(['-', '.'], "_"))
    }

    /// Retrieves a secret from the environment or the OS keychain.
    ///
    /// # Errors
    /// Returns `EngineError::SecretNotFound` when neither source has the key,
    /// `EngineError::KeyringError` if keychain access itself fails
    pub fn get_secret(&self, key: &str) -> Result<String, EngineError> {
        if let Ok(value) = std::env::var(Self::env_var_name(key)) {
            if !value.trim().is_empty() {
                tracing::debug!("Resolved secret '{}' from environment", key);
                return Ok(value.trim().to_string());
            }
        }

        let entry = Entry::new(&self.service_name, key).map_err(|e| {
            EngineError::KeyringError(format!("Failed to create keyring entry: {}", e))
        })?;

        match entry.get_password() {
            Ok(secret) => {
                tracing::debug!("Retrieved secret '{}' from keychain", key);
                Ok(secret)
            }
            Err(keyring::Error::NoEntry) => Err(EngineError::SecretNotFound(format!(
                "'{}' (set {} or store it in the keychain)",
                key,
                Self::env_var_name(key)
            ))),
            Err(e) => Err(EngineError::KeyringError(format!(
                "Failed to retrieve secret '{}': {}",
                key, e
            ))),
        }
    }

    /// Stores a secret in the OS keychain.
    pub fn set_secret(&self, key: &str, value: &str) -> Result<(), EngineError> {
        if value.trim().is_empty() {
            return Err(EngineError::KeyringError(
                "Secret cannot be empty".to_string(),
            ));
        }

        let entry = Entry::new(&self.service_name, key).map_err(|e| {
            EngineError::KeyringError(format!("Failed to create keyring entry: {}", e))
        })?;

        entry.set_password(value).map_err(|e| {
            EngineError::KeyringError(format!("Failed to store secret '{}': {}", key, e))
        })?;

        tracing::info!("Stored secret '{}' in keychain", key);
        Ok(())
    }

    /// Checks whether a secret is resolvable without returning it.
    pub fn has_secret(&self, key: &str) -> bool {
        self.get_secret(key).is_ok()
    }

    /// Scrubs secrets from text by replacing them with [REDACTED].
    ///
    /// # Examples
    /// ```
    /// use chorus_engine::secrets::SecretManager;
    ///
    /// let manager = SecretManager::new("test");
    /// let scrubbed = manager.scrub("My API key is sk-1234567890abcdefghij");
    /// assert_eq!(scrubbed, "My API key is [REDACTED]");
    /// ```
    pub fn scrub(&self, text: &str) -> String {
        scrub(text)
    }
}

/// Free-standing scrubber used by components without a `SecretManager`
pub fn scrub(text: &str) -> String {
    let mut result = text.to_string();

    for (pattern, replacement) in get_secret_patterns() {
        result = pattern.replace_all(&result, *replacement).to_string();
    }

    result
}
