//! Error types and handling
//!
//! This module provides the error types used throughout the chorus engine.
//! All errors implement the `ChorusErrorExt` trait which provides user-friendly
//! hints and indicates whether errors are recoverable.
//!
//! # Security
//!
//! Error messages never carry API keys or bot tokens. Strings that may contain
//! remote payloads are scrubbed by the engine before they are logged or posted.

use thiserror::Error;

/// Trait for chorus error extensions
///
/// Provides a short hint suitable for an admin acknowledgment in the channel
/// and tells the caller whether retrying later makes sense.
pub trait ChorusErrorExt {
    /// Returns a user-friendly hint for the error
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    ///
    /// Recoverable errors degrade to "do nothing this cycle". Non-recoverable
    /// errors stop the persona that raised them.
    fn is_recoverable(&self) -> bool;
}

/// Main engine error type
///
/// # Error Categories
///
/// - **Configuration**: Invalid or missing configuration
/// - **Validation**: Administrative input out of range
/// - **Gateway**: Chat transport failures (send, fetch, presence)
/// - **Completion**: Completion service failures
/// - **Secrets**: Keychain or environment lookup failures
///
/// # Examples
///
/// ```
/// use sdk::errors::{ChorusErrorExt, EngineError};
///
/// let error = EngineError::Validation("memory size must be between 1 and 100".into());
/// assert!(error.is_recoverable());
///
/// let fatal = EngineError::Config("no personas configured".into());
/// assert!(!fatal.is_recoverable());
/// ```
#[derive(Debug, Error)]
pub enum EngineError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Prompt file error for {persona}: {reason}")]
    PromptLoad { persona: String, reason: String },

    // Admin input errors
    #[error("Invalid value: {0}")]
    Validation(String),

    // Chat transport errors
    #[error("Gateway error: {0}")]
    Gateway(String),

    #[error("Gateway rejected credentials")]
    GatewayUnauthorized,

    #[error("History fetch timed out after {0}s")]
    HistoryTimeout(u64),

    // Completion service errors
    #[error("Completion service error: {0}")]
    Completion(String),

    #[error("Completion call timed out")]
    CompletionTimeout,

    // Keyring errors
    #[error("Keyring error: {0}")]
    KeyringError(String),

    #[error("Secret not found: {0}")]
    SecretNotFound(String),

    // Network errors
    #[error("Network error: {0}")]
    Network(String),

    // Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ChorusErrorExt for EngineError {
    fn user_hint(&self) -> &str {
        match self {
            // Configuration errors
            Self::Config(_) => "Check your config.toml file for errors",
            Self::PromptLoad { .. } => "Check that the persona prompt file exists and is readable",

            // Admin input errors
            Self::Validation(_) => "The value is out of range. See #help for accepted values",

            // Chat transport errors
            Self::Gateway(_) => "Chat service request failed. It will be retried next cycle",
            Self::GatewayUnauthorized => "The bot token was rejected. Update the stored token",
            Self::HistoryTimeout(_) => "Channel history was slow to load. Starting with a partial buffer",

            // Completion service errors
            Self::Completion(_) => "Completion service unavailable. Check your API keys and network",
            Self::CompletionTimeout => "Completion service took too long to respond",

            // Secrets
            Self::KeyringError(_) => "Failed to access secure storage. Check system keychain",
            Self::SecretNotFound(_) => "Store the secret in the keychain or set CHORUS_<KEY>",

            // Network errors
            Self::Network(_) => "Network operation failed. Check your connection",

            // Generic IO error
            Self::Io(_) => "File system operation failed",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            // Non-recoverable errors
            Self::Config(_)
            | Self::GatewayUnauthorized
            | Self::SecretNotFound(_)
            | Self::KeyringError(_) => false,

            // All other errors are potentially recoverable
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_context() {
        let err = EngineError::PromptLoad {
            persona: "v3s".to_string(),
            reason: "not found".to_string(),
        };
        assert_eq!(err.to_string(), "Prompt file error for v3s: not found");
        assert_eq!(
            EngineError::HistoryTimeout(20).to_string(),
            "History fetch timed out after 20s"
        );
    }

    #[test]
    fn test_recoverability() {
        assert!(EngineError::Gateway("503".into()).is_recoverable());
        assert!(EngineError::CompletionTimeout.is_recoverable());
        assert!(EngineError::Validation("x".into()).is_recoverable());
        assert!(!EngineError::GatewayUnauthorized.is_recoverable());
        assert!(!EngineError::SecretNotFound("openai_api_key".into()).is_recoverable());
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: EngineError = io.into();
        assert!(matches!(err, EngineError::Io(_)));
        assert_eq!(err.user_hint(), "File system operation failed");
    }
}
