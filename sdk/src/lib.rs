//! Chorus SDK
//!
//! Shared library providing the contract types between the chorus engine and
//! the chat transports it drives. The engine depends on these types; transport
//! adapters implement the `ChatGateway` trait.

/// Error types and handling
pub mod errors;

/// Chat gateway boundary types
pub mod gateway;

// Re-export commonly used types
pub use errors::{ChorusErrorExt, EngineError};
pub use gateway::{Author, ChatGateway, GatewayEvent, MessageId, RawMessage};
