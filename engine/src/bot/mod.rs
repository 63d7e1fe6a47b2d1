//! Chat transports
//!
//! Each transport implements `sdk::ChatGateway` for a single channel.

pub mod discord;

pub use discord::DiscordGateway;
