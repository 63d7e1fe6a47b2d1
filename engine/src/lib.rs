//! Chorus Engine Library
//!
//! This library provides the core functionality of chorus: weighted
//! conversation memory, response selection and pacing for group-chat
//! personas. It is used by both the main binary and integration tests.

/// Configuration management module
pub mod config;

/// Secret management module
pub mod secrets;

/// Weighted conversation memory
pub mod memory;

/// Completion service abstraction layer
pub mod llm;

/// Response selection and scheduling
pub mod agent;

/// Per-persona session wiring and admin commands
pub mod session;

/// Chat transports
pub mod bot;

/// Top-level orchestrator for all personas
pub mod fleet;

/// Telemetry and Observability
pub mod telemetry;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;
