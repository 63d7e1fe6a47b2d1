//! CLI interface for Chorus
//!
//! This module provides the command-line interface using clap's derive API.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Chorus group-chat personas
///
/// Runs one or more language-model personas in chat channels, each with its
/// own weighted conversation memory and human-like pacing.
#[derive(Parser, Debug)]
#[command(name = "chorus")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start personas and run until Ctrl-C
    Run {
        /// Only start the named persona (repeatable)
        #[arg(short, long = "persona", value_name = "NAME")]
        personas: Vec<String>,
    },

    /// Validate configuration, prompt files and secrets
    Check,

    /// List configured personas
    Personas,

    /// Manage secrets in the OS keychain
    Secret {
        #[command(subcommand)]
        action: SecretAction,
    },
}

/// Secret management actions
#[derive(Subcommand, Debug)]
pub enum SecretAction {
    /// Store a secret read from stdin
    Set {
        /// Key name, e.g. openai_api_key
        key: String,
    },
}
