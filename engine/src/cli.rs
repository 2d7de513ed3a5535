//! CLI interface for Kestrel
//!
//! This module provides the command-line interface using clap's derive API.
//! It defines all commands and global flags.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Kestrel task and reflex engine
///
/// Drives a game agent through long-running tasks (mining, gathering wood,
/// farming, defending) with safety checks and survival reflexes.
#[derive(Parser, Debug)]
#[command(name = "kestrel")]
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
    /// Run a task against a seeded, simulated world
    Simulate {
        /// Task as JSON, e.g. '{"kind":"gather_wood","amount":8}'
        #[arg(long)]
        task: String,

        /// Number of ticks to run
        #[arg(long, default_value = "200")]
        ticks: u32,

        /// World and wander seed
        #[arg(long, default_value = "1")]
        seed: u64,

        /// Write placements and events to the database
        #[arg(long)]
        persist: bool,
    },

    /// Show recorded block placements
    Placements {
        /// Number of records to show
        #[arg(short, long, default_value = "20")]
        limit: u32,
    },

    /// Show recent task and reflex events
    Events {
        /// Number of events to show
        #[arg(short, long, default_value = "20")]
        limit: u32,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Configuration management actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Validate configuration file
    Validate,
}
