//! # netrender CLI Module
//!
//! ## Available Commands
//!
//! - `generate` - Render backend configuration from the YAML hierarchy
//! - `status` - List committed definitions and their backends
//! - `get-filename` - Show the file that last declared a definition
//! - `ids` - List the IDs declared in one section
//! - `export` - Write definitions back out as YAML
//! - `delete` - Remove a definition from the document that declared it
//! - `clean` - Remove every generated backend file

mod commands;

use crate::config::Config;
use clap::{Parser, Subcommand};
use netrender_core::NetrenderError;
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// netrender - declarative network configuration renderer
///
/// Reads YAML documents from {lib,etc,run}/netplan and renders them for
/// systemd-networkd, NetworkManager and Open vSwitch.
#[derive(Parser, Debug)]
#[command(name = "netrender")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Prefix for every input and output path (overrides the config file)
    #[arg(short = 'r', long, global = true)]
    pub root_dir: Option<PathBuf>,

    /// Path to the configuration file
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Render backend configuration from the YAML hierarchy
    Generate {
        /// systemd generator directory for networkd enablement links
        #[arg(short, long)]
        generator_dir: Option<PathBuf>,
    },

    /// List committed definitions and their backends
    Status,

    /// Show the file that last declared a definition
    GetFilename {
        /// Definition ID
        id: String,
    },

    /// List the IDs declared in one section (ethernets, wifis, bridges, ...)
    Ids {
        /// Section name
        section: String,
    },

    /// Write definitions back out as YAML under etc/netplan
    Export {
        /// Export only this definition
        #[arg(short, long)]
        id: Option<String>,

        /// Output file name for a whole-state export
        #[arg(short = 'f', long)]
        file_hint: Option<String>,
    },

    /// Remove a definition from the document that last declared it
    Delete {
        /// Definition ID
        id: String,
    },

    /// Remove every generated backend file
    Clean,
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub fn execute(cli: Cli) -> Result<(), NetrenderError> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(root) = cli.root_dir {
        config.root_dir = root;
    }
    let json_mode = cli.json_mode;

    match cli.command {
        Some(Commands::Generate { generator_dir }) => {
            cmd_generate(&config, json_mode, generator_dir.as_deref())
        }
        Some(Commands::Status) => cmd_status(&config, json_mode),
        Some(Commands::GetFilename { id }) => cmd_get_filename(&config, json_mode, &id),
        Some(Commands::Ids { section }) => cmd_ids(&config, json_mode, &section),
        Some(Commands::Export { id, file_hint }) => {
            cmd_export(&config, json_mode, id.as_deref(), file_hint.as_deref())
        }
        Some(Commands::Delete { id }) => cmd_delete(&config, json_mode, &id),
        Some(Commands::Clean) => cmd_clean(&config, json_mode),
        None => {
            // No subcommand - show status by default
            cmd_status(&config, json_mode)
        }
    }
}
