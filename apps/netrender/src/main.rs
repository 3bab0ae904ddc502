//! # netrender
//!
//! Renders the declarative YAML hierarchy under `{lib,etc,run}/netplan` into
//! configuration for systemd-networkd, NetworkManager and Open vSwitch.
//!
//! ## Usage
//!
//! ```bash
//! # Render everything below a root and enable networkd
//! netrender --root-dir /tmp/root generate --generator-dir /run/systemd/generator
//!
//! # Lookups
//! netrender status
//! netrender get-filename eth0
//! netrender ids bridges
//!
//! # Write the merged state back out
//! netrender export --file-hint 90-merged
//! ```

use clap::Parser;
use netrender::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

fn main() {
    let cli = cli::Cli::parse();

    // NETRENDER_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("NETRENDER_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let default_filter = if cli.verbose {
        "netrender=debug,netrender_core=debug"
    } else if cli.quiet {
        "netrender=warn,netrender_core=warn"
    } else {
        "netrender=info,netrender_core=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    if let Err(e) = cli::execute(cli) {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}
