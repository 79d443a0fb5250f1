// SPDX-FileCopyrightText: 2026 Banter Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Banter - an iMessage-native AI assistant.
//!
//! This is the binary entry point for the Banter orchestrator.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use clap::{Parser, Subcommand};

mod commands;
mod serve;

/// Banter - an iMessage-native AI assistant.
#[derive(Parser, Debug)]
#[command(name = "banter", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the Banter dispatch loop.
    Serve,
    /// Clear a conversation's session and history.
    Reset {
        /// Conversation key: a phone number or email address.
        key: String,
    },
    /// Show usage ledger totals.
    Usage,
    /// Validate configuration and print the resolved identity.
    Config,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match banter_config::load_and_validate() {
        Ok(config) => config,
        Err(errors) => {
            banter_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Some(Commands::Serve) => serve::run_serve(config).await,
        Some(Commands::Reset { key }) => commands::run_reset(&config, &key).await,
        Some(Commands::Usage) => commands::run_usage(&config).await,
        Some(Commands::Config) => {
            println!("banter: config ok (agent.name={})", config.agent.name);
            Ok(())
        }
        None => {
            println!("banter: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn binary_loads_config_defaults() {
        let config = banter_config::load_and_validate().expect("default config should be valid");
        assert_eq!(config.agent.name, "banter");
    }
}
