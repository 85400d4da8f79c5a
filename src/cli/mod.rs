//! Command-line surface of the `impersonator` binary.

mod demo;
mod doctor;
mod settings;

use clap::{Parser, Subcommand};

pub use self::demo::run_demo_command;
pub use self::doctor::run_doctor_command;
pub use self::settings::{SettingsCommand, run_settings_command};

#[derive(Parser, Debug)]
#[command(name = "impersonator", version, about)]
pub struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Check configuration and ping the simulation backend and resolver.
    Doctor {
        /// Exit non-zero when any check fails.
        #[arg(long)]
        strict: bool,
    },

    /// Show or edit ~/.impersonator/settings.json.
    Settings {
        #[command(subcommand)]
        command: SettingsCommand,
    },

    /// Pair with an in-process dApp and replay one transaction request.
    Demo {
        /// Pairing URI; a fresh one is generated when omitted.
        #[arg(long)]
        uri: Option<String>,

        /// Address or ENS name to impersonate (overrides configuration).
        #[arg(long)]
        address: Option<String>,
    },

    /// List the primary networks offered for chain selection.
    Networks,
}

pub fn print_networks() {
    for network in crate::networks::PRIMARY_NETWORKS {
        println!("  {:>6}  {}", network.chain_id, network.name);
    }
}
