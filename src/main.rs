use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use impersonator::cli::{
    Cli, Command, print_networks, run_demo_command, run_doctor_command, run_settings_command,
};
use impersonator::settings::Settings;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    impersonator::bootstrap::load_impersonator_env();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| "impersonator=info".into());
    if cli.json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    match cli.command {
        Command::Doctor { strict } => run_doctor_command(strict).await,
        Command::Settings { command } => run_settings_command(command, &Settings::default_path()),
        Command::Demo { uri, address } => run_demo_command(uri, address).await,
        Command::Networks => {
            print_networks();
            Ok(())
        }
    }
}
