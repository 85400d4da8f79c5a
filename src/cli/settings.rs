//! `impersonator settings` - inspect and edit persisted settings.

use std::path::Path;

use clap::Subcommand;

use crate::settings::Settings;

#[derive(Subcommand, Debug, Clone)]
pub enum SettingsCommand {
    /// Print every setting.
    Show,
    /// Print one setting by dotted path.
    Get { path: String },
    /// Set a setting by dotted path (e.g. `tenderly_fork_id`, `chain_id`).
    Set { path: String, value: String },
    /// Restore a setting's default.
    Reset { path: String },
}

/// Run a settings command against `path` (normally `Settings::default_path()`).
pub fn run_settings_command(command: SettingsCommand, path: &Path) -> anyhow::Result<()> {
    let mut settings = Settings::load_from(path);
    match command {
        SettingsCommand::Show => {
            println!("Settings ({})", path.display());
            for (key, value) in settings.list() {
                println!("  {key} = {value}");
            }
        }
        SettingsCommand::Get { path: key } => match settings.get(&key) {
            Some(value) => println!("{value}"),
            None => anyhow::bail!("Unknown setting: {key}"),
        },
        SettingsCommand::Set { path: key, value } => {
            settings.set(&key, &value).map_err(anyhow::Error::msg)?;
            settings.save_to(path)?;
            tracing::info!("Updated {} in {}", key, path.display());
            println!("{key} = {}", settings.get(&key).unwrap_or_default());
        }
        SettingsCommand::Reset { path: key } => {
            settings.reset(&key).map_err(anyhow::Error::msg)?;
            settings.save_to(path)?;
            println!("{key} = {}", settings.get(&key).unwrap_or_default());
        }
    }
    Ok(())
}
