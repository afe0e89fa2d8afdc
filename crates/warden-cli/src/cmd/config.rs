use super::load_config;
use crate::output::print_json;
use clap::Subcommand;
use std::path::PathBuf;
use warden_core::config::WarnLevel;

// ---------------------------------------------------------------------------
// Subcommand types
// ---------------------------------------------------------------------------

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Validate the config for common mistakes
    Check {
        /// Config file (default: warden.yaml if present)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Print the effective config, defaults included
    Show {
        /// Config file (default: warden.yaml if present)
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run(subcmd: ConfigSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ConfigSubcommand::Check { config } => check(config, json),
        ConfigSubcommand::Show { config } => show(config, json),
    }
}

fn check(path: Option<PathBuf>, json: bool) -> anyhow::Result<()> {
    let config = load_config(path.as_deref())?;
    let warnings = config.validate();

    if json {
        let value = serde_json::json!({
            "warnings": warnings,
        });
        print_json(&value)?;
    } else if warnings.is_empty() {
        println!("Config is valid. No warnings.");
    } else {
        for w in &warnings {
            let prefix = match w.level {
                WarnLevel::Warning => "warning",
                WarnLevel::Error => "error",
            };
            println!("[{prefix}] {}", w.message);
        }
    }

    let has_errors = warnings.iter().any(|w| w.level == WarnLevel::Error);
    if has_errors {
        anyhow::bail!("config validation found errors");
    }

    Ok(())
}

fn show(path: Option<PathBuf>, json: bool) -> anyhow::Result<()> {
    let config = load_config(path.as_deref())?;
    if json {
        print_json(&config)?;
    } else {
        print!("{}", config.to_yaml()?);
    }
    Ok(())
}
