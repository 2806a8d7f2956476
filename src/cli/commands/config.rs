use anyhow::{Context, Result};
use clap::Subcommand;

use crate::cli::output::get_formatter;
use crate::models::{Config, OutputFormat};

const MASK: &str = "********";

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    #[command(about = "Write the default configuration file")]
    Init {
        #[arg(long, short = 'F', help = "Force overwrite existing config")]
        force: bool,
    },
    #[command(about = "Show the effective configuration (file + environment)")]
    Show,
    #[command(about = "Show configuration and data file paths")]
    Path,
}

pub async fn handle_config(cmd: ConfigCommand, format: OutputFormat, _verbose: bool) -> Result<()> {
    let formatter = get_formatter(format);

    match cmd {
        ConfigCommand::Init { force } => {
            let path = Config::config_path()
                .ok_or_else(|| anyhow::anyhow!("could not determine config directory"))?;
            if path.exists() && !force {
                anyhow::bail!(
                    "Config already exists at: {}\nUse --force to overwrite.",
                    path.display()
                );
            }
            let path = Config::default()
                .save()
                .context("failed to write config")?;
            print!(
                "{}",
                formatter.format_message(&format!("Created config at: {}", path.display()))
            );
        }
        ConfigCommand::Show => {
            let config = masked(Config::load()?);
            if format == OutputFormat::Json {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                if let Some(path) = Config::config_path().filter(|p| p.exists()) {
                    println!("# Config file: {}", path.display());
                }
                print!("{}", toml::to_string_pretty(&config)?);
            }
        }
        ConfigCommand::Path => {
            let describe = |path: Option<std::path::PathBuf>| {
                path.map_or_else(
                    || "(unavailable)".to_string(),
                    |p| {
                        let state = if p.exists() { "active" } else { "would be" };
                        format!("{} ({state})", p.display())
                    },
                )
            };
            let config = Config::load()?;
            println!("Config file: {}", describe(Config::config_path()));
            println!("Job ledger:  {}", describe(config.jobs_db_path()));
            println!(
                ".env file:   {}",
                describe(std::env::current_dir().ok().map(|d| d.join(".env")))
            );
        }
    }

    Ok(())
}

/// Replace secrets so the config can be printed.
fn masked(mut config: Config) -> Config {
    if config.vector_store.api_key.is_some() {
        config.vector_store.api_key = Some(MASK.to_string());
    }
    if config.generation.api_key.is_some() {
        config.generation.api_key = Some(MASK.to_string());
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_masked_hides_api_keys_only() {
        let mut config = Config::default();
        config.generation.api_key = Some("sk-secret".to_string());

        let shown = masked(config);
        assert_eq!(shown.generation.api_key.as_deref(), Some(MASK));
        assert!(shown.vector_store.api_key.is_none());

        let rendered = toml::to_string_pretty(&shown).unwrap();
        assert!(!rendered.contains("sk-secret"));
    }
}
