mod catalog;

use std::{
    fs,
    path::{Path, PathBuf},
    sync::OnceLock,
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use falkor_plugin_sdk::{create_plugin, install_link, setup::base_url, CreatePluginOptions, PluginConfig};
use regex::Regex;
use tracing_subscriber::{fmt, EnvFilter};

use crate::catalog::Catalog;

const DEFAULT_CONFIG: &str = "demos/catalog.plugin.toml";

#[derive(Parser, Debug)]
#[command(name = "falkor-plugin", author, version, about = "Serve a Falkor search plugin")]
struct Cli {
    /// Sets the log level (error, warn, info, debug, trace).
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve the static-catalog plugin described by the configuration file.
    Serve {
        #[arg(short, long, value_name = "FILE", default_value = DEFAULT_CONFIG)]
        config: PathBuf,
    },
    /// Interact with configuration files (validate, sample output).
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Dump the resolved configuration as JSON.
    Diag {
        #[arg(short, long, value_name = "FILE", default_value = DEFAULT_CONFIG)]
        config: PathBuf,
    },
    /// Print the install link the plugin would advertise.
    Link {
        #[arg(short, long, value_name = "FILE", default_value = DEFAULT_CONFIG)]
        config: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Validates the provided configuration file.
    Validate {
        #[arg(value_name = "FILE")]
        config: PathBuf,
    },
    /// Prints the bundled example configuration.
    Example,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level)?;
    match cli.command {
        Commands::Serve { config } => handle_serve(&config).await,
        Commands::Config { command } => handle_config(command),
        Commands::Diag { config } => handle_diag(&config),
        Commands::Link { config } => handle_link(&config),
    }
}

fn init_tracing(level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).try_init().ok();
    Ok(())
}

async fn handle_serve(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    config.validate()?;

    let running = create_plugin(CreatePluginOptions {
        setup: Some(config.setup.clone()),
        port: config.server.port,
        handlers: Some(Catalog::from_config(&config).into_handlers()),
        options: config.options()?,
        route_mode: config.server.route_mode,
    })
    .await?;
    tracing::info!(
        entries = config.catalog.len(),
        route_mode = %config.server.route_mode,
        "catalog plugin ready"
    );

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    tracing::info!("shutting down");
    running.shutdown().await
}

fn handle_config(command: ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Validate { config } => {
            let cfg = load_config(&config)?;
            cfg.validate()?;
            println!("configuration OK: {}", config.display());
        }
        ConfigCommands::Example => {
            println!("{}", include_str!("../../../demos/catalog.plugin.toml"));
        }
    }
    Ok(())
}

fn handle_diag(path: &Path) -> Result<()> {
    let cfg = load_config(path)?;
    let json = serde_json::to_string_pretty(&cfg)?;
    println!("{json}");
    Ok(())
}

fn handle_link(path: &Path) -> Result<()> {
    let cfg = load_config(path)?;
    cfg.validate()?;
    let api_url = match cfg.setup.api_url.as_deref().map(str::trim) {
        Some(url) if !url.is_empty() => url.to_string(),
        _ => base_url((cfg.host()?, cfg.port()?.get()).into()),
    };
    println!("{}", install_link(&api_url));
    Ok(())
}

fn load_config(path: &Path) -> Result<PluginConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let expanded = interpolate_env(&raw)?;
    PluginConfig::from_toml_str(&expanded).with_context(|| format!("failed to parse {}", path.display()))
}

fn interpolate_env(input: &str) -> Result<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let regex = match RE.get() {
        Some(regex) => regex,
        None => {
            let compiled = Regex::new(r"\$\{([A-Z0-9_]+)(?::([^}]+))?\}")
                .context("invalid interpolation pattern")?;
            RE.get_or_init(|| compiled)
        }
    };
    let result = regex.replace_all(input, |caps: &regex::Captures| {
        let key = &caps[1];
        let default = caps.get(2).map(|m| m.as_str()).unwrap_or("");
        std::env::var(key).unwrap_or_else(|_| default.to_string())
    });
    Ok(result.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interpolation_falls_back_to_default() {
        let out = interpolate_env("port = ${FALKOR_TEST_UNSET_PORT:4321}").unwrap();
        assert_eq!(out, "port = 4321");
        let out = interpolate_env("host = \"${FALKOR_TEST_UNSET_HOST}\"").unwrap();
        assert_eq!(out, "host = \"\"");
    }

    #[test]
    fn bundled_example_is_valid() {
        let raw = interpolate_env(include_str!("../../../demos/catalog.plugin.toml")).unwrap();
        let config = PluginConfig::from_toml_str(&raw).unwrap();
        config.validate().unwrap();
        assert!(!config.catalog.is_empty());
    }

    #[test]
    fn cli_parses_subcommands() {
        let cli = Cli::try_parse_from(["falkor-plugin", "link", "--config", "x.toml"]).unwrap();
        assert!(matches!(cli.command, Commands::Link { .. }));
        let cli = Cli::try_parse_from(["falkor-plugin", "config", "example"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Config {
                command: ConfigCommands::Example
            }
        ));
    }
}
