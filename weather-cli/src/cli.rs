use std::{process::ExitCode, sync::Arc};

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, warn};
use weather_core::{
    Aggregator, AggregatorError, CacheStore, CancellationToken, Config, ProviderId,
    providers_from_config,
};

use crate::{output, server, signals};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "weather", version, about = "Weather aggregator over several providers")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Configure credentials for a specific provider.
    Configure {
        /// Provider short name, e.g. "openweather" or "weatherapi".
        provider: String,
    },

    /// Get aggregated weather for a city.
    Get {
        city: String,

        /// Country code, e.g. RU or US. Defaults to the configured country.
        #[arg(short, long)]
        country: Option<String>,

        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        output: OutputFormat,
    },

    /// Show which providers are configured.
    Providers,

    /// Drop every cached result.
    ClearCache,

    /// Serve the HTTP API.
    Server {
        /// Port to listen on. Defaults to the configured port.
        #[arg(short, long)]
        port: Option<u16>,
    },
}

impl Cli {
    pub async fn run(self, config: Config) -> anyhow::Result<ExitCode> {
        match self.command {
            Command::Configure { provider } => configure(&provider)?,
            Command::Get {
                city,
                country,
                output,
            } => {
                let country = country.unwrap_or_else(|| config.default_country.clone());
                return get_weather(&config, &city, &country, output).await;
            }
            Command::Providers => {
                let active = build_aggregator(&config)?.provider_count();

                println!("Weather providers ({active} active):");
                println!("{}", "-".repeat(30));
                for id in ProviderId::all() {
                    if config.is_provider_configured(*id) {
                        println!("✓ {}", id.display_name());
                    } else {
                        println!("✗ {} (not configured)", id.display_name());
                    }
                }
            }
            Command::ClearCache => {
                build_aggregator(&config)?.clear_cache();
                println!("Cache cleared");
            }
            Command::Server { port } => {
                let port = port.unwrap_or(config.server_port);
                server::run(&config, port).await?;
            }
        }

        Ok(ExitCode::SUCCESS)
    }
}

/// Cache and providers are created once here and handed to the aggregator.
pub(crate) fn build_aggregator(config: &Config) -> anyhow::Result<Aggregator> {
    let cache = Arc::new(CacheStore::new(config.cache_ttl()));
    let mut aggregator = Aggregator::new(cache);

    for provider in providers_from_config(config)? {
        aggregator.add_provider(provider);
    }

    Ok(aggregator)
}

async fn get_weather(
    config: &Config,
    city: &str,
    country: &str,
    format: OutputFormat,
) -> anyhow::Result<ExitCode> {
    let aggregator = build_aggregator(config)?;

    let cancel = CancellationToken::new();
    let watchdog = tokio::spawn({
        let cancel = cancel.clone();
        let timeout = config.request_timeout();
        async move {
            tokio::select! {
                () = tokio::time::sleep(timeout) => warn!(?timeout, "request timed out"),
                () = signals::ctrl_c() => info!("interrupted"),
            }
            cancel.cancel();
        }
    });

    let result = aggregator.get_weather(&cancel, city, country).await;
    watchdog.abort();

    match result {
        Ok(weather) => {
            match format {
                OutputFormat::Text => println!("{}", output::render_text(&weather)),
                OutputFormat::Json => println!("{}", output::render_json(&*weather)?),
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            match format {
                OutputFormat::Text => {
                    eprintln!("Error: {err}");
                    if matches!(err, AggregatorError::NoProvidersAvailable) {
                        eprintln!(
                            "Hint: run `weather configure <provider>` \
                             (e.g. `weather configure openweather`) first."
                        );
                    }
                }
                OutputFormat::Json => {
                    let payload = output::error_payload(&err);
                    println!("{}", output::render_json(&payload)?);
                }
            }
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Prompt for an API key and persist it. Reads the file only, so keys coming
/// from the environment are never written to disk.
fn configure(provider: &str) -> anyhow::Result<()> {
    let id = ProviderId::try_from(provider)?;
    let mut config = Config::load_file()?;

    let api_key = inquire::Password::new(&format!("API key for {}:", id.display_name()))
        .without_confirmation()
        .prompt()
        .context("Failed to read API key")?;

    let api_key = api_key.trim().to_string();
    if api_key.is_empty() {
        anyhow::bail!("API key must not be empty");
    }

    config.upsert_provider_api_key(id, api_key);
    config.save()?;

    let path = Config::config_file_path()?;
    let name = id.display_name();
    println!("Saved {name} credentials to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_get_with_defaults() {
        let cli = Cli::try_parse_from(["weather", "get", "Moscow"]).unwrap();
        match cli.command {
            Command::Get {
                city,
                country,
                output,
            } => {
                assert_eq!(city, "Moscow");
                assert_eq!(country, None);
                assert_eq!(output, OutputFormat::Text);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parses_get_with_flags() {
        let args = ["weather", "get", "Paris", "-c", "FR", "--output", "json"];
        let cli = Cli::try_parse_from(args).unwrap();
        match cli.command {
            Command::Get {
                country,
                output,
                ..
            } => {
                assert_eq!(country.as_deref(), Some("FR"));
                assert_eq!(output, OutputFormat::Json);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parses_clear_cache() {
        let cli = Cli::try_parse_from(["weather", "clear-cache"]).unwrap();
        assert!(matches!(cli.command, Command::ClearCache));
    }

    #[test]
    fn parses_server_port() {
        let cli = Cli::try_parse_from(["weather", "server", "--port", "9000"]).unwrap();
        assert!(matches!(cli.command, Command::Server { port: Some(9000) }));

        let cli = Cli::try_parse_from(["weather", "server"]).unwrap();
        assert!(matches!(cli.command, Command::Server { port: None }));
    }

    #[test]
    fn build_aggregator_registers_only_configured_providers() {
        let mut config = Config::default();
        config.upsert_provider_api_key(ProviderId::WeatherApi, "KEY".into());

        let aggregator = build_aggregator(&config).unwrap();
        assert_eq!(aggregator.provider_names(), vec!["WeatherAPI"]);
    }
}
