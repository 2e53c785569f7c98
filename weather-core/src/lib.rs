//! Core library for the `weather` aggregator.
//!
//! This crate defines:
//! - The aggregation engine fanning one request out to every provider
//! - A TTL cache for aggregated results
//! - Statistical reducers used to merge provider readings
//! - Abstraction over weather providers and their configuration
//!
//! It is used by `weather-cli`, but can also be reused by other binaries or services.

pub mod aggregator;
pub mod cache;
pub mod config;
pub mod error;
pub mod model;
pub mod provider;
pub mod stats;

pub use aggregator::Aggregator;
pub use cache::{CacheEntry, CacheStore};
pub use config::{Config, ProviderConfig, load_dotenv};
pub use error::AggregatorError;
pub use model::{AggregatedStat, AggregatedWeather, ErrorResponse, Reading, UnitSystem};
pub use provider::{ProviderId, WeatherProvider, providers_from_config};
pub use tokio_util::sync::CancellationToken;
