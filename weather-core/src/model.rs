use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unit system of a reading. Adapters request metric units upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UnitSystem {
    #[default]
    Metric,
}

/// A single provider's observation for one location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub provider: String,
    pub location_name: String,
    pub temperature_c: f64,
    pub feels_like_c: f64,
    pub humidity_pct: u8,
    pub pressure_hpa: f64,
    pub wind_speed_mps: f64,
    pub wind_direction_deg: u16,
    pub description: String,
    pub icon: String,
    pub sunrise: Option<DateTime<Utc>>,
    pub sunset: Option<DateTime<Utc>>,
    pub fetched_at: DateTime<Utc>,
    pub units: UnitSystem,
}

/// Average/min/max over the values contributed by successful providers.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AggregatedStat {
    pub average: f64,
    pub min: f64,
    pub max: f64,
    pub values: Vec<f64>,
}

/// Consensus reading built from every provider that answered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedWeather {
    pub location: String,
    pub temperature: AggregatedStat,
    pub feels_like: AggregatedStat,
    pub humidity: AggregatedStat,
    pub pressure: AggregatedStat,
    pub wind_speed: AggregatedStat,
    pub description: String,
    /// Contributing providers, in the order their calls completed.
    pub providers: Vec<String>,
    pub last_updated: DateTime<Utc>,
}

/// Failure payload returned by front ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, details: Option<String>) -> Self {
        Self {
            error: error.into(),
            details,
        }
    }
}
