use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::model::{Reading, UnitSystem};

use super::{HTTP_TIMEOUT, ProviderId, WeatherProvider, send_cancellable, truncate_body};

const DEFAULT_BASE_URL: &str = "https://api.weatherapi.com";

#[derive(Debug, Clone)]
pub struct WeatherApiProvider {
    api_key: String,
    base_url: String,
    http: Client,
}

impl WeatherApiProvider {
    pub fn new(api_key: String) -> Result<Self> {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(api_key: String, base_url: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .context("Failed to build WeatherAPI HTTP client")?;

        Ok(Self {
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    fn into_reading(parsed: WaResponse) -> Reading {
        let current = parsed.current;
        // Icons come back protocol-relative ("//cdn.weatherapi.com/...").
        let icon = if current.condition.icon.starts_with("//") {
            format!("https:{}", current.condition.icon)
        } else {
            current.condition.icon
        };

        Reading {
            provider: ProviderId::WeatherApi.display_name().to_string(),
            location_name: format!("{}, {}", parsed.location.name, parsed.location.country),
            temperature_c: current.temp_c,
            feels_like_c: current.feelslike_c,
            humidity_pct: current.humidity,
            pressure_hpa: current.pressure_mb,
            wind_speed_mps: current.wind_kph / 3.6,
            wind_direction_deg: current.wind_degree,
            description: current.condition.text,
            icon,
            sunrise: None,
            sunset: None,
            fetched_at: Utc::now(),
            units: UnitSystem::Metric,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WaLocation {
    name: String,
    country: String,
}

#[derive(Debug, Deserialize)]
struct WaCondition {
    text: String,
    #[serde(default)]
    icon: String,
}

#[derive(Debug, Deserialize)]
struct WaCurrent {
    temp_c: f64,
    feelslike_c: f64,
    humidity: u8,
    pressure_mb: f64,
    wind_kph: f64,
    #[serde(default)]
    wind_degree: u16,
    condition: WaCondition,
}

#[derive(Debug, Deserialize)]
struct WaResponse {
    location: WaLocation,
    current: WaCurrent,
}

#[derive(Debug, Deserialize)]
struct WaErrorBody {
    error: WaErrorDetail,
}

#[derive(Debug, Deserialize)]
struct WaErrorDetail {
    message: String,
}

#[async_trait]
impl WeatherProvider for WeatherApiProvider {
    fn name(&self) -> &str {
        ProviderId::WeatherApi.display_name()
    }

    fn is_available(&self) -> bool {
        !self.api_key.is_empty()
    }

    async fn fetch(
        &self,
        cancel: &CancellationToken,
        city: &str,
        country: &str,
    ) -> Result<Reading> {
        if !self.is_available() {
            bail!("provider {} is not configured", self.name());
        }

        let url = format!("{}/v1/current.json", self.base_url);
        let query = format!("{city},{country}");
        debug!(provider = self.name(), %url, %query, "requesting current weather");

        let request = self
            .http
            .get(&url)
            .query(&[("key", self.api_key.as_str()), ("q", query.as_str())]);

        let (status, body) = send_cancellable(cancel, request)
            .await
            .context("WeatherAPI current request failed")?;

        if !status.is_success() {
            if let Ok(api_error) = serde_json::from_str::<WaErrorBody>(&body) {
                if !api_error.error.message.is_empty() {
                    bail!("WeatherAPI error: {}", api_error.error.message);
                }
            }
            bail!(
                "WeatherAPI current request failed with status {}: {}",
                status,
                truncate_body(&body),
            );
        }

        let parsed: WaResponse =
            serde_json::from_str(&body).context("Failed to parse WeatherAPI current JSON")?;

        Ok(Self::into_reading(parsed))
    }
}
