use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::model::{Reading, UnitSystem};

use super::{
    HTTP_TIMEOUT, ProviderId, WeatherProvider, send_cancellable, truncate_body, unix_to_utc,
};

const DEFAULT_BASE_URL: &str = "https://api.openweathermap.org";

#[derive(Debug, Clone)]
pub struct OpenWeatherProvider {
    api_key: String,
    base_url: String,
    http: Client,
}

impl OpenWeatherProvider {
    pub fn new(api_key: String) -> Result<Self> {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    /// Point the adapter at another host, e.g. a mock server.
    pub fn with_base_url(api_key: String, base_url: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .context("Failed to build OpenWeather HTTP client")?;

        Ok(Self {
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    fn into_reading(parsed: OwCurrentResponse, country: &str) -> Result<Reading> {
        let weather = parsed
            .weather
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("OpenWeather response contained no weather data"))?;

        Ok(Reading {
            provider: ProviderId::OpenWeather.display_name().to_string(),
            location_name: format!("{}, {}", parsed.name, country),
            temperature_c: parsed.main.temp,
            feels_like_c: parsed.main.feels_like,
            humidity_pct: parsed.main.humidity,
            pressure_hpa: parsed.main.pressure,
            wind_speed_mps: parsed.wind.speed,
            wind_direction_deg: parsed.wind.deg,
            description: weather.description,
            icon: weather.icon,
            sunrise: parsed.sys.sunrise.and_then(unix_to_utc),
            sunset: parsed.sys.sunset.and_then(unix_to_utc),
            fetched_at: Utc::now(),
            units: UnitSystem::Metric,
        })
    }
}

#[derive(Debug, Deserialize)]
struct OwMain {
    temp: f64,
    feels_like: f64,
    humidity: u8,
    pressure: f64,
}

#[derive(Debug, Deserialize)]
struct OwWeather {
    description: String,
    #[serde(default)]
    icon: String,
}

#[derive(Debug, Deserialize)]
struct OwWind {
    speed: f64,
    #[serde(default)]
    deg: u16,
}

#[derive(Debug, Default, Deserialize)]
struct OwSys {
    sunrise: Option<i64>,
    sunset: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct OwCurrentResponse {
    name: String,
    main: OwMain,
    weather: Vec<OwWeather>,
    wind: OwWind,
    #[serde(default)]
    sys: OwSys,
}

#[async_trait]
impl WeatherProvider for OpenWeatherProvider {
    fn name(&self) -> &str {
        ProviderId::OpenWeather.display_name()
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

        let url = format!("{}/data/2.5/weather", self.base_url);
        let query = format!("{city},{country}");
        debug!(provider = self.name(), %url, %query, "requesting current weather");

        let request = self.http.get(&url).query(&[
            ("q", query.as_str()),
            ("appid", self.api_key.as_str()),
            ("units", "metric"),
        ]);

        let (status, body) = send_cancellable(cancel, request)
            .await
            .context("OpenWeather current weather request failed")?;

        if status == StatusCode::NOT_FOUND {
            bail!("city not found");
        }
        if status == StatusCode::UNAUTHORIZED {
            bail!("invalid API key");
        }
        if !status.is_success() {
            bail!(
                "OpenWeather request failed with status {}: {}",
                status,
                truncate_body(&body),
            );
        }

        let parsed: OwCurrentResponse =
            serde_json::from_str(&body).context("Failed to parse OpenWeather current JSON")?;

        Self::into_reading(parsed, country)
    }
}
