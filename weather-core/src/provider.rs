use crate::{
    Config, Reading,
    provider::{openweather::OpenWeatherProvider, weatherapi::WeatherApiProvider},
};
use anyhow::Context;
use async_trait::async_trait;
use std::{convert::TryFrom, fmt::Debug, sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;

pub mod openweather;
pub mod weatherapi;

/// Per-request HTTP timeout applied by every adapter.
pub(crate) const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderId {
    OpenWeather,
    WeatherApi,
}

impl ProviderId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::OpenWeather => "openweather",
            ProviderId::WeatherApi => "weatherapi",
        }
    }

    /// Name the adapter reports and that ends up in aggregated results.
    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderId::OpenWeather => "OpenWeatherMap",
            ProviderId::WeatherApi => "WeatherAPI",
        }
    }

    pub const fn all() -> &'static [ProviderId] {
        &[ProviderId::OpenWeather, ProviderId::WeatherApi]
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ProviderId {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let lower = value.to_lowercase();

        match lower.as_str() {
            "openweather" => Ok(ProviderId::OpenWeather),
            "weatherapi" => Ok(ProviderId::WeatherApi),
            _ => Err(anyhow::anyhow!(
                "Unknown provider '{value}'. Supported providers: openweather, weatherapi."
            )),
        }
    }
}

/// One upstream weather service.
///
/// Implementations must be cheap to share across tasks; the aggregator holds
/// them behind `Arc` and calls `fetch` concurrently.
#[async_trait]
pub trait WeatherProvider: Send + Sync + Debug {
    fn name(&self) -> &str;

    /// Whether the adapter has what it needs (credentials) to be queried.
    fn is_available(&self) -> bool;

    /// Current conditions for `city,country`. Should return promptly with an
    /// error once `cancel` fires.
    async fn fetch(
        &self,
        cancel: &CancellationToken,
        city: &str,
        country: &str,
    ) -> anyhow::Result<Reading>;
}

/// Build one adapter per known provider. Providers without an API key are
/// still constructed but report themselves unavailable.
pub fn providers_from_config(config: &Config) -> anyhow::Result<Vec<Arc<dyn WeatherProvider>>> {
    ProviderId::all()
        .iter()
        .map(|&id| provider_from_config(id, config))
        .collect()
}

/// Construct a single provider from config.
pub fn provider_from_config(
    id: ProviderId,
    config: &Config,
) -> anyhow::Result<Arc<dyn WeatherProvider>> {
    let api_key = config.provider_api_key(id).unwrap_or_default().to_owned();

    let provider: Arc<dyn WeatherProvider> = match id {
        ProviderId::OpenWeather => Arc::new(OpenWeatherProvider::new(api_key)?),
        ProviderId::WeatherApi => Arc::new(WeatherApiProvider::new(api_key)?),
    };

    Ok(provider)
}

/// Send `request` and read the whole body, giving up as soon as `cancel` fires.
pub(crate) async fn send_cancellable(
    cancel: &CancellationToken,
    request: reqwest::RequestBuilder,
) -> anyhow::Result<(reqwest::StatusCode, String)> {
    if cancel.is_cancelled() {
        anyhow::bail!("request cancelled");
    }

    let exchange = async {
        let res = request.send().await.context("HTTP request failed")?;
        let status = res.status();
        let body = res.text().await.context("Failed to read response body")?;
        Ok::<_, anyhow::Error>((status, body))
    };

    tokio::select! {
        _ = cancel.cancelled() => anyhow::bail!("request cancelled"),
        result = exchange => result,
    }
}

pub(crate) fn unix_to_utc(ts: i64) -> Option<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::<chrono::Utc>::from_timestamp(ts, 0)
}

pub(crate) fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}
