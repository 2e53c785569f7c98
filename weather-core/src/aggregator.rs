//! Fan-out engine: queries every registered provider concurrently, merges the
//! successful readings and caches the result.

use std::{collections::HashMap, sync::Arc};

use anyhow::anyhow;
use chrono::Utc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    cache::CacheStore,
    error::AggregatorError,
    model::{AggregatedWeather, Reading},
    provider::WeatherProvider,
    stats::{aggregate_numeric, most_frequent},
};

#[derive(Debug)]
pub struct Aggregator {
    providers: Vec<Arc<dyn WeatherProvider>>,
    cache: Arc<CacheStore>,
}

impl Aggregator {
    pub fn new(cache: Arc<CacheStore>) -> Self {
        Self {
            providers: Vec::new(),
            cache,
        }
    }

    /// Register a provider if it reports itself available. Returns whether it
    /// was added.
    pub fn add_provider(&mut self, provider: Arc<dyn WeatherProvider>) -> bool {
        if !provider.is_available() {
            debug!(provider = provider.name(), "skipping unavailable provider");
            return false;
        }

        info!(provider = provider.name(), "provider registered");
        self.providers.push(provider);
        true
    }

    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }

    /// Registered provider names, in registration order.
    pub fn provider_names(&self) -> Vec<String> {
        self.providers
            .iter()
            .map(|p| p.name().to_string())
            .collect()
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
        info!("weather cache cleared");
    }

    /// Cache key for a request. Not normalized: case and whitespace matter.
    pub fn cache_key(city: &str, country: &str) -> String {
        format!("{city},{country}")
    }

    /// Aggregated weather for `city,country`, from cache when fresh, otherwise
    /// from every registered provider.
    ///
    /// Partial failure is success. Fails only when no provider is registered
    /// or none of them produced a reading.
    pub async fn get_weather(
        &self,
        cancel: &CancellationToken,
        city: &str,
        country: &str,
    ) -> Result<Arc<AggregatedWeather>, AggregatorError> {
        let key = Self::cache_key(city, country);

        if let Some(cached) = self.cache.get(&key) {
            debug!(%key, "cache hit");
            return Ok(cached);
        }

        if self.providers.is_empty() {
            return Err(AggregatorError::NoProvidersAvailable);
        }

        debug!(%key, providers = self.providers.len(), "cache miss, querying providers");

        let mut tasks = JoinSet::new();
        let mut names = HashMap::with_capacity(self.providers.len());
        for provider in &self.providers {
            let provider = Arc::clone(provider);
            let cancel = cancel.clone();
            let city = city.to_owned();
            let country = country.to_owned();

            let name = provider.name().to_string();
            let handle = tasks.spawn(async move {
                let outcome = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(anyhow!("request cancelled")),
                    result = provider.fetch(&cancel, &city, &country) => result,
                };

                outcome.map_err(|err| AggregatorError::ProviderCallFailed {
                    provider: provider.name().to_string(),
                    cause: format!("{err:#}"),
                })
            });
            names.insert(handle.id(), name);
        }

        let mut readings = Vec::with_capacity(self.providers.len());
        let mut failures = Vec::new();

        while let Some(joined) = tasks.join_next_with_id().await {
            let err = match joined {
                Ok((_, Ok(reading))) => {
                    readings.push(reading);
                    continue;
                }
                Ok((_, Err(err))) => err,
                Err(join_err) => {
                    let provider = names
                        .get(&join_err.id())
                        .cloned()
                        .unwrap_or_else(|| "unknown provider".to_string());
                    let cause = if join_err.is_panic() {
                        "task panicked"
                    } else {
                        "task cancelled"
                    };
                    AggregatorError::ProviderCallFailed {
                        provider,
                        cause: cause.to_string(),
                    }
                }
            };

            warn!(error = %err, "provider call failed");
            failures.push(err.to_string());
        }

        if readings.is_empty() {
            if failures.is_empty() {
                return Err(AggregatorError::EmptyResultSet);
            }
            let messages = failures;
            return Err(AggregatorError::AllProvidersFailed { messages });
        }

        let weather = Arc::new(aggregate_readings(&readings, city, country));
        info!(
            %key,
            succeeded = readings.len(),
            failed = failures.len(),
            "aggregated weather"
        );

        self.cache.put(key, Arc::clone(&weather));
        Ok(weather)
    }
}

/// Merge readings into one consensus result. Provider order follows `readings`.
pub fn aggregate_readings(readings: &[Reading], city: &str, country: &str) -> AggregatedWeather {
    let field = |f: fn(&Reading) -> f64| readings.iter().map(f).collect::<Vec<_>>();
    let descriptions: Vec<String> = readings.iter().map(|r| r.description.clone()).collect();

    AggregatedWeather {
        location: format!("{city}, {country}"),
        temperature: aggregate_numeric(field(|r| r.temperature_c)),
        feels_like: aggregate_numeric(field(|r| r.feels_like_c)),
        humidity: aggregate_numeric(field(|r| f64::from(r.humidity_pct))),
        pressure: aggregate_numeric(field(|r| r.pressure_hpa)),
        wind_speed: aggregate_numeric(field(|r| r.wind_speed_mps)),
        description: most_frequent(&descriptions),
        providers: readings.iter().map(|r| r.provider.clone()).collect(),
        last_updated: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::UnitSystem;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    #[derive(Debug, Clone)]
    enum Outcome {
        Reading {
            temp: f64,
            humidity: u8,
            description: &'static str,
        },
        Fail(&'static str),
        Panic,
    }

    /// Test double that ignores the cancellation token, so any prompt
    /// cancellation observed in tests comes from the engine.
    #[derive(Debug)]
    struct StubProvider {
        name: &'static str,
        available: bool,
        outcome: Outcome,
        delay: Option<Duration>,
        calls: AtomicUsize,
    }

    impl StubProvider {
        fn ok(name: &'static str, temp: f64, humidity: u8) -> Arc<Self> {
            let outcome = Outcome::Reading {
                temp,
                humidity,
                description: "clear sky",
            };
            Self::with(name, outcome)
        }

        fn failing(name: &'static str, message: &'static str) -> Arc<Self> {
            Self::with(name, Outcome::Fail(message))
        }

        fn with(name: &'static str, outcome: Outcome) -> Arc<Self> {
            Arc::new(Self {
                name,
                available: true,
                outcome,
                delay: None,
                calls: AtomicUsize::new(0),
            })
        }

        fn slow(name: &'static str, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                name,
                available: true,
                outcome: Outcome::Reading {
                    temp: 0.0,
                    humidity: 0,
                    description: "late",
                },
                delay: Some(delay),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl WeatherProvider for StubProvider {
        fn name(&self) -> &str {
            self.name
        }

        fn is_available(&self) -> bool {
            self.available
        }

        async fn fetch(
            &self,
            _cancel: &CancellationToken,
            city: &str,
            country: &str,
        ) -> anyhow::Result<Reading> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            match &self.outcome {
                Outcome::Reading {
                    temp,
                    humidity,
                    description,
                } => Ok(Reading {
                    provider: self.name.to_string(),
                    location_name: format!("{city}, {country}"),
                    temperature_c: *temp,
                    feels_like_c: temp - 1.0,
                    humidity_pct: *humidity,
                    pressure_hpa: 1010.0,
                    wind_speed_mps: 3.0,
                    wind_direction_deg: 90,
                    description: description.to_string(),
                    icon: String::new(),
                    sunrise: None,
                    sunset: None,
                    fetched_at: Utc::now(),
                    units: UnitSystem::Metric,
                }),
                Outcome::Fail(message) => Err(anyhow!(*message)),
                Outcome::Panic => panic!("provider exploded"),
            }
        }
    }

    fn aggregator_with(providers: &[Arc<StubProvider>]) -> Aggregator {
        let mut aggregator = Aggregator::new(Arc::new(CacheStore::from_minutes(10)));
        for p in providers {
            aggregator.add_provider(Arc::clone(p) as Arc<dyn WeatherProvider>);
        }
        aggregator
    }

    #[tokio::test]
    async fn no_providers_is_an_error() {
        let aggregator = aggregator_with(&[]);
        let err = aggregator
            .get_weather(&CancellationToken::new(), "Paris", "FR")
            .await
            .unwrap_err();
        assert!(matches!(err, AggregatorError::NoProvidersAvailable));
    }

    #[test]
    fn unavailable_providers_are_not_registered() {
        let offline = Arc::new(StubProvider {
            name: "Offline",
            available: false,
            outcome: Outcome::Fail("unused"),
            delay: None,
            calls: AtomicUsize::new(0),
        });
        let mut aggregator = Aggregator::new(Arc::new(CacheStore::from_minutes(10)));

        assert!(aggregator.add_provider(StubProvider::ok("A", 1.0, 1)));
        assert!(!aggregator.add_provider(offline));
        assert!(aggregator.add_provider(StubProvider::ok("B", 1.0, 1)));

        assert_eq!(aggregator.provider_count(), 2);
        assert_eq!(aggregator.provider_names(), vec!["A", "B"]);
    }

    #[tokio::test]
    async fn merges_two_successful_providers() {
        let aggregator = aggregator_with(&[
            StubProvider::ok("A", 10.0, 50),
            StubProvider::ok("B", 20.0, 70),
        ]);

        let weather = aggregator
            .get_weather(&CancellationToken::new(), "Paris", "FR")
            .await
            .expect("aggregate");

        assert_eq!(weather.temperature.average, 15.0);
        assert_eq!(weather.temperature.min, 10.0);
        assert_eq!(weather.temperature.max, 20.0);
        assert_eq!(weather.humidity.average, 60.0);
        assert_eq!(weather.humidity.min, 50.0);
        assert_eq!(weather.humidity.max, 70.0);
        assert_eq!(weather.location, "Paris, FR");
        assert_eq!(weather.description, "clear sky");

        // completion order, not registration order
        let mut providers = weather.providers.clone();
        providers.sort();
        assert_eq!(providers, vec!["A", "B"]);
    }

    #[tokio::test]
    async fn partial_failure_uses_only_successful_readings() {
        let aggregator = aggregator_with(&[
            StubProvider::failing("A", "timeout"),
            StubProvider::ok("B", 7.5, 40),
            StubProvider::failing("C", "invalid API key"),
        ]);

        let weather = aggregator
            .get_weather(&CancellationToken::new(), "Oslo", "NO")
            .await
            .expect("partial success");

        assert_eq!(weather.providers, vec!["B"]);
        assert_eq!(weather.temperature.average, 7.5);
        assert_eq!(weather.feels_like.average, 6.5);
        assert_eq!(weather.humidity.average, 40.0);
        assert_eq!(weather.pressure.average, 1010.0);
        assert_eq!(weather.wind_speed.average, 3.0);
        assert_eq!(weather.temperature.values, vec![7.5]);
    }

    #[tokio::test]
    async fn total_failure_reports_every_provider() {
        let aggregator = aggregator_with(&[
            StubProvider::failing("A", "timeout"),
            StubProvider::failing("B", "city not found"),
            StubProvider::failing("C", "invalid API key"),
        ]);

        let err = aggregator
            .get_weather(&CancellationToken::new(), "Atlantis", "XX")
            .await
            .unwrap_err();

        let messages = err.provider_messages();
        assert!(matches!(err, AggregatorError::AllProvidersFailed { .. }));
        assert_eq!(messages.len(), 3);
        assert!(messages.contains(&"B: city not found".to_string()));
        assert!(aggregator.cache().is_empty());
    }

    #[tokio::test]
    async fn second_call_within_ttl_is_served_from_cache() {
        let a = StubProvider::ok("A", 10.0, 50);
        let b = StubProvider::ok("B", 20.0, 70);
        let aggregator = aggregator_with(&[Arc::clone(&a), Arc::clone(&b)]);
        let cancel = CancellationToken::new();

        let first = aggregator
            .get_weather(&cancel, "Paris", "FR")
            .await
            .expect("first");
        let second = aggregator
            .get_weather(&cancel, "Paris", "FR")
            .await
            .expect("second");

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.last_updated, second.last_updated);
        assert_eq!(a.calls(), 1);
        assert_eq!(b.calls(), 1);
    }

    #[tokio::test]
    async fn cache_keys_are_not_normalized() {
        let a = StubProvider::ok("A", 10.0, 50);
        let aggregator = aggregator_with(&[Arc::clone(&a)]);
        let cancel = CancellationToken::new();

        for city in ["Paris", "paris", "Paris "] {
            aggregator
                .get_weather(&cancel, city, "FR")
                .await
                .expect(city);
        }

        assert_eq!(a.calls(), 3);
    }

    #[tokio::test]
    async fn clear_cache_forces_refetch() {
        let a = StubProvider::ok("A", 10.0, 50);
        let aggregator = aggregator_with(&[Arc::clone(&a)]);
        let cancel = CancellationToken::new();

        for (city, country) in [("Paris", "FR"), ("Berlin", "DE")] {
            aggregator
                .get_weather(&cancel, city, country)
                .await
                .expect(city);
        }
        aggregator.clear_cache();

        assert!(aggregator.cache().get("Paris,FR").is_none());
        assert!(aggregator.cache().get("Berlin,DE").is_none());

        aggregator
            .get_weather(&cancel, "Paris", "FR")
            .await
            .expect("refetch");
        assert_eq!(a.calls(), 3);
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let failing = StubProvider::failing("A", "503 Service Unavailable");
        let aggregator = aggregator_with(&[Arc::clone(&failing)]);
        let cancel = CancellationToken::new();

        for _ in 0..2 {
            let result = aggregator.get_weather(&cancel, "Paris", "FR").await;
            assert!(result.is_err());
        }
        assert_eq!(failing.calls(), 2);
    }

    #[tokio::test]
    async fn cancellation_abandons_hanging_providers() {
        let hanging = StubProvider::slow("Hanging", Duration::from_secs(30));
        let aggregator = aggregator_with(&[Arc::clone(&hanging)]);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let err = aggregator
            .get_weather(&cancel, "Paris", "FR")
            .await
            .unwrap_err();

        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(err.provider_messages(), ["Hanging: request cancelled"]);
        assert_eq!(hanging.calls(), 1);
    }

    #[tokio::test]
    async fn cancellation_keeps_readings_that_already_arrived() {
        let fast = StubProvider::ok("Fast", 5.0, 30);
        let hanging = StubProvider::slow("Hanging", Duration::from_secs(30));
        let aggregator = aggregator_with(&[fast, hanging]);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let weather = aggregator
            .get_weather(&cancel, "Paris", "FR")
            .await
            .expect("partial");
        assert_eq!(weather.providers, vec!["Fast"]);
    }

    #[tokio::test]
    async fn already_cancelled_token_fails_every_provider() {
        let a = StubProvider::ok("A", 10.0, 50);
        let aggregator = aggregator_with(&[a]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = aggregator
            .get_weather(&cancel, "Paris", "FR")
            .await
            .unwrap_err();
        assert_eq!(err.provider_messages(), ["A: request cancelled"]);
    }

    #[tokio::test]
    async fn panicking_provider_counts_as_failure() {
        let aggregator = aggregator_with(&[
            StubProvider::with("Boom", Outcome::Panic),
            StubProvider::ok("B", 3.0, 20),
        ]);

        let weather = aggregator
            .get_weather(&CancellationToken::new(), "Rome", "IT")
            .await
            .expect("sibling still succeeds");
        assert_eq!(weather.providers, vec!["B"]);
    }

    #[tokio::test]
    async fn panicking_provider_is_named_in_the_failure() {
        let aggregator = aggregator_with(&[StubProvider::with("Boom", Outcome::Panic)]);

        let err = aggregator
            .get_weather(&CancellationToken::new(), "Rome", "IT")
            .await
            .unwrap_err();

        assert!(matches!(err, AggregatorError::AllProvidersFailed { .. }));
        assert_eq!(err.provider_messages(), ["Boom: task panicked"]);
    }

    #[tokio::test]
    async fn equal_readings_keep_average_within_bounds() {
        let aggregator = aggregator_with(&[
            StubProvider::ok("A", 0.1, 10),
            StubProvider::ok("B", 0.1, 10),
            StubProvider::ok("C", 0.1, 10),
        ]);

        let weather = aggregator
            .get_weather(&CancellationToken::new(), "Reykjavik", "IS")
            .await
            .expect("aggregate");

        let temperature = &weather.temperature;
        assert!(temperature.min <= temperature.average);
        assert!(temperature.average <= temperature.max);
        assert_eq!(temperature.average, 0.1);
    }

    #[test]
    fn aggregate_readings_takes_majority_description() {
        let reading = |provider: &str, description: &str| Reading {
            provider: provider.to_string(),
            location_name: "Rome, IT".to_string(),
            temperature_c: 20.0,
            feels_like_c: 20.0,
            humidity_pct: 50,
            pressure_hpa: 1000.0,
            wind_speed_mps: 1.0,
            wind_direction_deg: 0,
            description: description.to_string(),
            icon: String::new(),
            sunrise: None,
            sunset: None,
            fetched_at: Utc::now(),
            units: UnitSystem::Metric,
        };

        let readings = [
            reading("A", "rain"),
            reading("B", "sun"),
            reading("C", "rain"),
        ];
        let weather = aggregate_readings(&readings, "Rome", "IT");

        assert_eq!(weather.description, "rain");
        assert_eq!(weather.providers, vec!["A", "B", "C"]);
        assert_eq!(weather.pressure.values.len(), 3);
    }
}
