//! HTTP front end. Every request goes through one shared aggregator, so the
//! cache is shared too.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};
use weather_core::{Aggregator, CancellationToken, Config, ErrorResponse};

use crate::{cli::build_aggregator, output, signals};

/// Deadline for a single `/api/weather` request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

const HOME_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>Weather aggregator</title></head>
<body>
    <h1>Weather aggregator</h1>
    <p>Current weather merged from several providers.</p>
    <ul>
        <li><code>GET /api/weather?city=Moscow&amp;country=RU</code></li>
        <li><code>GET /api/health</code></li>
    </ul>
</body>
</html>
"#;

#[derive(Debug)]
pub struct AppState {
    pub aggregator: Arc<Aggregator>,
    pub default_country: String,
    pub request_timeout: Duration,
}

#[derive(Debug, Deserialize)]
pub struct WeatherQuery {
    pub city: Option<String>,
    pub country: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub providers: usize,
    pub provider_names: Vec<String>,
}

pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(home))
        .route("/api/weather", get(weather))
        .route("/api/health", get(health))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until Ctrl+C or SIGTERM, letting in-flight requests finish.
pub async fn run(config: &Config, port: u16) -> anyhow::Result<()> {
    let aggregator = build_aggregator(config)?;
    if aggregator.provider_count() == 0 {
        warn!("no providers configured, weather requests will fail");
    }

    let state = Arc::new(AppState {
        aggregator: Arc::new(aggregator),
        default_country: config.default_country.clone(),
        request_timeout: REQUEST_TIMEOUT,
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    info!(%addr, "weather server listening");

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(signals::shutdown_signal())
        .await
        .context("Server error")?;

    info!("weather server stopped");
    Ok(())
}

async fn home() -> Html<&'static str> {
    Html(HOME_PAGE)
}

async fn weather(
    State(state): State<Arc<AppState>>,
    Query(query): Query<WeatherQuery>,
) -> Response {
    let Some(city) = query.city.filter(|city| !city.is_empty()) else {
        let body = ErrorResponse::new("city is required", None);
        return (StatusCode::BAD_REQUEST, Json(body)).into_response();
    };
    let country = query
        .country
        .filter(|country| !country.is_empty())
        .unwrap_or_else(|| state.default_country.clone());

    // Dropping the handler (client gone) or finishing cancels the timer too.
    let cancel = CancellationToken::new();
    let _cancel_on_drop = cancel.clone().drop_guard();
    tokio::spawn(cancel_after(cancel.clone(), state.request_timeout));

    match state.aggregator.get_weather(&cancel, &city, &country).await {
        Ok(weather) => Json(&*weather).into_response(),
        Err(err) => {
            warn!(%city, %country, error = %err, "weather request failed");
            let body = output::error_payload(&err);
            (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
        }
    }
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        providers: state.aggregator.provider_count(),
        provider_names: state.aggregator.provider_names(),
    })
}

async fn cancel_after(cancel: CancellationToken, timeout: Duration) {
    tokio::select! {
        () = cancel.cancelled() => {}
        () = tokio::time::sleep(timeout) => {
            warn!(?timeout, "request timed out");
            cancel.cancel();
        }
    }
}
