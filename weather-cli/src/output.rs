use chrono::Local;
use serde::Serialize;
use weather_core::{AggregatedWeather, ErrorResponse};

pub fn render_text(weather: &AggregatedWeather) -> String {
    let rule = "=".repeat(40);
    let updated = weather
        .last_updated
        .with_timezone(&Local)
        .format("%H:%M:%S");

    format!(
        "Weather in {location}\n\
         {rule}\n\
         Temperature: {t:.1}°C (min: {tmin:.1}°C, max: {tmax:.1}°C)\n\
         Feels like: {feels:.1}°C\n\
         Humidity: {humidity:.0}%\n\
         Pressure: {pressure:.0} hPa\n\
         Wind speed: {wind:.1} m/s\n\
         Description: {description}\n\
         Sources: {sources}\n\
         Updated: {updated}",
        location = weather.location,
        t = weather.temperature.average,
        tmin = weather.temperature.min,
        tmax = weather.temperature.max,
        feels = weather.feels_like.average,
        humidity = weather.humidity.average,
        pressure = weather.pressure.average,
        wind = weather.wind_speed.average,
        description = weather.description,
        sources = weather.providers.join(", "),
    )
}

pub fn render_json<T: Serialize>(value: &T) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

pub fn error_payload(err: &weather_core::AggregatorError) -> ErrorResponse {
    ErrorResponse::new("failed to get weather", Some(err.to_string()))
}
