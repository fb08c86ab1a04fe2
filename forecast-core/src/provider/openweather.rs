use async_trait::async_trait;
use chrono::DateTime;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

use crate::{
    error::ForecastError,
    model::{CityMeta, CitySuggestion, ForecastIntervalEntry, GeoPoint, RawForecast},
};

use super::ForecastProvider;

const FORECAST_PATH: &str = "/data/2.5/forecast";
const GEOCODING_PATH: &str = "/geo/1.0/direct";
const REQUEST_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone)]
pub struct OpenWeatherProvider {
    api_key: String,
    base_url: String,
    http: Client,
}

impl OpenWeatherProvider {
    pub fn new(api_key: String, base_url: String) -> Result<Self, ForecastError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<String, ForecastError> {
        let url = format!("{}{}", self.base_url, path);

        let res = self
            .http
            .get(&url)
            .query(query)
            .query(&[("appid", self.api_key.as_str())])
            .send()
            .await?;

        let status = res.status();
        let body = res.text().await?;

        if !status.is_success() {
            tracing::debug!(%status, body = %truncate_body(&body), "OpenWeather request failed");
            return Err(ForecastError::from_status(status, &body));
        }

        Ok(body)
    }

    async fn forecast(&self, query: &[(&str, String)]) -> Result<RawForecast, ForecastError> {
        let body = self.get(FORECAST_PATH, query).await?;
        parse_forecast(&body)
    }
}

#[async_trait]
impl ForecastProvider for OpenWeatherProvider {
    async fn fetch_forecast(&self, coords: GeoPoint) -> Result<RawForecast, ForecastError> {
        self.forecast(&[
            ("lat", coords.latitude.to_string()),
            ("lon", coords.longitude.to_string()),
            ("units", "metric".to_string()),
        ])
        .await
    }

    async fn fetch_forecast_by_city(&self, city: &str) -> Result<RawForecast, ForecastError> {
        self.forecast(&[("q", city.to_string()), ("units", "metric".to_string())])
            .await
    }

    async fn search_cities(
        &self,
        term: &str,
        limit: usize,
    ) -> Result<Vec<CitySuggestion>, ForecastError> {
        let body = self
            .get(
                GEOCODING_PATH,
                &[("q", term.to_string()), ("limit", limit.to_string())],
            )
            .await?;
        parse_geocoding(&body)
    }
}

#[derive(Debug, Deserialize)]
struct OwMain {
    temp: f64,
    feels_like: f64,
    humidity: u8,
}

#[derive(Debug, Deserialize)]
struct OwWeather {
    id: u32,
    icon: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct OwWind {
    speed: f64,
}

#[derive(Debug, Deserialize)]
struct OwForecastEntry {
    dt: i64,
    main: OwMain,
    #[serde(default)]
    weather: Vec<OwWeather>,
    wind: Option<OwWind>,
    pop: Option<f64>,
    #[serde(default)]
    dt_txt: String,
}

#[derive(Debug, Deserialize)]
struct OwCoord {
    lat: f64,
    lon: f64,
}

#[derive(Debug, Deserialize)]
struct OwCity {
    #[serde(default)]
    name: String,
    #[serde(default)]
    country: String,
    #[serde(default)]
    timezone: i32,
    coord: Option<OwCoord>,
}

#[derive(Debug, Deserialize)]
struct OwForecastResponse {
    #[serde(default)]
    list: Vec<OwForecastEntry>,
    city: Option<OwCity>,
}

#[derive(Debug, Deserialize)]
struct OwGeoEntry {
    name: String,
    lat: f64,
    lon: f64,
    #[serde(default)]
    country: String,
    state: Option<String>,
}

/// `cod` arrives as a string on success ("200") and sometimes as a number on
/// failure; anything but 200 is an application error.
fn embedded_error(payload: &Value) -> Option<ForecastError> {
    let cod = match payload.get("cod")? {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    if cod == "200" {
        return None;
    }

    let message = payload
        .get("message")
        .and_then(Value::as_str)
        .filter(|m| !m.is_empty())
        .map(str::to_string);

    Some(match message {
        Some(m) => ForecastError::Provider(m),
        None => ForecastError::Provider(format!("Provider returned status {cod}")),
    })
}

fn parse_forecast(body: &str) -> Result<RawForecast, ForecastError> {
    let payload: Value = serde_json::from_str(body)?;
    if let Some(err) = embedded_error(&payload) {
        return Err(err);
    }

    let parsed: OwForecastResponse = serde_json::from_value(payload)?;

    let intervals = parsed
        .list
        .into_iter()
        .map(into_interval)
        .collect::<Result<Vec<_>, _>>()?;

    let city = parsed.city.map(|c| CityMeta {
        name: c.name,
        country: c.country,
        utc_offset_seconds: c.timezone,
        coordinates: c.coord.map(|p| GeoPoint::new(p.lat, p.lon)),
    });

    Ok(RawForecast { city, intervals })
}

fn into_interval(entry: OwForecastEntry) -> Result<ForecastIntervalEntry, ForecastError> {
    let timestamp_utc = DateTime::from_timestamp(entry.dt, 0)
        .ok_or_else(|| ForecastError::Parse(format!("invalid timestamp {}", entry.dt)))?;

    let condition = entry.weather.into_iter().next();

    Ok(ForecastIntervalEntry {
        timestamp_utc,
        temperature: entry.main.temp,
        feels_like: entry.main.feels_like,
        humidity: entry.main.humidity,
        weather_code: condition.as_ref().map(|w| w.id),
        weather_icon: condition.as_ref().map(|w| w.icon.clone()),
        description: condition.map(|w| w.description),
        wind_speed: entry.wind.map(|w| w.speed).unwrap_or_default(),
        precipitation_chance: entry.pop.unwrap_or_default(),
        raw_time_text: entry.dt_txt,
    })
}

fn parse_geocoding(body: &str) -> Result<Vec<CitySuggestion>, ForecastError> {
    let payload: Value = serde_json::from_str(body)?;
    if let Some(err) = embedded_error(&payload) {
        return Err(err);
    }

    let entries: Vec<OwGeoEntry> = serde_json::from_value(payload)?;

    Ok(entries
        .into_iter()
        .map(|e| CitySuggestion {
            name: e.name,
            country: e.country,
            state: e.state,
            coordinates: GeoPoint::new(e.lat, e.lon),
        })
        .collect())
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}
