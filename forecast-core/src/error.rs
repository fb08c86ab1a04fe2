//! Error taxonomy shared by the cache, provider, search pipeline and view state.

use reqwest::StatusCode;
use thiserror::Error;

/// Every failure the core can surface to the view state.
///
/// Errors are `Clone` because a cached error state is handed to every
/// subscriber of the same query key.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ForecastError {
    #[error("Geolocation is not supported")]
    GeolocationUnsupported,

    #[error("Geolocation permission denied")]
    GeolocationDenied,

    #[error("Geolocation position unavailable")]
    GeolocationUnavailable,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Resource not found")]
    NotFound,

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("No results found for '{0}'")]
    NoResultsFound(String),

    #[error("Configuration missing: {0}")]
    ConfigurationMissing(String),

    #[error("Request failed")]
    RequestFailed,
}

impl ForecastError {
    /// Normalized message consumed by the view state.
    pub fn user_message(&self) -> String {
        match self {
            Self::GeolocationUnsupported => {
                "Geolocation is not supported on this device".to_string()
            }
            Self::GeolocationDenied => {
                "Location permission denied. Please search by city instead.".to_string()
            }
            Self::GeolocationUnavailable => {
                "Location unavailable. Please search by city instead.".to_string()
            }
            Self::Network(_) => "Network error occurred".to_string(),
            Self::Timeout => "Request timed out".to_string(),
            Self::Parse(_) => "Failed to parse response".to_string(),
            Self::NotFound => "Resource not found".to_string(),
            Self::Provider(msg) => msg.clone(),
            Self::NoResultsFound(_) => "No results found".to_string(),
            Self::ConfigurationMissing(field) => format!("{field} is not set"),
            Self::RequestFailed => "Request failed".to_string(),
        }
    }

    /// Classify a non-success HTTP response.
    ///
    /// A JSON body carrying a string `message` wins over the status code.
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        if let Some(message) = provider_message(body) {
            return Self::Provider(message);
        }

        if status == StatusCode::NOT_FOUND {
            Self::NotFound
        } else {
            Self::RequestFailed
        }
    }
}

impl From<reqwest::Error> for ForecastError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_decode() {
            Self::Parse(e.to_string())
        } else if let Some(status) = e.status() {
            Self::from_status(status, "")
        } else {
            Self::Network(e.to_string())
        }
    }
}

impl From<serde_json::Error> for ForecastError {
    fn from(e: serde_json::Error) -> Self {
        Self::Parse(e.to_string())
    }
}

fn provider_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("message")
        .and_then(|m| m.as_str())
        .filter(|m| !m.is_empty())
        .map(str::to_string)
}
