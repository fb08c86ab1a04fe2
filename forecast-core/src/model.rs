use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Icon used when a day carries no weather codes at all.
pub const CLEAR_SKY_ICON: &str = "01d";

/// Geographic position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }
}

impl std::fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.4}, {:.4}", self.latitude, self.longitude)
    }
}

/// One 3-hour sample from the provider feed. Temperatures are Celsius.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastIntervalEntry {
    pub timestamp_utc: DateTime<Utc>,
    pub temperature: f64,
    pub feels_like: f64,
    pub humidity: u8,
    pub weather_code: Option<u32>,
    pub weather_icon: Option<String>,
    pub description: Option<String>,
    pub wind_speed: f64,
    /// Probability of precipitation, 0.0..=1.0.
    pub precipitation_chance: f64,
    pub raw_time_text: String,
}

/// City metadata that accompanies a forecast feed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CityMeta {
    pub name: String,
    pub country: String,
    pub utc_offset_seconds: i32,
    pub coordinates: Option<GeoPoint>,
}

/// Validated provider payload, before aggregation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawForecast {
    pub city: Option<CityMeta>,
    pub intervals: Vec<ForecastIntervalEntry>,
}

/// Aggregate of all intervals sharing a UTC calendar date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaySummary {
    pub date: NaiveDate,
    pub min_temp: f64,
    pub max_temp: f64,
    pub icon: String,
    pub description: String,
    pub intervals: Vec<ForecastIntervalEntry>,
}

impl DaySummary {
    /// Full weekday name, e.g. "Monday".
    pub fn day_of_week_label(&self) -> String {
        self.date.format("%A").to_string()
    }

    /// Short month/day label, e.g. "Jan 20".
    pub fn short_date_label(&self) -> String {
        format!("{} {}", self.date.format("%b"), self.date.day())
    }
}

/// The canonical aggregate result shown to the user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ForecastView {
    pub city_name: String,
    pub country_code: String,
    pub utc_offset_seconds: i32,
    pub days: Vec<DaySummary>,
}

impl ForecastView {
    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }
}

/// A geocoding match offered while the user types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CitySuggestion {
    pub name: String,
    pub country: String,
    pub state: Option<String>,
    pub coordinates: GeoPoint,
}

impl CitySuggestion {
    /// "Name, State, Country" or "Name, Country".
    pub fn display_name(&self) -> String {
        match self.state.as_deref().filter(|s| !s.is_empty()) {
            Some(state) => format!("{}, {}, {}", self.name, state, self.country),
            None => format!("{}, {}", self.name, self.country),
        }
    }

    /// Primary line of a suggestion list entry: "Name, State" or "Name".
    pub fn list_label(&self) -> String {
        match self.state.as_deref().filter(|s| !s.is_empty()) {
            Some(state) => format!("{}, {}", self.name, state),
            None => self.name.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TemperatureUnit {
    #[default]
    Celsius,
    Fahrenheit,
}

impl TemperatureUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            TemperatureUnit::Celsius => "celsius",
            TemperatureUnit::Fahrenheit => "fahrenheit",
        }
    }
}

impl std::fmt::Display for TemperatureUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for TemperatureUnit {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.to_lowercase().as_str() {
            "celsius" | "c" => Ok(TemperatureUnit::Celsius),
            "fahrenheit" | "f" => Ok(TemperatureUnit::Fahrenheit),
            _ => Err(anyhow::anyhow!(
                "Unknown unit '{value}'. Supported units: celsius, fahrenheit."
            )),
        }
    }
}

/// Geolocation permission, tracked independently of the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PermissionStatus {
    #[default]
    Pending,
    Granted,
    Denied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PageView {
    #[default]
    Permission,
    Forecast,
    DayDetails,
}
