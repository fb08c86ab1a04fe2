//! Core library for the `forecast` CLI.
//!
//! This crate defines:
//! - Configuration & credentials handling
//! - The forecast/geocoding provider abstraction and its OpenWeather client
//! - A deduplicating query cache and the five-day aggregation
//! - The view state machine, debounced city search and the `WeatherApp` facade
//!
//! It is used by `forecast-cli`, but any other front end can drive `WeatherApp`.

pub mod aggregate;
pub mod app;
pub mod cache;
pub mod config;
pub mod error;
pub mod format;
pub mod geolocation;
pub mod loader;
pub mod model;
pub mod provider;
pub mod search;
pub mod state;

pub use app::WeatherApp;
pub use config::Config;
pub use error::ForecastError;
pub use model::{
    CitySuggestion, DaySummary, ForecastIntervalEntry, ForecastView, GeoPoint, PageView,
    PermissionStatus, TemperatureUnit,
};
pub use provider::ForecastProvider;
pub use search::{NavKey, SearchState};
pub use state::ViewState;
