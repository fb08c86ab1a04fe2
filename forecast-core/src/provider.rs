use crate::{
    config::Config,
    error::ForecastError,
    model::{CitySuggestion, GeoPoint, RawForecast},
    provider::openweather::OpenWeatherProvider,
};
use async_trait::async_trait;
use std::{fmt::Debug, sync::Arc};

pub mod openweather;

/// The forecast/geocoding collaborator the core depends on.
///
/// Implementations normalize transport failures and embedded application
/// errors into [`ForecastError`] before returning.
#[async_trait]
pub trait ForecastProvider: Send + Sync + Debug {
    async fn fetch_forecast(&self, coords: GeoPoint) -> Result<RawForecast, ForecastError>;

    async fn fetch_forecast_by_city(&self, city: &str) -> Result<RawForecast, ForecastError>;

    async fn search_cities(
        &self,
        term: &str,
        limit: usize,
    ) -> Result<Vec<CitySuggestion>, ForecastError>;
}

/// Construct the provider from config.
///
/// Fails immediately with [`ForecastError::ConfigurationMissing`] when
/// credentials or the base URL are absent.
pub fn provider_from_config(config: &Config) -> Result<Arc<dyn ForecastProvider>, ForecastError> {
    let settings = config.provider_settings()?;
    let provider = OpenWeatherProvider::new(settings.api_key, settings.base_url)?;
    Ok(Arc::new(provider))
}
