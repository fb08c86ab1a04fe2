//! The facade handed to presentation code.
//!
//! Readers get a `watch` subscription to [`ViewState`]; every mutation goes
//! through one of the intent methods below.

use std::sync::Arc;

use tokio::sync::watch;

use crate::{
    config::Config,
    error::ForecastError,
    geolocation::{FixedGeolocator, Geolocator},
    loader::ForecastLoader,
    model::{CitySuggestion, DaySummary, PermissionStatus, TemperatureUnit},
    provider::{ForecastProvider, provider_from_config},
    search::{NavKey, SearchPipeline, SearchSettings, SearchState},
    state::{ViewEvent, ViewState, ViewStore},
};

#[derive(Debug)]
pub struct WeatherApp {
    store: ViewStore,
    loader: ForecastLoader,
    search: SearchPipeline,
    geolocator: Arc<dyn Geolocator>,
}

impl WeatherApp {
    pub fn new(
        config: &Config,
        provider: Arc<dyn ForecastProvider>,
        geolocator: Arc<dyn Geolocator>,
    ) -> Self {
        let store = ViewStore::new(ViewState::with_unit(config.display.unit));
        let loader = ForecastLoader::new(Arc::clone(&provider), store.clone());
        let search = SearchPipeline::new(
            provider,
            loader.clone(),
            SearchSettings::from(&config.search),
        );

        Self {
            store,
            loader,
            search,
            geolocator,
        }
    }

    /// Build against the configured provider, positioned by `config.location`.
    ///
    /// Missing credentials fail here rather than on the first request.
    pub fn from_config(config: &Config) -> Result<Self, ForecastError> {
        let provider = provider_from_config(config)?;
        let geolocator = Arc::new(FixedGeolocator::new(config.location));
        Ok(Self::new(config, provider, geolocator))
    }

    pub fn with_geolocator(
        config: &Config,
        geolocator: Arc<dyn Geolocator>,
    ) -> Result<Self, ForecastError> {
        let provider = provider_from_config(config)?;
        Ok(Self::new(config, provider, geolocator))
    }

    pub fn state(&self) -> ViewState {
        self.store.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<ViewState> {
        self.store.subscribe()
    }

    pub fn search_state(&self) -> SearchState {
        self.search.snapshot()
    }

    pub fn subscribe_search(&self) -> watch::Receiver<SearchState> {
        self.search.subscribe()
    }

    /// Locate the device and fetch its forecast.
    ///
    /// Geolocation failures only update permission and error; no fetch is made.
    pub async fn request_geolocation(&self) -> Result<(), ForecastError> {
        self.store.dispatch(ViewEvent::GeolocationRequested);

        match self.geolocator.current_position().await {
            Ok(coords) => {
                tracing::info!(%coords, "position acquired");
                self.store
                    .dispatch(ViewEvent::PermissionChanged(PermissionStatus::Granted));
                self.loader.load(coords, None).await
            }
            Err(e) => {
                tracing::warn!(error = %e, "geolocation failed");
                let permission = matches!(e, ForecastError::GeolocationDenied)
                    .then_some(PermissionStatus::Denied);
                self.store.dispatch(ViewEvent::GeolocationFailed {
                    permission,
                    message: e.user_message(),
                });
                Err(e)
            }
        }
    }

    pub fn submit_search_text(&self, text: &str) {
        self.search.submit_text(text);
    }

    pub async fn select_suggestion(&self, suggestion: CitySuggestion) -> Result<(), ForecastError> {
        self.search.select_suggestion(suggestion).await
    }

    pub async fn search_key(&self, key: NavKey) -> Result<(), ForecastError> {
        self.search.handle_key(key).await
    }

    pub fn dismiss_suggestions(&self) {
        self.search.dismiss();
    }

    /// Forecast by free-text city name, without the suggestion list.
    pub async fn open_city(&self, city: &str) -> Result<(), ForecastError> {
        self.loader.load_city(city).await
    }

    pub fn select_day(&self, day: DaySummary) {
        self.store.dispatch(ViewEvent::DaySelected(day));
    }

    pub fn go_back(&self) {
        self.store.dispatch(ViewEvent::BackNavigated);
    }

    pub fn set_unit(&self, unit: TemperatureUnit) {
        self.store.dispatch(ViewEvent::UnitChanged(unit));
    }
}
