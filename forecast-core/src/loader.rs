//! Forecast fetches: cache, aggregate, then one view transition.
//!
//! Only the most recently started load may touch the view. An older load
//! that finishes later is dropped, whether it succeeded or failed.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::{
    aggregate::aggregate,
    cache::{QueryCache, QueryKey},
    error::ForecastError,
    model::{ForecastView, GeoPoint, RawForecast},
    provider::ForecastProvider,
    state::{ViewEvent, ViewStore},
};

pub const FORECAST_ENDPOINT: &str = "data/2.5/forecast";

#[derive(Debug, Clone)]
pub struct ForecastLoader {
    provider: Arc<dyn ForecastProvider>,
    cache: QueryCache<RawForecast>,
    store: ViewStore,
    latest: Arc<Mutex<u64>>,
}

impl ForecastLoader {
    pub fn new(provider: Arc<dyn ForecastProvider>, store: ViewStore) -> Self {
        Self {
            provider,
            cache: QueryCache::new(),
            store,
            latest: Arc::new(Mutex::new(0)),
        }
    }

    pub fn cache(&self) -> &QueryCache<RawForecast> {
        &self.cache
    }

    pub fn coords_key(coords: GeoPoint) -> QueryKey {
        QueryKey::new(
            FORECAST_ENDPOINT,
            [
                ("lat", coords.latitude.to_string()),
                ("lon", coords.longitude.to_string()),
                ("units", "metric".to_string()),
            ],
        )
    }

    pub fn city_key(city: &str) -> QueryKey {
        QueryKey::new(
            FORECAST_ENDPOINT,
            [("q", city.to_string()), ("units", "metric".to_string())],
        )
    }

    /// Cached, deduplicated forecast for `coords`. Does not touch the view.
    pub async fn fetch(&self, coords: GeoPoint) -> Result<ForecastView, ForecastError> {
        let provider = Arc::clone(&self.provider);
        let raw = self
            .cache
            .request(Self::coords_key(coords), move || async move {
                provider.fetch_forecast(coords).await
            })
            .settled()
            .await?;

        Ok(aggregate(&raw.intervals, raw.city.as_ref()))
    }

    /// Fetch for `coords` and apply the outcome to the view.
    ///
    /// `place` names the location in the failure message when known.
    pub async fn load(&self, coords: GeoPoint, place: Option<&str>) -> Result<(), ForecastError> {
        let token = self.begin();
        let result = self.fetch(coords).await;
        self.apply(token, coords, result, place)
    }

    /// Fetch by free-text city name; coordinates come from the response.
    pub async fn load_city(&self, city: &str) -> Result<(), ForecastError> {
        let token = self.begin();

        let provider = Arc::clone(&self.provider);
        let name = city.to_string();
        let raw = self
            .cache
            .request(Self::city_key(city), move || async move {
                provider.fetch_forecast_by_city(&name).await
            })
            .settled()
            .await;

        let located = raw.and_then(|raw| {
            let coords = raw
                .city
                .as_ref()
                .and_then(|c| c.coordinates)
                .ok_or_else(|| ForecastError::Parse("response has no city coordinates".into()))?;
            Ok((coords, aggregate(&raw.intervals, raw.city.as_ref())))
        });

        match located {
            Ok((coords, view)) => self.apply(token, coords, Ok(view), Some(city)),
            Err(e) => self.fail(token, e, Some(city)),
        }
    }

    /// Start a load: it supersedes every load started before it.
    fn begin(&self) -> u64 {
        let mut latest = self.latest.lock();
        *latest += 1;
        self.store.dispatch(ViewEvent::ForecastRequested);
        *latest
    }

    /// Dispatch `event` only if `token` still belongs to the latest load.
    /// The check and the dispatch happen under one lock.
    fn settle(&self, token: u64, event: ViewEvent) -> bool {
        let latest = self.latest.lock();
        if *latest != token {
            tracing::debug!(token, latest = *latest, "discarding outdated forecast load");
            return false;
        }
        self.store.dispatch(event);
        true
    }

    fn apply(
        &self,
        token: u64,
        coords: GeoPoint,
        result: Result<ForecastView, ForecastError>,
        place: Option<&str>,
    ) -> Result<(), ForecastError> {
        match result {
            Ok(forecast) => {
                let city = forecast.city_name.clone();
                let days = forecast.days.len();
                if self.settle(token, ViewEvent::ForecastLoaded { coords, forecast }) {
                    tracing::info!(%city, days, "forecast loaded");
                }
                Ok(())
            }
            Err(e) => self.fail(token, e, place),
        }
    }

    fn fail(&self, token: u64, e: ForecastError, place: Option<&str>) -> Result<(), ForecastError> {
        let message = match place {
            Some(place) => format!("Failed to load forecast for {place}: {}", e.user_message()),
            None => e.user_message(),
        };
        tracing::warn!(error = %e, "forecast load failed");
        self.settle(token, ViewEvent::ForecastFailed { message });
        Err(e)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::model::{CityMeta, CitySuggestion, ForecastIntervalEntry, PageView};
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone, Utc};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted provider shared by the loader, search and app tests.
    #[derive(Debug, Default)]
    pub(crate) struct MockProvider {
        pub forecast_calls: AtomicUsize,
        pub search_terms: Mutex<Vec<String>>,
        pub forecast_error: Mutex<Option<ForecastError>>,
        pub empty_forecast: std::sync::atomic::AtomicBool,
        /// Per-term artificial latency in milliseconds.
        pub search_delays: Mutex<Vec<(String, u64)>>,
        pub no_results: Mutex<Vec<String>>,
        pub search_error: Mutex<Option<ForecastError>>,
        /// Per-position forecast latency in milliseconds.
        pub forecast_delays: Mutex<Vec<(GeoPoint, u64)>>,
    }

    pub(crate) fn raw_forecast(coords: GeoPoint) -> RawForecast {
        let start = Utc.with_ymd_and_hms(2024, 1, 20, 0, 0, 0).unwrap();
        let intervals = (0..16)
            .map(|i| ForecastIntervalEntry {
                timestamp_utc: start + Duration::hours(3 * i),
                temperature: i as f64,
                feels_like: i as f64,
                humidity: 70,
                weather_code: Some(800),
                weather_icon: Some("01d".into()),
                description: Some("clear sky".into()),
                wind_speed: 2.0,
                precipitation_chance: 0.0,
                raw_time_text: String::new(),
            })
            .collect();

        RawForecast {
            city: Some(CityMeta {
                name: "London".into(),
                country: "GB".into(),
                utc_offset_seconds: 0,
                coordinates: Some(coords),
            }),
            intervals,
        }
    }

    pub(crate) fn city(name: &str) -> CitySuggestion {
        CitySuggestion {
            name: name.to_string(),
            country: "FR".into(),
            state: None,
            coordinates: GeoPoint::new(48.85, 2.35),
        }
    }

    #[async_trait]
    impl ForecastProvider for MockProvider {
        async fn fetch_forecast(&self, coords: GeoPoint) -> Result<RawForecast, ForecastError> {
            self.forecast_calls.fetch_add(1, Ordering::SeqCst);
            let delay = self
                .forecast_delays
                .lock()
                .iter()
                .find(|(at, _)| *at == coords)
                .map(|(_, ms)| *ms)
                .unwrap_or(10);
            tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
            let failure = self.forecast_error.lock().clone();
            if let Some(err) = failure {
                return Err(err);
            }
            if self.empty_forecast.load(Ordering::SeqCst) {
                return Ok(RawForecast::default());
            }
            Ok(raw_forecast(coords))
        }

        async fn fetch_forecast_by_city(&self, _city: &str) -> Result<RawForecast, ForecastError> {
            self.fetch_forecast(GeoPoint::new(51.5, -0.12)).await
        }

        async fn search_cities(
            &self,
            term: &str,
            _limit: usize,
        ) -> Result<Vec<CitySuggestion>, ForecastError> {
            self.search_terms.lock().push(term.to_string());
            let delay = self
                .search_delays
                .lock()
                .iter()
                .find(|(t, _)| t == term)
                .map(|(_, ms)| *ms)
                .unwrap_or(5);
            tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
            let failure = self.search_error.lock().clone();
            if let Some(err) = failure {
                return Err(err);
            }
            if self.no_results.lock().iter().any(|t| t == term) {
                return Ok(vec![]);
            }
            Ok(vec![city(term), city(&format!("{term} Sud"))])
        }
    }

    fn loader() -> (Arc<MockProvider>, ForecastLoader, ViewStore) {
        let provider = Arc::new(MockProvider::default());
        let store = ViewStore::default();
        let loader = ForecastLoader::new(provider.clone(), store.clone());
        (provider, loader, store)
    }

    #[tokio::test(start_paused = true)]
    async fn load_updates_view_and_coords_together() {
        let (_, loader, store) = loader();
        let coords = GeoPoint::new(51.5, -0.12);

        loader.load(coords, None).await.unwrap();

        let state = store.snapshot();
        assert_eq!(state.page, PageView::Forecast);
        assert_eq!(state.coords, Some(coords));
        assert_eq!(state.forecast.as_ref().map(|f| f.days.len()), Some(2));
        assert!(!state.loading);
        assert_eq!(state.error, None);
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_loads_issue_one_request() {
        let (provider, loader, _) = loader();
        let coords = GeoPoint::new(10.0, 20.0);

        let (a, b) = tokio::join!(loader.fetch(coords), loader.fetch(coords));
        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(provider.forecast_calls.load(Ordering::SeqCst), 1);

        // Cached afterwards.
        loader.fetch(coords).await.unwrap();
        assert_eq!(provider.forecast_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn first_failure_leaves_permission_page() {
        let (provider, loader, store) = loader();
        *provider.forecast_error.lock() = Some(ForecastError::Network("down".into()));

        let err = loader.load(GeoPoint::new(1.0, 1.0), None).await.unwrap_err();
        assert_eq!(err, ForecastError::Network("down".into()));

        let state = store.snapshot();
        assert_eq!(state.page, PageView::Permission);
        assert_eq!(state.forecast, None);
        assert_eq!(state.error.as_deref(), Some("Network error occurred"));
    }

    #[tokio::test(start_paused = true)]
    async fn later_failure_keeps_previous_forecast() {
        let (provider, loader, store) = loader();
        let home = GeoPoint::new(51.5, -0.12);
        loader.load(home, None).await.unwrap();
        let before = store.snapshot();

        *provider.forecast_error.lock() = Some(ForecastError::Timeout);
        let _ = loader.load(GeoPoint::new(2.0, 2.0), Some("Paris, FR")).await;

        let after = store.snapshot();
        assert_eq!(after.forecast, before.forecast);
        assert_eq!(after.coords, Some(home));
        assert_eq!(
            after.error.as_deref(),
            Some("Failed to load forecast for Paris, FR: Request timed out")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn empty_result_does_not_navigate() {
        let (provider, loader, store) = loader();
        provider.empty_forecast.store(true, Ordering::SeqCst);

        loader.load(GeoPoint::new(3.0, 3.0), None).await.unwrap();

        let state = store.snapshot();
        assert_eq!(state.page, PageView::Permission);
        assert_eq!(state.coords, None);
        assert!(state.error.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn slower_earlier_load_never_overwrites_newer_one() {
        let (provider, loader, store) = loader();
        let paris = GeoPoint::new(1.0, 1.0);
        let london = GeoPoint::new(2.0, 2.0);
        provider.forecast_delays.lock().push((paris, 1000));

        let slow = loader.load(paris, Some("Paris, FR"));
        let fast = async {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            let result = loader.load(london, Some("London, GB")).await;
            assert_eq!(store.snapshot().coords, Some(london));
            result
        };
        let (slow, fast) = tokio::join!(slow, fast);
        slow.unwrap();
        fast.unwrap();

        let state = store.snapshot();
        assert_eq!(state.coords, Some(london));
        assert!(!state.loading);
        assert_eq!(provider.forecast_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn outdated_failure_is_not_reported() {
        let (provider, loader, store) = loader();
        let slow = GeoPoint::new(1.0, 1.0);
        let fast = GeoPoint::new(2.0, 2.0);
        provider.forecast_delays.lock().push((slow, 1000));

        // Fails only after the newer load has already succeeded.
        let first = loader.load(slow, None);
        let second = async {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            loader.load(fast, None).await.unwrap();
            *provider.forecast_error.lock() = Some(ForecastError::Timeout);
        };
        let (first, ()) = tokio::join!(first, second);

        assert_eq!(first, Err(ForecastError::Timeout));
        let state = store.snapshot();
        assert_eq!(state.coords, Some(fast));
        assert_eq!(state.error, None);
        assert_eq!(state.page, PageView::Forecast);
    }

    #[tokio::test(start_paused = true)]
    async fn loading_stays_set_until_latest_load_settles() {
        let (provider, loader, store) = loader();
        let fast = GeoPoint::new(1.0, 1.0);
        let slow = GeoPoint::new(2.0, 2.0);
        provider.forecast_delays.lock().push((slow, 1000));

        let first = loader.load(fast, None);
        let second = async {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            loader.load(slow, None).await
        };
        let check = async {
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            let state = store.snapshot();
            assert!(state.loading);
            assert_eq!(state.coords, None);
        };
        let (first, second, ()) = tokio::join!(first, second, check);
        first.unwrap();
        second.unwrap();

        let state = store.snapshot();
        assert!(!state.loading);
        assert_eq!(state.coords, Some(slow));
    }

    #[tokio::test(start_paused = true)]
    async fn load_city_takes_coordinates_from_response() {
        let (_, loader, store) = loader();
        loader.load_city("London").await.unwrap();

        let state = store.snapshot();
        assert_eq!(state.coords, Some(GeoPoint::new(51.5, -0.12)));
        assert_eq!(state.page, PageView::Forecast);
    }
}
