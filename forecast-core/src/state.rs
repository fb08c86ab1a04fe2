//! View state machine.
//!
//! `ViewState` is changed only by [`reduce`] applied to a closed set of
//! [`ViewEvent`]s. [`ViewStore`] serializes writers and fans the new state
//! out to any number of readers.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;

use crate::model::{
    DaySummary, ForecastView, GeoPoint, PageView, PermissionStatus, TemperatureUnit,
};

pub const EMPTY_FORECAST_MESSAGE: &str = "No forecast data available";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ViewState {
    pub page: PageView,
    pub permission: PermissionStatus,
    pub coords: Option<GeoPoint>,
    pub unit: TemperatureUnit,
    pub selected_day: Option<DaySummary>,
    pub forecast: Option<ForecastView>,
    pub loading: bool,
    pub error: Option<String>,
}

impl ViewState {
    pub fn with_unit(unit: TemperatureUnit) -> Self {
        Self {
            unit,
            ..Self::default()
        }
    }

    /// Page agrees with the data it displays.
    pub fn is_consistent(&self) -> bool {
        match self.page {
            PageView::Permission => self.selected_day.is_none(),
            PageView::Forecast => self.forecast.is_some() && self.selected_day.is_none(),
            PageView::DayDetails => self.forecast.is_some() && self.selected_day.is_some(),
        }
    }

    pub fn city_name(&self) -> Option<&str> {
        self.forecast
            .as_ref()
            .map(|f| f.city_name.as_str())
            .filter(|n| !n.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ViewEvent {
    GeolocationRequested,
    PermissionChanged(PermissionStatus),
    GeolocationFailed {
        permission: Option<PermissionStatus>,
        message: String,
    },
    ForecastRequested,
    /// Forecast and coordinates land together.
    ForecastLoaded {
        coords: GeoPoint,
        forecast: ForecastView,
    },
    ForecastFailed {
        message: String,
    },
    DaySelected(DaySummary),
    BackNavigated,
    UnitChanged(TemperatureUnit),
}

/// Pure transition function.
pub fn reduce(state: &ViewState, event: ViewEvent) -> ViewState {
    let mut next = state.clone();

    match event {
        ViewEvent::GeolocationRequested | ViewEvent::ForecastRequested => {
            next.loading = true;
            next.error = None;
        }
        ViewEvent::PermissionChanged(permission) => {
            next.permission = permission;
        }
        ViewEvent::GeolocationFailed {
            permission,
            message,
        } => {
            if let Some(permission) = permission {
                next.permission = permission;
            }
            next.loading = false;
            next.error = Some(message);
        }
        ViewEvent::ForecastLoaded { coords, forecast } => {
            next.loading = false;
            // An empty result never navigates and never replaces good data.
            if forecast.days.is_empty() {
                next.error = Some(EMPTY_FORECAST_MESSAGE.to_string());
            } else {
                next.error = None;
                next.coords = Some(coords);
                next.forecast = Some(forecast);
                next.selected_day = None;
                next.page = PageView::Forecast;
            }
        }
        ViewEvent::ForecastFailed { message } => {
            next.loading = false;
            next.error = Some(message);
        }
        ViewEvent::DaySelected(day) => {
            let known = next
                .forecast
                .as_ref()
                .and_then(|f| f.days.iter().find(|d| d.date == day.date))
                .cloned();
            if let Some(day) = known {
                next.selected_day = Some(day);
                next.page = PageView::DayDetails;
            }
        }
        ViewEvent::BackNavigated => {
            if next.page == PageView::DayDetails {
                next.selected_day = None;
                next.page = PageView::Forecast;
            }
        }
        ViewEvent::UnitChanged(unit) => {
            next.unit = unit;
        }
    }

    next
}

/// Single-writer container for the process-wide [`ViewState`].
#[derive(Debug, Clone)]
pub struct ViewStore {
    tx: Arc<watch::Sender<ViewState>>,
}

impl Default for ViewStore {
    fn default() -> Self {
        Self::new(ViewState::default())
    }
}

impl ViewStore {
    pub fn new(initial: ViewState) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    /// Apply one event. Readers are woken only when the state changed.
    pub fn dispatch(&self, event: ViewEvent) {
        self.tx.send_if_modified(|state| {
            let next = reduce(state, event);
            if next == *state {
                return false;
            }
            if next.page != state.page {
                tracing::info!(from = ?state.page, to = ?next.page, "page transition");
            }
            *state = next;
            true
        });
    }

    pub fn snapshot(&self) -> ViewState {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ViewState> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn day(d: u32) -> DaySummary {
        DaySummary {
            date: NaiveDate::from_ymd_opt(2024, 1, d).unwrap(),
            min_temp: 1.0,
            max_temp: 5.0,
            icon: "01d".into(),
            description: "clear sky".into(),
            intervals: vec![],
        }
    }

    fn view(days: Vec<DaySummary>) -> ForecastView {
        ForecastView {
            city_name: "London".into(),
            country_code: "GB".into(),
            utc_offset_seconds: 0,
            days,
        }
    }

    fn loaded() -> ViewState {
        reduce(
            &ViewState::default(),
            ViewEvent::ForecastLoaded {
                coords: GeoPoint::new(51.5, -0.12),
                forecast: view(vec![day(20), day(21)]),
            },
        )
    }

    #[test]
    fn starts_on_permission_page() {
        let state = ViewState::default();
        assert_eq!(state.page, PageView::Permission);
        assert_eq!(state.permission, PermissionStatus::Pending);
        assert!(state.is_consistent());
    }

    #[test]
    fn nonempty_forecast_moves_to_forecast_page() {
        let state = loaded();
        assert_eq!(state.page, PageView::Forecast);
        assert_eq!(state.coords, Some(GeoPoint::new(51.5, -0.12)));
        assert_eq!(state.city_name(), Some("London"));
        assert!(!state.loading);
        assert!(state.is_consistent());
    }

    #[test]
    fn empty_forecast_never_navigates() {
        let empty = ViewEvent::ForecastLoaded {
            coords: GeoPoint::new(0.0, 0.0),
            forecast: view(vec![]),
        };

        let first = reduce(&ViewState::default(), empty.clone());
        assert_eq!(first.page, PageView::Permission);
        assert_eq!(first.forecast, None);
        assert_eq!(first.error.as_deref(), Some(EMPTY_FORECAST_MESSAGE));

        let details = reduce(&loaded(), ViewEvent::DaySelected(day(21)));
        let after = reduce(&details, empty);
        assert_eq!(after.page, PageView::DayDetails);
        assert_eq!(after.forecast, details.forecast);
        assert_eq!(after.coords, details.coords);
        assert!(after.is_consistent());
    }

    #[test]
    fn failure_keeps_last_good_forecast() {
        let state = reduce(&loaded(), ViewEvent::ForecastRequested);
        assert!(state.loading);
        let state = reduce(
            &state,
            ViewEvent::ForecastFailed {
                message: "Network error occurred".into(),
            },
        );
        assert!(!state.loading);
        assert_eq!(state.error.as_deref(), Some("Network error occurred"));
        assert_eq!(state.page, PageView::Forecast);
        assert_eq!(state.forecast, loaded().forecast);
    }

    #[test]
    fn day_selection_and_back() {
        let details = reduce(&loaded(), ViewEvent::DaySelected(day(21)));
        assert_eq!(details.page, PageView::DayDetails);
        assert_eq!(details.selected_day.as_ref().map(|d| d.date), Some(day(21).date));
        assert!(details.is_consistent());

        let back = reduce(&details, ViewEvent::BackNavigated);
        assert_eq!(back.page, PageView::Forecast);
        assert_eq!(back.selected_day, None);
    }

    #[test]
    fn unknown_day_or_no_forecast_is_ignored() {
        let state = reduce(&ViewState::default(), ViewEvent::DaySelected(day(20)));
        assert_eq!(state, ViewState::default());

        let state = reduce(&loaded(), ViewEvent::DaySelected(day(25)));
        assert_eq!(state.page, PageView::Forecast);

        // Back on the forecast page is a no-op.
        assert_eq!(reduce(&loaded(), ViewEvent::BackNavigated), loaded());
    }

    #[test]
    fn denied_permission_does_not_change_page() {
        let state = reduce(&ViewState::default(), ViewEvent::GeolocationRequested);
        let state = reduce(
            &state,
            ViewEvent::GeolocationFailed {
                permission: Some(PermissionStatus::Denied),
                message: "Location permission denied. Please search by city instead.".into(),
            },
        );
        assert_eq!(state.permission, PermissionStatus::Denied);
        assert_eq!(state.page, PageView::Permission);
        assert!(!state.loading);
        assert!(state.error.is_some());
    }

    #[test]
    fn loading_is_orthogonal_to_page() {
        let details = reduce(&loaded(), ViewEvent::DaySelected(day(20)));
        let state = reduce(&details, ViewEvent::ForecastRequested);
        assert!(state.loading);
        assert_eq!(state.page, PageView::DayDetails);
    }

    #[tokio::test]
    async fn store_notifies_readers_on_change_only() {
        let store = ViewStore::default();
        let mut rx = store.subscribe();

        store.dispatch(ViewEvent::UnitChanged(TemperatureUnit::Fahrenheit));
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().unit, TemperatureUnit::Fahrenheit);

        store.dispatch(ViewEvent::UnitChanged(TemperatureUnit::Fahrenheit));
        assert!(!rx.has_changed().unwrap());
        assert_eq!(store.snapshot().unit, TemperatureUnit::Fahrenheit);
    }
}
