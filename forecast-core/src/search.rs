//! Debounced city search.
//!
//! Keystrokes restart a [`DebounceTimer`]; when it fires, the lookup runs
//! as its own task through the query cache. Every keystroke, selection and
//! teardown bumps a sequence number, and a lookup result is applied only if
//! its sequence number is still the latest. Lookups are never aborted on the
//! wire, only ignored.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::{
    cache::{QueryCache, QueryKey},
    config::SearchConfig,
    error::ForecastError,
    loader::ForecastLoader,
    model::CitySuggestion,
    provider::ForecastProvider,
};

pub const GEOCODING_ENDPOINT: &str = "geo/1.0/direct";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchSettings {
    pub debounce: Duration,
    pub min_length: usize,
    pub limit: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self::from(&SearchConfig::default())
    }
}

impl From<&SearchConfig> for SearchSettings {
    fn from(cfg: &SearchConfig) -> Self {
        Self {
            debounce: Duration::from_millis(cfg.debounce_ms),
            min_length: cfg.min_length,
            limit: cfg.limit,
        }
    }
}

/// What the search box shows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchState {
    pub input: String,
    pub suggestions: Vec<CitySuggestion>,
    pub is_open: bool,
    pub active_index: Option<usize>,
    pub searching: bool,
    /// "No results found" or the last lookup error.
    pub notice: Option<String>,
}

impl SearchState {
    fn clear_suggestions(&mut self) {
        self.suggestions.clear();
        self.is_open = false;
        self.active_index = None;
        self.searching = false;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavKey {
    Up,
    Down,
    Enter,
    Escape,
}

/// A single pending delayed action. Rescheduling or dropping cancels it.
#[derive(Debug, Default)]
pub struct DebounceTimer {
    handle: Option<JoinHandle<()>>,
}

impl DebounceTimer {
    pub fn schedule<F>(&mut self, delay: Duration, action: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        self.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            action.await;
        }));
    }

    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    pub fn is_pending(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for DebounceTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[derive(Debug, Default)]
struct Control {
    timer: DebounceTimer,
    seq: u64,
}

/// Everything a fired timer or running lookup needs.
#[derive(Debug, Clone)]
struct Lookup {
    provider: Arc<dyn ForecastProvider>,
    cache: QueryCache<Vec<CitySuggestion>>,
    limit: usize,
    control: Arc<Mutex<Control>>,
    state: Arc<watch::Sender<SearchState>>,
}

impl Lookup {
    async fn run(self, seq: u64, term: String) {
        {
            let control = self.control.lock();
            if control.seq != seq {
                return;
            }
            self.state.send_modify(|s| s.searching = true);
        }

        tracing::debug!(%term, "searching cities");
        let provider = Arc::clone(&self.provider);
        let limit = self.limit;
        let query = term.clone();
        let result = self
            .cache
            .request(search_key(&term, limit), move || async move {
                provider.search_cities(&query, limit).await
            })
            .settled()
            .await;

        let control = self.control.lock();
        if control.seq != seq {
            tracing::debug!(%term, "discarding stale search result");
            return;
        }

        self.state.send_modify(|s| {
            s.clear_suggestions();
            match result {
                Ok(found) if found.is_empty() => {
                    tracing::debug!(%term, "no cities found");
                    s.notice = Some(ForecastError::NoResultsFound(term.clone()).user_message());
                }
                Ok(found) => {
                    s.suggestions = found;
                    s.is_open = true;
                    s.notice = None;
                }
                Err(e) => {
                    tracing::warn!(%term, error = %e, "city search failed");
                    s.notice = Some(e.user_message());
                }
            }
        });
    }
}

pub fn search_key(term: &str, limit: usize) -> QueryKey {
    QueryKey::new(
        GEOCODING_ENDPOINT,
        [("q", term.to_string()), ("limit", limit.to_string())],
    )
}

/// Turns typed text into suggestions and a chosen suggestion into a forecast.
///
/// Dropping the pipeline cancels any pending timer and invalidates any
/// lookup still in flight.
#[derive(Debug)]
pub struct SearchPipeline {
    lookup: Lookup,
    loader: ForecastLoader,
    settings: SearchSettings,
}

impl SearchPipeline {
    pub fn new(
        provider: Arc<dyn ForecastProvider>,
        loader: ForecastLoader,
        settings: SearchSettings,
    ) -> Self {
        let (state, _) = watch::channel(SearchState::default());
        Self {
            lookup: Lookup {
                provider,
                cache: QueryCache::new(),
                limit: settings.limit,
                control: Arc::new(Mutex::new(Control::default())),
                state: Arc::new(state),
            },
            loader,
            settings,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SearchState> {
        self.lookup.state.subscribe()
    }

    pub fn snapshot(&self) -> SearchState {
        self.lookup.state.borrow().clone()
    }

    pub fn has_pending_timer(&self) -> bool {
        self.lookup.control.lock().timer.is_pending()
    }

    /// Handle a change of the search box text.
    pub fn submit_text(&self, text: &str) {
        let term = text.trim().to_string();
        let mut control = self.lookup.control.lock();
        control.timer.cancel();
        control.seq += 1;

        self.lookup.state.send_modify(|s| s.input = text.to_string());

        if term.chars().count() < self.settings.min_length {
            self.lookup.state.send_modify(|s| {
                s.clear_suggestions();
                s.notice = None;
            });
            return;
        }

        let seq = control.seq;
        let lookup = self.lookup.clone();
        control
            .timer
            .schedule(self.settings.debounce, async move {
                // Detached so a later keystroke cancels the timer, not the request.
                tokio::spawn(lookup.run(seq, term));
            });
    }

    /// Resolve a chosen suggestion into a forecast for its coordinates.
    pub async fn select_suggestion(&self, suggestion: CitySuggestion) -> Result<(), ForecastError> {
        let place = suggestion.display_name();
        {
            let mut control = self.lookup.control.lock();
            control.timer.cancel();
            control.seq += 1;
            self.lookup.state.send_modify(|s| {
                s.clear_suggestions();
                s.notice = None;
                s.input = place.clone();
            });
        }

        tracing::info!(%place, "city selected");
        self.loader.load(suggestion.coordinates, Some(&place)).await
    }

    /// Keyboard handling for the open suggestion list.
    pub async fn handle_key(&self, key: NavKey) -> Result<(), ForecastError> {
        let current = self.snapshot();
        if !current.is_open || current.suggestions.is_empty() {
            return Ok(());
        }
        let last = current.suggestions.len() - 1;

        match key {
            NavKey::Down => self.lookup.state.send_modify(|s| {
                s.active_index = match s.active_index {
                    Some(i) if i < last => Some(i + 1),
                    _ => Some(0),
                };
            }),
            NavKey::Up => self.lookup.state.send_modify(|s| {
                s.active_index = match s.active_index {
                    Some(i) if i > 0 => Some(i - 1),
                    _ => Some(last),
                };
            }),
            NavKey::Escape => self.dismiss(),
            NavKey::Enter => {
                let chosen = current
                    .active_index
                    .and_then(|i| current.suggestions.get(i))
                    .cloned();
                if let Some(chosen) = chosen {
                    return self.select_suggestion(chosen).await;
                }
            }
        }
        Ok(())
    }

    /// Close the list without discarding suggestions (click outside).
    pub fn dismiss(&self) {
        self.lookup.state.send_modify(|s| s.is_open = false);
    }

    /// Reopen the list on focus if suggestions are still held.
    pub fn reopen(&self) {
        self.lookup.state.send_if_modified(|s| {
            if s.is_open || s.suggestions.is_empty() {
                return false;
            }
            s.is_open = true;
            true
        });
    }

    /// Cancel the pending timer and invalidate in-flight lookups.
    pub fn teardown(&self) {
        let mut control = self.lookup.control.lock();
        control.timer.cancel();
        control.seq += 1;
    }
}

impl Drop for SearchPipeline {
    fn drop(&mut self) {
        self.teardown();
    }
}
