use std::{sync::Arc, time::Duration};

use anyhow::{Context, anyhow, bail};
use clap::{Parser, Subcommand};
use forecast_core::{
    Config, ForecastError, GeoPoint, TemperatureUnit, WeatherApp,
    config::DEFAULT_BASE_URL,
    geolocation::{FixedGeolocator, IpGeolocator},
};
use inquire::{Password, PasswordDisplayMode, Select, Text};

use crate::render;

const SEARCH_WAIT: Duration = Duration::from_secs(15);

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "forecast", version, about = "Five-day weather forecast")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Store the OpenWeather API key and endpoint.
    Configure,

    /// Show the five-day forecast.
    ///
    /// Without a location flag, the configured `[location]` is used.
    Show {
        #[arg(long, requires = "lon", allow_hyphen_values = true)]
        lat: Option<f64>,

        #[arg(long, requires = "lat", allow_hyphen_values = true)]
        lon: Option<f64>,

        /// City name, resolved by the provider directly.
        #[arg(long, conflicts_with_all = ["lat", "search"])]
        city: Option<String>,

        /// Search text; pick a city from the suggestions.
        #[arg(long, conflicts_with = "lat")]
        search: Option<String>,

        /// "celsius" or "fahrenheit"; defaults to the configured unit.
        #[arg(long)]
        unit: Option<String>,

        /// Show intervals for the Nth day (1-based).
        #[arg(long)]
        day: Option<usize>,
    },

    /// Forecast for the position derived from your IP address.
    Locate {
        #[arg(long)]
        unit: Option<String>,

        #[arg(long)]
        day: Option<usize>,
    },
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        match self.command {
            Command::Configure => configure(),
            Command::Show {
                lat,
                lon,
                city,
                search,
                unit,
                day,
            } => {
                let config = Config::load()?;
                let app = match (lat, lon) {
                    (Some(lat), Some(lon)) => WeatherApp::with_geolocator(
                        &config,
                        Arc::new(FixedGeolocator::new(Some(GeoPoint::new(lat, lon)))),
                    ),
                    _ => WeatherApp::from_config(&config),
                }
                .map_err(startup_error)?;
                apply_unit(&app, unit.as_deref())?;

                let outcome = if let Some(city) = city {
                    app.open_city(&city).await
                } else if let Some(text) = search {
                    pick_city(&app, &config, &text).await?
                } else {
                    app.request_geolocation().await
                };

                finish(&app, outcome, day)
            }
            Command::Locate { unit, day } => {
                let config = Config::load()?;
                let geolocator = IpGeolocator::new()?;
                let app = WeatherApp::with_geolocator(&config, Arc::new(geolocator))
                    .map_err(startup_error)?;
                apply_unit(&app, unit.as_deref())?;

                let outcome = app.request_geolocation().await;
                finish(&app, outcome, day)
            }
        }
    }
}

fn configure() -> anyhow::Result<()> {
    // Environment overrides are not persisted.
    let mut config = Config::load_file()?;

    let api_key = Password::new("OpenWeather API key:")
        .with_display_mode(PasswordDisplayMode::Masked)
        .without_confirmation()
        .prompt()
        .context("Failed to read API key")?;

    let current_url = config
        .provider
        .base_url
        .clone()
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
    let base_url = Text::new("API base URL:")
        .with_default(&current_url)
        .prompt()
        .context("Failed to read base URL")?;

    config.set_api_key(api_key.trim().to_string());
    config.set_base_url(base_url.trim().to_string());
    config.provider_settings().map_err(startup_error)?;
    config.save()?;

    println!("Saved configuration to {}", Config::config_file_path()?.display());
    Ok(())
}

fn startup_error(e: ForecastError) -> anyhow::Error {
    match e {
        ForecastError::ConfigurationMissing(_) => {
            anyhow!("{}. Run `forecast configure` first.", e.user_message())
        }
        other => anyhow!(other),
    }
}

fn apply_unit(app: &WeatherApp, unit: Option<&str>) -> anyhow::Result<()> {
    if let Some(unit) = unit {
        app.set_unit(TemperatureUnit::try_from(unit)?);
    }
    Ok(())
}

/// Type `text` into the search box, wait for suggestions and let the user choose.
async fn pick_city(
    app: &WeatherApp,
    config: &Config,
    text: &str,
) -> anyhow::Result<Result<(), ForecastError>> {
    if text.trim().chars().count() < config.search.min_length {
        bail!(
            "Search text must be at least {} characters",
            config.search.min_length
        );
    }

    let mut rx = app.subscribe_search();
    app.submit_search_text(text);

    let settled = tokio::time::timeout(
        SEARCH_WAIT,
        rx.wait_for(|s| s.is_open || s.notice.is_some()),
    )
    .await
    .context("City search timed out")?
    .map_err(|_| anyhow!("City search stopped"))?
    .clone();

    if let Some(notice) = settled.notice {
        bail!(notice);
    }

    let labels: Vec<String> = settled
        .suggestions
        .iter()
        .map(|s| s.display_name())
        .collect();
    let choice = Select::new("Choose a city:", labels)
        .raw_prompt()
        .context("No city selected")?;

    let chosen = settled
        .suggestions
        .get(choice.index)
        .cloned()
        .ok_or_else(|| anyhow!("Selected city is out of range"))?;

    Ok(app.select_suggestion(chosen).await)
}

/// Optionally open a day, then print whatever the view state holds.
fn finish(
    app: &WeatherApp,
    outcome: Result<(), ForecastError>,
    day: Option<usize>,
) -> anyhow::Result<()> {
    if let Err(e) = &outcome {
        tracing::debug!(error = %e, "intent failed");
    }

    let state = app.state();
    let Some(forecast) = state.forecast.as_ref() else {
        bail!(
            state
                .error
                .unwrap_or_else(|| "No forecast available".to_string())
        );
    };

    if let Some(err) = &state.error {
        eprintln!("warning: {err}");
    }

    if let Some(n) = day {
        let selected = n
            .checked_sub(1)
            .and_then(|i| forecast.days.get(i))
            .cloned()
            .ok_or_else(|| {
                anyhow!("Day {n} is not in the forecast (1..={})", forecast.days.len())
            })?;
        app.select_day(selected);
    }

    print!("{}", render::view(&app.state()));
    Ok(())
}
