//! Plain-text rendering of [`ViewState`].

use std::fmt::{self, Write};

use forecast_core::{
    PageView, TemperatureUnit, ViewState,
    format::{format_temp, format_time},
    model::{DaySummary, ForecastView},
};

pub fn view(state: &ViewState) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = write_view(&mut out, state);
    out
}

fn write_view(out: &mut String, state: &ViewState) -> fmt::Result {
    let Some(forecast) = state.forecast.as_ref() else {
        if let Some(err) = &state.error {
            writeln!(out, "{err}")?;
        }
        return Ok(());
    };

    match (state.page, state.selected_day.as_ref()) {
        (PageView::DayDetails, Some(day)) => write_day(out, forecast, day, state.unit),
        _ => write_days(out, forecast, state.unit),
    }
}

fn heading(forecast: &ForecastView) -> String {
    if forecast.country_code.is_empty() {
        forecast.city_name.clone()
    } else {
        format!("{}, {}", forecast.city_name, forecast.country_code)
    }
}

fn write_days(out: &mut String, forecast: &ForecastView, unit: TemperatureUnit) -> fmt::Result {
    writeln!(out, "{}", heading(forecast))?;
    for (n, day) in forecast.days.iter().enumerate() {
        writeln!(
            out,
            "{:>2}. {:<10} {:<7} {:>5} / {:<5} {}",
            n + 1,
            day.day_of_week_label(),
            day.short_date_label(),
            format_temp(day.min_temp, unit),
            format_temp(day.max_temp, unit),
            day.description,
        )?;
    }
    Ok(())
}

fn write_day(
    out: &mut String,
    forecast: &ForecastView,
    day: &DaySummary,
    unit: TemperatureUnit,
) -> fmt::Result {
    writeln!(
        out,
        "{}: {}, {}",
        heading(forecast),
        day.day_of_week_label(),
        day.short_date_label()
    )?;
    for entry in &day.intervals {
        writeln!(
            out,
            "  {:>8}  {:>5} (feels {:>5})  {:<18} humidity {:>3}%  wind {:.1} m/s  rain {:.0}%",
            format_time(entry.timestamp_utc, forecast.utc_offset_seconds),
            format_temp(entry.temperature, unit),
            format_temp(entry.feels_like, unit),
            entry.description.as_deref().unwrap_or("-"),
            entry.humidity,
            entry.wind_speed,
            entry.precipitation_chance * 100.0,
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};
    use forecast_core::ForecastIntervalEntry;

    fn state() -> ViewState {
        let entry = ForecastIntervalEntry {
            timestamp_utc: Utc.with_ymd_and_hms(2024, 1, 20, 12, 0, 0).unwrap(),
            temperature: 21.4,
            feels_like: 20.6,
            humidity: 55,
            weather_code: Some(800),
            weather_icon: Some("01d".into()),
            description: Some("clear sky".into()),
            wind_speed: 3.25,
            precipitation_chance: 0.2,
            raw_time_text: "2024-01-20 12:00:00".into(),
        };
        let day = DaySummary {
            date: NaiveDate::from_ymd_opt(2024, 1, 20).unwrap(),
            min_temp: 10.0,
            max_temp: 21.4,
            icon: "01d".into(),
            description: "clear sky".into(),
            intervals: vec![entry],
        };
        ViewState {
            page: PageView::Forecast,
            forecast: Some(ForecastView {
                city_name: "Madrid".into(),
                country_code: "ES".into(),
                utc_offset_seconds: 3600,
                days: vec![day],
            }),
            ..ViewState::default()
        }
    }

    #[test]
    fn renders_day_list() {
        let text = view(&state());
        assert!(text.starts_with("Madrid, ES\n"));
        assert!(text.contains("Saturday"));
        assert!(text.contains("Jan 20"));
        assert!(text.contains("10°C"));
        assert!(text.contains("21°C"));
    }

    #[test]
    fn renders_day_details_in_city_time() {
        let mut state = state();
        state.unit = TemperatureUnit::Fahrenheit;
        state.selected_day = state.forecast.as_ref().map(|f| f.days[0].clone());
        state.page = PageView::DayDetails;

        let text = view(&state);
        assert!(text.starts_with("Madrid, ES: Saturday, Jan 20"));
        assert!(text.contains("1:00 PM"));
        assert!(text.contains("71°F"));
        assert!(text.contains("rain 20%"));
    }

    #[test]
    fn permission_page_shows_error_only() {
        let state = ViewState {
            error: Some("Network error occurred".into()),
            ..ViewState::default()
        };
        assert_eq!(view(&state), "Network error occurred\n");
    }
}
