//! Interval-to-day aggregation.
//!
//! Turns the provider's 3-hour samples into at most five day summaries.
//! The output is a pure function of the input: identical input always yields
//! identical days, including icon tie-breaks.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};

use crate::model::{CLEAR_SKY_ICON, CityMeta, DaySummary, ForecastIntervalEntry, ForecastView};

/// Maximum number of day summaries in a view.
pub const MAX_DAYS: usize = 5;

pub fn aggregate(intervals: &[ForecastIntervalEntry], city: Option<&CityMeta>) -> ForecastView {
    let city = city.cloned().unwrap_or_default();

    // Dates are UTC calendar dates; intervals keep feed order within a day.
    let mut groups: BTreeMap<NaiveDate, Vec<ForecastIntervalEntry>> = BTreeMap::new();
    for entry in intervals {
        groups
            .entry(entry.timestamp_utc.date_naive())
            .or_default()
            .push(entry.clone());
    }

    let days = groups
        .into_iter()
        .take(MAX_DAYS)
        .map(|(date, intervals)| summarize_day(date, intervals))
        .collect();

    ForecastView {
        city_name: city.name,
        country_code: city.country,
        utc_offset_seconds: city.utc_offset_seconds,
        days,
    }
}

fn summarize_day(date: NaiveDate, mut intervals: Vec<ForecastIntervalEntry>) -> DaySummary {
    // Stable: samples sharing a timestamp keep feed order.
    intervals.sort_by_key(|e| e.timestamp_utc);

    let (min_temp, max_temp) = intervals.iter().fold(
        (f64::INFINITY, f64::NEG_INFINITY),
        |(lo, hi), e| (lo.min(e.temperature), hi.max(e.temperature)),
    );

    let icon = representative_icon(&intervals)
        .unwrap_or(CLEAR_SKY_ICON)
        .to_string();

    // Description of the earliest interval carrying the chosen icon.
    let description = intervals
        .iter()
        .find(|e| e.weather_icon.as_deref() == Some(icon.as_str()))
        .and_then(|e| e.description.clone())
        .unwrap_or_default();

    DaySummary {
        date,
        min_temp,
        max_temp,
        icon,
        description,
        intervals,
    }
}

/// Most frequent icon. Ties go to the icon seen first; icons first seen at
/// the same instant are ordered by code.
fn representative_icon(intervals: &[ForecastIntervalEntry]) -> Option<&str> {
    // (icon, count, first seen) in insertion order, never hash order.
    let mut counts: Vec<(&str, usize, DateTime<Utc>)> = Vec::new();
    for e in intervals {
        let Some(icon) = e.weather_icon.as_deref() else {
            continue;
        };
        match counts.iter_mut().find(|(seen, _, _)| *seen == icon) {
            Some((_, n, _)) => *n += 1,
            None => counts.push((icon, 1, e.timestamp_utc)),
        }
    }

    counts
        .into_iter()
        .min_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)).then(a.0.cmp(b.0)))
        .map(|(icon, _, _)| icon)
}
