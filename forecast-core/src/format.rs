use chrono::{DateTime, Duration, Utc};

use crate::model::TemperatureUnit;

pub fn celsius_to_fahrenheit(celsius: f64) -> f64 {
    celsius * 9.0 / 5.0 + 32.0
}

/// Render a Celsius reading in the requested unit, e.g. "21°C" or "70°F".
pub fn format_temp(celsius: f64, unit: TemperatureUnit) -> String {
    match unit {
        TemperatureUnit::Celsius => format!("{}°C", round_half_up(celsius)),
        TemperatureUnit::Fahrenheit => {
            format!("{}°F", round_half_up(celsius_to_fahrenheit(celsius)))
        }
    }
}

/// Wall-clock time at the forecast location, e.g. "3:00 PM".
pub fn format_time(utc: DateTime<Utc>, utc_offset_seconds: i32) -> String {
    let local = utc + Duration::seconds(i64::from(utc_offset_seconds));
    local.format("%-I:%M %p").to_string()
}

// f64::round rounds -0.5 away from zero; displayed temperatures round toward +inf on ties.
fn round_half_up(value: f64) -> i64 {
    (value + 0.5).floor() as i64
}
