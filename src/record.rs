//! Core data model: per-city weather records and single-source readings.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// OpenWeather-style numeric city identifier, unique across all sources.
pub type CityId = i64;

/// A `(temperature, feels_like)` pair obtained from one source at one point
/// in time, in degrees Celsius.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub temperature: f64,
    pub feels_like: f64,
}

/// One stored row per city, merged from up to two independent sources.
///
/// `average_temperature` is recomputed on every merge from whichever source
/// temperatures are present. `temperature_difference` stays `None` until both
/// sources have contributed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeatherRecord {
    pub city_id: CityId,
    pub api_temperature: Option<f64>,
    pub api_feels_like: Option<f64>,
    pub mobile_temperature: Option<f64>,
    pub mobile_feels_like: Option<f64>,
    pub average_temperature: f64,
    pub temperature_difference: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

/// Recomputes the derived fields from the source temperatures present.
///
/// Returns `(average_temperature, temperature_difference)`. The difference is
/// never derived from a single source.
///
/// # Panics
///
/// Panics if both temperatures are absent; callers merge at least one source
/// before deriving.
pub fn derive_fields(api: Option<f64>, mobile: Option<f64>) -> (f64, Option<f64>) {
    match (api, mobile) {
        (Some(a), Some(m)) => ((a + m) / 2.0, Some((a - m).abs())),
        (Some(a), None) => (a, None),
        (None, Some(m)) => (m, None),
        (None, None) => unreachable!("derive_fields called with no source temperatures"),
    }
}
