//! Report rendering and CSV export.

use anyhow::Result;
use chrono::{DateTime, Utc};
use csv::WriterBuilder;
use serde::Serialize;
use std::fs::OpenOptions;
use std::path::Path;
use tracing::{debug, info};

use crate::config::City;
use crate::record::{CityId, WeatherRecord};

/// One line of the discrepancy report: a record whose sources disagree by
/// more than the threshold, joined with its display name.
#[derive(Debug, Serialize)]
pub struct DiscrepancyRow {
    pub city_id: CityId,
    pub city_name: String,
    pub api_temperature: f64,
    pub mobile_temperature: f64,
    pub temperature_difference: f64,
    pub timestamp: DateTime<Utc>,
}

fn city_name(city_id: CityId, cities: &[City]) -> String {
    cities
        .iter()
        .find(|c| c.id == city_id)
        .map(|c| c.name.clone())
        .unwrap_or_else(|| format!("City with ID {city_id}"))
}

/// Joins store records with display names, preserving the store's ranking.
///
/// Only records with both readings qualify for the discrepancy report, so
/// single-source rows are skipped.
pub fn discrepancy_rows(records: &[WeatherRecord], cities: &[City]) -> Vec<DiscrepancyRow> {
    records
        .iter()
        .filter_map(|r| {
            let (api, mobile, diff) = match (
                r.api_temperature,
                r.mobile_temperature,
                r.temperature_difference,
            ) {
                (Some(a), Some(m), Some(d)) => (a, m, d),
                _ => return None,
            };
            Some(DiscrepancyRow {
                city_id: r.city_id,
                city_name: city_name(r.city_id, cities),
                api_temperature: api,
                mobile_temperature: mobile,
                temperature_difference: diff,
                timestamp: r.timestamp,
            })
        })
        .collect()
}

/// Logs the ranked discrepancy report.
pub fn print_discrepancies(rows: &[DiscrepancyRow], threshold: f64) {
    if rows.is_empty() {
        info!(threshold, "no discrepancies above threshold");
        return;
    }
    info!(threshold, count = rows.len(), "cities with discrepancies");
    for row in rows {
        info!(
            city = %row.city_name,
            api_temperature = row.api_temperature,
            mobile_temperature = row.mobile_temperature,
            difference = format!("{:.2}", row.temperature_difference),
            checked_at = %row.timestamp,
            "discrepancy"
        );
    }
}

/// Logs the highest-average-temperature result.
pub fn print_hottest(record: Option<&WeatherRecord>, cities: &[City]) {
    match record {
        Some(r) => info!(
            city = %city_name(r.city_id, cities),
            average_temperature = format!("{:.2}", r.average_temperature),
            "city with highest average temperature"
        ),
        None => info!("no records stored"),
    }
}

/// Appends discrepancy rows to a CSV file, writing headers only when the
/// file is created.
pub fn append_csv(path: &str, rows: &[DiscrepancyRow]) -> Result<()> {
    let file_exists = Path::new(path).exists();
    debug!(path, file_exists, rows = rows.len(), "appending CSV report");

    let file = OpenOptions::new().append(true).create(true).open(path)?;

    let mut writer = WriterBuilder::new()
        .has_headers(!file_exists) // IMPORTANT when appending
        .from_writer(file);

    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;

    Ok(())
}
