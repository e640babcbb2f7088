//! SQLite record store for merged weather readings.
//!
//! One `weather_data` row per city, upserted independently by the API and
//! mobile collection passes. Single-writer: every call runs its own
//! read-modify-write inside a transaction.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::Path;
use tracing::debug;

use crate::record::{CityId, WeatherRecord, derive_fields};

/// Errors from record store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// SQLite-backed store of [`WeatherRecord`] rows keyed by city id.
pub struct RecordStore {
    conn: Connection,
}

impl RecordStore {
    /// Opens (or creates) the store database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.bootstrap()?;
        Ok(store)
    }

    /// Opens an in-memory store.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.bootstrap()?;
        Ok(store)
    }

    fn bootstrap(&self) -> Result<()> {
        // `seq` records insertion order; `city_id` doubles as the rowid in
        // SQLite so it cannot serve as a tie-breaker itself.
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS weather_data (
                city_id                 INTEGER PRIMARY KEY,
                seq                     INTEGER NOT NULL,
                api_temperature         REAL,
                api_feels_like          REAL,
                mobile_temperature      REAL,
                mobile_feels_like       REAL,
                average_temperature     REAL NOT NULL,
                temperature_difference  REAL,
                timestamp               TEXT NOT NULL
            );",
        )?;
        Ok(())
    }

    /// Clears all records. Called once at process start; idempotent.
    pub fn reset(&self) -> Result<()> {
        debug!("resetting weather_data table");
        self.conn.execute("DELETE FROM weather_data", [])?;
        Ok(())
    }

    /// Merges an API reading into the record for `city_id`, creating the
    /// record if it does not exist. Derived fields are recomputed from
    /// whichever source temperatures are present after the merge.
    pub fn upsert_api(&mut self, city_id: CityId, temperature: f64, feels_like: f64) -> Result<()> {
        self.upsert(city_id, Source::Api, temperature, feels_like)
    }

    /// Merges a mobile UI reading into the record for `city_id`; symmetric to
    /// [`RecordStore::upsert_api`].
    pub fn upsert_mobile(
        &mut self,
        city_id: CityId,
        temperature: f64,
        feels_like: f64,
    ) -> Result<()> {
        self.upsert(city_id, Source::Mobile, temperature, feels_like)
    }

    fn upsert(
        &mut self,
        city_id: CityId,
        source: Source,
        temperature: f64,
        feels_like: f64,
    ) -> Result<()> {
        let now = Utc::now();
        let tx = self.conn.transaction()?;

        let existing: Option<(Option<f64>, Option<f64>)> = tx
            .query_row(
                "SELECT api_temperature, mobile_temperature FROM weather_data WHERE city_id = ?1",
                params![city_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match existing {
            Some((api_temp, mobile_temp)) => {
                let (api_temp, mobile_temp) = match source {
                    Source::Api => (Some(temperature), mobile_temp),
                    Source::Mobile => (api_temp, Some(temperature)),
                };
                let (average, difference) = derive_fields(api_temp, mobile_temp);
                let (temp_col, feels_col) = source.columns();
                tx.execute(
                    &format!(
                        "UPDATE weather_data
                         SET {temp_col} = ?1, {feels_col} = ?2,
                             average_temperature = ?3, temperature_difference = ?4,
                             timestamp = ?5
                         WHERE city_id = ?6"
                    ),
                    params![temperature, feels_like, average, difference, now.to_rfc3339(), city_id],
                )?;
            }
            None => {
                let (temp_col, feels_col) = source.columns();
                tx.execute(
                    &format!(
                        "INSERT INTO weather_data
                         (city_id, seq, {temp_col}, {feels_col}, average_temperature, timestamp)
                         VALUES (?1, (SELECT IFNULL(MAX(seq), 0) + 1 FROM weather_data),
                                 ?2, ?3, ?4, ?5)"
                    ),
                    params![city_id, temperature, feels_like, temperature, now.to_rfc3339()],
                )?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    /// Returns the full record for a city, or `None`. Read-only.
    pub fn get(&self, city_id: CityId) -> Result<Option<WeatherRecord>> {
        self.conn
            .query_row(
                &format!("{SELECT_RECORD} WHERE city_id = ?1"),
                params![city_id],
                map_record,
            )
            .optional()
            .map_err(StoreError::from)
    }

    /// Returns all records whose `temperature_difference` is defined and
    /// greater than `threshold`, ordered by difference descending. Ties break
    /// by insertion order.
    pub fn discrepancies(&self, threshold: f64) -> Result<Vec<WeatherRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "{SELECT_RECORD}
             WHERE temperature_difference > ?1
             ORDER BY temperature_difference DESC, seq ASC"
        ))?;
        let rows = stmt.query_map(params![threshold], map_record)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::from)
    }

    /// Returns the record with the highest `average_temperature`, or `None`
    /// when the store is empty. Ties break by insertion order.
    pub fn highest_average(&self) -> Result<Option<WeatherRecord>> {
        self.conn
            .query_row(
                &format!(
                    "{SELECT_RECORD}
                     ORDER BY average_temperature DESC, seq ASC
                     LIMIT 1"
                ),
                [],
                map_record,
            )
            .optional()
            .map_err(StoreError::from)
    }
}

#[derive(Clone, Copy)]
enum Source {
    Api,
    Mobile,
}

impl Source {
    fn columns(self) -> (&'static str, &'static str) {
        match self {
            Source::Api => ("api_temperature", "api_feels_like"),
            Source::Mobile => ("mobile_temperature", "mobile_feels_like"),
        }
    }
}

const SELECT_RECORD: &str = "SELECT city_id, api_temperature, api_feels_like,
        mobile_temperature, mobile_feels_like,
        average_temperature, temperature_difference, timestamp
 FROM weather_data";

fn map_record(row: &Row<'_>) -> rusqlite::Result<WeatherRecord> {
    let timestamp: String = row.get(7)?;
    let timestamp = DateTime::parse_from_rfc3339(&timestamp)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(7, rusqlite::types::Type::Text, Box::new(e))
        })?;
    Ok(WeatherRecord {
        city_id: row.get(0)?,
        api_temperature: row.get(1)?,
        api_feels_like: row.get(2)?,
        mobile_temperature: row.get(3)?,
        mobile_feels_like: row.get(4)?,
        average_temperature: row.get(5)?,
        temperature_difference: row.get(6)?,
        timestamp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> RecordStore {
        RecordStore::in_memory().unwrap()
    }

    #[test]
    fn test_api_then_mobile_merge() {
        let mut s = store();
        s.upsert_api(1, 10.0, 9.0).unwrap();
        s.upsert_mobile(1, 12.0, 11.0).unwrap();

        let rec = s.get(1).unwrap().unwrap();
        assert_eq!(rec.api_temperature, Some(10.0));
        assert_eq!(rec.api_feels_like, Some(9.0));
        assert_eq!(rec.mobile_temperature, Some(12.0));
        assert_eq!(rec.mobile_feels_like, Some(11.0));
        assert_eq!(rec.average_temperature, 11.0);
        assert_eq!(rec.temperature_difference, Some(2.0));
    }

    #[test]
    fn test_mobile_first_creates_record() {
        let mut s = store();
        s.upsert_mobile(2, 12.0, 11.0).unwrap();

        let rec = s.get(2).unwrap().unwrap();
        assert_eq!(rec.api_temperature, None);
        assert_eq!(rec.mobile_temperature, Some(12.0));
        assert_eq!(rec.average_temperature, 12.0);
        assert_eq!(rec.temperature_difference, None);
    }

    #[test]
    fn test_mobile_then_api_merge_symmetric() {
        let mut s = store();
        s.upsert_mobile(3, 12.0, 11.0).unwrap();
        s.upsert_api(3, 10.0, 9.0).unwrap();

        let rec = s.get(3).unwrap().unwrap();
        assert_eq!(rec.average_temperature, 11.0);
        assert_eq!(rec.temperature_difference, Some(2.0));
    }

    #[test]
    fn test_single_source_average_equals_reading() {
        let mut s = store();
        s.upsert_api(4, 20.0, 18.0).unwrap();

        let rec = s.get(4).unwrap().unwrap();
        assert_eq!(rec.average_temperature, 20.0);
        assert_eq!(rec.temperature_difference, None);
    }

    #[test]
    fn test_upsert_api_idempotent_except_timestamp() {
        let mut s = store();
        s.upsert_api(5, 10.0, 9.0).unwrap();
        let first = s.get(5).unwrap().unwrap();
        s.upsert_api(5, 10.0, 9.0).unwrap();
        let second = s.get(5).unwrap().unwrap();

        assert_eq!(first.api_temperature, second.api_temperature);
        assert_eq!(first.api_feels_like, second.api_feels_like);
        assert_eq!(first.average_temperature, second.average_temperature);
        assert_eq!(first.temperature_difference, second.temperature_difference);
        assert!(second.timestamp >= first.timestamp);
    }

    #[test]
    fn test_api_overwrite_recomputes_derived_fields() {
        let mut s = store();
        s.upsert_api(6, 10.0, 9.0).unwrap();
        s.upsert_mobile(6, 12.0, 11.0).unwrap();
        s.upsert_api(6, 14.0, 13.0).unwrap();

        let rec = s.get(6).unwrap().unwrap();
        assert_eq!(rec.api_temperature, Some(14.0));
        assert_eq!(rec.mobile_temperature, Some(12.0));
        assert_eq!(rec.average_temperature, 13.0);
        assert_eq!(rec.temperature_difference, Some(2.0));
    }

    #[test]
    fn test_get_missing_city() {
        let s = store();
        assert!(s.get(99).unwrap().is_none());
    }

    #[test]
    fn test_discrepancies_threshold_and_order() {
        let mut s = store();
        s.upsert_api(1, 10.0, 9.0).unwrap();
        s.upsert_mobile(1, 12.0, 11.0).unwrap(); // diff 2.0
        s.upsert_api(2, 20.0, 19.0).unwrap();
        s.upsert_mobile(2, 25.0, 24.0).unwrap(); // diff 5.0
        s.upsert_api(3, 5.0, 4.0).unwrap();
        s.upsert_mobile(3, 5.5, 4.5).unwrap(); // diff 0.5
        s.upsert_api(4, 30.0, 29.0).unwrap(); // diff undefined

        let hits = s.discrepancies(1.0).unwrap();
        let ids: Vec<_> = hits.iter().map(|r| r.city_id).collect();
        assert_eq!(ids, vec![2, 1]);

        assert!(s.discrepancies(3.0).unwrap().iter().all(|r| r.city_id == 2));
        assert!(s.discrepancies(10.0).unwrap().is_empty());
    }

    #[test]
    fn test_discrepancies_excludes_undefined_difference() {
        let mut s = store();
        s.upsert_api(1, 20.0, 18.0).unwrap();

        // Single-source record is excluded regardless of threshold.
        assert!(s.discrepancies(0.0).unwrap().is_empty());
        assert!(s.discrepancies(-1.0).unwrap().is_empty());
    }

    #[test]
    fn test_discrepancy_ties_break_by_insertion_order() {
        let mut s = store();
        // Insert the higher city id first so insertion order differs from
        // key order.
        s.upsert_api(9, 10.0, 9.0).unwrap();
        s.upsert_mobile(9, 12.0, 11.0).unwrap();
        s.upsert_api(4, 20.0, 19.0).unwrap();
        s.upsert_mobile(4, 22.0, 21.0).unwrap();

        let ids: Vec<_> = s
            .discrepancies(1.0)
            .unwrap()
            .iter()
            .map(|r| r.city_id)
            .collect();
        assert_eq!(ids, vec![9, 4]);
    }

    #[test]
    fn test_highest_average() {
        let mut s = store();
        s.upsert_api(1, 10.0, 9.0).unwrap();
        s.upsert_api(2, 25.0, 24.0).unwrap();
        s.upsert_api(3, 18.0, 17.0).unwrap();

        let hottest = s.highest_average().unwrap().unwrap();
        assert_eq!(hottest.city_id, 2);
        assert_eq!(hottest.average_temperature, 25.0);
    }

    #[test]
    fn test_highest_average_empty_store() {
        let s = store();
        assert!(s.highest_average().unwrap().is_none());
    }

    #[test]
    fn test_highest_average_tie_breaks_by_insertion_order() {
        let mut s = store();
        s.upsert_api(7, 20.0, 19.0).unwrap();
        s.upsert_api(2, 20.0, 19.0).unwrap();

        assert_eq!(s.highest_average().unwrap().unwrap().city_id, 7);
    }

    #[test]
    fn test_reset_clears_records() {
        let mut s = store();
        s.upsert_api(1, 10.0, 9.0).unwrap();
        s.reset().unwrap();
        assert!(s.get(1).unwrap().is_none());
        // Idempotent.
        s.reset().unwrap();
    }
}
