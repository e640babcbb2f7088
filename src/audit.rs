//! One-shot batch orchestration.
//!
//! Processes the configured city list strictly in order, one blocking step at
//! a time. No retries anywhere: the first failing fetch or write aborts the
//! whole pass with the city and operation attached as context.

use anyhow::{Context, Result};
use tracing::{info, instrument, warn};

use crate::api::WeatherSource;
use crate::config::City;
use crate::mobile::MobileUi;
use crate::store::RecordStore;

/// API-only pass: fetch and merge a reading for every city.
#[instrument(skip_all, fields(cities = cities.len()))]
pub async fn collect_api<S: WeatherSource>(
    source: &S,
    store: &mut RecordStore,
    cities: &[City],
) -> Result<()> {
    for city in cities {
        let reading = source
            .fetch(city.id)
            .await
            .with_context(|| format!("API fetch for {} ({})", city.name, city.id))?;
        store
            .upsert_api(city.id, reading.temperature, reading.feels_like)
            .with_context(|| format!("storing API reading for {} ({})", city.name, city.id))?;
        info!(
            city = %city.name,
            temperature = reading.temperature,
            feels_like = reading.feels_like,
            "API reading stored"
        );
    }
    Ok(())
}

/// Full cross-check pass: for each city, merge the API reading, then the
/// mobile UI reading. The automation session is torn down best-effort when
/// the pass ends, whether it succeeded or not.
#[instrument(skip_all, fields(cities = cities.len()))]
pub async fn crosscheck<S: WeatherSource, M: MobileUi>(
    source: &S,
    mobile: &mut M,
    store: &mut RecordStore,
    cities: &[City],
) -> Result<()> {
    let result = crosscheck_pass(source, mobile, store, cities).await;
    if let Err(e) = mobile.teardown().await {
        warn!(error = %e, "automation session teardown failed");
    }
    result
}

async fn crosscheck_pass<S: WeatherSource, M: MobileUi>(
    source: &S,
    mobile: &mut M,
    store: &mut RecordStore,
    cities: &[City],
) -> Result<()> {
    for city in cities {
        let api_reading = source
            .fetch(city.id)
            .await
            .with_context(|| format!("API fetch for {} ({})", city.name, city.id))?;
        store
            .upsert_api(city.id, api_reading.temperature, api_reading.feels_like)
            .with_context(|| format!("storing API reading for {} ({})", city.name, city.id))?;

        let ui_reading = mobile
            .read_city(&city.name)
            .await
            .with_context(|| format!("UI reading for {}", city.name))?;
        store
            .upsert_mobile(city.id, ui_reading.temperature, ui_reading.feels_like)
            .with_context(|| format!("storing UI reading for {} ({})", city.name, city.id))?;

        info!(
            city = %city.name,
            api_temperature = api_reading.temperature,
            mobile_temperature = ui_reading.temperature,
            difference = (api_reading.temperature - ui_reading.temperature).abs(),
            "city cross-checked"
        );
    }
    Ok(())
}
