//! HTTP client for the weather source.
//!
//! Requests current weather by city id and decodes the payload into a fixed
//! shape at the boundary; anything missing the required fields fails
//! immediately with [`ApiError::MalformedResponse`].

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::config::ApiSettings;
use crate::record::{CityId, Reading};

const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Errors from the weather source boundary.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("weather source returned status {status} for city {city_id}")]
    SourceUnavailable { city_id: CityId, status: StatusCode },
    #[error("weather source response for city {city_id} is missing `{field}`")]
    MalformedResponse { city_id: CityId, field: &'static str },
    #[error("weather source transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Abstraction over the weather-data source.
#[async_trait]
pub trait WeatherSource: Send + Sync {
    /// Returns the current reading for a city, metric units.
    async fn fetch(&self, city_id: CityId) -> Result<Reading, ApiError>;
}

/// OpenWeather-style current-weather client.
pub struct OpenWeatherClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OpenWeatherClient {
    pub fn new(settings: &ApiSettings) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            http,
            base_url: settings.base_url.clone(),
            api_key: settings.key.clone(),
        })
    }
}

/// Wire shape of the current-weather payload. Fields are optional so that a
/// missing one surfaces as [`ApiError::MalformedResponse`] rather than a
/// decode error without context.
#[derive(Debug, Deserialize)]
struct WeatherPayload {
    main: Option<MainReadings>,
}

#[derive(Debug, Deserialize)]
struct MainReadings {
    temp: Option<f64>,
    feels_like: Option<f64>,
}

#[async_trait]
impl WeatherSource for OpenWeatherClient {
    #[instrument(skip(self))]
    async fn fetch(&self, city_id: CityId) -> Result<Reading, ApiError> {
        let response = self
            .http
            .get(&self.base_url)
            .query(&[
                ("id", city_id.to_string()),
                ("appid", self.api_key.clone()),
                ("units", "metric".to_string()),
                ("lang", "en".to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::SourceUnavailable { city_id, status });
        }

        let payload: WeatherPayload = response
            .json()
            .await
            .map_err(|_| ApiError::MalformedResponse {
                city_id,
                field: "body",
            })?;

        let main = payload.main.ok_or(ApiError::MalformedResponse {
            city_id,
            field: "main",
        })?;
        let temperature = main.temp.ok_or(ApiError::MalformedResponse {
            city_id,
            field: "main.temp",
        })?;
        let feels_like = main.feels_like.ok_or(ApiError::MalformedResponse {
            city_id,
            field: "main.feels_like",
        })?;

        debug!(city_id, temperature, feels_like, "API reading received");
        Ok(Reading {
            temperature,
            feels_like,
        })
    }
}
