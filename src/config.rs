//! Startup configuration.
//!
//! All settings live in a single JSON file loaded once and passed by
//! reference; there is no ambient/static configuration state. The API key can
//! be overridden through the `OPENWEATHER_API_KEY` environment variable
//! (populated from `.env` by the CLI).

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::record::CityId;

/// Errors raised while loading configuration. All fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    NotFound { path: PathBuf },
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config: {0}")]
    Invalid(#[from] serde_json::Error),
}

/// A city under audit: the numeric id used by the weather source and the
/// display name shown in the mobile app.
#[derive(Debug, Clone, Deserialize)]
pub struct City {
    pub id: CityId,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiSettings {
    pub key: String,
    pub base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreSettings {
    pub path: PathBuf,
}

/// Connection settings for the Appium/WebDriver automation server.
#[derive(Debug, Clone, Deserialize)]
pub struct MobileSettings {
    pub server_url: String,
    #[serde(default = "default_app_package")]
    pub app_package: String,
    #[serde(default = "default_app_activity")]
    pub app_activity: String,
    #[serde(default = "default_device_name")]
    pub device_name: String,
}

fn default_app_package() -> String {
    "uk.co.openweather".to_string()
}

fn default_app_activity() -> String {
    "uk.co.openweather.MainActivity".to_string()
}

fn default_device_name() -> String {
    "emulator-5554".to_string()
}

impl Default for MobileSettings {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:4723".to_string(),
            app_package: default_app_package(),
            app_activity: default_app_activity(),
            device_name: default_device_name(),
        }
    }
}

/// Full startup configuration. Missing required fields fail the load with
/// [`ConfigError::Invalid`] naming the field.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub api: ApiSettings,
    pub store: StoreSettings,
    #[serde(default)]
    pub mobile: MobileSettings,
    /// Audit order follows this list; it is never re-sorted.
    pub cities: Vec<City>,
}

impl Settings {
    /// Loads settings from a JSON file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path)?;
        let mut settings: Settings = serde_json::from_str(&content)?;
        if let Ok(key) = std::env::var("OPENWEATHER_API_KEY") {
            settings.api.key = key;
        }
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::fs;

    fn temp_path(name: &str) -> PathBuf {
        env::temp_dir().join(name)
    }

    fn sample_config() -> &'static str {
        r#"{
            "api": { "key": "secret", "base_url": "https://api.openweathermap.org/data/2.5/weather" },
            "store": { "path": "weather.db" },
            "cities": [
                { "id": 2643743, "name": "London" },
                { "id": 1850147, "name": "Tokyo" }
            ]
        }"#
    }

    #[test]
    fn test_load_valid_config() {
        let path = temp_path("weather_crosscheck_config_ok.json");
        fs::write(&path, sample_config()).unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.api.base_url, "https://api.openweathermap.org/data/2.5/weather");
        assert_eq!(settings.cities.len(), 2);
        assert_eq!(settings.cities[0].name, "London");
        // Mobile section is optional and falls back to defaults.
        assert_eq!(settings.mobile.server_url, "http://127.0.0.1:4723");

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_missing_file_is_distinct_error() {
        let err = Settings::load(Path::new("/nonexistent/config.json")).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { .. }));
    }

    #[test]
    fn test_missing_field_is_invalid() {
        let path = temp_path("weather_crosscheck_config_bad.json");
        fs::write(&path, r#"{ "api": { "key": "secret" } }"#).unwrap();

        let err = Settings::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        fs::remove_file(&path).unwrap();
    }
}
