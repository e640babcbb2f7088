//! Mobile UI reader for the weather app.
//!
//! Black-box automation over the app's control tree, modeled as an explicit
//! state machine so every failure point sits on a named transition with its
//! own bounded wait:
//!
//! ```text
//! Idle -> AppLaunched -> SettingsConfigured -> SearchReady -> ResultRead
//! ```
//!
//! Displayed temperatures are whole-number degrees; parsing truncates any
//! fractional part. The API side keeps full floating-point precision, so a
//! non-zero difference is expected even from a perfectly accurate instrument.

pub mod driver;

pub use driver::{Locator, UiDriver, WebDriverSession};

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info, instrument};

use crate::record::Reading;

/// Cap on every element wait, matching the app's slowest screen loads.
const ELEMENT_WAIT: Duration = Duration::from_secs(20);

const FEELS_LIKE_PREFIX: &str = "Feels like ";

/// Errors from the UI automation boundary.
#[derive(Debug, thiserror::Error)]
pub enum UiError {
    #[error("timed out after {waited:?} waiting for {locator}")]
    Timeout { locator: String, waited: Duration },
    #[error("element not found: {locator}")]
    ElementNotFound { locator: String },
    #[error("automation session error: {0}")]
    Session(String),
    #[error("unreadable temperature text {text:?}")]
    UnreadableValue { text: String },
}

/// Abstraction over the mobile UI reader, for orchestration and test fakes.
#[async_trait]
pub trait MobileUi: Send {
    /// Returns the displayed reading for a city, searched by display name.
    async fn read_city(&mut self, city_name: &str) -> Result<Reading, UiError>;

    /// Ends the automation session.
    async fn teardown(&mut self) -> Result<(), UiError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UiState {
    Idle,
    AppLaunched,
    SettingsConfigured,
    SearchReady,
    ResultRead,
}

/// The weather app under automation.
///
/// Operations are named by intent; concrete locators live here so the
/// orchestration layer never sees the control tree.
pub struct MobileApp<D: UiDriver> {
    driver: D,
    state: UiState,
}

fn main_screen() -> Locator {
    Locator::Id("uk.co.openweather:id/action_bar_root".to_string())
}

fn settings_button() -> Locator {
    Locator::UiAutomator("new UiSelector().className(\"android.view.ViewGroup\").instance(11)".to_string())
}

fn units_row() -> Locator {
    Locator::Xpath(
        "//android.widget.FrameLayout[@resource-id=\"android:id/content\"]\
         //android.view.ViewGroup[2]/android.view.ViewGroup"
            .to_string(),
    )
}

fn celsius_switch() -> Locator {
    Locator::AccessibilityId("°C".to_string())
}

fn navigate_up() -> Locator {
    Locator::AccessibilityId("Navigate up".to_string())
}

fn search_button() -> Locator {
    Locator::Xpath("//android.view.ViewGroup[@content-desc=\"Search\"]".to_string())
}

fn search_input() -> Locator {
    Locator::UiAutomator("new UiSelector().text(\"Search\")".to_string())
}

fn city_result(city_name: &str) -> Locator {
    Locator::Xpath(format!(
        "//android.widget.TextView[contains(@text, '{city_name}')]"
    ))
}

fn temperature_label() -> Locator {
    Locator::Xpath("//android.widget.TextView[contains(@text, \"°C\")]".to_string())
}

fn feels_like_label() -> Locator {
    Locator::Xpath(format!(
        "//android.widget.TextView[contains(@text, \"{FEELS_LIKE_PREFIX}\")]"
    ))
}

impl<D: UiDriver> MobileApp<D> {
    pub fn new(driver: D) -> Self {
        Self {
            driver,
            state: UiState::Idle,
        }
    }

    fn expect_state(&self, allowed: &[UiState], operation: &str) -> Result<(), UiError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(UiError::Session(format!(
                "{operation} not allowed in state {:?}",
                self.state
            )))
        }
    }

    /// `Idle -> AppLaunched`: starts the session and waits for the main
    /// screen.
    #[instrument(skip(self))]
    pub async fn launch(&mut self) -> Result<(), UiError> {
        self.expect_state(&[UiState::Idle], "launch")?;
        self.driver.launch().await?;
        self.driver.find(&main_screen(), ELEMENT_WAIT).await?;
        self.state = UiState::AppLaunched;
        info!("app launched");
        Ok(())
    }

    /// `AppLaunched -> SettingsConfigured`: switches the displayed unit
    /// system to Celsius and returns to the main screen.
    #[instrument(skip(self))]
    pub async fn configure_celsius(&mut self) -> Result<(), UiError> {
        self.expect_state(&[UiState::AppLaunched], "configure_celsius")?;

        let settings = self.driver.find(&settings_button(), ELEMENT_WAIT).await?;
        self.driver.tap(&settings).await?;
        self.driver.find(&main_screen(), ELEMENT_WAIT).await?;

        let units = self.driver.find(&units_row(), ELEMENT_WAIT).await?;
        self.driver.tap(&units).await?;
        let celsius = self.driver.find(&celsius_switch(), ELEMENT_WAIT).await?;
        self.driver.tap(&celsius).await?;

        let back = self.driver.find(&navigate_up(), ELEMENT_WAIT).await?;
        self.driver.tap(&back).await?;

        self.state = UiState::SettingsConfigured;
        info!("unit system set to Celsius");
        Ok(())
    }

    /// `-> SearchReady -> ResultRead`: searches for a city by display name
    /// and reads the temperature and feels-like labels from its screen.
    #[instrument(skip(self))]
    pub async fn read_city_reading(&mut self, city_name: &str) -> Result<Reading, UiError> {
        self.expect_state(
            &[UiState::SettingsConfigured, UiState::ResultRead],
            "read_city",
        )?;

        let search = self.driver.find(&search_button(), ELEMENT_WAIT).await?;
        self.driver.tap(&search).await?;

        let input = self.driver.find(&search_input(), ELEMENT_WAIT).await?;
        self.driver.clear(&input).await?;
        self.driver.type_text(&input, city_name).await?;
        self.driver.press_enter().await?;

        let result = self
            .driver
            .find(&city_result(city_name), ELEMENT_WAIT)
            .await?;
        self.driver.tap(&result).await?;
        self.state = UiState::SearchReady;

        let temp_el = self.driver.find(&temperature_label(), ELEMENT_WAIT).await?;
        let temp_text = self.driver.read_text(&temp_el).await?;
        let temperature = parse_celsius(&temp_text)?;

        let feels_el = self.driver.find(&feels_like_label(), ELEMENT_WAIT).await?;
        let feels_text = self.driver.read_text(&feels_el).await?;
        let feels_like = parse_celsius(feels_text.trim().trim_start_matches(FEELS_LIKE_PREFIX))?;

        self.state = UiState::ResultRead;
        debug!(city_name, temperature, feels_like, "UI reading received");
        Ok(Reading {
            temperature,
            feels_like,
        })
    }
}

#[async_trait]
impl<D: UiDriver> MobileUi for MobileApp<D> {
    async fn read_city(&mut self, city_name: &str) -> Result<Reading, UiError> {
        self.read_city_reading(city_name).await
    }

    async fn teardown(&mut self) -> Result<(), UiError> {
        self.state = UiState::Idle;
        self.driver.quit().await
    }
}

/// Parses a displayed Celsius label like `"12°C"` into degrees.
///
/// The app renders whole degrees; any fractional part in the text is
/// truncated, never rounded.
fn parse_celsius(text: &str) -> Result<f64, UiError> {
    let cleaned = text.replace("°C", "").replace('°', "");
    cleaned
        .trim()
        .parse::<f64>()
        .map(f64::trunc)
        .map_err(|_| UiError::UnreadableValue {
            text: text.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    #[test]
    fn test_parse_celsius_whole_degrees() {
        assert_eq!(parse_celsius("12°C").unwrap(), 12.0);
        assert_eq!(parse_celsius(" -3°C ").unwrap(), -3.0);
        assert_eq!(parse_celsius("0°").unwrap(), 0.0);
    }

    #[test]
    fn test_parse_celsius_truncates_fraction() {
        assert_eq!(parse_celsius("12.7°C").unwrap(), 12.0);
        // Truncation goes toward zero, never rounding.
        assert_eq!(parse_celsius("-3.7°C").unwrap(), -3.0);
    }

    #[test]
    fn test_parse_celsius_rejects_junk() {
        assert!(matches!(
            parse_celsius("--"),
            Err(UiError::UnreadableValue { .. })
        ));
        // Not a single number: must be rejected, not read as its prefix.
        assert!(matches!(
            parse_celsius("1.2.3°C"),
            Err(UiError::UnreadableValue { .. })
        ));
    }

    /// Driver fake that answers every lookup and replays queued label texts.
    struct ScriptedDriver {
        texts: VecDeque<String>,
        next_element: usize,
    }

    impl ScriptedDriver {
        fn new(texts: &[&str]) -> Self {
            Self {
                texts: texts.iter().map(|t| t.to_string()).collect(),
                next_element: 0,
            }
        }
    }

    #[async_trait]
    impl UiDriver for ScriptedDriver {
        async fn launch(&mut self) -> Result<(), UiError> {
            Ok(())
        }

        async fn find(&mut self, _locator: &Locator, _wait: Duration) -> Result<String, UiError> {
            self.next_element += 1;
            Ok(format!("element-{}", self.next_element))
        }

        async fn tap(&mut self, _element: &str) -> Result<(), UiError> {
            Ok(())
        }

        async fn clear(&mut self, _element: &str) -> Result<(), UiError> {
            Ok(())
        }

        async fn type_text(&mut self, _element: &str, _text: &str) -> Result<(), UiError> {
            Ok(())
        }

        async fn press_enter(&mut self) -> Result<(), UiError> {
            Ok(())
        }

        async fn read_text(&mut self, _element: &str) -> Result<String, UiError> {
            self.texts
                .pop_front()
                .ok_or_else(|| UiError::Session("no scripted text left".to_string()))
        }

        async fn quit(&mut self) -> Result<(), UiError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_full_flow_reads_truncated_degrees() {
        let driver = ScriptedDriver::new(&["12°C", "Feels like 10°C"]);
        let mut app = MobileApp::new(driver);

        app.launch().await.unwrap();
        app.configure_celsius().await.unwrap();
        let reading = app.read_city("London").await.unwrap();

        assert_eq!(reading.temperature, 12.0);
        assert_eq!(reading.feels_like, 10.0);
    }

    #[tokio::test]
    async fn test_consecutive_city_reads_allowed() {
        let driver = ScriptedDriver::new(&["12°C", "Feels like 10°C", "7°C", "Feels like 5°C"]);
        let mut app = MobileApp::new(driver);

        app.launch().await.unwrap();
        app.configure_celsius().await.unwrap();
        app.read_city("London").await.unwrap();
        let second = app.read_city("Tokyo").await.unwrap();

        assert_eq!(second.temperature, 7.0);
    }

    #[tokio::test]
    async fn test_read_before_launch_is_session_error() {
        let driver = ScriptedDriver::new(&[]);
        let mut app = MobileApp::new(driver);

        let err = app.read_city("London").await.unwrap_err();
        assert!(matches!(err, UiError::Session(_)));
    }

    #[tokio::test]
    async fn test_configure_requires_launch() {
        let driver = ScriptedDriver::new(&[]);
        let mut app = MobileApp::new(driver);

        assert!(matches!(
            app.configure_celsius().await.unwrap_err(),
            UiError::Session(_)
        ));
    }

    #[tokio::test]
    async fn test_teardown_returns_to_idle() {
        let driver = ScriptedDriver::new(&["12°C", "Feels like 10°C"]);
        let mut app = MobileApp::new(driver);

        app.launch().await.unwrap();
        app.configure_celsius().await.unwrap();
        app.read_city("London").await.unwrap();
        app.teardown().await.unwrap();

        // A fresh launch is required after teardown.
        assert!(matches!(
            app.read_city("Tokyo").await.unwrap_err(),
            UiError::Session(_)
        ));
    }
}
