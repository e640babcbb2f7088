//! Low-level client for an Appium/WebDriver automation server.
//!
//! Speaks the W3C WebDriver HTTP protocol: one session per app launch,
//! element lookup by locator strategy, element interaction by element id.
//! Element lookups poll until a bounded deadline; the system above performs
//! no retries of its own.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::fmt;
use std::time::Duration;
use tracing::{debug, instrument};

use super::UiError;
use crate::config::MobileSettings;

/// Keycode for the Android Enter key.
const KEYCODE_ENTER: u32 = 66;

/// Delay between element-lookup probes.
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Bound on any single WebDriver command round-trip. Element lookups carry
/// their own tighter wall-clock deadline on top of this.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// W3C WebDriver element identifier key.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// An element locator, named by strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    /// Android resource id.
    Id(String),
    /// Accessibility id (content description).
    AccessibilityId(String),
    /// UiAutomator selector expression.
    UiAutomator(String),
    Xpath(String),
}

impl Locator {
    fn strategy(&self) -> (&'static str, &str) {
        match self {
            Locator::Id(v) => ("id", v),
            Locator::AccessibilityId(v) => ("accessibility id", v),
            Locator::UiAutomator(v) => ("-android uiautomator", v),
            Locator::Xpath(v) => ("xpath", v),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (strategy, value) = self.strategy();
        write!(f, "{strategy}={value}")
    }
}

/// Driver seam between the UI state machine and the automation server.
#[async_trait]
pub trait UiDriver: Send {
    /// Starts an automation session and launches the app.
    async fn launch(&mut self) -> Result<(), UiError>;

    /// Finds an element, polling until `wait` elapses.
    async fn find(&mut self, locator: &Locator, wait: Duration) -> Result<String, UiError>;

    async fn tap(&mut self, element: &str) -> Result<(), UiError>;
    async fn clear(&mut self, element: &str) -> Result<(), UiError>;
    async fn type_text(&mut self, element: &str, text: &str) -> Result<(), UiError>;
    async fn press_enter(&mut self) -> Result<(), UiError>;
    async fn read_text(&mut self, element: &str) -> Result<String, UiError>;

    /// Ends the session. Safe to call when no session is active.
    async fn quit(&mut self) -> Result<(), UiError>;
}

/// WebDriver session against a running Appium server.
pub struct WebDriverSession {
    http: reqwest::Client,
    settings: MobileSettings,
    session_id: Option<String>,
}

impl WebDriverSession {
    pub fn new(settings: &MobileSettings) -> Result<Self, UiError> {
        let http = reqwest::Client::builder()
            .timeout(COMMAND_TIMEOUT)
            .build()
            .map_err(|e| UiError::Session(e.to_string()))?;
        Ok(Self {
            http,
            settings: settings.clone(),
            session_id: None,
        })
    }

    fn session_id(&self) -> Result<&str, UiError> {
        self.session_id
            .as_deref()
            .ok_or_else(|| UiError::Session("no active automation session".to_string()))
    }

    fn url(&self, path: &str) -> Result<String, UiError> {
        let session = self.session_id()?;
        Ok(format!(
            "{}/session/{session}{path}",
            self.settings.server_url
        ))
    }

    async fn post(&self, path: &str, body: Value, op: &str) -> Result<Value, UiError> {
        let response = self
            .http
            .post(self.url(path)?)
            .json(&body)
            .send()
            .await
            .map_err(|e| UiError::Session(format!("{op}: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(UiError::Session(format!("{op} failed with status {status}")));
        }
        response
            .json()
            .await
            .map_err(|e| UiError::Session(format!("{op}: invalid response: {e}")))
    }
}

#[async_trait]
impl UiDriver for WebDriverSession {
    #[instrument(skip(self))]
    async fn launch(&mut self) -> Result<(), UiError> {
        let capabilities = json!({
            "capabilities": {
                "alwaysMatch": {
                    "platformName": "Android",
                    "appium:automationName": "UiAutomator2",
                    "appium:deviceName": self.settings.device_name,
                    "appium:appPackage": self.settings.app_package,
                    "appium:appActivity": self.settings.app_activity,
                    "appium:noReset": true,
                    "appium:autoGrantPermissions": true,
                    "appium:newCommandTimeout": 3600,
                }
            }
        });

        let response = self
            .http
            .post(format!("{}/session", self.settings.server_url))
            .json(&capabilities)
            .send()
            .await
            .map_err(|e| UiError::Session(format!("create session: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(UiError::Session(format!(
                "create session failed with status {status}"
            )));
        }
        let body: Value = response
            .json()
            .await
            .map_err(|e| UiError::Session(format!("create session: invalid response: {e}")))?;

        let session_id = body["value"]["sessionId"]
            .as_str()
            .ok_or_else(|| UiError::Session("create session: no sessionId in response".to_string()))?
            .to_string();

        debug!(session_id, "automation session created");
        self.session_id = Some(session_id);
        Ok(())
    }

    async fn find(&mut self, locator: &Locator, wait: Duration) -> Result<String, UiError> {
        let (strategy, value) = locator.strategy();
        let body = json!({ "using": strategy, "value": value });
        let url = self.url("/element")?;
        let deadline = tokio::time::Instant::now() + wait;

        loop {
            // The deadline is a wall-clock bound: a request still in flight
            // when it passes surfaces as Timeout, never an indefinite stall.
            let probe = tokio::time::timeout_at(deadline, probe_element(&self.http, &url, &body))
                .await
                .map_err(|_| UiError::Timeout {
                    locator: locator.to_string(),
                    waited: wait,
                })?;

            match probe? {
                Some(element) => return Ok(element),
                // The server answered "no such element"; poll again unless
                // the next probe would overshoot the deadline.
                None => {
                    if tokio::time::Instant::now() + POLL_INTERVAL > deadline {
                        return Err(UiError::ElementNotFound {
                            locator: locator.to_string(),
                        });
                    }
                    tokio::time::sleep(POLL_INTERVAL).await;
                }
            }
        }
    }

    async fn tap(&mut self, element: &str) -> Result<(), UiError> {
        self.post(&format!("/element/{element}/click"), json!({}), "tap")
            .await?;
        Ok(())
    }

    async fn clear(&mut self, element: &str) -> Result<(), UiError> {
        self.post(&format!("/element/{element}/clear"), json!({}), "clear")
            .await?;
        Ok(())
    }

    async fn type_text(&mut self, element: &str, text: &str) -> Result<(), UiError> {
        self.post(
            &format!("/element/{element}/value"),
            json!({ "text": text }),
            "type text",
        )
        .await?;
        Ok(())
    }

    async fn press_enter(&mut self) -> Result<(), UiError> {
        self.post(
            "/appium/device/press_keycode",
            json!({ "keycode": KEYCODE_ENTER }),
            "press enter",
        )
        .await?;
        Ok(())
    }

    async fn read_text(&mut self, element: &str) -> Result<String, UiError> {
        let response = self
            .http
            .get(self.url(&format!("/element/{element}/text"))?)
            .send()
            .await
            .map_err(|e| UiError::Session(format!("read text: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(UiError::Session(format!(
                "read text failed with status {status}"
            )));
        }
        let payload: Value = response
            .json()
            .await
            .map_err(|e| UiError::Session(format!("read text: invalid response: {e}")))?;
        payload["value"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| UiError::Session("read text: no text in response".to_string()))
    }

    #[instrument(skip(self))]
    async fn quit(&mut self) -> Result<(), UiError> {
        let Some(session) = self.session_id.take() else {
            return Ok(());
        };
        let response = self
            .http
            .delete(format!("{}/session/{session}", self.settings.server_url))
            .send()
            .await
            .map_err(|e| UiError::Session(format!("quit: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(UiError::Session(format!("quit failed with status {status}")));
        }
        debug!("automation session closed");
        Ok(())
    }
}

/// One element-lookup round-trip. `Ok(None)` means the server gave a
/// well-formed "no such element" answer.
async fn probe_element(
    http: &reqwest::Client,
    url: &str,
    body: &Value,
) -> Result<Option<String>, UiError> {
    let response = http
        .post(url)
        .json(body)
        .send()
        .await
        .map_err(|e| UiError::Session(format!("find element: {e}")))?;

    let status = response.status();
    if status == reqwest::StatusCode::NOT_FOUND {
        return Ok(None);
    }
    if !status.is_success() {
        return Err(UiError::Session(format!(
            "find element failed with status {status}"
        )));
    }

    let payload: Value = response
        .json()
        .await
        .map_err(|e| UiError::Session(format!("find element: invalid response: {e}")))?;
    payload["value"][ELEMENT_KEY]
        .as_str()
        .or_else(|| {
            payload["value"]
                .as_object()
                .and_then(|o| o.values().find_map(Value::as_str))
        })
        .map(|element| Some(element.to_string()))
        .ok_or_else(|| UiError::Session("find element: no element id in response".to_string()))
}
