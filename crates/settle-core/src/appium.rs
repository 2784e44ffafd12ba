//! Appium driver over the W3C WebDriver HTTP protocol.
//!
//! [`AppiumDriver`] implements [`MobileDriver`] by talking JSON to an Appium
//! server. Appium extension commands (`mobile: scrollGesture`,
//! `mobile: terminateApp`, ...) go through `POST /execute/sync`.
//!
//! # Example
//!
//! ```no_run
//! use settle_core::appium::AppiumDriver;
//! use settle_core::config::Platform;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let driver = AppiumDriver::new("http://127.0.0.1:4723", Platform::Android)?;
//!     let mut caps = serde_json::Map::new();
//!     caps.insert("platformName".into(), "Android".into());
//!     caps.insert("appium:automationName".into(), "UiAutomator2".into());
//!     let session = driver.start_session(caps).await?;
//!     println!("session {session}");
//!     Ok(())
//! }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::Method;
use serde_json::{json, Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::Platform;
use crate::driver::{DriverError, MobileDriver};
use crate::element::{ElementHandle, Point, Rect, ScrollGesture, WindowSize};
use crate::locator::Locator;

/// Key of an element reference in W3C responses.
pub const W3C_ELEMENT_KEY: &str = "element-6066-11e4-a23d-4f2b4f4a1b1a";
/// Key used by pre-W3C (JSONWP) servers.
const LEGACY_ELEMENT_KEY: &str = "ELEMENT";

const NATIVE_CONTEXT: &str = "NATIVE_APP";

/// Per-request HTTP timeout. Session creation can take a while on a cold
/// emulator, so this is generous.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// A [`MobileDriver`] backed by an Appium server.
///
/// The session id lives behind a [`tokio::sync::Mutex`] so that
/// [`start_session`](Self::start_session) and [`quit`](MobileDriver::quit)
/// can work through `&self`.
pub struct AppiumDriver {
    client: reqwest::Client,
    base_url: String,
    platform: Platform,
    session_id: Mutex<Option<String>>,
}

impl AppiumDriver {
    /// Creates a driver for the server at `server_url`.
    ///
    /// No session exists until [`start_session`](Self::start_session) is
    /// called.
    pub fn new(server_url: &str, platform: Platform) -> Result<Self, DriverError> {
        Self::with_timeout(server_url, platform, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(
        server_url: &str,
        platform: Platform,
        timeout: Duration,
    ) -> Result<Self, DriverError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DriverError::ConnectionLost(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: server_url.trim_end_matches('/').to_string(),
            platform,
            session_id: Mutex::new(None),
        })
    }

    /// Attaches to a session that already exists on the server.
    pub async fn attach(&self, session_id: impl Into<String>) {
        *self.session_id.lock().await = Some(session_id.into());
    }

    pub async fn session_id(&self) -> Option<String> {
        self.session_id.lock().await.clone()
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Creates a new session with the given capabilities as `alwaysMatch`.
    ///
    /// Returns the new session id.
    pub async fn start_session(&self, capabilities: Map<String, Value>) -> Result<String, DriverError> {
        let body = json!({
            "capabilities": {
                "alwaysMatch": capabilities,
                "firstMatch": [{}],
            }
        });
        let url = format!("{}/session", self.base_url);
        let value = self.send(Method::POST, &url, Some(body)).await?;

        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| DriverError::JsonParse("new session response has no sessionId".to_string()))?
            .to_string();
        info!(session_id = %session_id, server = %self.base_url, "appium session created");
        *self.session_id.lock().await = Some(session_id.clone());
        Ok(session_id)
    }

    /// Sends a command scoped to the current session.
    async fn command(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value, DriverError> {
        let session_id = self
            .session_id
            .lock()
            .await
            .clone()
            .ok_or(DriverError::NotConnected)?;
        let url = format!("{}/session/{}{}", self.base_url, session_id, path);
        self.send(method, &url, body).await
    }

    /// Runs an Appium extension (`mobile: ...`) script.
    async fn execute(&self, script: &str, args: Value) -> Result<Value, DriverError> {
        self.command(
            Method::POST,
            "/execute/sync",
            Some(json!({ "script": script, "args": [args] })),
        )
        .await
    }

    async fn send(&self, method: Method, url: &str, body: Option<Value>) -> Result<Value, DriverError> {
        debug!(%method, url, "appium request");
        let mut request = self.client.request(method, url);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await.map_err(map_transport_error)?;
        let status = response.status();
        let text = response.text().await.map_err(map_transport_error)?;

        let parsed: Option<Value> = serde_json::from_str(&text).ok();
        let value = parsed
            .as_ref()
            .and_then(|v| v.get("value"))
            .cloned()
            .unwrap_or(Value::Null);

        if let Some(error) = value.get("error").and_then(Value::as_str) {
            let message = value
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default();
            return Err(map_w3c_error(error, message));
        }
        if !status.is_success() {
            return Err(DriverError::CommandFailed(format!("HTTP {status}: {text}")));
        }
        if parsed.is_none() {
            return Err(DriverError::JsonParse(format!("response is not JSON: {text}")));
        }
        Ok(value)
    }

    fn element_path(element: &ElementHandle, suffix: &str) -> String {
        format!("/element/{}{}", element.id, suffix)
    }

    /// Platform-specific argument naming the app for `mobile:` commands.
    fn app_arg(&self, app_id: &str) -> Value {
        match self.platform {
            Platform::Android => json!({ "appId": app_id }),
            Platform::Ios => json!({ "bundleId": app_id }),
        }
    }
}

fn map_transport_error(e: reqwest::Error) -> DriverError {
    if e.is_timeout() {
        DriverError::Timeout
    } else {
        DriverError::ConnectionLost(e.to_string())
    }
}

/// Maps a W3C error code to a [`DriverError`].
fn map_w3c_error(error: &str, message: &str) -> DriverError {
    match error {
        "no such element" => DriverError::NoSuchElement(message.to_string()),
        "stale element reference" => DriverError::StaleElement(message.to_string()),
        "invalid session id" => DriverError::NoSuchSession(message.to_string()),
        "timeout" | "script timeout" => DriverError::Timeout,
        _ => DriverError::CommandFailed(format!("{error}: {message}")),
    }
}

fn expect_bool(value: Value, what: &str) -> Result<bool, DriverError> {
    value
        .as_bool()
        .ok_or_else(|| DriverError::JsonParse(format!("{what}: expected boolean, got {value}")))
}

fn expect_string(value: Value, what: &str) -> Result<String, DriverError> {
    match value {
        Value::String(s) => Ok(s),
        other => Err(DriverError::JsonParse(format!("{what}: expected string, got {other}"))),
    }
}

#[async_trait]
impl MobileDriver for AppiumDriver {
    async fn resolve(&self, locator: &Locator) -> Result<ElementHandle, DriverError> {
        let value = self
            .command(
                Method::POST,
                "/element",
                Some(json!({ "using": locator.strategy.as_w3c(), "value": locator.selector })),
            )
            .await?;
        let id = value
            .get(W3C_ELEMENT_KEY)
            .or_else(|| value.get(LEGACY_ELEMENT_KEY))
            .and_then(Value::as_str)
            .ok_or_else(|| DriverError::JsonParse(format!("no element reference in {value}")))?;
        Ok(ElementHandle::new(id, locator.clone()))
    }

    async fn is_displayed(&self, element: &ElementHandle) -> Result<bool, DriverError> {
        let value = self
            .command(Method::GET, &Self::element_path(element, "/displayed"), None)
            .await?;
        expect_bool(value, "displayed")
    }

    async fn is_enabled(&self, element: &ElementHandle) -> Result<bool, DriverError> {
        let value = self
            .command(Method::GET, &Self::element_path(element, "/enabled"), None)
            .await?;
        expect_bool(value, "enabled")
    }

    async fn rect(&self, element: &ElementHandle) -> Result<Rect, DriverError> {
        let value = self
            .command(Method::GET, &Self::element_path(element, "/rect"), None)
            .await?;
        serde_json::from_value(value).map_err(|e| DriverError::JsonParse(format!("element rect: {e}")))
    }

    async fn location(&self, element: &ElementHandle) -> Result<Point, DriverError> {
        Ok(self.rect(element).await?.origin())
    }

    async fn window_size(&self) -> Result<WindowSize, DriverError> {
        let value = self.command(Method::GET, "/window/rect", None).await?;
        serde_json::from_value(value).map_err(|e| DriverError::JsonParse(format!("window rect: {e}")))
    }

    async fn scroll_gesture(&self, gesture: &ScrollGesture) -> Result<(), DriverError> {
        let region = gesture.region;
        self.execute(
            "mobile: scrollGesture",
            json!({
                "left": region.left,
                "top": region.top,
                "width": region.width,
                "height": region.height,
                "direction": gesture.direction.as_str(),
                "percent": gesture.percent,
            }),
        )
        .await?;
        Ok(())
    }

    async fn capture_frame(&self) -> Result<Vec<u8>, DriverError> {
        let value = self.command(Method::GET, "/screenshot", None).await?;
        let encoded = expect_string(value, "screenshot")?;
        let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
        base64::engine::general_purpose::STANDARD
            .decode(compact.as_bytes())
            .map_err(|e| DriverError::Decode(format!("screenshot base64: {e}")))
    }

    async fn hide_soft_input(&self) -> Result<(), DriverError> {
        self.command(Method::POST, "/appium/device/hide_keyboard", Some(json!({})))
            .await?;
        Ok(())
    }

    async fn click(&self, element: &ElementHandle) -> Result<(), DriverError> {
        self.command(Method::POST, &Self::element_path(element, "/click"), Some(json!({})))
            .await?;
        Ok(())
    }

    async fn send_keys(&self, element: &ElementHandle, text: &str) -> Result<(), DriverError> {
        self.command(
            Method::POST,
            &Self::element_path(element, "/value"),
            Some(json!({ "text": text })),
        )
        .await?;
        Ok(())
    }

    async fn clear(&self, element: &ElementHandle) -> Result<(), DriverError> {
        self.command(Method::POST, &Self::element_path(element, "/clear"), Some(json!({})))
            .await?;
        Ok(())
    }

    async fn page_source(&self) -> Result<String, DriverError> {
        let value = self.command(Method::GET, "/source", None).await?;
        expect_string(value, "page source")
    }

    async fn ensure_native_context(&self) -> Result<(), DriverError> {
        let current = self.command(Method::GET, "/context", None).await?;
        if current.as_str() == Some(NATIVE_CONTEXT) {
            return Ok(());
        }
        debug!(context = %current, "switching to native context");
        self.command(Method::POST, "/context", Some(json!({ "name": NATIVE_CONTEXT })))
            .await?;
        Ok(())
    }

    async fn is_app_installed(&self, app_id: &str) -> Result<bool, DriverError> {
        let value = self.execute("mobile: isAppInstalled", self.app_arg(app_id)).await?;
        expect_bool(value, "isAppInstalled")
    }

    async fn terminate_app(&self, app_id: &str) -> Result<bool, DriverError> {
        let value = self.execute("mobile: terminateApp", self.app_arg(app_id)).await?;
        // Older drivers return null instead of a boolean.
        Ok(value.as_bool().unwrap_or(true))
    }

    async fn shell(&self, command: &str) -> Result<String, DriverError> {
        if self.platform != Platform::Android {
            return Err(DriverError::Unsupported("shell"));
        }
        let mut parts = command.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| DriverError::CommandFailed("empty shell command".to_string()))?;
        let args: Vec<&str> = parts.collect();
        let value = self
            .execute("mobile: shell", json!({ "command": program, "args": args }))
            .await?;
        Ok(match value {
            Value::String(s) => s,
            Value::Null => String::new(),
            other => other
                .get("stdout")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        })
    }

    async fn press_keycode(&self, keycode: i32) -> Result<(), DriverError> {
        if self.platform != Platform::Android {
            return Err(DriverError::Unsupported("press_keycode"));
        }
        self.execute("mobile: pressKey", json!({ "keycode": keycode }))
            .await?;
        Ok(())
    }

    async fn quit(&self) -> Result<(), DriverError> {
        let Some(session_id) = self.session_id.lock().await.take() else {
            return Ok(());
        };
        let url = format!("{}/session/{}", self.base_url, session_id);
        self.send(Method::DELETE, &url, None).await?;
        info!(session_id = %session_id, "appium session closed");
        Ok(())
    }
}
