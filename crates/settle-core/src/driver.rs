//! Device automation driver trait.
//!
//! This module defines the [`MobileDriver`] trait, the only seam between the
//! readiness/visual engines and the device. The engines never talk to Appium
//! directly; they resolve locators, read element state and geometry, issue
//! scroll gestures and capture frames through this trait. The production
//! implementation is [`AppiumDriver`](crate::appium::AppiumDriver); tests
//! substitute scripted drivers.
//!
//! # Error classification
//!
//! [`DriverError::kind`] splits failures into retryable ones and fatal ones.
//! Retryable covers a missing element, a stale handle, and transient command
//! trouble (a server-side "unknown error", a per-request timeout, a garbled
//! response). Fatal means the session or the connection to the server is
//! gone, or the backend cannot do the operation at all. Pollers consume the
//! former and surface the latter.

use async_trait::async_trait;
use thiserror::Error;

use crate::element::{ElementHandle, Point, Rect, ScrollGesture, WindowSize};
use crate::error::ErrorKind;
use crate::locator::Locator;

/// Errors that can occur during driver operations.
///
/// This enum unifies errors from all backends behind a single type so the
/// engines can classify them uniformly.
#[derive(Error, Debug)]
pub enum DriverError {
    /// No element matched the locator.
    #[error("No such element: {0}")]
    NoSuchElement(String),

    /// A previously resolved handle is no longer attached to the UI.
    #[error("Stale element reference: {0}")]
    StaleElement(String),

    /// The automation session does not exist (never started or already deleted).
    #[error("No such session: {0}")]
    NoSuchSession(String),

    /// A command or operation failed with the given message.
    #[error("Command failed: {0}")]
    CommandFailed(String),

    /// The backend does not implement the requested operation.
    #[error("Unsupported by this driver: {0}")]
    Unsupported(&'static str),

    /// No session has been started.
    #[error("Not connected to automation backend")]
    NotConnected,

    /// The connection to the automation server failed.
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// An operation timed out at the transport level.
    #[error("Operation timed out")]
    Timeout,

    /// A response could not be parsed.
    #[error("JSON parse error: {0}")]
    JsonParse(String),

    /// Encoded payload (e.g. a base64 screenshot) could not be decoded.
    #[error("Decode error: {0}")]
    Decode(String),

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DriverError {
    /// Classifies the error for retry decisions.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DriverError::NoSuchElement(_)
            | DriverError::StaleElement(_)
            | DriverError::CommandFailed(_)
            | DriverError::Timeout
            | DriverError::JsonParse(_) => ErrorKind::Retryable,
            DriverError::NoSuchSession(_)
            | DriverError::NotConnected
            | DriverError::ConnectionLost(_)
            | DriverError::Unsupported(_)
            | DriverError::Decode(_)
            | DriverError::Io(_) => ErrorKind::Fatal,
        }
    }

    /// Returns true if polling again may succeed.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Retryable
    }
}

/// Trait for backend-agnostic mobile UI automation.
///
/// All methods take `&self`; implementations serialize access internally.
/// A driver session is an exclusively owned resource: callers must not run
/// concurrent waits or captures against the same driver, since they would
/// race on viewport state.
///
/// # Required Methods
///
/// Implementors must provide: [`resolve`](MobileDriver::resolve),
/// [`is_displayed`](MobileDriver::is_displayed),
/// [`is_enabled`](MobileDriver::is_enabled),
/// [`rect`](MobileDriver::rect),
/// [`window_size`](MobileDriver::window_size),
/// [`scroll_gesture`](MobileDriver::scroll_gesture),
/// [`capture_frame`](MobileDriver::capture_frame),
/// [`hide_soft_input`](MobileDriver::hide_soft_input),
/// [`click`](MobileDriver::click),
/// [`send_keys`](MobileDriver::send_keys),
/// [`clear`](MobileDriver::clear),
/// [`page_source`](MobileDriver::page_source),
/// [`is_app_installed`](MobileDriver::is_app_installed)
/// and [`terminate_app`](MobileDriver::terminate_app).
#[async_trait]
pub trait MobileDriver: Send + Sync {
    /// Resolve a locator into a live element.
    ///
    /// Returns [`DriverError::NoSuchElement`] when nothing matches.
    async fn resolve(&self, locator: &Locator) -> Result<ElementHandle, DriverError>;

    /// Whether the element reports itself as displayed.
    async fn is_displayed(&self, element: &ElementHandle) -> Result<bool, DriverError>;

    /// Whether the element reports itself as enabled.
    async fn is_enabled(&self, element: &ElementHandle) -> Result<bool, DriverError>;

    /// The element's bounding rectangle relative to the viewport.
    async fn rect(&self, element: &ElementHandle) -> Result<Rect, DriverError>;

    /// The element's top-left position.
    ///
    /// The default implementation reads [`rect`](Self::rect) and returns its
    /// origin.
    async fn location(&self, element: &ElementHandle) -> Result<Point, DriverError> {
        Ok(self.rect(element).await?.origin())
    }

    /// The current viewport size.
    async fn window_size(&self) -> Result<WindowSize, DriverError>;

    /// Perform a scroll gesture inside a screen region.
    async fn scroll_gesture(&self, gesture: &ScrollGesture) -> Result<(), DriverError>;

    /// Capture the full screen as encoded (PNG) bytes.
    async fn capture_frame(&self) -> Result<Vec<u8>, DriverError>;

    /// Dismiss the on-screen keyboard if one is shown.
    async fn hide_soft_input(&self) -> Result<(), DriverError>;

    /// Tap the element.
    async fn click(&self, element: &ElementHandle) -> Result<(), DriverError>;

    /// Type text into the element.
    async fn send_keys(&self, element: &ElementHandle, text: &str) -> Result<(), DriverError>;

    /// Clear the element's text content.
    async fn clear(&self, element: &ElementHandle) -> Result<(), DriverError>;

    /// The current UI hierarchy as XML.
    async fn page_source(&self) -> Result<String, DriverError>;

    /// Make sure commands target the native view hierarchy rather than a
    /// web view. The default implementation does nothing.
    async fn ensure_native_context(&self) -> Result<(), DriverError> {
        Ok(())
    }

    /// Whether the app with the given package / bundle id is installed.
    async fn is_app_installed(&self, app_id: &str) -> Result<bool, DriverError>;

    /// Terminate a running app. Returns whether the app was running.
    async fn terminate_app(&self, app_id: &str) -> Result<bool, DriverError>;

    /// Run a device shell command and return its output.
    ///
    /// Not all backends support this. The default implementation returns
    /// [`DriverError::Unsupported`].
    async fn shell(&self, _command: &str) -> Result<String, DriverError> {
        Err(DriverError::Unsupported("shell"))
    }

    /// Press a hardware key by Android keycode.
    ///
    /// The default implementation returns [`DriverError::Unsupported`].
    async fn press_keycode(&self, _keycode: i32) -> Result<(), DriverError> {
        Err(DriverError::Unsupported("press_keycode"))
    }

    /// End the automation session. The default implementation does nothing.
    async fn quit(&self) -> Result<(), DriverError> {
        Ok(())
    }
}
