//! # settle-core
//!
//! Element-readiness synchronization and visual-state verification for
//! mobile UI tests driven through Appium.
//!
//! Most of a UI test harness is delegation to the device-automation driver.
//! This crate owns the two parts that are not: deciding when an element is
//! really ready to be touched (displayed, enabled, on screen, no longer
//! animating, inside the comfortable part of the viewport), and deciding
//! whether a region of the screen still looks like a reference image.
//!
//! ## Modules
//!
//! - [`locator`] - Strategy/selector pairs used to (re)resolve elements
//! - [`element`] - Element handles and viewport geometry
//! - [`driver`] - The [`MobileDriver`](driver::MobileDriver) trait and its error type
//! - [`appium`] - W3C/Appium HTTP implementation of the driver trait
//! - [`policy`] - Readiness and viewport tuning knobs
//! - [`stability`] - Two-sample position stability check
//! - [`viewport`] - Safe-band scroll correction
//! - [`readiness`] - The poll-until-ready state machine
//! - [`visual`] - Grayscale template matching against reference images
//! - [`reference`] - On-disk store of named reference images
//! - [`lifecycle`] - Ordered fallback strategies for terminating apps
//! - [`config`] - Harness configuration and capabilities loading
//! - [`session`] - Explicit per-run session context
//! - [`logging`] - tracing subscriber setup
//!
//! ## Example
//!
//! ```no_run
//! use settle_core::config::HarnessConfig;
//! use settle_core::driver::MobileDriver;
//! use settle_core::locator::Locator;
//! use settle_core::session::SessionContext;
//! use settle_core::visual::CaptureSource;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = HarnessConfig::load(".")?;
//! let session = SessionContext::start(config).await?;
//!
//! let ok = Locator::id("android:id/button1");
//! let button = session.ready_element(&ok, None).await?;
//! session.driver().click(&button).await?;
//!
//! let moon = session.ready_element(&Locator::accessibility_id("moon"), None).await?;
//! let result = session
//!     .visual_match(CaptureSource::Element(&moon), "new moon", None)
//!     .await?;
//! assert!(result.passed);
//!
//! session.teardown().await?;
//! # Ok(())
//! # }
//! ```

pub mod appium;
pub mod config;
pub mod driver;
pub mod element;
pub mod error;
pub mod lifecycle;
pub mod locator;
pub mod logging;
pub mod policy;
pub mod readiness;
pub mod reference;
pub mod session;
pub mod stability;
pub mod viewport;
pub mod visual;

#[cfg(test)]
pub(crate) mod mock;
