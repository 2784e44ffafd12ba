//! Readiness and viewport tuning knobs.
//!
//! The numeric defaults here (safe band 0.2-0.8, gesture region, gesture
//! intensities 0.7/0.8, five correction attempts, 350ms stability window)
//! are empirical. They are plain fields so a harness can adjust them per
//! device or per call.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::element::{GestureRegion, WindowSize};

/// Default overall budget for one poll phase.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);
/// Default delay between readiness attempts.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(300);
/// Default delay between the two position samples of a stability check.
pub const DEFAULT_STABILITY_WINDOW: Duration = Duration::from_millis(350);
/// Default intensity of the one-shot escalation scroll.
pub const DEFAULT_ESCALATION_PERCENT: f64 = 0.8;

/// A rectangle expressed as fractions of the viewport.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegionFractions {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl RegionFractions {
    /// Scales the fractions to whole pixels of `window`, truncating.
    pub fn region_in(&self, window: WindowSize) -> GestureRegion {
        GestureRegion {
            left: (window.width * self.left) as i64,
            top: (window.height * self.top) as i64,
            width: (window.width * self.width) as i64,
            height: (window.height * self.height) as i64,
        }
    }
}

impl Default for RegionFractions {
    fn default() -> Self {
        Self {
            left: 0.1,
            top: 0.2,
            width: 0.8,
            height: 0.6,
        }
    }
}

/// Configuration of the safe-band correction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewportConfig {
    /// Top of the safe band as a fraction of the viewport height.
    pub safe_top: f64,
    /// Bottom of the safe band as a fraction of the viewport height.
    pub safe_bottom: f64,
    /// Where scroll gestures are performed.
    pub gesture_region: RegionFractions,
    /// Intensity of each corrective scroll.
    pub scroll_percent: f64,
    /// Maximum number of corrective scrolls.
    pub max_attempts: u32,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            safe_top: 0.2,
            safe_bottom: 0.8,
            gesture_region: RegionFractions::default(),
            scroll_percent: 0.7,
            max_attempts: 5,
        }
    }
}

/// How long and how strictly to wait for an element.
///
/// Immutable per call; build variants with the `with_*` methods.
///
/// The default policy has `prepare_for_click` on. An element that is ready
/// on the first poll then costs two stability windows (700 ms with the
/// defaults): one while polling and one more while settling after the
/// viewport correction. Turn it off with
/// [`with_prepare_for_click(false)`](Self::with_prepare_for_click) to return
/// after a single window.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadinessPolicy {
    /// Budget for one poll phase. The escalation poll gets the same budget.
    pub timeout: Duration,
    /// Delay between attempts.
    pub poll_interval: Duration,
    /// Allow one scroll-and-retry after the first timeout.
    pub allow_scroll: bool,
    /// Delay between the two position samples of a stability check.
    pub stability_window: Duration,
    /// Require the element to report itself enabled.
    pub require_enabled: bool,
    /// Center the element, hide the keyboard and re-check stability before
    /// returning.
    pub prepare_for_click: bool,
    /// Intensity of the escalation scroll.
    pub escalation_percent: f64,
    /// Safe-band correction settings.
    pub viewport: ViewportConfig,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            allow_scroll: true,
            stability_window: DEFAULT_STABILITY_WINDOW,
            require_enabled: true,
            prepare_for_click: true,
            escalation_percent: DEFAULT_ESCALATION_PERCENT,
            viewport: ViewportConfig::default(),
        }
    }
}

impl ReadinessPolicy {
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    #[must_use]
    pub fn with_allow_scroll(mut self, allow: bool) -> Self {
        self.allow_scroll = allow;
        self
    }

    #[must_use]
    pub fn with_stability_window(mut self, window: Duration) -> Self {
        self.stability_window = window;
        self
    }

    #[must_use]
    pub fn with_require_enabled(mut self, require: bool) -> Self {
        self.require_enabled = require;
        self
    }

    #[must_use]
    pub fn with_prepare_for_click(mut self, prepare: bool) -> Self {
        self.prepare_for_click = prepare;
        self
    }

    #[must_use]
    pub fn with_escalation_percent(mut self, percent: f64) -> Self {
        self.escalation_percent = percent;
        self
    }

    #[must_use]
    pub fn with_viewport(mut self, viewport: ViewportConfig) -> Self {
        self.viewport = viewport;
        self
    }
}
