//! Position stability checks.
//!
//! An element that is still animating (sliding in, bouncing after a scroll,
//! re-laying out after a keyboard appears) reports a valid position that is
//! about to change. Tapping it then hits whatever slides underneath. The
//! [`StabilityMonitor`] samples the position twice and only reports the
//! element as stable when both samples agree exactly.

use std::time::Duration;

use tracing::debug;

use crate::driver::{DriverError, MobileDriver};
use crate::element::ElementHandle;
use crate::policy::DEFAULT_STABILITY_WINDOW;

/// Two-sample position comparison across a fixed delay.
#[derive(Debug, Clone, Copy)]
pub struct StabilityMonitor {
    window: Duration,
}

impl Default for StabilityMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_STABILITY_WINDOW)
    }
}

impl StabilityMonitor {
    /// Creates a monitor that waits `window` between the two samples.
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    /// The delay between samples.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Returns whether the element's position is unchanged across one
    /// stability window.
    ///
    /// A handle that goes stale or vanishes between the samples is reported
    /// as `Ok(false)`. Only fatal driver errors are returned as `Err`.
    pub async fn is_stable(
        &self,
        driver: &dyn MobileDriver,
        element: &ElementHandle,
    ) -> Result<bool, DriverError> {
        let first = match driver.location(element).await {
            Ok(point) => point,
            Err(e) if e.is_retryable() => {
                debug!(element = %element, error = %e, "first position sample failed");
                return Ok(false);
            }
            Err(e) => return Err(e),
        };

        tokio::time::sleep(self.window).await;

        let second = match driver.location(element).await {
            Ok(point) => point,
            Err(e) if e.is_retryable() => {
                debug!(element = %element, error = %e, "second position sample failed");
                return Ok(false);
            }
            Err(e) => return Err(e),
        };

        let stable = first == second;
        if !stable {
            debug!(
                element = %element,
                from_x = first.x,
                from_y = first.y,
                to_x = second.x,
                to_y = second.y,
                "element still moving"
            );
        }
        Ok(stable)
    }

    /// Runs one stability check and, if the element was still moving, waits
    /// one more window so the animation can finish.
    ///
    /// Never fails; errors are logged and treated as unstable.
    pub async fn settle(&self, driver: &dyn MobileDriver, element: &ElementHandle) {
        let stable = match self.is_stable(driver, element).await {
            Ok(stable) => stable,
            Err(e) => {
                debug!(element = %element, error = %e, "stability check failed while settling");
                false
            }
        };
        if !stable {
            tokio::time::sleep(self.window).await;
        }
    }
}
