//! Poll-until-ready synchronization.
//!
//! [`ReadinessWaiter::ready_element`] is the single entry point tests use
//! before interacting with an element. It combines driver state queries,
//! the [`StabilityMonitor`] and the [`ViewportCorrector`] into a small state
//! machine:
//!
//! ```text
//! Polling{escalated: false} ──ready──▶ Ready
//!        │ timeout
//!        ├── allow_scroll = false ──▶ TimedOut
//!        ▼
//!   ScrollRetry ──▶ Polling{escalated: true} ──ready──▶ Ready
//!                          │ timeout
//!                          ▼
//!                       TimedOut
//! ```
//!
//! Retryable driver errors (element not found, stale handle, a transient
//! command failure or request timeout) only consume a poll attempt. Only a
//! lost session or connection aborts the wait.

use std::sync::Arc;

use tokio::time::Instant;
use tracing::{debug, info_span, warn, Instrument};

use crate::driver::{DriverError, MobileDriver};
use crate::element::{ElementHandle, ScrollDirection, ScrollGesture};
use crate::error::WaitError;
use crate::locator::Locator;
use crate::policy::ReadinessPolicy;
use crate::stability::StabilityMonitor;
use crate::viewport::ViewportCorrector;

#[derive(Debug)]
enum WaitState {
    Polling { escalated: bool },
    ScrollRetry,
    Ready(ElementHandle),
    TimedOut { escalated: bool },
}

/// Waits for elements to become interactable.
#[derive(Clone)]
pub struct ReadinessWaiter {
    driver: Arc<dyn MobileDriver>,
}

impl ReadinessWaiter {
    pub fn new(driver: Arc<dyn MobileDriver>) -> Self {
        Self { driver }
    }

    /// Polls until the element behind `locator` is displayed, (optionally)
    /// enabled, inside the viewport and not moving, then returns a handle to
    /// it.
    ///
    /// With `policy.allow_scroll`, a first timeout triggers one downward
    /// scroll and a second poll phase with the same budget. With
    /// `policy.prepare_for_click`, the element is then centered into the
    /// safe band, the soft keyboard is dismissed and the position is
    /// re-checked; those steps never fail the call.
    ///
    /// # Errors
    ///
    /// - [`WaitError::Timeout`] if no poll phase found a ready element.
    /// - [`WaitError::Driver`] if the session or the connection to the
    ///   automation server is gone.
    pub async fn ready_element(
        &self,
        locator: &Locator,
        policy: &ReadinessPolicy,
    ) -> Result<ElementHandle, WaitError> {
        let span = info_span!("ready_element", locator = %locator);
        async {
            let start = Instant::now();

            if let Err(e) = self.driver.ensure_native_context().await {
                debug!(error = %e, "could not switch to native context");
            }

            let mut state = WaitState::Polling { escalated: false };
            let element = loop {
                state = match state {
                    WaitState::Polling { escalated } => {
                        match self.poll_until_ready(locator, policy).await? {
                            Some(element) => WaitState::Ready(element),
                            None if policy.allow_scroll && !escalated => WaitState::ScrollRetry,
                            None => WaitState::TimedOut { escalated },
                        }
                    }
                    WaitState::ScrollRetry => {
                        self.escalate(policy).await;
                        WaitState::Polling { escalated: true }
                    }
                    WaitState::Ready(element) => break element,
                    WaitState::TimedOut { escalated } => {
                        let elapsed = start.elapsed();
                        warn!(
                            elapsed_ms = elapsed.as_millis() as u64,
                            escalated, "element never became ready"
                        );
                        return Err(WaitError::Timeout {
                            locator: locator.clone(),
                            budget: policy.timeout,
                            elapsed,
                            escalated,
                        });
                    }
                };
            };

            let element = if policy.prepare_for_click {
                self.prepare_for_click(locator, element, policy).await
            } else {
                element
            };

            debug!(elapsed_ms = start.elapsed().as_millis() as u64, element = %element, "element ready");
            Ok::<_, WaitError>(element)
        }
        .instrument(span)
        .await
    }

    /// One poll phase. `Ok(None)` means the budget ran out.
    async fn poll_until_ready(
        &self,
        locator: &Locator,
        policy: &ReadinessPolicy,
    ) -> Result<Option<ElementHandle>, WaitError> {
        let deadline = Instant::now() + policy.timeout;
        let monitor = StabilityMonitor::new(policy.stability_window);
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            match self.check_ready(locator, policy, &monitor).await {
                Ok(Some(element)) => {
                    debug!(attempts, "readiness predicate held");
                    return Ok(Some(element));
                }
                Ok(None) => {}
                Err(e) if e.is_retryable() => {
                    debug!(attempts, error = %e, "element not available yet");
                }
                Err(source) => {
                    return Err(WaitError::Driver {
                        locator: locator.clone(),
                        source,
                    });
                }
            }

            if Instant::now() >= deadline {
                debug!(attempts, "poll phase exhausted its budget");
                return Ok(None);
            }
            tokio::time::sleep(policy.poll_interval).await;
        }
    }

    /// Evaluates the readiness predicate once against a fresh handle.
    async fn check_ready(
        &self,
        locator: &Locator,
        policy: &ReadinessPolicy,
        monitor: &StabilityMonitor,
    ) -> Result<Option<ElementHandle>, DriverError> {
        let driver = self.driver.as_ref();

        let element = driver.resolve(locator).await?;
        if !driver.is_displayed(&element).await? {
            return Ok(None);
        }
        if policy.require_enabled && !driver.is_enabled(&element).await? {
            return Ok(None);
        }

        let window = driver.window_size().await?;
        let rect = driver.rect(&element).await?;
        if !window.contains(rect.origin()) {
            return Ok(None);
        }

        if !monitor.is_stable(driver, &element).await? {
            return Ok(None);
        }
        Ok(Some(element))
    }

    /// The one-shot scroll between the two poll phases. Failures are logged
    /// and ignored.
    async fn escalate(&self, policy: &ReadinessPolicy) {
        let window = match self.driver.window_size().await {
            Ok(window) => window,
            Err(e) => {
                warn!(error = %e, "skipping escalation scroll, window size unavailable");
                return;
            }
        };
        let gesture = ScrollGesture {
            region: policy.viewport.gesture_region.region_in(window),
            direction: ScrollDirection::Down,
            percent: policy.escalation_percent,
        };
        debug!(percent = gesture.percent, "escalating with a scroll");
        if let Err(e) = self.driver.scroll_gesture(&gesture).await {
            warn!(error = %e, "escalation scroll failed");
        }
    }

    /// Best-effort preparation of a ready element for a tap.
    async fn prepare_for_click(
        &self,
        locator: &Locator,
        element: ElementHandle,
        policy: &ReadinessPolicy,
    ) -> ElementHandle {
        let driver = self.driver.as_ref();

        let corrector = ViewportCorrector::new(driver, &policy.viewport);
        let element = match corrector.bring_into_view(locator, element.clone()).await {
            Ok(correction) => {
                debug!(
                    gestures = correction.gestures,
                    settled = correction.settled,
                    "viewport correction finished"
                );
                correction.element
            }
            Err(e) => {
                debug!(error = %e, "viewport correction failed, keeping polled handle");
                element
            }
        };

        if let Err(e) = driver.hide_soft_input().await {
            debug!(error = %e, "no keyboard to hide");
        }

        StabilityMonitor::new(policy.stability_window)
            .settle(driver, &element)
            .await;
        element
    }
}
