//! Safe-band viewport correction.
//!
//! Elements near the top or bottom edge of the screen sit under status bars,
//! toolbars or the navigation bar, where a tap lands on the wrong view. The
//! [`ViewportCorrector`] scrolls until the element's vertical center lies in
//! the safe band (by default the middle 60% of the screen) or the attempt
//! budget runs out.

use tracing::debug;

use crate::driver::{DriverError, MobileDriver};
use crate::element::{ElementHandle, Rect, ScrollDirection, ScrollGesture, WindowSize};
use crate::locator::Locator;
use crate::policy::ViewportConfig;

/// Where an element's vertical center lies relative to the safe band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    InBand,
    Above,
    Below,
}

impl Placement {
    /// The scroll direction that moves the element toward the band, if any.
    pub fn correction(&self) -> Option<ScrollDirection> {
        match self {
            Placement::InBand => None,
            Placement::Above => Some(ScrollDirection::Down),
            Placement::Below => Some(ScrollDirection::Up),
        }
    }
}

/// Classifies `rect` against the band `[safe_top * H, safe_bottom * H]`.
/// Both band edges count as inside.
pub fn placement(rect: &Rect, window: WindowSize, config: &ViewportConfig) -> Placement {
    let top = window.height * config.safe_top;
    let bottom = window.height * config.safe_bottom;
    let center = rect.center_y();
    if center < top {
        Placement::Above
    } else if center > bottom {
        Placement::Below
    } else {
        Placement::InBand
    }
}

/// Outcome of [`ViewportCorrector::bring_into_view`].
#[derive(Debug, Clone)]
pub struct Correction {
    /// The most recently resolved handle.
    pub element: ElementHandle,
    /// Number of scroll gestures issued.
    pub gestures: u32,
    /// Whether the element ended up inside the safe band.
    pub settled: bool,
}

/// Scrolls an element into the safe band.
pub struct ViewportCorrector<'a> {
    driver: &'a dyn MobileDriver,
    config: &'a ViewportConfig,
}

impl<'a> ViewportCorrector<'a> {
    pub fn new(driver: &'a dyn MobileDriver, config: &'a ViewportConfig) -> Self {
        Self { driver, config }
    }

    /// Scrolls until the element's vertical center is inside the safe band,
    /// issuing at most `max_attempts` gestures and re-resolving `locator`
    /// after each one.
    ///
    /// Running out of attempts is not an error; the returned
    /// [`Correction`] has `settled: false`. Driver errors (including a
    /// re-resolve that finds nothing) are returned to the caller.
    pub async fn bring_into_view(
        &self,
        locator: &Locator,
        element: ElementHandle,
    ) -> Result<Correction, DriverError> {
        let mut element = element;
        let mut gestures = 0u32;

        loop {
            // Window and rect are sampled together; a rotation between
            // iterations changes both.
            let window = self.driver.window_size().await?;
            let rect = self.driver.rect(&element).await?;

            let Some(direction) = placement(&rect, window, self.config).correction() else {
                debug!(locator = %locator, gestures, "element inside safe band");
                return Ok(Correction {
                    element,
                    gestures,
                    settled: true,
                });
            };

            if gestures >= self.config.max_attempts {
                debug!(
                    locator = %locator,
                    gestures,
                    center_y = rect.center_y(),
                    "viewport correction gave up"
                );
                return Ok(Correction {
                    element,
                    gestures,
                    settled: false,
                });
            }

            let gesture = ScrollGesture {
                region: self.config.gesture_region.region_in(window),
                direction,
                percent: self.config.scroll_percent,
            };
            debug!(
                locator = %locator,
                direction = %direction,
                center_y = rect.center_y(),
                "scrolling toward safe band"
            );
            self.driver.scroll_gesture(&gesture).await?;
            gestures += 1;

            element = self.driver.resolve(locator).await?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::GestureRegion;
    use crate::mock::MockDriver;

    fn window() -> WindowSize {
        WindowSize::new(1000.0, 1000.0)
    }

    /// A 100px tall element whose center sits at `center`.
    fn rect_centered_at(center: f64) -> Rect {
        Rect::new(0.0, center - 50.0, 100.0, 100.0)
    }

    async fn correct(driver: &MockDriver) -> Correction {
        let config = ViewportConfig::default();
        let locator = Locator::id("moon_phase");
        let element = driver.resolve(&locator).await.unwrap();
        ViewportCorrector::new(driver, &config)
            .bring_into_view(&locator, element)
            .await
            .unwrap()
    }

    #[test]
    fn band_edges_are_inclusive() {
        let config = ViewportConfig::default();
        assert_eq!(placement(&rect_centered_at(200.0), window(), &config), Placement::InBand);
        assert_eq!(placement(&rect_centered_at(800.0), window(), &config), Placement::InBand);
        assert_eq!(placement(&rect_centered_at(199.0), window(), &config), Placement::Above);
        assert_eq!(placement(&rect_centered_at(801.0), window(), &config), Placement::Below);
    }

    #[tokio::test]
    async fn centered_element_needs_no_gesture() {
        let driver = MockDriver::new();
        driver.state().rect = rect_centered_at(500.0);

        let correction = correct(&driver).await;
        assert!(correction.settled);
        assert_eq!(correction.gestures, 0);
        assert!(driver.gestures().is_empty());
    }

    #[tokio::test]
    async fn element_above_band_scrolls_down_once() {
        let driver = MockDriver::new();
        {
            let mut s = driver.state();
            s.rect = rect_centered_at(100.0);
            s.gesture_shift = 400.0;
        }

        let correction = correct(&driver).await;
        assert!(correction.settled);
        assert_eq!(correction.gestures, 1);

        let gestures = driver.gestures();
        assert_eq!(gestures.len(), 1);
        assert_eq!(gestures[0].direction, ScrollDirection::Down);
        assert_eq!(gestures[0].percent, 0.7);
        assert_eq!(
            gestures[0].region,
            GestureRegion {
                left: 100,
                top: 200,
                width: 800,
                height: 600,
            }
        );
    }

    #[tokio::test]
    async fn element_below_band_scrolls_up_once() {
        let driver = MockDriver::new();
        {
            let mut s = driver.state();
            s.rect = rect_centered_at(950.0);
            s.gesture_shift = 450.0;
        }

        let correction = correct(&driver).await;
        assert!(correction.settled);
        let gestures = driver.gestures();
        assert_eq!(gestures.len(), 1);
        assert_eq!(gestures[0].direction, ScrollDirection::Up);
    }

    #[tokio::test]
    async fn correction_returns_re_resolved_handle() {
        let driver = MockDriver::new();
        {
            let mut s = driver.state();
            s.rect = rect_centered_at(100.0);
            s.gesture_shift = 400.0;
        }

        let correction = correct(&driver).await;
        // el-1 came from the initial resolve, el-2 from the re-resolve.
        assert_eq!(correction.element.id, "el-2");
    }

    #[tokio::test]
    async fn stuck_element_stops_after_max_attempts() {
        let driver = MockDriver::new();
        driver.state().rect = rect_centered_at(980.0);

        let correction = correct(&driver).await;
        assert!(!correction.settled);
        assert_eq!(correction.gestures, 5);
        assert_eq!(driver.gestures().len(), 5);
    }

    #[tokio::test]
    async fn rejected_gesture_is_reported() {
        let driver = MockDriver::new();
        {
            let mut s = driver.state();
            s.rect = rect_centered_at(100.0);
            s.fail_gestures = true;
        }

        let config = ViewportConfig::default();
        let locator = Locator::id("moon_phase");
        let element = driver.resolve(&locator).await.unwrap();
        let result = ViewportCorrector::new(&driver, &config)
            .bring_into_view(&locator, element)
            .await;
        assert!(matches!(result, Err(DriverError::CommandFailed(_))));
    }
}
