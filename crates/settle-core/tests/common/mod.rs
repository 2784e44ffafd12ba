//! Shared test helpers for settle-core integration tests.
//!
//! [`ScreenDriver`] is an in-memory device: a fixed-size screen holding a
//! few painted elements. Scroll gestures move every element, invalidate
//! previously resolved handles and change what `capture_frame` renders, so
//! the readiness and visual engines can be driven end to end without a
//! device.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Cursor;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use image::{GrayImage, ImageFormat, Luma};

use settle_core::config::{ConfigFile, HarnessConfig};
use settle_core::driver::{DriverError, MobileDriver};
use settle_core::element::{ElementHandle, Rect, ScrollDirection, ScrollGesture, WindowSize};
use settle_core::locator::Locator;
use settle_core::session::SessionContext;

pub const SCREEN_WIDTH: u32 = 400;
pub const SCREEN_HEIGHT: u32 = 800;
const BACKGROUND: u8 = 24;

/// How an element is drawn.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Paint {
    /// A flat button face.
    Solid(u8),
    /// A lit disc of `radius` with a shadow disc offset by `shadow` pixels.
    /// A large offset draws a full moon, a small one a thin crescent.
    Moon { radius: f64, shadow: f64 },
}

impl Paint {
    fn luma(&self, x: f64, y: f64, width: f64, height: f64) -> u8 {
        match *self {
            Paint::Solid(value) => value,
            Paint::Moon { radius, shadow } => {
                let (cx, cy) = (width / 2.0, height / 2.0);
                let inside = |px: f64| (px - cx).powi(2) + (y - cy).powi(2) <= radius * radius;
                if inside(x) && !inside(x - shadow) {
                    230
                } else {
                    BACKGROUND
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct Widget {
    pub rect: Rect,
    pub paint: Paint,
    pub displayed: bool,
    pub enabled: bool,
    /// Number of lookups that fail before the widget exists.
    pub appears_after: u32,
    lookups: u32,
}

impl Widget {
    pub fn new(rect: Rect, paint: Paint) -> Self {
        Self {
            rect,
            paint,
            displayed: true,
            enabled: true,
            appears_after: 0,
            lookups: 0,
        }
    }

    fn present(&self) -> bool {
        self.lookups > self.appears_after || self.appears_after == 0
    }

    pub fn appearing_after(mut self, lookups: u32) -> Self {
        self.appears_after = lookups;
        self
    }
}

pub struct Screen {
    pub widgets: HashMap<String, Widget>,
    /// Pixels every element moves per gesture; `down` moves content down.
    pub scroll_step: f64,
    /// Bumped by every gesture; handles from older generations are stale.
    pub generation: u32,
    pub gestures: Vec<ScrollGesture>,
    pub clicks: Vec<String>,
    pub typed: Vec<(String, String)>,
    pub keyboard_dismissals: u32,
    pub quit: bool,
}

pub struct ScreenDriver {
    screen: Mutex<Screen>,
}

impl ScreenDriver {
    pub fn new(scroll_step: f64) -> Self {
        Self {
            screen: Mutex::new(Screen {
                widgets: HashMap::new(),
                scroll_step,
                generation: 0,
                gestures: Vec::new(),
                clicks: Vec::new(),
                typed: Vec::new(),
                keyboard_dismissals: 0,
                quit: false,
            }),
        }
    }

    pub fn with_widget(self, selector: &str, widget: Widget) -> Self {
        self.screen().widgets.insert(selector.to_string(), widget);
        self
    }

    pub fn screen(&self) -> MutexGuard<'_, Screen> {
        self.screen.lock().unwrap()
    }

    pub fn repaint(&self, selector: &str, paint: Paint) {
        self.screen().widgets.get_mut(selector).unwrap().paint = paint;
    }

    /// Renders the current screen as grayscale pixels.
    pub fn render(&self) -> GrayImage {
        let screen = self.screen();
        let mut frame = GrayImage::from_pixel(SCREEN_WIDTH, SCREEN_HEIGHT, Luma([BACKGROUND]));
        for widget in screen.widgets.values() {
            if !widget.displayed || !widget.present() {
                continue;
            }
            let Some((left, top, width, height)) = widget.rect.clip_to(SCREEN_WIDTH, SCREEN_HEIGHT)
            else {
                continue;
            };
            for y in top..top + height {
                for x in left..left + width {
                    let local_x = f64::from(x) - widget.rect.x;
                    let local_y = f64::from(y) - widget.rect.y;
                    let luma = widget
                        .paint
                        .luma(local_x, local_y, widget.rect.width, widget.rect.height);
                    frame.put_pixel(x, y, Luma([luma]));
                }
            }
        }
        frame
    }

    fn widget(&self, element: &ElementHandle) -> Result<Widget, DriverError> {
        let screen = self.screen();
        let (selector, generation) = element
            .id
            .rsplit_once('@')
            .ok_or_else(|| DriverError::StaleElement(element.id.clone()))?;
        if generation != screen.generation.to_string() {
            return Err(DriverError::StaleElement(element.id.clone()));
        }
        screen
            .widgets
            .get(selector)
            .cloned()
            .ok_or_else(|| DriverError::StaleElement(element.id.clone()))
    }
}

#[async_trait]
impl MobileDriver for ScreenDriver {
    async fn resolve(&self, locator: &Locator) -> Result<ElementHandle, DriverError> {
        let mut screen = self.screen();
        let generation = screen.generation;
        let widget = screen
            .widgets
            .get_mut(&locator.selector)
            .ok_or_else(|| DriverError::NoSuchElement(locator.to_string()))?;
        widget.lookups += 1;
        if widget.lookups <= widget.appears_after {
            return Err(DriverError::NoSuchElement(locator.to_string()));
        }
        Ok(ElementHandle::new(
            format!("{}@{}", locator.selector, generation),
            locator.clone(),
        ))
    }

    async fn is_displayed(&self, element: &ElementHandle) -> Result<bool, DriverError> {
        Ok(self.widget(element)?.displayed)
    }

    async fn is_enabled(&self, element: &ElementHandle) -> Result<bool, DriverError> {
        Ok(self.widget(element)?.enabled)
    }

    async fn rect(&self, element: &ElementHandle) -> Result<Rect, DriverError> {
        Ok(self.widget(element)?.rect)
    }

    async fn window_size(&self) -> Result<WindowSize, DriverError> {
        Ok(WindowSize::new(f64::from(SCREEN_WIDTH), f64::from(SCREEN_HEIGHT)))
    }

    async fn scroll_gesture(&self, gesture: &ScrollGesture) -> Result<(), DriverError> {
        let mut screen = self.screen();
        let dy = match gesture.direction {
            ScrollDirection::Down => screen.scroll_step,
            ScrollDirection::Up => -screen.scroll_step,
        };
        for widget in screen.widgets.values_mut() {
            widget.rect = widget.rect.shifted_y(dy);
        }
        screen.generation += 1;
        screen.gestures.push(*gesture);
        Ok(())
    }

    async fn capture_frame(&self) -> Result<Vec<u8>, DriverError> {
        let frame = self.render();
        let mut png = Vec::new();
        frame
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .map_err(|e| DriverError::Decode(e.to_string()))?;
        Ok(png)
    }

    async fn hide_soft_input(&self) -> Result<(), DriverError> {
        self.screen().keyboard_dismissals += 1;
        Ok(())
    }

    async fn click(&self, element: &ElementHandle) -> Result<(), DriverError> {
        self.widget(element)?;
        self.screen().clicks.push(element.locator.selector.clone());
        Ok(())
    }

    async fn send_keys(&self, element: &ElementHandle, text: &str) -> Result<(), DriverError> {
        self.widget(element)?;
        self.screen()
            .typed
            .push((element.locator.selector.clone(), text.to_string()));
        Ok(())
    }

    async fn clear(&self, element: &ElementHandle) -> Result<(), DriverError> {
        self.widget(element).map(|_| ())
    }

    async fn page_source(&self) -> Result<String, DriverError> {
        let screen = self.screen();
        let mut selectors: Vec<_> = screen.widgets.keys().cloned().collect();
        selectors.sort();
        let nodes: String = selectors
            .iter()
            .map(|s| format!("<node resource-id=\"{s}\"/>"))
            .collect();
        Ok(format!("<hierarchy>{nodes}</hierarchy>"))
    }

    async fn is_app_installed(&self, _app_id: &str) -> Result<bool, DriverError> {
        Ok(true)
    }

    async fn terminate_app(&self, _app_id: &str) -> Result<bool, DriverError> {
        Ok(true)
    }

    async fn quit(&self) -> Result<(), DriverError> {
        self.screen().quit = true;
        Ok(())
    }
}

/// A session over `driver` whose reference images live under `root`.
pub fn session(driver: &Arc<ScreenDriver>, root: &Path) -> SessionContext {
    let config = HarnessConfig::resolve(root, ConfigFile::default(), |_| None).unwrap();
    SessionContext::with_driver(driver.clone(), config)
}
