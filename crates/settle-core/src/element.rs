//! Element handles and viewport geometry.
//!
//! All coordinates are device pixels relative to the visible viewport, with
//! the origin at the top-left corner. Geometry is always read fresh from the
//! driver; nothing in this module caches positions across polls.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::locator::Locator;

/// A live reference to a resolved UI element.
///
/// Handles are transient: any UI mutation (scroll, navigation, re-render)
/// may invalidate them, after which the driver reports them as stale. The
/// locator that produced the handle is kept so callers can re-resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementHandle {
    /// The driver-assigned element reference.
    pub id: String,
    /// The locator this handle was resolved from.
    pub locator: Locator,
}

impl ElementHandle {
    /// Creates a handle for the given driver element id.
    pub fn new(id: impl Into<String>, locator: Locator) -> Self {
        Self {
            id: id.into(),
            locator,
        }
    }
}

impl fmt::Display for ElementHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.locator, self.id)
    }
}

/// A position in device pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// The size of the current viewport.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowSize {
    pub width: f64,
    pub height: f64,
}

impl WindowSize {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Returns true if the point lies inside the viewport
    /// (`0 <= x < width` and `0 <= y < height`).
    pub fn contains(&self, point: Point) -> bool {
        point.x >= 0.0 && point.x < self.width && point.y >= 0.0 && point.y < self.height
    }
}

/// The bounding rectangle of an element.
///
/// Only meaningful together with the [`WindowSize`] sampled in the same
/// poll iteration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    /// The x-coordinate of the top-left corner.
    pub x: f64,
    /// The y-coordinate of the top-left corner.
    pub y: f64,
    /// The width in pixels.
    pub width: f64,
    /// The height in pixels.
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// The top-left corner.
    pub fn origin(&self) -> Point {
        Point::new(self.x, self.y)
    }

    /// The vertical center line.
    pub fn center_y(&self) -> f64 {
        self.y + self.height / 2.0
    }

    /// Returns a copy moved vertically by `dy` pixels.
    pub fn shifted_y(&self, dy: f64) -> Self {
        Self {
            y: self.y + dy,
            ..*self
        }
    }

    /// Integer pixel bounds `(left, top, width, height)` clipped to an image
    /// of `image_width` x `image_height`. Returns `None` when the clipped
    /// region is empty.
    pub fn clip_to(&self, image_width: u32, image_height: u32) -> Option<(u32, u32, u32, u32)> {
        let left = self.x.floor().max(0.0);
        let top = self.y.floor().max(0.0);
        let right = (self.x + self.width).ceil().min(f64::from(image_width));
        let bottom = (self.y + self.height).ceil().min(f64::from(image_height));
        if right <= left || bottom <= top {
            return None;
        }
        Some((
            left as u32,
            top as u32,
            (right - left) as u32,
            (bottom - top) as u32,
        ))
    }
}

/// Direction of a scroll gesture, as understood by `mobile: scrollGesture`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    Up,
    Down,
}

impl ScrollDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScrollDirection::Up => "up",
            ScrollDirection::Down => "down",
        }
    }
}

impl fmt::Display for ScrollDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The screen area a scroll gesture is confined to, in whole pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GestureRegion {
    pub left: i64,
    pub top: i64,
    pub width: i64,
    pub height: i64,
}

/// A scroll gesture request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScrollGesture {
    /// Where on screen the gesture is performed.
    pub region: GestureRegion,
    /// Which way to scroll.
    pub direction: ScrollDirection,
    /// Gesture length as a fraction of the region (0.0-1.0).
    pub percent: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_contains_is_half_open() {
        let window = WindowSize::new(1080.0, 2400.0);
        assert!(window.contains(Point::new(0.0, 0.0)));
        assert!(window.contains(Point::new(1079.0, 2399.0)));
        assert!(!window.contains(Point::new(1080.0, 10.0)));
        assert!(!window.contains(Point::new(10.0, 2400.0)));
        assert!(!window.contains(Point::new(-1.0, 10.0)));
    }

    #[test]
    fn rect_center_and_origin() {
        let rect = Rect::new(10.0, 100.0, 200.0, 50.0);
        assert_eq!(rect.origin(), Point::new(10.0, 100.0));
        assert_eq!(rect.center_y(), 125.0);
        assert_eq!(rect.shifted_y(-100.0).center_y(), 25.0);
    }

    #[test]
    fn rect_clip_inside_image() {
        let rect = Rect::new(10.0, 20.0, 30.0, 40.0);
        assert_eq!(rect.clip_to(100, 100), Some((10, 20, 30, 40)));
    }

    #[test]
    fn rect_clip_partially_outside() {
        let rect = Rect::new(-5.0, 90.0, 20.0, 30.0);
        assert_eq!(rect.clip_to(100, 100), Some((0, 90, 15, 10)));
    }

    #[test]
    fn rect_clip_fully_outside() {
        let rect = Rect::new(150.0, 10.0, 20.0, 20.0);
        assert_eq!(rect.clip_to(100, 100), None);
    }

    #[test]
    fn handle_display_mentions_locator() {
        let handle = ElementHandle::new("00000000-0001", Locator::id("ok"));
        assert_eq!(handle.to_string(), "id=ok (00000000-0001)");
    }
}
