//! Scripted in-memory driver for unit tests.

use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::driver::{DriverError, MobileDriver};
use crate::element::{ElementHandle, Point, Rect, ScrollDirection, ScrollGesture, WindowSize};
use crate::locator::Locator;

/// A scripted failure, converted into a fresh [`DriverError`] when replayed.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Fail {
    NotFound,
    Stale,
    /// A hiccup on the server side that goes away on its own.
    Transient,
    Fatal,
}

impl Fail {
    fn into_error(self, what: &str) -> DriverError {
        match self {
            Fail::NotFound => DriverError::NoSuchElement(what.to_string()),
            Fail::Stale => DriverError::StaleElement(what.to_string()),
            Fail::Transient => DriverError::CommandFailed(format!("unknown error: {what}")),
            Fail::Fatal => DriverError::ConnectionLost(format!("{what}: session gone")),
        }
    }
}

pub(crate) struct MockState {
    /// Failures replayed by `resolve` before it starts succeeding.
    pub resolve_failures: VecDeque<Fail>,
    /// When false, `resolve` always reports not-found.
    pub resolvable: bool,
    pub displayed: bool,
    /// Failures replayed by `is_displayed` before it reports `displayed`.
    pub displayed_failures: VecDeque<Fail>,
    pub enabled: bool,
    pub rect: Rect,
    /// Scripted `location` results; falls back to the rect origin when empty.
    pub locations: VecDeque<Result<Point, Fail>>,
    pub window: WindowSize,
    /// How far the element moves per gesture (`down` moves it down).
    pub gesture_shift: f64,
    pub fail_gestures: bool,
    pub frame: Vec<u8>,
    pub fail_hide_keyboard: bool,
    pub not_installed: HashSet<String>,
    pub fail_terminate: bool,
    pub fail_shell: bool,
    pub fail_keycode: bool,

    pub gestures: Vec<ScrollGesture>,
    pub resolve_count: u32,
    pub hide_keyboard_calls: u32,
    pub native_context_calls: u32,
    pub terminated: Vec<String>,
    pub shell_commands: Vec<String>,
    pub keycodes: Vec<i32>,
    pub actions: Vec<String>,
    pub quit_calls: u32,
}

pub(crate) struct MockDriver {
    state: Mutex<MockState>,
}

impl MockDriver {
    /// A 1000x1000 viewport with one ready element whose center (y=550) is
    /// inside the default safe band.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                resolve_failures: VecDeque::new(),
                resolvable: true,
                displayed: true,
                displayed_failures: VecDeque::new(),
                enabled: true,
                rect: Rect::new(100.0, 500.0, 200.0, 100.0),
                locations: VecDeque::new(),
                window: WindowSize::new(1000.0, 1000.0),
                gesture_shift: 0.0,
                fail_gestures: false,
                frame: Vec::new(),
                fail_hide_keyboard: false,
                not_installed: HashSet::new(),
                fail_terminate: false,
                fail_shell: false,
                fail_keycode: false,
                gestures: Vec::new(),
                resolve_count: 0,
                hide_keyboard_calls: 0,
                native_context_calls: 0,
                terminated: Vec::new(),
                shell_commands: Vec::new(),
                keycodes: Vec::new(),
                actions: Vec::new(),
                quit_calls: 0,
            }),
        }
    }

    pub fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    pub fn gestures(&self) -> Vec<ScrollGesture> {
        self.state().gestures.clone()
    }
}

#[async_trait]
impl MobileDriver for MockDriver {
    async fn resolve(&self, locator: &Locator) -> Result<ElementHandle, DriverError> {
        let mut s = self.state();
        s.resolve_count += 1;
        if let Some(fail) = s.resolve_failures.pop_front() {
            return Err(fail.into_error(&locator.to_string()));
        }
        if !s.resolvable {
            return Err(Fail::NotFound.into_error(&locator.to_string()));
        }
        Ok(ElementHandle::new(format!("el-{}", s.resolve_count), locator.clone()))
    }

    async fn is_displayed(&self, element: &ElementHandle) -> Result<bool, DriverError> {
        let mut s = self.state();
        if let Some(fail) = s.displayed_failures.pop_front() {
            return Err(fail.into_error(&element.to_string()));
        }
        Ok(s.displayed)
    }

    async fn is_enabled(&self, _element: &ElementHandle) -> Result<bool, DriverError> {
        Ok(self.state().enabled)
    }

    async fn rect(&self, _element: &ElementHandle) -> Result<Rect, DriverError> {
        Ok(self.state().rect)
    }

    async fn location(&self, element: &ElementHandle) -> Result<Point, DriverError> {
        let mut s = self.state();
        match s.locations.pop_front() {
            Some(next) => next.map_err(|f| f.into_error(&element.id)),
            None => Ok(s.rect.origin()),
        }
    }

    async fn window_size(&self) -> Result<WindowSize, DriverError> {
        Ok(self.state().window)
    }

    async fn scroll_gesture(&self, gesture: &ScrollGesture) -> Result<(), DriverError> {
        let mut s = self.state();
        s.gestures.push(*gesture);
        if s.fail_gestures {
            return Err(DriverError::CommandFailed("gesture rejected".to_string()));
        }
        let shift = s.gesture_shift;
        s.rect = match gesture.direction {
            ScrollDirection::Down => s.rect.shifted_y(shift),
            ScrollDirection::Up => s.rect.shifted_y(-shift),
        };
        Ok(())
    }

    async fn capture_frame(&self) -> Result<Vec<u8>, DriverError> {
        Ok(self.state().frame.clone())
    }

    async fn hide_soft_input(&self) -> Result<(), DriverError> {
        let mut s = self.state();
        s.hide_keyboard_calls += 1;
        if s.fail_hide_keyboard {
            return Err(DriverError::CommandFailed("keyboard not shown".to_string()));
        }
        Ok(())
    }

    async fn click(&self, element: &ElementHandle) -> Result<(), DriverError> {
        self.state().actions.push(format!("click {}", element.id));
        Ok(())
    }

    async fn send_keys(&self, element: &ElementHandle, text: &str) -> Result<(), DriverError> {
        self.state().actions.push(format!("keys {} {}", element.id, text));
        Ok(())
    }

    async fn clear(&self, element: &ElementHandle) -> Result<(), DriverError> {
        self.state().actions.push(format!("clear {}", element.id));
        Ok(())
    }

    async fn page_source(&self) -> Result<String, DriverError> {
        Ok("<hierarchy rotation=\"0\"/>".to_string())
    }

    async fn ensure_native_context(&self) -> Result<(), DriverError> {
        self.state().native_context_calls += 1;
        Ok(())
    }

    async fn is_app_installed(&self, app_id: &str) -> Result<bool, DriverError> {
        Ok(!self.state().not_installed.contains(app_id))
    }

    async fn terminate_app(&self, app_id: &str) -> Result<bool, DriverError> {
        let mut s = self.state();
        if s.fail_terminate {
            return Err(DriverError::CommandFailed(format!("cannot terminate {app_id}")));
        }
        s.terminated.push(app_id.to_string());
        Ok(true)
    }

    async fn shell(&self, command: &str) -> Result<String, DriverError> {
        let mut s = self.state();
        if s.fail_shell {
            return Err(DriverError::CommandFailed("adb shell disabled".to_string()));
        }
        s.shell_commands.push(command.to_string());
        Ok(String::new())
    }

    async fn press_keycode(&self, keycode: i32) -> Result<(), DriverError> {
        let mut s = self.state();
        if s.fail_keycode {
            return Err(DriverError::Unsupported("press_keycode"));
        }
        s.keycodes.push(keycode);
        Ok(())
    }

    async fn quit(&self) -> Result<(), DriverError> {
        self.state().quit_calls += 1;
        Ok(())
    }
}
