//! App termination with ordered fallbacks.
//!
//! Killing an app between tests is unreliable across devices: the Appium
//! `terminateApp` command fails on some vendor builds, and `am force-stop`
//! needs the server's adb shell permission. An [`AppTerminator`] tries each
//! [`TerminationStrategy`] in order and stops at the first one that works.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::driver::{DriverError, MobileDriver};

/// Android keycode for the HOME button.
pub const HOME_KEYCODE: i32 = 3;

/// What a successful strategy observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// The app was running and has been stopped.
    Terminated,
    /// The app was installed but not running.
    NotRunning,
    /// The app is not installed; nothing to do.
    NotInstalled,
}

/// Errors from app lifecycle operations.
#[derive(Error, Debug)]
pub enum LifecycleError {
    /// Every configured strategy failed.
    #[error("Could not terminate {app}: {}", describe_failures(.failures))]
    Exhausted {
        app: String,
        /// Each strategy's name and the error it hit, in the order tried.
        failures: Vec<(&'static str, DriverError)>,
    },

    /// The terminator has no strategies.
    #[error("No termination strategies configured")]
    NoStrategies,
}

fn describe_failures(failures: &[(&'static str, DriverError)]) -> String {
    failures
        .iter()
        .map(|(name, e)| format!("{name}: {e}"))
        .collect::<Vec<_>>()
        .join("; ")
}

/// One way of stopping an app.
#[async_trait]
pub trait TerminationStrategy: Send + Sync {
    /// Short name used in logs and errors.
    fn name(&self) -> &'static str;

    async fn terminate(
        &self,
        driver: &dyn MobileDriver,
        app_id: &str,
    ) -> Result<Termination, DriverError>;
}

/// The driver's own terminate command. Skips apps that are not installed.
#[derive(Debug, Clone, Copy, Default)]
pub struct DriverTerminate;

#[async_trait]
impl TerminationStrategy for DriverTerminate {
    fn name(&self) -> &'static str {
        "terminate-app"
    }

    async fn terminate(
        &self,
        driver: &dyn MobileDriver,
        app_id: &str,
    ) -> Result<Termination, DriverError> {
        if !driver.is_app_installed(app_id).await? {
            return Ok(Termination::NotInstalled);
        }
        if driver.terminate_app(app_id).await? {
            Ok(Termination::Terminated)
        } else {
            Ok(Termination::NotRunning)
        }
    }
}

/// `am force-stop` through the device shell (Android only).
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellForceStop;

#[async_trait]
impl TerminationStrategy for ShellForceStop {
    fn name(&self) -> &'static str {
        "force-stop"
    }

    async fn terminate(
        &self,
        driver: &dyn MobileDriver,
        app_id: &str,
    ) -> Result<Termination, DriverError> {
        driver.shell(&format!("am force-stop {app_id}")).await?;
        Ok(Termination::Terminated)
    }
}

/// Result of one app in [`AppTerminator::terminate_all`].
#[derive(Debug)]
pub struct AppOutcome {
    pub app_id: String,
    pub result: Result<Termination, LifecycleError>,
}

/// Tries termination strategies in order.
pub struct AppTerminator {
    strategies: Vec<Box<dyn TerminationStrategy>>,
}

impl Default for AppTerminator {
    /// Driver terminate first, then shell force-stop.
    fn default() -> Self {
        Self::new(vec![Box::new(DriverTerminate), Box::new(ShellForceStop)])
    }
}

impl AppTerminator {
    pub fn new(strategies: Vec<Box<dyn TerminationStrategy>>) -> Self {
        Self { strategies }
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Stops `app_id` with the first strategy that succeeds.
    pub async fn terminate(
        &self,
        driver: &dyn MobileDriver,
        app_id: &str,
    ) -> Result<Termination, LifecycleError> {
        if self.strategies.is_empty() {
            return Err(LifecycleError::NoStrategies);
        }

        let mut failures = Vec::new();
        for strategy in &self.strategies {
            match strategy.terminate(driver, app_id).await {
                Ok(Termination::NotInstalled) => {
                    warn!(app = app_id, "app not installed, nothing to terminate");
                    return Ok(Termination::NotInstalled);
                }
                Ok(outcome) => {
                    info!(app = app_id, strategy = strategy.name(), ?outcome, "app terminated");
                    return Ok(outcome);
                }
                Err(e) => {
                    warn!(app = app_id, strategy = strategy.name(), error = %e, "termination strategy failed");
                    failures.push((strategy.name(), e));
                }
            }
        }
        Err(LifecycleError::Exhausted {
            app: app_id.to_string(),
            failures,
        })
    }

    /// Terminates every app in `apps`, continuing past failures, then
    /// optionally presses HOME. Never fails as a whole.
    pub async fn terminate_all(
        &self,
        driver: &dyn MobileDriver,
        apps: &[String],
        go_home: bool,
    ) -> Vec<AppOutcome> {
        let mut outcomes = Vec::with_capacity(apps.len());
        for app_id in apps {
            let result = self.terminate(driver, app_id).await;
            if let Err(e) = &result {
                warn!(app = %app_id, error = %e, "giving up on app");
            }
            outcomes.push(AppOutcome {
                app_id: app_id.clone(),
                result,
            });
        }

        if go_home {
            if let Err(e) = driver.press_keycode(HOME_KEYCODE).await {
                warn!(error = %e, "could not return to home screen");
            }
        }
        outcomes
    }
}
