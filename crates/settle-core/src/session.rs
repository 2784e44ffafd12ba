//! Per-run session context.
//!
//! A [`SessionContext`] owns the driver session for one test run and bundles
//! the readiness waiter, the visual matcher, the reference store and the app
//! terminator around it. It is created once, passed by reference to the
//! code that needs it and closed with an explicit [`teardown`]. There is no
//! global driver.
//!
//! [`teardown`]: SessionContext::teardown

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::appium::AppiumDriver;
use crate::config::{ConfigError, HarnessConfig};
use crate::driver::{DriverError, MobileDriver};
use crate::element::ElementHandle;
use crate::error::{MatchError, WaitError};
use crate::lifecycle::{AppOutcome, AppTerminator};
use crate::locator::Locator;
use crate::policy::ReadinessPolicy;
use crate::readiness::ReadinessWaiter;
use crate::reference::ReferenceStore;
use crate::visual::{CaptureSource, MatchResult, VisualMatcher, DEFAULT_THRESHOLD};

/// Errors from starting, tearing down or inspecting a session.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Files written by [`SessionContext::save_failure_artifacts`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct FailureArtifacts {
    pub screenshot: Option<PathBuf>,
    pub page_source: Option<PathBuf>,
}

/// State for one automation run.
pub struct SessionContext {
    /// The unique identifier for this run.
    pub id: Uuid,
    /// When the session was opened.
    pub started_at: DateTime<Utc>,
    driver: Arc<dyn MobileDriver>,
    config: HarnessConfig,
    policy: ReadinessPolicy,
    waiter: ReadinessWaiter,
    matcher: VisualMatcher,
    terminator: AppTerminator,
}

impl SessionContext {
    /// Loads capabilities and opens an Appium session.
    pub async fn start(config: HarnessConfig) -> Result<Self, SessionError> {
        let capabilities = config.load_capabilities()?;
        let driver = AppiumDriver::new(&config.server_url, config.platform)?;
        driver.start_session(capabilities).await?;
        Ok(Self::with_driver(Arc::new(driver), config))
    }

    /// Wraps an already-connected driver.
    pub fn with_driver(driver: Arc<dyn MobileDriver>, config: HarnessConfig) -> Self {
        let policy = config.policy();
        let references = ReferenceStore::new(config.reference_dir.clone());
        let context = Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            waiter: ReadinessWaiter::new(driver.clone()),
            matcher: VisualMatcher::new(driver.clone(), references),
            terminator: AppTerminator::default(),
            driver,
            config,
            policy,
        };
        info!(session = %context.id, platform = %context.config.platform, "session started");
        context
    }

    /// Replaces the default readiness policy.
    #[must_use]
    pub fn with_policy(mut self, policy: ReadinessPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Replaces the app termination chain.
    #[must_use]
    pub fn with_terminator(mut self, terminator: AppTerminator) -> Self {
        self.terminator = terminator;
        self
    }

    /// The driver, for direct interaction (click, type, ...).
    pub fn driver(&self) -> &dyn MobileDriver {
        self.driver.as_ref()
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn policy(&self) -> &ReadinessPolicy {
        &self.policy
    }

    pub fn references(&self) -> &ReferenceStore {
        self.matcher.references()
    }

    pub fn matcher(&self) -> &VisualMatcher {
        &self.matcher
    }

    /// Waits for `locator` to be ready, using the session policy unless
    /// `policy` overrides it.
    pub async fn ready_element(
        &self,
        locator: &Locator,
        policy: Option<&ReadinessPolicy>,
    ) -> Result<ElementHandle, WaitError> {
        self.waiter
            .ready_element(locator, policy.unwrap_or(&self.policy))
            .await
    }

    /// Verifies that `source` matches the named reference. A score below the
    /// threshold (default 0.8) is a [`MatchError::Verification`].
    pub async fn visual_match(
        &self,
        source: CaptureSource<'_>,
        reference: &str,
        threshold: Option<f64>,
    ) -> Result<MatchResult, MatchError> {
        self.matcher
            .verify(source, reference, threshold.unwrap_or(DEFAULT_THRESHOLD))
            .await
    }

    /// Stores the element's current appearance as a reference image.
    pub async fn capture_reference(
        &self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<PathBuf, MatchError> {
        self.references()
            .capture(self.driver.as_ref(), element, name)
            .await
    }

    /// Terminates apps with the configured fallback chain. Never fails.
    pub async fn terminate_apps(&self, apps: &[String], go_home: bool) -> Vec<AppOutcome> {
        self.terminator
            .terminate_all(self.driver.as_ref(), apps, go_home)
            .await
    }

    /// Saves a screenshot and the page source for a failed test under
    /// `dir`. Each artifact is best effort; only failing to create `dir` is
    /// an error.
    pub async fn save_failure_artifacts(
        &self,
        dir: &Path,
        test_name: &str,
    ) -> Result<FailureArtifacts, SessionError> {
        std::fs::create_dir_all(dir)?;
        let stem = format!(
            "{}-{}",
            sanitize_file_stem(test_name),
            Utc::now().format("%Y%m%d_%H%M%S")
        );
        let mut artifacts = FailureArtifacts::default();

        match self.driver.capture_frame().await {
            Ok(png) => {
                let path = dir.join(format!("{stem}.png"));
                match std::fs::write(&path, png) {
                    Ok(()) => artifacts.screenshot = Some(path),
                    Err(e) => warn!(error = %e, "could not write failure screenshot"),
                }
            }
            Err(e) => warn!(error = %e, "could not capture failure screenshot"),
        }

        match self.driver.page_source().await {
            Ok(source) => {
                let path = dir.join(format!("{stem}.xml"));
                match std::fs::write(&path, source) {
                    Ok(()) => artifacts.page_source = Some(path),
                    Err(e) => warn!(error = %e, "could not write page source"),
                }
            }
            Err(e) => warn!(error = %e, "could not read page source"),
        }

        info!(test = test_name, ?artifacts, "saved failure artifacts");
        Ok(artifacts)
    }

    /// Ends the driver session.
    pub async fn teardown(self) -> Result<(), SessionError> {
        let duration = Utc::now() - self.started_at;
        self.driver.quit().await?;
        info!(
            session = %self.id,
            duration_ms = duration.num_milliseconds(),
            "session closed"
        );
        Ok(())
    }
}

/// Replaces characters that are awkward in file names.
fn sanitize_file_stem(name: &str) -> String {
    let stem: String = name
        .chars()
        .map(|c| if c.is_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
        .collect();
    if stem.is_empty() {
        "test".to_string()
    } else {
        stem
    }
}
