//! Error types surfaced by the readiness and visual-matching engines.
//!
//! Driver-level failures live in [`DriverError`](crate::driver::DriverError).
//! Every error in the crate classifies itself as [`ErrorKind::Retryable`]
//! (consumed as a failed poll attempt) or [`ErrorKind::Fatal`] (surfaced to
//! the caller), so retry decisions are made by matching on a type rather
//! than by swallowing everything.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::driver::DriverError;
use crate::locator::Locator;

/// Whether a failure may go away on its own by polling again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Transient: the element is not there yet, or a handle went stale.
    Retryable,
    /// Polling again will not help.
    Fatal,
}

/// Failure of [`ReadinessWaiter::ready_element`](crate::readiness::ReadinessWaiter::ready_element).
#[derive(Error, Debug)]
pub enum WaitError {
    /// No ready element was found within the budget.
    #[error(
        "Timeout after {}ms: element {locator} was not ready (budget {}ms per poll{})",
        .elapsed.as_millis(),
        .budget.as_millis(),
        escalation_note(.escalated)
    )]
    Timeout {
        /// The locator that never became ready.
        locator: Locator,
        /// The per-poll timeout budget.
        budget: Duration,
        /// Total time spent, including the escalation poll.
        elapsed: Duration,
        /// Whether the scroll escalation was attempted.
        escalated: bool,
    },

    /// The driver failed in a way polling cannot recover from.
    #[error("Driver error while waiting for {locator}: {source}")]
    Driver {
        locator: Locator,
        #[source]
        source: DriverError,
    },
}

fn escalation_note(escalated: &bool) -> &'static str {
    if *escalated {
        ", retried after scrolling"
    } else {
        ""
    }
}

impl WaitError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Fatal
    }

    /// Returns true if this is a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, WaitError::Timeout { .. })
    }
}

/// Failure of visual matching.
///
/// [`MatchError::Verification`] is the only variant that means "the screen
/// does not look right"; all other variants mean the comparison could not
/// be performed.
#[derive(Error, Debug)]
pub enum MatchError {
    /// The similarity score is below the acceptance threshold.
    #[error("Visual verification failed for '{reference}': score {score:.4} < threshold {threshold:.2}")]
    Verification {
        reference: String,
        score: f64,
        threshold: f64,
    },

    /// No reference image is stored under the requested name.
    #[error("Reference image not found: {}", .path.display())]
    ReferenceMissing { path: PathBuf },

    /// The reference name cannot be used as a file name.
    #[error("Invalid reference name '{0}'")]
    InvalidName(String),

    /// Image bytes could not be decoded or encoded.
    #[error("Image decode error: {0}")]
    Decode(String),

    /// The element's rectangle does not overlap the captured frame.
    #[error("Element region is empty after clipping to the {width}x{height} frame")]
    EmptyRegion { width: u32, height: u32 },

    /// Neither image fits inside the other.
    #[error("Cannot align {captured_width}x{captured_height} capture with {reference_width}x{reference_height} reference")]
    Dimensions {
        captured_width: u32,
        captured_height: u32,
        reference_width: u32,
        reference_height: u32,
    },

    /// The sliding search would take too long. Crop the capture to the
    /// region of interest first.
    #[error("Search of a {template_width}x{template_height} template over {alignments} alignments exceeds the work limit of {limit} pixel products; crop the capture first")]
    SearchTooLarge {
        template_width: u32,
        template_height: u32,
        alignments: u64,
        limit: u64,
    },

    /// Capturing the frame or reading the element's geometry failed.
    #[error("Capture failed: {0}")]
    Capture(#[from] DriverError),

    /// Reading or writing a reference file failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MatchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MatchError::Capture(e) => e.kind(),
            _ => ErrorKind::Fatal,
        }
    }

    /// Returns true if the comparison ran and the images did not match.
    pub fn is_verification(&self) -> bool {
        matches!(self, MatchError::Verification { .. })
    }
}

impl From<image::ImageError> for MatchError {
    fn from(e: image::ImageError) -> Self {
        MatchError::Decode(e.to_string())
    }
}
