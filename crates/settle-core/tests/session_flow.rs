//! End-to-end flow tests for settle-core.
//!
//! These tests drive a [`SessionContext`] against the in-memory
//! [`ScreenDriver`]: wait for an element, tap it, capture a reference image
//! and verify the screen against it, including the scroll corrections in
//! between.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{session, Paint, ScreenDriver, Widget, SCREEN_HEIGHT, SCREEN_WIDTH};
use settle_core::driver::MobileDriver;
use settle_core::element::{Rect, ScrollDirection};
use settle_core::error::{MatchError, WaitError};
use settle_core::locator::Locator;
use settle_core::policy::ReadinessPolicy;
use settle_core::visual::{CaptureSource, DEFAULT_THRESHOLD};

const OK_BUTTON: &str = "android:id/button1";
const FULL_MOON: Paint = Paint::Moon {
    radius: 40.0,
    shadow: 1000.0,
};
const CRESCENT: Paint = Paint::Moon {
    radius: 40.0,
    shadow: 20.0,
};

// =============================================================================
// 1. Wait, tap, capture and verify
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_wait_tap_and_verify_moon_phase() {
    let dir = tempfile::tempdir().unwrap();
    let driver = Arc::new(
        ScreenDriver::new(200.0)
            .with_widget(
                OK_BUTTON,
                Widget::new(Rect::new(100.0, 400.0, 200.0, 80.0), Paint::Solid(180))
                    .appearing_after(2),
            )
            .with_widget("moon", Widget::new(Rect::new(100.0, 40.0, 200.0, 100.0), FULL_MOON)),
    );
    let session = session(&driver, dir.path());

    // The dialog button shows up on the third lookup and is already in band.
    let button = session
        .ready_element(&Locator::id(OK_BUTTON), None)
        .await
        .unwrap();
    session.driver().click(&button).await.unwrap();
    assert_eq!(driver.screen().clicks, vec![OK_BUTTON]);
    assert!(driver.screen().gestures.is_empty());

    // The moon sits under the status bar and needs one corrective scroll.
    let moon = session
        .ready_element(&Locator::accessibility_id("moon"), None)
        .await
        .unwrap();
    assert_eq!(moon.id, "moon@1", "handle should be re-resolved after scrolling");
    {
        let screen = driver.screen();
        assert_eq!(screen.gestures.len(), 1);
        assert_eq!(screen.gestures[0].direction, ScrollDirection::Down);
        assert_eq!(screen.gestures[0].percent, 0.7);
        assert_eq!(screen.widgets["moon"].rect.y, 240.0);
    }

    let saved = session.capture_reference(&moon, "full moon").await.unwrap();
    assert!(saved.ends_with("full moon.png"));
    assert_eq!(session.references().list().unwrap(), vec!["full moon"]);

    let result = session
        .visual_match(CaptureSource::Element(&moon), "full moon", None)
        .await
        .unwrap();
    assert!(result.passed);
    assert!((result.score - 1.0).abs() < 1e-9, "score {}", result.score);

    // The phase changes; the soft comparison reports it, the hard one fails.
    driver.repaint("moon", CRESCENT);
    let soft = session
        .matcher()
        .compare(CaptureSource::Element(&moon), "full moon", DEFAULT_THRESHOLD)
        .await
        .unwrap();
    assert!(!soft.passed, "score {}", soft.score);

    let err = session
        .visual_match(CaptureSource::Element(&moon), "full moon", None)
        .await
        .unwrap_err();
    match err {
        MatchError::Verification {
            reference,
            score,
            threshold,
        } => {
            assert_eq!(reference, "full moon");
            assert_eq!(threshold, DEFAULT_THRESHOLD);
            assert!(score < threshold);
            assert_eq!(score, soft.score);
        }
        other => panic!("Expected verification failure, got {:?}", other),
    }
}

// =============================================================================
// 2. Escalation scroll brings an off-screen element in
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_offscreen_element_found_after_escalation() {
    let dir = tempfile::tempdir().unwrap();
    let driver = Arc::new(ScreenDriver::new(200.0).with_widget(
        "history",
        Widget::new(Rect::new(0.0, -150.0, 400.0, 100.0), Paint::Solid(90)),
    ));
    let session = session(&driver, dir.path())
        .with_policy(ReadinessPolicy::default().with_timeout(Duration::from_secs(1)));

    let start = tokio::time::Instant::now();
    let history = session
        .ready_element(&Locator::id("history"), None)
        .await
        .unwrap();

    assert!(start.elapsed() >= Duration::from_secs(1));
    assert_eq!(history.id, "history@2");
    let screen = driver.screen();
    let percents: Vec<f64> = screen.gestures.iter().map(|g| g.percent).collect();
    assert_eq!(percents, vec![0.8, 0.7], "escalation, then band correction");
    assert!(screen
        .gestures
        .iter()
        .all(|g| g.direction == ScrollDirection::Down));
    assert_eq!(screen.widgets["history"].rect.y, 250.0);
    assert!(screen.keyboard_dismissals >= 1);
}

// =============================================================================
// 3. Timeouts name the locator
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_missing_element_times_out_without_scrolling() {
    let dir = tempfile::tempdir().unwrap();
    let driver = Arc::new(ScreenDriver::new(200.0));
    let session = session(&driver, dir.path());
    let policy = ReadinessPolicy::default()
        .with_timeout(Duration::from_secs(2))
        .with_allow_scroll(false);

    let err = session
        .ready_element(&Locator::id("android:id/alertTitle"), Some(&policy))
        .await
        .unwrap_err();

    assert!(matches!(err, WaitError::Timeout { escalated: false, .. }));
    let msg = err.to_string();
    assert!(msg.contains("android:id/alertTitle"), "{msg}");
    assert!(msg.contains("budget 2000ms"), "{msg}");
    assert!(driver.screen().gestures.is_empty());
}

// =============================================================================
// 4. Failure artifacts and teardown
// =============================================================================

#[tokio::test]
async fn test_failure_artifacts_and_teardown() {
    let dir = tempfile::tempdir().unwrap();
    let driver = Arc::new(ScreenDriver::new(200.0).with_widget(
        "moon",
        Widget::new(Rect::new(100.0, 300.0, 200.0, 100.0), FULL_MOON),
    ));
    let session = session(&driver, dir.path());

    let artifacts = session
        .save_failure_artifacts(&dir.path().join("failures"), "moon phase/full")
        .await
        .unwrap();

    let screenshot = image::open(artifacts.screenshot.unwrap()).unwrap();
    assert_eq!(screenshot.width(), SCREEN_WIDTH);
    assert_eq!(screenshot.height(), SCREEN_HEIGHT);
    let source = std::fs::read_to_string(artifacts.page_source.unwrap()).unwrap();
    assert!(source.contains("resource-id=\"moon\""));

    session.teardown().await.unwrap();
    assert!(driver.screen().quit);
}
