#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! Readiness gate behaviour under a paused clock.

use std::time::Duration;

use realtime_relay::{ReadinessConfig, ReadinessGate, ReadinessState};

fn gate() -> ReadinessGate {
    ReadinessGate::new(ReadinessConfig::default())
}

#[tokio::test(start_paused = true)]
async fn guest_waiter_resolves_on_fallback() {
    let gate = gate();
    let publisher = gate.clone();
    let waiter = tokio::spawn(async move { gate.wait_ready(false).await });
    tokio::time::sleep(Duration::from_secs(3)).await;
    publisher.set_state(ReadinessState::Fallback);
    waiter.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn user_waiter_ignores_guest_and_times_out() {
    let gate = gate();
    let publisher = gate.clone();
    let start = tokio::time::Instant::now();
    let waiter = tokio::spawn(async move { gate.wait_ready(true).await });
    publisher.set_state(ReadinessState::Guest);
    let err = waiter.await.unwrap().unwrap_err();
    assert_eq!(err.code(), "READINESS_TIMEOUT");
    assert!(err.remediation().is_some());
    assert!(start.elapsed() >= Duration::from_secs(15));
}

#[tokio::test(start_paused = true)]
async fn guest_waiter_times_out_after_ten_seconds() {
    let gate = gate();
    let start = tokio::time::Instant::now();
    let err = gate.wait_ready(false).await.unwrap_err();
    assert_eq!(err.code(), "READINESS_TIMEOUT");
    let waited = start.elapsed();
    assert!(waited >= Duration::from_secs(10) && waited < Duration::from_secs(15));
}

#[tokio::test(start_paused = true)]
async fn missing_credential_rejects_pending_waiters() {
    let gate = gate();
    let publisher = gate.clone();
    let waiter = tokio::spawn(async move { gate.wait_ready(false).await });
    tokio::task::yield_now().await;
    publisher.set_state(ReadinessState::None);
    let err = waiter.await.unwrap().unwrap_err();
    assert_eq!(err.code(), "READINESS_UNAVAILABLE");
    assert!(err.message().contains("missing"));
}

#[tokio::test]
async fn state_changes_are_visible_to_clones() {
    let gate = gate();
    let other = gate.clone();
    gate.set_state(ReadinessState::User);
    assert_eq!(other.state(), ReadinessState::User);
    other.wait_ready(true).await.unwrap();
}
