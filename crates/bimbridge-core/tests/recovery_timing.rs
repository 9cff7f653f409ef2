//! Recovery timing tests under paused tokio time.
//!
//! With jitter off, the waits are exact, so total elapsed virtual time
//! across an exhausted recovery equals the sum of the configured delays.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use bimbridge_core::recovery::{
    BackoffPolicy, ConnectionSupervisor, StreamError, StreamErrorKind, StreamRecovery,
};

fn spec_policy() -> BackoffPolicy {
    BackoffPolicy {
        initial_delay_ms: 100,
        multiplier: 2.0,
        max_delay_ms: 5_000,
        max_retries: 5,
        jitter: false,
    }
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_recovery_sleeps_exactly_the_delay_sequence() {
    let mut recovery = StreamRecovery::new("panel-log", spec_policy());
    let start = tokio::time::Instant::now();

    let err = recovery
        .read(|_offset| async {
            Err::<Vec<u8>, _>(StreamError::new(StreamErrorKind::Busy, "locked"))
        })
        .await
        .unwrap_err();

    // 100 + 200 + 400 + 800 + 1600 = 3100ms of virtual time.
    assert_eq!(start.elapsed().as_millis(), 3_100);
    let history = match err {
        bimbridge_core::RecoveryError::Exhausted { history, .. } => history,
        other => panic!("expected Exhausted, got {other:?}"),
    };
    let delays: Vec<u64> = history.iter().map(|a| a.delay_ms).collect();
    assert_eq!(delays, vec![100, 200, 400, 800, 1600]);
}

#[tokio::test(start_paused = true)]
async fn test_success_mid_sequence_stops_the_clock() {
    let calls = Arc::new(AtomicU32::new(0));
    let mut recovery = StreamRecovery::new("panel-log", spec_policy());
    let start = tokio::time::Instant::now();

    let calls_clone = Arc::clone(&calls);
    recovery
        .read(move |_offset| {
            let calls = Arc::clone(&calls_clone);
            async move {
                if calls.fetch_add(1, Ordering::Relaxed) < 2 {
                    Err(StreamError::new(StreamErrorKind::Busy, "locked"))
                } else {
                    Ok(b"row".to_vec())
                }
            }
        })
        .await
        .unwrap();

    // Two failures: slept 100 + 200 only.
    assert_eq!(start.elapsed().as_millis(), 300);
}

#[tokio::test(start_paused = true)]
async fn test_offset_survives_recovery_and_never_rewinds() {
    let calls = Arc::new(AtomicU32::new(0));
    let mut recovery = StreamRecovery::new("panel-log", spec_policy());

    // First read delivers 10 bytes.
    recovery
        .read(|offset| async move {
            assert_eq!(offset, 0);
            Ok(vec![0u8; 10])
        })
        .await
        .unwrap();
    assert_eq!(recovery.state().last_byte_offset, 10);

    // Second read fails twice, then resumes from offset 10 — the failed
    // attempts were also asked for offset 10, never earlier bytes.
    let calls_clone = Arc::clone(&calls);
    recovery
        .read(move |offset| {
            let calls = Arc::clone(&calls_clone);
            async move {
                assert_eq!(offset, 10, "re-read must resume from the offset");
                if calls.fetch_add(1, Ordering::Relaxed) < 2 {
                    Err(StreamError::new(
                        StreamErrorKind::SharingViolation,
                        "writer holds the tail",
                    ))
                } else {
                    Ok(vec![1u8; 5])
                }
            }
        })
        .await
        .unwrap();
    assert_eq!(recovery.state().last_byte_offset, 15);
}

#[tokio::test(start_paused = true)]
async fn test_supervisor_applies_same_policy_to_reconnect() {
    let (supervisor, _notifications) = ConnectionSupervisor::new(spec_policy());
    let start = tokio::time::Instant::now();

    let err = supervisor
        .reconnect("bridge", || async {
            Err::<(), _>(StreamError::new(
                StreamErrorKind::ResourceUnavailable,
                "endpoint down",
            ))
        })
        .await
        .unwrap_err();

    assert_eq!(start.elapsed().as_millis(), 3_100);
    assert!(matches!(
        err,
        bimbridge_core::RecoveryError::Exhausted { attempts: 5, .. }
    ));
}

#[tokio::test(start_paused = true)]
async fn test_independent_streams_do_not_interact() {
    let mut left = StreamRecovery::new("stream-a", spec_policy());
    let mut right = StreamRecovery::new("stream-b", spec_policy());

    left.read(|_| async { Ok(vec![0u8; 7]) }).await.unwrap();
    let _ = right
        .read(|_| async { Err::<Vec<u8>, _>(StreamError::new(StreamErrorKind::Corrupt, "bad")) })
        .await;

    assert_eq!(left.state().last_byte_offset, 7);
    assert_eq!(left.state().failure_count, 0);
    assert_eq!(right.state().last_byte_offset, 0);
}
