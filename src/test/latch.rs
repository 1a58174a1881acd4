//! Test `CountingLatch` functionality

use crate::{CancelToken, CountingLatch, SyncError};
use std::thread;
use std::time::Duration;

#[test]
fn starts_up() {
    let latch = CountingLatch::new();
    assert_eq!(latch.count(), 0);
    assert!(latch.is_up());
    // Nothing outstanding, so a wait must not block
    latch.wait();
    assert!(latch.wait_timeout(Duration::from_millis(10)));
}

#[test]
fn up_at_zero_is_noop() {
    let latch = CountingLatch::new();
    assert!(!latch.up());
    assert_eq!(latch.count(), 0);
    latch.down();
    assert!(latch.up());
    assert!(!latch.up());
    assert_eq!(latch.count(), 0);
}

#[test]
fn counts_down_and_up() {
    let latch = CountingLatch::new();
    latch.down();
    latch.down();
    latch.down();
    assert_eq!(latch.count(), 3);
    assert!(!latch.is_up());
    assert!(latch.up());
    assert!(latch.up());
    assert_eq!(latch.count(), 1);
    assert!(latch.up());
    assert!(latch.is_up());
}

// Scenario from the original design: three down(), two up() -- a timed
// wait on another thread times out; after the third up() it succeeds.
#[test]
fn timed_wait_observes_third_up() {
    let latch = CountingLatch::new();
    latch.down();
    latch.down();
    latch.down();
    assert!(latch.up());
    assert!(latch.up());

    let l = latch.clone();
    let timed_out = thread::spawn(move || l.wait_timeout(Duration::from_millis(50)))
        .join()
        .unwrap();
    assert!(!timed_out);

    assert!(latch.up());
    let l = latch.clone();
    let reached = thread::spawn(move || l.wait_timeout(Duration::from_millis(50)))
        .join()
        .unwrap();
    assert!(reached);
}

#[test]
fn wait_blocks_until_zero() {
    let latch = CountingLatch::new();
    latch.down();
    let l = latch.clone();
    let signaller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        l.up();
    });
    latch.wait();
    assert!(latch.is_up());
    signaller.join().unwrap();
}

#[test]
fn releases_all_waiters() {
    let latch = CountingLatch::new();
    latch.down();
    let mut waiters = Vec::new();
    for _ in 0..4 {
        let l = latch.clone();
        waiters.push(thread::spawn(move || {
            l.wait_timeout(Duration::from_secs(5))
        }));
    }
    thread::sleep(Duration::from_millis(20));
    latch.up();
    for w in waiters {
        assert!(w.join().unwrap());
    }
}

#[test]
fn rearms_after_zero() {
    let latch = CountingLatch::new();
    latch.down();
    latch.up();
    assert!(latch.is_up());

    // A fresh cycle on the same latch
    latch.down();
    assert!(!latch.wait_timeout(Duration::from_millis(20)));
    latch.up();
    assert!(latch.wait_timeout(Duration::from_millis(20)));
}

#[test]
fn concurrent_down_up_balances() {
    let latch = CountingLatch::new();
    let mut threads = Vec::new();
    for _ in 0..8 {
        let l = latch.clone();
        threads.push(thread::spawn(move || {
            for _ in 0..1000 {
                l.down();
                l.up();
            }
        }));
    }
    for t in threads {
        t.join().unwrap();
    }
    assert_eq!(latch.count(), 0);
    assert!(latch.wait_timeout(Duration::from_secs(5)));
}

#[test]
fn cancel_fails_waiter() {
    let latch = CountingLatch::new();
    latch.down();
    let token = CancelToken::new();
    let t = token.clone();
    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        t.cancel_with("stop waiting");
    });
    match latch.wait_cancellable(&token) {
        Err(SyncError::Cancelled(reason)) => assert_eq!(&*reason, "stop waiting"),
        other => panic!("Expected cancellation, got {:?}", other),
    }
    // The latch itself is untouched by the cancellation
    assert_eq!(latch.count(), 1);
    canceller.join().unwrap();
}

#[test]
fn cancelled_token_fails_immediately() {
    let latch = CountingLatch::new();
    latch.down();
    let token = CancelToken::new();
    token.cancel();
    assert!(matches!(
        latch.wait_cancellable(&token),
        Err(SyncError::Cancelled(_))
    ));
    assert!(matches!(
        latch.wait_timeout_cancellable(&token, Duration::from_secs(5)),
        Err(SyncError::Cancelled(_))
    ));
}

#[test]
fn timed_cancellable_distinguishes_outcomes() {
    let latch = CountingLatch::new();
    let token = CancelToken::new();

    // Zero already: success
    assert!(latch
        .wait_timeout_cancellable(&token, Duration::from_millis(20))
        .unwrap());

    // Outstanding work: timeout, not an error
    latch.down();
    assert!(!latch
        .wait_timeout_cancellable(&token, Duration::from_millis(20))
        .unwrap());

    // Cancelled mid-wait: an error, not a timeout
    let t = token.clone();
    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        t.cancel();
    });
    assert!(matches!(
        latch.wait_timeout_cancellable(&token, Duration::from_secs(5)),
        Err(SyncError::Cancelled(_))
    ));
    canceller.join().unwrap();
}
