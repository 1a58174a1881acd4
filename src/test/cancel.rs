//! Test `CancelToken` functionality

use crate::{CancelToken, CountingLatch, SyncError};
use std::thread;
use std::time::Duration;

#[test]
fn fresh_token_not_cancelled() {
    let token = CancelToken::new();
    assert!(!token.is_cancelled());
}

#[test]
fn cancel_is_sticky() {
    let token = CancelToken::new();
    token.cancel();
    assert!(token.is_cancelled());
    token.cancel();
    assert!(token.is_cancelled());
}

#[test]
fn first_reason_sticks() {
    let latch = CountingLatch::new();
    latch.down();
    let token = CancelToken::new();
    token.cancel_with("first");
    token.cancel_with("second");
    match latch.wait_cancellable(&token) {
        Err(SyncError::Cancelled(reason)) => assert_eq!(&*reason, "first"),
        other => panic!("Expected cancellation, got {:?}", other),
    }
}

#[test]
fn clones_share_state() {
    let token = CancelToken::new();
    let clone = token.clone();
    clone.cancel_with("via clone");
    assert!(token.is_cancelled());
}

#[test]
fn cancel_wakes_many_waiters() {
    let latch = CountingLatch::new();
    latch.down();
    let token = CancelToken::new();
    let mut waiters = Vec::new();
    for _ in 0..4 {
        let l = latch.clone();
        let t = token.clone();
        waiters.push(thread::spawn(move || l.wait_cancellable(&t)));
    }
    thread::sleep(Duration::from_millis(50));
    token.cancel();
    for w in waiters {
        assert!(matches!(w.join().unwrap(), Err(SyncError::Cancelled(_))));
    }
}

// A wait that ends normally must deregister its wake hook, so a later
// cancellation has nobody left to wake.
#[test]
fn finished_wait_deregisters() {
    let latch = CountingLatch::new();
    let token = CancelToken::new();
    latch.down();
    latch.up();
    latch.wait_cancellable(&token).unwrap();
    token.cancel();
    assert!(token.is_cancelled());
}
