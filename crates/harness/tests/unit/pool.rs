//! # Task Group Tests
//!
//! Bounded concurrency, input-ordered results, join before return.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use rvconform_core::dispatch::{CancellationToken, TaskGroup};

fn group(workers: usize) -> TaskGroup {
    TaskGroup::new(NonZeroUsize::new(workers).unwrap())
}

#[test]
fn results_follow_input_order() {
    let items: Vec<u64> = (0..32).collect();
    let results = group(4).run(&items, |&n| {
        // Later items finish first.
        thread::sleep(Duration::from_millis(32 - n));
        n * 10
    });
    assert_eq!(results, items.iter().map(|n| n * 10).collect::<Vec<_>>());
}

#[test]
fn concurrency_never_exceeds_worker_count() {
    let active = AtomicUsize::new(0);
    let peak = AtomicUsize::new(0);
    let items: Vec<usize> = (0..24).collect();

    let _ = group(3).run(&items, |_| {
        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
        let _ = peak.fetch_max(now, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(5));
        let _ = active.fetch_sub(1, Ordering::SeqCst);
    });

    assert!(peak.load(Ordering::SeqCst) <= 3);
    assert_eq!(active.load(Ordering::SeqCst), 0);
}

#[test]
fn every_item_runs_exactly_once() {
    let calls = AtomicUsize::new(0);
    let items: Vec<usize> = (0..100).collect();
    let results = group(8).run(&items, |&n| {
        let _ = calls.fetch_add(1, Ordering::SeqCst);
        n
    });
    assert_eq!(calls.load(Ordering::SeqCst), 100);
    assert_eq!(results.len(), 100);
}

#[test]
fn empty_batch_returns_immediately() {
    let results: Vec<u8> = group(2).run(&[] as &[u8], |&b| b);
    assert!(results.is_empty());
}

#[test]
fn default_uses_available_parallelism() {
    let expected = thread::available_parallelism().map_or(1, NonZeroUsize::get);
    assert_eq!(TaskGroup::default().workers(), expected);
}

#[test]
fn cancellation_is_shared_between_clones() {
    let token = CancellationToken::new();
    let clone = token.clone();
    assert!(!clone.is_cancelled());
    token.cancel();
    token.cancel();
    assert!(clone.is_cancelled());
}
