use std::{sync::Arc, thread};

use crate::CompletionTracker;

#[test]
fn completes_once_per_cycle() {
    let tracker = CompletionTracker::new();
    let cycle = tracker.begin_cycle();
    assert_eq!(cycle, 1);

    // Not ready yet
    assert_eq!(tracker.try_complete(true), None);
    tracker.mark_ready();

    tracker.request_started();
    tracker.request_started();
    assert_eq!(tracker.try_complete(true), None);
    assert_eq!(tracker.request_finished(), 1);
    assert_eq!(tracker.request_finished(), 0);

    tracker.batch_started();
    assert_eq!(tracker.try_complete(true), None);
    assert_eq!(tracker.batch_finished(cycle), Some(0));

    // Something is still queued
    assert_eq!(tracker.try_complete(false), None);

    assert_eq!(tracker.try_complete(true), Some(cycle));
    assert_eq!(tracker.try_complete(true), None);
    assert!(tracker.is_completed());

    let next = tracker.begin_cycle();
    assert_eq!(next, 2);
    insta::assert_debug_snapshot!(tracker.snapshot(), @r"
    TrackerSnapshot {
        cycle: 2,
        outstanding_requests: 0,
        outstanding_batches: 0,
        ready: false,
        completed: false,
        skipped: 0,
    }
    ");
    tracker.mark_ready();
    assert_eq!(tracker.try_complete(true), Some(next));
}

#[test]
fn stale_batches_are_ignored() {
    let tracker = CompletionTracker::new();
    let old = tracker.begin_cycle();
    tracker.batch_started();

    let new = tracker.begin_cycle();
    tracker.batch_started();
    assert_eq!(tracker.batch_finished(old), None);
    assert_eq!(tracker.outstanding_batches(), 1);
    assert_eq!(tracker.batch_finished(new), Some(0));
}

#[test]
fn counters_never_underflow() {
    let tracker = CompletionTracker::new();
    let cycle = tracker.begin_cycle();
    assert_eq!(tracker.request_finished(), 0);
    assert_eq!(tracker.batch_finished(cycle), Some(0));
    assert_eq!(tracker.outstanding_requests(), 0);
    assert_eq!(tracker.outstanding_batches(), 0);
}

#[test]
fn skipped_accumulates_across_cycles() {
    let tracker = CompletionTracker::new();
    tracker.begin_cycle();
    tracker.record_skipped(2);
    tracker.begin_cycle();
    tracker.record_skipped(1);
    assert_eq!(tracker.skipped(), 3);
}

#[test]
fn concurrent_completion_fires_once() {
    let tracker = Arc::new(CompletionTracker::new());
    let cycle = tracker.begin_cycle();
    tracker.mark_ready();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let tracker = tracker.clone();
            thread::spawn(move || tracker.try_complete(true))
        })
        .collect();
    let completions: Vec<_> = handles
        .into_iter()
        .filter_map(|h| h.join().unwrap())
        .collect();
    assert_eq!(completions, vec![cycle]);
}
