use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

/// Identifies one fetch cycle, a new one starts every time the query center moves.
pub type CycleId = u64;

/// Tracks when every feature visible from the current query center has been
/// fetched and parsed.
///
/// A cycle is complete once the area query is ready, no fetch is outstanding,
/// no deserialization batch is running and the pending queue is empty.
/// Completion is reported at most once per cycle.
#[derive(Debug, Default)]
pub struct CompletionTracker {
    cycle: AtomicU64,
    requests: AtomicUsize,
    batches: AtomicUsize,
    ready: AtomicBool,
    completed: AtomicBool,
    skipped: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerSnapshot {
    pub cycle: CycleId,
    pub outstanding_requests: usize,
    pub outstanding_batches: usize,
    pub ready: bool,
    pub completed: bool,
    pub skipped: u64,
}

impl CompletionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new cycle and reset every counter of the previous one.
    pub fn begin_cycle(&self) -> CycleId {
        self.requests.store(0, Ordering::SeqCst);
        self.batches.store(0, Ordering::SeqCst);
        self.ready.store(false, Ordering::SeqCst);
        self.completed.store(false, Ordering::SeqCst);
        self.cycle.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn cycle(&self) -> CycleId {
        self.cycle.load(Ordering::SeqCst)
    }

    pub fn request_started(&self) -> usize {
        self.requests.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Returns the number of requests still outstanding.
    pub fn request_finished(&self) -> usize {
        saturating_decrement(&self.requests)
    }

    pub fn outstanding_requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn batch_started(&self) -> usize {
        self.batches.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Returns the number of batches still running, or `None` if the batch
    /// belongs to a previous cycle and was not counted.
    pub fn batch_finished(&self, cycle: CycleId) -> Option<usize> {
        if cycle != self.cycle() {
            return None;
        }
        Some(saturating_decrement(&self.batches))
    }

    pub fn outstanding_batches(&self) -> usize {
        self.batches.load(Ordering::SeqCst)
    }

    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn record_skipped(&self, n: u64) {
        self.skipped.fetch_add(n, Ordering::SeqCst);
    }

    /// Total payloads that failed to deserialize, across every cycle.
    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::SeqCst)
    }

    /// Returns the cycle if it just completed. Only the first caller to observe
    /// a complete cycle gets it.
    pub fn try_complete(&self, queue_is_empty: bool) -> Option<CycleId> {
        let done = queue_is_empty
            && self.is_ready()
            && self.outstanding_requests() == 0
            && self.outstanding_batches() == 0;
        if !done {
            return None;
        }
        self.completed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| self.cycle())
    }

    pub fn snapshot(&self) -> TrackerSnapshot {
        TrackerSnapshot {
            cycle: self.cycle(),
            outstanding_requests: self.outstanding_requests(),
            outstanding_batches: self.outstanding_batches(),
            ready: self.is_ready(),
            completed: self.is_completed(),
            skipped: self.skipped(),
        }
    }
}

fn saturating_decrement(counter: &AtomicUsize) -> usize {
    match counter.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)) {
        Ok(previous) => previous - 1,
        Err(_) => 0,
    }
}
