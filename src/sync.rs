use std::{
    collections::HashSet,
    mem,
    sync::Arc,
    time::{Duration, Instant},
};

use crossbeam::channel::{Receiver, RecvTimeoutError, Sender};
use steppe::Progress;
use tracing::{debug, error, info, warn};

use crate::{
    Result, SyncConfig,
    backend::{Backend, Event, EventSink},
    feature::{Feature, Location},
    import::{ImportReport, import_all},
    query::QueryEvent,
    tracker::{CompletionTracker, CycleId},
};

/// What flows through the controller's channel: the backend's events and the
/// results of the deserialization batches.
#[derive(Debug)]
pub(crate) enum Message {
    Backend(Event),
    Parsed {
        key: String,
        feature: Box<Feature>,
    },
    BatchDone {
        cycle: CycleId,
        skipped: u64,
    },
}

type FeatureFound = Box<dyn FnMut(Feature) + Send>;
type FeatureLeft = Box<dyn FnMut(&str) + Send>;
type DoneFetching = Box<dyn FnMut(CycleId) + Send>;

/// The callbacks the surrounding application plugs into the controller.
/// They are always called from the thread driving the controller.
pub struct Handlers {
    feature_found: FeatureFound,
    feature_left: FeatureLeft,
    done_fetching: DoneFetching,
}

impl Default for Handlers {
    fn default() -> Self {
        Self {
            feature_found: Box::new(|_| ()),
            feature_left: Box::new(|_| ()),
            done_fetching: Box::new(|_| ()),
        }
    }
}

impl Handlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called once per parsed feature, as soon as its batch parsed it.
    pub fn on_feature_found(mut self, f: impl FnMut(Feature) + Send + 'static) -> Self {
        self.feature_found = Box::new(f);
        self
    }

    /// Called with the key of a feature that left the query area.
    pub fn on_feature_left(mut self, f: impl FnMut(&str) + Send + 'static) -> Self {
        self.feature_left = Box::new(f);
        self
    }

    /// Called once every feature visible from the current center has been delivered.
    pub fn on_done_fetching(mut self, f: impl FnMut(CycleId) + Send + 'static) -> Self {
        self.done_fetching = Box::new(f);
        self
    }
}

/// Keeps the features around a moving point in sync with a [`Backend`].
///
/// Every key entering the area query gets a value subscription, the answers are
/// buffered and deserialized in batches on the rayon thread pool, and the parsed
/// features are handed to [`Handlers`] one by one. Nothing happens on its own:
/// the owner drives the controller with [`FeatureSync::pump`] or
/// [`FeatureSync::wait_until_done`].
pub struct FeatureSync<B> {
    backend: B,
    config: SyncConfig,
    handlers: Handlers,
    tracker: Arc<CompletionTracker>,
    sender: Sender<Message>,
    receiver: Receiver<Message>,
    /// Keys with a live value subscription.
    subscribed: HashSet<String>,
    /// Subscriptions of the current cycle still waiting for their first value.
    awaiting: HashSet<String>,
    queue: Vec<(String, Option<String>)>,
    query_created: bool,
}

impl<B: Backend> FeatureSync<B> {
    /// `backend` receives the sink it must report its events to.
    pub fn new(
        config: SyncConfig,
        handlers: Handlers,
        backend: impl FnOnce(EventSink) -> Result<B>,
    ) -> Result<Self> {
        config.validate()?;
        let (sender, receiver) = crossbeam::channel::unbounded();
        let backend = backend(EventSink {
            sender: sender.clone(),
        })?;

        Ok(Self {
            backend,
            config,
            handlers,
            tracker: Arc::default(),
            sender,
            receiver,
            subscribed: HashSet::new(),
            awaiting: HashSet::new(),
            queue: Vec::new(),
            query_created: false,
        })
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn tracker(&self) -> &Arc<CompletionTracker> {
        &self.tracker
    }

    /// Keys currently subscribed to.
    pub fn subscribed(&self) -> impl Iterator<Item = &str> {
        self.subscribed.iter().map(String::as_str)
    }

    /// Move the area query, or create it the first time, and start a new fetch cycle.
    pub fn set_query_center(&mut self, lat: f64, lng: f64) -> Result<CycleId> {
        let center = Location::new(lat, lng)?;
        let cycle = self.tracker.begin_cycle();
        // the previous cycle's subscriptions still answer but aren't counted anymore
        self.awaiting.clear();
        info!(cycle, lat, lng, "starting a new fetch cycle");

        if !self.queue.is_empty() {
            self.dispatch_batch();
        }

        if self.query_created {
            self.backend.move_query(center, cycle);
        } else {
            self.backend
                .create_query(center, self.config.radius_meters(), cycle);
            self.query_created = true;
        }
        Ok(cycle)
    }

    /// Write every feature and its locations through the backend.
    pub fn import_all(
        &self,
        features: &[Feature],
        cancel: &(impl Fn() -> bool + Send + Sync),
        progress: &impl Progress,
    ) -> Result<ImportReport> {
        import_all(&self.backend, features, cancel, progress)
    }

    /// Process every message already received. Returns how many were processed.
    pub fn pump(&mut self) -> usize {
        let mut processed = 0;
        while let Ok(message) = self.receiver.try_recv() {
            self.handle(message);
            processed += 1;
        }
        processed
    }

    /// Process messages until the current cycle completes or `timeout` elapses.
    /// Returns whether the cycle completed.
    pub fn wait_until_done(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.tracker.is_completed() {
                return true;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.receiver.recv_timeout(remaining) {
                Ok(message) => self.handle(message),
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                    return self.tracker.is_completed();
                }
            }
        }
    }

    fn handle(&mut self, message: Message) {
        match message {
            Message::Backend(Event::Query(QueryEvent::KeyEntered { key, .. })) => {
                self.on_key_entered(key)
            }
            Message::Backend(Event::Query(QueryEvent::KeyExited { key })) => {
                self.on_key_exited(key)
            }
            Message::Backend(Event::Query(QueryEvent::KeyMoved { key, .. })) => {
                debug!(%key, "key moved within the query area");
            }
            Message::Backend(Event::Query(QueryEvent::Ready { cycle })) => {
                self.on_query_ready(cycle)
            }
            Message::Backend(Event::QueryError(err)) => {
                error!("There was an error with this query: {err}");
            }
            Message::Backend(Event::Value { key, payload }) => self.on_value(key, payload),
            Message::Backend(Event::Cancelled { key, error }) => self.on_cancelled(key, error),
            Message::Parsed { key, feature } => self.on_parsed(key, *feature),
            Message::BatchDone { cycle, skipped } => self.on_batch_done(cycle, skipped),
        }
    }

    fn on_key_entered(&mut self, key: String) {
        if !self.subscribed.insert(key.clone()) {
            debug!(%key, "already subscribed");
            return;
        }
        self.tracker.request_started();
        self.awaiting.insert(key.clone());
        self.backend.subscribe(&key);
    }

    fn on_key_exited(&mut self, key: String) {
        self.subscribed.remove(&key);
        self.backend.unsubscribe(&key);
        (self.handlers.feature_left)(&key);
        // it won't answer anymore, that's its terminal response
        if self.awaiting.remove(&key) {
            self.tracker.request_finished();
            self.after_request_finished();
        }
    }

    fn on_query_ready(&mut self, cycle: CycleId) {
        // a center set since then is still being enumerated
        if cycle != self.tracker.cycle() {
            debug!(cycle, "query ready for a previous center");
            return;
        }
        self.tracker.mark_ready();
        if self.tracker.outstanding_requests() == 0 {
            self.after_request_finished();
        }
    }

    fn on_value(&mut self, key: String, payload: Option<String>) {
        if !self.subscribed.contains(&key) {
            debug!(%key, "value received after unsubscribing");
            return;
        }
        if self.awaiting.remove(&key) {
            self.tracker.request_finished();
        }
        self.queue.push((key, payload));
        if self.queue.len() >= self.config.batch_size || self.tracker.outstanding_requests() == 0 {
            self.dispatch_batch();
        }
    }

    fn on_cancelled(&mut self, key: String, err: crate::Error) {
        warn!(%key, "Failed to read value: {err}");
        self.subscribed.remove(&key);
        if self.awaiting.remove(&key) {
            self.tracker.request_finished();
            self.after_request_finished();
        }
    }

    /// Once nothing is in flight anymore the queue must be flushed, or the cycle may be complete.
    fn after_request_finished(&mut self) {
        if self.tracker.outstanding_requests() != 0 {
            return;
        }
        if self.queue.is_empty() {
            self.check_completion();
        } else {
            self.dispatch_batch();
        }
    }

    fn dispatch_batch(&mut self) {
        let batch = mem::take(&mut self.queue);
        let cycle = self.tracker.cycle();
        let running = self.tracker.batch_started();
        debug!(cycle, size = batch.len(), running, "dispatching a deserialization batch");

        let sender = self.sender.clone();
        rayon::spawn(move || {
            let mut skipped = 0;
            for (key, payload) in batch {
                let Some(payload) = payload else {
                    debug!(%key, "no record stored for this key");
                    skipped += 1;
                    continue;
                };
                match Feature::deserialize(&payload) {
                    Ok(feature) => {
                        let feature = Box::new(feature);
                        // the controller may be gone, there is nobody left to tell
                        let _ = sender.send(Message::Parsed { key, feature });
                    }
                    Err(err) => {
                        debug!(%key, "dropping malformed payload: {err}");
                        skipped += 1;
                    }
                }
            }
            let _ = sender.send(Message::BatchDone { cycle, skipped });
        });
    }

    fn on_parsed(&mut self, key: String, feature: Feature) {
        if !self.subscribed.contains(&key) {
            debug!(%key, "feature parsed after leaving the query area");
            return;
        }
        (self.handlers.feature_found)(feature);
    }

    fn on_batch_done(&mut self, cycle: CycleId, skipped: u64) {
        if skipped != 0 {
            self.tracker.record_skipped(skipped);
        }
        match self.tracker.batch_finished(cycle) {
            Some(_) => self.check_completion(),
            None => debug!(cycle, "batch of a previous cycle finished"),
        }
    }

    fn check_completion(&mut self) {
        if let Some(cycle) = self.tracker.try_complete(self.queue.is_empty()) {
            info!(cycle, skipped = self.tracker.skipped(), "done fetching");
            (self.handlers.done_fetching)(cycle);
        }
    }
}
