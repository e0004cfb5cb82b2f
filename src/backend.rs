use crossbeam::channel::Sender;
use tracing::debug;

use crate::{Error, Result, feature::Location, query::QueryEvent, sync::Message, tracker::CycleId};

/// Everything a [`Backend`] reports back to the sync controller.
#[derive(Debug)]
pub enum Event {
    Query(QueryEvent),
    /// The area query failed, it won't report anything for the current center.
    QueryError(Error),
    /// The current value of a subscribed key, `None` if no record exists.
    /// Sent once right after subscribing and again whenever the record changes.
    Value { key: String, payload: Option<String> },
    /// The subscription was dropped by the backend, no value will ever come.
    Cancelled { key: String, error: Error },
}

/// Where a backend pushes its [`Event`]s. Cheap to clone and usable from any thread.
#[derive(Debug, Clone)]
pub struct EventSink {
    pub(crate) sender: Sender<Message>,
}

impl EventSink {
    pub fn send(&self, event: Event) {
        if self.sender.send(Message::Backend(event)).is_err() {
            debug!("sync controller dropped, discarding event");
        }
    }

    pub fn query(&self, event: QueryEvent) {
        self.send(Event::Query(event))
    }
}

/// The remote key-value and geospatial store.
///
/// Reads are asynchronous: their results go through the [`EventSink`] the
/// backend was built with. Writes report their own outcome.
pub trait Backend: Send + Sync {
    /// Start an area query of `radius` meters around `center`.
    /// Its [`QueryEvent::Ready`] must carry `cycle`.
    fn create_query(&self, center: Location, radius: f64, cycle: CycleId);

    /// Move the existing area query. The radius doesn't change.
    /// The next [`QueryEvent::Ready`] must carry `cycle`.
    fn move_query(&self, center: Location, cycle: CycleId);

    fn subscribe(&self, key: &str);

    fn unsubscribe(&self, key: &str);

    /// Store the serialized record of a feature.
    fn set_value(&self, key: &str, json: &str) -> Result<()>;

    /// Register one point of a feature in the geospatial index.
    fn set_location(&self, key: &str, location: Location) -> Result<()>;
}
