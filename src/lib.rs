//! Keep the street-sweeping segments around a moving map viewport in sync with
//! a key-value and geospatial store.
//!
//! - [`import_all`] loads a geojson layer: one serialized record per feature and
//!   one index entry per point of its geometry.
//! - [`FeatureSync`] follows an area query around the viewport center, fetches
//!   the records of the keys entering it, deserializes them in batches and tells
//!   its [`Handlers`] once everything visible has been delivered.
//! - [`schedule`] interprets the sweeping schedule of a feature.

mod backend;
mod config;
mod error;
pub mod feature;
mod import;
mod keys;
mod local;
mod query;
pub mod schedule;
mod store;
mod sync;
#[cfg(test)]
mod test;
mod tracker;

pub use backend::{Backend, Event, EventSink};
pub use config::SyncConfig;
pub use error::Error;
pub use feature::{Feature, Location};
pub use import::{ImportReport, ImportSteps, import_all};
pub use local::LocalBackend;
pub use query::{GeoQuery, QueryEvent};
pub use store::{GEO_NAMESPACE, RECORDS_NAMESPACE, Stats, Store};
pub use sync::{FeatureSync, Handlers};
pub use tracker::{CompletionTracker, CycleId, TrackerSnapshot};

pub type Result<O, E = Error> = std::result::Result<O, E>;
