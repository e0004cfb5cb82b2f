use std::{
    collections::HashSet,
    path::Path,
    sync::{Mutex, MutexGuard, PoisonError},
};

use geo::{Distance, Haversine};
use heed::{Env, EnvOpenOptions};
use ordered_float::OrderedFloat;
use tracing::{debug, error};

use crate::{
    Error, Result, SyncConfig,
    backend::{Backend, Event, EventSink},
    feature::Location,
    query::GeoQuery,
    store::Store,
    tracker::CycleId,
};

const DEFAULT_MAP_SIZE: usize = 1024 * 1024 * 1024;

/// A [`Backend`] reading and writing a [`Store`] in a local LMDB environment.
///
/// Everything is answered synchronously: the events are already in the sink
/// when the call returns. Writes to a subscribed key or within the live
/// query's radius are pushed to the sink as well.
pub struct LocalBackend {
    env: Env,
    store: Store,
    sink: EventSink,
    circle_points: usize,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    query: Option<GeoQuery>,
    subscriptions: HashSet<String>,
}

impl LocalBackend {
    pub fn new(env: Env, store: Store, sink: EventSink, circle_points: usize) -> Self {
        Self {
            env,
            store,
            sink,
            circle_points,
            state: Mutex::default(),
        }
    }

    /// Open, or create, the environment at `path` and the store inside it.
    pub fn open(path: impl AsRef<Path>, config: &SyncConfig, sink: EventSink) -> Result<Self> {
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(DEFAULT_MAP_SIZE)
                .max_dbs(Store::nb_dbs())
                .open(path)
        }?;
        let mut wtxn = env.write_txn()?;
        let store = Store::create_from_env(&env, &mut wtxn, config.resolution()?)?;
        wtxn.commit()?;
        Ok(Self::new(env, store, sink, config.circle_points))
    }

    pub fn env(&self) -> &Env {
        &self.env
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn is_subscribed(&self, key: &str) -> bool {
        self.state().subscriptions.contains(key)
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn run_query(&self, query: &mut GeoQuery) -> Result<()> {
        let rtxn = self.env.read_txn()?;
        let matches =
            self.store
                .in_radius(&rtxn, query.center(), query.radius(), self.circle_points)?;
        drop(rtxn);
        debug!(matches = matches.len(), "area query refreshed");
        for event in query.refresh(matches) {
            self.sink.query(event);
        }
        Ok(())
    }

    fn report_query_error(&self, err: Error) {
        error!("There was an error with this query: {err}");
        self.sink.send(Event::QueryError(err));
    }

    /// The point of `key` closest to the query center if it is within the radius.
    fn nearest_within(&self, query: &GeoQuery, key: &str) -> Result<Option<Location>> {
        let rtxn = self.env.read_txn()?;
        let center = query.center().to_point();
        let nearest = self
            .store
            .locations(&rtxn, key)?
            .into_iter()
            .map(|location| {
                let distance = Haversine.distance(center, location.to_point());
                (OrderedFloat(distance), location)
            })
            .filter(|(distance, _)| distance.0 <= query.radius())
            .min_by_key(|(distance, _)| *distance);
        Ok(nearest.map(|(_, location)| location))
    }
}

impl Backend for LocalBackend {
    fn create_query(&self, center: Location, radius: f64, cycle: CycleId) {
        let mut state = self.state();
        let query = state.query.insert(GeoQuery::new(center, radius, cycle));
        if let Err(err) = self.run_query(query) {
            self.report_query_error(err);
        }
    }

    fn move_query(&self, center: Location, cycle: CycleId) {
        let mut state = self.state();
        let Some(query) = state.query.as_mut() else {
            self.report_query_error(Error::NoActiveQuery);
            return;
        };
        query.set_center(center, cycle);
        if let Err(err) = self.run_query(query) {
            self.report_query_error(err);
        }
    }

    fn subscribe(&self, key: &str) {
        self.state().subscriptions.insert(key.to_string());
        let payload = self
            .env
            .read_txn()
            .map_err(Error::from)
            .and_then(|rtxn| self.store.record(&rtxn, key));
        match payload {
            Ok(payload) => self.sink.send(Event::Value {
                key: key.to_string(),
                payload,
            }),
            Err(error) => {
                self.state().subscriptions.remove(key);
                self.sink.send(Event::Cancelled {
                    key: key.to_string(),
                    error,
                });
            }
        }
    }

    fn unsubscribe(&self, key: &str) {
        self.state().subscriptions.remove(key);
    }

    fn set_value(&self, key: &str, json: &str) -> Result<()> {
        let mut wtxn = self.env.write_txn()?;
        self.store.put_record(&mut wtxn, key, json)?;
        wtxn.commit()?;

        if self.is_subscribed(key) {
            self.sink.send(Event::Value {
                key: key.to_string(),
                payload: Some(json.to_string()),
            });
        }
        Ok(())
    }

    fn set_location(&self, key: &str, location: Location) -> Result<()> {
        let mut wtxn = self.env.write_txn()?;
        let inserted = self.store.set_location(&mut wtxn, key, location)?;
        wtxn.commit()?;
        if !inserted {
            return Ok(());
        }

        let mut state = self.state();
        let Some(query) = state.query.as_mut() else {
            return Ok(());
        };
        let nearest = self.nearest_within(query, key)?;
        if let Some(event) = query.update_key(key, nearest) {
            self.sink.query(event);
        }
        Ok(())
    }
}
