use std::{
    collections::BTreeMap,
    ops::Deref,
    sync::{Arc, Mutex},
};

use geo_types::LineString;
use h3o::Resolution;
use heed::{Env, EnvOpenOptions, RoTxn, WithTls};
use tempfile::TempDir;

use crate::{
    Feature, Handlers, Store,
    feature::property,
    tracker::CycleId,
};

mod feature;
mod tracker;

pub struct DatabaseHandle {
    pub env: Env<WithTls>,
    pub store: Store,
    #[allow(unused)]
    pub tempdir: TempDir,
}

impl Deref for DatabaseHandle {
    type Target = Store;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

impl DatabaseHandle {
    fn snap(&self, rtxn: &RoTxn) -> String {
        let mut s = String::new();

        s.push_str("# Records\n");
        for ret in self.store.records.iter(rtxn).unwrap() {
            let (key, json) = ret.unwrap();
            let feature = Feature::deserialize(json).unwrap();
            s.push_str(&format!(
                "{key}: {} point(s), {}\n",
                feature.locations().count(),
                feature.property(property::WEEKDAY).unwrap_or("-")
            ));
        }

        s.push_str("# Keys\n");
        for ret in self.store.keys.iter(rtxn).unwrap() {
            let (id, key) = ret.unwrap();
            let points = self.store.points.get(rtxn, &id).unwrap().unwrap_or_default();
            let points: Vec<String> = points
                .iter()
                .map(|l| format!("({:.4}, {:.4})", l.lat, l.lng))
                .collect();
            s.push_str(&format!("{id}: {key} [{}]\n", points.join(", ")));
        }

        s.push_str("# Cells\n");
        let mut total = 0;
        for ret in self.store.cells.iter(rtxn).unwrap() {
            let (cell, bitmap) = ret.unwrap();
            assert_eq!(cell.resolution(), self.store.resolution);
            total += bitmap.len();
        }
        s.push_str(&format!("{} entries\n", total));

        s
    }
}

fn create_database() -> DatabaseHandle {
    let dir = tempfile::tempdir().unwrap();
    let env = unsafe {
        EnvOpenOptions::new()
            .map_size(200 * 1024 * 1024)
            .max_dbs(Store::nb_dbs())
            .open(dir.path())
    }
    .unwrap();
    let mut wtxn = env.write_txn().unwrap();
    let store = Store::create_from_env(&env, &mut wtxn, Resolution::Nine).unwrap();
    wtxn.commit().unwrap();
    DatabaseHandle {
        env,
        store,
        tempdir: dir,
    }
}

/// Around Mission Dolores park, San Francisco.
pub const CENTER: (f64, f64) = (37.7596, -122.4269);

/// A sweeping segment. `coords` are `(lat, lng)` pairs.
pub fn segment(sweep: &str, weekday: &str, coords: &[(f64, f64)]) -> Feature {
    let properties: BTreeMap<String, String> = [
        (property::BLOCK_SWEEP, sweep),
        (property::WEEKDAY, weekday),
        (property::FROM_HOUR, "08:00"),
        (property::TO_HOUR, "10:00"),
        (property::WEEK_ONE, "Y"),
        (property::WEEK_TWO, "Y"),
        (property::WEEK_THREE, "Y"),
        (property::WEEK_FOUR, "Y"),
        (property::CNN, "1234000"),
        (property::BLOCK_SIDE, "East"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    let line = LineString::from(coords.iter().map(|(lat, lng)| (*lng, *lat)).collect::<Vec<_>>());
    Feature::new(properties, line)
}

/// Everything the handlers were called with, in order.
#[derive(Debug, Default)]
pub struct Recorded {
    pub found: Vec<String>,
    pub left: Vec<String>,
    pub done: Vec<CycleId>,
}

impl Recorded {
    pub fn found_sorted(&self) -> Vec<String> {
        let mut found = self.found.clone();
        found.sort();
        found
    }
}

pub fn recording_handlers() -> (Handlers, Arc<Mutex<Recorded>>) {
    let recorded = Arc::new(Mutex::new(Recorded::default()));
    let (found, left, done) = (recorded.clone(), recorded.clone(), recorded.clone());
    let handlers = Handlers::new()
        .on_feature_found(move |feature| {
            let key = crate::schedule::unique_key(&feature).to_string();
            found.lock().unwrap().found.push(key);
        })
        .on_feature_left(move |key| left.lock().unwrap().left.push(key.to_string()))
        .on_done_fetching(move |cycle| done.lock().unwrap().done.push(cycle));
    (handlers, recorded)
}
