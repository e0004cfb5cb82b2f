use std::collections::BTreeMap;

use geo::{Destination, Distance, Haversine, LineString, Point, Polygon};
use h3o::{
    Resolution,
    geom::{ContainmentMode, TilerBuilder},
};
use heed::{
    Env, RoTxn, RwTxn,
    byteorder::BE,
    types::{SerdeJson, Str, U32},
};
use ordered_float::OrderedFloat;
use roaring::RoaringBitmap;
use tracing::warn;

use crate::{
    Error, Result,
    feature::Location,
    keys::{CellKeyCodec, RoaringBitmapCodec},
    pos,
};

/// Namespace of the serialized features.
pub const RECORDS_NAMESPACE: &str = "cleaning";
/// Namespace of the geospatial index.
pub const GEO_NAMESPACE: &str = "geofire";

const RESOLUTION_METADATA: &str = "index-resolution";

pub type KeyId = u32;

/// The records and the geospatial index, both living in the same LMDB environment.
///
/// Records and locations are written independently: a key can be found by an
/// area query before its record exists and the other way around.
#[derive(Clone)]
pub struct Store {
    pub(crate) records: heed::Database<Str, Str>,
    pub(crate) ids: heed::Database<Str, U32<BE>>,
    pub(crate) keys: heed::Database<U32<BE>, Str>,
    pub(crate) points: heed::Database<U32<BE>, SerdeJson<Vec<Location>>>,
    pub(crate) cells: heed::Database<CellKeyCodec, RoaringBitmapCodec>,
    /// The resolution of the cells the points are bucketed in.
    pub resolution: Resolution,
}

impl Store {
    /// Number of named databases the environment must be opened with.
    pub const fn nb_dbs() -> u32 {
        6
    }

    /// Create or open every database of the store.
    /// If the index was already created with another resolution, the stored one wins.
    pub fn create_from_env(env: &Env, wtxn: &mut RwTxn, resolution: Resolution) -> Result<Self> {
        let records = env.create_database(wtxn, Some(RECORDS_NAMESPACE))?;
        let ids = env.create_database(wtxn, Some(format!("{GEO_NAMESPACE}-ids").as_str()))?;
        let keys = env.create_database(wtxn, Some(format!("{GEO_NAMESPACE}-keys").as_str()))?;
        let points = env.create_database(wtxn, Some(format!("{GEO_NAMESPACE}-points").as_str()))?;
        let cells = env.create_database(wtxn, Some(format!("{GEO_NAMESPACE}-cells").as_str()))?;
        let metadata: heed::Database<Str, SerdeJson<u8>> =
            env.create_database(wtxn, Some("metadata"))?;

        let resolution = match metadata.get(wtxn, RESOLUTION_METADATA)? {
            Some(stored) => {
                let stored = Resolution::try_from(stored)?;
                if stored != resolution {
                    warn!(%stored, requested = %resolution, "index already built with another resolution");
                }
                stored
            }
            None => {
                metadata.put(wtxn, RESOLUTION_METADATA, &u8::from(resolution))?;
                resolution
            }
        };

        Ok(Self {
            records,
            ids,
            keys,
            points,
            cells,
            resolution,
        })
    }

    pub fn put_record(&self, wtxn: &mut RwTxn, key: &str, json: &str) -> Result<()> {
        self.records.put(wtxn, key, json)?;
        Ok(())
    }

    pub fn record(&self, rtxn: &RoTxn, key: &str) -> Result<Option<String>> {
        Ok(self.records.get(rtxn, key)?.map(str::to_string))
    }

    fn key_id(&self, wtxn: &mut RwTxn, key: &str) -> Result<KeyId> {
        if let Some(id) = self.ids.get(wtxn, key)? {
            return Ok(id);
        }
        let id = match self.keys.last(wtxn)? {
            Some((last, _)) => last + 1,
            None => 0,
        };
        self.ids.put(wtxn, key, &id)?;
        self.keys.put(wtxn, &id, key)?;
        Ok(id)
    }

    /// Register one more point under `key`. Returns `false` if the point was already known.
    pub fn set_location(&self, wtxn: &mut RwTxn, key: &str, location: Location) -> Result<bool> {
        let cell = location.to_lat_lng()?.to_cell(self.resolution);
        let id = self.key_id(wtxn, key)?;

        let mut points = self.points.get(wtxn, &id)?.unwrap_or_default();
        if points.contains(&location) {
            return Ok(false);
        }
        points.push(location);
        self.points.put(wtxn, &id, &points)?;

        let mut bitmap = self.cells.get(wtxn, &cell)?.unwrap_or_default();
        bitmap.insert(id);
        self.cells.put(wtxn, &cell, &bitmap)?;
        Ok(true)
    }

    pub fn locations(&self, rtxn: &RoTxn, key: &str) -> Result<Vec<Location>> {
        let Some(id) = self.ids.get(rtxn, key)? else {
            return Ok(Vec::new());
        };
        Ok(self.points.get(rtxn, &id)?.unwrap_or_default())
    }

    /// Return every key having at least one point within `radius` meters of `center`,
    /// along with its point closest to the center.
    // 1. Approximate the circle with a polygon wrapping it entirely
    // 2. Union the bitmaps of all the cells covering the polygon
    // 3. Double check the distance of every candidate, the cells overshoot the circle
    pub fn in_radius(
        &self,
        rtxn: &RoTxn,
        center: Location,
        radius: f64,
        circle_points: usize,
    ) -> Result<BTreeMap<String, Location>> {
        let center = center.to_point();
        let polygon = circle_polygon(center, radius, circle_points);

        let mut tiler = TilerBuilder::new(self.resolution)
            .containment_mode(ContainmentMode::Covers)
            .build();
        tiler.add(polygon)?;

        let mut candidates = RoaringBitmap::new();
        for cell in tiler.into_coverage() {
            if let Some(bitmap) = self.cells.get(rtxn, &cell)? {
                candidates |= bitmap;
            }
        }

        let mut ret = BTreeMap::new();
        for id in candidates {
            let key = self
                .keys
                .get(rtxn, &id)?
                .ok_or_else(|| Error::InternalKeyMissing(id.to_string(), pos!()))?;
            let points = self.points.get(rtxn, &id)?.unwrap_or_default();
            let nearest = points
                .into_iter()
                .map(|location| {
                    let distance = Haversine.distance(center, location.to_point());
                    (OrderedFloat(distance), location)
                })
                .min_by_key(|(distance, _)| *distance);

            match nearest {
                Some((distance, location)) if distance.0 <= radius => {
                    ret.insert(key.to_string(), location);
                }
                _ => (),
            }
        }

        Ok(ret)
    }

    pub fn stats(&self, rtxn: &RoTxn) -> Result<Stats> {
        let mut total_points = 0;
        for entry in self.points.iter(rtxn)? {
            let (_, points) = entry?;
            total_points += points.len() as u64;
        }
        Ok(Stats {
            total_records: self.records.len(rtxn)?,
            total_keys: self.keys.len(rtxn)?,
            total_points,
            total_cells: self.cells.len(rtxn)?,
        })
    }
}

/// A polygon of `n` vertices whose edges stay outside the circle.
fn circle_polygon(center: Point, radius: f64, n: usize) -> Polygon {
    let n = n.max(3);
    let outer = radius / (std::f64::consts::PI / n as f64).cos();

    let points: Vec<Point> = (0..n)
        .map(|i| {
            let bearing = 360.0 * i as f64 / n as f64;
            Haversine.destination(center, bearing, outer)
        })
        .collect();

    Polygon::new(LineString::from(points), Vec::new())
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Stats {
    pub total_records: u64,
    pub total_keys: u64,
    pub total_points: u64,
    pub total_cells: u64,
}
