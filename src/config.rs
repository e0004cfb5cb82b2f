//! Runtime settings of the sync controller and the local store.
//!
//! Every field has a default so a config file only has to mention what it
//! overrides:
//!
//! ```toml
//! radius_km = 0.8
//! batch_size = 25
//! ```

use std::path::Path;

use h3o::Resolution;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    /// Radius of the area query around the viewport center, in kilometers.
    pub radius_km: f64,
    /// How many payloads are buffered before a deserialization batch is dispatched.
    pub batch_size: usize,
    /// H3 resolution of the cells the geospatial index is bucketed by.
    pub index_resolution: u8,
    /// Number of vertices of the polygon approximating the query circle.
    pub circle_points: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            radius_km: 0.5,
            batch_size: 10,
            index_resolution: 9,
            circle_points: 32,
        }
    }
}

impl SyncConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: SyncConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::InvalidBatchSize);
        }
        if !(self.radius_km.is_finite() && self.radius_km > 0.0) {
            return Err(Error::InvalidRadius(self.radius_km));
        }
        self.resolution()?;
        Ok(())
    }

    pub fn resolution(&self) -> Result<Resolution> {
        Ok(Resolution::try_from(self.index_resolution)?)
    }

    pub fn radius_meters(&self) -> f64 {
        self.radius_km * 1_000.0
    }
}
