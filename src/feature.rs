use std::collections::BTreeMap;

use geo_types::{Coord, LineString, MultiLineString, Point};
use geojson::{FeatureCollection, GeoJson, JsonObject, JsonValue};
use h3o::LatLng;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Names of the properties a sweeping segment carries.
pub mod property {
    pub const WEEKDAY: &str = "WEEKDAY";
    pub const FROM_HOUR: &str = "FROMHOUR";
    pub const TO_HOUR: &str = "TOHOUR";
    pub const WEEK_ONE: &str = "WEEK1OFMON";
    pub const WEEK_TWO: &str = "WEEK2OFMON";
    pub const WEEK_THREE: &str = "WEEK3OFMON";
    pub const WEEK_FOUR: &str = "WEEK4OFMON";
    pub const CNN: &str = "CNN";
    pub const BLOCK_SIDE: &str = "BLOCKSIDE";
    pub const BLOCK_SWEEP: &str = "BLOCKSWEEP";
}

/// A point on earth in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
}

impl Location {
    /// Fails if the coordinates are not finite.
    pub fn new(lat: f64, lng: f64) -> Result<Self> {
        LatLng::new(lat, lng)?;
        Ok(Self { lat, lng })
    }

    pub fn to_lat_lng(self) -> Result<LatLng> {
        Ok(LatLng::new(self.lat, self.lng)?)
    }

    pub fn to_point(self) -> Point {
        Point::new(self.lng, self.lat)
    }
}

impl From<Coord> for Location {
    fn from(coord: Coord) -> Self {
        Self {
            lat: coord.y,
            lng: coord.x,
        }
    }
}

/// A street segment of the sweeping layer.
///
/// All the properties are kept as strings, the [`schedule`](crate::schedule)
/// helpers interpret them on demand.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub properties: BTreeMap<String, String>,
    /// A single line is persisted as a `LineString`, anything else as a `MultiLineString`.
    pub geometry: MultiLineString,
}

impl Feature {
    pub fn new(properties: BTreeMap<String, String>, geometry: impl Into<MultiLineString>) -> Self {
        Self {
            properties,
            geometry: geometry.into(),
        }
    }

    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(String::as_str)
    }

    /// The identifier the feature is stored under, its `BLOCKSWEEP`.
    pub fn key(&self) -> Result<&str> {
        self.property(property::BLOCK_SWEEP)
            .ok_or(Error::MissingProperty(property::BLOCK_SWEEP))
    }

    pub fn locations(&self) -> impl Iterator<Item = Location> + '_ {
        self.geometry.iter().flat_map(|line| line.coords().copied()).map(Location::from)
    }

    /// The persisted form of a feature: a geojson `Feature` document.
    pub fn serialize(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.to_geojson())?)
    }

    pub fn deserialize(json: &str) -> Result<Self> {
        let feature: geojson::Feature = serde_json::from_str(json)?;
        Self::try_from(feature)
    }

    pub fn to_geojson(&self) -> geojson::Feature {
        let properties: JsonObject = self
            .properties
            .iter()
            .map(|(k, v)| (k.clone(), JsonValue::String(v.clone())))
            .collect();
        let positions = |line: &LineString| -> Vec<Vec<f64>> {
            line.coords().map(|c| vec![c.x, c.y]).collect()
        };
        let geometry = match self.geometry.0.as_slice() {
            [line] => geojson::Value::LineString(positions(line)),
            lines => geojson::Value::MultiLineString(lines.iter().map(positions).collect()),
        };

        geojson::Feature {
            bbox: None,
            geometry: Some(geojson::Geometry::new(geometry)),
            id: None,
            properties: Some(properties),
            foreign_members: None,
        }
    }
}

impl TryFrom<geojson::Feature> for Feature {
    type Error = Error;

    fn try_from(feature: geojson::Feature) -> Result<Self> {
        let mut properties = BTreeMap::new();
        for (name, value) in feature.properties.unwrap_or_default() {
            let value = match value {
                JsonValue::Null => continue,
                JsonValue::String(s) => s,
                other => other.to_string(),
            };
            properties.insert(name, value);
        }
        let name = properties
            .get(property::BLOCK_SWEEP)
            .cloned()
            .unwrap_or_else(|| String::from("<unknown>"));

        let geometry = feature.geometry.ok_or_else(|| Error::MissingGeometry(name.clone()))?;
        let to_line = |line: &[Vec<f64>]| -> LineString {
            line.iter().map(|p| position_to_coord(p)).collect()
        };
        let lines: Vec<LineString> = match geometry.value {
            geojson::Value::LineString(line) => vec![to_line(&line)],
            geojson::Value::MultiLineString(lines) => lines.iter().map(|l| to_line(l)).collect(),
            geojson::Value::Point(_) => {
                return Err(Error::UnsupportedGeometry(name, "Point"));
            }
            geojson::Value::MultiPoint(_) => {
                return Err(Error::UnsupportedGeometry(name, "MultiPoint"));
            }
            geojson::Value::Polygon(_) => {
                return Err(Error::UnsupportedGeometry(name, "Polygon"));
            }
            geojson::Value::MultiPolygon(_) => {
                return Err(Error::UnsupportedGeometry(name, "MultiPolygon"));
            }
            geojson::Value::GeometryCollection(_) => {
                return Err(Error::UnsupportedGeometry(name, "GeometryCollection"));
            }
        };

        Ok(Feature::new(properties, MultiLineString::new(lines)))
    }
}

fn position_to_coord(position: &[f64]) -> Coord {
    Coord {
        x: position.first().copied().unwrap_or_default(),
        y: position.get(1).copied().unwrap_or_default(),
    }
}

/// Parse a whole map layer. Only a `FeatureCollection` makes sense here.
pub fn features_from_geojson(geojson: GeoJson) -> Result<Vec<Feature>> {
    match geojson {
        GeoJson::FeatureCollection(FeatureCollection { features, .. }) => {
            features.into_iter().map(Feature::try_from).collect()
        }
        GeoJson::Feature(_) => Err(Error::NotAFeatureCollection("Feature")),
        GeoJson::Geometry(_) => Err(Error::NotAFeatureCollection("Geometry")),
    }
}

pub fn features_from_reader(reader: impl std::io::Read) -> Result<Vec<Feature>> {
    let geojson = GeoJson::from_reader(reader)?;
    features_from_geojson(geojson)
}
