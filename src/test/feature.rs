use geojson::GeoJson;

use crate::{
    Error, Feature, Location,
    feature::{self, property},
};

use super::{CENTER, segment};

const LAYER: &str = r#"{
  "type": "FeatureCollection",
  "features": [
    {
      "type": "Feature",
      "properties": {
        "BLOCKSWEEP": "1611234",
        "CNN": 9136000,
        "BLOCKSIDE": "NorthEast",
        "WEEKDAY": "Tues",
        "FROMHOUR": "09:00",
        "TOHOUR": "11:00",
        "WEEK1OFMON": "Y",
        "WEEK2OFMON": "N",
        "WEEK3OFMON": "Y",
        "WEEK4OFMON": "N",
        "HOLIDAYS": null
      },
      "geometry": {
        "type": "LineString",
        "coordinates": [[-122.4269, 37.7596], [-122.4262, 37.7601]]
      }
    },
    {
      "type": "Feature",
      "properties": { "BLOCKSWEEP": "1611235", "WEEKDAY": "Wed" },
      "geometry": {
        "type": "MultiLineString",
        "coordinates": [[[-122.41, 37.75], [-122.42, 37.76]], [[-122.43, 37.77]]]
      }
    }
  ]
}"#;

#[test]
fn load_a_layer() {
    let features = feature::features_from_reader(LAYER.as_bytes()).unwrap();
    assert_eq!(features.len(), 2);

    let first = &features[0];
    insta::assert_debug_snapshot!(first.properties, @r#"
    {
        "BLOCKSIDE": "NorthEast",
        "BLOCKSWEEP": "1611234",
        "CNN": "9136000",
        "FROMHOUR": "09:00",
        "TOHOUR": "11:00",
        "WEEK1OFMON": "Y",
        "WEEK2OFMON": "N",
        "WEEK3OFMON": "Y",
        "WEEK4OFMON": "N",
        "WEEKDAY": "Tues",
    }
    "#);
    assert_eq!(first.key().unwrap(), "1611234");
    let locations: Vec<_> = first.locations().collect();
    assert_eq!(
        locations,
        vec![
            Location {
                lat: 37.7596,
                lng: -122.4269
            },
            Location {
                lat: 37.7601,
                lng: -122.4262
            },
        ]
    );

    // Multi lines keep their lines, their locations are flattened
    assert_eq!(features[1].geometry.0.len(), 2);
    assert_eq!(features[1].locations().count(), 3);
}

#[test]
fn only_feature_collections_are_layers() {
    let geometry = GeoJson::from(geojson::Geometry::new(geojson::Value::Point(vec![
        0.0, 0.0,
    ])));
    let err = feature::features_from_geojson(geometry).unwrap_err();
    insta::assert_snapshot!(err, @"Expected a feature collection but got a Geometry");
}

#[test]
fn unsupported_geometries() {
    let polygon = geojson::Feature {
        geometry: Some(geojson::Geometry::new(geojson::Value::Polygon(vec![vec![
            vec![0.0, 0.0],
            vec![1.0, 0.0],
            vec![1.0, 1.0],
            vec![0.0, 0.0],
        ]]))),
        properties: Some(
            [(
                property::BLOCK_SWEEP.to_string(),
                geojson::JsonValue::from("42"),
            )]
            .into_iter()
            .collect(),
        ),
        ..Default::default()
    };
    let err = Feature::try_from(polygon).unwrap_err();
    insta::assert_snapshot!(err, @"Feature `42` contains a Polygon but only `LineString` and `MultiLineString` geometries are supported");

    let empty = geojson::Feature::default();
    let err = Feature::try_from(empty).unwrap_err();
    insta::assert_snapshot!(err, @"Feature `<unknown>` doesn't have any geometry");
}

#[test]
fn points_are_not_segments() {
    let point = geojson::Feature {
        geometry: Some(geojson::Geometry::new(geojson::Value::Point(vec![
            -122.4269, 37.7596,
        ]))),
        ..Default::default()
    };
    let err = Feature::try_from(point).unwrap_err();
    insta::assert_snapshot!(err, @"Feature `<unknown>` contains a Point but only `LineString` and `MultiLineString` geometries are supported");
}

#[test]
fn multi_lines_are_persisted_as_such() {
    let features = feature::features_from_reader(LAYER.as_bytes()).unwrap();
    let multi = &features[1];
    let json = multi.serialize().unwrap();

    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["geometry"]["type"], "MultiLineString");
    assert_eq!(
        value["geometry"]["coordinates"],
        serde_json::json!([[[-122.41, 37.75], [-122.42, 37.76]], [[-122.43, 37.77]]])
    );
    assert_eq!(&Feature::deserialize(&json).unwrap(), multi);
}

#[test]
fn persisted_form() {
    let feature = segment("7", "Thu", &[CENTER, (37.7601, -122.4262)]);
    let json = feature.serialize().unwrap();

    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["type"], "Feature");
    assert_eq!(value["geometry"]["type"], "LineString");
    assert_eq!(value["properties"]["BLOCKSWEEP"], "7");
    assert_eq!(
        value["geometry"]["coordinates"][0],
        serde_json::json!([-122.4269, 37.7596])
    );

    assert_eq!(Feature::deserialize(&json).unwrap(), feature);
}

#[test]
fn malformed_payloads() {
    assert!(matches!(Feature::deserialize("not json"), Err(Error::Json(_))));
    assert!(matches!(
        Feature::deserialize(r#"{"type": "Feature"}"#),
        Err(Error::Json(_)) | Err(Error::MissingGeometry(_))
    ));
    assert!(Feature::deserialize(r#"{"hello": "world"}"#).is_err());
}

#[test]
fn missing_key() {
    let mut feature = segment("7", "Thu", &[CENTER]);
    feature.properties.remove(property::BLOCK_SWEEP);
    insta::assert_snapshot!(feature.key().unwrap_err(), @"Feature is missing its `BLOCKSWEEP` property");
}

#[test]
fn invalid_locations() {
    assert!(Location::new(37.0, -122.0).is_ok());
    assert!(matches!(
        Location::new(f64::NAN, -122.0),
        Err(Error::InvalidLatLng(_))
    ));
    assert!(Location::new(37.0, f64::INFINITY).is_err());
}
