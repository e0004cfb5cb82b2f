use h3o::error::{InvalidGeometry, InvalidLatLng, InvalidResolution};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    // User errors
    #[error("The import was canceled")]
    ImportCanceled,
    #[error("Feature `{0}` contains a {1} but only `LineString` and `MultiLineString` geometries are supported")]
    UnsupportedGeometry(String, &'static str),
    #[error("Feature is missing its `{0}` property")]
    MissingProperty(&'static str),
    #[error("Feature `{0}` doesn't have any geometry")]
    MissingGeometry(String),
    #[error("Expected a feature collection but got a {0}")]
    NotAFeatureCollection(&'static str),
    #[error("Cannot parse `{0}` as a time, expected the `HH:MM` format")]
    InvalidTime(String),
    #[error("Cannot move the area query before creating it")]
    NoActiveQuery,
    #[error("Batch size must be at least 1")]
    InvalidBatchSize,
    #[error("Radius must be a positive number of kilometers, got `{0}`")]
    InvalidRadius(f64),

    // External errors, sometimes it's a user error and sometimes it's not
    #[error(transparent)]
    Heed(#[from] heed::Error),
    #[error(transparent)]
    InvalidLatLng(#[from] InvalidLatLng),
    #[error(transparent)]
    InvalidGeometry(#[from] InvalidGeometry),
    #[error(transparent)]
    InvalidResolution(#[from] InvalidResolution),
    #[error(transparent)]
    InvalidGeoJson(#[from] Box<geojson::Error>),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Config(#[from] toml::de::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),

    // Internal errors
    #[error("unexpected key `{0}` missing at `{1}`")]
    InternalKeyMissing(String, String),
}

impl From<geojson::Error> for Error {
    fn from(error: geojson::Error) -> Self {
        Error::InvalidGeoJson(Box::new(error))
    }
}

#[macro_export]
macro_rules! pos {
    () => {
        format!("{}:{}:{}", file!(), line!(), column!())
    };
}
