use geotile::GeoTileError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TerrainError {
    #[error("missing required parameters")]
    Builder,

    #[error("invalid coordinate: lat {lat}, lon {lon}")]
    InvalidCoordinate { lat: f64, lon: f64 },

    #[error("no elevation tiles cover the trail")]
    NoTileCoverage,

    #[error("no point cloud file matches the trail")]
    NoPointCloudMatch,

    #[error("{0}")]
    SourceUnavailable(String),

    #[error("need at least {required} elevation points, have {actual}")]
    InsufficientData { required: usize, actual: usize },

    #[error("series length mismatch: {distances} distances, {elevations} elevations")]
    SeriesLength { distances: usize, elevations: usize },

    #[error("projection: {0}")]
    Projection(String),

    #[error("no elevation files in {0}")]
    Path(PathBuf),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    GeoTile(#[from] GeoTileError),

    #[error("{0}")]
    Las(#[from] las::Error),

    #[error("{0}")]
    Config(#[from] serde_json::Error),
}
