use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GeoTileError {
    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Tiff(#[from] tiff::TiffError),

    #[error("no georeferencing tags in {0}")]
    Georeference(PathBuf),

    #[error("expected a single band elevation raster in {0}")]
    Bands(PathBuf),

    #[error("{samples} samples do not fill a {cols}x{rows} raster")]
    Dimensions {
        cols: usize,
        rows: usize,
        samples: usize,
    },

    #[error("degenerate geo-transform")]
    Transform,
}
