//! Aerial point-cloud elevation source.

mod cache;
mod matcher;
mod sampler;

#[cfg(feature = "remote")]
pub use self::cache::HttpFetch;
pub use self::{
    cache::{Fetch, PointCloudCache},
    matcher::{find_best_match, overlap_ratio},
    sampler::{
        profile_point_set, sample_absolute, sample_relative, CloudProfile, GroundIndex,
        LidarPoint, PointCloudSampler, PointSet,
    },
};
use crate::{tiles::collect_paths, TerrainError};
use geo::geometry::{Coord, Rect};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::{ffi::OsStr, fs::File, io::BufReader, path::Path, time::Instant};

/// Axis aligned extent in the planar CRS.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Bounds {
    pub fn rect(&self) -> Rect<f64> {
        Rect::new(
            Coord {
                x: self.min_x,
                y: self.min_y,
            },
            Coord {
                x: self.max_x,
                y: self.max_y,
            },
        )
    }
}

/// Catalog entry for one point-cloud file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointCloudRecord {
    pub id: String,

    pub filename: String,

    /// Local path, `local://` path, or `http(s)://` URL.
    pub location: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounds: Option<Bounds>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub point_count: Option<u64>,

    /// Catalog metadata only; ground filtering does not depend on it.
    #[serde(default)]
    pub has_classification: bool,

    /// Set for manual uploads; always wins over spatial matching.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trail_id: Option<String>,
}

/// Where a record's bytes live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointCloudLocation<'a> {
    Local(&'a Path),
    Remote(&'a str),
}

impl PointCloudRecord {
    /// Builds a record for a local LAS/LAZ file from its header.
    ///
    /// The id is the file stem and the location is the path itself.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, TerrainError> {
        let path = path.as_ref();
        let reader = las::Reader::from_path(path)?;
        let header = reader.header();
        let bounds = header.bounds();
        let name = |part: Option<&OsStr>| {
            part.map(|part| part.to_string_lossy().into_owned())
                .unwrap_or_default()
        };
        Ok(Self {
            id: name(path.file_stem()),
            filename: name(path.file_name()),
            location: path.display().to_string(),
            bounds: Some(Bounds {
                min_x: bounds.min.x,
                min_y: bounds.min.y,
                max_x: bounds.max.x,
                max_y: bounds.max.y,
            }),
            point_count: Some(header.number_of_points()),
            has_classification: true,
            trail_id: None,
        })
    }

    pub fn location(&self) -> PointCloudLocation<'_> {
        let location = self.location.as_str();
        if let Some(path) = location.strip_prefix("local://") {
            PointCloudLocation::Local(Path::new(path))
        } else if location.starts_with("http://") || location.starts_with("https://") {
            PointCloudLocation::Remote(location)
        } else {
            PointCloudLocation::Local(Path::new(location))
        }
    }
}

/// Reads a JSON array of [`PointCloudRecord`]s.
pub fn load_catalog<P: AsRef<Path>>(path: P) -> Result<Vec<PointCloudRecord>, TerrainError> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

/// Catalogs every LAS/LAZ file under `dir`, ordered by path.
///
/// Files whose header cannot be read are skipped with a warning.
pub fn scan_catalog<P: AsRef<Path>>(dir: P) -> Result<Vec<PointCloudRecord>, TerrainError> {
    let dir = dir.as_ref();
    let now = Instant::now();
    let mut paths = Vec::new();
    collect_paths(dir, &["las", "laz"], &mut paths)?;
    paths.sort();

    let mut records = Vec::with_capacity(paths.len());
    for path in paths {
        match PointCloudRecord::from_file(&path) {
            Ok(record) => records.push(record),
            Err(e) => warn!("skipping unreadable point cloud {path:?}: {e}"),
        }
    }

    if records.is_empty() {
        return Err(TerrainError::Path(dir.to_owned()));
    }
    debug!(
        "cataloged {} point clouds in {dir:?}, exec: {:?}",
        records.len(),
        now.elapsed()
    );
    Ok(records)
}
