use crate::{TerrainError, TileMode};
use serde::{Deserialize, Serialize};
use std::{fs::File, io::BufReader, path::Path, path::PathBuf};

/// Geographic GRS80 longitude/latitude.
pub const GDA94_GEOGRAPHIC: &str = "+proj=longlat +ellps=GRS80 +no_defs";

/// GDA94 / MGA zone 56.
pub const GDA94_MGA56: &str = "+proj=utm +zone=56 +south +ellps=GRS80 +units=m +no_defs";

/// Tunables shared by every elevation source.
///
/// Defaults reproduce the behaviour the thresholds were tuned
/// against; change them only after re-validating on real data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Proj string of the coordinates trails are recorded in.
    pub source_proj: String,

    /// Proj string of the planar CRS rasters and point clouds use.
    pub target_proj: String,

    /// Minimum (exclusive) share of the trail bbox a point cloud must
    /// cover to be matched.
    pub min_overlap_ratio: f64,

    /// Point clouds whose header bounds all lie within this absolute
    /// value are taken to be in local, relative coordinates.
    pub relative_extent_limit: f64,

    /// Horizontal search radius around each trail point (meters).
    pub search_radius_m: f64,

    /// ASPRS class code for bare earth.
    pub ground_class: u8,

    /// Upper bound on samples taken from a relative point cloud.
    pub max_relative_samples: usize,

    /// Sensor sources are shifted when the start offset exceeds this.
    pub baseline_tolerance_m: f64,

    /// Surveys are shifted when the start offset reaches this.
    pub survey_baseline_tolerance_m: f64,

    /// Distance deltas at or below this produce no new slope.
    pub min_distance_delta_m: f64,

    /// Slopes are clamped to +/- this percentage.
    pub max_slope_pct: f64,

    /// Survey rows closer than this to the previous row are dropped.
    pub survey_dedup_tolerance_km: f64,

    /// Gap, as a multiple of the median gap, that ends a survey.
    pub survey_gap_factor: f64,

    /// Gaps below this never end a survey.
    pub survey_gap_floor_km: f64,

    /// Survey distances above this are taken to be meters.
    pub survey_meters_threshold: f64,

    /// Where downloaded point clouds are kept.
    pub cache_dir: PathBuf,

    /// Timeout for a single point-cloud download.
    pub fetch_timeout_secs: u64,

    /// How raster tiles are read.
    pub tile_mode: TileMode,

    /// How point-cloud files are read.
    pub cloud_mode: TileMode,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source_proj: GDA94_GEOGRAPHIC.to_owned(),
            target_proj: GDA94_MGA56.to_owned(),
            min_overlap_ratio: 0.02,
            relative_extent_limit: 1000.0,
            search_radius_m: 2.0,
            ground_class: 2,
            max_relative_samples: 200,
            baseline_tolerance_m: 0.1,
            survey_baseline_tolerance_m: 5.0,
            min_distance_delta_m: 0.001,
            max_slope_pct: 200.0,
            survey_dedup_tolerance_km: 0.001,
            survey_gap_factor: 10.0,
            survey_gap_floor_km: 0.1,
            survey_meters_threshold: 10.0,
            cache_dir: std::env::temp_dir().join("lidar_cache"),
            fetch_timeout_secs: 300,
            tile_mode: TileMode::MemMap,
            cloud_mode: TileMode::MemMap,
        }
    }
}

impl Config {
    /// Reads a JSON config; missing fields take their defaults.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, TerrainError> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }
}

#[cfg(test)]
mod tests {
    use super::{Config, TileMode};

    #[test]
    fn test_partial_json() {
        let config: Config =
            serde_json::from_str(r#"{"search_radius_m": 5.0, "tile_mode": "in_mem"}"#).unwrap();
        assert_eq!(config.search_radius_m, 5.0);
        assert_eq!(config.tile_mode, TileMode::InMem);
        assert_eq!(config.min_overlap_ratio, 0.02);
        assert_eq!(config.ground_class, 2);
    }
}
