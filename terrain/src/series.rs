//! Per-source elevation series and the tagged result every source
//! produces.

use crate::TerrainError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Elevation source slots, in report order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceName {
    /// Elevations recorded with the trail itself.
    Track,
    /// Ground-classified aerial point cloud.
    PointCloud,
    /// Gridded elevation raster.
    Raster,
    /// Manually uploaded (distance, elevation) table.
    Survey,
    /// Mean of every available source.
    Combined,
}

impl SourceName {
    pub const ALL: [Self; 5] = [
        Self::Track,
        Self::PointCloud,
        Self::Raster,
        Self::Survey,
        Self::Combined,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Track => "track",
            Self::PointCloud => "point_cloud",
            Self::Raster => "raster",
            Self::Survey => "survey",
            Self::Combined => "combined",
        }
    }
}

impl fmt::Display for SourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parallel distance (km), elevation (m) and slope (%) sequences.
///
/// All three always have the same length. Slopes are zero until
/// [`derive_slopes`](crate::align::derive_slopes) runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ElevationSeries {
    pub(crate) distances_km: Vec<f64>,
    pub(crate) elevations: Vec<f64>,
    pub(crate) slopes: Vec<f64>,
}

impl ElevationSeries {
    pub fn new(distances_km: Vec<f64>, elevations: Vec<f64>) -> Result<Self, TerrainError> {
        if distances_km.len() != elevations.len() {
            return Err(TerrainError::SeriesLength {
                distances: distances_km.len(),
                elevations: elevations.len(),
            });
        }
        let slopes = vec![0.0; elevations.len()];
        Ok(Self {
            distances_km,
            elevations,
            slopes,
        })
    }

    pub fn distances_km(&self) -> &[f64] {
        &self.distances_km
    }

    pub fn elevations(&self) -> &[f64] {
        &self.elevations
    }

    pub fn slopes(&self) -> &[f64] {
        &self.slopes
    }

    pub fn len(&self) -> usize {
        self.elevations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elevations.is_empty()
    }

    /// Distance of the last point, or 0 for an empty series.
    pub fn total_distance_km(&self) -> f64 {
        self.distances_km.last().copied().unwrap_or(0.0)
    }

    /// Shortens every sequence to at most `len` points.
    pub fn truncate(&mut self, len: usize) {
        self.distances_km.truncate(len);
        self.elevations.truncate(len);
        self.slopes.truncate(len);
    }

    /// Adds `offset` to every elevation.
    pub fn shift(&mut self, offset: f64) {
        for elevation in &mut self.elevations {
            *elevation += offset;
        }
    }
}

/// Extra, source specific facts about how a series was produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceDetails {
    PointCloud {
        file: String,
        points: usize,
        coverage_percent: f64,
        search_radius_m: f64,
        relative_coordinates: bool,
    },
    Raster {
        tiles_used: usize,
        valid_samples: usize,
    },
    Survey {
        rows_received: usize,
        rows_kept: usize,
    },
    Combined {
        sources: Vec<SourceName>,
    },
}

/// What one elevation source produced for a trail.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceResult {
    Available {
        series: ElevationSeries,
        note: Option<String>,
        details: Option<SourceDetails>,
    },
    Unavailable {
        reason: String,
    },
}

impl SourceResult {
    pub fn available(series: ElevationSeries) -> Self {
        Self::Available {
            series,
            note: None,
            details: None,
        }
    }

    pub fn unavailable<R: ToString>(reason: R) -> Self {
        Self::Unavailable {
            reason: reason.to_string(),
        }
    }

    #[must_use]
    pub fn with_note<N: Into<String>>(mut self, text: N) -> Self {
        if let Self::Available { note, .. } = &mut self {
            *note = Some(text.into());
        }
        self
    }

    #[must_use]
    pub fn with_details(mut self, value: SourceDetails) -> Self {
        if let Self::Available { details, .. } = &mut self {
            *details = Some(value);
        }
        self
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available { .. })
    }

    pub fn series(&self) -> Option<&ElevationSeries> {
        match self {
            Self::Available { series, .. } => Some(series),
            Self::Unavailable { .. } => None,
        }
    }

    pub fn series_mut(&mut self) -> Option<&mut ElevationSeries> {
        match self {
            Self::Available { series, .. } => Some(series),
            Self::Unavailable { .. } => None,
        }
    }
}

impl From<Result<SourceResult, TerrainError>> for SourceResult {
    fn from(result: Result<SourceResult, TerrainError>) -> Self {
        result.unwrap_or_else(Self::unavailable)
    }
}

/// Flat, serializable view of a [`SourceResult`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceReport {
    pub available: bool,
    pub elevations: Vec<f64>,
    pub distances_km: Vec<f64>,
    pub slopes_percent: Vec<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<SourceDetails>,
}

impl From<&SourceResult> for SourceReport {
    fn from(result: &SourceResult) -> Self {
        match result {
            SourceResult::Available {
                series,
                note,
                details,
            } => Self {
                available: true,
                elevations: series.elevations.clone(),
                distances_km: series.distances_km.clone(),
                slopes_percent: series.slopes.clone(),
                note: note.clone(),
                error: None,
                details: details.clone(),
            },
            SourceResult::Unavailable { reason } => Self {
                available: false,
                elevations: Vec::new(),
                distances_km: Vec::new(),
                slopes_percent: Vec::new(),
                note: None,
                error: Some(reason.clone()),
                details: None,
            },
        }
    }
}

/// Replaces every missing value with the last present one before it.
///
/// Leading gaps take the first present value. `None` if nothing is
/// present at all.
pub(crate) fn fill_gaps(values: &[Option<f64>]) -> Option<Vec<f64>> {
    let mut last = values.iter().flatten().next().copied()?;
    Some(
        values
            .iter()
            .map(|value| {
                if let Some(value) = value {
                    last = *value;
                }
                last
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::{fill_gaps, ElevationSeries, SourceReport, SourceResult};
    use crate::TerrainError;

    #[test]
    fn test_length_mismatch() {
        assert!(matches!(
            ElevationSeries::new(vec![0.0, 1.0], vec![10.0]),
            Err(TerrainError::SeriesLength {
                distances: 2,
                elevations: 1
            })
        ));
    }

    #[test]
    fn test_truncate_keeps_lengths_equal() {
        let mut series = ElevationSeries::new(vec![0.0, 0.1, 0.2], vec![1.0, 2.0, 3.0]).unwrap();
        series.truncate(2);
        assert_eq!(series.distances_km().len(), 2);
        assert_eq!(series.elevations().len(), 2);
        assert_eq!(series.slopes().len(), 2);
        series.truncate(10);
        assert_eq!(series.len(), 2);
    }

    #[test]
    fn test_fill_gaps() {
        assert_eq!(
            fill_gaps(&[None, Some(5.0), None, Some(7.0), None]),
            Some(vec![5.0, 5.0, 5.0, 7.0, 7.0])
        );
        assert_eq!(fill_gaps(&[None, None]), None);
        assert_eq!(fill_gaps(&[]), None);
    }

    #[test]
    fn test_unavailable_report() {
        let result: SourceResult = Err(TerrainError::NoTileCoverage).into();
        let report = SourceReport::from(&result);
        assert!(!report.available);
        assert!(report.elevations.is_empty());
        assert_eq!(
            report.error.as_deref(),
            Some("no elevation tiles cover the trail")
        );
    }
}
