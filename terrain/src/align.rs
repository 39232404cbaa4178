//! Bringing independent elevation sources onto a common footing.

use crate::{math::median, Config, ElevationSeries, TerrainError};
use log::debug;
use serde::{Deserialize, Serialize};

/// Percent grade between consecutive points.
///
/// `slope[0]` is 0. A distance step of `min_delta_m` or less repeats
/// the previous slope instead of dividing by it; all slopes are clamped
/// to `±max_pct`.
pub fn slopes(
    distances_km: &[f64],
    elevations: &[f64],
    min_delta_m: f64,
    max_pct: f64,
) -> Vec<f64> {
    let len = distances_km.len().min(elevations.len());
    let mut slopes = Vec::with_capacity(len);
    if len == 0 {
        return slopes;
    }
    slopes.push(0.0);
    for i in 1..len {
        let rise = elevations[i] - elevations[i - 1];
        let run_m = (distances_km[i] - distances_km[i - 1]) * 1000.0;
        let slope = if run_m > min_delta_m {
            (rise / run_m * 100.0).clamp(-max_pct, max_pct)
        } else {
            slopes[i - 1]
        };
        slopes.push(slope);
    }
    slopes
}

/// Percent grade between consecutive points, as stored when a trail is
/// ingested.
///
/// `grade[0]` is 0, as is any step with no distance. Grades are not
/// clamped.
pub fn grades(distances_km: &[f64], elevations: &[f64]) -> Vec<f64> {
    let len = distances_km.len().min(elevations.len());
    (0..len)
        .map(|i| {
            let run_m = if i == 0 {
                0.0
            } else {
                (distances_km[i] - distances_km[i - 1]) * 1000.0
            };
            if run_m > 0.0 {
                (elevations[i] - elevations[i - 1]) / run_m * 100.0
            } else {
                0.0
            }
        })
        .collect()
}

/// Fills in `series`' slopes from its distances and elevations.
pub fn derive_slopes(series: &mut ElevationSeries, config: &Config) {
    series.slopes = slopes(
        &series.distances_km,
        &series.elevations,
        config.min_distance_delta_m,
        config.max_slope_pct,
    );
}

/// When a start offset is big enough to correct.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Tolerance {
    /// `|offset| > value`
    Above(f64),
    /// `|offset| >= value`
    AtLeast(f64),
}

impl Tolerance {
    fn exceeded_by(self, offset: f64) -> bool {
        match self {
            Self::Above(value) => offset.abs() > value,
            Self::AtLeast(value) => offset.abs() >= value,
        }
    }
}

/// Shifts `series` so it starts at `baseline`.
///
/// Returns the applied offset, or `None` when the series already
/// agrees with the baseline within `tolerance` (or is empty).
pub fn align_to_baseline(
    series: &mut ElevationSeries,
    baseline: f64,
    tolerance: Tolerance,
) -> Option<f64> {
    let offset = baseline - series.elevations.first()?;
    if !tolerance.exceeded_by(offset) {
        return None;
    }
    series.shift(offset);
    Some(offset)
}

/// One parsed row of a manual survey.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SurveyRow {
    /// Kilometers, or meters when large enough to be obviously meters.
    pub distance: f64,
    pub elevation: f64,
}

/// Loads survey rows from a JSON array.
pub fn load_survey<P: AsRef<std::path::Path>>(path: P) -> Result<Vec<SurveyRow>, TerrainError> {
    let reader = std::io::BufReader::new(std::fs::File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

/// Turns raw survey rows into a clean, strictly increasing series.
///
/// In order: unit normalisation, sort by distance, removal of rows
/// that do not advance past the previous one, truncation at the first
/// abnormally large gap, and removal of rows beyond the trail's known
/// length.
pub fn clean_survey(
    rows: &[SurveyRow],
    trail_distance_km: Option<f64>,
    config: &Config,
) -> Result<ElevationSeries, TerrainError> {
    let mut rows: Vec<(f64, f64)> = rows
        .iter()
        .filter(|row| row.distance.is_finite() && row.elevation.is_finite())
        .map(|row| {
            if row.distance > config.survey_meters_threshold {
                (row.distance / 1000.0, row.elevation)
            } else {
                (row.distance, row.elevation)
            }
        })
        .collect();
    rows.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut kept: Vec<(f64, f64)> = Vec::with_capacity(rows.len());
    for row in rows {
        match kept.last() {
            Some(prev) if row.0 <= prev.0 + config.survey_dedup_tolerance_km => {}
            _ => kept.push(row),
        }
    }

    let gaps: Vec<f64> = kept.windows(2).map(|w| w[1].0 - w[0].0).collect();
    if let Some(median_gap) = median(&gaps) {
        let threshold = (median_gap * config.survey_gap_factor).max(config.survey_gap_floor_km);
        if let Some(cut) = gaps.iter().position(|gap| *gap > threshold) {
            debug!(
                "survey gap {:.3} km exceeds {threshold:.3} km, keeping {} rows",
                gaps[cut],
                cut + 1
            );
            kept.truncate(cut + 1);
        }
    }

    if let Some(trail_distance_km) = trail_distance_km {
        let within: Vec<(f64, f64)> = kept
            .iter()
            .copied()
            .filter(|(distance, _)| *distance <= trail_distance_km)
            .collect();
        if !within.is_empty() && within.len() < kept.len() {
            debug!(
                "survey extends past trail end {trail_distance_km:.3} km, keeping {} rows",
                within.len()
            );
            kept = within;
        }
    }

    if kept.is_empty() {
        return Err(TerrainError::SourceUnavailable(
            "no numeric survey rows".to_owned(),
        ));
    }
    let (distances_km, elevations) = kept.into_iter().unzip();
    ElevationSeries::new(distances_km, elevations)
}

/// Point by point mean of every series, over their common length.
///
/// Distances come from `distances_km` when given and long enough,
/// otherwise from the shortest series.
pub fn combine(
    series: &[&ElevationSeries],
    distances_km: Option<&[f64]>,
) -> Option<ElevationSeries> {
    let shortest = series.iter().min_by_key(|s| s.len())?;
    let len = shortest.len();
    if len == 0 {
        return None;
    }

    let distances = match distances_km {
        Some(distances) if distances.len() >= len => distances[..len].to_vec(),
        _ => shortest.distances_km[..len].to_vec(),
    };

    #[allow(clippy::cast_precision_loss)]
    let count = series.len() as f64;
    let elevations = (0..len)
        .map(|i| series.iter().map(|s| s.elevations[i]).sum::<f64>() / count)
        .collect();

    ElevationSeries::new(distances, elevations).ok()
}
