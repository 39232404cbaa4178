//! Notable points along a trail: prominent peaks and valleys, and
//! steep sections.

use crate::ElevationSeries;
use serde::{Deserialize, Serialize};

/// How far a peak must rise above (or a valley sink below) its
/// surroundings, in meters.
pub const PROMINENCE_M: f64 = 20.0;

/// Points either side of a candidate searched for its surroundings.
pub const PROMINENCE_WINDOW: usize = 10;

/// Grade, in percent, beyond which a point is steep.
pub const STEEP_GRADE_PCT: f64 = 25.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TerrainFeature {
    Peak {
        elevation: f64,
        distance_km: f64,
    },
    Valley {
        elevation: f64,
        distance_km: f64,
    },
    #[serde(rename = "Steep Grade")]
    SteepGrade { slope: f64, distance_km: f64 },
    #[serde(rename = "Steep Descent")]
    SteepDescent { slope: f64, distance_km: f64 },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSummary {
    pub total_features: usize,
    pub peaks: usize,
    pub valleys: usize,
    pub steep_sections: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TerrainFeatures {
    /// Peaks, then valleys, then steep sections, each in trail order.
    pub features: Vec<TerrainFeature>,
    pub summary: FeatureSummary,
}

/// Finds the notable points of `series`.
///
/// An interior point is a peak if it is strictly above both neighbours
/// and more than [`PROMINENCE_M`] above the lowest point from
/// [`PROMINENCE_WINDOW`] before it to just short of that many after
/// it. Valleys mirror peaks. Every point whose slope exceeds
/// [`STEEP_GRADE_PCT`] in either direction is a steep section.
pub fn features(series: &ElevationSeries) -> TerrainFeatures {
    let elevations = series.elevations();
    let distances = series.distances_km();
    let n = elevations.len();

    let window = |i: usize| {
        &elevations[i.saturating_sub(PROMINENCE_WINDOW)..(i + PROMINENCE_WINDOW).min(n)]
    };
    let mut peaks = Vec::new();
    let mut valleys = Vec::new();
    for i in 1..n.saturating_sub(1) {
        let (prev, curr, next) = (elevations[i - 1], elevations[i], elevations[i + 1]);
        if curr > prev && curr > next {
            let low = window(i).iter().copied().fold(f64::INFINITY, f64::min);
            if curr - low > PROMINENCE_M {
                peaks.push(TerrainFeature::Peak {
                    elevation: curr,
                    distance_km: distances[i],
                });
            }
        } else if curr < prev && curr < next {
            let high = window(i).iter().copied().fold(f64::NEG_INFINITY, f64::max);
            if high - curr > PROMINENCE_M {
                valleys.push(TerrainFeature::Valley {
                    elevation: curr,
                    distance_km: distances[i],
                });
            }
        }
    }

    let steep: Vec<TerrainFeature> = series
        .slopes()
        .iter()
        .zip(distances)
        .filter(|(slope, _)| slope.abs() > STEEP_GRADE_PCT)
        .map(|(&slope, &distance_km)| {
            if slope > 0.0 {
                TerrainFeature::SteepGrade { slope, distance_km }
            } else {
                TerrainFeature::SteepDescent { slope, distance_km }
            }
        })
        .collect();

    let summary = FeatureSummary {
        total_features: peaks.len() + valleys.len() + steep.len(),
        peaks: peaks.len(),
        valleys: valleys.len(),
        steep_sections: steep.len(),
    };
    let mut features = peaks;
    features.extend(valleys);
    features.extend(steep);
    TerrainFeatures { features, summary }
}
