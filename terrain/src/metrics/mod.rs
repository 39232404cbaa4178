//! Scalar terrain metrics derived from one elevation series.

mod features;
mod surface;

pub use self::{
    features::{
        features, FeatureSummary, TerrainFeature, TerrainFeatures, PROMINENCE_M,
        PROMINENCE_WINDOW, STEEP_GRADE_PCT,
    },
    surface::{estimate_surfaces, surface_difficulty, Surface, SurfaceShare},
};
use crate::ElevationSeries;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Minimum rise or drop, in meters, that counts as terrain rather
/// than GPS noise.
pub const HILL_THRESHOLD_M: f64 = 1.0;

/// Height of a typical big hill, in meters.
pub const BIG_HILL_M: f64 = 20.0;

/// Length of one breakdown segment, in kilometers.
pub const SEGMENT_KM: f64 = 0.5;

/// Counts local peaks and valleys.
///
/// A point is a peak (valley) if it is strictly above (below) both
/// neighbours and differs from at least one of them by
/// [`HILL_THRESHOLD_M`]. The ends are never counted.
pub fn count_rolling_hills(elevations: &[f64]) -> usize {
    elevations
        .windows(3)
        .filter(|w| {
            let (prev, curr, next) = (w[0], w[1], w[2]);
            if curr > prev && curr > next {
                curr - prev >= HILL_THRESHOLD_M || curr - next >= HILL_THRESHOLD_M
            } else if curr < prev && curr < next {
                prev - curr >= HILL_THRESHOLD_M || next - curr >= HILL_THRESHOLD_M
            } else {
                false
            }
        })
        .count()
}

/// Rolling-hills index and hill count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RollingHills {
    pub index: f64,
    pub count: usize,
}

impl RollingHills {
    /// Scores small scale oscillation as `0.6 * frequency + 0.4 *
    /// amplitude`.
    ///
    /// Frequency is significant changes per kilometer and amplitude
    /// is their mean size over [`BIG_HILL_M`]. The index is not
    /// capped. Fewer than three points score zero.
    pub fn analyze(elevations: &[f64], distances_km: &[f64]) -> Self {
        if elevations.len() < 3 {
            return Self::default();
        }

        let count = count_rolling_hills(elevations);
        let changes: Vec<f64> = elevations
            .windows(2)
            .map(|w| (w[1] - w[0]).abs())
            .filter(|change| *change >= HILL_THRESHOLD_M)
            .collect();

        let total_km = distances_km.last().copied().unwrap_or(0.0);
        #[allow(clippy::cast_precision_loss)]
        let per_km = if total_km > 0.0 {
            changes.len() as f64 / total_km
        } else {
            0.0
        };
        #[allow(clippy::cast_precision_loss)]
        let amplitude = if changes.is_empty() {
            0.0
        } else {
            changes.iter().sum::<f64>() / changes.len() as f64
        };
        let index = 0.6 * per_km + 0.4 * (amplitude / BIG_HILL_M);

        debug!(
            "rolling hills; count: {}, changes: {}, per_km: {:.2}, amplitude: {:.2}, index: {:.4}",
            count,
            changes.len(),
            per_km,
            amplitude,
            index
        );

        Self { index, count }
    }
}

/// Number of distinct 100 m elevation bands visited, capped at 10,
/// with a bonus for choppy terrain.
pub fn terrain_variety(elevations: &[f64]) -> u8 {
    if elevations.len() < 10 {
        return 0;
    }

    let mut bands: Vec<i64> = elevations
        .iter()
        // Saturating cast; truncation toward zero is the band.
        .map(|e| (e / 100.0).trunc() as i64)
        .collect();
    bands.sort_unstable();
    bands.dedup();
    let mut score = bands.len().min(10);

    #[allow(clippy::cast_precision_loss)]
    let mean_delta = elevations
        .windows(2)
        .map(|w| (w[1] - w[0]).abs())
        .sum::<f64>()
        / (elevations.len() - 1) as f64;
    if mean_delta > 20.0 {
        score += 2;
    } else if mean_delta > 10.0 {
        score += 1;
    }

    #[allow(clippy::cast_possible_truncation)]
    let score = score.min(10) as u8;
    score
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DifficultyLevel {
    Easy,
    Moderate,
    Hard,
    Extreme,
}

impl DifficultyLevel {
    pub fn from_score(score: f64) -> Self {
        if score <= 3.0 {
            Self::Easy
        } else if score <= 6.0 {
            Self::Moderate
        } else if score <= 8.0 {
            Self::Hard
        } else {
            Self::Extreme
        }
    }
}

impl fmt::Display for DifficultyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Easy => "Easy",
            Self::Moderate => "Moderate",
            Self::Hard => "Hard",
            Self::Extreme => "Extreme",
        };
        f.write_str(name)
    }
}

/// Difficulty out of 10: distance (3 points, full at 10 km), gain (4
/// points, full at 1000 m) and rolling hills (3 points, full at 50).
pub fn difficulty_score(distance_km: f64, elevation_gain: f64, rolling_hills_index: f64) -> f64 {
    (distance_km / 10.0).min(1.0) * 3.0
        + (elevation_gain / 1000.0).min(1.0) * 4.0
        + (rolling_hills_index / 50.0).min(1.0) * 3.0
}

/// Technical rating from 1 to 10.
pub fn technical_rating(max_slope: f64, avg_slope: f64, rolling_hills_index: f64) -> u8 {
    let raw = 1.0
        + (max_slope / 100.0) * 3.5
        + (rolling_hills_index / 50.0).min(1.0) * 3.5
        + (avg_slope / 30.0) * 2.0;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let rating = raw.clamp(1.0, 10.0).round() as u8;
    rating
}

/// Summary statistics of a series with slopes already derived.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TrailStats {
    pub total_distance_km: f64,
    pub elevation_gain: f64,
    pub elevation_loss: f64,
    pub elevation_change_total: f64,
    pub min_elevation: f64,
    pub max_elevation: f64,
    /// Steepest signed slope, ignoring the leading zero.
    pub max_slope: f64,
    /// Mean absolute slope, ignoring the leading zero.
    pub avg_slope: f64,
}

impl TrailStats {
    pub fn compute(series: &ElevationSeries) -> Self {
        let elevations = series.elevations();
        let (gain, loss) = elevations
            .windows(2)
            .map(|w| w[1] - w[0])
            .fold((0.0, 0.0), |(gain, loss), delta| {
                if delta > 0.0 {
                    (gain + delta, loss)
                } else {
                    (gain, loss - delta)
                }
            });

        let (min_elevation, max_elevation) = if elevations.is_empty() {
            (0.0, 0.0)
        } else {
            elevations
                .iter()
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), e| {
                    (lo.min(*e), hi.max(*e))
                })
        };

        let slopes = series.slopes().get(1..).unwrap_or_default();
        let max_slope = slopes.iter().copied().reduce(f64::max).unwrap_or(0.0);
        #[allow(clippy::cast_precision_loss)]
        let avg_slope = if slopes.is_empty() {
            0.0
        } else {
            slopes.iter().map(|s| s.abs()).sum::<f64>() / slopes.len() as f64
        };

        Self {
            total_distance_km: series.total_distance_km(),
            elevation_gain: gain,
            elevation_loss: loss,
            elevation_change_total: gain + loss,
            min_elevation,
            max_elevation,
            max_slope,
            avg_slope,
        }
    }
}

/// The metrics attached to a trail at ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TerrainMetrics {
    pub rolling_hills_index: f64,
    pub rolling_hills_count: usize,
    pub terrain_variety_score: u8,
    pub difficulty_score: f64,
    pub difficulty_level: DifficultyLevel,
    pub technical_rating: u8,
}

impl TerrainMetrics {
    /// Computes every metric from a series with slopes derived.
    pub fn compute(series: &ElevationSeries) -> Self {
        Self::from_stats(series, &TrailStats::compute(series))
    }

    pub(crate) fn from_stats(series: &ElevationSeries, stats: &TrailStats) -> Self {
        let hills = RollingHills::analyze(series.elevations(), series.distances_km());
        let difficulty =
            difficulty_score(stats.total_distance_km, stats.elevation_gain, hills.index);
        Self {
            rolling_hills_index: hills.index,
            rolling_hills_count: hills.count,
            terrain_variety_score: terrain_variety(series.elevations()),
            difficulty_score: difficulty,
            difficulty_level: DifficultyLevel::from_score(difficulty),
            technical_rating: technical_rating(stats.max_slope, stats.avg_slope, hills.index),
        }
    }
}

/// One fixed length slice of the trail.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start_km: f64,
    pub end_km: f64,
    pub elevation_change: f64,
    pub avg_slope: f64,
}

/// Splits a series into consecutive runs of at least `length_km`.
///
/// Each segment ends on the first point at least `length_km` past its
/// start, so the final segment may be shorter.
pub fn segments(series: &ElevationSeries, length_km: f64) -> Vec<Segment> {
    let distances = series.distances_km();
    let elevations = series.elevations();
    let last = series.len().saturating_sub(1);

    let mut out = Vec::new();
    let mut start = 0;
    while start < last {
        let mut end = start;
        while end < last && distances[end] - distances[start] < length_km {
            end += 1;
        }
        let run_km = distances[end] - distances[start];
        let change = elevations[end] - elevations[start];
        out.push(Segment {
            start_km: distances[start],
            end_km: distances[end],
            elevation_change: change,
            avg_slope: if run_km > 0.0 {
                change / (run_km * 1000.0) * 100.0
            } else {
                0.0
            },
        });
        start = end;
    }
    out
}

/// Naismith style hiking time in hours.
pub fn estimated_hours(distance_km: f64, elevation_gain: f64, rolling_hills_index: f64) -> f64 {
    distance_km / 5.0 + elevation_gain / 600.0 + rolling_hills_index * 0.5
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ExposureLevel {
    Low,
    #[serde(rename = "Low-Moderate")]
    LowModerate,
    Moderate,
    High,
}

impl fmt::Display for ExposureLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Low => "Low",
            Self::LowModerate => "Low-Moderate",
            Self::Moderate => "Moderate",
            Self::High => "High",
        };
        f.write_str(name)
    }
}

/// Static weather exposure implied by altitude.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Exposure {
    pub level: ExposureLevel,
    pub score: f64,
    pub risk_factors: &'static [&'static str],
}

impl Exposure {
    pub fn from_max_elevation(max_elevation: f64) -> Self {
        const HIGH: &[&str] = &[
            "Rapid weather changes",
            "Snow/ice risk",
            "High wind exposure",
            "Temperature drops",
        ];
        const MODERATE: &[&str] = &["Cooler temperatures", "Wind exposure", "Potential fog"];
        const LOW_MODERATE: &[&str] = &["Slightly cooler temps", "Some wind exposure"];
        const LOW: &[&str] = &["Minimal weather impact", "Protected terrain"];

        let (level, score, risk_factors) = if max_elevation > 1500.0 {
            (ExposureLevel::High, 1.3, HIGH)
        } else if max_elevation > 1000.0 {
            (ExposureLevel::Moderate, 1.2, MODERATE)
        } else if max_elevation > 500.0 {
            (ExposureLevel::LowModerate, 1.1, LOW_MODERATE)
        } else {
            (ExposureLevel::Low, 1.0, LOW)
        };
        Self {
            level,
            score,
            risk_factors,
        }
    }
}

/// The figures two trails are compared on.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimilarityProfile {
    pub distance_km: f64,
    pub elevation_gain: f64,
    pub difficulty_score: f64,
    pub rolling_hills_index: f64,
    /// Treated as 1.0 when absent.
    #[serde(default)]
    pub surface_difficulty: Option<f64>,
}

/// Pairwise similarity in `[0, 1]`.
///
/// Each measure decays linearly from 1 to 0 across its tolerance:
/// distance 1 km, gain 500 m, difficulty 5, rolling hills 0.5 and
/// surface 0.5. Weights are 0.25, 0.25, 0.2, 0.15 and 0.15.
pub fn similarity(a: &SimilarityProfile, b: &SimilarityProfile) -> f64 {
    fn closeness(x: f64, y: f64, tolerance: f64) -> f64 {
        (1.0 - (x - y).abs() / tolerance).max(0.0)
    }

    closeness(a.distance_km, b.distance_km, 1.0) * 0.25
        + closeness(a.elevation_gain, b.elevation_gain, 500.0) * 0.25
        + closeness(a.difficulty_score, b.difficulty_score, 5.0) * 0.20
        + closeness(a.rolling_hills_index, b.rolling_hills_index, 0.5) * 0.15
        + closeness(
            a.surface_difficulty.unwrap_or(1.0),
            b.surface_difficulty.unwrap_or(1.0),
            0.5,
        ) * 0.15
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{align::slopes, ElevationSeries};
    use approx::assert_relative_eq;

    fn series(distances: &[f64], elevations: &[f64]) -> ElevationSeries {
        let mut series = ElevationSeries::new(distances.to_vec(), elevations.to_vec()).unwrap();
        series.slopes = slopes(distances, elevations, 0.001, 200.0);
        series
    }

    #[test]
    fn test_flat_trail() {
        let flat = series(&[0.0, 0.5, 1.0, 1.5, 2.0], &[100.0; 5]);
        let metrics = TerrainMetrics::compute(&flat);
        assert_eq!(metrics.rolling_hills_count, 0);
        assert!(metrics.rolling_hills_index < 0.1);
        assert_eq!(metrics.terrain_variety_score, 0);
        assert_eq!(metrics.technical_rating, 1);
    }

    #[test]
    fn test_rolling_trail() {
        let elevations = [100.0, 120.0, 110.0, 130.0, 115.0, 135.0, 120.0];
        let distances = [0.0, 0.1, 0.2, 0.3, 0.4, 0.5, 0.6];
        let hills = RollingHills::analyze(&elevations, &distances);
        assert_eq!(hills.count, 5);
        assert!(hills.index > 0.2);
        // 6 changes over 0.6 km, mean size 100 / 6.
        assert_relative_eq!(hills.index, 0.6 * 10.0 + 0.4 * (100.0 / 6.0) / 20.0, epsilon = 1e-9);
    }

    #[test]
    fn test_rolling_hills_edges() {
        assert_eq!(RollingHills::analyze(&[1.0, 50.0], &[0.0, 1.0]), RollingHills::default());
        // Plateau tops are not peaks.
        assert_eq!(count_rolling_hills(&[100.0, 110.0, 110.0, 100.0]), 0);
        // Sub-meter wiggles are noise.
        assert_eq!(count_rolling_hills(&[100.0, 100.5, 100.0, 100.4]), 0);
        // Zero distance gives zero frequency.
        let hills = RollingHills::analyze(&[100.0, 120.0, 100.0], &[0.0, 0.0, 0.0]);
        assert_relative_eq!(hills.index, 0.4);
    }

    #[test]
    fn test_rolling_hills_shift_invariant() {
        let elevations = [100.0, 120.0, 110.0, 130.0, 115.0, 135.0, 120.0, 121.0, 119.5];
        let shifted: Vec<f64> = elevations.iter().map(|e| e + 1234.5).collect();
        assert_eq!(count_rolling_hills(&elevations), count_rolling_hills(&shifted));
    }

    #[test]
    fn test_terrain_variety() {
        assert_eq!(terrain_variety(&[100.0, 500.0, 900.0]), 0);
        let flat = [150.0; 10];
        assert_eq!(terrain_variety(&flat), 1);
        // Three bands and a mean step of 25 m.
        let climb: Vec<f64> = (0..10).map(|i| 50.0 + f64::from(i) * 25.0).collect();
        assert_eq!(terrain_variety(&climb), 5);
        let big: Vec<f64> = (0..20).map(|i| f64::from(i) * 100.0).collect();
        assert_eq!(terrain_variety(&big), 10);
    }

    #[test]
    fn test_difficulty() {
        assert_relative_eq!(difficulty_score(5.0, 500.0, 0.0), 3.5);
        assert_relative_eq!(difficulty_score(50.0, 5000.0, 500.0), 10.0);
        assert_eq!(DifficultyLevel::from_score(3.0), DifficultyLevel::Easy);
        assert_eq!(DifficultyLevel::from_score(3.5), DifficultyLevel::Moderate);
        assert_eq!(DifficultyLevel::from_score(8.0), DifficultyLevel::Hard);
        assert_eq!(DifficultyLevel::from_score(8.1), DifficultyLevel::Extreme);
        assert_eq!(DifficultyLevel::Extreme.to_string(), "Extreme");
    }

    #[test]
    fn test_technical_rating() {
        assert_eq!(technical_rating(0.0, 0.0, 0.0), 1);
        // 1 + 1.75 + 0 + 1.0
        assert_eq!(technical_rating(50.0, 15.0, 0.0), 4);
        assert_eq!(technical_rating(200.0, 200.0, 100.0), 10);
        assert_eq!(technical_rating(-200.0, 0.0, 0.0), 1);
    }

    #[test]
    fn test_stats_and_segments() {
        let s = series(
            &[0.0, 0.2, 0.4, 0.6, 0.8, 1.0, 1.1],
            &[100.0, 110.0, 105.0, 120.0, 120.0, 100.0, 101.0],
        );
        let stats = TrailStats::compute(&s);
        assert_relative_eq!(stats.elevation_gain, 26.0);
        assert_relative_eq!(stats.elevation_loss, 25.0);
        assert_relative_eq!(stats.elevation_change_total, 51.0);
        assert_relative_eq!(stats.min_elevation, 100.0);
        assert_relative_eq!(stats.max_elevation, 120.0);
        assert_relative_eq!(stats.max_slope, 7.5, epsilon = 1e-9);
        assert_relative_eq!(stats.total_distance_km, 1.1);

        let segs = segments(&s, SEGMENT_KM);
        assert_eq!(segs.len(), 2);
        assert_relative_eq!(segs[0].end_km, 0.6);
        assert_relative_eq!(segs[0].elevation_change, 20.0);
        assert_relative_eq!(segs[0].avg_slope, 20.0 / 600.0 * 100.0, epsilon = 1e-9);
        assert_relative_eq!(segs[1].start_km, 0.6);
        assert_relative_eq!(segs[1].end_km, 1.1);
        assert!(segments(&series(&[0.0], &[1.0]), SEGMENT_KM).is_empty());
    }

    #[test]
    fn test_time_and_exposure() {
        assert_relative_eq!(estimated_hours(10.0, 600.0, 2.0), 4.0);
        assert_eq!(Exposure::from_max_elevation(400.0).level, ExposureLevel::Low);
        assert_eq!(Exposure::from_max_elevation(500.1).score, 1.1);
        assert_eq!(Exposure::from_max_elevation(1200.0).risk_factors.len(), 3);
        assert_eq!(Exposure::from_max_elevation(2228.0).level, ExposureLevel::High);
        assert_eq!(
            serde_json::to_string(&ExposureLevel::LowModerate).unwrap(),
            "\"Low-Moderate\""
        );
    }

    #[test]
    fn test_similarity() {
        let a = SimilarityProfile {
            distance_km: 5.0,
            elevation_gain: 200.0,
            difficulty_score: 6.5,
            rolling_hills_index: 0.5,
            surface_difficulty: None,
        };
        let b = SimilarityProfile {
            distance_km: 5.5,
            elevation_gain: 220.0,
            difficulty_score: 6.8,
            rolling_hills_index: 0.55,
            surface_difficulty: None,
        };
        let ab = similarity(&a, &b);
        assert!(ab > 0.8 && ab < 0.95, "{ab}");
        assert_relative_eq!(ab, similarity(&b, &a));
        assert_relative_eq!(similarity(&a, &a), 1.0);

        let far = SimilarityProfile {
            distance_km: 50.0,
            elevation_gain: 3000.0,
            difficulty_score: 0.0,
            rolling_hills_index: 40.0,
            surface_difficulty: Some(2.0),
        };
        assert_relative_eq!(similarity(&a, &far), 0.0);
    }
}
