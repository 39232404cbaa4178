//! What gets computed once when a trail is ingested, and similar
//! trail ranking over those results.

use crate::{
    align::grades,
    metrics::{
        estimate_surfaces, estimated_hours, features, segments, similarity, surface_difficulty,
        Exposure, Segment, SimilarityProfile, Surface, SurfaceShare, TerrainFeatures,
        TerrainMetrics, TrailStats, SEGMENT_KM,
    },
    ElevationSeries, TerrainError, Trail, TrailPoint, DUPLICATE_START_RADIUS_M,
};
use log::debug;
use serde::Serialize;
use std::{cmp::Ordering, time::Instant};

/// Default number of similar trails returned.
pub const SIMILAR_LIMIT: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrailSummary {
    pub id: Option<String>,
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<TrailPoint>,
    /// False when the trail carried no elevations and every elevation
    /// figure below is zero.
    pub has_elevation: bool,
    pub stats: TrailStats,
    pub metrics: TerrainMetrics,
    pub segments: Vec<Segment>,
    pub estimated_hours: f64,
    pub exposure: Exposure,
    pub surfaces: Vec<SurfaceShare>,
    pub surface_difficulty: f64,
    pub features: TerrainFeatures,
}

impl TrailSummary {
    /// Analyzes a trail from its own track elevations.
    ///
    /// A trail without elevations still gets distance based figures.
    /// Slopes are stored unclamped, as [`grades`].
    pub fn analyze(trail: &Trail) -> Result<Self, TerrainError> {
        trail.validate()?;
        let now = Instant::now();

        let track = trail.track_series();
        let has_elevation = track.is_some();
        let mut series = match track {
            Some(series) => series,
            None => {
                let distances = trail.distances_km();
                let zeros = vec![0.0; distances.len()];
                ElevationSeries::new(distances, zeros)?
            }
        };
        series.slopes = grades(&series.distances_km, &series.elevations);

        let stats = TrailStats::compute(&series);
        let metrics = TerrainMetrics::from_stats(&series, &stats);

        let surfaces = if trail.points.is_empty() {
            vec![SurfaceShare {
                surface: Surface::Unknown,
                percentage: 100.0,
            }]
        } else if has_elevation {
            estimate_surfaces(series.elevations())
        } else {
            estimate_surfaces(&[])
        };

        let summary = Self {
            id: trail.id.clone(),
            name: trail.name.clone(),
            start: trail.points.first().copied(),
            has_elevation,
            segments: segments(&series, SEGMENT_KM),
            estimated_hours: estimated_hours(
                stats.total_distance_km,
                stats.elevation_gain,
                metrics.rolling_hills_index,
            ),
            exposure: Exposure::from_max_elevation(stats.max_elevation),
            surface_difficulty: surface_difficulty(&surfaces),
            surfaces,
            features: features(&series),
            stats,
            metrics,
        };

        debug!(
            "analyze; trail: {:?}, points: {}, difficulty: {:.2}, exec: {:?}",
            summary.id,
            series.len(),
            summary.metrics.difficulty_score,
            now.elapsed()
        );

        Ok(summary)
    }

    pub fn similarity_profile(&self) -> SimilarityProfile {
        SimilarityProfile {
            distance_km: self.stats.total_distance_km,
            elevation_gain: self.stats.elevation_gain,
            difficulty_score: self.metrics.difficulty_score,
            rolling_hills_index: self.metrics.rolling_hills_index,
            surface_difficulty: Some(self.surface_difficulty),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarTrail {
    pub id: Option<String>,
    pub name: Option<String>,
    pub similarity: f64,
    /// Starts within [`DUPLICATE_START_RADIUS_M`] of the target.
    pub duplicate_start: bool,
}

/// Returns the `limit` candidates most similar to `target`, best
/// first. Candidates sharing the target's id are skipped; those
/// starting where the target does are flagged as likely duplicates.
pub fn rank_similar(
    target: &TrailSummary,
    candidates: &[TrailSummary],
    limit: usize,
) -> Vec<SimilarTrail> {
    let profile = target.similarity_profile();
    let mut ranked: Vec<SimilarTrail> = candidates
        .iter()
        .filter(|candidate| target.id.is_none() || candidate.id != target.id)
        .map(|candidate| SimilarTrail {
            id: candidate.id.clone(),
            name: candidate.name.clone(),
            similarity: similarity(&profile, &candidate.similarity_profile()),
            duplicate_start: match (&target.start, &candidate.start) {
                (Some(a), Some(b)) => a.is_near(b, DUPLICATE_START_RADIUS_M),
                _ => false,
            },
        })
        .collect();
    ranked.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(Ordering::Equal)
    });
    ranked.truncate(limit);
    ranked
}
