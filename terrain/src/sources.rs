//! Builds every elevation source for one trail and reconciles them.

use crate::{
    align::{align_to_baseline, clean_survey, combine, derive_slopes, SurveyRow, Tolerance},
    metrics::TerrainMetrics,
    Config, ElevationSeries, PointCloudSampler, RasterTileIndex, Reprojector, SourceDetails,
    SourceName, SourceReport, SourceResult, TerrainError, Trail,
};
use log::debug;
use serde::Serialize;
use std::{collections::BTreeMap, time::Instant};

/// Entry point for [`ElevationSourcesBuilder`].
pub struct ElevationSources;

impl ElevationSources {
    pub fn builder<'a>() -> ElevationSourcesBuilder<'a> {
        ElevationSourcesBuilder {
            trail: None,
            raster: None,
            point_clouds: None,
            survey: None,
            config: None,
        }
    }
}

pub struct ElevationSourcesBuilder<'a> {
    trail: Option<&'a Trail>,

    /// Gridded elevation tiles.
    raster: Option<&'a RasterTileIndex>,

    /// Point-cloud catalog and file cache.
    point_clouds: Option<&'a PointCloudSampler>,

    /// Raw rows of an uploaded survey.
    survey: Option<&'a [SurveyRow]>,

    /// Defaults to [`Config::default`].
    config: Option<&'a Config>,
}

impl<'a> ElevationSourcesBuilder<'a> {
    pub fn trail(mut self, trail: &'a Trail) -> Self {
        self.trail = Some(trail);
        self
    }

    pub fn raster(mut self, index: &'a RasterTileIndex) -> Self {
        self.raster = Some(index);
        self
    }

    pub fn point_clouds(mut self, sampler: &'a PointCloudSampler) -> Self {
        self.point_clouds = Some(sampler);
        self
    }

    pub fn survey(mut self, rows: &'a [SurveyRow]) -> Self {
        self.survey = Some(rows);
        self
    }

    pub fn config(mut self, config: &'a Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Produces a result for every source slot.
    ///
    /// Per-source failures become unavailable entries. Only a missing
    /// trail, an invalid trail coordinate or an unusable projection
    /// fail the whole build.
    pub fn build(&self) -> Result<SourcesReport, TerrainError> {
        let trail = self.trail.ok_or(TerrainError::Builder)?;
        let default_config;
        let config = match self.config {
            Some(config) => config,
            None => {
                default_config = Config::default();
                &default_config
            }
        };

        trail.validate()?;
        let reprojector = Reprojector::from_config(config)?;
        let coords = trail.coords();
        let now = Instant::now();

        let mut track = match trail.track_series() {
            Some(series) => SourceResult::available(series),
            None => SourceResult::unavailable("trail has no recorded elevations"),
        };
        let track_len = track.series().map(ElevationSeries::len);
        let track_distance_km = track.series().map(ElevationSeries::total_distance_km);

        let mut point_cloud: SourceResult = match self.point_clouds {
            Some(sampler) => sampler
                .extract_profile(&coords, trail.id.as_deref(), &reprojector, config)
                .into(),
            None => SourceResult::unavailable("no point-cloud catalog configured"),
        };
        let point_cloud_runtime = now.elapsed();

        let mut survey: SourceResult = match self.survey {
            Some(rows) => clean_survey(rows, track_distance_km, config)
                .map(|series| {
                    let rows_kept = series.len();
                    SourceResult::available(series).with_details(SourceDetails::Survey {
                        rows_received: rows.len(),
                        rows_kept,
                    })
                })
                .into(),
            None => SourceResult::unavailable("no survey uploaded"),
        };

        let mut raster: SourceResult = match self.raster {
            Some(index) => index.extract_profile(&coords, &reprojector).into(),
            None => SourceResult::unavailable("no raster tiles configured"),
        };
        if let (Some(len), Some(series)) = (track_len, raster.series_mut()) {
            series.truncate(len);
        }
        let raster_runtime = now.elapsed() - point_cloud_runtime;

        if let Some(baseline) = track
            .series()
            .and_then(|series| series.elevations().first().copied())
        {
            let sensor = Tolerance::Above(config.baseline_tolerance_m);
            let surveyed = Tolerance::AtLeast(config.survey_baseline_tolerance_m);
            for (name, result, tolerance) in [
                (SourceName::PointCloud, &mut point_cloud, sensor),
                (SourceName::Raster, &mut raster, sensor),
                (SourceName::Survey, &mut survey, surveyed),
            ] {
                if let Some(offset) = result
                    .series_mut()
                    .and_then(|series| align_to_baseline(series, baseline, tolerance))
                {
                    debug!("aligned {name} to track baseline; offset: {offset:.2}");
                }
            }
        }

        for result in [&mut track, &mut point_cloud, &mut raster, &mut survey] {
            if let Some(series) = result.series_mut() {
                derive_slopes(series, config);
            }
        }

        let contributing: Vec<(SourceName, &ElevationSeries)> = [
            (SourceName::Track, &track),
            (SourceName::PointCloud, &point_cloud),
            (SourceName::Raster, &raster),
            (SourceName::Survey, &survey),
        ]
        .into_iter()
        .filter_map(|(name, result)| result.series().map(|series| (name, series)))
        .collect();
        let series: Vec<&ElevationSeries> = contributing.iter().map(|(_, s)| *s).collect();
        let track_distances = track.series().map(ElevationSeries::distances_km);
        let combined = match combine(&series, track_distances) {
            Some(mut series) => {
                derive_slopes(&mut series, config);
                SourceResult::available(series)
                    .with_note(format!("mean of {} sources", contributing.len()))
                    .with_details(SourceDetails::Combined {
                        sources: contributing.iter().map(|(name, _)| *name).collect(),
                    })
            }
            None => SourceResult::unavailable("no elevation sources available"),
        };

        let track_metrics = track.series().map(TerrainMetrics::compute);

        debug!(
            "elevation sources; trail: {:?}, points: {}, point_cloud_exec: {:?}, raster_exec: {:?}, total_exec: {:?}",
            trail.id,
            coords.len(),
            point_cloud_runtime,
            raster_runtime,
            now.elapsed()
        );

        let results = [
            (SourceName::Track, track),
            (SourceName::PointCloud, point_cloud),
            (SourceName::Raster, raster),
            (SourceName::Survey, survey),
            (SourceName::Combined, combined),
        ];
        Ok(SourcesReport::new(trail, &results, track_metrics))
    }
}

/// Which sources produced a series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourcesSummary {
    /// Includes the combined series.
    pub total_sources_available: usize,
    pub available: BTreeMap<SourceName, bool>,
}

/// Everything known about a trail's elevation, by source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourcesReport {
    pub trail_id: Option<String>,
    pub trail_name: Option<String>,
    pub sources: BTreeMap<SourceName, SourceReport>,
    pub summary: SourcesSummary,
    /// Present when the trail carries its own elevations.
    pub track_metrics: Option<TerrainMetrics>,
}

impl SourcesReport {
    fn new(
        trail: &Trail,
        results: &[(SourceName, SourceResult)],
        track_metrics: Option<TerrainMetrics>,
    ) -> Self {
        let available: BTreeMap<SourceName, bool> = results
            .iter()
            .map(|(name, result)| (*name, result.is_available()))
            .collect();
        Self {
            trail_id: trail.id.clone(),
            trail_name: trail.name.clone(),
            sources: results
                .iter()
                .map(|(name, result)| (*name, SourceReport::from(result)))
                .collect(),
            summary: SourcesSummary {
                total_sources_available: available.values().filter(|a| **a).count(),
                available,
            },
            track_metrics,
        }
    }

    pub fn source(&self, name: SourceName) -> Option<&SourceReport> {
        self.sources.get(&name)
    }
}

#[cfg(test)]
mod tests {
    use super::ElevationSources;
    use crate::{
        align::SurveyRow,
        pointcloud::tests::{pt, write_cloud, FailingFetch},
        tiles::tests::write_tile,
        Config, PointCloudCache, PointCloudRecord, PointCloudSampler, RasterTileIndex,
        Reprojector, SourceDetails, SourceName, TerrainError, TileMode, Trail, TrailPoint,
    };
    use approx::assert_relative_eq;
    use geo::geometry::Coord;

    /// Three points inside the test tile: cols 9, 12 and 12.
    fn trail(elevations: Option<[f64; 3]>) -> Trail {
        let coords = [
            (150.3120, -33.7320),
            (150.3149, -33.7320),
            (150.3149, -33.7335),
        ];
        let points = coords
            .iter()
            .enumerate()
            .map(|(i, &(lon, lat))| TrailPoint {
                lat,
                lon,
                elevation: elevations.map(|e| e[i]),
            })
            .collect();
        let mut trail = Trail::new(points);
        trail.id = Some("katoomba".to_owned());
        trail
    }

    fn raster(dir: &std::path::Path) -> RasterTileIndex {
        write_tile(
            &dir.join("tile.tif"),
            Coord {
                x: 250_000.0,
                y: 6_265_000.0,
            },
            500.0,
            None,
        );
        RasterTileIndex::scan(dir, TileMode::MemMap).unwrap()
    }

    fn survey() -> Vec<SurveyRow> {
        [(0.0, 590.0), (0.1, 600.0), (0.2, 612.0)]
            .iter()
            .map(|&(distance, elevation)| SurveyRow {
                distance,
                elevation,
            })
            .collect()
    }

    #[test]
    fn test_missing_trail() {
        assert!(matches!(
            ElevationSources::builder().build(),
            Err(TerrainError::Builder)
        ));
    }

    #[test]
    fn test_invalid_coordinate_is_fatal() {
        let mut bad = trail(Some([600.0, 610.0, 620.0]));
        bad.points[2].lon = 190.0;
        assert!(matches!(
            ElevationSources::builder().trail(&bad).build(),
            Err(TerrainError::InvalidCoordinate { .. })
        ));
    }

    #[test]
    fn test_all_sources() {
        let dir = tempfile::tempdir().unwrap();
        let index = raster(dir.path());
        let rows = survey();
        let config = Config::default();
        let t = trail(Some([600.0, 610.0, 620.0]));

        let report = ElevationSources::builder()
            .trail(&t)
            .raster(&index)
            .survey(&rows)
            .config(&config)
            .build()
            .unwrap();

        let track = report.source(SourceName::Track).unwrap();
        assert!(track.available);
        assert_eq!(track.slopes_percent[0], 0.0);

        let point_cloud = report.source(SourceName::PointCloud).unwrap();
        assert!(!point_cloud.available);
        assert!(point_cloud.error.is_some());

        // Raster [509, 512, 512] shifted by 91 m onto the track.
        let raster = report.source(SourceName::Raster).unwrap();
        assert_eq!(raster.elevations, vec![600.0, 603.0, 603.0]);
        assert_eq!(raster.slopes_percent.len(), 3);

        // Survey shifted by 10 m.
        let survey = report.source(SourceName::Survey).unwrap();
        assert_eq!(survey.elevations, vec![600.0, 610.0, 622.0]);
        assert_eq!(
            survey.details,
            Some(SourceDetails::Survey {
                rows_received: 3,
                rows_kept: 3
            })
        );

        let combined = report.source(SourceName::Combined).unwrap();
        assert_eq!(combined.elevations.len(), 3);
        assert_relative_eq!(combined.elevations[0], 600.0);
        assert_relative_eq!(combined.elevations[2], (620.0 + 603.0 + 622.0) / 3.0);
        assert_eq!(combined.distances_km, track.distances_km);
        assert_eq!(
            combined.details,
            Some(SourceDetails::Combined {
                sources: vec![SourceName::Track, SourceName::Raster, SourceName::Survey]
            })
        );

        assert_eq!(report.summary.total_sources_available, 4);
        assert_eq!(report.summary.available[&SourceName::PointCloud], false);
        assert!(report.track_metrics.is_some());

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["sources"]["track"]["available"], true);
        assert_eq!(json["summary"]["available"]["point_cloud"], false);
        assert_eq!(json["trail_id"], "katoomba");
    }

    #[test]
    fn test_point_cloud_aligned_to_track() {
        let t = trail(Some([600.0, 610.0, 620.0]));
        let config = Config::default();
        let projected = Reprojector::from_config(&config)
            .unwrap()
            .project(&t.coords())
            .unwrap();

        // Ground half a meter off each trail point, low noise on it.
        let mut points = Vec::new();
        for (p, z) in projected.iter().zip([300.0, 305.0, 320.0]) {
            points.push(pt(p.x + 0.5, p.y + 0.5, z, 2));
            points.push(pt(p.x, p.y, z - 30.0, 7));
        }
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("katoomba.las");
        write_cloud(&path, &points);
        let sampler = PointCloudSampler::new(
            vec![PointCloudRecord::from_file(&path).unwrap()],
            PointCloudCache::new(dir.path().join("cache"), Box::new(FailingFetch)),
        );

        let report = ElevationSources::builder()
            .trail(&t)
            .point_clouds(&sampler)
            .config(&config)
            .build()
            .unwrap();

        // Ground [300, 305, 320] shifted by 300 m onto the track.
        let point_cloud = report.source(SourceName::PointCloud).unwrap();
        assert!(point_cloud.available);
        assert_eq!(point_cloud.elevations.len(), 3);
        for (actual, expected) in point_cloud.elevations.iter().zip([600.0, 605.0, 620.0]) {
            assert_relative_eq!(*actual, expected, epsilon = 0.01);
        }
        assert!(matches!(
            point_cloud.details,
            Some(SourceDetails::PointCloud {
                points: 3,
                coverage_percent,
                relative_coordinates: false,
                ..
            }) if coverage_percent == 100.0
        ));

        let combined = report.source(SourceName::Combined).unwrap();
        assert_relative_eq!(combined.elevations[1], 607.5, epsilon = 0.01);
        assert_eq!(
            combined.details,
            Some(SourceDetails::Combined {
                sources: vec![SourceName::Track, SourceName::PointCloud]
            })
        );
        assert_eq!(report.summary.total_sources_available, 3);
    }

    #[test]
    fn test_without_track_elevations() {
        let dir = tempfile::tempdir().unwrap();
        let index = raster(dir.path());
        let rows = survey();
        let t = trail(None);

        let report = ElevationSources::builder()
            .trail(&t)
            .raster(&index)
            .survey(&rows)
            .build()
            .unwrap();

        assert!(!report.source(SourceName::Track).unwrap().available);
        assert!(report.track_metrics.is_none());
        // Nothing to align to.
        assert_eq!(
            report.source(SourceName::Raster).unwrap().elevations,
            vec![509.0, 512.0, 512.0]
        );
        assert_eq!(
            report.source(SourceName::Survey).unwrap().elevations,
            vec![590.0, 600.0, 612.0]
        );
        let combined = report.source(SourceName::Combined).unwrap();
        assert_relative_eq!(combined.elevations[0], (509.0 + 590.0) / 2.0);
        assert_eq!(report.summary.total_sources_available, 3);
    }

    #[test]
    fn test_nothing_available() {
        let t = trail(None);
        let report = ElevationSources::builder().trail(&t).build().unwrap();
        assert_eq!(report.summary.total_sources_available, 0);
        assert_eq!(report.sources.len(), 5);
        let combined = report.source(SourceName::Combined).unwrap();
        assert_eq!(
            combined.error.as_deref(),
            Some("no elevation sources available")
        );
    }
}
