use super::{find_best_match, PointCloudCache, PointCloudRecord};
use crate::{
    math::linspace,
    reproject::bounding_rect,
    series::{fill_gaps, SourceDetails},
    trail::cumulative_distances_km,
    Config, ElevationSeries, Reprojector, SourceResult, TerrainError, TileMode,
};
use geo::geometry::{Coord, Rect};
use log::{debug, warn};
use memmap2::Mmap;
use rstar::{PointDistance, RTree, RTreeObject, AABB};
use std::{fs::File, io::Cursor, path::Path, time::Instant};

const RELATIVE_NOTE: &str =
    "point cloud uses relative coordinates; profile generated from the cloud's own spatial extent";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LidarPoint {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub classification: u8,
}

impl RTreeObject for LidarPoint {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point([self.x, self.y])
    }
}

impl PointDistance for LidarPoint {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dx = self.x - point[0];
        let dy = self.y - point[1];
        dx * dx + dy * dy
    }
}

/// Points loaded from one file.
#[derive(Debug, Clone, PartialEq)]
pub struct PointSet {
    points: Vec<LidarPoint>,

    /// Horizontal extent as recorded by the file header.
    extent: Rect<f64>,
}

impl PointSet {
    /// Reads every point of a LAS/LAZ file.
    pub fn read<P: AsRef<Path>>(path: P, mode: TileMode) -> Result<Self, TerrainError> {
        let path = path.as_ref();
        let now = Instant::now();
        let mut reader = match mode {
            TileMode::InMem => las::Reader::from_path(path)?,
            TileMode::MemMap => {
                let file = File::open(path)?;
                let mmap = unsafe { Mmap::map(&file)? };
                las::Reader::new(Cursor::new(mmap))?
            }
        };

        let bounds = reader.header().bounds();
        let extent = Rect::new(
            Coord {
                x: bounds.min.x,
                y: bounds.min.y,
            },
            Coord {
                x: bounds.max.x,
                y: bounds.max.y,
            },
        );

        #[allow(clippy::cast_possible_truncation)]
        let mut points = Vec::with_capacity(reader.header().number_of_points() as usize);
        for point in reader.points() {
            let point = point?;
            points.push(LidarPoint {
                x: point.x,
                y: point.y,
                z: point.z,
                classification: u8::from(point.classification),
            });
        }

        debug!(
            "read {} points from {path:?}, exec: {:?}",
            points.len(),
            now.elapsed()
        );
        Ok(Self { points, extent })
    }

    /// Builds a set whose extent is the points' own bounding box.
    pub fn from_points(points: Vec<LidarPoint>) -> Self {
        let coords: Vec<Coord<f64>> = points.iter().map(|p| Coord { x: p.x, y: p.y }).collect();
        let extent = bounding_rect(&coords).unwrap_or_else(|| {
            Rect::new(Coord { x: 0.0, y: 0.0 }, Coord { x: 0.0, y: 0.0 })
        });
        Self { points, extent }
    }

    pub fn points(&self) -> &[LidarPoint] {
        &self.points
    }

    pub fn extent(&self) -> Rect<f64> {
        self.extent
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Keeps only points of class `ground_class`.
    ///
    /// If that would leave nothing, every point is kept instead.
    #[must_use]
    pub fn filter_ground(self, ground_class: u8) -> Self {
        let ground: Vec<LidarPoint> = self
            .points
            .iter()
            .filter(|point| point.classification == ground_class)
            .copied()
            .collect();
        if ground.is_empty() {
            warn!(
                "no points of class {ground_class}, using all {} points",
                self.points.len()
            );
            self
        } else {
            debug!("kept {} of {} ground points", ground.len(), self.points.len());
            Self {
                points: ground,
                extent: self.extent,
            }
        }
    }

    /// Returns true if the extent sits within `limit` of the origin on
    /// both axes, meaning the file is in local, non-georeferenced
    /// coordinates.
    pub fn is_relative(&self, limit: f64) -> bool {
        let (min, max) = (self.extent.min(), self.extent.max());
        [min.x, max.x, min.y, max.y]
            .iter()
            .all(|value| value.abs() < limit)
    }
}

/// 2-D spatial index over a point set.
pub struct GroundIndex {
    tree: RTree<LidarPoint>,
}

impl GroundIndex {
    pub fn new(points: &PointSet) -> Self {
        Self {
            tree: RTree::bulk_load(points.points.clone()),
        }
    }

    /// Points within `radius` (planar units) of `point`.
    pub fn within(&self, point: Coord<f64>, radius: f64) -> impl Iterator<Item = &LidarPoint> {
        self.tree
            .locate_within_distance([point.x, point.y], radius * radius)
    }

    /// Lowest elevation within `radius` of `point`.
    pub fn min_elevation(&self, point: Coord<f64>, radius: f64) -> Option<f64> {
        self.within(point, radius).map(|p| p.z).reduce(f64::min)
    }
}

/// Profile sampled out of a point cloud.
#[derive(Debug, Clone, PartialEq)]
pub struct CloudProfile {
    pub series: ElevationSeries,

    /// Derived from the cloud's extent, not matched to the trail.
    pub relative: bool,

    /// Percent of trail points with at least one neighbour.
    pub coverage_percent: f64,
}

/// Samples the lowest elevation within `radius` of every projected
/// trail point.
///
/// Points with no neighbour repeat the previous elevation; leading
/// misses take the first hit. Returns the elevations and the number of
/// points that had a neighbour, or `None` if none did.
pub fn sample_absolute(
    index: &GroundIndex,
    projected: &[Coord<f64>],
    radius: f64,
) -> Option<(Vec<f64>, usize)> {
    let samples: Vec<Option<f64>> = projected
        .iter()
        .map(|point| index.min_elevation(*point, radius))
        .collect();
    let hits = samples.iter().flatten().count();
    fill_gaps(&samples).map(|elevations| (elevations, hits))
}

/// Resamples a relative-coordinate cloud into a path profile.
///
/// Points are sorted along the cloud's longer horizontal axis and cut
/// into `min(requested, max_samples)` equal segments; each segment
/// contributes its lowest elevation.
pub fn sample_relative(
    points: &PointSet,
    requested: usize,
    max_samples: usize,
) -> Result<ElevationSeries, TerrainError> {
    let num_samples = requested.min(max_samples);
    if points.is_empty() || num_samples == 0 {
        return Err(TerrainError::InsufficientData {
            required: 1,
            actual: 0,
        });
    }

    let mut sorted = points.points.clone();
    let (min, max) = sorted.iter().fold(
        (
            Coord {
                x: f64::INFINITY,
                y: f64::INFINITY,
            },
            Coord {
                x: f64::NEG_INFINITY,
                y: f64::NEG_INFINITY,
            },
        ),
        |(min, max), p| {
            (
                Coord {
                    x: min.x.min(p.x),
                    y: min.y.min(p.y),
                },
                Coord {
                    x: max.x.max(p.x),
                    y: max.y.max(p.y),
                },
            )
        },
    );
    if max.x - min.x > max.y - min.y {
        sorted.sort_by(|a, b| a.x.total_cmp(&b.x));
    } else {
        sorted.sort_by(|a, b| a.y.total_cmp(&b.y));
    }

    let n = sorted.len();
    let segment_size = (n / num_samples).max(1);
    let elevations: Vec<f64> = (0..num_samples)
        .map(|i| i * segment_size)
        .take_while(|start| *start < n)
        .filter_map(|start| {
            let end = (start + segment_size).min(n);
            sorted[start..end].iter().map(|p| p.z).reduce(f64::min)
        })
        .collect();

    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    let representatives: Vec<&LidarPoint> = linspace(0.0, (n - 1) as f64, elevations.len())
        .map(|index| &sorted[(index as usize).min(n - 1)])
        .collect();

    let mut total = 0.0;
    let mut distances_km = Vec::with_capacity(representatives.len());
    for (i, point) in representatives.iter().enumerate() {
        if i > 0 {
            let prev = representatives[i - 1];
            total += (point.x - prev.x).hypot(point.y - prev.y);
        }
        distances_km.push(total / 1000.0);
    }

    ElevationSeries::new(distances_km, elevations)
}

/// Routes a loaded point set to the relative or absolute sampling path.
pub fn profile_point_set(
    points: &PointSet,
    coords: &[Coord<f64>],
    projected: &[Coord<f64>],
    config: &Config,
) -> Result<CloudProfile, TerrainError> {
    if points.is_relative(config.relative_extent_limit) {
        debug!("point cloud extent {:?} is relative", points.extent());
        let series = sample_relative(points, coords.len(), config.max_relative_samples)?;
        return Ok(CloudProfile {
            series,
            relative: true,
            coverage_percent: 100.0,
        });
    }

    let now = Instant::now();
    let index = GroundIndex::new(points);
    let (elevations, hits) = sample_absolute(&index, projected, config.search_radius_m)
        .ok_or_else(|| {
            TerrainError::SourceUnavailable(format!(
                "no point cloud points within {} m of the trail",
                config.search_radius_m
            ))
        })?;

    #[allow(clippy::cast_precision_loss)]
    let coverage_percent = hits as f64 / projected.len() as f64 * 100.0;
    debug!(
        "point cloud profile; points: {}, coverage: {coverage_percent:.1}%, exec: {:?}",
        projected.len(),
        now.elapsed()
    );

    Ok(CloudProfile {
        series: ElevationSeries::new(cumulative_distances_km(coords), elevations)?,
        relative: false,
        coverage_percent,
    })
}

/// Point-cloud elevation source: catalog plus local file cache.
pub struct PointCloudSampler {
    catalog: Vec<PointCloudRecord>,
    cache: PointCloudCache,
}

impl PointCloudSampler {
    pub fn new(catalog: Vec<PointCloudRecord>, cache: PointCloudCache) -> Self {
        Self { catalog, cache }
    }

    pub fn catalog(&self) -> &[PointCloudRecord] {
        &self.catalog
    }

    /// Fetches `record` and keeps only its ground points.
    ///
    /// Every LAS point carries a classification, so the filter always
    /// runs; unclassified files fall back to all points.
    pub fn load_and_filter(
        &self,
        record: &PointCloudRecord,
        config: &Config,
    ) -> Result<PointSet, TerrainError> {
        let path = self.cache.resolve(record)?;
        let points = PointSet::read(path, config.cloud_mode)?;
        if points.is_empty() {
            return Err(TerrainError::SourceUnavailable(format!(
                "point cloud {} has no points",
                record.filename
            )));
        }
        Ok(points.filter_ground(config.ground_class))
    }

    /// Matches, loads and samples a point cloud for a trail.
    pub fn extract_profile(
        &self,
        coords: &[Coord<f64>],
        trail_id: Option<&str>,
        reprojector: &Reprojector,
        config: &Config,
    ) -> Result<SourceResult, TerrainError> {
        let projected = reprojector.project(coords)?;
        let bbox = bounding_rect(&projected).ok_or(TerrainError::InsufficientData {
            required: 1,
            actual: 0,
        })?;
        let record = find_best_match(&bbox, &self.catalog, trail_id, config.min_overlap_ratio)
            .ok_or(TerrainError::NoPointCloudMatch)?;

        let points = self.load_and_filter(record, config)?;
        let profile = profile_point_set(&points, coords, &projected, config)?;

        let result = SourceResult::available(profile.series).with_details(
            SourceDetails::PointCloud {
                file: record.filename.clone(),
                points: points.len(),
                coverage_percent: profile.coverage_percent,
                search_radius_m: config.search_radius_m,
                relative_coordinates: profile.relative,
            },
        );
        Ok(if profile.relative {
            result.with_note(RELATIVE_NOTE)
        } else {
            result
        })
    }
}
