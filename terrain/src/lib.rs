pub mod align;
mod analysis;
mod config;
mod error;
mod math;
pub mod metrics;
pub mod pointcloud;
mod reproject;
mod series;
mod sources;
mod tiles;
mod trail;

pub use crate::{
    analysis::{rank_similar, SimilarTrail, TrailSummary, SIMILAR_LIMIT},
    config::{Config, GDA94_GEOGRAPHIC, GDA94_MGA56},
    error::TerrainError,
    metrics::TerrainMetrics,
    pointcloud::{PointCloudCache, PointCloudRecord, PointCloudSampler},
    reproject::{bounding_rect, Reprojector},
    series::{ElevationSeries, SourceDetails, SourceName, SourceReport, SourceResult},
    sources::{ElevationSources, ElevationSourcesBuilder, SourcesReport, SourcesSummary},
    tiles::{RasterTileIndex, RasterTileRecord, TileMode},
    trail::{
        cumulative_distances_km, validate_coord, Trail, TrailPoint, DUPLICATE_START_RADIUS_M,
    },
};
