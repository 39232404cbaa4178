//! Gridded elevation tile catalog.

use crate::{
    reproject::bounding_rect,
    series::{fill_gaps, SourceDetails},
    trail::cumulative_distances_km,
    ElevationSeries, Reprojector, SourceResult, TerrainError,
};
use dashmap::DashMap;
use geo::geometry::{Coord, Rect};
use geotile::Tile;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::{
    ffi::OsStr,
    path::{Path, PathBuf},
    sync::Arc,
    time::Instant,
};

/// Floating point type used for tile lookup.
pub type C = f64;

/// A tile file and where it sits in the planar CRS.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterTileRecord {
    pub path: PathBuf,
    pub bounds: Rect<C>,
    pub nodata: Option<f32>,
}

impl RasterTileRecord {
    /// Reads a record from the tile's header.
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self, TerrainError> {
        let path = path.as_ref();
        let header = Tile::header(path)?;
        Ok(Self {
            path: path.to_owned(),
            bounds: header.bounds(),
            nodata: header.nodata,
        })
    }

    fn contains(&self, Coord { x, y }: Coord<C>) -> bool {
        let (min, max) = (self.bounds.min(), self.bounds.max());
        min.x <= x && x <= max.x && min.y <= y && y <= max.y
    }

    fn intersects(&self, other: &Rect<C>) -> bool {
        let (min, max) = (self.bounds.min(), self.bounds.max());
        min.x <= other.max().x
            && max.x >= other.min().x
            && min.y <= other.max().y
            && max.y >= other.min().y
    }
}

/// Read-only catalog of elevation tiles.
///
/// Catalog order is tile precedence: where tiles overlap, the first
/// one with a valid pixel wins.
pub struct RasterTileIndex {
    records: Vec<RasterTileRecord>,

    /// How to load tiles (in-memory or mapped).
    tile_mode: TileMode,

    /// Tiles which have been loaded on demand.
    tiles: DashMap<PathBuf, Arc<Tile>>,
}

impl RasterTileIndex {
    pub fn new(records: Vec<RasterTileRecord>, tile_mode: TileMode) -> Self {
        Self {
            records,
            tile_mode,
            tiles: DashMap::new(),
        }
    }

    /// Indexes every GeoTIFF under `tile_dir`, ordered by path.
    pub fn scan<P: AsRef<Path>>(tile_dir: P, tile_mode: TileMode) -> Result<Self, TerrainError> {
        let tile_dir = tile_dir.as_ref();
        let now = Instant::now();
        let mut paths = Vec::new();
        collect_paths(tile_dir, &["tif", "tiff"], &mut paths)?;
        paths.sort();

        let mut records = Vec::with_capacity(paths.len());
        for path in paths {
            match RasterTileRecord::read(&path) {
                Ok(record) => records.push(record),
                Err(e) => warn!("skipping unreadable tile {path:?}: {e}"),
            }
        }

        if records.is_empty() {
            return Err(TerrainError::Path(tile_dir.to_owned()));
        }
        debug!(
            "indexed {} tiles in {tile_dir:?}, exec: {:?}",
            records.len(),
            now.elapsed()
        );
        Ok(Self::new(records, tile_mode))
    }

    pub fn records(&self) -> &[RasterTileRecord] {
        &self.records
    }

    /// Returns every tile whose bounds intersect `bbox`, in catalog
    /// order.
    pub fn find_covering_tiles(&self, bbox: &Rect<C>) -> Vec<&RasterTileRecord> {
        self.records
            .iter()
            .filter(|record| record.intersects(bbox))
            .collect()
    }

    /// Returns the decoded tile for `record`.
    ///
    /// Tiles are read from disk the first time they are asked for.
    pub fn get(&self, record: &RasterTileRecord) -> Result<Arc<Tile>, TerrainError> {
        self.tiles
            .entry(record.path.clone())
            .or_try_insert_with(|| {
                debug!("loading {:?}", record.path);
                let tile = match self.tile_mode {
                    TileMode::InMem => Tile::load(&record.path)?,
                    TileMode::MemMap => Tile::memmap(&record.path)?,
                };
                Ok(Arc::new(tile))
            })
            .map(|r| r.clone())
    }

    /// Returns the elevation at projected `point` from the first of
    /// `tiles` that has a valid pixel there.
    pub fn sample(&self, point: Coord<C>, tiles: &[&RasterTileRecord]) -> Option<f64> {
        tiles
            .iter()
            .filter(|record| record.contains(point))
            .find_map(|record| {
                let tile = self
                    .get(record)
                    .map_err(|e| warn!("skipping tile {:?}: {e}", record.path))
                    .ok()?;
                tile.get(point)
                    .filter(|value| record.nodata != Some(*value))
                    .map(f64::from)
            })
    }

    /// Samples one elevation per trail coordinate.
    ///
    /// Points without a valid pixel repeat the previous sample so the
    /// series keeps the trail's length.
    pub fn extract_profile(
        &self,
        coords: &[Coord<C>],
        reprojector: &Reprojector,
    ) -> Result<SourceResult, TerrainError> {
        let now = Instant::now();
        let projected = reprojector.project(coords)?;
        let bbox = bounding_rect(&projected).ok_or(TerrainError::InsufficientData {
            required: 1,
            actual: 0,
        })?;

        let tiles = self.find_covering_tiles(&bbox);
        if tiles.is_empty() {
            return Err(TerrainError::NoTileCoverage);
        }

        let samples: Vec<Option<f64>> = projected
            .iter()
            .map(|point| self.sample(*point, &tiles))
            .collect();
        let valid_samples = samples.iter().flatten().count();
        let elevations = fill_gaps(&samples).ok_or_else(|| {
            TerrainError::SourceUnavailable(format!(
                "no valid elevation samples in {} covering tiles",
                tiles.len()
            ))
        })?;

        debug!(
            "raster profile; points: {}, valid: {valid_samples}, tiles: {}, exec: {:?}",
            samples.len(),
            tiles.len(),
            now.elapsed()
        );

        let series = ElevationSeries::new(cumulative_distances_km(coords), elevations)?;
        Ok(SourceResult::available(series).with_details(SourceDetails::Raster {
            tiles_used: tiles.len(),
            valid_samples,
        }))
    }
}

/// Recursively collects files under `dir` whose extension is one of
/// `extensions`, ignoring case.
pub(crate) fn collect_paths(
    dir: &Path,
    extensions: &[&str],
    found: &mut Vec<PathBuf>,
) -> Result<(), TerrainError> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_paths(&path, extensions, found)?;
        } else if path
            .extension()
            .and_then(OsStr::to_str)
            .is_some_and(|ext| extensions.iter().any(|want| ext.eq_ignore_ascii_case(want)))
        {
            found.push(path);
        }
    }
    Ok(())
}

/// How to handle tile and point-cloud files.
///
/// The trade off between loading file data into memory versus memory
/// mapping is not obvious, and you should measure both before
/// deciding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TileMode {
    /// Read the file into memory.
    ///
    /// Note that this can consume gigabytes of RAM when loading many
    /// tiles.
    InMem,

    /// Memory map file contents.
    MemMap,
}

#[cfg(test)]
pub(crate) mod tests {
    use super::{Coord, RasterTileIndex, RasterTileRecord, TileMode};
    use crate::{Config, Reprojector, SourceDetails, SourceResult, TerrainError};
    use geo::geometry::Rect;
    use geotile::{GeoTransform, Tile};
    use std::path::Path;

    /// Writes a 20x20 grid of 100 m pixels with NW corner (250000,
    /// 6265000) in MGA zone 56; each pixel is `base + col`.
    pub(crate) fn write_tile(
        path: &Path,
        origin: Coord<f64>,
        base: f32,
        hole: Option<(usize, usize)>,
    ) {
        let mut samples: Vec<f32> = (0..400).map(|i| base + (i % 20) as f32).collect();
        if let Some((col, row)) = hole {
            samples[row * 20 + col] = -9999.0;
        }
        Tile::from_parts(
            GeoTransform::north_up(origin, 100.0, 100.0),
            (20, 20),
            Some(-9999.0),
            samples,
        )
        .unwrap()
        .save(path)
        .unwrap();
    }

    const ORIGIN: Coord = Coord {
        x: 250_000.0,
        y: 6_265_000.0,
    };

    /// Projects to roughly (250957, 6264313): col 9, row 6.
    const KATOOMBA: Coord = Coord {
        x: 150.3120,
        y: -33.7320,
    };

    #[test]
    fn test_scan_orders_by_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        write_tile(&dir.path().join("b.tif"), ORIGIN, 0.0, None);
        write_tile(&dir.path().join("nested/a.TIFF"), ORIGIN, 0.0, None);
        std::fs::write(dir.path().join("readme.txt"), "not a tile").unwrap();

        let index = RasterTileIndex::scan(dir.path(), TileMode::InMem).unwrap();
        let names: Vec<_> = index
            .records()
            .iter()
            .map(|r| r.path.strip_prefix(dir.path()).unwrap().to_owned())
            .collect();
        assert_eq!(names.len(), 2);
        assert!(names[0].ends_with("b.tif"));
        assert!(names[1].ends_with("a.TIFF"));
    }

    #[test]
    fn test_scan_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            RasterTileIndex::scan(dir.path(), TileMode::MemMap),
            Err(TerrainError::Path(_))
        ));
    }

    #[test]
    fn test_find_covering_tiles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tile.tif");
        write_tile(&path, ORIGIN, 0.0, None);
        let index = RasterTileIndex::new(
            vec![RasterTileRecord::read(&path).unwrap()],
            TileMode::MemMap,
        );

        let inside = Rect::new(
            Coord { x: 251_000.0, y: 6_264_000.0 },
            Coord { x: 253_000.0, y: 6_266_000.0 },
        );
        let outside = Rect::new(
            Coord { x: 260_000.0, y: 6_264_000.0 },
            Coord { x: 261_000.0, y: 6_265_000.0 },
        );
        assert_eq!(index.find_covering_tiles(&inside).len(), 1);
        assert!(index.find_covering_tiles(&outside).is_empty());
    }

    #[test]
    fn test_sample() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tile.tif");
        write_tile(&path, ORIGIN, 500.0, None);
        let index = RasterTileIndex::scan(dir.path(), TileMode::MemMap).unwrap();
        let tiles: Vec<_> = index.records().iter().collect();

        let point = Coord { x: 250_957.0, y: 6_264_313.0 };
        assert_eq!(index.sample(point, &tiles), Some(509.0));
        assert_eq!(index.sample(point, &tiles), index.sample(point, &tiles));
        assert_eq!(index.sample(Coord { x: 0.0, y: 0.0 }, &tiles), None);
    }

    #[test]
    fn test_nodata_falls_through_to_next_tile() {
        let dir = tempfile::tempdir().unwrap();
        write_tile(&dir.path().join("a.tif"), ORIGIN, 500.0, Some((9, 6)));
        write_tile(&dir.path().join("b.tif"), ORIGIN, 700.0, None);
        let index = RasterTileIndex::scan(dir.path(), TileMode::InMem).unwrap();
        let tiles: Vec<_> = index.records().iter().collect();

        assert_eq!(index.sample(Coord { x: 250_957.0, y: 6_264_313.0 }, &tiles), Some(709.0));
        assert_eq!(index.sample(Coord { x: 251_057.0, y: 6_264_313.0 }, &tiles), Some(510.0));
    }

    #[test]
    fn test_extract_profile() {
        let dir = tempfile::tempdir().unwrap();
        write_tile(&dir.path().join("tile.tif"), ORIGIN, 500.0, None);
        let index = RasterTileIndex::scan(dir.path(), TileMode::MemMap).unwrap();
        let reprojector = Reprojector::from_config(&Config::default()).unwrap();

        // Second point is ~270 m east of the first (col 12); third is far
        // outside the tile.
        let coords = [
            KATOOMBA,
            Coord { x: 150.3149, y: -33.7320 },
            Coord { x: 150.5, y: -33.7320 },
        ];
        let result = index.extract_profile(&coords, &reprojector).unwrap();
        let SourceResult::Available { series, details, .. } = result else {
            panic!("expected raster series");
        };
        assert_eq!(series.len(), coords.len());
        assert_eq!(series.elevations()[0], 509.0);
        assert_eq!(series.elevations()[1], 512.0);
        // Carried forward.
        assert_eq!(series.elevations()[2], 512.0);
        assert_eq!(
            details,
            Some(SourceDetails::Raster {
                tiles_used: 1,
                valid_samples: 2
            })
        );
    }

    #[test]
    fn test_extract_profile_without_coverage() {
        let dir = tempfile::tempdir().unwrap();
        write_tile(&dir.path().join("tile.tif"), ORIGIN, 500.0, None);
        let index = RasterTileIndex::scan(dir.path(), TileMode::MemMap).unwrap();
        let reprojector = Reprojector::from_config(&Config::default()).unwrap();
        let far_away = [Coord { x: 152.0, y: -32.0 }, Coord { x: 152.01, y: -32.0 }];
        assert!(matches!(
            index.extract_profile(&far_away, &reprojector),
            Err(TerrainError::NoTileCoverage)
        ));
    }
}
