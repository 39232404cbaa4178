//! Single-band GeoTIFF elevation tiles.
//!
//! Only the tags needed to place a north-up (or affine) grid in model
//! space are understood; the CRS itself is whatever the caller says it
//! is.
//!
//! # References
//!
//! 1. [OGC GeoTIFF standard](https://docs.ogc.org/is/19-008r4/19-008r4.html)
//! 1. [GDAL GeoTIFF driver, nodata](https://gdal.org/drivers/raster/gtiff.html#nodata-value)

mod error;
mod transform;

pub use crate::{error::GeoTileError, transform::GeoTransform};
use geo::geometry::{Coord, Rect};
use memmap2::Mmap;
use std::{
    fs::File,
    io::{BufReader, BufWriter, Cursor, Read, Seek},
    path::Path,
};
use tiff::{
    decoder::{Decoder, DecodingResult, Limits},
    encoder::{colortype::Gray32Float, TiffEncoder},
    tags::Tag,
    ColorType,
};

/// Base floating point type used for all model space coordinates.
pub type C = f64;

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const MODEL_TRANSFORMATION: u16 = 34264;
const GDAL_NODATA: u16 = 42113;

/// Georeferencing read from a tile without decoding its samples.
#[derive(Debug, Clone, PartialEq)]
pub struct TileHeader {
    pub transform: GeoTransform,
    /// Number of (columns, rows).
    pub dimensions: (usize, usize),
    pub nodata: Option<f32>,
}

impl TileHeader {
    /// Returns this grid's extent in model space.
    pub fn bounds(&self) -> Rect<C> {
        extent(&self.transform, self.dimensions)
    }
}

pub struct Tile {
    transform: GeoTransform,

    /// Number of (columns, rows) in this tile.
    dimensions: (usize, usize),

    /// Sample value meaning "no measurement here".
    nodata: Option<f32>,

    /// Row-major elevation samples.
    samples: Box<[f32]>,
}

impl Tile {
    /// Returns a Tile read into memory from the file at `path`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, GeoTileError> {
        let path = path.as_ref();
        let file = BufReader::new(File::open(path)?);
        decode(Decoder::new(file)?, path)
    }

    /// Returns a Tile decoded straight out of a memory-mapped file.
    pub fn memmap<P: AsRef<Path>>(path: P) -> Result<Self, GeoTileError> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };
        decode(Decoder::new(Cursor::new(&mmap[..]))?, path)
    }

    /// Reads only the georeferencing of the file at `path`.
    pub fn header<P: AsRef<Path>>(path: P) -> Result<TileHeader, GeoTileError> {
        let path = path.as_ref();
        let mut decoder = Decoder::new(BufReader::new(File::open(path)?))?;
        read_header(&mut decoder, path)
    }

    pub fn from_parts(
        transform: GeoTransform,
        dimensions @ (cols, rows): (usize, usize),
        nodata: Option<f32>,
        samples: Vec<f32>,
    ) -> Result<Self, GeoTileError> {
        if samples.len() != cols * rows {
            return Err(GeoTileError::Dimensions {
                cols,
                rows,
                samples: samples.len(),
            });
        }
        Ok(Self {
            transform,
            dimensions,
            nodata,
            samples: samples.into_boxed_slice(),
        })
    }

    /// Writes this tile as a single-band `f32` GeoTIFF.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), GeoTileError> {
        let file = BufWriter::new(File::create(path)?);
        let mut encoder = TiffEncoder::new(file)?;
        let (cols, rows) = self.dimensions;
        #[allow(clippy::cast_possible_truncation)]
        let mut image = encoder.new_image::<Gray32Float>(cols as u32, rows as u32)?;
        image
            .encoder()
            .write_tag(tag(MODEL_TRANSFORMATION), &self.transform.to_matrix()[..])?;
        if let Some(nodata) = self.nodata {
            image
                .encoder()
                .write_tag(tag(GDAL_NODATA), nodata.to_string().as_str())?;
        }
        image.write_data(&self.samples)?;
        Ok(())
    }

    /// Returns the number of samples in this tile.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn dimensions(&self) -> (usize, usize) {
        self.dimensions
    }

    pub fn nodata(&self) -> Option<f32> {
        self.nodata
    }

    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    /// Returns this tile's extent in model space.
    pub fn bounds(&self) -> Rect<C> {
        extent(&self.transform, self.dimensions)
    }

    /// Returns true if `value` is this tile's sentinel or NaN.
    pub fn is_nodata(&self, value: f32) -> bool {
        value.is_nan() || self.nodata == Some(value)
    }

    /// Returns the elevation sample containing `coord`.
    ///
    /// `None` when `coord` falls outside the grid or lands on a no-data
    /// sample.
    pub fn get(&self, coord: Coord<C>) -> Option<f32> {
        let (col, row) = self.transform.geo_to_pixel(coord).ok()?;
        let (col, row) = (col.floor(), row.floor());
        if !(col >= 0.0 && row >= 0.0) {
            return None;
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let (col, row) = (col as usize, row as usize);
        let (cols, rows) = self.dimensions;
        if col >= cols || row >= rows {
            return None;
        }
        let value = self.samples[row * cols + col];
        (!self.is_nodata(value)).then_some(value)
    }
}

fn tag(code: u16) -> Tag {
    Tag::from_u16_exhaustive(code)
}

#[allow(clippy::cast_precision_loss)]
fn extent(transform: &GeoTransform, (cols, rows): (usize, usize)) -> Rect<C> {
    let (cols, rows) = (cols as C, rows as C);
    let corners = [
        transform.pixel_to_geo(0.0, 0.0),
        transform.pixel_to_geo(cols, 0.0),
        transform.pixel_to_geo(0.0, rows),
        transform.pixel_to_geo(cols, rows),
    ];
    let (mut min, mut max) = (corners[0], corners[0]);
    for Coord { x, y } in &corners[1..] {
        min.x = min.x.min(*x);
        min.y = min.y.min(*y);
        max.x = max.x.max(*x);
        max.y = max.y.max(*y);
    }
    Rect::new(min, max)
}

fn read_header<R: Read + Seek>(
    decoder: &mut Decoder<R>,
    path: &Path,
) -> Result<TileHeader, GeoTileError> {
    let (width, height) = decoder.dimensions()?;

    let transform = match decoder.find_tag(tag(MODEL_TRANSFORMATION))? {
        Some(matrix) => GeoTransform::from_matrix(&matrix.into_f64_vec()?),
        None => {
            let scale = decoder.find_tag(tag(MODEL_PIXEL_SCALE))?;
            let tiepoint = decoder.find_tag(tag(MODEL_TIEPOINT))?;
            match (scale, tiepoint) {
                (Some(scale), Some(tiepoint)) => {
                    GeoTransform::from_tiepoint(&scale.into_f64_vec()?, &tiepoint.into_f64_vec()?)
                }
                _ => None,
            }
        }
    }
    .ok_or_else(|| GeoTileError::Georeference(path.to_owned()))?;

    #[allow(clippy::cast_possible_truncation)]
    let nodata = decoder
        .find_tag(tag(GDAL_NODATA))?
        .map(tiff::decoder::ifd::Value::into_string)
        .transpose()?
        .and_then(|text| text.trim_matches(char::from(0)).trim().parse::<f64>().ok())
        .map(|value| value as f32);

    Ok(TileHeader {
        transform,
        dimensions: (width as usize, height as usize),
        nodata,
    })
}

fn decode<R: Read + Seek>(decoder: Decoder<R>, path: &Path) -> Result<Tile, GeoTileError> {
    let mut decoder = decoder.with_limits(Limits::unlimited());
    if !matches!(decoder.colortype()?, ColorType::Gray(_)) {
        return Err(GeoTileError::Bands(path.to_owned()));
    }
    let TileHeader {
        transform,
        dimensions,
        nodata,
    } = read_header(&mut decoder, path)?;

    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    let samples: Vec<f32> = match decoder.read_image()? {
        DecodingResult::U8(raw) => raw.into_iter().map(f32::from).collect(),
        DecodingResult::U16(raw) => raw.into_iter().map(f32::from).collect(),
        DecodingResult::U32(raw) => raw.into_iter().map(|v| v as f32).collect(),
        DecodingResult::U64(raw) => raw.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I8(raw) => raw.into_iter().map(f32::from).collect(),
        DecodingResult::I16(raw) => raw.into_iter().map(f32::from).collect(),
        DecodingResult::I32(raw) => raw.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I64(raw) => raw.into_iter().map(|v| v as f32).collect(),
        DecodingResult::F32(raw) => raw,
        DecodingResult::F64(raw) => raw.into_iter().map(|v| v as f32).collect(),
    };

    Tile::from_parts(transform, dimensions, nodata, samples)
}

#[cfg(test)]
mod tests {
    use super::{Coord, GeoTransform, Tile};
    use approx::assert_relative_eq;

    /// 4x3 grid of 10 m pixels, NW corner at (1000, 2000).
    fn fixture() -> Tile {
        let mut samples = (0..12).map(|i| 100.0 + i as f32).collect::<Vec<_>>();
        samples[5] = -9999.0;
        Tile::from_parts(
            GeoTransform::north_up(Coord { x: 1000.0, y: 2000.0 }, 10.0, 10.0),
            (4, 3),
            Some(-9999.0),
            samples,
        )
        .unwrap()
    }

    #[test]
    fn test_bounds() {
        let tile = fixture();
        let bounds = tile.bounds();
        assert_relative_eq!(bounds.min().x, 1000.0);
        assert_relative_eq!(bounds.max().x, 1040.0);
        assert_relative_eq!(bounds.min().y, 1970.0);
        assert_relative_eq!(bounds.max().y, 2000.0);
        assert_eq!(tile.len(), 12);
    }

    #[test]
    fn test_get() {
        let tile = fixture();
        // Row 0, col 0.
        assert_eq!(tile.get(Coord { x: 1001.0, y: 1999.0 }), Some(100.0));
        // Row 2, col 3.
        assert_eq!(tile.get(Coord { x: 1035.0, y: 1975.0 }), Some(111.0));
        // Row 1, col 1 is the sentinel.
        assert_eq!(tile.get(Coord { x: 1015.0, y: 1985.0 }), None);
        // Outside on every side.
        assert_eq!(tile.get(Coord { x: 999.0, y: 1990.0 }), None);
        assert_eq!(tile.get(Coord { x: 1041.0, y: 1990.0 }), None);
        assert_eq!(tile.get(Coord { x: 1010.0, y: 2001.0 }), None);
        assert_eq!(tile.get(Coord { x: 1010.0, y: 1969.0 }), None);
    }

    #[test]
    fn test_get_is_deterministic() {
        let tile = fixture();
        let coord = Coord { x: 1027.3, y: 1981.9 };
        assert_eq!(tile.get(coord), tile.get(coord));
    }

    #[test]
    fn test_nan_is_nodata() {
        let tile = Tile::from_parts(
            GeoTransform::north_up(Coord { x: 0.0, y: 1.0 }, 1.0, 1.0),
            (1, 1),
            None,
            vec![f32::NAN],
        )
        .unwrap();
        assert_eq!(tile.get(Coord { x: 0.5, y: 0.5 }), None);
    }

    #[test]
    fn test_dimension_mismatch() {
        let result = Tile::from_parts(
            GeoTransform::north_up(Coord { x: 0.0, y: 0.0 }, 1.0, 1.0),
            (3, 3),
            None,
            vec![0.0; 8],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fixture.tif");
        let tile = fixture();
        tile.save(&path).unwrap();

        let header = Tile::header(&path).unwrap();
        assert_eq!(header.dimensions, (4, 3));
        assert_eq!(header.nodata, Some(-9999.0));
        assert_eq!(header.bounds(), tile.bounds());

        for loaded in [Tile::load(&path).unwrap(), Tile::memmap(&path).unwrap()] {
            assert_eq!(loaded.transform(), tile.transform());
            assert_eq!(loaded.get(Coord { x: 1035.0, y: 1975.0 }), Some(111.0));
            assert_eq!(loaded.get(Coord { x: 1015.0, y: 1985.0 }), None);
        }
    }
}
