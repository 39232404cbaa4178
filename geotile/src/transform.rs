use crate::{GeoTileError, C};
use geo::geometry::Coord;

/// Affine mapping from raster (column, row) space to model space.
///
/// ```text
/// x = origin_x + col * pixel_width + row * rotation_x
/// y = origin_y + col * rotation_y  + row * pixel_height
/// ```
///
/// `(col, row) = (0, 0)` is the outer corner of the first sample, so
/// the center of sample `(c, r)` is at `(c + 0.5, r + 0.5)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    pub origin_x: C,
    pub pixel_width: C,
    pub rotation_x: C,
    pub origin_y: C,
    pub rotation_y: C,
    /// Usually negative: rows advance southwards.
    pub pixel_height: C,
}

impl GeoTransform {
    /// Returns a north-up transform with square-ish pixels.
    pub fn north_up(origin: Coord<C>, pixel_width: C, pixel_height: C) -> Self {
        Self {
            origin_x: origin.x,
            pixel_width,
            rotation_x: 0.0,
            origin_y: origin.y,
            rotation_y: 0.0,
            pixel_height: -pixel_height.abs(),
        }
    }

    /// Builds a transform from a 16 element row-major
    /// `ModelTransformation` matrix.
    pub fn from_matrix(m: &[C]) -> Option<Self> {
        (m.len() >= 8).then(|| Self {
            origin_x: m[3],
            pixel_width: m[0],
            rotation_x: m[1],
            origin_y: m[7],
            rotation_y: m[4],
            pixel_height: m[5],
        })
    }

    /// Builds a transform from `ModelPixelScale` and one `ModelTiepoint`.
    pub fn from_tiepoint(scale: &[C], tiepoint: &[C]) -> Option<Self> {
        if scale.len() < 2 || tiepoint.len() < 6 {
            return None;
        }
        let (i, j, x, y) = (tiepoint[0], tiepoint[1], tiepoint[3], tiepoint[4]);
        Some(Self {
            origin_x: x - i * scale[0],
            pixel_width: scale[0],
            rotation_x: 0.0,
            origin_y: y + j * scale[1],
            rotation_y: 0.0,
            pixel_height: -scale[1],
        })
    }

    /// Row-major 4x4 `ModelTransformation` matrix.
    pub fn to_matrix(&self) -> [C; 16] {
        [
            self.pixel_width,
            self.rotation_x,
            0.0,
            self.origin_x,
            self.rotation_y,
            self.pixel_height,
            0.0,
            self.origin_y,
            0.0,
            0.0,
            0.0,
            0.0,
            0.0,
            0.0,
            0.0,
            1.0,
        ]
    }

    pub fn pixel_to_geo(&self, col: C, row: C) -> Coord<C> {
        Coord {
            x: self.origin_x + col * self.pixel_width + row * self.rotation_x,
            y: self.origin_y + col * self.rotation_y + row * self.pixel_height,
        }
    }

    /// Returns fractional `(col, row)` for a model space coordinate.
    pub fn geo_to_pixel(&self, Coord { x, y }: Coord<C>) -> Result<(C, C), GeoTileError> {
        let det = self.pixel_width * self.pixel_height - self.rotation_x * self.rotation_y;
        if det.abs() < 1e-12 {
            return Err(GeoTileError::Transform);
        }
        let (dx, dy) = (x - self.origin_x, y - self.origin_y);
        let col = (self.pixel_height * dx - self.rotation_x * dy) / det;
        let row = (self.pixel_width * dy - self.rotation_y * dx) / det;
        Ok((col, row))
    }
}
