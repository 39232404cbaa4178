use crate::{trail::validate_coord, Config, TerrainError};
use geo::geometry::{Coord, Rect};
use proj4rs::{proj::Proj, transform::transform};

/// Fixed geographic to planar transform.
///
/// Every overlap and distance comparison in this crate happens in the
/// target CRS of a single `Reprojector`, so build one per request from
/// the shared [`Config`] rather than mixing instances.
pub struct Reprojector {
    source: Proj,
    target: Proj,
    source_is_geographic: bool,
    target_is_geographic: bool,
}

impl Reprojector {
    pub fn new(source: &str, target: &str) -> Result<Self, TerrainError> {
        let parse = |defn: &str| {
            Proj::from_proj_string(defn)
                .map_err(|e| TerrainError::Projection(format!("{defn}: {e:?}")))
        };
        Ok(Self {
            source: parse(source)?,
            target: parse(target)?,
            source_is_geographic: is_geographic(source),
            target_is_geographic: is_geographic(target),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, TerrainError> {
        Self::new(&config.source_proj, &config.target_proj)
    }

    /// Projects one `x = lon, y = lat` coordinate.
    pub fn project_one(&self, coord: Coord<f64>) -> Result<Coord<f64>, TerrainError> {
        validate_coord(coord)?;
        let mut point = if self.source_is_geographic {
            (coord.x.to_radians(), coord.y.to_radians(), 0.0)
        } else {
            (coord.x, coord.y, 0.0)
        };
        transform(&self.source, &self.target, &mut point)
            .map_err(|e| TerrainError::Projection(format!("{e:?}")))?;
        Ok(if self.target_is_geographic {
            Coord {
                x: point.0.to_degrees(),
                y: point.1.to_degrees(),
            }
        } else {
            Coord {
                x: point.0,
                y: point.1,
            }
        })
    }

    /// Projects `coords` in order; fails on the first invalid one.
    pub fn project(&self, coords: &[Coord<f64>]) -> Result<Vec<Coord<f64>>, TerrainError> {
        coords.iter().map(|coord| self.project_one(*coord)).collect()
    }
}

fn is_geographic(defn: &str) -> bool {
    defn.contains("+proj=longlat") || defn.contains("+proj=latlong")
}

/// Smallest rectangle containing every point.
pub fn bounding_rect(points: &[Coord<f64>]) -> Option<Rect<f64>> {
    let (first, rest) = points.split_first()?;
    let (min, max) = rest.iter().fold((*first, *first), |(min, max), p| {
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
    });
    Some(Rect::new(min, max))
}

#[cfg(test)]
mod tests {
    use super::{bounding_rect, Coord, Reprojector};
    use crate::{Config, TerrainError};
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_mga56() {
        let reprojector = Reprojector::from_config(&Config::default()).unwrap();
        let projected = reprojector
            .project(&[
                Coord {
                    x: 151.2153,
                    y: -33.8568,
                },
                Coord {
                    x: 150.3120,
                    y: -33.7320,
                },
            ])
            .unwrap();
        assert_abs_diff_eq!(projected[0].x, 334_900.57, epsilon = 0.5);
        assert_abs_diff_eq!(projected[0].y, 6_252_288.75, epsilon = 0.5);
        assert_abs_diff_eq!(projected[1].x, 250_956.90, epsilon = 0.5);
        assert_abs_diff_eq!(projected[1].y, 6_264_313.21, epsilon = 0.5);
    }

    #[test]
    fn test_invalid_coordinate() {
        let reprojector = Reprojector::from_config(&Config::default()).unwrap();
        assert!(matches!(
            reprojector.project(&[Coord { x: 151.0, y: 95.0 }]),
            Err(TerrainError::InvalidCoordinate { .. })
        ));
    }

    #[test]
    fn test_bounding_rect() {
        assert!(bounding_rect(&[]).is_none());
        let rect = bounding_rect(&[
            Coord { x: 3.0, y: -1.0 },
            Coord { x: -2.0, y: 4.0 },
            Coord { x: 0.0, y: 0.0 },
        ])
        .unwrap();
        assert_eq!(rect.min(), Coord { x: -2.0, y: -1.0 });
        assert_eq!(rect.max(), Coord { x: 3.0, y: 4.0 });
    }
}
