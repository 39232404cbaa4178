use crate::{ElevationSeries, TerrainError};
use geo::{
    algorithm::HaversineDistance,
    geometry::{Coord, Point},
};
use serde::{Deserialize, Serialize};
use std::{fs::File, io::BufReader, path::Path};

/// Trails starting within this many meters of each other are
/// probably the same trail uploaded twice.
pub const DUPLICATE_START_RADIUS_M: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrailPoint {
    pub lat: f64,
    pub lon: f64,

    /// Elevation recorded by the track, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elevation: Option<f64>,
}

impl TrailPoint {
    pub fn coord(&self) -> Coord<f64> {
        Coord {
            x: self.lon,
            y: self.lat,
        }
    }

    /// Returns true if `other` lies within `radius_m` meters.
    pub fn is_near(&self, other: &Self, radius_m: f64) -> bool {
        Point::from(self.coord()).haversine_distance(&Point::from(other.coord())) <= radius_m
    }
}

/// An ordered path. Point order is path order and is never changed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trail {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    pub points: Vec<TrailPoint>,
}

impl Trail {
    pub fn new(points: Vec<TrailPoint>) -> Self {
        Self {
            id: None,
            name: None,
            points,
        }
    }

    /// Reads a trail from a JSON file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, TerrainError> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    /// Returns this trail's coordinates as `x = lon, y = lat`.
    pub fn coords(&self) -> Vec<Coord<f64>> {
        self.points.iter().map(TrailPoint::coord).collect()
    }

    /// Checks every coordinate is a real position on earth.
    pub fn validate(&self) -> Result<(), TerrainError> {
        self.points
            .iter()
            .try_for_each(|point| validate_coord(point.coord()))
    }

    pub fn distances_km(&self) -> Vec<f64> {
        cumulative_distances_km(&self.coords())
    }

    pub fn total_distance_km(&self) -> f64 {
        self.distances_km().last().copied().unwrap_or(0.0)
    }

    /// Returns the track's own elevation series.
    ///
    /// `None` unless there is exactly one elevation per coordinate.
    pub fn track_series(&self) -> Option<ElevationSeries> {
        if self.points.is_empty() {
            return None;
        }
        let elevations = self
            .points
            .iter()
            .map(|point| point.elevation)
            .collect::<Option<Vec<f64>>>()?;
        ElevationSeries::new(self.distances_km(), elevations).ok()
    }

    /// Returns true if both trails start within `radius_m` meters.
    pub fn starts_near(&self, other: &Self, radius_m: f64) -> bool {
        match (self.points.first(), other.points.first()) {
            (Some(a), Some(b)) => a.is_near(b, radius_m),
            _ => false,
        }
    }
}

/// Rejects non-finite or out of range lat/lon.
pub fn validate_coord(coord: Coord<f64>) -> Result<(), TerrainError> {
    let (lon, lat) = (coord.x, coord.y);
    let valid = lon.is_finite()
        && lat.is_finite()
        && (-90.0..=90.0).contains(&lat)
        && (-180.0..=180.0).contains(&lon);
    if valid {
        Ok(())
    } else {
        Err(TerrainError::InvalidCoordinate { lat, lon })
    }
}

/// Cumulative great circle distance along `coords`, in kilometers.
///
/// Same length as `coords`, starts at 0, never decreases.
pub fn cumulative_distances_km(coords: &[Coord<f64>]) -> Vec<f64> {
    let mut total = 0.0;
    let mut distances = Vec::with_capacity(coords.len());
    let mut prev: Option<Point<f64>> = None;
    for coord in coords {
        let point = Point::from(*coord);
        if let Some(prev) = prev {
            total += prev.haversine_distance(&point) / 1000.0;
        }
        distances.push(total);
        prev = Some(point);
    }
    distances
}
