//! Walking surface estimation and difficulty.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Surface {
    Paved,
    Boardwalk,
    Concrete,
    Dirt,
    Gravel,
    Grass,
    Soil,
    ForestFloor,
    CrushedStone,
    WoodChips,
    TallGrass,
    Sand,
    Mud,
    LooseGravel,
    Scree,
    Snow,
    Rock,
    Boulder,
    Swamp,
    Ice,
    Unknown,
}

impl Surface {
    /// Effort relative to a dirt trail.
    pub fn multiplier(self) -> f64 {
        match self {
            Self::Paved => 0.7,
            Self::Boardwalk => 0.8,
            Self::Concrete => 0.75,
            Self::Dirt | Self::Gravel | Self::Grass | Self::Unknown => 1.0,
            Self::Soil | Self::CrushedStone => 1.1,
            Self::ForestFloor => 1.15,
            Self::WoodChips => 1.2,
            Self::TallGrass => 1.25,
            Self::LooseGravel => 1.3,
            Self::Sand | Self::Snow => 1.4,
            Self::Mud => 1.5,
            Self::Scree => 1.6,
            Self::Rock => 1.7,
            Self::Boulder => 1.8,
            Self::Swamp => 1.9,
            Self::Ice => 2.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Paved => "paved",
            Self::Boardwalk => "boardwalk",
            Self::Concrete => "concrete",
            Self::Dirt => "dirt",
            Self::Gravel => "gravel",
            Self::Grass => "grass",
            Self::Soil => "soil",
            Self::ForestFloor => "forest_floor",
            Self::CrushedStone => "crushed_stone",
            Self::WoodChips => "wood_chips",
            Self::TallGrass => "tall_grass",
            Self::Sand => "sand",
            Self::Mud => "mud",
            Self::LooseGravel => "loose_gravel",
            Self::Scree => "scree",
            Self::Snow => "snow",
            Self::Rock => "rock",
            Self::Boulder => "boulder",
            Self::Swamp => "swamp",
            Self::Ice => "ice",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Surface {
    type Err = std::convert::Infallible;

    /// Unrecognised names parse as [`Surface::Unknown`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Ok(match lower.as_str() {
            "paved" => Self::Paved,
            "boardwalk" => Self::Boardwalk,
            "concrete" => Self::Concrete,
            "dirt" => Self::Dirt,
            "gravel" => Self::Gravel,
            "grass" => Self::Grass,
            "soil" => Self::Soil,
            "forest_floor" => Self::ForestFloor,
            "crushed_stone" => Self::CrushedStone,
            "wood_chips" => Self::WoodChips,
            "tall_grass" => Self::TallGrass,
            "sand" => Self::Sand,
            "mud" => Self::Mud,
            "loose_gravel" => Self::LooseGravel,
            "scree" => Self::Scree,
            "snow" => Self::Snow,
            "rock" => Self::Rock,
            "boulder" => Self::Boulder,
            "swamp" => Self::Swamp,
            "ice" => Self::Ice,
            _ => Self::Unknown,
        })
    }
}

/// Share of a trail on one surface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SurfaceShare {
    pub surface: Surface,
    pub percentage: f64,
}

const fn share(surface: Surface, percentage: f64) -> SurfaceShare {
    SurfaceShare {
        surface,
        percentage,
    }
}

/// Guesses a surface mix from elevation alone.
///
/// Without surveyed surface data, high and rough terrain is taken to
/// be rocky, high and smooth to be alpine meadow, mid-height and rough
/// to be forest, and low terrain to be coastal.
pub fn estimate_surfaces(elevations: &[f64]) -> Vec<SurfaceShare> {
    use Surface::{Dirt, ForestFloor, Grass, Gravel, Rock, Sand, Scree, Soil};

    if elevations.is_empty() {
        return vec![share(Dirt, 60.0), share(Gravel, 25.0), share(Grass, 15.0)];
    }

    #[allow(clippy::cast_precision_loss)]
    let n = elevations.len() as f64;
    let mean = elevations.iter().sum::<f64>() / n;
    let variance = elevations.iter().map(|e| (e - mean).powi(2)).sum::<f64>() / n;

    if mean > 800.0 && variance > 1000.0 {
        vec![share(Rock, 40.0), share(Dirt, 35.0), share(Scree, 25.0)]
    } else if mean > 800.0 {
        vec![share(Grass, 50.0), share(Dirt, 30.0), share(Rock, 20.0)]
    } else if mean > 200.0 && variance > 500.0 {
        vec![share(ForestFloor, 60.0), share(Dirt, 30.0), share(Soil, 10.0)]
    } else if mean < 100.0 {
        vec![share(Dirt, 50.0), share(Sand, 30.0), share(Grass, 20.0)]
    } else {
        vec![share(Dirt, 70.0), share(Gravel, 20.0), share(Grass, 10.0)]
    }
}

/// Percentage weighted mean multiplier; 1.0 when there is nothing to
/// weigh.
pub fn surface_difficulty(shares: &[SurfaceShare]) -> f64 {
    let total: f64 = shares.iter().map(|s| s.percentage).sum();
    if total <= 0.0 {
        return 1.0;
    }
    shares
        .iter()
        .map(|s| s.surface.multiplier() * s.percentage)
        .sum::<f64>()
        / total
}
