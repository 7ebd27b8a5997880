//! Shared primitive types used across the entire simulation.

use serde::{Deserialize, Serialize};

/// Simulated seconds since the clock was started.
pub type SimTime = f64;

/// A stable, unique identifier for any entity in the registry.
/// Ids are handed out in ascending order, so ordering by id is
/// registry insertion order.
pub type EntityId = u64;

/// Identifier of a road-network node, as supplied by the importer.
pub type NodeId = i64;

/// Identifier of a district, as supplied by the importer.
pub type DistrictId = i64;

/// The canonical run identifier.
pub type RunId = String;

/// A (latitude, longitude) pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude:  f64,
    pub longitude: f64,
}

impl Coordinate {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Great-circle distance in meters.
    pub fn distance_to(&self, other: &Coordinate) -> f64 {
        crate::geometry::haversine(*self, *other)
    }
}

impl std::fmt::Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.6}, {:.6})", self.latitude, self.longitude)
    }
}
