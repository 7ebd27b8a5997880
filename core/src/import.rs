//! Map loading.
//!
//! A map file is JSON: nodes with coordinates, edges between node ids and
//! districts with a boundary polygon. Edges without a length use the
//! great-circle distance between their ends; edges are two-way unless
//! marked `one_way`.

use crate::{
    district::{CityMap, District, ThreatLevel},
    error::SimResult,
    geometry::{haversine, meters_to_latitude, meters_to_longitude},
    road_network::{RoadEdge, RoadNetwork, RoadNode},
    types::{Coordinate, DistrictId, NodeId},
};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapEdge {
    pub source: NodeId,
    pub target: NodeId,
    #[serde(default)]
    pub length: Option<f64>,
    #[serde(default)]
    pub one_way: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapDistrict {
    pub id:       DistrictId,
    pub name:     String,
    #[serde(default)]
    pub threat:   ThreatLevel,
    pub boundary: Vec<Coordinate>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MapFile {
    pub nodes:     Vec<RoadNode>,
    #[serde(default)]
    pub edges:     Vec<MapEdge>,
    #[serde(default)]
    pub districts: Vec<MapDistrict>,
}

impl MapFile {
    pub fn load(path: impl AsRef<Path>) -> SimResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn into_city(self) -> SimResult<CityMap> {
        let position = |id: NodeId| self.nodes.iter().find(|n| n.id == id).map(|n| n.position);
        let mut edges = Vec::with_capacity(self.edges.len() * 2);
        for edge in &self.edges {
            let length = match (edge.length, position(edge.source), position(edge.target)) {
                (Some(length), _, _) => length,
                (None, Some(a), Some(b)) => haversine(a, b),
                // Let the network report the dangling end.
                (None, _, _) => 0.0,
            };
            edges.push(RoadEdge { source: edge.source, target: edge.target, length });
            if !edge.one_way {
                edges.push(RoadEdge { source: edge.target, target: edge.source, length });
            }
        }
        let network = RoadNetwork::new(self.nodes, &edges)?;
        let districts = self
            .districts
            .into_iter()
            .map(|d| District::new(d.id, d.name, d.boundary, d.threat))
            .collect();
        Ok(CityMap::new(network, districts))
    }
}

pub fn load_city(path: impl AsRef<Path>) -> SimResult<CityMap> {
    MapFile::load(path)?.into_city()
}

/// A `rows` x `cols` street grid with `spacing_m` between intersections,
/// south-west corner at `origin`, split into four quadrant districts of
/// rising threat.
pub fn synthetic_grid(rows: usize, cols: usize, spacing_m: f64, origin: Coordinate) -> MapFile {
    let d_lat = meters_to_latitude(spacing_m);
    let d_lon = meters_to_longitude(spacing_m, origin.latitude);
    let id = |r: usize, c: usize| (r * cols + c) as NodeId + 1;

    let mut nodes = Vec::with_capacity(rows * cols);
    let mut edges = Vec::new();
    for r in 0..rows {
        for c in 0..cols {
            nodes.push(RoadNode {
                id:       id(r, c),
                position: Coordinate::new(origin.latitude + r as f64 * d_lat, origin.longitude + c as f64 * d_lon),
            });
            if c + 1 < cols {
                edges.push(MapEdge { source: id(r, c), target: id(r, c + 1), length: Some(spacing_m), one_way: false });
            }
            if r + 1 < rows {
                edges.push(MapEdge { source: id(r, c), target: id(r + 1, c), length: Some(spacing_m), one_way: false });
            }
        }
    }

    // Boundaries sit half a block outside the grid so edge nodes fall inside.
    let south = origin.latitude - d_lat / 2.0;
    let west = origin.longitude - d_lon / 2.0;
    let north = origin.latitude + (rows as f64 - 0.5) * d_lat;
    let east = origin.longitude + (cols as f64 - 0.5) * d_lon;
    let mid_lat = origin.latitude + ((rows / 2) as f64 - 0.5) * d_lat;
    let mid_lon = origin.longitude + ((cols / 2) as f64 - 0.5) * d_lon;
    let rect = |s: f64, w: f64, n: f64, e: f64| {
        vec![Coordinate::new(s, w), Coordinate::new(s, e), Coordinate::new(n, e), Coordinate::new(n, w)]
    };
    let districts = vec![
        MapDistrict { id: 1, name: "South-West".into(), threat: ThreatLevel::Safe, boundary: rect(south, west, mid_lat, mid_lon) },
        MapDistrict { id: 2, name: "South-East".into(), threat: ThreatLevel::RatherSafe, boundary: rect(south, mid_lon, mid_lat, east) },
        MapDistrict { id: 3, name: "North-West".into(), threat: ThreatLevel::RatherSafe, boundary: rect(mid_lat, west, north, mid_lon) },
        MapDistrict { id: 4, name: "North-East".into(), threat: ThreatLevel::NotSafe, boundary: rect(mid_lat, mid_lon, north, east) },
    ];

    MapFile { nodes, edges, districts }
}
