//! Districts and the city map that ties them to the road network.

use crate::{
    geometry::polygon_contains,
    road_network::{RoadNetwork, RoadNode},
    rng::SubsystemRng,
    types::{Coordinate, DistrictId, NodeId},
};
use serde::{Deserialize, Serialize};
use std::sync::{PoisonError, RwLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ThreatLevel {
    Safe,
    RatherSafe,
    NotSafe,
}

impl ThreatLevel {
    pub const ALL: [ThreatLevel; 3] = [Self::Safe, Self::RatherSafe, Self::NotSafe];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Safe       => "Safe",
            Self::RatherSafe => "RatherSafe",
            Self::NotSafe    => "NotSafe",
        }
    }
}

impl Default for ThreatLevel {
    fn default() -> Self {
        Self::RatherSafe
    }
}

impl std::fmt::Display for ThreatLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A named polygonal region. The threat level is the only mutable part
/// and is changed by the configuration side, never by the simulation.
#[derive(Debug)]
pub struct District {
    pub id:       DistrictId,
    pub name:     String,
    pub boundary: Vec<Coordinate>,
    threat:       RwLock<ThreatLevel>,
    nodes:        Vec<NodeId>,
}

impl District {
    pub fn new(id: DistrictId, name: impl Into<String>, boundary: Vec<Coordinate>, threat: ThreatLevel) -> Self {
        Self {
            id,
            name: name.into(),
            boundary,
            threat: RwLock::new(threat),
            nodes: Vec::new(),
        }
    }

    pub fn contains(&self, point: Coordinate) -> bool {
        polygon_contains(&self.boundary, point)
    }

    pub fn threat_level(&self) -> ThreatLevel {
        *self.threat.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_threat_level(&self, level: ThreatLevel) {
        let mut threat = self.threat.write().unwrap_or_else(PoisonError::into_inner);
        if *threat != level {
            *threat = level;
            log::info!("{} district's threat level has been set to {level}", self.name);
        }
    }

    /// Road nodes that fell inside this district when the map was built.
    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }
}

/// Read-only city: road graph plus districts with node membership.
#[derive(Debug)]
pub struct CityMap {
    network:   RoadNetwork,
    districts: Vec<District>,
}

impl CityMap {
    /// Partition nodes into districts. A node belongs to the first
    /// district whose polygon contains it; nodes outside every district
    /// stay unassigned.
    pub fn new(network: RoadNetwork, mut districts: Vec<District>) -> Self {
        for node in network.nodes() {
            if let Some(d) = districts.iter_mut().find(|d| d.contains(node.position)) {
                d.nodes.push(node.id);
            }
        }
        let assigned: usize = districts.iter().map(|d| d.nodes.len()).sum();
        log::info!(
            "City map ready: {} nodes, {} edges, {} districts ({} nodes assigned)",
            network.len(),
            network.edge_count(),
            districts.len(),
            assigned
        );
        Self { network, districts }
    }

    pub fn network(&self) -> &RoadNetwork {
        &self.network
    }

    pub fn districts(&self) -> &[District] {
        &self.districts
    }

    pub fn district(&self, id: DistrictId) -> Option<&District> {
        self.districts.iter().find(|d| d.id == id)
    }

    /// First district containing the point.
    pub fn district_at(&self, point: Coordinate) -> Option<&District> {
        self.districts.iter().find(|d| d.contains(point))
    }

    /// Random road node inside a district.
    pub fn random_node_in(&self, district: &District, rng: &mut SubsystemRng) -> Option<&RoadNode> {
        if district.nodes.is_empty() {
            return None;
        }
        let id = district.nodes[rng.pick_index(district.nodes.len())];
        self.network.node(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::{RngBank, SubsystemSlot};

    fn square(lat0: f64, lon0: f64, size: f64) -> Vec<Coordinate> {
        vec![
            Coordinate::new(lat0, lon0),
            Coordinate::new(lat0, lon0 + size),
            Coordinate::new(lat0 + size, lon0 + size),
            Coordinate::new(lat0 + size, lon0),
        ]
    }

    fn city() -> CityMap {
        let nodes = vec![
            RoadNode { id: 1, position: Coordinate::new(0.5, 0.5) },
            RoadNode { id: 2, position: Coordinate::new(0.5, 1.5) },
            RoadNode { id: 3, position: Coordinate::new(5.0, 5.0) },
        ];
        let network = RoadNetwork::new(nodes, &[]).unwrap();
        let districts = vec![
            District::new(100, "West", square(0.0, 0.0, 1.0), ThreatLevel::Safe),
            District::new(200, "East", square(0.0, 1.0, 1.0), ThreatLevel::NotSafe),
        ];
        CityMap::new(network, districts)
    }

    #[test]
    fn nodes_are_partitioned_by_polygon() {
        let map = city();
        assert_eq!(map.district(100).unwrap().nodes(), &[1]);
        assert_eq!(map.district(200).unwrap().nodes(), &[2]);
        assert!(map.district_at(Coordinate::new(5.0, 5.0)).is_none());
    }

    #[test]
    fn threat_level_changes_in_place() {
        let map = city();
        let west = map.district(100).unwrap();
        assert_eq!(west.threat_level(), ThreatLevel::Safe);
        west.set_threat_level(ThreatLevel::NotSafe);
        assert_eq!(west.threat_level(), ThreatLevel::NotSafe);
    }

    #[test]
    fn random_node_stays_inside_district() {
        let map = city();
        let mut rng = RngBank::new(3).for_subsystem(SubsystemSlot::Generator);
        let east = map.district(200).unwrap();
        for _ in 0..10 {
            assert_eq!(map.random_node_in(east, &mut rng).unwrap().id, 2);
        }
    }
}
