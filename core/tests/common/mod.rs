//! Shared fixtures: a manual clock, the inline route worker and a few
//! small maps.

#![allow(dead_code)]

use patrolsim_core::{
    clock::ManualTimeSource,
    config::SimConfig,
    district::{CityMap, District, ThreatLevel},
    event::SimEvent,
    geometry::meters_to_latitude,
    path_worker::{InlinePathWorker, PathWorker, PendingRoute, RouteRequest},
    road_network::{RoadEdge, RoadNetwork, RoadNode},
    types::Coordinate,
    world::World,
};
use std::sync::{Arc, Mutex};

pub const ORIGIN: Coordinate = Coordinate::new(50.0, 19.0);

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// `meters` due north of ORIGIN.
pub fn north(meters: f64) -> Coordinate {
    Coordinate::new(ORIGIN.latitude + meters_to_latitude(meters), ORIGIN.longitude)
}

/// A - B - C along a meridian, 100 m apart, two-way streets, inside a
/// single district.
pub fn line_city() -> CityMap {
    let nodes = vec![
        RoadNode { id: 1, position: north(0.0) },
        RoadNode { id: 2, position: north(100.0) },
        RoadNode { id: 3, position: north(200.0) },
    ];
    let mut edges = Vec::new();
    for (a, b) in [(1, 2), (2, 3)] {
        edges.push(RoadEdge { source: a, target: b, length: 100.0 });
        edges.push(RoadEdge { source: b, target: a, length: 100.0 });
    }
    let boundary = vec![
        Coordinate::new(49.99, 18.99),
        Coordinate::new(49.99, 19.01),
        Coordinate::new(50.01, 19.01),
        Coordinate::new(50.01, 18.99),
    ];
    let district = District::new(1, "Centre", boundary, ThreatLevel::RatherSafe);
    CityMap::new(RoadNetwork::new(nodes, &edges).expect("line network"), vec![district])
}

pub fn node_a() -> Coordinate {
    north(0.0)
}

pub fn node_b() -> Coordinate {
    north(100.0)
}

pub fn node_c() -> Coordinate {
    north(200.0)
}

/// Quiet configuration: no initial patrols, headquarters at A, no
/// incident generation, rate 1.
pub fn quiet_config() -> SimConfig {
    let mut config = SimConfig::default_test();
    config.number_of_patrols = 0;
    config.headquarters = Some(node_a());
    config.max_incidents_per_hour.safe = 0;
    config.max_incidents_per_hour.rather_safe = 0;
    config.max_incidents_per_hour.not_safe = 0;
    config
}

pub struct Harness {
    pub time:  Arc<ManualTimeSource>,
    pub world: Arc<World>,
}

/// A route worker that never answers: every request comes back lost.
#[derive(Default)]
pub struct LosingPathWorker {
    pub requests: Mutex<Vec<RouteRequest>>,
}

impl PathWorker for LosingPathWorker {
    fn submit(&self, request: RouteRequest) -> PendingRoute {
        self.requests.lock().unwrap().push(request);
        let (_sender, pending) = PendingRoute::channel();
        pending
    }
}

impl Harness {
    pub fn new(config: SimConfig, map: CityMap) -> Self {
        let map = Arc::new(map);
        let paths = Arc::new(InlinePathWorker::new(Arc::clone(&map)));
        Self::with_paths(config, map, paths)
    }

    pub fn with_paths(config: SimConfig, map: Arc<CityMap>, paths: Arc<dyn PathWorker>) -> Self {
        init_logging();
        let time = Arc::new(ManualTimeSource::new());
        let world = World::new(config, map, Box::new(Arc::clone(&time)), paths).expect("world");
        world.start().expect("start");
        Self { time, world: Arc::new(world) }
    }

    pub fn line(config: SimConfig) -> Self {
        Self::new(config, line_city())
    }

    /// Move the manual wall clock; at rate 1 this is simulated seconds.
    pub fn advance(&self, seconds: f64) {
        self.time.advance(seconds);
    }

    pub fn events(&self) -> Vec<SimEvent> {
        self.world.journal().pending().into_iter().map(|r| r.event).collect()
    }
}
