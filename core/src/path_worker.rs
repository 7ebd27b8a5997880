//! Background route computation.
//!
//! A transfer submits one request and receives a `PendingRoute` back. The
//! route arrives through a one-shot channel; the patrol polls it from its
//! own tick. Dropping the `PendingRoute` (because the patrol got a new
//! order) is all it takes to discard a result nobody wants any more.

use crate::{
    district::CityMap,
    types::{Coordinate, EntityId},
};
use log::{debug, warn};
use std::{
    collections::HashSet,
    sync::{
        mpsc::{self, Receiver, Sender, TryRecvError},
        Arc,
    },
    thread,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouteRequest {
    pub patrol: EntityId,
    pub from:   Coordinate,
    pub to:     Coordinate,
}

#[derive(Debug, PartialEq)]
pub enum RoutePoll {
    Pending,
    Ready(Vec<Coordinate>),
    /// The worker went away without answering.
    Lost,
}

/// Receiving end of one route computation.
#[derive(Debug)]
pub struct PendingRoute {
    receiver: Receiver<Vec<Coordinate>>,
}

impl PendingRoute {
    pub fn channel() -> (Sender<Vec<Coordinate>>, Self) {
        let (sender, receiver) = mpsc::channel();
        (sender, Self { receiver })
    }

    pub fn poll(&self) -> RoutePoll {
        match self.receiver.try_recv() {
            Ok(route) => RoutePoll::Ready(route),
            Err(TryRecvError::Empty) => RoutePoll::Pending,
            Err(TryRecvError::Disconnected) => RoutePoll::Lost,
        }
    }
}

pub trait PathWorker: Send + Sync {
    fn submit(&self, request: RouteRequest) -> PendingRoute;
}

/// Node coordinates from the node nearest `from` to the node nearest `to`.
///
/// A request whose ends snap to one node yields a one-element route.
/// When no path exists at all the route degenerates to the node nearest
/// the destination, or to the destination itself on an empty graph.
pub fn compute_route(map: &CityMap, request: &RouteRequest) -> Vec<Coordinate> {
    let network = map.network();
    match network.path_node_list(request.from, request.to) {
        Ok(nodes) => nodes
            .iter()
            .filter_map(|id| network.node(*id).map(|n| n.position))
            .collect(),
        Err(e) => {
            warn!("Patrol #{}: {e}, heading straight for the destination", request.patrol);
            let fallback = network
                .nearest_node(request.to, &HashSet::new())
                .and_then(|id| network.node(id))
                .map_or(request.to, |n| n.position);
            vec![fallback]
        }
    }
}

/// One short-lived thread per request.
pub struct ThreadedPathWorker {
    map: Arc<CityMap>,
}

impl ThreadedPathWorker {
    pub fn new(map: Arc<CityMap>) -> Self {
        Self { map }
    }
}

impl PathWorker for ThreadedPathWorker {
    fn submit(&self, request: RouteRequest) -> PendingRoute {
        let (sender, pending) = PendingRoute::channel();
        let map = Arc::clone(&self.map);
        let spawned = thread::Builder::new()
            .name(format!("route-{}", request.patrol))
            .spawn(move || {
                let route = compute_route(&map, &request);
                // The patrol may have moved on; a closed channel is fine.
                let _ = sender.send(route);
            });
        if let Err(e) = spawned {
            warn!("Patrol #{}: route thread failed to start: {e}", request.patrol);
        }
        pending
    }
}

/// Computes on the caller's thread. The route is ready on the next poll,
/// which keeps runs driven by a manual clock reproducible.
pub struct InlinePathWorker {
    map: Arc<CityMap>,
}

impl InlinePathWorker {
    pub fn new(map: Arc<CityMap>) -> Self {
        Self { map }
    }
}

impl PathWorker for InlinePathWorker {
    fn submit(&self, request: RouteRequest) -> PendingRoute {
        let (sender, pending) = PendingRoute::channel();
        let route = compute_route(&self.map, &request);
        debug!("Patrol #{}: route of {} node(s) ready", request.patrol, route.len());
        let _ = sender.send(route);
        pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        geometry::meters_to_latitude,
        road_network::{RoadEdge, RoadNetwork, RoadNode},
    };
    use std::time::Duration;

    fn two_node_map() -> Arc<CityMap> {
        let a = RoadNode { id: 1, position: Coordinate::new(50.0, 19.0) };
        let b = RoadNode { id: 2, position: Coordinate::new(50.0 + meters_to_latitude(100.0), 19.0) };
        let edges = [
            RoadEdge { source: 1, target: 2, length: 100.0 },
            RoadEdge { source: 2, target: 1, length: 100.0 },
        ];
        Arc::new(CityMap::new(RoadNetwork::new(vec![a, b], &edges).unwrap(), Vec::new()))
    }

    #[test]
    fn inline_route_is_ready_immediately() {
        let map = two_node_map();
        let worker = InlinePathWorker::new(Arc::clone(&map));
        let target = map.network().nodes()[1].position;
        let pending = worker.submit(RouteRequest { patrol: 1, from: Coordinate::new(50.0, 19.0), to: target });
        match pending.poll() {
            RoutePoll::Ready(route) => {
                assert_eq!(route.len(), 2);
                assert_eq!(*route.last().unwrap(), target);
            }
            other => panic!("expected a route, got {other:?}"),
        }
        assert_eq!(pending.poll(), RoutePoll::Lost);
    }

    #[test]
    fn same_node_route_has_one_element() {
        let map = two_node_map();
        let here = map.network().nodes()[0].position;
        let route = compute_route(&map, &RouteRequest { patrol: 1, from: here, to: here });
        assert_eq!(route, vec![here]);
    }

    #[test]
    fn threaded_route_eventually_arrives() {
        let map = two_node_map();
        let worker = ThreadedPathWorker::new(Arc::clone(&map));
        let target = map.network().nodes()[1].position;
        let pending = worker.submit(RouteRequest { patrol: 3, from: Coordinate::new(50.0, 19.0), to: target });
        for _ in 0..200 {
            if let RoutePoll::Ready(route) = pending.poll() {
                assert_eq!(*route.last().unwrap(), target);
                return;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        panic!("route never arrived");
    }
}
