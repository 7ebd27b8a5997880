//! Road network: an immutable weighted graph of intersections.
//!
//! Nodes keep the order the importer supplied them in; nearest-node
//! lookups scan in that order, so ties go to the first node found.
//! Shortest paths use A* with great-circle distance as the heuristic.

use crate::{
    error::{SimError, SimResult},
    geometry::haversine,
    rng::SubsystemRng,
    types::{Coordinate, NodeId},
};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

/// Upper bound on disconnected-component retries in `path_node_list`.
pub const PATH_FALLBACK_LIMIT: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoadNode {
    pub id:       NodeId,
    pub position: Coordinate,
}

/// A directed road segment. Length is in meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoadEdge {
    pub source: NodeId,
    pub target: NodeId,
    pub length: f64,
}

#[derive(Debug, Clone)]
pub struct RoadNetwork {
    nodes:     Vec<RoadNode>,
    index:     HashMap<NodeId, usize>,
    adjacency: Vec<Vec<(usize, f64)>>,
    edges:     usize,
}

/// Open-set entry ordered so that BinaryHeap pops the lowest f-cost.
#[derive(Debug, Clone, Copy)]
struct Frontier {
    f_cost: f64,
    node:   usize,
}

impl PartialEq for Frontier {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Frontier {}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Frontier {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse for min-heap behavior
        other
            .f_cost
            .total_cmp(&self.f_cost)
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl RoadNetwork {
    /// Build the graph. Every edge endpoint must exist as a node.
    pub fn new(nodes: Vec<RoadNode>, edges: &[RoadEdge]) -> SimResult<Self> {
        let index: HashMap<NodeId, usize> = nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id, i))
            .collect();
        let mut adjacency = vec![Vec::new(); nodes.len()];
        for edge in edges {
            let (Some(&from), Some(&to)) = (index.get(&edge.source), index.get(&edge.target)) else {
                return Err(SimError::DanglingEdge {
                    source_node: edge.source,
                    target_node: edge.target,
                });
            };
            adjacency[from].push((to, edge.length));
        }
        Ok(Self {
            nodes,
            index,
            adjacency,
            edges: edges.len(),
        })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.edges
    }

    pub fn nodes(&self) -> &[RoadNode] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> Option<&RoadNode> {
        self.index.get(&id).map(|&i| &self.nodes[i])
    }

    pub fn position(&self, id: NodeId) -> SimResult<Coordinate> {
        self.node(id)
            .map(|n| n.position)
            .ok_or(SimError::UnknownNode { node: id })
    }

    /// Uniformly random node, used for patrol targets.
    pub fn random_node(&self, rng: &mut SubsystemRng) -> Option<&RoadNode> {
        if self.nodes.is_empty() {
            return None;
        }
        Some(&self.nodes[rng.pick_index(self.nodes.len())])
    }

    /// Midpoint of the bounding box of all nodes.
    pub fn center(&self) -> Option<Coordinate> {
        let first = self.nodes.first()?.position;
        let (mut min, mut max) = (first, first);
        for n in &self.nodes {
            min.latitude = min.latitude.min(n.position.latitude);
            min.longitude = min.longitude.min(n.position.longitude);
            max.latitude = max.latitude.max(n.position.latitude);
            max.longitude = max.longitude.max(n.position.longitude);
        }
        Some(Coordinate::new(
            (min.latitude + max.latitude) / 2.0,
            (min.longitude + max.longitude) / 2.0,
        ))
    }

    /// Closest node to `point` that is not in `excluding`.
    /// Linear scan; the first node found wins a tie.
    pub fn nearest_node(&self, point: Coordinate, excluding: &HashSet<NodeId>) -> Option<NodeId> {
        let mut best: Option<(NodeId, f64)> = None;
        for node in &self.nodes {
            if excluding.contains(&node.id) {
                continue;
            }
            let distance = haversine(point, node.position);
            if best.map_or(true, |(_, d)| distance < d) {
                best = Some((node.id, distance));
            }
        }
        best.map(|(id, _)| id)
    }

    /// A* from `source` to `target`, both inclusive.
    /// `Ok(None)` when the two nodes are in different components.
    pub fn shortest_path(&self, source: NodeId, target: NodeId) -> SimResult<Option<Vec<NodeId>>> {
        let start = *self.index.get(&source).ok_or(SimError::UnknownNode { node: source })?;
        let goal = *self.index.get(&target).ok_or(SimError::UnknownNode { node: target })?;
        let goal_position = self.nodes[goal].position;
        let heuristic = |i: usize| haversine(self.nodes[i].position, goal_position);

        let mut g_cost = vec![f64::INFINITY; self.nodes.len()];
        let mut came_from: Vec<Option<usize>> = vec![None; self.nodes.len()];
        let mut closed = vec![false; self.nodes.len()];
        let mut open = BinaryHeap::new();

        g_cost[start] = 0.0;
        open.push(Frontier { f_cost: heuristic(start), node: start });

        while let Some(Frontier { node: current, .. }) = open.pop() {
            if current == goal {
                return Ok(Some(self.reconstruct(&came_from, current)));
            }
            if closed[current] {
                continue;
            }
            closed[current] = true;

            for &(next, length) in &self.adjacency[current] {
                if closed[next] {
                    continue;
                }
                let tentative = g_cost[current] + length;
                if tentative < g_cost[next] {
                    g_cost[next] = tentative;
                    came_from[next] = Some(current);
                    open.push(Frontier {
                        f_cost: tentative + heuristic(next),
                        node:   next,
                    });
                }
            }
        }
        Ok(None)
    }

    fn reconstruct(&self, came_from: &[Option<usize>], mut current: usize) -> Vec<NodeId> {
        let mut path = vec![self.nodes[current].id];
        while let Some(previous) = came_from[current] {
            path.push(self.nodes[previous].id);
            current = previous;
        }
        path.reverse();
        path
    }

    /// Nearest node to each end, then the shortest path between them.
    ///
    /// When the two nearest nodes lie in different components, both are
    /// excluded and the lookup is repeated with the next-nearest nodes
    /// (skipping pairs where both ends collapse onto one node) until a
    /// path is found, the nodes run out, or `PATH_FALLBACK_LIMIT` retries
    /// have been spent.
    pub fn path_node_list(&self, from: Coordinate, to: Coordinate) -> SimResult<Vec<NodeId>> {
        let no_path = || SimError::NoPath {
            from: from.to_string(),
            to:   to.to_string(),
        };
        let mut excluded = HashSet::new();
        let mut source = self.nearest_node(from, &excluded).ok_or_else(no_path)?;
        let mut target = self.nearest_node(to, &excluded).ok_or_else(no_path)?;

        for attempt in 0..=PATH_FALLBACK_LIMIT {
            if let Some(path) = self.shortest_path(source, target)? {
                if attempt > 0 {
                    log::debug!("Path {from} -> {to} found after {attempt} fallback retries");
                }
                return Ok(path);
            }
            excluded.insert(source);
            excluded.insert(target);
            loop {
                source = self.nearest_node(from, &excluded).ok_or_else(no_path)?;
                target = self.nearest_node(to, &excluded).ok_or_else(no_path)?;
                if source != target {
                    break;
                }
                excluded.insert(source);
            }
        }
        Err(no_path())
    }
}
