//! Read-only views of the world for drawing and export.
//!
//! A snapshot is built while the registry lock is held and owns all of
//! its data, so the lock is released before anyone looks at it.

use crate::{
    district::{CityMap, ThreatLevel},
    entity::{Entity, EntityKind},
    patrol::PatrolState,
    types::{Coordinate, DistrictId, EntityId, SimTime},
    world::{Registry, Statistics},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatrolView {
    pub id:       EntityId,
    pub position: Coordinate,
    pub state:    PatrolState,
    /// What the patrol is about to do while it waits for a route.
    pub logical_state: PatrolState,
    pub route:    Vec<Coordinate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentView {
    pub id:       EntityId,
    pub kind:     EntityKind,
    pub position: Coordinate,
    pub district: Option<DistrictId>,
    pub active:   bool,
    pub start_time: SimTime,
    /// Patrols on scene. For interventions, 1 once the patrol is working it.
    pub solving:  usize,
    pub reaching: usize,
    pub required: usize,
    /// Remaining firing strength in seconds; 0 for interventions.
    pub strength: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistrictView {
    pub id:       DistrictId,
    pub name:     String,
    pub threat:   ThreatLevel,
    pub boundary: Vec<Coordinate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub sim_time: SimTime,
    pub is_night: bool,
    pub patrols:   Vec<PatrolView>,
    pub incidents: Vec<IncidentView>,
    pub headquarters: Vec<Coordinate>,
    pub districts: Vec<DistrictView>,
    pub stats:     Statistics,
}

impl WorldSnapshot {
    pub fn capture(registry: &Registry, map: &CityMap, now: SimTime, is_night: bool) -> Self {
        let mut patrols = Vec::new();
        let mut incidents = Vec::new();
        let mut headquarters = Vec::new();

        for entity in registry.iter() {
            match entity {
                Entity::Patrol(p) => patrols.push(PatrolView {
                    id:       p.id,
                    position: p.position(),
                    state:    p.state(),
                    logical_state: p.logical_state(),
                    route:    p.remaining_route(),
                }),
                Entity::Intervention(i) => {
                    let on_scene = i
                        .patrol_solving
                        .and_then(|id| registry.patrol(id))
                        .is_some_and(|p| p.participation_in(i.id).is_some());
                    incidents.push(IncidentView {
                        id:       i.id,
                        kind:     EntityKind::Intervention,
                        position: i.position,
                        district: i.core.district,
                        active:   i.core.active,
                        start_time: i.core.start_time,
                        solving:  usize::from(on_scene),
                        reaching: usize::from(i.patrol_solving.is_some() && !on_scene),
                        required: 1,
                        strength: 0.0,
                    });
                }
                Entity::Firing(f) => incidents.push(IncidentView {
                    id:       f.id,
                    kind:     EntityKind::Firing,
                    position: f.position,
                    district: f.core.district,
                    active:   f.core.active,
                    start_time: f.core.start_time,
                    solving:  f.solving().len(),
                    reaching: f.reaching().len(),
                    required: f.required_patrols,
                    strength: f.strength,
                }),
                Entity::Headquarters(h) => headquarters.push(h.position),
            }
        }

        let districts = map
            .districts()
            .iter()
            .map(|d| DistrictView {
                id:       d.id,
                name:     d.name.clone(),
                threat:   d.threat_level(),
                boundary: d.boundary.clone(),
            })
            .collect();

        Self {
            sim_time: now,
            is_night,
            patrols,
            incidents,
            headquarters,
            districts,
            stats: registry.stats(),
        }
    }

    pub fn patrols_in(&self, state: PatrolState) -> usize {
        self.patrols.iter().filter(|p| p.logical_state == state).count()
    }
}

/// Per-state patrol counts, keyed by state name.
pub type StateCounts = BTreeMap<String, usize>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistrictSummary {
    pub id:      DistrictId,
    pub name:    String,
    pub threat:  ThreatLevel,
    pub patrols: usize,
    pub patrols_by_state: StateCounts,
    pub interventions: usize,
    pub firings: usize,
}

/// The numbers written to the export store every export interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationSummary {
    pub sim_time: SimTime,
    pub is_night: bool,
    pub patrols:  usize,
    pub patrols_by_state: StateCounts,
    pub interventions: usize,
    pub interventions_being_solved: usize,
    pub firings: usize,
    pub firings_being_solved: usize,
    pub districts: Vec<DistrictSummary>,
}

fn count_states<'a>(patrols: impl Iterator<Item = &'a PatrolView>) -> StateCounts {
    let mut counts: StateCounts = PatrolState::ALL
        .iter()
        .filter(|s| **s != PatrolState::CalculatingPath)
        .map(|s| (s.name().to_string(), 0))
        .collect();
    for patrol in patrols {
        *counts.entry(patrol.logical_state.name().to_string()).or_default() += 1;
    }
    counts
}

impl SimulationSummary {
    pub fn from_snapshot(snapshot: &WorldSnapshot, map: &CityMap) -> Self {
        let mut patrols_by_state = count_states(snapshot.patrols.iter());
        // Neutralized patrols count for the whole run.
        let neutralized = patrols_by_state.entry(PatrolState::Neutralized.name().to_string()).or_default();
        *neutralized = (*neutralized).max(snapshot.stats.patrols_neutralized as usize);

        let of_kind = |kind: EntityKind| snapshot.incidents.iter().filter(move |i| i.kind == kind && i.active);

        let districts = map
            .districts()
            .iter()
            .map(|d| {
                let inside: Vec<&PatrolView> = snapshot.patrols.iter().filter(|p| d.contains(p.position)).collect();
                DistrictSummary {
                    id:      d.id,
                    name:    d.name.clone(),
                    threat:  d.threat_level(),
                    patrols: inside.len(),
                    patrols_by_state: count_states(inside.into_iter()),
                    interventions: of_kind(EntityKind::Intervention).filter(|i| d.contains(i.position)).count(),
                    firings: of_kind(EntityKind::Firing).filter(|i| d.contains(i.position)).count(),
                }
            })
            .collect();

        Self {
            sim_time: snapshot.sim_time,
            is_night: snapshot.is_night,
            patrols:  snapshot.patrols.len(),
            patrols_by_state,
            interventions: of_kind(EntityKind::Intervention).count(),
            interventions_being_solved: of_kind(EntityKind::Intervention).filter(|i| i.solving > 0).count(),
            firings: of_kind(EntityKind::Firing).count(),
            firings_being_solved: of_kind(EntityKind::Firing).filter(|i| i.solving > 0).count(),
            districts,
        }
    }

    pub fn state_count(&self, state: PatrolState) -> usize {
        self.patrols_by_state.get(state.name()).copied().unwrap_or(0)
    }
}
