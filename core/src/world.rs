//! The shared world: clock, city map, configuration, entity registry and
//! event journal.
//!
//! RULES:
//!   - The registry sits behind one mutex. Every thread of control takes
//!     it for the duration of one entity step, never longer.
//!   - An entity being stepped is detached from the registry and put back
//!     afterwards, so it can freely read and change every other entity.
//!   - Entity ids only ever grow; iterating the registry visits entities
//!     in insertion order.

use crate::{
    clock::{SystemTimeSource, TimeSource, WorldClock},
    config::SimConfig,
    district::{CityMap, ThreatLevel},
    entity::{Entity, EntityKind, StepOutcome},
    error::{SimError, SimResult},
    event::{EventJournal, JournalRecord, SimEvent},
    geometry::haversine,
    headquarters::Headquarters,
    incident::{Firing, Intervention},
    patrol::{Patrol, PatrolState},
    path_worker::{PathWorker, ThreadedPathWorker},
    rng::RngBank,
    snapshot::WorldSnapshot,
    types::{Coordinate, EntityId, SimTime},
};
use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

/// Running totals for the whole run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistics {
    pub patrols_spawned:         u64,
    pub shifts_started:          u64,
    pub patrols_neutralized:     u64,
    pub patrols_off_duty:        u64,
    pub interventions_created:   u64,
    pub interventions_solved:    u64,
    pub interventions_escalated: u64,
    pub firings_created:         u64,
    pub firings_solved:          u64,
}

/// Writes journal records stamped with the day/night flag, and resolves
/// positions to districts for event payloads.
#[derive(Clone)]
pub struct Recorder {
    journal: Arc<EventJournal>,
    config:  Arc<SimConfig>,
    map:     Arc<CityMap>,
}

impl Recorder {
    pub fn new(journal: Arc<EventJournal>, config: Arc<SimConfig>, map: Arc<CityMap>) -> Self {
        Self { journal, config, map }
    }

    pub fn emit(&self, now: SimTime, source: &'static str, event: SimEvent) {
        self.journal.record(JournalRecord {
            sim_time: now,
            source,
            is_night: self.config.is_night(now),
            event,
        });
    }

    pub fn district_name(&self, point: Coordinate) -> Option<String> {
        self.map.district_at(point).map(|d| d.name.clone())
    }

    pub fn locate(&self, point: Coordinate) -> (Option<String>, Option<ThreatLevel>) {
        match self.map.district_at(point) {
            Some(d) => (Some(d.name.clone()), Some(d.threat_level())),
            None => (None, None),
        }
    }
}

/// All live entities, keyed by id.
pub struct Registry {
    entities: BTreeMap<EntityId, Entity>,
    next_id:  EntityId,
    stats:    Statistics,
    rng_bank: RngBank,
    recorder: Recorder,
}

impl Registry {
    pub fn new(rng_bank: RngBank, recorder: Recorder) -> Self {
        Self {
            entities: BTreeMap::new(),
            next_id: 1,
            stats: Statistics::default(),
            rng_bank,
            recorder,
        }
    }

    pub fn allocate_id(&mut self) -> EntityId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn stats(&self) -> Statistics {
        self.stats
    }

    pub fn stats_mut(&mut self) -> &mut Statistics {
        &mut self.stats
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Add an entity whose id came from `allocate_id`.
    pub fn insert(&mut self, entity: Entity, now: SimTime) -> EntityId {
        let (id, kind) = (entity.id(), entity.kind());
        match kind {
            EntityKind::Patrol       => self.stats.patrols_spawned += 1,
            EntityKind::Intervention => self.stats.interventions_created += 1,
            EntityKind::Firing       => self.stats.firings_created += 1,
            EntityKind::Headquarters => {}
        }
        debug!("Added {entity}");
        self.entities.insert(id, entity);
        self.recorder.emit(now, "registry", SimEvent::EntityAdded { id, kind });
        id
    }

    pub fn remove(&mut self, id: EntityId, now: SimTime) -> Option<Entity> {
        let entity = self.entities.remove(&id)?;
        self.note_removed(&entity, now);
        Some(entity)
    }

    /// Bookkeeping for an entity that left the registry while detached.
    pub fn note_removed(&mut self, entity: &Entity, now: SimTime) {
        debug!("Removed {entity}");
        self.recorder.emit(now, "registry", SimEvent::EntityRemoved {
            id:   entity.id(),
            kind: entity.kind(),
        });
    }

    /// Take an entity out for stepping, without removal bookkeeping.
    pub fn detach(&mut self, id: EntityId) -> Option<Entity> {
        self.entities.remove(&id)
    }

    pub fn attach(&mut self, entity: Entity) {
        self.entities.insert(entity.id(), entity);
    }

    pub fn take_patrol(&mut self, id: EntityId) -> Option<Patrol> {
        match self.entities.remove(&id)? {
            Entity::Patrol(p) => Some(p),
            other => {
                self.attach(other);
                None
            }
        }
    }

    pub fn put_patrol(&mut self, patrol: Patrol) {
        self.attach(Entity::Patrol(patrol));
    }

    pub fn spawn_patrol(&mut self, position: Coordinate, now: SimTime, config: &SimConfig) -> EntityId {
        let id = self.allocate_id();
        let rng = self.rng_bank.for_patrol(id);
        self.insert(Entity::Patrol(Patrol::new(id, position, now, config, rng)), now)
    }

    pub fn add_headquarters(&mut self, position: Coordinate, now: SimTime, config: &SimConfig) -> EntityId {
        let id = self.allocate_id();
        self.insert(Entity::Headquarters(Headquarters::new(id, position, now, config)), now)
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(&id)
    }

    pub fn patrol(&self, id: EntityId) -> Option<&Patrol> {
        self.get(id).and_then(Entity::as_patrol)
    }

    pub fn patrol_mut(&mut self, id: EntityId) -> Option<&mut Patrol> {
        self.get_mut(id).and_then(Entity::as_patrol_mut)
    }

    pub fn firing(&self, id: EntityId) -> Option<&Firing> {
        self.get(id).and_then(Entity::as_firing)
    }

    pub fn firing_mut(&mut self, id: EntityId) -> Option<&mut Firing> {
        self.get_mut(id).and_then(Entity::as_firing_mut)
    }

    pub fn intervention(&self, id: EntityId) -> Option<&Intervention> {
        self.get(id).and_then(Entity::as_intervention)
    }

    pub fn intervention_mut(&mut self, id: EntityId) -> Option<&mut Intervention> {
        self.get_mut(id).and_then(Entity::as_intervention_mut)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn ids(&self) -> Vec<EntityId> {
        self.entities.keys().copied().collect()
    }

    /// Ids of every entity of one kind, in registry order.
    pub fn ids_of(&self, kind: EntityKind) -> Vec<EntityId> {
        self.iter().filter(|e| e.kind() == kind).map(Entity::id).collect()
    }

    pub fn incident_ids(&self) -> Vec<EntityId> {
        self.iter().filter(|e| e.kind().is_incident()).map(Entity::id).collect()
    }

    /// Everything within `range` meters of `point`, in registry order.
    pub fn entities_near(&self, point: Coordinate, range: f64) -> Vec<EntityId> {
        self.iter()
            .filter(|e| haversine(point, e.position()) <= range)
            .map(Entity::id)
            .collect()
    }

    /// Patrols in `state` within `range` meters, with their distance, in
    /// registry order.
    pub fn patrols_near(&self, point: Coordinate, range: f64, state: PatrolState) -> Vec<(EntityId, f64)> {
        self.iter()
            .filter_map(Entity::as_patrol)
            .filter(|p| p.state() == state)
            .map(|p| (p.id, haversine(point, p.position())))
            .filter(|(_, distance)| *distance <= range)
            .collect()
    }

    pub fn first_headquarters(&self) -> Option<(EntityId, Coordinate)> {
        self.iter()
            .find(|e| e.kind() == EntityKind::Headquarters)
            .map(|e| (e.id(), e.position()))
    }

    pub fn nearest_headquarters(&self, point: Coordinate) -> Option<(EntityId, Coordinate)> {
        let mut best: Option<(EntityId, Coordinate, f64)> = None;
        for entity in self.iter().filter(|e| e.kind() == EntityKind::Headquarters) {
            let distance = haversine(point, entity.position());
            if best.map_or(true, |(_, _, d)| distance < d) {
                best = Some((entity.id(), entity.position(), distance));
            }
        }
        best.map(|(id, position, _)| (id, position))
    }
}

/// Everything an entity step may touch besides the entity itself.
pub struct TickContext<'a> {
    pub now:      SimTime,
    pub registry: &'a mut Registry,
    pub map:      &'a CityMap,
    pub config:   &'a SimConfig,
    pub paths:    &'a dyn PathWorker,
    pub recorder: Recorder,
}

pub struct World {
    clock:    WorldClock,
    map:      Arc<CityMap>,
    config:   Arc<SimConfig>,
    journal:  Arc<EventJournal>,
    paths:    Arc<dyn PathWorker>,
    rng_bank: RngBank,
    registry: Mutex<Registry>,
}

impl World {
    pub fn new(
        config: SimConfig,
        map: Arc<CityMap>,
        time: Box<dyn TimeSource>,
        paths: Arc<dyn PathWorker>,
    ) -> SimResult<Self> {
        config.validate()?;
        let clock = WorldClock::new(time, config.time_rate, config.simulation_duration_secs)?;
        let config = Arc::new(config);
        let journal = Arc::new(EventJournal::new());
        let rng_bank = RngBank::new(config.seed);
        let recorder = Recorder::new(Arc::clone(&journal), Arc::clone(&config), Arc::clone(&map));
        Ok(Self {
            clock,
            map,
            config,
            journal,
            paths,
            rng_bank,
            registry: Mutex::new(Registry::new(rng_bank, recorder)),
        })
    }

    /// Wall-clock time and one thread per route request.
    pub fn with_system_time(config: SimConfig, map: Arc<CityMap>) -> SimResult<Self> {
        let paths = Arc::new(ThreadedPathWorker::new(Arc::clone(&map)));
        Self::new(config, map, Box::new(SystemTimeSource::new()), paths)
    }

    pub fn clock(&self) -> &WorldClock {
        &self.clock
    }

    pub fn map(&self) -> &Arc<CityMap> {
        &self.map
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn journal(&self) -> &EventJournal {
        &self.journal
    }

    pub fn rng_bank(&self) -> RngBank {
        self.rng_bank
    }

    pub fn recorder(&self) -> Recorder {
        Recorder::new(Arc::clone(&self.journal), Arc::clone(&self.config), Arc::clone(&self.map))
    }

    pub fn now(&self) -> SimTime {
        self.clock.now()
    }

    pub fn is_night(&self) -> bool {
        self.config.is_night(self.clock.now())
    }

    pub fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: SimEvent) {
        self.recorder().emit(self.clock.now(), "world", event);
    }

    /// Put headquarters in place (configured spot, else the map centre),
    /// spawn the first shift and start the clock.
    pub fn start(&self) -> SimResult<()> {
        if self.clock.is_started() {
            return Ok(());
        }
        let position = self
            .config
            .headquarters
            .or_else(|| self.map.network().center())
            .ok_or_else(|| SimError::InvalidConfig {
                field:  "headquarters",
                reason: "no position given and the road network is empty".into(),
            })?;
        self.clock.start();
        let now = self.clock.now();
        let patrols = {
            let mut registry = self.registry();
            if registry.first_headquarters().is_none() {
                registry.add_headquarters(position, now, &self.config);
            }
            for _ in 0..self.config.number_of_patrols {
                registry.spawn_patrol(position, now, &self.config);
            }
            self.config.number_of_patrols
        };
        info!("Simulation started: {patrols} patrol(s) at {position}, rate x{}", self.clock.time_rate());
        self.emit(SimEvent::SimulationStarted { patrols });
        Ok(())
    }

    pub fn pause(&self) {
        if !self.clock.is_paused() {
            self.clock.pause();
            info!("Simulation paused at {:.0}s", self.clock.now());
            self.emit(SimEvent::SimulationPaused);
        }
    }

    pub fn resume(&self) {
        if self.clock.is_paused() {
            self.clock.resume();
            info!("Simulation resumed at {:.0}s", self.clock.now());
            self.emit(SimEvent::SimulationResumed);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.clock.is_elapsed()
    }

    pub fn add_headquarters(&self, position: Coordinate) -> EntityId {
        let now = self.clock.now();
        self.registry().add_headquarters(position, now, &self.config)
    }

    pub fn spawn_patrol(&self, position: Coordinate) -> EntityId {
        let now = self.clock.now();
        self.registry().spawn_patrol(position, now, &self.config)
    }

    /// Add an entity built by the caller. Build it with an id from
    /// `allocate_id`.
    pub fn add_entity(&self, build: impl FnOnce(EntityId, SimTime) -> Entity) -> EntityId {
        let now = self.clock.now();
        let mut registry = self.registry();
        let id = registry.allocate_id();
        registry.insert(build(id, now), now)
    }

    pub fn remove_entity(&self, id: EntityId) -> Option<Entity> {
        let now = self.clock.now();
        self.registry().remove(id, now)
    }

    pub fn entities_near(&self, point: Coordinate, range: f64) -> Vec<EntityId> {
        self.registry().entities_near(point, range)
    }

    pub fn ids_of(&self, kind: EntityKind) -> Vec<EntityId> {
        self.registry().ids_of(kind)
    }

    pub fn statistics(&self) -> Statistics {
        self.registry().stats()
    }

    pub fn snapshot(&self) -> WorldSnapshot {
        let now = self.clock.now();
        WorldSnapshot::capture(&self.registry(), &self.map, now, self.config.is_night(now))
    }

    /// Step one entity with the registry locked and the entity detached.
    /// Returns `Ok(None)` if the entity no longer exists. An error leaves
    /// the entity in place.
    pub fn step_entity<F>(&self, id: EntityId, step: F) -> SimResult<Option<StepOutcome>>
    where
        F: FnOnce(&mut Entity, &mut TickContext<'_>) -> SimResult<StepOutcome>,
    {
        let now = self.clock.now();
        let mut registry = self.registry();
        let Some(mut entity) = registry.detach(id) else {
            return Ok(None);
        };
        let result = {
            let mut ctx = TickContext {
                now,
                registry: &mut *registry,
                map: self.map.as_ref(),
                config: self.config.as_ref(),
                paths: self.paths.as_ref(),
                recorder: self.recorder(),
            };
            step(&mut entity, &mut ctx)
        };
        match result {
            Ok(StepOutcome::Remove) => {
                registry.note_removed(&entity, now);
                Ok(Some(StepOutcome::Remove))
            }
            Ok(outcome) => {
                registry.attach(entity);
                Ok(Some(outcome))
            }
            Err(e) => {
                error!("{entity}: step failed: {e}");
                registry.attach(entity);
                Err(e)
            }
        }
    }
}
