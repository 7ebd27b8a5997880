//! Interventions and firings.
//!
//! An intervention is worked by at most one patrol. Once that patrol has
//! been on scene long enough the call either closes or, if it was drawn
//! to escalate, turns into a firing at the same spot. A firing burns down
//! its strength by one second per solving patrol per simulated second.

use crate::{
    entity::{Entity, EntityKind, StepOutcome},
    error::SimResult,
    event::SimEvent,
    incident_factory,
    rng::SubsystemRng,
    types::{Coordinate, DistrictId, EntityId, SimTime},
    world::TickContext,
};
use log::{debug, info};
use std::collections::BTreeSet;

const SOURCE: &str = "incident";

/// Fields every incident carries.
#[derive(Debug, Clone, PartialEq)]
pub struct IncidentCore {
    pub start_time:  SimTime,
    pub last_update: SimTime,
    pub active:      bool,
    pub district:    Option<DistrictId>,
}

impl IncidentCore {
    pub fn new(now: SimTime, district: Option<DistrictId>) -> Self {
        Self { start_time: now, last_update: now, active: true, district }
    }
}

#[derive(Debug, Clone)]
pub struct Intervention {
    pub id:       EntityId,
    pub position: Coordinate,
    pub core:     IncidentCore,
    /// Seconds of on-scene work before the call closes.
    pub duration: SimTime,
    /// Seconds of on-scene work before it turns into a firing, when drawn
    /// to escalate.
    pub escalation_delay: Option<SimTime>,
    pub patrol_solving:   Option<EntityId>,
}

impl Intervention {
    pub fn new(
        id: EntityId,
        position: Coordinate,
        now: SimTime,
        duration: SimTime,
        escalation_delay: Option<SimTime>,
        district: Option<DistrictId>,
    ) -> Self {
        Self {
            id,
            position,
            core: IncidentCore::new(now, district),
            duration: duration.max(0.0),
            escalation_delay: escalation_delay.map(|d| d.max(0.0)),
            patrol_solving: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.core.active
    }

    pub fn will_escalate(&self) -> bool {
        self.escalation_delay.is_some()
    }

    /// Age the call against the participation of its assigned patrol.
    /// Only a patrol whose participation targets this intervention counts.
    pub fn update_state(&mut self, ctx: &mut TickContext<'_>, rng: &mut SubsystemRng) -> SimResult<StepOutcome> {
        let now = ctx.now;
        self.core.last_update = now;

        let Some(patrol_id) = self.patrol_solving else {
            return Ok(StepOutcome::Keep);
        };
        let Some(patrol) = ctx.registry.patrol(patrol_id) else {
            debug!("Intervention#{}: patrol #{patrol_id} is gone, waiting for reassignment", self.id);
            self.patrol_solving = None;
            return Ok(StepOutcome::Keep);
        };
        let Some(on_scene_since) = patrol.participation_in(self.id).map(|p| p.start_time) else {
            return Ok(StepOutcome::Keep);
        };
        let worked = now - on_scene_since;

        if let Some(delay) = self.escalation_delay {
            if worked > delay {
                self.escalate(patrol_id, ctx, rng);
                return Ok(StepOutcome::Remove);
            }
        }
        if worked > self.duration {
            self.core.active = false;
            ctx.registry.stats_mut().interventions_solved += 1;
            info!("Intervention#{} closed by patrol #{patrol_id} after {worked:.0}s", self.id);
            ctx.recorder.emit(now, SOURCE, SimEvent::IncidentResolved {
                incident: self.id,
                kind:     EntityKind::Intervention,
            });
            return Ok(StepOutcome::Remove);
        }
        Ok(StepOutcome::Keep)
    }

    fn escalate(&mut self, patrol_id: EntityId, ctx: &mut TickContext<'_>, rng: &mut SubsystemRng) {
        let now = ctx.now;
        let threat = self
            .core
            .district
            .and_then(|id| ctx.map.district(id))
            .map(|d| d.threat_level())
            .unwrap_or_default();
        let firing_id = ctx.registry.allocate_id();
        let mut firing = incident_factory::firing_from_intervention(firing_id, self, threat, ctx.config, rng, now);
        firing.add_solving(patrol_id);
        let (required, strength) = (firing.required_patrols, firing.strength);

        if let Some(patrol) = ctx.registry.patrol_mut(patrol_id) {
            patrol.retarget_participation(firing_id);
        }
        self.core.active = false;
        ctx.registry.insert(Entity::Firing(firing), now);
        ctx.registry.stats_mut().interventions_escalated += 1;

        info!(
            "Intervention#{} escalated into Firing#{firing_id} (required {required}, strength {strength:.0}s)",
            self.id
        );
        ctx.recorder.emit(now, SOURCE, SimEvent::InterventionEscalated {
            intervention: self.id,
            firing: firing_id,
            required,
            strength,
        });
    }
}

#[derive(Debug, Clone)]
pub struct Firing {
    pub id:       EntityId,
    pub position: Coordinate,
    pub core:     IncidentCore,
    pub required_patrols: usize,
    /// Seconds of single-patrol presence still needed.
    pub strength: f64,
    solving:  BTreeSet<EntityId>,
    reaching: BTreeSet<EntityId>,
}

impl Firing {
    pub fn new(
        id: EntityId,
        position: Coordinate,
        now: SimTime,
        required_patrols: usize,
        strength: f64,
        district: Option<DistrictId>,
    ) -> Self {
        Self {
            id,
            position,
            core: IncidentCore::new(now, district),
            required_patrols,
            strength,
            solving: BTreeSet::new(),
            reaching: BTreeSet::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.core.active
    }

    pub fn solving(&self) -> &BTreeSet<EntityId> {
        &self.solving
    }

    pub fn reaching(&self) -> &BTreeSet<EntityId> {
        &self.reaching
    }

    pub fn add_solving(&mut self, patrol: EntityId) {
        self.solving.insert(patrol);
    }

    pub fn remove_solving(&mut self, patrol: EntityId) -> bool {
        self.solving.remove(&patrol)
    }

    pub fn add_reaching(&mut self, patrol: EntityId) {
        self.reaching.insert(patrol);
    }

    pub fn remove_reaching(&mut self, patrol: EntityId) -> bool {
        self.reaching.remove(&patrol)
    }

    /// Empty the en-route set, handing back who was in it.
    pub fn take_reaching(&mut self) -> Vec<EntityId> {
        std::mem::take(&mut self.reaching).into_iter().collect()
    }

    /// Patrols on scene plus patrols on their way.
    pub fn committed(&self) -> usize {
        self.solving.len() + self.reaching.len()
    }

    pub fn is_undersupplied(&self) -> bool {
        self.committed() < self.required_patrols
    }

    /// Burn strength for the time since the last update. On reaching zero
    /// the firing deactivates and every solving patrol is released.
    pub fn update_state(&mut self, ctx: &mut TickContext<'_>) -> SimResult<StepOutcome> {
        let now = ctx.now;
        let elapsed = (now - self.core.last_update).max(0.0);
        self.strength -= self.solving.len() as f64 * elapsed;
        self.core.last_update = now;

        if self.strength > 0.0 {
            return Ok(StepOutcome::Keep);
        }

        self.core.active = false;
        let released: Vec<EntityId> = std::mem::take(&mut self.solving).into_iter().collect();
        for patrol_id in &released {
            if let Some(patrol) = ctx.registry.patrol_mut(*patrol_id) {
                patrol.release(&ctx.recorder, now);
            }
        }
        ctx.registry.stats_mut().firings_solved += 1;
        info!("Firing#{} neutralized, {} patrol(s) released", self.id, released.len());
        ctx.recorder.emit(now, SOURCE, SimEvent::IncidentResolved {
            incident: self.id,
            kind:     EntityKind::Firing,
        });
        Ok(StepOutcome::Remove)
    }
}
