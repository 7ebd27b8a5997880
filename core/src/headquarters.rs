//! Headquarters: the stationary dispatcher.
//!
//! DISPATCH ORDER (every tick):
//!   1. Shift rollover: spawn a fresh shift once the current one is over.
//!   2. Refresh the list of active incidents.
//!   3. Firings, oldest first: revoke surplus en-route patrols, then
//!      summon support ring by ring.
//!   4. Interventions, oldest first: nearest ring holding an idle patrol.
//!
//! Ring membership uses great-circle distance, not road distance.

use crate::{
    config::SimConfig,
    event::SimEvent,
    patrol::{ActionTarget, PatrolState},
    types::{Coordinate, EntityId, SimTime},
    world::TickContext,
};
use log::{debug, info};

const SOURCE: &str = "headquarters";

/// Rings searched around an undersupplied firing.
pub const FIRING_RINGS: u32 = 3;
/// Event ring number used when patrols are pulled off interventions.
pub const REDIRECT_RING: u32 = FIRING_RINGS + 1;
/// Rings searched around an unassigned intervention, starting at zero.
pub const INTERVENTION_RINGS: u32 = 10;

#[derive(Debug, Clone)]
pub struct Headquarters {
    pub id:       EntityId,
    pub position: Coordinate,
    pub search_range: f64,
    pub shift_duration: SimTime,
    end_of_current_shift: SimTime,
    incidents: Vec<EntityId>,
}

impl Headquarters {
    pub fn new(id: EntityId, position: Coordinate, now: SimTime, config: &SimConfig) -> Self {
        Self {
            id,
            position,
            search_range: config.base_search_distance_m,
            shift_duration: config.shift_duration_secs,
            end_of_current_shift: now + config.shift_duration_secs,
            incidents: Vec::new(),
        }
    }

    pub fn end_of_current_shift(&self) -> SimTime {
        self.end_of_current_shift
    }

    /// Incidents seen on the last dispatch pass, oldest first.
    pub fn known_incidents(&self) -> &[EntityId] {
        &self.incidents
    }

    pub fn assign_tasks(&mut self, ctx: &mut TickContext<'_>) {
        self.rotate_shift(ctx);
        self.refresh_incidents(ctx);

        let incidents = self.incidents.clone();
        for &id in &incidents {
            if ctx.registry.firing(id).is_some_and(|f| f.is_active()) {
                self.revoke_surplus(id, ctx);
                self.summon_support(id, ctx);
            }
        }
        for &id in &incidents {
            if ctx.registry.intervention(id).is_some_and(|i| i.is_active() && i.patrol_solving.is_none()) {
                self.assign_intervention(id, ctx);
            }
        }
    }

    fn rotate_shift(&mut self, ctx: &mut TickContext<'_>) {
        if ctx.now <= self.end_of_current_shift {
            return;
        }
        let spawned = ctx.config.number_of_patrols;
        for _ in 0..spawned {
            ctx.registry.spawn_patrol(self.position, ctx.now, ctx.config);
        }
        self.end_of_current_shift += self.shift_duration;
        ctx.registry.stats_mut().shifts_started += 1;
        info!(
            "Headquarters #{}: new shift of {spawned} patrol(s), next rollover at {:.0}s",
            self.id, self.end_of_current_shift
        );
        ctx.recorder.emit(ctx.now, SOURCE, SimEvent::ShiftStarted {
            headquarters: self.id,
            spawned,
        });
    }

    fn refresh_incidents(&mut self, ctx: &TickContext<'_>) {
        let mut incidents: Vec<(SimTime, EntityId)> = ctx
            .registry
            .iter()
            .filter(|e| e.is_active())
            .filter_map(|e| e.incident_start().map(|start| (start, e.id())))
            .collect();
        incidents.sort_by(|a, b| a.0.total_cmp(&b.0));
        self.incidents = incidents.into_iter().map(|(_, id)| id).collect();
    }

    fn revoke_surplus(&mut self, firing_id: EntityId, ctx: &mut TickContext<'_>) {
        let Some(firing) = ctx.registry.firing_mut(firing_id) else {
            return;
        };
        if firing.solving().len() < firing.required_patrols || firing.reaching().is_empty() {
            return;
        }
        let position = firing.position;
        let revoked = firing.take_reaching();
        for &patrol_id in &revoked {
            if let Some(patrol) = ctx.registry.patrol_mut(patrol_id) {
                patrol.release(&ctx.recorder, ctx.now);
            }
        }
        let (district, threat) = ctx.recorder.locate(position);
        info!("Firing#{firing_id}: enough patrols on scene, {} revoked", revoked.len());
        ctx.recorder.emit(ctx.now, SOURCE, SimEvent::PatrolsRevoked {
            firing: firing_id,
            revoked: revoked.len(),
            district,
            threat,
        });
    }

    fn summon_support(&mut self, firing_id: EntityId, ctx: &mut TickContext<'_>) {
        let Some(firing) = ctx.registry.firing(firing_id) else {
            return;
        };
        if !firing.is_undersupplied() {
            return;
        }
        let position = firing.position;
        let mut called = 0;
        let mut total_distance = 0.0;

        for ring in 1..=FIRING_RINGS {
            let found = ctx.registry.patrols_near(position, self.search_range * f64::from(ring), PatrolState::Patrolling);
            for (patrol_id, distance) in found {
                self.send_to_firing(firing_id, position, patrol_id, ring, distance, ctx);
                called += 1;
                total_distance += distance;
            }
            if !self.firing_undersupplied(firing_id, ctx) {
                break;
            }
        }

        if self.firing_undersupplied(firing_id, ctx) {
            let outer = self.search_range * f64::from(FIRING_RINGS);
            let busy = ctx.registry.patrols_near(position, outer, PatrolState::TransferToIntervention);
            for (patrol_id, distance) in busy {
                self.free_from_intervention(patrol_id, ctx);
                self.send_to_firing(firing_id, position, patrol_id, REDIRECT_RING, distance, ctx);
                called += 1;
                total_distance += distance;
            }
        }

        if called == 0 {
            return;
        }
        let Some(firing) = ctx.registry.firing(firing_id) else {
            return;
        };
        let (required, solving, reaching) = (firing.required_patrols, firing.solving().len(), firing.reaching().len());
        let (district, threat) = ctx.recorder.locate(position);
        info!("Firing#{firing_id}: {called} patrol(s) summoned ({solving} on scene, {reaching} en route, {required} required)");
        ctx.recorder.emit(ctx.now, SOURCE, SimEvent::FiringReinforced {
            firing: firing_id,
            required,
            solving,
            reaching,
            called,
            total_distance_m: total_distance,
            district,
            threat,
        });
    }

    fn firing_undersupplied(&self, firing_id: EntityId, ctx: &TickContext<'_>) -> bool {
        ctx.registry.firing(firing_id).is_some_and(|f| f.is_undersupplied())
    }

    /// Clear the intervention a redirected patrol was heading to, so the
    /// intervention goes back into the assignment pool.
    fn free_from_intervention(&self, patrol_id: EntityId, ctx: &mut TickContext<'_>) {
        let Some(intervention_id) = ctx.registry.patrol(patrol_id).and_then(|p| p.incident_target()) else {
            return;
        };
        if let Some(intervention) = ctx.registry.intervention_mut(intervention_id) {
            if intervention.patrol_solving == Some(patrol_id) {
                intervention.patrol_solving = None;
                debug!("Intervention#{intervention_id}: patrol #{patrol_id} redirected, back in the pool");
            }
        }
    }

    fn send_to_firing(
        &self,
        firing_id: EntityId,
        position: Coordinate,
        patrol_id: EntityId,
        ring: u32,
        distance: f64,
        ctx: &mut TickContext<'_>,
    ) {
        let Some(mut patrol) = ctx.registry.take_patrol(patrol_id) else {
            return;
        };
        let previous_state = patrol.state();
        patrol.issue_transfer(ActionTarget::Incident(firing_id), position, PatrolState::TransferToFiring, ctx);
        ctx.registry.put_patrol(patrol);
        if let Some(firing) = ctx.registry.firing_mut(firing_id) {
            firing.add_reaching(patrol_id);
        }

        let (district, threat) = ctx.recorder.locate(position);
        debug!("Firing#{firing_id}: patrol #{patrol_id} summoned from ring {ring} ({distance:.0} m)");
        ctx.recorder.emit(ctx.now, SOURCE, SimEvent::SupportSummoned {
            firing: firing_id,
            patrol: patrol_id,
            previous_state,
            ring,
            distance_m: distance,
            district,
            threat,
        });
    }

    fn assign_intervention(&self, intervention_id: EntityId, ctx: &mut TickContext<'_>) {
        let Some(position) = ctx.registry.intervention(intervention_id).map(|i| i.position) else {
            return;
        };
        for ring in 0..=INTERVENTION_RINGS {
            let range = self.search_range * f64::from(ring);
            let Some(&(patrol_id, distance)) = ctx.registry.patrols_near(position, range, PatrolState::Patrolling).first() else {
                continue;
            };
            let Some(mut patrol) = ctx.registry.take_patrol(patrol_id) else {
                return;
            };
            patrol.issue_transfer(
                ActionTarget::Incident(intervention_id),
                position,
                PatrolState::TransferToIntervention,
                ctx,
            );
            ctx.registry.put_patrol(patrol);
            if let Some(intervention) = ctx.registry.intervention_mut(intervention_id) {
                intervention.patrol_solving = Some(patrol_id);
            }
            debug!("Intervention#{intervention_id}: patrol #{patrol_id} assigned from ring {ring} ({distance:.0} m)");
            ctx.recorder.emit(ctx.now, SOURCE, SimEvent::InterventionAssigned {
                intervention: intervention_id,
                patrol: patrol_id,
                ring,
                distance_m: distance,
            });
            return;
        }
        debug!("Intervention#{intervention_id}: no idle patrol within {INTERVENTION_RINGS} rings");
    }
}
