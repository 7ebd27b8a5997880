//! The simulation tick and incident aging.
//!
//! TICK ORDER (fixed):
//!   1. Every headquarters dispatches.
//!   2. Every patrol decides (update_state_self).
//!   3. Every patrol moves (perform_action).
//!
//! The set of entities stepped is fixed when the tick starts. Entities
//! added during the tick wait for the next one; entities removed during
//! the tick are skipped.

use crate::{
    config::SimConfig,
    entity::{Entity, EntityKind, StepOutcome},
    error::SimResult,
    rng::{SubsystemRng, SubsystemSlot},
    subsystem::SimSubsystem,
    types::EntityId,
    world::World,
};
use log::{error, trace};
use std::time::Duration;

/// Counts from one tick, mostly for tests and tracing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub headquarters: usize,
    pub patrols:      usize,
    pub removed:      usize,
    pub failed:       usize,
}

#[derive(Debug, Default)]
pub struct Scheduler {
    ticks: u64,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn tick(&mut self, world: &World) -> TickReport {
        let (headquarters, patrols) = {
            let registry = world.registry();
            (registry.ids_of(EntityKind::Headquarters), registry.ids_of(EntityKind::Patrol))
        };
        let mut report = TickReport {
            headquarters: headquarters.len(),
            patrols: patrols.len(),
            ..TickReport::default()
        };

        for &id in &headquarters {
            let result = world.step_entity(id, |entity, ctx| {
                if let Entity::Headquarters(hq) = entity {
                    hq.assign_tasks(ctx);
                }
                Ok(StepOutcome::Keep)
            });
            tally(&mut report, id, result);
        }
        for &id in &patrols {
            let result = world.step_entity(id, |entity, ctx| match entity {
                Entity::Patrol(patrol) => patrol.update_state_self(ctx),
                _ => Ok(StepOutcome::Keep),
            });
            tally(&mut report, id, result);
        }
        for &id in &patrols {
            let result = world.step_entity(id, |entity, ctx| match entity {
                Entity::Patrol(patrol) => patrol.perform_action(ctx),
                _ => Ok(StepOutcome::Keep),
            });
            tally(&mut report, id, result);
        }

        self.ticks += 1;
        trace!("Tick {} done: {report:?}", self.ticks);
        report
    }
}

/// An agent whose step failed is skipped for the rest of this pass; the
/// tick goes on with everyone else.
fn tally(report: &mut TickReport, id: EntityId, result: SimResult<Option<StepOutcome>>) {
    match result {
        Ok(Some(StepOutcome::Remove)) => report.removed += 1,
        Ok(_) => {}
        Err(e) => {
            error!("Entity #{id}: tick aborted: {e}");
            report.failed += 1;
        }
    }
}

impl SimSubsystem for Scheduler {
    fn name(&self) -> &'static str {
        "scheduler"
    }

    fn period(&self, config: &SimConfig) -> Duration {
        Duration::from_millis(config.tick_interval_ms)
    }

    fn step(&mut self, world: &World) -> SimResult<()> {
        self.tick(world);
        Ok(())
    }
}

/// Steps every incident: interventions age and may escalate, firings burn
/// down. Runs on its own thread, more often than the tick.
pub struct IncidentAger {
    rng: SubsystemRng,
}

impl IncidentAger {
    pub fn new(world: &World) -> Self {
        Self {
            rng: world.rng_bank().for_subsystem(SubsystemSlot::Escalation),
        }
    }

    /// One aging pass. Returns how many incidents left the registry.
    pub fn age(&mut self, world: &World) -> usize {
        let incidents = world.registry().incident_ids();
        let mut removed = 0;
        for id in incidents {
            let rng = &mut self.rng;
            let result = world.step_entity(id, |entity, ctx| match entity {
                Entity::Intervention(i) if !i.is_active() => Ok(StepOutcome::Remove),
                Entity::Firing(f) if !f.is_active() => Ok(StepOutcome::Remove),
                Entity::Intervention(i) => i.update_state(ctx, rng),
                Entity::Firing(f) => f.update_state(ctx),
                _ => Ok(StepOutcome::Keep),
            });
            match result {
                Ok(Some(StepOutcome::Remove)) => removed += 1,
                Ok(_) => {}
                Err(e) => error!("Incident #{id}: aging aborted: {e}"),
            }
        }
        removed
    }
}

impl SimSubsystem for IncidentAger {
    fn name(&self) -> &'static str {
        "incident-ager"
    }

    fn period(&self, config: &SimConfig) -> Duration {
        Duration::from_millis(config.aging_interval_ms)
    }

    fn step(&mut self, world: &World) -> SimResult<()> {
        self.age(world);
        Ok(())
    }
}
