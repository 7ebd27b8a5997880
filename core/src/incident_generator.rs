//! Hourly incident generation.
//!
//! At every simulated hour boundary each district with road nodes gets a
//! random number of incidents, scheduled at random moments within that
//! hour. Night hours scale the per-district maximum when enabled.

use crate::{
    config::SimConfig,
    entity::Entity,
    error::SimResult,
    incident_factory,
    rng::{SubsystemRng, SubsystemSlot},
    subsystem::SimSubsystem,
    types::{DistrictId, SimTime},
    world::World,
};
use log::{debug, info};
use std::{collections::VecDeque, time::Duration};

const SECONDS_PER_HOUR: f64 = 3_600.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlannedIncident {
    pub at:       SimTime,
    pub district: DistrictId,
}

pub struct IncidentGenerator {
    rng: SubsystemRng,
    planned_hour: Option<u64>,
    pending: VecDeque<PlannedIncident>,
}

impl IncidentGenerator {
    pub fn new(world: &World) -> Self {
        Self {
            rng: world.rng_bank().for_subsystem(SubsystemSlot::Generator),
            planned_hour: None,
            pending: VecDeque::new(),
        }
    }

    pub fn pending(&self) -> impl Iterator<Item = &PlannedIncident> {
        self.pending.iter()
    }

    /// Upper bound of the hourly draw for one district.
    pub fn hourly_maximum(config: &SimConfig, base: u32, hour_start: SimTime) -> u32 {
        if config.apply_night_multiplier && config.is_night(hour_start) {
            (f64::from(base) * config.night_multiplier).round() as u32
        } else {
            base
        }
    }

    fn plan_hour(&mut self, hour: u64, world: &World) {
        let hour_start = hour as f64 * SECONDS_PER_HOUR;
        let config = world.config();
        let mut planned = Vec::new();
        for district in world.map().districts().iter().filter(|d| !d.nodes().is_empty()) {
            let base = config.max_incidents_per_hour.get(district.threat_level());
            let maximum = Self::hourly_maximum(config, base, hour_start);
            let count = self.rng.range_i64(0, i64::from(maximum) + 1);
            for _ in 0..count {
                planned.push(PlannedIncident {
                    at: hour_start + self.rng.range_f64(0.0, SECONDS_PER_HOUR),
                    district: district.id,
                });
            }
        }
        planned.sort_by(|a, b| a.at.total_cmp(&b.at));
        debug!("Hour {hour}: {} incident(s) planned", planned.len());
        self.pending.extend(planned);
        self.planned_hour = Some(hour);
    }

    /// Plan the current hour if needed and spawn everything due.
    /// Returns how many interventions were created.
    pub fn generate(&mut self, world: &World) -> usize {
        let now = world.now();
        if now < 0.0 {
            return 0;
        }
        let hour = (now / SECONDS_PER_HOUR).floor() as u64;
        if self.planned_hour.map_or(true, |planned| planned < hour) {
            self.plan_hour(hour, world);
        }

        let mut created = 0;
        while self.pending.front().is_some_and(|p| p.at <= now) {
            let Some(planned) = self.pending.pop_front() else {
                break;
            };
            let Some(district) = world.map().district(planned.district) else {
                continue;
            };
            let mut registry = world.registry();
            let id = registry.allocate_id();
            let Some(intervention) =
                incident_factory::intervention_for_district(id, district, world.map(), world.config(), &mut self.rng, now)
            else {
                continue;
            };
            info!(
                "New intervention #{id} in {} ({}s{})",
                district.name,
                intervention.duration,
                if intervention.will_escalate() { ", will escalate" } else { "" }
            );
            registry.insert(Entity::Intervention(intervention), now);
            created += 1;
        }
        created
    }
}

impl SimSubsystem for IncidentGenerator {
    fn name(&self) -> &'static str {
        "incident-generator"
    }

    fn period(&self, config: &SimConfig) -> Duration {
        Duration::from_millis(config.generator_interval_ms)
    }

    fn step(&mut self, world: &World) -> SimResult<()> {
        self.generate(world);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn night_scales_the_hourly_maximum() {
        let config = SimConfig { start_hour: 0, ..SimConfig::default_test() };
        // 02:00 is night, 12:00 is day.
        assert_eq!(IncidentGenerator::hourly_maximum(&config, 4, 2.0 * 3600.0), 6);
        assert_eq!(IncidentGenerator::hourly_maximum(&config, 4, 12.0 * 3600.0), 4);

        let flat = SimConfig { apply_night_multiplier: false, ..config };
        assert_eq!(IncidentGenerator::hourly_maximum(&flat, 4, 2.0 * 3600.0), 4);
    }
}
