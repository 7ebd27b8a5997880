//! Random incident construction. Durations and strengths are drawn from a
//! band of the configured range that depends on the district threat level.

use crate::{
    config::SimConfig,
    district::{CityMap, District, ThreatLevel},
    incident::{Firing, Intervention},
    rng::SubsystemRng,
    types::{EntityId, SimTime},
};

/// Seconds of single-patrol presence one required patrol stands for.
pub const STRENGTH_PER_PATROL_SECS: f64 = 15.0 * 60.0;

/// Sub-range of [min, max) used for a threat level. Safe districts draw
/// from the lower half, rather-safe from the middle half, not-safe from
/// the upper half.
pub fn threat_band(threat: ThreatLevel, min: i64, max: i64) -> (i64, i64) {
    let span = max - min;
    match threat {
        ThreatLevel::Safe       => (min, min + span / 2),
        ThreatLevel::RatherSafe => (min + span / 4, max - span / 4),
        ThreatLevel::NotSafe    => (min + span / 2, max),
    }
}

/// Draw a whole number of seconds from the threat band of a range given
/// in minutes, upper bound inclusive.
pub fn draw_banded_seconds(threat: ThreatLevel, min_minutes: u32, max_minutes: u32, rng: &mut SubsystemRng) -> i64 {
    let min = i64::from(min_minutes) * 60;
    let max = i64::from(max_minutes) * 60 + 1;
    let (low, high) = threat_band(threat, min, max);
    rng.range_i64(low, high)
}

/// A new intervention at a random node of the district, or None if the
/// district has no road nodes.
pub fn intervention_for_district(
    id: EntityId,
    district: &District,
    map: &CityMap,
    config: &SimConfig,
    rng: &mut SubsystemRng,
    now: SimTime,
) -> Option<Intervention> {
    let node = map.random_node_in(district, rng)?;
    let threat = district.threat_level();
    let duration = draw_banded_seconds(
        threat,
        config.intervention_duration_min,
        config.intervention_duration_max,
        rng,
    );
    let escalation_delay = rng
        .chance(config.firing_chance.get(threat))
        .then(|| rng.range_i64(0, duration) as SimTime);

    Some(Intervention::new(
        id,
        node.position,
        now,
        duration as SimTime,
        escalation_delay,
        Some(district.id),
    ))
}

/// How many patrols a firing of this strength asks for. Weak firings ask
/// for anything between one and the strength-derived count; strong ones
/// ask for at most three fewer.
pub fn required_patrols_for(strength: f64, rng: &mut SubsystemRng) -> usize {
    let ceiling = (strength / STRENGTH_PER_PATROL_SECS).ceil().max(1.0) as i64;
    let floor = if ceiling > 4 { ceiling - 3 } else { 1 };
    rng.range_i64(floor, ceiling + 1) as usize
}

/// The firing an escalating intervention turns into.
pub fn firing_from_intervention(
    id: EntityId,
    intervention: &Intervention,
    threat: ThreatLevel,
    config: &SimConfig,
    rng: &mut SubsystemRng,
    now: SimTime,
) -> Firing {
    let strength = draw_banded_seconds(threat, config.firing_strength_min, config.firing_strength_max, rng) as f64;
    let required = required_patrols_for(strength, rng);
    Firing::new(id, intervention.position, now, required, strength, intervention.core.district)
}
