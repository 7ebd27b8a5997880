//! Run configuration. Loaded from a JSON file or built from defaults,
//! then validated once at the boundary before anything else sees it.

use crate::{
    district::ThreatLevel,
    error::{SimError, SimResult},
    types::{Coordinate, SimTime},
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One value per threat level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerThreatLevel<T> {
    pub safe:        T,
    pub rather_safe: T,
    pub not_safe:    T,
}

impl<T: Copy> PerThreatLevel<T> {
    pub fn get(&self, level: ThreatLevel) -> T {
        match level {
            ThreatLevel::Safe       => self.safe,
            ThreatLevel::RatherSafe => self.rather_safe,
            ThreatLevel::NotSafe    => self.not_safe,
        }
    }

    pub fn set(&mut self, level: ThreatLevel, value: T) {
        match level {
            ThreatLevel::Safe       => self.safe = value,
            ThreatLevel::RatherSafe => self.rather_safe = value,
            ThreatLevel::NotSafe    => self.not_safe = value,
        }
    }
}

/// Patrol speeds in km/h.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeedProfile {
    pub patrolling: f64,
    pub transfer:   f64,
    pub privileged: f64,
}

impl Default for SpeedProfile {
    fn default() -> Self {
        Self {
            patrolling: 40.0,
            transfer:   60.0,
            privileged: 80.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub seed: u64,
    pub number_of_patrols: usize,
    /// Simulated seconds per wall-clock second.
    pub time_rate: u32,
    pub simulation_duration_secs: SimTime,
    /// Base radius of dispatch search rings, in meters.
    pub base_search_distance_m: f64,
    pub shift_duration_secs: SimTime,
    pub max_incidents_per_hour: PerThreatLevel<u32>,
    pub firing_chance: PerThreatLevel<f64>,
    /// Minutes.
    pub intervention_duration_min: u32,
    pub intervention_duration_max: u32,
    /// Minutes of single-patrol presence.
    pub firing_strength_min: u32,
    pub firing_strength_max: u32,
    pub speeds: SpeedProfile,
    pub neutralization_probability: f64,
    pub neutralization_check_min_secs: SimTime,
    pub neutralization_check_jitter_secs: SimTime,
    pub night_multiplier: f64,
    pub apply_night_multiplier: bool,
    /// Hour of day at simulated time zero.
    pub start_hour: u32,
    pub export_interval_secs: SimTime,
    pub tick_interval_ms: u64,
    pub aging_interval_ms: u64,
    pub generator_interval_ms: u64,
    /// Where headquarters stands. The map centre is used when absent.
    pub headquarters: Option<Coordinate>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            number_of_patrols: 25,
            time_rate: 300,
            simulation_duration_secs: 86_400.0,
            base_search_distance_m: 1_200.0,
            shift_duration_secs: 28_800.0,
            max_incidents_per_hour: PerThreatLevel { safe: 1, rather_safe: 2, not_safe: 4 },
            firing_chance: PerThreatLevel { safe: 0.01, rather_safe: 0.1, not_safe: 0.4 },
            intervention_duration_min: 10,
            intervention_duration_max: 30,
            firing_strength_min: 30,
            firing_strength_max: 90,
            speeds: SpeedProfile::default(),
            neutralization_probability: 0.01,
            neutralization_check_min_secs: 3_000.0,
            neutralization_check_jitter_secs: 1_000.0,
            night_multiplier: 1.5,
            apply_night_multiplier: true,
            start_hour: 8,
            export_interval_secs: 600.0,
            tick_interval_ms: 40,
            aging_interval_ms: 20,
            generator_interval_ms: 100,
            headquarters: None,
        }
    }
}

impl SimConfig {
    /// Load and validate a JSON configuration file. Missing fields take
    /// their defaults.
    pub fn load(path: impl AsRef<Path>) -> SimResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: SimConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Small, fast configuration for tests: rate 1, one day, few patrols.
    pub fn default_test() -> Self {
        Self {
            number_of_patrols: 3,
            time_rate: 1,
            base_search_distance_m: 500.0,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> SimResult<()> {
        fn invalid(field: &'static str, reason: impl Into<String>) -> SimResult<()> {
            Err(SimError::InvalidConfig { field, reason: reason.into() })
        }
        fn probability(field: &'static str, p: f64) -> SimResult<()> {
            if !(0.0..=1.0).contains(&p) {
                return invalid(field, format!("{p} is not a probability"));
            }
            Ok(())
        }

        if self.time_rate == 0 {
            return Err(SimError::InvalidTimeRate { rate: 0 });
        }
        if !(self.simulation_duration_secs > 0.0) {
            return invalid("simulation_duration_secs", "must be positive");
        }
        if !(self.shift_duration_secs > 0.0) {
            return invalid("shift_duration_secs", "must be positive");
        }
        if !(self.export_interval_secs > 0.0) {
            return invalid("export_interval_secs", "must be positive");
        }
        if !(self.base_search_distance_m >= 0.0) {
            return invalid("base_search_distance_m", "must not be negative");
        }
        if self.intervention_duration_min > self.intervention_duration_max {
            return invalid("intervention_duration_min", "exceeds intervention_duration_max");
        }
        if self.firing_strength_min > self.firing_strength_max {
            return invalid("firing_strength_min", "exceeds firing_strength_max");
        }
        if self.firing_strength_max == 0 {
            return invalid("firing_strength_max", "must be positive");
        }
        for level in ThreatLevel::ALL {
            probability("firing_chance", self.firing_chance.get(level))?;
        }
        probability("neutralization_probability", self.neutralization_probability)?;
        let speeds = self.speeds;
        if !(speeds.patrolling > 0.0 && speeds.transfer > 0.0 && speeds.privileged > 0.0) {
            return invalid("speeds", "every speed must be positive");
        }
        if self.neutralization_check_min_secs < 0.0 || self.neutralization_check_jitter_secs < 0.0 {
            return invalid("neutralization_check_min_secs", "must not be negative");
        }
        if self.night_multiplier < 0.0 {
            return invalid("night_multiplier", "must not be negative");
        }
        if self.start_hour > 23 {
            return invalid("start_hour", "must be within 0..=23");
        }
        Ok(())
    }

    /// Hour-of-day based night check: [22:00, 06:00).
    pub fn is_night(&self, now: SimTime) -> bool {
        if now < 0.0 {
            return false;
        }
        let hour = ((now / 3600.0).floor() as u64 + u64::from(self.start_hour)) % 24;
        !(6..22).contains(&hour)
    }
}
