//! Deterministic random number generation.
//!
//! RULE: Nothing in the simulation may call any platform RNG.
//! All randomness flows through SubsystemRng instances derived
//! from the single master seed in the configuration.
//!
//! Each subsystem gets its own RNG stream, seeded deterministically
//! from (master_seed XOR subsystem_index). Every patrol gets its own
//! stream too, derived from its entity id, so adding a patrol never
//! shifts another patrol's rolls.

use crate::types::EntityId;
use rand::{Rng, RngCore, SeedableRng};
use rand_pcg::Pcg64Mcg;

/// Patrol streams start above every subsystem slot.
const PATROL_STREAM_BASE: u64 = 0x1_0000;

/// A named, deterministic RNG for a single subsystem or agent.
#[derive(Debug)]
pub struct SubsystemRng {
    pub name: &'static str,
    inner: Pcg64Mcg,
}

impl SubsystemRng {
    /// Create a stream from the master seed and a stable index.
    /// The index must never change once assigned.
    pub fn new(master_seed: u64, stream_index: u64) -> Self {
        let derived_seed = master_seed ^ (stream_index.wrapping_mul(0x9e37_79b9_7f4a_7c15));
        Self {
            name: "unnamed",
            inner: Pcg64Mcg::seed_from_u64(derived_seed),
        }
    }

    pub fn with_name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    /// Roll a float in [0.0, 1.0).
    pub fn next_f64(&mut self) -> f64 {
        let bits = self.inner.next_u64();
        (bits >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    /// Draw a raw u64 (full range).
    pub fn next_u64(&mut self) -> u64 {
        self.inner.next_u64()
    }

    /// Roll an index in [0, len). `len` must be > 0.
    pub fn pick_index(&mut self, len: usize) -> usize {
        assert!(len > 0, "len must be > 0");
        self.inner.gen_range(0..len)
    }

    /// Roll an integer in [low, high). Returns `low` when the range is empty.
    pub fn range_i64(&mut self, low: i64, high: i64) -> i64 {
        if high <= low {
            return low;
        }
        self.inner.gen_range(low..high)
    }

    /// Roll a float in [low, high). Returns `low` when the range is empty.
    pub fn range_f64(&mut self, low: f64, high: f64) -> f64 {
        if high <= low {
            return low;
        }
        low + (high - low) * self.next_f64()
    }

    /// Bernoulli trial: returns true with probability p.
    pub fn chance(&mut self, p: f64) -> bool {
        self.next_f64() < p
    }
}

/// Hands out every RNG stream for a single run.
#[derive(Debug, Clone, Copy)]
pub struct RngBank {
    master_seed: u64,
}

impl RngBank {
    pub fn new(master_seed: u64) -> Self {
        Self { master_seed }
    }

    pub fn master_seed(&self) -> u64 {
        self.master_seed
    }

    pub fn for_subsystem(&self, slot: SubsystemSlot) -> SubsystemRng {
        SubsystemRng::new(self.master_seed, slot as u64).with_name(slot.name())
    }

    /// Per-agent stream for a patrol.
    pub fn for_patrol(&self, patrol_id: EntityId) -> SubsystemRng {
        SubsystemRng::new(self.master_seed, PATROL_STREAM_BASE.wrapping_add(patrol_id))
            .with_name("patrol")
    }
}

/// Stable subsystem slot assignments.
/// NEVER reorder or remove entries. Only append.
/// Reordering changes every subsystem's seed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u64)]
pub enum SubsystemSlot {
    Generator  = 0,
    Escalation = 1,
}

impl SubsystemSlot {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Generator  => "generator",
            Self::Escalation => "escalation",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_stream() {
        let bank_a = RngBank::new(12345);
        let bank_b = RngBank::new(12345);
        let mut a = bank_a.for_subsystem(SubsystemSlot::Generator);
        let mut b = bank_b.for_subsystem(SubsystemSlot::Generator);
        for _ in 0..50 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
    }

    #[test]
    fn patrol_streams_are_independent() {
        let bank = RngBank::new(7);
        let mut first = bank.for_patrol(1);
        let mut second = bank.for_patrol(2);
        let rolls_a: Vec<u64> = (0..8).map(|_| first.next_u64()).collect();
        let rolls_b: Vec<u64> = (0..8).map(|_| second.next_u64()).collect();
        assert_ne!(rolls_a, rolls_b);
    }

    #[test]
    fn ranges_stay_in_bounds() {
        let mut rng = RngBank::new(99).for_subsystem(SubsystemSlot::Escalation);
        for _ in 0..500 {
            let f = rng.range_f64(3000.0, 4000.0);
            assert!((3000.0..4000.0).contains(&f));
            let i = rng.range_i64(600, 1801);
            assert!((600..1801).contains(&i));
            assert!(rng.pick_index(5) < 5);
        }
        assert_eq!(rng.range_i64(10, 10), 10);
    }
}
