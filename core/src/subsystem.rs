//! Subsystem trait.
//!
//! RULE: Every independently running thread of control implements
//! SimSubsystem. The engine gives each one its own thread and calls
//! step() once per period until the run ends.

use crate::{config::SimConfig, error::SimResult, world::World};
use std::time::Duration;

/// The contract every subsystem must fulfill.
pub trait SimSubsystem: Send {
    /// Unique stable name, also used for the thread name.
    fn name(&self) -> &'static str;

    /// Wall-clock pause between two steps.
    fn period(&self, config: &SimConfig) -> Duration;

    /// One unit of work against the shared world. Never called while the
    /// simulation is paused.
    fn step(&mut self, world: &World) -> SimResult<()>;

    /// Called once after the last step.
    fn finish(&mut self, _world: &World) -> SimResult<()> {
        Ok(())
    }
}
