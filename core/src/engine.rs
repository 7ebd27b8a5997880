//! The simulation engine.
//!
//! EXECUTION ORDER (registration order, used by `step`):
//!   1. Incident generator
//!   2. Scheduler tick (headquarters, patrol decisions, patrol movement)
//!   3. Incident ager
//!   4. Exporter (when a store is attached)
//!
//! RULES:
//!   - `start` gives every subsystem its own named thread. Threads share
//!     nothing but the World.
//!   - A paused simulation keeps its threads alive but runs no steps.
//!   - Threads exit once simulated time passes the configured duration
//!     or `stop` is called; each then runs its `finish` hook.
//!   - A failing step is logged and the loop goes on.

use crate::{
    error::SimResult,
    exporter::Exporter,
    incident_generator::IncidentGenerator,
    scheduler::{IncidentAger, Scheduler},
    subsystem::SimSubsystem,
    world::World,
};
use log::{error, info, warn};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

/// Upper bound on one sleep, so stop and pause are noticed promptly.
const MAX_NAP: Duration = Duration::from_millis(50);

pub struct SimEngine {
    world:      Arc<World>,
    subsystems: Vec<Box<dyn SimSubsystem>>,
    handles:    Vec<JoinHandle<()>>,
    stop:       Arc<AtomicBool>,
}

impl SimEngine {
    pub fn new(world: Arc<World>) -> Self {
        Self {
            world,
            subsystems: Vec::new(),
            handles: Vec::new(),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Build a fully wired engine with all subsystems registered.
    pub fn build(world: Arc<World>, exporter: Option<Exporter>) -> Self {
        let mut engine = SimEngine::new(Arc::clone(&world));
        engine.register(Box::new(IncidentGenerator::new(&world)));
        engine.register(Box::new(Scheduler::new()));
        engine.register(Box::new(IncidentAger::new(&world)));
        match exporter {
            Some(exporter) => engine.register(Box::new(exporter)),
            None => world.journal().set_recording(false),
        }
        engine
    }

    /// Register a subsystem. Call in the documented execution order.
    pub fn register(&mut self, subsystem: Box<dyn SimSubsystem>) {
        self.subsystems.push(subsystem);
    }

    pub fn world(&self) -> &Arc<World> {
        &self.world
    }

    /// Run every registered subsystem once on the calling thread. Meant
    /// for runs driven by a manual clock; unavailable after `start`.
    pub fn step(&mut self) -> SimResult<()> {
        self.world.start()?;
        for subsystem in &mut self.subsystems {
            if let Err(e) = subsystem.step(&self.world) {
                error!("{}: step failed: {e}", subsystem.name());
            }
        }
        Ok(())
    }

    /// Run every `finish` hook on the calling thread.
    pub fn finish(&mut self) -> SimResult<()> {
        for subsystem in &mut self.subsystems {
            subsystem.finish(&self.world)?;
        }
        Ok(())
    }

    /// Start the clock and one thread per subsystem.
    pub fn start(&mut self) -> SimResult<()> {
        self.world.start()?;
        for subsystem in self.subsystems.drain(..) {
            let name = subsystem.name();
            let world = Arc::clone(&self.world);
            let stop = Arc::clone(&self.stop);
            let handle = thread::Builder::new()
                .name(format!("sim-{name}"))
                .spawn(move || run_loop(subsystem, &world, &stop))?;
            self.handles.push(handle);
        }
        info!("Engine started with {} thread(s)", self.handles.len());
        Ok(())
    }

    pub fn pause(&self) {
        self.world.pause();
    }

    pub fn resume(&self) {
        self.world.resume();
    }

    pub fn is_paused(&self) -> bool {
        self.world.clock().is_paused()
    }

    pub fn is_finished(&self) -> bool {
        self.world.is_finished() || self.stop.load(Ordering::Relaxed)
    }

    /// Ask every thread to exit after its current step.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    /// Block until every subsystem thread has exited.
    pub fn wait(&mut self) {
        for handle in self.handles.drain(..) {
            let name = handle.thread().name().unwrap_or("sim").to_string();
            if handle.join().is_err() {
                error!("{name}: thread panicked");
            }
        }
    }
}

impl Drop for SimEngine {
    fn drop(&mut self) {
        if !self.handles.is_empty() {
            self.stop();
            self.wait();
        }
    }
}

fn run_loop(mut subsystem: Box<dyn SimSubsystem>, world: &World, stop: &AtomicBool) {
    let period = subsystem.period(world.config());
    loop {
        if stop.load(Ordering::Relaxed) || world.is_finished() {
            break;
        }
        if world.clock().is_paused() {
            thread::sleep(period.min(MAX_NAP));
            continue;
        }
        if let Err(e) = subsystem.step(world) {
            error!("{}: step failed: {e}", subsystem.name());
        }
        thread::sleep(period);
    }
    if let Err(e) = subsystem.finish(world) {
        warn!("{}: finish failed: {e}", subsystem.name());
    }
}
