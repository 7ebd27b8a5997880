//! Periodic export of run statistics and the event journal.

use crate::{
    config::SimConfig,
    error::SimResult,
    event::EventLogEntry,
    snapshot::SimulationSummary,
    store::ExportStore,
    subsystem::SimSubsystem,
    types::{RunId, SimTime},
    world::World,
};
use chrono::Utc;
use log::{debug, info};
use std::time::Duration;

/// How often the exporter wakes up to drain the journal.
const EXPORT_POLL_MS: u64 = 100;

/// Run id stamped with the wall-clock start and the seed.
pub fn new_run_id(seed: u64) -> RunId {
    format!("run-{}-{seed}", Utc::now().format("%Y%m%dT%H%M%S"))
}

pub struct Exporter {
    store:  ExportStore,
    run_id: RunId,
    next_export: SimTime,
    exports: u64,
}

impl Exporter {
    /// Migrate the store and register the run.
    pub fn new(store: ExportStore, run_id: RunId, config: &SimConfig) -> SimResult<Self> {
        store.migrate()?;
        store.insert_run(&run_id, config.seed, env!("CARGO_PKG_VERSION"), &serde_json::to_string(config)?)?;
        Ok(Self { store, run_id, next_export: 0.0, exports: 0 })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn store(&self) -> &ExportStore {
        &self.store
    }

    pub fn exports(&self) -> u64 {
        self.exports
    }

    /// Write detail rows if an export is due, then flush the journal.
    pub fn export(&mut self, world: &World) -> SimResult<()> {
        let now = world.now();
        if now >= self.next_export {
            self.write_details(world)?;
            let interval = world.config().export_interval_secs;
            self.next_export = ((now / interval).floor() + 1.0) * interval;
        }
        self.flush_journal(world)?;
        Ok(())
    }

    fn write_details(&mut self, world: &World) -> SimResult<()> {
        let snapshot = world.snapshot();
        let summary = SimulationSummary::from_snapshot(&snapshot, world.map());
        self.store.insert_simulation_details(&self.run_id, &summary)?;
        for district in &summary.districts {
            self.store
                .insert_district_details(&self.run_id, summary.sim_time, summary.is_night, district)?;
        }
        self.exports += 1;
        debug!(
            "Export {} at {:.0}s: {} patrol(s), {} intervention(s), {} firing(s)",
            self.exports, summary.sim_time, summary.patrols, summary.interventions, summary.firings
        );
        Ok(())
    }

    /// Persist pending journal records. Records leave the journal only
    /// after their batch commits, so a failed write is retried next time.
    pub fn flush_journal(&mut self, world: &World) -> SimResult<usize> {
        let journal = world.journal();
        let records = journal.pending();
        if records.is_empty() {
            return Ok(0);
        }
        let entries = records
            .iter()
            .map(|r| EventLogEntry::from_record(&self.run_id, r))
            .collect::<Result<Vec<_>, _>>()?;
        let written = self.store.append_events(&entries)?;
        journal.acknowledge(records.len());
        Ok(written)
    }
}

impl SimSubsystem for Exporter {
    fn name(&self) -> &'static str {
        "exporter"
    }

    fn period(&self, _config: &SimConfig) -> Duration {
        Duration::from_millis(EXPORT_POLL_MS)
    }

    fn step(&mut self, world: &World) -> SimResult<()> {
        self.export(world)
    }

    fn finish(&mut self, world: &World) -> SimResult<()> {
        self.write_details(world)?;
        let flushed = self.flush_journal(world)?;
        info!("Export {} finished: {} detail export(s), {flushed} late event(s)", self.run_id, self.exports);
        Ok(())
    }
}
