//! SQLite export store.
//!
//! RULE: Only store.rs talks to the database.
//! The exporter calls store methods; it never executes SQL directly.

use crate::{
    error::SimResult,
    event::EventLogEntry,
    patrol::PatrolState,
    snapshot::{DistrictSummary, SimulationSummary},
    types::SimTime,
};
use chrono::Utc;
use rusqlite::{params, Connection};

pub struct ExportStore {
    conn: Connection,
}

impl ExportStore {
    /// Open (or create) the export database at `path`.
    pub fn open(path: &str) -> SimResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> SimResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> SimResult<()> {
        self.conn.execute_batch(include_str!("../../migrations/001_foundation.sql"))?;
        Ok(())
    }

    // ── Run ────────────────────────────────────────────────────

    pub fn insert_run(&self, run_id: &str, seed: u64, version: &str, config_json: &str) -> SimResult<()> {
        self.conn.execute(
            "INSERT INTO run (run_id, seed, version, started_at, config_json) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![run_id, seed as i64, version, Utc::now().to_rfc3339(), config_json],
        )?;
        Ok(())
    }

    // ── Details ────────────────────────────────────────────────

    pub fn insert_simulation_details(&self, run_id: &str, summary: &SimulationSummary) -> SimResult<()> {
        let count = |state: PatrolState| summary.state_count(state) as i64;
        self.conn.execute(
            "INSERT INTO simulation_details (
                run_id, sim_time, is_night, patrols,
                patrolling, transfer_to_intervention, transfer_to_firing,
                intervention, firing, neutralized, returning_to_hq,
                interventions, interventions_being_solved, firings, firings_being_solved)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                run_id,
                summary.sim_time,
                summary.is_night,
                summary.patrols as i64,
                count(PatrolState::Patrolling),
                count(PatrolState::TransferToIntervention),
                count(PatrolState::TransferToFiring),
                count(PatrolState::Intervention),
                count(PatrolState::Firing),
                count(PatrolState::Neutralized),
                count(PatrolState::ReturningToHq),
                summary.interventions as i64,
                summary.interventions_being_solved as i64,
                summary.firings as i64,
                summary.firings_being_solved as i64,
            ],
        )?;
        Ok(())
    }

    pub fn insert_district_details(
        &self,
        run_id: &str,
        sim_time: SimTime,
        is_night: bool,
        district: &DistrictSummary,
    ) -> SimResult<()> {
        self.conn.execute(
            "INSERT INTO district_details (
                run_id, sim_time, is_night, district_id, district, threat_level,
                patrols, patrols_by_state, interventions, firings)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                run_id,
                sim_time,
                is_night,
                district.id,
                district.name,
                district.threat.name(),
                district.patrols as i64,
                serde_json::to_string(&district.patrols_by_state)?,
                district.interventions as i64,
                district.firings as i64,
            ],
        )?;
        Ok(())
    }

    // ── Event log ──────────────────────────────────────────────

    /// Append a batch inside one transaction.
    pub fn append_events(&mut self, entries: &[EventLogEntry]) -> SimResult<usize> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO event_log (run_id, sim_time, source, event_type, is_night, payload)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for entry in entries {
                stmt.execute(params![
                    entry.run_id,
                    entry.sim_time,
                    entry.source,
                    entry.event_type,
                    entry.is_night,
                    entry.payload,
                ])?;
            }
        }
        tx.commit()?;
        Ok(entries.len())
    }

    pub fn events_of_type(&self, run_id: &str, event_type: &str) -> SimResult<Vec<EventLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, run_id, sim_time, source, event_type, is_night, payload
             FROM event_log WHERE run_id = ?1 AND event_type = ?2
             ORDER BY id ASC",
        )?;
        let entries = stmt
            .query_map(params![run_id, event_type], |row| {
                Ok(EventLogEntry {
                    id:         Some(row.get(0)?),
                    run_id:     row.get(1)?,
                    sim_time:   row.get(2)?,
                    source:     row.get(3)?,
                    event_type: row.get(4)?,
                    is_night:   row.get(5)?,
                    payload:    row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    // ── Counts ─────────────────────────────────────────────────

    fn count(&self, sql: &str, run_id: &str) -> SimResult<i64> {
        Ok(self.conn.query_row(sql, params![run_id], |row| row.get(0))?)
    }

    pub fn event_count(&self, run_id: &str) -> SimResult<i64> {
        self.count("SELECT COUNT(*) FROM event_log WHERE run_id = ?1", run_id)
    }

    pub fn simulation_detail_count(&self, run_id: &str) -> SimResult<i64> {
        self.count("SELECT COUNT(*) FROM simulation_details WHERE run_id = ?1", run_id)
    }

    pub fn district_detail_count(&self, run_id: &str) -> SimResult<i64> {
        self.count("SELECT COUNT(*) FROM district_details WHERE run_id = ?1", run_id)
    }
}
