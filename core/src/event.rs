//! The event journal: every dispatch decision and state change the
//! export side cares about, recorded at the moment it happens.
//!
//! RULE: Events are write-once. The journal is drained by the exporter
//! and never read back by the simulation itself.

use crate::{
    district::ThreatLevel,
    entity::EntityKind,
    patrol::PatrolState,
    types::{EntityId, RunId, SimTime},
};
use serde::{Deserialize, Serialize};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Mutex, PoisonError,
};

/// Variants are appended, never removed or reordered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SimEvent {
    // ── Run control ────────────────────────────────
    SimulationStarted {
        patrols: usize,
    },
    SimulationPaused,
    SimulationResumed,

    // ── Registry ───────────────────────────────────
    EntityAdded {
        id:   EntityId,
        kind: EntityKind,
    },
    EntityRemoved {
        id:   EntityId,
        kind: EntityKind,
    },

    // ── Headquarters ───────────────────────────────
    ShiftStarted {
        headquarters: EntityId,
        spawned:      usize,
    },
    InterventionAssigned {
        intervention: EntityId,
        patrol:       EntityId,
        ring:         u32,
        distance_m:   f64,
    },
    SupportSummoned {
        firing:         EntityId,
        patrol:         EntityId,
        previous_state: PatrolState,
        ring:           u32,
        distance_m:     f64,
        district:       Option<String>,
        threat:         Option<ThreatLevel>,
    },
    FiringReinforced {
        firing:           EntityId,
        required:         usize,
        solving:          usize,
        reaching:         usize,
        called:           usize,
        total_distance_m: f64,
        district:         Option<String>,
        threat:           Option<ThreatLevel>,
    },
    PatrolsRevoked {
        firing:   EntityId,
        revoked:  usize,
        district: Option<String>,
        threat:   Option<ThreatLevel>,
    },

    // ── Agents and incidents ───────────────────────
    PatrolStateChanged {
        patrol:   EntityId,
        from:     PatrolState,
        to:       PatrolState,
        district: Option<String>,
    },
    PatrolNeutralized {
        patrol: EntityId,
        firing: EntityId,
    },
    InterventionEscalated {
        intervention: EntityId,
        firing:       EntityId,
        required:     usize,
        strength:     f64,
    },
    IncidentResolved {
        incident: EntityId,
        kind:     EntityKind,
    },
}

impl SimEvent {
    /// Stable string name, used for the event_type column in event_log.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::SimulationStarted { .. }     => "simulation_started",
            Self::SimulationPaused             => "simulation_paused",
            Self::SimulationResumed            => "simulation_resumed",
            Self::EntityAdded { .. }           => "entity_added",
            Self::EntityRemoved { .. }         => "entity_removed",
            Self::ShiftStarted { .. }          => "shift_started",
            Self::InterventionAssigned { .. }  => "intervention_assigned",
            Self::SupportSummoned { .. }       => "support_summoned",
            Self::FiringReinforced { .. }      => "firing_reinforced",
            Self::PatrolsRevoked { .. }        => "patrols_revoked",
            Self::PatrolStateChanged { .. }    => "patrol_state_changed",
            Self::PatrolNeutralized { .. }     => "patrol_neutralized",
            Self::InterventionEscalated { .. } => "intervention_escalated",
            Self::IncidentResolved { .. }      => "incident_resolved",
        }
    }
}

/// One journal line: the event plus when and where it was emitted.
#[derive(Debug, Clone, PartialEq)]
pub struct JournalRecord {
    pub sim_time: SimTime,
    pub source:   &'static str,
    pub is_night: bool,
    pub event:    SimEvent,
}

/// A row of the event_log table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub id:         Option<i64>,
    pub run_id:     RunId,
    pub sim_time:   SimTime,
    pub source:     String,
    pub event_type: String,
    pub is_night:   bool,
    pub payload:    String,
}

impl EventLogEntry {
    pub fn from_record(run_id: &str, record: &JournalRecord) -> serde_json::Result<Self> {
        Ok(Self {
            id:         None,
            run_id:     run_id.to_string(),
            sim_time:   record.sim_time,
            source:     record.source.to_string(),
            event_type: record.event.event_type().to_string(),
            is_night:   record.is_night,
            payload:    serde_json::to_string(&record.event)?,
        })
    }
}

/// Append-only buffer shared by every thread of control.
///
/// Records are removed only from the front, by the single consumer that
/// called `pending` and committed what it saw.
#[derive(Debug)]
pub struct EventJournal {
    records:   Mutex<Vec<JournalRecord>>,
    recording: AtomicBool,
}

impl Default for EventJournal {
    fn default() -> Self {
        Self {
            records:   Mutex::new(Vec::new()),
            recording: AtomicBool::new(true),
        }
    }
}

impl EventJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// With recording off, `record` discards its input. Runs without an
    /// export store turn it off so the buffer never grows.
    pub fn set_recording(&self, on: bool) {
        self.recording.store(on, Ordering::Relaxed);
        if !on {
            self.drain();
        }
    }

    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::Relaxed)
    }

    pub fn record(&self, record: JournalRecord) {
        if !self.is_recording() {
            return;
        }
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
    }

    /// Take everything recorded so far.
    pub fn drain(&self) -> Vec<JournalRecord> {
        std::mem::take(&mut *self.records.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Copy of the pending records, oldest first.
    pub fn pending(&self) -> Vec<JournalRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Drop the `count` oldest records once they have been persisted.
    pub fn acknowledge(&self, count: usize) {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        let count = count.min(records.len());
        records.drain(..count);
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
