//! Export store and the periodic exporter.

mod common;

use common::{quiet_config, Harness};
use patrolsim_core::{
    config::SimConfig,
    exporter::Exporter,
    import::synthetic_grid,
    scheduler::{IncidentAger, Scheduler},
    incident_generator::IncidentGenerator,
    store::ExportStore,
    types::Coordinate,
};
use rusqlite::Connection;
use std::{
    path::PathBuf,
    time::{SystemTime, UNIX_EPOCH},
};

fn busy_config() -> SimConfig {
    let mut config = SimConfig::default_test();
    config.number_of_patrols = 6;
    config.headquarters = Some(Coordinate::new(50.06, 19.94));
    config.max_incidents_per_hour.safe = 3;
    config.max_incidents_per_hour.rather_safe = 3;
    config.max_incidents_per_hour.not_safe = 3;
    config
}

fn exporter(config: &SimConfig, run_id: &str) -> Exporter {
    let store = ExportStore::in_memory().expect("in-memory store");
    Exporter::new(store, run_id.to_string(), config).expect("exporter")
}

#[test]
fn details_are_written_every_export_interval() {
    let config = busy_config();
    let mut exporter = exporter(&config, "export-test");
    let h = Harness::new(config, synthetic_grid(4, 4, 200.0, Coordinate::new(50.06, 19.94)).into_city().unwrap());
    let mut scheduler = Scheduler::new();
    let mut ager = IncidentAger::new(&h.world);
    let mut generator = IncidentGenerator::new(&h.world);

    // 0 .. 1300 s in 20 s steps: exports at 0, 600 and 1200.
    for _ in 0..=65 {
        generator.generate(&h.world);
        scheduler.tick(&h.world);
        ager.age(&h.world);
        exporter.export(&h.world).unwrap();
        h.advance(20.0);
    }

    let store = exporter.store();
    assert_eq!(exporter.exports(), 3);
    assert_eq!(store.simulation_detail_count("export-test").unwrap(), 3);
    assert_eq!(store.district_detail_count("export-test").unwrap(), 3 * 4);
    assert!(store.event_count("export-test").unwrap() > 0);
    assert!(h.world.journal().is_empty());

    let added = store.events_of_type("export-test", "entity_added").unwrap();
    // Headquarters plus six patrols at least.
    assert!(added.len() >= 7);
    assert!(added.iter().all(|e| !e.is_night && e.source == "registry"));
    let payload: serde_json::Value = serde_json::from_str(&added[0].payload).unwrap();
    assert_eq!(payload["type"], "entity_added");
}

#[test]
fn night_events_are_flagged() {
    let mut config = quiet_config();
    config.start_hour = 23;
    let mut exporter = exporter(&config, "night-test");
    let h = Harness::line(config);
    h.world.spawn_patrol(common::node_b());
    Scheduler::new().tick(&h.world);
    exporter.export(&h.world).unwrap();

    let changes = exporter.store().events_of_type("night-test", "entity_added").unwrap();
    assert!(!changes.is_empty());
    assert!(changes.iter().all(|e| e.is_night));
}

#[test]
fn finishing_flushes_late_events() {
    let config = quiet_config();
    let mut exporter = exporter(&config, "flush-test");
    let h = Harness::line(config);
    exporter.export(&h.world).unwrap();
    let before = exporter.store().event_count("flush-test").unwrap();

    h.world.spawn_patrol(common::node_c());
    h.world.pause();
    h.world.resume();
    let flushed = exporter.flush_journal(&h.world).unwrap();
    assert_eq!(flushed, 3);
    assert_eq!(exporter.store().event_count("flush-test").unwrap(), before + 3);
}

fn scratch_db(name: &str) -> PathBuf {
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |d| d.as_nanos());
    std::env::temp_dir().join(format!("patrolsim-{name}-{}-{nanos}.db", std::process::id()))
}

#[test]
fn failed_flush_keeps_events_for_the_next_attempt() {
    let config = quiet_config();
    let path = scratch_db("flush-retry");
    let path_str = path.to_str().unwrap();
    let store = ExportStore::open(path_str).unwrap();
    let mut exporter = Exporter::new(store, "retry-test".to_string(), &config).unwrap();
    let h = Harness::line(config);
    exporter.flush_journal(&h.world).unwrap();
    let before = exporter.store().event_count("retry-test").unwrap();

    h.world.spawn_patrol(common::node_b());
    Scheduler::new().tick(&h.world);
    let pending = h.world.journal().len();
    assert!(pending > 0);

    let side = Connection::open(&path).unwrap();
    side.execute_batch("ALTER TABLE event_log RENAME TO event_log_away;").unwrap();
    assert!(exporter.flush_journal(&h.world).is_err());
    assert_eq!(h.world.journal().len(), pending);

    side.execute_batch("ALTER TABLE event_log_away RENAME TO event_log;").unwrap();
    let written = exporter.flush_journal(&h.world).unwrap();
    assert_eq!(written, pending);
    assert!(h.world.journal().is_empty());
    assert_eq!(exporter.store().event_count("retry-test").unwrap(), before + pending as i64);

    drop(side);
    drop(exporter);
    for suffix in ["", "-wal", "-shm"] {
        let _ = std::fs::remove_file(format!("{path_str}{suffix}"));
    }
}
