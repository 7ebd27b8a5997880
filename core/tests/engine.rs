//! The threaded engine against the real clock.

mod common;

use common::{init_logging, line_city};
use patrolsim_core::{
    config::SimConfig,
    engine::SimEngine,
    entity::EntityKind,
    exporter::Exporter,
    store::ExportStore,
    world::World,
};
use std::{sync::Arc, thread, time::Duration};

fn fast_config() -> SimConfig {
    let mut config = SimConfig::default_test();
    config.time_rate = 3_600;
    config.simulation_duration_secs = 1_800.0;
    config.tick_interval_ms = 5;
    config.aging_interval_ms = 2;
    config.generator_interval_ms = 10;
    config
}

#[test]
fn run_finishes_once_duration_has_elapsed() {
    init_logging();
    let config = fast_config();
    let store = ExportStore::in_memory().unwrap();
    let exporter = Exporter::new(store, "engine-test".into(), &config).unwrap();
    let world = Arc::new(World::with_system_time(config, Arc::new(line_city())).unwrap());
    let mut engine = SimEngine::build(Arc::clone(&world), Some(exporter));

    engine.start().unwrap();
    assert_eq!(world.ids_of(EntityKind::Headquarters).len(), 1);
    for _ in 0..200 {
        if engine.is_finished() {
            break;
        }
        thread::sleep(Duration::from_millis(10));
    }
    engine.wait();

    assert!(world.is_finished());
    assert!(world.statistics().patrols_spawned >= 3);
}

#[test]
fn pause_freezes_simulated_time() {
    init_logging();
    let mut config = fast_config();
    config.simulation_duration_secs = 1.0e9;
    let world = Arc::new(World::with_system_time(config, Arc::new(line_city())).unwrap());
    let mut engine = SimEngine::build(Arc::clone(&world), None);
    engine.start().unwrap();

    thread::sleep(Duration::from_millis(20));
    engine.pause();
    assert!(engine.is_paused());
    let frozen = world.now();
    thread::sleep(Duration::from_millis(30));
    assert_eq!(world.now().to_bits(), frozen.to_bits());

    engine.resume();
    thread::sleep(Duration::from_millis(20));
    assert!(world.now() > frozen);

    engine.stop();
    engine.wait();
    assert!(engine.is_finished());
}

#[test]
fn runs_without_a_store_keep_no_journal() {
    init_logging();
    let world = Arc::new(World::with_system_time(fast_config(), Arc::new(line_city())).unwrap());
    let mut engine = SimEngine::build(Arc::clone(&world), None);
    assert!(!world.journal().is_recording());

    engine.step().unwrap();
    assert!(world.statistics().patrols_spawned >= 3);
    assert!(world.journal().is_empty());
}
