//! World clock behaviour seen through the world.

mod common;

use common::{quiet_config, Harness};
use patrolsim_core::{error::SimError, event::SimEvent};

#[test]
fn time_is_non_decreasing_and_frozen_while_paused() {
    let h = Harness::line(quiet_config());
    let mut last = h.world.now();
    for step in [0.5, 0.0, 2.0, 10.0] {
        h.advance(step);
        let now = h.world.now();
        assert!(now >= last);
        last = now;
    }

    h.world.pause();
    let frozen = h.world.now();
    h.advance(1_000.0);
    assert_eq!(h.world.now().to_bits(), frozen.to_bits());
    assert_eq!(h.world.now().to_bits(), frozen.to_bits());

    h.world.resume();
    assert_eq!(h.world.now(), frozen);
    h.advance(3.0);
    assert_eq!(h.world.now(), frozen + 3.0);

    let control: Vec<_> = h
        .events()
        .into_iter()
        .filter(|e| matches!(e, SimEvent::SimulationPaused | SimEvent::SimulationResumed))
        .collect();
    assert_eq!(control, vec![SimEvent::SimulationPaused, SimEvent::SimulationResumed]);
}

#[test]
fn rate_changes_do_not_jump() {
    let h = Harness::line(quiet_config());
    h.advance(10.0);
    let clock = h.world.clock();
    clock.set_time_rate(60).unwrap();
    assert_eq!(clock.now(), 10.0);
    h.advance(2.0);
    assert_eq!(clock.now(), 130.0);

    assert!(matches!(clock.set_time_rate(0), Err(SimError::InvalidTimeRate { rate: 0 })));
    assert!(matches!(clock.set_time_rate(-5), Err(SimError::InvalidTimeRate { rate: -5 })));
    assert_eq!(clock.time_rate(), 60);
}

#[test]
fn zero_rate_is_rejected_before_the_world_exists() {
    let mut config = quiet_config();
    config.time_rate = 0;
    let map = std::sync::Arc::new(common::line_city());
    let result = patrolsim_core::world::World::with_system_time(config, map);
    assert!(matches!(result, Err(SimError::InvalidTimeRate { rate: 0 })));
}
