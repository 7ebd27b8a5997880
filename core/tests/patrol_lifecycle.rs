//! Patrol state machine: arrival, shift end, neutralization.

mod common;

use common::{line_city, node_a, node_b, node_c, quiet_config, Harness, LosingPathWorker};
use patrolsim_core::{
    entity::{Entity, EntityKind, StepOutcome},
    event::SimEvent,
    incident::{Firing, Intervention},
    patrol::{Action, ActionTarget, PatrolState, ROUTE_RETRY_LIMIT},
    scheduler::Scheduler,
    types::{Coordinate, EntityId},
};
use std::sync::Arc;

fn transfer_destination(h: &Harness, patrol: EntityId) -> Coordinate {
    match h.world.registry().patrol(patrol).unwrap().action() {
        Some(Action::Transfer(t)) => t.destination,
        other => panic!("expected a transfer, got {other:?}"),
    }
}

#[test]
fn one_node_route_arrives_after_exactly_one_move() {
    let h = Harness::line(quiet_config());
    let patrol = h.world.spawn_patrol(node_c());
    let intervention = h
        .world
        .add_entity(|id, now| Entity::Intervention(Intervention::new(id, node_c(), now, 600.0, None, None)));
    let hq = h.world.ids_of(EntityKind::Headquarters)[0];

    h.world
        .step_entity(hq, |entity, ctx| {
            if let Entity::Headquarters(hq) = entity {
                hq.assign_tasks(ctx);
            }
            Ok(StepOutcome::Keep)
        })
        .unwrap();
    h.world
        .step_entity(patrol, |entity, ctx| entity.as_patrol_mut().unwrap().update_state_self(ctx))
        .unwrap();
    {
        let registry = h.world.registry();
        let p = registry.patrol(patrol).unwrap();
        assert_eq!(p.state(), PatrolState::TransferToIntervention);
        assert_eq!(p.remaining_route(), vec![node_c()]);
    }

    h.world
        .step_entity(patrol, |entity, ctx| entity.as_patrol_mut().unwrap().perform_action(ctx))
        .unwrap();
    assert!(h.world.registry().patrol(patrol).unwrap().remaining_route().is_empty());

    h.world
        .step_entity(patrol, |entity, ctx| entity.as_patrol_mut().unwrap().update_state_self(ctx))
        .unwrap();
    let registry = h.world.registry();
    let p = registry.patrol(patrol).unwrap();
    assert_eq!(p.state(), PatrolState::Intervention);
    assert!(p.participation_in(intervention).is_some());
}

#[test]
fn patrol_returns_to_headquarters_when_shift_ends() {
    let mut config = quiet_config();
    config.shift_duration_secs = 100.0;
    let h = Harness::line(config);
    let mut scheduler = Scheduler::new();
    let patrol = h.world.spawn_patrol(node_c());

    scheduler.tick(&h.world);
    h.advance(101.0);
    scheduler.tick(&h.world);
    scheduler.tick(&h.world);
    assert_eq!(
        h.world.registry().patrol(patrol).unwrap().logical_state(),
        PatrolState::ReturningToHq
    );

    for _ in 0..100 {
        h.advance(5.0);
        scheduler.tick(&h.world);
        if h.world.registry().patrol(patrol).is_none() {
            break;
        }
    }

    assert!(h.world.registry().patrol(patrol).is_none());
    assert_eq!(h.world.statistics().patrols_off_duty, 1);
    assert!(h.events().iter().any(|e| matches!(
        e,
        SimEvent::EntityRemoved { id, kind: EntityKind::Patrol } if *id == patrol
    )));
    // Headquarters stays put.
    assert_eq!(h.world.ids_of(EntityKind::Headquarters).len(), 1);
    assert_eq!(h.world.registry().first_headquarters().map(|(_, p)| p), Some(node_a()));
}

#[test]
fn neutralized_patrol_leaves_the_firing_and_stays_down() {
    let mut config = quiet_config();
    config.neutralization_probability = 1.0;
    config.neutralization_check_min_secs = 10.0;
    config.neutralization_check_jitter_secs = 0.0;
    let h = Harness::line(config);
    let mut scheduler = Scheduler::new();
    let patrol = h.world.spawn_patrol(node_c());
    let firing = h
        .world
        .add_entity(|id, now| Entity::Firing(Firing::new(id, node_c(), now, 1, 10_000.0, None)));

    scheduler.tick(&h.world);
    h.advance(1.0);
    scheduler.tick(&h.world);
    assert_eq!(h.world.registry().patrol(patrol).unwrap().state(), PatrolState::Firing);

    // Not yet due.
    h.advance(5.0);
    scheduler.tick(&h.world);
    assert_eq!(h.world.registry().patrol(patrol).unwrap().state(), PatrolState::Firing);

    h.advance(6.0);
    scheduler.tick(&h.world);
    {
        let registry = h.world.registry();
        assert_eq!(registry.patrol(patrol).unwrap().state(), PatrolState::Neutralized);
        assert!(registry.firing(firing).unwrap().solving().is_empty());
        assert_eq!(registry.stats().patrols_neutralized, 1);
    }

    let position = h.world.registry().patrol(patrol).unwrap().position();
    for _ in 0..3 {
        h.advance(60.0);
        scheduler.tick(&h.world);
    }
    let registry = h.world.registry();
    let p = registry.patrol(patrol).unwrap();
    assert_eq!(p.state(), PatrolState::Neutralized);
    assert_eq!(p.position(), position);
}

#[test]
fn patrol_in_firing_stays_while_firing_is_active() {
    let h = Harness::line(quiet_config());
    let mut scheduler = Scheduler::new();
    let patrol = h.world.spawn_patrol(node_c());
    let firing = h
        .world
        .add_entity(|id, now| Entity::Firing(Firing::new(id, node_c(), now, 1, 10_000.0, None)));

    scheduler.tick(&h.world);
    for _ in 0..20 {
        h.advance(30.0);
        scheduler.tick(&h.world);
    }
    assert_eq!(h.world.registry().patrol(patrol).unwrap().state(), PatrolState::Firing);

    // Once the firing is gone the patrol drops it.
    h.world.remove_entity(firing);
    scheduler.tick(&h.world);
    assert_eq!(
        h.world.registry().patrol(patrol).unwrap().logical_state(),
        PatrolState::Patrolling
    );
}

#[test]
fn shift_end_without_headquarters_waits_in_returning() {
    let mut config = quiet_config();
    config.shift_duration_secs = 100.0;
    let h = Harness::line(config);
    let mut scheduler = Scheduler::new();
    let hq = h.world.ids_of(EntityKind::Headquarters)[0];
    h.world.remove_entity(hq);
    let patrol = h.world.spawn_patrol(node_c());

    scheduler.tick(&h.world);
    h.advance(101.0);
    for _ in 0..3 {
        assert_eq!(scheduler.tick(&h.world).failed, 0);
    }
    {
        let registry = h.world.registry();
        let p = registry.patrol(patrol).unwrap();
        assert_eq!(p.state(), PatrolState::ReturningToHq);
        assert!(p.action().is_none());
        assert_eq!(registry.stats().patrols_off_duty, 0);
    }

    // A headquarters showing up later gets the patrol moving again.
    let hq = h.world.add_headquarters(node_a());
    scheduler.tick(&h.world);
    let registry = h.world.registry();
    let p = registry.patrol(patrol).unwrap();
    assert_eq!(p.logical_state(), PatrolState::ReturningToHq);
    match p.action() {
        Some(Action::Transfer(t)) => assert_eq!(t.target, ActionTarget::Headquarters(hq)),
        other => panic!("expected a transfer home, got {other:?}"),
    }
}

#[test]
fn action_mismatch_aborts_only_that_patrol() {
    let h = Harness::line(quiet_config());
    let mut scheduler = Scheduler::new();
    let broken = h.world.spawn_patrol(node_b());
    let healthy = h.world.spawn_patrol(node_c());

    // Resuming into Intervention while holding a transfer is inconsistent.
    h.world
        .step_entity(broken, |entity, ctx| {
            entity
                .as_patrol_mut()
                .unwrap()
                .issue_transfer(ActionTarget::Point(node_a()), node_a(), PatrolState::Intervention, ctx);
            Ok(StepOutcome::Keep)
        })
        .unwrap();

    let report = scheduler.tick(&h.world);
    assert_eq!(report.failed, 0);
    assert_eq!(h.world.registry().patrol(broken).unwrap().state(), PatrolState::Intervention);

    for _ in 0..3 {
        h.advance(10.0);
        let report = scheduler.tick(&h.world);
        assert_eq!(report.patrols, 2);
        assert_eq!(report.failed, 1);
    }

    let registry = h.world.registry();
    assert_eq!(registry.patrol(broken).unwrap().state(), PatrolState::Intervention);
    let p = registry.patrol(healthy).unwrap();
    assert_eq!(p.logical_state(), PatrolState::Patrolling);
    assert!(p.action().is_some());
}

#[test]
fn lost_route_is_asked_again_for_the_same_destination() {
    let paths = Arc::new(LosingPathWorker::default());
    let h = Harness::with_paths(quiet_config(), Arc::new(line_city()), paths.clone());
    let mut scheduler = Scheduler::new();
    let patrol = h.world.spawn_patrol(node_b());

    scheduler.tick(&h.world);
    assert_eq!(h.world.registry().patrol(patrol).unwrap().state(), PatrolState::CalculatingPath);
    let destination = transfer_destination(&h, patrol);

    assert_eq!(scheduler.tick(&h.world).failed, 0);
    {
        let registry = h.world.registry();
        let p = registry.patrol(patrol).unwrap();
        assert_eq!(p.state(), PatrolState::CalculatingPath);
        assert_eq!(p.previous_state(), PatrolState::Patrolling);
    }
    assert_eq!(transfer_destination(&h, patrol), destination);
    let requests = paths.requests.lock().unwrap().clone();
    assert_eq!(requests.len(), 2);
    assert!(requests.iter().all(|r| r.patrol == patrol && r.to == destination));
}

#[test]
fn repeatedly_lost_routes_fall_back_to_driving_straight() {
    let paths = Arc::new(LosingPathWorker::default());
    let h = Harness::with_paths(quiet_config(), Arc::new(line_city()), paths.clone());
    let mut scheduler = Scheduler::new();
    let patrol = h.world.spawn_patrol(node_b());

    scheduler.tick(&h.world);
    let destination = transfer_destination(&h, patrol);
    for _ in 0..ROUTE_RETRY_LIMIT {
        scheduler.tick(&h.world);
        assert_eq!(h.world.registry().patrol(patrol).unwrap().state(), PatrolState::CalculatingPath);
    }

    scheduler.tick(&h.world);
    assert_eq!(h.world.registry().patrol(patrol).unwrap().state(), PatrolState::Patrolling);
    assert_eq!(transfer_destination(&h, patrol), destination);
    assert_eq!(paths.requests.lock().unwrap().len(), 1 + ROUTE_RETRY_LIMIT as usize);
}
