//! Routes over a synthetic grid, through the route worker and a patrol.

mod common;

use common::{init_logging, quiet_config, Harness};
use patrolsim_core::{
    entity::StepOutcome,
    geometry::haversine,
    import::synthetic_grid,
    path_worker::{compute_route, RouteRequest},
    patrol::{ActionTarget, PatrolState},
    rng::SubsystemRng,
    types::Coordinate,
};
use std::collections::HashSet;

const ORIGIN: Coordinate = Coordinate::new(50.06, 19.94);

#[test]
fn routes_end_on_the_target_node() {
    init_logging();
    let city = synthetic_grid(8, 8, 150.0, ORIGIN).into_city().unwrap();
    let mut rng = SubsystemRng::new(11, 0);
    for _ in 0..25 {
        let from = city.network().random_node(&mut rng).unwrap().position;
        let to = city.network().random_node(&mut rng).unwrap().position;
        let route = compute_route(&city, &RouteRequest { patrol: 1, from, to });
        assert!(!route.is_empty());
        assert_eq!(route[0], from);
        assert!(haversine(*route.last().unwrap(), to) < 1e-6);
        // Grid streets only: consecutive nodes are one block apart.
        for pair in route.windows(2) {
            assert!((haversine(pair[0], pair[1]) - 150.0).abs() < 1.0);
        }
    }
}

#[test]
fn nearest_node_is_stable() {
    let city = synthetic_grid(5, 5, 200.0, ORIGIN).into_city().unwrap();
    let point = Coordinate::new(50.0612, 19.9433);
    let first = city.network().nearest_node(point, &HashSet::new());
    let second = city.network().nearest_node(point, &HashSet::new());
    assert!(first.is_some());
    assert_eq!(first, second);
}

#[test]
fn patrol_transfer_round_trip() {
    let map = synthetic_grid(6, 6, 200.0, ORIGIN);
    let mut config = quiet_config();
    config.headquarters = Some(ORIGIN);
    let h = Harness::new(config, map.into_city().unwrap());
    let target = h.world.map().network().nodes()[35].position;
    let patrol = h.world.spawn_patrol(ORIGIN);

    h.world
        .step_entity(patrol, |entity, ctx| {
            let p = entity.as_patrol_mut().unwrap();
            p.issue_transfer(ActionTarget::Point(target), target, PatrolState::Patrolling, ctx);
            Ok(StepOutcome::Keep)
        })
        .unwrap();
    assert_eq!(h.world.registry().patrol(patrol).unwrap().state(), PatrolState::CalculatingPath);

    h.world
        .step_entity(patrol, |entity, ctx| entity.as_patrol_mut().unwrap().update_state_self(ctx))
        .unwrap();
    let registry = h.world.registry();
    let p = registry.patrol(patrol).unwrap();
    assert_eq!(p.state(), PatrolState::Patrolling);
    let route = p.remaining_route();
    assert_eq!(route.len(), 11);
    assert!(haversine(*route.last().unwrap(), target) < 1e-6);
}
