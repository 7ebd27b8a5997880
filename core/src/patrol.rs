//! The patrol agent.
//!
//! A patrol carries at most one action. Transfers own the route they are
//! following; participations name the incident being worked. Every state
//! expects a particular action type (see `update_state_self`), and finding
//! the wrong one is reported as `SimError::ActionMismatch`.

use crate::{
    config::SimConfig,
    entity::{Entity, StepOutcome},
    error::{SimError, SimResult},
    event::SimEvent,
    geometry::{haversine, interpolate},
    path_worker::{PendingRoute, RoutePoll, RouteRequest},
    rng::SubsystemRng,
    types::{Coordinate, EntityId, SimTime},
    world::{Recorder, TickContext},
};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

const SOURCE: &str = "patrol";

/// Lost route requests re-asked in a row before the patrol gives up on
/// the worker and drives straight for its destination.
pub const ROUTE_RETRY_LIMIT: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatrolState {
    Patrolling,
    TransferToIntervention,
    TransferToFiring,
    Intervention,
    Firing,
    Neutralized,
    CalculatingPath,
    ReturningToHq,
}

impl PatrolState {
    pub const ALL: [PatrolState; 8] = [
        Self::Patrolling,
        Self::TransferToIntervention,
        Self::TransferToFiring,
        Self::Intervention,
        Self::Firing,
        Self::Neutralized,
        Self::CalculatingPath,
        Self::ReturningToHq,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Patrolling             => "patrolling",
            Self::TransferToIntervention => "transfer_to_intervention",
            Self::TransferToFiring       => "transfer_to_firing",
            Self::Intervention           => "intervention",
            Self::Firing                 => "firing",
            Self::Neutralized            => "neutralized",
            Self::CalculatingPath        => "calculating_path",
            Self::ReturningToHq          => "returning_to_hq",
        }
    }
}

impl std::fmt::Display for PatrolState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Where a transfer is heading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActionTarget {
    Point(Coordinate),
    Incident(EntityId),
    Headquarters(EntityId),
}

impl ActionTarget {
    pub fn incident(&self) -> Option<EntityId> {
        match self {
            Self::Incident(id) => Some(*id),
            _ => None,
        }
    }
}

#[derive(Debug)]
enum Route {
    Pending(PendingRoute),
    Ready(VecDeque<Coordinate>),
}

#[derive(Debug)]
pub struct Transfer {
    pub owner:       EntityId,
    pub start_time:  SimTime,
    pub target:      ActionTarget,
    pub destination: Coordinate,
    route:           Route,
}

impl Transfer {
    fn new(owner: EntityId, now: SimTime, target: ActionTarget, destination: Coordinate, pending: PendingRoute) -> Self {
        Self {
            owner,
            start_time: now,
            target,
            destination,
            route: Route::Pending(pending),
        }
    }

    pub fn is_route_ready(&self) -> bool {
        matches!(self.route, Route::Ready(_))
    }

    /// Route computed and fully driven.
    pub fn is_arrived(&self) -> bool {
        matches!(&self.route, Route::Ready(nodes) if nodes.is_empty())
    }

    /// Remaining route nodes, empty while the route is still pending.
    pub fn remaining(&self) -> Vec<Coordinate> {
        match &self.route {
            Route::Ready(nodes) => nodes.iter().copied().collect(),
            Route::Pending(_) => Vec::new(),
        }
    }

    fn poll_route(&mut self) -> RoutePoll {
        let Route::Pending(pending) = &self.route else {
            return RoutePoll::Pending;
        };
        match pending.poll() {
            RoutePoll::Ready(nodes) => {
                self.route = Route::Ready(nodes.into());
                RoutePoll::Ready(Vec::new())
            }
            other => other,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IncidentParticipation {
    pub owner:      EntityId,
    pub start_time: SimTime,
    pub target:     Option<EntityId>,
}

#[derive(Debug)]
pub enum Action {
    Transfer(Transfer),
    IncidentParticipation(IncidentParticipation),
}

impl Action {
    pub fn owner(&self) -> EntityId {
        match self {
            Self::Transfer(t) => t.owner,
            Self::IncidentParticipation(p) => p.owner,
        }
    }
}

#[derive(Debug)]
pub struct Patrol {
    pub id:         EntityId,
    position:       Coordinate,
    state:          PatrolState,
    /// The state to resume once a pending route arrives.
    previous_state: PatrolState,
    action:         Option<Action>,
    shift_end:      SimTime,
    last_move:      SimTime,
    neutralization_interval:   SimTime,
    last_neutralization_check: SimTime,
    lost_routes: u32,
    rng: SubsystemRng,
}

impl Patrol {
    pub fn new(id: EntityId, position: Coordinate, now: SimTime, config: &SimConfig, mut rng: SubsystemRng) -> Self {
        let neutralization_interval =
            config.neutralization_check_min_secs + rng.range_f64(0.0, config.neutralization_check_jitter_secs);
        Self {
            id,
            position,
            state: PatrolState::Patrolling,
            previous_state: PatrolState::Patrolling,
            action: None,
            shift_end: now + config.shift_duration_secs,
            last_move: now,
            neutralization_interval,
            last_neutralization_check: now,
            lost_routes: 0,
            rng,
        }
    }

    pub fn position(&self) -> Coordinate {
        self.position
    }

    pub fn state(&self) -> PatrolState {
        self.state
    }

    pub fn previous_state(&self) -> PatrolState {
        self.previous_state
    }

    pub fn action(&self) -> Option<&Action> {
        self.action.as_ref()
    }

    pub fn shift_end(&self) -> SimTime {
        self.shift_end
    }

    /// The state an observer should see: a patrol waiting for a route is
    /// reported as whatever it is about to do.
    pub fn logical_state(&self) -> PatrolState {
        if self.state == PatrolState::CalculatingPath {
            self.previous_state
        } else {
            self.state
        }
    }

    pub fn is_idle(&self) -> bool {
        self.state == PatrolState::Patrolling
    }

    pub fn is_shift_over(&self, now: SimTime) -> bool {
        now > self.shift_end
    }

    /// The participation, if it is in the given incident.
    pub fn participation_in(&self, incident: EntityId) -> Option<&IncidentParticipation> {
        match &self.action {
            Some(Action::IncidentParticipation(p)) if p.target == Some(incident) => Some(p),
            _ => None,
        }
    }

    /// Incident this patrol is driving to or working, if any.
    pub fn incident_target(&self) -> Option<EntityId> {
        match &self.action {
            Some(Action::Transfer(t)) => t.target.incident(),
            Some(Action::IncidentParticipation(p)) => p.target,
            None => None,
        }
    }

    /// Point the current participation at another incident. Used when
    /// the intervention being worked turns into a firing.
    pub fn retarget_participation(&mut self, incident: EntityId) {
        if let Some(Action::IncidentParticipation(p)) = &mut self.action {
            p.target = Some(incident);
        }
    }

    pub fn remaining_route(&self) -> Vec<Coordinate> {
        match &self.action {
            Some(Action::Transfer(t)) => t.remaining(),
            _ => Vec::new(),
        }
    }

    /// Ask for a route and wait for it in `CalculatingPath`, resuming
    /// `next_state` once it arrives. Any previous action is dropped.
    pub fn issue_transfer(
        &mut self,
        target: ActionTarget,
        destination: Coordinate,
        next_state: PatrolState,
        ctx: &TickContext<'_>,
    ) {
        let before = self.logical_state();
        let pending = ctx.paths.submit(RouteRequest {
            patrol: self.id,
            from:   self.position,
            to:     destination,
        });
        self.action = Some(Action::Transfer(Transfer::new(self.id, ctx.now, target, destination, pending)));
        self.previous_state = next_state;
        self.state = PatrolState::CalculatingPath;
        self.note_transition(before, &ctx.recorder, ctx.now);
    }

    /// Drop whatever the patrol is doing and go back to patrolling.
    pub fn release(&mut self, recorder: &Recorder, now: SimTime) {
        self.action = None;
        self.set_state(PatrolState::Patrolling, recorder, now);
    }

    fn set_state(&mut self, state: PatrolState, recorder: &Recorder, now: SimTime) {
        let before = self.logical_state();
        self.state = state;
        self.note_transition(before, recorder, now);
    }

    fn note_transition(&self, before: PatrolState, recorder: &Recorder, now: SimTime) {
        let after = self.logical_state();
        if before == after {
            return;
        }
        debug!("Patrol #{}: {before} -> {after}", self.id);
        recorder.emit(now, SOURCE, SimEvent::PatrolStateChanged {
            patrol:   self.id,
            from:     before,
            to:       after,
            district: recorder.district_name(self.position),
        });
    }

    fn mismatch(&self, expected: &'static str) -> SimError {
        SimError::ActionMismatch {
            patrol: self.id,
            state: self.state,
            expected,
        }
    }

    fn expect_transfer(&mut self) -> SimResult<&mut Transfer> {
        let state = self.state;
        match &mut self.action {
            Some(Action::Transfer(t)) => Ok(t),
            _ => Err(SimError::ActionMismatch { patrol: self.id, state, expected: "transfer" }),
        }
    }

    fn expect_participation(&self) -> SimResult<&IncidentParticipation> {
        match &self.action {
            Some(Action::IncidentParticipation(p)) => Ok(p),
            _ => Err(self.mismatch("incident participation")),
        }
    }

    /// Decide what to do next. Runs once per tick, before movement.
    pub fn update_state_self(&mut self, ctx: &mut TickContext<'_>) -> SimResult<StepOutcome> {
        match self.state {
            PatrolState::Patrolling => self.while_patrolling(ctx),
            PatrolState::TransferToIntervention => self.while_transferring_to_intervention(ctx)?,
            PatrolState::TransferToFiring => self.while_transferring_to_firing(ctx)?,
            PatrolState::Intervention => self.while_intervening(ctx)?,
            PatrolState::Firing => self.while_firing(ctx)?,
            PatrolState::CalculatingPath => self.while_calculating_path(ctx)?,
            PatrolState::ReturningToHq => self.while_returning(ctx)?,
            PatrolState::Neutralized => {}
        }
        Ok(StepOutcome::Keep)
    }

    fn while_patrolling(&mut self, ctx: &mut TickContext<'_>) {
        if self.is_shift_over(ctx.now) {
            info!("Patrol #{}: shift over, returning to headquarters", self.id);
            self.head_to_headquarters(ctx);
            return;
        }
        let needs_target = match &self.action {
            None => true,
            Some(Action::Transfer(t)) => t.is_arrived(),
            Some(Action::IncidentParticipation(_)) => true,
        };
        if needs_target {
            self.draw_new_target(ctx);
        }
    }

    fn draw_new_target(&mut self, ctx: &mut TickContext<'_>) {
        let Some(node) = ctx.map.network().random_node(&mut self.rng) else {
            return;
        };
        let destination = node.position;
        self.issue_transfer(ActionTarget::Point(destination), destination, PatrolState::Patrolling, ctx);
    }

    fn head_to_headquarters(&mut self, ctx: &mut TickContext<'_>) {
        match ctx.registry.nearest_headquarters(self.position) {
            Some((id, position)) => {
                self.issue_transfer(ActionTarget::Headquarters(id), position, PatrolState::ReturningToHq, ctx);
            }
            None => {
                debug!("Patrol #{}: no headquarters to return to yet", self.id);
                self.action = None;
                self.set_state(PatrolState::ReturningToHq, &ctx.recorder, ctx.now);
            }
        }
    }

    fn release_and_patrol(&mut self, ctx: &mut TickContext<'_>) {
        self.release(&ctx.recorder, ctx.now);
        self.draw_new_target(ctx);
    }

    fn while_transferring_to_intervention(&mut self, ctx: &mut TickContext<'_>) -> SimResult<()> {
        let transfer = self.expect_transfer()?;
        if !transfer.is_arrived() {
            return Ok(());
        }
        let target = transfer.target.incident();
        self.action = Some(Action::IncidentParticipation(IncidentParticipation {
            owner:      self.id,
            start_time: ctx.now,
            target,
        }));
        self.set_state(PatrolState::Intervention, &ctx.recorder, ctx.now);
        Ok(())
    }

    fn while_transferring_to_firing(&mut self, ctx: &mut TickContext<'_>) -> SimResult<()> {
        let transfer = self.expect_transfer()?;
        if !transfer.is_arrived() {
            return Ok(());
        }
        let target = transfer.target.incident();
        let joined = match target.and_then(|id| ctx.registry.firing_mut(id)) {
            Some(firing) if firing.is_active() => {
                firing.remove_reaching(self.id);
                firing.add_solving(self.id);
                true
            }
            _ => false,
        };
        if !joined {
            debug!("Patrol #{}: firing {target:?} is over before arrival", self.id);
            self.release_and_patrol(ctx);
            return Ok(());
        }
        self.join_firing(target, ctx);
        Ok(())
    }

    fn join_firing(&mut self, firing: Option<EntityId>, ctx: &TickContext<'_>) {
        self.action = Some(Action::IncidentParticipation(IncidentParticipation {
            owner:      self.id,
            start_time: ctx.now,
            target:     firing,
        }));
        self.last_neutralization_check = ctx.now;
        self.set_state(PatrolState::Firing, &ctx.recorder, ctx.now);
    }

    fn while_intervening(&mut self, ctx: &mut TickContext<'_>) -> SimResult<()> {
        let target = self.expect_participation()?.target;
        match target.and_then(|id| ctx.registry.get_mut(id)) {
            Some(Entity::Firing(firing)) if firing.is_active() => {
                firing.add_solving(self.id);
                self.join_firing(target, ctx);
            }
            Some(Entity::Intervention(intervention)) if intervention.is_active() => {}
            _ => self.release_and_patrol(ctx),
        }
        Ok(())
    }

    fn while_firing(&mut self, ctx: &mut TickContext<'_>) -> SimResult<()> {
        let target = self.expect_participation()?.target;
        let Some(firing_id) = target.filter(|id| ctx.registry.firing(*id).is_some_and(|f| f.is_active())) else {
            self.release_and_patrol(ctx);
            return Ok(());
        };

        let now = ctx.now;
        if now - self.last_neutralization_check <= self.neutralization_interval {
            return Ok(());
        }
        self.last_neutralization_check = now;
        if !self.rng.chance(ctx.config.neutralization_probability) {
            return Ok(());
        }

        if let Some(firing) = ctx.registry.firing_mut(firing_id) {
            firing.remove_solving(self.id);
        }
        ctx.registry.stats_mut().patrols_neutralized += 1;
        warn!("Patrol #{} neutralized at Firing#{firing_id}", self.id);
        self.set_state(PatrolState::Neutralized, &ctx.recorder, now);
        ctx.recorder.emit(now, SOURCE, SimEvent::PatrolNeutralized {
            patrol: self.id,
            firing: firing_id,
        });
        Ok(())
    }

    fn while_calculating_path(&mut self, ctx: &mut TickContext<'_>) -> SimResult<()> {
        let transfer = self.expect_transfer()?;
        match transfer.poll_route() {
            RoutePoll::Pending => {}
            RoutePoll::Ready(_) => {
                self.lost_routes = 0;
                let next = self.previous_state;
                self.set_state(next, &ctx.recorder, ctx.now);
            }
            RoutePoll::Lost => {
                let (target, destination) = (transfer.target, transfer.destination);
                let next = self.previous_state;
                self.lost_routes += 1;
                if self.lost_routes > ROUTE_RETRY_LIMIT {
                    warn!(
                        "Patrol #{}: {} route requests lost, driving straight for the destination",
                        self.id, self.lost_routes
                    );
                    self.lost_routes = 0;
                    if let Some(Action::Transfer(t)) = &mut self.action {
                        t.route = Route::Ready(VecDeque::from([destination]));
                    }
                    self.set_state(next, &ctx.recorder, ctx.now);
                } else {
                    if self.lost_routes == 1 {
                        warn!("Patrol #{}: route request lost, asking again", self.id);
                    } else {
                        debug!("Patrol #{}: route request lost again ({})", self.id, self.lost_routes);
                    }
                    self.issue_transfer(target, destination, next, ctx);
                }
            }
        }
        Ok(())
    }

    fn while_returning(&mut self, ctx: &mut TickContext<'_>) -> SimResult<()> {
        match &self.action {
            Some(Action::Transfer(_)) => Ok(()),
            Some(Action::IncidentParticipation(_)) => Err(self.mismatch("transfer")),
            None => {
                if let Some((id, position)) = ctx.registry.first_headquarters() {
                    self.issue_transfer(ActionTarget::Headquarters(id), position, PatrolState::ReturningToHq, ctx);
                }
                Ok(())
            }
        }
    }

    fn speed_kmh(&self, config: &SimConfig) -> f64 {
        match self.state {
            PatrolState::TransferToIntervention => config.speeds.transfer,
            PatrolState::TransferToFiring => config.speeds.privileged,
            _ => config.speeds.patrolling,
        }
    }

    /// Move along the current route. A returning patrol that has reached
    /// headquarters asks to be removed.
    pub fn perform_action(&mut self, ctx: &mut TickContext<'_>) -> SimResult<StepOutcome> {
        let now = ctx.now;
        let traveled = self.speed_kmh(ctx.config) / 3.6 * (now - self.last_move).max(0.0);
        self.last_move = now;

        match self.state {
            PatrolState::Patrolling | PatrolState::ReturningToHq => {}
            PatrolState::TransferToIntervention | PatrolState::TransferToFiring => {
                self.expect_transfer()?;
            }
            _ => return Ok(StepOutcome::Keep),
        }

        let Some(Action::Transfer(transfer)) = &mut self.action else {
            return Ok(StepOutcome::Keep);
        };
        let Route::Ready(route) = &mut transfer.route else {
            return Ok(StepOutcome::Keep);
        };

        if self.state == PatrolState::ReturningToHq && route.is_empty() {
            info!("Patrol #{} reached headquarters, going off duty", self.id);
            ctx.registry.stats_mut().patrols_off_duty += 1;
            return Ok(StepOutcome::Remove);
        }
        advance_along(&mut self.position, route, traveled);
        Ok(StepOutcome::Keep)
    }
}

/// Consume route nodes for `traveled` meters. The last node is only
/// popped once it is actually reached; between nodes the position is
/// interpolated along the great circle.
pub fn advance_along(position: &mut Coordinate, route: &mut VecDeque<Coordinate>, mut traveled: f64) {
    let Some(&first) = route.front() else {
        return;
    };
    let mut next = first;
    let mut distance = haversine(*position, next);
    while distance < traveled && route.len() > 1 {
        traveled -= distance;
        *position = next;
        route.pop_front();
        next = route[0];
        distance = haversine(*position, next);
    }
    if distance > traveled {
        *position = interpolate(*position, next, traveled / distance);
    } else {
        *position = next;
        route.pop_front();
    }
}
