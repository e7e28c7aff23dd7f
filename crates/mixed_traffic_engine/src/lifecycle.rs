//! Scenario lifecycle: definition, joining, activation, submissions and
//! closure.
//!
//! Every public operation opens its own [`Session`]. A submission runs one
//! unit of work per submitted state; inside it the row update, the reset of
//! the driver's speculative tail, the turn barrier, evaluation, propagation and the cascade into later timesteps
//! either all commit or all roll back. Hooks fire only after a commit.

use std::sync::Arc;

use chrono::Utc;
use mixed_traffic_core::contract::{
    normalize_submission, submission_fingerprint, validate_definition, PlannedState,
    ResolvedTimestep, ScenarioDefinition, SubmitResult, SubmittedState,
};
use mixed_traffic_core::{
    Driver, DriverId, Participant, Scenario, ScenarioId, ScenarioStatus, Timestep, VehicleState,
    VehicleStatus,
};
use tracing::{debug, error, info, warn};

use crate::adapters::{
    CollisionChecker, DeclaredInitialState, GoalChecker, InitialStateProvider, NoopHook,
    RadiusCollisionChecker, RectGoalChecker, TimestepResolved, TimestepResolvedHook,
};
use crate::error::{EngineError, Result};
use crate::evaluator::OutcomeEvaluator;
use crate::propagator::StatePropagator;
use crate::status::ScenarioStatusResolver;
use crate::store::{Session, SqliteStore, UnitOfWork, VehicleStateStore};
use crate::sync::{SyncOutcome, TurnSynchronizer};

/// External collaborators the manager calls into.
#[derive(Clone)]
pub struct Collaborators {
    pub collisions: Arc<dyn CollisionChecker>,
    pub goals: Arc<dyn GoalChecker>,
    pub initial_states: Arc<dyn InitialStateProvider>,
    pub hook: Arc<dyn TimestepResolvedHook>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            collisions: Arc::new(RadiusCollisionChecker::default()),
            goals: Arc::new(RectGoalChecker),
            initial_states: Arc::new(DeclaredInitialState),
            hook: Arc::new(NoopHook),
        }
    }
}

impl Collaborators {
    pub fn with_collisions(mut self, collisions: Arc<dyn CollisionChecker>) -> Self {
        self.collisions = collisions;
        self
    }

    pub fn with_goals(mut self, goals: Arc<dyn GoalChecker>) -> Self {
        self.goals = goals;
        self
    }

    pub fn with_hook(mut self, hook: Arc<dyn TimestepResolvedHook>) -> Self {
        self.hook = hook;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    /// The resolver does not report `Done` yet.
    NotDone,
    AlreadyClosed,
    Closed {
        /// Earliest timestep where every driver is terminal, if any.
        terminal_timestep: Option<Timestep>,
        deleted_rows: usize,
    },
}

enum Attempt {
    Applied {
        resolved: Vec<ResolvedTimestep>,
        events: Vec<TimestepResolved>,
    },
    /// The row already went past `Waiting` without being terminal.
    AlreadyActive,
    Terminal(VehicleStatus),
    ScenarioClosed,
}

#[derive(Default)]
struct Cascade {
    resolved: Vec<ResolvedTimestep>,
    events: Vec<TimestepResolved>,
}

pub struct ScenarioLifecycleManager {
    store: SqliteStore,
    collaborators: Collaborators,
    synchronizer: TurnSynchronizer,
    propagator: StatePropagator,
    resolver: ScenarioStatusResolver,
}

impl ScenarioLifecycleManager {
    pub fn new(store: SqliteStore, collaborators: Collaborators) -> Self {
        Self {
            store,
            collaborators,
            synchronizer: TurnSynchronizer,
            propagator: StatePropagator,
            resolver: ScenarioStatusResolver,
        }
    }

    pub fn store(&self) -> &SqliteStore {
        &self.store
    }

    pub fn create_scenario(&self, definition: &ScenarioDefinition) -> Result<ScenarioId> {
        validate_definition(definition)?;

        let mut session = self.store.session()?;
        let uow = session.unit_of_work()?;
        let scenario_id = uow.scenarios().insert(definition, &now())?;
        uow.commit()?;

        info!(
            component = "lifecycle",
            event = "scenario_created",
            scenario_id,
            duration = definition.duration,
            slots = definition.drivers.len(),
        );
        Ok(scenario_id)
    }

    /// Binds the lowest free slot of a `Waiting` scenario to `participant`.
    pub fn join(&self, scenario_id: ScenarioId, participant: Participant) -> Result<DriverId> {
        surface(self.join_inner(scenario_id, participant))
    }

    fn join_inner(&self, scenario_id: ScenarioId, participant: Participant) -> Result<DriverId> {
        let mut session = self.store.session()?;
        let uow = session.unit_of_work()?;
        let scenario = load_scenario(&uow, scenario_id)?;
        if scenario.status != ScenarioStatus::Waiting {
            return Err(EngineError::validation(format!(
                "scenario {scenario_id} is {} and no longer accepts participants",
                scenario.status
            )));
        }

        let scenarios = uow.scenarios();
        let driver_id = scenarios.first_unbound_slot(scenario_id)?.ok_or_else(|| {
            EngineError::validation(format!("scenario {scenario_id} has no free driver slot"))
        })?;
        if !scenarios.bind_participant(driver_id, &participant)? {
            return Err(EngineError::consistency(
                scenario_id,
                Some(driver_id),
                0,
                "free slot was bound concurrently",
            ));
        }
        uow.commit()?;

        info!(
            component = "lifecycle",
            event = "participant_joined",
            scenario_id,
            driver_id,
            autonomous = participant.is_autonomous(),
        );
        Ok(driver_id)
    }

    /// Binds leftover slots to autonomous agents, preallocates the full
    /// driver x timestep grid and moves the scenario to `Active`.
    pub fn activate(&self, scenario_id: ScenarioId) -> Result<Vec<Driver>> {
        surface(self.activate_inner(scenario_id))
    }

    fn activate_inner(&self, scenario_id: ScenarioId) -> Result<Vec<Driver>> {
        let mut session = self.store.session()?;
        let uow = session.unit_of_work()?;
        let scenario = load_scenario(&uow, scenario_id)?;
        if scenario.status != ScenarioStatus::Waiting {
            return Err(EngineError::validation(format!(
                "scenario {scenario_id} is {}; only WAITING scenarios can be activated",
                scenario.status
            )));
        }

        let scenarios = uow.scenarios();
        for driver in scenarios.drivers(scenario_id)? {
            if driver.is_bound() {
                continue;
            }
            let agent = Participant::Autonomous {
                agent: format!("av-{}", driver.id),
            };
            if !scenarios.bind_participant(driver.id, &agent)? {
                return Err(EngineError::consistency(
                    scenario_id,
                    Some(driver.id),
                    0,
                    "slot was bound concurrently during activation",
                ));
            }
        }

        let states = uow.vehicle_states();
        let mut drivers = Vec::new();
        for mut driver in scenarios.drivers(scenario_id)? {
            let (initial, goal) = self.collaborators.initial_states.initial_state_and_goal(&driver);
            if !initial.is_finite() || !goal.is_valid() {
                return Err(EngineError::validation(format!(
                    "driver {} received an unusable initial state or goal",
                    driver.id
                )));
            }
            scenarios.set_initial_and_goal(driver.id, &initial, &goal)?;
            states.insert_grid(scenario_id, driver.id, scenario.duration, &initial)?;
            driver.initial = initial;
            driver.goal = goal;
            drivers.push(driver);
        }
        self.screen_opening(&scenario, &drivers, &states.get(scenario_id, 0)?)?;

        if !scenarios.transition_phase(
            scenario_id,
            ScenarioStatus::Waiting,
            ScenarioStatus::Active,
            &now(),
        )? {
            return Err(EngineError::consistency(
                scenario_id,
                None,
                0,
                "scenario left WAITING during activation",
            ));
        }
        uow.commit()?;

        info!(
            component = "lifecycle",
            event = "scenario_activated",
            scenario_id,
            drivers = drivers.len(),
            duration = scenario.duration,
        );
        self.collaborators
            .hook
            .on_timestep_resolved(&TimestepResolved {
                scenario_id,
                timestep: 0,
                autonomous_drivers: drivers
                    .iter()
                    .filter(|driver| driver.participant.as_ref().is_some_and(Participant::is_autonomous))
                    .map(|driver| driver.id)
                    .collect(),
            });
        Ok(drivers)
    }

    /// Timestep 0 is inserted `Active` without an evaluation, so a start that
    /// already collides or already sits in its goal region is refused here.
    fn screen_opening(
        &self,
        scenario: &Scenario,
        drivers: &[Driver],
        opening: &[VehicleState],
    ) -> Result<()> {
        let mut overlapping: Vec<DriverId> = self
            .collaborators
            .collisions
            .check_collisions(scenario, 0, opening)
            .into_iter()
            .map(|(driver_id, _)| driver_id)
            .collect();
        if !overlapping.is_empty() {
            overlapping.sort_unstable();
            overlapping.dedup();
            return Err(EngineError::validation(format!(
                "drivers {overlapping:?} overlap at their starting positions"
            )));
        }

        for state in opening {
            let Some(driver) = drivers.iter().find(|driver| driver.id == state.driver_id) else {
                continue;
            };
            if self
                .collaborators
                .goals
                .is_goal_reached(driver.id, &driver.goal, state)
            {
                return Err(EngineError::validation(format!(
                    "driver {} starts inside its goal region",
                    driver.id
                )));
            }
        }
        Ok(())
    }

    /// Applies a driver's planned states in ascending timestep order.
    ///
    /// States beyond the scenario duration are ignored. Reaching a crashed or
    /// goal row stops processing without an error; the result tells the
    /// caller to stop planning.
    pub fn submit(
        &self,
        scenario_id: ScenarioId,
        driver_id: DriverId,
        states: Vec<SubmittedState>,
    ) -> Result<SubmitResult> {
        surface(self.submit_inner(scenario_id, driver_id, states))
    }

    fn submit_inner(
        &self,
        scenario_id: ScenarioId,
        driver_id: DriverId,
        states: Vec<SubmittedState>,
    ) -> Result<SubmitResult> {
        let planned = normalize_submission(states)?;
        let fingerprint = submission_fingerprint(driver_id, &planned);

        let mut session = self.store.session()?;
        let (scenario, drivers) = {
            let snapshot = session.snapshot()?;
            let scenario = load_scenario(&snapshot, scenario_id)?;
            let drivers = snapshot.scenarios().drivers(scenario_id)?;
            (scenario, drivers)
        };
        if !drivers.iter().any(|driver| driver.id == driver_id) {
            return Err(EngineError::driver_not_found(driver_id));
        }
        match scenario.status {
            ScenarioStatus::Waiting | ScenarioStatus::Pending => {
                return Err(EngineError::NotActiveYet { scenario_id })
            }
            ScenarioStatus::Done => return Err(EngineError::ScenarioFinished { scenario_id }),
            ScenarioStatus::Active => {}
        }

        let mut result = SubmitResult {
            accepted: true,
            applied: Vec::new(),
            ignored: Vec::new(),
            stopped_early_at: None,
            terminal_status: None,
            resolved: Vec::new(),
            fingerprint,
        };
        for state in &planned {
            if state.timestep > scenario.duration {
                result.ignored.push(state.timestep);
                continue;
            }

            match self.attempt(&mut session, &scenario, &drivers, driver_id, state)? {
                Attempt::Applied { resolved, events } => {
                    result.applied.push(state.timestep);
                    result.resolved.extend(resolved);
                    for event in &events {
                        self.collaborators.hook.on_timestep_resolved(event);
                    }
                }
                Attempt::AlreadyActive => {
                    debug!(
                        component = "lifecycle",
                        event = "state_already_resolved",
                        scenario_id,
                        driver_id,
                        timestep = state.timestep,
                    );
                }
                Attempt::Terminal(status) => {
                    info!(
                        component = "lifecycle",
                        event = "submission_stopped",
                        scenario_id,
                        driver_id,
                        timestep = state.timestep,
                        status = %status,
                        fingerprint = %result.fingerprint,
                    );
                    result.stopped_early_at = Some(state.timestep);
                    break;
                }
                Attempt::ScenarioClosed => {
                    if result.applied.is_empty() {
                        return Err(EngineError::ScenarioFinished { scenario_id });
                    }
                    result.stopped_early_at = Some(state.timestep);
                    break;
                }
            }
        }
        result.accepted = result.stopped_early_at.is_none();

        result.terminal_status = self.driver_terminal_status(&mut session, scenario_id, driver_id)?;

        info!(
            component = "lifecycle",
            event = "submission_processed",
            scenario_id,
            driver_id,
            applied = result.applied.len(),
            ignored = result.ignored.len(),
            resolved = result.resolved.len(),
            fingerprint = %result.fingerprint,
        );

        self.close_if_done(scenario_id)?;
        Ok(result)
    }

    /// One submitted state in its own unit of work.
    ///
    /// The driver's speculative rows after `state` are reset before the
    /// cascade runs, so a later timestep never resolves on a plan the driver
    /// has since replaced. Later states of the same submission rewrite those
    /// rows in their own attempts. Terminal rows are never touched.

    fn attempt(
        &self,
        session: &mut Session,
        scenario: &Scenario,
        drivers: &[Driver],
        driver_id: DriverId,
        state: &PlannedState,
    ) -> Result<Attempt> {
        let uow = session.unit_of_work()?;
        if load_scenario(&uow, scenario.id)?.status == ScenarioStatus::Done {
            return Ok(Attempt::ScenarioClosed);
        }

        let store = uow.vehicle_states();
        let applied = store.conditional_update(
            driver_id,
            state.timestep,
            &[VehicleStatus::Pending, VehicleStatus::Waiting],
            VehicleStatus::Waiting,
            Some(&state.kinematics),
        )?;
        if !applied {
            match store.get_one(driver_id, state.timestep)? {
                None => {
                    return Err(EngineError::consistency(
                        scenario.id,
                        Some(driver_id),
                        state.timestep,
                        "vehicle state row is missing",
                    ))
                }
                Some(row) if row.status.is_terminal() => return Ok(Attempt::Terminal(row.status)),
                Some(_) => {}
            }
        }

        let reset = store.reset_after(driver_id, state.timestep)?;
        let cascade = if applied {
            self.resolve_from(&store, scenario, drivers, state.timestep)?
        } else {
            Cascade::default()
        };
        uow.commit()?;

        if reset > 0 {
            debug!(
                component = "lifecycle",
                event = "tail_reset",
                scenario_id = scenario.id,
                driver_id,
                after = state.timestep,
                rows = reset,
            );
        }
        if !applied {
            return Ok(Attempt::AlreadyActive);
        }
        Ok(Attempt::Applied {
            resolved: cascade.resolved,
            events: cascade.events,
        })
    }

    /// Synchronizes, evaluates and propagates `from` and every later timestep
    /// that becomes actionable as a result.
    fn resolve_from(
        &self,
        store: &VehicleStateStore<'_>,
        scenario: &Scenario,
        drivers: &[Driver],
        from: Timestep,
    ) -> Result<Cascade> {
        let evaluator = OutcomeEvaluator::new(
            self.collaborators.collisions.as_ref(),
            self.collaborators.goals.as_ref(),
        );
        let mut cascade = Cascade::default();

        for timestep in from..=scenario.duration {
            match self
                .synchronizer
                .synchronize(store, scenario.id, timestep, drivers.len())?
            {
                SyncOutcome::NotReady { .. } => break,
                SyncOutcome::AlreadyResolved => continue,
                SyncOutcome::Activated { .. } => {}
            }

            let verdicts = evaluator.evaluate(store, scenario, drivers, timestep)?;
            for frozen in verdicts.newly_terminal() {
                self.propagator
                    .propagate(store, scenario.id, frozen, scenario.duration)?;
            }

            cascade.resolved.push(ResolvedTimestep {
                timestep,
                crashed: verdicts.crashed.iter().map(|state| state.driver_id).collect(),
                goal_reached: verdicts
                    .goal_reached
                    .iter()
                    .map(|state| state.driver_id)
                    .collect(),
            });
            cascade.events.push(TimestepResolved {
                scenario_id: scenario.id,
                timestep,
                autonomous_drivers: autonomous_in_play(&store.get(scenario.id, timestep)?, drivers),
            });
        }

        Ok(cascade)
    }

    fn driver_terminal_status(
        &self,
        session: &mut Session,
        scenario_id: ScenarioId,
        driver_id: DriverId,
    ) -> Result<Option<VehicleStatus>> {
        let snapshot = session.snapshot()?;
        let states = snapshot.vehicle_states().get_for_driver(scenario_id, driver_id)?;
        Ok(states
            .last()
            .map(|state| state.status)
            .filter(|status| status.is_terminal()))
    }

    /// Closes the scenario once the resolver reports `Done`, trimming rows
    /// after the earliest timestep where every driver is terminal.
    pub fn close(&self, scenario_id: ScenarioId) -> Result<CloseOutcome> {
        surface(self.close_inner(scenario_id))
    }

    /// Implicit close after a submission. The submission has already
    /// committed, so only a consistency violation reaches the caller; any
    /// other failure leaves the scenario for the next close attempt.
    fn close_if_done(&self, scenario_id: ScenarioId) -> Result<()> {
        match self.close(scenario_id) {
            Ok(_) => Ok(()),
            Err(error @ EngineError::ConsistencyViolation { .. }) => Err(error),
            Err(error) => {
                warn!(
                    component = "lifecycle",
                    event = "implicit_close_failed",
                    scenario_id,
                    error = %error,
                );
                Ok(())
            }
        }
    }

    fn close_inner(&self, scenario_id: ScenarioId) -> Result<CloseOutcome> {
        let mut session = self.store.session()?;
        let uow = session.unit_of_work()?;
        let scenario = load_scenario(&uow, scenario_id)?;
        match scenario.status {
            ScenarioStatus::Done => return Ok(CloseOutcome::AlreadyClosed),
            ScenarioStatus::Waiting | ScenarioStatus::Pending => return Ok(CloseOutcome::NotDone),
            ScenarioStatus::Active => {}
        }

        let drivers = uow.scenarios().drivers(scenario_id)?;
        let store = uow.vehicle_states();
        if self.resolver.scenario_status(&store, &scenario, &drivers)? != ScenarioStatus::Done {
            return Ok(CloseOutcome::NotDone);
        }

        let terminal_timestep = store.earliest_all_terminal(scenario_id, drivers.len())?;
        let deleted_rows = match terminal_timestep {
            Some(timestep) => store.delete_after(scenario_id, timestep)?,
            None => 0,
        };
        if !uow.scenarios().transition_phase(
            scenario_id,
            ScenarioStatus::Active,
            ScenarioStatus::Done,
            &now(),
        )? {
            return Err(EngineError::consistency(
                scenario_id,
                None,
                terminal_timestep.unwrap_or(scenario.duration),
                "scenario left ACTIVE while closing",
            ));
        }
        uow.commit()?;

        info!(
            component = "lifecycle",
            event = "scenario_closed",
            scenario_id,
            terminal_timestep,
            deleted_rows,
        );
        Ok(CloseOutcome::Closed {
            terminal_timestep,
            deleted_rows,
        })
    }

    /// The scenario with its status derived from the grid.
    pub fn get_scenario(&self, scenario_id: ScenarioId) -> Result<Scenario> {
        let mut session = self.store.session()?;
        let snapshot = session.snapshot()?;
        let mut scenario = load_scenario(&snapshot, scenario_id)?;
        let drivers = snapshot.scenarios().drivers(scenario_id)?;
        scenario.status =
            self.resolver
                .scenario_status(&snapshot.vehicle_states(), &scenario, &drivers)?;
        Ok(scenario)
    }

    pub fn drivers(&self, scenario_id: ScenarioId) -> Result<Vec<Driver>> {
        let mut session = self.store.session()?;
        let snapshot = session.snapshot()?;
        load_scenario(&snapshot, scenario_id)?;
        let drivers = snapshot.scenarios().drivers(scenario_id)?;
        Ok(drivers)
    }

    pub fn get_states_for_driver(
        &self,
        scenario_id: ScenarioId,
        driver_id: DriverId,
    ) -> Result<Vec<VehicleState>> {
        let mut session = self.store.session()?;
        let snapshot = session.snapshot()?;
        load_scenario(&snapshot, scenario_id)?;
        match snapshot.scenarios().driver(driver_id)? {
            Some(driver) if driver.scenario_id == scenario_id => {}
            _ => return Err(EngineError::driver_not_found(driver_id)),
        }
        let states = snapshot
            .vehicle_states()
            .get_for_driver(scenario_id, driver_id)?;
        Ok(states)
    }

    pub fn states_at(&self, scenario_id: ScenarioId, timestep: Timestep) -> Result<Vec<VehicleState>> {
        let mut session = self.store.session()?;
        let snapshot = session.snapshot()?;
        load_scenario(&snapshot, scenario_id)?;
        let states = snapshot.vehicle_states().get(scenario_id, timestep)?;
        Ok(states)
    }

    pub fn status_at(
        &self,
        scenario_id: ScenarioId,
        timestep: Timestep,
        propagate: bool,
    ) -> Result<Option<ScenarioStatus>> {
        let mut session = self.store.session()?;
        let snapshot = session.snapshot()?;
        load_scenario(&snapshot, scenario_id)?;
        let status =
            self.resolver
                .status_at(&snapshot.vehicle_states(), scenario_id, timestep, propagate)?;
        Ok(status)
    }

    pub fn scenario_status(&self, scenario_id: ScenarioId) -> Result<ScenarioStatus> {
        Ok(self.get_scenario(scenario_id)?.status)
    }
}

fn load_scenario(uow: &UnitOfWork<'_>, scenario_id: ScenarioId) -> Result<Scenario> {
    uow.scenarios()
        .get(scenario_id)?
        .ok_or_else(|| EngineError::scenario_not_found(scenario_id))
}

/// Autonomous drivers still `Active` at a resolved timestep.
fn autonomous_in_play(states: &[VehicleState], drivers: &[Driver]) -> Vec<DriverId> {
    states
        .iter()
        .filter(|state| state.status == VehicleStatus::Active)
        .filter(|state| {
            drivers.iter().any(|driver| {
                driver.id == state.driver_id
                    && driver
                        .participant
                        .as_ref()
                        .is_some_and(Participant::is_autonomous)
            })
        })
        .map(|state| state.driver_id)
        .collect()
}

/// Consistency violations leave the engine with full context before they
/// reach the caller.
fn surface<T>(result: Result<T>) -> Result<T> {
    if let Err(EngineError::ConsistencyViolation {
        scenario_id,
        driver_id,
        timestep,
        detail,
    }) = &result
    {
        error!(
            component = "lifecycle",
            event = "consistency_violation",
            scenario_id = *scenario_id,
            driver_id = ?driver_id,
            timestep = *timestep,
            detail = %detail,
        );
    }
    result
}

fn now() -> String {
    Utc::now().to_rfc3339()
}
