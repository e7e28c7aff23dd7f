#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use mixed_traffic_core::contract::{DriverSlot, ScenarioDefinition, SubmittedState};
use mixed_traffic_core::{
    DriverId, GoalRegion, Kinematics, Scenario, ScenarioId, Timestep, VehicleState, VehicleStatus,
};
use mixed_traffic_engine::adapters::{
    CollisionChecker, RadiusCollisionChecker, TimestepResolved, TimestepResolvedHook,
};
use mixed_traffic_engine::{Collaborators, EngineConfig, ScenarioLifecycleManager, SqliteStore};
use tempfile::TempDir;

/// Manager over an on-disk database that lives as long as the fixture.
pub struct TestEngine {
    _dir: TempDir,
    pub manager: ScenarioLifecycleManager,
}

impl TestEngine {
    pub fn database_path(&self) -> PathBuf {
        self._dir.path().join(DATABASE_FILE)
    }
}

const DATABASE_FILE: &str = "engine.sqlite3";

pub fn engine(collaborators: Collaborators) -> TestEngine {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = EngineConfig::with_database_path(dir.path().join(DATABASE_FILE));
    config.busy_timeout_ms = 15_000;
    let store = SqliteStore::open(config).expect("store should open");
    TestEngine {
        _dir: dir,
        manager: ScenarioLifecycleManager::new(store, collaborators),
    }
}

/// Slots start on parallel lanes 50m apart; goals are far down the road.
pub fn definition(duration: Timestep, slots: usize) -> ScenarioDefinition {
    ScenarioDefinition {
        name: "test scenario".to_string(),
        duration,
        max_participants: slots as u32,
        drivers: (0..slots)
            .map(|index| DriverSlot {
                initial: Kinematics::at_rest(0.0, lane(index), 0.0),
                goal: far_goal(),
            })
            .collect(),
    }
}

pub fn lane(index: usize) -> f64 {
    index as f64 * 50.0
}

pub fn far_goal() -> GoalRegion {
    GoalRegion {
        x: 1_000.0,
        y: 0.0,
        length: 10.0,
        width: 10.0,
        orientation: 0.0,
    }
}

pub fn at(timestep: Timestep, x: f64, y: f64) -> SubmittedState {
    SubmittedState {
        timestep,
        x: Some(x),
        y: Some(y),
        rotation: Some(0.0),
        speed: Some(10.0),
        acceleration: Some(0.0),
    }
}

/// Activated scenario with every slot bound to an autonomous agent.
pub fn active_scenario(
    manager: &ScenarioLifecycleManager,
    duration: Timestep,
    slots: usize,
) -> (ScenarioId, Vec<DriverId>) {
    let scenario_id = manager
        .create_scenario(&definition(duration, slots))
        .expect("scenario should be created");
    let drivers = manager
        .activate(scenario_id)
        .expect("scenario should activate")
        .into_iter()
        .map(|driver| driver.id)
        .collect();
    (scenario_id, drivers)
}

pub fn grid_rows(manager: &ScenarioLifecycleManager, scenario_id: ScenarioId) -> usize {
    let mut session = manager.store().session().expect("session");
    let snapshot = session.snapshot().expect("snapshot");
    let count = snapshot
        .vehicle_states()
        .count(scenario_id)
        .expect("count");
    count
}

/// Radius checker that counts how often each timestep is evaluated.
#[derive(Default)]
pub struct CountingCollisionChecker {
    inner: RadiusCollisionChecker,
    calls: Mutex<HashMap<Timestep, usize>>,
}

impl CountingCollisionChecker {
    pub fn calls_at(&self, timestep: Timestep) -> usize {
        self.calls
            .lock()
            .expect("calls lock")
            .get(&timestep)
            .copied()
            .unwrap_or(0)
    }
}

impl CollisionChecker for CountingCollisionChecker {
    fn check_collisions(
        &self,
        scenario: &Scenario,
        timestep: Timestep,
        states: &[VehicleState],
    ) -> Vec<(DriverId, VehicleState)> {
        *self
            .calls
            .lock()
            .expect("calls lock")
            .entry(timestep)
            .or_default() += 1;
        self.inner.check_collisions(scenario, timestep, states)
    }
}

/// Crashes exactly the drivers scripted for a timestep.
#[derive(Default)]
pub struct ScriptedCollisionChecker {
    script: Mutex<HashMap<Timestep, Vec<DriverId>>>,
}

impl ScriptedCollisionChecker {
    pub fn crash_at(&self, timestep: Timestep, drivers: &[DriverId]) {
        self.script
            .lock()
            .expect("script lock")
            .insert(timestep, drivers.to_vec());
    }
}

impl CollisionChecker for ScriptedCollisionChecker {
    fn check_collisions(
        &self,
        _scenario: &Scenario,
        timestep: Timestep,
        states: &[VehicleState],
    ) -> Vec<(DriverId, VehicleState)> {
        let script = self.script.lock().expect("script lock");
        let Some(drivers) = script.get(&timestep) else {
            return Vec::new();
        };
        states
            .iter()
            .filter(|state| state.status == VehicleStatus::Active && drivers.contains(&state.driver_id))
            .map(|state| (state.driver_id, state.with_status(VehicleStatus::Crashed)))
            .collect()
    }
}

#[derive(Default)]
pub struct RecordingHook {
    events: Mutex<Vec<TimestepResolved>>,
}

impl RecordingHook {
    pub fn events(&self) -> Vec<TimestepResolved> {
        self.events.lock().expect("events lock").clone()
    }

    pub fn timesteps(&self) -> Vec<Timestep> {
        self.events().iter().map(|event| event.timestep).collect()
    }
}

impl TimestepResolvedHook for RecordingHook {
    fn on_timestep_resolved(&self, event: &TimestepResolved) {
        self.events.lock().expect("events lock").push(event.clone());
    }
}

pub fn collaborators_with(
    collisions: Arc<dyn CollisionChecker>,
    hook: Arc<dyn TimestepResolvedHook>,
) -> Collaborators {
    Collaborators::default()
        .with_collisions(collisions)
        .with_hook(hook)
}
