use std::process::ExitCode;

use mixed_traffic_core::contract::{DriverSlot, ScenarioDefinition, SubmittedState};
use mixed_traffic_core::{GoalRegion, Kinematics, Participant, Timestep};
use mixed_traffic_engine::logging::init_tracing;
use mixed_traffic_engine::{
    Collaborators, EngineConfig, EngineError, ScenarioLifecycleManager, SqliteStore,
};
use serde_json::json;

fn straight_line(xs: &[(Timestep, f64)], y: f64) -> Vec<SubmittedState> {
    xs.iter()
        .map(|(timestep, x)| SubmittedState {
            timestep: *timestep,
            x: Some(*x),
            y: Some(y),
            rotation: Some(0.0),
            speed: Some(10.0),
            acceleration: Some(0.0),
        })
        .collect()
}

fn run() -> Result<serde_json::Value, EngineError> {
    let config = EngineConfig::from_env()?;
    init_tracing(&config);
    let manager = ScenarioLifecycleManager::new(SqliteStore::open(config)?, Collaborators::default());

    let goal = GoalRegion {
        x: 200.0,
        y: 0.0,
        length: 10.0,
        width: 6.0,
        orientation: 0.0,
    };
    let scenario_id = manager.create_scenario(&ScenarioDefinition {
        name: "two-lane merge".to_string(),
        duration: 3,
        max_participants: 2,
        drivers: vec![
            DriverSlot {
                initial: Kinematics::at_rest(0.0, 0.0, 0.0),
                goal,
            },
            DriverSlot {
                initial: Kinematics::at_rest(0.0, 20.0, 0.0),
                goal,
            },
        ],
    })?;

    let driver_a = manager.join(
        scenario_id,
        Participant::Human {
            user_id: "driver-a".to_string(),
        },
    )?;
    let driver_b = manager.join(
        scenario_id,
        Participant::Human {
            user_id: "driver-b".to_string(),
        },
    )?;
    manager.activate(scenario_id)?;

    let first = manager.submit(
        scenario_id,
        driver_a,
        straight_line(&[(1, 10.0), (2, 20.0), (3, 30.0)], 0.0),
    )?;
    let second = manager.submit(scenario_id, driver_b, straight_line(&[(1, 10.0)], 20.0))?;
    let third = manager.submit(scenario_id, driver_b, straight_line(&[(2, 20.0)], 1.0))?;

    let scenario = manager.get_scenario(scenario_id)?;
    Ok(json!({
        "scenario": scenario,
        "submissions": [first, second, third],
        "timeline": {
            (driver_a.to_string()): manager.get_states_for_driver(scenario_id, driver_a)?,
            (driver_b.to_string()): manager.get_states_for_driver(scenario_id, driver_b)?,
        },
    }))
}

fn main() -> ExitCode {
    match run() {
        Ok(report) => {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).unwrap_or_else(|_| report.to_string())
            );
            ExitCode::SUCCESS
        }
        Err(error) => {
            eprintln!("scenario_demo failed: {error}");
            ExitCode::FAILURE
        }
    }
}
