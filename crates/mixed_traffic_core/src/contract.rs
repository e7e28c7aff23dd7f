use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::model::{DriverId, GoalRegion, Kinematics, Timestep, VehicleStatus};

pub const MAX_SCENARIO_DURATION: Timestep = 10_000;
pub const MAX_PARTICIPANTS: u32 = 64;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ValidationError {
    message: String,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Driver slot as declared when a scenario is defined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverSlot {
    pub initial: Kinematics,
    pub goal: GoalRegion,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioDefinition {
    pub name: String,
    pub duration: Timestep,
    pub max_participants: u32,
    pub drivers: Vec<DriverSlot>,
}

/// Wire shape of one submitted state. Every payload field is optional here so
/// that a missing field is reported as a validation error rather than a
/// decode failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmittedState {
    pub timestep: Timestep,
    #[serde(default)]
    pub x: Option<f64>,
    #[serde(default)]
    pub y: Option<f64>,
    #[serde(default)]
    pub rotation: Option<f64>,
    #[serde(default)]
    pub speed: Option<f64>,
    #[serde(default)]
    pub acceleration: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlannedState {
    pub timestep: Timestep,
    pub kinematics: Kinematics,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedTimestep {
    pub timestep: Timestep,
    pub crashed: Vec<DriverId>,
    pub goal_reached: Vec<DriverId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitResult {
    pub accepted: bool,
    /// Timesteps whose row moved to `Waiting` with the submitted payload.
    pub applied: Vec<Timestep>,
    /// Timesteps beyond the scenario duration, dropped without error.
    pub ignored: Vec<Timestep>,
    /// First timestep that was not processed because the driver is terminal.
    pub stopped_early_at: Option<Timestep>,
    /// Set when the submitting driver is crashed or at goal after this call.
    pub terminal_status: Option<VehicleStatus>,
    pub resolved: Vec<ResolvedTimestep>,
    pub fingerprint: String,
}

impl SubmitResult {
    pub fn should_stop_planning(&self) -> bool {
        self.terminal_status.is_some()
    }
}

pub fn validate_definition(definition: &ScenarioDefinition) -> Result<(), ValidationError> {
    if definition.name.trim().is_empty() {
        return Err(ValidationError::new("scenario name cannot be empty"));
    }

    if definition.duration == 0 {
        return Err(ValidationError::new(
            "duration must be at least one timestep",
        ));
    }

    if definition.duration > MAX_SCENARIO_DURATION {
        return Err(ValidationError::new(format!(
            "duration exceeds MAX_SCENARIO_DURATION={MAX_SCENARIO_DURATION}"
        )));
    }

    if definition.max_participants == 0 || definition.max_participants > MAX_PARTICIPANTS {
        return Err(ValidationError::new(format!(
            "max_participants must be between 1 and {MAX_PARTICIPANTS}"
        )));
    }

    if definition.drivers.is_empty() {
        return Err(ValidationError::new(
            "a scenario needs at least one driver slot",
        ));
    }

    if definition.drivers.len() > definition.max_participants as usize {
        return Err(ValidationError::new(format!(
            "{} driver slots exceed max_participants={}",
            definition.drivers.len(),
            definition.max_participants
        )));
    }

    for (index, slot) in definition.drivers.iter().enumerate() {
        if !slot.initial.is_finite() {
            return Err(ValidationError::new(format!(
                "driver slot {index} has a non-finite initial state"
            )));
        }
        if !slot.goal.is_valid() {
            return Err(ValidationError::new(format!(
                "driver slot {index} has an invalid goal region"
            )));
        }
        if slot.goal.contains(slot.initial.x, slot.initial.y) {
            return Err(ValidationError::new(format!(
                "driver slot {index} starts inside its goal region"
            )));
        }
    }

    Ok(())
}

/// Converts wire states into typed planned states, checking ordering and
/// payload completeness. Timesteps beyond the scenario duration pass through;
/// the engine drops them once it knows the duration.
pub fn normalize_submission(
    states: Vec<SubmittedState>,
) -> Result<Vec<PlannedState>, ValidationError> {
    if states.is_empty() {
        return Err(ValidationError::new("submission contains no states"));
    }

    let mut planned = Vec::with_capacity(states.len());
    let mut previous: Option<Timestep> = None;

    for state in states {
        if state.timestep == 0 {
            return Err(ValidationError::new(
                "timestep 0 is fixed at activation and cannot be submitted",
            ));
        }

        if let Some(prev) = previous {
            if state.timestep <= prev {
                return Err(ValidationError::new(format!(
                    "timesteps must be strictly ascending (got {} after {prev})",
                    state.timestep
                )));
            }
        }
        previous = Some(state.timestep);

        let kinematics = Kinematics {
            x: required_field(state.timestep, "x", state.x)?,
            y: required_field(state.timestep, "y", state.y)?,
            rotation: required_field(state.timestep, "rotation", state.rotation)?,
            speed: required_field(state.timestep, "speed", state.speed)?,
            acceleration: required_field(state.timestep, "acceleration", state.acceleration)?,
        };

        planned.push(PlannedState {
            timestep: state.timestep,
            kinematics,
        });
    }

    Ok(planned)
}

fn required_field(
    timestep: Timestep,
    name: &str,
    value: Option<f64>,
) -> Result<f64, ValidationError> {
    match value {
        Some(value) if value.is_finite() => Ok(value),
        Some(_) => Err(ValidationError::new(format!(
            "field '{name}' at timestep {timestep} must be finite"
        ))),
        None => Err(ValidationError::new(format!(
            "field '{name}' is missing at timestep {timestep}"
        ))),
    }
}

pub fn submission_fingerprint(driver_id: DriverId, states: &[PlannedState]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(driver_id.to_be_bytes());
    hasher.update(stable_contract_json(states));
    format!("{:x}", hasher.finalize())
}

pub fn stable_contract_json(value: impl Serialize) -> String {
    serde_json::to_string(&value).expect("serialization of contract value should not fail")
}
