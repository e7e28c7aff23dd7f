//! Error types for the scenario evolution engine.
//!
//! Validation, not-found, too-early and finished-scenario errors are expected
//! outcomes that the API layer turns into typed responses. A
//! `ConsistencyViolation` means a conditional update did not match what the
//! transaction snapshot promised; it always aborts the unit of work.

use mixed_traffic_core::{DriverId, ScenarioId, Timestep, ValidationError};

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("scenario {scenario_id} is not active yet")]
    NotActiveYet { scenario_id: ScenarioId },

    #[error("scenario {scenario_id} is already finished")]
    ScenarioFinished { scenario_id: ScenarioId },

    #[error(
        "consistency violation in scenario {scenario_id} at timestep {timestep} (driver {driver_id:?}): {detail}"
    )]
    ConsistencyViolation {
        scenario_id: ScenarioId,
        driver_id: Option<DriverId>,
        timestep: Timestep,
        detail: String,
    },

    #[error("storage error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EngineError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(ValidationError::new(message))
    }

    pub fn scenario_not_found(id: ScenarioId) -> Self {
        Self::NotFound {
            entity: "scenario",
            id,
        }
    }

    pub fn driver_not_found(id: DriverId) -> Self {
        Self::NotFound {
            entity: "driver",
            id,
        }
    }

    pub fn consistency(
        scenario_id: ScenarioId,
        driver_id: Option<DriverId>,
        timestep: Timestep,
        detail: impl Into<String>,
    ) -> Self {
        Self::ConsistencyViolation {
            scenario_id,
            driver_id,
            timestep,
            detail: detail.into(),
        }
    }

    /// Outcomes the caller handles locally, as opposed to internal failures.
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            Self::Validation(_)
                | Self::NotFound { .. }
                | Self::NotActiveYet { .. }
                | Self::ScenarioFinished { .. }
        )
    }
}
