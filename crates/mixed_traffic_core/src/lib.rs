//! Shared mixed-traffic domain primitives.
//!
//! This crate owns the typed scenario/driver/vehicle-state model, the
//! submission contract accepted at the API edge, and the pure timestep census
//! math used to derive scenario status. It intentionally excludes persistence
//! and collaborator concerns; those live in `mixed_traffic_engine`.

pub mod contract;
pub mod model;
pub mod timeline;

pub use contract::ValidationError;
pub use model::{
    Driver, DriverId, GoalRegion, Kinematics, Participant, Scenario, ScenarioId, ScenarioStatus,
    Timestep, VehicleState, VehicleStatus,
};
