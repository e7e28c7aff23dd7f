//! Scenario evolution engine for mixed-traffic simulations.
//!
//! This crate owns the SQLite-backed driver x timestep grid and the pipeline
//! that moves it forward: the per-timestep turn barrier, collision and goal
//! evaluation, forward-freeze of terminal outcomes and scenario status
//! derivation. Geometry and AV scheduling stay behind the traits in
//! [`adapters`]; the typed model and submission contract live in
//! `mixed_traffic_core`.

pub mod adapters;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod lifecycle;
pub mod logging;
pub mod propagator;
pub mod status;
pub mod store;
pub mod sync;

pub use config::EngineConfig;
pub use error::{EngineError, Result};
pub use evaluator::{OutcomeEvaluator, Verdicts};
pub use lifecycle::{CloseOutcome, Collaborators, ScenarioLifecycleManager};
pub use propagator::StatePropagator;
pub use status::ScenarioStatusResolver;
pub use store::{Session, SqliteStore, UnitOfWork, VehicleStateStore};
pub use sync::{SyncOutcome, TurnSynchronizer};
