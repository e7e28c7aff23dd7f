//! Narrow seams to collaborators the engine does not own: geometry checks,
//! initial-state computation and schedulers of autonomous participants.

pub mod collisions;
pub mod goals;
pub mod hooks;
pub mod initial_state;

pub use collisions::{CollisionChecker, RadiusCollisionChecker};
pub use goals::{GoalChecker, RectGoalChecker};
pub use hooks::{ChannelHook, NoopHook, TimestepResolved, TimestepResolvedHook};
pub use initial_state::{DeclaredInitialState, InitialStateProvider};
