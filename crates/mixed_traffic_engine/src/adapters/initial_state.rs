use mixed_traffic_core::{Driver, GoalRegion, Kinematics};

/// Computes a driver's timestep-0 state and goal at activation.
pub trait InitialStateProvider: Send + Sync {
    fn initial_state_and_goal(&self, driver: &Driver) -> (Kinematics, GoalRegion);
}

/// Uses the values declared on the driver slot unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct DeclaredInitialState;

impl InitialStateProvider for DeclaredInitialState {
    fn initial_state_and_goal(&self, driver: &Driver) -> (Kinematics, GoalRegion) {
        (driver.initial, driver.goal)
    }
}
