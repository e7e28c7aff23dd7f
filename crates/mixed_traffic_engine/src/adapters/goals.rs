use mixed_traffic_core::{DriverId, GoalRegion, VehicleState};

pub trait GoalChecker: Send + Sync {
    fn is_goal_reached(&self, driver_id: DriverId, goal: &GoalRegion, state: &VehicleState) -> bool;
}

/// Goal reached once the vehicle's reference point lies inside the region.
#[derive(Debug, Default, Clone, Copy)]
pub struct RectGoalChecker;

impl GoalChecker for RectGoalChecker {
    fn is_goal_reached(&self, _driver_id: DriverId, goal: &GoalRegion, state: &VehicleState) -> bool {
        state
            .kinematics
            .as_ref()
            .is_some_and(|kinematics| goal.contains(kinematics.x, kinematics.y))
    }
}

#[cfg(test)]
mod tests {
    use mixed_traffic_core::{Kinematics, VehicleStatus};

    use super::*;

    #[test]
    fn pending_state_never_reaches_goal() {
        let goal = GoalRegion {
            x: 0.0,
            y: 0.0,
            length: 10.0,
            width: 10.0,
            orientation: 0.0,
        };

        assert!(!RectGoalChecker.is_goal_reached(1, &goal, &VehicleState::pending(1, 1)));

        let inside = VehicleState {
            driver_id: 1,
            timestep: 1,
            status: VehicleStatus::Active,
            kinematics: Some(Kinematics::at_rest(2.0, -2.0, 0.0)),
        };
        assert!(RectGoalChecker.is_goal_reached(1, &goal, &inside));
    }
}
