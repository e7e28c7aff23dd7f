use mixed_traffic_core::{DriverId, Scenario, Timestep, VehicleState, VehicleStatus};

/// Collision detection for one resolved timestep.
///
/// `states` holds every row of `timestep`, none of them `Pending` or
/// `Waiting`. Implementations return the drivers newly involved in a
/// collision together with the state to freeze them in.
pub trait CollisionChecker: Send + Sync {
    fn check_collisions(
        &self,
        scenario: &Scenario,
        timestep: Timestep,
        states: &[VehicleState],
    ) -> Vec<(DriverId, VehicleState)>;
}

/// Treats every vehicle as a disc of `radius`. Crashed and finished vehicles
/// stay on the road as obstacles but are never reported again.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RadiusCollisionChecker {
    pub radius: f64,
}

impl Default for RadiusCollisionChecker {
    fn default() -> Self {
        Self { radius: 2.0 }
    }
}

impl CollisionChecker for RadiusCollisionChecker {
    fn check_collisions(
        &self,
        _scenario: &Scenario,
        _timestep: Timestep,
        states: &[VehicleState],
    ) -> Vec<(DriverId, VehicleState)> {
        let min_gap = 2.0 * self.radius;
        let mut hits = Vec::new();

        for (index, state) in states.iter().enumerate() {
            if state.status != VehicleStatus::Active {
                continue;
            }
            let Some(own) = state.kinematics.as_ref() else {
                continue;
            };
            let collides = states.iter().enumerate().any(|(other_index, other)| {
                other_index != index
                    && other
                        .kinematics
                        .as_ref()
                        .is_some_and(|theirs| own.distance_to(theirs) < min_gap)
            });
            if collides {
                hits.push((state.driver_id, state.with_status(VehicleStatus::Crashed)));
            }
        }

        hits
    }
}
