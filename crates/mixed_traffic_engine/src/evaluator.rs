//! Collision and goal verdicts for a freshly activated timestep.
//!
//! Runs only right after the barrier flipped rows to `Active`, inside the
//! same unit of work. Every verdict is applied with an `Active`-only
//! conditional update, so re-running on a settled timestep changes nothing.

use std::collections::{HashMap, HashSet};

use mixed_traffic_core::{Driver, DriverId, GoalRegion, Scenario, Timestep, VehicleState, VehicleStatus};
use tracing::{info, warn};

use crate::adapters::{CollisionChecker, GoalChecker};
use crate::error::{EngineError, Result};
use crate::store::VehicleStateStore;

/// Drivers that became terminal in one evaluation, split by cause.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Verdicts {
    pub crashed: Vec<VehicleState>,
    pub goal_reached: Vec<VehicleState>,
}

impl Verdicts {
    pub fn is_empty(&self) -> bool {
        self.crashed.is_empty() && self.goal_reached.is_empty()
    }

    pub fn newly_terminal(&self) -> impl Iterator<Item = &VehicleState> {
        self.crashed.iter().chain(self.goal_reached.iter())
    }
}

pub struct OutcomeEvaluator<'c> {
    collisions: &'c dyn CollisionChecker,
    goals: &'c dyn GoalChecker,
}

impl<'c> OutcomeEvaluator<'c> {
    pub fn new(collisions: &'c dyn CollisionChecker, goals: &'c dyn GoalChecker) -> Self {
        Self { collisions, goals }
    }

    pub fn evaluate(
        &self,
        store: &VehicleStateStore<'_>,
        scenario: &Scenario,
        drivers: &[Driver],
        timestep: Timestep,
    ) -> Result<Verdicts> {
        let states = store.get(scenario.id, timestep)?;
        if let Some(open) = states.iter().find(|state| !state.status.is_resolved()) {
            return Err(EngineError::consistency(
                scenario.id,
                Some(open.driver_id),
                timestep,
                format!("evaluation saw a {} row", open.status),
            ));
        }

        let mut verdicts = Verdicts::default();
        let snapshot: HashMap<DriverId, &VehicleState> =
            states.iter().map(|state| (state.driver_id, state)).collect();

        for (driver_id, frozen) in self.collisions.check_collisions(scenario, timestep, &states) {
            let Some(current) = snapshot.get(&driver_id) else {
                warn!(
                    component = "outcome_evaluator",
                    event = "unknown_collision_driver",
                    scenario_id = scenario.id,
                    driver_id,
                    timestep,
                );
                continue;
            };
            let payload = frozen.kinematics.or(current.kinematics);
            let applied = store.conditional_update(
                driver_id,
                timestep,
                &[VehicleStatus::Active],
                VehicleStatus::Crashed,
                payload.as_ref(),
            )?;
            if applied {
                verdicts.crashed.push(VehicleState {
                    driver_id,
                    timestep,
                    status: VehicleStatus::Crashed,
                    kinematics: payload,
                });
            }
        }

        let goals: HashMap<DriverId, &GoalRegion> =
            drivers.iter().map(|driver| (driver.id, &driver.goal)).collect();
        let crashed: HashSet<DriverId> = verdicts.crashed.iter().map(|state| state.driver_id).collect();

        for state in &states {
            if state.status != VehicleStatus::Active || crashed.contains(&state.driver_id) {
                continue;
            }
            let Some(goal) = goals.get(&state.driver_id) else {
                continue;
            };
            if !self.goals.is_goal_reached(state.driver_id, goal, state) {
                continue;
            }
            let applied = store.conditional_update(
                state.driver_id,
                timestep,
                &[VehicleStatus::Active],
                VehicleStatus::GoalReached,
                state.kinematics.as_ref(),
            )?;
            if applied {
                verdicts
                    .goal_reached
                    .push(state.with_status(VehicleStatus::GoalReached));
            }
        }

        if !verdicts.is_empty() {
            info!(
                component = "outcome_evaluator",
                event = "verdicts_applied",
                scenario_id = scenario.id,
                timestep,
                crashed = verdicts.crashed.len(),
                goal_reached = verdicts.goal_reached.len(),
            );
        }

        Ok(verdicts)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use mixed_traffic_core::{Kinematics, ScenarioStatus};

    use super::*;
    use crate::adapters::{RadiusCollisionChecker, RectGoalChecker};
    use crate::store::vehicle_states::tests::seeded_connection;

    struct CountingChecker {
        calls: AtomicUsize,
        inner: RadiusCollisionChecker,
    }

    impl CollisionChecker for CountingChecker {
        fn check_collisions(
            &self,
            scenario: &Scenario,
            timestep: Timestep,
            states: &[VehicleState],
        ) -> Vec<(DriverId, VehicleState)> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.check_collisions(scenario, timestep, states)
        }
    }

    fn scenario() -> Scenario {
        Scenario {
            id: 1,
            name: "fixture".to_string(),
            duration: 2,
            max_participants: 3,
            status: ScenarioStatus::Active,
            created_at: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    fn driver(id: DriverId, goal_x: f64) -> Driver {
        Driver {
            id,
            scenario_id: 1,
            participant: None,
            initial: Kinematics::at_rest(0.0, 0.0, 0.0),
            goal: GoalRegion {
                x: goal_x,
                y: 0.0,
                length: 4.0,
                width: 4.0,
                orientation: 0.0,
            },
        }
    }

    fn activate(store: &VehicleStateStore<'_>, driver_id: DriverId, x: f64) {
        assert!(store
            .conditional_update(
                driver_id,
                1,
                &[VehicleStatus::Pending],
                VehicleStatus::Active,
                Some(&Kinematics::at_rest(x, 0.0, 0.0)),
            )
            .expect("update"));
    }

    #[test]
    fn collisions_take_precedence_over_goals() {
        let conn = seeded_connection(&[1, 2, 3], 2);
        let store = VehicleStateStore::new(&conn);
        activate(&store, 1, 10.0);
        activate(&store, 2, 11.0);
        activate(&store, 3, 40.0);
        let drivers = vec![driver(1, 10.0), driver(2, 100.0), driver(3, 40.0)];

        let checker = RadiusCollisionChecker::default();
        let verdicts = OutcomeEvaluator::new(&checker, &RectGoalChecker)
            .evaluate(&store, &scenario(), &drivers, 1)
            .expect("evaluate");

        let crashed: Vec<DriverId> = verdicts.crashed.iter().map(|s| s.driver_id).collect();
        let reached: Vec<DriverId> = verdicts.goal_reached.iter().map(|s| s.driver_id).collect();
        assert_eq!(crashed, vec![1, 2]);
        assert_eq!(reached, vec![3]);

        let rows = store.get(1, 1).expect("rows");
        assert_eq!(rows[0].status, VehicleStatus::Crashed);
        assert_eq!(rows[2].status, VehicleStatus::GoalReached);
    }

    #[test]
    fn re_evaluating_a_settled_timestep_changes_nothing() {
        let conn = seeded_connection(&[1, 2], 2);
        let store = VehicleStateStore::new(&conn);
        activate(&store, 1, 10.0);
        activate(&store, 2, 11.0);
        let drivers = vec![driver(1, 100.0), driver(2, 100.0)];
        let checker = CountingChecker {
            calls: AtomicUsize::new(0),
            inner: RadiusCollisionChecker::default(),
        };
        let evaluator = OutcomeEvaluator::new(&checker, &RectGoalChecker);

        let first = evaluator
            .evaluate(&store, &scenario(), &drivers, 1)
            .expect("evaluate");
        let second = evaluator
            .evaluate(&store, &scenario(), &drivers, 1)
            .expect("evaluate again");

        assert_eq!(first.crashed.len(), 2);
        assert!(second.is_empty());
        assert_eq!(checker.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn open_row_breaks_the_precondition() {
        let conn = seeded_connection(&[1, 2], 2);
        let store = VehicleStateStore::new(&conn);
        activate(&store, 1, 10.0);

        let checker = RadiusCollisionChecker::default();
        let error = OutcomeEvaluator::new(&checker, &RectGoalChecker)
            .evaluate(&store, &scenario(), &[driver(1, 0.0), driver(2, 0.0)], 1)
            .expect_err("evaluation should refuse pending rows");

        assert!(matches!(
            error,
            EngineError::ConsistencyViolation {
                driver_id: Some(2),
                ..
            }
        ));
    }
}
