//! Status derived from vehicle-state rows.
//!
//! The scenario row keeps a cached lifecycle phase, but only `Done` is read
//! back from it: once a scenario is closed its trimmed grid no longer says
//! so on its own. Every other answer comes from the grid.

use mixed_traffic_core::timeline::{self, TimestepCensus};
use mixed_traffic_core::{Driver, Scenario, ScenarioId, ScenarioStatus, Timestep};

use crate::error::Result;
use crate::store::VehicleStateStore;

#[derive(Debug, Default, Clone, Copy)]
pub struct ScenarioStatusResolver;

impl ScenarioStatusResolver {
    /// `None` only when `propagate` is off and no rows exist at `timestep`.
    pub fn status_at(
        &self,
        store: &VehicleStateStore<'_>,
        scenario_id: ScenarioId,
        timestep: Timestep,
        propagate: bool,
    ) -> Result<Option<ScenarioStatus>> {
        let current = store.census(scenario_id, timestep)?;
        let next = match timestep.checked_add(1) {
            Some(next) if propagate && current.is_resolved() => store.census(scenario_id, next)?,
            _ => TimestepCensus::default(),
        };
        Ok(timeline::status_at(&current, &next, propagate))
    }

    pub fn scenario_status(
        &self,
        store: &VehicleStateStore<'_>,
        scenario: &Scenario,
        drivers: &[Driver],
    ) -> Result<ScenarioStatus> {
        if scenario.status == ScenarioStatus::Done {
            return Ok(ScenarioStatus::Done);
        }

        let all_slots_bound = !drivers.is_empty() && drivers.iter().all(Driver::is_bound);
        let grid = store.grid_census(scenario.id)?;
        Ok(timeline::derive_scenario_status(
            &grid,
            scenario.duration,
            all_slots_bound,
        ))
    }
}

#[cfg(test)]
mod tests {
    use mixed_traffic_core::{GoalRegion, Kinematics, Participant, VehicleStatus};

    use super::*;
    use crate::store::vehicle_states::tests::{kinematics, seeded_connection};

    fn move_to(
        store: &VehicleStateStore<'_>,
        driver_id: i64,
        timestep: Timestep,
        status: VehicleStatus,
    ) {
        assert!(store
            .conditional_update(
                driver_id,
                timestep,
                &[VehicleStatus::Pending, VehicleStatus::Waiting],
                status,
                Some(&kinematics(timestep as f64)),
            )
            .expect("update"));
    }

    fn scenario(duration: Timestep, status: ScenarioStatus) -> Scenario {
        Scenario {
            id: 1,
            name: "fixture".to_string(),
            duration,
            max_participants: 2,
            status,
            created_at: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    fn bound_driver(id: i64) -> Driver {
        Driver {
            id,
            scenario_id: 1,
            participant: Some(Participant::Autonomous {
                agent: format!("av-{id}"),
            }),
            initial: Kinematics::at_rest(0.0, 0.0, 0.0),
            goal: GoalRegion {
                x: 50.0,
                y: 0.0,
                length: 5.0,
                width: 5.0,
                orientation: 0.0,
            },
        }
    }

    #[test]
    fn status_at_follows_the_resolution_frontier() {
        let conn = seeded_connection(&[1, 2], 3);
        let store = VehicleStateStore::new(&conn);
        let resolver = ScenarioStatusResolver;

        assert_eq!(
            resolver.status_at(&store, 1, 0, true).expect("t0"),
            Some(ScenarioStatus::Active)
        );
        assert_eq!(
            resolver.status_at(&store, 1, 1, true).expect("t1"),
            Some(ScenarioStatus::Pending)
        );

        move_to(&store, 1, 1, VehicleStatus::Active);
        move_to(&store, 2, 1, VehicleStatus::Waiting);
        assert_eq!(
            resolver.status_at(&store, 1, 1, true).expect("t1 half"),
            Some(ScenarioStatus::Pending)
        );

        store
            .transition_all(1, 1, VehicleStatus::Waiting, VehicleStatus::Active)
            .expect("activate");
        assert_eq!(
            resolver.status_at(&store, 1, 0, true).expect("t0 again"),
            Some(ScenarioStatus::Done)
        );
        assert_eq!(
            resolver.status_at(&store, 1, 1, true).expect("t1 frontier"),
            Some(ScenarioStatus::Active)
        );
        assert_eq!(
            resolver.status_at(&store, 1, 1, false).expect("t1 flat"),
            Some(ScenarioStatus::Active)
        );
    }

    #[test]
    fn missing_timestep_depends_on_propagate() {
        let conn = seeded_connection(&[1], 2);
        let store = VehicleStateStore::new(&conn);

        assert_eq!(
            ScenarioStatusResolver
                .status_at(&store, 1, 9, true)
                .expect("status"),
            Some(ScenarioStatus::Waiting)
        );
        assert_eq!(
            ScenarioStatusResolver
                .status_at(&store, 1, 9, false)
                .expect("status"),
            None
        );
    }

    #[test]
    fn scenario_status_tracks_binding_and_resolution() {
        let conn = seeded_connection(&[1, 2], 1);
        let store = VehicleStateStore::new(&conn);
        let resolver = ScenarioStatusResolver;
        let mut unbound = bound_driver(2);
        unbound.participant = None;

        assert_eq!(
            resolver
                .scenario_status(&store, &scenario(1, ScenarioStatus::Active), &[bound_driver(1), unbound])
                .expect("status"),
            ScenarioStatus::Waiting
        );

        let drivers = [bound_driver(1), bound_driver(2)];
        assert_eq!(
            resolver
                .scenario_status(&store, &scenario(1, ScenarioStatus::Active), &drivers)
                .expect("status"),
            ScenarioStatus::Active
        );

        move_to(&store, 1, 1, VehicleStatus::Active);
        move_to(&store, 2, 1, VehicleStatus::Active);
        assert_eq!(
            resolver
                .scenario_status(&store, &scenario(1, ScenarioStatus::Active), &drivers)
                .expect("status"),
            ScenarioStatus::Done
        );
    }

    #[test]
    fn closed_phase_is_final() {
        let conn = seeded_connection(&[1], 3);
        let store = VehicleStateStore::new(&conn);

        assert_eq!(
            ScenarioStatusResolver
                .scenario_status(&store, &scenario(3, ScenarioStatus::Done), &[bound_driver(1)])
                .expect("status"),
            ScenarioStatus::Done
        );
    }
}
