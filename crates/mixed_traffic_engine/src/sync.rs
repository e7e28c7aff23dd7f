//! Per-timestep turn barrier.
//!
//! A timestep becomes actionable once no driver is `Pending` there and the
//! previous timestep is fully resolved. At that point every `Waiting` row is
//! flipped to `Active` in one statement; the caller's unit of work makes the
//! count and the flip one snapshot.

use mixed_traffic_core::{ScenarioId, Timestep, VehicleStatus};
use tracing::{debug, info};

use crate::error::{EngineError, Result};
use crate::store::VehicleStateStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Drivers still have to act here, or the previous timestep is open.
    NotReady {
        pending: usize,
        predecessor_open: bool,
    },
    /// Nothing left to flip; repeated calls land here.
    AlreadyResolved,
    Activated { count: usize },
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TurnSynchronizer;

impl TurnSynchronizer {
    pub fn synchronize(
        &self,
        store: &VehicleStateStore<'_>,
        scenario_id: ScenarioId,
        timestep: Timestep,
        total_drivers: usize,
    ) -> Result<SyncOutcome> {
        if let Some(previous) = timestep.checked_sub(1) {
            if !store.census(scenario_id, previous)?.is_resolved() {
                debug!(
                    component = "turn_synchronizer",
                    event = "predecessor_open",
                    scenario_id,
                    timestep,
                );
                return Ok(SyncOutcome::NotReady {
                    pending: 0,
                    predecessor_open: true,
                });
            }
        }

        let census = store.census(scenario_id, timestep)?;
        if census.total() != total_drivers {
            return Err(EngineError::consistency(
                scenario_id,
                None,
                timestep,
                format!(
                    "found {} vehicle states for {total_drivers} drivers",
                    census.total()
                ),
            ));
        }

        if census.pending > 0 {
            debug!(
                component = "turn_synchronizer",
                event = "drivers_pending",
                scenario_id,
                timestep,
                pending = census.pending,
            );
            return Ok(SyncOutcome::NotReady {
                pending: census.pending,
                predecessor_open: false,
            });
        }

        if census.waiting == 0 {
            return Ok(SyncOutcome::AlreadyResolved);
        }

        if census.active > 0 {
            return Err(EngineError::consistency(
                scenario_id,
                None,
                timestep,
                format!(
                    "timestep is partially activated ({} active, {} waiting)",
                    census.active, census.waiting
                ),
            ));
        }

        let activated = store.transition_all(
            scenario_id,
            timestep,
            VehicleStatus::Waiting,
            VehicleStatus::Active,
        )?;
        if activated != census.waiting {
            return Err(EngineError::consistency(
                scenario_id,
                None,
                timestep,
                format!(
                    "activated {activated} rows, expected {}",
                    census.waiting
                ),
            ));
        }

        info!(
            component = "turn_synchronizer",
            event = "timestep_activated",
            scenario_id,
            timestep,
            activated,
            terminal = census.terminal(),
        );
        Ok(SyncOutcome::Activated { count: activated })
    }
}
