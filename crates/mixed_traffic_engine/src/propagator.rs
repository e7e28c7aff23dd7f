//! Forward-freeze of terminal outcomes.
//!
//! Once a driver crashes or reaches its goal at `t`, every later row of that
//! driver carries the same status and payload, whatever was submitted there.
//! Only the affected driver's rows are touched.

use mixed_traffic_core::{ScenarioId, Timestep, VehicleState};
use tracing::debug;

use crate::error::{EngineError, Result};
use crate::store::VehicleStateStore;

#[derive(Debug, Default, Clone, Copy)]
pub struct StatePropagator;

impl StatePropagator {
    /// Copies `frozen` onto the driver's rows in `(frozen.timestep, duration]`.
    /// Returns the number of rows overwritten.
    pub fn propagate(
        &self,
        store: &VehicleStateStore<'_>,
        scenario_id: ScenarioId,
        frozen: &VehicleState,
        duration: Timestep,
    ) -> Result<usize> {
        if !frozen.status.is_terminal() {
            return Err(EngineError::consistency(
                scenario_id,
                Some(frozen.driver_id),
                frozen.timestep,
                format!("cannot propagate a {} state", frozen.status),
            ));
        }

        if frozen.timestep >= duration {
            return Ok(0);
        }
        let from = frozen.timestep + 1;

        if let Some(conflict) =
            store.conflicting_terminal(frozen.driver_id, from, duration, frozen.status)?
        {
            return Err(EngineError::consistency(
                scenario_id,
                Some(frozen.driver_id),
                conflict.timestep,
                format!(
                    "driver is already {} while propagating {} from timestep {}",
                    conflict.status, frozen.status, frozen.timestep
                ),
            ));
        }

        let frozen_rows = store.freeze_range(frozen.driver_id, from, duration, frozen)?;
        debug!(
            component = "state_propagator",
            event = "state_frozen",
            scenario_id,
            driver_id = frozen.driver_id,
            timestep = frozen.timestep,
            status = %frozen.status,
            rows = frozen_rows,
        );
        Ok(frozen_rows)
    }
}
