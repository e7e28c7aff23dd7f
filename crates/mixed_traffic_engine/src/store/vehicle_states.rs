//! The driver x timestep grid.
//!
//! Every mutation here is a single conditional statement keyed on the row's
//! current status, so two writers racing on the same row either both miss or
//! exactly one applies. This module knows nothing about scenarios or drivers
//! beyond their ids.

use mixed_traffic_core::timeline::{GridCensus, TimestepCensus};
use mixed_traffic_core::{DriverId, Kinematics, ScenarioId, Timestep, VehicleState, VehicleStatus};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::Result;

const STATE_COLUMNS: &str = "driver_id, timestep, status, x, y, rotation, speed, acceleration";

pub struct VehicleStateStore<'a> {
    conn: &'a Connection,
}

impl<'a> VehicleStateStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Preallocates one driver's rows: timestep 0 `Active` with `initial`,
    /// timesteps `1..=duration` `Pending`.
    pub fn insert_grid(
        &self,
        scenario_id: ScenarioId,
        driver_id: DriverId,
        duration: Timestep,
        initial: &Kinematics,
    ) -> Result<usize> {
        let mut stmt = self.conn.prepare(
            "INSERT INTO vehicle_states
             (scenario_id, driver_id, timestep, status, x, y, rotation, speed, acceleration)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )?;

        let mut inserted = stmt.execute(params![
            scenario_id,
            driver_id,
            0u32,
            VehicleStatus::Active.as_str(),
            initial.x,
            initial.y,
            initial.rotation,
            initial.speed,
            initial.acceleration,
        ])?;

        for timestep in 1..=duration {
            inserted += stmt.execute(params![
                scenario_id,
                driver_id,
                timestep,
                VehicleStatus::Pending.as_str(),
                None::<f64>,
                None::<f64>,
                None::<f64>,
                None::<f64>,
                None::<f64>,
            ])?;
        }

        Ok(inserted)
    }

    pub fn get(&self, scenario_id: ScenarioId, timestep: Timestep) -> Result<Vec<VehicleState>> {
        self.query_states(
            &format!(
                "SELECT {STATE_COLUMNS} FROM vehicle_states
                 WHERE scenario_id = ?1 AND timestep = ?2
                 ORDER BY driver_id"
            ),
            params![scenario_id, timestep],
        )
    }

    pub fn get_for_driver(
        &self,
        scenario_id: ScenarioId,
        driver_id: DriverId,
    ) -> Result<Vec<VehicleState>> {
        self.query_states(
            &format!(
                "SELECT {STATE_COLUMNS} FROM vehicle_states
                 WHERE scenario_id = ?1 AND driver_id = ?2
                 ORDER BY timestep"
            ),
            params![scenario_id, driver_id],
        )
    }

    pub fn get_one(&self, driver_id: DriverId, timestep: Timestep) -> Result<Option<VehicleState>> {
        let state = self
            .conn
            .query_row(
                &format!(
                    "SELECT {STATE_COLUMNS} FROM vehicle_states
                     WHERE driver_id = ?1 AND timestep = ?2"
                ),
                params![driver_id, timestep],
                state_from_row,
            )
            .optional()?;
        Ok(state)
    }

    pub fn count(&self, scenario_id: ScenarioId) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM vehicle_states WHERE scenario_id = ?1",
            params![scenario_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    pub fn census(&self, scenario_id: ScenarioId, timestep: Timestep) -> Result<TimestepCensus> {
        let mut stmt = self.conn.prepare(
            "SELECT status, COUNT(*) FROM vehicle_states
             WHERE scenario_id = ?1 AND timestep = ?2
             GROUP BY status",
        )?;
        let rows = stmt.query_map(params![scenario_id, timestep], |row| {
            Ok((status_from_row(row, 0)?, row.get::<_, i64>(1)?))
        })?;

        let mut census = TimestepCensus::default();
        for row in rows {
            let (status, count) = row?;
            census.record(status, count as usize);
        }
        Ok(census)
    }

    pub fn grid_census(&self, scenario_id: ScenarioId) -> Result<GridCensus> {
        let mut stmt = self.conn.prepare(
            "SELECT timestep, status, COUNT(*) FROM vehicle_states
             WHERE scenario_id = ?1
             GROUP BY timestep, status",
        )?;
        let rows = stmt.query_map(params![scenario_id], |row| {
            Ok((
                row.get::<_, Timestep>(0)?,
                status_from_row(row, 1)?,
                row.get::<_, i64>(2)?,
            ))
        })?;

        let mut grid = GridCensus::default();
        for row in rows {
            let (timestep, status, count) = row?;
            grid.record(timestep, status, count as usize);
        }
        Ok(grid)
    }

    /// Moves one row to `new_status` with `payload` if its current status is
    /// in `expected`. Returns whether a row matched.
    pub fn conditional_update(
        &self,
        driver_id: DriverId,
        timestep: Timestep,
        expected: &[VehicleStatus],
        new_status: VehicleStatus,
        payload: Option<&Kinematics>,
    ) -> Result<bool> {
        if expected.is_empty() {
            return Ok(false);
        }

        let changed = self.conn.execute(
            &format!(
                "UPDATE vehicle_states
                 SET status = ?1, x = ?2, y = ?3, rotation = ?4, speed = ?5, acceleration = ?6
                 WHERE driver_id = ?7 AND timestep = ?8 AND status IN ({})",
                status_list(expected)
            ),
            params![
                new_status.as_str(),
                payload.map(|k| k.x),
                payload.map(|k| k.y),
                payload.map(|k| k.rotation),
                payload.map(|k| k.speed),
                payload.map(|k| k.acceleration),
                driver_id,
                timestep,
            ],
        )?;
        Ok(changed == 1)
    }

    /// Bulk status change for every row of a timestep currently in `from`.
    /// Payloads are left untouched.
    pub fn transition_all(
        &self,
        scenario_id: ScenarioId,
        timestep: Timestep,
        from: VehicleStatus,
        to: VehicleStatus,
    ) -> Result<usize> {
        let changed = self.conn.execute(
            "UPDATE vehicle_states SET status = ?1
             WHERE scenario_id = ?2 AND timestep = ?3 AND status = ?4",
            params![to.as_str(), scenario_id, timestep, from.as_str()],
        )?;
        Ok(changed)
    }

    /// Copies `frozen`'s status and payload onto the driver's rows in
    /// `[from, to]` that are not already terminal.
    pub fn freeze_range(
        &self,
        driver_id: DriverId,
        from: Timestep,
        to: Timestep,
        frozen: &VehicleState,
    ) -> Result<usize> {
        let payload = frozen.kinematics.as_ref();
        let changed = self.conn.execute(
            &format!(
                "UPDATE vehicle_states
                 SET status = ?1, x = ?2, y = ?3, rotation = ?4, speed = ?5, acceleration = ?6
                 WHERE driver_id = ?7 AND timestep BETWEEN ?8 AND ?9
                   AND status NOT IN ({})",
                status_list(&VehicleStatus::TERMINAL)
            ),
            params![
                frozen.status.as_str(),
                payload.map(|k| k.x),
                payload.map(|k| k.y),
                payload.map(|k| k.rotation),
                payload.map(|k| k.speed),
                payload.map(|k| k.acceleration),
                driver_id,
                from,
                to,
            ],
        )?;
        Ok(changed)
    }

    /// First row in `[from, to]` carrying a terminal status other than `status`.
    pub fn conflicting_terminal(
        &self,
        driver_id: DriverId,
        from: Timestep,
        to: Timestep,
        status: VehicleStatus,
    ) -> Result<Option<VehicleState>> {
        let state = self
            .conn
            .query_row(
                &format!(
                    "SELECT {STATE_COLUMNS} FROM vehicle_states
                     WHERE driver_id = ?1 AND timestep BETWEEN ?2 AND ?3
                       AND status IN ({}) AND status <> ?4
                     ORDER BY timestep
                     LIMIT 1",
                    status_list(&VehicleStatus::TERMINAL)
                ),
                params![driver_id, from, to, status.as_str()],
                state_from_row,
            )
            .optional()?;
        Ok(state)
    }

    /// Returns the driver's open rows after `timestep` to `Pending` and clears
    /// their payload.
    pub fn reset_after(&self, driver_id: DriverId, timestep: Timestep) -> Result<usize> {
        let changed = self.conn.execute(
            &format!(
                "UPDATE vehicle_states
                 SET status = ?1, x = NULL, y = NULL, rotation = NULL, speed = NULL, acceleration = NULL
                 WHERE driver_id = ?2 AND timestep > ?3 AND status IN ({})",
                status_list(&[VehicleStatus::Pending, VehicleStatus::Waiting])
            ),
            params![VehicleStatus::Pending.as_str(), driver_id, timestep],
        )?;
        Ok(changed)
    }

    pub fn delete_after(&self, scenario_id: ScenarioId, timestep: Timestep) -> Result<usize> {
        let deleted = self.conn.execute(
            "DELETE FROM vehicle_states WHERE scenario_id = ?1 AND timestep > ?2",
            params![scenario_id, timestep],
        )?;
        Ok(deleted)
    }

    /// Earliest timestep at which `driver_count` rows are crashed or at goal.
    pub fn earliest_all_terminal(
        &self,
        scenario_id: ScenarioId,
        driver_count: usize,
    ) -> Result<Option<Timestep>> {
        let timestep = self
            .conn
            .query_row(
                &format!(
                    "SELECT timestep FROM vehicle_states
                     WHERE scenario_id = ?1 AND status IN ({})
                     GROUP BY timestep
                     HAVING COUNT(*) = ?2
                     ORDER BY timestep
                     LIMIT 1",
                    status_list(&VehicleStatus::TERMINAL)
                ),
                params![scenario_id, driver_count as i64],
                |row| row.get::<_, Timestep>(0),
            )
            .optional()?;
        Ok(timestep)
    }

    fn query_states(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<VehicleState>> {
        let mut stmt = self.conn.prepare(sql)?;
        let states = stmt
            .query_map(params, state_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(states)
    }
}

/// Status literals are enum constants, never caller input.
fn status_list(statuses: &[VehicleStatus]) -> String {
    statuses
        .iter()
        .map(|status| format!("'{}'", status.as_str()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn status_from_row(row: &Row<'_>, index: usize) -> rusqlite::Result<VehicleStatus> {
    let raw: String = row.get(index)?;
    VehicleStatus::parse(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            index,
            Type::Text,
            format!("unknown vehicle status '{raw}'").into(),
        )
    })
}

fn state_from_row(row: &Row<'_>) -> rusqlite::Result<VehicleState> {
    let x: Option<f64> = row.get(3)?;
    let y: Option<f64> = row.get(4)?;
    let rotation: Option<f64> = row.get(5)?;
    let speed: Option<f64> = row.get(6)?;
    let acceleration: Option<f64> = row.get(7)?;

    let kinematics = match (x, y, rotation, speed, acceleration) {
        (Some(x), Some(y), Some(rotation), Some(speed), Some(acceleration)) => Some(Kinematics {
            x,
            y,
            rotation,
            speed,
            acceleration,
        }),
        _ => None,
    };

    Ok(VehicleState {
        driver_id: row.get(0)?,
        timestep: row.get(1)?,
        status: status_from_row(row, 2)?,
        kinematics,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use rusqlite::Connection;

    use super::*;
    use crate::store::schema;

    pub(crate) fn seeded_connection(drivers: &[DriverId], duration: Timestep) -> Connection {
        let conn = Connection::open_in_memory().expect("in-memory db");
        schema::migrate(&conn).expect("migration");
        conn.execute(
            "INSERT INTO scenarios (id, name, duration, max_participants, status, created_at)
             VALUES (1, 'fixture', ?1, 8, 'ACTIVE', '2026-01-01T00:00:00Z')",
            params![duration],
        )
        .expect("scenario row");

        let store = VehicleStateStore::new(&conn);
        for (slot, driver_id) in drivers.iter().enumerate() {
            conn.execute(
                "INSERT INTO drivers (id, scenario_id, slot_index, participant_json, initial_json, goal_json)
                 VALUES (?1, 1, ?2, NULL, '{}', '{}')",
                params![driver_id, slot as i64],
            )
            .expect("driver row");
            store
                .insert_grid(1, *driver_id, duration, &Kinematics::at_rest(0.0, 0.0, 0.0))
                .expect("grid rows");
        }
        conn
    }

    pub(crate) fn kinematics(x: f64) -> Kinematics {
        Kinematics {
            x,
            y: 0.0,
            rotation: 0.0,
            speed: 10.0,
            acceleration: 0.0,
        }
    }

    #[test]
    fn insert_grid_preallocates_every_timestep() {
        let conn = seeded_connection(&[10, 11], 3);
        let store = VehicleStateStore::new(&conn);

        assert_eq!(store.count(1).expect("count"), 2 * 4);

        let first = store.get(1, 0).expect("t=0 rows");
        assert!(first
            .iter()
            .all(|state| state.status == VehicleStatus::Active && state.kinematics.is_some()));

        let later = store.get_for_driver(1, 10).expect("driver rows");
        assert_eq!(later.len(), 4);
        assert!(later[1..]
            .iter()
            .all(|state| state.status == VehicleStatus::Pending && state.kinematics.is_none()));
    }

    #[test]
    fn conditional_update_applies_only_from_expected_status() {
        let conn = seeded_connection(&[10], 2);
        let store = VehicleStateStore::new(&conn);
        let payload = kinematics(5.0);

        let applied = store
            .conditional_update(
                10,
                1,
                &[VehicleStatus::Pending, VehicleStatus::Waiting],
                VehicleStatus::Waiting,
                Some(&payload),
            )
            .expect("update");
        assert!(applied);

        let skipped = store
            .conditional_update(
                10,
                1,
                &[VehicleStatus::Active],
                VehicleStatus::Crashed,
                Some(&payload),
            )
            .expect("update");
        assert!(!skipped);

        let row = store.get_one(10, 1).expect("read").expect("row exists");
        assert_eq!(row.status, VehicleStatus::Waiting);
        assert_eq!(row.kinematics, Some(payload));
    }

    #[test]
    fn conditional_update_with_no_expected_status_is_a_no_op() {
        let conn = seeded_connection(&[10], 1);
        let store = VehicleStateStore::new(&conn);

        let applied = store
            .conditional_update(10, 1, &[], VehicleStatus::Waiting, None)
            .expect("update");
        assert!(!applied);
    }

    #[test]
    fn census_counts_each_status() {
        let conn = seeded_connection(&[10, 11, 12], 1);
        let store = VehicleStateStore::new(&conn);
        store
            .conditional_update(
                11,
                1,
                &[VehicleStatus::Pending],
                VehicleStatus::Waiting,
                Some(&kinematics(1.0)),
            )
            .expect("update");

        let census = store.census(1, 1).expect("census");
        assert_eq!(census.pending, 2);
        assert_eq!(census.waiting, 1);
        assert_eq!(census.total(), 3);
    }

    #[test]
    fn reset_after_clears_speculative_rows_only() {
        let conn = seeded_connection(&[10], 3);
        let store = VehicleStateStore::new(&conn);
        for timestep in 1..=3 {
            store
                .conditional_update(
                    10,
                    timestep,
                    &[VehicleStatus::Pending],
                    VehicleStatus::Waiting,
                    Some(&kinematics(timestep as f64)),
                )
                .expect("update");
        }

        store.reset_after(10, 1).expect("reset");

        let rows = store.get_for_driver(1, 10).expect("rows");
        assert_eq!(rows[1].status, VehicleStatus::Waiting);
        assert_eq!(rows[2].status, VehicleStatus::Pending);
        assert_eq!(rows[2].kinematics, None);
        assert_eq!(rows[3].status, VehicleStatus::Pending);
    }

    #[test]
    fn delete_after_is_idempotent() {
        let conn = seeded_connection(&[10, 11], 4);
        let store = VehicleStateStore::new(&conn);

        assert_eq!(store.delete_after(1, 2).expect("delete"), 4);
        assert_eq!(store.delete_after(1, 2).expect("delete again"), 0);
        assert_eq!(store.count(1).expect("count"), 6);
    }

    #[test]
    fn earliest_all_terminal_needs_every_driver() {
        let conn = seeded_connection(&[10, 11], 3);
        let store = VehicleStateStore::new(&conn);
        conn.execute(
            "UPDATE vehicle_states SET status = 'CRASHED', x = 0, y = 0, rotation = 0, speed = 0, acceleration = 0
             WHERE (driver_id = 10 AND timestep >= 1) OR (driver_id = 11 AND timestep >= 2)",
            [],
        )
        .expect("seed terminal rows");

        assert_eq!(store.earliest_all_terminal(1, 2).expect("query"), Some(2));
        assert_eq!(store.earliest_all_terminal(1, 3).expect("query"), None);
    }
}
