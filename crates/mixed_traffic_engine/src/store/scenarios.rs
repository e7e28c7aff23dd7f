//! Scenario and driver-slot rows.

use mixed_traffic_core::contract::ScenarioDefinition;
use mixed_traffic_core::{
    Driver, DriverId, GoalRegion, Kinematics, Participant, Scenario, ScenarioId, ScenarioStatus,
};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::Result;

const DRIVER_COLUMNS: &str = "id, scenario_id, participant_json, initial_json, goal_json";

pub struct ScenarioRepository<'a> {
    conn: &'a Connection,
}

impl<'a> ScenarioRepository<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Inserts the scenario in `Waiting` plus one unbound driver row per slot.
    pub fn insert(&self, definition: &ScenarioDefinition, created_at: &str) -> Result<ScenarioId> {
        self.conn.execute(
            "INSERT INTO scenarios (name, duration, max_participants, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                definition.name.trim(),
                definition.duration,
                definition.max_participants,
                ScenarioStatus::Waiting.as_str(),
                created_at,
            ],
        )?;
        let scenario_id = self.conn.last_insert_rowid();

        let mut stmt = self.conn.prepare(
            "INSERT INTO drivers (scenario_id, slot_index, participant_json, initial_json, goal_json)
             VALUES (?1, ?2, NULL, ?3, ?4)",
        )?;
        for (slot_index, slot) in definition.drivers.iter().enumerate() {
            stmt.execute(params![
                scenario_id,
                slot_index as i64,
                serde_json::to_string(&slot.initial)?,
                serde_json::to_string(&slot.goal)?,
            ])?;
        }

        Ok(scenario_id)
    }

    /// Scenario row with its cached lifecycle phase in `status`.
    pub fn get(&self, scenario_id: ScenarioId) -> Result<Option<Scenario>> {
        let scenario = self
            .conn
            .query_row(
                "SELECT id, name, duration, max_participants, status, created_at
                 FROM scenarios WHERE id = ?1",
                params![scenario_id],
                scenario_from_row,
            )
            .optional()?;
        Ok(scenario)
    }

    pub fn drivers(&self, scenario_id: ScenarioId) -> Result<Vec<Driver>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {DRIVER_COLUMNS} FROM drivers WHERE scenario_id = ?1 ORDER BY slot_index"
        ))?;
        let drivers = stmt
            .query_map(params![scenario_id], driver_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(drivers)
    }

    pub fn driver(&self, driver_id: DriverId) -> Result<Option<Driver>> {
        let driver = self
            .conn
            .query_row(
                &format!("SELECT {DRIVER_COLUMNS} FROM drivers WHERE id = ?1"),
                params![driver_id],
                driver_from_row,
            )
            .optional()?;
        Ok(driver)
    }

    pub fn first_unbound_slot(&self, scenario_id: ScenarioId) -> Result<Option<DriverId>> {
        let driver_id = self
            .conn
            .query_row(
                "SELECT id FROM drivers
                 WHERE scenario_id = ?1 AND participant_json IS NULL
                 ORDER BY slot_index
                 LIMIT 1",
                params![scenario_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(driver_id)
    }

    /// Binds an unbound slot. Returns `false` if the slot was already taken.
    pub fn bind_participant(&self, driver_id: DriverId, participant: &Participant) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE drivers SET participant_json = ?1
             WHERE id = ?2 AND participant_json IS NULL",
            params![serde_json::to_string(participant)?, driver_id],
        )?;
        Ok(changed == 1)
    }

    pub fn set_initial_and_goal(
        &self,
        driver_id: DriverId,
        initial: &Kinematics,
        goal: &GoalRegion,
    ) -> Result<()> {
        self.conn.execute(
            "UPDATE drivers SET initial_json = ?1, goal_json = ?2 WHERE id = ?3",
            params![
                serde_json::to_string(initial)?,
                serde_json::to_string(goal)?,
                driver_id
            ],
        )?;
        Ok(())
    }

    /// Moves the cached phase from `from` to `to`, stamping `activated_at` or
    /// `closed_at`. Returns whether the scenario was in `from`.
    pub fn transition_phase(
        &self,
        scenario_id: ScenarioId,
        from: ScenarioStatus,
        to: ScenarioStatus,
        at: &str,
    ) -> Result<bool> {
        let stamp_column = match to {
            ScenarioStatus::Done => "closed_at",
            _ => "activated_at",
        };
        let changed = self.conn.execute(
            &format!(
                "UPDATE scenarios SET status = ?1, {stamp_column} = ?2
                 WHERE id = ?3 AND status = ?4"
            ),
            params![to.as_str(), at, scenario_id, from.as_str()],
        )?;
        Ok(changed == 1)
    }
}

fn scenario_from_row(row: &Row<'_>) -> rusqlite::Result<Scenario> {
    let raw_status: String = row.get(4)?;
    let status = ScenarioStatus::parse(&raw_status).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            Type::Text,
            format!("unknown scenario status '{raw_status}'").into(),
        )
    })?;

    Ok(Scenario {
        id: row.get(0)?,
        name: row.get(1)?,
        duration: row.get(2)?,
        max_participants: row.get(3)?,
        status,
        created_at: row.get(5)?,
    })
}

fn driver_from_row(row: &Row<'_>) -> rusqlite::Result<Driver> {
    let participant_json: Option<String> = row.get(2)?;
    let participant = participant_json
        .map(|raw| json_column::<Participant>(2, &raw))
        .transpose()?;
    let initial_json: String = row.get(3)?;
    let goal_json: String = row.get(4)?;

    Ok(Driver {
        id: row.get(0)?,
        scenario_id: row.get(1)?,
        participant,
        initial: json_column(3, &initial_json)?,
        goal: json_column(4, &goal_json)?,
    })
}

fn json_column<T: serde::de::DeserializeOwned>(index: usize, raw: &str) -> rusqlite::Result<T> {
    serde_json::from_str(raw)
        .map_err(|error| rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(error)))
}
