use rusqlite::Connection;

/// Lifecycle phase cached on the scenario row. Only the lifecycle manager
/// writes it (activation and closure); readers derive the live status from
/// `vehicle_states`.
const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS scenarios (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    duration INTEGER NOT NULL CHECK(duration >= 1),
    max_participants INTEGER NOT NULL CHECK(max_participants >= 1),
    status TEXT NOT NULL CHECK(status IN ('WAITING', 'ACTIVE', 'DONE')),
    created_at TEXT NOT NULL,
    activated_at TEXT,
    closed_at TEXT
);

CREATE TABLE IF NOT EXISTS drivers (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    scenario_id INTEGER NOT NULL REFERENCES scenarios(id),
    slot_index INTEGER NOT NULL,
    participant_json TEXT,
    initial_json TEXT NOT NULL,
    goal_json TEXT NOT NULL,
    UNIQUE(scenario_id, slot_index)
);

CREATE TABLE IF NOT EXISTS vehicle_states (
    scenario_id INTEGER NOT NULL REFERENCES scenarios(id),
    driver_id INTEGER NOT NULL REFERENCES drivers(id),
    timestep INTEGER NOT NULL CHECK(timestep >= 0),
    status TEXT NOT NULL
        CHECK(status IN ('PENDING', 'WAITING', 'ACTIVE', 'CRASHED', 'GOAL_REACHED')),
    x REAL,
    y REAL,
    rotation REAL,
    speed REAL,
    acceleration REAL,
    PRIMARY KEY (driver_id, timestep)
);

CREATE INDEX IF NOT EXISTS idx_vehicle_states_scenario_timestep
    ON vehicle_states(scenario_id, timestep, status);
";

pub fn migrate(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrate_is_idempotent() {
        let conn = Connection::open_in_memory().expect("in-memory db");
        migrate(&conn).expect("first migration");
        migrate(&conn).expect("second migration");

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name")
            .expect("prepare")
            .query_map([], |row| row.get(0))
            .expect("query")
            .collect::<Result<_, _>>()
            .expect("decode");
        assert_eq!(tables, vec!["drivers", "scenarios", "vehicle_states"]);
    }
}
