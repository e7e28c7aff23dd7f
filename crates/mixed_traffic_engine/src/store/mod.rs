//! SQLite persistence.
//!
//! - **SqliteStore**: opens the database once, runs the schema migration and
//!   hands out sessions.
//! - **Session**: one connection per external request.
//! - **UnitOfWork**: one transaction inside a session. Write paths use
//!   `IMMEDIATE` transactions so the snapshot a component counts on is the
//!   snapshot it mutates. Dropping a unit of work without `commit` rolls it
//!   back.

pub mod scenarios;
pub mod schema;
pub mod vehicle_states;

use rusqlite::{Connection, Transaction, TransactionBehavior};
use tracing::info;

use crate::config::EngineConfig;
use crate::error::Result;

pub use scenarios::ScenarioRepository;
pub use vehicle_states::VehicleStateStore;

#[derive(Debug, Clone)]
pub struct SqliteStore {
    config: EngineConfig,
}

impl SqliteStore {
    pub fn open(config: EngineConfig) -> Result<Self> {
        let conn = connect(&config)?;
        schema::migrate(&conn)?;
        info!(
            component = "store",
            event = "store_opened",
            path = %config.database_path.display(),
        );
        Ok(Self { config })
    }

    pub fn session(&self) -> Result<Session> {
        Ok(Session {
            conn: connect(&self.config)?,
        })
    }
}

fn connect(config: &EngineConfig) -> Result<Connection> {
    let conn = Connection::open(&config.database_path)?;
    conn.busy_timeout(config.busy_timeout())?;
    conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get::<_, String>(0))?;
    conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA synchronous = NORMAL;")?;
    Ok(conn)
}

pub struct Session {
    conn: Connection,
}

impl Session {
    /// Write scope: takes the database write lock up front.
    pub fn unit_of_work(&mut self) -> Result<UnitOfWork<'_>> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        Ok(UnitOfWork { tx })
    }

    /// Read scope: a consistent snapshot that never writes.
    pub fn snapshot(&mut self) -> Result<UnitOfWork<'_>> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Deferred)?;
        Ok(UnitOfWork { tx })
    }
}

pub struct UnitOfWork<'s> {
    tx: Transaction<'s>,
}

impl UnitOfWork<'_> {
    pub fn vehicle_states(&self) -> VehicleStateStore<'_> {
        VehicleStateStore::new(&self.tx)
    }

    pub fn scenarios(&self) -> ScenarioRepository<'_> {
        ScenarioRepository::new(&self.tx)
    }

    pub fn commit(self) -> Result<()> {
        self.tx.commit()?;
        Ok(())
    }
}
