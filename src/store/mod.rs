pub mod info;
pub mod jokes;

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

/// Thread-safe SQLite store for run bookkeeping and the joke corpus
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Open or create the SQLite database at the given path
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;

        // journal_mode PRAGMA always returns the resulting mode, so use query_row
        let _: String = conn
            .query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))
            .with_context(|| format!("Database is not usable: {}", path.display()))?;

        // Several bot processes may share one file; wait instead of failing on a held lock
        conn.busy_timeout(std::time::Duration::from_secs(5))?;

        Self::run_migrations(&conn)?;

        info!("Store initialized at: {}", path.display());
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database (for testing)
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::run_migrations(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn run_migrations(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "
            -- Key/value bookkeeping, e.g. the 'lastrun' timestamp
            CREATE TABLE IF NOT EXISTS info (
                name TEXT PRIMARY KEY,
                val TEXT
            );

            -- Joke corpus with per-joke usage counters
            CREATE TABLE IF NOT EXISTS jokes (
                id INTEGER PRIMARY KEY,
                joke TEXT NOT NULL,
                used INTEGER NOT NULL DEFAULT 0
            );
            ",
        )
        .context("Failed to run store migrations")?;
        Ok(())
    }
}
