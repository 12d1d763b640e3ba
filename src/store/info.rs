use anyhow::{Context, Result};
use rusqlite::OptionalExtension;

use super::Store;

const LAST_RUN_KEY: &str = "lastrun";

impl Store {
    /// Read a bookkeeping value
    pub async fn get_info(&self, name: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().await;
        conn.query_row(
            "SELECT val FROM info WHERE name = ?1 LIMIT 1",
            rusqlite::params![name],
            |row| row.get(0),
        )
        .optional()
        .with_context(|| format!("Failed to read info '{}'", name))
    }

    /// Insert or overwrite a bookkeeping value.
    /// Update-then-insert also works on databases whose `info` table has no key constraint.
    pub async fn set_info(&self, name: &str, val: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        let updated = conn
            .execute(
                "UPDATE info SET val = ?1 WHERE name = ?2",
                rusqlite::params![val, name],
            )
            .with_context(|| format!("Failed to update info '{}'", name))?;

        if updated == 0 {
            conn.execute(
                "INSERT INTO info (name, val) VALUES (?1, ?2)",
                rusqlite::params![name, val],
            )
            .with_context(|| format!("Failed to insert info '{}'", name))?;
        }
        Ok(())
    }

    /// Timestamp of the previous start, `None` on the very first run
    pub async fn last_run(&self) -> Result<Option<String>> {
        self.get_info(LAST_RUN_KEY).await
    }

    pub async fn record_run(&self, timestamp: &str) -> Result<()> {
        self.set_info(LAST_RUN_KEY, timestamp).await
    }
}
