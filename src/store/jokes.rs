use anyhow::{Context, Result};
use rusqlite::{OptionalExtension, TransactionBehavior};
use std::path::Path;

use super::Store;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JokeRecord {
    pub id: i64,
    pub text: String,
    pub used_count: i64,
}

/// Read a seed file: one joke per line, blank lines and `#` comments skipped
pub fn read_seed_file(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read joke seed file: {}", path.display()))?;
    Ok(parse_seed(&content))
}

fn parse_seed(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

impl Store {
    #[cfg(test)]
    pub async fn add_joke(&self, text: &str) -> Result<i64> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO jokes (joke, used) VALUES (?1, 0)",
            rusqlite::params![text],
        )
        .context("Failed to insert joke")?;
        Ok(conn.last_insert_rowid())
    }

    pub async fn joke_count(&self) -> Result<i64> {
        let conn = self.conn.lock().await;
        conn.query_row("SELECT count(*) FROM jokes", [], |row| row.get(0))
            .context("Failed to count jokes")
    }

    #[cfg(test)]
    pub async fn list_jokes(&self) -> Result<Vec<JokeRecord>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare("SELECT id, joke, used FROM jokes ORDER BY id")?;
        let jokes = stmt
            .query_map([], parse_joke_row)?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to list jokes")?;
        Ok(jokes)
    }

    /// Insert `jokes` if the corpus is empty; returns how many were added.
    /// A corpus that already has jokes, and their counters, is left alone.
    pub async fn seed_jokes(&self, jokes: &[String]) -> Result<usize> {
        let mut conn = self.conn.lock().await;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .context("Failed to begin joke seeding")?;

        let existing: i64 = tx
            .query_row("SELECT count(*) FROM jokes", [], |row| row.get(0))
            .context("Failed to count jokes")?;
        if existing > 0 {
            return Ok(0);
        }

        {
            let mut stmt = tx.prepare("INSERT INTO jokes (joke, used) VALUES (?1, 0)")?;
            for joke in jokes {
                stmt.execute(rusqlite::params![joke])
                    .context("Failed to insert joke")?;
            }
        }
        tx.commit().context("Failed to commit joke seeding")?;
        Ok(jokes.len())
    }

    /// Pick one of the least-used jokes at random and count the use.
    ///
    /// Selection and increment share an IMMEDIATE transaction so two bot
    /// processes on the same file cannot both pick from a stale minimum.
    /// Returns the record as stored after the increment, or `None` when the
    /// corpus is empty.
    pub async fn pick_joke(&self) -> Result<Option<JokeRecord>> {
        let mut conn = self.conn.lock().await;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .context("Failed to begin joke selection")?;

        let picked = tx
            .query_row(
                "SELECT id, joke, used FROM jokes ORDER BY used ASC, RANDOM() LIMIT 1",
                [],
                parse_joke_row,
            )
            .optional()
            .context("Failed to select joke")?;

        let Some(mut joke) = picked else {
            return Ok(None);
        };

        tx.execute(
            "UPDATE jokes SET used = used + 1 WHERE id = ?1",
            rusqlite::params![joke.id],
        )
        .context("Failed to count joke use")?;
        tx.commit().context("Failed to commit joke selection")?;

        joke.used_count += 1;
        Ok(Some(joke))
    }
}

fn parse_joke_row(row: &rusqlite::Row) -> rusqlite::Result<JokeRecord> {
    Ok(JokeRecord {
        id: row.get(0)?,
        text: row.get(1)?,
        used_count: row.get(2)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    async fn corpus(size: usize) -> Store {
        let store = Store::open_in_memory().unwrap();
        for i in 0..size {
            store.add_joke(&format!("joke {}", i)).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_empty_corpus_yields_nothing() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(store.pick_joke().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_pick_increments_exactly_once() {
        let store = corpus(1).await;
        let joke = store.pick_joke().await.unwrap().unwrap();
        assert_eq!(joke.text, "joke 0");
        assert_eq!(joke.used_count, 1);

        let stored = store.list_jokes().await.unwrap();
        assert_eq!(stored[0].used_count, 1);
    }

    #[tokio::test]
    async fn test_every_joke_told_before_any_repeat() {
        let store = corpus(7).await;
        for _round in 0..3 {
            let mut seen = HashSet::new();
            for _ in 0..7 {
                let joke = store.pick_joke().await.unwrap().unwrap();
                assert!(seen.insert(joke.id), "joke {} repeated within a round", joke.id);
            }
        }
    }

    #[tokio::test]
    async fn test_counts_stay_within_one_of_average() {
        let store = corpus(5).await;
        for n in 1..=23 {
            store.pick_joke().await.unwrap().unwrap();

            let counts: Vec<i64> = store
                .list_jokes()
                .await
                .unwrap()
                .iter()
                .map(|j| j.used_count)
                .collect();
            let total: i64 = counts.iter().sum();
            assert_eq!(total, n);

            let avg = n as f64 / 5.0;
            for count in counts {
                assert!((count as f64 - avg).abs() < 1.0 + f64::EPSILON);
            }
        }
    }

    #[tokio::test]
    async fn test_prefers_least_used_from_existing_counts() {
        let store = corpus(3).await;
        {
            let conn = store.conn.lock().await;
            conn.execute_batch("UPDATE jokes SET used = 4; UPDATE jokes SET used = 2 WHERE id = 2;")
                .unwrap();
        }
        let joke = store.pick_joke().await.unwrap().unwrap();
        assert_eq!(joke.id, 2);
        assert_eq!(joke.used_count, 3);
    }

    #[tokio::test]
    async fn test_seed_fills_only_an_empty_corpus() {
        let store = Store::open_in_memory().unwrap();
        let seed = parse_seed("# norris\nChuck Norris counted to infinity. Twice.\n\n  Chuck Norris can slam a revolving door.  \n");
        assert_eq!(seed.len(), 2);

        assert_eq!(store.seed_jokes(&seed).await.unwrap(), 2);
        let stored = store.list_jokes().await.unwrap();
        assert_eq!(stored[1].text, "Chuck Norris can slam a revolving door.");
        assert!(stored.iter().all(|j| j.used_count == 0));

        store.pick_joke().await.unwrap().unwrap();
        assert_eq!(store.seed_jokes(&seed).await.unwrap(), 0);
        assert_eq!(store.joke_count().await.unwrap(), 2);
    }

    #[test]
    fn test_missing_seed_file_is_an_error() {
        let err = read_seed_file(Path::new("/nonexistent/jokes.txt")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/jokes.txt"));
    }
}
