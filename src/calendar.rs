use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::config::CalendarConfig;

/// Literal the calendar script prints when nothing is scheduled right now
pub const NO_EVENTS_SENTINEL: &str = "No events";

/// Who occupies a calendar right now
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CalendarStatus {
    Vacant,
    Occupied(String),
}

impl CalendarStatus {
    /// Interpret the adapter's raw output line
    pub fn from_output(raw: &str) -> Option<Self> {
        if raw.contains(NO_EVENTS_SENTINEL) {
            return Some(Self::Vacant);
        }
        let line = raw.lines().map(str::trim).find(|l| !l.is_empty())?;
        Some(Self::Occupied(line.to_string()))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Vacant)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("failed to start calendar command '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("calendar command exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("calendar command timed out after {0:?}")]
    Timeout(Duration),

    #[error("calendar command produced no output")]
    EmptyOutput,
}

/// Source of "who is on shift" answers for a calendar
#[async_trait]
pub trait CalendarAdapter: Send + Sync {
    async fn query(&self, calendar_id: &str) -> Result<CalendarStatus, AdapterError>;
}

/// Runs an external script per query with the calendar ID as last argument
pub struct CommandCalendarAdapter {
    command: String,
    args: Vec<String>,
    env: HashMap<String, String>,
    timeout: Duration,
}

impl CommandCalendarAdapter {
    pub fn new(config: &CalendarConfig) -> Self {
        Self {
            command: config.command.clone(),
            args: config.args.clone(),
            env: config.env.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

#[async_trait]
impl CalendarAdapter for CommandCalendarAdapter {
    async fn query(&self, calendar_id: &str) -> Result<CalendarStatus, AdapterError> {
        debug!("Querying calendar {} via {}", calendar_id, self.command);

        let child = Command::new(&self.command)
            .args(&self.args)
            .arg(calendar_id)
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| AdapterError::Spawn {
                command: self.command.clone(),
                source,
            })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| AdapterError::Timeout(self.timeout))?
            .map_err(|source| AdapterError::Spawn {
                command: self.command.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(AdapterError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let status = CalendarStatus::from_output(&stdout).ok_or(AdapterError::EmptyOutput)?;
        debug!(
            "Calendar {} answered {:?} (vacant: {})",
            calendar_id,
            stdout.trim(),
            status.is_empty()
        );
        Ok(status)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel_means_vacant() {
        assert_eq!(
            CalendarStatus::from_output("No events found.\n"),
            Some(CalendarStatus::Vacant)
        );
        assert!(CalendarStatus::Vacant.is_empty());
    }

    #[test]
    fn test_occupant_line_is_trimmed() {
        assert_eq!(
            CalendarStatus::from_output("Jane Doe\n"),
            Some(CalendarStatus::Occupied("Jane Doe".to_string()))
        );
        assert_eq!(CalendarStatus::from_output("  \n"), None);
    }

    #[cfg(unix)]
    fn shell(script: &str, timeout_secs: u64) -> CommandCalendarAdapter {
        CommandCalendarAdapter::new(&CalendarConfig {
            command: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            env: HashMap::from([("DESK_PREFIX".to_string(), "Student".to_string())]),
            timeout_secs,
        })
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_receives_calendar_id() {
        // With `sh -c`, the appended calendar ID becomes $0
        let adapter = shell(r#"echo "$DESK_PREFIX $0""#, 5);
        let status = adapter.query("tech-cal").await.unwrap();
        assert_eq!(status, CalendarStatus::Occupied("Student tech-cal".to_string()));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_sentinel() {
        let adapter = shell("echo 'No events found.'", 5);
        assert_eq!(adapter.query("x").await.unwrap(), CalendarStatus::Vacant);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_is_error() {
        let adapter = shell("echo boom >&2; exit 3", 5);
        match adapter.query("x").await {
            Err(AdapterError::Failed { stderr, .. }) => assert_eq!(stderr, "boom"),
            other => panic!("expected Failed, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_slow_command_times_out() {
        let adapter = shell("sleep 5", 0);
        assert!(matches!(
            adapter.query("x").await,
            Err(AdapterError::Timeout(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_command_is_spawn_error() {
        let adapter = CommandCalendarAdapter::new(&CalendarConfig {
            command: "/nonexistent/list_events".to_string(),
            args: Vec::new(),
            env: HashMap::new(),
            timeout_secs: 5,
        });
        assert!(matches!(
            adapter.query("x").await,
            Err(AdapterError::Spawn { .. })
        ));
    }
}
