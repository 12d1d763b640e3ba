use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};

use crate::config::{DeskConfig, ReminderConfig};
use crate::scheduler::Scheduler;

/// A recurring reminder: fires at a local time of day on selected weekdays
#[derive(Debug, Clone, PartialEq)]
pub struct ReminderTrigger {
    pub name: String,
    /// Monday-first, no duplicates
    pub weekdays: Vec<Weekday>,
    pub time: NaiveTime,
    pub timezone: Tz,
    pub message: String,
    /// Desk whose current occupant gets reminded
    pub desk: DeskConfig,
}

impl ReminderTrigger {
    pub fn from_config(index: usize, config: &ReminderConfig, desk: &DeskConfig) -> Result<Self> {
        let time = parse_time_of_day(&config.time)?;

        let mut weekdays = config
            .weekdays
            .iter()
            .map(|day| {
                day.trim()
                    .parse::<Weekday>()
                    .map_err(|_| anyhow::anyhow!("unknown weekday '{}'", day))
            })
            .collect::<Result<Vec<_>>>()?;
        weekdays.sort_by_key(|d| d.num_days_from_monday());
        weekdays.dedup();
        if weekdays.is_empty() {
            anyhow::bail!("reminder needs at least one weekday");
        }

        let timezone: Tz = config
            .timezone
            .parse()
            .map_err(|e| anyhow::anyhow!("unknown timezone '{}': {}", config.timezone, e))?;

        Ok(Self {
            name: format!("reminder-{}-{}", index + 1, time.format("%H%M")),
            weekdays,
            time,
            timezone,
            message: config.message.clone(),
            desk: desk.clone(),
        })
    }

    pub fn fires_on(&self, day: Weekday) -> bool {
        self.weekdays.contains(&day)
    }

    /// First fire instant strictly after `after`.
    ///
    /// A local time that does not exist on a given day (DST gap) is skipped
    /// for that day; an ambiguous one (DST overlap) fires on its first
    /// occurrence only.
    pub fn next_fire_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let mut date = after.with_timezone(&self.timezone).date_naive();

        // Two weeks covers a matching day lost to a DST gap
        for _ in 0..15 {
            if self.fires_on(date.weekday()) {
                let local = self
                    .timezone
                    .from_local_datetime(&date.and_time(self.time))
                    .earliest();
                if let Some(candidate) = local.map(|dt| dt.with_timezone(&Utc)) {
                    if candidate > after {
                        return Some(candidate);
                    }
                }
            }
            date = date.succ_opt()?;
        }
        None
    }
}

fn parse_time_of_day(value: &str) -> Result<NaiveTime> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
        .with_context(|| format!("invalid time of day '{}', expected HH:MM", value))
}

/// Every second, in UTC; local wall-clock times are resolved per tick by
/// `ReminderTrigger::next_fire_after`, so DST changes never shift a reminder.
const TICK_CRON: &str = "* * * * * *";

/// Reminders waiting for their next fire instant
pub struct ReminderBoard {
    entries: Vec<(Arc<ReminderTrigger>, Option<DateTime<Utc>>)>,
}

impl ReminderBoard {
    pub fn new(triggers: Vec<ReminderTrigger>, now: DateTime<Utc>) -> Self {
        let entries = triggers
            .into_iter()
            .map(|trigger| {
                let next = trigger.next_fire_after(now);
                (Arc::new(trigger), next)
            })
            .collect();
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Take every reminder whose fire instant is at or before `now` and
    /// schedule its following fire. Fires missed while the process was
    /// stalled collapse into one.
    pub fn due(&mut self, now: DateTime<Utc>) -> Vec<Arc<ReminderTrigger>> {
        let mut due = Vec::new();
        for (trigger, next) in &mut self.entries {
            if matches!(next, Some(at) if *at <= now) {
                due.push(trigger.clone());
                *next = trigger.next_fire_after(now);
            }
        }
        due
    }
}

/// Register a ticking job that hands due reminders to `sink`, where the
/// runtime picks them up alongside chat events.
pub async fn register_reminders(
    scheduler: &Scheduler,
    triggers: Vec<ReminderTrigger>,
    sink: mpsc::Sender<Arc<ReminderTrigger>>,
) -> Result<()> {
    let board = ReminderBoard::new(triggers, Utc::now());
    if board.is_empty() {
        info!("No reminders configured");
        return Ok(());
    }

    for (trigger, next) in &board.entries {
        match next {
            Some(next) => info!(
                "Reminder '{}' next fires at {}",
                trigger.name,
                next.with_timezone(&trigger.timezone)
            ),
            None => warn!("Reminder '{}' has no upcoming fire time", trigger.name),
        }
    }

    let board = Arc::new(Mutex::new(board));
    scheduler
        .add_cron_job(TICK_CRON, "reminder-tick", move || {
            let board = board.clone();
            let sink = sink.clone();
            Box::pin(async move {
                let due = board.lock().await.due(Utc::now());
                for trigger in due {
                    info!("Reminder '{}' is due", trigger.name);
                    if sink.send(trigger.clone()).await.is_err() {
                        warn!("Runtime stopped; dropping reminder '{}'", trigger.name);
                    }
                }
            })
        })
        .await
}
