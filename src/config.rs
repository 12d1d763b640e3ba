use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::scheduler::reminders::ReminderTrigger;

/// Which action the bot takes on an actionable message
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BotMode {
    /// Answer "who is at the desk" from the calendar
    #[default]
    Desk,
    /// Reply with the least-told joke from the corpus
    Jokes,
}

impl std::fmt::Display for BotMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BotMode::Desk => write!(f, "desk"),
            BotMode::Jokes => write!(f, "jokes"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub slack: SlackConfig,
    pub bot: BotConfig,
    #[serde(default = "default_store_config")]
    pub store: StoreConfig,
    #[serde(default = "default_calendar_config")]
    pub calendar: CalendarConfig,
    #[serde(default)]
    pub jokes: JokesConfig,
    /// Ordered by routing priority
    #[serde(default)]
    pub desks: Vec<DeskConfig>,
    #[serde(default)]
    pub reminders: Vec<ReminderConfig>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SlackConfig {
    #[serde(default)]
    pub bot_token: String,
    /// App-level token (xapp-...) for Socket Mode
    #[serde(default)]
    pub app_token: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BotConfig {
    #[serde(default = "default_bot_name")]
    pub name: String,
    /// Channel name reminders and the welcome message are posted to
    pub channel: String,
    #[serde(default)]
    pub mode: BotMode,
    /// Extra phrases besides the bot name that make a message actionable
    #[serde(default)]
    pub trigger_phrases: Vec<String>,
    /// User ID to greet on first run instead of the channel
    #[serde(default)]
    pub welcome_target: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_db_path")]
    pub database_path: PathBuf,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct JokesConfig {
    /// One joke per line; loaded into the store when its corpus is empty
    #[serde(default)]
    pub seed_file: Option<PathBuf>,
}

/// External command that reports a calendar's current occupant.
/// The calendar ID is appended as the last argument.
#[derive(Debug, Deserialize, Clone)]
pub struct CalendarConfig {
    #[serde(default = "default_calendar_command")]
    pub command: String,
    #[serde(default = "default_calendar_args")]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default = "default_calendar_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct DeskConfig {
    /// Keyword looked for in messages, e.g. "techdesk"
    pub keyword: String,
    pub calendar_id: String,
    /// Phrase used in replies, e.g. "at the tech desk"
    pub label: String,
    /// Noise removed from the occupant text, e.g. " (e-classroom shift)"
    #[serde(default)]
    pub strip_suffix: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReminderConfig {
    /// Local time of day, "HH:MM" or "HH:MM:SS"
    pub time: String,
    #[serde(default = "default_weekdays")]
    pub weekdays: Vec<String>,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    pub message: String,
    /// Desk keyword whose occupant is reminded; defaults to the first desk
    #[serde(default)]
    pub desk: Option<String>,
}

fn default_bot_name() -> String {
    "shiftbot".to_string()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("shiftbot.db")
}

fn default_store_config() -> StoreConfig {
    StoreConfig {
        database_path: default_db_path(),
    }
}

fn default_calendar_command() -> String {
    "node".to_string()
}

fn default_calendar_args() -> Vec<String> {
    vec!["./lib/list_events.js".to_string()]
}

fn default_calendar_timeout() -> u64 {
    30
}

fn default_calendar_config() -> CalendarConfig {
    CalendarConfig {
        command: default_calendar_command(),
        args: default_calendar_args(),
        env: HashMap::new(),
        timeout_secs: default_calendar_timeout(),
    }
}

fn default_weekdays() -> Vec<String> {
    ["mon", "tue", "wed", "thu", "fri"]
        .iter()
        .map(|d| d.to_string())
        .collect()
}

fn default_timezone() -> String {
    "America/New_York".to_string()
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let mut config = Self::from_toml_str(&content)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config file")
    }

    /// Deployment environment wins over the file for secrets and paths
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup("BOT_API_KEY") {
            self.slack.bot_token = token;
        }
        if let Some(token) = lookup("SLACK_APP_TOKEN") {
            self.slack.app_token = token;
        }
        if let Some(path) = lookup("BOT_DB_PATH") {
            self.store.database_path = PathBuf::from(path);
        }
        if let Some(name) = lookup("BOT_NAME") {
            self.bot.name = name;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.bot.name.trim().is_empty() {
            anyhow::bail!("bot.name must not be empty");
        }
        if self.bot.mode == BotMode::Desk && self.desks.is_empty() {
            anyhow::bail!("desk mode needs at least one [[desks]] entry");
        }
        for desk in &self.desks {
            if desk.keyword.trim().is_empty() {
                anyhow::bail!("desk keyword must not be empty (calendar {})", desk.calendar_id);
            }
        }
        self.reminder_triggers()?;
        Ok(())
    }

    /// Find a desk by keyword, case-insensitively
    pub fn desk(&self, keyword: &str) -> Option<&DeskConfig> {
        self.desks
            .iter()
            .find(|d| d.keyword.eq_ignore_ascii_case(keyword))
    }

    /// Parse every [[reminders]] entry into a schedulable trigger
    pub fn reminder_triggers(&self) -> Result<Vec<ReminderTrigger>> {
        self.reminders
            .iter()
            .enumerate()
            .map(|(index, reminder)| {
                let desk = match &reminder.desk {
                    Some(keyword) => self.desk(keyword).with_context(|| {
                        format!("reminder #{} refers to unknown desk '{}'", index + 1, keyword)
                    })?,
                    None => self.desks.first().with_context(|| {
                        format!("reminder #{} needs a desk but none are configured", index + 1)
                    })?,
                };
                ReminderTrigger::from_config(index, reminder, desk)
                    .with_context(|| format!("Invalid reminder #{}", index + 1))
            })
            .collect()
    }
}
