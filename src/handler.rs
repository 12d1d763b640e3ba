use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::calendar::{CalendarAdapter, CalendarStatus};
use crate::classifier::ActionableMessage;
use crate::config::DeskConfig;
use crate::router::{CommandRouter, Route};
use crate::store::Store;

pub const EMPTY_DESK_REPLY: &str = "No student at the desk currently";
pub const STATUS_UNAVAILABLE_REPLY: &str = "Desk status is currently unavailable";

/// What the bot does with a message addressed to it
#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// Reply text, or `None` to stay silent
    async fn handle(&self, message: &ActionableMessage) -> Option<String>;

    /// Posted once, the first time the bot runs against a store
    fn welcome_text(&self) -> String;
}

/// Occupant text with the desk's noise suffix removed
pub fn clean_occupant(desk: &DeskConfig, occupant: &str) -> String {
    match &desk.strip_suffix {
        Some(suffix) if !suffix.is_empty() => occupant.replace(suffix.as_str(), ""),
        _ => occupant.to_string(),
    }
}

pub fn format_desk_reply(desk: &DeskConfig, status: &CalendarStatus) -> String {
    match status {
        CalendarStatus::Vacant => EMPTY_DESK_REPLY.to_string(),
        CalendarStatus::Occupied(occupant) => format!(
            "The student currently {} is {}",
            desk.label,
            clean_occupant(desk, occupant)
        ),
    }
}

/// Answers "who is at the desk" from the desk's calendar
pub struct DeskQueryHandler {
    router: CommandRouter,
    calendar: Arc<dyn CalendarAdapter>,
}

impl DeskQueryHandler {
    pub fn new(router: CommandRouter, calendar: Arc<dyn CalendarAdapter>) -> Self {
        Self { router, calendar }
    }
}

#[async_trait]
impl ActionHandler for DeskQueryHandler {
    async fn handle(&self, message: &ActionableMessage) -> Option<String> {
        let desk = match self.router.route(&message.text) {
            Route::DeskQuery(desk) => desk,
            Route::Unrecognized => return Some(self.router.usage_hint()),
        };

        info!("Desk query for {} from {}", desk.keyword, message.author_id);
        match self.calendar.query(&desk.calendar_id).await {
            Ok(status) => Some(format_desk_reply(desk, &status)),
            Err(e) => {
                error!("Calendar query for {} failed: {}", desk.keyword, e);
                Some(STATUS_UNAVAILABLE_REPLY.to_string())
            }
        }
    }

    fn welcome_text(&self) -> String {
        format!(
            "Hi! I can tell you who is at the desk. {}",
            self.router.usage_hint()
        )
    }
}

/// Replies with the least-told joke from the corpus
pub struct JokeHandler {
    store: Store,
    invocations: Vec<String>,
}

impl JokeHandler {
    pub fn new(store: Store, bot_name: &str, trigger_phrases: &[String]) -> Self {
        let invocations = trigger_phrases
            .iter()
            .cloned()
            .chain(std::iter::once(bot_name.to_string()))
            .collect();
        Self { store, invocations }
    }
}

#[async_trait]
impl ActionHandler for JokeHandler {
    async fn handle(&self, message: &ActionableMessage) -> Option<String> {
        match self.store.pick_joke().await {
            Ok(Some(joke)) => {
                info!(
                    "Telling joke #{} (used {} times) to {}",
                    joke.id, joke.used_count, message.author_id
                );
                Some(joke.text)
            }
            Ok(None) => {
                warn!("Joke corpus is empty, not replying");
                None
            }
            Err(e) => {
                error!("Failed to pick a joke: {:#}", e);
                None
            }
        }
    }

    fn welcome_text(&self) -> String {
        let phrases = self
            .invocations
            .iter()
            .map(|p| format!("`{}`", p))
            .collect::<Vec<_>>()
            .join(" or ");
        format!(
            "Hi guys, roundhouse-kick anyone?\n I can tell jokes, but very honest ones. Just say {} to invoke me!",
            phrases
        )
    }
}
