use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::calendar::{CalendarAdapter, CalendarStatus};
use crate::classifier::{Classification, MessageClassifier};
use crate::config::Config;
use crate::directory::{BotIdentity, ChannelDirectory};
use crate::handler::{clean_occupant, ActionHandler, EMPTY_DESK_REPLY, STATUS_UNAVAILABLE_REPLY};
use crate::platform::{ChatPlatform, InboundEvent, PostOptions, PostTarget, WorkspaceSnapshot};
use crate::scheduler::reminders::{register_reminders, ReminderTrigger};
use crate::scheduler::Scheduler;
use crate::store::Store;

const EVENT_BUFFER: usize = 256;

/// Who the bot is and which channels it can see, fixed at connect time
#[derive(Debug, Clone)]
pub struct Session {
    pub identity: BotIdentity,
    pub directory: ChannelDirectory,
}

/// Composes classification, the action handler, reminders and posting
/// around a chat platform.
pub struct BotRuntime {
    config: Arc<Config>,
    platform: Arc<dyn ChatPlatform>,
    calendar: Arc<dyn CalendarAdapter>,
    store: Store,
    handler: Arc<dyn ActionHandler>,
    classifier: MessageClassifier,
}

impl BotRuntime {
    pub fn new(
        config: Arc<Config>,
        platform: Arc<dyn ChatPlatform>,
        calendar: Arc<dyn CalendarAdapter>,
        store: Store,
        handler: Arc<dyn ActionHandler>,
    ) -> Self {
        let classifier = MessageClassifier::new(&config.bot.name, &config.bot.trigger_phrases);
        Self {
            config,
            platform,
            calendar,
            store,
            handler,
            classifier,
        }
    }

    /// Connect, bootstrap, register reminders and process events until the
    /// platform stops delivering them.
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let triggers = self.config.reminder_triggers()?;

        let (chat_tx, chat_rx) = mpsc::channel::<InboundEvent>(EVENT_BUFFER);
        let snapshot = self
            .platform
            .connect(chat_tx)
            .await
            .context("Failed to connect to chat platform")?;
        let session = Arc::new(self.startup(snapshot).await?);

        let (reminder_tx, reminder_rx) = mpsc::channel::<Arc<ReminderTrigger>>(EVENT_BUFFER);
        let mut scheduler = Scheduler::new().await?;
        register_reminders(&scheduler, triggers, reminder_tx).await?;
        scheduler.start().await?;

        info!("Bot is running as {} ({})", session.identity.name, session.identity.id);
        self.dispatch(session, chat_rx, reminder_rx).await;

        warn!("Chat platform event stream ended");
        scheduler.shutdown().await?;
        Ok(())
    }

    /// Hand each chat event and due reminder to its own task, so slow
    /// calendar calls never hold up the next one. Returns once the chat
    /// stream closes; reminders alone do not keep the bot alive.
    async fn dispatch(
        self: &Arc<Self>,
        session: Arc<Session>,
        mut chat_rx: mpsc::Receiver<InboundEvent>,
        mut reminder_rx: mpsc::Receiver<Arc<ReminderTrigger>>,
    ) {
        loop {
            tokio::select! {
                event = chat_rx.recv() => {
                    let Some(event) = event else { break };
                    let runtime = self.clone();
                    let session = session.clone();
                    tokio::spawn(async move {
                        runtime.handle_event(&session, event).await;
                    });
                }
                Some(trigger) = reminder_rx.recv() => {
                    let runtime = self.clone();
                    tokio::spawn(async move {
                        runtime.fire_reminder(&trigger).await;
                    });
                }
            }
        }
    }

    /// Resolve the bot's identity and do first-run bookkeeping
    pub async fn startup(&self, snapshot: WorkspaceSnapshot) -> Result<Session> {
        let identity = BotIdentity::resolve(&snapshot.users, &self.config.bot.name)?;
        let directory = ChannelDirectory::new(snapshot.channels);
        info!(
            "Resolved bot user {} ({}), {} channels visible",
            identity.name,
            identity.id,
            directory.len()
        );

        self.first_run_check().await;
        Ok(Session {
            identity,
            directory,
        })
    }

    /// Greet once on a fresh store, then stamp the run time on every start
    async fn first_run_check(&self) {
        let previous = match self.store.last_run().await {
            Ok(previous) => previous,
            Err(e) => {
                error!("Failed to read last run: {:#}", e);
                return;
            }
        };

        match &previous {
            None => {
                info!("First run, sending welcome message");
                let target = match &self.config.bot.welcome_target {
                    Some(user) => PostTarget::User(user.clone()),
                    None => PostTarget::Channel(self.config.bot.channel.clone()),
                };
                self.post(&target, &self.handler.welcome_text(), PostOptions::reply())
                    .await;
            }
            Some(last) => debug!("Previous run at {}", last),
        }

        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        if let Err(e) = self.store.record_run(&now).await {
            error!("Failed to record run time: {:#}", e);
        }
    }

    /// Classify one inbound event and reply if it is addressed to the bot
    pub async fn handle_event(&self, session: &Session, event: InboundEvent) {
        let message = match self.classifier.classify(&event, &session.identity) {
            Classification::Actionable(message) => message,
            Classification::Ignored(reason) => {
                debug!("Ignoring event in {}: {:?}", event.channel_id, reason);
                return;
            }
        };

        info!("Message from {} in {}: {}", message.author_id, message.channel_id, message.text);

        let Some(reply) = self.handler.handle(&message).await else {
            return;
        };

        let channel = session.directory.name_or_id(&message.channel_id).to_string();
        self.post(&PostTarget::Channel(channel), &reply, PostOptions::reply())
            .await;
    }

    /// Look up who is at the reminder's desk and post "<occupant>, <message>"
    pub async fn fire_reminder(&self, trigger: &ReminderTrigger) {
        let occupant = match self.calendar.query(&trigger.desk.calendar_id).await {
            Ok(CalendarStatus::Occupied(occupant)) => clean_occupant(&trigger.desk, &occupant),
            Ok(CalendarStatus::Vacant) => EMPTY_DESK_REPLY.to_string(),
            Err(e) => {
                error!("Calendar query for reminder '{}' failed: {}", trigger.name, e);
                STATUS_UNAVAILABLE_REPLY.to_string()
            }
        };

        let text = format!("{}, {}", occupant, trigger.message);
        let target = PostTarget::Channel(self.config.bot.channel.clone());
        self.post(&target, &text, PostOptions::reminder()).await;
    }

    async fn post(&self, target: &PostTarget, text: &str, options: PostOptions) {
        if let Err(e) = self.platform.post(target, text, options).await {
            error!("Failed to post to {:?}: {:#}", target, e);
        }
    }
}
