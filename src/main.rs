mod calendar;
mod classifier;
mod config;
mod directory;
mod handler;
mod platform;
mod router;
mod runtime;
mod scheduler;
mod store;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::calendar::{CalendarAdapter, CommandCalendarAdapter};
use crate::config::{BotMode, Config};
use crate::handler::{ActionHandler, DeskQueryHandler, JokeHandler};
use crate::platform::slack::SlackPlatform;
use crate::platform::ChatPlatform;
use crate::router::CommandRouter;
use crate::runtime::BotRuntime;
use crate::store::jokes::read_seed_file;
use crate::store::Store;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,shiftbot=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from: {}", config_path.display());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    info!("Configuration loaded successfully");
    info!("  Bot name: {}", config.bot.name);
    info!("  Mode: {}", config.bot.mode);
    info!("  Channel: {}", config.bot.channel);
    info!("  Desks: {}", config.desks.len());
    info!("  Reminders: {}", config.reminders.len());

    // Without the store there is nothing sensible to run
    let store = Store::open(&config.store.database_path).with_context(|| {
        format!(
            "Store unavailable at {}",
            config.store.database_path.display()
        )
    })?;

    if config.bot.mode == BotMode::Jokes {
        if let Some(seed_file) = &config.jokes.seed_file {
            let seed = read_seed_file(seed_file)?;
            let added = store.seed_jokes(&seed).await?;
            if added > 0 {
                info!("  Seeded {} jokes from {}", added, seed_file.display());
            }
        }
        let jokes = store.joke_count().await?;
        info!("  Jokes in corpus: {}", jokes);
    }

    let calendar: Arc<dyn CalendarAdapter> =
        Arc::new(CommandCalendarAdapter::new(&config.calendar));
    let handler: Arc<dyn ActionHandler> = match config.bot.mode {
        BotMode::Desk => Arc::new(DeskQueryHandler::new(
            CommandRouter::new(&config.bot.name, config.desks.clone()),
            calendar.clone(),
        )),
        BotMode::Jokes => Arc::new(JokeHandler::new(
            store.clone(),
            &config.bot.name,
            &config.bot.trigger_phrases,
        )),
    };
    let platform: Arc<dyn ChatPlatform> = Arc::new(SlackPlatform::new(&config.slack));

    let runtime = Arc::new(BotRuntime::new(
        Arc::new(config),
        platform,
        calendar,
        store,
        handler,
    ));

    info!("Bot is starting...");
    runtime.run().await?;

    Ok(())
}
