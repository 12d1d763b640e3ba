pub mod slack;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Kind of notification delivered by the chat platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// A plain chat message
    Message,
    /// Anything else (joins, edits, mentions, presence, ...)
    Other,
}

/// One inbound notification from the chat platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    pub kind: EventKind,
    /// The message text, if the event carries one
    pub text: Option<String>,
    /// Platform-specific channel/conversation ID
    pub channel_id: String,
    /// Platform-specific ID of the sender
    pub author_id: String,
}

#[cfg(test)]
impl InboundEvent {
    pub fn message(channel_id: &str, author_id: &str, text: &str) -> Self {
        Self {
            kind: EventKind::Message,
            text: Some(text.to_string()),
            channel_id: channel_id.to_string(),
            author_id: author_id.to_string(),
        }
    }
}

/// A workspace member as listed by the platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub name: String,
}

/// A channel as listed by the platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub id: String,
    pub name: String,
}

/// Users and channels visible to the bot at connect time
#[derive(Debug, Clone, Default)]
pub struct WorkspaceSnapshot {
    pub users: Vec<User>,
    pub channels: Vec<Channel>,
}

/// Where an outbound message goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostTarget {
    /// A channel, addressed by name
    Channel(String),
    /// A direct message to a user, addressed by user ID
    User(String),
}

/// How the platform should render an outbound message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    Default,
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostOptions {
    pub as_user: bool,
    pub link_names: bool,
    pub parse: ParseMode,
}

impl PostOptions {
    /// Plain reply posted as the bot user
    pub fn reply() -> Self {
        Self {
            as_user: true,
            link_names: false,
            parse: ParseMode::Default,
        }
    }

    /// Reminder posts resolve @-names so the person at the desk gets pinged
    pub fn reminder() -> Self {
        Self {
            as_user: true,
            link_names: true,
            parse: ParseMode::Full,
        }
    }
}

/// Capabilities the bot needs from a chat platform
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Connect, start pumping inbound events into `events`, and return the
    /// workspace snapshot used for identity and channel resolution.
    async fn connect(&self, events: mpsc::Sender<InboundEvent>) -> Result<WorkspaceSnapshot>;

    /// Post a message to a channel or user
    async fn post(&self, target: &PostTarget, text: &str, options: PostOptions) -> Result<()>;
}

#[cfg(test)]
pub mod fake {
    use super::*;
    use tokio::sync::Mutex;

    /// Records every post instead of sending it anywhere; keeps the event
    /// sender from `connect` so tests can push inbound events.
    #[derive(Default)]
    pub struct FakePlatform {
        pub snapshot: WorkspaceSnapshot,
        pub posts: Mutex<Vec<(PostTarget, String, PostOptions)>>,
        pub fail_posts: bool,
        pub events: Mutex<Option<mpsc::Sender<InboundEvent>>>,
    }

    impl FakePlatform {
        pub fn new(snapshot: WorkspaceSnapshot) -> Self {
            Self {
                snapshot,
                ..Default::default()
            }
        }

        pub async fn posted(&self) -> Vec<(PostTarget, String, PostOptions)> {
            self.posts.lock().await.clone()
        }

        /// Event sender handed over by the last `connect`
        pub async fn sender(&self) -> Option<mpsc::Sender<InboundEvent>> {
            self.events.lock().await.clone()
        }

        /// Drop the event sender, closing the runtime's chat stream
        pub async fn disconnect(&self) {
            self.events.lock().await.take();
        }
    }

    #[async_trait]
    impl ChatPlatform for FakePlatform {
        async fn connect(&self, events: mpsc::Sender<InboundEvent>) -> Result<WorkspaceSnapshot> {
            *self.events.lock().await = Some(events);
            Ok(self.snapshot.clone())
        }

        async fn post(&self, target: &PostTarget, text: &str, options: PostOptions) -> Result<()> {
            if self.fail_posts {
                anyhow::bail!("post rejected");
            }
            self.posts
                .lock()
                .await
                .push((target.clone(), text.to_string(), options));
            Ok(())
        }
    }
}
