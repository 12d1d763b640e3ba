use std::collections::HashMap;

use anyhow::Result;

use crate::platform::{Channel, User};

/// The bot's own workspace account, used to ignore its own messages
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotIdentity {
    pub id: String,
    pub name: String,
}

impl BotIdentity {
    /// Find the bot among the workspace users by its configured name.
    /// Anything but exactly one match is a configuration error.
    pub fn resolve(users: &[User], name: &str) -> Result<Self> {
        let mut matches = users.iter().filter(|u| u.name == name);
        let Some(user) = matches.next() else {
            anyhow::bail!("no workspace user named '{}'; check bot.name", name);
        };
        if matches.next().is_some() {
            anyhow::bail!("several workspace users are named '{}'; bot.name is ambiguous", name);
        }
        Ok(Self {
            id: user.id.clone(),
            name: user.name.clone(),
        })
    }
}

/// Channel lookup by ID over the snapshot taken at connect time
#[derive(Debug, Clone, Default)]
pub struct ChannelDirectory {
    by_id: HashMap<String, Channel>,
}

impl ChannelDirectory {
    pub fn new(channels: Vec<Channel>) -> Self {
        Self {
            by_id: channels.into_iter().map(|c| (c.id.clone(), c)).collect(),
        }
    }

    pub fn get(&self, id: &str) -> Option<&Channel> {
        self.by_id.get(id)
    }

    /// Channel name for posting, falling back to the raw ID when unknown
    pub fn name_or_id<'a>(&'a self, id: &'a str) -> &'a str {
        self.get(id).map(|c| c.name.as_str()).unwrap_or(id)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }
}
