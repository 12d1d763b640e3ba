use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, error, info, warn};

use crate::config::SlackConfig;
use crate::platform::{
    Channel, ChatPlatform, EventKind, InboundEvent, ParseMode, PostOptions, PostTarget, User,
    WorkspaceSnapshot,
};

const SLACK_API_BASE: &str = "https://slack.com/api";

/// Page size for users.list / conversations.list
const PAGE_LIMIT: &str = "200";

/// Upper bound on pages fetched per listing (200 * 50 = 10,000 entries)
const MAX_PAGES: usize = 50;

const RECONNECT_DELAY_SECS: u64 = 5;

/// Socket Mode envelope as sent by Slack
#[derive(Debug, Deserialize)]
struct SocketEnvelope {
    #[serde(default)]
    envelope_id: Option<String>,
    #[serde(rename = "type")]
    envelope_type: String,
    #[serde(default)]
    payload: Value,
}

/// Slack client: Web API for listings and posting, Socket Mode for events
#[derive(Clone)]
pub struct SlackPlatform {
    http: reqwest::Client,
    bot_token: String,
    app_token: String,
}

impl SlackPlatform {
    pub fn new(config: &SlackConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            bot_token: config.bot_token.clone(),
            app_token: config.app_token.clone(),
        }
    }

    /// GET a Web API method with the bot token and check the `ok` flag
    async fn api_get(&self, method: &str, query: &[(&str, &str)]) -> Result<Value> {
        let body: Value = self
            .http
            .get(format!("{}/{}", SLACK_API_BASE, method))
            .bearer_auth(&self.bot_token)
            .query(query)
            .send()
            .await
            .with_context(|| format!("Slack {} request failed", method))?
            .json()
            .await
            .with_context(|| format!("Slack {} returned invalid JSON", method))?;
        check_ok(method, body)
    }

    /// Walk a cursor-paginated listing, collecting `field` from every page
    async fn list_paged(
        &self,
        method: &str,
        field: &str,
        extra: &[(&str, &str)],
    ) -> Result<Vec<Value>> {
        let mut items = Vec::new();
        let mut cursor = String::new();

        for _ in 0..MAX_PAGES {
            let mut query: Vec<(&str, &str)> = vec![("limit", PAGE_LIMIT)];
            query.extend_from_slice(extra);
            if !cursor.is_empty() {
                query.push(("cursor", cursor.as_str()));
            }

            let body = self.api_get(method, &query).await?;
            if let Some(page) = body[field].as_array() {
                items.extend(page.iter().cloned());
            }

            cursor = body["response_metadata"]["next_cursor"]
                .as_str()
                .unwrap_or_default()
                .to_string();
            if cursor.is_empty() {
                return Ok(items);
            }
        }

        warn!("Slack {} reached the page limit; listing may be incomplete", method);
        Ok(items)
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        let members = self.list_paged("users.list", "members", &[]).await?;
        Ok(members
            .iter()
            .filter_map(parse_named_entry)
            .map(|(id, name)| User { id, name })
            .collect())
    }

    async fn list_channels(&self) -> Result<Vec<Channel>> {
        let channels = self
            .list_paged(
                "conversations.list",
                "channels",
                &[("types", "public_channel,private_channel")],
            )
            .await?;
        Ok(channels
            .iter()
            .filter_map(parse_named_entry)
            .map(|(id, name)| Channel { id, name })
            .collect())
    }

    /// Ask for a Socket Mode websocket URL (needs the app-level token)
    async fn open_socket_url(&self) -> Result<String> {
        let body: Value = self
            .http
            .post(format!("{}/apps.connections.open", SLACK_API_BASE))
            .bearer_auth(&self.app_token)
            .send()
            .await
            .context("Slack apps.connections.open request failed")?
            .json()
            .await
            .context("Slack apps.connections.open returned invalid JSON")?;
        let body = check_ok("apps.connections.open", body)?;

        body["url"]
            .as_str()
            .map(str::to_string)
            .context("Slack apps.connections.open returned no URL")
    }

    /// Keep a Socket Mode session alive, reconnecting until the event
    /// receiver goes away.
    async fn run_socket_loop(self, events: mpsc::Sender<InboundEvent>) {
        let mut attempts: u64 = 0;

        loop {
            if attempts > 0 {
                let delay = Duration::from_secs(RECONNECT_DELAY_SECS * attempts.min(6));
                info!("Reconnecting to Slack in {}s (attempt {})", delay.as_secs(), attempts);
                tokio::time::sleep(delay).await;
            }

            match self.run_socket_session(&events).await {
                Ok(SessionEnd::ReceiverClosed) => {
                    info!("Event receiver closed, stopping Slack socket loop");
                    return;
                }
                Ok(SessionEnd::Disconnected) => {
                    attempts = 1;
                }
                Err(e) => {
                    error!("Slack socket session failed: {:#}", e);
                    attempts += 1;
                }
            }
        }
    }

    async fn run_socket_session(&self, events: &mpsc::Sender<InboundEvent>) -> Result<SessionEnd> {
        let url = self.open_socket_url().await?;
        let (stream, _) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .context("Slack websocket connect failed")?;
        info!("Connected to Slack Socket Mode");

        let (mut write, mut read) = stream.split();

        while let Some(frame) = read.next().await {
            let frame = frame.context("Slack websocket read failed")?;
            let text = match frame {
                WsMessage::Text(text) => text,
                WsMessage::Ping(payload) => {
                    write.send(WsMessage::Pong(payload)).await.ok();
                    continue;
                }
                WsMessage::Close(_) => return Ok(SessionEnd::Disconnected),
                _ => continue,
            };

            let envelope: SocketEnvelope = match serde_json::from_str(text.as_str()) {
                Ok(envelope) => envelope,
                Err(e) => {
                    warn!("Unparseable Socket Mode frame: {}", e);
                    continue;
                }
            };

            // Slack redelivers anything not acknowledged promptly
            if let Some(id) = &envelope.envelope_id {
                let ack = json!({ "envelope_id": id }).to_string();
                write
                    .send(WsMessage::Text(ack.into()))
                    .await
                    .context("Failed to acknowledge Socket Mode envelope")?;
            }

            match envelope.envelope_type.as_str() {
                "hello" => debug!("Socket Mode session ready"),
                "disconnect" => {
                    info!("Slack requested reconnect");
                    return Ok(SessionEnd::Disconnected);
                }
                "events_api" => {
                    if let Some(event) = parse_socket_event(&envelope.payload) {
                        if events.send(event).await.is_err() {
                            return Ok(SessionEnd::ReceiverClosed);
                        }
                    }
                }
                other => debug!("Ignoring Socket Mode envelope type {}", other),
            }
        }

        Ok(SessionEnd::Disconnected)
    }
}

enum SessionEnd {
    Disconnected,
    ReceiverClosed,
}

fn check_ok(method: &str, body: Value) -> Result<Value> {
    if body["ok"].as_bool() != Some(true) {
        let err = body["error"].as_str().unwrap_or("unknown");
        anyhow::bail!("Slack {} failed: {}", method, err);
    }
    Ok(body)
}

fn parse_named_entry(entry: &Value) -> Option<(String, String)> {
    let id = entry["id"].as_str()?;
    let name = entry["name"].as_str()?;
    Some((id.to_string(), name.to_string()))
}

/// Turn an `events_api` payload into an inbound event.
///
/// Plain messages (no subtype) become `EventKind::Message`; edits, joins,
/// bot messages and `app_mention` duplicates are passed on as `Other` so the
/// classifier drops them.
fn parse_socket_event(payload: &Value) -> Option<InboundEvent> {
    let event = payload.get("event")?;
    let event_type = event["type"].as_str()?;

    let kind = if event_type == "message" && event.get("subtype").is_none() {
        EventKind::Message
    } else {
        EventKind::Other
    };

    Some(InboundEvent {
        kind,
        text: event["text"].as_str().map(str::to_string),
        channel_id: event["channel"].as_str().unwrap_or_default().to_string(),
        author_id: event["user"].as_str().unwrap_or_default().to_string(),
    })
}

fn post_body(target: &PostTarget, text: &str, options: PostOptions) -> Value {
    let channel = match target {
        PostTarget::Channel(name) => name.as_str(),
        PostTarget::User(id) => id.as_str(),
    };

    let mut body = json!({
        "channel": channel,
        "text": text,
        "as_user": options.as_user,
        "link_names": options.link_names,
    });
    if options.parse == ParseMode::Full {
        body["parse"] = json!("full");
    }
    body
}

#[async_trait]
impl ChatPlatform for SlackPlatform {
    async fn connect(&self, events: mpsc::Sender<InboundEvent>) -> Result<WorkspaceSnapshot> {
        info!("Starting Slack platform...");

        let users = self.list_users().await.context("Failed to list Slack users")?;
        let channels = self
            .list_channels()
            .await
            .context("Failed to list Slack channels")?;
        info!(
            "Slack workspace snapshot: {} users, {} channels",
            users.len(),
            channels.len()
        );

        tokio::spawn(self.clone().run_socket_loop(events));

        Ok(WorkspaceSnapshot { users, channels })
    }

    async fn post(&self, target: &PostTarget, text: &str, options: PostOptions) -> Result<()> {
        let body: Value = self
            .http
            .post(format!("{}/chat.postMessage", SLACK_API_BASE))
            .bearer_auth(&self.bot_token)
            .json(&post_body(target, text, options))
            .send()
            .await
            .context("Slack chat.postMessage request failed")?
            .json()
            .await
            .context("Slack chat.postMessage returned invalid JSON")?;
        check_ok("chat.postMessage", body)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_message_event() {
        let payload = json!({
            "event": {
                "type": "message",
                "channel": "C024BE91L",
                "user": "U2147483697",
                "text": "shiftbot techdesk",
                "ts": "1355517523.000005"
            }
        });
        let event = parse_socket_event(&payload).unwrap();
        assert_eq!(
            event,
            InboundEvent::message("C024BE91L", "U2147483697", "shiftbot techdesk")
        );
    }

    #[test]
    fn test_subtyped_message_is_other() {
        let payload = json!({
            "event": {
                "type": "message",
                "subtype": "message_changed",
                "channel": "C024BE91L",
                "text": "edited"
            }
        });
        let event = parse_socket_event(&payload).unwrap();
        assert_eq!(event.kind, EventKind::Other);
        assert_eq!(event.author_id, "");
    }

    #[test]
    fn test_app_mention_is_other() {
        let payload = json!({
            "event": {
                "type": "app_mention",
                "channel": "C1",
                "user": "U1",
                "text": "<@UBOT> techdesk"
            }
        });
        assert_eq!(parse_socket_event(&payload).unwrap().kind, EventKind::Other);
    }

    #[test]
    fn test_payload_without_event() {
        assert!(parse_socket_event(&json!({ "type": "event_callback" })).is_none());
    }

    #[test]
    fn test_reminder_post_body() {
        let body = post_body(
            &PostTarget::Channel("shiftbot_beta".into()),
            "@jane, check eclassroom",
            PostOptions::reminder(),
        );
        assert_eq!(body["channel"], "shiftbot_beta");
        assert_eq!(body["link_names"], true);
        assert_eq!(body["as_user"], true);
        assert_eq!(body["parse"], "full");
    }

    #[test]
    fn test_reply_post_body_has_default_parse() {
        let body = post_body(&PostTarget::User("U42".into()), "hi", PostOptions::reply());
        assert_eq!(body["channel"], "U42");
        assert!(body.get("parse").is_none());
    }

    #[test]
    fn test_check_ok_reports_slack_error() {
        let err = check_ok("chat.postMessage", json!({ "ok": false, "error": "channel_not_found" }))
            .unwrap_err();
        assert!(err.to_string().contains("channel_not_found"));
    }

    #[test]
    fn test_parse_named_entry_requires_name() {
        assert_eq!(
            parse_named_entry(&json!({ "id": "U1", "name": "shiftbot" })),
            Some(("U1".to_string(), "shiftbot".to_string()))
        );
        assert_eq!(parse_named_entry(&json!({ "id": "U1" })), None);
    }
}
