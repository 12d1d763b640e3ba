use crate::directory::BotIdentity;
use crate::platform::{EventKind, InboundEvent};

/// First character of channel IDs; DMs and group DMs use other prefixes
pub const CHANNEL_ID_MARKER: char = 'C';

/// A channel message addressed to the bot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionableMessage {
    pub channel_id: String,
    pub author_id: String,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    NotChatMessage,
    NotChannel,
    FromSelf,
    NotMentioned,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Actionable(ActionableMessage),
    Ignored(IgnoreReason),
}

/// Decides whether an inbound event deserves a reply
#[derive(Debug, Clone)]
pub struct MessageClassifier {
    /// Lower-cased bot name followed by any extra trigger phrases
    triggers: Vec<String>,
}

impl MessageClassifier {
    pub fn new(bot_name: &str, trigger_phrases: &[String]) -> Self {
        let triggers = std::iter::once(bot_name)
            .chain(trigger_phrases.iter().map(String::as_str))
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        Self { triggers }
    }

    pub fn classify(&self, event: &InboundEvent, identity: &BotIdentity) -> Classification {
        let text = match (&event.kind, event.text.as_deref()) {
            (EventKind::Message, Some(text)) if !text.is_empty() => text,
            _ => return Classification::Ignored(IgnoreReason::NotChatMessage),
        };

        if !event.channel_id.starts_with(CHANNEL_ID_MARKER) {
            return Classification::Ignored(IgnoreReason::NotChannel);
        }

        if event.author_id == identity.id {
            return Classification::Ignored(IgnoreReason::FromSelf);
        }

        let lowered = text.to_lowercase();
        if !self.triggers.iter().any(|t| lowered.contains(t.as_str())) {
            return Classification::Ignored(IgnoreReason::NotMentioned);
        }

        Classification::Actionable(ActionableMessage {
            channel_id: event.channel_id.clone(),
            author_id: event.author_id.clone(),
            text: text.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> BotIdentity {
        BotIdentity {
            id: "UBOT".to_string(),
            name: "shiftbot".to_string(),
        }
    }

    fn desk_classifier() -> MessageClassifier {
        MessageClassifier::new("shiftbot", &[])
    }

    fn joke_classifier() -> MessageClassifier {
        MessageClassifier::new("shiftbot", &["Chuck Norris".to_string()])
    }

    #[test]
    fn test_channel_mention_is_actionable() {
        let event = InboundEvent::message("C024BE91L", "U1", "Hey ShiftBot, techdesk?");
        assert_eq!(
            desk_classifier().classify(&event, &identity()),
            Classification::Actionable(ActionableMessage {
                channel_id: "C024BE91L".to_string(),
                author_id: "U1".to_string(),
                text: "Hey ShiftBot, techdesk?".to_string(),
            })
        );
    }

    #[test]
    fn test_own_messages_ignored_whatever_the_text() {
        let classifier = joke_classifier();
        for text in ["shiftbot techdesk", "chuck norris", "hello", "SHIFTBOT"] {
            let event = InboundEvent::message("C1", "UBOT", text);
            assert_eq!(
                classifier.classify(&event, &identity()),
                Classification::Ignored(IgnoreReason::FromSelf)
            );
        }
    }

    #[test]
    fn test_non_channel_ignored_even_with_mention() {
        let classifier = desk_classifier();
        for channel in ["D024BE91L", "G1", "", "c1"] {
            let event = InboundEvent::message(channel, "U1", "shiftbot techdesk");
            assert_eq!(
                classifier.classify(&event, &identity()),
                Classification::Ignored(IgnoreReason::NotChannel)
            );
        }
    }

    #[test]
    fn test_non_message_or_empty_text_ignored() {
        let classifier = desk_classifier();
        let mut event = InboundEvent::message("C1", "U1", "shiftbot");
        event.kind = EventKind::Other;
        assert_eq!(
            classifier.classify(&event, &identity()),
            Classification::Ignored(IgnoreReason::NotChatMessage)
        );

        let empty = InboundEvent::message("C1", "U1", "");
        assert_eq!(
            classifier.classify(&empty, &identity()),
            Classification::Ignored(IgnoreReason::NotChatMessage)
        );

        let mut missing = InboundEvent::message("C1", "U1", "x");
        missing.text = None;
        assert_eq!(
            classifier.classify(&missing, &identity()),
            Classification::Ignored(IgnoreReason::NotChatMessage)
        );
    }

    #[test]
    fn test_trigger_phrase_only_in_joke_variant() {
        let event = InboundEvent::message("C1", "U1", "what would CHUCK NORRIS do");
        assert!(matches!(
            joke_classifier().classify(&event, &identity()),
            Classification::Actionable(_)
        ));
        assert_eq!(
            desk_classifier().classify(&event, &identity()),
            Classification::Ignored(IgnoreReason::NotMentioned)
        );
    }
}
