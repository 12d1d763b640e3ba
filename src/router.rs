use crate::config::DeskConfig;

/// What an actionable message asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route<'a> {
    DeskQuery(&'a DeskConfig),
    Unrecognized,
}

/// Maps message text onto a desk by keyword, in configured priority order
#[derive(Debug, Clone)]
pub struct CommandRouter {
    bot_name: String,
    desks: Vec<DeskConfig>,
}

impl CommandRouter {
    pub fn new(bot_name: &str, desks: Vec<DeskConfig>) -> Self {
        Self {
            bot_name: bot_name.to_string(),
            desks,
        }
    }

    /// First desk whose keyword occurs in the text wins
    pub fn route(&self, text: &str) -> Route<'_> {
        let lowered = text.to_lowercase();
        self.desks
            .iter()
            .find(|desk| lowered.contains(&desk.keyword.to_lowercase()))
            .map(Route::DeskQuery)
            .unwrap_or(Route::Unrecognized)
    }

    /// Reply for text that names no desk
    pub fn usage_hint(&self) -> String {
        let examples = self
            .desks
            .iter()
            .map(|desk| format!("'{} {}'", self.bot_name, desk.keyword))
            .collect::<Vec<_>>()
            .join(" or ");
        format!("Try {}", examples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desks() -> Vec<DeskConfig> {
        vec![
            DeskConfig {
                keyword: "techdesk".to_string(),
                calendar_id: "tech@group.calendar.google.com".to_string(),
                label: "at the tech desk".to_string(),
                strip_suffix: None,
            },
            DeskConfig {
                keyword: "eclassroom".to_string(),
                calendar_id: "eclass@group.calendar.google.com".to_string(),
                label: "in the E-classroom".to_string(),
                strip_suffix: Some(" (e-classroom shift)".to_string()),
            },
        ]
    }

    #[test]
    fn test_priority_order_resolves_ambiguity() {
        let router = CommandRouter::new("shiftbot", desks());
        match router.route("please check techdesk and eclassroom") {
            Route::DeskQuery(desk) => {
                assert_eq!(desk.calendar_id, "tech@group.calendar.google.com")
            }
            Route::Unrecognized => panic!("expected a desk"),
        }
        match router.route("eclassroom, then techdesk") {
            Route::DeskQuery(desk) => assert_eq!(desk.keyword, "techdesk"),
            Route::Unrecognized => panic!("expected a desk"),
        }
    }

    #[test]
    fn test_keywords_match_case_insensitively() {
        let router = CommandRouter::new("shiftbot", desks());
        match router.route("Shiftbot ECLASSROOM") {
            Route::DeskQuery(desk) => assert_eq!(desk.keyword, "eclassroom"),
            Route::Unrecognized => panic!("expected a desk"),
        }
    }

    #[test]
    fn test_unrecognized_and_usage_hint() {
        let router = CommandRouter::new("shiftbot", desks());
        assert_eq!(router.route("hello"), Route::Unrecognized);
        assert_eq!(
            router.usage_hint(),
            "Try 'shiftbot techdesk' or 'shiftbot eclassroom'"
        );
    }
}
