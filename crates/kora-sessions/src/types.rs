use kora_core::ChatId;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SessionError};

/// Structured session key: one conversation per chat per transport.
///
/// Wire format: `<transport>:<chat_id>`, e.g. `telegram:42`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub transport: String,
    pub chat_id: ChatId,
}

impl SessionKey {
    pub fn new(transport: impl Into<String>, chat_id: ChatId) -> Self {
        Self {
            transport: transport.into(),
            chat_id,
        }
    }

    /// Canonical wire-format string.
    pub fn format(&self) -> String {
        format!("{}:{}", self.transport, self.chat_id)
    }

    /// Parse a wire-format key back into its parts. The chat id is the
    /// final `:`-separated segment, so transport names may contain colons.
    pub fn parse(s: &str) -> Result<Self> {
        let (transport, chat) = s
            .rsplit_once(':')
            .ok_or_else(|| SessionError::InvalidKey(s.to_string()))?;
        if transport.is_empty() {
            return Err(SessionError::InvalidKey(s.to_string()));
        }
        let chat_id: ChatId = chat
            .parse()
            .map_err(|_| SessionError::InvalidKey(s.to_string()))?;
        Ok(Self {
            transport: transport.to_string(),
            chat_id,
        })
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.format())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

impl std::fmt::Display for TurnRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

impl std::str::FromStr for TurnRole {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            other => Err(format!("unknown turn role: {other}")),
        }
    }
}

/// One entry in the rolling session window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    pub text: String,
    /// Short per-tool summaries from this turn, e.g. `"save_note(meal_plan)"`.
    pub tool_trace: Vec<String>,
    /// ISO-8601 UTC.
    pub at: String,
}

impl Turn {
    pub fn now(role: TurnRole, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            tool_trace: Vec::new(),
            at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_roundtrip() {
        let key = SessionKey::new("telegram", 42);
        assert_eq!(key.format(), "telegram:42");
        assert_eq!(SessionKey::parse("telegram:42").unwrap(), key);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(SessionKey::parse("telegram").is_err());
        assert!(SessionKey::parse(":42").is_err());
        assert!(SessionKey::parse("telegram:abc").is_err());
    }

    #[test]
    fn negative_chat_ids_survive() {
        // Telegram group chats are negative.
        let key = SessionKey::parse("telegram:-100123").unwrap();
        assert_eq!(key.chat_id, -100123);
    }
}
