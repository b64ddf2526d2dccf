use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::KoraError;

pub type ChatId = i64;
pub type UserId = i64;
/// Small integer 1..14 referencing the fixed domain table.
pub type DomainId = i64;

/// Kind tag for an inbound media attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    Audio,
    Document,
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Image => write!(f, "image"),
            Self::Video => write!(f, "video"),
            Self::Audio => write!(f, "audio"),
            Self::Document => write!(f, "document"),
        }
    }
}

/// Media item delivered alongside an inbound message.
#[derive(Debug, Clone)]
pub struct MediaItem {
    pub kind: MediaKind,
    pub mime: String,
    pub bytes: Vec<u8>,
}

/// A message entering the agent loop from a chat transport.
///
/// `session_id` is always `"<transport>:<chat_id>"`; adapters build it when
/// they receive the raw event.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub chat_id: ChatId,
    pub user_id: UserId,
    pub session_id: String,
    pub text: String,
    pub media: Vec<MediaItem>,
}

/// Output of the per-message router: which domains to recall from and which
/// model tier to use for the reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteDecision {
    pub primary: Vec<DomainId>,
    pub related: Vec<DomainId>,
    /// e.g. `"fast"` or `"deep"`, resolved to a concrete model by config.
    pub model_tier: String,
    /// True when the message asks Kora to decide or commit to something.
    pub is_decision: bool,
}

impl RouteDecision {
    /// Fallback decision when routing fails: recall from Identity and
    /// Preferences with the fast tier.
    pub fn fallback() -> Self {
        Self {
            primary: vec![1, 11],
            related: Vec::new(),
            model_tier: "fast".to_string(),
            is_decision: false,
        }
    }
}

/// Outbound side of a chat transport.
///
/// Concrete adapters (Telegram, Discord, terminal) live outside the core;
/// the agent loop and tool registry only ever see this trait. Media sends
/// default to an error so text-only adapters stay two methods long.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Adapter name used as the session id prefix (e.g. `"telegram"`).
    fn name(&self) -> &str;

    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<(), KoraError>;

    async fn send_photo(
        &self,
        _chat_id: ChatId,
        _bytes: &[u8],
        _caption: &str,
    ) -> Result<(), KoraError> {
        Err(KoraError::Validation(format!(
            "{} transport does not support photos",
            self.name()
        )))
    }

    async fn send_video(
        &self,
        _chat_id: ChatId,
        _bytes: &[u8],
        _caption: &str,
    ) -> Result<(), KoraError> {
        Err(KoraError::Validation(format!(
            "{} transport does not support video",
            self.name()
        )))
    }

    async fn send_document(
        &self,
        _chat_id: ChatId,
        _bytes: &[u8],
        _filename: &str,
    ) -> Result<(), KoraError> {
        Err(KoraError::Validation(format!(
            "{} transport does not support documents",
            self.name()
        )))
    }

    /// Render an approve/deny prompt for a dangerous tool call. On user
    /// interaction the adapter calls `ApprovalManager::resolve` with the
    /// pressing user's id; the payload format is adapter-specific.
    async fn show_approval_prompt(
        &self,
        chat_id: ChatId,
        approval_id: &str,
        description: &str,
    ) -> Result<(), KoraError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_format() {
        let msg = InboundMessage {
            chat_id: 42,
            user_id: 7,
            session_id: format!("{}:{}", "telegram", 42),
            text: "hi".to_string(),
            media: Vec::new(),
        };
        assert_eq!(msg.session_id, "telegram:42");
    }

    #[test]
    fn fallback_route_targets_identity() {
        let r = RouteDecision::fallback();
        assert!(r.primary.contains(&1));
        assert!(!r.is_decision);
    }
}
