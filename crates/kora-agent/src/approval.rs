//! Owner-locked confirmation gate for dangerous tools.
//!
//! One pending approval = one 1-buffered oneshot channel. `resolve` never
//! blocks; `wait` selects resolution vs caller cancellation vs the
//! per-manager timeout and cleans the entry up on return. Only the user who
//! triggered the tool call may resolve it — anyone else gets UserMismatch,
//! logged as security-relevant.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use kora_core::{ChatId, UserId};
use thiserror::Error;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ApprovalError {
    #[error("approval not found: {0}")]
    NotFound(String),

    #[error("approval already resolved: {0}")]
    AlreadyResolved(String),

    #[error("user {user} may not resolve approval owned by {requester}")]
    UserMismatch { user: UserId, requester: UserId },
}

/// Terminal state observed by `wait`. Exactly one occurs per approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalOutcome {
    Approved,
    Denied,
    TimedOut,
    Cancelled,
}

struct Pending {
    chat_id: ChatId,
    requester: UserId,
    tool: String,
    #[allow(dead_code)]
    args: serde_json::Value,
    description: String,
    created_at: std::time::Instant,
    /// Taken by `resolve`; `None` afterwards marks the entry resolved.
    tx: Option<oneshot::Sender<bool>>,
    /// Taken by `wait`; each approval has exactly one waiter.
    rx: Option<oneshot::Receiver<bool>>,
}

pub struct ApprovalManager {
    timeout: Duration,
    pending: Mutex<HashMap<String, Pending>>,
}

impl ApprovalManager {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Register a pending approval and return its id for the transport
    /// prompt.
    pub fn start(
        &self,
        chat_id: ChatId,
        requester: UserId,
        tool: &str,
        args: serde_json::Value,
        description: &str,
    ) -> String {
        let id = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().insert(
            id.clone(),
            Pending {
                chat_id,
                requester,
                tool: tool.to_string(),
                args,
                description: description.to_string(),
                created_at: std::time::Instant::now(),
                tx: Some(tx),
                rx: Some(rx),
            },
        );
        info!(approval_id = %id, tool, chat_id, "approval requested");
        id
    }

    /// Block until resolution, caller cancellation, or timeout. The entry
    /// is removed before returning, so a late `resolve` gets NotFound.
    pub async fn wait(&self, id: &str, cancel: &CancellationToken) -> ApprovalOutcome {
        let rx = {
            let mut pending = self.pending.lock().unwrap();
            match pending.get_mut(id) {
                Some(p) => match p.rx.take() {
                    Some(rx) => rx,
                    None => {
                        warn!(approval_id = %id, "second waiter on one approval");
                        return ApprovalOutcome::Cancelled;
                    }
                },
                None => return ApprovalOutcome::Cancelled,
            }
        };

        let outcome = tokio::select! {
            res = rx => match res {
                Ok(true) => ApprovalOutcome::Approved,
                Ok(false) => ApprovalOutcome::Denied,
                // Sender dropped without resolving: explicit cancel.
                Err(_) => ApprovalOutcome::Cancelled,
            },
            _ = cancel.cancelled() => ApprovalOutcome::Cancelled,
            _ = tokio::time::sleep(self.timeout) => ApprovalOutcome::TimedOut,
        };

        let removed = self.pending.lock().unwrap().remove(id);
        let waited_ms = removed
            .map(|p| p.created_at.elapsed().as_millis() as u64)
            .unwrap_or(0);
        info!(approval_id = %id, ?outcome, waited_ms, "approval settled");
        outcome
    }

    /// Resolve from the transport callback. Owner-locked: `user` must be
    /// the requester. Never blocks; at most one resolution wins.
    pub fn resolve(&self, id: &str, approved: bool, user: UserId) -> Result<(), ApprovalError> {
        let mut pending = self.pending.lock().unwrap();
        let entry = pending
            .get_mut(id)
            .ok_or_else(|| ApprovalError::NotFound(id.to_string()))?;

        if entry.requester != user {
            warn!(
                approval_id = %id,
                requester = entry.requester,
                user,
                tool = %entry.tool,
                "approval resolve attempt by non-requester"
            );
            return Err(ApprovalError::UserMismatch {
                user,
                requester: entry.requester,
            });
        }

        let tx = entry
            .tx
            .take()
            .ok_or_else(|| ApprovalError::AlreadyResolved(id.to_string()))?;
        // Buffered slot of one: send only fails when the waiter is gone,
        // which the cleanup path already handles.
        if tx.send(approved).is_err() {
            warn!(approval_id = %id, "approval resolved after waiter left");
        }
        Ok(())
    }

    /// Abort without delivering; the waiter observes Cancelled.
    pub fn cancel(&self, id: &str) {
        if let Some(p) = self.pending.lock().unwrap().get_mut(id) {
            p.tx.take();
        }
    }

    /// Description line for a pending approval (for transport prompts).
    pub fn describe(&self, id: &str) -> Option<(ChatId, String)> {
        let pending = self.pending.lock().unwrap();
        pending.get(id).map(|p| (p.chat_id, p.description.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn manager(timeout_ms: u64) -> Arc<ApprovalManager> {
        Arc::new(ApprovalManager::new(Duration::from_millis(timeout_ms)))
    }

    #[tokio::test]
    async fn requester_approval_is_observed() {
        let m = manager(5000);
        let id = m.start(1, 100, "remove_app", serde_json::json!({"name": "weather"}), "Remove app 'weather'");

        let waiter = {
            let m = Arc::clone(&m);
            let id = id.clone();
            tokio::spawn(async move { m.wait(&id, &CancellationToken::new()).await })
        };
        tokio::task::yield_now().await;
        m.resolve(&id, true, 100).unwrap();
        assert_eq!(waiter.await.unwrap(), ApprovalOutcome::Approved);
    }

    #[tokio::test]
    async fn non_requester_cannot_resolve() {
        // Someone else pressing the buttons must never settle an approval
        // they didn't request.
        let m = manager(50);
        let id = m.start(1, 100, "remove_app", serde_json::json!({}), "Remove app");

        let err = m.resolve(&id, true, 200).unwrap_err();
        assert!(matches!(err, ApprovalError::UserMismatch { user: 200, requester: 100 }));

        // Still pending: the rightful requester's timeout path wins.
        let outcome = m.wait(&id, &CancellationToken::new()).await;
        assert_eq!(outcome, ApprovalOutcome::TimedOut);
    }

    #[tokio::test]
    async fn second_resolve_is_rejected() {
        let m = manager(5000);
        let id = m.start(1, 100, "deploy", serde_json::json!({}), "Deploy");
        m.resolve(&id, false, 100).unwrap();
        assert!(matches!(
            m.resolve(&id, true, 100).unwrap_err(),
            ApprovalError::AlreadyResolved(_)
        ));

        let outcome = m.wait(&id, &CancellationToken::new()).await;
        assert_eq!(outcome, ApprovalOutcome::Denied);
    }

    #[tokio::test]
    async fn timeout_cleans_the_entry() {
        let m = manager(20);
        let id = m.start(1, 100, "deploy", serde_json::json!({}), "Deploy");
        assert_eq!(m.wait(&id, &CancellationToken::new()).await, ApprovalOutcome::TimedOut);
        // Late resolve finds nothing.
        assert!(matches!(
            m.resolve(&id, true, 100).unwrap_err(),
            ApprovalError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn caller_cancellation_unblocks_wait() {
        let m = manager(5000);
        let id = m.start(1, 100, "deploy", serde_json::json!({}), "Deploy");
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert_eq!(m.wait(&id, &cancel).await, ApprovalOutcome::Cancelled);
    }

    #[tokio::test]
    async fn explicit_cancel_reaches_waiter() {
        let m = manager(5000);
        let id = m.start(1, 100, "deploy", serde_json::json!({}), "Deploy");
        let waiter = {
            let m = Arc::clone(&m);
            let id = id.clone();
            tokio::spawn(async move { m.wait(&id, &CancellationToken::new()).await })
        };
        tokio::task::yield_now().await;
        m.cancel(&id);
        assert_eq!(waiter.await.unwrap(), ApprovalOutcome::Cancelled);
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let m = manager(50);
        assert!(matches!(
            m.resolve("nope", true, 1).unwrap_err(),
            ApprovalError::NotFound(_)
        ));
    }
}
