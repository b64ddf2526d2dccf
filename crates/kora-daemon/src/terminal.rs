//! Terminal transport — a stdin/stdout adapter for running Kora locally.
//!
//! One fixed chat (id 0) owned by the person at the keyboard. Approval
//! prompts render inline; `approve <id>` / `deny <id>` resolve them.

use async_trait::async_trait;
use kora_agent::ApprovalManager;
use kora_core::{ChatId, InboundMessage, KoraError, Transport, UserId};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};
use tracing::warn;

pub const TERMINAL_CHAT: ChatId = 0;
pub const TERMINAL_USER: UserId = 0;

pub struct TerminalTransport;

#[async_trait]
impl Transport for TerminalTransport {
    fn name(&self) -> &str {
        "terminal"
    }

    async fn send_text(&self, _chat_id: ChatId, text: &str) -> Result<(), KoraError> {
        println!("kora: {text}");
        Ok(())
    }

    async fn show_approval_prompt(
        &self,
        _chat_id: ChatId,
        approval_id: &str,
        description: &str,
    ) -> Result<(), KoraError> {
        println!("kora: {description}");
        println!("      type `approve {approval_id}` or `deny {approval_id}`");
        Ok(())
    }
}

/// Read stdin until EOF or shutdown, forwarding lines as inbound messages
/// and intercepting approval commands.
pub async fn run_repl(
    inbound_tx: mpsc::Sender<InboundMessage>,
    approvals: Arc<ApprovalManager>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line,
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
                continue;
            }
        };
        let Ok(Some(line)) = line else { break };
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }

        if let Some(id) = line.strip_prefix("approve ") {
            if let Err(e) = approvals.resolve(id.trim(), true, TERMINAL_USER) {
                println!("kora: {e}");
            }
            continue;
        }
        if let Some(id) = line.strip_prefix("deny ") {
            if let Err(e) = approvals.resolve(id.trim(), false, TERMINAL_USER) {
                println!("kora: {e}");
            }
            continue;
        }

        let msg = InboundMessage {
            chat_id: TERMINAL_CHAT,
            user_id: TERMINAL_USER,
            session_id: format!("terminal:{TERMINAL_CHAT}"),
            text: line,
            media: Vec::new(),
        };
        if inbound_tx.send(msg).await.is_err() {
            warn!("inbound channel closed, terminal exiting");
            break;
        }
    }
}
