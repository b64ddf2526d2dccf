use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::provider::{ChatRequest, ChatResponse, LlmProvider, ProviderError};
use crate::stream::StreamEvent;

/// Default bounded retry count for external calls.
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// Configuration for a single provider slot inside the failover chain.
pub struct ProviderSlot {
    /// The LLM provider to try.
    pub provider: Box<dyn LlmProvider>,
    /// Maximum number of retries before moving to the next provider.
    pub max_retries: u32,
}

impl ProviderSlot {
    pub fn new(provider: Box<dyn LlmProvider>, max_retries: u32) -> Self {
        Self {
            provider,
            max_retries,
        }
    }
}

/// Routes requests across multiple LLM providers with automatic failover.
///
/// Providers are tried in priority order (index 0 first). A provider that
/// keeps failing after its configured retries (exponential backoff between
/// attempts) is abandoned for the next one in the list.
pub struct FailoverProvider {
    slots: Vec<ProviderSlot>,
}

impl FailoverProvider {
    /// At least one slot is required.
    pub fn new(slots: Vec<ProviderSlot>) -> Self {
        assert!(
            !slots.is_empty(),
            "FailoverProvider requires at least one provider slot"
        );
        Self { slots }
    }

    fn backoff(attempt: u32) -> std::time::Duration {
        std::time::Duration::from_millis(200 * 2u64.pow(attempt))
    }
}

#[async_trait]
impl LlmProvider for FailoverProvider {
    fn name(&self) -> &str {
        "failover"
    }

    async fn send(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let mut last_err: Option<ProviderError> = None;

        for slot in &self.slots {
            let provider_name = slot.provider.name();

            for attempt in 0..=slot.max_retries {
                match slot.provider.send(req).await {
                    Ok(resp) => {
                        if attempt > 0 {
                            info!(provider = %provider_name, attempt, "request succeeded after retry");
                        }
                        return Ok(resp);
                    }
                    Err(e) => {
                        warn!(provider = %provider_name, attempt, err = %e, "provider send failed");

                        // Rate limits and cancellation are not retriable on
                        // the same provider.
                        let retriable = !matches!(
                            e,
                            ProviderError::RateLimited { .. } | ProviderError::Cancelled
                        );
                        last_err = Some(e);
                        if !retriable {
                            break;
                        }
                        if attempt < slot.max_retries {
                            tokio::time::sleep(Self::backoff(attempt)).await;
                        }
                    }
                }
            }

            info!(provider = %provider_name, "provider exhausted, trying next provider");
        }

        Err(last_err
            .unwrap_or_else(|| ProviderError::Unavailable("all providers failed".to_string())))
    }

    async fn send_stream(
        &self,
        req: &ChatRequest,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<(), ProviderError> {
        let mut last_err: Option<ProviderError> = None;

        for slot in &self.slots {
            let provider_name = slot.provider.name();

            for attempt in 0..=slot.max_retries {
                match slot.provider.send_stream(req, tx.clone()).await {
                    Ok(()) => return Ok(()),
                    Err(e) => {
                        warn!(provider = %provider_name, attempt, err = %e, "provider stream failed");
                        let retriable = !matches!(
                            e,
                            ProviderError::RateLimited { .. } | ProviderError::Cancelled
                        );
                        last_err = Some(e);
                        if !retriable {
                            break;
                        }
                        if attempt < slot.max_retries {
                            tokio::time::sleep(Self::backoff(attempt)).await;
                        }
                    }
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| ProviderError::Unavailable("all providers failed".to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{Message, Role};
    use std::sync::atomic::{AtomicU32, Ordering};

    struct AlwaysFail;

    #[async_trait]
    impl LlmProvider for AlwaysFail {
        fn name(&self) -> &str {
            "always-fail"
        }
        async fn send(&self, _req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
            Err(ProviderError::Unavailable("intentional failure".to_string()))
        }
    }

    struct AlwaysOk;

    #[async_trait]
    impl LlmProvider for AlwaysOk {
        fn name(&self) -> &str {
            "always-ok"
        }
        async fn send(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
            Ok(ChatResponse {
                content: "ok".to_string(),
                model: req.model.clone(),
                tokens_in: 1,
                tokens_out: 1,
                stop_reason: "end_turn".to_string(),
                tool_calls: Vec::new(),
            })
        }
    }

    /// Fails N times, then succeeds.
    struct FlakyProvider {
        failures_left: AtomicU32,
    }

    #[async_trait]
    impl LlmProvider for FlakyProvider {
        fn name(&self) -> &str {
            "flaky"
        }
        async fn send(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
            if self.failures_left.load(Ordering::SeqCst) > 0 {
                self.failures_left.fetch_sub(1, Ordering::SeqCst);
                return Err(ProviderError::Api {
                    status: 503,
                    message: "overloaded".to_string(),
                });
            }
            AlwaysOk.send(req).await
        }
    }

    fn dummy_request() -> ChatRequest {
        ChatRequest {
            model: "test-model".to_string(),
            system: "You are a test.".to_string(),
            messages: vec![Message {
                role: Role::User,
                content: "hello".to_string(),
            }],
            max_tokens: 64,
            tools: Vec::new(),
            raw_messages: None,
        }
    }

    #[tokio::test]
    async fn falls_back_to_second_provider() {
        let router = FailoverProvider::new(vec![
            ProviderSlot::new(Box::new(AlwaysFail), 0),
            ProviderSlot::new(Box::new(AlwaysOk), 0),
        ]);
        let result = router.send(&dummy_request()).await;
        assert_eq!(result.unwrap().content, "ok");
    }

    #[tokio::test]
    async fn bounded_retries_recover_transient_failures() {
        let router = FailoverProvider::new(vec![ProviderSlot::new(
            Box::new(FlakyProvider {
                failures_left: AtomicU32::new(2),
            }),
            DEFAULT_MAX_RETRIES,
        )]);
        let result = router.send(&dummy_request()).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn errors_when_all_fail() {
        let router = FailoverProvider::new(vec![
            ProviderSlot::new(Box::new(AlwaysFail), 0),
            ProviderSlot::new(Box::new(AlwaysFail), 0),
        ]);
        assert!(router.send(&dummy_request()).await.is_err());
    }
}
