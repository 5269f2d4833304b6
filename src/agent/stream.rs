//! Streaming analysis delivery
//!
//! Bridges a provider's chunk stream to the caller through a bounded
//! channel. The sequence is lazily produced, finite, and not
//! restartable; cancelling (or dropping) the stream aborts the
//! forwarding task, which drops the provider call and halts generation.

use crate::agent::provider::CompletionRequest;
use crate::agent::AgentHandle;
use crate::error::Result;
use crate::types::MarketData;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const CHANNEL_CAPACITY: usize = 64;

pub struct StreamCoordinator;

impl StreamCoordinator {
    pub fn new() -> Self {
        Self
    }

    /// Start a streaming analysis for an agent.
    ///
    /// The provider call happens inside the forwarding task, so this
    /// returns immediately and the first chunk arrives asynchronously.
    pub fn stream(
        &self,
        agent: &AgentHandle,
        market_data: &MarketData,
        context: &str,
    ) -> AnalysisStream {
        let request = CompletionRequest {
            model: agent.policy.model.clone(),
            system_prompt: super::build_system_prompt(&agent.policy, false),
            user_message: format!(
                "{}\n\n{}\n\nProvide detailed market analysis.",
                super::build_market_context(market_data, None, &agent.policy),
                context
            ),
        };

        let provider = agent.provider.clone();
        let agent_name = agent.policy.name.clone();
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

        let handle = tokio::spawn(async move {
            let mut chunks = match provider.stream(&request).await {
                Ok(chunks) => chunks,
                Err(e) => {
                    tracing::warn!(agent = %agent_name, error = %e, "stream start failed");
                    let _ = tx.send(Err(e)).await;
                    return;
                }
            };

            while let Some(chunk) = chunks.next().await {
                // A closed receiver means the caller cancelled; stop
                // pulling so the provider request is dropped.
                if tx.send(chunk).await.is_err() {
                    tracing::debug!(agent = %agent_name, "stream consumer gone, cancelling");
                    return;
                }
            }
        });

        AnalysisStream { rx, handle }
    }
}

impl Default for StreamCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Caller's handle on an in-flight streaming analysis.
pub struct AnalysisStream {
    rx: mpsc::Receiver<Result<String>>,
    handle: JoinHandle<()>,
}

impl AnalysisStream {
    /// Next text chunk; None once the provider finished or the stream
    /// was cancelled.
    pub async fn next_chunk(&mut self) -> Option<Result<String>> {
        self.rx.recv().await
    }

    /// Stop the stream and the underlying provider generation. Chunks
    /// already buffered are discarded; nothing arrives after this call.
    pub fn cancel(&mut self) {
        self.handle.abort();
        self.rx.close();
        while self.rx.try_recv().is_ok() {}
    }
}

impl Drop for AnalysisStream {
    fn drop(&mut self) {
        // An orphaned provider call must not keep generating.
        self.handle.abort();
    }
}
