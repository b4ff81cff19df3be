//! Serialized access to the field extractor
//!
//! Page fetching runs in parallel, but the LLM provider only tolerates one
//! request at a time at a slow pace. Every call waits for the gate, sleeps
//! the fixed delay while holding it, then calls the inner extractor.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

use crate::infrastructure::llm_client::{CardFieldExtractor, LlmError, LlmExtraction};

pub struct SerializedExtractor {
    inner: Arc<dyn CardFieldExtractor>,
    gate: Mutex<()>,
    call_delay: Duration,
}

impl SerializedExtractor {
    pub fn new(inner: Arc<dyn CardFieldExtractor>, call_delay: Duration) -> Self {
        Self {
            inner,
            gate: Mutex::new(()),
            call_delay,
        }
    }
}

#[async_trait]
impl CardFieldExtractor for SerializedExtractor {
    async fn extract(&self, page_text: &str) -> Result<LlmExtraction, LlmError> {
        let _permit = self.gate.lock().await;
        if !self.call_delay.is_zero() {
            debug!("LLM gate acquired, pausing {:?}", self.call_delay);
            tokio::time::sleep(self.call_delay).await;
        }
        self.inner.extract(page_text).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::ScriptedExtractor;
    use tokio::time::Instant;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn calls_never_overlap() {
        let inner = Arc::new(ScriptedExtractor::succeeding().with_latency(Duration::from_millis(20)));
        let gate = Arc::new(SerializedExtractor::new(inner.clone(), Duration::ZERO));

        let mut tasks = Vec::new();
        for i in 0..8 {
            let gate = gate.clone();
            tasks.push(tokio::spawn(async move { gate.extract(&format!("page {i}")).await }));
        }
        for task in tasks {
            assert!(task.await.unwrap().is_ok());
        }

        assert_eq!(inner.calls(), 8);
        assert_eq!(inner.max_in_flight(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn delay_is_paid_per_call() {
        let inner = Arc::new(ScriptedExtractor::succeeding());
        let gate = SerializedExtractor::new(inner, Duration::from_secs(10));

        let started = Instant::now();
        gate.extract("a").await.unwrap();
        gate.extract("b").await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(20));
    }
}
