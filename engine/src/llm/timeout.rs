use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use super::{LLMError, LLMProvider, Message, Result};

/// Wraps any provider with a hard deadline per request
pub struct TimedProvider {
    inner: Arc<dyn LLMProvider>,
    timeout: Duration,
}

impl TimedProvider {
    pub fn new(inner: Arc<dyn LLMProvider>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait]
impl LLMProvider for TimedProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn is_local(&self) -> bool {
        self.inner.is_local()
    }

    async fn generate(&self, messages: &[Message]) -> Result<String> {
        match tokio::time::timeout(self.timeout, self.inner.generate(messages)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    "{} completion exceeded {}s deadline",
                    self.inner.name(),
                    self.timeout.as_secs()
                );
                Err(LLMError::Timeout)
            }
        }
    }
}
