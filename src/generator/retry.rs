use super::ContentGenerator;
use crate::error::GeneratorError;
use crate::log_warn;
use async_trait::async_trait;
use std::time::Duration;

/// Retries rate-limited calls with exponential backoff
/// (`base_delay * 2^retry`). Any other error is returned straight away.
pub struct RetryingGenerator<G> {
    inner: G,
    max_retries: u32,
    base_delay: Duration,
}

impl<G: ContentGenerator> RetryingGenerator<G> {
    pub fn new(inner: G, max_retries: u32, base_delay: Duration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
        }
    }

    fn delay(&self, retry: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(retry))
    }
}

#[async_trait]
impl<G: ContentGenerator> ContentGenerator for RetryingGenerator<G> {
    fn model(&self) -> &str {
        self.inner.model()
    }

    async fn generate(&self, prompt: &str) -> Result<String, GeneratorError> {
        let mut retry = 0;
        loop {
            match self.inner.generate(prompt).await {
                Err(GeneratorError::RateLimited(reason)) => {
                    if retry >= self.max_retries {
                        return Err(GeneratorError::RetriesExhausted {
                            attempts: retry + 1,
                        });
                    }
                    let delay = self.delay(retry);
                    log_warn!(
                        "[generator] Rate limited ({}), waiting {:?} before retry {}/{}",
                        reason,
                        delay,
                        retry + 1,
                        self.max_retries
                    );
                    tokio::time::sleep(delay).await;
                    retry += 1;
                }
                other => return other,
            }
        }
    }
}
