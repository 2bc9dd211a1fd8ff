//! Text generation behind a small trait, so the lesson builder can run
//! against the hosted model, a cache or a scripted stand-in.

mod cache;
mod gemini;
mod retry;

pub use cache::{CachedGenerator, ResponseCache};
pub use gemini::GeminiGenerator;
pub use retry::RetryingGenerator;

use crate::error::GeneratorError;
use async_trait::async_trait;

#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// Model identifier, part of the cache key.
    fn model(&self) -> &str;

    async fn generate(&self, prompt: &str) -> Result<String, GeneratorError>;
}

/// Pulls the JSON object out of a model reply that may wrap it in a fenced
/// block or surround it with chatter.
pub fn extract_json_block(text: &str) -> Option<&str> {
    let body = match text.find("```") {
        Some(open) => {
            let after = &text[open + 3..];
            let after = after.strip_prefix("json").unwrap_or(after);
            match after.find("```") {
                Some(close) => &after[..close],
                None => after,
            }
        }
        None => text,
    };

    let start = body.find('{')?;
    let end = body.rfind('}')?;
    (start < end).then(|| body[start..=end].trim())
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Replays canned replies in order, then answers "done".
    pub(crate) struct Scripted {
        replies: Mutex<VecDeque<Result<String, GeneratorError>>>,
        pub calls: AtomicUsize,
    }

    impl Scripted {
        pub(crate) fn new(replies: Vec<Result<String, GeneratorError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ContentGenerator for Scripted {
        fn model(&self) -> &str {
            "scripted"
        }

        async fn generate(&self, _prompt: &str) -> Result<String, GeneratorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok("done".to_string()))
        }
    }
}
