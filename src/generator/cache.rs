use super::ContentGenerator;
use crate::error::{GeneratorError, Result};
use crate::utils::save_json;
use crate::{log_info, log_warn};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Prompt responses persisted as a JSON object keyed by `model:prompt`.
pub struct ResponseCache {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl ResponseCache {
    /// A missing or unreadable file starts an empty cache.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let entries = match std::fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text).unwrap_or_else(|e| {
                log_warn!("[cache] Ignoring unreadable cache {}: {}", path.display(), e);
                BTreeMap::new()
            }),
            Err(_) => BTreeMap::new(),
        };
        Self { path, entries }
    }

    pub fn key(model: &str, prompt: &str) -> String {
        format!("{}:{}", model, prompt)
    }

    pub fn get(&self, model: &str, prompt: &str) -> Option<&str> {
        self.entries.get(&Self::key(model, prompt)).map(String::as_str)
    }

    /// Stores the response and rewrites the cache file.
    pub fn insert(&mut self, model: &str, prompt: &str, response: &str) -> Result<()> {
        self.entries
            .insert(Self::key(model, prompt), response.to_string());
        save_json(&self.entries, &self.path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub struct CachedGenerator<G> {
    inner: G,
    cache: Mutex<ResponseCache>,
}

impl<G: ContentGenerator> CachedGenerator<G> {
    pub fn new(inner: G, cache: ResponseCache) -> Self {
        Self {
            inner,
            cache: Mutex::new(cache),
        }
    }

    fn cache(&self) -> std::sync::MutexGuard<'_, ResponseCache> {
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl<G: ContentGenerator> ContentGenerator for CachedGenerator<G> {
    fn model(&self) -> &str {
        self.inner.model()
    }

    async fn generate(&self, prompt: &str) -> std::result::Result<String, GeneratorError> {
        let model = self.inner.model();
        if let Some(hit) = self.cache().get(model, prompt).map(str::to_string) {
            let preview: String = prompt.trim().chars().take(50).collect();
            log_info!("[cache] Using cached response for prompt: {}...", preview);
            return Ok(hit);
        }

        let response = self.inner.generate(prompt).await?;
        if let Err(e) = self.cache().insert(model, prompt, &response) {
            log_warn!("[cache] Failed to save cache: {}", e);
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::testing::Scripted;
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn second_call_is_served_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("api_cache.json");

        let generator = CachedGenerator::new(
            Scripted::new(vec![Ok("first".to_string())]),
            ResponseCache::load(&path),
        );
        assert_eq!(generator.generate("explain traits").await.unwrap(), "first");
        assert_eq!(generator.generate("explain traits").await.unwrap(), "first");
        assert_eq!(generator.inner.calls.load(Ordering::SeqCst), 1);

        let reloaded = ResponseCache::load(&path);
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.get("scripted", "explain traits"), Some("first"));
    }

    #[test]
    fn corrupt_cache_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("api_cache.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(ResponseCache::load(&path).is_empty());
    }
}
