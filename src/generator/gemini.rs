use super::ContentGenerator;
use crate::client::Client;
use crate::config::GeneratorConfig;
use crate::error::{AppError, ClientError, ConfigError, GeneratorError, Result};
use crate::log_debug;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

/// Calls the `generateContent` endpoint of the Gemini API.
pub struct GeminiGenerator {
    client: Client,
    endpoint: String,
    model: String,
}

impl GeminiGenerator {
    pub fn from_config(config: &GeneratorConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingField(format!("environment variable {}", config.api_key_env)))?;

        let client = Client::builder()
            .base_url(&config.api_url)
            .header("content-type", "application/json")?
            .header("x-goog-api-key", &api_key)?
            .timeout(Duration::from_secs(120))
            .build()?;

        Ok(Self::new(client, &config.api_url, &config.model))
    }

    /// `client` must already carry the `x-goog-api-key` header; the key never
    /// goes into the URL, which ends up in request error messages.
    pub fn new(client: Client, api_url: &str, model: &str) -> Self {
        let endpoint = format!("{}/{}:generateContent", api_url.trim_end_matches('/'), model);
        Self {
            client,
            endpoint,
            model: model.to_string(),
        }
    }
}

/// Rate limits show up either as HTTP 429 or as a quota message in the body.
pub(crate) fn classify(err: AppError) -> GeneratorError {
    match err {
        AppError::Client(ClientError::ResponseError {
            status_code,
            message,
        }) => {
            if status_code == 429 || message.to_lowercase().contains("quota") {
                GeneratorError::RateLimited(format!("HTTP {}", status_code))
            } else {
                GeneratorError::Upstream(format!("HTTP {}: {}", status_code, message))
            }
        }
        other => GeneratorError::Upstream(other.to_string()),
    }
}

#[async_trait]
impl ContentGenerator for GeminiGenerator {
    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> std::result::Result<String, GeneratorError> {
        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }]
        });
        let response = self
            .client
            .post_json(&self.endpoint, &body)
            .await
            .map_err(classify)?;

        let parsed: GenerateResponse = serde_json::from_str(&response.content)
            .map_err(|e| GeneratorError::MalformedResponse(e.to_string()))?;
        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(GeneratorError::MalformedResponse(
                "response carried no text".to_string(),
            ));
        }
        log_debug!("[generator] {} returned {} chars", self.model, text.len());
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_messages_count_as_rate_limits() {
        let err = classify(
            ClientError::ResponseError {
                status_code: 403,
                message: "Quota exceeded for metric".to_string(),
            }
            .into(),
        );
        assert!(matches!(err, GeneratorError::RateLimited(_)));

        let err = classify(
            ClientError::ResponseError {
                status_code: 429,
                message: String::new(),
            }
            .into(),
        );
        assert!(matches!(err, GeneratorError::RateLimited(_)));

        let err = classify(
            ClientError::ResponseError {
                status_code: 500,
                message: "boom".to_string(),
            }
            .into(),
        );
        assert!(matches!(err, GeneratorError::Upstream(_)));
    }

    #[tokio::test]
    async fn api_key_stays_out_of_urls_and_errors() {
        let key = "test-key-9f2c41";
        std::env::set_var("VAULT_SCRAPER_TEST_GEMINI_KEY", key);
        let config = GeneratorConfig {
            // Nothing listens on the discard port, so the request fails to send.
            api_url: "http://127.0.0.1:9/v1beta".to_string(),
            api_key_env: "VAULT_SCRAPER_TEST_GEMINI_KEY".to_string(),
            ..GeneratorConfig::default()
        };

        let generator = GeminiGenerator::from_config(&config).unwrap();
        assert_eq!(
            generator.endpoint,
            "http://127.0.0.1:9/v1beta/models/gemini-1.5-flash:generateContent"
        );

        let err = generator.generate("hello").await.unwrap_err();
        assert!(matches!(err, GeneratorError::Upstream(_)));
        assert!(!err.to_string().contains(key));
    }
}
