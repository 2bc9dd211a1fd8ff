mod builder;

use crate::error::{ClientError, Result};
pub use builder::ClientBuilder;
use rquest::Client as RquestClient;
use url::Url;

#[derive(Debug)]
pub struct ClientResponse {
    pub status: u16,
    pub url: String,
    pub content: String,
}

pub struct Client {
    inner: RquestClient,
    base: Url,
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// GETs `path`, which may be absolute or relative to the base URL.
    pub async fn get(&self, path: &str) -> Result<ClientResponse> {
        let url = self.resolve(path)?;
        let response = self
            .inner
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| ClientError::RequestFailed(e.to_string()))?;

        Self::read(url, response).await
    }

    /// POSTs a JSON body to an absolute URL.
    pub async fn post_json(
        &self,
        url: &str,
        body: &impl serde::Serialize,
    ) -> Result<ClientResponse> {
        let url = self.resolve(url)?;
        let response = self
            .inner
            .post(url.as_str())
            .json(body)
            .send()
            .await
            .map_err(|e| ClientError::RequestFailed(e.to_string()))?;

        Self::read(url, response).await
    }

    pub fn resolve(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .map_err(|e| ClientError::InvalidUrl(format!("Invalid path {}: {}", path, e)).into())
    }

    async fn read(url: Url, response: rquest::Response) -> Result<ClientResponse> {
        let status = response.status().as_u16();
        let is_success = response.status().is_success();
        let content = response.text().await.map_err(|e| {
            ClientError::RequestFailed(format!("Failed to get response text: {}", e))
        })?;

        if !is_success {
            return Err(ClientError::ResponseError {
                status_code: status,
                message: content,
            }
            .into());
        }

        Ok(ClientResponse {
            status,
            url: url.to_string(),
            content,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_relative_and_absolute_paths() {
        let client = Client::builder()
            .base_url("https://shop.example.com/store/")
            .build()
            .unwrap();
        assert_eq!(
            client.resolve("/bundles?page=2").unwrap().as_str(),
            "https://shop.example.com/bundles?page=2"
        );
        assert_eq!(
            client.resolve("https://other.example.com/x").unwrap().as_str(),
            "https://other.example.com/x"
        );
    }
}
