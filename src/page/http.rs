use super::{parse_selector, Element, PageSource, RevealOutcome};
use crate::client::Client;
use crate::config::SessionConfig;
use crate::error::{AppError, PageError, Result};
use crate::scraper::Scraper;
use crate::{log_info, log_warn};
use async_trait::async_trait;
use scraper::Html;
use std::collections::HashSet;
use std::time::Duration;

/// Plain HTTP page source: every reveal follows a "next" link to a new page.
pub struct HttpPageSource {
    client: Client,
    current: Option<(String, String)>,
    visited: HashSet<String>,
    closed: bool,
}

impl HttpPageSource {
    pub fn new(config: &SessionConfig, cookie: Option<&str>) -> Result<Self> {
        let mut builder = Client::builder()
            .base_url(&config.base_url)
            .header("user-agent", &config.user_agent)?
            .header("accept-language", "en-US,en;q=0.7")?
            .chrome_impersonation(true)
            .timeout(Duration::from_secs(30));

        if let Some(value) = cookie {
            builder = builder.cookie(&config.cookie_name, value)?;
        }

        Ok(Self::with_client(builder.build()?))
    }

    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            current: None,
            visited: HashSet::new(),
            closed: false,
        }
    }

    fn page(&self) -> std::result::Result<&(String, String), PageError> {
        if self.closed {
            return Err(PageError::Closed);
        }
        self.current
            .as_ref()
            .ok_or_else(|| PageError::Navigation("no page opened yet".to_string()))
    }

    fn next_url(&self, selectors: &[&str]) -> std::result::Result<Option<(String, String)>, PageError> {
        let (url, content) = self.page()?;
        let scraper = Scraper::new(content);
        let info = scraper.page().with_base_url(url).analyze(selectors)?;
        Ok(info.next.map(|next| (next.url, next.via)))
    }

    async fn fetch(&mut self, path: &str) -> std::result::Result<(), PageError> {
        let response = self.client.get(path).await.map_err(|e| match e {
            AppError::Client(e) => PageError::Navigation(e.to_string()),
            other => PageError::Navigation(other.to_string()),
        })?;

        log_info!(
            "[http] Fetched {} (status {}, {} bytes)",
            response.url,
            response.status,
            response.content.len()
        );
        self.visited.insert(response.url.clone());
        self.current = Some((response.url, response.content));
        Ok(())
    }
}

#[async_trait]
impl PageSource for HttpPageSource {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn open(&mut self, path: &str) -> std::result::Result<(), PageError> {
        if self.closed {
            return Err(PageError::Closed);
        }
        self.fetch(path).await
    }

    async fn find(&mut self, selector: &str) -> std::result::Result<Vec<Element>, PageError> {
        let selector = parse_selector(selector)?;
        let (_, content) = self.page()?;
        let document = Html::parse_document(content);
        Ok(document.select(&selector).map(Element::from_ref).collect())
    }

    async fn reveal(
        &mut self,
        selectors: &[&str],
        _timeout: Duration,
    ) -> std::result::Result<RevealOutcome, PageError> {
        let Some((next, via)) = self.next_url(selectors)? else {
            return Ok(RevealOutcome::Exhausted);
        };

        if self.visited.contains(&next) {
            log_warn!("[http] Next link points back to {}, treating as end of list", next);
            return Ok(RevealOutcome::Exhausted);
        }

        self.fetch(&next).await?;
        Ok(RevealOutcome::Revealed { via })
    }

    async fn close(&mut self) -> std::result::Result<(), PageError> {
        self.closed = true;
        self.current = None;
        Ok(())
    }
}
