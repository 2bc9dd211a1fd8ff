use super::{Element, PageSource, RevealOutcome};
use crate::config::SessionConfig;
use crate::error::{PageError, Result};
use crate::{log_debug, log_info, log_warn};
use async_trait::async_trait;
use std::time::{Duration, Instant};
use thirtyfour::prelude::*;

const CLICK_POLL: Duration = Duration::from_millis(250);

/// Live browser page source driven over the WebDriver protocol.
pub struct WebDriverPageSource {
    driver: Option<WebDriver>,
    base_url: String,
}

impl WebDriverPageSource {
    pub async fn connect(config: &SessionConfig, cookie: Option<&str>) -> Result<Self> {
        let mut caps = DesiredCapabilities::chrome();
        let mut args = vec![
            format!("--user-agent={}", config.user_agent),
            "--disable-blink-features=AutomationControlled".to_string(),
        ];
        if config.headless {
            args.push("--headless".to_string());
        }
        for arg in &args {
            if let Err(e) = caps.add_arg(arg) {
                log_warn!("[webdriver] Failed to add Chrome arg '{}': {:?}", arg, e);
            }
        }

        let driver = WebDriver::new(&config.webdriver_url, caps)
            .await
            .map_err(driver_error)?;
        log_info!("[webdriver] Connected to {}", config.webdriver_url);

        // Cookies can only be set for the domain currently loaded.
        if let Some(value) = cookie {
            driver.goto(&config.base_url).await.map_err(driver_error)?;
            driver
                .add_cookie(Cookie::new(config.cookie_name.clone(), value.to_string()))
                .await
                .map_err(driver_error)?;
            log_debug!("[webdriver] Session cookie attached");
        }

        Ok(Self {
            driver: Some(driver),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn driver(&self) -> std::result::Result<&WebDriver, PageError> {
        self.driver.as_ref().ok_or(PageError::Closed)
    }

    async fn clickable(
        &self,
        selectors: &[&str],
    ) -> std::result::Result<Option<(WebElement, String)>, PageError> {
        let driver = self.driver()?;
        for selector in selectors {
            let Ok(candidates) = driver.find_all(By::Css(*selector)).await else {
                continue;
            };
            for candidate in candidates {
                let disabled = candidate
                    .class_name()
                    .await
                    .ok()
                    .flatten()
                    .map(|c| c.split_whitespace().any(|c| c == "disabled"))
                    .unwrap_or(false);
                if !disabled && candidate.is_clickable().await.unwrap_or(false) {
                    return Ok(Some((candidate, selector.to_string())));
                }
            }
        }
        Ok(None)
    }
}

fn driver_error(err: WebDriverError) -> PageError {
    PageError::Driver(err.to_string())
}

#[async_trait]
impl PageSource for WebDriverPageSource {
    fn name(&self) -> &'static str {
        "webdriver"
    }

    async fn open(&mut self, path: &str) -> std::result::Result<(), PageError> {
        let url = if path.starts_with("http") {
            path.to_string()
        } else {
            format!("{}/{}", self.base_url, path.trim_start_matches('/'))
        };
        self.driver()?
            .goto(&url)
            .await
            .map_err(|e| PageError::Navigation(format!("{}: {}", url, e)))?;
        log_info!("[webdriver] Navigated to {}", url);
        Ok(())
    }

    async fn find(&mut self, selector: &str) -> std::result::Result<Vec<Element>, PageError> {
        super::parse_selector(selector)?;
        let found = self
            .driver()?
            .find_all(By::Css(selector))
            .await
            .map_err(driver_error)?;

        let mut elements = Vec::with_capacity(found.len());
        for el in found {
            // Stale elements disappear between the query and the read.
            let (Ok(tag), Ok(html)) = (el.tag_name().await, el.outer_html().await) else {
                continue;
            };
            if let Some(snapshot) = Element::from_outer_html(&tag, &html) {
                elements.push(snapshot);
            }
        }
        Ok(elements)
    }

    async fn reveal(
        &mut self,
        selectors: &[&str],
        timeout: Duration,
    ) -> std::result::Result<RevealOutcome, PageError> {
        let started = Instant::now();
        loop {
            if let Some((control, via)) = self.clickable(selectors).await? {
                control.scroll_into_view().await.map_err(driver_error)?;
                control.click().await.map_err(driver_error)?;
                log_debug!("[webdriver] Clicked reveal control {}", via);
                return Ok(RevealOutcome::Revealed { via });
            }
            if started.elapsed() >= timeout {
                return Ok(RevealOutcome::Exhausted);
            }
            tokio::time::sleep(CLICK_POLL).await;
        }
    }

    async fn close(&mut self) -> std::result::Result<(), PageError> {
        if let Some(driver) = self.driver.take() {
            driver.quit().await.map_err(driver_error)?;
            log_info!("[webdriver] Browser session closed");
        }
        Ok(())
    }
}
