//! Page sources: the things that hand us DOM elements.
//!
//! Every backend returns owned [`Element`] snapshots, so field extraction runs
//! on the `scraper` crate no matter whether the markup came from a plain HTTP
//! fetch, a saved file or a live browser.

mod fixture;
mod http;
#[cfg(feature = "webdriver")]
mod webdriver;

pub use self::fixture::FixturePageSource;
pub use self::http::HttpPageSource;
#[cfg(feature = "webdriver")]
pub use self::webdriver::WebDriverPageSource;

use crate::config::{Backend, Config};
use crate::error::{ConfigError, PageError, Result};
use crate::{log_debug, log_info, log_warn};
use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Owned snapshot of one DOM element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub tag: String,
    pub html: String,
    pub text: String,
    pub attrs: BTreeMap<String, String>,
}

impl Element {
    pub fn from_ref(el: ElementRef<'_>) -> Self {
        Self {
            tag: el.value().name().to_string(),
            html: el.html(),
            text: collapse_whitespace(el.text()),
            attrs: el
                .value()
                .attrs()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.attr("class")
            .map(|c| c.split_whitespace().any(|c| c == class))
            .unwrap_or(false)
    }

    /// Parses the snapshot back into a document. Table parts are wrapped so
    /// the HTML parser keeps them instead of dropping them as misplaced.
    pub fn document(&self) -> Html {
        let wrapped = match self.tag.as_str() {
            "td" | "th" => format!("<table><tbody><tr>{}</tr></tbody></table>", self.html),
            "tr" => format!("<table><tbody>{}</tbody></table>", self.html),
            "thead" | "tbody" | "tfoot" => format!("<table>{}</table>", self.html),
            _ => self.html.clone(),
        };
        Html::parse_fragment(&wrapped)
    }

    /// Rebuilds a snapshot from a browser's outer HTML for a `tag` element.
    pub fn from_outer_html(tag: &str, html: &str) -> Option<Self> {
        let shell = Self {
            tag: tag.to_lowercase(),
            html: html.to_string(),
            text: String::new(),
            attrs: BTreeMap::new(),
        };
        let selector = Selector::parse(&shell.tag).ok()?;
        let document = shell.document();
        let found = document.select(&selector).next().map(Element::from_ref);
        found
    }

    /// Elements matching `selector` within this one.
    pub fn select(&self, selector: &str) -> std::result::Result<Vec<Element>, PageError> {
        let selector = parse_selector(selector)?;
        let document = self.document();
        Ok(document.select(&selector).map(Element::from_ref).collect())
    }
}

pub fn parse_selector(selector: &str) -> std::result::Result<Selector, PageError> {
    Selector::parse(selector).map_err(|e| PageError::Selector(format!("{}: {}", selector, e)))
}

pub fn collapse_whitespace<'a>(parts: impl Iterator<Item = &'a str>) -> String {
    parts
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Result of asking a page source to show more items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevealOutcome {
    /// New content was requested; `via` names the control that was used.
    Revealed { via: String },
    /// No usable control: end of the collection.
    Exhausted,
}

#[async_trait]
pub trait PageSource: Send {
    fn name(&self) -> &'static str;

    /// Navigates to `path`, absolute or relative to the source's base.
    async fn open(&mut self, path: &str) -> std::result::Result<(), PageError>;

    /// Elements currently matching `selector`.
    async fn find(&mut self, selector: &str) -> std::result::Result<Vec<Element>, PageError>;

    /// Uses the first usable control among `selectors`, waiting up to
    /// `timeout` for one to appear.
    async fn reveal(
        &mut self,
        selectors: &[&str],
        timeout: Duration,
    ) -> std::result::Result<RevealOutcome, PageError>;

    async fn close(&mut self) -> std::result::Result<(), PageError>;

    /// Polls `find` until it returns something or `timeout` elapses.
    async fn wait_for(
        &mut self,
        selector: &str,
        timeout: Duration,
        poll: Duration,
    ) -> std::result::Result<Vec<Element>, PageError> {
        let started = Instant::now();
        loop {
            let found = self.find(selector).await?;
            if !found.is_empty() {
                return Ok(found);
            }
            if started.elapsed() >= timeout {
                return Err(PageError::Timeout {
                    selector: selector.to_string(),
                    waited: started.elapsed(),
                });
            }
            log_debug!("[page] Waiting for {}", selector);
            tokio::time::sleep(poll).await;
        }
    }
}

/// An explicitly opened and explicitly closed page source.
pub struct Session {
    source: Box<dyn PageSource>,
    closed: bool,
}

impl Session {
    pub fn new(source: impl PageSource + 'static) -> Self {
        Self {
            source: Box::new(source),
            closed: false,
        }
    }

    /// Builds the backend selected in `[session]`.
    pub async fn open(config: &Config) -> Result<Self> {
        let cookie = config.session_cookie();
        if cookie.is_none() {
            log_warn!(
                "[session] {} is not set, continuing without a session cookie",
                config.session.cookie_env
            );
        }

        let session = match config.session.backend {
            Backend::Http => Self::new(HttpPageSource::new(&config.session, cookie.as_deref())?),
            Backend::Fixture => Self::new(FixturePageSource::from_glob(&config.session.fixture_glob)?),
            #[cfg(feature = "webdriver")]
            Backend::Webdriver => Self::new(
                WebDriverPageSource::connect(&config.session, cookie.as_deref()).await?,
            ),
            #[cfg(not(feature = "webdriver"))]
            Backend::Webdriver => {
                return Err(ConfigError::InvalidValue(
                    "session.backend = \"webdriver\" needs the `webdriver` feature".to_string(),
                )
                .into())
            }
        };

        log_info!("[session] Opened {} page source", session.source.name());
        Ok(session)
    }

    pub fn source(&mut self) -> &mut dyn PageSource {
        self.source.as_mut()
    }

    pub async fn close(mut self) -> Result<()> {
        self.closed = true;
        self.source.close().await?;
        log_info!("[session] Closed {} page source", self.source.name());
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if !self.closed {
            log_warn!("[session] {} page source dropped without close", self.source.name());
        }
    }
}
