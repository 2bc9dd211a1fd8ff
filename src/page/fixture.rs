use super::{parse_selector, Element, PageSource, RevealOutcome};
use crate::error::{PageError, Result, ScraperError};
use crate::log_info;
use async_trait::async_trait;
use scraper::Html;
use std::path::Path;
use std::time::Duration;

/// Serves pre-recorded pages. Revealing more moves to the next page in order,
/// provided the current page actually shows a reveal control.
pub struct FixturePageSource {
    pages: Vec<(String, String)>,
    current: Option<usize>,
    closed: bool,
}

impl FixturePageSource {
    pub fn new(pages: Vec<(String, String)>) -> Self {
        Self {
            pages,
            current: None,
            closed: false,
        }
    }

    /// Loads every file matching `pattern`, sorted by path. Each page is
    /// addressed by its file stem.
    pub fn from_glob(pattern: &str) -> Result<Self> {
        let paths = glob::glob(pattern)
            .map_err(|e| ScraperError::ParseError(format!("Bad fixture pattern {}: {}", pattern, e)))?;

        let mut pages = Vec::new();
        for entry in paths {
            let path = entry.map_err(|e| e.into_error())?;
            let content = std::fs::read_to_string(&path)?;
            pages.push((page_name(&path), content));
        }
        pages.sort_by(|a, b| natural_key(&a.0).cmp(&natural_key(&b.0)));

        log_info!("[fixture] Loaded {} pages from {}", pages.len(), pattern);
        Ok(Self::new(pages))
    }

    fn page(&self) -> std::result::Result<&str, PageError> {
        if self.closed {
            return Err(PageError::Closed);
        }
        let index = self
            .current
            .ok_or_else(|| PageError::Navigation("no page opened yet".to_string()))?;
        Ok(&self.pages[index].1)
    }

    fn position(&self, path: &str) -> Option<usize> {
        let wanted = last_segment(path);
        self.pages
            .iter()
            .position(|(p, _)| p == path)
            .or_else(|| self.pages.iter().position(|(p, _)| last_segment(p) == wanted))
    }

    fn has_control(&self, selectors: &[&str]) -> std::result::Result<Option<String>, PageError> {
        let document = Html::parse_document(self.page()?);
        for raw in selectors {
            let selector = parse_selector(raw)?;
            let usable = document.select(&selector).any(|el| {
                let el = Element::from_ref(el);
                !el.has_class("disabled") && el.attr("aria-disabled") != Some("true")
            });
            if usable {
                return Ok(Some(raw.to_string()));
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl PageSource for FixturePageSource {
    fn name(&self) -> &'static str {
        "fixture"
    }

    async fn open(&mut self, path: &str) -> std::result::Result<(), PageError> {
        if self.closed {
            return Err(PageError::Closed);
        }
        let index = self
            .position(path)
            .ok_or_else(|| PageError::Navigation(format!("no fixture page for {}", path)))?;
        self.current = Some(index);
        Ok(())
    }

    async fn find(&mut self, selector: &str) -> std::result::Result<Vec<Element>, PageError> {
        let selector = parse_selector(selector)?;
        let document = Html::parse_document(self.page()?);
        Ok(document.select(&selector).map(Element::from_ref).collect())
    }

    async fn reveal(
        &mut self,
        selectors: &[&str],
        _timeout: Duration,
    ) -> std::result::Result<RevealOutcome, PageError> {
        let Some(via) = self.has_control(selectors)? else {
            return Ok(RevealOutcome::Exhausted);
        };
        match self.current {
            Some(index) if index + 1 < self.pages.len() => {
                self.current = Some(index + 1);
                Ok(RevealOutcome::Revealed { via })
            }
            _ => Ok(RevealOutcome::Exhausted),
        }
    }

    async fn close(&mut self) -> std::result::Result<(), PageError> {
        self.closed = true;
        Ok(())
    }
}

fn page_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn last_segment(path: &str) -> &str {
    let path = path.split(['?', '#']).next().unwrap_or(path);
    path.trim_end_matches('/').rsplit('/').next().unwrap_or(path)
}

/// Sort key that orders `page-2` before `page-10`.
fn natural_key(name: &str) -> (String, u64) {
    let digits: String = name
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    let stem = name[..name.len() - digits.len()].to_string();
    (stem, digits.parse().unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pages() -> Vec<(String, String)> {
        vec![
            (
                "/keys".to_string(),
                "<div class='item'>1</div><a class='next' href='#'>next</a>".to_string(),
            ),
            (
                "/keys-2".to_string(),
                "<div class='item'>2</div><a class='next disabled' href='#'>next</a>".to_string(),
            ),
        ]
    }

    #[tokio::test]
    async fn reveal_walks_pages_until_control_is_disabled() {
        let mut source = FixturePageSource::new(pages());
        source.open("https://shop.example.com/keys").await.unwrap();
        assert_eq!(source.find(".item").await.unwrap()[0].text, "1");

        let outcome = source.reveal(&["a.next"], Duration::ZERO).await.unwrap();
        assert_eq!(outcome, RevealOutcome::Revealed { via: "a.next".to_string() });
        assert_eq!(source.find(".item").await.unwrap()[0].text, "2");

        let outcome = source.reveal(&["a.next"], Duration::ZERO).await.unwrap();
        assert_eq!(outcome, RevealOutcome::Exhausted);
    }

    #[tokio::test]
    async fn closed_source_refuses_reads() {
        let mut source = FixturePageSource::new(pages());
        source.open("/keys").await.unwrap();
        source.close().await.unwrap();
        assert!(matches!(source.find(".item").await, Err(PageError::Closed)));
    }

    #[test]
    fn natural_ordering_of_page_names() {
        let mut names = vec!["page-10", "page-2", "page-1"];
        names.sort_by_key(|n| natural_key(n));
        assert_eq!(names, vec!["page-1", "page-2", "page-10"]);
    }

    #[test]
    fn loads_pages_from_glob() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bundles.html"), "<p>a</p>").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "skip").unwrap();
        let pattern = format!("{}/*.html", dir.path().display());
        let source = FixturePageSource::from_glob(&pattern).unwrap();
        assert_eq!(source.pages.len(), 1);
        assert_eq!(source.position("/bundles"), Some(0));
    }
}
