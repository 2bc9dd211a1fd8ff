use crate::error::PageError;
use crate::log_debug;
use crate::page::{parse_selector, Element};
use scraper::Html;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NextLink {
    pub url: String,
    /// The selector that located the link.
    pub via: String,
}

#[derive(Debug)]
pub struct PageInfo {
    pub next: Option<NextLink>,
}

pub struct PageScraper<'a> {
    document: &'a Html,
    base_url: Option<String>,
}

impl<'a> PageScraper<'a> {
    pub(crate) fn new(document: &'a Html) -> Self {
        Self {
            document,
            base_url: None,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Locates the next-page link using `next_selectors` in priority order.
    pub fn analyze(&self, next_selectors: &[&str]) -> Result<PageInfo, PageError> {
        let next = self.get_next_link(next_selectors)?;

        log_debug!(
            "[scraper] Page Analysis - Next: {}",
            next.as_ref().map(|n| n.url.as_str()).unwrap_or("None")
        );

        Ok(PageInfo { next })
    }

    fn get_next_link(&self, selectors: &[&str]) -> Result<Option<NextLink>, PageError> {
        for raw in selectors {
            let selector = parse_selector(raw)?;
            for candidate in self.document.select(&selector) {
                let link = closest_link(candidate);
                let el = Element::from_ref(link);
                if el.has_class("disabled") || el.attr("aria-disabled") == Some("true") {
                    continue;
                }
                let Some(href) = el.attr("href").filter(|h| !h.is_empty() && *h != "#") else {
                    continue;
                };
                return Ok(self.absolutize(href).map(|url| NextLink {
                    url,
                    via: raw.to_string(),
                }));
            }
        }
        Ok(None)
    }

    fn absolutize(&self, href: &str) -> Option<String> {
        match &self.base_url {
            Some(base) => Url::parse(base).ok()?.join(href).ok().map(String::from),
            None => Some(href.to_string()),
        }
    }
}

/// Icons inside pagination links match the selector; the link is the ancestor.
fn closest_link(el: scraper::ElementRef<'_>) -> scraper::ElementRef<'_> {
    if el.value().name() == "a" {
        return el;
    }
    el.ancestors()
        .filter_map(scraper::ElementRef::wrap)
        .find(|a| a.value().name() == "a")
        .unwrap_or(el)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGINATION: &str = r#"
        <div class="pagination">
          <a class="jump-to-page" href="?page=1">1</a>
          <span class="current">2</span>
          <a class="jump-to-page" href="?page=3">3</a>
          <a class="next" href="?page=3"><i class="hb-chevron-right"></i></a>
        </div>"#;

    #[test]
    fn follows_icon_to_enclosing_link() {
        let html = Html::parse_document(PAGINATION);
        let info = PageScraper::new(&html)
            .with_base_url("https://shop.example.com/home/keys?page=2")
            .analyze(&["i.hb-chevron-right"])
            .unwrap();
        assert_eq!(
            info.next.unwrap().url,
            "https://shop.example.com/home/keys?page=3"
        );
    }

    #[test]
    fn skips_disabled_links_and_falls_back() {
        let html = Html::parse_document(
            r#"<a class="next disabled" href="/p/9">next</a><a class="more" href="/p/2">more</a>"#,
        );
        let info = PageScraper::new(&html).analyze(&["a.next", "a.more"]).unwrap();
        let next = info.next.unwrap();
        assert_eq!(next.url, "/p/2");
        assert_eq!(next.via, "a.more");
    }

    #[test]
    fn no_link_means_no_next_page() {
        let html = Html::parse_document("<p>last page</p>");
        let info = PageScraper::new(&html).analyze(&["a.next"]).unwrap();
        assert!(info.next.is_none());
    }
}
