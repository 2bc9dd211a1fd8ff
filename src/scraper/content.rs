use super::strategy::{FieldSpec, ListSpec, Locator, Strategy};
use crate::model::UNKNOWN;
use crate::page::{collapse_whitespace, parse_selector, Element};
use crate::{log_debug, log_warn};
use scraper::Html;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    /// `rank` is the index of the strategy that produced the value.
    Found { value: String, rank: usize },
    Missing,
}

pub struct ContentScraper<'a> {
    document: &'a Html,
    element: Option<&'a Element>,
}

impl<'a> ContentScraper<'a> {
    pub(crate) fn new(document: &'a Html, element: Option<&'a Element>) -> Self {
        Self { document, element }
    }

    /// Runs the field's strategies in order; first non-empty value wins.
    pub fn field(&self, spec: &FieldSpec) -> FieldValue {
        for (rank, strategy) in spec.strategies.iter().enumerate() {
            if let Some(value) = self.locate(spec.name, strategy) {
                if rank > 0 {
                    log_debug!(
                        "[scraper] Field '{}' resolved by fallback #{} ({})",
                        spec.name,
                        rank,
                        strategy.describe()
                    );
                }
                return FieldValue::Found { value, rank };
            }
        }
        FieldValue::Missing
    }

    /// Like [`field`](Self::field) but never fails: a missing field becomes
    /// the `Unknown` sentinel and is logged against `item_key`.
    pub fn field_or_unknown(&self, spec: &FieldSpec, item_key: &str) -> String {
        match self.field(spec) {
            FieldValue::Found { value, .. } => value,
            FieldValue::Missing => {
                let tried: Vec<String> = spec.strategies.iter().map(Strategy::describe).collect();
                log_warn!(
                    "[scraper] No value for field '{}' on {} (tried: {})",
                    spec.name,
                    item_key,
                    tried.join(", ")
                );
                UNKNOWN.to_string()
            }
        }
    }

    pub fn list(&self, spec: &ListSpec) -> Vec<String> {
        for raw in &spec.selectors {
            let selector = match parse_selector(raw) {
                Ok(s) => s,
                Err(e) => {
                    log_warn!("[scraper] Skipping list selector for '{}': {}", spec.name, e);
                    continue;
                }
            };
            let values: Vec<String> = self
                .document
                .select(&selector)
                .map(|el| collapse_whitespace(el.text()))
                .filter(|t| !t.is_empty())
                .collect();
            if !values.is_empty() {
                return values;
            }
        }
        Vec::new()
    }

    fn locate(&self, field: &str, strategy: &Strategy) -> Option<String> {
        let raw = match strategy.locator {
            Locator::Text(raw) => {
                let selector = self.selector(field, raw)?;
                self.document
                    .select(&selector)
                    .map(|el| el.text().collect::<String>())
                    .find(|t| !t.trim().is_empty())
            }
            Locator::Attr { selector: raw, attr } => {
                let selector = self.selector(field, raw)?;
                self.document
                    .select(&selector)
                    .filter_map(|el| el.value().attr(attr))
                    .map(str::trim)
                    .find(|v| !v.is_empty())
                    .map(str::to_string)
            }
            Locator::Derived { derive, .. } => self.element.and_then(derive),
        }?;

        // Post-processing sees the raw text, line breaks included.
        let value = match strategy.post {
            Some(post) => post(&raw)?,
            None => raw,
        };
        let value = collapse_whitespace(std::iter::once(value.as_str()));
        (!value.is_empty()).then_some(value)
    }

    fn selector(&self, field: &str, raw: &str) -> Option<scraper::Selector> {
        match parse_selector(raw) {
            Ok(selector) => Some(selector),
            Err(e) => {
                log_warn!("[scraper] Skipping locator for '{}': {}", field, e);
                None
            }
        }
    }
}

/// Returns the label of the first keyword (in table order) found in `markup`,
/// compared case-insensitively, or `default`.
pub fn infer_keyword(markup: &str, table: &[(&str, &str)], default: &str) -> String {
    let markup = markup.to_lowercase();
    table
        .iter()
        .find(|(needle, _)| markup.contains(&needle.to_lowercase()))
        .map(|(_, label)| label.to_string())
        .unwrap_or_else(|| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scraper::strategy::{first_line, strip_quotes};
    use crate::scraper::Scraper;

    fn tile() -> Element {
        let html = Html::parse_fragment(
            r#"<div class="tile">
                 <span class="price-info">  $1 or more
                 to unlock</span>
                 <h3 class="fallback-title">"Tiny Worlds"</h3>
                 <a class="link" href="/games/tiny-worlds"></a>
                 <ul><li>Alpha</li><li> </li><li>Beta</li></ul>
               </div>"#,
        );
        let sel = scraper::Selector::parse("div.tile").unwrap();
        Element::from_ref(html.select(&sel).next().unwrap())
    }

    #[test]
    fn fallback_locator_wins_when_primary_misses() {
        let el = tile();
        let scraper = Scraper::element(&el);
        let spec = FieldSpec::new(
            "title",
            vec![
                Strategy::text(".bundle-title"),
                Strategy::text("h3.fallback-title").then(strip_quotes),
            ],
        );
        assert_eq!(
            scraper.content().field(&spec),
            FieldValue::Found {
                value: "Tiny Worlds".to_string(),
                rank: 1
            }
        );
    }

    #[test]
    fn all_locators_missing_yields_unknown() {
        let el = tile();
        let scraper = Scraper::element(&el);
        let spec = FieldSpec::new("price", vec![Strategy::text(".dd-price"), Strategy::text("label")]);
        assert_eq!(scraper.content().field_or_unknown(&spec, "/games/tiny-worlds"), UNKNOWN);
    }

    #[test]
    fn invalid_selector_only_skips_that_strategy() {
        let el = tile();
        let scraper = Scraper::element(&el);
        let spec = FieldSpec::new(
            "price",
            vec![Strategy::text("span[["), Strategy::text(".price-info").then(first_line)],
        );
        assert_eq!(scraper.content().field_or_unknown(&spec, "k"), "$1 or more");
    }

    #[test]
    fn attribute_and_derived_locators() {
        let el = tile();
        let scraper = Scraper::element(&el);
        let href = FieldSpec::new("url", vec![Strategy::attr("a.link", "href")]);
        assert_eq!(scraper.content().field_or_unknown(&href, "k"), "/games/tiny-worlds");

        let derived = FieldSpec::new(
            "kind",
            vec![Strategy::derived("tag", |el: &Element| Some(el.tag.clone()))],
        );
        assert_eq!(scraper.content().field_or_unknown(&derived, "k"), "div");
    }

    #[test]
    fn list_skips_blank_entries() {
        let el = tile();
        let scraper = Scraper::element(&el);
        let spec = ListSpec::new("contents", vec![".tier-item .caption", "ul li"]);
        assert_eq!(scraper.content().list(&spec), vec!["Alpha", "Beta"]);
    }

    #[test]
    fn keyword_inference_respects_priority() {
        let table = [("steam", "Steam"), ("gog", "GOG")];
        assert_eq!(infer_keyword("<i class='GOG steam'>", &table, UNKNOWN), "Steam");
        assert_eq!(infer_keyword("<i class='gog'>", &table, UNKNOWN), "GOG");
        assert_eq!(infer_keyword("<i>", &table, UNKNOWN), UNKNOWN);
    }
}
