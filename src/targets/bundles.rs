use super::Target;
use crate::config::TimingConfig;
use crate::error::{PageError, Result};
use crate::model::{Collection, Item, UNKNOWN};
use crate::page::{Element, PageSource};
use crate::scraper::strategy::first_line;
use crate::scraper::{FieldSpec, FieldValue, ListSpec, Scraper, Strategy};
use crate::utils::{random_delay, title_from_url};
use crate::{log_debug, log_info, log_warn};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Local};
use regex::Regex;
use std::time::Duration;
use url::Url;

const COUNTDOWN_SELECTORS: &[&str] = &[
    ".js-countdown-timer",
    ".timer-wrapper",
    "[aria-label*='days']",
];

const DETAIL_READY: &str = "label.preset-price, .price-info, .dd-price, .hero-title, h1";

/// The bundle storefront: one tile per bundle, with price and contents on
/// each bundle's own page.
pub struct BundlesTarget {
    base: Url,
    title: FieldSpec,
    detail_title: FieldSpec,
    price: FieldSpec,
    contents: ListSpec,
}

impl BundlesTarget {
    pub fn new(base: Url) -> Self {
        Self {
            base,
            title: FieldSpec::new(
                "title",
                vec![
                    Strategy::text(".name"),
                    Strategy::text(".tile-title"),
                    Strategy::text("h2"),
                    Strategy::text("h3"),
                    Strategy::derived("url slug", |tile: &Element| {
                        let links = tile.select("a[href]").ok()?;
                        title_from_url(links.first()?.attr("href")?)
                    }),
                ],
            ),
            detail_title: FieldSpec::new(
                "title",
                vec![
                    Strategy::text(".hero-title"),
                    Strategy::text("h1.heading-medium"),
                    Strategy::text(".title-container h1"),
                    Strategy::text("h1"),
                ],
            ),
            price: FieldSpec::new(
                "price",
                vec![
                    Strategy::text("label.preset-price"),
                    Strategy::text(".price-info").then(first_line),
                    Strategy::text(".dd-price"),
                ],
            ),
            contents: ListSpec::new(
                "contents",
                vec![
                    "span.item-title",
                    ".tier-item-content .dd-image-box-caption",
                    ".dd-game-title",
                    ".content-list li",
                ],
            ),
        }
    }

    fn tile_link(&self, tile: &Element) -> Option<String> {
        let href = if tile.tag == "a" {
            tile.attr("href").map(str::to_string)
        } else {
            let links = tile.select("a[href]").ok()?;
            links.first()?.attr("href").map(str::to_string)
        }?;
        self.base.join(href.trim()).ok().map(String::from)
    }

    /// Fills price, contents and, if still unknown, the title from a bundle page.
    fn apply_details(&self, page: &Element, item: &mut Item) {
        let scraper = Scraper::element(page);
        let content = scraper.content();

        let price = content.field_or_unknown(&self.price, &item.key);
        item.fields.insert("price".to_string(), price);

        if item.title() == UNKNOWN {
            if let FieldValue::Found { value, .. } = content.field(&self.detail_title) {
                item.fields.insert("title".to_string(), value);
            }
        }

        let contents = content.list(&self.contents);
        if contents.is_empty() {
            log_debug!("[bundles] No contents list found for {}", item.key);
        }
        item.lists.insert("contents".to_string(), contents);
    }
}

#[async_trait]
impl Target for BundlesTarget {
    fn name(&self) -> &'static str {
        "bundles"
    }

    fn ready_selector(&self) -> &'static str {
        ".tile-holder"
    }

    fn container_selector(&self) -> &'static str {
        ".tile-holder"
    }

    fn reveal_selectors(&self) -> &'static [&'static str] {
        &["button.js-load-more", ".pagination a.next", "a[rel='next']"]
    }

    fn columns(&self) -> &'static [&'static str] {
        &["title", "price", "expiration_date", "contents"]
    }

    fn extract(&self, tile: &Element, page: usize, _slot: usize) -> Option<Item> {
        let Some(url) = self.tile_link(tile) else {
            log_warn!("[bundles] Tile on page {} has no link, skipping", page);
            return None;
        };

        let scraper = Scraper::element(tile);
        let title = scraper.content().field_or_unknown(&self.title, &url);

        let expiration = match parse_countdown(tile) {
            Some(left) => (Local::now() + left).format("%Y-%m-%d %H:%M:%S").to_string(),
            None => {
                log_warn!("[bundles] No countdown for {} (tried: {})", url, COUNTDOWN_SELECTORS.join(", "));
                UNKNOWN.to_string()
            }
        };

        Some(
            Item::new(url, page)
                .with_field("title", title)
                .with_field("price", UNKNOWN)
                .with_field("expiration_date", expiration)
                .with_list("contents", Vec::<String>::new()),
        )
    }

    async fn enrich(
        &self,
        source: &mut dyn PageSource,
        collection: &mut Collection,
        timing: &TimingConfig,
    ) -> Result<()> {
        let total = collection.len();
        let wait = Duration::from_secs(timing.first_wait_secs);
        let poll = Duration::from_millis(timing.poll_interval_ms);

        for (index, item) in collection.iter_mut().enumerate() {
            log_info!("[bundles] Details {}/{}: {}", index + 1, total, item.key);

            let loaded = match source.open(&item.key).await {
                Ok(()) => source.wait_for(DETAIL_READY, wait, poll).await.map(|_| ()),
                Err(e) => Err(e),
            };
            match loaded {
                Ok(()) => {}
                Err(PageError::Closed) => return Err(PageError::Closed.into()),
                Err(e) => {
                    log_warn!("[bundles] Keeping listing data for {}: {}", item.key, e);
                    continue;
                }
            }

            let bodies = source.find("body").await?;
            match bodies.first() {
                Some(body) => self.apply_details(body, item),
                None => log_warn!("[bundles] Empty detail page for {}", item.key),
            }

            random_delay(timing.min_item_delay_ms, timing.max_item_delay_ms).await;
        }
        Ok(())
    }
}

/// Time left on a tile's countdown, read from its `.js-days`/`.js-hours`/
/// `.js-minutes` spans or, failing that, from an aria-label such as
/// "3 days, 4 hours, 5 minutes, and 6 seconds left".
pub fn parse_countdown(tile: &Element) -> Option<ChronoDuration> {
    let timer = COUNTDOWN_SELECTORS
        .iter()
        .find_map(|s| tile.select(s).ok().and_then(|found| found.into_iter().next()))?;

    from_spans(&timer).or_else(|| timer.attr("aria-label").and_then(from_label))
}

fn from_spans(timer: &Element) -> Option<ChronoDuration> {
    let number = |selector: &str| -> Option<i64> {
        let span = timer.select(selector).ok()?.into_iter().next()?;
        let digits: String = span.text.chars().filter(char::is_ascii_digit).collect();
        digits.parse().ok()
    };
    // A missing days span means under a day is left.
    let days = number(".js-days").unwrap_or(0);
    let hours = number(".js-hours")?;
    let minutes = number(".js-minutes")?;
    Some(ChronoDuration::days(days) + ChronoDuration::hours(hours) + ChronoDuration::minutes(minutes))
}

fn from_label(label: &str) -> Option<ChronoDuration> {
    let re = Regex::new(r"(?i)(\d+)\s*(day|hour|minute)").ok()?;
    let mut total = None;
    for cap in re.captures_iter(label) {
        let value: i64 = cap[1].parse().ok()?;
        let part = match cap[2].to_lowercase().as_str() {
            "day" => ChronoDuration::days(value),
            "hour" => ChronoDuration::hours(value),
            _ => ChronoDuration::minutes(value),
        };
        total = Some(total.unwrap_or_else(ChronoDuration::zero) + part);
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::FixturePageSource;
    use scraper::{Html, Selector};

    fn tiles(html: &str) -> Vec<Element> {
        Html::parse_document(html)
            .select(&Selector::parse(".tile-holder").unwrap())
            .map(Element::from_ref)
            .collect()
    }

    fn target() -> BundlesTarget {
        BundlesTarget::new(Url::parse("https://shop.example.com/bundles").unwrap())
    }

    #[test]
    fn countdown_from_spans() {
        let tile = &tiles(
            r#"<div class="tile-holder"><div class="js-countdown-timer">
                 <span class="js-days">3 Days Left</span><span class="js-hours">04</span>
                 <span class="js-minutes">05</span></div></div>"#,
        )[0];
        assert_eq!(
            parse_countdown(tile),
            Some(ChronoDuration::days(3) + ChronoDuration::hours(4) + ChronoDuration::minutes(5))
        );
    }

    #[test]
    fn countdown_falls_back_to_aria_label() {
        let tile = &tiles(
            r#"<div class="tile-holder"><div class="timer-wrapper"
                 aria-label="1 day, 2 hours, 30 minutes, and 10 seconds left"></div></div>"#,
        )[0];
        assert_eq!(
            parse_countdown(tile),
            Some(ChronoDuration::days(1) + ChronoDuration::hours(2) + ChronoDuration::minutes(30))
        );
    }

    #[test]
    fn tile_without_title_uses_url_slug() {
        let tile = &tiles(
            r#"<div class="tile-holder"><a href="/games/tiny-worlds-bundle?hmb=1"><img></a></div>"#,
        )[0];
        let item = target().extract(tile, 1, 1).unwrap();
        assert_eq!(item.key, "https://shop.example.com/games/tiny-worlds-bundle?hmb=1");
        assert_eq!(item.title(), "Tiny Worlds Bundle");
        assert_eq!(item.field("expiration_date"), Some(UNKNOWN));
        assert_eq!(item.field("price"), Some(UNKNOWN));
    }

    #[test]
    fn tile_without_link_is_skipped() {
        let tile = &tiles(r#"<div class="tile-holder"><span class="name">Orphan</span></div>"#)[0];
        assert!(target().extract(tile, 1, 1).is_none());
    }

    #[tokio::test]
    async fn enrich_reads_detail_pages_and_survives_missing_ones() {
        let target = target();
        let mut collection: Collection = [
            Item::new("https://shop.example.com/games/alpha", 1).with_field("title", UNKNOWN),
            Item::new("https://shop.example.com/games/missing", 1).with_field("title", "Missing"),
        ]
        .into_iter()
        .collect();

        let mut source = FixturePageSource::new(vec![(
            "alpha".to_string(),
            r#"<h1 class="hero-title">Alpha Bundle</h1>
               <div class="price-info">$12.00
               pay what you want</div>
               <span class="item-title">One</span><span class="item-title">Two</span>"#
                .to_string(),
        )]);
        let timing = TimingConfig {
            first_wait_secs: 0,
            min_item_delay_ms: 0,
            max_item_delay_ms: 0,
            ..TimingConfig::default()
        };

        target.enrich(&mut source, &mut collection, &timing).await.unwrap();

        let alpha = &collection.items()[0];
        assert_eq!(alpha.title(), "Alpha Bundle");
        assert_eq!(alpha.field("price"), Some("$12.00"));
        assert_eq!(alpha.lists["contents"], vec!["One", "Two"]);

        let missing = &collection.items()[1];
        assert_eq!(missing.title(), "Missing");
        assert!(missing.lists.is_empty());
    }
}
