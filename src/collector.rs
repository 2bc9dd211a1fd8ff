use crate::config::TimingConfig;
use crate::error::{AppError, PageError, Result};
use crate::model::Collection;
use crate::page::{PageSource, RevealOutcome};
use crate::targets::Target;
use crate::utils::random_delay;
use crate::{log_error, log_info, log_warn};
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct CollectorOptions {
    pub first_wait: Duration,
    pub reveal_wait: Duration,
    pub poll: Duration,
    pub max_items: usize,
    pub item_delay_ms: (u64, u64),
    pub page_delay_ms: (u64, u64),
}

impl CollectorOptions {
    pub fn from_config(timing: &TimingConfig, max_items: usize) -> Self {
        Self {
            first_wait: Duration::from_secs(timing.first_wait_secs),
            reveal_wait: Duration::from_secs(timing.reveal_wait_secs),
            poll: Duration::from_millis(timing.poll_interval_ms),
            max_items,
            item_delay_ms: (timing.min_item_delay_ms, timing.max_item_delay_ms),
            page_delay_ms: (timing.min_page_delay_ms, timing.max_page_delay_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// A pass over the page added no new items.
    NoGrowth,
    /// No usable reveal control was left.
    RevealExhausted,
    CapReached,
    /// The reveal control errored; what was collected so far is kept.
    RevealFailed(String),
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::NoGrowth => write!(f, "no new items"),
            StopReason::RevealExhausted => write!(f, "no more pages"),
            StopReason::CapReached => write!(f, "item cap reached"),
            StopReason::RevealFailed(e) => write!(f, "reveal failed: {}", e),
        }
    }
}

#[derive(Debug)]
pub struct CollectReport {
    pub collection: Collection,
    pub pages: usize,
    pub stop: StopReason,
}

/// Walks a paginated or growing listing on an already opened page.
///
/// Each pass extracts every container currently visible, keeping only keys not
/// seen before. The loop ends when a pass adds nothing, when the reveal control
/// is gone or broken, or at `max_items`. Only a timeout while waiting for the
/// very first page is an error.
pub async fn collect(
    source: &mut dyn PageSource,
    target: &dyn Target,
    options: &CollectorOptions,
) -> Result<CollectReport> {
    let ready = target.ready_selector();
    if let Err(e) = source.wait_for(ready, options.first_wait, options.poll).await {
        let err = AppError::from(e);
        log_error!(err => "[collector] First page of {} never showed {}", target.name(), ready);
        return Err(err);
    }

    let mut collection = Collection::new();
    let mut page = 1;

    let stop = loop {
        let containers = source.find(target.container_selector()).await?;
        let before = collection.len();

        for (index, container) in containers.iter().enumerate() {
            if collection.len() >= options.max_items {
                break;
            }
            if let Some(item) = target.extract(container, page, index + 1) {
                collection.push(item);
            }
            random_delay(options.item_delay_ms.0, options.item_delay_ms.1).await;
        }

        let added = collection.len() - before;
        log_info!(
            "[collector] {} page {}: {} containers, {} new, {} total",
            target.name(),
            page,
            containers.len(),
            added,
            collection.len()
        );

        if collection.len() >= options.max_items {
            break StopReason::CapReached;
        }
        if added == 0 {
            break StopReason::NoGrowth;
        }

        match source.reveal(target.reveal_selectors(), options.reveal_wait).await {
            Ok(RevealOutcome::Exhausted) => break StopReason::RevealExhausted,
            Ok(RevealOutcome::Revealed { via }) => {
                page += 1;
                log_info!("[collector] Revealed page {} via {}", page, via);
                match source.wait_for(ready, options.reveal_wait, options.poll).await {
                    Ok(_) => {}
                    // The growth check on the next pass decides whether to go on.
                    Err(PageError::Timeout { .. }) => {
                        log_warn!("[collector] Page {} slow to show {}", page, ready)
                    }
                    Err(e) => return Err(e.into()),
                }
                random_delay(options.page_delay_ms.0, options.page_delay_ms.1).await;
            }
            Err(e) => {
                log_warn!("[collector] Reveal on page {} failed: {}", page, e);
                break StopReason::RevealFailed(e.to_string());
            }
        }
    };

    log_info!(
        "[collector] {} finished after {} page(s) with {} items: {}",
        target.name(),
        page,
        collection.len(),
        stop
    );

    Ok(CollectReport {
        collection,
        pages: page,
        stop,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Item;
    use crate::page::{Element, FixturePageSource};

    struct Cards;

    impl Target for Cards {
        fn name(&self) -> &'static str {
            "cards"
        }
        fn ready_selector(&self) -> &'static str {
            ".card"
        }
        fn container_selector(&self) -> &'static str {
            ".card"
        }
        fn reveal_selectors(&self) -> &'static [&'static str] {
            &["a.more"]
        }
        fn columns(&self) -> &'static [&'static str] {
            &["title"]
        }
        fn extract(&self, card: &Element, page: usize, _slot: usize) -> Option<Item> {
            let key = card.attr("data-id")?;
            Some(Item::new(key, page).with_field("title", card.text.clone()))
        }
    }

    fn options(max_items: usize) -> CollectorOptions {
        CollectorOptions {
            first_wait: Duration::from_millis(20),
            reveal_wait: Duration::from_millis(20),
            poll: Duration::from_millis(5),
            max_items,
            item_delay_ms: (0, 0),
            page_delay_ms: (0, 0),
        }
    }

    fn page(ids: &[&str], more: bool) -> String {
        let mut html: String = ids
            .iter()
            .map(|id| format!("<div class='card' data-id='{}'>{}</div>", id, id))
            .collect();
        if more {
            html.push_str("<a class='more' href='#'>more</a>");
        }
        html
    }

    async fn run(pages: Vec<String>, max_items: usize) -> Result<CollectReport> {
        let pages = pages
            .into_iter()
            .enumerate()
            .map(|(i, html)| (format!("list-{}", i + 1), html))
            .collect();
        let mut source = FixturePageSource::new(pages);
        source.open("list-1").await?;
        collect(&mut source, &Cards, &options(max_items)).await
    }

    #[tokio::test]
    async fn no_reveal_control_keeps_first_page_only() {
        let report = run(vec![page(&["a", "b"], false), page(&["c"], false)], 100)
            .await
            .unwrap();
        assert_eq!(report.stop, StopReason::RevealExhausted);
        assert_eq!(report.pages, 1);
        let keys: Vec<&str> = report.collection.iter().map(|i| i.key.as_str()).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn growing_list_stops_when_nothing_new_appears() {
        // A "load more" list re-renders earlier cards alongside the new ones.
        let report = run(
            vec![
                page(&["a", "b"], true),
                page(&["a", "b", "c"], true),
                page(&["a", "b", "c"], true),
            ],
            100,
        )
        .await
        .unwrap();
        assert_eq!(report.stop, StopReason::NoGrowth);
        assert_eq!(report.collection.len(), 3);
        assert_eq!(report.collection.items()[2].page, 2);
    }

    #[tokio::test]
    async fn stops_at_the_item_cap() {
        let report = run(vec![page(&["a", "b"], true), page(&["c", "d"], true)], 3)
            .await
            .unwrap();
        assert_eq!(report.stop, StopReason::CapReached);
        assert_eq!(report.collection.len(), 3);
    }

    #[tokio::test]
    async fn missing_first_container_is_fatal() {
        let err = run(vec!["<p>maintenance</p>".to_string()], 100)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Page(PageError::Timeout { .. })));
    }
}
