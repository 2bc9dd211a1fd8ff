//! Per-site schemas: where the items live on the page and how to read them.

mod bundles;
mod keys;

pub use bundles::{parse_countdown, BundlesTarget};
pub use keys::KeysTarget;

use crate::config::TimingConfig;
use crate::error::Result;
use crate::model::{Collection, Item};
use crate::page::{Element, PageSource};
use async_trait::async_trait;

#[async_trait]
pub trait Target: Send + Sync {
    /// Source label used for logs, exports and the emergency file.
    fn name(&self) -> &'static str;

    /// Present once the first page has rendered its items.
    fn ready_selector(&self) -> &'static str;

    /// One match per item.
    fn container_selector(&self) -> &'static str;

    /// Controls that reveal more items, best first.
    fn reveal_selectors(&self) -> &'static [&'static str];

    /// Export column order; scalar fields and lists alike.
    fn columns(&self) -> &'static [&'static str];

    /// Reads one container. `None` skips it without affecting the others.
    fn extract(&self, container: &Element, page: usize, slot: usize) -> Option<Item>;

    /// Optional second pass over the collected items, e.g. visiting detail pages.
    async fn enrich(
        &self,
        _source: &mut dyn PageSource,
        _collection: &mut Collection,
        _timing: &TimingConfig,
    ) -> Result<()> {
        Ok(())
    }
}
