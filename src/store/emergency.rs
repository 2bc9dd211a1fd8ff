use crate::error::Result;
use crate::log_warn;
use crate::model::{Collection, Item};
use crate::utils::{save_json, timestamped_path};
use chrono::Local;
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Serialize)]
struct EmergencySnapshot<'a> {
    source: &'a str,
    scrape_date: String,
    error_note: &'static str,
    last_error: &'a str,
    item_count: usize,
    items: &'a [Item],
}

/// Dumps the whole collection next to the reason the database refused it.
/// Never overwrites an earlier dump from the same second.
pub fn write_emergency_file(
    dir: impl AsRef<Path>,
    source: &str,
    collection: &Collection,
    last_error: &str,
) -> Result<PathBuf> {
    let now = Local::now();
    let prefix = format!("emergency_{}", source);
    let mut path = timestamped_path(dir.as_ref(), &prefix, "json", now);
    let mut n = 1;
    while path.exists() {
        let stem = format!("{}_{}_{}", prefix, now.format("%Y%m%d_%H%M%S"), n);
        path = dir.as_ref().join(format!("{}.json", stem));
        n += 1;
    }

    let snapshot = EmergencySnapshot {
        source,
        scrape_date: now.format("%Y-%m-%d %H:%M:%S").to_string(),
        error_note: "database save failed after all retries; items kept here for manual import",
        last_error,
        item_count: collection.len(),
        items: collection.items(),
    };
    save_json(&snapshot, &path)?;

    log_warn!(
        "[store] Saved {} {} items to emergency file {}",
        collection.len(),
        source,
        path.display()
    );
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_overwrites_an_existing_dump() {
        let dir = tempfile::tempdir().unwrap();
        let collection: Collection = [Item::new("/bundle/a", 1).with_field("title", "A")]
            .into_iter()
            .collect();

        let first = write_emergency_file(dir.path(), "bundles", &collection, "disk full").unwrap();
        let second = write_emergency_file(dir.path(), "bundles", &collection, "disk full").unwrap();
        assert_ne!(first, second);

        let dump: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&second).unwrap()).unwrap();
        assert_eq!(dump["source"], "bundles");
        assert_eq!(dump["item_count"], 1);
        assert_eq!(dump["last_error"], "disk full");
        assert_eq!(dump["items"][0]["key"], "/bundle/a");
    }
}
