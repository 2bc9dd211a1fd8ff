use crate::error::Result;
use crate::log_info;
use crate::model::{Collection, Item};
use crate::utils::{ensure_directory, save_json, timestamped_path};
use chrono::Local;
use serde::Serialize;
use std::path::{Path, PathBuf};

const LIST_SEPARATOR: &str = "; ";

#[derive(Serialize)]
struct Snapshot<'a> {
    scrape_date: String,
    source: &'a str,
    item_count: usize,
    items: &'a [Item],
}

/// Writes `<dir>/<source>_<timestamp>.json` with the whole collection.
pub fn export_json(dir: impl AsRef<Path>, source: &str, collection: &Collection) -> Result<PathBuf> {
    let now = Local::now();
    let path = timestamped_path(dir, source, "json", now);
    let snapshot = Snapshot {
        scrape_date: now.format("%Y-%m-%d %H:%M:%S").to_string(),
        source,
        item_count: collection.len(),
        items: collection.items(),
    };
    save_json(&snapshot, &path)?;
    log_info!("[export] Wrote {} items to {}", collection.len(), path.display());
    Ok(path)
}

/// Writes one fully quoted row per item. `columns` name scalar fields or
/// lists; lists are joined into a single cell.
pub fn export_csv(
    dir: impl AsRef<Path>,
    source: &str,
    columns: &[&str],
    collection: &Collection,
) -> Result<PathBuf> {
    ensure_directory(dir.as_ref())?;
    let path = timestamped_path(dir, source, "csv", Local::now());

    let mut wtr = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Always)
        .from_path(&path)?;

    let mut header = vec!["key"];
    header.extend_from_slice(columns);
    header.extend_from_slice(&["page", "extracted_at"]);
    wtr.write_record(&header)?;

    for item in collection {
        wtr.write_record(&csv_record(item, columns))?;
    }
    wtr.flush()?;

    log_info!("[export] Wrote {} rows to {}", collection.len(), path.display());
    Ok(path)
}

fn csv_record(item: &Item, columns: &[&str]) -> Vec<String> {
    let mut record = vec![item.key.clone()];
    for column in columns {
        let cell = match (item.field(column), item.lists.get(*column)) {
            (Some(value), _) => value.to_string(),
            (None, Some(values)) => values.join(LIST_SEPARATOR),
            (None, None) => String::new(),
        };
        record.push(cell);
    }
    record.push(item.page.to_string());
    record.push(item.extracted_at.to_rfc3339());
    record
}
