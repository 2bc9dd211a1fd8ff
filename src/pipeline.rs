use crate::collector::{collect, CollectReport, CollectorOptions, StopReason};
use crate::config::{Config, TargetConfig};
use crate::error::{ConfigError, Result};
use crate::export::{export_csv, export_json};
use crate::generator::{CachedGenerator, GeminiGenerator, ResponseCache, RetryingGenerator};
use crate::lesson::{read_topics, LessonBuilder};
use crate::model::Collection;
use crate::page::{PageSource, Session};
use crate::store::{Mismatch, SaveOutcome, SaveReport, Store, StoreOptions, StoreSummary};
use crate::targets::{BundlesTarget, KeysTarget, Target};
use crate::{log_error, log_info, log_warn};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    Bundles,
    Keys,
}

impl FromStr for TargetKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "bundles" => Ok(TargetKind::Bundles),
            "keys" => Ok(TargetKind::Keys),
            other => Err(ConfigError::InvalidValue(format!("unknown target: {}", other))),
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetKind::Bundles => write!(f, "bundles"),
            TargetKind::Keys => write!(f, "keys"),
        }
    }
}

impl TargetKind {
    pub fn settings<'a>(&self, config: &'a Config) -> &'a TargetConfig {
        match self {
            TargetKind::Bundles => &config.bundles,
            TargetKind::Keys => &config.keys,
        }
    }

    pub fn build(&self, config: &Config) -> Result<Box<dyn Target>> {
        Ok(match self {
            TargetKind::Bundles => {
                let base = Url::parse(&config.session.base_url).map_err(|e| {
                    ConfigError::InvalidValue(format!("session.base_url: {}", e))
                })?;
                Box::new(BundlesTarget::new(base))
            }
            TargetKind::Keys => Box::new(KeysTarget::new()),
        })
    }
}

#[derive(Debug)]
pub struct RunReport {
    pub target: &'static str,
    pub pages: usize,
    pub stop: StopReason,
    pub items: usize,
    pub exports: Vec<PathBuf>,
    pub save: SaveReport,
    pub mismatches: Vec<Mismatch>,
}

impl RunReport {
    /// True when the items only made it into the emergency file.
    pub fn is_failed(&self) -> bool {
        self.save.is_failed()
    }
}

/// Scrapes one target end to end: open the session, collect, enrich, close,
/// then export and replace the stored snapshot.
pub async fn run_scrape(config: &Config, kind: TargetKind) -> Result<RunReport> {
    let target = kind.build(config)?;
    let settings = kind.settings(config);

    let mut session = Session::open(config).await?;
    let scraped = scrape(session.source(), target.as_ref(), config, settings).await;
    if let Err(e) = session.close().await {
        log_warn!("[pipeline] Closing the session failed: {}", e);
    }
    let CollectReport {
        collection,
        pages,
        stop,
    } = scraped?;

    let (exports, save, mismatches) =
        persist(config, target.as_ref(), &settings.database, &collection).await?;

    Ok(RunReport {
        target: target.name(),
        pages,
        stop,
        items: collection.len(),
        exports,
        save,
        mismatches,
    })
}

async fn scrape(
    source: &mut dyn PageSource,
    target: &dyn Target,
    config: &Config,
    settings: &TargetConfig,
) -> Result<CollectReport> {
    log_info!("[pipeline] Opening {} at {}", target.name(), settings.start_path);
    source.open(&settings.start_path).await?;

    let options = CollectorOptions::from_config(&config.timing, settings.max_items);
    let mut report = collect(source, target, &options).await?;

    if !report.collection.is_empty() {
        target
            .enrich(source, &mut report.collection, &config.timing)
            .await?;
    }
    Ok(report)
}

/// Exports the collection, saves it and checks the stored snapshot against it.
/// Export problems are logged; a store that cannot be opened or written
/// ends in the emergency file, so only a failure to write that file is an error.
pub async fn persist(
    config: &Config,
    target: &dyn Target,
    database: &str,
    collection: &Collection,
) -> Result<(Vec<PathBuf>, SaveReport, Vec<Mismatch>)> {
    let mut exports = Vec::new();
    if !collection.is_empty() {
        match export_json(&config.export.json_dir, target.name(), collection) {
            Ok(path) => exports.push(path),
            Err(e) => log_error!(e => "[pipeline] JSON export failed"),
        }
        if config.export.csv {
            match export_csv(&config.export.json_dir, target.name(), target.columns(), collection) {
                Ok(path) => exports.push(path),
                Err(e) => log_error!(e => "[pipeline] CSV export failed"),
            }
        }
    }

    let (store, save) = Store::open_and_save(
        database,
        target.name(),
        StoreOptions::from_config(&config.store),
        collection,
    )
    .await?;

    let mismatches = match (&save.outcome, store) {
        (SaveOutcome::Saved(_), Some(store)) => {
            let mismatches = store.verify(collection)?;
            if mismatches.is_empty() {
                log_info!("[pipeline] Verified {} active {} records", collection.len(), target.name());
            }
            for mismatch in &mismatches {
                log_warn!("[pipeline] Verification: {}", mismatch);
            }
            mismatches
        }
        (SaveOutcome::Failed { emergency_file, .. }, _) => {
            log_error!(
                "[pipeline] {} items for {} only saved to {}",
                collection.len(),
                target.name(),
                emergency_file.display()
            );
            Vec::new()
        }
        _ => Vec::new(),
    };

    Ok((exports, save, mismatches))
}

pub fn summary(config: &Config, kind: TargetKind) -> Result<StoreSummary> {
    let settings = kind.settings(config);
    let store = Store::open(
        &settings.database,
        &kind.to_string(),
        StoreOptions::from_config(&config.store),
    )?;
    let summary = store.summary()?;

    log_info!(
        "[summary] {}: {} active of {} records",
        kind,
        summary.active,
        summary.total
    );
    for (category, count) in &summary.by_category {
        log_info!("[summary]   {}: {}", category, count);
    }
    for record in &summary.records {
        log_info!(
            "[summary] [{}] {} (first seen {}, {} items){}",
            record.category,
            record.title,
            record.first_seen.as_deref().unwrap_or("never"),
            record.item_count,
            if record.samples.is_empty() {
                String::new()
            } else {
                format!(": {}", record.samples.join(", "))
            }
        );
    }
    Ok(summary)
}

/// Generates a lesson for every topic in the topics file.
pub async fn run_lessons(config: &Config) -> Result<Vec<PathBuf>> {
    let settings = &config.generator;
    let topics = read_topics(&settings.topics_file)?;
    if topics.is_empty() {
        log_warn!("[lessons] No topics in {}", settings.topics_file);
        return Ok(Vec::new());
    }

    let generator = CachedGenerator::new(
        RetryingGenerator::new(
            GeminiGenerator::from_config(settings)?,
            settings.max_retries,
            Duration::from_secs(settings.base_delay_secs),
        ),
        ResponseCache::load(&settings.cache_file),
    );
    let builder = LessonBuilder::new(&generator, &settings.language, &settings.difficulty);
    let written = builder.build_all(&topics, &settings.output_dir).await;

    log_info!("[lessons] Wrote {}/{} lessons", written.len(), topics.len());
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_names_parse() {
        assert_eq!("keys".parse::<TargetKind>().unwrap(), TargetKind::Keys);
        assert_eq!(TargetKind::Bundles.to_string(), "bundles");
        assert!("books".parse::<TargetKind>().is_err());
    }

    #[test]
    fn targets_read_their_own_section() {
        let config = Config::default();
        assert_eq!(TargetKind::Keys.settings(&config).start_path, "/home/keys");
        let target = TargetKind::Bundles.build(&config).unwrap();
        assert_eq!(target.name(), "bundles");
    }
}
