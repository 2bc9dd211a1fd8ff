//! SQLite snapshot store: one database per source, rewritten as a whole on
//! every save.

mod category;
mod dedup;
mod emergency;
mod schema;
mod summary;

pub use category::Category;
pub use dedup::DedupReport;
pub use emergency::write_emergency_file;
pub use summary::{Mismatch, RecordSummary, StoreSummary};

use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::model::Collection;
use crate::{log_error, log_info, log_warn};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub max_retries: u32,
    pub backoff: Duration,
    pub emergency_dir: PathBuf,
}

impl StoreOptions {
    pub fn from_config(config: &StoreConfig) -> Self {
        Self {
            max_retries: config.max_retries.max(1),
            backoff: Duration::from_millis(config.retry_backoff_ms),
            emergency_dir: PathBuf::from(&config.emergency_dir),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SaveStats {
    pub inserted: usize,
    pub updated: usize,
    pub deactivated: usize,
    pub child_rows: usize,
}

#[derive(Debug)]
pub enum SaveOutcome {
    Saved(SaveStats),
    /// Nothing was collected; the stored snapshot is left as it was.
    Empty,
    /// Every attempt failed and the collection went to `emergency_file`.
    Failed {
        emergency_file: PathBuf,
        last_error: String,
    },
}

#[derive(Debug)]
pub struct SaveReport {
    pub attempts: u32,
    pub dedup_passes: u32,
    pub outcome: SaveOutcome,
}

impl SaveReport {
    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, SaveOutcome::Failed { .. })
    }
}

pub struct Store {
    conn: Connection,
    source: String,
    options: StoreOptions,
}

impl Store {
    /// Opens (or creates) the database, migrates it and repairs duplicate
    /// keys before the unique index goes on.
    pub fn open(path: impl AsRef<Path>, source: &str, options: StoreOptions) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            crate::utils::ensure_directory(parent)?;
        }
        let conn = Connection::open(path).map_err(StoreError::from)?;
        let mut store = Self {
            conn,
            source: source.to_string(),
            options,
        };

        schema::migrate(&store.conn).map_err(StoreError::from)?;
        store.dedup()?;
        log_info!("[store] Opened {} store at {}", store.source, path.display());
        Ok(store)
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn dedup(&mut self) -> Result<DedupReport> {
        dedup::dedup(&mut self.conn).map_err(|e| StoreError::classify(e).into())
    }

    /// Replaces the active snapshot with `collection`.
    ///
    /// Each attempt is one transaction: every record is deactivated, then each
    /// item is updated in place (and reactivated) or inserted, with its child
    /// rows rewritten. A failed attempt rolls back, runs a dedup pass and
    /// retries after the backoff. When the retries run out the collection is
    /// written to an emergency file and the report says `Failed`; only a
    /// failure to write that file is returned as an error.
    pub async fn save(&mut self, collection: &Collection) -> Result<SaveReport> {
        if collection.is_empty() {
            log_warn!(
                "[store] Nothing collected for {}, keeping the previous snapshot",
                self.source
            );
            return Ok(SaveReport {
                attempts: 0,
                dedup_passes: 0,
                outcome: SaveOutcome::Empty,
            });
        }

        let mut dedup_passes = 0;
        let mut last_error = String::new();

        for attempt in 1..=self.options.max_retries {
            match self.try_save(collection) {
                Ok(stats) => {
                    log_info!(
                        "[store] Saved {} {} items on attempt {}: {} new, {} updated, {} deactivated, {} child rows",
                        collection.len(),
                        self.source,
                        attempt,
                        stats.inserted,
                        stats.updated,
                        stats.deactivated,
                        stats.child_rows
                    );
                    return Ok(SaveReport {
                        attempts: attempt,
                        dedup_passes,
                        outcome: SaveOutcome::Saved(stats),
                    });
                }
                Err(e) => {
                    log_warn!(
                        "[store] Save attempt {}/{} for {} failed ({}): {}",
                        attempt,
                        self.options.max_retries,
                        self.source,
                        if e.is_conflict() { "conflict" } else { "sqlite" },
                        e
                    );
                    last_error = e.to_string();
                }
            }

            if attempt < self.options.max_retries {
                dedup_passes += 1;
                if let Err(e) = self.dedup() {
                    log_warn!("[store] Dedup pass before retry failed: {}", e);
                }
                tokio::time::sleep(self.options.backoff).await;
            }
        }

        fail_over(&self.options, &self.source, collection, last_error, dedup_passes)
    }

    /// Opens the store at `path` and saves `collection` into it. Opening is
    /// retried like a save attempt; a store that never opens sends the
    /// collection to the emergency file. The store is returned when it opened.
    pub async fn open_and_save(
        path: impl AsRef<Path>,
        source: &str,
        options: StoreOptions,
        collection: &Collection,
    ) -> Result<(Option<Store>, SaveReport)> {
        let path = path.as_ref();
        let mut last_error = String::new();

        for attempt in 1..=options.max_retries {
            match Store::open(path, source, options.clone()) {
                Ok(mut store) => {
                    let report = store.save(collection).await?;
                    return Ok((Some(store), report));
                }
                Err(e) => {
                    log_warn!(
                        "[store] Opening {} ({}/{}) failed: {}",
                        path.display(),
                        attempt,
                        options.max_retries,
                        e
                    );
                    last_error = e.to_string();
                }
            }
            if attempt < options.max_retries {
                tokio::time::sleep(options.backoff).await;
            }
        }

        if collection.is_empty() {
            log_warn!("[store] {} unreachable and nothing collected for {}", path.display(), source);
            let report = SaveReport {
                attempts: options.max_retries,
                dedup_passes: 0,
                outcome: SaveOutcome::Empty,
            };
            return Ok((None, report));
        }
        let report = fail_over(&options, source, collection, last_error, 0)?;
        Ok((None, report))
    }

    fn try_save(&mut self, collection: &Collection) -> std::result::Result<SaveStats, StoreError> {
        let tx = self.conn.transaction().map_err(StoreError::classify)?;
        // Dropping `tx` on error rolls the attempt back.
        let stats = write_snapshot(&tx, collection).map_err(StoreError::classify)?;
        tx.commit().map_err(StoreError::classify)?;
        Ok(stats)
    }

    pub fn verify(&self, collection: &Collection) -> Result<Vec<Mismatch>> {
        summary::verify(&self.conn, collection).map_err(|e| StoreError::from(e).into())
    }

    pub fn summary(&self) -> Result<StoreSummary> {
        summary::summarize(&self.conn).map_err(|e| StoreError::from(e).into())
    }
}

/// Dumps `collection` after every attempt failed.
fn fail_over(
    options: &StoreOptions,
    source: &str,
    collection: &Collection,
    last_error: String,
    dedup_passes: u32,
) -> Result<SaveReport> {
    log_error!(
        "[store] Giving up on {} after {} attempts: {}",
        source,
        options.max_retries,
        last_error
    );

    let emergency_file = write_emergency_file(&options.emergency_dir, source, collection, &last_error)?;
    Ok(SaveReport {
        attempts: options.max_retries,
        dedup_passes,
        outcome: SaveOutcome::Failed {
            emergency_file,
            last_error,
        },
    })
}

fn write_snapshot(tx: &Transaction<'_>, collection: &Collection) -> rusqlite::Result<SaveStats> {
    let now = Utc::now().to_rfc3339();
    let mut stats = SaveStats::default();

    let was_active: HashSet<i64> = {
        let mut stmt = tx.prepare("SELECT id FROM records WHERE is_active = 1")?;
        let ids = stmt.query_map([], |r| r.get(0))?;
        ids.collect::<rusqlite::Result<_>>()?
    };
    tx.execute("UPDATE records SET is_active = 0 WHERE is_active = 1", [])?;

    let mut confirmed = HashSet::new();
    for item in collection {
        let title = item.title();
        let category = Category::classify(title, &item.key);
        let fields = serde_json::to_string(&item.fields).unwrap_or_else(|_| "{}".to_string());

        let existing: Option<i64> = tx
            .query_row(
                "SELECT id FROM records WHERE item_key = ?1 ORDER BY id DESC LIMIT 1",
                params![item.key],
                |r| r.get(0),
            )
            .optional()?;

        let id = match existing {
            Some(id) => {
                tx.execute(
                    "UPDATE records SET title = ?1, category = ?2, fields = ?3, page = ?4,
                         is_active = 1, last_seen = ?5,
                         first_seen = COALESCE(first_seen, ?5)
                     WHERE id = ?6",
                    params![title, category.as_str(), fields, item.page as i64, now, id],
                )?;
                tx.execute("DELETE FROM record_values WHERE record_id = ?1", params![id])?;
                stats.updated += 1;
                id
            }
            None => {
                tx.execute(
                    "INSERT INTO records (item_key, title, category, fields, page, is_active, first_seen, last_seen)
                     VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?6)",
                    params![item.key, title, category.as_str(), fields, item.page as i64, now],
                )?;
                stats.inserted += 1;
                tx.last_insert_rowid()
            }
        };
        confirmed.insert(id);

        for (field, values) in &item.lists {
            for (position, value) in values.iter().enumerate() {
                tx.execute(
                    "INSERT INTO record_values (record_id, field, value, position) VALUES (?1, ?2, ?3, ?4)",
                    params![id, field, value, position as i64 + 1],
                )?;
                stats.child_rows += 1;
            }
        }
    }

    stats.deactivated = was_active.difference(&confirmed).count();
    Ok(stats)
}
