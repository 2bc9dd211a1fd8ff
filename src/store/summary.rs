use crate::model::Collection;
use rusqlite::{params, Connection, OptionalExtension, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

const SAMPLE_SIZE: usize = 3;

#[derive(Debug, Serialize)]
pub struct RecordSummary {
    pub key: String,
    pub title: String,
    pub category: String,
    pub first_seen: Option<String>,
    pub item_count: usize,
    pub samples: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct StoreSummary {
    pub active: usize,
    pub total: usize,
    pub by_category: BTreeMap<String, usize>,
    pub records: Vec<RecordSummary>,
}

pub(crate) fn summarize(conn: &Connection) -> Result<StoreSummary> {
    let total: i64 = conn.query_row("SELECT COUNT(*) FROM records", [], |r| r.get(0))?;

    let mut by_category = BTreeMap::new();
    {
        let mut stmt = conn.prepare(
            "SELECT category, COUNT(*) FROM records WHERE is_active = 1 GROUP BY category",
        )?;
        let rows = stmt.query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?)))?;
        for row in rows {
            let (category, count) = row?;
            by_category.insert(category, count as usize);
        }
    }

    let mut stmt = conn.prepare(
        "SELECT r.id, r.item_key, r.title, r.category, r.first_seen,
                (SELECT COUNT(*) FROM record_values v WHERE v.record_id = r.id)
         FROM records r WHERE r.is_active = 1
         ORDER BY r.category, r.title",
    )?;
    let mut samples = conn.prepare(
        "SELECT value FROM record_values WHERE record_id = ?1 ORDER BY field, position LIMIT ?2",
    )?;

    let mut records = Vec::new();
    let rows = stmt.query_map([], |r| {
        Ok((
            r.get::<_, i64>(0)?,
            r.get::<_, String>(1)?,
            r.get::<_, String>(2)?,
            r.get::<_, String>(3)?,
            r.get::<_, Option<String>>(4)?,
            r.get::<_, i64>(5)?,
        ))
    })?;
    for row in rows {
        let (id, key, title, category, first_seen, item_count) = row?;
        let sample = samples
            .query_map(params![id, SAMPLE_SIZE as i64], |r| r.get(0))?
            .collect::<Result<Vec<String>>>()?;
        records.push(RecordSummary {
            key,
            title,
            category,
            first_seen,
            item_count: item_count as usize,
            samples: sample,
        });
    }

    Ok(StoreSummary {
        active: records.len(),
        total: total as usize,
        by_category,
        records,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mismatch {
    ActiveCount { expected: usize, actual: usize },
    NotActive { key: String },
    ChildCount { key: String, expected: usize, actual: usize },
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mismatch::ActiveCount { expected, actual } => {
                write!(f, "{} active records, expected {}", actual, expected)
            }
            Mismatch::NotActive { key } => write!(f, "{} is not stored as active", key),
            Mismatch::ChildCount {
                key,
                expected,
                actual,
            } => write!(f, "{} has {} child rows, expected {}", key, actual, expected),
        }
    }
}

/// Compares the store's active snapshot with the collection just saved.
pub(crate) fn verify(conn: &Connection, collection: &Collection) -> Result<Vec<Mismatch>> {
    let mut mismatches = Vec::new();

    let active: i64 =
        conn.query_row("SELECT COUNT(*) FROM records WHERE is_active = 1", [], |r| r.get(0))?;
    if active as usize != collection.len() {
        mismatches.push(Mismatch::ActiveCount {
            expected: collection.len(),
            actual: active as usize,
        });
    }

    let mut lookup = conn.prepare(
        "SELECT (SELECT COUNT(*) FROM record_values v WHERE v.record_id = r.id)
         FROM records r WHERE r.item_key = ?1 AND r.is_active = 1",
    )?;
    for item in collection {
        let children: Option<i64> = lookup
            .query_row(params![item.key], |r| r.get(0))
            .optional()?;
        match children {
            None => mismatches.push(Mismatch::NotActive {
                key: item.key.clone(),
            }),
            Some(actual) if actual as usize != item.child_count() => {
                mismatches.push(Mismatch::ChildCount {
                    key: item.key.clone(),
                    expected: item.child_count(),
                    actual: actual as usize,
                })
            }
            Some(_) => {}
        }
    }

    Ok(mismatches)
}
