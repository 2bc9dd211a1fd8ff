use crate::log_info;
use rusqlite::{Connection, Result};

pub(crate) const UNIQUE_KEY_INDEX: &str = "idx_records_key";

/// Creates the tables and brings older databases up to the current columns.
/// The unique key index is created separately, after duplicates are repaired.
pub(crate) fn migrate(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            item_key TEXT NOT NULL,
            title TEXT NOT NULL DEFAULT 'Unknown',
            category TEXT NOT NULL DEFAULT 'Other',
            fields TEXT NOT NULL DEFAULT '{}',
            page INTEGER NOT NULL DEFAULT 0,
            is_active INTEGER NOT NULL DEFAULT 1,
            first_seen TEXT,
            last_seen TEXT
        );",
        [],
    )?;

    // Databases written by earlier versions only had key, title and flag.
    ensure_column(conn, "records", "category", "TEXT NOT NULL DEFAULT 'Other'")?;
    ensure_column(conn, "records", "fields", "TEXT NOT NULL DEFAULT '{}'")?;
    ensure_column(conn, "records", "page", "INTEGER NOT NULL DEFAULT 0")?;
    ensure_column(conn, "records", "is_active", "INTEGER NOT NULL DEFAULT 1")?;
    ensure_column(conn, "records", "first_seen", "TEXT")?;
    ensure_column(conn, "records", "last_seen", "TEXT")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS record_values (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            record_id INTEGER NOT NULL,
            field TEXT NOT NULL,
            value TEXT NOT NULL,
            position INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY (record_id) REFERENCES records (id)
        );",
        [],
    )?;
    ensure_column(conn, "record_values", "position", "INTEGER NOT NULL DEFAULT 0")?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_records_active ON records(is_active);",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_records_category ON records(category);",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_values_record ON record_values(record_id);",
        [],
    )?;

    Ok(())
}

pub(crate) fn create_unique_key_index(conn: &Connection) -> Result<()> {
    conn.execute(
        &format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS {} ON records(item_key);",
            UNIQUE_KEY_INDEX
        ),
        [],
    )?;
    Ok(())
}

fn ensure_column(conn: &Connection, table: &str, column: &str, column_type: &str) -> Result<()> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let mut exists = false;
    let rows = stmt.query_map([], |row| {
        let name: String = row.get(1)?; // 2nd column is name
        Ok(name)
    })?;
    for r in rows {
        if r? == column {
            exists = true;
            break;
        }
    }
    if !exists {
        log_info!("[store] Adding column {}.{}", table, column);
        conn.execute(
            &format!("ALTER TABLE {} ADD COLUMN {} {}", table, column, column_type),
            [],
        )?;
    }
    Ok(())
}
