use super::schema::create_unique_key_index;
use crate::log_info;
use rusqlite::{params, Connection, Result};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DedupReport {
    pub keys_repaired: usize,
    pub records_removed: usize,
    pub values_moved: usize,
    pub values_removed: usize,
}

impl DedupReport {
    pub fn changed(&self) -> bool {
        self.records_removed > 0 || self.values_removed > 0
    }
}

/// Repairs duplicate keys in one transaction.
///
/// For each key stored more than once the newest record (highest id) wins: it
/// inherits the losers' child rows and stays active if any of them was. Child
/// rows repeating the same (record, field, value) are then collapsed to the
/// earliest one. Finishes by (re)creating the unique key index.
pub(crate) fn dedup(conn: &mut Connection) -> Result<DedupReport> {
    let tx = conn.transaction()?;
    let mut report = DedupReport::default();

    let groups: Vec<(String, i64, i64)> = {
        let mut stmt = tx.prepare(
            "SELECT item_key, MAX(id), MAX(is_active) FROM records
             GROUP BY item_key HAVING COUNT(*) > 1",
        )?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?;
        rows.collect::<Result<_>>()?
    };

    for (key, winner, active) in &groups {
        report.values_moved += tx.execute(
            "UPDATE record_values SET record_id = ?1
             WHERE record_id IN (SELECT id FROM records WHERE item_key = ?2 AND id <> ?1)",
            params![winner, key],
        )?;
        report.records_removed += tx.execute(
            "DELETE FROM records WHERE item_key = ?1 AND id <> ?2",
            params![key, winner],
        )?;
        tx.execute(
            "UPDATE records SET is_active = ?1 WHERE id = ?2",
            params![active, winner],
        )?;
        report.keys_repaired += 1;
    }

    report.values_removed = tx.execute(
        "DELETE FROM record_values WHERE id NOT IN (
            SELECT MIN(id) FROM record_values GROUP BY record_id, field, value
        )",
        [],
    )?;

    create_unique_key_index(&tx)?;
    tx.commit()?;

    if report.changed() {
        log_info!(
            "[store] Dedup: {} keys repaired, {} records removed, {} values moved, {} values removed",
            report.keys_repaired,
            report.records_removed,
            report.values_moved,
            report.values_removed
        );
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::schema::migrate;

    fn seeded() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        conn.execute_batch(
            "INSERT INTO records (id, item_key, title, is_active) VALUES
                (1, '/bundle/a', 'A old', 1),
                (2, '/bundle/b', 'B', 1),
                (3, '/bundle/a', 'A new', 0);
             INSERT INTO record_values (record_id, field, value, position) VALUES
                (1, 'contents', 'x', 1),
                (1, 'contents', 'y', 2),
                (3, 'contents', 'x', 1);",
        )
        .unwrap();
        conn
    }

    #[test]
    fn newest_record_wins_and_inherits_children() {
        let mut conn = seeded();
        let report = dedup(&mut conn).unwrap();
        assert_eq!(report.keys_repaired, 1);
        assert_eq!(report.records_removed, 1);
        assert_eq!(report.values_moved, 2);
        assert_eq!(report.values_removed, 1);

        let (id, title, active): (i64, String, i64) = conn
            .query_row(
                "SELECT id, title, is_active FROM records WHERE item_key = '/bundle/a'",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .unwrap();
        assert_eq!((id, title.as_str(), active), (3, "A new", 1));

        let values: Vec<String> = conn
            .prepare("SELECT value FROM record_values WHERE record_id = 3 ORDER BY id")
            .unwrap()
            .query_map([], |r| r.get(0))
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(values, vec!["x", "y"]);
    }

    #[test]
    fn leaves_a_unique_index_behind() {
        let mut conn = seeded();
        dedup(&mut conn).unwrap();
        let err = conn
            .execute("INSERT INTO records (item_key) VALUES ('/bundle/b')", [])
            .unwrap_err();
        assert_eq!(
            err.sqlite_error_code(),
            Some(rusqlite::ErrorCode::ConstraintViolation)
        );
    }

    #[test]
    fn clean_database_is_untouched() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        let report = dedup(&mut conn).unwrap();
        assert!(!report.changed());
    }
}
