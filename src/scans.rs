//! Badge-scan source.
//!
//! The tracker only needs two reads from the store: the enabled persons in
//! priority order, and one person's scan timestamps in a half-open window.
//! `SqliteScanStore` is the bundled implementation.

use std::path::Path;

use chrono::NaiveDateTime;
use rusqlite::{params, Connection};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Identity of a tracked person, as stored in the holder table.
pub type PersonId = String;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Read access to badge scans.
pub trait ScanQuery {
    /// Scan timestamps for `person` in `[from, to)`, oldest first.
    fn list_scans(
        &self,
        person: &str,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> Result<Vec<NaiveDateTime>>;

    /// Enabled persons in priority order, without duplicates.
    fn list_tracked_persons(&self) -> Result<Vec<PersonId>>;
}

impl<T: ScanQuery + ?Sized> ScanQuery for &T {
    fn list_scans(
        &self,
        person: &str,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> Result<Vec<NaiveDateTime>> {
        (**self).list_scans(person, from, to)
    }

    fn list_tracked_persons(&self) -> Result<Vec<PersonId>> {
        (**self).list_tracked_persons()
    }
}

/// A scan from a badge nobody has registered yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnregisteredScan {
    pub badge_id: String,
    pub scanned_at: NaiveDateTime,
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS badge_holders (
    badge_id TEXT PRIMARY KEY,
    person   TEXT NOT NULL,
    enabled  INTEGER NOT NULL DEFAULT 1,
    priority INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE IF NOT EXISTS badge_scans (
    badge_id   TEXT NOT NULL,
    scanned_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_badge_scans_at ON badge_scans (scanned_at);
";

pub struct SqliteScanStore {
    conn: Connection,
}

impl SqliteScanStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        conn.execute_batch(SCHEMA)?;
        info!("Opened scan store at {}", path.as_ref().display());
        Ok(Self { conn })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    pub fn register_holder(
        &self,
        badge_id: &str,
        person: &str,
        enabled: bool,
        priority: i64,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO badge_holders (badge_id, person, enabled, priority)
             VALUES (?1, ?2, ?3, ?4)",
            params![badge_id, person, enabled, priority],
        )?;
        Ok(())
    }

    pub fn insert_scan(&self, badge_id: &str, scanned_at: NaiveDateTime) -> Result<()> {
        self.conn.execute(
            "INSERT INTO badge_scans (badge_id, scanned_at) VALUES (?1, ?2)",
            params![badge_id, scanned_at.format(TIMESTAMP_FORMAT).to_string()],
        )?;
        Ok(())
    }

    /// Most recent scans from badges without a holder, one row per badge.
    pub fn recent_unregistered(&self, limit: usize) -> Result<Vec<UnregisteredScan>> {
        let mut stmt = self.conn.prepare(
            "SELECT s.badge_id, s.scanned_at
             FROM badge_scans s LEFT JOIN badge_holders h ON (s.badge_id = h.badge_id)
             WHERE h.person IS NULL
             ORDER BY s.scanned_at DESC
             LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut scans: Vec<UnregisteredScan> = Vec::new();
        for row in rows {
            let (badge_id, raw) = row?;
            if scans.iter().any(|s| s.badge_id == badge_id) {
                continue;
            }
            scans.push(UnregisteredScan {
                badge_id,
                scanned_at: parse_timestamp(&raw)?,
            });
        }
        Ok(scans)
    }
}

impl ScanQuery for SqliteScanStore {
    fn list_scans(
        &self,
        person: &str,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> Result<Vec<NaiveDateTime>> {
        let mut stmt = self.conn.prepare(
            "SELECT s.scanned_at
             FROM badge_scans s JOIN badge_holders h ON (s.badge_id = h.badge_id)
             WHERE s.scanned_at >= ?1 AND s.scanned_at < ?2 AND h.person = ?3
             ORDER BY s.scanned_at",
        )?;
        let rows = stmt.query_map(
            params![
                from.format(TIMESTAMP_FORMAT).to_string(),
                to.format(TIMESTAMP_FORMAT).to_string(),
                person
            ],
            |row| row.get::<_, String>(0),
        )?;

        let mut timestamps = Vec::new();
        for row in rows {
            timestamps.push(parse_timestamp(&row?)?);
        }
        debug!("{person}: {} scans in [{from}, {to})", timestamps.len());
        Ok(timestamps)
    }

    fn list_tracked_persons(&self) -> Result<Vec<PersonId>> {
        let mut stmt = self.conn.prepare(
            "SELECT person FROM badge_holders WHERE enabled = 1 ORDER BY priority, rowid",
        )?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut persons: Vec<PersonId> = Vec::new();
        for row in rows {
            let person = row?;
            if !persons.contains(&person) {
                persons.push(person);
            }
        }
        Ok(persons)
    }
}

fn parse_timestamp(raw: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
        .map_err(|e| Error::DataSource(format!("garbled scan timestamp {raw:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, 16)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn tracked_persons_follow_priority_and_skip_disabled() {
        let store = SqliteScanStore::open_in_memory().unwrap();
        store.register_holder("b1", "Alice", true, 2).unwrap();
        store.register_holder("b2", "Bob", true, 1).unwrap();
        store.register_holder("b3", "Carol", false, 0).unwrap();
        store.register_holder("b4", "Bob", true, 3).unwrap();

        assert_eq!(store.list_tracked_persons().unwrap(), vec!["Bob", "Alice"]);
    }

    #[test]
    fn scans_are_half_open_and_merged_across_badges() {
        let store = SqliteScanStore::open_in_memory().unwrap();
        store.register_holder("b1", "Alice", true, 0).unwrap();
        store.register_holder("b2", "Alice", true, 0).unwrap();
        store.register_holder("b3", "Bob", true, 0).unwrap();
        store.insert_scan("b1", at(9, 0, 1)).unwrap();
        store.insert_scan("b2", at(8, 30, 0)).unwrap();
        store.insert_scan("b3", at(10, 0, 0)).unwrap();
        store.insert_scan("b1", at(0, 0, 0)).unwrap();

        let from = at(0, 0, 0);
        let to = at(9, 0, 1);
        let scans = store.list_scans("Alice", from, to).unwrap();
        assert_eq!(scans, vec![at(0, 0, 0), at(8, 30, 0)]);
    }

    #[test]
    fn unregistered_badges_are_deduplicated_newest_first() {
        let store = SqliteScanStore::open_in_memory().unwrap();
        store.register_holder("known", "Alice", true, 0).unwrap();
        store.insert_scan("known", at(9, 0, 0)).unwrap();
        store.insert_scan("stray", at(9, 5, 0)).unwrap();
        store.insert_scan("stray", at(9, 10, 0)).unwrap();
        store.insert_scan("other", at(9, 7, 0)).unwrap();

        let unknown = store.recent_unregistered(10).unwrap();
        assert_eq!(
            unknown,
            vec![
                UnregisteredScan { badge_id: "stray".into(), scanned_at: at(9, 10, 0) },
                UnregisteredScan { badge_id: "other".into(), scanned_at: at(9, 7, 0) },
            ]
        );
    }

    #[test]
    fn garbled_rows_surface_as_data_source_errors() {
        let store = SqliteScanStore::open_in_memory().unwrap();
        store.register_holder("b1", "Alice", true, 0).unwrap();
        store
            .conn
            .execute(
                "INSERT INTO badge_scans (badge_id, scanned_at) VALUES ('b1', '2026-10-16 0x:00:00')",
                [],
            )
            .unwrap();

        let err = store
            .list_scans("Alice", at(0, 0, 0), at(23, 59, 59))
            .unwrap_err();
        assert!(matches!(err, Error::DataSource(_)));
    }
}
