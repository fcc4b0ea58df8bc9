//! Key/value sync state in the `_meta` table.
//!
//! Keys are scoped by raw collection name (`complaints_2024.next_offset`)
//! so several datasets can share one store file.

use duckdb::Connection;

use crate::store::ComplaintStore;
use crate::{Collection, DbError};

/// Table holding the key/value pairs. Not usable as a collection name.
pub const META_TABLE: &str = "_meta";

/// Offset of the next record to request from the API.
pub const NEXT_OFFSET: &str = "next_offset";
/// Raw record count at the end of the last download.
pub const RECORD_COUNT: &str = "record_count";
/// RFC 3339 timestamp of the last download.
pub const LAST_SYNCED_AT: &str = "last_synced_at";
/// `"true"` once a download reached the end of the data.
pub const FULLY_SYNCED: &str = "fully_synced";

pub(crate) fn create_schema(conn: &Connection) -> Result<(), DbError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );",
    )?;
    Ok(())
}

/// Gets a metadata value from the `_meta` table.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn get_meta(conn: &Connection, key: &str) -> Result<Option<String>, DbError> {
    let mut stmt = conn.prepare("SELECT value FROM _meta WHERE key = ?")?;
    let result = stmt.query_row([key], |row| row.get(0));
    match result {
        Ok(v) => Ok(Some(v)),
        Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(DbError::DuckDb(e)),
    }
}

/// Sets a metadata value in the `_meta` table.
///
/// # Errors
///
/// Returns [`DbError`] if the upsert fails.
pub fn set_meta(conn: &Connection, key: &str, value: &str) -> Result<(), DbError> {
    conn.execute(
        "INSERT INTO _meta (key, value) VALUES (?, ?)
         ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value",
        duckdb::params![key, value],
    )?;
    Ok(())
}

/// Snapshot of a raw collection's download state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncStatus {
    /// Records currently stored.
    pub record_count: u64,
    /// Persisted cursor, if any download has committed a page.
    pub next_offset: Option<u64>,
    /// When the last download finished.
    pub last_synced_at: Option<String>,
    /// Whether a download has reached the end of the data.
    pub fully_synced: bool,
}

impl ComplaintStore {
    pub(crate) fn meta_key(&self, key: &str) -> String {
        format!("{}.{key}", self.table(Collection::Raw))
    }

    /// Reads a metadata value scoped to the raw collection.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the query fails.
    pub fn get_meta(&self, key: &str) -> Result<Option<String>, DbError> {
        get_meta(self.connection(), &self.meta_key(key))
    }

    /// Writes a metadata value scoped to the raw collection.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the upsert fails.
    pub fn set_meta(&self, key: &str, value: &str) -> Result<(), DbError> {
        set_meta(self.connection(), &self.meta_key(key), value)
    }

    /// Returns the persisted download cursor.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the query fails or the stored value is not a
    /// number.
    pub fn next_offset(&self) -> Result<Option<u64>, DbError> {
        self.get_meta(NEXT_OFFSET)?
            .map(|v| {
                v.parse::<u64>().map_err(|e| DbError::Conversion {
                    message: format!("{NEXT_OFFSET} = {v:?}: {e}"),
                })
            })
            .transpose()
    }

    /// Records the outcome of a download run.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the count query or a metadata update fails.
    pub fn update_sync_metadata(&self, fully_synced: bool) -> Result<(), DbError> {
        let count = self.count(Collection::Raw)?;
        let now = chrono::Utc::now().to_rfc3339();

        self.set_meta(RECORD_COUNT, &count.to_string())?;
        self.set_meta(LAST_SYNCED_AT, &now)?;
        self.set_meta(FULLY_SYNCED, if fully_synced { "true" } else { "false" })?;

        Ok(())
    }

    /// Returns the raw collection's download state.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if any query fails.
    pub fn sync_status(&self) -> Result<SyncStatus, DbError> {
        Ok(SyncStatus {
            record_count: self.count(Collection::Raw)?,
            next_offset: self.next_offset()?,
            last_synced_at: self.get_meta(LAST_SYNCED_AT)?,
            fully_synced: self.get_meta(FULLY_SYNCED)?.as_deref() == Some("true"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meta_roundtrip_and_overwrite() {
        let store = ComplaintStore::open_in_memory("raw", "clean").unwrap();
        assert_eq!(store.get_meta("k").unwrap(), None);
        store.set_meta("k", "1").unwrap();
        store.set_meta("k", "2").unwrap();
        assert_eq!(store.get_meta("k").unwrap().as_deref(), Some("2"));
    }

    #[test]
    fn meta_keys_are_scoped_by_collection() {
        let store = ComplaintStore::open_in_memory("raw_a", "clean_a").unwrap();
        store.set_meta(NEXT_OFFSET, "10").unwrap();
        assert_eq!(
            get_meta(store.connection(), "raw_a.next_offset")
                .unwrap()
                .as_deref(),
            Some("10")
        );
        assert_eq!(store.next_offset().unwrap(), Some(10));
    }

    #[test]
    fn fresh_store_has_no_cursor() {
        let store = ComplaintStore::open_in_memory("raw", "clean").unwrap();
        let status = store.sync_status().unwrap();
        assert_eq!(status.record_count, 0);
        assert_eq!(status.next_offset, None);
        assert!(!status.fully_synced);
    }

    #[test]
    fn sync_metadata_marks_full_sync() {
        let store = ComplaintStore::open_in_memory("raw", "clean").unwrap();
        store.update_sync_metadata(true).unwrap();
        let status = store.sync_status().unwrap();
        assert!(status.fully_synced);
        assert!(status.last_synced_at.is_some());
        assert_eq!(store.get_meta(RECORD_COUNT).unwrap().as_deref(), Some("0"));
    }

    #[test]
    fn garbage_cursor_is_conversion_error() {
        let store = ComplaintStore::open_in_memory("raw", "clean").unwrap();
        store.set_meta(NEXT_OFFSET, "lots").unwrap();
        assert!(matches!(
            store.next_offset(),
            Err(DbError::Conversion { .. })
        ));
    }
}
