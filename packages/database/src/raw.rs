//! The raw collection.
//!
//! Each API record is stored as its JSON document plus a sequence number
//! (its offset in the remote ordering). The essential fields are also
//! copied into nullable TEXT columns, verbatim, so they can be indexed and
//! grouped without parsing JSON; nothing about them is validated here.

use duckdb::Connection;
use nyc_crime_complaint_models::{ESSENTIAL_FIELDS, RawComplaintRecord};

use crate::meta::{NEXT_OFFSET, set_meta};
use crate::store::{ComplaintStore, to_i64};
use crate::{Collection, DbError};

/// Number of rows per INSERT statement.
const CHUNK_SIZE: usize = 1_000;

/// Columns bound per row: `seq`, `doc`, then the essential fields.
const PARAMS_PER_ROW: usize = 2 + ESSENTIAL_FIELDS.len();

pub(crate) fn create_schema(conn: &Connection, table: &str) -> Result<(), DbError> {
    let field_columns = ESSENTIAL_FIELDS
        .iter()
        .map(|f| format!("{f} TEXT"))
        .collect::<Vec<_>>()
        .join(",\n            ");

    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            seq BIGINT NOT NULL PRIMARY KEY,
            doc TEXT NOT NULL,
            {field_columns}
        );"
    ))?;

    Ok(())
}

impl ComplaintStore {
    /// Returns the offset a download should resume from.
    ///
    /// The persisted cursor wins. Stores written before the cursor existed
    /// fall back to the record count. A disagreement between the two
    /// (records deleted behind the downloader's back) is logged.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if either query fails.
    pub fn resume_offset(&self) -> Result<u64, DbError> {
        let count = self.count(Collection::Raw)?;
        match self.next_offset()? {
            Some(cursor) => {
                if cursor != count {
                    log::warn!(
                        "{}: cursor is at {cursor} but {count} records are stored; resuming from the cursor",
                        self.table(Collection::Raw)
                    );
                }
                Ok(cursor)
            }
            None => Ok(count),
        }
    }

    /// Stores one page of records fetched at `offset` and advances the
    /// cursor to `offset + records.len()`, all in one transaction.
    ///
    /// Either the whole page and the new cursor are committed or nothing
    /// is. Returns the number of records inserted.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if serialization or any statement fails; the
    /// transaction is rolled back in that case.
    pub fn append_raw_page(
        &self,
        offset: u64,
        records: &[RawComplaintRecord],
    ) -> Result<u64, DbError> {
        if records.is_empty() {
            return Ok(0);
        }

        let docs = records
            .iter()
            .map(serde_json::to_string)
            .collect::<Result<Vec<_>, _>>()?;
        let table = self.table(Collection::Raw).to_string();
        let cursor_key = self.meta_key(NEXT_OFFSET);
        let next_offset = offset + records.len() as u64;

        self.in_transaction(|conn| {
            let mut inserted = 0u64;
            let mut seq = to_i64(offset)?;

            for (chunk, doc_chunk) in records.chunks(CHUNK_SIZE).zip(docs.chunks(CHUNK_SIZE)) {
                let mut stmt = conn.prepare(&insert_sql(&table, chunk.len()))?;
                let mut param_idx = 1usize;

                for (record, doc) in chunk.iter().zip(doc_chunk) {
                    stmt.raw_bind_parameter(param_idx, seq)?;
                    stmt.raw_bind_parameter(param_idx + 1, doc.as_str())?;
                    for (i, field) in ESSENTIAL_FIELDS.iter().enumerate() {
                        stmt.raw_bind_parameter(param_idx + 2 + i, record.text(field))?;
                    }
                    param_idx += PARAMS_PER_ROW;
                    seq += 1;
                }

                let rows = stmt.raw_execute()?;
                inserted += u64::try_from(rows).unwrap_or(0);
            }

            set_meta(conn, &cursor_key, &next_offset.to_string())?;
            Ok(inserted)
        })
    }

    /// Streams the raw collection in storage order, `batch_size` records
    /// at a time.
    #[must_use]
    pub const fn scan_raw(&self, batch_size: usize) -> RawScan<'_> {
        RawScan {
            store: self,
            after_seq: -1,
            batch_size,
            done: false,
        }
    }

    /// Builds the date, borough, offense and coordinate indexes.
    /// Safe to call repeatedly.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if index creation fails.
    pub fn create_raw_indexes(&self) -> Result<(), DbError> {
        let table = self.table(Collection::Raw);
        self.connection().execute_batch(&format!(
            "CREATE INDEX IF NOT EXISTS idx_{table}_date ON {table} (cmplnt_fr_dt);
             CREATE INDEX IF NOT EXISTS idx_{table}_boro ON {table} (boro_nm);
             CREATE INDEX IF NOT EXISTS idx_{table}_ofns ON {table} (ofns_desc);
             CREATE INDEX IF NOT EXISTS idx_{table}_coords ON {table} (latitude, longitude);"
        ))?;
        log::info!("{table}: indexes ready");
        Ok(())
    }
}

fn insert_sql(table: &str, rows: usize) -> String {
    let placeholders = format!("({})", vec!["?"; PARAMS_PER_ROW].join(", "));
    format!(
        "INSERT INTO {table} (seq, doc, {}) VALUES {}",
        ESSENTIAL_FIELDS.join(", "),
        vec![placeholders.as_str(); rows].join(", ")
    )
}

/// Keyset-paginated iterator over the raw collection, yielding batches of
/// records in sequence order. Each batch is a separate query, so no cursor
/// is held open between batches.
pub struct RawScan<'a> {
    store: &'a ComplaintStore,
    after_seq: i64,
    batch_size: usize,
    done: bool,
}

impl RawScan<'_> {
    fn next_batch(&mut self) -> Result<Vec<RawComplaintRecord>, DbError> {
        let sql = format!(
            "SELECT seq, doc FROM {} WHERE seq > ? ORDER BY seq LIMIT {}",
            self.store.table(Collection::Raw),
            self.batch_size.max(1)
        );
        let mut stmt = self.store.connection().prepare(&sql)?;
        let rows = stmt
            .query_map([self.after_seq], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        if let Some((last, _)) = rows.last() {
            self.after_seq = *last;
        }

        rows.into_iter()
            .map(|(_, doc)| Ok(serde_json::from_str(&doc)?))
            .collect()
    }
}

impl Iterator for RawScan<'_> {
    type Item = Result<Vec<RawComplaintRecord>, DbError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_batch() {
            Ok(batch) if batch.is_empty() => {
                self.done = true;
                None
            }
            Ok(batch) => Some(Ok(batch)),
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
