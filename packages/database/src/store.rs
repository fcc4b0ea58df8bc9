//! The store handle.
//!
//! A [`ComplaintStore`] owns one `DuckDB` connection and knows the names of
//! the raw and clean collections. It is opened explicitly, passed by
//! reference to whatever needs it, and closed with [`ComplaintStore::close`]
//! (dropping it also releases the connection).

use std::path::Path;

use duckdb::Connection;
use nyc_crime_complaint_models::ESSENTIAL_FIELDS;

use crate::DbError;

/// Which of the two collections an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    /// Records as fetched from the API.
    Raw,
    /// Records that passed validation.
    Clean,
}

/// A group key and the number of records sharing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupCount {
    /// Field value; `None` for records where the field is null.
    pub key: Option<String>,
    /// Number of records.
    pub count: u64,
}

/// Handle to the `DuckDB` file holding both collections.
pub struct ComplaintStore {
    conn: Connection,
    raw: String,
    clean: String,
}

impl ComplaintStore {
    /// Opens (or creates) the store at `path` and ensures the raw
    /// collection and `_meta` table exist.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a collection name is not a plain identifier,
    /// names `_meta`, or both names refer to the same table, or if the
    /// connection or schema creation fails.
    pub fn open(path: &Path, raw: &str, clean: &str) -> Result<Self, DbError> {
        check_collections(raw, clean)?;

        if let Some(parent) = path.parent() {
            crate::paths::ensure_dir(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("SET memory_limit = '512MB';")?;

        log::debug!("Opened complaint store at {}", path.display());
        Self::init(conn, raw, clean)
    }

    /// Opens a throwaway in-memory store.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a collection name is invalid or schema
    /// creation fails.
    pub fn open_in_memory(raw: &str, clean: &str) -> Result<Self, DbError> {
        check_collections(raw, clean)?;
        Self::init(Connection::open_in_memory()?, raw, clean)
    }

    fn init(conn: Connection, raw: &str, clean: &str) -> Result<Self, DbError> {
        let store = Self {
            conn,
            raw: raw.to_string(),
            clean: clean.to_string(),
        };
        crate::meta::create_schema(&store.conn)?;
        crate::raw::create_schema(&store.conn, &store.raw)?;
        Ok(store)
    }

    /// Closes the connection, surfacing any error the drop would swallow.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if `DuckDB` fails to close cleanly.
    pub fn close(self) -> Result<(), DbError> {
        self.conn.close().map_err(|(_, e)| DbError::DuckDb(e))
    }

    /// Borrows the underlying connection for read-only aggregate queries.
    #[must_use]
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Returns the table name backing `collection`.
    #[must_use]
    pub fn table(&self, collection: Collection) -> &str {
        match collection {
            Collection::Raw => &self.raw,
            Collection::Clean => &self.clean,
        }
    }

    /// Whether the collection's table exists yet. The clean collection is
    /// only created by the first cleaning pass.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the catalog query fails.
    pub fn exists(&self, collection: Collection) -> Result<bool, DbError> {
        let mut stmt = self
            .conn
            .prepare("SELECT COUNT(*) FROM information_schema.tables WHERE table_name = ?")?;
        let count: i64 = stmt.query_row([self.table(collection)], |row| row.get(0))?;
        Ok(count > 0)
    }

    /// Returns the number of records in `collection` (0 if it does not
    /// exist yet).
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the query fails.
    pub fn count(&self, collection: Collection) -> Result<u64, DbError> {
        if !self.exists(collection)? {
            return Ok(0);
        }
        let sql = format!("SELECT COUNT(*) FROM {}", self.table(collection));
        let count: i64 = self.conn.prepare(&sql)?.query_row([], |row| row.get(0))?;
        to_u64(count)
    }

    /// Counts records grouped by `field`, largest groups first (ties broken
    /// by key), optionally truncated to `limit` groups.
    ///
    /// `field` must be one of the essential complaint fields, which both
    /// collections store as columns.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if `field` is not an essential field or the
    /// query fails.
    pub fn count_by(
        &self,
        collection: Collection,
        field: &str,
        limit: Option<u64>,
    ) -> Result<Vec<GroupCount>, DbError> {
        if !ESSENTIAL_FIELDS.contains(&field) {
            return Err(DbError::InvalidIdentifier {
                name: field.to_string(),
            });
        }
        if !self.exists(collection)? {
            return Ok(Vec::new());
        }

        let limit_clause = limit.map(|n| format!(" LIMIT {n}")).unwrap_or_default();
        let sql = format!(
            "SELECT {field} AS group_key, COUNT(*) AS group_count FROM {}
             GROUP BY {field}
             ORDER BY group_count DESC, group_key ASC NULLS LAST{limit_clause}",
            self.table(collection)
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, Option<String>>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(key, count)| Ok(GroupCount { key, count: to_u64(count)? }))
            .collect()
    }

    /// Runs `f` inside a transaction, committing on success and rolling
    /// back on error.
    pub(crate) fn in_transaction<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, DbError>,
    ) -> Result<T, DbError> {
        self.conn.execute_batch("BEGIN TRANSACTION")?;

        let result = f(&self.conn).and_then(|value| {
            self.conn.execute_batch("COMMIT")?;
            Ok(value)
        });

        if result.is_err()
            && let Err(e) = self.conn.execute_batch("ROLLBACK")
        {
            log::debug!("ROLLBACK after failed transaction: {e}");
        }

        result
    }
}

/// Accepts ASCII identifiers of letters, digits and underscores that do
/// not start with a digit. Collection names are spliced into SQL, so
/// nothing else is allowed.
///
/// # Errors
///
/// Returns [`DbError::InvalidIdentifier`] otherwise.
pub fn check_identifier(name: &str) -> Result<(), DbError> {
    let mut chars = name.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(DbError::InvalidIdentifier {
            name: name.to_string(),
        })
    }
}

/// Checks both collection names and that they name distinct tables other
/// than `_meta`. `DuckDB` identifiers are case-insensitive, so the
/// comparison is too.
///
/// # Errors
///
/// Returns [`DbError::InvalidIdentifier`] with the offending name.
pub fn check_collections(raw: &str, clean: &str) -> Result<(), DbError> {
    check_identifier(raw)?;
    check_identifier(clean)?;

    for name in [raw, clean] {
        if name.eq_ignore_ascii_case(crate::meta::META_TABLE) {
            return Err(DbError::InvalidIdentifier {
                name: name.to_string(),
            });
        }
    }
    if raw.eq_ignore_ascii_case(clean) {
        return Err(DbError::InvalidIdentifier {
            name: clean.to_string(),
        });
    }
    Ok(())
}

pub(crate) fn to_u64(value: i64) -> Result<u64, DbError> {
    u64::try_from(value).map_err(|_| DbError::Conversion {
        message: format!("negative count {value}"),
    })
}

pub(crate) fn to_i64(value: u64) -> Result<i64, DbError> {
    i64::try_from(value).map_err(|_| DbError::Conversion {
        message: format!("offset {value} does not fit in BIGINT"),
    })
}
