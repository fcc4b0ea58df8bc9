//! The clean collection.
//!
//! Rebuilt from scratch by every cleaning pass: [`ComplaintStore::reset_clean`]
//! drops and recreates the table (and with it every index), batches of
//! validated records are appended, and the indexes are built at the end.

use nyc_crime_complaint_models::CleanComplaintRecord;

use crate::store::ComplaintStore;
use crate::{Collection, DbError};

/// Number of rows per INSERT statement.
const CHUNK_SIZE: usize = 1_000;

const COLUMNS: &str = "cmplnt_num, cmplnt_fr_dt, cmplnt_fr_tm, boro_nm, \
                       latitude, longitude, ofns_desc, law_cat_cd";

const PARAMS_PER_ROW: usize = 8;

impl ComplaintStore {
    /// Drops and recreates the clean collection, leaving it empty and
    /// unindexed.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the DDL fails.
    pub fn reset_clean(&self) -> Result<(), DbError> {
        let table = self.table(Collection::Clean);
        self.connection().execute_batch(&format!(
            "DROP TABLE IF EXISTS {table};
             CREATE TABLE {table} (
                cmplnt_num TEXT NOT NULL,
                cmplnt_fr_dt TEXT NOT NULL,
                cmplnt_fr_tm TEXT NOT NULL,
                boro_nm TEXT NOT NULL,
                latitude DOUBLE NOT NULL,
                longitude DOUBLE NOT NULL,
                ofns_desc TEXT NOT NULL,
                law_cat_cd TEXT NOT NULL
             );"
        ))?;
        log::debug!("{table}: cleared");
        Ok(())
    }

    /// Appends a batch of clean records in one transaction. Returns the
    /// number of rows inserted.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if any INSERT fails.
    pub fn insert_clean(&self, records: &[CleanComplaintRecord]) -> Result<u64, DbError> {
        if records.is_empty() {
            return Ok(0);
        }

        let table = self.table(Collection::Clean);
        let row = format!("({})", vec!["?"; PARAMS_PER_ROW].join(", "));

        self.in_transaction(|conn| {
            let mut total = 0u64;

            for chunk in records.chunks(CHUNK_SIZE) {
                let sql = format!(
                    "INSERT INTO {table} ({COLUMNS}) VALUES {}",
                    vec![row.as_str(); chunk.len()].join(", ")
                );
                let mut stmt = conn.prepare(&sql)?;
                let mut param_idx = 1usize;

                for record in chunk {
                    stmt.raw_bind_parameter(param_idx, record.complaint_id.as_str())?;
                    stmt.raw_bind_parameter(param_idx + 1, record.occurred_date.as_str())?;
                    stmt.raw_bind_parameter(param_idx + 2, record.occurred_time.as_str())?;
                    stmt.raw_bind_parameter(param_idx + 3, record.borough.as_str())?;
                    stmt.raw_bind_parameter(param_idx + 4, record.latitude)?;
                    stmt.raw_bind_parameter(param_idx + 5, record.longitude)?;
                    stmt.raw_bind_parameter(param_idx + 6, record.offense.as_str())?;
                    stmt.raw_bind_parameter(param_idx + 7, record.law_category.as_str())?;
                    param_idx += PARAMS_PER_ROW;
                }

                let rows = stmt.raw_execute()?;
                total += u64::try_from(rows).unwrap_or(0);
            }

            Ok(total)
        })
    }

    /// Builds the unique identifier index plus date, borough, offense,
    /// law category and coordinate indexes. Fails if the collection holds
    /// a duplicate identifier.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if any index cannot be created.
    pub fn create_clean_indexes(&self) -> Result<(), DbError> {
        let table = self.table(Collection::Clean);
        self.connection().execute_batch(&format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_{table}_cmplnt_num ON {table} (cmplnt_num);
             CREATE INDEX IF NOT EXISTS idx_{table}_date ON {table} (cmplnt_fr_dt);
             CREATE INDEX IF NOT EXISTS idx_{table}_boro ON {table} (boro_nm);
             CREATE INDEX IF NOT EXISTS idx_{table}_ofns ON {table} (ofns_desc);
             CREATE INDEX IF NOT EXISTS idx_{table}_law ON {table} (law_cat_cd);
             CREATE INDEX IF NOT EXISTS idx_{table}_coords ON {table} (latitude, longitude);"
        ))?;
        log::info!("{table}: indexes ready");
        Ok(())
    }

    /// Returns clean records in insertion order, at most `limit` of them
    /// when given.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the query fails.
    pub fn clean_records(&self, limit: Option<u64>) -> Result<Vec<CleanComplaintRecord>, DbError> {
        if !self.exists(Collection::Clean)? {
            return Ok(Vec::new());
        }

        let limit_clause = limit.map(|n| format!(" LIMIT {n}")).unwrap_or_default();
        let sql = format!(
            "SELECT {COLUMNS} FROM {} ORDER BY rowid{limit_clause}",
            self.table(Collection::Clean)
        );
        let mut stmt = self.connection().prepare(&sql)?;
        let records = stmt
            .query_map([], |row| {
                Ok(CleanComplaintRecord {
                    complaint_id: row.get(0)?,
                    occurred_date: row.get(1)?,
                    occurred_time: row.get(2)?,
                    borough: row.get(3)?,
                    latitude: row.get(4)?,
                    longitude: row.get(5)?,
                    offense: row.get(6)?,
                    law_category: row.get(7)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, latitude: f64) -> CleanComplaintRecord {
        CleanComplaintRecord {
            complaint_id: id.to_string(),
            occurred_date: "2024-03-01T00:00:00.000".to_string(),
            occurred_time: "12:00:00".to_string(),
            borough: "BROOKLYN".to_string(),
            latitude,
            longitude: -73.9,
            offense: "ROBBERY".to_string(),
            law_category: "FELONY".to_string(),
        }
    }

    #[test]
    fn insert_and_read_back_in_order() {
        let store = ComplaintStore::open_in_memory("raw", "clean").unwrap();
        store.reset_clean().unwrap();
        let records = vec![record("b", 40.6), record("a", 40.7), record("c", 40.8)];
        assert_eq!(store.insert_clean(&records).unwrap(), 3);
        assert_eq!(store.clean_records(None).unwrap(), records);
        assert_eq!(store.clean_records(Some(2)).unwrap(), records[..2].to_vec());
    }

    #[test]
    fn coordinates_are_stored_as_doubles() {
        let store = ComplaintStore::open_in_memory("raw", "clean").unwrap();
        store.reset_clean().unwrap();
        store.insert_clean(&[record("1", 40.7)]).unwrap();

        let type_name: String = store
            .connection()
            .prepare("SELECT typeof(latitude) FROM clean")
            .unwrap()
            .query_row([], |row| row.get(0))
            .unwrap();
        assert_eq!(type_name, "DOUBLE");
    }

    #[test]
    fn reset_empties_the_collection() {
        let store = ComplaintStore::open_in_memory("raw", "clean").unwrap();
        store.reset_clean().unwrap();
        store.insert_clean(&[record("1", 40.7)]).unwrap();
        store.create_clean_indexes().unwrap();

        store.reset_clean().unwrap();
        assert_eq!(store.count(Collection::Clean).unwrap(), 0);

        // Same identifier is accepted again after the rebuild.
        store.insert_clean(&[record("1", 40.7)]).unwrap();
        store.create_clean_indexes().unwrap();
        assert_eq!(store.count(Collection::Clean).unwrap(), 1);
    }

    #[test]
    fn unique_index_rejects_duplicate_identifiers() {
        let store = ComplaintStore::open_in_memory("raw", "clean").unwrap();
        store.reset_clean().unwrap();
        store.create_clean_indexes().unwrap();
        store.insert_clean(&[record("1", 40.7)]).unwrap();
        assert!(store.insert_clean(&[record("1", 40.8)]).is_err());
        assert_eq!(store.count(Collection::Clean).unwrap(), 1);
    }

    #[test]
    fn missing_clean_collection_reads_as_empty() {
        let store = ComplaintStore::open_in_memory("raw", "clean").unwrap();
        assert!(store.clean_records(Some(3)).unwrap().is_empty());
    }
}
