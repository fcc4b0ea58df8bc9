#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Library for downloading NYC complaint records into the raw collection
//! and rebuilding the clean collection from them.
//!
//! [`download::download`] pages through a [`PageSource`] into a
//! [`RawSink`], resuming from the persisted cursor and retrying each page.
//! [`clean::clean`] validates every raw record once and rebuilds the clean
//! collection. The two halves only share the raw collection.
//!
//! [`PageSource`]: nyc_crime_source::PageSource

pub mod clean;
pub mod commands;
pub mod download;
pub mod interactive;
pub mod report;

use std::path::Path;

use nyc_crime_analytics::AnalyticsError;
use nyc_crime_complaint_models::RawComplaintRecord;
use nyc_crime_database::{ComplaintStore, DbError};
use nyc_crime_source::SourceError;
use nyc_crime_source::dataset::DatasetDefinition;
use thiserror::Error;

/// Errors that can occur during ingestion.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Fetching from the remote dataset failed.
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// Reading or writing the store failed.
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    /// A summary query failed.
    #[error("Analytics error: {0}")]
    Analytics(#[from] AnalyticsError),
}

/// Durable destination for downloaded pages.
///
/// The download loop only needs these three operations, which keeps it
/// testable against a sink that fails on demand.
pub trait RawSink {
    /// Offset the next download should start from.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the stored state cannot be read.
    fn resume_offset(&self) -> Result<u64, DbError>;

    /// Stores a page fetched at `offset` and advances the cursor past it,
    /// atomically. Returns the number of records stored.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the write fails; nothing is stored then.
    fn append_page(&self, offset: u64, records: &[RawComplaintRecord]) -> Result<u64, DbError>;

    /// Called once at the end of a run. Builds lookup indexes when the run
    /// stored anything and records the sync state.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if index creation or the metadata update fails.
    fn finish(&self, records_added: u64, fully_synced: bool) -> Result<(), DbError>;
}

impl RawSink for ComplaintStore {
    fn resume_offset(&self) -> Result<u64, DbError> {
        Self::resume_offset(self)
    }

    fn append_page(&self, offset: u64, records: &[RawComplaintRecord]) -> Result<u64, DbError> {
        self.append_raw_page(offset, records)
    }

    fn finish(&self, records_added: u64, fully_synced: bool) -> Result<(), DbError> {
        if records_added > 0 {
            self.create_raw_indexes()?;
        }
        self.update_sync_metadata(fully_synced)
    }
}

/// Opens the store for `dataset`'s collections at `path`, or at the
/// location named by `NYC_CRIME_DB_PATH` (falling back to
/// `data/nyc_crime.duckdb`).
///
/// # Errors
///
/// Returns [`IngestError::Database`] if the store cannot be opened.
pub fn open_store(
    dataset: &DatasetDefinition,
    path: Option<&Path>,
) -> Result<ComplaintStore, IngestError> {
    let path = path.map_or_else(nyc_crime_database::paths::db_path_from_env, Path::to_path_buf);
    log::info!("Opening store at {}", path.display());
    Ok(ComplaintStore::open(
        &path,
        &dataset.storage.raw_collection,
        &dataset.storage.clean_collection,
    )?)
}
