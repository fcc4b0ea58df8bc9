#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Read-only summaries over the complaint collections.
//!
//! [`distribution`] describes the clean collection after a cleaning pass
//! and [`quality`] audits the raw collection before one. Both run grouped
//! aggregations in `DuckDB` and return the plain types from
//! `nyc_crime_analytics_models`.

pub mod distribution;
pub mod quality;

use nyc_crime_analytics_models::CategoryShare;
use nyc_crime_database::{DbError, store::GroupCount};
use thiserror::Error;

/// Errors that can occur during analytics operations.
#[derive(Debug, Error)]
pub enum AnalyticsError {
    /// Store operation failed.
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    /// Aggregate query failed.
    #[error("DuckDB error: {0}")]
    DuckDb(#[from] duckdb::Error),

    /// Data conversion error.
    #[error("Conversion error: {message}")]
    Conversion {
        /// Description of what went wrong.
        message: String,
    },
}

fn to_u64(value: i64) -> Result<u64, AnalyticsError> {
    u64::try_from(value).map_err(|_| AnalyticsError::Conversion {
        message: format!("negative count {value}"),
    })
}

/// Converts grouped counts into shares of `total`, dropping groups whose
/// key is null or empty.
fn shares(groups: Vec<GroupCount>, total: u64) -> Vec<CategoryShare> {
    groups
        .into_iter()
        .filter_map(|g| {
            g.key
                .filter(|k| !k.is_empty())
                .map(|k| CategoryShare::new(k, g.count, total))
        })
        .collect()
}
