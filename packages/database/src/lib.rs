#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! `DuckDB` storage for the complaint pipeline.
//!
//! One `DuckDB` file holds two named collections: the raw collection,
//! which receives API records verbatim, and the clean collection, which
//! the cleaning pass rebuilds from scratch. A `_meta` table tracks the
//! download cursor and sync state. All access goes through an explicitly
//! opened [`store::ComplaintStore`].

pub mod clean;
pub mod meta;
pub mod paths;
pub mod raw;
pub mod store;

pub use store::{Collection, ComplaintStore};

/// Errors that can occur during database operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// `DuckDB` error.
    #[error("DuckDB error: {0}")]
    DuckDb(#[from] duckdb::Error),

    /// I/O error (creating the data directory).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored raw document could not be (de)serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A collection or column name is not a plain SQL identifier.
    #[error("Invalid identifier: {name:?}")]
    InvalidIdentifier {
        /// The rejected name.
        name: String,
    },

    /// Data conversion error.
    #[error("Data conversion error: {message}")]
    Conversion {
        /// Description of what went wrong.
        message: String,
    },
}
