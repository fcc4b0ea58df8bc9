#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Remote complaint dataset access.
//!
//! A [`PageSource`] serves fixed-size pages of raw complaint records at a
//! given offset. The production implementation is
//! [`socrata::SocrataClient`], configured from a
//! [`dataset::DatasetDefinition`]. Retry policy lives in [`retry`] and is
//! applied by the caller around each fetch-and-store step.

pub mod dataset;
pub mod progress;
pub mod retry;
pub mod socrata;

use async_trait::async_trait;
use nyc_crime_complaint_models::RawComplaintRecord;

/// Errors that can occur while talking to the remote dataset.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    Status {
        /// Response status code.
        status: reqwest::StatusCode,
        /// Requested URL.
        url: String,
    },

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// The dataset definition could not be parsed or is inconsistent.
    #[error("Invalid dataset definition: {message}")]
    Config {
        /// Description of what went wrong.
        message: String,
    },

    /// The response decoded but did not have the expected shape.
    #[error("Unexpected response: {message}")]
    UnexpectedResponse {
        /// Description of what went wrong.
        message: String,
    },
}

/// A remote dataset that can be read one page at a time.
///
/// Pages must come back in a stable order so that the same offset always
/// names the same records while the remote data is unchanged.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Human-readable label for log messages.
    fn label(&self) -> &str;

    /// Fetches at most `limit` records starting at `offset`. An empty or
    /// short page means the end of the data was reached.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the request fails or the response is
    /// malformed.
    async fn fetch_page(
        &self,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<RawComplaintRecord>, SourceError>;
}
