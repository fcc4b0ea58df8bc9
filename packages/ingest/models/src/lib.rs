#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Download and cleaning configuration and result types.

use nyc_crime_complaint_models::RejectionReason;
use serde::{Deserialize, Serialize};

/// Records requested per page when the dataset does not say otherwise.
pub const DEFAULT_PAGE_SIZE: u64 = 5_000;

/// Records read from the raw collection and written to the clean
/// collection per batch.
pub const DEFAULT_CLEAN_BATCH_SIZE: usize = 5_000;

/// Configuration for a download run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Records requested per page.
    pub page_size: u64,
    /// Maximum number of records to fetch in this run (useful for testing).
    pub limit: Option<u64>,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            limit: None,
        }
    }
}

/// How a download run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DownloadOutcome {
    /// A short or empty page was received: the dataset is exhausted.
    Completed,
    /// The configured record limit was reached.
    LimitReached,
    /// A page kept failing after every retry. The next run resumes at
    /// `offset`.
    Interrupted {
        /// Offset of the page that could not be fetched or stored.
        offset: u64,
        /// Attempts made at that offset.
        attempts: u32,
        /// The last error.
        error: String,
    },
}

impl DownloadOutcome {
    /// Whether the end of the remote data was reached.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// Result of a download run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadResult {
    /// Offset the run resumed from.
    pub starting_offset: u64,
    /// Offset the next run will resume from.
    pub next_offset: u64,
    /// Records stored by this run.
    pub records_added: u64,
    /// Pages stored by this run.
    pub pages: u64,
    /// How the run ended.
    pub outcome: DownloadOutcome,
}

/// Configuration for a cleaning pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanConfig {
    /// Raw records read, and clean records written, per batch.
    pub batch_size: usize,
}

impl Default for CleanConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_CLEAN_BATCH_SIZE,
        }
    }
}

/// Counters from one cleaning pass.
///
/// Every examined record is either accepted or counted under exactly one
/// rejection reason, so `examined == accepted + rejected()`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanResult {
    /// Raw records read.
    pub examined: u64,
    /// Records written to the clean collection.
    pub accepted: u64,
    /// Rejected for a missing required field or a `(null)` borough.
    pub missing: u64,
    /// Rejected for unparsable or out-of-bounds coordinates.
    pub invalid_coordinates: u64,
    /// Rejected because the identifier was already accepted.
    pub duplicate: u64,
}

impl CleanResult {
    /// Counts an accepted record.
    pub const fn accept(&mut self) {
        self.examined += 1;
        self.accepted += 1;
    }

    /// Counts a rejected record.
    pub const fn reject(&mut self, reason: RejectionReason) {
        self.examined += 1;
        match reason {
            RejectionReason::Missing => self.missing += 1,
            RejectionReason::Duplicate => self.duplicate += 1,
            RejectionReason::InvalidCoordinates => self.invalid_coordinates += 1,
        }
    }

    /// Records rejected for `reason`.
    #[must_use]
    pub const fn rejected_for(&self, reason: RejectionReason) -> u64 {
        match reason {
            RejectionReason::Missing => self.missing,
            RejectionReason::Duplicate => self.duplicate,
            RejectionReason::InvalidCoordinates => self.invalid_coordinates,
        }
    }

    /// Records rejected for any reason.
    #[must_use]
    pub const fn rejected(&self) -> u64 {
        self.missing + self.invalid_coordinates + self.duplicate
    }

    /// Whether every examined record is accounted for.
    #[must_use]
    pub const fn is_conserved(&self) -> bool {
        self.examined == self.accepted + self.rejected()
    }
}
