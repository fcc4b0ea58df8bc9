#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Summary and data quality report types.
//!
//! These are plain result types produced by the analytics crate and
//! rendered by the CLI. Every percentage is relative to a total that may
//! be zero, in which case it is `None` rather than a division by zero.

use serde::{Deserialize, Serialize};

/// Returns `count` as a percentage of `total`, or `None` when `total` is 0.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn percentage(count: u64, total: u64) -> Option<f64> {
    if total == 0 {
        None
    } else {
        Some(count as f64 / total as f64 * 100.0)
    }
}

/// One value of a grouped field and its share of the collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryShare {
    /// Field value (borough, law category, offense, ...).
    pub key: String,
    /// Records with this value.
    pub count: u64,
    /// Share of the collection total.
    pub percentage: Option<f64>,
}

impl CategoryShare {
    /// Builds a share of `total`.
    #[must_use]
    pub fn new(key: impl Into<String>, count: u64, total: u64) -> Self {
        Self {
            key: key.into(),
            count,
            percentage: percentage(count, total),
        }
    }
}

/// A clean record's location, used to spot-check coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoordinateSample {
    /// Complaint identifier.
    pub complaint_id: String,
    /// Borough name.
    pub borough: String,
    /// Latitude.
    pub latitude: f64,
    /// Longitude.
    pub longitude: f64,
}

/// Distributional summary of the clean collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanDistribution {
    /// Records in the clean collection.
    pub total: u64,
    /// Records per borough, largest first.
    pub by_borough: Vec<CategoryShare>,
    /// Records per law category, largest first.
    pub by_law_category: Vec<CategoryShare>,
    /// Most frequent offense descriptions.
    pub top_offenses: Vec<CategoryShare>,
    /// First few records' coordinates.
    pub coordinate_sample: Vec<CoordinateSample>,
}

/// How much of the raw collection survived cleaning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetentionSummary {
    /// Records in the raw collection.
    pub original: u64,
    /// Records in the clean collection.
    pub cleaned: u64,
    /// `original - cleaned`.
    pub removed: u64,
    /// Removed share of `original`.
    pub removed_percentage: Option<f64>,
    /// Retained share of `original`.
    pub retained_percentage: Option<f64>,
}

impl RetentionSummary {
    /// Summarizes a cleaning run from its before and after counts.
    #[must_use]
    pub fn new(original: u64, cleaned: u64) -> Self {
        let removed = original.saturating_sub(cleaned);
        Self {
            original,
            cleaned,
            removed,
            removed_percentage: percentage(removed, original),
            retained_percentage: percentage(cleaned, original),
        }
    }
}

/// Absent values of one field in the raw collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldCompleteness {
    /// Field name.
    pub field: String,
    /// Records where the field is null, empty or not a scalar.
    pub missing: u64,
    /// Share of the raw total.
    pub percentage: Option<f64>,
}

/// A cleaning action suggested by a [`RawQualityReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Recommendation {
    /// Some essential fields have missing values.
    RemoveIncomplete {
        /// Fields with at least one missing value.
        fields: Vec<String>,
    },
    /// Some records have coordinates outside the city or unparsable ones.
    RemoveInvalidCoordinates {
        /// Affected records.
        count: u64,
    },
    /// Some identifiers occur more than once.
    KeepFirstOccurrence {
        /// Identifiers with more than one record.
        count: u64,
    },
}

impl std::fmt::Display for Recommendation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RemoveIncomplete { fields } => write!(
                f,
                "Remove records with missing critical fields ({})",
                fields.join(", ")
            ),
            Self::RemoveInvalidCoordinates { count } => {
                write!(f, "Remove or flag {count} records with invalid coordinates")
            }
            Self::KeepFirstOccurrence { count } => write!(
                f,
                "Keep only the first occurrence of {count} duplicated complaint IDs"
            ),
        }
    }
}

/// Read-only assessment of the raw collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawQualityReport {
    /// Records in the raw collection.
    pub total: u64,
    /// Missing values per essential field, in field order.
    pub missing: Vec<FieldCompleteness>,
    /// Records whose coordinates are present but unparsable or out of
    /// bounds.
    pub invalid_coordinates: u64,
    /// Share of the raw total.
    pub invalid_coordinates_percentage: Option<f64>,
    /// Identifiers that occur on more than one record.
    pub duplicate_ids: u64,
    /// Smallest non-empty start date.
    pub earliest_date: Option<String>,
    /// Largest non-empty start date.
    pub latest_date: Option<String>,
    /// Records per non-empty borough value.
    pub by_borough: Vec<CategoryShare>,
    /// Records per non-empty law category value.
    pub by_law_category: Vec<CategoryShare>,
}

impl RawQualityReport {
    /// Fields with at least one missing value.
    #[must_use]
    pub fn incomplete_fields(&self) -> Vec<&str> {
        self.missing
            .iter()
            .filter(|f| f.missing > 0)
            .map(|f| f.field.as_str())
            .collect()
    }

    /// Derives cleaning recommendations from the counts. Empty when the
    /// collection has no detectable issues.
    #[must_use]
    pub fn recommendations(&self) -> Vec<Recommendation> {
        let mut out = Vec::new();

        let fields = self.incomplete_fields();
        if !fields.is_empty() {
            out.push(Recommendation::RemoveIncomplete {
                fields: fields.into_iter().map(String::from).collect(),
            });
        }
        if self.invalid_coordinates > 0 {
            out.push(Recommendation::RemoveInvalidCoordinates {
                count: self.invalid_coordinates,
            });
        }
        if self.duplicate_ids > 0 {
            out.push(Recommendation::KeepFirstOccurrence {
                count: self.duplicate_ids,
            });
        }

        out
    }
}
