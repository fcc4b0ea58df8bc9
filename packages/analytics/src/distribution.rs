//! Clean collection summaries.

use nyc_crime_analytics_models::{CleanDistribution, CoordinateSample, RetentionSummary};
use nyc_crime_complaint_models::{BORO_NM, LAW_CAT_CD, OFNS_DESC};
use nyc_crime_database::{Collection, ComplaintStore};

use crate::{AnalyticsError, shares};

/// Number of offense descriptions in [`CleanDistribution::top_offenses`].
pub const TOP_OFFENSES: u64 = 10;

/// Number of records in [`CleanDistribution::coordinate_sample`].
pub const COORDINATE_SAMPLE_SIZE: u64 = 3;

/// Summarizes the clean collection by borough, law category and offense,
/// plus a small coordinate sample.
///
/// A missing or empty clean collection yields a zero total with empty
/// groups.
///
/// # Errors
///
/// Returns [`AnalyticsError`] if any query fails.
pub fn clean_distribution(store: &ComplaintStore) -> Result<CleanDistribution, AnalyticsError> {
    let total = store.count(Collection::Clean)?;

    let by_borough = store.count_by(Collection::Clean, BORO_NM, None)?;
    let by_law_category = store.count_by(Collection::Clean, LAW_CAT_CD, None)?;
    let top_offenses = store.count_by(Collection::Clean, OFNS_DESC, Some(TOP_OFFENSES))?;

    let coordinate_sample = store
        .clean_records(Some(COORDINATE_SAMPLE_SIZE))?
        .into_iter()
        .map(|r| CoordinateSample {
            complaint_id: r.complaint_id,
            borough: r.borough,
            latitude: r.latitude,
            longitude: r.longitude,
        })
        .collect();

    log::debug!(
        "{}: {total} clean records summarized",
        store.table(Collection::Clean)
    );

    Ok(CleanDistribution {
        total,
        by_borough: shares(by_borough, total),
        by_law_category: shares(by_law_category, total),
        top_offenses: shares(top_offenses, total),
        coordinate_sample,
    })
}

/// Compares the raw and clean record counts.
///
/// # Errors
///
/// Returns [`AnalyticsError`] if either count fails.
pub fn retention_summary(store: &ComplaintStore) -> Result<RetentionSummary, AnalyticsError> {
    Ok(RetentionSummary::new(
        store.count(Collection::Raw)?,
        store.count(Collection::Clean)?,
    ))
}
