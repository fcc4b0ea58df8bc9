//! Raw collection quality audit.
//!
//! Runs over the essential-field columns the raw collection keeps next to
//! each document, so nothing here parses JSON. Coordinates are checked
//! with `TRY_CAST`, which mirrors how the cleaning pass parses them.

use duckdb::Connection;
use nyc_crime_analytics_models::{FieldCompleteness, RawQualityReport, percentage};
use nyc_crime_complaint_models::{
    BORO_NM, CMPLNT_FR_DT, CMPLNT_NUM, ESSENTIAL_FIELDS, LAW_CAT_CD, LATITUDE, LONGITUDE,
    NYC_BOUNDS,
};
use nyc_crime_database::{Collection, ComplaintStore};

use crate::{AnalyticsError, shares, to_u64};

/// Audits the raw collection: missing values, bad coordinates, duplicate
/// identifiers, date range and distributions.
///
/// # Errors
///
/// Returns [`AnalyticsError`] if any query fails.
pub fn raw_quality(store: &ComplaintStore) -> Result<RawQualityReport, AnalyticsError> {
    let conn = store.connection();
    let table = store.table(Collection::Raw);
    let total = store.count(Collection::Raw)?;

    let missing = missing_counts(conn, table)?
        .into_iter()
        .zip(ESSENTIAL_FIELDS)
        .map(|(count, field)| FieldCompleteness {
            field: (*field).to_string(),
            missing: count,
            percentage: percentage(count, total),
        })
        .collect();

    let invalid_coordinates = invalid_coordinate_count(conn, table)?;
    let duplicate_ids = duplicate_id_count(conn, table)?;
    let (earliest_date, latest_date) = date_range(conn, table)?;

    let by_borough = store.count_by(Collection::Raw, BORO_NM, None)?;
    let by_law_category = store.count_by(Collection::Raw, LAW_CAT_CD, None)?;

    log::debug!("{table}: quality audit over {total} records");

    Ok(RawQualityReport {
        total,
        missing,
        invalid_coordinates,
        invalid_coordinates_percentage: percentage(invalid_coordinates, total),
        duplicate_ids,
        earliest_date,
        latest_date,
        by_borough: shares(by_borough, total),
        by_law_category: shares(by_law_category, total),
    })
}

/// Missing-value counts for every essential field, in field order.
fn missing_counts(conn: &Connection, table: &str) -> Result<Vec<u64>, AnalyticsError> {
    let filters = ESSENTIAL_FIELDS
        .iter()
        .map(|f| format!("COUNT(*) FILTER (WHERE {f} IS NULL OR {f} = '')"))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!("SELECT {filters} FROM {table}");

    let counts: Vec<i64> = conn.prepare(&sql)?.query_row([], |row| {
        (0..ESSENTIAL_FIELDS.len())
            .map(|i| row.get(i))
            .collect::<Result<Vec<_>, _>>()
    })?;

    counts.into_iter().map(to_u64).collect()
}

/// Records with both coordinates present whose values do not parse or
/// fall outside the city bounds.
fn invalid_coordinate_count(conn: &Connection, table: &str) -> Result<u64, AnalyticsError> {
    let sql = format!(
        "SELECT COUNT(*) FROM (
            SELECT TRY_CAST(trim({LATITUDE}) AS DOUBLE) AS lat,
                   TRY_CAST(trim({LONGITUDE}) AS DOUBLE) AS lon
            FROM {table}
            WHERE {LATITUDE} IS NOT NULL AND {LATITUDE} <> ''
              AND {LONGITUDE} IS NOT NULL AND {LONGITUDE} <> ''
         ) coords
         WHERE lat IS NULL OR lon IS NULL
            OR lat NOT BETWEEN ? AND ?
            OR lon NOT BETWEEN ? AND ?"
    );

    let count: i64 = conn.prepare(&sql)?.query_row(
        duckdb::params![
            NYC_BOUNDS.min_latitude,
            NYC_BOUNDS.max_latitude,
            NYC_BOUNDS.min_longitude,
            NYC_BOUNDS.max_longitude,
        ],
        |row| row.get(0),
    )?;
    to_u64(count)
}

/// Identifiers carried by more than one record.
fn duplicate_id_count(conn: &Connection, table: &str) -> Result<u64, AnalyticsError> {
    let sql = format!(
        "SELECT COUNT(*) FROM (
            SELECT {CMPLNT_NUM} FROM {table}
            WHERE {CMPLNT_NUM} IS NOT NULL AND {CMPLNT_NUM} <> ''
            GROUP BY {CMPLNT_NUM}
            HAVING COUNT(*) > 1
         ) dupes"
    );
    let count: i64 = conn.prepare(&sql)?.query_row([], |row| row.get(0))?;
    to_u64(count)
}

fn date_range(
    conn: &Connection,
    table: &str,
) -> Result<(Option<String>, Option<String>), AnalyticsError> {
    let sql = format!(
        "SELECT MIN({CMPLNT_FR_DT}), MAX({CMPLNT_FR_DT}) FROM {table}
         WHERE {CMPLNT_FR_DT} <> ''"
    );
    Ok(conn
        .prepare(&sql)?
        .query_row([], |row| Ok((row.get(0)?, row.get(1)?)))?)
}
