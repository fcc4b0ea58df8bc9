//! Single-pass validation and deduplication of the raw collection.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use nyc_crime_complaint_models::validate;
use nyc_crime_database::{Collection, ComplaintStore};
use nyc_crime_ingest_models::{CleanConfig, CleanResult};
use nyc_crime_source::progress::ProgressCallback;

use crate::IngestError;

/// Rebuilds the clean collection from the raw collection.
///
/// Clears the clean collection, then reads every raw record once in
/// storage order. Each record is accepted or counted under the first
/// rejection reason that applies (missing field, duplicate identifier,
/// invalid coordinates). Accepted records are written in batches of
/// `config.batch_size`, and the clean indexes are built at the end.
///
/// An empty raw collection leaves an empty clean collection and returns
/// all-zero counters.
///
/// # Errors
///
/// Returns [`IngestError::Database`] if reading or writing the store
/// fails. Invalid records never cause an error.
pub fn clean(
    store: &ComplaintStore,
    config: &CleanConfig,
    progress: Option<Arc<dyn ProgressCallback>>,
) -> Result<CleanResult, IngestError> {
    let start = Instant::now();
    let progress = progress.unwrap_or_else(nyc_crime_source::progress::null_progress);
    let batch_size = config.batch_size.max(1);
    let raw_table = store.table(Collection::Raw).to_string();
    let clean_table = store.table(Collection::Clean).to_string();

    store.reset_clean()?;

    let total = store.count(Collection::Raw)?;
    if total == 0 {
        log::warn!("{raw_table}: no raw records to clean");
        progress.finish(format!("{raw_table}: nothing to clean"));
        return Ok(CleanResult::default());
    }

    log::info!("Cleaning {total} records from {raw_table} into {clean_table}");
    progress.set_total(total);
    progress.set_message(format!("Cleaning {raw_table}"));

    let mut result = CleanResult::default();
    let mut seen: HashSet<String> = HashSet::new();
    let mut pending = Vec::with_capacity(batch_size);

    for batch in store.scan_raw(batch_size) {
        let batch = batch?;
        let examined = batch.len() as u64;

        for record in &batch {
            match validate(record, &seen) {
                Ok(clean) => {
                    seen.insert(clean.complaint_id.clone());
                    result.accept();
                    pending.push(clean);
                }
                Err(reason) => result.reject(reason),
            }

            if pending.len() >= batch_size {
                store.insert_clean(&pending)?;
                pending.clear();
            }
        }

        progress.inc(examined);
        log::debug!(
            "{raw_table}: examined {} / {total}, accepted {}",
            result.examined,
            result.accepted
        );
    }

    if !pending.is_empty() {
        store.insert_clean(&pending)?;
    }

    store.create_clean_indexes()?;

    debug_assert!(result.is_conserved());
    progress.finish(format!(
        "{clean_table}: {} of {} records kept",
        result.accepted, result.examined
    ));
    log::info!(
        "{clean_table}: {} accepted, {} missing, {} invalid coordinates, {} duplicate, took {:.1}s",
        result.accepted,
        result.missing,
        result.invalid_coordinates,
        result.duplicate,
        start.elapsed().as_secs_f64()
    );

    Ok(result)
}

#[cfg(test)]
mod tests {
    use nyc_crime_complaint_models::{
        BORO_NM, CMPLNT_FR_DT, CMPLNT_FR_TM, CMPLNT_NUM, LATITUDE, LAW_CAT_CD, LONGITUDE,
        OFNS_DESC, RawComplaintRecord,
    };
    use serde_json::Value;

    use super::*;

    fn valid(id: &str) -> RawComplaintRecord {
        RawComplaintRecord::from_text_fields([
            (CMPLNT_NUM, id),
            (CMPLNT_FR_DT, "2024-01-01"),
            (BORO_NM, "QUEENS"),
            (LATITUDE, "40.7"),
            (LONGITUDE, "-73.8"),
            (OFNS_DESC, "THEFT"),
            (LAW_CAT_CD, "FELONY"),
        ])
    }

    fn seeded(records: &[RawComplaintRecord]) -> ComplaintStore {
        let store = ComplaintStore::open_in_memory("raw", "clean").unwrap();
        store.append_raw_page(0, records).unwrap();
        store
    }

    fn small_batches() -> CleanConfig {
        CleanConfig { batch_size: 2 }
    }

    fn mixed() -> Vec<RawComplaintRecord> {
        vec![
            valid("1"),
            valid("2").with(BORO_NM, Value::from("(null)")),
            valid("7"),
            valid("7"),
            valid("3").with(LATITUDE, Value::from("99.9")),
            valid("4").with(CMPLNT_FR_TM, Value::from("23:15:00")),
            valid("5").with(OFNS_DESC, Value::Null),
            valid("6").with(LONGITUDE, Value::from("west")),
        ]
    }

    #[test]
    fn scenario_a_is_accepted_with_float_coordinates() {
        let store = seeded(&[valid("1")]);
        let result = clean(&store, &CleanConfig::default(), None).unwrap();

        assert_eq!(result.accepted, 1);
        let records = store.clean_records(None).unwrap();
        assert_eq!(records.len(), 1);
        assert!((records[0].latitude - 40.7).abs() < f64::EPSILON);
        assert!((records[0].longitude + 73.8).abs() < f64::EPSILON);
        assert_eq!(records[0].occurred_time, "00:00:00");
    }

    #[test]
    fn counts_each_rejection_once() {
        let store = seeded(&mixed());
        let result = clean(&store, &small_batches(), None).unwrap();

        assert_eq!(
            result,
            CleanResult {
                examined: 8,
                accepted: 3,
                missing: 2,
                invalid_coordinates: 2,
                duplicate: 1,
            }
        );
        assert!(result.is_conserved());
        assert_eq!(store.count(Collection::Clean).unwrap(), 3);
    }

    #[test]
    fn first_duplicate_wins_and_order_is_kept() {
        let store = seeded(&mixed());
        clean(&store, &small_batches(), None).unwrap();

        let records = store.clean_records(None).unwrap();
        let ids: Vec<&str> = records.iter().map(|r| r.complaint_id.as_str()).collect();
        assert_eq!(ids, vec!["1", "7", "4"]);
        assert_eq!(records[2].occurred_time, "23:15:00");
    }

    #[test]
    fn duplicate_of_rejected_record_is_not_a_duplicate() {
        let store = seeded(&[valid("9").with(LATITUDE, Value::from("0")), valid("9")]);
        let result = clean(&store, &CleanConfig::default(), None).unwrap();

        assert_eq!(result.invalid_coordinates, 1);
        assert_eq!(result.duplicate, 0);
        assert_eq!(result.accepted, 1);
    }

    #[test]
    fn second_pass_is_identical() {
        let store = seeded(&mixed());
        let first = clean(&store, &small_batches(), None).unwrap();
        let first_records = store.clean_records(None).unwrap();

        let second = clean(&store, &CleanConfig::default(), None).unwrap();
        assert_eq!(first, second);
        assert_eq!(store.clean_records(None).unwrap(), first_records);
    }

    #[test]
    fn clean_identifiers_are_unique_across_batches() {
        let records: Vec<RawComplaintRecord> = (0..25).map(|i| valid(&(i % 10).to_string())).collect();
        let store = seeded(&records);

        let result = clean(&store, &CleanConfig { batch_size: 3 }, None).unwrap();
        assert_eq!(result.accepted, 10);
        assert_eq!(result.duplicate, 15);

        let mut ids: Vec<String> = store
            .clean_records(None)
            .unwrap()
            .into_iter()
            .map(|r| r.complaint_id)
            .collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 10);
    }

    #[test]
    fn empty_raw_store_clears_previous_clean_data() {
        let store = seeded(&[valid("1")]);
        clean(&store, &CleanConfig::default(), None).unwrap();
        store.connection().execute_batch("DELETE FROM raw").unwrap();

        let result = clean(&store, &CleanConfig::default(), None).unwrap();
        assert_eq!(result, CleanResult::default());
        assert_eq!(store.count(Collection::Clean).unwrap(), 0);
    }
}
