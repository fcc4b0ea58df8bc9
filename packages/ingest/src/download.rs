//! Resumable, retrying page download.
//!
//! The loop owns the offset. Each step fetches one page at the current
//! offset and stores it; only a stored page moves the offset forward. A
//! failed step (fetch or store) is retried at the same offset with linear
//! backoff, and after the last attempt the run ends as
//! [`DownloadOutcome::Interrupted`] with the offset to resume from.

use std::sync::Arc;
use std::time::Instant;

use nyc_crime_ingest_models::{DownloadConfig, DownloadOutcome, DownloadResult};
use nyc_crime_source::PageSource;
use nyc_crime_source::progress::ProgressCallback;
use nyc_crime_source::retry::RetryPolicy;

use crate::{IngestError, RawSink};

/// A page that could not be fetched and stored within the retry budget.
struct PageFailure {
    attempts: u32,
    error: IngestError,
}

/// Downloads pages from `source` into `sink` until the data runs out, the
/// record limit is reached, or a page fails every retry.
///
/// Resumes from [`RawSink::resume_offset`]. A page shorter than requested
/// (including an empty one) ends the run as complete. `policy.page_delay`
/// is waited between full pages only.
///
/// An interrupted page is not an error: the result carries
/// [`DownloadOutcome::Interrupted`] and everything stored before it stays
/// stored.
///
/// # Errors
///
/// Returns [`IngestError`] only if the sink cannot report its resume
/// offset, or cannot finish (indexes and sync metadata) a run that was not
/// interrupted. A finishing error after an interrupted page is logged and
/// the interrupted outcome is still returned.
pub async fn download(
    source: &dyn PageSource,
    sink: &dyn RawSink,
    config: &DownloadConfig,
    policy: &RetryPolicy,
    progress: Option<Arc<dyn ProgressCallback>>,
) -> Result<DownloadResult, IngestError> {
    let start = Instant::now();
    let progress = progress.unwrap_or_else(nyc_crime_source::progress::null_progress);
    let page_size = config.page_size.max(1);

    let starting_offset = sink.resume_offset()?;
    if starting_offset > 0 {
        log::info!(
            "{}: resuming from offset {starting_offset}",
            source.label()
        );
    } else {
        log::info!("{}: starting from the beginning", source.label());
    }

    if let Some(limit) = config.limit {
        progress.set_total(limit);
    }
    progress.set_message(format!("{}: downloading", source.label()));

    let mut offset = starting_offset;
    let mut records_added = 0u64;
    let mut pages = 0u64;

    let outcome = loop {
        let request = match config.limit {
            Some(limit) if records_added >= limit => break DownloadOutcome::LimitReached,
            Some(limit) => page_size.min(limit - records_added),
            None => page_size,
        };

        let stored = match fetch_and_store(source, sink, offset, request, policy).await {
            Ok(stored) => stored,
            Err(failure) => {
                log::error!(
                    "{}: giving up at offset {offset} after {} attempts: {}",
                    source.label(),
                    failure.attempts,
                    failure.error
                );
                break DownloadOutcome::Interrupted {
                    offset,
                    attempts: failure.attempts,
                    error: failure.error.to_string(),
                };
            }
        };

        if stored == 0 {
            log::info!("{}: no more data at offset {offset}", source.label());
            break DownloadOutcome::Completed;
        }

        offset += stored;
        records_added += stored;
        pages += 1;
        progress.inc(stored);
        log::info!(
            "{}: page {pages} stored {stored} records (next offset {offset})",
            source.label()
        );

        if stored < request {
            log::info!("{}: reached end of data", source.label());
            break DownloadOutcome::Completed;
        }

        if config.limit.is_some_and(|limit| records_added >= limit) {
            break DownloadOutcome::LimitReached;
        }

        tokio::time::sleep(policy.page_delay).await;
    };

    if let Err(e) = sink.finish(records_added, outcome.is_complete()) {
        // Interrupted runs still report their resume offset.
        if !matches!(outcome, DownloadOutcome::Interrupted { .. }) {
            return Err(e.into());
        }
        log::error!(
            "{}: failed to finish interrupted download: {e}",
            source.label()
        );
    }

    progress.finish(format!(
        "{}: {records_added} records in {pages} pages",
        source.label()
    ));
    log::info!(
        "{}: download finished ({outcome:?}): {records_added} records added, took {:.1}s",
        source.label(),
        start.elapsed().as_secs_f64()
    );

    Ok(DownloadResult {
        starting_offset,
        next_offset: offset,
        records_added,
        pages,
        outcome,
    })
}

/// Fetches the page at `offset` and stores it, retrying the pair as a
/// unit. Returns the number of records stored.
async fn fetch_and_store(
    source: &dyn PageSource,
    sink: &dyn RawSink,
    offset: u64,
    limit: u64,
    policy: &RetryPolicy,
) -> Result<u64, PageFailure> {
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        let result = async {
            let mut records = source.fetch_page(offset, limit).await?;
            if records.len() as u64 > limit {
                log::warn!(
                    "{}: asked for {limit} records, got {}; keeping the first {limit}",
                    source.label(),
                    records.len()
                );
                records.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
            }
            sink.append_page(offset, &records)?;
            Ok::<_, IngestError>(records.len() as u64)
        }
        .await;

        match result {
            Ok(stored) => return Ok(stored),
            Err(error) if policy.should_retry(attempt) => {
                let delay = policy.backoff(attempt);
                log::warn!(
                    "{}: attempt {attempt}/{} at offset {offset} failed: {error}; retrying in {}s",
                    source.label(),
                    policy.max_attempts,
                    delay.as_secs()
                );
                tokio::time::sleep(delay).await;
            }
            Err(error) => {
                return Err(PageFailure {
                    attempts: attempt,
                    error,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use nyc_crime_complaint_models::{CMPLNT_NUM, RawComplaintRecord};
    use nyc_crime_database::{Collection, ComplaintStore, DbError};
    use nyc_crime_source::SourceError;
    use serde_json::Value;

    use super::*;

    /// Serves `total` records in order, failing the next `failures`
    /// requests first.
    struct MockSource {
        total: u64,
        failures: AtomicU32,
        requests: Mutex<Vec<(u64, u64)>>,
    }

    impl MockSource {
        fn new(total: u64) -> Self {
            Self {
                total,
                failures: AtomicU32::new(0),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn failing(total: u64, failures: u32) -> Self {
            let source = Self::new(total);
            source.failures.store(failures, Ordering::SeqCst);
            source
        }

        fn requests(&self) -> Vec<(u64, u64)> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PageSource for MockSource {
        fn label(&self) -> &str {
            "mock"
        }

        async fn fetch_page(
            &self,
            offset: u64,
            limit: u64,
        ) -> Result<Vec<RawComplaintRecord>, SourceError> {
            self.requests.lock().unwrap().push((offset, limit));
            if self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(SourceError::UnexpectedResponse {
                    message: "connection reset".to_string(),
                });
            }
            let end = (offset + limit).min(self.total);
            Ok((offset..end)
                .map(|i| RawComplaintRecord::new().with(CMPLNT_NUM, Value::from(i.to_string())))
                .collect())
        }
    }

    /// Wraps a real store and fails the queued append calls, and `finish`
    /// when `fail_finish` is set.
    struct FlakySink {
        store: ComplaintStore,
        fail_appends: Mutex<VecDeque<bool>>,
        fail_finish: bool,
    }

    impl FlakySink {
        fn new(fail_appends: impl IntoIterator<Item = bool>, fail_finish: bool) -> Self {
            Self {
                store: store(),
                fail_appends: Mutex::new(fail_appends.into_iter().collect()),
                fail_finish,
            }
        }
    }

    impl RawSink for FlakySink {
        fn resume_offset(&self) -> Result<u64, DbError> {
            self.store.resume_offset()
        }

        fn append_page(
            &self,
            offset: u64,
            records: &[RawComplaintRecord],
        ) -> Result<u64, DbError> {
            if self.fail_appends.lock().unwrap().pop_front() == Some(true) {
                return Err(DbError::Conversion {
                    message: "disk full".to_string(),
                });
            }
            self.store.append_raw_page(offset, records)
        }

        fn finish(&self, records_added: u64, fully_synced: bool) -> Result<(), DbError> {
            if self.fail_finish {
                return Err(DbError::Conversion {
                    message: "index build failed".to_string(),
                });
            }
            RawSink::finish(&self.store, records_added, fully_synced)
        }
    }

    fn store() -> ComplaintStore {
        ComplaintStore::open_in_memory("raw", "clean").unwrap()
    }

    fn config(page_size: u64) -> DownloadConfig {
        DownloadConfig {
            page_size,
            limit: None,
        }
    }

    fn stored_ids(store: &ComplaintStore) -> Vec<String> {
        store
            .scan_raw(100)
            .flat_map(Result::unwrap)
            .map(|r| r.text(CMPLNT_NUM).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn downloads_until_short_page() {
        let source = MockSource::new(12);
        let store = store();

        let result = download(&source, &store, &config(5), &RetryPolicy::immediate(5), None)
            .await
            .unwrap();

        assert_eq!(result.outcome, DownloadOutcome::Completed);
        assert_eq!(result.records_added, 12);
        assert_eq!(result.pages, 3);
        assert_eq!(result.next_offset, 12);
        assert_eq!(source.requests(), vec![(0, 5), (5, 5), (10, 5)]);
        assert_eq!(store.count(Collection::Raw).unwrap(), 12);

        let status = store.sync_status().unwrap();
        assert!(status.fully_synced);
        assert_eq!(status.next_offset, Some(12));
    }

    #[tokio::test]
    async fn empty_page_after_full_page_completes() {
        let source = MockSource::new(10);
        let store = store();

        let result = download(&source, &store, &config(5), &RetryPolicy::immediate(5), None)
            .await
            .unwrap();

        assert_eq!(result.outcome, DownloadOutcome::Completed);
        assert_eq!(result.records_added, 10);
        assert_eq!(result.pages, 2);
        assert_eq!(source.requests().last(), Some(&(10, 5)));
    }

    #[tokio::test]
    async fn transient_failures_ingest_the_page_once() {
        let source = MockSource::failing(3, 4);
        let store = store();

        let result = download(&source, &store, &config(5), &RetryPolicy::immediate(5), None)
            .await
            .unwrap();

        assert_eq!(result.outcome, DownloadOutcome::Completed);
        assert_eq!(source.requests(), vec![(0, 5); 5]);
        assert_eq!(stored_ids(&store), vec!["0", "1", "2"]);
    }

    #[tokio::test]
    async fn exhausted_retries_report_resume_offset() {
        let source = MockSource::new(20);
        let store = store();
        store.append_raw_page(0, &source.fetch_page(0, 5).await.unwrap()).unwrap();
        source.requests.lock().unwrap().clear();
        source.failures.store(5, Ordering::SeqCst);

        let result = download(&source, &store, &config(5), &RetryPolicy::immediate(5), None)
            .await
            .unwrap();

        assert_eq!(
            result.outcome,
            DownloadOutcome::Interrupted {
                offset: 5,
                attempts: 5,
                error: "Source error: Unexpected response: connection reset".to_string(),
            }
        );
        assert_eq!(result.records_added, 0);
        assert_eq!(store.count(Collection::Raw).unwrap(), 5);
        assert_eq!(store.resume_offset().unwrap(), 5);
        assert!(!store.sync_status().unwrap().fully_synced);
    }

    #[tokio::test]
    async fn resumes_without_refetching() {
        let source = MockSource::new(8);
        let store = store();
        store.append_raw_page(0, &source.fetch_page(0, 5).await.unwrap()).unwrap();
        source.requests.lock().unwrap().clear();

        let result = download(&source, &store, &config(5), &RetryPolicy::immediate(5), None)
            .await
            .unwrap();

        assert_eq!(result.starting_offset, 5);
        assert_eq!(result.records_added, 3);
        assert_eq!(source.requests(), vec![(5, 5)]);
        assert_eq!(stored_ids(&store), ["0", "1", "2", "3", "4", "5", "6", "7"]);
    }

    #[tokio::test]
    async fn storage_failure_is_retried_at_same_offset() {
        let source = MockSource::new(7);
        let sink = FlakySink::new([false, true, true], false);

        let result = download(&source, &sink, &config(5), &RetryPolicy::immediate(5), None)
            .await
            .unwrap();

        assert_eq!(result.outcome, DownloadOutcome::Completed);
        assert_eq!(source.requests(), vec![(0, 5), (5, 5), (5, 5), (5, 5)]);
        assert_eq!(sink.store.count(Collection::Raw).unwrap(), 7);
    }

    #[tokio::test]
    async fn limit_caps_records_fetched() {
        let source = MockSource::new(100);
        let store = store();
        let config = DownloadConfig {
            page_size: 5,
            limit: Some(12),
        };

        let result = download(&source, &store, &config, &RetryPolicy::immediate(5), None)
            .await
            .unwrap();

        assert_eq!(result.outcome, DownloadOutcome::LimitReached);
        assert_eq!(result.records_added, 12);
        assert_eq!(source.requests(), vec![(0, 5), (5, 5), (10, 2)]);
        assert!(!store.sync_status().unwrap().fully_synced);
    }

    #[tokio::test]
    async fn nothing_to_fetch_completes_without_pages() {
        let source = MockSource::new(0);
        let store = store();

        let result = download(&source, &store, &config(5), &RetryPolicy::immediate(5), None)
            .await
            .unwrap();

        assert_eq!(result.outcome, DownloadOutcome::Completed);
        assert_eq!(result.pages, 0);
        assert_eq!(store.count(Collection::Raw).unwrap(), 0);
    }

    #[tokio::test]
    async fn finish_failure_keeps_interrupted_outcome() {
        let source = MockSource::failing(20, 3);
        let sink = FlakySink::new([], true);

        let result = download(&source, &sink, &config(5), &RetryPolicy::immediate(3), None)
            .await
            .unwrap();

        assert!(matches!(
            result.outcome,
            DownloadOutcome::Interrupted { offset: 0, attempts: 3, .. }
        ));
        assert_eq!(result.next_offset, 0);
    }

    #[tokio::test]
    async fn finish_failure_after_completed_run_is_an_error() {
        let source = MockSource::new(3);
        let sink = FlakySink::new([], true);

        let result =
            download(&source, &sink, &config(5), &RetryPolicy::immediate(3), None).await;

        assert!(matches!(result, Err(IngestError::Database(_))));
        assert_eq!(sink.store.count(Collection::Raw).unwrap(), 3);
    }

    fn timed_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 5,
            backoff_unit: Duration::from_secs(5),
            page_delay: Duration::from_secs(1),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn page_delay_only_between_full_pages() {
        let source = MockSource::new(12);
        let store = store();

        let started = tokio::time::Instant::now();
        let result = download(&source, &store, &config(5), &timed_policy(), None)
            .await
            .unwrap();

        assert_eq!(result.pages, 3);
        // Two full pages are each followed by the delay; the short page is not.
        assert_eq!(started.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_back_off_linearly() {
        let source = MockSource::failing(3, 3);
        let store = store();

        let started = tokio::time::Instant::now();
        let result = download(&source, &store, &config(5), &timed_policy(), None)
            .await
            .unwrap();

        assert_eq!(result.outcome, DownloadOutcome::Completed);
        assert_eq!(source.requests().len(), 4);
        // 5s + 10s + 15s, then a short page with no page delay.
        assert_eq!(started.elapsed(), Duration::from_secs(30));
    }
}
