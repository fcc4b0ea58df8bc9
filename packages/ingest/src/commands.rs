//! Operator-facing commands shared by the CLI and the interactive menu.
//!
//! Each command prompts when needed, runs one pipeline step against an
//! opened store, and prints its summary.

use nyc_crime_analytics::distribution::{clean_distribution, retention_summary};
use nyc_crime_analytics::quality::raw_quality;
use nyc_crime_cli_utils::{IndicatifProgress, MultiProgress, confirm_yes};
use nyc_crime_database::{Collection, ComplaintStore};
use nyc_crime_ingest_models::{CleanConfig, DownloadConfig};
use nyc_crime_source::dataset::DatasetDefinition;
use nyc_crime_source::retry::RetryPolicy;
use nyc_crime_source::socrata::{SocrataClient, app_token_from_env};

use crate::report;

/// Builds the download configuration from the dataset, with optional
/// overrides from the command line.
#[must_use]
pub fn download_config(
    dataset: &DatasetDefinition,
    page_size: Option<u64>,
    limit: Option<u64>,
) -> DownloadConfig {
    DownloadConfig {
        page_size: page_size.unwrap_or(dataset.page_size),
        limit,
    }
}

/// Downloads the dataset into the raw collection, resuming where the last
/// run stopped.
///
/// Unless `assume_yes` is set, the operator must type `yes` to start and,
/// when the raw collection already holds records, `yes` again to resume.
///
/// # Errors
///
/// Returns an error if the prompt, the HTTP client, or the store fails.
/// A page that fails every retry is reported in the summary, not as an
/// error.
pub async fn download(
    store: &ComplaintStore,
    dataset: &DatasetDefinition,
    config: DownloadConfig,
    assume_yes: bool,
    multi: &MultiProgress,
) -> Result<(), Box<dyn std::error::Error>> {
    let policy = RetryPolicy::default();

    println!("{}", dataset.name);
    println!(
        "  Window:      {} to {}",
        dataset.window.from, dataset.window.to
    );
    println!("  Page size:   {}", config.page_size);
    println!("  Max retries: {}", policy.max_attempts);
    if let Some(limit) = config.limit {
        println!("  Limit:       {limit} records");
    }

    if !assume_yes && !confirm_yes("Start download?")? {
        println!("Cancelled.");
        return Ok(());
    }

    let existing = store.resume_offset()?;
    if existing > 0
        && !assume_yes
        && !confirm_yes(&format!("Continue from offset {existing}?"))?
    {
        println!("Exiting.");
        return Ok(());
    }

    let client = SocrataClient::new(dataset, app_token_from_env())?;
    let progress = IndicatifProgress::records_bar(multi, &dataset.name);
    let result =
        crate::download::download(&client, store, &config, &policy, Some(progress)).await?;

    println!(
        "{}",
        report::render_download(&result, store.count(Collection::Raw)?)
    );
    Ok(())
}

/// Rebuilds the clean collection and prints the cleaning summary and the
/// clean distribution.
///
/// # Errors
///
/// Returns an error if the prompt or the store fails.
pub fn clean(
    store: &ComplaintStore,
    config: CleanConfig,
    assume_yes: bool,
    multi: &MultiProgress,
) -> Result<(), Box<dyn std::error::Error>> {
    let raw = store.table(Collection::Raw);
    let clean_table = store.table(Collection::Clean);

    println!("This will rebuild {clean_table} from {raw}:");
    println!("  - removes records with missing fields");
    println!("  - converts coordinates to numbers and drops those outside NYC");
    println!("  - keeps the first record for each complaint number");

    if !assume_yes && !confirm_yes("Start cleaning?")? {
        println!("Cancelled.");
        return Ok(());
    }

    let progress = IndicatifProgress::batch_bar(multi, "Cleaning");
    let result = crate::clean::clean(store, &config, Some(progress))?;
    let retention = retention_summary(store)?;

    println!("{}", report::render_clean(&result, &retention));
    if result.examined > 0 {
        println!("{}", report::render_distribution(&clean_distribution(store)?));
    }
    Ok(())
}

/// Prints retention and distribution of the current clean collection.
///
/// # Errors
///
/// Returns an error if a summary query fails.
pub fn report(store: &ComplaintStore) -> Result<(), Box<dyn std::error::Error>> {
    let retention = retention_summary(store)?;
    println!(
        "Raw records: {}  Clean records: {}",
        retention.original, retention.cleaned
    );
    println!("{}", report::render_distribution(&clean_distribution(store)?));
    Ok(())
}

/// Prints the raw collection quality audit.
///
/// # Errors
///
/// Returns an error if an audit query fails.
pub fn quality(store: &ComplaintStore) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", report::render_quality(&raw_quality(store)?));
    Ok(())
}

/// Prints the download state and collection sizes.
///
/// # Errors
///
/// Returns an error if the store cannot be read.
pub fn status(
    store: &ComplaintStore,
    dataset: &DatasetDefinition,
) -> Result<(), Box<dyn std::error::Error>> {
    let sync = store.sync_status()?;
    let clean = store.count(Collection::Clean)?;
    println!("{}", report::render_status(&dataset.name, &sync, clean));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_overrides_dataset_page_size() {
        let dataset = nyc_crime_source::dataset::default_dataset().unwrap();
        assert_eq!(download_config(&dataset, None, None).page_size, 5000);

        let config = download_config(&dataset, Some(1000), Some(2500));
        assert_eq!(config.page_size, 1000);
        assert_eq!(config.limit, Some(2500));
    }
}
