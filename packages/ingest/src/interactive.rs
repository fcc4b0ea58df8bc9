#![allow(clippy::module_name_repetitions)]

//! Interactive menu for the ingestion tool.
//!
//! Provides a menu-driven interface using `dialoguer` for running the
//! pipeline steps without memorizing CLI flags.

use dialoguer::{Input, Select};
use nyc_crime_cli_utils::MultiProgress;
use nyc_crime_database::ComplaintStore;
use nyc_crime_ingest_models::CleanConfig;
use nyc_crime_source::dataset::DatasetDefinition;

use crate::commands;

/// Top-level actions available in the interactive menu.
enum IngestAction {
    Download,
    Clean,
    Report,
    Quality,
    Status,
}

impl IngestAction {
    const ALL: &[Self] = &[
        Self::Download,
        Self::Clean,
        Self::Report,
        Self::Quality,
        Self::Status,
    ];

    #[must_use]
    const fn label(&self) -> &'static str {
        match self {
            Self::Download => "Download raw records",
            Self::Clean => "Clean raw records",
            Self::Report => "Show clean data distribution",
            Self::Quality => "Check raw data quality",
            Self::Status => "Show sync status",
        }
    }
}

/// Prompts for one action and runs it. Download and clean still ask for
/// their own `yes` confirmation.
///
/// # Errors
///
/// Returns an error if a prompt or the selected operation fails.
pub async fn run(
    store: &ComplaintStore,
    dataset: &DatasetDefinition,
    multi: &MultiProgress,
) -> Result<(), Box<dyn std::error::Error>> {
    let labels: Vec<&str> = IngestAction::ALL.iter().map(IngestAction::label).collect();

    let idx = Select::new()
        .with_prompt("What would you like to do?")
        .items(&labels)
        .default(0)
        .interact()?;

    match IngestAction::ALL[idx] {
        IngestAction::Download => {
            let limit = prompt_optional_u64("Record limit (empty for no limit)")?;
            let config = commands::download_config(dataset, None, limit);
            commands::download(store, dataset, config, false, multi).await?;
        }
        IngestAction::Clean => commands::clean(store, CleanConfig::default(), false, multi)?,
        IngestAction::Report => commands::report(store)?,
        IngestAction::Quality => commands::quality(store)?,
        IngestAction::Status => commands::status(store, dataset)?,
    }

    Ok(())
}

/// Prompts for an optional number. Empty input means `None`.
fn prompt_optional_u64(prompt: &str) -> Result<Option<u64>, Box<dyn std::error::Error>> {
    let input: String = Input::new()
        .with_prompt(prompt)
        .allow_empty(true)
        .interact_text()?;

    let trimmed = input.trim();
    if trimmed.is_empty() {
        Ok(None)
    } else {
        Ok(Some(trimmed.parse()?))
    }
}
