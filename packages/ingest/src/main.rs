#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the NYC complaint ingestion tool.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use nyc_crime_database::ComplaintStore;
use nyc_crime_ingest::{commands, open_store};
use nyc_crime_ingest_models::{CleanConfig, DEFAULT_CLEAN_BATCH_SIZE};
use nyc_crime_source::dataset::{
    DatasetDefinition, dataset_ids, default_dataset, load_dataset,
};

#[derive(Parser)]
#[command(
    name = "nyc_crime_ingest",
    about = "Download and clean NYC complaint data"
)]
struct Cli {
    /// Path to the `DuckDB` store (overrides `NYC_CRIME_DB_PATH`)
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Dataset definition to use (see `datasets`)
    #[arg(long, global = true)]
    dataset: Option<String>,
    /// Skip the `yes` confirmation prompts
    #[arg(long, short = 'y', global = true)]
    yes: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Download raw records, resuming from the last stored page
    Download {
        /// Records per request (defaults to the dataset's page size)
        #[arg(long)]
        batch_size: Option<u64>,
        /// Maximum number of records to fetch in this run (for testing)
        #[arg(long)]
        limit: Option<u64>,
    },
    /// Rebuild the clean collection from the raw collection
    Clean {
        /// Records read and written per batch
        #[arg(long, default_value_t = DEFAULT_CLEAN_BATCH_SIZE)]
        batch_size: usize,
    },
    /// Show the distribution of the clean collection
    Report,
    /// Audit the raw collection for missing, invalid and duplicate values
    Quality,
    /// Show the download cursor and collection sizes
    Status,
    /// List the embedded dataset definitions
    Datasets,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = nyc_crime_cli_utils::init_logger();
    let cli = Cli::parse();
    let dataset_id = cli.dataset.as_deref();
    let db = cli.db.as_deref();

    let store = match cli.command {
        Some(Commands::Datasets) => {
            list_datasets()?;
            None
        }
        None => {
            let (dataset, store) = open(dataset_id, db)?;
            nyc_crime_ingest::interactive::run(&store, &dataset, &multi).await?;
            Some(store)
        }
        Some(Commands::Download { batch_size, limit }) => {
            let (dataset, store) = open(dataset_id, db)?;
            let config = commands::download_config(&dataset, batch_size, limit);
            commands::download(&store, &dataset, config, cli.yes, &multi).await?;
            Some(store)
        }
        Some(Commands::Clean { batch_size }) => {
            let (_, store) = open(dataset_id, db)?;
            commands::clean(&store, CleanConfig { batch_size }, cli.yes, &multi)?;
            Some(store)
        }
        Some(Commands::Report) => {
            let (_, store) = open(dataset_id, db)?;
            commands::report(&store)?;
            Some(store)
        }
        Some(Commands::Quality) => {
            let (_, store) = open(dataset_id, db)?;
            commands::quality(&store)?;
            Some(store)
        }
        Some(Commands::Status) => {
            let (dataset, store) = open(dataset_id, db)?;
            commands::status(&store, &dataset)?;
            Some(store)
        }
    };

    if let Some(store) = store {
        store.close()?;
    }
    Ok(())
}

/// Loads the selected dataset definition and opens its store.
fn open(
    dataset_id: Option<&str>,
    db: Option<&Path>,
) -> Result<(DatasetDefinition, ComplaintStore), Box<dyn std::error::Error>> {
    let dataset = match dataset_id {
        Some(id) => load_dataset(id)?,
        None => default_dataset()?,
    };
    let store = open_store(&dataset, db)?;
    Ok((dataset, store))
}

fn list_datasets() -> Result<(), Box<dyn std::error::Error>> {
    for id in dataset_ids() {
        let dataset = load_dataset(id)?;
        println!("{:<24} {}", dataset.id, dataset.name);
    }
    Ok(())
}
