//! Config-driven remote dataset definition.
//!
//! A [`DatasetDefinition`] captures everything about the remote dataset and
//! where its records are stored. Definitions are TOML files under
//! `packages/source/datasets/`, baked into the binary at compile time via
//! [`include_str!`].

use chrono::NaiveDate;
use nyc_crime_complaint_models::ESSENTIAL_FIELDS;
use serde::Deserialize;

use crate::SourceError;

/// TOML configs embedded at compile time.
const DATASET_TOMLS: &[(&str, &str)] = &[(
    "nyc_complaints_2024",
    include_str!("../datasets/nyc_complaints_2024.toml"),
)];

/// Store table that collections may not be named after.
const RESERVED_TABLE: &str = "_meta";

/// A complete remote dataset definition.
#[derive(Debug, Clone, Deserialize)]
pub struct DatasetDefinition {
    /// Unique identifier (e.g., `"nyc_complaints_2024"`).
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Records requested per page.
    pub page_size: u64,
    /// Fields projected by the remote query.
    pub fields: Vec<String>,
    /// Remote API location.
    pub api: ApiConfig,
    /// Inclusive date range filter.
    pub window: DateWindow,
    /// Local collection names.
    pub storage: StorageConfig,
}

/// Socrata endpoint settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Portal base URL (e.g., `"https://data.cityofnewyork.us"`).
    pub base_url: String,
    /// Four-by-four dataset identifier (e.g., `"qgea-i56i"`).
    pub dataset_id: String,
    /// Column used for ordering and date filtering.
    pub date_column: String,
    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

const fn default_timeout_secs() -> u64 {
    30
}

/// Inclusive range of complaint dates to download.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct DateWindow {
    /// First day included.
    pub from: NaiveDate,
    /// Last day included.
    pub to: NaiveDate,
}

/// Names of the raw and clean collections in the local store.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Collection receiving records verbatim.
    pub raw_collection: String,
    /// Collection rebuilt by the cleaning pass.
    pub clean_collection: String,
}

impl DatasetDefinition {
    /// Returns the JSON resource URL
    /// (e.g., `https://data.cityofnewyork.us/resource/qgea-i56i.json`).
    #[must_use]
    pub fn resource_url(&self) -> String {
        format!(
            "{}/resource/{}.json",
            self.api.base_url.trim_end_matches('/'),
            self.api.dataset_id
        )
    }

    /// Returns the `$where` filter: coordinates present and the date inside
    /// [`DateWindow`].
    #[must_use]
    pub fn where_clause(&self) -> String {
        let column = &self.api.date_column;
        format!(
            "latitude IS NOT NULL AND longitude IS NOT NULL AND \
             {column} >= '{}T00:00:00.000' AND {column} <= '{}T23:59:59.999'",
            self.window.from.format("%Y-%m-%d"),
            self.window.to.format("%Y-%m-%d"),
        )
    }

    /// Returns the `$select` projection.
    #[must_use]
    pub fn select_clause(&self) -> String {
        self.fields.join(",")
    }

    fn check(&self) -> Result<(), SourceError> {
        if self.page_size == 0 {
            return Err(config_error(&self.id, "page_size must be greater than 0"));
        }
        if self.window.from > self.window.to {
            return Err(config_error(
                &self.id,
                &format!(
                    "window.from ({}) is after window.to ({})",
                    self.window.from, self.window.to
                ),
            ));
        }
        let storage = &self.storage;
        if let Some(name) = [&storage.raw_collection, &storage.clean_collection]
            .into_iter()
            .find(|name| name.eq_ignore_ascii_case(RESERVED_TABLE))
        {
            return Err(config_error(
                &self.id,
                &format!("collection name \"{name}\" is reserved"),
            ));
        }
        if storage
            .raw_collection
            .eq_ignore_ascii_case(&storage.clean_collection)
        {
            return Err(config_error(
                &self.id,
                "raw_collection and clean_collection must differ",
            ));
        }
        if let Some(field) = ESSENTIAL_FIELDS
            .iter()
            .find(|f| !self.fields.iter().any(|x| x == *f))
        {
            return Err(config_error(
                &self.id,
                &format!("fields must include \"{field}\""),
            ));
        }
        Ok(())
    }
}

fn config_error(id: &str, message: &str) -> SourceError {
    SourceError::Config {
        message: format!("{id}: {message}"),
    }
}

/// Parses and checks a dataset definition from TOML text.
///
/// # Errors
///
/// Returns [`SourceError::Config`] if the TOML is malformed or the
/// definition is inconsistent.
pub fn parse_dataset_toml(contents: &str) -> Result<DatasetDefinition, SourceError> {
    let def: DatasetDefinition = toml::from_str(contents).map_err(|e| SourceError::Config {
        message: e.to_string(),
    })?;
    def.check()?;
    Ok(def)
}

/// Returns the ids of all embedded dataset definitions.
#[must_use]
pub fn dataset_ids() -> Vec<&'static str> {
    DATASET_TOMLS.iter().map(|(id, _)| *id).collect()
}

/// Loads an embedded dataset definition by id.
///
/// # Errors
///
/// Returns [`SourceError::Config`] if the id is unknown or its TOML is
/// invalid.
pub fn load_dataset(id: &str) -> Result<DatasetDefinition, SourceError> {
    let (_, contents) = DATASET_TOMLS
        .iter()
        .find(|(name, _)| *name == id)
        .ok_or_else(|| SourceError::Config {
            message: format!(
                "unknown dataset \"{id}\" (available: {})",
                dataset_ids().join(", ")
            ),
        })?;
    parse_dataset_toml(contents)
}

/// Loads the default dataset (2024 NYPD complaints).
///
/// # Errors
///
/// Returns [`SourceError::Config`] if the embedded TOML is invalid.
pub fn default_dataset() -> Result<DatasetDefinition, SourceError> {
    load_dataset("nyc_complaints_2024")
}
