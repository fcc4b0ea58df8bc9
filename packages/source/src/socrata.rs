//! Socrata SODA API page fetcher.
//!
//! Pages through a dataset with the `$select`, `$where`, `$limit`,
//! `$offset` and `$order` query parameters. Ordering by the date column
//! keeps offsets stable between runs over unchanged data.

use std::time::Duration;

use async_trait::async_trait;
use nyc_crime_complaint_models::RawComplaintRecord;

use crate::dataset::DatasetDefinition;
use crate::{PageSource, SourceError, retry};

/// Header carrying an optional Socrata application token.
const APP_TOKEN_HEADER: &str = "X-App-Token";

/// Environment variable holding the Socrata application token.
pub const APP_TOKEN_ENV: &str = "NYC_CRIME_APP_TOKEN";

/// Reads the application token from [`APP_TOKEN_ENV`], ignoring an empty
/// value.
#[must_use]
pub fn app_token_from_env() -> Option<String> {
    std::env::var(APP_TOKEN_ENV)
        .ok()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

/// A [`PageSource`] backed by a Socrata resource endpoint.
pub struct SocrataClient {
    client: reqwest::Client,
    resource_url: String,
    select: String,
    where_clause: String,
    order: String,
    app_token: Option<String>,
    label: String,
}

impl SocrataClient {
    /// Builds a client for `dataset`. The app token raises the rate limit
    /// but is not required.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Http`] if the HTTP client cannot be built.
    pub fn new(dataset: &DatasetDefinition, app_token: Option<String>) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .user_agent("nyc-crime/1.0")
            .timeout(Duration::from_secs(dataset.api.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            resource_url: dataset.resource_url(),
            select: dataset.select_clause(),
            where_clause: dataset.where_clause(),
            order: dataset.api.date_column.clone(),
            app_token,
            label: dataset.name.clone(),
        })
    }

    fn request(&self, offset: u64, limit: u64) -> reqwest::RequestBuilder {
        let limit = limit.to_string();
        let offset = offset.to_string();
        let mut request = self.client.get(&self.resource_url).query(&[
            ("$select", self.select.as_str()),
            ("$where", self.where_clause.as_str()),
            ("$limit", limit.as_str()),
            ("$offset", offset.as_str()),
            ("$order", self.order.as_str()),
        ]);
        if let Some(token) = &self.app_token {
            request = request.header(APP_TOKEN_HEADER, token);
        }
        request
    }
}

#[async_trait]
impl PageSource for SocrataClient {
    fn label(&self) -> &str {
        &self.label
    }

    async fn fetch_page(
        &self,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<RawComplaintRecord>, SourceError> {
        log::debug!("[{}] GET offset={offset} limit={limit}", self.label);
        let body = retry::send_json(self.request(offset, limit)).await?;
        parse_page(body)
    }
}

/// Converts a SODA response body (a JSON array of objects) into raw
/// records.
///
/// # Errors
///
/// Returns [`SourceError::UnexpectedResponse`] if the body is not an array
/// of objects.
pub fn parse_page(body: serde_json::Value) -> Result<Vec<RawComplaintRecord>, SourceError> {
    let serde_json::Value::Array(rows) = body else {
        return Err(SourceError::UnexpectedResponse {
            message: format!("expected a JSON array, got {}", kind(&body)),
        });
    };

    rows.into_iter()
        .enumerate()
        .map(|(i, row)| match row {
            serde_json::Value::Object(map) => Ok(RawComplaintRecord::from(map)),
            other => Err(SourceError::UnexpectedResponse {
                message: format!("row {i} is {}, expected an object", kind(&other)),
            }),
        })
        .collect()
}

const fn kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}
