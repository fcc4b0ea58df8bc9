#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Complaint record types and the validation rules that turn a raw record
//! into a clean one.
//!
//! Raw records come straight from the open-data API and have no enforced
//! shape, so they are kept as a field-name → JSON value map. A
//! [`CleanComplaintRecord`] only exists once [`validate`] has accepted the
//! raw record.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum_macros::{AsRefStr, Display, EnumString};

/// Complaint identifier.
pub const CMPLNT_NUM: &str = "cmplnt_num";
/// Date the complaint started (`2024-01-15T00:00:00.000`).
pub const CMPLNT_FR_DT: &str = "cmplnt_fr_dt";
/// Time of day the complaint started (`14:30:00`).
pub const CMPLNT_FR_TM: &str = "cmplnt_fr_tm";
/// Borough name.
pub const BORO_NM: &str = "boro_nm";
/// Latitude, as text in the raw feed.
pub const LATITUDE: &str = "latitude";
/// Longitude, as text in the raw feed.
pub const LONGITUDE: &str = "longitude";
/// Offense description.
pub const OFNS_DESC: &str = "ofns_desc";
/// Level of offense (`FELONY`, `MISDEMEANOR`, `VIOLATION`).
pub const LAW_CAT_CD: &str = "law_cat_cd";

/// Every field requested from the API and kept downstream.
pub const ESSENTIAL_FIELDS: &[&str] = &[
    CMPLNT_NUM,
    CMPLNT_FR_DT,
    CMPLNT_FR_TM,
    BORO_NM,
    LATITUDE,
    LONGITUDE,
    OFNS_DESC,
    LAW_CAT_CD,
];

/// Fields whose absence rejects a record. The start time is not among
/// them; it falls back to [`DEFAULT_TIME`].
pub const REQUIRED_FIELDS: &[&str] = &[
    CMPLNT_NUM,
    CMPLNT_FR_DT,
    BORO_NM,
    LATITUDE,
    LONGITUDE,
    OFNS_DESC,
    LAW_CAT_CD,
];

/// Marker the source uses for an unknown borough.
pub const NULL_REGION_MARKER: &str = "(null)";

/// Start time stored when the raw record has none.
pub const DEFAULT_TIME: &str = "00:00:00";

/// A latitude/longitude rectangle, bounds inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Southern edge.
    pub min_latitude: f64,
    /// Northern edge.
    pub max_latitude: f64,
    /// Western edge.
    pub min_longitude: f64,
    /// Eastern edge.
    pub max_longitude: f64,
}

impl BoundingBox {
    /// Returns `true` if the point lies inside the box. `NaN` never does.
    #[must_use]
    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        (self.min_latitude..=self.max_latitude).contains(&latitude)
            && (self.min_longitude..=self.max_longitude).contains(&longitude)
    }
}

/// The five boroughs plus a little slack.
pub const NYC_BOUNDS: BoundingBox = BoundingBox {
    min_latitude: 40.4,
    max_latitude: 41.0,
    min_longitude: -74.4,
    max_longitude: -73.6,
};

/// A complaint exactly as the API returned it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawComplaintRecord(Map<String, Value>);

impl RawComplaintRecord {
    /// Creates an empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a record whose values are all strings, the way the API
    /// serves them.
    #[must_use]
    pub fn from_text_fields<'a>(fields: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        fields
            .into_iter()
            .fold(Self::new(), |record, (k, v)| record.with(k, Value::from(v)))
    }

    /// Returns the record with `field` set to `value`.
    #[must_use]
    pub fn with(mut self, field: &str, value: Value) -> Self {
        self.0.insert(field.to_string(), value);
        self
    }

    /// Returns the raw JSON value of a field.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Returns the field as text if it is present.
    ///
    /// Present means a non-empty string or a number (rendered as its JSON
    /// text). `null`, `""`, booleans, arrays and objects are absent.
    #[must_use]
    pub fn text(&self, field: &str) -> Option<String> {
        value_text(self.0.get(field)?)
    }

    /// Number of fields in the record.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the record has no fields at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Borrows the underlying map.
    #[must_use]
    pub const fn fields(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl From<Map<String, Value>> for RawComplaintRecord {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Renders a scalar JSON value as text, treating empty and non-scalar
/// values as absent.
#[must_use]
pub fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Parses a coordinate from its textual form, ignoring surrounding
/// whitespace.
#[must_use]
pub fn parse_coordinate(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok()
}

/// A complaint that passed validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanComplaintRecord {
    /// Unique complaint identifier.
    #[serde(rename = "cmplnt_num")]
    pub complaint_id: String,
    /// Start date as served by the API.
    #[serde(rename = "cmplnt_fr_dt")]
    pub occurred_date: String,
    /// Start time, [`DEFAULT_TIME`] when the source had none.
    #[serde(rename = "cmplnt_fr_tm")]
    pub occurred_time: String,
    /// Borough name.
    #[serde(rename = "boro_nm")]
    pub borough: String,
    /// Latitude (WGS84), inside [`NYC_BOUNDS`].
    pub latitude: f64,
    /// Longitude (WGS84), inside [`NYC_BOUNDS`].
    pub longitude: f64,
    /// Offense description.
    #[serde(rename = "ofns_desc")]
    pub offense: String,
    /// Level of offense.
    #[serde(rename = "law_cat_cd")]
    pub law_category: String,
}

/// Why a raw record was dropped. Exactly one reason is assigned per
/// record, checked in declaration order.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RejectionReason {
    /// A required field is absent, or the borough is empty or `(null)`.
    Missing,
    /// The identifier was already accepted earlier in the pass.
    Duplicate,
    /// Coordinates do not parse or fall outside [`NYC_BOUNDS`].
    InvalidCoordinates,
}

impl RejectionReason {
    /// All reasons in precedence order.
    pub const ALL: &[Self] = &[Self::Missing, Self::Duplicate, Self::InvalidCoordinates];
}

/// Classifies a raw record against the identifiers accepted so far.
///
/// Checks run in a fixed order and the first failure wins: missing
/// fields, then duplicate identifier, then coordinates. The caller is
/// responsible for adding the accepted identifier to `seen`.
///
/// # Errors
///
/// Returns the [`RejectionReason`] of the first failing check.
#[allow(clippy::implicit_hasher)]
pub fn validate(
    record: &RawComplaintRecord,
    seen: &HashSet<String>,
) -> Result<CleanComplaintRecord, RejectionReason> {
    let (
        Some(complaint_id),
        Some(occurred_date),
        Some(borough),
        Some(latitude),
        Some(longitude),
        Some(offense),
        Some(law_category),
    ) = (
        record.text(CMPLNT_NUM),
        record.text(CMPLNT_FR_DT),
        record.text(BORO_NM),
        record.text(LATITUDE),
        record.text(LONGITUDE),
        record.text(OFNS_DESC),
        record.text(LAW_CAT_CD),
    )
    else {
        return Err(RejectionReason::Missing);
    };

    if borough == NULL_REGION_MARKER {
        return Err(RejectionReason::Missing);
    }

    if seen.contains(&complaint_id) {
        return Err(RejectionReason::Duplicate);
    }

    let (Some(latitude), Some(longitude)) =
        (parse_coordinate(&latitude), parse_coordinate(&longitude))
    else {
        return Err(RejectionReason::InvalidCoordinates);
    };

    if !NYC_BOUNDS.contains(latitude, longitude) {
        return Err(RejectionReason::InvalidCoordinates);
    }

    Ok(CleanComplaintRecord {
        complaint_id,
        occurred_date,
        occurred_time: record
            .text(CMPLNT_FR_TM)
            .unwrap_or_else(|| DEFAULT_TIME.to_string()),
        borough,
        latitude,
        longitude,
        offense,
        law_category,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queens_theft(id: &str) -> RawComplaintRecord {
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

    #[test]
    fn accepts_complete_record_and_parses_coordinates() {
        let clean = validate(&queens_theft("1"), &HashSet::new()).unwrap();
        assert_eq!(clean.complaint_id, "1");
        assert_eq!(clean.borough, "QUEENS");
        assert!((clean.latitude - 40.7).abs() < f64::EPSILON);
        assert!((clean.longitude - -73.8).abs() < f64::EPSILON);
        assert_eq!(clean.occurred_time, DEFAULT_TIME);
    }

    #[test]
    fn keeps_source_time_when_present() {
        let record = queens_theft("1").with(CMPLNT_FR_TM, Value::from("14:30:00"));
        let clean = validate(&record, &HashSet::new()).unwrap();
        assert_eq!(clean.occurred_time, "14:30:00");
    }

    #[test]
    fn null_time_falls_back_to_midnight() {
        let record = queens_theft("1").with(CMPLNT_FR_TM, Value::Null);
        let clean = validate(&record, &HashSet::new()).unwrap();
        assert_eq!(clean.occurred_time, DEFAULT_TIME);
    }

    #[test]
    fn null_marker_borough_is_missing() {
        let record = queens_theft("1").with(BORO_NM, Value::from("(null)"));
        assert_eq!(
            validate(&record, &HashSet::new()),
            Err(RejectionReason::Missing)
        );
    }

    #[test]
    fn each_required_field_is_checked() {
        for field in REQUIRED_FIELDS {
            let mut map = queens_theft("1").fields().clone();
            map.remove(*field);
            let record = RawComplaintRecord::from(map);
            assert_eq!(
                validate(&record, &HashSet::new()),
                Err(RejectionReason::Missing),
                "removing {field} should reject as missing"
            );
        }
    }

    #[test]
    fn empty_and_null_values_are_missing() {
        let empty = queens_theft("1").with(OFNS_DESC, Value::from(""));
        let null = queens_theft("1").with(LAW_CAT_CD, Value::Null);
        assert_eq!(validate(&empty, &HashSet::new()), Err(RejectionReason::Missing));
        assert_eq!(validate(&null, &HashSet::new()), Err(RejectionReason::Missing));
    }

    #[test]
    fn missing_wins_over_duplicate_and_coordinates() {
        let seen: HashSet<String> = std::iter::once("1".to_string()).collect();
        let record = queens_theft("1")
            .with(LATITUDE, Value::from("99.9"))
            .with(BORO_NM, Value::from(""));
        assert_eq!(validate(&record, &seen), Err(RejectionReason::Missing));
    }

    #[test]
    fn duplicate_wins_over_coordinates() {
        let seen: HashSet<String> = std::iter::once("7".to_string()).collect();
        let record = queens_theft("7").with(LATITUDE, Value::from("not a number"));
        assert_eq!(validate(&record, &seen), Err(RejectionReason::Duplicate));
    }

    #[test]
    fn out_of_range_latitude_is_invalid() {
        let record = queens_theft("1").with(LATITUDE, Value::from("99.9"));
        assert_eq!(
            validate(&record, &HashSet::new()),
            Err(RejectionReason::InvalidCoordinates)
        );
    }

    #[test]
    fn unparsable_and_nan_coordinates_are_invalid() {
        let garbage = queens_theft("1").with(LONGITUDE, Value::from("-73.8W"));
        let nan = queens_theft("1").with(LATITUDE, Value::from("NaN"));
        assert_eq!(
            validate(&garbage, &HashSet::new()),
            Err(RejectionReason::InvalidCoordinates)
        );
        assert_eq!(
            validate(&nan, &HashSet::new()),
            Err(RejectionReason::InvalidCoordinates)
        );
    }

    #[test]
    fn numeric_coordinates_are_accepted() {
        let record = queens_theft("1")
            .with(LATITUDE, serde_json::json!(40.75))
            .with(LONGITUDE, serde_json::json!(-73.95));
        let clean = validate(&record, &HashSet::new()).unwrap();
        assert!((clean.latitude - 40.75).abs() < f64::EPSILON);
    }

    #[test]
    fn bounds_are_inclusive() {
        assert!(NYC_BOUNDS.contains(40.4, -74.4));
        assert!(NYC_BOUNDS.contains(41.0, -73.6));
        assert!(!NYC_BOUNDS.contains(41.000_001, -73.8));
        assert!(!NYC_BOUNDS.contains(40.7, f64::NAN));
    }

    #[test]
    fn rejection_reason_names() {
        assert_eq!(RejectionReason::Missing.to_string(), "missing");
        assert_eq!(
            RejectionReason::InvalidCoordinates.as_ref(),
            "invalid_coordinates"
        );
        assert_eq!(
            "duplicate".parse::<RejectionReason>().unwrap(),
            RejectionReason::Duplicate
        );
    }

    #[test]
    fn clean_record_serializes_with_dataset_field_names() {
        let clean = validate(&queens_theft("1"), &HashSet::new()).unwrap();
        let json = serde_json::to_value(&clean).unwrap();
        assert_eq!(json[CMPLNT_NUM], "1");
        assert_eq!(json[LAW_CAT_CD], "FELONY");
        assert!(json[LATITUDE].is_f64());
    }
}
