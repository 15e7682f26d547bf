//! Typed validation of raw trip rows.
//!
//! Raw CSV rows are read as loosely-typed strings and promoted to a
//! [`TripRecord`] here, so every later stage works with typed fields.

use std::collections::BTreeMap;

use serde::Deserialize;
use strum_macros::{AsRefStr, Display};
use trip_flows_trip_models::TripRecord;

/// Cell values treated as null in every column.
pub const NULL_TOKENS: &[&str] = &["", "NA", "N310"];

/// Columns that must be present in a raw trip dataset header.
pub const REQUIRED_COLUMNS: &[&str] = &["origin_stop", "destination_stop", "quantity"];

/// Additional columns that mark a tagged dataset.
pub const TAGGED_COLUMNS: &[&str] = &["origin_suburb", "destination_suburb"];

/// A raw trip row before validation. Unknown columns are ignored.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct RawTripRow {
    pub origin_stop: Option<String>,
    pub origin_stop_type: Option<String>,
    pub origin_stop_name: Option<String>,
    pub origin_stop_lat: Option<String>,
    pub origin_stop_lon: Option<String>,
    pub destination_stop: Option<String>,
    pub destination_stop_type: Option<String>,
    pub destination_stop_name: Option<String>,
    pub destination_stop_lat: Option<String>,
    pub destination_stop_lon: Option<String>,
    pub operator: Option<String>,
    pub route: Option<String>,
    pub direction: Option<String>,
    pub ticket_type: Option<String>,
    pub quantity: Option<String>,
    pub distance: Option<String>,
}

/// Why a row was excluded from a stage's working set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum SkipReason {
    /// `origin_stop` or `destination_stop` is null.
    MissingStop,
    /// `quantity` is null, negative, or not an integer.
    InvalidQuantity,
    /// `distance` is not a finite, non-negative number.
    InvalidDistance,
    /// The CSV record itself could not be decoded.
    Unreadable,
}

/// Per-reason counts of skipped rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SkipCounts(BTreeMap<SkipReason, u64>);

impl SkipCounts {
    pub fn record(&mut self, reason: SkipReason) {
        *self.0.entry(reason).or_insert(0) += 1;
    }

    pub fn merge(&mut self, other: &Self) {
        for (reason, count) in &other.0 {
            *self.0.entry(*reason).or_insert(0) += count;
        }
    }

    #[must_use]
    pub fn get(&self, reason: SkipReason) -> u64 {
        self.0.get(&reason).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        self.0.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SkipReason, u64)> + '_ {
        self.0.iter().map(|(reason, count)| (*reason, *count))
    }
}

impl std::fmt::Display for SkipCounts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.is_empty() {
            return write!(f, "none");
        }
        let parts: Vec<String> = self
            .iter()
            .map(|(reason, count)| format!("{reason}={count}"))
            .collect();
        write!(f, "{}", parts.join(", "))
    }
}

fn non_null(value: Option<String>) -> Option<String> {
    value.filter(|v| !NULL_TOKENS.contains(&v.trim()))
}

/// Parses an optional numeric cell. Null cells are `Ok(None)`; text that
/// is not a number is `Err`.
fn parse_optional_f64(value: Option<String>) -> Result<Option<f64>, ()> {
    non_null(value).map_or(Ok(None), |v| v.trim().parse::<f64>().map(Some).map_err(|_| ()))
}

/// A validated row plus the coordinate cells that had to be dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedTrip {
    pub record: TripRecord,
    /// The origin had a coordinate cell that is not a number.
    pub malformed_origin: bool,
    /// The destination had a coordinate cell that is not a number.
    pub malformed_destination: bool,
}

impl ValidatedTrip {
    /// Number of trip ends whose coordinates were dropped (0 to 2).
    #[must_use]
    pub fn malformed_sides(&self) -> u64 {
        u64::from(self.malformed_origin) + u64::from(self.malformed_destination)
    }
}

/// Parses a coordinate pair. A cell that is not a number nulls the whole
/// pair, so that side can never be matched; the flag records the drop.
fn coordinate_pair(
    lat: Option<String>,
    lon: Option<String>,
) -> (Option<f64>, Option<f64>, bool) {
    match (parse_optional_f64(lat), parse_optional_f64(lon)) {
        (Ok(lat), Ok(lon)) => (lat, lon, false),
        _ => (None, None, true),
    }
}

/// Validates a raw row.
///
/// Stops and quantity are mandatory. Coordinate text that is not a number
/// is dropped rather than rejecting the row, and coordinates that parse
/// but lie outside WGS84 bounds are kept; either way the tagger leaves
/// that side unmatched.
///
/// # Errors
///
/// Returns the [`SkipReason`] that excludes the row.
pub fn validate_row(raw: RawTripRow) -> Result<ValidatedTrip, SkipReason> {
    let origin_stop = non_null(raw.origin_stop).ok_or(SkipReason::MissingStop)?;
    let destination_stop = non_null(raw.destination_stop).ok_or(SkipReason::MissingStop)?;

    let quantity = non_null(raw.quantity)
        .and_then(|q| q.trim().parse::<u64>().ok())
        .ok_or(SkipReason::InvalidQuantity)?;

    let distance = parse_optional_f64(raw.distance).map_err(|()| SkipReason::InvalidDistance)?;
    if distance.is_some_and(|d| !d.is_finite() || d < 0.0) {
        return Err(SkipReason::InvalidDistance);
    }

    let (origin_stop_lat, origin_stop_lon, malformed_origin) =
        coordinate_pair(raw.origin_stop_lat, raw.origin_stop_lon);
    let (destination_stop_lat, destination_stop_lon, malformed_destination) =
        coordinate_pair(raw.destination_stop_lat, raw.destination_stop_lon);

    let record = TripRecord {
        origin_stop,
        origin_stop_type: non_null(raw.origin_stop_type),
        origin_stop_name: non_null(raw.origin_stop_name),
        origin_stop_lat,
        origin_stop_lon,
        destination_stop,
        destination_stop_type: non_null(raw.destination_stop_type),
        destination_stop_name: non_null(raw.destination_stop_name),
        destination_stop_lat,
        destination_stop_lon,
        operator: non_null(raw.operator),
        route: non_null(raw.route),
        direction: non_null(raw.direction),
        ticket_type: non_null(raw.ticket_type),
        quantity,
        distance,
        origin_suburb: None,
        destination_suburb: None,
    };

    Ok(ValidatedTrip {
        record,
        malformed_origin,
        malformed_destination,
    })
}

impl TryFrom<RawTripRow> for TripRecord {
    type Error = SkipReason;

    fn try_from(raw: RawTripRow) -> Result<Self, Self::Error> {
        validate_row(raw).map(|validated| validated.record)
    }
}

/// Required columns missing from `headers`.
#[must_use]
pub fn missing_columns(headers: &csv::StringRecord, required: &[&str]) -> Vec<String> {
    required
        .iter()
        .filter(|column| !headers.iter().any(|h| h.trim() == **column))
        .map(|column| (*column).to_string())
        .collect()
}
