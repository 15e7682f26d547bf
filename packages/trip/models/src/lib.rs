#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Trip record, stop-pair group and flow direction types.
//!
//! These types are shared by every stage of the trip-flows pipeline: the
//! suburb tagger annotates [`TripRecord`]s, the classifier folds them into
//! [`StopPairGroup`]s, and the percentile selector writes the surviving
//! groups out as one artifact per suburb and [`FlowDirection`].

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// One observed movement between two stops.
///
/// Field order is the column order of the tagged dataset. The two suburb
/// labels are absent from the raw dataset and are filled in by the tagger;
/// `None` means the point fell inside no boundary polygon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripRecord {
    /// Origin stop identifier.
    pub origin_stop: String,
    pub origin_stop_type: Option<String>,
    pub origin_stop_name: Option<String>,
    pub origin_stop_lat: Option<f64>,
    pub origin_stop_lon: Option<f64>,
    /// Destination stop identifier.
    pub destination_stop: String,
    pub destination_stop_type: Option<String>,
    pub destination_stop_name: Option<String>,
    pub destination_stop_lat: Option<f64>,
    pub destination_stop_lon: Option<f64>,
    pub operator: Option<String>,
    pub route: Option<String>,
    /// Service direction as published by the operator. Unrelated to the
    /// inbound/outbound [`Classification`].
    pub direction: Option<String>,
    pub ticket_type: Option<String>,
    /// Number of trips this row represents.
    pub quantity: u64,
    /// Travel distance between the two stops.
    pub distance: Option<f64>,
    #[serde(default)]
    pub origin_suburb: Option<String>,
    #[serde(default)]
    pub destination_suburb: Option<String>,
}

impl TripRecord {
    /// Column names of the tagged dataset, in field order.
    pub const COLUMNS: &'static [&'static str] = &[
        "origin_stop",
        "origin_stop_type",
        "origin_stop_name",
        "origin_stop_lat",
        "origin_stop_lon",
        "destination_stop",
        "destination_stop_type",
        "destination_stop_name",
        "destination_stop_lat",
        "destination_stop_lon",
        "operator",
        "route",
        "direction",
        "ticket_type",
        "quantity",
        "distance",
        "origin_suburb",
        "destination_suburb",
    ];

    /// Origin coordinate as `(lat, lon)`, if both halves are present.
    #[must_use]
    pub const fn origin_coordinate(&self) -> Option<(f64, f64)> {
        match (self.origin_stop_lat, self.origin_stop_lon) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        }
    }

    /// Destination coordinate as `(lat, lon)`, if both halves are present.
    #[must_use]
    pub const fn destination_coordinate(&self) -> Option<(f64, f64)> {
        match (self.destination_stop_lat, self.destination_stop_lon) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        }
    }

    /// The aggregation key for this record.
    #[must_use]
    pub fn group_key(&self) -> StopPairKey {
        StopPairKey {
            origin_stop: self.origin_stop.clone(),
            origin_stop_type: self.origin_stop_type.clone(),
            destination_stop: self.destination_stop.clone(),
            destination_stop_type: self.destination_stop_type.clone(),
        }
    }

    /// The `(origin_stop, destination_stop)` pair, ignoring stop types.
    ///
    /// Used for the anti-join that separates ambiguous trips from the
    /// inbound and outbound sets.
    #[must_use]
    pub fn stop_pair(&self) -> (&str, &str) {
        (&self.origin_stop, &self.destination_stop)
    }
}

/// Aggregation key: stop identity plus stop type on both ends.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StopPairKey {
    pub origin_stop: String,
    pub origin_stop_type: Option<String>,
    pub destination_stop: String,
    pub destination_stop_type: Option<String>,
}

/// Every trip sharing one [`StopPairKey`], summarized.
///
/// Quantity is summed over all member records. Every other field is taken
/// from the member with the lowest original row index. Field order is the
/// column order of the output artifacts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopPairGroup {
    pub origin_stop: String,
    pub origin_stop_type: Option<String>,
    pub destination_stop: String,
    pub destination_stop_type: Option<String>,
    pub origin_suburb: Option<String>,
    pub destination_suburb: Option<String>,
    pub operator: Option<String>,
    pub route: Option<String>,
    pub direction: Option<String>,
    pub ticket_type: Option<String>,
    pub origin_stop_name: Option<String>,
    pub origin_stop_lat: Option<f64>,
    pub origin_stop_lon: Option<f64>,
    pub destination_stop_name: Option<String>,
    pub destination_stop_lat: Option<f64>,
    pub destination_stop_lon: Option<f64>,
    pub quantity: u64,
    pub distance: Option<f64>,
    /// Row index of the record the metadata was taken from.
    #[serde(skip)]
    pub first_row: usize,
}

impl StopPairGroup {
    /// Column names of an artifact file, in field order.
    pub const COLUMNS: &'static [&'static str] = &[
        "origin_stop",
        "origin_stop_type",
        "destination_stop",
        "destination_stop_type",
        "origin_suburb",
        "destination_suburb",
        "operator",
        "route",
        "direction",
        "ticket_type",
        "origin_stop_name",
        "origin_stop_lat",
        "origin_stop_lon",
        "destination_stop_name",
        "destination_stop_lat",
        "destination_stop_lon",
        "quantity",
        "distance",
    ];

    /// Starts a group from its first-encountered member.
    #[must_use]
    pub fn from_first(row: usize, record: &TripRecord) -> Self {
        Self {
            origin_stop: record.origin_stop.clone(),
            origin_stop_type: record.origin_stop_type.clone(),
            destination_stop: record.destination_stop.clone(),
            destination_stop_type: record.destination_stop_type.clone(),
            origin_suburb: record.origin_suburb.clone(),
            destination_suburb: record.destination_suburb.clone(),
            operator: record.operator.clone(),
            route: record.route.clone(),
            direction: record.direction.clone(),
            ticket_type: record.ticket_type.clone(),
            origin_stop_name: record.origin_stop_name.clone(),
            origin_stop_lat: record.origin_stop_lat,
            origin_stop_lon: record.origin_stop_lon,
            destination_stop_name: record.destination_stop_name.clone(),
            destination_stop_lat: record.destination_stop_lat,
            destination_stop_lon: record.destination_stop_lon,
            quantity: record.quantity,
            distance: record.distance,
            first_row: row,
        }
    }

    /// Folds a later member into the group. Only the quantity changes.
    pub const fn absorb(&mut self, record: &TripRecord) {
        self.quantity = self.quantity.saturating_add(record.quantity);
    }

    #[must_use]
    pub fn key(&self) -> StopPairKey {
        StopPairKey {
            origin_stop: self.origin_stop.clone(),
            origin_stop_type: self.origin_stop_type.clone(),
            destination_stop: self.destination_stop.clone(),
            destination_stop_type: self.destination_stop_type.clone(),
        }
    }
}

/// Classification of a trip relative to the reference area.
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
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Classification {
    /// Destination lies in the reference area.
    Inbound,
    /// Origin lies in the reference area.
    Outbound,
    /// Neither end lies in the reference area. Emitted in both directions.
    Other,
}

/// Direction of an output artifact.
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
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum FlowDirection {
    Inbound,
    Outbound,
}

impl FlowDirection {
    pub const ALL: &[Self] = &[Self::Inbound, Self::Outbound];

    /// Whether groups with the given classification belong in this
    /// direction's artifact.
    #[must_use]
    pub const fn includes(self, classification: Classification) -> bool {
        matches!(
            (self, classification),
            (Self::Inbound, Classification::Inbound)
                | (Self::Outbound, Classification::Outbound)
                | (_, Classification::Other)
        )
    }
}

/// Normalizes a suburb label for comparison: trims, uppercases and
/// collapses internal whitespace runs to a single space.
#[must_use]
pub fn normalize_suburb_name(name: &str) -> String {
    name.split_whitespace()
        .map(str::to_uppercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// File stem used for a suburb's artifacts.
///
/// Takes the part of the label before the first comma, normalizes it and
/// joins the words with underscores, so `"Spring Hill, Brisbane City"`
/// becomes `SPRING_HILL`.
#[must_use]
pub fn suburb_file_stem(suburb: &str) -> String {
    let head = suburb.split(',').next().unwrap_or_default();
    normalize_suburb_name(head).replace(' ', "_")
}

/// Artifact file name for a suburb and direction, e.g.
/// `SPRING_HILL_inbound.csv`.
#[must_use]
pub fn artifact_file_name(suburb: &str, direction: FlowDirection) -> String {
    format!("{}_{direction}.csv", suburb_file_stem(suburb))
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn record(origin: &str, destination: &str, quantity: u64) -> TripRecord {
        TripRecord {
            origin_stop: origin.to_string(),
            origin_stop_type: Some("bus".to_string()),
            origin_stop_name: Some(format!("Stop {origin}")),
            origin_stop_lat: Some(-27.47),
            origin_stop_lon: Some(153.02),
            destination_stop: destination.to_string(),
            destination_stop_type: Some("bus".to_string()),
            destination_stop_name: Some(format!("Stop {destination}")),
            destination_stop_lat: None,
            destination_stop_lon: Some(153.03),
            operator: Some("Transport".to_string()),
            route: None,
            direction: Some("North".to_string()),
            ticket_type: Some("Adult".to_string()),
            quantity,
            distance: Some(1.5),
            origin_suburb: None,
            destination_suburb: None,
        }
    }

    #[test]
    fn coordinates_require_both_halves() {
        let r = record("1", "2", 1);
        assert_eq!(r.origin_coordinate(), Some((-27.47, 153.02)));
        assert_eq!(r.destination_coordinate(), None);
    }

    #[test]
    fn group_absorbs_quantity_only() {
        let first = record("1", "2", 3);
        let mut later = record("1", "2", 4);
        later.operator = Some("Other operator".to_string());

        let mut group = StopPairGroup::from_first(7, &first);
        group.absorb(&later);

        assert_eq!(group.quantity, 7);
        assert_eq!(group.first_row, 7);
        assert_eq!(group.operator.as_deref(), Some("Transport"));
        assert_eq!(group.key(), first.group_key());
    }

    #[test]
    fn normalizes_suburb_names() {
        assert_eq!(normalize_suburb_name("  spring   hill "), "SPRING HILL");
        assert_eq!(normalize_suburb_name(""), "");
    }

    #[test]
    fn builds_artifact_file_names() {
        assert_eq!(
            artifact_file_name("Spring Hill, Brisbane City", FlowDirection::Inbound),
            "SPRING_HILL_inbound.csv"
        );
        assert_eq!(
            artifact_file_name("fortitude valley", FlowDirection::Outbound),
            "FORTITUDE_VALLEY_outbound.csv"
        );
    }

    #[test]
    fn other_belongs_to_both_directions() {
        for direction in FlowDirection::ALL {
            assert!(direction.includes(Classification::Other));
        }
        assert!(FlowDirection::Inbound.includes(Classification::Inbound));
        assert!(!FlowDirection::Inbound.includes(Classification::Outbound));
        assert!(!FlowDirection::Outbound.includes(Classification::Inbound));
    }

    #[test]
    fn parses_directions_case_insensitively() {
        assert_eq!(
            FlowDirection::from_str("Inbound").unwrap(),
            FlowDirection::Inbound
        );
        assert_eq!(FlowDirection::Outbound.to_string(), "outbound");
        assert_eq!(Classification::Other.as_ref(), "OTHER");
    }
}
