//! Inbound/outbound/other classification of a suburb's trips.
//!
//! A suburb's trip universe is every trip whose origin lies in it. Inbound
//! trips end in the reference area, outbound trips start in it, and the
//! rest (by origin/destination stop pair) are "other". Other groups are
//! reported in both directions.

use std::collections::HashSet;

use trip_flows_trip_models::{Classification, FlowDirection, StopPairGroup, TripRecord};

use crate::aggregate::build_groups;
use crate::reference::{ReferenceArea, same_suburb};

/// A suburb's stop-pair groups, split by classification.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedFlows {
    /// The target suburb as requested.
    pub suburb: String,
    /// Number of trips in the suburb's universe.
    pub trips: usize,
    pub inbound: Vec<StopPairGroup>,
    pub outbound: Vec<StopPairGroup>,
    pub other: Vec<StopPairGroup>,
}

impl ClassifiedFlows {
    /// Groups with the given classification.
    #[must_use]
    pub fn groups(&self, classification: Classification) -> &[StopPairGroup] {
        match classification {
            Classification::Inbound => &self.inbound,
            Classification::Outbound => &self.outbound,
            Classification::Other => &self.other,
        }
    }

    /// Everything that belongs in a direction's artifact: the direction's
    /// own groups followed by the other groups.
    #[must_use]
    pub fn for_direction(&self, direction: FlowDirection) -> Vec<StopPairGroup> {
        [
            Classification::Inbound,
            Classification::Outbound,
            Classification::Other,
        ]
        .into_iter()
        .filter(|c| direction.includes(*c))
        .flat_map(|c| self.groups(c).iter().cloned())
        .collect()
    }
}

/// Trips whose origin suburb is `suburb`, with their dataset row indices.
#[must_use]
pub fn suburb_universe<'a>(records: &'a [TripRecord], suburb: &str) -> Vec<(usize, &'a TripRecord)> {
    records
        .iter()
        .enumerate()
        .filter(|(_, r)| same_suburb(r.origin_suburb.as_deref(), suburb))
        .collect()
}

fn rows_classified_as<'a>(
    universe: &[(usize, &'a TripRecord)],
    classes: &[&[Classification]],
    classification: Classification,
) -> Vec<(usize, &'a TripRecord)> {
    universe
        .iter()
        .zip(classes)
        .filter(|(_, classes)| classes.contains(&classification))
        .map(|(row, _)| *row)
        .collect()
}

/// Classifies and aggregates one suburb's trips.
///
/// Returns `None` when no trip originates in the suburb.
#[must_use]
pub fn classify_suburb(
    records: &[TripRecord],
    suburb: &str,
    reference: &ReferenceArea,
) -> Option<ClassifiedFlows> {
    let universe = suburb_universe(records, suburb);
    if universe.is_empty() {
        return None;
    }

    let classes: Vec<&[Classification]> = universe
        .iter()
        .map(|(_, r)| {
            reference.classify_pair(r.origin_suburb.as_deref(), r.destination_suburb.as_deref())
        })
        .collect();

    let inbound = rows_classified_as(&universe, &classes, Classification::Inbound);
    let outbound = rows_classified_as(&universe, &classes, Classification::Outbound);

    let known_pairs: HashSet<(&str, &str)> = inbound
        .iter()
        .chain(&outbound)
        .map(|(_, r)| r.stop_pair())
        .collect();

    let other = universe
        .iter()
        .copied()
        .filter(|(_, r)| !known_pairs.contains(&r.stop_pair()));

    let flows = ClassifiedFlows {
        suburb: suburb.to_string(),
        trips: universe.len(),
        inbound: build_groups(inbound.iter().copied()),
        outbound: build_groups(outbound.iter().copied()),
        other: build_groups(other),
    };

    log::debug!(
        "{suburb}: {} trips -> {} inbound, {} outbound, {} other groups",
        flows.trips,
        flows.inbound.len(),
        flows.outbound.len(),
        flows.other.len()
    );

    Some(flows)
}
