//! Stop-pair aggregation.

use std::collections::HashMap;

use trip_flows_trip_models::{StopPairGroup, StopPairKey, TripRecord};

/// Groups trips by [`StopPairKey`].
///
/// `rows` pairs every record with its row index in the tagged dataset.
/// Quantities are summed; all other fields come from the member with the
/// lowest row index, whatever order the rows arrive in. Groups are
/// returned ordered by that index.
#[must_use]
pub fn build_groups<'a, I>(rows: I) -> Vec<StopPairGroup>
where
    I: IntoIterator<Item = (usize, &'a TripRecord)>,
{
    let mut index: HashMap<StopPairKey, usize> = HashMap::new();
    let mut groups: Vec<StopPairGroup> = Vec::new();

    for (row, record) in rows {
        let key = record.group_key();
        if let Some(&slot) = index.get(&key) {
            let group = &mut groups[slot];
            if row < group.first_row {
                let quantity = group.quantity;
                *group = StopPairGroup::from_first(row, record);
                group.quantity = group.quantity.saturating_add(quantity);
            } else {
                group.absorb(record);
            }
        } else {
            index.insert(key, groups.len());
            groups.push(StopPairGroup::from_first(row, record));
        }
    }

    groups.sort_by_key(|g| g.first_row);
    groups
}
