//! Top-percentile selection of stop-pair groups by quantity.

use std::cmp::Ordering;

use trip_flows_trip_models::StopPairGroup;

use crate::AnalyticsError;

/// Default quantile: keep roughly the top 1% of groups.
pub const DEFAULT_QUANTILE: f64 = 0.99;

/// Checks that `q` is a usable quantile.
///
/// # Errors
///
/// Returns [`AnalyticsError::InvalidQuantile`] unless `q` is within
/// `[0, 1]`.
pub fn validate_quantile(q: f64) -> Result<f64, AnalyticsError> {
    if (0.0..=1.0).contains(&q) {
        Ok(q)
    } else {
        Err(AnalyticsError::InvalidQuantile { value: q })
    }
}

/// The `q` quantile of `values`, interpolating linearly between the two
/// closest ranks. `None` for an empty slice.
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn quantile(values: &[u64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort_unstable();

    let position = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let low = sorted[lower] as f64;
    let high = sorted[upper] as f64;

    Some((high - low).mul_add(position - lower as f64, low))
}

/// Orders groups by distance, groups without one first.
fn by_distance(a: &StopPairGroup, b: &StopPairGroup) -> Ordering {
    match (a.distance, b.distance) {
        (Some(a), Some(b)) => a.total_cmp(&b),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Keeps the groups whose quantity reaches the `q` quantile of the set.
///
/// Groups tied at the threshold are all kept, so more than `1 - q` of the
/// groups can survive. The result is stably sorted by distance. A single
/// group always survives; an empty input stays empty.
///
/// # Errors
///
/// Returns [`AnalyticsError::InvalidQuantile`] if `q` is outside `[0, 1]`.
#[allow(clippy::cast_precision_loss)]
pub fn select_top(
    mut groups: Vec<StopPairGroup>,
    q: f64,
) -> Result<Vec<StopPairGroup>, AnalyticsError> {
    let q = validate_quantile(q)?;

    groups.sort_by(by_distance);

    let quantities: Vec<u64> = groups.iter().map(|g| g.quantity).collect();
    let Some(threshold) = quantile(&quantities, q) else {
        return Ok(groups);
    };

    groups.retain(|g| g.quantity as f64 >= threshold);
    Ok(groups)
}

#[cfg(test)]
mod tests {
    use trip_flows_trip_models::TripRecord;

    use super::*;

    fn group(id: usize, quantity: u64, distance: Option<f64>) -> StopPairGroup {
        let record = TripRecord {
            origin_stop: format!("o{id}"),
            origin_stop_type: None,
            origin_stop_name: None,
            origin_stop_lat: None,
            origin_stop_lon: None,
            destination_stop: format!("d{id}"),
            destination_stop_type: None,
            destination_stop_name: None,
            destination_stop_lat: None,
            destination_stop_lon: None,
            operator: None,
            route: None,
            direction: None,
            ticket_type: None,
            quantity,
            distance,
            origin_suburb: None,
            destination_suburb: None,
        };
        StopPairGroup::from_first(id, &record)
    }

    #[test]
    fn interpolates_between_ranks() {
        let q = quantile(&[100, 10, 50], 0.99).unwrap();
        assert!((q - 99.0).abs() < 1e-9);
        assert!((quantile(&[1, 2, 3, 4], 0.5).unwrap() - 2.5).abs() < f64::EPSILON);
        assert!((quantile(&[7], 0.99).unwrap() - 7.0).abs() < f64::EPSILON);
        assert!(quantile(&[], 0.99).is_none());
    }

    #[test]
    fn keeps_only_the_top_group_of_three() {
        let groups = vec![group(0, 10, Some(1.0)), group(1, 50, Some(2.0)), group(2, 100, Some(3.0))];
        let top = select_top(groups, DEFAULT_QUANTILE).unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].quantity, 100);
    }

    #[test]
    fn keeps_every_group_tied_at_threshold() {
        let groups = (0..10).map(|i| group(i, 5, Some(1.0))).collect();
        let top = select_top(groups, DEFAULT_QUANTILE).unwrap();
        assert_eq!(top.len(), 10);
    }

    #[test]
    fn single_group_always_survives() {
        let top = select_top(vec![group(0, 1, None)], DEFAULT_QUANTILE).unwrap();
        assert_eq!(top.len(), 1);
        assert!(select_top(Vec::new(), DEFAULT_QUANTILE).unwrap().is_empty());
    }

    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    #[test]
    fn raising_the_quantile_never_keeps_more() {
        let groups: Vec<StopPairGroup> = (0..200_u64)
            .map(|i| group(i as usize, (i * 37) % 101, Some((i % 13) as f64)))
            .collect();

        let at_99 = select_top(groups.clone(), 0.99).unwrap().len();
        let at_999 = select_top(groups.clone(), 0.999).unwrap().len();
        let at_50 = select_top(groups, 0.5).unwrap().len();

        assert!(at_999 <= at_99);
        assert!(at_99 <= at_50);
    }

    #[test]
    fn sorts_survivors_by_distance_stably() {
        let groups = vec![
            group(0, 9, Some(3.0)),
            group(1, 9, None),
            group(2, 9, Some(1.0)),
            group(3, 9, Some(1.0)),
        ];
        let top = select_top(groups, 0.0).unwrap();
        let order: Vec<usize> = top.iter().map(|g| g.first_row).collect();
        assert_eq!(order, vec![1, 2, 3, 0]);
    }

    #[test]
    fn rejects_out_of_range_quantiles() {
        for q in [-0.1, 1.5, f64::NAN] {
            assert!(matches!(
                select_top(vec![group(0, 1, None)], q),
                Err(AnalyticsError::InvalidQuantile { .. })
            ));
        }
    }
}
