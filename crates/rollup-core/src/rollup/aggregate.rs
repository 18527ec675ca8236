//! Pure aggregation of derived values.
//!
//! Everything in this module is a function of one node's scalar values and
//! its children's (already current) derived values. No I/O, no mutation —
//! the propagation engine owns the walking order and calls in here once
//! per node.
//!
//! # Completion weighting
//!
//! A parent's completion is the weighted average of its children's
//! effective completion, weighted by each child's own estimate. Children
//! without a usable estimate (absent or zero hours) are weighted at the
//! average estimate of the children that have one, so an unestimated task
//! neither vanishes from the average nor degenerates it; when no child has
//! a positive estimate everyone weighs the same. The parent's own
//! completion never enters the average once it has children.
//!
//! # Hours
//!
//! Estimated and remaining hours sum as `own + Σ children`, where absent
//! values contribute nothing and the result is `None` only when every
//! contributor is absent. A stored `0.0` is a real contribution of zero,
//! which matters for the `None`-vs-`Some(0.0)` distinction upstream.

use crate::config::ProgressMode;
use crate::model::{DerivedValues, WorkItem};

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Compute a node's derived values from its own scalars and its children.
///
/// `children` must carry current derived values (children before parents).
/// An empty slice is the leaf case: hours and completion collapse to the
/// node's own effective values, and the scheduling fold yields `false`
/// (an ancestor that lost its last child resets; the engine keeps a leaf
/// subject's own flag, see [`crate::rollup::propagate`]).
#[must_use]
pub fn aggregate(node: &WorkItem, children: &[WorkItem], mode: ProgressMode) -> DerivedValues {
    DerivedValues {
        done_ratio: derive_done_ratio(node, children, mode),
        estimated_hours: sum_hours(
            node.estimated_hours,
            children.iter().map(|c| c.derived_estimated_hours),
        ),
        remaining_hours: sum_hours(
            node.remaining_hours,
            children.iter().map(|c| c.derived_remaining_hours),
        ),
        ignore_non_working_days: derive_ignore_non_working_days(node, children),
    }
}

// ---------------------------------------------------------------------------
// Completion
// ---------------------------------------------------------------------------

/// The completion percentage a node contributes to its parent's average.
///
/// Status-based mode reads the status: its default done ratio if it has
/// one, otherwise 100 for closed and 0 for open statuses. Field-based mode
/// reads the item's own `done_ratio`, except that closed items always
/// count as 100 regardless of the stored value. Only field-based mode can
/// be undefined (open item without a `done_ratio`).
#[must_use]
pub fn effective_completion(item: &WorkItem, mode: ProgressMode) -> Option<i32> {
    match mode {
        ProgressMode::StatusBased => Some(
            item.status_default_done_ratio
                .unwrap_or(if item.status_closed { 100 } else { 0 }),
        ),
        ProgressMode::FieldBased => {
            if item.status_closed {
                Some(100)
            } else {
                item.done_ratio
            }
        }
    }
}

/// What a child contributes to its parent's completion average.
///
/// Scalar overrides come first (a closed child is done, a status default
/// is authoritative), then the child's own derived ratio — that is how a
/// subtree's progress travels upward through intermediate nodes whose own
/// completion fields are untouched. A child with neither is excluded from
/// the average.
fn completion_contribution(child: &WorkItem, mode: ProgressMode) -> Option<i32> {
    match mode {
        ProgressMode::FieldBased => {
            if child.status_closed {
                Some(100)
            } else {
                child.done_ratio.or(child.derived_done_ratio)
            }
        }
        ProgressMode::StatusBased => child.status_default_done_ratio.or(if child.status_closed {
            Some(100)
        } else {
            child.derived_done_ratio.or(Some(0))
        }),
    }
}

fn derive_done_ratio(node: &WorkItem, children: &[WorkItem], mode: ProgressMode) -> Option<i32> {
    // Children with undefined completion are excluded from the average.
    let rated: Vec<(i32, Option<f64>)> = children
        .iter()
        .filter_map(|child| {
            completion_contribution(child, mode).map(|percent| (percent, child.estimated_hours))
        })
        .collect();

    if rated.is_empty() {
        return effective_completion(node, mode);
    }

    let positive: Vec<f64> = rated
        .iter()
        .filter_map(|(_, hours)| hours.filter(|h| *h > 0.0))
        .collect();

    // Unestimated (or zero-estimated) children share the average weight of
    // the estimated ones; with no estimates at all everyone weighs 1.
    let fallback_weight = if positive.is_empty() {
        1.0
    } else {
        positive.iter().sum::<f64>() / usize_to_f64(positive.len())
    };

    let mut weighted_sum = 0.0;
    let mut total_weight = 0.0;
    for (percent, hours) in &rated {
        let weight = hours.filter(|h| *h > 0.0).unwrap_or(fallback_weight);
        weighted_sum += f64::from(*percent) * weight;
        total_weight += weight;
    }

    Some(round_half_up(weighted_sum / total_weight))
}

/// Round to the nearest integer, ties away from zero toward positive
/// infinity (87.5 → 88, 42.5 → 43, 0.5 → 1).
#[allow(clippy::cast_possible_truncation)]
fn round_half_up(value: f64) -> i32 {
    let rounded = (value + 0.5).floor();
    // Completion math stays within 0..=100 for valid inputs; the clamp is
    // only reachable through float noise at the boundaries.
    rounded.clamp(f64::from(i32::MIN), f64::from(i32::MAX)) as i32
}

#[allow(clippy::cast_precision_loss)]
fn usize_to_f64(n: usize) -> f64 {
    n as f64
}

// ---------------------------------------------------------------------------
// Hours
// ---------------------------------------------------------------------------

fn sum_hours(own: Option<f64>, children: impl Iterator<Item = Option<f64>>) -> Option<f64> {
    let mut total: Option<f64> = own;
    for hours in children.flatten() {
        total = Some(total.unwrap_or(0.0) + hours);
    }
    total
}

// ---------------------------------------------------------------------------
// Scheduling flag
// ---------------------------------------------------------------------------

fn derive_ignore_non_working_days(node: &WorkItem, children: &[WorkItem]) -> bool {
    if node.schedule_manually {
        // Authoritative: aggregation never overwrites a manual node's flag.
        return node.ignore_non_working_days;
    }
    if children.is_empty() {
        return false;
    }
    children.iter().all(|child| child.ignore_non_working_days)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    // -----------------------------------------------------------------------
    // Test helpers
    // -----------------------------------------------------------------------

    /// A leaf child whose derived values mirror its own scalars, the way
    /// the engine would have left it.
    fn child(
        estimated: Option<f64>,
        done_ratio: Option<i32>,
        closed: bool,
    ) -> WorkItem {
        WorkItem {
            status_closed: closed,
            done_ratio,
            estimated_hours: estimated,
            derived_done_ratio: done_ratio,
            derived_estimated_hours: estimated,
            ..WorkItem::new("child")
        }
    }

    fn parent() -> WorkItem {
        WorkItem::new("parent")
    }

    fn ratio(node: &WorkItem, children: &[WorkItem], mode: ProgressMode) -> Option<i32> {
        aggregate(node, children, mode).done_ratio
    }

    // -----------------------------------------------------------------------
    // Leaf identity
    // -----------------------------------------------------------------------

    #[test]
    fn leaf_mirrors_own_values() {
        let mut leaf = WorkItem::new("leaf");
        leaf.estimated_hours = Some(2.0);
        leaf.remaining_hours = Some(1.5);
        leaf.done_ratio = Some(25);

        let derived = aggregate(&leaf, &[], ProgressMode::FieldBased);
        assert_eq!(derived.done_ratio, Some(25));
        assert_eq!(derived.estimated_hours, Some(2.0));
        assert_eq!(derived.remaining_hours, Some(1.5));
    }

    #[test]
    fn leaf_with_nothing_set_derives_nothing() {
        let leaf = WorkItem::new("leaf");
        let derived = aggregate(&leaf, &[], ProgressMode::FieldBased);
        assert_eq!(derived.done_ratio, None);
        assert_eq!(derived.estimated_hours, None);
        assert_eq!(derived.remaining_hours, None);
    }

    #[test]
    fn closed_leaf_without_remaining_hours_derives_none() {
        let mut leaf = WorkItem::new("leaf");
        leaf.status_closed = true;

        let derived = aggregate(&leaf, &[], ProgressMode::FieldBased);
        assert_eq!(derived.done_ratio, Some(100));
        assert_eq!(derived.remaining_hours, None);
    }

    #[test]
    fn closed_leaf_with_explicit_remaining_hours_keeps_them() {
        let mut leaf = WorkItem::new("leaf");
        leaf.status_closed = true;
        leaf.remaining_hours = Some(0.5);

        let derived = aggregate(&leaf, &[], ProgressMode::FieldBased);
        assert_eq!(derived.remaining_hours, Some(0.5));
    }

    // -----------------------------------------------------------------------
    // Effective completion
    // -----------------------------------------------------------------------

    #[test]
    fn status_mode_prefers_status_default() {
        let mut item = WorkItem::new("a");
        item.status_default_done_ratio = Some(60);
        item.done_ratio = Some(10); // not read in status mode
        assert_eq!(
            effective_completion(&item, ProgressMode::StatusBased),
            Some(60)
        );
    }

    #[test]
    fn status_mode_falls_back_to_open_closed() {
        let mut item = WorkItem::new("a");
        assert_eq!(
            effective_completion(&item, ProgressMode::StatusBased),
            Some(0)
        );
        item.status_closed = true;
        assert_eq!(
            effective_completion(&item, ProgressMode::StatusBased),
            Some(100)
        );
    }

    #[test]
    fn field_mode_forces_closed_to_100() {
        let mut item = WorkItem::new("a");
        item.done_ratio = Some(42);
        item.status_closed = true;
        assert_eq!(
            effective_completion(&item, ProgressMode::FieldBased),
            Some(100)
        );
    }

    #[test]
    fn field_mode_open_without_ratio_is_undefined() {
        let item = WorkItem::new("a");
        assert_eq!(effective_completion(&item, ProgressMode::FieldBased), None);
    }

    // -----------------------------------------------------------------------
    // Weighted completion — the worked vectors from the behavioral suite
    // -----------------------------------------------------------------------

    #[test]
    fn zero_hour_children_share_the_average_weight() {
        // hours [0, 2, 0], open/closed/closed
        // weights become [2, 2, 2]: (0 + 200 + 200) / 6 = 66.67 → 67
        let children = [
            child(Some(0.0), Some(0), false),
            child(Some(2.0), None, true),
            child(Some(0.0), None, true),
        ];
        let derived = aggregate(&parent(), &children, ProgressMode::FieldBased);
        assert_eq!(derived.done_ratio, Some(67));
        assert_eq!(derived.estimated_hours, Some(2.0));
    }

    #[test]
    fn nil_and_zero_hours_weigh_the_same() {
        // hours [nil, 2, 0] — same 67 as above
        let children = [
            child(None, Some(0), false),
            child(Some(2.0), None, true),
            child(Some(0.0), None, true),
        ];
        let derived = aggregate(&parent(), &children, ProgressMode::FieldBased);
        assert_eq!(derived.done_ratio, Some(67));
        assert_eq!(derived.estimated_hours, Some(2.0));
    }

    #[test]
    fn own_estimate_adds_to_the_sum_but_not_the_average() {
        let mut node = parent();
        node.estimated_hours = Some(5.0);
        let children = [
            child(None, Some(0), false),
            child(Some(2.0), None, true),
            child(Some(0.0), None, true),
        ];
        let derived = aggregate(&node, &children, ProgressMode::FieldBased);
        assert_eq!(derived.done_ratio, Some(67));
        assert_eq!(derived.estimated_hours, Some(7.0));
    }

    #[test]
    fn unestimated_children_average_evenly() {
        // done [20, 20, 50], no hours anywhere → 30, Σ = None
        let children = [
            child(None, Some(20), false),
            child(None, Some(20), false),
            child(None, Some(50), false),
        ];
        let derived = aggregate(&parent(), &children, ProgressMode::FieldBased);
        assert_eq!(derived.done_ratio, Some(30));
        assert_eq!(derived.estimated_hours, None);
    }

    #[test]
    fn plain_average_of_progress() {
        let children = [
            child(None, Some(0), false),
            child(None, Some(50), false),
            child(None, Some(100), false),
        ];
        assert_eq!(
            ratio(&parent(), &children, ProgressMode::FieldBased),
            Some(50)
        );
    }

    #[test]
    fn estimate_weighted_average_rounds_half_up() {
        // hours [1, 2, 5], done [0, 100, 100] → 700/8 = 87.5 → 88
        let children = [
            child(Some(1.0), Some(0), false),
            child(Some(2.0), Some(100), false),
            child(Some(5.0), Some(100), false),
        ];
        assert_eq!(
            ratio(&parent(), &children, ProgressMode::FieldBased),
            Some(88)
        );
    }

    #[test]
    fn closed_child_overrides_its_stored_ratio() {
        // hours [1, 2, 5], done [50, 75, 42] with the last closed:
        // (50 + 150 + 500) / 8 = 87.5 → 88, the 42 is ignored
        let children = [
            child(Some(1.0), Some(50), false),
            child(Some(2.0), Some(75), false),
            child(Some(5.0), Some(42), true),
        ];
        assert_eq!(
            ratio(&parent(), &children, ProgressMode::FieldBased),
            Some(88)
        );
    }

    #[test]
    fn mixed_estimates_statuses_and_ratios() {
        // hours [0, 3, nil, 7], open/open/closed/open, done [0, 0, 0, 50]
        // weights [5, 3, 5, 7]: (0 + 0 + 500 + 350) / 20 = 42.5 → 43
        let children = [
            child(Some(0.0), Some(0), false),
            child(Some(3.0), Some(0), false),
            child(None, Some(0), true),
            child(Some(7.0), Some(50), false),
        ];
        let derived = aggregate(&parent(), &children, ProgressMode::FieldBased);
        assert_eq!(derived.done_ratio, Some(43));
        assert_eq!(derived.estimated_hours, Some(10.0));
    }

    #[test]
    fn intermediate_child_contributes_its_derived_ratio() {
        // A child that is itself a parent has no completion of its own;
        // its subtree's derived ratio is what travels upward.
        let mut mid = child(Some(3.0), None, false);
        mid.derived_done_ratio = Some(50);
        let children = [mid];
        assert_eq!(
            ratio(&parent(), &children, ProgressMode::FieldBased),
            Some(50)
        );
    }

    #[test]
    fn status_mode_rolls_derived_ratio_through_open_intermediates() {
        let mut mid = child(None, None, false);
        mid.derived_done_ratio = Some(75);
        let children = [mid];
        assert_eq!(
            ratio(&parent(), &children, ProgressMode::StatusBased),
            Some(75)
        );
    }

    #[test]
    fn children_without_defined_completion_fall_back_to_own() {
        let mut node = parent();
        node.done_ratio = Some(10);
        let children = [child(Some(3.0), None, false)];
        assert_eq!(
            ratio(&node, &children, ProgressMode::FieldBased),
            Some(10)
        );
    }

    #[test]
    fn undefined_children_and_undefined_own_is_none() {
        let children = [child(None, None, false)];
        assert_eq!(ratio(&parent(), &children, ProgressMode::FieldBased), None);
    }

    #[test]
    fn status_mode_uses_status_defaults_of_children() {
        // One child moves to a status with default_done_ratio 100; weights
        // come from estimates [10-own is ignored, child 5].
        let mut done_child = child(Some(5.0), None, false);
        done_child.status_default_done_ratio = Some(100);
        let open_child = child(Some(10.0), None, false);

        let children = [open_child, done_child];
        // (0 * 10 + 100 * 5) / 15 = 33.3 → 33
        assert_eq!(
            ratio(&parent(), &children, ProgressMode::StatusBased),
            Some(33)
        );
    }

    // -----------------------------------------------------------------------
    // Hours sums
    // -----------------------------------------------------------------------

    #[test]
    fn remaining_hours_sum_ignores_absent_children() {
        let mut c1 = child(None, None, false);
        c1.derived_remaining_hours = Some(0.0);
        let c2 = child(None, None, false);
        let mut c3 = child(None, None, false);
        c3.derived_remaining_hours = Some(2.5);

        let derived = aggregate(&parent(), &[c1, c2, c3], ProgressMode::FieldBased);
        assert_eq!(derived.remaining_hours, Some(2.5));
    }

    #[test]
    fn remaining_hours_include_own_value() {
        let mut node = parent();
        node.remaining_hours = Some(5.25);
        let mut c1 = child(None, None, false);
        c1.derived_remaining_hours = Some(0.0);
        let c2 = child(None, None, false);
        let mut c3 = child(None, None, false);
        c3.derived_remaining_hours = Some(2.5);

        let derived = aggregate(&node, &[c1, c2, c3], ProgressMode::FieldBased);
        assert_eq!(derived.remaining_hours, Some(7.75));
    }

    #[test]
    fn all_absent_remaining_hours_stay_none() {
        let children = [child(None, None, false), child(None, None, false)];
        let derived = aggregate(&parent(), &children, ProgressMode::FieldBased);
        assert_eq!(derived.remaining_hours, None);
    }

    #[test]
    fn estimated_hours_none_only_when_no_contributor() {
        let children = [child(None, None, false)];
        let derived = aggregate(&parent(), &children, ProgressMode::FieldBased);
        assert_eq!(derived.estimated_hours, None);

        let children = [child(Some(0.0), None, false)];
        let derived = aggregate(&parent(), &children, ProgressMode::FieldBased);
        assert_eq!(derived.estimated_hours, Some(0.0));
    }

    // -----------------------------------------------------------------------
    // Scheduling flag
    // -----------------------------------------------------------------------

    #[test]
    fn and_fold_over_children() {
        let mut all_true = child(None, None, false);
        all_true.ignore_non_working_days = true;
        let mut other = child(None, None, false);
        other.ignore_non_working_days = true;

        let derived = aggregate(
            &parent(),
            &[all_true.clone(), other],
            ProgressMode::FieldBased,
        );
        assert!(derived.ignore_non_working_days);

        let mut falsy = child(None, None, false);
        falsy.ignore_non_working_days = false;
        let derived = aggregate(&parent(), &[all_true, falsy], ProgressMode::FieldBased);
        assert!(!derived.ignore_non_working_days);
    }

    #[test]
    fn childless_node_folds_to_false() {
        let mut node = parent();
        node.ignore_non_working_days = true;
        let derived = aggregate(&node, &[], ProgressMode::FieldBased);
        assert!(!derived.ignore_non_working_days);
    }

    #[test]
    fn manual_node_keeps_its_own_flag() {
        let mut node = parent();
        node.schedule_manually = true;
        node.ignore_non_working_days = true;

        let mut falsy = child(None, None, false);
        falsy.ignore_non_working_days = false;

        let derived = aggregate(&node, &[falsy], ProgressMode::FieldBased);
        assert!(derived.ignore_non_working_days);
    }

    // -----------------------------------------------------------------------
    // Properties
    // -----------------------------------------------------------------------

    proptest! {
        #[test]
        fn completion_stays_within_percent_range(
            ratios in proptest::collection::vec(0i32..=100, 1..8),
            hours in proptest::collection::vec(proptest::option::of(0.0f64..100.0), 1..8),
        ) {
            let children: Vec<WorkItem> = ratios
                .iter()
                .zip(hours.iter().cycle())
                .map(|(r, h)| child(*h, Some(*r), false))
                .collect();

            let derived = aggregate(&parent(), &children, ProgressMode::FieldBased);
            let done = derived.done_ratio.expect("children all rated");
            prop_assert!((0..=100).contains(&done), "out of range: {done}");
        }

        #[test]
        fn uniform_completion_aggregates_to_itself(
            percent in 0i32..=100,
            hours in proptest::collection::vec(proptest::option::of(0.1f64..50.0), 1..6),
        ) {
            let children: Vec<WorkItem> = hours
                .iter()
                .map(|h| child(*h, Some(percent), false))
                .collect();

            let derived = aggregate(&parent(), &children, ProgressMode::FieldBased);
            prop_assert_eq!(derived.done_ratio, Some(percent));
        }
    }

    #[test]
    fn round_half_up_ties() {
        assert_eq!(super::round_half_up(0.5), 1);
        assert_eq!(super::round_half_up(87.5), 88);
        assert_eq!(super::round_half_up(42.5), 43);
        assert_eq!(super::round_half_up(66.666_666), 67);
        assert_eq!(super::round_half_up(0.0), 0);
        assert_eq!(super::round_half_up(-0.5), 0);
    }
}
