//! The propagation engine.
//!
//! One call to [`propagate`] recomputes the changed node's derived values
//! and walks the resolved ancestor set nearest-first, recomputing each
//! ancestor from its children. Nothing is persisted here: the caller gets
//! back every node whose derived values actually changed, paired with the
//! freshly computed values, and is expected to apply them atomically.
//!
//! # Overlay
//!
//! Ancestor recomputation must see the values computed moments ago for
//! nodes further down, without writing them anywhere. The engine keeps an
//! overlay map of recomputed [`DerivedValues`] and patches fetched
//! children from it before aggregating. Ancestors are visited children
//! before parents (the resolver guarantees it), so by the time a node is
//! aggregated every recomputed child is in the overlay.
//!
//! # Unchanged ancestors
//!
//! An ancestor whose recomputation reproduces its stored values is left
//! out of the result, but the walk never stops early: different derived
//! attributes stabilize at different depths (the scheduling fold may go
//! quiet while hour sums keep changing higher up), so every resolved
//! ancestor is visited.

use std::collections::HashMap;

use tracing::{debug, trace};

use crate::config::RollupConfig;
use crate::error::RollupError;
use crate::model::{AttributeName, DerivedValues, WorkItem};
use crate::rollup::aggregate::aggregate;
use crate::rollup::ancestors;
use crate::tree::TreeAccessor;

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// One node whose derived values changed, with the values to persist.
#[derive(Debug, Clone, PartialEq)]
pub struct Affected {
    pub node_id: String,
    pub values: DerivedValues,
}

/// Outcome of one propagation call.
///
/// `subject` carries the changed node's own recomputed values when they
/// differ from its stored ones; `affected` lists the ancestors that
/// changed, ordered as visited (nearest first). Callers persist
/// `subject` and `affected` together, or not at all — applying a subset
/// leaves ancestors computed from a half-updated tree.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Propagation {
    pub subject: Option<Affected>,
    pub affected: Vec<Affected>,
}

impl Propagation {
    /// Returns `true` if nothing changed anywhere.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.subject.is_none() && self.affected.is_empty()
    }

    /// Every changed node, subject first.
    #[must_use]
    pub fn all_changed(&self) -> Vec<&Affected> {
        self.subject.iter().chain(self.affected.iter()).collect()
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Recompute derived values for `node_id` and every affected ancestor.
///
/// `changed` names the attributes that were edited. It gates only the
/// structural handling (whether the former ancestor chain is revisited);
/// derived values are always recomputed in full, so an edit that cannot
/// affect anything simply resolves to an empty result.
///
/// # Errors
///
/// Fails as a whole — no partial result is ever returned:
///
/// - [`RollupError::ItemNotFound`] when `node_id` is unknown.
/// - [`RollupError::CycleDetected`] on malformed parent links.
/// - [`RollupError::InconsistentInput`] when a structural change cannot be
///   corroborated by the tree.
/// - [`RollupError::Collaborator`] when the accessor fails mid-walk.
pub fn propagate(
    tree: &dyn TreeAccessor,
    config: &RollupConfig,
    node_id: &str,
    changed: &[AttributeName],
) -> Result<Propagation, RollupError> {
    let mode = config.progress.mode;
    let node = tree.item(node_id)?;

    let mut overlay: HashMap<String, DerivedValues> = HashMap::new();

    // The changed node first: its derived values feed the first ancestor.
    let children = tree.children_of(node_id)?;
    let mut subject_values = aggregate(&node, &children, mode);
    // The subject's scheduling flag is an input (possibly just edited by
    // the caller), not a derived output; only ancestors get the fold.
    subject_values.ignore_non_working_days = node.ignore_non_working_days;
    overlay.insert(node.id.clone(), subject_values);

    let subject = (subject_values != node.stored_derived()).then(|| Affected {
        node_id: node.id.clone(),
        values: subject_values,
    });

    let ancestor_set = ancestors::resolve(tree, config, &node, changed)?;
    debug!(
        node_id,
        ancestors = ancestor_set.len(),
        structural = changed.iter().any(|a| a.is_structural()),
        "resolved ancestor set"
    );

    let mut affected: Vec<Affected> = Vec::new();
    for ancestor in ancestor_set {
        let mut children = tree.children_of(&ancestor.id)?;
        patch_from_overlay(&mut children, &overlay);

        let values = aggregate(&ancestor, &children, mode);
        overlay.insert(ancestor.id.clone(), values);

        let changed_here = values != ancestor.stored_derived();
        trace!(ancestor = %ancestor.id, changed = changed_here, "visited ancestor");
        if changed_here {
            affected.push(Affected {
                node_id: ancestor.id,
                values,
            });
        }
    }

    debug!(
        node_id,
        subject_changed = subject.is_some(),
        affected = affected.len(),
        "propagation complete"
    );
    Ok(Propagation { subject, affected })
}

/// Replace stored derived values with freshly recomputed ones for any
/// child visited earlier in this call.
fn patch_from_overlay(children: &mut [WorkItem], overlay: &HashMap<String, DerivedValues>) {
    for child in children {
        if let Some(values) = overlay.get(&child.id) {
            child.apply_derived(*values);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
