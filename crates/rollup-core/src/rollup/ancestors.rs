//! Ancestor-set resolution.
//!
//! Given the node whose attributes changed, work out which ancestors need
//! their derived values recomputed, and in what order. For a plain value
//! change that is the node's current ancestor chain, nearest first. For a
//! structural change (the node moved), the abandoned chain needs
//! revisiting too: the former parent lost a contributor, the new parent
//! gained one, and any ancestor the two chains share must be recomputed
//! exactly once — after both of its affected children.
//!
//! # Merge order
//!
//! The two chains of a moved node converge at their first common ancestor
//! and are identical above it (each node has one parent). The resolved set
//! is therefore emitted as:
//!
//! 1. the new chain below the common ancestor,
//! 2. the former chain below the common ancestor,
//! 3. the shared tail upward.
//!
//! This keeps the children-before-parents invariant across both chains:
//! when the common ancestor is visited, both the former and the new
//! subtree below it have already been recomputed.

use std::collections::HashSet;

use crate::config::RollupConfig;
use crate::error::RollupError;
use crate::model::{AttributeName, WorkItem};
use crate::tree::TreeAccessor;

/// Resolve the ordered, deduplicated set of ancestors to recompute.
///
/// `node` is the changed node with its *current* `parent_id`. The changed
/// node itself is never part of the result.
///
/// # Errors
///
/// - [`RollupError::CycleDetected`] when a chain revisits a node or runs
///   past `config.limits.max_ancestor_depth`.
/// - [`RollupError::InconsistentInput`] when the change set claims a
///   structural change but neither a former nor a current parent exists.
/// - Any accessor failure, passed through.
pub fn resolve(
    tree: &dyn TreeAccessor,
    config: &RollupConfig,
    node: &WorkItem,
    changed: &[AttributeName],
) -> Result<Vec<WorkItem>, RollupError> {
    let structural = changed.iter().any(|attr| attr.is_structural());

    let new_chain = tree.ancestor_chain_of(&node.id)?;
    verify_chain(&node.id, &new_chain, config.limits.max_ancestor_depth)?;

    if !structural {
        return Ok(new_chain);
    }

    let former_chain = former_chain_of(tree, config, node)?;
    if former_chain.is_empty() && new_chain.is_empty() {
        return Err(RollupError::InconsistentInput {
            node_id: node.id.clone(),
            detail: "structural change reported but no former or current parent resolves".into(),
        });
    }

    Ok(merge_chains(new_chain, former_chain))
}

/// The chain from the node's pre-move parent upward, empty when the node
/// was a root before the move (or no move was recorded).
fn former_chain_of(
    tree: &dyn TreeAccessor,
    config: &RollupConfig,
    node: &WorkItem,
) -> Result<Vec<WorkItem>, RollupError> {
    let Some(former_parent_id) = tree.former_parent_of(&node.id)? else {
        return Ok(Vec::new());
    };

    // The former parent must still resolve; a vanished record means the
    // snapshot cannot corroborate the reported move.
    let former_parent = match tree.item(&former_parent_id) {
        Ok(item) => item,
        Err(RollupError::ItemNotFound { .. }) => {
            return Err(RollupError::InconsistentInput {
                node_id: node.id.clone(),
                detail: format!("former parent '{former_parent_id}' does not resolve"),
            });
        }
        Err(other) => return Err(other),
    };

    let mut chain = vec![former_parent];
    chain.extend(tree.ancestor_chain_of(&former_parent_id)?);
    verify_chain(&node.id, &chain, config.limits.max_ancestor_depth)?;
    Ok(chain)
}

/// Union of the two chains: new-exclusive, former-exclusive, shared tail.
fn merge_chains(new_chain: Vec<WorkItem>, former_chain: Vec<WorkItem>) -> Vec<WorkItem> {
    let new_ids: HashSet<&str> = new_chain.iter().map(|a| a.id.as_str()).collect();
    let former_ids: HashSet<&str> = former_chain.iter().map(|a| a.id.as_str()).collect();

    let new_split = new_chain
        .iter()
        .position(|a| former_ids.contains(a.id.as_str()))
        .unwrap_or(new_chain.len());
    let former_split = former_chain
        .iter()
        .position(|a| new_ids.contains(a.id.as_str()))
        .unwrap_or(former_chain.len());

    let mut seen: HashSet<String> = HashSet::new();
    let mut ordered: Vec<WorkItem> = Vec::new();

    let mut new_iter = new_chain.into_iter();
    let new_lower: Vec<WorkItem> = new_iter.by_ref().take(new_split).collect();
    let new_tail: Vec<WorkItem> = new_iter.collect();
    let mut former_iter = former_chain.into_iter();
    let former_lower: Vec<WorkItem> = former_iter.by_ref().take(former_split).collect();
    let former_tail: Vec<WorkItem> = former_iter.collect();

    let segments = [new_lower, former_lower, new_tail, former_tail];
    for segment in segments {
        for ancestor in segment {
            if seen.insert(ancestor.id.clone()) {
                ordered.push(ancestor);
            }
        }
    }
    ordered
}

/// Defend against malformed accessor output: a chain must not revisit any
/// node (including the changed node itself) and must respect the bound.
fn verify_chain(
    node_id: &str,
    chain: &[WorkItem],
    max_depth: usize,
) -> Result<(), RollupError> {
    if chain.len() > max_depth {
        return Err(RollupError::CycleDetected {
            node_id: node_id.to_string(),
        });
    }

    let mut seen: HashSet<&str> = HashSet::new();
    seen.insert(node_id);
    for ancestor in chain {
        if !seen.insert(ancestor.id.as_str()) {
            return Err(RollupError::CycleDetected {
                node_id: ancestor.id.clone(),
            });
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
