//! Read access to the work-item hierarchy.
//!
//! The engine never owns the tree; it reads it through [`TreeAccessor`],
//! which the host implements over whatever store it uses (the crate ships
//! a SQLite-backed accessor in [`crate::store`] and the in-memory
//! [`InMemoryTree`] used throughout the tests).
//!
//! # Snapshot contract
//!
//! One `propagate` call assumes a consistent snapshot: children and
//! ancestor chains must not change between reads within the call. The
//! accessor is also expected to keep the tree acyclic, but every
//! implementation here still guards its own walks — a malformed tree must
//! produce [`RollupError::CycleDetected`], never an infinite loop.
//!
//! # Former parents
//!
//! When a node has just been reparented, the accessor must still be able
//! to answer what the parent was *before* the move
//! ([`TreeAccessor::former_parent_of`]). Both implementations record this
//! at reparent time; the engine needs it to revisit the abandoned chain.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::error::RollupError;
use crate::model::{DerivedValues, WorkItem};

// ---------------------------------------------------------------------------
// TreeAccessor
// ---------------------------------------------------------------------------

/// Read-only view of the hierarchy consumed by the propagation engine.
pub trait TreeAccessor {
    /// Fetch one item by id.
    ///
    /// # Errors
    ///
    /// Returns [`RollupError::ItemNotFound`] for unknown ids.
    fn item(&self, node_id: &str) -> Result<WorkItem, RollupError>;

    /// Current children of `node_id`, already reflecting any pending
    /// scalar updates. Order is not significant to the engine but should
    /// be deterministic for reproducible results.
    ///
    /// # Errors
    ///
    /// Returns [`RollupError::Collaborator`] when the backend fails.
    fn children_of(&self, node_id: &str) -> Result<Vec<WorkItem>, RollupError>;

    /// Ancestors of `node_id`, nearest first. Empty for roots.
    ///
    /// # Errors
    ///
    /// Returns [`RollupError::CycleDetected`] if the parent links loop.
    fn ancestor_chain_of(&self, node_id: &str) -> Result<Vec<WorkItem>, RollupError>;

    /// The parent `node_id` had before its most recent reparent, if any
    /// was recorded.
    ///
    /// # Errors
    ///
    /// Returns [`RollupError::Collaborator`] when the backend fails.
    fn former_parent_of(&self, node_id: &str) -> Result<Option<String>, RollupError>;

    /// The parent `node_id` has right now.
    ///
    /// # Errors
    ///
    /// Returns [`RollupError::ItemNotFound`] for unknown ids.
    fn current_parent_of(&self, node_id: &str) -> Result<Option<String>, RollupError>;
}

// ---------------------------------------------------------------------------
// InMemoryTree
// ---------------------------------------------------------------------------

/// HashMap-backed accessor for tests and small in-process trees.
///
/// Children enumerate in id order (`BTreeMap` iteration), which keeps
/// outputs deterministic across runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTree {
    items: BTreeMap<String, WorkItem>,
    former_parents: HashMap<String, Option<String>>,
}

impl InMemoryTree {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an item.
    pub fn insert(&mut self, item: WorkItem) {
        self.items.insert(item.id.clone(), item);
    }

    /// Move `node_id` under `new_parent` (or to the root when `None`),
    /// recording the former parent for the resolver.
    ///
    /// # Errors
    ///
    /// Returns [`RollupError::ItemNotFound`] for unknown ids.
    pub fn reparent(
        &mut self,
        node_id: &str,
        new_parent: Option<&str>,
    ) -> Result<(), RollupError> {
        if let Some(parent_id) = new_parent {
            if !self.items.contains_key(parent_id) {
                return Err(RollupError::ItemNotFound {
                    node_id: parent_id.to_string(),
                });
            }
        }
        let item = self
            .items
            .get_mut(node_id)
            .ok_or_else(|| RollupError::ItemNotFound {
                node_id: node_id.to_string(),
            })?;
        let former = item.parent_id.take();
        item.parent_id = new_parent.map(ToString::to_string);
        self.former_parents.insert(node_id.to_string(), former);
        Ok(())
    }

    /// Write recomputed derived values back onto a stored item.
    ///
    /// # Errors
    ///
    /// Returns [`RollupError::ItemNotFound`] for unknown ids.
    pub fn apply_derived(
        &mut self,
        node_id: &str,
        values: DerivedValues,
    ) -> Result<(), RollupError> {
        let item = self
            .items
            .get_mut(node_id)
            .ok_or_else(|| RollupError::ItemNotFound {
                node_id: node_id.to_string(),
            })?;
        item.apply_derived(values);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, node_id: &str) -> Option<&WorkItem> {
        self.items.get(node_id)
    }

    pub fn get_mut(&mut self, node_id: &str) -> Option<&mut WorkItem> {
        self.items.get_mut(node_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl TreeAccessor for InMemoryTree {
    fn item(&self, node_id: &str) -> Result<WorkItem, RollupError> {
        self.items
            .get(node_id)
            .cloned()
            .ok_or_else(|| RollupError::ItemNotFound {
                node_id: node_id.to_string(),
            })
    }

    fn children_of(&self, node_id: &str) -> Result<Vec<WorkItem>, RollupError> {
        Ok(self
            .items
            .values()
            .filter(|item| item.parent_id.as_deref() == Some(node_id))
            .cloned()
            .collect())
    }

    fn ancestor_chain_of(&self, node_id: &str) -> Result<Vec<WorkItem>, RollupError> {
        let start = self.item(node_id)?;

        let mut chain: Vec<WorkItem> = Vec::new();
        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(start.id.clone());

        let mut current_parent_id = start.parent_id;
        while let Some(parent_id) = current_parent_id {
            if !visited.insert(parent_id.clone()) {
                return Err(RollupError::CycleDetected {
                    node_id: parent_id,
                });
            }
            let parent = self.item(&parent_id)?;
            current_parent_id = parent.parent_id.clone();
            chain.push(parent);
        }

        Ok(chain)
    }

    fn former_parent_of(&self, node_id: &str) -> Result<Option<String>, RollupError> {
        Ok(self
            .former_parents
            .get(node_id)
            .cloned()
            .flatten())
    }

    fn current_parent_of(&self, node_id: &str) -> Result<Option<String>, RollupError> {
        Ok(self.item(node_id)?.parent_id)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
