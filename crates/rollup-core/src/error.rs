//! Error taxonomy for rollup operations.
//!
//! Three failure classes exist, and all of them abort the whole
//! propagation call with nothing applied:
//!
//! - [`RollupError::CycleDetected`] — an ancestor walk revisited a node or
//!   exceeded the configured depth bound. The accessor is expected to
//!   prevent cycles, but the engine must fail rather than hang on a
//!   malformed tree.
//! - [`RollupError::InconsistentInput`] — the change set claims something
//!   the tree cannot corroborate (e.g. a structural change on a node that
//!   has neither a former nor a current parent).
//! - [`RollupError::Collaborator`] — the tree accessor failed to answer.
//!   The failing node and the [`Stage`] of the walk are preserved so the
//!   caller can decide on retry or surfacing.

use std::fmt;

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

/// Which accessor operation was in flight when a collaborator failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Fetching the node record itself.
    Item,
    /// Enumerating a node's children.
    Children,
    /// Walking an ancestor chain.
    Ancestors,
    /// Resolving the pre-move parent of a reparented node.
    FormerParent,
}

impl Stage {
    /// Stable identifier used in error messages and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Item => "item",
            Self::Children => "children",
            Self::Ancestors => "ancestors",
            Self::FormerParent => "former-parent",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// RollupError
// ---------------------------------------------------------------------------

/// Errors surfaced by the propagation engine and the tree accessors.
#[derive(Debug, thiserror::Error)]
pub enum RollupError {
    /// The requested item does not exist in the accessor's snapshot.
    #[error("item not found: '{node_id}'")]
    ItemNotFound { node_id: String },

    /// An ancestor walk revisited `node_id` or ran past the depth bound.
    #[error("cycle detected while walking ancestors of '{node_id}'")]
    CycleDetected { node_id: String },

    /// The change set disagrees with the observable tree state.
    #[error("inconsistent input for '{node_id}': {detail}")]
    InconsistentInput { node_id: String, detail: String },

    /// The tree accessor failed; `stage` names the operation that failed.
    #[error("tree accessor failed for '{node_id}' during {stage}: {source}")]
    Collaborator {
        node_id: String,
        stage: Stage,
        #[source]
        source: anyhow::Error,
    },
}

impl RollupError {
    /// Wrap a backend failure with node and stage context.
    #[must_use]
    pub fn collaborator(node_id: impl Into<String>, stage: Stage, source: anyhow::Error) -> Self {
        Self::Collaborator {
            node_id: node_id.into(),
            stage,
            source,
        }
    }

    /// The id of the node the failure is attributed to.
    #[must_use]
    pub fn node_id(&self) -> &str {
        match self {
            Self::ItemNotFound { node_id }
            | Self::CycleDetected { node_id }
            | Self::InconsistentInput { node_id, .. }
            | Self::Collaborator { node_id, .. } => node_id,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
