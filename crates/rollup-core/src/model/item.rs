//! Work-item record and attribute vocabulary.
//!
//! A [`WorkItem`] is a snapshot of one node in the hierarchy as seen
//! through the tree accessor: its own scalar values (estimate, remaining
//! work, completion, scheduling flags) plus the derived values computed by
//! the last rollup. The engine never mutates a `WorkItem`; it reports new
//! [`DerivedValues`] and leaves persistence to the caller.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

// ---------------------------------------------------------------------------
// AttributeName
// ---------------------------------------------------------------------------

/// The attributes whose change can trigger a rollup.
///
/// `Status` and `StatusId` are distinct names for the same concern (callers
/// may report either, depending on which field they edited); both trigger a
/// plain recompute. `Parent` and `ParentId` are the structural pair: their
/// presence in a change set makes the resolver consider the former ancestor
/// chain as well as the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeName {
    EstimatedHours,
    RemainingHours,
    DoneRatio,
    Status,
    StatusId,
    Parent,
    ParentId,
    IgnoreNonWorkingDays,
}

impl AttributeName {
    /// Return the attribute name as its wire string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::EstimatedHours => "estimated_hours",
            Self::RemainingHours => "remaining_hours",
            Self::DoneRatio => "done_ratio",
            Self::Status => "status",
            Self::StatusId => "status_id",
            Self::Parent => "parent",
            Self::ParentId => "parent_id",
            Self::IgnoreNonWorkingDays => "ignore_non_working_days",
        }
    }

    /// Whether this attribute describes a change of position in the tree.
    #[must_use]
    pub const fn is_structural(self) -> bool {
        matches!(self, Self::Parent | Self::ParentId)
    }

    /// All attribute names, in wire order.
    pub const ALL: [Self; 8] = [
        Self::EstimatedHours,
        Self::RemainingHours,
        Self::DoneRatio,
        Self::Status,
        Self::StatusId,
        Self::Parent,
        Self::ParentId,
        Self::IgnoreNonWorkingDays,
    ];
}

impl fmt::Display for AttributeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for unrecognized attribute names.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown attribute name: '{0}'")]
pub struct UnknownAttribute(pub String);

impl FromStr for AttributeName {
    type Err = UnknownAttribute;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| UnknownAttribute(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// DerivedValues
// ---------------------------------------------------------------------------

/// The aggregation outputs for one node.
///
/// `PartialEq` on this type is what decides "changed vs unchanged" during
/// propagation. Float comparison is exact on purpose: derived hours are
/// sums over the same inputs, so recomputing from unchanged inputs yields
/// bit-identical results, and that exactness is what makes a second
/// propagation a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct DerivedValues {
    /// Aggregated completion percentage (0–100), `None` when undefined.
    pub done_ratio: Option<i32>,
    /// Sum of own and descendant estimates, `None` when nobody contributes.
    pub estimated_hours: Option<f64>,
    /// Sum of own and descendant remaining work, `None` when nobody contributes.
    pub remaining_hours: Option<f64>,
    /// Child-derived scheduling flag (own value for manually scheduled nodes).
    pub ignore_non_working_days: bool,
}

// ---------------------------------------------------------------------------
// WorkItem
// ---------------------------------------------------------------------------

/// One node of the work-item hierarchy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct WorkItem {
    pub id: String,
    /// `None` marks a root.
    pub parent_id: Option<String>,
    /// Whether the current status counts as done.
    pub status_closed: bool,
    /// Completion implied by the current status (status-based mode only).
    pub status_default_done_ratio: Option<i32>,
    /// Own completion percentage (field-based mode only).
    pub done_ratio: Option<i32>,
    pub estimated_hours: Option<f64>,
    pub remaining_hours: Option<f64>,
    /// Whether calendar scheduling ignores non-working days for this item.
    pub ignore_non_working_days: bool,
    /// When set, `ignore_non_working_days` is user-controlled and never
    /// overwritten by aggregation (it still feeds the parent's fold).
    pub schedule_manually: bool,
    pub derived_done_ratio: Option<i32>,
    pub derived_estimated_hours: Option<f64>,
    pub derived_remaining_hours: Option<f64>,
}

impl WorkItem {
    /// Minimal constructor used by accessors and tests.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Returns `true` if this item has no parent.
    #[must_use]
    pub const fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// The currently stored derived values, for change comparison.
    ///
    /// `ignore_non_working_days` has no separate derived column; the stored
    /// flag itself is both input and output of the fold.
    #[must_use]
    pub const fn stored_derived(&self) -> DerivedValues {
        DerivedValues {
            done_ratio: self.derived_done_ratio,
            estimated_hours: self.derived_estimated_hours,
            remaining_hours: self.derived_remaining_hours,
            ignore_non_working_days: self.ignore_non_working_days,
        }
    }

    /// Copy freshly computed derived values into this record.
    pub fn apply_derived(&mut self, values: DerivedValues) {
        self.derived_done_ratio = values.done_ratio;
        self.derived_estimated_hours = values.estimated_hours;
        self.derived_remaining_hours = values.remaining_hours;
        self.ignore_non_working_days = values.ignore_non_working_days;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
