//! The rollup engine: aggregation, ancestor resolution, propagation.
//!
//! ## Submodules
//!
//! - [`aggregate`] — pure derived-value computation for one node from its
//!   children (weighted completion, hour sums, scheduling fold).
//! - [`ancestors`] — which ancestors a change reaches, including the
//!   former chain of a reparented node, deduplicated and ordered
//!   children-before-parents.
//! - [`propagate`] — the orchestrating walk that ties the two together
//!   and reports every node whose derived values changed.

pub mod aggregate;
pub mod ancestors;
pub mod propagate;

pub use aggregate::{aggregate, effective_completion};
pub use propagate::{Affected, Propagation, propagate};
