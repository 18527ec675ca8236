//! rollup-core: derived-attribute propagation for work-item hierarchies.
//!
//! When a tracked attribute of a work item changes (estimate, remaining
//! work, completion, status, scheduling flag, or its parent), the derived
//! values of every affected ancestor go stale. This crate recomputes them:
//! [`rollup::propagate`] takes the changed node and the names of the
//! changed attributes, walks the affected ancestor chains bottom-up —
//! including the *former* chain when the node just moved — and returns the
//! nodes whose derived values actually changed, with the values to
//! persist. The engine itself never writes; persistence (and its
//! transactionality) belongs to the caller.
//!
//! # Conventions
//!
//! - **Errors**: [`error::RollupError`] everywhere in the engine;
//!   `anyhow::Result` with context at the storage boundary.
//! - **Logging**: `tracing` macros (`debug!`, `trace!`, `warn!`); the
//!   library installs no subscriber.

pub mod config;
pub mod error;
pub mod model;
pub mod rollup;
pub mod store;
pub mod tree;

pub use config::{ProgressMode, RollupConfig};
pub use error::{RollupError, Stage};
pub use model::{AttributeName, DerivedValues, WorkItem};
pub use rollup::{Affected, Propagation, propagate};
pub use tree::{InMemoryTree, TreeAccessor};
