//! Data model for the rollup engine.
//!
//! - [`item`] — the [`WorkItem`](item::WorkItem) record, its derived-value
//!   snapshot, and the attribute-name vocabulary accepted by
//!   [`propagate`](crate::rollup::propagate::propagate).

pub mod item;

pub use item::{AttributeName, DerivedValues, WorkItem};
