//! Diff engine for ontovc.
//!
//! Computes structured differences between schema snapshots and between
//! branches of a backing store.
//!
//! # Key Types
//!
//! - [`ChangeSet`] / [`ResourceChange`] -- Snapshot-level diff (added/deleted/modified/renamed resources)
//! - [`BranchDiff`] -- Source-relative comparison of two branches plus both sides' changes since the merge base
//! - [`DiffEngine`] -- Loads snapshots from a [`ontovc_store::BackingStore`] and builds a [`BranchDiff`]
//!
//! The [`history`] module walks commit parents to find merge bases and
//! first-parent chains.

pub mod branch_diff;
pub mod engine;
pub mod error;
pub mod history;
pub mod snapshot_diff;

pub use branch_diff::BranchDiff;
pub use engine::DiffEngine;
pub use error::{DiffError, DiffResult};
pub use snapshot_diff::{diff_snapshots, ChangeSet, Modification, Rename, ResourceChange};
