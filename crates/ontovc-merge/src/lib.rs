//! Merge engine for ontovc.
//!
//! Implements field-level three-way merge of schema snapshots, conflict
//! detection and policy-driven resolution, and the MERGE / SQUASH / REBASE
//! strategies that publish a merge result onto a target branch.
//!
//! # Key Types
//!
//! - [`merge_snapshots`] / [`SnapshotMerge`] -- Three-way merge of snapshots
//! - [`detect_conflicts`] / [`resolve_conflicts`] / [`ConflictPolicy`] -- Conflict resolver
//! - [`StrategyExecutor`] -- One implementor per [`ontovc_types::MergeStrategy`]
//! - [`MergeEngine`] -- Plans and runs a merge against a backing store

pub mod engine;
pub mod error;
pub mod resolver;
pub mod strategy;
pub mod three_way;

pub use engine::MergeEngine;
pub use error::MergeError;
pub use resolver::{
    apply_resolutions, detect_conflicts, resolve_conflicts, ConflictPolicy, Resolution,
    ResolutionOutcome, ResolutionStrategy,
};
pub use strategy::{
    executor_for, MergePlan, MergeRequest, RebaseMerge, SquashMerge, StrategyExecutor,
    ThreeWayMerge,
};
pub use three_way::{merge_snapshots, merge_value, FieldConflict, MergeMode, SnapshotMerge};
