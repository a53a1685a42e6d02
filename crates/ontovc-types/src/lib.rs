//! Foundation types for ontovc.
//!
//! ontovc is a Git-style branching and merging engine for schema documents
//! (object types, properties, link types) held in a branch-capable document
//! store. Every other ontovc crate depends on `ontovc-types`.
//!
//! # Key Types
//!
//! - [`CommitHash`] -- Content-addressed commit identifier (BLAKE3 hash)
//! - [`SchemaResource`] / [`ResourceKey`] / [`Snapshot`] -- Typed schema model
//! - [`Document`] -- Raw store document (`id`, `doc_type`, JSON body)
//! - [`Branch`] -- Branch metadata record
//! - [`ChangeProposal`] / [`ProposalStatus`] -- Review workflow
//! - [`Conflict`] / [`ConflictType`] -- Structural merge conflicts
//! - [`MergeStrategy`] / [`MergeResult`] -- Merge requests and outcomes
//! - [`ProtectionRules`] -- Protected branch name patterns

pub mod branch;
pub mod conflict;
pub mod document;
pub mod error;
pub mod hash;
pub mod ids;
pub mod merge;
pub mod names;
pub mod proposal;
pub mod schema;

pub use branch::{Branch, BRANCH_METADATA_DOC_TYPE};
pub use conflict::{Conflict, ConflictType, FieldPath, PathSegment};
pub use document::Document;
pub use error::TypeError;
pub use hash::CommitHash;
pub use ids::{LockId, ProposalId};
pub use merge::{MergeResult, MergeStrategy};
pub use names::{validate_branch_name, ProtectionRules, BUILTIN_PROTECTED};
pub use proposal::{ChangeProposal, ProposalStatus, PROPOSAL_DOC_TYPE};
pub use schema::{
    Cardinality, LinkTypeDef, ObjectTypeDef, PropertyDef, ResourceKey, ResourceKind,
    SchemaResource, Snapshot,
};
