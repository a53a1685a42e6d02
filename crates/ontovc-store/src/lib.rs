//! Backing store contract for ontovc.
//!
//! The backing store is a branch-capable document store, analogous to a git
//! object database plus refs: every write produces a commit, branches are
//! named pointers to commit heads, and the store is the single authority on
//! which head a branch currently points at.
//!
//! # Contract
//!
//! All backends implement the [`BackingStore`] trait. Calls are per-database
//! and branch-scoped.
//!
//! - Branch creation is atomic: of several concurrent `create_branch` calls
//!   for one name, exactly one succeeds and the rest see
//!   [`StoreError::BranchExists`].
//! - Commits written with [`BackingStore::write_commit`] are detached; they
//!   only become visible when a branch head is moved onto them with the
//!   compare-and-swap [`BackingStore::update_branch_head`].
//!
//! # Backends
//!
//! - [`InMemoryBackingStore`] -- `HashMap`-based store for tests and embedding

pub mod error;
pub mod memory;
pub mod traits;
pub mod types;

pub use error::{StoreError, StoreResult};
pub use memory::InMemoryBackingStore;
pub use traits::BackingStore;
pub use types::{CommitInfo, NativeBranchInfo, NewCommit};
