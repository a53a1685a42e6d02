//! Cache layer for ontovc.
//!
//! The cache is advisory: the backing store stays authoritative for branch
//! heads and protection. [`BranchCache`] wraps any [`CacheBackend`] and treats
//! backend failures as misses, so a broken cache slows reads down but never
//! fails them.

pub mod backend;
pub mod branch;
pub mod error;
pub mod memory;

pub use backend::CacheBackend;
pub use branch::{BranchCache, CacheKey};
pub use error::{CacheError, CacheResult};
pub use memory::InMemoryCache;
