//! Named reader/writer locks.
//!
//! A [`NamedLockManager`] hands out reader or writer guards keyed by an
//! arbitrary string. Any number of readers may hold a name at once; a writer
//! holds it alone. Distinct names never interact.
//!
//! Lock state for a name exists only while someone holds or waits for it:
//! each entry is reference-counted and evicted when the count drops to zero,
//! so the table stays proportional to the number of live names.
//!
//! Guards release on drop. [`NamedLockManager::release`] exists for call
//! sites that want the release to be explicit.
//!
//! # Lock names
//!
//! The [`keys`] module builds the names used across docfs. When a chunk-map
//! lock and a chunk lock are both needed, the chunk-map lock is taken first.

pub mod keys;
pub mod manager;

pub use manager::{LockGuard, LockMode, NamedLockManager};
