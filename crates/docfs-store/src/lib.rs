//! Backing document store for docfs.
//!
//! docfs keeps every record (elements, chunk maps, chunks, accounts) in a
//! general-purpose document store and treats it as a dumb medium: point
//! lookups, predicate scans, field updates and multi-record transactions.
//! This crate pins down that contract as the [`DocumentStore`] trait and
//! ships [`MemoryStore`], an in-memory backend with snapshot persistence.
//!
//! # Design Rules
//!
//! 1. A record belongs to exactly one collection, named by [`Document::COLLECTION`].
//! 2. Ids are unique within a collection; inserting a taken id is
//!    [`StoreError::DuplicateKey`].
//! 3. A committed [`Transaction`] is applied entirely or not at all.
//! 4. The store never interprets record contents beyond the caller's
//!    [`Filter`] and [`Update`] closures.

mod codec;
pub mod document;
pub mod error;
pub mod memory;
pub mod snapshot;
pub mod traits;
pub mod transaction;

pub use codec::{decode, encode};
pub use document::{Document, Filter, Update};
pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use traits::DocumentStore;
pub use transaction::Transaction;
