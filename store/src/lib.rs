//! Abstract storage trait for the provider record store.
//!
//! Every storage backend (LMDB, in-memory for testing) implements
//! [`Datastore`]. The rest of the codebase depends only on the trait.

pub mod datastore;
pub mod error;

pub use datastore::{Datastore, Entry, EntryIter, SCAN_PAGE_SIZE};
pub use error::StoreError;
