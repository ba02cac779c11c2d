//! LMDB storage backend for the provider record store.
//!
//! Implements [`provstore_store::Datastore`] using the `heed` LMDB bindings.
//! All entries live in a single named database inside one environment.

pub mod datastore;
pub mod error;

pub use datastore::LmdbDatastore;
pub use error::LmdbError;
