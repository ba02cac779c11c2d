//! Provider record store for content routing.
//!
//! Answers "which peers claim to provide content X" and records new claims.
//! The [`ProviderManager`] is an actor owning a bounded LRU cache of
//! [`ProviderSet`]s in front of a durable [`provstore_store::Datastore`],
//! with a periodic sweep that expires stale claims directly from storage.

pub mod cache;
pub mod config;
pub mod error;
pub mod keys;
pub mod manager;
pub mod record;
pub mod store;
pub mod sweeper;

pub use cache::ProviderCache;
pub use config::ProviderConfig;
pub use error::ProviderError;
pub use manager::ProviderManager;
pub use record::{ProviderRecord, ProviderSet};
pub use store::ProviderStore;
pub use sweeper::{SweepReport, Sweeper};
