//! In-memory stand-ins for the clock and the datastore.
//!
//! [`NullClock`] only moves when a test tells it to, so expiry can be driven
//! without sleeping. [`NullDatastore`] keeps records in an ordered map and can
//! be told to fail puts, scans or specific deletes.

pub mod clock;
pub mod store;

pub use clock::NullClock;
pub use store::NullDatastore;
