//! Fundamental types for the provider record store.
//!
//! This crate defines the types shared across every other crate in the workspace:
//! content and peer identifiers, timestamps, the clock abstraction, and decode errors.

pub mod error;
pub mod id;
pub mod time;

pub use error::DecodeError;
pub use id::{ContentId, PeerId};
pub use time::{Clock, SystemClock, Timestamp};
