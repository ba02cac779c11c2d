//! Errors raised while decoding persisted provider entries.

use thiserror::Error;

/// A stored key or value could not be parsed.
///
/// Callers scanning the store treat a record that fails to decode as absent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("invalid provider key: {0}")]
    InvalidKey(String),

    #[error("invalid timestamp encoding: expected 8 bytes, got {0}")]
    InvalidTimestamp(usize),
}
