//! Byte-oriented key-value store consumed by the provider store adapter.

use crate::StoreError;

/// One `(key, value)` pair returned by a prefix query.
pub type Entry = (Vec<u8>, Vec<u8>);

/// Entries a backend reads per step of a prefix query.
pub const SCAN_PAGE_SIZE: usize = 1024;

/// Iterator over the entries matching a prefix, in key order.
pub type EntryIter<'a> = Box<dyn Iterator<Item = Result<Entry, StoreError>> + Send + 'a>;

/// A durable key-value store.
///
/// Implementations must be safe to call from several threads for independent
/// keys. Each `put`/`delete` is its own atomic unit; no cross-key transaction
/// is required.
pub trait Datastore: Send + Sync {
    /// Insert or overwrite `key`.
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError>;

    /// Read `key`, returning `None` when it is absent.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    /// Remove `key`. Deleting an absent key is not an error.
    fn delete(&self, key: &[u8]) -> Result<(), StoreError>;

    /// Iterate all entries whose key starts with `prefix`.
    ///
    /// Backends read in bounded pages and resume after the last key they
    /// returned, so memory stays flat however many entries match. Keys
    /// written or deleted behind the cursor are not revisited; keys ahead
    /// of it are seen as they are when their page is read.
    fn query_prefix(&self, prefix: &[u8]) -> Result<EntryIter<'_>, StoreError>;
}
