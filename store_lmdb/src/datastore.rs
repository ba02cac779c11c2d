//! LMDB implementation of Datastore.

use std::collections::VecDeque;
use std::ops::Bound;
use std::path::Path;
use std::sync::Arc;

use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};

use provstore_store::{Datastore, Entry, EntryIter, StoreError, SCAN_PAGE_SIZE};

use crate::LmdbError;

const DB_NAME: &str = "providers";

pub struct LmdbDatastore {
    pub(crate) env: Arc<Env>,
    pub(crate) db: Database<Bytes, Bytes>,
    scan_page_size: usize,
}

impl LmdbDatastore {
    /// Open or create an LMDB environment at `path` with the given map size.
    pub fn open(path: &Path, map_size: usize) -> Result<Self, LmdbError> {
        std::fs::create_dir_all(path)?;
        // SAFETY: the environment is opened once per path by this process and
        // the memory map is never modified outside of heed transactions.
        let env = unsafe { EnvOpenOptions::new().map_size(map_size).max_dbs(1).open(path)? };

        let mut wtxn = env.write_txn()?;
        let db: Database<Bytes, Bytes> = env.create_database(&mut wtxn, Some(DB_NAME))?;
        wtxn.commit()?;

        tracing::debug!(path = %path.display(), map_size, "opened LMDB datastore");
        Ok(Self {
            env: Arc::new(env),
            db,
            scan_page_size: SCAN_PAGE_SIZE,
        })
    }

    /// Read prefix queries `size` entries per read transaction.
    pub fn with_scan_page_size(mut self, size: usize) -> Self {
        self.scan_page_size = size.max(1);
        self
    }

    /// Number of entries in the database.
    pub fn len(&self) -> Result<u64, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let count = self.db.len(&rtxn).map_err(LmdbError::from)?;
        Ok(count)
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }
}

impl Datastore for LmdbDatastore {
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        self.db.put(&mut wtxn, key, value).map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let val = self.db.get(&rtxn, key).map_err(LmdbError::from)?;
        Ok(val.map(|bytes| bytes.to_vec()))
    }

    fn delete(&self, key: &[u8]) -> Result<(), StoreError> {
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        self.db.delete(&mut wtxn, key).map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }

    fn query_prefix(&self, prefix: &[u8]) -> Result<EntryIter<'_>, StoreError> {
        let mut pages = PrefixPages {
            store: self,
            prefix: prefix.to_vec(),
            upper: prefix_upper_bound(prefix),
            resume_after: None,
            page: VecDeque::new(),
            exhausted: false,
        };
        pages.fill()?;
        Ok(Box::new(pages))
    }
}

/// Prefix scan that reads one page per short-lived read transaction.
///
/// No reader slot is held between pages, so writers (including deletes of
/// entries already returned) proceed while the scan is in progress.
struct PrefixPages<'a> {
    store: &'a LmdbDatastore,
    prefix: Vec<u8>,
    upper: Option<Vec<u8>>,
    resume_after: Option<Vec<u8>>,
    page: VecDeque<Entry>,
    exhausted: bool,
}

impl PrefixPages<'_> {
    fn fill(&mut self) -> Result<(), StoreError> {
        let rtxn = self.store.env.read_txn().map_err(LmdbError::from)?;
        let lower = match &self.resume_after {
            Some(key) => Bound::Excluded(key.as_slice()),
            None => Bound::Included(self.prefix.as_slice()),
        };
        let upper = match &self.upper {
            Some(key) => Bound::Excluded(key.as_slice()),
            None => Bound::Unbounded,
        };
        let bounds: (Bound<&[u8]>, Bound<&[u8]>) = (lower, upper);

        let iter = self.store.db.range(&rtxn, &bounds).map_err(LmdbError::from)?;
        let mut read = 0;
        for result in iter.take(self.store.scan_page_size) {
            let (key, val) = result.map_err(LmdbError::from)?;
            self.page.push_back((key.to_vec(), val.to_vec()));
            read += 1;
        }

        if read < self.store.scan_page_size {
            self.exhausted = true;
        }
        if let Some((last, _)) = self.page.back() {
            self.resume_after = Some(last.clone());
        }
        Ok(())
    }
}

impl Iterator for PrefixPages<'_> {
    type Item = Result<Entry, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(entry) = self.page.pop_front() {
                return Some(Ok(entry));
            }
            if self.exhausted {
                return None;
            }
            if let Err(e) = self.fill() {
                self.exhausted = true;
                return Some(Err(e));
            }
        }
    }
}

/// Smallest key greater than every key starting with `prefix`, or `None`
/// when the prefix is empty or all `0xff`.
fn prefix_upper_bound(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut upper = prefix.to_vec();
    while let Some(last) = upper.pop() {
        if last < u8::MAX {
            upper.push(last + 1);
            return Some(upper);
        }
    }
    None
}
