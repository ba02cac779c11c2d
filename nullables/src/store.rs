//! Nullable store: thread-safe in-memory storage for testing.

use provstore_store::{Datastore, Entry, EntryIter, StoreError, SCAN_PAGE_SIZE};
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex};

/// An ordered in-memory key-value store.
///
/// Failures can be injected per operation so callers' error paths can be
/// exercised without a real backend.
pub struct NullDatastore {
    entries: Mutex<BTreeMap<Vec<u8>, Vec<u8>>>,
    fail_puts: AtomicBool,
    fail_scans: AtomicBool,
    failing_deletes: Mutex<HashSet<Vec<u8>>>,
    put_count: AtomicU64,
    pages_read: AtomicU64,
    scan_page_size: usize,
    puts_held: Mutex<bool>,
    puts_released: Condvar,
    puts_waiting: AtomicUsize,
}

impl NullDatastore {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
            fail_puts: AtomicBool::new(false),
            fail_scans: AtomicBool::new(false),
            failing_deletes: Mutex::new(HashSet::new()),
            put_count: AtomicU64::new(0),
            pages_read: AtomicU64::new(0),
            scan_page_size: SCAN_PAGE_SIZE,
            puts_held: Mutex::new(false),
            puts_released: Condvar::new(),
            puts_waiting: AtomicUsize::new(0),
        }
    }

    /// Serve prefix queries `size` entries at a time.
    pub fn with_scan_page_size(mut self, size: usize) -> Self {
        self.scan_page_size = size.max(1);
        self
    }

    /// Block every subsequent `put` until [`NullDatastore::release_puts`].
    pub fn hold_puts(&self) {
        *self.puts_held.lock().unwrap() = true;
    }

    pub fn release_puts(&self) {
        *self.puts_held.lock().unwrap() = false;
        self.puts_released.notify_all();
    }

    /// Number of `put` calls currently blocked by [`NullDatastore::hold_puts`].
    pub fn puts_waiting(&self) -> usize {
        self.puts_waiting.load(Ordering::SeqCst)
    }

    /// Pages read by prefix queries so far.
    pub fn pages_read(&self) -> u64 {
        self.pages_read.load(Ordering::SeqCst)
    }

    /// Make every subsequent `put` fail (or succeed again).
    pub fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent `query_prefix` fail (or succeed again).
    pub fn fail_scans(&self, fail: bool) {
        self.fail_scans.store(fail, Ordering::SeqCst);
    }

    /// Make `delete` fail for this exact key until cleared.
    pub fn fail_delete_of(&self, key: &[u8]) {
        self.failing_deletes.lock().unwrap().insert(key.to_vec());
    }

    pub fn clear_delete_failures(&self) {
        self.failing_deletes.lock().unwrap().clear();
    }

    /// Number of successful `put` calls so far.
    pub fn put_count(&self) -> u64 {
        self.put_count.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }
}

impl Default for NullDatastore {
    fn default() -> Self {
        Self::new()
    }
}

impl Datastore for NullDatastore {
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        let mut held = self.puts_held.lock().unwrap();
        if *held {
            self.puts_waiting.fetch_add(1, Ordering::SeqCst);
            while *held {
                held = self.puts_released.wait(held).unwrap();
            }
            self.puts_waiting.fetch_sub(1, Ordering::SeqCst);
        }
        drop(held);

        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("injected put failure".into()));
        }
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_vec(), value.to_vec());
        self.put_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    fn delete(&self, key: &[u8]) -> Result<(), StoreError> {
        if self.failing_deletes.lock().unwrap().contains(key) {
            return Err(StoreError::Backend("injected delete failure".into()));
        }
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }

    fn query_prefix(&self, prefix: &[u8]) -> Result<EntryIter<'_>, StoreError> {
        if self.fail_scans.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("injected scan failure".into()));
        }
        let mut pages = PrefixPages {
            store: self,
            prefix: prefix.to_vec(),
            resume_after: None,
            page: VecDeque::new(),
            exhausted: false,
        };
        pages.fill();
        Ok(Box::new(pages))
    }
}

/// Prefix scan that copies one page at a time out of the map.
struct PrefixPages<'a> {
    store: &'a NullDatastore,
    prefix: Vec<u8>,
    resume_after: Option<Vec<u8>>,
    page: VecDeque<Entry>,
    exhausted: bool,
}

impl PrefixPages<'_> {
    fn fill(&mut self) {
        let entries = self.store.entries.lock().unwrap();
        let lower = match &self.resume_after {
            Some(key) => Bound::Excluded(key.clone()),
            None => Bound::Included(self.prefix.clone()),
        };
        let size = self.store.scan_page_size;
        self.page.extend(
            entries
                .range::<Vec<u8>, _>((lower, Bound::Unbounded))
                .take_while(|(k, _)| k.starts_with(&self.prefix))
                .take(size)
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        self.store.pages_read.fetch_add(1, Ordering::SeqCst);

        if self.page.len() < size {
            self.exhausted = true;
        }
        if let Some((last, _)) = self.page.back() {
            self.resume_after = Some(last.clone());
        }
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
            self.fill();
        }
    }
}
