//! Test doubles with failure injection.
use std::collections::{
    HashMap,
    HashSet,
};
use std::io::Cursor;
use std::sync::atomic::{
    AtomicBool,
    AtomicUsize,
    Ordering,
};
use std::sync::Mutex;

use sha2::{
    Digest,
    Sha256,
};

use crate::error::{
    Error,
    Layer,
    Result,
};
use crate::index::{
    IndexStats,
    MemoryIndex,
    MetadataIndex,
    Page,
};
use crate::record::{
    ContentRecord,
    PinState,
    RecordUpdate,
};
use crate::store::{
    ContentReader,
    ContentStore,
    StoreStat,
};

/// In-memory content store. Identifiers are the hex SHA256 of the content.
#[derive(Default)]
pub struct FlakyStore {
    content: Mutex<HashMap<String, Vec<u8>>>,
    pinned: Mutex<HashSet<String>>,
    fail_next: AtomicUsize,
    fail_pins: AtomicBool,
    outage_after: Mutex<Option<usize>>,
    calls: AtomicUsize,
}

impl FlakyStore {
    pub fn new() -> FlakyStore {
        FlakyStore::default()
    }

    /// Make the next `n` calls fail as unavailable.
    pub fn fail_next(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Make every pin and unpin fail as unavailable.
    pub fn fail_pins(&self, v: bool) {
        self.fail_pins.store(v, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Drop content behind the index's back.
    pub fn forget(&self, identifier: &str) {
        self.content.lock().unwrap().remove(identifier);
        self.pinned.lock().unwrap().remove(identifier);
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.content.lock().unwrap().contains_key(identifier)
    }

    pub fn is_pinned(&self, identifier: &str) -> bool {
        self.pinned.lock().unwrap().contains(identifier)
    }

    /// Let the next `n` calls through, then fail every call after them as unavailable.
    pub fn fail_after(&self, n: usize) {
        *self.outage_after.lock().unwrap() = Some(n);
    }

    /// End an outage started with `fail_after`.
    pub fn recover(&self) {
        *self.outage_after.lock().unwrap() = None;
    }

    fn enter(&self, identifier: Option<&str>) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let r = self.fail_next.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if r.is_ok() {
            return Err(Error::unavailable(identifier, "injected outage"));
        }
        let mut outage = self.outage_after.lock().unwrap();
        match *outage {
            Some(0) => return Err(Error::unavailable(identifier, "injected outage")),
            Some(n) => *outage = Some(n - 1),
            None => {},
        }
        Ok(())
    }

    fn enter_pin(&self, identifier: &str) -> Result<()> {
        self.enter(Some(identifier))?;
        if self.fail_pins.load(Ordering::SeqCst) {
            return Err(Error::unavailable(Some(identifier), "injected pin failure"));
        }
        if !self.contains(identifier) {
            return Err(Error::not_found(identifier, Layer::Backend));
        }
        Ok(())
    }
}

impl ContentStore for FlakyStore {
    fn add(&self, data: &[u8]) -> Result<String> {
        self.enter(None)?;
        let id = hex::encode(Sha256::digest(data));
        self.content.lock().unwrap().insert(id.clone(), data.to_vec());
        Ok(id)
    }

    fn fetch(&self, identifier: &str) -> Result<ContentReader> {
        self.enter(Some(identifier))?;
        match self.content.lock().unwrap().get(identifier) {
            Some(v) => Ok(Box::new(Cursor::new(v.clone()))),
            None => Err(Error::not_found(identifier, Layer::Backend)),
        }
    }

    fn pin(&self, identifier: &str) -> Result<()> {
        self.enter_pin(identifier)?;
        self.pinned.lock().unwrap().insert(identifier.to_string());
        Ok(())
    }

    fn unpin(&self, identifier: &str) -> Result<()> {
        self.enter(Some(identifier))?;
        if self.fail_pins.load(Ordering::SeqCst) {
            return Err(Error::unavailable(Some(identifier), "injected pin failure"));
        }
        self.pinned.lock().unwrap().remove(identifier);
        Ok(())
    }

    fn stat(&self, identifier: &str) -> Result<StoreStat> {
        self.enter(Some(identifier))?;
        let size = match self.content.lock().unwrap().get(identifier) {
            Some(v) => v.len() as u64,
            None => return Err(Error::not_found(identifier, Layer::Backend)),
        };
        Ok(StoreStat {
            size_bytes: size,
            pin_state: if self.is_pinned(identifier) { PinState::Pinned } else { PinState::Unpinned },
        })
    }

    fn pins(&self) -> Result<Vec<String>> {
        self.enter(None)?;
        let mut v: Vec<String> = self.pinned.lock().unwrap().iter().cloned().collect();
        v.sort();
        Ok(v)
    }

    fn ping(&self) -> Result<()> {
        self.enter(None)
    }
}

/// Memory index whose writes can be made to fail.
#[derive(Default)]
pub struct FailingIndex {
    inner: MemoryIndex,
    fail_writes: AtomicBool,
}

impl FailingIndex {
    pub fn new() -> FailingIndex {
        FailingIndex::default()
    }

    pub fn fail_writes(&self, v: bool) {
        self.fail_writes.store(v, Ordering::SeqCst);
    }

    fn check(&self, identifier: &str) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::index_write(identifier, "injected storage exhaustion"));
        }
        Ok(())
    }
}

impl MetadataIndex for FailingIndex {
    fn insert(&self, record: ContentRecord) -> Result<ContentRecord> {
        self.check(&record.identifier)?;
        self.inner.insert(record)
    }

    fn get(&self, identifier: &str) -> Result<ContentRecord> {
        self.inner.get(identifier)
    }

    fn update(&self, identifier: &str, update: &RecordUpdate) -> Result<ContentRecord> {
        self.check(identifier)?;
        self.inner.update(identifier, update)
    }

    fn delete(&self, identifier: &str) -> Result<()> {
        self.check(identifier)?;
        self.inner.delete(identifier)
    }

    fn list(&self, offset: usize, limit: usize) -> Result<Page> {
        self.inner.list(offset, limit)
    }

    fn search(&self, query: &str, offset: usize, limit: usize) -> Result<Page> {
        self.inner.search(query, offset, limit)
    }

    fn stats(&self) -> Result<IndexStats> {
        self.inner.stats()
    }
}
