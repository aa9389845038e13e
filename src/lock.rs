//! Per-identifier mutual exclusion.
//!
//! Each identifier maps to its own mutex. An entry is dropped once its last holder releases it,
//! so the table never grows beyond the number of operations in flight.
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{
    Mutex,
    RawMutex,
    RwLock,
};

#[derive(Default)]
pub struct LockTable {
    locks: RwLock<HashMap<String, Arc<Mutex<()>>>>,
}

/// Holds the lock on one identifier until dropped.
pub struct IdentifierGuard<'a> {
    table: &'a LockTable,
    identifier: String,
    held: Option<ArcMutexGuard<RawMutex, ()>>,
}

impl LockTable {
    pub fn new() -> LockTable {
        LockTable::default()
    }

    fn entry(&self, identifier: &str) -> Arc<Mutex<()>> {
        {
            let locks = self.locks.read();
            if let Some(lock) = locks.get(identifier) {
                return Arc::clone(lock);
            }
        }
        let mut locks = self.locks.write();
        if let Some(lock) = locks.get(identifier) {
            return Arc::clone(lock);
        }
        let lock = Arc::new(Mutex::new(()));
        locks.insert(identifier.to_string(), Arc::clone(&lock));
        lock
    }

    /// Block until no other caller holds `identifier`, then hold it.
    pub fn lock(&self, identifier: &str) -> IdentifierGuard<'_> {
        let held = self.entry(identifier).lock_arc();
        IdentifierGuard {
            table: self,
            identifier: identifier.to_string(),
            held: Some(held),
        }
    }

    /// Number of identifiers currently held or waited on.
    pub fn len(&self) -> usize {
        self.locks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl IdentifierGuard<'_> {
    pub fn identifier(&self) -> &str {
        &self.identifier
    }
}

impl Drop for IdentifierGuard<'_> {
    fn drop(&mut self) {
        drop(self.held.take());
        let mut locks = self.table.locks.write();
        // only the table's own reference left: nobody holds or waits
        if locks.get(&self.identifier).map_or(false, |l| Arc::strong_count(l) == 1) {
            locks.remove(&self.identifier);
        }
    }
}
