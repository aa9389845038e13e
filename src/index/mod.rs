//! Durable catalog of known content identifiers and their metadata.
use std::collections::HashMap;

use chrono::Utc;
use serde::{
    Deserialize,
    Serialize,
};

use crate::error::{
    Error,
    Layer,
    Result,
};
use crate::record::{
    listing_order,
    ContentRecord,
    PinState,
    RecordUpdate,
};

pub mod dir;
pub mod memory;

pub use dir::DirIndex;
pub use memory::MemoryIndex;

/// Default upper bound for the `limit` of a listing or search.
pub const DEFAULT_MAX_PAGE: usize = 100;

/// One page of a listing or search, with the total number of matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub records: Vec<ContentRecord>,
    pub total: usize,
    pub offset: usize,
    pub limit: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    pub records: usize,
    pub total_bytes: u64,
    pub pinned: usize,
    pub unpinned: usize,
    pub unknown: usize,
}

impl IndexStats {
    fn count(&mut self, r: &ContentRecord) {
        self.records += 1;
        self.total_bytes += r.size_bytes;
        match r.pin_state {
            PinState::Pinned => self.pinned += 1,
            PinState::Unpinned => self.unpinned += 1,
            PinState::Unknown => self.unknown += 1,
        }
    }
}

pub trait MetadataIndex: Send + Sync {
    /// Fails with `DuplicateIdentifier` if the identifier is already indexed.
    fn insert(&self, record: ContentRecord) -> Result<ContentRecord>;

    fn get(&self, identifier: &str) -> Result<ContentRecord>;

    /// Apply a partial update of mutable fields and bump `updated_at`.
    fn update(&self, identifier: &str, update: &RecordUpdate) -> Result<ContentRecord>;

    fn delete(&self, identifier: &str) -> Result<()>;

    /// Newest first, ties broken by identifier. An offset beyond the end yields an empty page.
    fn list(&self, offset: usize, limit: usize) -> Result<Page>;

    /// Case-insensitive substring search over display name, description and tags, ordered and
    /// paginated like [list](MetadataIndex::list).
    fn search(&self, query: &str, offset: usize, limit: usize) -> Result<Page>;

    fn stats(&self) -> Result<IndexStats> {
        let mut stats = IndexStats::default();
        let mut offset = 0;
        loop {
            let page = self.list(offset, DEFAULT_MAX_PAGE)?;
            if page.records.is_empty() {
                break;
            }
            offset += page.records.len();
            for r in page.records.iter() {
                stats.count(r);
            }
        }
        Ok(stats)
    }
}

/// In-memory table shared by the index implementations.
#[derive(Debug, Default)]
pub(crate) struct Table {
    records: HashMap<String, ContentRecord>,
    max_page: usize,
}

impl Table {
    pub(crate) fn new(max_page: usize) -> Table {
        Table {
            records: HashMap::new(),
            max_page: max_page.max(1),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    pub(crate) fn contains(&self, identifier: &str) -> bool {
        self.records.contains_key(identifier)
    }

    pub(crate) fn load(&mut self, record: ContentRecord) {
        self.records.insert(record.identifier.clone(), record);
    }

    pub(crate) fn insert(&mut self, mut record: ContentRecord) -> Result<ContentRecord> {
        if self.records.contains_key(&record.identifier) {
            return Err(Error::DuplicateIdentifier {
                identifier: record.identifier,
            });
        }
        record.retrieval_hint = String::new();
        self.records.insert(record.identifier.clone(), record.clone());
        Ok(record)
    }

    pub(crate) fn get(&self, identifier: &str) -> Result<ContentRecord> {
        match self.records.get(identifier) {
            Some(v) => Ok(v.clone()),
            None => Err(Error::not_found(identifier, Layer::Index)),
        }
    }

    /// Compute the updated record without storing it.
    pub(crate) fn updated(&self, identifier: &str, update: &RecordUpdate) -> Result<ContentRecord> {
        let mut r = self.get(identifier)?;
        update.apply(&mut r, Utc::now());
        Ok(r)
    }

    pub(crate) fn remove(&mut self, identifier: &str) -> Result<ContentRecord> {
        match self.records.remove(identifier) {
            Some(v) => Ok(v),
            None => Err(Error::not_found(identifier, Layer::Index)),
        }
    }

    pub(crate) fn page(&self, query: Option<&str>, offset: usize, limit: usize) -> Page {
        let needle = query.map(|q| q.to_lowercase());
        let mut matched: Vec<&ContentRecord> = self.records.values()
            .filter(|r| match &needle {
                Some(n) => r.matches(n),
                None => true,
            })
            .collect();
        matched.sort_by(|a, b| listing_order(a, b));
        let limit = limit.min(self.max_page);
        let total = matched.len();
        let records = matched.into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect();
        Page {
            records,
            total,
            offset,
            limit,
        }
    }

    pub(crate) fn stats(&self) -> IndexStats {
        let mut stats = IndexStats::default();
        for r in self.records.values() {
            stats.count(r);
        }
        stats
    }
}
