//! Orchestrates the content store and the metadata index as one logical unit.
//!
//! The index is the authoritative catalog of what this gateway exposes: an identifier is only
//! served if it is indexed, even though the content store is a global namespace. The content
//! store is authoritative for pin state.
//!
//! Every operation that mutates the index for an identifier holds that identifier in a
//! [LockTable](crate::lock::LockTable) for its duration, so concurrent ingest, update, removal and
//! reconciliation of the same identifier never interleave.
//!
//! Failure policy:
//!
//! * pin and unpin are best-effort cleanup; their failure is logged and does not fail the
//!   operation, except for the explicit [pin](Coordinator::pin) and [unpin](Coordinator::unpin)
//!   calls
//! * if content was added but cannot be indexed, the new pin is released again and the caller
//!   receives `IndexWriteFailed`
//! * if the index knows an identifier the store cannot produce, the caller receives
//!   `ContentMissing` and the record is marked for reconciliation
use std::path::Path;
use std::sync::Arc;

use log::{
    debug,
    error,
    info,
    warn,
};
use serde::Serialize;

use crate::error::{
    Error,
    Result,
};
use crate::index::{
    IndexStats,
    MetadataIndex,
    Page,
    DEFAULT_MAX_PAGE,
};
use crate::kind;
use crate::lock::LockTable;
use crate::record::{
    ContentRecord,
    Gateway,
    NewRecord,
    PinState,
    RecordUpdate,
};
use crate::store::{
    ContentReader,
    ContentStore,
    StoreStat,
};

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Base of the gateway locator handed out with every record.
    pub gateway: String,
    /// Largest accepted payload, in bytes.
    pub max_size: u64,
    /// Lowercase file extensions accepted at ingest. `None` accepts any.
    pub allowed_extensions: Option<Vec<String>>,
    pub max_page: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> CoordinatorConfig {
        CoordinatorConfig {
            gateway: String::from("http://127.0.0.1:8080/ipfs"),
            max_size: 100 * 1024 * 1024,
            allowed_extensions: None,
            max_page: DEFAULT_MAX_PAGE,
        }
    }
}

/// Content of an indexed object, with its record.
pub struct Retrieval {
    pub record: ContentRecord,
    pub content: ContentReader,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Health {
    pub backend_reachable: bool,
    pub backend_error: Option<String>,
    pub records: usize,
}

pub struct Coordinator {
    index: Arc<dyn MetadataIndex>,
    store: Arc<dyn ContentStore>,
    locks: LockTable,
    gateway: Gateway,
    config: CoordinatorConfig,
}

impl Coordinator {
    pub fn new(index: Arc<dyn MetadataIndex>, store: Arc<dyn ContentStore>, config: CoordinatorConfig) -> Coordinator {
        Coordinator {
            index,
            store,
            locks: LockTable::new(),
            gateway: Gateway::new(&config.gateway),
            config,
        }
    }

    pub(crate) fn index(&self) -> &dyn MetadataIndex {
        self.index.as_ref()
    }

    pub(crate) fn store(&self) -> &dyn ContentStore {
        self.store.as_ref()
    }

    pub(crate) fn locks(&self) -> &LockTable {
        &self.locks
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    fn check_ingest(&self, data: &[u8], meta: &NewRecord) -> Result<()> {
        if data.len() as u64 > self.config.max_size {
            return Err(Error::invalid(format!("payload of {} bytes exceeds limit of {} bytes", data.len(), self.config.max_size)));
        }
        let allowed = match &self.config.allowed_extensions {
            Some(v) => v,
            None => return Ok(()),
        };
        let name = match meta.original_name.as_ref().or(meta.display_name.as_ref()) {
            Some(v) => v,
            None => return Ok(()),
        };
        let ext = match Path::new(name.trim()).extension().and_then(|v| v.to_str()) {
            Some(v) => v.to_lowercase(),
            None => return Ok(()),
        };
        if allowed.iter().any(|v| v == &ext) {
            return Ok(());
        }
        Err(Error::invalid(format!("file type '{}' not allowed", ext)))
    }

    /// Store `data` in the content store, pin it and index it.
    ///
    /// Ingesting content that is already indexed returns the existing record unchanged.
    ///
    /// # Arguments
    ///
    /// * `data` - Content bytes.
    /// * `meta` - Descriptive metadata requested by the caller.
    pub fn ingest(&self, data: &[u8], meta: NewRecord) -> Result<ContentRecord> {
        self.check_ingest(data, &meta)?;
        info!("ingest {} bytes", data.len());

        let identifier = self.store.add(data)?;
        let _guard = self.locks.lock(&identifier);

        match self.index.get(&identifier) {
            Ok(r) => {
                debug!("{} already indexed", &identifier);
                return Ok(r.with_hint(&self.gateway));
            },
            Err(Error::NotFound { .. }) => {},
            Err(e) => return Err(e),
        }

        let pin_state = match self.store.pin(&identifier) {
            Ok(_) => PinState::Pinned,
            Err(e) => {
                warn!("pin failed for {}, indexing with unknown pin state: {}", &identifier, e);
                PinState::Unknown
            },
        };

        let mut meta = meta;
        meta.content_kind = Some(kind::resolve(meta.content_kind.as_deref(), data));
        let record = ContentRecord::new(&identifier, &meta, data.len() as u64, pin_state, chrono::Utc::now());

        match self.index.insert(record) {
            Ok(r) => {
                info!("ingested {} ({} bytes, {})", &identifier, r.size_bytes, r.pin_state);
                Ok(r.with_hint(&self.gateway))
            },
            Err(Error::DuplicateIdentifier { .. }) => {
                debug!("{} indexed concurrently", &identifier);
                Ok(self.index.get(&identifier)?.with_hint(&self.gateway))
            },
            Err(e) => {
                error!("index write failed for {}: {}", &identifier, e);
                if pin_state == PinState::Pinned {
                    if let Err(ue) = self.store.unpin(&identifier) {
                        warn!("compensating unpin failed for {}: {}", &identifier, ue);
                    }
                }
                match e {
                    Error::IndexWriteFailed { .. } => Err(e),
                    e => Err(Error::index_write(&identifier, e)),
                }
            },
        }
    }

    /// Fetch the content of an indexed identifier.
    ///
    /// Identifiers the index does not know are never looked up in the content store.
    pub fn retrieve(&self, identifier: &str) -> Result<Retrieval> {
        let record = self.index.get(identifier)?;
        match self.store.fetch(identifier) {
            Ok(content) => {
                debug!("retrieve {}", identifier);
                Ok(Retrieval {
                    record: record.with_hint(&self.gateway),
                    content,
                })
            },
            Err(Error::NotFound { .. }) => Err(self.content_missing(identifier)),
            Err(e) => Err(e),
        }
    }

    /// What the content store reports about an indexed identifier.
    pub fn stat(&self, identifier: &str) -> Result<StoreStat> {
        self.index.get(identifier)?;
        match self.store.stat(identifier) {
            Ok(v) => Ok(v),
            Err(Error::NotFound { .. }) => Err(self.content_missing(identifier)),
            Err(e) => Err(e),
        }
    }

    fn content_missing(&self, identifier: &str) -> Error {
        error!("{} is indexed but missing from the content store", identifier);
        self.mark_unknown(identifier);
        Error::ContentMissing {
            identifier: identifier.to_string(),
        }
    }

    fn mark_unknown(&self, identifier: &str) {
        let _guard = self.locks.lock(identifier);
        match self.index.update(identifier, &RecordUpdate::pin_state(PinState::Unknown)) {
            Ok(_) => {},
            Err(Error::NotFound { .. }) => {},
            Err(e) => warn!("cannot mark {} for reconciliation: {}", identifier, e),
        }
    }

    /// Update the mutable metadata of a record. Never touches the content store.
    ///
    /// Pin state is not caller-controlled; a pin state in `update` is ignored.
    pub fn update_metadata(&self, identifier: &str, update: &RecordUpdate) -> Result<ContentRecord> {
        if let Some(v) = &update.display_name {
            if v.trim().is_empty() {
                return Err(Error::invalid("display name cannot be empty"));
            }
        }
        if let Some(v) = &update.content_kind {
            if v.parse::<mime::Mime>().is_err() {
                return Err(Error::invalid(format!("content kind {:?} is not a MIME type", v)));
            }
        }
        let mut update = update.clone();
        update.pin_state = None;

        let _guard = self.locks.lock(identifier);
        let r = self.index.update(identifier, &update)?;
        debug!("updated metadata of {}", identifier);
        Ok(r.with_hint(&self.gateway))
    }

    /// Remove a record from the index and, if asked, release the pin on its content.
    ///
    /// Unpinning is advisory: its failure is logged and the removal still succeeds.
    pub fn remove(&self, identifier: &str, also_unpin: bool) -> Result<()> {
        let _guard = self.locks.lock(identifier);
        self.index.get(identifier)?;
        match self.index.delete(identifier) {
            Ok(_) => {},
            Err(Error::NotFound { .. }) => debug!("{} already gone from index", identifier),
            Err(e) => return Err(e),
        }
        info!("removed {} from index", identifier);
        if also_unpin {
            if let Err(e) = self.store.unpin(identifier) {
                warn!("unpin of removed {} failed: {}", identifier, e);
            }
        }
        Ok(())
    }

    /// Search local metadata only; works while the content store is down.
    pub fn search(&self, query: &str, offset: usize, limit: usize) -> Result<Page> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::invalid("search query cannot be empty"));
        }
        let page = self.index.search(query, offset, limit.min(self.config.max_page))?;
        Ok(self.with_hints(page))
    }

    pub fn list(&self, offset: usize, limit: usize) -> Result<Page> {
        let page = self.index.list(offset, limit.min(self.config.max_page))?;
        Ok(self.with_hints(page))
    }

    pub fn info(&self, identifier: &str) -> Result<ContentRecord> {
        Ok(self.index.get(identifier)?.with_hint(&self.gateway))
    }

    /// Pin the content of an indexed identifier and record the new pin state.
    pub fn pin(&self, identifier: &str) -> Result<ContentRecord> {
        self.set_pin(identifier, PinState::Pinned)
    }

    /// Release the pin on the content of an indexed identifier and record the new pin state.
    pub fn unpin(&self, identifier: &str) -> Result<ContentRecord> {
        self.set_pin(identifier, PinState::Unpinned)
    }

    fn set_pin(&self, identifier: &str, state: PinState) -> Result<ContentRecord> {
        let _guard = self.locks.lock(identifier);
        self.index.get(identifier)?;
        match state {
            PinState::Pinned => self.store.pin(identifier)?,
            _ => self.store.unpin(identifier)?,
        };
        let r = self.index.update(identifier, &RecordUpdate::pin_state(state))?;
        info!("{} is now {}", identifier, state);
        Ok(r.with_hint(&self.gateway))
    }

    pub fn stats(&self) -> Result<IndexStats> {
        self.index.stats()
    }

    pub fn health(&self) -> Result<Health> {
        let records = self.index.stats()?.records;
        let (backend_reachable, backend_error) = match self.store.ping() {
            Ok(_) => (true, None),
            Err(e) => {
                warn!("content store health check failed: {}", e);
                (false, Some(e.to_string()))
            },
        };
        Ok(Health {
            backend_reachable,
            backend_error,
            records,
        })
    }

    fn with_hints(&self, mut page: Page) -> Page {
        page.records = page.records.into_iter()
            .map(|r| r.with_hint(&self.gateway))
            .collect();
        page
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::io::Read;
    use std::sync::Arc;
    use std::thread;

    use tempfile::tempdir;

    use super::{
        Coordinator,
        CoordinatorConfig,
    };
    use crate::error::{
        Error,
        ErrorKind,
        Layer,
    };
    use crate::index::{
        DirIndex,
        MemoryIndex,
        MetadataIndex,
    };
    use crate::record::{
        NewRecord,
        PinState,
        RecordUpdate,
    };
    use crate::store::{
        ContentStore,
        LocalStore,
    };
    use crate::testing::{
        FailingIndex,
        FlakyStore,
    };

    fn named(name: &str) -> NewRecord {
        NewRecord {
            original_name: Some(String::from(name)),
            ..NewRecord::default()
        }
    }

    fn setup() -> (Arc<Coordinator>, Arc<FlakyStore>, Arc<MemoryIndex>) {
        let store = Arc::new(FlakyStore::new());
        let index = Arc::new(MemoryIndex::default());
        let c = Coordinator::new(index.clone(), store.clone(), CoordinatorConfig::default());
        (Arc::new(c), store, index)
    }

    fn read_all(c: &Coordinator, id: &str) -> Vec<u8> {
        let mut r = c.retrieve(id).unwrap();
        let mut v = vec!();
        r.content.read_to_end(&mut v).unwrap();
        v
    }

    #[test]
    fn test_round_trip() {
        let (c, _, _) = setup();
        for b in [&b""[..], &b"abc"[..], &[0u8, 255, 7, 0][..]] {
            let r = c.ingest(b, NewRecord::default()).unwrap();
            assert_eq!(r.size_bytes, b.len() as u64);
            assert_eq!(read_all(&c, &r.identifier), b.to_vec());
        }
    }

    #[test]
    fn test_ingest_record() {
        let (c, store, _) = setup();
        let meta = NewRecord {
            original_name: Some(String::from("quarterly-report.pdf")),
            content_kind: Some(String::from("application/pdf")),
            tags: vec!(String::from("finance")),
            ..NewRecord::default()
        };
        let r = c.ingest(b"abc", meta).unwrap();
        assert_eq!(r.display_name, "quarterly-report.pdf");
        assert_eq!(r.content_kind, "application/pdf");
        assert_eq!(r.pin_state, PinState::Pinned);
        assert_eq!(r.retrieval_hint, format!("http://127.0.0.1:8080/ipfs/{}", r.identifier));
        assert!(store.is_pinned(&r.identifier));
    }

    #[test]
    fn test_scenario_ingest_retrieve_remove() {
        let (c, store, _) = setup();
        let r = c.ingest(b"abc", named("abc.txt")).unwrap();
        let q1 = r.identifier;
        assert_eq!(read_all(&c, &q1), b"abc".to_vec());

        c.remove(&q1, true).unwrap();
        assert!(!store.is_pinned(&q1));
        match c.retrieve(&q1) {
            Err(Error::NotFound { layer, .. }) => assert_eq!(layer, Layer::Index),
            Err(e) => panic!("expected not found, got {}", e),
            Ok(_) => panic!("expected not found"),
        }
        assert_eq!(c.remove(&q1, true).unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_duplicate_ingest() {
        let (c, _, index) = setup();
        let a = c.ingest(b"abc", named("a.txt")).unwrap();
        let b = c.ingest(b"abc", named("b.txt")).unwrap();
        assert_eq!(a.identifier, b.identifier);
        assert_eq!(a.created_at, b.created_at);
        assert_eq!(a.size_bytes, b.size_bytes);
        assert_eq!(a.updated_at, b.updated_at);
        assert_eq!(b.display_name, "a.txt");
        assert_eq!(index.list(0, 10).unwrap().total, 1);
    }

    #[test]
    fn test_concurrent_duplicate_ingest() {
        let (c, _, index) = setup();
        let mut handles = vec!();
        for i in 0..8 {
            let c = c.clone();
            handles.push(thread::spawn(move || c.ingest(b"same", named(&format!("{}.txt", i))).unwrap()));
        }
        let records: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let ids: HashSet<_> = records.iter().map(|r| r.identifier.clone()).collect();
        let created: HashSet<_> = records.iter().map(|r| r.created_at).collect();
        assert_eq!(ids.len(), 1);
        assert_eq!(created.len(), 1);
        assert_eq!(index.list(0, 10).unwrap().total, 1);
        assert!(c.locks().is_empty());
    }

    #[test]
    fn test_pin_failure_does_not_fail_ingest() {
        let (c, store, _) = setup();
        store.fail_pins(true);
        let r = c.ingest(b"abc", NewRecord::default()).unwrap();
        assert_eq!(r.pin_state, PinState::Unknown);
        assert_eq!(read_all(&c, &r.identifier), b"abc".to_vec());
    }

    #[test]
    fn test_add_failure_indexes_nothing() {
        let (c, store, index) = setup();
        store.fail_next(1);
        assert_eq!(c.ingest(b"abc", NewRecord::default()).unwrap_err().kind(), ErrorKind::BackendUnavailable);
        assert_eq!(index.list(0, 10).unwrap().total, 0);
    }

    #[test]
    fn test_index_failure_compensates() {
        let store = Arc::new(FlakyStore::new());
        let index = Arc::new(FailingIndex::new());
        let c = Coordinator::new(index.clone(), store.clone(), CoordinatorConfig::default());
        index.fail_writes(true);

        let e = c.ingest(b"abc", NewRecord::default()).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::IndexWriteFailed);
        let id = e.identifier().unwrap().to_string();
        assert!(store.contains(&id));
        assert!(!store.is_pinned(&id));
        assert_eq!(c.retrieve(&id).err().unwrap().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_content_missing() {
        let (c, store, index) = setup();
        let r = c.ingest(b"abc", NewRecord::default()).unwrap();
        store.forget(&r.identifier);
        match c.retrieve(&r.identifier) {
            Err(Error::ContentMissing { identifier }) => assert_eq!(identifier, r.identifier),
            Err(e) => panic!("expected content missing, got {}", e),
            Ok(_) => panic!("expected content missing"),
        }
        let after = index.get(&r.identifier).unwrap();
        assert_eq!(after.pin_state, PinState::Unknown);
    }

    #[test]
    fn test_stat() {
        let (c, store, index) = setup();
        let r = c.ingest(b"abcd", NewRecord::default()).unwrap();
        let st = c.stat(&r.identifier).unwrap();
        assert_eq!(st.size_bytes, 4);
        assert_eq!(st.pin_state, PinState::Pinned);

        let calls = store.calls();
        assert_eq!(c.stat("Q9").unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(store.calls(), calls);

        store.forget(&r.identifier);
        assert_eq!(c.stat(&r.identifier).unwrap_err().kind(), ErrorKind::ContentMissing);
        assert_eq!(index.get(&r.identifier).unwrap().pin_state, PinState::Unknown);

        store.add(b"abcd").unwrap();
        store.fail_next(1);
        assert_eq!(c.stat(&r.identifier).unwrap_err().kind(), ErrorKind::BackendUnavailable);
    }

    #[test]
    fn test_remove_survives_unpin_failure() {
        let (c, store, index) = setup();
        let r = c.ingest(b"abc", NewRecord::default()).unwrap();
        store.fail_pins(true);
        c.remove(&r.identifier, true).unwrap();
        assert_eq!(index.get(&r.identifier).unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_remove_keeps_pin_by_default() {
        let (c, store, _) = setup();
        let r = c.ingest(b"abc", NewRecord::default()).unwrap();
        c.remove(&r.identifier, false).unwrap();
        assert!(store.is_pinned(&r.identifier));
    }

    #[test]
    fn test_update_metadata() {
        let (c, store, _) = setup();
        let r = c.ingest(b"abc", named("a.txt")).unwrap();
        let calls = store.calls();
        let u = RecordUpdate {
            display_name: Some(String::from("renamed.txt")),
            tags: Some(vec!(String::from("x"))),
            pin_state: Some(PinState::Unpinned),
            ..RecordUpdate::default()
        };
        let r2 = c.update_metadata(&r.identifier, &u).unwrap();
        assert_eq!(r2.display_name, "renamed.txt");
        assert_eq!(r2.pin_state, PinState::Pinned);
        assert_eq!(r2.size_bytes, r.size_bytes);
        assert_eq!(r2.created_at, r.created_at);
        assert_eq!(store.calls(), calls);

        let empty = RecordUpdate {
            display_name: Some(String::from("  ")),
            ..RecordUpdate::default()
        };
        assert_eq!(c.update_metadata(&r.identifier, &empty).unwrap_err().kind(), ErrorKind::InvalidInput);
        assert_eq!(c.update_metadata("nope", &u).unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_concurrent_updates_linearized() {
        let (c, _, _) = setup();
        let r = c.ingest(b"abc", NewRecord::default()).unwrap();
        let mut handles = vec!();
        for i in 0..16 {
            let c = c.clone();
            let id = r.identifier.clone();
            handles.push(thread::spawn(move || {
                let tag = format!("tag-{}", i);
                let u = RecordUpdate {
                    tags: Some(vec!(tag.clone(), tag.clone())),
                    description: Some(tag),
                    ..RecordUpdate::default()
                };
                c.update_metadata(&id, &u).unwrap();
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        let last = c.info(&r.identifier).unwrap();
        let desc = last.description.clone().unwrap();
        assert_eq!(last.tags, vec!(desc.clone(), desc));
    }

    #[test]
    fn test_concurrent_remove_and_update() {
        let (c, _, index) = setup();
        let r = c.ingest(b"abc", NewRecord::default()).unwrap();
        let c1 = c.clone();
        let id1 = r.identifier.clone();
        let t = thread::spawn(move || c1.remove(&id1, false));
        let u = RecordUpdate {
            description: Some(String::from("late")),
            ..RecordUpdate::default()
        };
        let updated = c.update_metadata(&r.identifier, &u);
        t.join().unwrap().unwrap();
        if let Err(e) = updated {
            assert_eq!(e.kind(), ErrorKind::NotFound);
        }
        assert_eq!(index.get(&r.identifier).unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_search_and_list() {
        let (c, store, _) = setup();
        c.ingest(b"1", named("quarterly-report.pdf")).unwrap();
        c.ingest(b"2", named("holiday.png")).unwrap();
        store.fail_next(100);
        assert_eq!(c.search("report", 0, 10).unwrap().total, 1);
        assert_eq!(c.search("REPORT", 0, 10).unwrap().total, 1);
        assert_eq!(c.search("xyz", 0, 10).unwrap().total, 0);
        assert_eq!(c.search(" ", 0, 10).unwrap_err().kind(), ErrorKind::InvalidInput);
        let page = c.list(0, 1000).unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.limit, 100);
        assert!(page.records.iter().all(|r| !r.retrieval_hint.is_empty()));
    }

    #[test]
    fn test_ingest_policy() {
        let store = Arc::new(FlakyStore::new());
        let index = Arc::new(MemoryIndex::default());
        let config = CoordinatorConfig {
            max_size: 4,
            allowed_extensions: Some(vec!(String::from("txt"))),
            ..CoordinatorConfig::default()
        };
        let c = Coordinator::new(index, store.clone(), config);
        assert_eq!(c.ingest(b"too long", named("a.txt")).unwrap_err().kind(), ErrorKind::InvalidInput);
        assert_eq!(c.ingest(b"abc", named("a.exe")).unwrap_err().kind(), ErrorKind::InvalidInput);
        assert_eq!(store.calls(), 0);
        c.ingest(b"abc", named("A.TXT")).unwrap();
        c.ingest(b"abcd", NewRecord::default()).unwrap();
    }

    #[test]
    fn test_explicit_pin_unpin() {
        let (c, store, _) = setup();
        let r = c.ingest(b"abc", NewRecord::default()).unwrap();
        let r = c.unpin(&r.identifier).unwrap();
        assert_eq!(r.pin_state, PinState::Unpinned);
        assert!(!store.is_pinned(&r.identifier));
        let r = c.pin(&r.identifier).unwrap();
        assert_eq!(r.pin_state, PinState::Pinned);
        assert!(store.is_pinned(&r.identifier));

        store.fail_pins(true);
        assert_eq!(c.unpin(&r.identifier).unwrap_err().kind(), ErrorKind::BackendUnavailable);
        assert_eq!(c.info(&r.identifier).unwrap().pin_state, PinState::Pinned);
        assert_eq!(c.pin("nope").unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_health_and_stats() {
        let (c, store, _) = setup();
        c.ingest(b"abc", NewRecord::default()).unwrap();
        let h = c.health().unwrap();
        assert!(h.backend_reachable);
        assert_eq!(h.records, 1);
        store.fail_next(1);
        let h = c.health().unwrap();
        assert!(!h.backend_reachable);
        assert!(h.backend_error.is_some());
        let st = c.stats().unwrap();
        assert_eq!(st.total_bytes, 3);
        assert_eq!(st.pinned, 1);
    }

    #[test]
    fn test_durable_local_stack() {
        let d = tempdir().unwrap();
        let store_dir = d.path().join("store");
        let index_dir = d.path().join("index");
        let id = {
            let store = Arc::new(LocalStore::open(&store_dir).unwrap());
            let index = Arc::new(DirIndex::open(&index_dir, 100, None).unwrap());
            let c = Coordinator::new(index, store.clone(), CoordinatorConfig::default());
            let r = c.ingest(b"foo", named("foo.txt")).unwrap();
            assert_eq!(r.identifier, "2c26b46b68ffc68ff99b453c1d30413413422d706483bfa0f98a5e886266e7ae");
            assert_eq!(store.stat(&r.identifier).unwrap().pin_state, PinState::Pinned);
            r.identifier
        };
        let store = Arc::new(LocalStore::open(&store_dir).unwrap());
        let index = Arc::new(DirIndex::open(&index_dir, 100, None).unwrap());
        let c = Coordinator::new(index, store, CoordinatorConfig::default());
        assert_eq!(read_all(&c, &id), b"foo".to_vec());
        assert_eq!(c.info(&id).unwrap().display_name, "foo.txt");
    }
}
