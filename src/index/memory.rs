use std::sync::RwLock;

use crate::error::Result;
use crate::index::{
    IndexStats,
    MetadataIndex,
    Page,
    Table,
    DEFAULT_MAX_PAGE,
};
use crate::record::{
    ContentRecord,
    RecordUpdate,
};

/// Non-durable index, for tests and ephemeral deployments.
pub struct MemoryIndex {
    table: RwLock<Table>,
}

impl MemoryIndex {
    pub fn new(max_page: usize) -> MemoryIndex {
        MemoryIndex {
            table: RwLock::new(Table::new(max_page)),
        }
    }
}

impl Default for MemoryIndex {
    fn default() -> MemoryIndex {
        MemoryIndex::new(DEFAULT_MAX_PAGE)
    }
}

impl MetadataIndex for MemoryIndex {
    fn insert(&self, record: ContentRecord) -> Result<ContentRecord> {
        self.table.write().unwrap_or_else(|e| e.into_inner()).insert(record)
    }

    fn get(&self, identifier: &str) -> Result<ContentRecord> {
        self.table.read().unwrap_or_else(|e| e.into_inner()).get(identifier)
    }

    fn update(&self, identifier: &str, update: &RecordUpdate) -> Result<ContentRecord> {
        let mut table = self.table.write().unwrap_or_else(|e| e.into_inner());
        let r = table.updated(identifier, update)?;
        table.load(r.clone());
        Ok(r)
    }

    fn delete(&self, identifier: &str) -> Result<()> {
        self.table.write().unwrap_or_else(|e| e.into_inner()).remove(identifier)?;
        Ok(())
    }

    fn list(&self, offset: usize, limit: usize) -> Result<Page> {
        Ok(self.table.read().unwrap_or_else(|e| e.into_inner()).page(None, offset, limit))
    }

    fn search(&self, query: &str, offset: usize, limit: usize) -> Result<Page> {
        Ok(self.table.read().unwrap_or_else(|e| e.into_inner()).page(Some(query), offset, limit))
    }

    fn stats(&self) -> Result<IndexStats> {
        Ok(self.table.read().unwrap_or_else(|e| e.into_inner()).stats())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use chrono::{
        DateTime,
        Duration,
        Utc,
    };

    use super::MemoryIndex;
    use crate::error::{
        Error,
        ErrorKind,
        Layer,
    };
    use crate::index::MetadataIndex;
    use crate::record::{
        ContentRecord,
        NewRecord,
        PinState,
        RecordUpdate,
    };

    fn record_at(id: &str, name: &str, at: DateTime<Utc>) -> ContentRecord {
        let meta = NewRecord {
            display_name: Some(String::from(name)),
            ..NewRecord::default()
        };
        ContentRecord::new(id, &meta, 3, PinState::Pinned, at)
    }

    fn record(id: &str, name: &str, age: i64) -> ContentRecord {
        record_at(id, name, Utc::now() - Duration::seconds(age))
    }

    #[test]
    fn test_insert_get_duplicate() {
        let idx = MemoryIndex::default();
        idx.insert(record("Q1", "a", 0)).unwrap();
        assert_eq!(idx.get("Q1").unwrap().display_name, "a");
        match idx.insert(record("Q1", "b", 0)) {
            Err(Error::DuplicateIdentifier { identifier }) => assert_eq!(identifier, "Q1"),
            v => panic!("expected duplicate, got {:?}", v),
        }
        assert_eq!(idx.get("Q1").unwrap().display_name, "a");
        match idx.get("Q9") {
            Err(Error::NotFound { layer, .. }) => assert_eq!(layer, Layer::Index),
            v => panic!("expected not found, got {:?}", v),
        }
    }

    #[test]
    fn test_update_delete() {
        let idx = MemoryIndex::default();
        let r = idx.insert(record("Q1", "a", 10)).unwrap();
        let u = RecordUpdate {
            tags: Some(vec!(String::from("x"))),
            ..RecordUpdate::default()
        };
        let r2 = idx.update("Q1", &u).unwrap();
        assert_eq!(r2.tags, vec!(String::from("x")));
        assert!(r2.updated_at > r.updated_at);
        assert_eq!(r2.created_at, r.created_at);
        assert_eq!(idx.get("Q1").unwrap(), r2);

        assert_eq!(idx.update("Q9", &u).unwrap_err().kind(), ErrorKind::NotFound);

        idx.delete("Q1").unwrap();
        assert_eq!(idx.delete("Q1").unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(idx.get("Q1").unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_pagination_covers_all() {
        let idx = MemoryIndex::new(4);
        let now = Utc::now();
        for i in 0..11 {
            // pairs share a timestamp to exercise the identifier tie break
            let at = now - Duration::seconds((i / 2) as i64);
            idx.insert(record_at(&format!("Q{:02}", i), "f", at)).unwrap();
        }
        let mut seen = HashSet::new();
        let mut order = vec!();
        let mut offset = 0;
        loop {
            let page = idx.list(offset, 50).unwrap();
            assert_eq!(page.total, 11);
            assert!(page.records.len() <= 4);
            if page.records.is_empty() {
                break;
            }
            offset += page.records.len();
            for r in page.records {
                assert!(seen.insert(r.identifier.clone()));
                order.push(r.identifier);
            }
        }
        assert_eq!(seen.len(), 11);
        assert_eq!(order[0], "Q00");
        assert_eq!(order[1], "Q01");
        assert_eq!(order[10], "Q10");

        let again: Vec<String> = idx.list(0, 4).unwrap().records.into_iter().map(|r| r.identifier).collect();
        assert_eq!(again, order[..4].to_vec());

        let page = idx.list(100, 4).unwrap();
        assert!(page.records.is_empty());
        assert_eq!(page.total, 11);
    }

    #[test]
    fn test_search() {
        let idx = MemoryIndex::default();
        idx.insert(record("Q1", "quarterly-report.pdf", 2)).unwrap();
        let mut r = record("Q2", "notes.txt", 1);
        r.tags = vec!(String::from("Reporting"));
        idx.insert(r).unwrap();
        idx.insert(record("Q3", "cat.png", 0)).unwrap();

        let page = idx.search("report", 0, 10).unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.records[0].identifier, "Q2");
        assert_eq!(page.records[1].identifier, "Q1");
        assert_eq!(idx.search("REPORT", 0, 10).unwrap().total, 2);
        assert_eq!(idx.search("xyz", 0, 10).unwrap().total, 0);
        assert_eq!(idx.search("report", 1, 10).unwrap().records.len(), 1);
    }

    #[test]
    fn test_stats() {
        let idx = MemoryIndex::default();
        idx.insert(record("Q1", "a", 0)).unwrap();
        let mut r = record("Q2", "b", 0);
        r.pin_state = PinState::Unknown;
        idx.insert(r).unwrap();
        let st = idx.stats().unwrap();
        assert_eq!(st.records, 2);
        assert_eq!(st.total_bytes, 6);
        assert_eq!(st.pinned, 1);
        assert_eq!(st.unknown, 1);
    }
}
