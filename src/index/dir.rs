//! Durable index kept as one JSON document per record in a directory.
//!
//! The document for a record is stored under the hex encoding of the identifier bytes with a
//! postfix '.json', so identifiers never need to be interpreted to derive a safe file name.
//!
//! Documents are written to a tempfile in the same directory and moved into place, so a crash
//! never leaves a half-written record behind. All records are loaded into memory when the index
//! is opened; reads never touch the disk.
use std::fs::{
    self,
    read,
};
use std::io::{
    self,
    Write,
};
use std::path::{
    Path,
    PathBuf,
};
use std::sync::RwLock;

use tempfile::NamedTempFile;

use log::{
    debug,
    info,
    warn,
};

use crate::error::{
    Error,
    Result,
};
use crate::index::{
    IndexStats,
    MetadataIndex,
    Page,
    Table,
};
use crate::record::{
    ContentRecord,
    RecordUpdate,
};

const RECORD_EXT: &str = "json";

pub struct DirIndex {
    path: PathBuf,
    table: RwLock<Table>,
    max_records: Option<usize>,
}

fn record_path(path: &Path, identifier: &str) -> PathBuf {
    let mut p = path.join(hex::encode(identifier.as_bytes()));
    p.set_extension(RECORD_EXT);
    p
}

fn write_record(path: &Path, record: &ContentRecord) -> io::Result<()> {
    let data = serde_json::to_vec_pretty(record)?;
    let mut f = NamedTempFile::new_in(path)?;
    f.write_all(&data)?;
    f.as_file().sync_all()?;
    f.persist(record_path(path, &record.identifier)).map_err(|e| e.error)?;
    debug!("wrote index record {}", &record.identifier);
    Ok(())
}

fn read_record(p: &Path) -> std::result::Result<ContentRecord, String> {
    let data = read(p).map_err(|e| e.to_string())?;
    let r: ContentRecord = serde_json::from_slice(&data).map_err(|e| e.to_string())?;
    let expect = record_path(p.parent().unwrap_or(p), &r.identifier);
    if expect.file_name() != p.file_name() {
        return Err(format!("record for {} stored under wrong name", &r.identifier));
    }
    Ok(r)
}

impl DirIndex {
    /// Open the index stored in `path`, creating the directory if needed.
    ///
    /// # Arguments
    ///
    /// * `path` - Index directory.
    /// * `max_page` - Upper bound for listing and search page sizes.
    /// * `max_records` - Capacity; inserts beyond it fail as index write failures.
    pub fn open(path: &Path, max_page: usize, max_records: Option<usize>) -> Result<DirIndex> {
        if let Err(e) = fs::create_dir_all(path) {
            return Err(Error::index_storage(format!("cannot create {}: {}", path.display(), e)));
        }
        let mut table = Table::new(max_page);
        let entries = match fs::read_dir(path) {
            Ok(v) => v,
            Err(e) => return Err(Error::index_storage(format!("cannot read {}: {}", path.display(), e))),
        };
        for entry in entries {
            let p = match entry {
                Ok(v) => v.path(),
                Err(e) => {
                    warn!("skipping unreadable index entry: {}", e);
                    continue;
                },
            };
            if p.extension().and_then(|v| v.to_str()) != Some(RECORD_EXT) {
                continue;
            }
            match read_record(&p) {
                Ok(r) => table.load(r),
                Err(e) => warn!("skipping corrupt index record {:?}: {}", p, e),
            }
        }
        info!("loaded {} index records from {}", table.len(), path.display());
        Ok(DirIndex {
            path: path.to_path_buf(),
            table: RwLock::new(table),
            max_records,
        })
    }
}

impl MetadataIndex for DirIndex {
    fn insert(&self, record: ContentRecord) -> Result<ContentRecord> {
        let mut table = self.table.write().unwrap_or_else(|e| e.into_inner());
        if table.contains(&record.identifier) {
            return table.insert(record);
        }
        if let Some(max) = self.max_records {
            if table.len() >= max {
                return Err(Error::index_write(&record.identifier, format!("index full ({} records)", max)));
            }
        }
        let mut record = record;
        record.retrieval_hint = String::new();
        if let Err(e) = write_record(&self.path, &record) {
            return Err(Error::index_write(&record.identifier, e));
        }
        table.insert(record)
    }

    fn get(&self, identifier: &str) -> Result<ContentRecord> {
        self.table.read().unwrap_or_else(|e| e.into_inner()).get(identifier)
    }

    fn update(&self, identifier: &str, update: &RecordUpdate) -> Result<ContentRecord> {
        let mut table = self.table.write().unwrap_or_else(|e| e.into_inner());
        let r = table.updated(identifier, update)?;
        if let Err(e) = write_record(&self.path, &r) {
            return Err(Error::index_write(identifier, e));
        }
        table.load(r.clone());
        Ok(r)
    }

    fn delete(&self, identifier: &str) -> Result<()> {
        let mut table = self.table.write().unwrap_or_else(|e| e.into_inner());
        table.get(identifier)?;
        match fs::remove_file(record_path(&self.path, identifier)) {
            Ok(_) => {},
            Err(e) if e.kind() == io::ErrorKind::NotFound => {},
            Err(e) => return Err(Error::index_write(identifier, e)),
        }
        table.remove(identifier)?;
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
