//! Filesystem content store.
//!
//! Content is stored under the SHA256 hash of its bytes, in hex, lowercase, without a 0x prefix.
//! The same content always yields the same identifier.
//!
//! A pin is a zero-length marker file under the same identifier with a postfix '.pin'. Unpinned
//! content stays retrievable; there is no garbage collection.
use std::fs::{
    self,
    File,
};
use std::io::{
    self,
    Read,
    Write,
};
use std::path::{
    Path,
    PathBuf,
};

use sha2::{
    Digest,
    Sha256,
};
use tempfile::NamedTempFile;

use log::{
    debug,
    info,
};

use crate::error::{
    Error,
    Layer,
    Result,
};
use crate::record::PinState;
use crate::store::{
    ContentReader,
    ContentStore,
    StoreStat,
};

const PIN_EXT: &str = "pin";

pub struct LocalStore {
    path: PathBuf,
}

impl LocalStore {
    /// Open a store rooted at `path`, creating the directory if needed.
    pub fn open(path: &Path) -> Result<LocalStore> {
        if let Err(e) = fs::create_dir_all(path) {
            return Err(Error::unavailable(None, format!("cannot create {}: {}", path.display(), e)));
        }
        Ok(LocalStore {
            path: path.to_path_buf(),
        })
    }

    fn content_path(&self, identifier: &str) -> Option<PathBuf> {
        if identifier.len() != 64 || !identifier.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()) {
            return None;
        }
        Some(self.path.join(identifier))
    }

    fn pin_path(&self, identifier: &str) -> Option<PathBuf> {
        self.content_path(identifier).map(|mut p| {
            p.set_extension(PIN_EXT);
            p
        })
    }

    fn existing(&self, identifier: &str) -> Result<PathBuf> {
        match self.content_path(identifier) {
            Some(v) if v.is_file() => Ok(v),
            _ => Err(Error::not_found(identifier, Layer::Backend)),
        }
    }
}

/// Stream `f` into a tempfile in `path` while hashing it, then move it to its content address.
///
/// # Arguments
///
/// * `path` - Absolute path to storage directory.
/// * `f` - Content source.
pub fn put_immutable(path: &Path, mut f: impl Read) -> io::Result<(String, u64)> {
    let mut of = NamedTempFile::new_in(path)?;
    debug!("writing to tempfile {:?}", of.path());
    let mut buf: [u8; 65535] = [0; 65535];
    let mut h = Sha256::new();
    let mut total_size: u64 = 0;
    loop {
        let c = f.read(&mut buf[..])?;
        if c == 0 {
            break;
        }
        total_size += c as u64;
        let data = &buf[..c];
        h.update(data);
        of.write_all(data)?;
    }
    of.flush()?;

    let hash = hex::encode(h.finalize());
    let final_path = path.join(&hash);
    if final_path.is_file() {
        debug!("content {} already stored", &hash);
    } else {
        of.persist(&final_path).map_err(|e| e.error)?;
    }
    info!("have hash {} for content of {} bytes", &hash, total_size);
    Ok((hash, total_size))
}

impl ContentStore for LocalStore {
    fn add(&self, data: &[u8]) -> Result<String> {
        match put_immutable(&self.path, data) {
            Ok((hash, _)) => Ok(hash),
            Err(e) => Err(Error::unavailable(None, e)),
        }
    }

    fn fetch(&self, identifier: &str) -> Result<ContentReader> {
        let p = self.existing(identifier)?;
        match File::open(p) {
            Ok(f) => Ok(Box::new(f)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(Error::not_found(identifier, Layer::Backend)),
            Err(e) => Err(Error::unavailable(Some(identifier), e)),
        }
    }

    fn pin(&self, identifier: &str) -> Result<()> {
        self.existing(identifier)?;
        let p = match self.pin_path(identifier) {
            Some(v) => v,
            None => return Err(Error::not_found(identifier, Layer::Backend)),
        };
        match File::create(p) {
            Ok(_) => Ok(()),
            Err(e) => Err(Error::unavailable(Some(identifier), e)),
        }
    }

    fn unpin(&self, identifier: &str) -> Result<()> {
        let p = match self.pin_path(identifier) {
            Some(v) => v,
            None => return Ok(()),
        };
        match fs::remove_file(p) {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::unavailable(Some(identifier), e)),
        }
    }

    fn stat(&self, identifier: &str) -> Result<StoreStat> {
        let p = self.existing(identifier)?;
        let meta = match fs::metadata(p) {
            Ok(v) => v,
            Err(e) => return Err(Error::unavailable(Some(identifier), e)),
        };
        let pinned = self.pin_path(identifier).map(|p| p.is_file()).unwrap_or(false);
        Ok(StoreStat {
            size_bytes: meta.len(),
            pin_state: if pinned { PinState::Pinned } else { PinState::Unpinned },
        })
    }

    fn pins(&self) -> Result<Vec<String>> {
        let entries = match fs::read_dir(&self.path) {
            Ok(v) => v,
            Err(e) => return Err(Error::unavailable(None, e)),
        };
        let mut r = vec!();
        for entry in entries {
            let p = match entry {
                Ok(v) => v.path(),
                Err(e) => return Err(Error::unavailable(None, e)),
            };
            if p.extension().and_then(|v| v.to_str()) != Some(PIN_EXT) {
                continue;
            }
            if let Some(stem) = p.file_stem().and_then(|v| v.to_str()) {
                if self.content_path(stem).map(|c| c.is_file()).unwrap_or(false) {
                    r.push(stem.to_string());
                }
            }
        }
        r.sort();
        Ok(r)
    }

    fn ping(&self) -> Result<()> {
        if self.path.is_dir() {
            return Ok(());
        }
        Err(Error::unavailable(None, format!("{} is not a directory", self.path.display())))
    }
}
