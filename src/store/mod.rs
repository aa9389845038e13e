//! Narrow contract towards the external content-addressed backend.
//!
//! Identifiers are produced by the backend and never parsed or constructed locally.
use std::io::Read;

use serde::Serialize;

use crate::error::Result;
use crate::record::PinState;

pub mod ipfs;
pub mod local;
pub mod retry;

pub use ipfs::IpfsStore;
pub use local::LocalStore;
pub use retry::{
    RetryPolicy,
    RetryingStore,
};

/// Lazily produced, finite byte stream. Consumed once; a new fetch is needed to read again.
pub type ContentReader = Box<dyn Read + Send>;

/// What the backend reports about an identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StoreStat {
    pub size_bytes: u64,
    pub pin_state: PinState,
}

pub trait ContentStore: Send + Sync {
    /// Store `data` and return its identifier. Either an identifier is returned or nothing was
    /// stored.
    fn add(&self, data: &[u8]) -> Result<String>;

    fn fetch(&self, identifier: &str) -> Result<ContentReader>;

    /// Idempotent.
    fn pin(&self, identifier: &str) -> Result<()>;

    /// Idempotent.
    fn unpin(&self, identifier: &str) -> Result<()>;

    fn stat(&self, identifier: &str) -> Result<StoreStat>;

    /// Identifiers currently pinned by the backend.
    fn pins(&self) -> Result<Vec<String>>;

    /// Connectivity check.
    fn ping(&self) -> Result<()> {
        Ok(())
    }
}

impl<S: ContentStore + ?Sized> ContentStore for std::sync::Arc<S> {
    fn add(&self, data: &[u8]) -> Result<String> {
        (**self).add(data)
    }

    fn fetch(&self, identifier: &str) -> Result<ContentReader> {
        (**self).fetch(identifier)
    }

    fn pin(&self, identifier: &str) -> Result<()> {
        (**self).pin(identifier)
    }

    fn unpin(&self, identifier: &str) -> Result<()> {
        (**self).unpin(identifier)
    }

    fn stat(&self, identifier: &str) -> Result<StoreStat> {
        (**self).stat(identifier)
    }

    fn pins(&self) -> Result<Vec<String>> {
        (**self).pins()
    }

    fn ping(&self) -> Result<()> {
        (**self).ping()
    }
}
