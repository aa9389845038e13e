#![crate_name = "cidx"]

//! cidx is a content-addressed storage gateway.
//!
//! Uploaded content is handed to a content store, which derives the identifier from the content
//! itself: the same bytes always yield the same identifier. Alongside, cidx keeps a local
//! metadata index with a descriptive record per identifier, so content can be listed, searched
//! and annotated without asking the content store.
//!
//! The two sides fail independently. The [coordinator](crate::coordinator) orders every
//! operation so that whatever the index returns is either retrievable or marked for
//! reconciliation, and the [sweep](crate::sweep) periodically brings the index back in line
//! with what the content store actually holds.
//!
//! ## Content stores
//!
//! By default content goes to an IPFS node through its RPC api, and the identifiers are CIDs.
//! With `--store-dir` content is instead kept in a local directory, with the SHA256 hash of the
//! content, in hex, lowercase, without a 0x prefix, as identifier.
//!
//! ## Running the daemon
//!
//! The cidx daemon will listen to all ip addresses on port 8000 by default, and keep its index
//! in `./index`. See `cargo run -- --help` for details. `RUST_LOG` controls log verbosity.
//!
//! ## Uploading content
//!
//! Content is stored by making `PUT` requests to the server. With a local store and a server
//! running on `localhost:8000`, a `PUT` with the content body `foo` can in turn be retrieved at:
//!
//! ``` ignore,
//! http://localhost:8000/2c26b46b68ffc68ff99b453c1d30413413422d706483bfa0f98a5e886266e7ae
//! ```
//!
//! See [http](crate::http) for the other routes.

/// Error taxonomy shared by all components.
pub mod error;

/// Descriptive records kept in the metadata index.
pub mod record;

/// Content kind resolution.
pub mod kind;

/// Content store clients.
pub mod store;

/// Metadata index implementations.
pub mod index;

/// Per-identifier locking.
pub mod lock;

/// Ordering of store and index operations.
pub mod coordinator;

/// Reconciliation of the index against the content store.
pub mod sweep;

/// Daemon settings.
pub mod settings;

/// HTTP front for the daemon.
pub mod http;

#[cfg(test)]
pub(crate) mod testing;

pub use coordinator::{
    Coordinator,
    CoordinatorConfig,
};
pub use error::{
    Error,
    ErrorKind,
    Result,
};
pub use record::{
    ContentRecord,
    NewRecord,
    PinState,
    RecordUpdate,
};
