use std::fmt;

use thiserror::Error;

/// The layer that reported an identifier as absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    Index,
    Backend,
}

impl fmt::Display for Layer {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Layer::Index => fmt.write_str("index"),
            Layer::Backend => fmt.write_str("backend"),
        }
    }
}

/// Fieldless mirror of [Error](crate::error::Error), for callers that map failures onto their own
/// status vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    BackendUnavailable,
    BackendRejected,
    NotFound,
    ContentMissing,
    DuplicateIdentifier,
    IndexWriteFailed,
    InvalidInput,
    SweepBusy,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("content store unavailable{}: {cause}", for_id(.identifier))]
    BackendUnavailable {
        identifier: Option<String>,
        cause: String,
    },

    #[error("content store rejected request{}: {cause}", for_id(.identifier))]
    BackendRejected {
        identifier: Option<String>,
        cause: String,
    },

    #[error("{identifier} not found in {layer}")]
    NotFound {
        identifier: String,
        layer: Layer,
    },

    #[error("{identifier} is indexed but the content store cannot produce it")]
    ContentMissing {
        identifier: String,
    },

    #[error("{identifier} already indexed")]
    DuplicateIdentifier {
        identifier: String,
    },

    #[error("index write failed{}: {cause}", for_id(.identifier))]
    IndexWriteFailed {
        identifier: Option<String>,
        cause: String,
    },

    #[error("invalid input: {reason}")]
    InvalidInput {
        reason: String,
    },

    #[error("reconciliation sweep already running")]
    SweepBusy,
}

fn for_id(identifier: &Option<String>) -> String {
    match identifier {
        Some(v) => format!(" for {}", v),
        None => String::new(),
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::BackendUnavailable { .. } => ErrorKind::BackendUnavailable,
            Error::BackendRejected { .. } => ErrorKind::BackendRejected,
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::ContentMissing { .. } => ErrorKind::ContentMissing,
            Error::DuplicateIdentifier { .. } => ErrorKind::DuplicateIdentifier,
            Error::IndexWriteFailed { .. } => ErrorKind::IndexWriteFailed,
            Error::InvalidInput { .. } => ErrorKind::InvalidInput,
            Error::SweepBusy => ErrorKind::SweepBusy,
        }
    }

    /// Only connectivity failures towards the content store are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::BackendUnavailable
    }

    /// The identifier the failure concerns, if any.
    pub fn identifier(&self) -> Option<&str> {
        match self {
            Error::BackendUnavailable { identifier, .. } => identifier.as_deref(),
            Error::BackendRejected { identifier, .. } => identifier.as_deref(),
            Error::NotFound { identifier, .. } => Some(identifier),
            Error::ContentMissing { identifier } => Some(identifier),
            Error::DuplicateIdentifier { identifier } => Some(identifier),
            Error::IndexWriteFailed { identifier, .. } => identifier.as_deref(),
            Error::InvalidInput { .. } => None,
            Error::SweepBusy => None,
        }
    }

    pub(crate) fn unavailable(identifier: Option<&str>, cause: impl fmt::Display) -> Error {
        Error::BackendUnavailable {
            identifier: identifier.map(String::from),
            cause: cause.to_string(),
        }
    }

    pub(crate) fn rejected(identifier: Option<&str>, cause: impl fmt::Display) -> Error {
        Error::BackendRejected {
            identifier: identifier.map(String::from),
            cause: cause.to_string(),
        }
    }

    pub(crate) fn not_found(identifier: &str, layer: Layer) -> Error {
        Error::NotFound {
            identifier: identifier.to_string(),
            layer,
        }
    }

    pub(crate) fn index_write(identifier: &str, cause: impl fmt::Display) -> Error {
        Error::IndexWriteFailed {
            identifier: Some(identifier.to_string()),
            cause: cause.to_string(),
        }
    }

    /// Index storage failure not tied to a single record.
    pub(crate) fn index_storage(cause: impl fmt::Display) -> Error {
        Error::IndexWriteFailed {
            identifier: None,
            cause: cause.to_string(),
        }
    }

    pub(crate) fn invalid(reason: impl Into<String>) -> Error {
        Error::InvalidInput {
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
