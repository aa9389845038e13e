use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{
    DateTime,
    Utc,
};
use serde::{
    Deserialize,
    Serialize,
};

/// Pin status of content as last confirmed with the content store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PinState {
    Pinned,
    Unpinned,
    /// Not confirmed with the content store yet, or the store failed to produce the content.
    Unknown,
}

impl fmt::Display for PinState {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PinState::Pinned => fmt.write_str("pinned"),
            PinState::Unpinned => fmt.write_str("unpinned"),
            PinState::Unknown => fmt.write_str("unknown"),
        }
    }
}

#[derive(Debug, PartialEq)]
pub struct PinStateError;

impl fmt::Display for PinStateError {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str("pin state must be one of pinned, unpinned, unknown")
    }
}

impl std::error::Error for PinStateError {}

impl FromStr for PinState {
    type Err = PinStateError;

    fn from_str(s: &str) -> Result<PinState, PinStateError> {
        match s.to_ascii_lowercase().as_str() {
            "pinned" => Ok(PinState::Pinned),
            "unpinned" => Ok(PinState::Unpinned),
            "unknown" => Ok(PinState::Unknown),
            _ => Err(PinStateError),
        }
    }
}

/// Everything the index knows about one stored object.
///
/// The identifier is produced by the content store and treated as an opaque string. `size_bytes`
/// and `created_at` are fixed at ingest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentRecord {
    pub identifier: String,
    pub display_name: String,
    pub original_name: String,
    pub size_bytes: u64,
    pub content_kind: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub pin_state: PinState,
    /// Gateway locator, regenerated from configuration on every read. Never authoritative.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub retrieval_hint: String,
}

impl ContentRecord {
    pub fn new(identifier: &str, meta: &NewRecord, size_bytes: u64, pin_state: PinState, now: DateTime<Utc>) -> ContentRecord {
        let original_name = match &meta.original_name {
            Some(v) if !v.trim().is_empty() => v.trim().to_string(),
            _ => String::from("unnamed"),
        };
        let display_name = match &meta.display_name {
            Some(v) if !v.trim().is_empty() => v.trim().to_string(),
            _ => original_name.clone(),
        };
        ContentRecord {
            identifier: identifier.to_string(),
            display_name,
            original_name,
            size_bytes,
            content_kind: meta.content_kind.clone().unwrap_or_else(|| String::from(mime::APPLICATION_OCTET_STREAM.as_ref())),
            description: meta.description.clone().filter(|v| !v.is_empty()),
            tags: clean_tags(&meta.tags),
            created_at: now,
            updated_at: now,
            pin_state,
            retrieval_hint: String::new(),
        }
    }

    /// Case-insensitive substring match over display name, description and tags.
    ///
    /// `needle` must already be lowercase.
    pub fn matches(&self, needle: &str) -> bool {
        if self.display_name.to_lowercase().contains(needle) {
            return true;
        }
        if let Some(v) = &self.description {
            if v.to_lowercase().contains(needle) {
                return true;
            }
        }
        self.tags.iter().any(|t| t.to_lowercase().contains(needle))
    }

    pub fn with_hint(mut self, gateway: &Gateway) -> ContentRecord {
        self.retrieval_hint = gateway.hint_for(&self.identifier);
        self
    }
}

/// Listing order: newest first, ties broken by identifier ascending.
pub fn listing_order(a: &ContentRecord, b: &ContentRecord) -> Ordering {
    b.created_at.cmp(&a.created_at).then_with(|| a.identifier.cmp(&b.identifier))
}

fn clean_tags(tags: &[String]) -> Vec<String> {
    tags.iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}

/// Caller-supplied metadata for an ingest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewRecord {
    pub display_name: Option<String>,
    pub original_name: Option<String>,
    pub content_kind: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Partial update of the mutable fields of a record. `None` leaves a field untouched.
///
/// An empty `description` clears it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordUpdate {
    pub display_name: Option<String>,
    pub original_name: Option<String>,
    pub content_kind: Option<String>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
    pub pin_state: Option<PinState>,
}

impl RecordUpdate {
    pub fn pin_state(state: PinState) -> RecordUpdate {
        RecordUpdate {
            pin_state: Some(state),
            ..RecordUpdate::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &RecordUpdate::default()
    }

    /// Apply the update to `record` and bump its `updated_at`.
    pub fn apply(&self, record: &mut ContentRecord, now: DateTime<Utc>) {
        if let Some(v) = &self.display_name {
            record.display_name = v.trim().to_string();
        }
        if let Some(v) = &self.original_name {
            record.original_name = v.trim().to_string();
        }
        if let Some(v) = &self.content_kind {
            record.content_kind = v.clone();
        }
        if let Some(v) = &self.description {
            if v.is_empty() {
                record.description = None;
            } else {
                record.description = Some(v.clone());
            }
        }
        if let Some(v) = &self.tags {
            record.tags = clean_tags(v);
        }
        if let Some(v) = self.pin_state {
            record.pin_state = v;
        }
        if record.updated_at < now {
            record.updated_at = now;
        }
    }
}

/// Builds gateway-style locators of the form `<base>/<identifier>`.
#[derive(Debug, Clone)]
pub struct Gateway {
    base: String,
}

impl Gateway {
    pub fn new(base: &str) -> Gateway {
        Gateway {
            base: base.trim_end_matches('/').to_string(),
        }
    }

    pub fn hint_for(&self, identifier: &str) -> String {
        format!("{}/{}", self.base, identifier)
    }
}
