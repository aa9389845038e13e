//! Best-effort MIME classification of ingested content.
//!
//! A kind declared by the client is kept if it parses as a MIME type. No check is performed to
//! verify whether the declared type correctly describes the content.
//!
//! If no usable kind was declared and the crate is built with the `magic` feature, the content
//! itself is sniffed. Otherwise the kind is `application/octet-stream`.
use std::str::FromStr;

use mime::Mime;

use log::debug;

/// Resolve the content kind to record for `data`.
///
/// # Arguments
///
/// * `declared` - Kind declared by the client, if any.
/// * `data` - Content bytes, used for sniffing when the `magic` feature is enabled.
pub fn resolve(declared: Option<&str>, data: &[u8]) -> String {
    if let Some(v) = declared {
        match Mime::from_str(v.trim()) {
            Ok(m) => {
                return m.essence_str().to_string();
            },
            Err(e) => {
                debug!("ignoring declared content kind {:?}: {}", v, e);
            },
        }
    }
    sniff(data)
}

#[cfg(feature = "magic")]
fn sniff(data: &[u8]) -> String {
    let v = tree_magic::from_u8(data);
    debug!("sniffed content kind {}", &v);
    match Mime::from_str(&v) {
        Ok(m) => m.essence_str().to_string(),
        Err(_) => mime::APPLICATION_OCTET_STREAM.to_string(),
    }
}

#[cfg(not(feature = "magic"))]
fn sniff(_data: &[u8]) -> String {
    mime::APPLICATION_OCTET_STREAM.to_string()
}

/// Whether content of this kind is suitable for inline display.
pub fn is_inline(kind: &str) -> bool {
    match Mime::from_str(kind) {
        Ok(m) => m.type_() == mime::TEXT || m.type_() == mime::IMAGE,
        Err(_) => false,
    }
}
