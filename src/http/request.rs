use std::io::Read;
use std::str::FromStr;

use tiny_http::{
    Method,
    Request,
};
use url::Url;

use crate::error::{
    Error,
    Result,
};
use crate::record::{
    NewRecord,
    RecordUpdate,
};

/// Page size used when the client does not ask for one.
pub const DEFAULT_LIMIT: usize = 50;

/// A client request resolved to a gateway operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    Preflight,
    Ingest,
    List {
        offset: usize,
        limit: usize,
    },
    Search {
        query: String,
        offset: usize,
        limit: usize,
    },
    Retrieve(String),
    Info(String),
    Stat(String),
    Update(String),
    Remove {
        identifier: String,
        unpin: bool,
    },
    Pin(String),
    Unpin(String),
    Health,
    Stats,
    Sweep,
}

fn number(v: &str, name: &str) -> Result<usize> {
    usize::from_str(v).map_err(|_| Error::invalid(format!("invalid {} '{}'", name, v)))
}

fn truthy(v: &str) -> bool {
    matches!(v, "1" | "true" | "yes")
}

impl Route {
    /// Resolve `method` and the local part `url` of a request. `None` if nothing is served there.
    pub fn parse(method: &Method, url: &str) -> Result<Option<Route>> {
        if method == &Method::Options {
            return Ok(Some(Route::Preflight));
        }
        let base = Url::parse("http://localhost/").map_err(|e| Error::invalid(e.to_string()))?;
        let u = base.join(url).map_err(|e| Error::invalid(format!("invalid url {}: {}", url, e)))?;

        let mut query: Option<String> = None;
        let mut offset = 0;
        let mut limit = DEFAULT_LIMIT;
        let mut unpin = false;
        for (k, v) in u.query_pairs() {
            match k.as_ref() {
                "q" => query = Some(v.into_owned()),
                "offset" => offset = number(&v, "offset")?,
                "limit" => limit = number(&v, "limit")?,
                "unpin" => unpin = truthy(&v),
                _ => {},
            }
        }

        let segments: Vec<&str> = match u.path_segments() {
            Some(v) => v.filter(|s| !s.is_empty()).collect(),
            None => vec!(),
        };

        let route = match (method, segments.as_slice()) {
            (Method::Put, []) => Route::Ingest,
            (Method::Get, []) => match query {
                Some(q) => Route::Search {
                    query: q,
                    offset,
                    limit,
                },
                None => Route::List {
                    offset,
                    limit,
                },
            },
            (Method::Get, ["_health"]) => Route::Health,
            (Method::Get, ["_stats"]) => Route::Stats,
            (Method::Post, ["_sweep"]) => Route::Sweep,
            (_, [id, ..]) if id.starts_with('_') => return Ok(None),
            (Method::Get, [id]) => Route::Retrieve(id.to_string()),
            (Method::Get, [id, "info"]) => Route::Info(id.to_string()),
            (Method::Get, [id, "stats"]) => Route::Stat(id.to_string()),
            (Method::Patch, [id]) => Route::Update(id.to_string()),
            (Method::Delete, [id]) => Route::Remove {
                identifier: id.to_string(),
                unpin,
            },
            (Method::Post, [id, "pin"]) => Route::Pin(id.to_string()),
            (Method::Delete, [id, "pin"]) => Route::Unpin(id.to_string()),
            _ => return Ok(None),
        };
        Ok(Some(route))
    }
}

fn header_value(req: &Request, name: &'static str) -> Option<String> {
    req.headers().iter()
        .find(|h| h.field.equiv(name))
        .map(|h| h.value.as_str().trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Ingest metadata from the request headers.
pub fn new_record(req: &Request) -> NewRecord {
    let tags = match header_value(req, "X-Tags") {
        Some(v) => v.split(',').map(String::from).collect(),
        None => vec!(),
    };
    NewRecord {
        display_name: None,
        original_name: header_value(req, "X-Filename"),
        content_kind: header_value(req, "Content-Type"),
        description: header_value(req, "X-Description"),
        tags,
    }
}

/// Read the request body, refusing more than `max` bytes.
pub fn body(req: &mut Request, max: u64) -> Result<Vec<u8>> {
    if let Some(v) = req.body_length() {
        if v as u64 > max {
            return Err(Error::invalid(format!("payload of {} bytes exceeds limit of {} bytes", v, max)));
        }
    }
    let mut data = vec!();
    let f = req.as_reader();
    if let Err(e) = f.take(max.saturating_add(1)).read_to_end(&mut data) {
        return Err(Error::invalid(format!("cannot read request body: {}", e)));
    }
    if data.len() as u64 > max {
        return Err(Error::invalid(format!("payload exceeds limit of {} bytes", max)));
    }
    Ok(data)
}

/// Metadata update from a JSON request body.
pub fn record_update(data: &[u8]) -> Result<RecordUpdate> {
    serde_json::from_slice(data).map_err(|e| Error::invalid(format!("invalid update: {}", e)))
}
