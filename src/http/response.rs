use std::str::FromStr;

use ascii::AsciiString;
use log::{
    debug,
    error,
    warn,
};
use serde::Serialize;
use serde_json::json;
use tiny_http::{
    Header,
    HeaderField,
    Request,
    Response,
    StatusCode,
};

use crate::coordinator::Retrieval;
use crate::error::{
    Error,
    ErrorKind,
    Result,
};
use crate::kind;

/// What a successfully handled request answers with.
pub enum Reply {
    Json(StatusCode, String),
    Content(Retrieval),
    Empty(StatusCode),
}

impl Reply {
    pub fn json<T: Serialize>(status: u16, v: &T) -> Result<Reply> {
        match serde_json::to_string(v) {
            Ok(s) => Ok(Reply::Json(StatusCode(status), s)),
            Err(e) => Err(Error::invalid(format!("cannot encode response: {}", e))),
        }
    }
}

fn header(field: &str, value: &str) -> Option<Header> {
    let field = HeaderField::from_str(field).ok()?;
    let value = AsciiString::from_ascii(value).ok()?;
    Some(Header {
        field,
        value,
    })
}

pub fn origin_headers() -> Vec<Header> {
    let mut headers: Vec<Header> = vec!();
    let pairs = [
        ("Access-Control-Allow-Origin", String::from("*")),
        ("Access-Control-Allow-Methods", String::from("OPTIONS, PUT, GET, PATCH, POST, DELETE")),
        ("Access-Control-Allow-Headers", String::from("Content-Type,X-Filename,X-Description,X-Tags")),
        ("Server", format!("cidx/{}, tiny_http (Rust)", env!("CARGO_PKG_VERSION"))),
    ];
    for (k, v) in pairs.iter() {
        if let Some(h) = header(k, v) {
            headers.push(h);
        }
    }

    #[cfg(feature = "magic")]
    {
        if let Some(h) = header("X-Cidx-Cap", "magic") {
            headers.push(h);
        }
    };

    headers
}

pub fn status_for(e: &Error) -> StatusCode {
    let code = match e.kind() {
        ErrorKind::NotFound => 404,
        ErrorKind::ContentMissing => 502,
        ErrorKind::BackendUnavailable => 503,
        ErrorKind::BackendRejected => 502,
        ErrorKind::IndexWriteFailed => 500,
        ErrorKind::InvalidInput => 400,
        ErrorKind::DuplicateIdentifier => 409,
        ErrorKind::SweepBusy => 409,
    };
    StatusCode(code)
}

/// Quoted header parameter safe for an ascii header value.
fn quoted(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii() && !c.is_ascii_control() => c,
            _ => '_',
        })
        .collect()
}

pub fn disposition(content_kind: &str, name: &str) -> String {
    let typ = if kind::is_inline(content_kind) { "inline" } else { "attachment" };
    format!("{}; filename=\"{}\"", typ, quoted(name))
}

pub fn preflight_response(req: Request) {
    let mut res = Response::empty(StatusCode(200));
    for v in origin_headers() {
        res.add_header(v);
    }
    if let Err(e) = req.respond(res) {
        warn!("cannot answer preflight: {}", e);
    }
    debug!("served options request");
}

pub fn not_found_response(req: Request) {
    let mut res = Response::empty(StatusCode(404));
    for v in origin_headers() {
        res.add_header(v);
    }
    if let Err(e) = req.respond(res) {
        warn!("cannot answer request: {}", e);
    }
}

pub fn exec_response(req: Request, r: Result<Reply>) {
    let mut headers = origin_headers();
    let outcome = match r {
        Ok(Reply::Json(status, body)) => {
            headers.extend(header("Content-Type", "application/json"));
            let mut res = Response::from_string(body).with_status_code(status);
            for v in headers {
                res.add_header(v);
            }
            req.respond(res)
        },
        Ok(Reply::Empty(status)) => {
            let mut res = Response::empty(status);
            for v in headers {
                res.add_header(v);
            }
            req.respond(res)
        },
        Ok(Reply::Content(v)) => {
            let record = v.record;
            headers.extend(header("Content-Type", &record.content_kind));
            headers.extend(header("Content-Disposition", &disposition(&record.content_kind, &record.display_name)));
            let size = usize::try_from(record.size_bytes).ok();
            let res = Response::new(StatusCode(200), headers, v.content, size, None);
            req.respond(res)
        },
        Err(e) => {
            let status = status_for(&e);
            if status.0 >= 500 {
                error!("{} {}: {}", req.method(), req.url(), e);
            } else {
                debug!("{} {}: {}", req.method(), req.url(), e);
            }
            let body = json!({
                "error": format!("{:?}", e.kind()),
                "message": e.to_string(),
            });
            headers.extend(header("Content-Type", "application/json"));
            let mut res = Response::from_string(body.to_string()).with_status_code(status);
            for v in headers {
                res.add_header(v);
            }
            req.respond(res)
        },
    };
    if let Err(e) = outcome {
        warn!("cannot send response: {}", e);
    }
}
