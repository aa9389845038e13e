//! Client for the HTTP RPC interface of a Kubo-compatible IPFS daemon.
//!
//! Every call is a `POST` to `<api>/api/v0/<command>`. Failures are mapped as follows:
//!
//! * connection failures and timeouts are reported as unavailable and may be retried
//! * error responses whose message says the content is absent are reported as not found
//! * any other error response is a rejection
use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;
use sha2::{
    Digest,
    Sha256,
};
use ureq::{
    Agent,
    AgentBuilder,
};
use url::Url;

use log::debug;

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

const ABSENT_MARKERS: [&str; 3] = [
    "not found",
    "no link named",
    "not pinned",
];

#[derive(Deserialize)]
struct RpcError {
    #[serde(rename = "Message")]
    message: String,
}

#[derive(Deserialize)]
struct AddResponse {
    #[serde(rename = "Hash")]
    hash: String,
}

#[derive(Deserialize)]
struct FilesStatResponse {
    #[serde(rename = "Size")]
    size: u64,
    #[serde(rename = "CumulativeSize", default)]
    cumulative_size: u64,
    #[serde(rename = "Type", default)]
    typ: String,
}

#[derive(Deserialize)]
struct PinLsResponse {
    #[serde(rename = "Keys", default)]
    keys: HashMap<String, serde_json::Value>,
}

pub struct IpfsStore {
    api: Url,
    agent: Agent,
}

impl IpfsStore {
    /// # Arguments
    ///
    /// * `api` - Base URL of the daemon RPC interface, e.g. `http://127.0.0.1:5001`.
    /// * `timeout` - Bound for connecting and for every read or write on the connection.
    pub fn new(api: &str, timeout: Duration) -> Result<IpfsStore> {
        let mut api = match Url::parse(api) {
            Ok(v) => v,
            Err(e) => return Err(Error::invalid(format!("ipfs api url {}: {}", api, e))),
        };
        if !api.path().ends_with('/') {
            let p = format!("{}/", api.path());
            api.set_path(&p);
        }
        let agent = AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout_read(timeout)
            .timeout_write(timeout)
            .build();
        Ok(IpfsStore {
            api,
            agent,
        })
    }

    fn endpoint(&self, command: &str, args: &[(&str, &str)]) -> Result<Url> {
        let mut u = match self.api.join(&format!("api/v0/{}", command)) {
            Ok(v) => v,
            Err(e) => return Err(Error::invalid(format!("ipfs endpoint {}: {}", command, e))),
        };
        if !args.is_empty() {
            let mut q = u.query_pairs_mut();
            for (k, v) in args {
                q.append_pair(k, v);
            }
        }
        Ok(u)
    }

    /// Reads of indexed content stay on the local node, so absent blocks fail fast as not found
    /// instead of waiting for the network until the read times out.
    fn cat_endpoint(&self, identifier: &str) -> Result<Url> {
        self.endpoint("cat", &[("arg", identifier), ("offline", "true")])
    }

    fn call(&self, command: &str, identifier: Option<&str>, args: &[(&str, &str)]) -> Result<ureq::Response> {
        let u = self.endpoint(command, args)?;
        self.send(u, identifier)
    }

    fn send(&self, u: Url, identifier: Option<&str>) -> Result<ureq::Response> {
        debug!("ipfs rpc {}", u);
        match self.agent.post(u.as_str()).call() {
            Ok(v) => Ok(v),
            Err(e) => Err(map_error(identifier, e)),
        }
    }

    fn call_json<T: for<'de> Deserialize<'de>>(&self, command: &str, identifier: Option<&str>, args: &[(&str, &str)]) -> Result<T> {
        let res = self.call(command, identifier, args)?;
        let body = match res.into_string() {
            Ok(v) => v,
            Err(e) => return Err(Error::unavailable(identifier, e)),
        };
        parse_last_line(&body).map_err(|e| Error::rejected(identifier, e))
    }
}

/// Some commands stream one JSON object per line; the last one carries the result.
fn parse_last_line<T: for<'de> Deserialize<'de>>(body: &str) -> std::result::Result<T, String> {
    let line = match body.lines().rev().find(|l| !l.trim().is_empty()) {
        Some(v) => v,
        None => return Err(String::from("empty response")),
    };
    serde_json::from_str(line).map_err(|e| format!("malformed response {:?}: {}", line, e))
}

fn is_absent(message: &str) -> bool {
    let m = message.to_lowercase();
    ABSENT_MARKERS.iter().any(|v| m.contains(v))
}

fn map_error(identifier: Option<&str>, e: ureq::Error) -> Error {
    match e {
        ureq::Error::Status(code, res) => {
            let body = res.into_string().unwrap_or_default();
            let message = match serde_json::from_str::<RpcError>(&body) {
                Ok(v) => v.message,
                Err(_) => body,
            };
            classify(identifier, code, &message)
        },
        ureq::Error::Transport(t) => Error::unavailable(identifier, t),
    }
}

fn classify(identifier: Option<&str>, code: u16, message: &str) -> Error {
    if let Some(id) = identifier {
        if is_absent(message) {
            return Error::not_found(id, Layer::Backend);
        }
    }
    match code {
        502 | 503 | 504 => Error::unavailable(identifier, format!("{} {}", code, message)),
        _ => Error::rejected(identifier, format!("{} {}", code, message)),
    }
}

fn multipart_body(data: &[u8]) -> (String, Vec<u8>) {
    let boundary = format!("cidx-{}", hex::encode(Sha256::digest(data)));
    let mut body: Vec<u8> = Vec::with_capacity(data.len() + 256);
    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(b"Content-Disposition: form-data; name=\"file\"; filename=\"file\"\r\n");
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());
    (boundary, body)
}

impl ContentStore for IpfsStore {
    fn add(&self, data: &[u8]) -> Result<String> {
        let u = self.endpoint("add", &[("pin", "false"), ("cid-version", "1"), ("quieter", "true")])?;
        let (boundary, body) = multipart_body(data);
        let res = self.agent.post(u.as_str())
            .set("Content-Type", &format!("multipart/form-data; boundary={}", boundary))
            .send_bytes(&body);
        let res = match res {
            Ok(v) => v,
            Err(e) => return Err(map_error(None, e)),
        };
        let text = match res.into_string() {
            Ok(v) => v,
            Err(e) => return Err(Error::unavailable(None, e)),
        };
        let r: AddResponse = parse_last_line(&text).map_err(|e| Error::rejected(None, e))?;
        debug!("ipfs add {} bytes -> {}", data.len(), &r.hash);
        Ok(r.hash)
    }

    fn fetch(&self, identifier: &str) -> Result<ContentReader> {
        let u = self.cat_endpoint(identifier)?;
        let res = self.send(u, Some(identifier))?;
        Ok(Box::new(res.into_reader()))
    }

    fn pin(&self, identifier: &str) -> Result<()> {
        self.call("pin/add", Some(identifier), &[("arg", identifier)])?;
        Ok(())
    }

    fn unpin(&self, identifier: &str) -> Result<()> {
        match self.call("pin/rm", Some(identifier), &[("arg", identifier)]) {
            Ok(_) => Ok(()),
            Err(Error::NotFound { .. }) => {
                debug!("{} was not pinned", identifier);
                Ok(())
            },
            Err(e) => Err(e),
        }
    }

    fn stat(&self, identifier: &str) -> Result<StoreStat> {
        let path = format!("/ipfs/{}", identifier);
        let st: FilesStatResponse = self.call_json("files/stat", Some(identifier), &[("arg", path.as_str()), ("offline", "true")])?;
        debug!("ipfs stat {} type {} size {} cumulative {}", identifier, &st.typ, st.size, st.cumulative_size);
        let pin_state = match self.call_json::<PinLsResponse>("pin/ls", Some(identifier), &[("arg", identifier), ("type", "recursive")]) {
            Ok(v) => {
                if v.keys.is_empty() {
                    PinState::Unpinned
                } else {
                    PinState::Pinned
                }
            },
            Err(Error::NotFound { .. }) => PinState::Unpinned,
            Err(e) => return Err(e),
        };
        Ok(StoreStat {
            size_bytes: st.size,
            pin_state,
        })
    }

    fn pins(&self) -> Result<Vec<String>> {
        let r: PinLsResponse = self.call_json("pin/ls", None, &[("type", "recursive")])?;
        let mut v: Vec<String> = r.keys.into_keys().collect();
        v.sort();
        Ok(v)
    }

    fn ping(&self) -> Result<()> {
        self.call("id", None, &[])?;
        Ok(())
    }
}
