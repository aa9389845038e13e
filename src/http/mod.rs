//! HTTP front of the gateway.
//!
//! | route | operation |
//! |---|---|
//! | `PUT /` | ingest the body; metadata from `X-Filename`, `Content-Type`, `X-Description`, `X-Tags` |
//! | `GET /`, `GET /?q=` | list, or search; paged with `offset` and `limit` |
//! | `GET /<id>` | content bytes |
//! | `GET /<id>/info` | record |
//! | `GET /<id>/stats` | size and pin state as reported by the content store |
//! | `PATCH /<id>` | metadata update from a JSON body |
//! | `DELETE /<id>` | remove the record, and the pin too with `?unpin=1` |
//! | `POST /<id>/pin`, `DELETE /<id>/pin` | pin management |
//! | `GET /_health`, `GET /_stats`, `POST /_sweep` | service |

/// Resolves incoming requests to routes and their inputs.
pub mod request;

/// Encodes results and errors as responses.
pub mod response;

use std::sync::atomic::{
    AtomicBool,
    Ordering,
};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{
    debug,
    error,
    info,
};
use tiny_http::{
    Request,
    Server,
    StatusCode,
};

use crate::coordinator::Coordinator;
use crate::error::Result;
use crate::sweep::Sweeper;

use request::Route;
use response::{
    exec_response,
    not_found_response,
    preflight_response,
    Reply,
};

/// Largest accepted metadata update body.
const MAX_UPDATE_SIZE: u64 = 64 * 1024;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

pub struct Handler {
    coordinator: Arc<Coordinator>,
    sweeper: Arc<Sweeper>,
}

impl Handler {
    pub fn new(coordinator: Arc<Coordinator>, sweeper: Arc<Sweeper>) -> Handler {
        Handler {
            coordinator,
            sweeper,
        }
    }

    /// Process a single request and answer it.
    pub fn handle(&self, mut req: Request) {
        let route = match Route::parse(req.method(), req.url()) {
            Ok(Some(v)) => v,
            Ok(None) => {
                debug!("no route for {} {}", req.method(), req.url());
                not_found_response(req);
                return;
            },
            Err(e) => {
                exec_response(req, Err(e));
                return;
            },
        };
        if route == Route::Preflight {
            preflight_response(req);
            return;
        }
        info!("processing request {} {}", req.method(), req.url());
        let r = self.dispatch(route, &mut req);
        exec_response(req, r);
    }

    fn dispatch(&self, route: Route, req: &mut Request) -> Result<Reply> {
        let c = &self.coordinator;
        match route {
            Route::Preflight => Ok(Reply::Empty(StatusCode(200))),
            Route::Ingest => {
                let meta = request::new_record(req);
                let data = request::body(req, c.config().max_size)?;
                Reply::json(200, &c.ingest(&data, meta)?)
            },
            Route::List { offset, limit } => Reply::json(200, &c.list(offset, limit)?),
            Route::Search { query, offset, limit } => Reply::json(200, &c.search(&query, offset, limit)?),
            Route::Retrieve(id) => Ok(Reply::Content(c.retrieve(&id)?)),
            Route::Info(id) => Reply::json(200, &c.info(&id)?),
            Route::Stat(id) => Reply::json(200, &c.stat(&id)?),
            Route::Update(id) => {
                let data = request::body(req, MAX_UPDATE_SIZE)?;
                let update = request::record_update(&data)?;
                Reply::json(200, &c.update_metadata(&id, &update)?)
            },
            Route::Remove { identifier, unpin } => {
                c.remove(&identifier, unpin)?;
                Ok(Reply::Empty(StatusCode(204)))
            },
            Route::Pin(id) => Reply::json(200, &c.pin(&id)?),
            Route::Unpin(id) => Reply::json(200, &c.unpin(&id)?),
            Route::Health => {
                let h = c.health()?;
                let status = if h.backend_reachable { 200 } else { 503 };
                Reply::json(status, &h)
            },
            Route::Stats => Reply::json(200, &c.stats()?),
            Route::Sweep => Reply::json(200, &self.sweeper.run_once()?),
        }
    }
}

/// Serve requests on `workers` threads until `shutdown` is raised.
pub fn serve(server: &Server, handler: &Handler, workers: usize, shutdown: &AtomicBool) {
    thread::scope(|s| {
        for n in 0..workers.max(1) {
            s.spawn(move || {
                debug!("worker {} started", n);
                while !shutdown.load(Ordering::SeqCst) {
                    match server.recv_timeout(POLL_INTERVAL) {
                        Ok(Some(req)) => handler.handle(req),
                        Ok(None) => {},
                        Err(e) => {
                            error!("{}", e);
                            break;
                        },
                    }
                }
                debug!("worker {} stopped", n);
            });
        }
    });
}
