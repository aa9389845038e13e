use std::process;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use env_logger;
use log::{
    error,
    info,
};
use signal_hook::consts::{
    SIGINT,
    SIGTERM,
};
use tiny_http::Server;

use cidx::coordinator::Coordinator;
use cidx::http::{
    serve,
    Handler,
};
use cidx::index::DirIndex;
use cidx::settings::Settings;
use cidx::store::{
    ContentStore,
    IpfsStore,
    LocalStore,
    RetryingStore,
};
use cidx::sweep::Sweeper;

fn open_store(settings: &Settings) -> cidx::Result<Arc<dyn ContentStore>> {
    let policy = settings.retry_policy();
    let store: Arc<dyn ContentStore> = match &settings.store_dir {
        Some(v) => {
            info!("using local content store in {}", v.display());
            Arc::new(RetryingStore::new(LocalStore::open(v)?, policy))
        },
        None => {
            info!("using ipfs api at {}", &settings.ipfs_api);
            Arc::new(RetryingStore::new(IpfsStore::new(&settings.ipfs_api, settings.timeout)?, policy))
        },
    };
    Ok(store)
}

fn main() {
    env_logger::init();

    let settings = Settings::from_args();

    let store = match open_store(&settings) {
        Ok(v) => v,
        Err(e) => {
            error!("cannot open content store: {}", e);
            process::exit(1);
        },
    };
    if let Err(e) = store.ping() {
        error!("content store not reachable yet: {}", e);
    }

    let index = match DirIndex::open(&settings.index_dir, settings.max_page, None) {
        Ok(v) => Arc::new(v),
        Err(e) => {
            error!("cannot open index: {}", e);
            process::exit(1);
        },
    };

    let coordinator = Arc::new(Coordinator::new(index, store, settings.coordinator_config()));
    let sweeper = Arc::new(Sweeper::new(coordinator.clone(), settings.sweep_config()));
    let sweep = settings.sweep_interval.map(|v| sweeper.clone().spawn(v));

    let shutdown = Arc::new(AtomicBool::new(false));
    for sig in [SIGINT, SIGTERM] {
        if let Err(e) = signal_hook::flag::register(sig, shutdown.clone()) {
            error!("cannot install signal handler: {}", e);
            process::exit(1);
        }
    }

    let addr = format!("{}:{}", &settings.host, settings.port);
    let srv = match Server::http(&addr) {
        Ok(v) => v,
        Err(e) => {
            error!("cannot bind {}: {}", &addr, e);
            process::exit(1);
        },
    };
    info!("listening on {} with {} workers", &addr, settings.workers);

    let handler = Handler::new(coordinator, sweeper);
    serve(&srv, &handler, settings.workers, &shutdown);

    info!("shutting down");
    if let Some(v) = sweep {
        v.stop();
    }
}
