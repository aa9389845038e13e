use std::ffi::OsString;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use clap::{
    App,
    Arg,
    ArgMatches,
    Error as ArgError,
    ErrorKind as ArgErrorKind,
};

use crate::coordinator::CoordinatorConfig;
use crate::store::RetryPolicy;
use crate::sweep::SweepConfig;

/// Daemon settings, defaults overridden by command line flags.
#[derive(Debug, Clone)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub workers: usize,
    pub ipfs_api: String,
    /// Use a local filesystem content store in this directory instead of IPFS.
    pub store_dir: Option<PathBuf>,
    pub index_dir: PathBuf,
    pub gateway: String,
    pub timeout: Duration,
    pub retries: u32,
    pub retry_delay: Duration,
    pub max_page: usize,
    pub max_size: u64,
    /// `None` accepts any extension.
    pub extensions: Option<Vec<String>>,
    /// `None` disables the background sweep.
    pub sweep_interval: Option<Duration>,
    pub sweep_batch: usize,
    pub escalate_after: u32,
    pub adopt_orphans: bool,
}

const BIND_HOST: &str = "0.0.0.0";
const BIND_PORT: u16 = 8000;
const WORKERS: usize = 4;
const IPFS_API: &str = "http://127.0.0.1:5001";
const INDEX_DIR: &str = "./index";
const GATEWAY: &str = "http://127.0.0.1:8080/ipfs";
const TIMEOUT_SECS: u64 = 30;
const RETRY_DELAY_MS: u64 = 200;
const MAX_SIZE: u64 = 104857600;
const EXTENSIONS: &str = "txt,pdf,png,jpg,jpeg,gif,mp4,mp3,doc,docx,zip,tar,gz,json";
const SWEEP_SECS: u64 = 300;

fn parse<T: FromStr>(arg: &ArgMatches, name: &str) -> Result<Option<T>, ArgError> {
    match arg.value_of(name) {
        Some(v) => match T::from_str(v) {
            Ok(r) => Ok(Some(r)),
            Err(_) => Err(ArgError::with_description(
                &format!("invalid value '{}' for --{}", v, name),
                ArgErrorKind::InvalidValue,
            )),
        },
        None => Ok(None),
    }
}

fn extensions(s: &str) -> Option<Vec<String>> {
    if s.trim() == "*" {
        return None;
    }
    let v = s.split(',')
        .map(|v| v.trim().trim_start_matches('.').to_lowercase())
        .filter(|v| !v.is_empty())
        .collect();
    Some(v)
}

impl Settings {
    pub fn new() -> Settings {
        let retry = RetryPolicy::default();
        let sweep = SweepConfig::default();
        Settings {
            host: BIND_HOST.to_string(),
            port: BIND_PORT,
            workers: WORKERS,
            ipfs_api: IPFS_API.to_string(),
            store_dir: None,
            index_dir: PathBuf::from(INDEX_DIR),
            gateway: GATEWAY.to_string(),
            timeout: Duration::from_secs(TIMEOUT_SECS),
            retries: retry.attempts,
            retry_delay: Duration::from_millis(RETRY_DELAY_MS),
            max_page: crate::index::DEFAULT_MAX_PAGE,
            max_size: MAX_SIZE,
            extensions: extensions(EXTENSIONS),
            sweep_interval: Some(Duration::from_secs(SWEEP_SECS)),
            sweep_batch: sweep.batch_size,
            escalate_after: sweep.escalate_after,
            adopt_orphans: false,
        }
    }

    fn bind_from_args(&mut self, arg: &ArgMatches) -> Result<(), ArgError> {
        if let Some(v) = arg.value_of("host") {
            self.host = v.to_string();
        }
        if let Some(v) = parse(arg, "port")? {
            self.port = v;
        }
        if let Some(v) = parse::<usize>(arg, "workers")? {
            self.workers = v.max(1);
        }
        Ok(())
    }

    fn store_from_args(&mut self, arg: &ArgMatches) -> Result<(), ArgError> {
        if let Some(v) = arg.value_of("ipfs-api") {
            self.ipfs_api = v.to_string();
        }
        if let Some(v) = arg.value_of("store-dir") {
            self.store_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = arg.value_of("index-dir") {
            self.index_dir = PathBuf::from(v);
        }
        if let Some(v) = arg.value_of("gateway") {
            self.gateway = v.to_string();
        }
        if let Some(v) = parse(arg, "timeout")? {
            self.timeout = Duration::from_secs(v);
        }
        if let Some(v) = parse(arg, "retries")? {
            self.retries = v;
        }
        if let Some(v) = parse(arg, "retry-delay")? {
            self.retry_delay = Duration::from_millis(v);
        }
        Ok(())
    }

    fn policy_from_args(&mut self, arg: &ArgMatches) -> Result<(), ArgError> {
        if let Some(v) = parse(arg, "max-page")? {
            self.max_page = v;
        }
        if let Some(v) = parse(arg, "max-size")? {
            self.max_size = v;
        }
        if let Some(v) = arg.value_of("extensions") {
            self.extensions = extensions(v);
        }
        Ok(())
    }

    fn sweep_from_args(&mut self, arg: &ArgMatches) -> Result<(), ArgError> {
        match parse::<u64>(arg, "sweep-interval")? {
            Some(0) => self.sweep_interval = None,
            Some(v) => self.sweep_interval = Some(Duration::from_secs(v)),
            None => {},
        }
        if let Some(v) = parse(arg, "sweep-batch")? {
            self.sweep_batch = v;
        }
        if let Some(v) = parse(arg, "escalate-after")? {
            self.escalate_after = v;
        }
        if arg.is_present("adopt-orphans") {
            self.adopt_orphans = true;
        }
        Ok(())
    }

    fn app<'a, 'b>() -> App<'a, 'b> {
        let mut o = App::new("cidx");
        o = o.version(env!("CARGO_PKG_VERSION"));
        o = o.about("Content-addressed storage gateway with a local metadata index");
        o = o.arg(
            Arg::with_name("host")
                .long("host")
                .short("h")
                .value_name("Host or ip to bind server to.")
                .takes_value(true)
                );
        o = o.arg(
            Arg::with_name("port")
                .long("port")
                .short("p")
                .value_name("Port to bind server to")
                .takes_value(true)
                );
        o = o.arg(
            Arg::with_name("workers")
                .long("workers")
                .value_name("Number of request worker threads")
                .takes_value(true)
                );
        o = o.arg(
            Arg::with_name("ipfs-api")
                .long("ipfs-api")
                .value_name("Base url of the IPFS RPC api")
                .takes_value(true)
                );
        o = o.arg(
            Arg::with_name("store-dir")
                .long("store-dir")
                .value_name("Store content in local directory instead of IPFS")
                .takes_value(true)
                );
        o = o.arg(
            Arg::with_name("index-dir")
                .long("index-dir")
                .value_name("Metadata index directory")
                .takes_value(true)
                );
        o = o.arg(
            Arg::with_name("gateway")
                .long("gateway")
                .value_name("Gateway base url for retrieval hints")
                .takes_value(true)
                );
        o = o.arg(
            Arg::with_name("timeout")
                .long("timeout")
                .value_name("Content store call timeout in seconds")
                .takes_value(true)
                );
        o = o.arg(
            Arg::with_name("retries")
                .long("retries")
                .value_name("Attempts for content store calls")
                .takes_value(true)
                );
        o = o.arg(
            Arg::with_name("retry-delay")
                .long("retry-delay")
                .value_name("Initial retry delay in milliseconds")
                .takes_value(true)
                );
        o = o.arg(
            Arg::with_name("max-page")
                .long("max-page")
                .value_name("Largest page returned by list and search")
                .takes_value(true)
                );
        o = o.arg(
            Arg::with_name("max-size")
                .long("max-size")
                .value_name("Largest accepted upload in bytes")
                .takes_value(true)
                );
        o = o.arg(
            Arg::with_name("extensions")
                .long("extensions")
                .value_name("Comma separated allowed file extensions, * for any")
                .takes_value(true)
                );
        o = o.arg(
            Arg::with_name("sweep-interval")
                .long("sweep-interval")
                .value_name("Seconds between reconciliation sweeps, 0 disables")
                .takes_value(true)
                );
        o = o.arg(
            Arg::with_name("sweep-batch")
                .long("sweep-batch")
                .value_name("Records checked per sweep batch")
                .takes_value(true)
                );
        o = o.arg(
            Arg::with_name("escalate-after")
                .long("escalate-after")
                .value_name("Sweeps content may be missing before an alert")
                .takes_value(true)
                );
        o = o.arg(
            Arg::with_name("adopt-orphans")
                .long("adopt-orphans")
                .help("Index pinned content unknown to the index")
                );
        o
    }

    /// Parse settings from the given arguments. The first item is the program name.
    pub fn from_iter<I, T>(args: I) -> Result<Settings, ArgError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let arg_matches = Settings::app().get_matches_from_safe(args)?;
        let mut settings = Settings::new();
        settings.bind_from_args(&arg_matches)?;
        settings.store_from_args(&arg_matches)?;
        settings.policy_from_args(&arg_matches)?;
        settings.sweep_from_args(&arg_matches)?;
        Ok(settings)
    }

    /// Parse settings from the process arguments, exiting with usage on error.
    pub fn from_args() -> Settings {
        match Settings::from_iter(std::env::args_os()) {
            Ok(v) => v,
            Err(e) => e.exit(),
        }
    }

    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            gateway: self.gateway.clone(),
            max_size: self.max_size,
            allowed_extensions: self.extensions.clone(),
            max_page: self.max_page,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.retries.max(1),
            initial_delay: self.retry_delay,
            ..RetryPolicy::default()
        }
    }

    pub fn sweep_config(&self) -> SweepConfig {
        SweepConfig {
            batch_size: self.sweep_batch,
            escalate_after: self.escalate_after,
            adopt_orphans: self.adopt_orphans,
        }
    }
}

impl Default for Settings {
    fn default() -> Settings {
        Settings::new()
    }
}
