use std::thread;
use std::time::Duration;

use log::{
    debug,
    warn,
};

use crate::error::Result;
use crate::store::{
    ContentReader,
    ContentStore,
    StoreStat,
};

/// Bounded exponential backoff, applied to retryable failures only.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> RetryPolicy {
        RetryPolicy {
            attempts: 3,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> RetryPolicy {
        RetryPolicy {
            attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay before attempt `n + 1`, for `n` starting at 1.
    pub fn delay_after(&self, n: u32) -> Duration {
        let factor = 2_u64.checked_pow(n.saturating_sub(1)).unwrap_or(u64::MAX);
        let delay_ms = (self.initial_delay.as_millis() as u64).saturating_mul(factor);
        Duration::from_millis(delay_ms.min(self.max_delay.as_millis() as u64))
    }

    /// Run `f` until it succeeds, fails with a non-retryable error, or attempts run out.
    pub fn run<T>(&self, op: &str, identifier: Option<&str>, mut f: impl FnMut() -> Result<T>) -> Result<T> {
        let attempts = self.attempts.max(1);
        let mut n = 1;
        loop {
            match f() {
                Ok(v) => return Ok(v),
                Err(e) if e.is_retryable() && n < attempts => {
                    let d = self.delay_after(n);
                    debug!("{} {:?} attempt {}/{} failed, retry in {:?}: {}", op, identifier, n, attempts, d, e);
                    thread::sleep(d);
                    n += 1;
                },
                Err(e) => {
                    if e.is_retryable() {
                        warn!("{} {:?} giving up after {} attempts: {}", op, identifier, attempts, e);
                    }
                    return Err(e);
                },
            }
        }
    }
}

/// Applies a [RetryPolicy] to every call of the wrapped store.
pub struct RetryingStore<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S: ContentStore> RetryingStore<S> {
    pub fn new(inner: S, policy: RetryPolicy) -> RetryingStore<S> {
        RetryingStore {
            inner,
            policy,
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S: ContentStore> ContentStore for RetryingStore<S> {
    fn add(&self, data: &[u8]) -> Result<String> {
        self.policy.run("add", None, || self.inner.add(data))
    }

    fn fetch(&self, identifier: &str) -> Result<ContentReader> {
        self.policy.run("fetch", Some(identifier), || self.inner.fetch(identifier))
    }

    fn pin(&self, identifier: &str) -> Result<()> {
        self.policy.run("pin", Some(identifier), || self.inner.pin(identifier))
    }

    fn unpin(&self, identifier: &str) -> Result<()> {
        self.policy.run("unpin", Some(identifier), || self.inner.unpin(identifier))
    }

    fn stat(&self, identifier: &str) -> Result<StoreStat> {
        self.policy.run("stat", Some(identifier), || self.inner.stat(identifier))
    }

    fn pins(&self) -> Result<Vec<String>> {
        self.policy.run("pins", None, || self.inner.pins())
    }

    fn ping(&self) -> Result<()> {
        self.inner.ping()
    }
}
