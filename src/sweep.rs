//! Periodic reconciliation of the index against the content store.
//!
//! For every indexed record the content store is asked for its stat:
//!
//! * if the store no longer has the content, the record is marked with an unknown pin state and a
//!   per-identifier streak is counted up. Once the streak reaches the escalation threshold, the
//!   [AlertSink] is notified on every further pass. Records are never deleted by a sweep.
//! * if the store reports a different pin state than recorded, the record is updated to match.
//!
//! Afterwards pins held by the store that the index does not know are counted as orphans, and
//! re-indexed with placeholder metadata if adoption is enabled.
//!
//! A pass is aborted as soon as the store turns out to be unreachable. Updates already made are
//! kept; the next scheduled pass starts over.
use std::collections::{
    HashMap,
    HashSet,
};
use std::sync::mpsc::{
    self,
    RecvTimeoutError,
    Sender,
};
use std::sync::{
    Arc,
    Mutex,
    TryLockError,
};
use std::thread::{
    self,
    JoinHandle,
};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;

use log::{
    debug,
    error,
    info,
    warn,
};

use crate::coordinator::Coordinator;
use crate::error::{
    Error,
    Result,
};
use crate::index::DEFAULT_MAX_PAGE;
use crate::record::{
    ContentRecord,
    NewRecord,
    PinState,
    RecordUpdate,
};

#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Records checked per batch.
    pub batch_size: usize,
    /// Consecutive passes an identifier must be missing before it is escalated.
    pub escalate_after: u32,
    /// Re-index content pinned in the store but unknown to the index.
    pub adopt_orphans: bool,
}

impl Default for SweepConfig {
    fn default() -> SweepConfig {
        SweepConfig {
            batch_size: 50,
            escalate_after: 3,
            adopt_orphans: false,
        }
    }
}

/// External alert channel for content that stays missing.
pub trait AlertSink: Send + Sync {
    fn missing(&self, identifier: &str, passes: u32);
}

/// Reports escalations to the error log.
pub struct LogAlert;

impl AlertSink for LogAlert {
    fn missing(&self, identifier: &str, passes: u32) {
        error!("{} missing from content store for {} consecutive sweeps", identifier, passes);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub checked: usize,
    pub missing: usize,
    pub pin_updated: usize,
    pub escalated: usize,
    pub failed: usize,
    pub orphans: usize,
    pub adopted: usize,
    pub aborted: bool,
}

enum Outcome {
    Present,
    PinUpdated,
    Missing,
    Gone,
}

pub struct Sweeper {
    coordinator: Arc<Coordinator>,
    config: SweepConfig,
    alerts: Arc<dyn AlertSink>,
    streaks: Mutex<HashMap<String, u32>>,
    running: Mutex<()>,
}

impl Sweeper {
    pub fn new(coordinator: Arc<Coordinator>, config: SweepConfig) -> Sweeper {
        Sweeper::with_alerts(coordinator, config, Arc::new(LogAlert))
    }

    pub fn with_alerts(coordinator: Arc<Coordinator>, config: SweepConfig, alerts: Arc<dyn AlertSink>) -> Sweeper {
        Sweeper {
            coordinator,
            config,
            alerts,
            streaks: Mutex::new(HashMap::new()),
            running: Mutex::new(()),
        }
    }

    /// Consecutive passes `identifier` has been found missing.
    pub fn missing_streak(&self, identifier: &str) -> u32 {
        self.streaks.lock().unwrap_or_else(|e| e.into_inner()).get(identifier).copied().unwrap_or(0)
    }

    fn snapshot(&self) -> Result<Vec<String>> {
        let index = self.coordinator.index();
        let mut ids = vec!();
        let mut seen = HashSet::new();
        let mut offset = 0;
        loop {
            let page = index.list(offset, DEFAULT_MAX_PAGE)?;
            if page.records.is_empty() {
                break;
            }
            offset += page.records.len();
            // an ingest during paging shifts the listing, so a record may show up twice
            for r in page.records {
                if seen.insert(r.identifier.clone()) {
                    ids.push(r.identifier);
                }
            }
        }
        Ok(ids)
    }

    /// Run one full pass. Fails with `SweepBusy` if another pass is in progress.
    pub fn run_once(&self) -> Result<SweepReport> {
        let _running = match self.running.try_lock() {
            Ok(v) => v,
            Err(TryLockError::WouldBlock) => return Err(Error::SweepBusy),
            Err(TryLockError::Poisoned(e)) => e.into_inner(),
        };

        let mut report = SweepReport::default();
        let ids = self.snapshot()?;
        let mut missing_now: HashMap<String, u32> = HashMap::new();
        let mut cleared: Vec<&String> = vec!();
        let mut unchecked: HashSet<&String> = HashSet::new();
        let batch_size = self.config.batch_size.max(1);

        'batches: for (n, batch) in ids.chunks(batch_size).enumerate() {
            debug!("sweep batch {} with {} records", n, batch.len());
            for id in batch {
                match self.check(id) {
                    Ok(Outcome::Present) => {
                        report.checked += 1;
                        cleared.push(id);
                    },
                    Ok(Outcome::PinUpdated) => {
                        report.checked += 1;
                        report.pin_updated += 1;
                        cleared.push(id);
                    },
                    Ok(Outcome::Missing) => {
                        report.checked += 1;
                        report.missing += 1;
                        let streak = self.missing_streak(id) + 1;
                        missing_now.insert(id.clone(), streak);
                        if streak >= self.config.escalate_after {
                            self.alerts.missing(id, streak);
                            report.escalated += 1;
                        }
                    },
                    Ok(Outcome::Gone) => cleared.push(id),
                    Err(e) if e.is_retryable() => {
                        warn!("sweep aborted, content store unreachable: {}", e);
                        report.aborted = true;
                        break 'batches;
                    },
                    Err(e) => {
                        warn!("sweep could not check {}: {}", id, e);
                        report.failed += 1;
                        unchecked.insert(id);
                    },
                }
            }
        }

        {
            let mut streaks = self.streaks.lock().unwrap_or_else(|e| e.into_inner());
            if report.aborted {
                for id in cleared {
                    streaks.remove(id);
                }
            } else {
                streaks.retain(|id, _| unchecked.contains(id));
            }
            streaks.extend(missing_now);
        }

        if !report.aborted {
            if let Err(e) = self.orphans(&mut report) {
                if e.is_retryable() {
                    warn!("sweep aborted during orphan scan: {}", e);
                    report.aborted = true;
                } else {
                    warn!("orphan scan failed: {}", e);
                }
            }
        }

        info!(
            "sweep checked {} missing {} pin updates {} escalated {} orphans {} adopted {}{}",
            report.checked,
            report.missing,
            report.pin_updated,
            report.escalated,
            report.orphans,
            report.adopted,
            if report.aborted { " (aborted)" } else { "" },
        );
        Ok(report)
    }

    fn check(&self, identifier: &str) -> Result<Outcome> {
        let index = self.coordinator.index();
        let _guard = self.coordinator.locks().lock(identifier);
        let record = match index.get(identifier) {
            Ok(v) => v,
            Err(Error::NotFound { .. }) => return Ok(Outcome::Gone),
            Err(e) => return Err(e),
        };
        match self.coordinator.store().stat(identifier) {
            Ok(st) => {
                if st.pin_state == record.pin_state {
                    return Ok(Outcome::Present);
                }
                debug!("{} pin state {} -> {}", identifier, record.pin_state, st.pin_state);
                index.update(identifier, &RecordUpdate::pin_state(st.pin_state))?;
                Ok(Outcome::PinUpdated)
            },
            Err(Error::NotFound { .. }) => {
                if record.pin_state != PinState::Unknown {
                    index.update(identifier, &RecordUpdate::pin_state(PinState::Unknown))?;
                }
                Ok(Outcome::Missing)
            },
            Err(e) => Err(e),
        }
    }

    fn orphans(&self, report: &mut SweepReport) -> Result<()> {
        let index = self.coordinator.index();
        let store = self.coordinator.store();
        for id in store.pins()? {
            let _guard = self.coordinator.locks().lock(&id);
            match index.get(&id) {
                Ok(_) => continue,
                Err(Error::NotFound { .. }) => {},
                Err(e) => return Err(e),
            }
            report.orphans += 1;
            if !self.config.adopt_orphans {
                debug!("orphaned pin {}", &id);
                continue;
            }
            let st = match store.stat(&id) {
                Ok(v) => v,
                Err(Error::NotFound { .. }) => continue,
                Err(e) => return Err(e),
            };
            let meta = NewRecord {
                display_name: Some(id.clone()),
                original_name: Some(id.clone()),
                ..NewRecord::default()
            };
            let record = ContentRecord::new(&id, &meta, st.size_bytes, st.pin_state, Utc::now());
            match index.insert(record) {
                Ok(_) => {
                    info!("adopted orphaned pin {}", &id);
                    report.adopted += 1;
                },
                Err(Error::DuplicateIdentifier { .. }) => {},
                Err(e) => warn!("cannot adopt {}: {}", &id, e),
            }
        }
        Ok(())
    }

    /// Run a pass every `interval` on a dedicated thread until the handle is stopped or dropped.
    pub fn spawn(self: Arc<Self>, interval: Duration) -> SweepHandle {
        let (tx, rx) = mpsc::channel::<()>();
        let thread = thread::spawn(move || {
            info!("reconciliation sweep every {:?}", interval);
            loop {
                match rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {},
                    _ => break,
                }
                match self.run_once() {
                    Ok(_) => {},
                    Err(Error::SweepBusy) => debug!("sweep already running, skipping"),
                    Err(e) => warn!("sweep failed: {}", e),
                }
            }
            debug!("reconciliation sweep stopped");
        });
        SweepHandle {
            stop: Some(tx),
            thread: Some(thread),
        }
    }
}

/// Owner of a background sweep thread.
pub struct SweepHandle {
    stop: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl SweepHandle {
    /// Stop the thread, waiting for a pass in progress to finish.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(tx) = self.stop.take() {
            let _ = tx.send(());
        }
        if let Some(t) = self.thread.take() {
            if t.join().is_err() {
                error!("sweep thread panicked");
            }
        }
    }
}

impl Drop for SweepHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
