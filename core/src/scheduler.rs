//! Time-driven pass scheduler.
//!
//! RULES:
//!   - Every periodic pass implements PeriodicPass.
//!   - A pass runs only when its (name, target key) claim in the store
//!     ledger succeeds. A second trigger for the same key is a no-op, so
//!     missed-tick catch-up and duplicate tickers never double-run a pass.
//!   - A pass never runs concurrently with itself inside one process.
//!   - Pass failures are logged, never propagated to whoever ticked. A
//!     failed run gives its claim back, so the next tick retries the key.

use crate::{
    clock::Clock,
    error::{DispatchError, DispatchResult},
    event::source,
    optimizer::{PassReport, PeriodicOptimizer},
    store::{ts, WorkStore},
};
use chrono::{Duration, NaiveDateTime, NaiveTime};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    /// Due once per bucket of this many minutes.
    Every { minutes: i64 },
    /// Due once per day, from this local time on.
    DailyAt(NaiveTime),
}

impl Cadence {
    /// Ledger key for a trigger at `now`, or None when not due yet.
    pub fn trigger_key(&self, now: NaiveDateTime) -> Option<String> {
        match *self {
            Cadence::Every { minutes } => {
                let secs = now.and_utc().timestamp();
                let into_bucket = secs.rem_euclid(minutes.max(1) * 60);
                Some(ts(now - Duration::seconds(into_bucket)))
            }
            Cadence::DailyAt(at) => (now.time() >= at).then(|| now.date().to_string()),
        }
    }
}

/// A unit of background work the scheduler can trigger.
pub trait PeriodicPass: Send + Sync {
    /// Stable name, also the ledger's pass name.
    fn name(&self) -> &'static str;

    fn cadence(&self) -> Cadence;

    /// Ledger key for a trigger at `now`. Defaults to the cadence's key.
    fn target_key(&self, now: NaiveDateTime) -> Option<String> {
        self.cadence().trigger_key(now)
    }

    fn run(&self, now: NaiveDateTime) -> DispatchResult<PassReport>;
}

pub struct OverdueSweep {
    optimizer: Arc<PeriodicOptimizer>,
}

impl OverdueSweep {
    pub fn new(optimizer: Arc<PeriodicOptimizer>) -> Self {
        Self { optimizer }
    }
}

impl PeriodicPass for OverdueSweep {
    fn name(&self) -> &'static str {
        source::OVERDUE_SWEEP
    }

    fn cadence(&self) -> Cadence {
        Cadence::Every { minutes: self.optimizer.config().overdue_interval_minutes }
    }

    fn run(&self, _now: NaiveDateTime) -> DispatchResult<PassReport> {
        self.optimizer.overdue_sweep()
    }
}

pub struct NightlyReoptimize {
    optimizer: Arc<PeriodicOptimizer>,
}

impl NightlyReoptimize {
    pub fn new(optimizer: Arc<PeriodicOptimizer>) -> Self {
        Self { optimizer }
    }
}

impl PeriodicPass for NightlyReoptimize {
    fn name(&self) -> &'static str {
        source::NIGHTLY
    }

    fn cadence(&self) -> Cadence {
        Cadence::DailyAt(self.optimizer.config().nightly_at)
    }

    /// Keyed by the day being re-planned, not the day of the trigger.
    fn target_key(&self, now: NaiveDateTime) -> Option<String> {
        self.cadence()
            .trigger_key(now)
            .map(|_| (now.date() + Duration::days(1)).to_string())
    }

    fn run(&self, now: NaiveDateTime) -> DispatchResult<PassReport> {
        self.optimizer.reoptimize_day(now.date() + Duration::days(1))
    }
}

/// Removes a pass from the in-flight set when the run ends, however it ends.
struct InFlight<'a> {
    set: &'a Mutex<HashSet<&'static str>>,
    name: &'static str,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if let Ok(mut set) = self.set.lock() {
            set.remove(self.name);
        }
    }
}

pub struct PassScheduler {
    store: Arc<dyn WorkStore>,
    clock: Arc<dyn Clock>,
    passes: Vec<Box<dyn PeriodicPass>>,
    in_flight: Mutex<HashSet<&'static str>>,
}

impl PassScheduler {
    pub fn new(store: Arc<dyn WorkStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock, passes: Vec::new(), in_flight: Mutex::new(HashSet::new()) }
    }

    /// Scheduler with the overdue sweep and the nightly pass registered.
    pub fn with_optimizer(store: Arc<dyn WorkStore>, clock: Arc<dyn Clock>, optimizer: Arc<PeriodicOptimizer>) -> Self {
        let mut scheduler = Self::new(store, clock);
        scheduler.register(Box::new(OverdueSweep::new(optimizer.clone())));
        scheduler.register(Box::new(NightlyReoptimize::new(optimizer)));
        scheduler
    }

    /// Passes are considered in registration order on every tick.
    pub fn register(&mut self, pass: Box<dyn PeriodicPass>) {
        self.passes.push(pass);
    }

    /// Run every pass that is due and not yet claimed. Returns the reports
    /// of the passes that ran.
    pub fn tick(&self) -> Vec<PassReport> {
        let now = self.clock.now();
        let mut reports = Vec::new();
        for pass in &self.passes {
            if let Some(report) = self.trigger(pass.as_ref(), now) {
                reports.push(report);
            }
        }
        reports
    }

    fn trigger(&self, pass: &dyn PeriodicPass, now: NaiveDateTime) -> Option<PassReport> {
        let name = pass.name();
        let key = pass.target_key(now)?;

        let _guard = {
            let mut set = self.in_flight.lock().ok()?;
            if !set.insert(name) {
                log::debug!("pass={name} already running, trigger dropped");
                return None;
            }
            InFlight { set: &self.in_flight, name }
        };

        match self.store.begin_pass(name, &key, now) {
            Ok(true) => {}
            Ok(false) => {
                log::debug!("pass={name} key={key} already claimed");
                return None;
            }
            Err(e) => {
                log::warn!("pass={name} key={key} could not be claimed: {e}");
                return None;
            }
        }

        log::info!("pass={name} key={key} started");
        let report = match pass.run(now) {
            Ok(report) => report,
            Err(e) => {
                log::warn!("pass={name} key={key} failed, released for the next tick: {e}");
                if let Err(e) = self.store.release_pass(name, &key) {
                    log::warn!("pass={name} key={key} claim not released: {e}");
                }
                return Some(PassReport { pass: name.to_string(), target: key, errors: 1, ..PassReport::default() });
            }
        };
        let finished = self.clock.now();
        let recorded = serde_json::to_string(&report)
            .map_err(DispatchError::from)
            .and_then(|json| self.store.finish_pass(name, &key, finished, &json));
        if let Err(e) = recorded {
            log::warn!("pass={name} key={key} report not recorded: {e}");
        }
        log::info!("pass={name} key={key} finished");
        Some(report)
    }
}

/// Drives a scheduler from a background thread until stopped.
pub struct Ticker {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Ticker {
    pub fn spawn(scheduler: Arc<PassScheduler>, period: std::time::Duration) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();
        let handle = thread::spawn(move || {
            while !flag.load(Ordering::Relaxed) {
                scheduler.tick();
                thread::park_timeout(period);
            }
        });
        Self { stop, handle: Some(handle) }
    }

    /// Signal the thread and wait for the current tick to end.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            handle.thread().unpark();
            if handle.join().is_err() {
                log::warn!("ticker thread panicked");
            }
        }
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.shutdown();
    }
}
