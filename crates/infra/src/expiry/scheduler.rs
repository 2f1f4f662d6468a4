//! Periodic expiry worker.

use std::io;
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::{ExpirySweep, SweepReport};

/// Default wake interval.
pub const DEFAULT_WAKE_INTERVAL: Duration = Duration::from_secs(60);

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct ExpirySchedulerConfig {
    /// Time between sweeps. Bounds how long an expired reservation can keep its units.
    pub wake_interval: Duration,
    /// Worker thread name, also used in logs.
    pub name: String,
}

impl Default for ExpirySchedulerConfig {
    fn default() -> Self {
        Self {
            wake_interval: DEFAULT_WAKE_INTERVAL,
            name: "expiry-scheduler".to_string(),
        }
    }
}

impl ExpirySchedulerConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_wake_interval(mut self, interval: Duration) -> Self {
        self.wake_interval = interval;
        self
    }
}

/// Scheduler runtime statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchedulerStats {
    pub sweeps: u64,
    pub released: u64,
    pub failed: u64,
    pub last_sweep_at: Option<DateTime<Utc>>,
    pub last_report: Option<SweepReport>,
    pub uptime_secs: u64,
}

impl SchedulerStats {
    fn record(&mut self, at: DateTime<Utc>, report: SweepReport) {
        self.sweeps += 1;
        self.released += report.released as u64;
        self.failed += report.failed as u64;
        self.last_sweep_at = Some(at);
        self.last_report = Some(report);
    }
}

enum Control {
    /// Sweep immediately, then resume the regular interval.
    Sweep,
    Shutdown,
}

/// Handle to control a running scheduler.
///
/// Dropping the handle without calling `shutdown` stops the worker after its
/// current sweep, without waiting for it.
#[derive(Debug)]
pub struct ExpirySchedulerHandle {
    control: mpsc::Sender<Control>,
    join: Option<thread::JoinHandle<()>>,
    stats: Arc<Mutex<SchedulerStats>>,
}

impl ExpirySchedulerHandle {
    /// Ask for an immediate sweep. Returns `false` if the worker has stopped.
    pub fn sweep_now(&self) -> bool {
        self.control.send(Control::Sweep).is_ok()
    }

    /// Request graceful shutdown and wait for the worker to exit.
    pub fn shutdown(mut self) {
        let _ = self.control.send(Control::Shutdown);
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                warn!("expiry scheduler thread panicked");
            }
        }
    }

    /// Current scheduler statistics.
    pub fn stats(&self) -> SchedulerStats {
        match self.stats.lock() {
            Ok(stats) => stats.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

/// Background worker that sweeps expired reservations at a fixed interval,
/// independent of request threads.
pub struct ExpiryScheduler;

impl ExpiryScheduler {
    /// Spawn the scheduler on its own named thread.
    ///
    /// The first sweep runs one interval after start (or on `sweep_now`).
    pub fn spawn<T>(target: T, config: ExpirySchedulerConfig) -> io::Result<ExpirySchedulerHandle>
    where
        T: ExpirySweep + 'static,
    {
        let (control_tx, control_rx) = mpsc::channel::<Control>();
        let stats = Arc::new(Mutex::new(SchedulerStats::default()));
        let stats_clone = stats.clone();

        let join = thread::Builder::new()
            .name(config.name.clone())
            .spawn(move || scheduler_loop(target, config, control_rx, stats_clone))?;

        Ok(ExpirySchedulerHandle {
            control: control_tx,
            join: Some(join),
            stats,
        })
    }
}

fn scheduler_loop<T: ExpirySweep>(
    target: T,
    config: ExpirySchedulerConfig,
    control: mpsc::Receiver<Control>,
    stats: Arc<Mutex<SchedulerStats>>,
) {
    info!(
        scheduler = %config.name,
        wake_interval_secs = config.wake_interval.as_secs(),
        "expiry scheduler started"
    );
    let start_time = Instant::now();

    loop {
        match control.recv_timeout(config.wake_interval) {
            Ok(Control::Sweep) => debug!(scheduler = %config.name, "sweep requested"),
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Ok(Control::Shutdown) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }

        let now = target.now();
        let report = target.run_expiry_sweep(now);

        match stats.lock() {
            Ok(mut s) => {
                s.record(now, report);
                s.uptime_secs = start_time.elapsed().as_secs();
            }
            Err(_) => warn!(scheduler = %config.name, "scheduler stats poisoned"),
        }
    }

    info!(scheduler = %config.name, "expiry scheduler stopped");
}
