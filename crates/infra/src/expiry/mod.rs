//! Reservation expiry: the sweep and the periodic scheduler that drives it.
//!
//! A sweep walks every reservation whose `expires_at` has passed, releases its
//! units and deletes the record as one store operation, then audits the
//! release as a `System` action. A failure on one reservation is logged and
//! counted; the sweep moves on and the reservation is retried on the next wake.

mod scheduler;
mod sweep;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

pub use scheduler::{ExpiryScheduler, ExpirySchedulerConfig, ExpirySchedulerHandle, SchedulerStats};

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Expired reservations found.
    pub examined: usize,
    /// Reservations released and removed by this sweep.
    pub released: usize,
    /// Reservations already gone by the time this sweep reached them.
    pub skipped: usize,
    /// Reservations left in place because releasing them failed.
    pub failed: usize,
    /// Releases that committed but whose audit records could not be written.
    pub audit_failures: usize,
    /// The walk ended early because a page of candidates could not be read.
    pub aborted: bool,
}

impl SweepReport {
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.audit_failures == 0 && !self.aborted
    }
}

/// Something that can run an expiry sweep; the scheduler's target.
pub trait ExpirySweep: Send + Sync {
    /// Current time according to the target's clock.
    fn now(&self) -> DateTime<Utc>;

    fn run_expiry_sweep(&self, now: DateTime<Utc>) -> SweepReport;
}

impl<T> ExpirySweep for Arc<T>
where
    T: ExpirySweep + ?Sized,
{
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }

    fn run_expiry_sweep(&self, now: DateTime<Utc>) -> SweepReport {
        (**self).run_expiry_sweep(now)
    }
}
