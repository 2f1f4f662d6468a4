use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use stockhold_audit::{Actor, AuditAction, AuditSink};
use stockhold_core::Clock;
use stockhold_inventory::Reservation;

use super::{ExpirySweep, SweepReport};
use crate::service::{InventoryService, ServiceError};
use crate::store::{OrderStore, ReservationStore};

enum Expired {
    Released { audited: bool },
    AlreadyGone,
}

impl<S, O, A, C> InventoryService<S, O, A, C>
where
    S: ReservationStore,
    O: OrderStore,
    A: AuditSink,
    C: Clock,
{
    /// Release every reservation expired at `now`.
    ///
    /// Never fails as a whole: per-reservation failures are logged, counted in
    /// the report and left for the next sweep.
    pub fn run_expiry_sweep(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();

        for candidate in self.store.find_expired(now, self.config.sweep_batch_size) {
            let reservation = match candidate {
                Ok(r) => r,
                Err(e) => {
                    warn!(error = %e, "failed to read expired reservations; ending sweep early");
                    report.aborted = true;
                    break;
                }
            };
            report.examined += 1;

            match self.expire(&reservation) {
                Ok(Expired::Released { audited }) => {
                    report.released += 1;
                    if !audited {
                        report.audit_failures += 1;
                    }
                }
                Ok(Expired::AlreadyGone) => report.skipped += 1,
                Err(e) if e.is_fatal() => {
                    report.failed += 1;
                    error!(
                        reservation_id = %reservation.id(),
                        product_id = %reservation.product_id(),
                        error = %e,
                        "expiry release violated stock invariant"
                    );
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(
                        reservation_id = %reservation.id(),
                        product_id = %reservation.product_id(),
                        error = %e,
                        "expiry release failed; will retry next sweep"
                    );
                }
            }
        }

        if report.examined > 0 || !report.is_clean() {
            info!(
                examined = report.examined,
                released = report.released,
                skipped = report.skipped,
                failed = report.failed,
                audit_failures = report.audit_failures,
                "expiry sweep finished"
            );
        } else {
            debug!("expiry sweep found nothing to release");
        }
        report
    }

    fn expire(&self, reservation: &Reservation) -> Result<Expired, ServiceError> {
        let Some(settled) = self.store.release_reservation(reservation.id())? else {
            debug!(reservation_id = %reservation.id(), "reservation already settled");
            return Ok(Expired::AlreadyGone);
        };

        debug!(
            reservation_id = %reservation.id(),
            product_id = %reservation.product_id(),
            quantity = reservation.quantity(),
            "expired reservation released"
        );

        // Stock is already back; an audit failure is reported but not retried.
        let audited = self
            .emit(vec![
                self.stock_adjusted(Actor::System, &settled.adjustment),
                self.reservation_status(
                    Actor::System,
                    AuditAction::ReservationExpired,
                    reservation.id(),
                    "expired",
                ),
            ])
            .is_ok();
        Ok(Expired::Released { audited })
    }
}

impl<S, O, A, C> ExpirySweep for InventoryService<S, O, A, C>
where
    S: ReservationStore,
    O: OrderStore,
    A: AuditSink,
    C: Clock,
{
    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn run_expiry_sweep(&self, now: DateTime<Utc>) -> SweepReport {
        InventoryService::run_expiry_sweep(self, now)
    }
}
