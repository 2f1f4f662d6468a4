//! Inventory service: the request-facing entry point.
//!
//! `InventoryService` composes the store traits, an audit sink and a clock. It
//! performs no IO itself; every side effect goes through an injected trait.
//!
//! ## Execution model
//!
//! Each operation is one committed store call (which is atomic per product), then
//! an explicit audit emission on the success path. Audit emission happens after
//! the commit: a sink failure never rolls stock back, but it is logged at `error`
//! and returned as `ServiceError::Audit`, carrying whatever the operation
//! committed so the caller can still act on it.
//!
//! ## Error semantics
//!
//! - **User-correctable**: `InsufficientStock`, `InvalidTransition`, `Validation`,
//!   `NotFound` are surfaced as-is, never retried
//! - **Fatal**: `InvariantViolation` aborts the mutation and is logged at `error`
//! - **Transient**: `StorageUnavailable` is propagated; callers may retry

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use stockhold_audit::{Actor, AuditAction, AuditError, AuditEvent, AuditSink, SubjectType};
use stockhold_core::{Clock, DomainError, OrderId, ProductId, ReservationId};
use stockhold_inventory::{
    DEFAULT_RESERVATION_TTL_SECS, Reservation, StockAdjustment, StockEntry, StockLevels,
};
use stockhold_sales::{Order, OrderStatus};

use crate::store::{OrderStore, ReservationStore, StoreError};

/// Default page size when walking expired reservations.
pub const DEFAULT_SWEEP_BATCH_SIZE: usize = 100;

#[derive(Debug, Error)]
pub enum ServiceError {
    /// Not enough available stock; nothing was reserved.
    #[error("insufficient stock: requested {requested}, available {available}")]
    InsufficientStock { requested: u64, available: u64 },
    /// The status change is not in the transition table.
    #[error("invalid status transition {from} -> {to}")]
    InvalidTransition { from: String, to: String },
    /// A stock invariant would have been broken (defect; mutation aborted).
    #[error("invariant violated: {0}")]
    InvariantViolation(String),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("{0} not found")]
    NotFound(String),
    /// Duplicate id or lost compare-and-set.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Transient storage failure. Safe to retry.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
    /// The mutation committed but its audit record could not be written.
    #[error("audit failed: {error}")]
    Audit {
        #[source]
        error: AuditError,
        committed: Option<Committed>,
    },
}

/// What an operation committed before its audit emission failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Committed {
    Reservation(ReservationReceipt),
    Order(Order),
}

impl From<AuditError> for ServiceError {
    fn from(error: AuditError) -> Self {
        ServiceError::Audit {
            error,
            committed: None,
        }
    }
}

impl ServiceError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ServiceError::StorageUnavailable(_))
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, ServiceError::InvariantViolation(_))
    }

    /// The committed result behind an audit failure, if any.
    pub fn committed(&self) -> Option<&Committed> {
        match self {
            ServiceError::Audit { committed, .. } => committed.as_ref(),
            _ => None,
        }
    }

    fn audit_after(error: AuditError, committed: Committed) -> Self {
        ServiceError::Audit {
            error,
            committed: Some(committed),
        }
    }
}

impl From<DomainError> for ServiceError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => ServiceError::Validation(msg),
            DomainError::InsufficientStock {
                requested,
                available,
            } => ServiceError::InsufficientStock {
                requested,
                available,
            },
            DomainError::InvalidTransition { from, to } => {
                ServiceError::InvalidTransition { from, to }
            }
            DomainError::InvariantViolation(msg) => ServiceError::InvariantViolation(msg),
            DomainError::InvalidId(msg) => ServiceError::Validation(msg),
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound(what) => ServiceError::NotFound(what),
            StoreError::Conflict(msg) => ServiceError::Conflict(msg),
            StoreError::Unavailable(msg) => ServiceError::StorageUnavailable(msg),
            StoreError::Corrupt(msg) => ServiceError::InvariantViolation(msg),
            StoreError::Domain(e) => e.into(),
        }
    }
}

/// Tunables for the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceConfig {
    /// How long a reservation holds stock before it becomes eligible for release.
    pub reservation_ttl: Duration,
    /// Page size for expiry sweeps.
    pub sweep_batch_size: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            reservation_ttl: Duration::seconds(DEFAULT_RESERVATION_TTL_SECS),
            sweep_batch_size: DEFAULT_SWEEP_BATCH_SIZE,
        }
    }
}

/// Returned to the caller of a successful reservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationReceipt {
    pub reservation_id: ReservationId,
    pub product_id: ProductId,
    pub quantity: u64,
    pub expires_at: DateTime<Utc>,
}

/// Stock reservation, confirmation and order lifecycle over injected stores.
#[derive(Debug)]
pub struct InventoryService<S, O, A, C> {
    pub(crate) store: S,
    pub(crate) orders: O,
    pub(crate) audit: A,
    pub(crate) clock: C,
    pub(crate) config: ServiceConfig,
}

impl<S, O, A, C> InventoryService<S, O, A, C>
where
    S: ReservationStore,
    O: OrderStore,
    A: AuditSink,
    C: Clock,
{
    pub fn new(store: S, orders: O, audit: A, clock: C) -> Self {
        Self::with_config(store, orders, audit, clock, ServiceConfig::default())
    }

    pub fn with_config(store: S, orders: O, audit: A, clock: C, config: ServiceConfig) -> Self {
        Self {
            store,
            orders,
            audit,
            clock,
            config,
        }
    }

    pub fn config(&self) -> ServiceConfig {
        self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Create a stock row for a new product with all units available.
    pub fn provision_product(
        &self,
        name: &str,
        unit_price: u64,
        total_stock: u64,
        actor: Actor,
    ) -> Result<StockEntry, ServiceError> {
        let entry = StockEntry::provision(ProductId::new(), name, unit_price, total_stock)?;
        self.store
            .provision(entry.clone())
            .map_err(|e| surface("provision_product", e))?;

        info!(
            product_id = %entry.product_id(),
            total_stock,
            "product provisioned"
        );
        self.emit(vec![
            AuditEvent::new(
                actor,
                AuditAction::StockAdjusted,
                SubjectType::Product,
                entry.product_id(),
                self.clock.now(),
            )
            .with_new(entry.levels().to_audit_value()),
        ])?;
        Ok(entry)
    }

    /// Add received units to a product.
    pub fn restock(
        &self,
        product_id: ProductId,
        quantity: u64,
        actor: Actor,
    ) -> Result<StockLevels, ServiceError> {
        let adjustment = self
            .store
            .restock(product_id, quantity)
            .map_err(|e| surface("restock", e))?;

        info!(%product_id, quantity, "stock received");
        self.emit(vec![self.stock_adjusted(actor, &adjustment)])?;
        Ok(adjustment.after)
    }

    pub fn stock(&self, product_id: ProductId) -> Result<StockEntry, ServiceError> {
        self.store
            .stock(product_id)?
            .ok_or_else(|| ServiceError::NotFound(format!("product {product_id}")))
    }

    /// Hold `quantity` units for `actor` until the reservation TTL elapses.
    ///
    /// Either both the stock hold and the reservation record commit, or neither
    /// does. If only the audit emission fails, the receipt is returned inside
    /// `ServiceError::Audit` so the hold can still be confirmed or released.
    pub fn reserve_stock(
        &self,
        product_id: ProductId,
        actor: Actor,
        quantity: u64,
    ) -> Result<ReservationReceipt, ServiceError> {
        let entry = self.stock(product_id)?;
        let now = self.clock.now();
        let reservation = Reservation::new(
            ReservationId::new(),
            product_id,
            actor.user_id(),
            quantity,
            now,
            self.config.reservation_ttl,
        )?;

        let hold = match self.store.create(&reservation) {
            Ok(hold) => hold,
            Err(StoreError::Domain(DomainError::InsufficientStock {
                requested,
                available,
            })) => {
                debug!(%product_id, requested, available, "reservation rejected");
                return Err(ServiceError::InsufficientStock {
                    requested,
                    available,
                });
            }
            Err(e) => return Err(surface("reserve_stock", e)),
        };

        info!(
            reservation_id = %reservation.id(),
            %product_id,
            quantity,
            expires_at = %reservation.expires_at(),
            "stock reserved"
        );

        let receipt = ReservationReceipt {
            reservation_id: reservation.id(),
            product_id,
            quantity,
            expires_at: reservation.expires_at(),
        };
        self.emit(vec![
            self.stock_adjusted(actor, hold.adjustment()),
            AuditEvent::new(
                actor,
                AuditAction::ReservationCreated,
                SubjectType::Reservation,
                reservation.id(),
                now,
            )
            .with_new(reservation.to_audit_value(entry.name())),
        ])
        .map_err(|e| ServiceError::audit_after(e, Committed::Reservation(receipt.clone())))?;
        Ok(receipt)
    }

    /// Give a reservation's units back before it expires.
    ///
    /// Returns `false` when the reservation no longer exists (already released,
    /// expired or confirmed); nothing is changed in that case.
    pub fn release_reservation(
        &self,
        reservation_id: ReservationId,
        actor: Actor,
    ) -> Result<bool, ServiceError> {
        let Some(settled) = self
            .store
            .release_reservation(reservation_id)
            .map_err(|e| surface("release_reservation", e))?
        else {
            debug!(%reservation_id, "release of unknown reservation ignored");
            return Ok(false);
        };

        info!(
            %reservation_id,
            product_id = %settled.reservation.product_id(),
            quantity = settled.reservation.quantity(),
            "reservation released"
        );
        self.emit(vec![
            self.stock_adjusted(actor, &settled.adjustment),
            self.reservation_status(
                actor,
                AuditAction::ReservationReleased,
                reservation_id,
                "released",
            ),
        ])?;
        Ok(true)
    }

    /// Turn a live reservation into a `Pending` order.
    ///
    /// The held units are consumed (`reserved` and `total` shrink) and the
    /// reservation leaves the expiry pool in the same store operation.
    ///
    /// The order is stored before the stock is touched. If the confirmation then
    /// fails, the order is removed again and the reservation keeps its units.
    pub fn confirm_reservation(
        &self,
        reservation_id: ReservationId,
        actor: Actor,
    ) -> Result<Order, ServiceError> {
        let reservation = self
            .store
            .get(reservation_id)?
            .ok_or_else(|| ServiceError::NotFound(format!("reservation {reservation_id}")))?;
        let entry = self.stock(reservation.product_id())?;
        let now = self.clock.now();

        let order = Order::create(
            OrderId::new(),
            reservation.product_id(),
            reservation.actor(),
            reservation.quantity(),
            entry.unit_price(),
            now,
        )?;

        self.orders
            .insert(&order)
            .map_err(|e| surface("confirm_reservation", e))?;

        let settled = match self.store.confirm(reservation_id) {
            Ok(Some(settled)) => settled,
            Ok(None) => {
                self.discard_order(&order);
                return Err(ServiceError::NotFound(format!(
                    "reservation {reservation_id}"
                )));
            }
            Err(e) => {
                self.discard_order(&order);
                return Err(surface("confirm_reservation", e));
            }
        };

        info!(
            %reservation_id,
            order_id = %order.id(),
            total = order.total(),
            "reservation confirmed"
        );
        self.emit(vec![
            self.stock_adjusted(actor, &settled.adjustment),
            self.reservation_status(
                actor,
                AuditAction::ReservationConfirmed,
                reservation_id,
                "confirmed",
            ),
            AuditEvent::new(actor, AuditAction::OrderCreated, SubjectType::Order, order.id(), now)
                .with_new(order.to_audit_value()),
        ])
        .map_err(|e| ServiceError::audit_after(e, Committed::Order(order.clone())))?;
        Ok(order)
    }

    /// Remove an order whose reservation could not be confirmed.
    fn discard_order(&self, order: &Order) {
        match self.orders.delete(order.id()) {
            Ok(_) => debug!(order_id = %order.id(), "unconfirmed order discarded"),
            Err(e) => error!(
                order_id = %order.id(),
                error = %e,
                "failed to discard unconfirmed order"
            ),
        }
    }

    /// Move an order to `target` if the transition table allows it.
    ///
    /// The write is conditional on the status read here; a concurrent transition
    /// that lands first turns this one into `Conflict`.
    pub fn transition_order(
        &self,
        order_id: OrderId,
        target: OrderStatus,
        actor: Actor,
    ) -> Result<Order, ServiceError> {
        let mut order = self.order(order_id)?;
        let expected = order.status();

        let change = match order.transition(target, self.clock.now()) {
            Ok(change) => change,
            Err(e) => {
                debug!(%order_id, from = %expected, to = %target, "transition rejected");
                return Err(e.into());
            }
        };
        self.orders
            .update_status(&order, expected)
            .map_err(|e| surface("transition_order", e))?;

        info!(%order_id, from = %change.from, to = %change.to, "order status changed");
        self.emit(vec![
            AuditEvent::new(
                actor,
                AuditAction::OrderStatusChanged,
                SubjectType::Order,
                order_id,
                change.occurred_at,
            )
            .with_old(change.old_audit_value())
            .with_new(change.new_audit_value()),
        ])
        .map_err(|e| ServiceError::audit_after(e, Committed::Order(order.clone())))?;
        Ok(order)
    }

    pub fn order(&self, order_id: OrderId) -> Result<Order, ServiceError> {
        self.orders
            .get(order_id)?
            .ok_or_else(|| ServiceError::NotFound(format!("order {order_id}")))
    }

    pub(crate) fn stock_adjusted(&self, actor: Actor, adjustment: &StockAdjustment) -> AuditEvent {
        AuditEvent::new(
            actor,
            AuditAction::StockAdjusted,
            SubjectType::Product,
            adjustment.product_id,
            self.clock.now(),
        )
        .with_old(adjustment.before.to_audit_value())
        .with_new(adjustment.after.to_audit_value())
    }

    pub(crate) fn reservation_status(
        &self,
        actor: Actor,
        action: AuditAction,
        reservation_id: ReservationId,
        status: &str,
    ) -> AuditEvent {
        AuditEvent::new(
            actor,
            action,
            SubjectType::Reservation,
            reservation_id,
            self.clock.now(),
        )
        .with_old(json!({ "status": "active" }))
        .with_new(json!({ "status": status }))
    }

    /// Record every event; a failure is logged and reported, never swallowed.
    ///
    /// All events are attempted even if an earlier one fails.
    pub(crate) fn emit(&self, events: Vec<AuditEvent>) -> Result<(), AuditError> {
        let mut first_failure = None;
        for event in events {
            let action = event.action();
            let subject_id = event.subject_id();
            if let Err(e) = self.audit.record(event) {
                error!(%action, %subject_id, error = %e, "audit record failed");
                if first_failure.is_none() {
                    first_failure = Some(e);
                }
            }
        }
        match first_failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Convert a store failure, logging invariant violations at `error`.
fn surface(operation: &'static str, err: StoreError) -> ServiceError {
    let err = ServiceError::from(err);
    match &err {
        ServiceError::InvariantViolation(msg) => {
            error!(operation, error = %msg, "invariant violated; mutation aborted");
        }
        ServiceError::StorageUnavailable(msg) => {
            warn!(operation, error = %msg, "storage unavailable");
        }
        _ => {}
    }
    err
}
