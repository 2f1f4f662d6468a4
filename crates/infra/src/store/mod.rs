//! Storage boundary for stock rows, reservations and orders.
//!
//! The traits here are the **transactional contract** the service relies on;
//! backends decide how to honour it:
//!
//! - every `StockLedger` mutation runs inside one exclusive critical section keyed
//!   by product id (in-memory: a mutex per row; Postgres: `SELECT ... FOR UPDATE`)
//! - `ReservationStore` composites (`create`, `release`, `confirm`) change the
//!   reservation record and the stock row in that same critical section, so they
//!   either fully commit or leave nothing behind
//!
//! Traits are synchronous; async backends bridge internally.

pub mod in_memory;
pub mod postgres;

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use stockhold_core::{DomainError, OrderId, ProductId, ReservationId};
use stockhold_inventory::{Reservation, StockAdjustment, StockEntry, StockHold};
use stockhold_sales::{Order, OrderStatus};

pub use in_memory::{InMemoryInventoryStore, InMemoryOrderStore};
pub use postgres::PostgresStore;

/// Storage-level failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The addressed record does not exist.
    #[error("{0} not found")]
    NotFound(String),
    /// Duplicate id or lost compare-and-set.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Transient backend failure (connection, pool, timeout). Safe to retry.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    /// A persisted row could not be decoded, or the database rejected the
    /// statement in a way retrying will not change.
    #[error("corrupt row: {0}")]
    Corrupt(String),
    /// Domain rule rejected the mutation; nothing was written.
    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// A reservation removed from the store together with the ledger mutation that
/// settled its held stock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettledReservation {
    pub reservation: Reservation,
    pub adjustment: StockAdjustment,
}

/// Per-product stock counters.
pub trait StockLedger: Send + Sync {
    /// Create the stock row for a new product.
    fn provision(&self, entry: StockEntry) -> Result<(), StoreError>;

    /// Current counters for a product.
    fn stock(&self, product_id: ProductId) -> Result<Option<StockEntry>, StoreError>;

    /// Hold `quantity` units (`available -> reserved`).
    ///
    /// Fails with `DomainError::InsufficientStock` when fewer units are available.
    fn reserve(&self, product_id: ProductId, quantity: u64) -> Result<StockHold, StoreError>;

    /// Return `quantity` held units (`reserved -> available`).
    fn release(&self, product_id: ProductId, quantity: u64)
    -> Result<StockAdjustment, StoreError>;

    /// Consume `quantity` held units (`reserved -> gone`, `total` shrinks).
    fn commit(&self, product_id: ProductId, quantity: u64)
    -> Result<StockAdjustment, StoreError>;

    /// Receive `quantity` new units.
    fn restock(&self, product_id: ProductId, quantity: u64)
    -> Result<StockAdjustment, StoreError>;
}

/// Reservation records, always mutated together with the owning stock row.
pub trait ReservationStore: StockLedger {
    /// Reserve the reservation's quantity and persist the record, atomically.
    ///
    /// If the record cannot be written the stock row is left as it was.
    fn create(&self, reservation: &Reservation) -> Result<StockHold, StoreError>;

    fn get(&self, id: ReservationId) -> Result<Option<Reservation>, StoreError>;

    /// Up to `limit` reservations with `expires_at <= now`, ordered by
    /// `(expires_at, id)` and strictly after `after` when given.
    fn expired_page(
        &self,
        now: DateTime<Utc>,
        after: Option<(DateTime<Utc>, ReservationId)>,
        limit: usize,
    ) -> Result<Vec<Reservation>, StoreError>;

    /// Remove the record only. The stock row is not touched; callers use this
    /// once the held units have been settled some other way.
    fn delete(&self, id: ReservationId) -> Result<Option<Reservation>, StoreError>;

    /// Remove the record and release its units, as one unit of work.
    ///
    /// Returns `None` when the reservation is already gone, so a second call
    /// can never release twice.
    fn release_reservation(
        &self,
        id: ReservationId,
    ) -> Result<Option<SettledReservation>, StoreError>;

    /// Remove the record and consume its units (confirmation), as one unit of work.
    fn confirm(&self, id: ReservationId) -> Result<Option<SettledReservation>, StoreError>;

    /// Lazily walk every reservation expired at `now`, fetching `batch_size` at a time.
    fn find_expired(&self, now: DateTime<Utc>, batch_size: usize) -> ExpiredReservations<'_, Self>
    where
        Self: Sized,
    {
        ExpiredReservations::new(self, now, batch_size)
    }
}

/// Orders, updated with compare-and-set on status.
pub trait OrderStore: Send + Sync {
    fn insert(&self, order: &Order) -> Result<(), StoreError>;

    fn get(&self, id: OrderId) -> Result<Option<Order>, StoreError>;

    /// Persist `order` only if the stored status is still `expected`.
    ///
    /// Fails with `StoreError::Conflict` when another writer changed it first.
    fn update_status(&self, order: &Order, expected: OrderStatus) -> Result<(), StoreError>;

    /// Remove an order. Returns `false` if it did not exist.
    fn delete(&self, id: OrderId) -> Result<bool, StoreError>;
}

/// Lazy, finite walk over expired reservations.
///
/// Pages are fetched with a keyset cursor on `(expires_at, id)`, so records
/// released while iterating do not shift later pages and a record that fails
/// to process is not revisited within the same walk. Each walk reflects the
/// store's state as it goes; start a new one to re-scan.
pub struct ExpiredReservations<'a, S: ?Sized> {
    store: &'a S,
    now: DateTime<Utc>,
    batch_size: usize,
    cursor: Option<(DateTime<Utc>, ReservationId)>,
    buffer: VecDeque<Reservation>,
    exhausted: bool,
}

impl<'a, S> ExpiredReservations<'a, S>
where
    S: ReservationStore + ?Sized,
{
    pub fn new(store: &'a S, now: DateTime<Utc>, batch_size: usize) -> Self {
        Self {
            store,
            now,
            batch_size: batch_size.max(1),
            cursor: None,
            buffer: VecDeque::new(),
            exhausted: false,
        }
    }
}

impl<S> Iterator for ExpiredReservations<'_, S>
where
    S: ReservationStore + ?Sized,
{
    type Item = Result<Reservation, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.exhausted {
            match self
                .store
                .expired_page(self.now, self.cursor, self.batch_size)
            {
                Ok(page) => {
                    if page.len() < self.batch_size {
                        self.exhausted = true;
                    }
                    if let Some(last) = page.last() {
                        self.cursor = Some((last.expires_at(), last.id()));
                    }
                    self.buffer.extend(page);
                }
                Err(e) => {
                    // The walk cannot continue past an unreadable page.
                    self.exhausted = true;
                    return Some(Err(e));
                }
            }
        }
        self.buffer.pop_front().map(Ok)
    }
}

impl<S> StockLedger for Arc<S>
where
    S: StockLedger + ?Sized,
{
    fn provision(&self, entry: StockEntry) -> Result<(), StoreError> {
        (**self).provision(entry)
    }

    fn stock(&self, product_id: ProductId) -> Result<Option<StockEntry>, StoreError> {
        (**self).stock(product_id)
    }

    fn reserve(&self, product_id: ProductId, quantity: u64) -> Result<StockHold, StoreError> {
        (**self).reserve(product_id, quantity)
    }

    fn release(
        &self,
        product_id: ProductId,
        quantity: u64,
    ) -> Result<StockAdjustment, StoreError> {
        (**self).release(product_id, quantity)
    }

    fn commit(
        &self,
        product_id: ProductId,
        quantity: u64,
    ) -> Result<StockAdjustment, StoreError> {
        (**self).commit(product_id, quantity)
    }

    fn restock(
        &self,
        product_id: ProductId,
        quantity: u64,
    ) -> Result<StockAdjustment, StoreError> {
        (**self).restock(product_id, quantity)
    }
}

impl<S> ReservationStore for Arc<S>
where
    S: ReservationStore + ?Sized,
{
    fn create(&self, reservation: &Reservation) -> Result<StockHold, StoreError> {
        (**self).create(reservation)
    }

    fn get(&self, id: ReservationId) -> Result<Option<Reservation>, StoreError> {
        (**self).get(id)
    }

    fn expired_page(
        &self,
        now: DateTime<Utc>,
        after: Option<(DateTime<Utc>, ReservationId)>,
        limit: usize,
    ) -> Result<Vec<Reservation>, StoreError> {
        (**self).expired_page(now, after, limit)
    }

    fn delete(&self, id: ReservationId) -> Result<Option<Reservation>, StoreError> {
        (**self).delete(id)
    }

    fn release_reservation(
        &self,
        id: ReservationId,
    ) -> Result<Option<SettledReservation>, StoreError> {
        (**self).release_reservation(id)
    }

    fn confirm(&self, id: ReservationId) -> Result<Option<SettledReservation>, StoreError> {
        (**self).confirm(id)
    }
}

impl<S> OrderStore for Arc<S>
where
    S: OrderStore + ?Sized,
{
    fn insert(&self, order: &Order) -> Result<(), StoreError> {
        (**self).insert(order)
    }

    fn get(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        (**self).get(id)
    }

    fn update_status(&self, order: &Order, expected: OrderStatus) -> Result<(), StoreError> {
        (**self).update_status(order, expected)
    }

    fn delete(&self, id: OrderId) -> Result<bool, StoreError> {
        (**self).delete(id)
    }
}
