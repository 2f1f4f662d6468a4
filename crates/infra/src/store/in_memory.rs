use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use chrono::{DateTime, Utc};

use stockhold_core::{DomainError, OrderId, ProductId, ReservationId};
use stockhold_inventory::{Reservation, StockAdjustment, StockEntry, StockHold};
use stockhold_sales::{Order, OrderStatus};

use super::{OrderStore, ReservationStore, SettledReservation, StockLedger, StoreError};

#[derive(Debug)]
struct ProductRow {
    entry: StockEntry,
    reservations: HashMap<ReservationId, Reservation>,
}

/// In-memory stock ledger and reservation store.
///
/// Intended for tests/dev. Each product row sits behind its own mutex, so
/// operations on different products never contend. A reservation lives inside
/// its product's row, which makes every composite (reserve + insert,
/// release + remove, commit + remove) a single critical section.
///
/// Lock order: product row, then the reservation index. The index is never
/// held while a row lock is acquired.
#[derive(Debug, Default)]
pub struct InMemoryInventoryStore {
    rows: RwLock<HashMap<ProductId, Arc<Mutex<ProductRow>>>>,
    index: RwLock<HashMap<ReservationId, ProductId>>,
}

fn poisoned() -> StoreError {
    StoreError::Unavailable("lock poisoned".to_string())
}

impl InMemoryInventoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn row(&self, product_id: ProductId) -> Result<Arc<Mutex<ProductRow>>, StoreError> {
        let rows = self.rows.read().map_err(|_| poisoned())?;
        rows.get(&product_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("product {product_id}")))
    }

    fn lock(row: &Mutex<ProductRow>) -> Result<MutexGuard<'_, ProductRow>, StoreError> {
        row.lock().map_err(|_| poisoned())
    }

    fn owner(&self, id: ReservationId) -> Result<Option<ProductId>, StoreError> {
        let index = self.index.read().map_err(|_| poisoned())?;
        Ok(index.get(&id).copied())
    }

    /// Apply `step` to the entry under the row lock.
    fn with_entry<T, F>(&self, product_id: ProductId, step: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut StockEntry) -> Result<T, DomainError>,
    {
        let row = self.row(product_id)?;
        let mut guard = Self::lock(&row)?;
        Ok(step(&mut guard.entry)?)
    }

    /// Remove a reservation and settle its units with `settle`, under the row lock.
    fn settle<F>(&self, id: ReservationId, settle: F) -> Result<Option<SettledReservation>, StoreError>
    where
        F: FnOnce(&mut StockEntry, u64) -> Result<StockAdjustment, DomainError>,
    {
        let Some(product_id) = self.owner(id)? else {
            return Ok(None);
        };
        let row = self.row(product_id)?;
        let mut guard = Self::lock(&row)?;

        // Another caller may have settled it between the index lookup and the row lock.
        let Some(reservation) = guard.reservations.get(&id).cloned() else {
            return Ok(None);
        };

        let adjustment = settle(&mut guard.entry, reservation.quantity())?;
        guard.reservations.remove(&id);
        self.index.write().map_err(|_| poisoned())?.remove(&id);

        Ok(Some(SettledReservation {
            reservation,
            adjustment,
        }))
    }
}

impl StockLedger for InMemoryInventoryStore {
    fn provision(&self, entry: StockEntry) -> Result<(), StoreError> {
        entry.check_invariant()?;
        let mut rows = self.rows.write().map_err(|_| poisoned())?;
        let product_id = entry.product_id();
        if rows.contains_key(&product_id) {
            return Err(StoreError::Conflict(format!(
                "product {product_id} already exists"
            )));
        }
        rows.insert(
            product_id,
            Arc::new(Mutex::new(ProductRow {
                entry,
                reservations: HashMap::new(),
            })),
        );
        Ok(())
    }

    fn stock(&self, product_id: ProductId) -> Result<Option<StockEntry>, StoreError> {
        let row = {
            let rows = self.rows.read().map_err(|_| poisoned())?;
            rows.get(&product_id).cloned()
        };
        let Some(row) = row else {
            return Ok(None);
        };
        let entry = Self::lock(&row)?.entry.clone();
        Ok(Some(entry))
    }

    fn reserve(&self, product_id: ProductId, quantity: u64) -> Result<StockHold, StoreError> {
        self.with_entry(product_id, |entry| entry.reserve(quantity))
    }

    fn release(
        &self,
        product_id: ProductId,
        quantity: u64,
    ) -> Result<StockAdjustment, StoreError> {
        self.with_entry(product_id, |entry| entry.release(quantity))
    }

    fn commit(
        &self,
        product_id: ProductId,
        quantity: u64,
    ) -> Result<StockAdjustment, StoreError> {
        self.with_entry(product_id, |entry| entry.commit(quantity))
    }

    fn restock(
        &self,
        product_id: ProductId,
        quantity: u64,
    ) -> Result<StockAdjustment, StoreError> {
        self.with_entry(product_id, |entry| entry.restock(quantity))
    }
}

impl ReservationStore for InMemoryInventoryStore {
    fn create(&self, reservation: &Reservation) -> Result<StockHold, StoreError> {
        let row = self.row(reservation.product_id())?;
        let mut guard = Self::lock(&row)?;

        // Work on a copy; the row only changes once the record is in place.
        let mut next = guard.entry.clone();
        let hold = next.reserve(reservation.quantity())?;

        {
            let mut index = self.index.write().map_err(|_| poisoned())?;
            if index.contains_key(&reservation.id()) {
                return Err(StoreError::Conflict(format!(
                    "reservation {} already exists",
                    reservation.id()
                )));
            }
            index.insert(reservation.id(), reservation.product_id());
        }

        guard.entry = next;
        guard
            .reservations
            .insert(reservation.id(), reservation.clone());
        Ok(hold)
    }

    fn get(&self, id: ReservationId) -> Result<Option<Reservation>, StoreError> {
        let Some(product_id) = self.owner(id)? else {
            return Ok(None);
        };
        let row = self.row(product_id)?;
        let guard = Self::lock(&row)?;
        Ok(guard.reservations.get(&id).cloned())
    }

    fn expired_page(
        &self,
        now: DateTime<Utc>,
        after: Option<(DateTime<Utc>, ReservationId)>,
        limit: usize,
    ) -> Result<Vec<Reservation>, StoreError> {
        let rows: Vec<_> = {
            let rows = self.rows.read().map_err(|_| poisoned())?;
            rows.values().cloned().collect()
        };

        let mut expired = Vec::new();
        for row in rows {
            let guard = Self::lock(&row)?;
            expired.extend(
                guard
                    .reservations
                    .values()
                    .filter(|r| r.is_expired(now))
                    .filter(|r| after.is_none_or(|cursor| (r.expires_at(), r.id()) > cursor))
                    .cloned(),
            );
        }

        expired.sort_by_key(|r| (r.expires_at(), r.id()));
        expired.truncate(limit);
        Ok(expired)
    }

    fn delete(&self, id: ReservationId) -> Result<Option<Reservation>, StoreError> {
        let Some(product_id) = self.owner(id)? else {
            return Ok(None);
        };
        let row = self.row(product_id)?;
        let mut guard = Self::lock(&row)?;
        let removed = guard.reservations.remove(&id);
        if removed.is_some() {
            self.index.write().map_err(|_| poisoned())?.remove(&id);
        }
        Ok(removed)
    }

    fn release_reservation(
        &self,
        id: ReservationId,
    ) -> Result<Option<SettledReservation>, StoreError> {
        self.settle(id, |entry, quantity| entry.release(quantity))
    }

    fn confirm(&self, id: ReservationId) -> Result<Option<SettledReservation>, StoreError> {
        self.settle(id, |entry, quantity| entry.commit(quantity))
    }
}

/// In-memory order store.
#[derive(Debug, Default)]
pub struct InMemoryOrderStore {
    orders: RwLock<HashMap<OrderId, Order>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        match self.orders.read() {
            Ok(orders) => orders.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl OrderStore for InMemoryOrderStore {
    fn insert(&self, order: &Order) -> Result<(), StoreError> {
        let mut orders = self.orders.write().map_err(|_| poisoned())?;
        if orders.contains_key(&order.id()) {
            return Err(StoreError::Conflict(format!(
                "order {} already exists",
                order.id()
            )));
        }
        orders.insert(order.id(), order.clone());
        Ok(())
    }

    fn get(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        let orders = self.orders.read().map_err(|_| poisoned())?;
        Ok(orders.get(&id).cloned())
    }

    fn update_status(&self, order: &Order, expected: OrderStatus) -> Result<(), StoreError> {
        let mut orders = self.orders.write().map_err(|_| poisoned())?;
        let stored = orders
            .get_mut(&order.id())
            .ok_or_else(|| StoreError::NotFound(format!("order {}", order.id())))?;

        if stored.status() != expected {
            return Err(StoreError::Conflict(format!(
                "order {} is {}, expected {expected}",
                order.id(),
                stored.status()
            )));
        }
        *stored = order.clone();
        Ok(())
    }

    fn delete(&self, id: OrderId) -> Result<bool, StoreError> {
        let mut orders = self.orders.write().map_err(|_| poisoned())?;
        Ok(orders.remove(&id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn store_with(total: u64) -> (InMemoryInventoryStore, ProductId) {
        let store = InMemoryInventoryStore::new();
        let product_id = ProductId::new();
        store
            .provision(StockEntry::provision(product_id, "Widget", 1_000, total).unwrap())
            .unwrap();
        (store, product_id)
    }

    fn reservation(product_id: ProductId, quantity: u64, now: DateTime<Utc>) -> Reservation {
        Reservation::new(
            ReservationId::new(),
            product_id,
            None,
            quantity,
            now,
            Duration::minutes(10),
        )
        .unwrap()
    }

    #[test]
    fn provisioning_twice_conflicts() {
        let (store, product_id) = store_with(5);
        let err = store
            .provision(StockEntry::provision(product_id, "Widget", 1_000, 5).unwrap())
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[test]
    fn unknown_product_is_not_found() {
        let store = InMemoryInventoryStore::new();
        assert!(store.stock(ProductId::new()).unwrap().is_none());
        assert!(matches!(
            store.reserve(ProductId::new(), 1),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn create_holds_stock_and_stores_record() {
        let (store, product_id) = store_with(5);
        let r = reservation(product_id, 2, Utc::now());

        let hold = store.create(&r).unwrap();
        assert_eq!(hold.quantity(), 2);

        let entry = store.stock(product_id).unwrap().unwrap();
        assert_eq!((entry.available_stock(), entry.reserved_stock()), (3, 2));
        assert_eq!(store.get(r.id()).unwrap(), Some(r));
    }

    #[test]
    fn create_with_duplicate_id_leaves_stock_untouched() {
        let (store, product_id) = store_with(5);
        let r = reservation(product_id, 2, Utc::now());
        store.create(&r).unwrap();

        let err = store.create(&r).unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        let entry = store.stock(product_id).unwrap().unwrap();
        assert_eq!((entry.available_stock(), entry.reserved_stock()), (3, 2));
    }

    #[test]
    fn create_beyond_available_is_insufficient_stock() {
        let (store, product_id) = store_with(1);
        let err = store
            .create(&reservation(product_id, 2, Utc::now()))
            .unwrap_err();
        assert_eq!(
            err,
            StoreError::Domain(DomainError::insufficient_stock(2, 1))
        );
    }

    #[test]
    fn release_reservation_is_idempotent() {
        let (store, product_id) = store_with(5);
        let r = reservation(product_id, 3, Utc::now());
        store.create(&r).unwrap();

        let settled = store.release_reservation(r.id()).unwrap().unwrap();
        assert_eq!(settled.reservation, r);
        assert_eq!(settled.adjustment.after.available_stock, 5);

        assert!(store.release_reservation(r.id()).unwrap().is_none());
        let entry = store.stock(product_id).unwrap().unwrap();
        assert_eq!((entry.available_stock(), entry.reserved_stock()), (5, 0));
    }

    #[test]
    fn confirm_consumes_held_units() {
        let (store, product_id) = store_with(5);
        let r = reservation(product_id, 2, Utc::now());
        store.create(&r).unwrap();

        store.confirm(r.id()).unwrap().unwrap();

        let entry = store.stock(product_id).unwrap().unwrap();
        assert_eq!(
            (entry.total_stock(), entry.available_stock(), entry.reserved_stock()),
            (3, 3, 0)
        );
        assert!(store.get(r.id()).unwrap().is_none());
    }

    #[test]
    fn delete_removes_record_only() {
        let (store, product_id) = store_with(5);
        let r = reservation(product_id, 2, Utc::now());
        store.create(&r).unwrap();

        assert_eq!(store.delete(r.id()).unwrap(), Some(r.clone()));
        assert!(store.delete(r.id()).unwrap().is_none());

        let entry = store.stock(product_id).unwrap().unwrap();
        assert_eq!(entry.reserved_stock(), 2);
    }

    #[test]
    fn expired_pages_follow_the_cursor() {
        let (store, product_id) = store_with(10);
        let start = Utc::now();
        let ids: Vec<_> = (0..5)
            .map(|i| {
                let r = reservation(product_id, 1, start + Duration::seconds(i));
                store.create(&r).unwrap();
                r.id()
            })
            .collect();
        // Not yet expired.
        store
            .create(&reservation(product_id, 1, start + Duration::hours(1)))
            .unwrap();

        let now = start + Duration::minutes(11);
        let found: Vec<_> = store
            .find_expired(now, 2)
            .map(|r| r.unwrap().id())
            .collect();
        assert_eq!(found, ids);
    }

    #[test]
    fn order_update_is_compare_and_set() {
        let orders = InMemoryOrderStore::new();
        let mut order =
            Order::create(OrderId::new(), ProductId::new(), None, 1, 100, Utc::now()).unwrap();
        orders.insert(&order).unwrap();

        order.transition(OrderStatus::Confirmed, Utc::now()).unwrap();
        orders.update_status(&order, OrderStatus::Pending).unwrap();

        let err = orders
            .update_status(&order, OrderStatus::Pending)
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(
            orders.get(order.id()).unwrap().unwrap().status(),
            OrderStatus::Confirmed
        );
    }

    #[test]
    fn order_delete_reports_whether_it_existed() {
        let orders = InMemoryOrderStore::new();
        let order =
            Order::create(OrderId::new(), ProductId::new(), None, 1, 100, Utc::now()).unwrap();
        orders.insert(&order).unwrap();

        assert!(orders.delete(order.id()).unwrap());
        assert!(orders.get(order.id()).unwrap().is_none());
        assert!(!orders.delete(order.id()).unwrap());
    }
}
