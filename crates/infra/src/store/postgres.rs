//! Postgres-backed stock ledger, reservation store and order store.
//!
//! Every ledger mutation runs in a transaction that takes a row lock on the
//! product (`SELECT ... FOR UPDATE`) before reading counters, so concurrent
//! reservations for one product are serialized by the database. Composite
//! operations (reserve + insert, delete + release, delete + commit) share that
//! transaction and commit or roll back together.
//!
//! Lock order is always the stock row first, then the reservation row.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Database (check constraint violation) | `23514` | `Domain(InvariantViolation)` |
//! | Database (contention, cancel) | `40001`, `40P01`, `55P03`, `57014` | `Unavailable` |
//! | Database (connection, resources) | `08*`, `53*`, `57P*` | `Unavailable` |
//! | Database (other) | Any other | `Corrupt` |
//! | PoolClosed / PoolTimedOut / Io | N/A | `Unavailable` |
//! | ColumnDecode / Decode / RowNotFound / ColumnNotFound | N/A | `Corrupt` |
//!
//! ## Sync bridge
//!
//! The store traits are synchronous. `PostgresStore` keeps the tokio runtime
//! handle it was created on and blocks on it, so trait methods must be called
//! from outside async worker threads (a dedicated thread or `spawn_blocking`).

use std::future::Future;

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tokio::runtime::Handle;
use tracing::{debug, instrument};

use stockhold_core::{ActorId, DomainError, OrderId, ProductId, ReservationId};
use stockhold_inventory::{Reservation, StockAdjustment, StockEntry, StockHold, StockLevels};
use stockhold_sales::{Order, OrderStatus};

use super::{OrderStore, ReservationStore, SettledReservation, StockLedger, StoreError};

/// Schema statements, applied in order by [`PostgresStore::ensure_schema`].
pub const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS stock_entries (
        product_id UUID PRIMARY KEY,
        name TEXT NOT NULL,
        unit_price BIGINT NOT NULL CHECK (unit_price >= 0),
        total_stock BIGINT NOT NULL CHECK (total_stock >= 0),
        available_stock BIGINT NOT NULL CHECK (available_stock >= 0),
        reserved_stock BIGINT NOT NULL CHECK (reserved_stock >= 0),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        CONSTRAINT stock_entries_balanced
            CHECK (available_stock + reserved_stock = total_stock)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS reservations (
        reservation_id UUID PRIMARY KEY,
        product_id UUID NOT NULL REFERENCES stock_entries (product_id),
        actor_id UUID NULL,
        quantity BIGINT NOT NULL CHECK (quantity > 0),
        created_at TIMESTAMPTZ NOT NULL,
        expires_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS reservations_expiry_idx
        ON reservations (expires_at, reservation_id)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS orders (
        order_id UUID PRIMARY KEY,
        product_id UUID NOT NULL REFERENCES stock_entries (product_id),
        actor_id UUID NULL,
        quantity BIGINT NOT NULL CHECK (quantity > 0),
        unit_price BIGINT NOT NULL CHECK (unit_price >= 0),
        total BIGINT NOT NULL CHECK (total >= 0),
        status TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )
    "#,
];

/// Postgres-backed store implementing [`StockLedger`], [`ReservationStore`]
/// and [`OrderStore`] over one connection pool.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
    runtime: Handle,
}

impl PostgresStore {
    /// Wrap an existing pool; sync trait calls will block on `runtime`.
    pub fn new(pool: PgPool, runtime: Handle) -> Self {
        Self { pool, runtime }
    }

    /// Connect a pool and bind the store to the current runtime.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool, Handle::current()))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create tables and indexes if they do not exist.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        }
        Ok(())
    }

    fn block_on<F: Future>(&self, fut: F) -> F::Output {
        self.runtime.block_on(fut)
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>, StoreError> {
        self.pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))
    }

    #[instrument(skip(self, entry), fields(product_id = %entry.product_id()), err)]
    pub async fn insert_entry(&self, entry: &StockEntry) -> Result<(), StoreError> {
        entry.check_invariant()?;
        let levels = entry.levels();
        sqlx::query(
            r#"
            INSERT INTO stock_entries (
                product_id, name, unit_price, total_stock, available_stock, reserved_stock
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(entry.product_id().as_uuid())
        .bind(entry.name())
        .bind(to_db(entry.unit_price(), "unit_price")?)
        .bind(to_db(levels.total_stock, "total_stock")?)
        .bind(to_db(levels.available_stock, "available_stock")?)
        .bind(to_db(levels.reserved_stock, "reserved_stock")?)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_entry", e))?;
        Ok(())
    }

    pub async fn load_entry(&self, product_id: ProductId) -> Result<Option<StockEntry>, StoreError> {
        let row = sqlx::query(SELECT_ENTRY)
            .bind(product_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("load_entry", e))?;
        row.as_ref().map(entry_from_row).transpose()
    }

    /// Lock the product row, apply `step` to its counters and write them back.
    async fn mutate_entry<T, F>(&self, product_id: ProductId, step: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut StockEntry) -> Result<T, DomainError>,
    {
        let mut tx = self.begin().await?;
        let mut entry = lock_entry(&mut tx, product_id).await?;
        let out = step(&mut entry)?;
        write_levels(&mut tx, &entry).await?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(out)
    }

    #[instrument(
        skip(self, reservation),
        fields(
            reservation_id = %reservation.id(),
            product_id = %reservation.product_id(),
            quantity = reservation.quantity()
        ),
        err
    )]
    pub async fn create_reservation(
        &self,
        reservation: &Reservation,
    ) -> Result<StockHold, StoreError> {
        let mut tx = self.begin().await?;
        let mut entry = lock_entry(&mut tx, reservation.product_id()).await?;
        let hold = entry.reserve(reservation.quantity())?;

        sqlx::query(
            r#"
            INSERT INTO reservations (
                reservation_id, product_id, actor_id, quantity, created_at, expires_at
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(reservation.id().as_uuid())
        .bind(reservation.product_id().as_uuid())
        .bind(reservation.actor().map(|a| *a.as_uuid()))
        .bind(to_db(reservation.quantity(), "quantity")?)
        .bind(reservation.created_at())
        .bind(reservation.expires_at())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_reservation", e))?;

        write_levels(&mut tx, &entry).await?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(hold)
    }

    pub async fn load_reservation(
        &self,
        id: ReservationId,
    ) -> Result<Option<Reservation>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT reservation_id, product_id, actor_id, quantity, created_at, expires_at
            FROM reservations
            WHERE reservation_id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_reservation", e))?;
        row.as_ref().map(reservation_from_row).transpose()
    }

    pub async fn load_expired_page(
        &self,
        now: DateTime<Utc>,
        after: Option<(DateTime<Utc>, ReservationId)>,
        limit: usize,
    ) -> Result<Vec<Reservation>, StoreError> {
        let (after_at, after_id) = match after {
            Some((at, id)) => (Some(at), Some(*id.as_uuid())),
            None => (None, None),
        };
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let rows = sqlx::query(
            r#"
            SELECT reservation_id, product_id, actor_id, quantity, created_at, expires_at
            FROM reservations
            WHERE expires_at <= $1
                AND ($2::timestamptz IS NULL OR (expires_at, reservation_id) > ($2, $3))
            ORDER BY expires_at ASC, reservation_id ASC
            LIMIT $4
            "#,
        )
        .bind(now)
        .bind(after_at)
        .bind(after_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_expired_page", e))?;

        rows.iter().map(reservation_from_row).collect()
    }

    pub async fn delete_reservation(
        &self,
        id: ReservationId,
    ) -> Result<Option<Reservation>, StoreError> {
        let row = sqlx::query(DELETE_RESERVATION)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_reservation", e))?;
        row.as_ref().map(reservation_from_row).transpose()
    }

    /// Delete the reservation and settle its units with `settle`, in one transaction.
    #[instrument(skip(self, settle), fields(reservation_id = %id), err)]
    async fn settle_reservation<F>(
        &self,
        id: ReservationId,
        settle: F,
    ) -> Result<Option<SettledReservation>, StoreError>
    where
        F: FnOnce(&mut StockEntry, u64) -> Result<StockAdjustment, DomainError>,
    {
        let Some(existing) = self.load_reservation(id).await? else {
            return Ok(None);
        };

        let mut tx = self.begin().await?;
        let mut entry = lock_entry(&mut tx, existing.product_id()).await?;

        // A concurrent settle that got here first has already deleted the row.
        let deleted = sqlx::query(DELETE_RESERVATION)
            .bind(id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_reservation", e))?;
        let Some(row) = deleted else {
            debug!(reservation_id = %id, "reservation already settled");
            return Ok(None);
        };
        let reservation = reservation_from_row(&row)?;

        let adjustment = settle(&mut entry, reservation.quantity())?;
        write_levels(&mut tx, &entry).await?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok(Some(SettledReservation {
            reservation,
            adjustment,
        }))
    }

    pub async fn insert_order(&self, order: &Order) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO orders (
                order_id, product_id, actor_id, quantity, unit_price, total,
                status, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(order.id().as_uuid())
        .bind(order.product_id().as_uuid())
        .bind(order.actor().map(|a| *a.as_uuid()))
        .bind(to_db(order.quantity(), "quantity")?)
        .bind(to_db(order.unit_price(), "unit_price")?)
        .bind(to_db(order.total(), "total")?)
        .bind(order.status().as_str())
        .bind(order.created_at())
        .bind(order.updated_at())
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_order", e))?;
        Ok(())
    }

    pub async fn delete_order(&self, id: OrderId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM orders WHERE order_id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_order", e))?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn load_order(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT order_id, product_id, actor_id, quantity, unit_price, total,
                   status, created_at, updated_at
            FROM orders
            WHERE order_id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_order", e))?;
        row.as_ref().map(order_from_row).transpose()
    }

    #[instrument(
        skip(self, order),
        fields(order_id = %order.id(), expected = %expected, status = %order.status()),
        err
    )]
    pub async fn compare_and_set_status(
        &self,
        order: &Order,
        expected: OrderStatus,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = $2, updated_at = $3
            WHERE order_id = $1 AND status = $4
            "#,
        )
        .bind(order.id().as_uuid())
        .bind(order.status().as_str())
        .bind(order.updated_at())
        .bind(expected.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_order_status", e))?;

        if result.rows_affected() == 1 {
            return Ok(());
        }
        match self.load_order(order.id()).await? {
            Some(current) => Err(StoreError::Conflict(format!(
                "order {} is {}, expected {expected}",
                order.id(),
                current.status()
            ))),
            None => Err(StoreError::NotFound(format!("order {}", order.id()))),
        }
    }
}

const SELECT_ENTRY: &str = r#"
    SELECT product_id, name, unit_price, total_stock, available_stock, reserved_stock
    FROM stock_entries
    WHERE product_id = $1
"#;

const LOCK_ENTRY: &str = r#"
    SELECT product_id, name, unit_price, total_stock, available_stock, reserved_stock
    FROM stock_entries
    WHERE product_id = $1
    FOR UPDATE
"#;

const DELETE_RESERVATION: &str = r#"
    DELETE FROM reservations
    WHERE reservation_id = $1
    RETURNING reservation_id, product_id, actor_id, quantity, created_at, expires_at
"#;

async fn lock_entry(
    tx: &mut Transaction<'_, Postgres>,
    product_id: ProductId,
) -> Result<StockEntry, StoreError> {
    let row = sqlx::query(LOCK_ENTRY)
        .bind(product_id.as_uuid())
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("lock_entry", e))?
        .ok_or_else(|| StoreError::NotFound(format!("product {product_id}")))?;
    entry_from_row(&row)
}

async fn write_levels(
    tx: &mut Transaction<'_, Postgres>,
    entry: &StockEntry,
) -> Result<(), StoreError> {
    let levels = entry.levels();
    sqlx::query(
        r#"
        UPDATE stock_entries
        SET total_stock = $2, available_stock = $3, reserved_stock = $4, updated_at = NOW()
        WHERE product_id = $1
        "#,
    )
    .bind(entry.product_id().as_uuid())
    .bind(to_db(levels.total_stock, "total_stock")?)
    .bind(to_db(levels.available_stock, "available_stock")?)
    .bind(to_db(levels.reserved_stock, "reserved_stock")?)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("write_levels", e))?;
    Ok(())
}

fn to_db(value: u64, field: &str) -> Result<i64, StoreError> {
    i64::try_from(value)
        .map_err(|_| StoreError::Domain(DomainError::validation(format!("{field} out of range"))))
}

fn from_db(value: i64, field: &str) -> Result<u64, StoreError> {
    u64::try_from(value).map_err(|_| StoreError::Corrupt(format!("negative {field}: {value}")))
}

fn column<'r, T>(row: &'r PgRow, name: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(name)
        .map_err(|e| StoreError::Corrupt(format!("failed to read {name}: {e}")))
}

fn entry_from_row(row: &PgRow) -> Result<StockEntry, StoreError> {
    let levels = StockLevels {
        total_stock: from_db(column(row, "total_stock")?, "total_stock")?,
        available_stock: from_db(column(row, "available_stock")?, "available_stock")?,
        reserved_stock: from_db(column(row, "reserved_stock")?, "reserved_stock")?,
    };
    let name: String = column(row, "name")?;
    Ok(StockEntry::from_levels(
        ProductId::from_uuid(column(row, "product_id")?),
        name,
        from_db(column(row, "unit_price")?, "unit_price")?,
        levels,
    )?)
}

fn reservation_from_row(row: &PgRow) -> Result<Reservation, StoreError> {
    let actor: Option<uuid::Uuid> = column(row, "actor_id")?;
    Ok(Reservation::from_parts(
        ReservationId::from_uuid(column(row, "reservation_id")?),
        ProductId::from_uuid(column(row, "product_id")?),
        actor.map(ActorId::from_uuid),
        from_db(column(row, "quantity")?, "quantity")?,
        column(row, "created_at")?,
        column(row, "expires_at")?,
    ))
}

fn order_from_row(row: &PgRow) -> Result<Order, StoreError> {
    let actor: Option<uuid::Uuid> = column(row, "actor_id")?;
    let status: String = column(row, "status")?;
    let status = status
        .parse::<OrderStatus>()
        .map_err(|e| StoreError::Corrupt(e.to_string()))?;
    Ok(Order::from_parts(
        OrderId::from_uuid(column(row, "order_id")?),
        ProductId::from_uuid(column(row, "product_id")?),
        actor.map(ActorId::from_uuid),
        from_db(column(row, "quantity")?, "quantity")?,
        from_db(column(row, "unit_price")?, "unit_price")?,
        from_db(column(row, "total")?, "total")?,
        status,
        column(row, "created_at")?,
        column(row, "updated_at")?,
    ))
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            map_sql_state(db_err.code().as_deref(), msg)
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            StoreError::Corrupt(format!("decode error in {operation}: {err}"))
        }
        sqlx::Error::RowNotFound
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::TypeNotFound { .. } => {
            StoreError::Corrupt(format!("schema mismatch in {operation}: {err}"))
        }
        sqlx::Error::PoolClosed => {
            StoreError::Unavailable(format!("connection pool closed in {operation}"))
        }
        sqlx::Error::PoolTimedOut => {
            StoreError::Unavailable(format!("connection pool timed out in {operation}"))
        }
        _ => StoreError::Unavailable(format!("sqlx error in {operation}: {err}")),
    }
}

/// Classify a Postgres SQLSTATE.
///
/// Only connection loss, lock contention, cancellation and resource exhaustion
/// are retryable. Anything else fails the same way on every attempt.
fn map_sql_state(code: Option<&str>, msg: String) -> StoreError {
    match code {
        // Unique violation
        Some("23505") => StoreError::Conflict(msg),
        // Check constraint violation: the balanced-counters check fired.
        Some("23514") => StoreError::Domain(DomainError::invariant(msg)),
        // Serialization failure, deadlock, lock not available, query canceled
        Some("40001" | "40P01" | "55P03" | "57014") => StoreError::Unavailable(msg),
        // Connection exceptions, insufficient resources, operator intervention
        Some(code)
            if code.starts_with("08") || code.starts_with("53") || code.starts_with("57P") =>
        {
            StoreError::Unavailable(msg)
        }
        _ => StoreError::Corrupt(msg),
    }
}

impl StockLedger for PostgresStore {
    fn provision(&self, entry: StockEntry) -> Result<(), StoreError> {
        self.block_on(self.insert_entry(&entry))
    }

    fn stock(&self, product_id: ProductId) -> Result<Option<StockEntry>, StoreError> {
        self.block_on(self.load_entry(product_id))
    }

    fn reserve(&self, product_id: ProductId, quantity: u64) -> Result<StockHold, StoreError> {
        self.block_on(self.mutate_entry(product_id, |entry| entry.reserve(quantity)))
    }

    fn release(
        &self,
        product_id: ProductId,
        quantity: u64,
    ) -> Result<StockAdjustment, StoreError> {
        self.block_on(self.mutate_entry(product_id, |entry| entry.release(quantity)))
    }

    fn commit(
        &self,
        product_id: ProductId,
        quantity: u64,
    ) -> Result<StockAdjustment, StoreError> {
        self.block_on(self.mutate_entry(product_id, |entry| entry.commit(quantity)))
    }

    fn restock(
        &self,
        product_id: ProductId,
        quantity: u64,
    ) -> Result<StockAdjustment, StoreError> {
        self.block_on(self.mutate_entry(product_id, |entry| entry.restock(quantity)))
    }
}

impl ReservationStore for PostgresStore {
    fn create(&self, reservation: &Reservation) -> Result<StockHold, StoreError> {
        self.block_on(self.create_reservation(reservation))
    }

    fn get(&self, id: ReservationId) -> Result<Option<Reservation>, StoreError> {
        self.block_on(self.load_reservation(id))
    }

    fn expired_page(
        &self,
        now: DateTime<Utc>,
        after: Option<(DateTime<Utc>, ReservationId)>,
        limit: usize,
    ) -> Result<Vec<Reservation>, StoreError> {
        self.block_on(self.load_expired_page(now, after, limit))
    }

    fn delete(&self, id: ReservationId) -> Result<Option<Reservation>, StoreError> {
        self.block_on(self.delete_reservation(id))
    }

    fn release_reservation(
        &self,
        id: ReservationId,
    ) -> Result<Option<SettledReservation>, StoreError> {
        self.block_on(self.settle_reservation(id, |entry, quantity| entry.release(quantity)))
    }

    fn confirm(&self, id: ReservationId) -> Result<Option<SettledReservation>, StoreError> {
        self.block_on(self.settle_reservation(id, |entry, quantity| entry.commit(quantity)))
    }
}

impl OrderStore for PostgresStore {
    fn insert(&self, order: &Order) -> Result<(), StoreError> {
        self.block_on(self.insert_order(order))
    }

    fn get(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        self.block_on(self.load_order(id))
    }

    fn update_status(&self, order: &Order, expected: OrderStatus) -> Result<(), StoreError> {
        self.block_on(self.compare_and_set_status(order, expected))
    }

    fn delete(&self, id: OrderId) -> Result<bool, StoreError> {
        self.block_on(self.delete_order(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantities_beyond_bigint_are_rejected_before_writing() {
        let err = to_db(u64::MAX, "total_stock").unwrap_err();
        assert!(matches!(err, StoreError::Domain(DomainError::Validation(_))));
        assert_eq!(to_db(42, "total_stock").unwrap(), 42);
    }

    #[test]
    fn negative_columns_are_corrupt_rows() {
        assert!(matches!(
            from_db(-1, "reserved_stock"),
            Err(StoreError::Corrupt(_))
        ));
        assert_eq!(from_db(7, "reserved_stock").unwrap(), 7);
    }

    #[test]
    fn pool_failures_are_transient() {
        assert!(map_sqlx_error("reserve", sqlx::Error::PoolClosed).is_transient());
        assert!(map_sqlx_error("reserve", sqlx::Error::PoolTimedOut).is_transient());
    }

    #[test]
    fn deterministic_database_errors_are_not_retried() {
        let state = |code| map_sql_state(Some(code), format!("sqlstate {code}"));

        // FK violation, undefined table, undefined column, syntax error.
        for code in ["23503", "42P01", "42703", "42601"] {
            let err = state(code);
            assert!(!err.is_transient(), "{code} must not be retried");
            assert!(matches!(err, StoreError::Corrupt(_)));
        }
        assert!(!map_sql_state(None, "no sqlstate".to_string()).is_transient());
        assert!(matches!(
            map_sqlx_error("load_order", sqlx::Error::RowNotFound),
            StoreError::Corrupt(_)
        ));

        assert!(matches!(state("23505"), StoreError::Conflict(_)));
        assert!(matches!(
            state("23514"),
            StoreError::Domain(DomainError::InvariantViolation(_))
        ));
    }

    #[test]
    fn contention_and_connection_loss_are_transient() {
        for code in ["40001", "40P01", "55P03", "57014", "08006", "53300", "57P01"] {
            assert!(
                map_sql_state(Some(code), code.to_string()).is_transient(),
                "{code} should be retried"
            );
        }
    }

    #[test]
    fn schema_keeps_counters_balanced() {
        assert!(
            SCHEMA
                .iter()
                .any(|s| s.contains("available_stock + reserved_stock = total_stock"))
        );
    }
}
