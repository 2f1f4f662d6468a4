use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};

use stockhold_core::{ActorId, DomainError, DomainResult, ProductId, ReservationId};

/// Default hold duration before an unconfirmed reservation becomes eligible for release.
pub const DEFAULT_RESERVATION_TTL_SECS: i64 = 10 * 60;

/// A time-bounded hold on `quantity` units of one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    id: ReservationId,
    product_id: ProductId,
    actor: Option<ActorId>,
    quantity: u64,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl Reservation {
    /// Build a reservation created at `now` that expires `ttl` later.
    pub fn new(
        id: ReservationId,
        product_id: ProductId,
        actor: Option<ActorId>,
        quantity: u64,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> DomainResult<Self> {
        if quantity == 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        if ttl <= Duration::zero() {
            return Err(DomainError::validation("reservation ttl must be positive"));
        }
        Ok(Self {
            id,
            product_id,
            actor,
            quantity,
            created_at: now,
            expires_at: now + ttl,
        })
    }

    /// Rebuild a persisted reservation.
    pub fn from_parts(
        id: ReservationId,
        product_id: ProductId,
        actor: Option<ActorId>,
        quantity: u64,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            product_id,
            actor,
            quantity,
            created_at,
            expires_at,
        }
    }

    pub fn id(&self) -> ReservationId {
        self.id
    }

    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    pub fn actor(&self) -> Option<ActorId> {
        self.actor
    }

    pub fn quantity(&self) -> u64 {
        self.quantity
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Eligible for release once the deadline is reached.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Snapshot as written into the `reservation_created` audit record.
    pub fn to_audit_value(&self, product_name: &str) -> JsonValue {
        json!({
            "product_id": self.product_id,
            "product": product_name,
            "quantity": self.quantity,
            "expires_at": self.expires_at,
        })
    }
}
