use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use stockhold_core::ActorId;

/// Who performed an audited action.
///
/// Automated work (expiry sweeps) is attributed to `System`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Actor {
    System,
    User(ActorId),
}

impl Actor {
    /// The acting user, if any.
    pub fn user_id(&self) -> Option<ActorId> {
        match self {
            Actor::System => None,
            Actor::User(id) => Some(*id),
        }
    }
}

impl core::fmt::Display for Actor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Actor::System => f.write_str("System"),
            Actor::User(id) => core::fmt::Display::fmt(id, f),
        }
    }
}

impl From<ActorId> for Actor {
    fn from(value: ActorId) -> Self {
        Actor::User(value)
    }
}

/// Kind of audited action.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    StockAdjusted,
    ReservationCreated,
    ReservationReleased,
    ReservationExpired,
    ReservationConfirmed,
    OrderCreated,
    OrderStatusChanged,
}

impl AuditAction {
    /// Stable action name as written to the audit log.
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::StockAdjusted => "stock_adjusted",
            AuditAction::ReservationCreated => "reservation_created",
            AuditAction::ReservationReleased => "reservation_released",
            AuditAction::ReservationExpired => "reservation_expired",
            AuditAction::ReservationConfirmed => "reservation_confirmed",
            AuditAction::OrderCreated => "order_created",
            AuditAction::OrderStatusChanged => "order_status_changed",
        }
    }
}

impl core::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type of the record an audit event refers to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubjectType {
    Product,
    Reservation,
    Order,
}

/// Immutable audit record.
///
/// Events are facts: once built they are only ever handed to a sink, never
/// mutated. `old_value`/`new_value` carry JSON snapshots of the fields that
/// changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    event_id: Uuid,
    actor: Actor,
    action: AuditAction,
    subject_type: SubjectType,
    subject_id: Uuid,
    old_value: Option<JsonValue>,
    new_value: Option<JsonValue>,
    timestamp: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(
        actor: Actor,
        action: AuditAction,
        subject_type: SubjectType,
        subject_id: impl Into<Uuid>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            actor,
            action,
            subject_type,
            subject_id: subject_id.into(),
            old_value: None,
            new_value: None,
            timestamp,
        }
    }

    pub fn with_old(mut self, old: JsonValue) -> Self {
        self.old_value = Some(old);
        self
    }

    pub fn with_new(mut self, new: JsonValue) -> Self {
        self.new_value = Some(new);
        self
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn actor(&self) -> Actor {
        self.actor
    }

    pub fn action(&self) -> AuditAction {
        self.action
    }

    pub fn subject_type(&self) -> SubjectType {
        self.subject_type
    }

    pub fn subject_id(&self) -> Uuid {
        self.subject_id
    }

    pub fn old_value(&self) -> Option<&JsonValue> {
        self.old_value.as_ref()
    }

    pub fn new_value(&self) -> Option<&JsonValue> {
        self.new_value.as_ref()
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use stockhold_core::ProductId;

    #[test]
    fn builder_keeps_snapshots() {
        let product_id = ProductId::new();
        let event = AuditEvent::new(
            Actor::System,
            AuditAction::StockAdjusted,
            SubjectType::Product,
            product_id,
            Utc::now(),
        )
        .with_old(json!({"available_stock": 5, "reserved_stock": 0}))
        .with_new(json!({"available_stock": 4, "reserved_stock": 1}));

        assert_eq!(event.subject_id(), *product_id.as_uuid());
        assert_eq!(event.old_value().unwrap()["available_stock"], 5);
        assert_eq!(event.new_value().unwrap()["reserved_stock"], 1);
    }

    #[test]
    fn actions_serialize_to_log_names() {
        let value = serde_json::to_value(AuditAction::OrderStatusChanged).unwrap();
        assert_eq!(value, json!("order_status_changed"));
        assert_eq!(AuditAction::ReservationExpired.as_str(), "reservation_expired");
    }

    #[test]
    fn system_actor_displays_as_system() {
        assert_eq!(Actor::System.to_string(), "System");
        let id = ActorId::new();
        assert_eq!(Actor::from(id).to_string(), id.to_string());
    }
}
