use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};

use stockhold_core::{ActorId, DomainError, DomainResult, OrderId, ProductId};

/// Order status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

/// Legal status changes: current status -> allowed next statuses.
///
/// `Delivered` and `Cancelled` are terminal. Nothing from `Shipped` onward can
/// reach `Cancelled`.
pub const ORDER_TRANSITIONS: [(OrderStatus, &[OrderStatus]); 6] = [
    (
        OrderStatus::Pending,
        &[OrderStatus::Confirmed, OrderStatus::Cancelled],
    ),
    (
        OrderStatus::Confirmed,
        &[OrderStatus::Processing, OrderStatus::Cancelled],
    ),
    (OrderStatus::Processing, &[OrderStatus::Shipped]),
    (OrderStatus::Shipped, &[OrderStatus::Delivered]),
    (OrderStatus::Delivered, &[]),
    (OrderStatus::Cancelled, &[]),
];

/// Allowed next statuses for `from` (empty for terminal statuses).
pub fn allowed_transitions(from: OrderStatus) -> &'static [OrderStatus] {
    ORDER_TRANSITIONS
        .iter()
        .find(|(status, _)| *status == from)
        .map(|(_, next)| *next)
        .unwrap_or(&[])
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 6] = [
        OrderStatus::Pending,
        OrderStatus::Confirmed,
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        allowed_transitions(self).contains(&next)
    }

    pub fn is_terminal(self) -> bool {
        allowed_transitions(self).is_empty()
    }
}

impl core::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| DomainError::validation(format!("unknown order status: {s}")))
    }
}

/// Record of one applied status change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub order_id: OrderId,
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub occurred_at: DateTime<Utc>,
}

impl StatusChange {
    pub fn old_audit_value(&self) -> JsonValue {
        json!({ "status": self.from })
    }

    pub fn new_audit_value(&self) -> JsonValue {
        json!({ "status": self.to })
    }
}

/// An order for `quantity` units of one product.
///
/// Creation belongs to the caller's workflow; this type only guards the status
/// lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    product_id: ProductId,
    actor: Option<ActorId>,
    quantity: u64,
    /// Price in smallest currency unit (e.g., cents).
    unit_price: u64,
    total: u64,
    status: OrderStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Order {
    /// New `Pending` order; `total` is `quantity * unit_price`.
    pub fn create(
        id: OrderId,
        product_id: ProductId,
        actor: Option<ActorId>,
        quantity: u64,
        unit_price: u64,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if quantity == 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        let total = quantity
            .checked_mul(unit_price)
            .ok_or_else(|| DomainError::validation("order total overflows"))?;

        Ok(Self {
            id,
            product_id,
            actor,
            quantity,
            unit_price,
            total,
            status: OrderStatus::Pending,
            created_at: now,
            updated_at: now,
        })
    }

    /// Rebuild a persisted order.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        id: OrderId,
        product_id: ProductId,
        actor: Option<ActorId>,
        quantity: u64,
        unit_price: u64,
        total: u64,
        status: OrderStatus,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            product_id,
            actor,
            quantity,
            unit_price,
            total,
            status,
            created_at,
            updated_at,
        }
    }

    pub fn id(&self) -> OrderId {
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

    pub fn unit_price(&self) -> u64 {
        self.unit_price
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        self.status.can_transition_to(next)
    }

    /// Apply `target` if the transition table allows it.
    ///
    /// On failure the order is left untouched.
    pub fn transition(
        &mut self,
        target: OrderStatus,
        at: DateTime<Utc>,
    ) -> DomainResult<StatusChange> {
        if !self.can_transition_to(target) {
            return Err(DomainError::invalid_transition(self.status, target));
        }

        let change = StatusChange {
            order_id: self.id,
            from: self.status,
            to: target,
            occurred_at: at,
        };
        self.status = target;
        self.updated_at = at;
        Ok(change)
    }

    /// Snapshot as written into the `order_created` audit record.
    pub fn to_audit_value(&self) -> JsonValue {
        json!({
            "product_id": self.product_id,
            "quantity": self.quantity,
            "total": self.total,
            "status": self.status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn test_order() -> Order {
        Order::create(
            OrderId::new(),
            ProductId::new(),
            Some(ActorId::new()),
            2,
            1_500,
            Utc::now(),
        )
        .unwrap()
    }

    fn order_in(status: OrderStatus) -> Order {
        let o = test_order();
        Order::from_parts(
            o.id(),
            o.product_id(),
            o.actor(),
            o.quantity(),
            o.unit_price(),
            o.total(),
            status,
            o.created_at(),
            o.updated_at(),
        )
    }

    #[test]
    fn create_computes_total_and_starts_pending() {
        let order = test_order();
        assert_eq!(order.total(), 3_000);
        assert_eq!(order.status(), OrderStatus::Pending);
    }

    #[test]
    fn create_rejects_zero_quantity() {
        let err =
            Order::create(OrderId::new(), ProductId::new(), None, 0, 100, Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn full_lifecycle_pending_to_delivered() {
        let mut order = test_order();
        for next in [
            OrderStatus::Confirmed,
            OrderStatus::Processing,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
        ] {
            let from = order.status();
            let change = order.transition(next, Utc::now()).unwrap();
            assert_eq!(change.from, from);
            assert_eq!(change.to, next);
            assert_eq!(order.status(), next);
        }
        assert!(order.status().is_terminal());
    }

    #[test]
    fn pending_cannot_jump_to_shipped() {
        let mut order = test_order();
        let err = order.transition(OrderStatus::Shipped, Utc::now()).unwrap_err();
        assert_eq!(
            err,
            DomainError::invalid_transition(OrderStatus::Pending, OrderStatus::Shipped)
        );
        assert_eq!(order.status(), OrderStatus::Pending);
    }

    #[test]
    fn shipped_cannot_be_cancelled() {
        let mut order = order_in(OrderStatus::Shipped);
        let err = order
            .transition(OrderStatus::Cancelled, Utc::now())
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidTransition { .. }));
    }

    #[test]
    fn terminal_statuses_reject_everything() {
        for terminal in [OrderStatus::Delivered, OrderStatus::Cancelled] {
            for target in OrderStatus::ALL {
                let mut order = order_in(terminal);
                assert!(order.transition(target, Utc::now()).is_err());
                assert_eq!(order.status(), terminal);
            }
        }
    }

    #[test]
    fn same_status_is_not_a_transition() {
        let mut order = test_order();
        assert!(order.transition(OrderStatus::Pending, Utc::now()).is_err());
    }

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!("Shipped".parse::<OrderStatus>().unwrap(), OrderStatus::Shipped);
        assert!("lost".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn audit_values_carry_status_names() {
        let mut order = test_order();
        let change = order.transition(OrderStatus::Confirmed, Utc::now()).unwrap();
        assert_eq!(change.old_audit_value(), json!({"status": "pending"}));
        assert_eq!(change.new_audit_value(), json!({"status": "confirmed"}));
    }

    fn status() -> impl Strategy<Value = OrderStatus> {
        (0usize..OrderStatus::ALL.len()).prop_map(|i| OrderStatus::ALL[i])
    }

    proptest! {
        /// Property: a transition succeeds exactly when the pair is in the table.
        #[test]
        fn transition_succeeds_iff_pair_in_table(from in status(), to in status()) {
            let mut order = order_in(from);
            let in_table = ORDER_TRANSITIONS
                .iter()
                .any(|(s, next)| *s == from && next.contains(&to));

            let result = order.transition(to, Utc::now());
            prop_assert_eq!(result.is_ok(), in_table);
            prop_assert_eq!(order.status(), if in_table { to } else { from });
        }
    }
}
