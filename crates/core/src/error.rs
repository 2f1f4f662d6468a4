//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// invariants, stock and transition rules). Infrastructure concerns belong elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. zero quantity).
    #[error("validation failed: {0}")]
    Validation(String),

    /// Not enough available stock to satisfy a hold.
    ///
    /// User-correctable; never retried by the core.
    #[error("insufficient stock: requested {requested}, available {available}")]
    InsufficientStock { requested: u64, available: u64 },

    /// The requested order status change is not in the transition table.
    #[error("invalid status transition {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    /// A domain invariant was violated.
    ///
    /// This is a defect, not a user error: the mutation that produced it must be
    /// discarded.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn insufficient_stock(requested: u64, available: u64) -> Self {
        Self::InsufficientStock {
            requested,
            available,
        }
    }

    pub fn invalid_transition(from: impl ToString, to: impl ToString) -> Self {
        Self::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Whether this error signals a programming defect rather than bad input.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::InvariantViolation(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_invariant_violations_are_fatal() {
        assert!(DomainError::invariant("reserved_stock underflow").is_fatal());
        assert!(!DomainError::insufficient_stock(2, 1).is_fatal());
        assert!(!DomainError::invalid_transition("shipped", "cancelled").is_fatal());
        assert!(!DomainError::validation("quantity must be positive").is_fatal());
    }

    #[test]
    fn messages_carry_context() {
        let err = DomainError::insufficient_stock(3, 1);
        assert_eq!(
            err.to_string(),
            "insufficient stock: requested 3, available 1"
        );

        let err = DomainError::invalid_transition("pending", "shipped");
        assert_eq!(err.to_string(), "invalid status transition pending -> shipped");
    }
}
