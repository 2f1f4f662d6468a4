//! Audit sink abstraction (mechanics only).
//!
//! A sink is a **one-way push** to whatever stores or forwards the audit trail.
//! The core never queries it back.
//!
//! ## Delivery
//!
//! Recording is fire-and-forget from the caller's perspective, but a failed
//! `record` is never swallowed: sinks return `AuditError` and callers surface it
//! (log at `error` and report it upward). A missing audit row is a defect, not a
//! condition to retry silently.

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::event::AuditEvent;

/// Audit sink failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuditError {
    /// Internal lock poisoning (in-process sinks).
    #[error("audit sink poisoned")]
    Poisoned,
    /// The sink rejected or could not deliver the event.
    #[error("audit sink unavailable: {0}")]
    Unavailable(String),
}

/// Receiving side of the audit trail.
///
/// Implementations must be safe to share across request threads and the expiry
/// scheduler thread.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent) -> Result<(), AuditError>;
}

impl<S> AuditSink for Arc<S>
where
    S: AuditSink + ?Sized,
{
    fn record(&self, event: AuditEvent) -> Result<(), AuditError> {
        (**self).record(event)
    }
}

/// Sink that writes every event as a structured `tracing` record.
///
/// Useful when the audit store lives behind a log pipeline.
#[derive(Debug, Copy, Clone, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) -> Result<(), AuditError> {
        let old_value = event.old_value().map(|v| v.to_string());
        let new_value = event.new_value().map(|v| v.to_string());
        info!(
            target: "audit",
            event_id = %event.event_id(),
            actor = %event.actor(),
            action = %event.action(),
            subject_type = ?event.subject_type(),
            subject_id = %event.subject_id(),
            old_value = ?old_value,
            new_value = ?new_value,
            timestamp = %event.timestamp(),
            "audit"
        );
        Ok(())
    }
}
