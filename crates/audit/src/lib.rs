//! Audit trail events and the sink boundary they are pushed through.
//!
//! The audit recorder is an external collaborator: the core emits one
//! [`AuditEvent`] per significant state change and never reads them back.

pub mod event;
pub mod in_memory;
pub mod sink;

pub use event::{Actor, AuditAction, AuditEvent, SubjectType};
pub use in_memory::InMemoryAuditSink;
pub use sink::{AuditError, AuditSink, TracingAuditSink};
