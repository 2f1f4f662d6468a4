//! In-memory audit sink for tests/dev.

use std::sync::{Mutex, MutexGuard};

use crate::event::{AuditAction, AuditEvent};
use crate::sink::{AuditError, AuditSink};

/// In-memory audit log.
///
/// - No IO
/// - Keeps every recorded event in order
/// - Once poisoned, `record` fails with `AuditError::Poisoned`; reads still see
///   everything recorded before the panic
#[derive(Debug, Default)]
pub struct InMemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> MutexGuard<'_, Vec<AuditEvent>> {
        match self.events.lock() {
            Ok(events) => events,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Snapshot of every event recorded so far.
    pub fn events(&self) -> Vec<AuditEvent> {
        self.read().clone()
    }

    /// Events of one action kind, in record order.
    pub fn by_action(&self, action: AuditAction) -> Vec<AuditEvent> {
        self.read()
            .iter()
            .filter(|e| e.action() == action)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&self, event: AuditEvent) -> Result<(), AuditError> {
        let mut events = self.events.lock().map_err(|_| AuditError::Poisoned)?;
        events.push(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Actor, SubjectType};
    use chrono::Utc;
    use stockhold_core::ReservationId;

    fn expired_event() -> AuditEvent {
        AuditEvent::new(
            Actor::System,
            AuditAction::ReservationExpired,
            SubjectType::Reservation,
            ReservationId::new(),
            Utc::now(),
        )
    }

    #[test]
    fn records_in_order_and_filters_by_action() {
        let sink = InMemoryAuditSink::new();
        let first = expired_event();
        let second = AuditEvent::new(
            Actor::System,
            AuditAction::StockAdjusted,
            SubjectType::Product,
            ReservationId::new(),
            Utc::now(),
        );

        sink.record(first.clone()).unwrap();
        sink.record(second.clone()).unwrap();

        assert_eq!(sink.events(), vec![first.clone(), second]);
        assert_eq!(sink.by_action(AuditAction::ReservationExpired), vec![first]);
    }

    #[test]
    fn poisoned_sink_rejects_records_but_keeps_history() {
        let sink = std::sync::Arc::new(InMemoryAuditSink::new());
        let kept = expired_event();
        sink.record(kept.clone()).unwrap();

        let poisoner = sink.clone();
        let result = std::thread::spawn(move || {
            let _guard = poisoner.events.lock().unwrap();
            panic!("poison the audit log");
        })
        .join();
        assert!(result.is_err());

        assert_eq!(sink.record(expired_event()), Err(AuditError::Poisoned));
        assert_eq!(sink.len(), 1);
        assert_eq!(sink.events(), vec![kept.clone()]);
        assert_eq!(sink.by_action(AuditAction::ReservationExpired), vec![kept]);
    }
}
