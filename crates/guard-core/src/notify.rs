//! In-process notifier implementations.

use std::sync::Mutex;

use crate::events::RiskEvent;
use crate::traits::Notifier;

/// Discards every event. Used when no notification channel is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn emit(&self, _event: RiskEvent) {}
}

/// Keeps events in memory, for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    events: Mutex<Vec<RiskEvent>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything emitted so far, in order.
    pub fn events(&self) -> Vec<RiskEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Number of emitted events of the given kind (see [`RiskEvent::kind`]).
    pub fn count(&self, kind: &str) -> usize {
        self.events
            .lock()
            .map(|events| events.iter().filter(|e| e.kind() == kind).count())
            .unwrap_or(0)
    }
}

impl Notifier for MemoryNotifier {
    fn emit(&self, event: RiskEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_notifier_records_in_order() {
        let notifier = MemoryNotifier::new();
        notifier.emit(RiskEvent::Error {
            message: "first".to_string(),
        });
        notifier.emit(RiskEvent::ActionFailure {
            action: "cancel_all_pending".to_string(),
            detail: "1 failed".to_string(),
        });

        let events = notifier.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind(), "error");
        assert_eq!(notifier.count("action_failure"), 1);
        assert_eq!(notifier.count("startup"), 0);
    }
}
