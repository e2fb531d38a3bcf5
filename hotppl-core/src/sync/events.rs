//! Event subscription table.
//!
//! Handlers are registered per event name and called synchronously, in
//! registration order, each time the client emits that name. A handler that
//! panics is logged and skipped; the remaining handlers still run.

use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value;

/// Snapshot received on open.
pub const CONNECTED: &str = "connected";
/// Any known `sync_event`, with the whole nested event as data.
pub const SYNC_EVENT: &str = "sync_event";
pub const NEW_SUBMISSION: &str = "new_submission";
pub const VOTE_CAST: &str = "vote_cast";
pub const LEADERBOARD_UPDATED: &str = "leaderboard_updated";
pub const LIVE_STATS_UPDATED: &str = "live_stats_updated";
pub const TRENDING_UPDATED: &str = "trending_updated";
/// Incremental push passed through from the server.
pub const LIVE_UPDATE: &str = "live_update";

/// Type alias for a registered event handler.
pub type Handler = Arc<dyn Fn(&Value) + Send + Sync>;

/// Outcome of one emission.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct EmitReport {
    /// Handlers that returned normally
    pub(crate) delivered: usize,
    /// Handlers that panicked
    pub(crate) failed: usize,
}

/// Mapping from event name to handlers, in registration order.
#[derive(Default)]
pub struct EventBus {
    handlers: RwLock<HashMap<String, Vec<Handler>>>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
        let counts: HashMap<&str, usize> = handlers
            .iter()
            .map(|(name, list)| (name.as_str(), list.len()))
            .collect();
        f.debug_struct("EventBus").field("handlers", &counts).finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for `event`.
    ///
    /// The same closure may be registered more than once; there is no way to
    /// remove a handler.
    pub fn on(&self, event: impl Into<String>, handler: impl Fn(&Value) + Send + Sync + 'static) {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        handlers
            .entry(event.into())
            .or_default()
            .push(Arc::new(handler));
    }

    /// Calls every handler registered for `event` with `data`.
    ///
    /// The handler list is copied before the calls, so handlers may register
    /// further handlers; those only see later emissions.
    pub(crate) fn emit(&self, event: &str, data: &Value) -> EmitReport {
        let handlers: Vec<Handler> = {
            let table = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
            match table.get(event) {
                Some(list) => list.clone(),
                None => return EmitReport::default(),
            }
        };

        let mut report = EmitReport::default();
        for (index, handler) in handlers.iter().enumerate() {
            match catch_unwind(AssertUnwindSafe(|| handler(data))) {
                Ok(()) => report.delivered += 1,
                Err(payload) => {
                    report.failed += 1;
                    tracing::warn!(
                        "Handler #{} for '{}' panicked: {}",
                        index,
                        event,
                        panic_message(payload.as_ref())
                    );
                }
            }
        }

        report
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    fn handler_count(bus: &EventBus, event: &str) -> usize {
        let handlers = bus.handlers.read().unwrap();
        handlers.get(event).map_or(0, Vec::len)
    }

    #[test]
    fn test_handlers_run_in_registration_order() {
        let bus = EventBus::new();
        let calls = Arc::new(Mutex::new(Vec::new()));

        let first = calls.clone();
        bus.on(VOTE_CAST, move |data| {
            first.lock().unwrap().push(("first", data.clone()));
        });
        let second = calls.clone();
        bus.on(VOTE_CAST, move |data| {
            second.lock().unwrap().push(("second", data.clone()));
        });

        let payload = json!({"submission_id": "s1", "new_vote_count": 2});
        let report = bus.emit(VOTE_CAST, &payload);

        assert_eq!(report, EmitReport { delivered: 2, failed: 0 });
        let calls = calls.lock().unwrap();
        assert_eq!(
            *calls,
            vec![("first", payload.clone()), ("second", payload.clone())]
        );
    }

    #[test]
    fn test_emit_without_handlers() {
        let bus = EventBus::new();
        assert_eq!(bus.emit(CONNECTED, &json!({})), EmitReport::default());
    }

    #[test]
    fn test_duplicate_registration_is_kept() {
        let bus = EventBus::new();
        let count = Arc::new(Mutex::new(0));

        for _ in 0..2 {
            let count = count.clone();
            bus.on(CONNECTED, move |_| *count.lock().unwrap() += 1);
        }

        bus.emit(CONNECTED, &json!(null));
        assert_eq!(*count.lock().unwrap(), 2);
        assert_eq!(handler_count(&bus, CONNECTED), 2);
    }

    #[test]
    fn test_panicking_handler_does_not_block_others() {
        let bus = EventBus::new();
        let reached = Arc::new(Mutex::new(false));

        bus.on(LEADERBOARD_UPDATED, |_| panic!("subscriber bug"));
        let flag = reached.clone();
        bus.on(LEADERBOARD_UPDATED, move |_| *flag.lock().unwrap() = true);

        let report = bus.emit(LEADERBOARD_UPDATED, &json!([]));

        assert_eq!(report, EmitReport { delivered: 1, failed: 1 });
        assert!(*reached.lock().unwrap());
    }

    #[test]
    fn test_handler_can_register_during_emit() {
        let bus = Arc::new(EventBus::new());
        let inner = bus.clone();
        bus.on(CONNECTED, move |_| inner.on(CONNECTED, |_| {}));

        let report = bus.emit(CONNECTED, &json!({}));
        assert_eq!(report.delivered, 1);
        assert_eq!(handler_count(&bus, CONNECTED), 2);
    }
}
