//! Listener registry: fans inbound frames out to callbacks keyed by event name.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::SessionError;

type Callback = Arc<dyn Fn(&Value) -> anyhow::Result<()> + Send + Sync>;

/// Handle returned by [`ListenerRegistry::on`], used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Result of delivering one frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    pub failed: usize,
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    listeners: HashMap<String, Vec<(ListenerId, Callback)>>,
}

/// Event name → callbacks in registration order.
///
/// The lock is held only to register, unregister or snapshot; callbacks run
/// unlocked, so a callback may register or remove listeners itself. Such
/// changes apply from the next dispatch.
#[derive(Default)]
pub struct ListenerRegistry {
    inner: Mutex<Inner>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F>(&self, event: &str, callback: F) -> ListenerId
    where
        F: Fn(&Value) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let id = ListenerId(inner.next_id);
        inner
            .listeners
            .entry(event.to_string())
            .or_default()
            .push((id, Arc::new(callback)));
        id
    }

    /// Register a callback that receives the payload decoded as `T`.
    /// A payload that does not decode counts as a failed delivery.
    pub fn on_payload<T, F>(&self, event: &str, callback: F) -> ListenerId
    where
        T: DeserializeOwned,
        F: Fn(T) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.on(event, move |payload| {
            let decoded = T::deserialize(payload)?;
            callback(decoded)
        })
    }

    /// Remove a listener. Returns `false` if it was not registered for `event`.
    pub fn off(&self, event: &str, id: ListenerId) -> bool {
        let mut inner = self.inner.lock();
        let Some(list) = inner.listeners.get_mut(event) else {
            return false;
        };
        let before = list.len();
        list.retain(|(existing, _)| *existing != id);
        let removed = list.len() != before;
        if list.is_empty() {
            inner.listeners.remove(event);
        }
        removed
    }

    /// Invoke every callback registered for `event` with `payload`, in
    /// registration order. Errors and panics are logged and do not stop
    /// delivery to the remaining callbacks.
    pub fn dispatch(&self, event: &str, payload: &Value) -> Delivery {
        let snapshot: Vec<(ListenerId, Callback)> = match self.inner.lock().listeners.get(event) {
            Some(list) => list.clone(),
            None => return Delivery::default(),
        };

        let mut outcome = Delivery::default();
        for (id, callback) in snapshot {
            let failure = match catch_unwind(AssertUnwindSafe(|| callback(payload))) {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(format!("{e:#}")),
                Err(panic) => Some(panic_message(panic.as_ref())),
            };

            match failure {
                None => outcome.delivered += 1,
                Some(message) => {
                    outcome.failed += 1;
                    let err = SessionError::ListenerThrew {
                        event: event.to_string(),
                        message,
                    };
                    tracing::error!(listener = ?id, error = %err, "listener failed");
                }
            }
        }
        outcome
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "listener panicked".to_string()
    }
}
