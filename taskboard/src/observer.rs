//! Handler registry with unsubscribe tokens.
//!
//! Handlers are registered for one key (or for every key) and invoked
//! synchronously by [`Observers::notify`]. The registry lock is released
//! before any handler runs, so a handler may subscribe or unsubscribe.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

/// Returned by `subscribe`; pass it to `unsubscribe` to remove the handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionToken(u64);

type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Entry<K, E> {
    token: SubscriptionToken,
    key: Option<K>,
    handler: Handler<E>,
}

/// Handlers for events of type `E`, filtered by key `K`.
pub struct Observers<K, E> {
    next_token: AtomicU64,
    entries: Mutex<Vec<Entry<K, E>>>,
}

impl<K, E> Default for Observers<K, E> {
    fn default() -> Self {
        Self {
            next_token: AtomicU64::new(1),
            entries: Mutex::new(Vec::new()),
        }
    }
}

impl<K: PartialEq + Copy, E> Observers<K, E> {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for `key`, or for every key when `None`.
    pub fn subscribe(
        &self,
        key: Option<K>,
        handler: impl Fn(&E) + Send + Sync + 'static,
    ) -> SubscriptionToken {
        let token = SubscriptionToken(self.next_token.fetch_add(1, Ordering::Relaxed));
        self.entries.lock().push(Entry {
            token,
            key,
            handler: Arc::new(handler),
        });
        token
    }

    /// Removes a handler. Returns `false` if the token was unknown.
    pub fn unsubscribe(&self, token: SubscriptionToken) -> bool {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|e| e.token != token);
        entries.len() != before
    }

    /// Invokes every handler registered for `key` or for every key.
    ///
    /// Returns the number of handlers invoked.
    pub fn notify(&self, key: K, event: &E) -> usize {
        let handlers: Vec<Handler<E>> = self
            .entries
            .lock()
            .iter()
            .filter(|e| e.key.is_none_or(|k| k == key))
            .map(|e| Arc::clone(&e.handler))
            .collect();
        for handler in &handlers {
            handler(event);
        }
        handlers.len()
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns `true` if no handler is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
