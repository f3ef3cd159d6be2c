//! # Event Bus
//!
//! Typed publish/subscribe for session observers.
//!
//! Delivery is synchronous: [`Topic::publish`] calls every subscriber
//! registered at that moment, in subscription order, before returning.
//! Subscribers are snapshotted first, so a callback may subscribe or
//! unsubscribe without deadlocking the topic. A panicking subscriber is
//! logged and skipped; the rest still run.
//!
//! ```
//! use std::sync::{Arc, Mutex};
//! use blethermal::events::Topic;
//!
//! let topic = Topic::new();
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let sink = Arc::clone(&seen);
//! let sub = topic.subscribe(move |n: &u32| sink.lock().unwrap().push(*n));
//!
//! topic.publish(&1);
//! sub.unsubscribe();
//! topic.publish(&2);
//! assert_eq!(*seen.lock().unwrap(), vec![1]);
//! ```

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use crate::session::ConnectionState;
use crate::transport::host::DeviceInfo;

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Subscribers<T> {
    next_id: u64,
    entries: Vec<(u64, Callback<T>)>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// One stream of notifications of type `T`.
pub struct Topic<T> {
    subscribers: Arc<Mutex<Subscribers<T>>>,
}

impl<T: 'static> Topic<T> {
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(Subscribers {
                next_id: 0,
                entries: Vec::new(),
            })),
        }
    }

    /// Register `callback` for every later [`publish`](Self::publish).
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = {
            let mut subs = lock(&self.subscribers);
            let id = subs.next_id;
            subs.next_id += 1;
            subs.entries.push((id, Arc::new(callback)));
            id
        };

        let weak: Weak<Mutex<Subscribers<T>>> = Arc::downgrade(&self.subscribers);
        Subscription {
            cancel: Box::new(move || {
                if let Some(subs) = weak.upgrade() {
                    lock(&subs).entries.retain(|(entry, _)| *entry != id);
                }
            }),
        }
    }

    /// Deliver `value` to a snapshot of the current subscribers.
    pub fn publish(&self, value: &T) {
        let snapshot: Vec<Callback<T>> = lock(&self.subscribers)
            .entries
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();

        for callback in snapshot {
            if panic::catch_unwind(AssertUnwindSafe(|| callback(value))).is_err() {
                tracing::error!("Event subscriber panicked");
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.subscribers).entries.len()
    }
}

impl<T: 'static> Default for Topic<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Topic<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Topic")
            .field("subscribers", &lock(&self.subscribers).entries.len())
            .finish()
    }
}

/// Token returned by [`Topic::subscribe`].
///
/// Dropping the token keeps the subscription alive; call
/// [`unsubscribe`](Self::unsubscribe) to remove it.
#[must_use = "keep the token to be able to unsubscribe later"]
pub struct Subscription {
    cancel: Box<dyn FnOnce() + Send + Sync>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        (self.cancel)();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Subscription")
    }
}

/// The two topics a [`PrinterSession`](crate::session::PrinterSession) publishes.
#[derive(Debug, Default)]
pub struct EventBus {
    /// Every state transition.
    pub connection: Topic<ConnectionState>,
    /// Active printer set (`Some`) or forgotten (`None`).
    pub device: Topic<Option<DeviceInfo>>,
}
