//! Duplicate call suppression
//!
//! [`Flight`] coalesces concurrent work for the same key within one
//! process: the first caller (the leader) runs the producer while every
//! caller that arrives before the producer finishes waits and receives a
//! clone of the same result. A caller arriving after completion starts a
//! fresh producer run.
//!
//! The flight map lock is held only while inserting or removing call
//! records, never while a producer runs. If the leader is cancelled or
//! panics before storing a result, a drop guard still removes the record
//! and wakes all waiters, which then observe the interruption instead of
//! deadlocking; waiters themselves cannot cancel the shared producer.

use std::collections::HashMap;
use std::future::Future;
use std::pin::pin;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use tokio::sync::Notify;

/// One in-flight (or just-completed) producer run
struct Call<V> {
    /// Result slot. `Some(value)` once the producer finished, `None` when
    /// the leader was interrupted before producing a value.
    slot: OnceLock<Option<V>>,
    /// Wakes every waiter after the slot is written
    done: Notify,
}

impl<V> Call<V> {
    fn new() -> Self {
        Self {
            slot: OnceLock::new(),
            done: Notify::new(),
        }
    }
}

/// Removes the call record and wakes waiters when the leader finishes,
/// is cancelled, or panics.
struct LeaderGuard<'a, V> {
    calls: &'a Mutex<HashMap<String, Arc<Call<V>>>>,
    key: &'a str,
    call: &'a Call<V>,
}

impl<V> Drop for LeaderGuard<'_, V> {
    fn drop(&mut self) {
        // Marks the call as interrupted unless a result was stored first.
        let _ = self.call.slot.set(None);
        self.call.done.notify_waiters();
        self.calls.lock().remove(self.key);
    }
}

/// A namespace of keyed work with duplicate suppression.
///
/// # Example
///
/// ```
/// use peercache::singleflight::Flight;
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let flight: Flight<String> = Flight::new();
/// let value = flight
///     .run("user:42", async { "expensive".to_string() })
///     .await;
/// assert_eq!(value.as_deref(), Some("expensive"));
/// # });
/// ```
pub struct Flight<V> {
    calls: Mutex<HashMap<String, Arc<Call<V>>>>,
}

enum Role<V> {
    Leader(Arc<Call<V>>),
    Waiter(Arc<Call<V>>),
}

impl<V: Clone> Flight<V> {
    /// Create an empty flight map
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// Run `producer` for `key`, ensuring at most one producer executes
    /// concurrently per key within this process.
    ///
    /// Callers that overlap an in-flight run wait for it and receive a
    /// clone of its result. Returns `None` only if the run this caller
    /// joined was cancelled or panicked before completing.
    pub async fn run<F>(&self, key: &str, producer: F) -> Option<V>
    where
        F: Future<Output = V>,
    {
        let role = {
            let mut calls = self.calls.lock();
            match calls.get(key) {
                Some(existing) => Role::Waiter(Arc::clone(existing)),
                None => {
                    let call = Arc::new(Call::new());
                    calls.insert(key.to_owned(), Arc::clone(&call));
                    Role::Leader(call)
                }
            }
        };

        match role {
            Role::Leader(call) => {
                let guard = LeaderGuard {
                    calls: &self.calls,
                    key,
                    call: &call,
                };
                let value = producer.await;
                let _ = call.slot.set(Some(value.clone()));
                // Wakes waiters and removes the record, in that order.
                drop(guard);
                Some(value)
            }
            Role::Waiter(call) => {
                loop {
                    let mut notified = pin!(call.done.notified());
                    // Register for the wakeup before checking the slot, so a
                    // completion between check and await cannot be missed.
                    notified.as_mut().enable();
                    if let Some(result) = call.slot.get() {
                        return result.clone();
                    }
                    notified.await;
                }
            }
        }
    }

    /// Number of keys with a producer currently in flight
    pub fn in_flight(&self) -> usize {
        self.calls.lock().len()
    }
}

impl<V: Clone> Default for Flight<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> std::fmt::Debug for Flight<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Flight").finish_non_exhaustive()
    }
}
