//! Timed promise settlement.
//!
//! A [`Delay`] service owns one waiter thread and a deadline-ordered map
//! of pending promises. Each entry is fulfilled at or after its monotonic
//! deadline. Callbacks on delayed promises run on the waiter thread, so
//! they should be short; a long callback stalls every later deadline.
//!
//! Dropping the service stops the waiter and rejects every outstanding
//! entry with [`Cancelled`].

use std::collections::BTreeMap;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::promise::{Promise, Rejection};

/// Sentinel rejection used for external cancel and shutdown.
#[derive(Debug, thiserror::Error)]
#[error("delayed promise has been cancelled")]
pub struct Cancelled;

struct State {
    // Deadline multimap; the sequence number disambiguates equal
    // deadlines and preserves insertion order among them.
    entries: BTreeMap<(Instant, u64), Promise>,
    seq: u64,
    running: bool,
}

struct Shared {
    state: Mutex<State>,
    condvar: Condvar,
}

/// Timer service settling promises at monotonic deadlines.
pub struct Delay {
    shared: Arc<Shared>,
    waiter: Option<JoinHandle<()>>,
}

impl Delay {
    /// Start the service and its waiter thread.
    pub fn new() -> Result<Self> {
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                entries: BTreeMap::new(),
                seq: 0,
                running: true,
            }),
            condvar: Condvar::new(),
        });
        let waiter_shared = shared.clone();
        let waiter = thread::Builder::new()
            .name("cascade-delay".to_string())
            .spawn(move || run(waiter_shared))
            .map_err(|e| Error::Delay(format!("waiter spawn failed: {}", e)))?;
        Ok(Self {
            shared,
            waiter: Some(waiter),
        })
    }

    /// A promise fulfilled no sooner than `duration` from now.
    pub fn after(&self, duration: Duration) -> Promise {
        let p = Promise::new();
        let deadline = Instant::now() + duration;
        let mut st = self.shared.state.lock();
        let key = (deadline, st.seq);
        st.seq += 1;
        st.entries.insert(key, p.clone());
        // Wake the waiter only when the new entry becomes the next one.
        let first = st.entries.keys().next() == Some(&key);
        drop(st);
        if first {
            self.shared.condvar.notify_one();
        }
        p
    }

    /// Cancel a pending entry, rejecting its promise with [`Cancelled`].
    ///
    /// Returns true iff a live entry was removed.
    pub fn cancel(&self, p: &Promise) -> bool {
        self.cancel_with(p, Rejection::new(Cancelled))
    }

    /// Cancel a pending entry, rejecting its promise with `cause`.
    pub fn cancel_with(&self, p: &Promise, cause: Rejection) -> bool {
        // Entries are keyed by deadline, so lookup by identity is a
        // linear scan.
        let victim = {
            let mut st = self.shared.state.lock();
            let key = st
                .entries
                .iter()
                .find(|&(_, entry)| entry == p)
                .map(|(key, _)| *key);
            key.and_then(|k| st.entries.remove(&k))
        };
        match victim {
            Some(promise) => {
                // Reject outside the lock; dependents run here.
                let _ = promise.reject(cause);
                true
            }
            None => false,
        }
    }
}

impl Drop for Delay {
    fn drop(&mut self) {
        {
            let mut st = self.shared.state.lock();
            st.running = false;
            self.shared.condvar.notify_all();
        }
        if let Some(waiter) = self.waiter.take() {
            let _ = waiter.join();
        }
    }
}

impl std::fmt::Debug for Delay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delay")
            .field("pending", &self.shared.state.lock().entries.len())
            .finish()
    }
}

fn run(shared: Arc<Shared>) {
    loop {
        let due = {
            let mut st = shared.state.lock();
            if !st.running {
                break;
            }
            // Sleep until signaled or the earliest deadline.
            match st.entries.keys().next().map(|(deadline, _)| *deadline) {
                None => {
                    shared.condvar.wait(&mut st);
                }
                Some(deadline) => {
                    let _ = shared.condvar.wait_until(&mut st, deadline);
                }
            }

            // Collect every expired entry while holding the lock.
            let now = Instant::now();
            let mut due = Vec::new();
            while st
                .entries
                .first_key_value()
                .map_or(false, |((deadline, _), _)| *deadline <= now)
            {
                if let Some((_, p)) = st.entries.pop_first() {
                    due.push(p);
                }
            }
            due
        };

        // Fulfil outside the lock; dependents run on this thread.
        for p in due {
            let _ = p.settle(());
        }
    }

    // Shutdown: reject whatever is left.
    let remaining = {
        let mut st = shared.state.lock();
        std::mem::take(&mut st.entries)
    };
    for (_, p) in remaining {
        let _ = p.reject(Rejection::new(Cancelled));
    }
}
