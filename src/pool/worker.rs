use std::cell::Cell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::pool::Shared;
use crate::promise::Promise;

thread_local! {
    // (pool token, worker index) when the current thread is a worker.
    static CURRENT: Cell<Option<(usize, usize)>> = const { Cell::new(None) };
}

pub(crate) fn current_index(token: usize) -> Option<usize> {
    CURRENT.with(|c| c.get().and_then(|(t, i)| (t == token).then_some(i)))
}

// Main worker loop: drain the queue, sleep on the condvar when empty.
pub(crate) fn run(shared: Arc<Shared>, running: Arc<AtomicBool>, token: usize, index: usize) {
    CURRENT.with(|c| c.set(Some((token, index))));

    while running.load(Ordering::Acquire) {
        if let Some(p) = shared.queue.pop() {
            execute(p);
        } else {
            // Re-check under the lock to close the race with a push that
            // notified before this thread started waiting.
            let mut guard = shared.mutex.lock();
            if let Some(p) = shared.queue.pop() {
                // Never run user code with the lock held.
                drop(guard);
                execute(p);
            } else if running.load(Ordering::Acquire) {
                shared.condvar.wait(&mut guard);
            }
        }
    }
}

// Settling runs the posted function. Panics are captured into the promise
// chain, so only machinery errors can surface here; they must not kill the
// worker.
fn execute(p: Promise) {
    if let Err(e) = p.settle(()) {
        eprintln!("cascade: task settlement failed: {}", e);
    }
}
