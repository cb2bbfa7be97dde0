//! Promise-driven thread pool.
//!
//! Workers consume promises from a shared FIFO queue and settle them,
//! which runs the posted function. Note that a callback attached to a
//! returned promise does not necessarily continue on a pool thread: if
//! the posted function finishes before the dependent is attached, the
//! callback runs synchronously on the attaching thread.

pub mod queue;
mod worker;

pub use queue::ConcurrentQueue;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::promise::callback::Callback;
use crate::promise::{IntoValue, Promise};

// Distinguishes workers of different pools in the thread-local index.
static POOL_TOKEN: AtomicUsize = AtomicUsize::new(1);

pub(crate) struct Shared {
    pub(crate) queue: ConcurrentQueue<Promise>,
    pub(crate) mutex: Mutex<()>,
    pub(crate) condvar: Condvar,
}

impl Shared {
    fn enqueue(&self, p: Promise) {
        if self.queue.push(p) {
            // Empty -> non-empty: take the lock so no worker can slip
            // into wait() between its empty re-check and this notify.
            let _guard = self.mutex.lock();
            self.condvar.notify_one();
        } else {
            // Non-empty queue means at least one worker is active and
            // will keep draining, so a missed notification cannot strand
            // this item.
            self.condvar.notify_one();
        }
    }
}

struct WorkerHandle {
    thread: Option<JoinHandle<()>>,
    running: Arc<AtomicBool>,
}

/// Fixed-size worker pool that settles promises.
pub struct ThreadPool {
    shared: Arc<Shared>,
    workers: Vec<WorkerHandle>,
    token: usize,
    config: Config,
}

impl ThreadPool {
    /// Pool with the default configuration (one worker per hardware
    /// thread).
    pub fn new() -> Result<Self> {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Result<Self> {
        config.validate()?;
        let mut pool = Self {
            shared: Arc::new(Shared {
                queue: ConcurrentQueue::new(),
                mutex: Mutex::new(()),
                condvar: Condvar::new(),
            }),
            workers: Vec::new(),
            token: POOL_TOKEN.fetch_add(1, Ordering::Relaxed),
            config,
        };
        let n = pool.config.worker_threads();
        pool.resize(n)?;
        Ok(pool)
    }

    pub fn thread_count(&self) -> usize {
        self.workers.len()
    }

    /// 0-based index of the calling worker thread, or -1 when called from
    /// outside this pool.
    pub fn index(&self) -> isize {
        worker::current_index(self.token).map_or(-1, |i| i as isize)
    }

    /// Enqueue a function; the returned promise fulfils with its result
    /// or rejects with its panic.
    pub fn post<F, R>(&self, f: F) -> Promise
    where
        F: FnOnce() -> R + Send + 'static,
        R: IntoValue,
    {
        let p = Promise::from_parts(Some(Callback::nullary(f)), None);
        self.shared.enqueue(p.clone());
        p
    }

    /// Run a function on the pool: synchronously when already on a worker
    /// thread, otherwise via [`post`](ThreadPool::post).
    pub fn dispatch<F, R>(&self, f: F) -> Promise
    where
        F: FnOnce() -> R + Send + 'static,
        R: IntoValue,
    {
        if self.index() >= 0 {
            let p = Promise::from_parts(Some(Callback::nullary(f)), None);
            // A fresh root cannot refuse a terminal write.
            let _ = p.settle(());
            p
        } else {
            self.post(f)
        }
    }

    /// Curry [`dispatch`](ThreadPool::dispatch): the returned closure runs
    /// `f` on the pool each time it is called.
    pub fn wrap<F, R>(&self, f: F) -> impl Fn() -> Promise + Send + Sync + 'static
    where
        F: Fn() -> R + Clone + Send + Sync + 'static,
        R: IntoValue,
    {
        let shared = self.shared.clone();
        let token = self.token;
        move || {
            let p = Promise::from_parts(Some(Callback::nullary(f.clone())), None);
            if worker::current_index(token).is_some() {
                let _ = p.settle(());
            } else {
                shared.enqueue(p.clone());
            }
            p
        }
    }

    /// Grow or shrink the pool.
    ///
    /// Must not be called from a worker thread. Pending work is flushed
    /// before the count changes.
    pub fn set_thread_count(&mut self, n: usize) -> Result<()> {
        if n == 0 {
            return Err(Error::config("thread count must be > 0"));
        }
        if self.index() >= 0 {
            return Err(Error::pool(
                "set_thread_count must not be called from a worker",
            ));
        }
        self.resize(n)
    }

    /// Queue-order barrier: the returned handle completes once every
    /// worker has passed a point in the queue after this call.
    ///
    /// Waiting on the returned [`Barrier`] from a worker thread is a
    /// deadlock. Only meaningful on a FIFO queue.
    pub fn synchronize(&self) -> Barrier {
        let n = self.workers.len();
        let barrier = Barrier::new();
        if n == 0 {
            barrier.release();
            return barrier;
        }

        // Hold the condvar lock while queueing participants: once it is
        // released every worker is either active or waiting and newly
        // notified. enqueue() is not used here because it skips the lock
        // on a non-empty queue, which can deadlock with these blocking
        // participants.
        let guard = self.shared.mutex.lock();
        let remaining = Arc::new(AtomicUsize::new(n));
        for _ in 0..n {
            let remaining = remaining.clone();
            let barrier = barrier.clone();
            let participant = Promise::from_parts(
                Some(Callback::nullary(move || {
                    // The last worker through releases everyone else;
                    // blocking here guarantees each worker runs exactly
                    // one participant.
                    if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                        barrier.release();
                    } else {
                        barrier.wait();
                    }
                })),
                None,
            );
            self.shared.queue.push(participant);
        }
        self.shared.condvar.notify_all();
        drop(guard);
        barrier
    }

    fn resize(&mut self, n: usize) -> Result<()> {
        let old = self.workers.len();
        if n > old {
            self.synchronize().wait();
            for index in old..n {
                if let Err(e) = self.spawn_worker(index) {
                    // Unwind the partial grow.
                    self.stop_workers(old);
                    return Err(e);
                }
            }
        } else if n < old {
            self.synchronize().wait();
            self.stop_workers(n);
        }
        Ok(())
    }

    fn spawn_worker(&mut self, index: usize) -> Result<()> {
        let running = Arc::new(AtomicBool::new(true));
        let shared = self.shared.clone();
        let flag = running.clone();
        let token = self.token;

        let mut builder =
            thread::Builder::new().name(format!("{}-{}", self.config.thread_name_prefix, index));
        if let Some(stack_size) = self.config.stack_size {
            builder = builder.stack_size(stack_size);
        }
        let thread = builder
            .spawn(move || worker::run(shared, flag, token, index))
            .map_err(|e| Error::pool(format!("spawn failed: {}", e)))?;

        self.workers.push(WorkerHandle {
            thread: Some(thread),
            running,
        });
        Ok(())
    }

    // Stop and join every worker with index >= keep.
    fn stop_workers(&mut self, keep: usize) {
        let removed = self.workers.split_off(keep);
        {
            // The lock guarantees sleeping workers re-test their flag.
            let _guard = self.shared.mutex.lock();
            for w in &removed {
                w.running.store(false, Ordering::Release);
            }
            self.shared.condvar.notify_all();
        }
        for mut w in removed {
            if let Some(thread) = w.thread.take() {
                let _ = thread.join();
            }
        }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        if !self.workers.is_empty() {
            self.synchronize().wait();
            self.stop_workers(0);
        }
    }
}

impl std::fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadPool")
            .field("threads", &self.thread_count())
            .finish()
    }
}

/// Completion handle returned by [`ThreadPool::synchronize`].
#[derive(Clone)]
pub struct Barrier {
    inner: Arc<BarrierInner>,
}

struct BarrierInner {
    done: Mutex<bool>,
    condvar: Condvar,
}

impl Barrier {
    fn new() -> Self {
        Barrier {
            inner: Arc::new(BarrierInner {
                done: Mutex::new(false),
                condvar: Condvar::new(),
            }),
        }
    }

    fn release(&self) {
        let mut done = self.inner.done.lock();
        *done = true;
        self.inner.condvar.notify_all();
    }

    /// Block until every worker has passed the synchronization point.
    /// Calling this from a worker of the same pool deadlocks.
    pub fn wait(&self) {
        let mut done = self.inner.done.lock();
        while !*done {
            self.inner.condvar.wait(&mut done);
        }
    }

    /// Whether the barrier has already completed.
    pub fn complete(&self) -> bool {
        *self.inner.done.lock()
    }
}

impl std::fmt::Debug for Barrier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Barrier")
            .field("complete", &self.complete())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn test_index_outside_pool() {
        let pool = ThreadPool::with_config(Config::builder().num_threads(2).build().unwrap())
            .unwrap();
        assert_eq!(pool.index(), -1);
    }

    #[test]
    fn test_synchronize_flushes_posted_work() {
        let pool = ThreadPool::with_config(Config::builder().num_threads(3).build().unwrap())
            .unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..20 {
            let counter = counter.clone();
            pool.post(move || {
                counter.fetch_add(1, Ordering::Relaxed);
            });
        }
        pool.synchronize().wait();
        assert_eq!(counter.load(Ordering::Relaxed), 20);
    }
}
