//! Two-lock unbounded MPMC FIFO.
//!
//! This queue follows the two-lock algorithm from "Simple, Fast, and
//! Practical Non-Blocking and Blocking Concurrent Queue Algorithms"
//! (Michael & Scott), with one twist: when the queue is empty the head
//! sentinel's `next` points to itself instead of null. `push` swaps the
//! tail's `next` pointer, so the swapped-out value tells it whether the
//! queue just went from empty to non-empty — producers can drive wake-one
//! notification without ever touching consumer state.
//!
//! Producers only take the tail lock, consumers only the head lock, and
//! both locks sit on separate cache lines.

use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

use crate::util::{CachePadded, SpinLock};

struct Node<T> {
    value: Option<T>,
    next: AtomicPtr<Node<T>>,
}

impl<T> Node<T> {
    fn boxed(value: Option<T>) -> *mut Node<T> {
        Box::into_raw(Box::new(Node {
            value,
            next: AtomicPtr::new(ptr::null_mut()),
        }))
    }
}

/// Multi-producer multi-consumer unbounded FIFO.
pub struct ConcurrentQueue<T> {
    head_lock: CachePadded<SpinLock>,
    tail_lock: CachePadded<SpinLock>,
    head: CachePadded<AtomicPtr<Node<T>>>,
    tail: CachePadded<AtomicPtr<Node<T>>>,
}

unsafe impl<T: Send> Send for ConcurrentQueue<T> {}
unsafe impl<T: Send> Sync for ConcurrentQueue<T> {}

impl<T> ConcurrentQueue<T> {
    pub fn new() -> Self {
        let sentinel = Node::<T>::boxed(None);
        // Self-loop marks the empty queue.
        unsafe {
            (*sentinel).next.store(sentinel, Ordering::Relaxed);
        }
        Self {
            head_lock: CachePadded::new(SpinLock::new()),
            tail_lock: CachePadded::new(SpinLock::new()),
            head: CachePadded::new(AtomicPtr::new(sentinel)),
            tail: CachePadded::new(AtomicPtr::new(sentinel)),
        }
    }

    /// Append a value. Returns true iff the queue was empty before the
    /// call, i.e. iff one sleeping consumer should be woken.
    pub fn push(&self, value: T) -> bool {
        let node = Node::boxed(Some(value));
        let _guard = self.tail_lock.lock();
        unsafe {
            let tail = self.tail.load(Ordering::Relaxed);
            // A non-empty tail has a null next; the self-loop shows up
            // here exactly once per empty->non-empty transition.
            let prev = (*tail).next.swap(node, Ordering::AcqRel);
            self.tail.store(node, Ordering::Relaxed);
            !prev.is_null()
        }
    }

    /// Dequeue the oldest value, or `None` if the queue is empty.
    pub fn pop(&self) -> Option<T> {
        let guard = self.head_lock.lock();
        unsafe {
            let head = self.head.load(Ordering::Relaxed);
            let next = (*head).next.load(Ordering::Acquire);
            if next.is_null() || next == head {
                return None;
            }
            let value = (*next).value.take();
            self.head.store(next, Ordering::Relaxed);
            // Restore the self-loop if the queue just drained.
            let _ = (*next).next.compare_exchange(
                ptr::null_mut(),
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            );
            drop(guard);
            drop(Box::from_raw(head));
            value
        }
    }
}

impl<T> Default for ConcurrentQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for ConcurrentQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConcurrentQueue").finish()
    }
}

impl<T> Drop for ConcurrentQueue<T> {
    fn drop(&mut self) {
        unsafe {
            let mut cur = self.head.load(Ordering::Relaxed);
            while !cur.is_null() {
                let next = (*cur).next.load(Ordering::Relaxed);
                let next = if next == cur { ptr::null_mut() } else { next };
                drop(Box::from_raw(cur));
                cur = next;
            }
        }
    }
}
