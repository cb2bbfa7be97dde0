//! Shared settlement state and the settle/attach algorithms.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::promise::callback::Callback;
use crate::promise::handlers::{self, Mismatch, MismatchAction};
use crate::promise::value::{any_token, promise_token, void_token, Rejection, TypeToken, Value};
use crate::promise::Promise;

/// State shared by every handle to one logical promise.
pub(crate) struct Inner {
    state: Mutex<State>,
    settled: AtomicBool,
    closed: AtomicBool,
    undelivered: AtomicBool,
    meta: Meta,
}

struct State {
    value: Value,
    // Back-reference only; ownership runs downstream.
    upstream: Option<Weak<Inner>>,
    // Dependents in attachment order; propagation preserves it.
    downstream: Vec<Promise>,
    on_fulfil: Option<Callback>,
    on_reject: Option<Callback>,
}

// Immutable callback facts needed by attachment checks, copied out at
// construction so they can be read without the state lock.
#[derive(Clone, Copy)]
struct Meta {
    steals: bool,
    fulfil_arg: Option<TypeToken>,
    result: Option<TypeToken>,
}

impl Inner {
    pub(crate) fn new(on_fulfil: Option<Callback>, on_reject: Option<Callback>) -> Self {
        let meta = Meta {
            steals: on_fulfil.as_ref().map_or(false, |f| f.consumes()),
            fulfil_arg: on_fulfil.as_ref().map(|f| f.arg_token()),
            result: on_fulfil
                .as_ref()
                .map(|f| f.result_token())
                .or_else(|| on_reject.as_ref().map(|r| r.result_token())),
        };
        Self {
            state: Mutex::new(State {
                value: Value::Unset,
                upstream: None,
                downstream: Vec::new(),
                on_fulfil,
                on_reject,
            }),
            settled: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            undelivered: AtomicBool::new(false),
            meta,
        }
    }

    pub(crate) fn is_settled(&self) -> bool {
        self.settled.load(Ordering::Acquire)
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }

    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// Write a terminal value.
    ///
    /// `direct` marks the public settle/reject entry points; propagation
    /// and immediate delivery re-enter with `direct = false`.
    pub(crate) fn settle(this: &Arc<Inner>, value: Value, direct: bool) -> Result<()> {
        // Select and consume the matching callback. Discarding both slots
        // here guarantees at-most-once invocation.
        let callback = {
            let mut st = this.state.lock();
            if direct {
                if st.upstream.is_some() {
                    return Err(Error::DependentSettle);
                }
                if !st.value.is_unset() {
                    return Err(Error::AlreadySettled);
                }
            }
            let on_fulfil = st.on_fulfil.take();
            let on_reject = st.on_reject.take();
            if value.is_rejected() {
                on_reject
            } else {
                on_fulfil
            }
        };

        // Run the callback with no locks held. A panic becomes the
        // rejected outcome; an argument-type mismatch is offered to the
        // global handler first.
        let outcome = match callback {
            Some(cb) => match catch_unwind(AssertUnwindSafe(|| cb.invoke(value))) {
                Ok(Ok(transformed)) => transformed,
                Ok(Err(Error::TypeMismatch { from, to })) => {
                    match handlers::mismatch_action(&Mismatch { from, to }) {
                        MismatchAction::Capture => {
                            Value::rejected(Rejection::new(Error::TypeMismatch { from, to }))
                        }
                        MismatchAction::Propagate => {
                            return Err(Error::TypeMismatch { from, to })
                        }
                    }
                }
                Ok(Err(other)) => Value::rejected(Rejection::new(other)),
                Err(payload) => Value::rejected(Rejection::from_panic(payload)),
            },
            None => value,
        };

        // A promise outcome is not stored; it adopts this promise as a
        // dependent and will settle it in turn.
        let outcome = match outcome.into_promise() {
            Ok(chained) => return Inner::link(chained.inner(), this, false),
            Err(v) => v,
        };

        // Commit, then collect one delivery per dependent while the value
        // is still pinned by the lock: a move for the unique consuming
        // dependent, a fallible clone for the rest.
        let handoff = {
            let mut st = this.state.lock();
            if direct && !st.value.is_unset() {
                return Err(Error::AlreadySettled);
            }
            st.upstream = None;
            st.value = outcome;
            this.settled.store(true, Ordering::Release);

            if st.downstream.is_empty() {
                if st.value.is_rejected() {
                    this.undelivered.store(true, Ordering::Release);
                }
                Vec::new()
            } else {
                let children = std::mem::take(&mut st.downstream);
                let mut handoff = Vec::with_capacity(children.len());
                for child in children {
                    let delivery = if child.inner().meta.steals {
                        std::mem::replace(&mut st.value, Value::Moved)
                    } else {
                        st.value
                            .try_clone()
                            .unwrap_or_else(|e| Value::rejected(Rejection::new(e)))
                    };
                    handoff.push((child, delivery));
                }
                handoff
            }
        };

        // Dependent callbacks run outside the lock, in attachment order,
        // on this settling thread.
        for (child, delivery) in handoff {
            Inner::settle(child.inner(), delivery, false)?;
        }
        Ok(())
    }

    /// Attach `next` as a dependent of `this`.
    ///
    /// `user_attach` is set for the public then/except path, which must
    /// respect the closed flag and the early type check; internal
    /// re-linking of a promise returned by a callback bypasses both.
    pub(crate) fn link(this: &Arc<Inner>, next: &Arc<Inner>, user_attach: bool) -> Result<()> {
        {
            let mut nst = next.state.lock();
            nst.upstream = Some(Arc::downgrade(this));
        }

        let mut st = this.state.lock();
        if user_attach && this.closed.load(Ordering::Relaxed) {
            return Err(Error::Closed);
        }

        if !this.settled.load(Ordering::Acquire) {
            if user_attach {
                this.check_types(next)?;
            }
            st.downstream.push(Promise::from_inner(next.clone()));
            if next.meta.steals {
                this.closed.store(true, Ordering::Release);
            }
            Ok(())
        } else {
            // Already settled: deliver immediately. The lock serializes
            // this with any in-progress settlement, so a consuming
            // dependent cannot steal a value mid-propagation.
            if st.value.is_rejected() {
                this.undelivered.store(false, Ordering::Release);
            }
            let delivery = if next.meta.steals {
                this.closed.store(true, Ordering::Release);
                std::mem::replace(&mut st.value, Value::Moved)
            } else {
                st.value
                    .try_clone()
                    .unwrap_or_else(|e| Value::rejected(Rejection::new(e)))
            };
            drop(st);
            Inner::settle(next, delivery, false)
        }
    }

    // Mismatches between an upstream result type and a downstream argument
    // type would be found during propagation anyway; failing at attachment
    // is much easier to debug. Inconclusive when either side is erased,
    // void, or a promise.
    fn check_types(&self, next: &Inner) -> Result<()> {
        if let (Some(o), Some(i)) = (self.meta.result, next.meta.fulfil_arg) {
            let conclusive = o.id != any_token().id
                && o.id != promise_token().id
                && i.id != any_token().id
                && i.id != void_token().id;
            if conclusive && o.id != i.id {
                return Err(Error::TypeMismatch {
                    from: o.name,
                    to: i.name,
                });
            }
        }
        Ok(())
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        // A rejection that never reached a dependent goes to the global
        // handler, serialized by the handler mutex.
        if self.undelivered.load(Ordering::Acquire) {
            let st = self.state.get_mut();
            if let Value::Rejected(rejection) = &st.value {
                handlers::report_undelivered(rejection);
            }
        }
    }
}
