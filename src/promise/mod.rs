//! Promises/A+ style settlement propagation.
//!
//! A [`Promise`] represents the eventual result of an asynchronous
//! operation. It references shared state: cloning a handle produces
//! another reference to the same state, and the state lives as long as
//! needed to propagate results. The primary way of interacting with a
//! promise is [`then`](Promise::then) and its siblings, which register
//! callbacks to receive the eventual value or the reason the promise was
//! rejected.
//!
//! Callbacks are not guaranteed to run asynchronously: attaching a
//! dependent to an already-settled promise runs the callback synchronously
//! on the attaching thread.

pub mod callback;
pub mod handlers;
pub mod value;

mod combinators;
mod inner;

pub use callback::{Callback, TupleArg};
pub use value::{IntoValue, Rejection, Value};

use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::error::{Error, Result};

use self::callback::validate_pair;
use self::inner::Inner;

/// A shared, single-assignment cell for the eventual value of an
/// asynchronous operation.
pub struct Promise {
    inner: Arc<Inner>,
}

impl Promise {
    /// Create an unsettled root promise with no callbacks.
    pub fn new() -> Promise {
        Promise::from_parts(None, None)
    }

    /// Create an unsettled root promise with callbacks pre-installed.
    ///
    /// Fails with [`Error::Callback`] if the fulfil slot takes the error
    /// channel, the reject slot takes something other than a rejection or
    /// nothing, or the two result types differ.
    pub fn with_callbacks(
        on_fulfil: Option<Callback>,
        on_reject: Option<Callback>,
    ) -> Result<Promise> {
        validate_pair(on_fulfil.as_ref(), on_reject.as_ref())?;
        Ok(Promise::from_parts(on_fulfil, on_reject))
    }

    /// A promise already fulfilled with `value`.
    pub fn fulfilled<T: IntoValue>(value: T) -> Promise {
        let p = Promise::new();
        // A fresh root cannot refuse a terminal write.
        let _ = inner::Inner::settle(&p.inner, value.into_value(), true);
        p
    }

    /// A promise already rejected with `cause`.
    ///
    /// The rejection counts as undelivered until a dependent is attached.
    pub fn rejected(cause: impl Into<Rejection>) -> Promise {
        let p = Promise::new();
        let _ = inner::Inner::settle(&p.inner, Value::rejected(cause.into()), true);
        p
    }

    pub(crate) fn from_parts(on_fulfil: Option<Callback>, on_reject: Option<Callback>) -> Promise {
        Promise {
            inner: Arc::new(Inner::new(on_fulfil, on_reject)),
        }
    }

    pub(crate) fn from_inner(inner: Arc<Inner>) -> Promise {
        Promise { inner }
    }

    pub(crate) fn inner(&self) -> &Arc<Inner> {
        &self.inner
    }

    /// Fulfil this root promise with a value.
    ///
    /// Settling with another [`Promise`] does not store it; this promise
    /// adopts it as its upstream and settles when it does.
    ///
    /// Fails with [`Error::AlreadySettled`] on a settled promise and
    /// [`Error::DependentSettle`] on a dependent.
    pub fn settle<T: IntoValue>(&self, value: T) -> Result<()> {
        inner::Inner::settle(&self.inner, value.into_value(), true)
    }

    /// Reject this root promise.
    pub fn reject(&self, cause: impl Into<Rejection>) -> Result<()> {
        inner::Inner::settle(&self.inner, Value::rejected(cause.into()), true)
    }

    pub(crate) fn settle_value(&self, value: Value) -> Result<()> {
        inner::Inner::settle(&self.inner, value, true)
    }

    /// Attach a fulfil callback taking the payload by replicated value.
    pub fn then<T, R, F>(&self, f: F) -> Result<Promise>
    where
        T: Any + Send,
        R: IntoValue,
        F: FnOnce(T) -> R + Send + 'static,
    {
        self.attach(Some(Callback::typed(f)), None)
    }

    /// Attach a fulfil callback that consumes the settled value.
    ///
    /// This closes the promise: the callback is the unique reader, the
    /// value is delivered by move, and any later attach fails with
    /// [`Error::Closed`].
    pub fn then_move<T, R, F>(&self, f: F) -> Result<Promise>
    where
        T: Any + Send,
        R: IntoValue,
        F: FnOnce(T) -> R + Send + 'static,
    {
        self.attach(Some(Callback::consuming(f)), None)
    }

    /// Attach a fulfil callback borrowing the payload.
    pub fn then_ref<T, R, F>(&self, f: F) -> Result<Promise>
    where
        T: Any + Send,
        R: IntoValue,
        F: FnOnce(&T) -> R + Send + 'static,
    {
        self.attach(Some(Callback::by_ref(f)), None)
    }

    /// Attach a fulfil callback that ignores the settled value.
    pub fn then_run<R, F>(&self, f: F) -> Result<Promise>
    where
        R: IntoValue,
        F: FnOnce() -> R + Send + 'static,
    {
        self.attach(Some(Callback::nullary(f)), None)
    }

    /// Attach a fulfil callback receiving the erased [`Value`] without
    /// unwrapping.
    pub fn then_value<R, F>(&self, f: F) -> Result<Promise>
    where
        R: IntoValue,
        F: FnOnce(Value) -> R + Send + 'static,
    {
        self.attach(Some(Callback::raw(f)), None)
    }

    /// Attach a fulfil callback taking `Vec<T>`, recomposing the list
    /// produced by [`Promise::all`] when necessary.
    pub fn then_seq<T, R, F>(&self, f: F) -> Result<Promise>
    where
        T: Any + Send,
        R: IntoValue,
        F: FnOnce(Vec<T>) -> R + Send + 'static,
    {
        self.attach(Some(Callback::sequence(f)), None)
    }

    /// Attach a fulfil callback taking a fixed-arity tuple, recomposing
    /// the list produced by [`Promise::all`] when necessary.
    pub fn then_tuple<A, R, F>(&self, f: F) -> Result<Promise>
    where
        A: TupleArg,
        R: IntoValue,
        F: FnOnce(A) -> R + Send + 'static,
    {
        self.attach(Some(Callback::tuple(f)), None)
    }

    /// Attach a reject callback only; fulfilment passes through unchanged.
    pub fn except<R, F>(&self, f: F) -> Result<Promise>
    where
        R: IntoValue,
        F: FnOnce(Rejection) -> R + Send + 'static,
    {
        self.attach(None, Some(Callback::on_error(f)))
    }

    /// Attach both callbacks. At most one of them will ever run. Sharing
    /// the `R` parameter makes the equal-result-type rule hold by
    /// construction.
    pub fn then_except<T, R, F, G>(&self, on_fulfil: F, on_reject: G) -> Result<Promise>
    where
        T: Any + Send,
        R: IntoValue,
        F: FnOnce(T) -> R + Send + 'static,
        G: FnOnce(Rejection) -> R + Send + 'static,
    {
        self.attach(
            Some(Callback::typed(on_fulfil)),
            Some(Callback::on_error(on_reject)),
        )
    }

    /// Attach an arbitrary validated callback pair.
    pub fn then_with(
        &self,
        on_fulfil: Option<Callback>,
        on_reject: Option<Callback>,
    ) -> Result<Promise> {
        validate_pair(on_fulfil.as_ref(), on_reject.as_ref())?;
        self.attach(on_fulfil, on_reject)
    }

    fn attach(&self, on_fulfil: Option<Callback>, on_reject: Option<Callback>) -> Result<Promise> {
        if self.inner.is_closed() {
            return Err(Error::Closed);
        }
        let next = Promise::from_parts(on_fulfil, on_reject);
        inner::Inner::link(&self.inner, next.inner(), true)?;
        Ok(next)
    }

    /// Disallow further dependents. Idempotent.
    pub fn close(&self) {
        self.inner.close();
    }

    /// Whether a terminal value has been written.
    pub fn settled(&self) -> bool {
        self.inner.is_settled()
    }

    /// Whether dependents may no longer be attached.
    pub fn closed(&self) -> bool {
        self.inner.is_closed()
    }
}

impl Default for Promise {
    fn default() -> Self {
        Promise::new()
    }
}

impl Clone for Promise {
    /// Another handle to the same shared state.
    fn clone(&self) -> Self {
        Promise {
            inner: self.inner.clone(),
        }
    }
}

impl PartialEq for Promise {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Promise {}

impl Hash for Promise {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.inner).hash(state);
    }
}

impl fmt::Debug for Promise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("settled", &self.settled())
            .field("closed", &self.closed())
            .finish()
    }
}
