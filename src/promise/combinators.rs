//! Promise conjunction and disjunction.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Result;
use crate::promise::callback::Callback;
use crate::promise::value::{Rejection, Value};
use crate::promise::Promise;

impl Promise {
    /// A promise that fulfils when every input fulfils, or rejects with
    /// the first rejection.
    ///
    /// On fulfilment the combined value is a list holding each input's
    /// value at the input's position, regardless of settlement order. A
    /// downstream callback attached with
    /// [`then_seq`](Promise::then_seq) or
    /// [`then_tuple`](Promise::then_tuple) receives it recomposed.
    ///
    /// An empty input fulfils immediately with an empty list. Fails if an
    /// input refuses the attachment (e.g. it is closed).
    pub fn all<I>(promises: I) -> Result<Promise>
    where
        I: IntoIterator<Item = Promise>,
    {
        let inputs: Vec<Promise> = promises.into_iter().collect();
        let combined = Promise::new();
        if inputs.is_empty() {
            let _ = combined.settle_value(Value::List(Vec::new()));
            return Ok(combined);
        }

        let n = inputs.len();
        let slots: Arc<Mutex<Vec<Value>>> =
            Arc::new(Mutex::new((0..n).map(|_| Value::Unset).collect()));
        let remaining = Arc::new(AtomicUsize::new(n));
        let rejected = Arc::new(AtomicBool::new(false));

        for (index, input) in inputs.iter().enumerate() {
            let slots = slots.clone();
            let remaining = remaining.clone();
            let rejected = rejected.clone();
            let on_fulfil = combined.clone();
            let on_reject = combined.clone();
            input.then_with(
                Some(Callback::raw(move |value: Value| {
                    slots.lock()[index] = value;
                    if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                        let values = std::mem::take(&mut *slots.lock());
                        let _ = on_fulfil.settle_value(Value::List(values));
                    }
                })),
                Some(Callback::on_error(move |error| {
                    // First rejection wins; the rest are discarded.
                    if !rejected.swap(true, Ordering::Relaxed) {
                        let _ = on_reject.reject(error);
                    }
                })),
            )?;
        }
        Ok(combined)
    }

    /// A promise that fulfils with the value of whichever input is
    /// observed to fulfil first, or rejects with an empty rejection once
    /// every input has rejected.
    ///
    /// An empty input rejects immediately with an empty rejection.
    pub fn any<I>(promises: I) -> Result<Promise>
    where
        I: IntoIterator<Item = Promise>,
    {
        let inputs: Vec<Promise> = promises.into_iter().collect();
        let combined = Promise::new();
        if inputs.is_empty() {
            let _ = combined.reject(Rejection::empty());
            return Ok(combined);
        }

        let remaining = Arc::new(AtomicUsize::new(inputs.len()));
        let fulfilled = Arc::new(AtomicBool::new(false));

        for input in &inputs {
            let remaining = remaining.clone();
            let fulfilled = fulfilled.clone();
            let on_fulfil = combined.clone();
            let on_reject = combined.clone();
            input.then_with(
                Some(Callback::raw(move |value: Value| {
                    if !fulfilled.swap(true, Ordering::Relaxed) {
                        let _ = on_fulfil.settle_value(value);
                    }
                })),
                Some(Callback::on_error(move |_| {
                    if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                        let _ = on_reject.reject(Rejection::empty());
                    }
                })),
            )?;
        }
        Ok(combined)
    }
}
