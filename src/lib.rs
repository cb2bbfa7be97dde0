//! CASCADE - promise-driven concurrency
//!
//! A concurrency library built on three coupled primitives: a dynamically
//! typed [`Promise`] whose settlement propagates through a graph of
//! dependents, a [`ThreadPool`] that consumes promises as its work items,
//! and a [`Delay`] service that settles promises at monotonic deadlines.
//!
//! # Quick Start
//!
//! ```
//! use cascade_rs::prelude::*;
//!
//! // Chain computations on an eventual value.
//! let root = Promise::new();
//! let chained = root
//!     .then(|x: i32| x + 1)
//!     .unwrap()
//!     .then(|x: i32| x * 2)
//!     .unwrap();
//! root.settle(3).unwrap();
//! assert!(chained.settled());
//! ```
//!
//! ```no_run
//! use cascade_rs::prelude::*;
//!
//! // Run work on the pool and receive the result through a promise.
//! let pool = ThreadPool::new().unwrap();
//! pool.post(|| 6 * 7)
//!     .then(|answer: i32| {
//!         println!("answer: {answer}");
//!     })
//!     .unwrap();
//! pool.synchronize().wait();
//! ```
//!
//! # Features
//!
//! - **Chained settlement**: `then`/`except` callbacks transform values
//!   and recover from rejections; a callback returning a promise splices
//!   it into the chain
//! - **Combinators**: [`Promise::all`] and [`Promise::any`] over any set
//!   of promises
//! - **Move-once values**: a consuming callback closes its upstream and
//!   receives the value by move, so payloads need not be clonable
//! - **Thread pool**: FIFO work queue, dynamic resize, queue-order
//!   barriers
//! - **Timers**: deadline-ordered settlement with cancellation

#![warn(missing_debug_implementations)]

pub mod config;
pub mod delay;
pub mod error;
pub mod pool;
pub mod prelude;
pub mod promise;
pub mod util;

// Re-export key types at crate root
pub use config::{Config, ConfigBuilder};
pub use delay::{Cancelled, Delay};
pub use error::{Error, Result};
pub use pool::{Barrier, ConcurrentQueue, ThreadPool};
pub use promise::handlers::{
    set_type_mismatch_handler, set_undelivered_handler, Mismatch, MismatchAction,
    TypeMismatchHandler, UndeliveredHandler,
};
pub use promise::{Callback, IntoValue, Promise, Rejection, TupleArg, Value};
