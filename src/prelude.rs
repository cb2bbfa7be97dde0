//! Convenient re-exports for common cascade types.
//!
//! This module provides a single import for most use cases:
//! ```
//! use cascade_rs::prelude::*;
//! ```

pub use crate::config::{Config, ConfigBuilder};
pub use crate::delay::{Cancelled, Delay};
pub use crate::error::{Error, Result};
pub use crate::pool::{Barrier, ThreadPool};
pub use crate::promise::{Callback, IntoValue, Promise, Rejection, Value};
