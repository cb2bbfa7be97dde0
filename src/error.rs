//! Error types for the cascade runtime.

/// Result type alias for cascade operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the cascade runtime.
///
/// These surface synchronously from the call that caused them. Errors
/// raised inside user callbacks never appear here; they travel down the
/// promise chain as a [`Rejection`](crate::Rejection).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Terminal write on a promise that already holds a value.
    #[error("promise already settled")]
    AlreadySettled,

    /// Terminal write attempted on a dependent promise.
    #[error("cannot settle a dependent promise directly")]
    DependentSettle,

    /// Attach attempted on a closed promise.
    #[error("promise is closed")]
    Closed,

    /// A callback's declared argument type does not match the settled
    /// value's actual type.
    #[error("type mismatch: {from} -> {to}")]
    TypeMismatch {
        /// Type name of the settled value.
        from: &'static str,
        /// Type name the callback expected.
        to: &'static str,
    },

    /// The value carrier was asked to replicate a payload stored without
    /// a cloner.
    #[error("promise holds a noncopyable value")]
    NonCopyable,

    /// Callback pair failed construction-time validation.
    #[error("invalid callback: {0}")]
    Callback(&'static str),

    /// Thread pool error
    #[error("pool error: {0}")]
    Pool(String),

    /// Delay service error
    #[error("delay error: {0}")]
    Delay(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a pool error
    pub fn pool<S: Into<String>>(msg: S) -> Self {
        Error::Pool(msg.into())
    }

    /// Create a config error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }
}
