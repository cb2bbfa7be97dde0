//! Process-global handlers for undelivered rejections and type mismatches.
//!
//! Both handlers live behind a single global mutex; replacing one returns
//! the previous handler so hosts can scope an override and restore it.

use std::sync::OnceLock;

use parking_lot::Mutex;

use crate::promise::value::Rejection;

/// Invoked from promise destruction when a rejected value was never
/// observed by any dependent. Must not panic.
pub type UndeliveredHandler = Box<dyn Fn(&Rejection) + Send + Sync>;

/// What to do with a callback whose declared argument type does not match
/// the settled value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MismatchAction {
    /// Capture the mismatch as the rejected outcome of the dependent.
    Capture,
    /// Let the error surface synchronously from the settling call.
    Propagate,
}

/// A type-mismatch report handed to the global handler.
#[derive(Debug, Clone, Copy)]
pub struct Mismatch {
    /// Type name of the settled value.
    pub from: &'static str,
    /// Type name the callback expected.
    pub to: &'static str,
}

/// Decides the fate of a type mismatch. The mismatch is usually a
/// programming error, so the default propagates.
pub type TypeMismatchHandler = Box<dyn Fn(&Mismatch) -> MismatchAction + Send + Sync>;

struct Registry {
    undelivered: UndeliveredHandler,
    mismatch: TypeMismatchHandler,
}

impl Default for Registry {
    fn default() -> Self {
        Self {
            // Discarding a rejection nobody looked at is technically fine,
            // but it hides bugs. Log and abort unless the host overrides.
            undelivered: Box::new(|rejection| {
                eprintln!("cascade: undelivered rejection: {}", rejection);
                std::process::abort();
            }),
            mismatch: Box::new(|_| MismatchAction::Propagate),
        }
    }
}

static REGISTRY: OnceLock<Mutex<Registry>> = OnceLock::new();

fn registry() -> &'static Mutex<Registry> {
    REGISTRY.get_or_init(|| Mutex::new(Registry::default()))
}

/// Replace the undelivered-rejection handler, returning the previous one.
pub fn set_undelivered_handler(handler: UndeliveredHandler) -> UndeliveredHandler {
    std::mem::replace(&mut registry().lock().undelivered, handler)
}

/// Replace the type-mismatch handler, returning the previous one.
pub fn set_type_mismatch_handler(handler: TypeMismatchHandler) -> TypeMismatchHandler {
    std::mem::replace(&mut registry().lock().mismatch, handler)
}

// Called from the shared-state destructor; the lock serializes handler
// invocations across threads.
pub(crate) fn report_undelivered(rejection: &Rejection) {
    let guard = registry().lock();
    (guard.undelivered)(rejection);
}

pub(crate) fn mismatch_action(mismatch: &Mismatch) -> MismatchAction {
    let guard = registry().lock();
    (guard.mismatch)(mismatch)
}
