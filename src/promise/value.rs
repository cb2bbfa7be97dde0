//! Type-erased value carrier for promise settlement.
//!
//! A settled promise holds a [`Value`]: either a concrete payload of any
//! `'static` type, a [`Rejection`], the synthetic list produced by
//! [`Promise::all`](crate::Promise::all), or one of the two bookkeeping
//! states (`Unset`, `Moved`). Cloning is explicit and fallible: a payload
//! stored without a cloner refuses replication instead of silently copying.

use std::any::{type_name, Any, TypeId};
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::promise::Promise;

/// Runtime type identity plus a human-readable name for diagnostics.
#[derive(Debug, Clone, Copy)]
pub struct TypeToken {
    pub(crate) id: TypeId,
    pub(crate) name: &'static str,
}

impl TypeToken {
    pub fn of<T: 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }
}

/// Marker type for the "takes no argument" callback form.
pub(crate) struct NoArg;

pub(crate) fn any_token() -> TypeToken {
    TypeToken::of::<Value>()
}

pub(crate) fn void_token() -> TypeToken {
    TypeToken {
        id: TypeId::of::<NoArg>(),
        name: "void",
    }
}

pub(crate) fn promise_token() -> TypeToken {
    TypeToken::of::<Promise>()
}

const LIST_NAME: &str = "list of values";

fn mismatch(from: &'static str, to: &'static str) -> Error {
    Error::TypeMismatch { from, to }
}

/// The erased value slot of a promise.
pub enum Value {
    /// No terminal value has been written yet.
    Unset,
    /// The value was transferred out by a consuming dependent.
    Moved,
    /// The promise was rejected.
    Rejected(Rejection),
    /// Synthetic sequence produced by the `all` combinator.
    List(Vec<Value>),
    /// A concrete fulfilment payload.
    Payload(Erased),
}

impl Value {
    /// Store a clonable payload.
    pub fn new<T: Any + Send + Clone>(value: T) -> Self {
        Value::Payload(Erased::new(value))
    }

    /// Store a payload that cannot be replicated.
    ///
    /// Such a value may flow down a chain that never branches; any attempt
    /// to deliver it to a second reader fails with
    /// [`Error::NonCopyable`].
    pub fn unclonable<T: Any + Send>(value: T) -> Self {
        Value::Payload(Erased::new_unclonable(value))
    }

    pub fn rejected(rejection: Rejection) -> Self {
        Value::Rejected(rejection)
    }

    pub fn is_unset(&self) -> bool {
        matches!(self, Value::Unset)
    }

    pub fn is_moved(&self) -> bool {
        matches!(self, Value::Moved)
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Value::Rejected(_))
    }

    pub fn is_list(&self) -> bool {
        matches!(self, Value::List(_))
    }

    /// Runtime type name of the current contents.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Unset => "unset",
            Value::Moved => "moved",
            Value::Rejected(_) => "rejection",
            Value::List(_) => LIST_NAME,
            Value::Payload(e) => e.token.name,
        }
    }

    /// Whether the payload is exactly `T`.
    pub fn is<T: Any>(&self) -> bool {
        match self {
            Value::Payload(e) => e.token.id == TypeId::of::<T>(),
            _ => false,
        }
    }

    // A promise outcome is never stored; it re-links instead.
    pub(crate) fn into_promise(self) -> std::result::Result<Promise, Value> {
        match self {
            Value::Payload(e) => match e.boxed.downcast::<Promise>() {
                Ok(p) => Ok(*p),
                Err(boxed) => Err(Value::Payload(Erased {
                    boxed,
                    token: e.token,
                    cloner: e.cloner,
                })),
            },
            other => Err(other),
        }
    }

    /// Move the payload out as `T`.
    ///
    /// A request for `Vec<Value>` yields the raw list form.
    pub fn take<T: Any + Send>(self) -> Result<T> {
        match self {
            Value::Payload(e) => e.take::<T>(),
            Value::List(items) => {
                if TypeId::of::<T>() == TypeId::of::<Vec<Value>>() {
                    let boxed: Box<dyn Any> = Box::new(items);
                    return boxed
                        .downcast::<T>()
                        .map(|b| *b)
                        .map_err(|_| mismatch(LIST_NAME, type_name::<T>()));
                }
                Err(mismatch(LIST_NAME, type_name::<T>()))
            }
            Value::Rejected(_) => Err(mismatch("rejection", type_name::<T>())),
            Value::Unset => Err(mismatch("unset", type_name::<T>())),
            Value::Moved => Err(mismatch("moved", type_name::<T>())),
        }
    }

    /// Borrow the payload as `T`.
    pub fn payload_ref<T: Any>(&self) -> Result<&T> {
        match self {
            Value::Payload(e) => e.downcast_ref::<T>(),
            other => Err(mismatch(other.type_name(), type_name::<T>())),
        }
    }

    /// Replicate the value.
    ///
    /// Fails with [`Error::NonCopyable`] for moved-out values and for
    /// payloads stored without a cloner. A list clones element-wise.
    pub fn try_clone(&self) -> Result<Value> {
        match self {
            Value::Unset => Ok(Value::Unset),
            Value::Moved => Err(Error::NonCopyable),
            Value::Rejected(r) => Ok(Value::Rejected(r.dup())),
            Value::List(items) => {
                let cloned: Result<Vec<Value>> =
                    items.iter().map(Value::try_clone).collect();
                Ok(Value::List(cloned?))
            }
            Value::Payload(e) => e.try_clone().map(Value::Payload).ok_or(Error::NonCopyable),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::List(items) => f.debug_tuple("Value::List").field(&items.len()).finish(),
            other => write!(f, "Value({})", other.type_name()),
        }
    }
}

type Cloner = fn(&dyn Any) -> Option<Box<dyn Any + Send>>;

fn clone_payload<T: Any + Send + Clone>(any: &dyn Any) -> Option<Box<dyn Any + Send>> {
    any.downcast_ref::<T>()
        .map(|v| Box::new(v.clone()) as Box<dyn Any + Send>)
}

/// A boxed payload together with its type token and an optional
/// monomorphized clone hook.
pub struct Erased {
    boxed: Box<dyn Any + Send>,
    token: TypeToken,
    cloner: Option<Cloner>,
}

impl Erased {
    fn new<T: Any + Send + Clone>(value: T) -> Self {
        Self {
            boxed: Box::new(value),
            token: TypeToken::of::<T>(),
            cloner: Some(clone_payload::<T>),
        }
    }

    fn new_unclonable<T: Any + Send>(value: T) -> Self {
        Self {
            boxed: Box::new(value),
            token: TypeToken::of::<T>(),
            cloner: None,
        }
    }

    fn take<T: Any + Send>(self) -> Result<T> {
        let name = self.token.name;
        self.boxed
            .downcast::<T>()
            .map(|b| *b)
            .map_err(|_| mismatch(name, type_name::<T>()))
    }

    fn downcast_ref<T: Any>(&self) -> Result<&T> {
        self.boxed
            .as_ref()
            .downcast_ref::<T>()
            .ok_or_else(|| mismatch(self.token.name, type_name::<T>()))
    }

    fn try_clone(&self) -> Option<Erased> {
        let cloner = self.cloner?;
        let boxed = cloner(self.boxed.as_ref())?;
        Some(Erased {
            boxed,
            token: self.token,
            cloner: self.cloner,
        })
    }
}

impl fmt::Debug for Erased {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Erased({})", self.token.name)
    }
}

/// Conversion of callback results and user values into the erased carrier.
///
/// Implemented for every clonable `'static` type, for [`Value`] itself
/// (identity, used to settle with a noncopyable payload), and for
/// [`Rejection`] (turns the outcome into a rejection).
pub trait IntoValue: Send + 'static {
    fn into_value(self) -> Value;

    #[doc(hidden)]
    fn result_token() -> TypeToken
    where
        Self: Sized;
}

impl<T: Any + Send + Clone> IntoValue for T {
    fn into_value(self) -> Value {
        Value::new(self)
    }

    fn result_token() -> TypeToken {
        TypeToken::of::<T>()
    }
}

impl IntoValue for Value {
    fn into_value(self) -> Value {
        self
    }

    fn result_token() -> TypeToken {
        any_token()
    }
}

impl IntoValue for Rejection {
    fn into_value(self) -> Value {
        Value::Rejected(self)
    }

    fn result_token() -> TypeToken {
        TypeToken::of::<Rejection>()
    }
}

enum Cause {
    Error(Box<dyn StdError + Send + Sync>),
    Panic(String),
}

/// Shareable, type-erased rejection reason.
///
/// Produced from any error value, from a captured callback panic, or empty
/// (the `any([])` case). Returning a `Rejection` from a fulfil callback
/// rejects the dependent promise.
pub struct Rejection {
    cause: Option<Arc<Cause>>,
}

impl Rejection {
    pub fn new<E: StdError + Send + Sync + 'static>(error: E) -> Self {
        Self {
            cause: Some(Arc::new(Cause::Error(Box::new(error)))),
        }
    }

    /// A rejection that carries no reason.
    pub fn empty() -> Self {
        Self { cause: None }
    }

    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic".to_string()
        };
        Self {
            cause: Some(Arc::new(Cause::Panic(message))),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.cause.is_none()
    }

    /// Whether the reason is an error of type `E`.
    pub fn is<E: StdError + 'static>(&self) -> bool {
        self.downcast_ref::<E>().is_some()
    }

    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        match self.cause.as_deref() {
            Some(Cause::Error(e)) => e.downcast_ref::<E>(),
            _ => None,
        }
    }

    /// The message of a captured panic, if that is what this rejection
    /// carries.
    pub fn panic_message(&self) -> Option<&str> {
        match self.cause.as_deref() {
            Some(Cause::Panic(msg)) => Some(msg),
            _ => None,
        }
    }

    // Handles share the underlying cause.
    pub(crate) fn dup(&self) -> Rejection {
        Rejection {
            cause: self.cause.clone(),
        }
    }
}

impl<E: StdError + Send + Sync + 'static> From<E> for Rejection {
    fn from(error: E) -> Self {
        Rejection::new(error)
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.cause.as_deref() {
            Some(Cause::Error(e)) => write!(f, "{}", e),
            Some(Cause::Panic(msg)) => write!(f, "panic: {}", msg),
            None => write!(f, "(empty rejection)"),
        }
    }
}

impl fmt::Debug for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rejection({})", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_and_type_name() {
        let v = Value::new(7i32);
        assert!(v.is::<i32>());
        assert_eq!(v.take::<i32>().unwrap(), 7);

        let v = Value::new("abc".to_string());
        assert!(matches!(
            v.take::<i32>(),
            Err(Error::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_clone_clonable() {
        let v = Value::new(vec![1u8, 2, 3]);
        let c = v.try_clone().unwrap();
        assert_eq!(c.take::<Vec<u8>>().unwrap(), vec![1, 2, 3]);
        assert_eq!(v.take::<Vec<u8>>().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_unclonable_refuses_replication() {
        struct Token(#[allow(dead_code)] u32);
        let v = Value::unclonable(Token(9));
        assert!(matches!(v.try_clone(), Err(Error::NonCopyable)));
        assert!(v.take::<Token>().is_ok());
    }

    #[test]
    fn test_list_clone_is_elementwise() {
        let v = Value::List(vec![Value::new(1i32), Value::new(2i32)]);
        let c = v.try_clone().unwrap();
        let items = c.take::<Vec<Value>>().unwrap();
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn test_rejection_downcast() {
        #[derive(Debug, thiserror::Error)]
        #[error("boom")]
        struct Boom;

        let r = Rejection::new(Boom);
        assert!(r.is::<Boom>());
        assert!(!r.is_empty());
        assert!(Rejection::empty().is_empty());
    }

    #[test]
    fn test_rejection_from_panic_payload() {
        let r = Rejection::from_panic(Box::new("kaput"));
        assert_eq!(r.panic_message(), Some("kaput"));
    }
}
