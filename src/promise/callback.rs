//! Erased one-shot callback wrappers.
//!
//! A [`Callback`] pairs a small descriptor (argument form, result type,
//! whether the argument is consumed) with a boxed invocation closure that
//! converts the delivered [`Value`] as the descriptor directs. The
//! descriptor is what attachment-time checks inspect; the closure runs at
//! most once, during settlement.

use std::any::Any;

use crate::error::{Error, Result};
use crate::promise::value::{
    any_token, void_token, IntoValue, Rejection, TypeToken, Value,
};

/// How a callback receives the settled value.
pub(crate) enum ArgKind {
    /// Takes no argument; the value is discarded.
    Void,
    /// Receives the erased [`Value`] without unwrapping.
    Raw,
    /// Receives the rejection reason; dispatched only on rejected input.
    Error,
    /// Receives a concrete payload type.
    Typed(TypeToken),
    /// Receives `Vec<T>`, recomposed from a value list when necessary.
    Sequence(TypeToken),
    /// Receives a fixed-arity tuple, recomposed from a value list of the
    /// same length.
    Tuple(TypeToken),
}

type Invoke = Box<dyn FnOnce(Value) -> Result<Value> + Send>;

/// A type-erased fulfil or reject callback.
pub struct Callback {
    arg: ArgKind,
    consumes: bool,
    result: TypeToken,
    invoke: Invoke,
}

impl Callback {
    /// Callback taking a concrete payload.
    ///
    /// The argument is extracted by replicating the delivered value, so
    /// other dependents can still observe it.
    pub fn typed<T, R, F>(f: F) -> Callback
    where
        T: Any + Send,
        R: IntoValue,
        F: FnOnce(T) -> R + Send + 'static,
    {
        Callback {
            arg: ArgKind::Typed(TypeToken::of::<T>()),
            consumes: false,
            result: R::result_token(),
            invoke: Box::new(move |v| Ok(f(v.take::<T>()?).into_value())),
        }
    }

    /// Callback that consumes the settled value.
    ///
    /// Attaching it closes the upstream promise; this callback becomes the
    /// unique reader and receives the value by move.
    pub fn consuming<T, R, F>(f: F) -> Callback
    where
        T: Any + Send,
        R: IntoValue,
        F: FnOnce(T) -> R + Send + 'static,
    {
        Callback {
            arg: ArgKind::Typed(TypeToken::of::<T>()),
            consumes: true,
            result: R::result_token(),
            invoke: Box::new(move |v| Ok(f(v.take::<T>()?).into_value())),
        }
    }

    /// Callback borrowing the payload instead of taking ownership.
    pub fn by_ref<T, R, F>(f: F) -> Callback
    where
        T: Any + Send,
        R: IntoValue,
        F: FnOnce(&T) -> R + Send + 'static,
    {
        Callback {
            arg: ArgKind::Typed(TypeToken::of::<T>()),
            consumes: false,
            result: R::result_token(),
            invoke: Box::new(move |v| Ok(f(v.payload_ref::<T>()?).into_value())),
        }
    }

    /// Callback receiving the erased [`Value`] itself.
    pub fn raw<R, F>(f: F) -> Callback
    where
        R: IntoValue,
        F: FnOnce(Value) -> R + Send + 'static,
    {
        Callback {
            arg: ArgKind::Raw,
            consumes: false,
            result: R::result_token(),
            invoke: Box::new(move |v| Ok(f(v).into_value())),
        }
    }

    /// Callback taking no argument.
    pub fn nullary<R, F>(f: F) -> Callback
    where
        R: IntoValue,
        F: FnOnce() -> R + Send + 'static,
    {
        Callback {
            arg: ArgKind::Void,
            consumes: false,
            result: R::result_token(),
            invoke: Box::new(move |_| Ok(f().into_value())),
        }
    }

    /// Callback taking `Vec<T>`.
    ///
    /// When the delivered value is the list produced by
    /// [`Promise::all`](crate::Promise::all), each element is unwrapped to
    /// `T`; a directly stored `Vec<T>` payload passes through unchanged.
    pub fn sequence<T, R, F>(f: F) -> Callback
    where
        T: Any + Send,
        R: IntoValue,
        F: FnOnce(Vec<T>) -> R + Send + 'static,
    {
        Callback {
            arg: ArgKind::Sequence(TypeToken::of::<Vec<T>>()),
            consumes: false,
            result: R::result_token(),
            invoke: Box::new(move |v| match v {
                Value::List(items) => {
                    let mut out = Vec::with_capacity(items.len());
                    for item in items {
                        out.push(item.take::<T>()?);
                    }
                    Ok(f(out).into_value())
                }
                other => Ok(f(other.take::<Vec<T>>()?).into_value()),
            }),
        }
    }

    /// Callback taking a fixed-arity tuple, recomposed from a value list
    /// of matching length.
    pub fn tuple<A, R, F>(f: F) -> Callback
    where
        A: TupleArg,
        R: IntoValue,
        F: FnOnce(A) -> R + Send + 'static,
    {
        Callback {
            arg: ArgKind::Tuple(TypeToken::of::<A>()),
            consumes: false,
            result: R::result_token(),
            invoke: Box::new(move |v| match v {
                Value::List(items) => {
                    if items.len() != A::ARITY {
                        return Err(Error::TypeMismatch {
                            from: "list of values",
                            to: A::name(),
                        });
                    }
                    Ok(f(A::recompose(items)?).into_value())
                }
                other => Ok(f(other.take::<A>()?).into_value()),
            }),
        }
    }

    /// Reject callback; receives the rejection reason.
    pub fn on_error<R, F>(f: F) -> Callback
    where
        R: IntoValue,
        F: FnOnce(Rejection) -> R + Send + 'static,
    {
        Callback {
            arg: ArgKind::Error,
            consumes: false,
            result: R::result_token(),
            invoke: Box::new(move |v| match v {
                Value::Rejected(r) => Ok(f(r).into_value()),
                other => Err(Error::TypeMismatch {
                    from: other.type_name(),
                    to: "rejection",
                }),
            }),
        }
    }

    pub(crate) fn invoke(self, value: Value) -> Result<Value> {
        (self.invoke)(value)
    }

    pub(crate) fn consumes(&self) -> bool {
        self.consumes
    }

    pub(crate) fn takes_error(&self) -> bool {
        matches!(self.arg, ArgKind::Error)
    }

    pub(crate) fn takes_nothing(&self) -> bool {
        matches!(self.arg, ArgKind::Void)
    }

    pub(crate) fn result_token(&self) -> TypeToken {
        self.result
    }

    pub(crate) fn arg_token(&self) -> TypeToken {
        match &self.arg {
            ArgKind::Void => void_token(),
            ArgKind::Raw => any_token(),
            ArgKind::Error => TypeToken::of::<Rejection>(),
            ArgKind::Typed(t) | ArgKind::Sequence(t) | ArgKind::Tuple(t) => *t,
        }
    }
}

impl std::fmt::Debug for Callback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callback")
            .field("arg", &self.arg_token().name)
            .field("result", &self.result.name)
            .field("consumes", &self.consumes)
            .finish()
    }
}

/// Validate a fulfil/reject callback pair before installing it.
pub(crate) fn validate_pair(
    on_fulfil: Option<&Callback>,
    on_reject: Option<&Callback>,
) -> Result<()> {
    if let Some(f) = on_fulfil {
        if f.takes_error() {
            return Err(Error::Callback(
                "fulfil callback cannot take the error channel",
            ));
        }
    }
    if let Some(r) = on_reject {
        if !r.takes_error() && !r.takes_nothing() {
            return Err(Error::Callback(
                "reject callback must take a rejection or no argument",
            ));
        }
        if r.consumes() {
            return Err(Error::Callback(
                "reject callback cannot consume the value",
            ));
        }
    }
    if let (Some(f), Some(r)) = (on_fulfil, on_reject) {
        if f.result_token().id != r.result_token().id {
            return Err(Error::Callback(
                "fulfil and reject callbacks must return the same type",
            ));
        }
    }
    Ok(())
}

/// Tuple argument forms accepted by [`Callback::tuple`].
pub trait TupleArg: Any + Send + Sized {
    const ARITY: usize;

    fn name() -> &'static str {
        std::any::type_name::<Self>()
    }

    fn recompose(items: Vec<Value>) -> Result<Self>;
}

macro_rules! impl_tuple_arg {
    ($arity:expr, $($t:ident),+) => {
        impl<$($t: Any + Send),+> TupleArg for ($($t,)+) {
            const ARITY: usize = $arity;

            fn recompose(items: Vec<Value>) -> Result<Self> {
                let mut items = items.into_iter();
                Ok(($(
                    match items.next() {
                        Some(item) => item.take::<$t>()?,
                        None => {
                            return Err(Error::TypeMismatch {
                                from: "list of values",
                                to: Self::name(),
                            })
                        }
                    },
                )+))
            }
        }
    };
}

impl_tuple_arg!(1, T0);
impl_tuple_arg!(2, T0, T1);
impl_tuple_arg!(3, T0, T1, T2);
impl_tuple_arg!(4, T0, T1, T2, T3);
impl_tuple_arg!(5, T0, T1, T2, T3, T4);
impl_tuple_arg!(6, T0, T1, T2, T3, T4, T5);
impl_tuple_arg!(7, T0, T1, T2, T3, T4, T5, T6);
impl_tuple_arg!(8, T0, T1, T2, T3, T4, T5, T6, T7);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_invocation() {
        let cb = Callback::typed(|x: i32| x + 1);
        let out = cb.invoke(Value::new(41i32)).unwrap();
        assert_eq!(out.take::<i32>().unwrap(), 42);
    }

    #[test]
    fn test_typed_mismatch() {
        let cb = Callback::typed(|x: i32| x);
        let err = cb.invoke(Value::new("nope".to_string())).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
    }

    #[test]
    fn test_tuple_recompose() {
        let cb = Callback::tuple(|(a, b): (i32, String)| a as usize + b.len());
        let list = Value::List(vec![Value::new(1i32), Value::new("xy".to_string())]);
        let out = cb.invoke(list).unwrap();
        assert_eq!(out.take::<usize>().unwrap(), 3);
    }

    #[test]
    fn test_sequence_recompose() {
        let cb = Callback::sequence(|v: Vec<i32>| v.iter().sum::<i32>());
        let list = Value::List(vec![Value::new(1i32), Value::new(2i32), Value::new(3i32)]);
        assert_eq!(cb.invoke(list).unwrap().take::<i32>().unwrap(), 6);
    }

    #[test]
    fn test_sequence_passthrough() {
        let cb = Callback::sequence(|v: Vec<i32>| v.len());
        let direct = Value::new(vec![5i32, 6]);
        assert_eq!(cb.invoke(direct).unwrap().take::<usize>().unwrap(), 2);
    }

    #[test]
    fn test_rejection_result_rejects() {
        let cb = Callback::typed(|_: i32| Rejection::empty());
        let out = cb.invoke(Value::new(0i32)).unwrap();
        assert!(out.is_rejected());
    }

    #[test]
    fn test_validate_pair_result_mismatch() {
        let f = Callback::typed(|x: i32| x);
        let r = Callback::on_error(|_| "s".to_string());
        assert!(matches!(
            validate_pair(Some(&f), Some(&r)),
            Err(Error::Callback(_))
        ));
    }

    #[test]
    fn test_validate_pair_error_in_fulfil_slot() {
        let f = Callback::on_error(|_| 0i32);
        assert!(matches!(
            validate_pair(Some(&f), None),
            Err(Error::Callback(_))
        ));
    }
}
