//! Argument marshalling between wire values and typed parameters.
//!
//! A request carries its arguments as a positional list of untyped
//! values. An operation declares its parameters as a tuple; [`FromArgs`]
//! checks the arity and converts each value into the parameter type at
//! the same position.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::CallError;

/// Conversion from positional wire values into a parameter tuple.
pub trait FromArgs: Sized {
    /// Number of parameters.
    const ARITY: usize;

    /// Convert `args` into the parameter tuple.
    ///
    /// # Errors
    ///
    /// `ArgumentCount` on arity mismatch, `ArgumentConversion` when a value
    /// does not fit its parameter type.
    fn from_args(args: Vec<Value>) -> Result<Self, CallError>;
}

fn check_arity(expected: usize, args: &[Value]) -> Result<(), CallError> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(CallError::ArgumentCount {
            expected,
            actual: args.len(),
        })
    }
}

fn convert<T: DeserializeOwned>(index: usize, value: Option<Value>) -> Result<T, CallError> {
    let value = value.ok_or_else(|| CallError::ArgumentConversion {
        index,
        message: "missing value".to_string(),
    })?;

    serde_json::from_value(value).map_err(|e| CallError::ArgumentConversion {
        index,
        message: e.to_string(),
    })
}

impl FromArgs for () {
    const ARITY: usize = 0;

    fn from_args(args: Vec<Value>) -> Result<Self, CallError> {
        check_arity(0, &args)
    }
}

macro_rules! impl_from_args {
    ($arity:expr; $($ty:ident $index:tt),+) => {
        impl<$($ty: DeserializeOwned),+> FromArgs for ($($ty,)+) {
            const ARITY: usize = $arity;

            fn from_args(args: Vec<Value>) -> Result<Self, CallError> {
                check_arity(Self::ARITY, &args)?;
                let mut values = args.into_iter();
                Ok(($(convert::<$ty>($index, values.next())?,)+))
            }
        }
    };
}

impl_from_args!(1; A 0);
impl_from_args!(2; A 0, B 1);
impl_from_args!(3; A 0, B 1, C 2);
impl_from_args!(4; A 0, B 1, C 2, D 3);
impl_from_args!(5; A 0, B 1, C 2, D 3, E 4);
impl_from_args!(6; A 0, B 1, C 2, D 3, E 4, F 5);
impl_from_args!(7; A 0, B 1, C 2, D 3, E 4, F 5, G 6);
impl_from_args!(8; A 0, B 1, C 2, D 3, E 4, F 5, G 6, H 7);

/// Convert an operation's return value into an optional wire value.
///
/// Values that encode as null (`()`, `None`) produce no result.
pub fn encode_result<R: Serialize>(value: &R) -> Result<Option<Value>, CallError> {
    match serde_json::to_value(value) {
        Ok(Value::Null) => Ok(None),
        Ok(value) => Ok(Some(value)),
        Err(e) => Err(CallError::ResultEncoding(e.to_string())),
    }
}
