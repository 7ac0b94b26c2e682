//! Request and response messages.
//!
//! Wire shape (logical, independent of codec):
//!
//! ```text
//! Request  = { "id": <string|int>, "method": <string>, "args": [<value>...] }
//! Response = { "id": <string|int>, "result"?: <value>, "error"?: <string> }
//! ```
//!
//! Decoding also accepts PascalCase member names (`Id`, `Method`, `Args`).

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CallError;
use crate::handler::CallResult;

/// Correlation token copied from a request into its response.
///
/// Any JSON number, string or null is accepted and echoed back with the
/// same value. Integers that fit `i64` decode as `Number`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    /// Integers above `i64::MAX`.
    Unsigned(u64),
    Float(f64),
    String(String),
    Null,
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestId::Number(n) => write!(f, "{}", n),
            RequestId::Unsigned(n) => write!(f, "{}", n),
            RequestId::Float(n) => write!(f, "{}", n),
            RequestId::String(s) => f.write_str(s),
            RequestId::Null => f.write_str("null"),
        }
    }
}

impl From<i64> for RequestId {
    fn from(id: i64) -> Self {
        RequestId::Number(id)
    }
}

impl From<&str> for RequestId {
    fn from(id: &str) -> Self {
        RequestId::String(id.to_string())
    }
}

impl From<String> for RequestId {
    fn from(id: String) -> Self {
        RequestId::String(id)
    }
}

/// A call read from the stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    #[serde(alias = "Id")]
    pub id: RequestId,
    #[serde(alias = "Method")]
    pub method: String,
    #[serde(alias = "Args", default)]
    pub args: Vec<Value>,
}

impl Request {
    /// Create a request.
    pub fn new(id: impl Into<RequestId>, method: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            id: id.into(),
            method: method.into(),
            args,
        }
    }
}

/// The reply to exactly one [`Request`].
///
/// `result` and `error` are never both set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(alias = "Id")]
    pub id: RequestId,
    #[serde(alias = "Result", default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(alias = "Error", default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    /// Successful response. `None` means the operation produced no value.
    pub fn success(id: RequestId, result: Option<Value>) -> Self {
        Self {
            id,
            result,
            error: None,
        }
    }

    /// Failed response carrying a message for the caller.
    pub fn failure(id: RequestId, error: impl Into<String>) -> Self {
        Self {
            id,
            result: None,
            error: Some(error.into()),
        }
    }

    /// Build a response from a handler outcome.
    pub fn from_outcome(id: RequestId, outcome: CallResult) -> Self {
        match outcome {
            Ok(result) => Self::success(id, result),
            Err(err) => Self::failure(id, err.to_string()),
        }
    }

    /// Response for a method with no handler.
    pub fn unknown_method(request: &Request) -> Self {
        Self::failure(
            request.id.clone(),
            CallError::UnknownMethod(request.method.clone()).to_string(),
        )
    }

    /// Whether the call failed.
    #[inline]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}
