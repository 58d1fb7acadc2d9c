use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

use crate::json_errors::{FieldError, json_error_details, json_field_error_details};

/// Type-erased error returned by handlers and middleware
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Machine-readable error names used by the engine
///
/// Applications are free to construct errors with their own names through
/// [`RpcError::new`]; names should be snake_case (e.g. `invalid_account`).
pub mod error_names {
    pub const INTERNAL_ERROR: &str = "internal_error";
    pub const INVALID_PARAMS: &str = "invalid_params";
    pub const INVALID_REQUEST: &str = "invalid_request";
    pub const METHOD_NOT_FOUND: &str = "method_not_found";
    pub const NOT_FOUND: &str = "not_found";
    pub const UNAUTHORIZED: &str = "unauthorized";
    pub const PARSE_ERROR: &str = "parse_error";
}

/// An error rendered directly to the client
///
/// If it wraps an underlying error and the engine runs with `dump_errors`
/// enabled, the wrapped error is rendered under `details` as a list of lines.
///
/// ```json
/// {
///   "name": "method_not_found",
///   "message": "method not found: InvalidMethod"
/// }
/// ```
#[derive(Debug)]
pub struct RpcError {
    name: String,
    message: String,
    data: Option<Value>,
    cause: Option<BoxError>,
}

impl RpcError {
    /// Create an error with the given name and message.
    ///
    /// Use [`rpc_error!`](crate::rpc_error) for a formatted message.
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            data: None,
            cause: None,
        }
    }

    /// A fault internal to the server, having nothing to do with the request.
    ///
    /// Only the generic message reaches the client unless `dump_errors` is on.
    pub fn internal(err: impl Into<BoxError>) -> Self {
        Self::new(error_names::INTERNAL_ERROR, "internal error").wrap(err)
    }

    /// The client sent invalid method parameters
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(error_names::INVALID_PARAMS, message)
    }

    /// The client sent a malformed request
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(error_names::INVALID_REQUEST, message)
    }

    /// The client called a method that is not registered
    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            error_names::METHOD_NOT_FOUND,
            format!("method not found: {}", method),
        )
    }

    /// A requested entity could not be found
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(error_names::NOT_FOUND, message)
    }

    /// The client must be authenticated
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(error_names::UNAUTHORIZED, message)
    }

    /// Invalid JSON was received.
    ///
    /// `input` is the text that failed to decode; it is only used to locate
    /// the fault, never echoed back.
    pub fn parse_error(message: &str, err: serde_json::Error, input: &[u8]) -> Self {
        let details = json_error_details(&err, input);
        Self::parse_failure(message, details).wrap(err)
    }

    /// Like [`parse_error`](Self::parse_error), naming the field that failed
    pub fn parse_field_error(message: &str, err: FieldError, input: &[u8]) -> Self {
        let details = json_field_error_details(&err, input);
        Self::parse_failure(message, details).wrap(err.into_inner())
    }

    fn parse_failure(message: &str, details: Option<String>) -> Self {
        let message = match details {
            Some(details) => format!("{}: {}", message, details),
            None => message.to_string(),
        };
        Self::new(error_names::PARSE_ERROR, message)
    }

    /// Attach additional information, rendered as `data`
    pub fn with_data(mut self, data: impl Into<Value>) -> Self {
        self.data = Some(data.into());
        self
    }

    /// Set the underlying error that caused this one
    pub fn wrap(mut self, err: impl Into<BoxError>) -> Self {
        self.cause = Some(err.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    pub fn cause(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        self.cause.as_deref()
    }

    /// Coerce any error into an `RpcError`.
    ///
    /// An `RpcError` passes through untouched; anything else becomes an
    /// `internal_error` wrapping it.
    pub fn from_fault(err: BoxError) -> Self {
        match err.downcast::<RpcError>() {
            Ok(rpc) => *rpc,
            Err(other) => Self::internal(other),
        }
    }

    /// The wrapped cause rendered as lines, tabs expanded to two spaces
    pub fn details(&self) -> Option<Vec<String>> {
        let cause = self.cause.as_deref()?;
        let mut text = cause.to_string();
        let mut source = cause.source();
        while let Some(err) = source {
            text.push_str("\ncaused by: ");
            text.push_str(&err.to_string());
            source = err.source();
        }
        Some(
            text.replace('\t', "  ")
                .split('\n')
                .map(str::to_owned)
                .collect(),
        )
    }

    /// Build the wire representation. `details` only appears when
    /// `dump_errors` is set and a cause was wrapped.
    pub fn to_error_object(&self, dump_errors: bool) -> ErrorObject {
        ErrorObject {
            name: self.name.clone(),
            message: self.message.clone(),
            data: self.data.clone(),
            details: if dump_errors { self.details() } else { None },
        }
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rpc: {}", self.name.replace('_', " "))?;
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for RpcError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|err| err as &(dyn std::error::Error + 'static))
    }
}

/// Build an [`RpcError`] with a formatted message
///
/// ```
/// use rpc_dispatch::rpc_error;
///
/// let err = rpc_error!("invalid_customer", "customer {} failed validation", 42);
/// assert_eq!(err.message(), "customer 42 failed validation");
/// ```
#[macro_export]
macro_rules! rpc_error {
    ($name:expr, $($arg:tt)+) => {
        $crate::RpcError::new($name, format!($($arg)+))
    };
}

/// Error object as it appears in a response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    pub name: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<String>>,
}

/// Registration-time faults. These are programming errors in the hosting
/// application; the panicking registration methods surface them at startup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("method already registered: {0}")]
    DuplicateMethod(String),

    #[error("middleware must be registered before methods")]
    MiddlewareAfterRegistration,

    #[error("unknown group: {0}")]
    UnknownGroup(usize),
}

/// A handler panicked; carries the panic payload as text
#[derive(Debug, Error)]
#[error("panic: {0}")]
pub struct Panicked(pub String);

impl Panicked {
    pub(crate) fn from_payload(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = match payload.downcast::<String>() {
            Ok(s) => *s,
            Err(payload) => match payload.downcast::<&'static str>() {
                Ok(s) => (*s).to_string(),
                Err(_) => "unknown panic payload".to_string(),
            },
        };
        Self(message)
    }
}
