//! # RPC Dispatch
//!
//! A server-side dispatch engine for JSON RPC over HTTP. Requests name a
//! method and carry an id and optional parameters, alone or batched in an
//! array:
//!
//! ```json
//! {"id": 1, "method": "Hello", "params": "Alice"}
//! ```
//!
//! Methods are plain async functions. Their parameter type is declared in the
//! signature and decoded from the request before the call; the result is
//! serialized back under `result`, and failures become a uniform
//! `{name, message, data?, details?}` error object.
//!
//! ## Features
//! - Compile-time checked handler signatures
//! - Middleware composed once per method, scoped by nested groups
//! - Batches answered in request order
//! - Handler panics contained per record
//! - Sanitized JSON decode errors that never echo request content
//!
//! ```rust
//! use rpc_dispatch::{Engine, RequestContext, RpcError};
//! use serde_json::{Value, json};
//!
//! async fn hello(_ctx: RequestContext, name: String) -> Result<Value, RpcError> {
//!     Ok(json!({"message": format!("Hello, {}", name)}))
//! }
//!
//! let mut engine = Engine::new();
//! engine.register("Hello", hello);
//! ```

pub mod context;
pub mod engine;
pub mod error;
pub mod group;
pub mod json_errors;
pub mod method;
pub mod middleware;
pub mod prelude;
pub mod request;
pub mod response;

#[cfg(test)]
mod tests;

// Re-export main types
pub use context::RequestContext;
pub use engine::{Engine, EngineConfig};
pub use error::{BoxError, ConfigError, ErrorObject, Panicked, RpcError, error_names};
pub use group::{GroupId, Scope};
pub use json_errors::{FieldError, json_error_details, json_field_error_details};
pub use method::{Method, MethodHandler, ParamShape, ParamsMismatch};
pub use middleware::{CallResult, Middleware, Next, Params, from_fn};
pub use request::{RequestId, RequestRecord, parse_requests};
pub use response::{Envelope, ResponseRecord};
