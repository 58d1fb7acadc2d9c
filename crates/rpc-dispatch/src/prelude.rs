//! # RPC Dispatch Prelude
//!
//! Re-exports of the types needed to register methods and middleware.
//!
//! ```rust
//! use rpc_dispatch::prelude::*;
//! ```

pub use crate::context::RequestContext;
pub use crate::engine::{Engine, EngineConfig};
pub use crate::error::{BoxError, ConfigError, RpcError, error_names};
pub use crate::group::{GroupId, Scope};
pub use crate::middleware::{Middleware, Next, Params, from_fn};
pub use crate::rpc_error;
