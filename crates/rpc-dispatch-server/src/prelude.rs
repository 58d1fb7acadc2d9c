//! # RPC Dispatch Server Prelude
//!
//! ```rust
//! use rpc_dispatch_server::prelude::*;
//! ```

// Core server types
pub use crate::cors::CorsLayer;
pub use crate::server::{RpcServer, RpcServerBuilder, ServerConfig};

// Re-export foundational types
pub use rpc_dispatch::prelude::*;

// Error types
pub use crate::{Result, ServerError};
