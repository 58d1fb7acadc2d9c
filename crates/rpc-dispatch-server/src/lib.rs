//! # RPC Dispatch Server
//!
//! HTTP/1.1 transport for an [`rpc_dispatch::Engine`], built on hyper and
//! tokio.
//!
//! ## Features
//! - One configurable endpoint path answering `POST`
//! - CORS preflight and response headers for browser clients
//! - Request body size limit
//!
//! ```rust,no_run
//! use rpc_dispatch::{Engine, RequestContext, RpcError};
//! use rpc_dispatch_server::RpcServer;
//!
//! async fn ping(_ctx: RequestContext) -> Result<&'static str, RpcError> {
//!     Ok("pong")
//! }
//!
//! #[tokio::main]
//! async fn main() -> rpc_dispatch_server::Result<()> {
//!     let mut engine = Engine::new();
//!     engine.register("Ping", ping);
//!
//!     let server = RpcServer::builder(engine).rpc_path("/rpc").build();
//!     server.run().await
//! }
//! ```

pub mod cors;
pub mod prelude;
pub mod server;

#[cfg(test)]
mod tests;

// Re-export main types
pub use cors::CorsLayer;
pub use server::{RpcServer, RpcServerBuilder, ServerConfig};

// Re-export foundational types
pub use rpc_dispatch::{Engine, EngineConfig};

/// Result type for server operations
pub type Result<T> = std::result::Result<T, ServerError>;

/// Transport errors
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("HTTP error: {0}")]
    Http(#[from] hyper::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
