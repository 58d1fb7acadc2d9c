//! HTTP server hosting an RPC engine
//!
//! One endpoint path is served. `POST` bodies go to the engine; when CORS is
//! enabled, `OPTIONS` answers the browser preflight.

use bytes::Bytes;
use http::header::{ALLOW, CONTENT_TYPE, HeaderValue};
use http::{Method, Request, Response, StatusCode};
use http_body::Body;
use http_body_util::{Full, Limited};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use rpc_dispatch::{BoxError, Engine};

use crate::{CorsLayer, Result};

/// Configuration for the RPC server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_address: SocketAddr,
    /// Path of the RPC endpoint
    pub rpc_path: String,
    /// Enable CORS
    pub enable_cors: bool,
    /// Maximum request body size in bytes
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 8000)),
            rpc_path: "/rpc".to_string(),
            enable_cors: true,
            max_body_size: 1024 * 1024, // 1MB
        }
    }
}

/// Builder for [`RpcServer`]
pub struct RpcServerBuilder {
    config: ServerConfig,
    engine: Engine,
}

impl RpcServerBuilder {
    /// Create a builder serving `engine` with the default configuration
    pub fn new(engine: Engine) -> Self {
        Self {
            config: ServerConfig::default(),
            engine,
        }
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the bind address
    pub fn bind_address(mut self, addr: SocketAddr) -> Self {
        self.config.bind_address = addr;
        self
    }

    /// Set the RPC endpoint path
    pub fn rpc_path(mut self, path: impl Into<String>) -> Self {
        self.config.rpc_path = path.into();
        self
    }

    /// Enable or disable CORS
    pub fn cors(mut self, enable: bool) -> Self {
        self.config.enable_cors = enable;
        self
    }

    /// Set maximum request body size
    pub fn max_body_size(mut self, size: usize) -> Self {
        self.config.max_body_size = size;
        self
    }

    /// Expose wrapped error causes in responses
    pub fn dump_errors(mut self, enable: bool) -> Self {
        self.engine.set_dump_errors(enable);
        self
    }

    /// Build the server
    pub fn build(self) -> RpcServer {
        RpcServer {
            config: Arc::new(self.config),
            engine: Arc::new(self.engine),
        }
    }
}

/// HTTP server answering RPC requests with a shared [`Engine`]
#[derive(Clone)]
pub struct RpcServer {
    config: Arc<ServerConfig>,
    engine: Arc<Engine>,
}

impl RpcServer {
    /// Create a builder serving `engine`
    pub fn builder(engine: Engine) -> RpcServerBuilder {
        RpcServerBuilder::new(engine)
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Bind the configured address and serve forever
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind_address).await?;
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener. Failed accepts
    /// (for example running out of file descriptors) are logged and retried.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        info!("RPC server listening on {}", listener.local_addr()?);
        info!("RPC endpoint available at: {}", self.config.rpc_path);
        info!("Registered methods: {}", self.engine.method_names().join(", "));

        loop {
            let (stream, peer_addr) = accept_next(|| listener.accept()).await;
            debug!("New connection from {}", peer_addr);

            let server = self.clone();
            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let service = service_fn(move |req| {
                    let server = server.clone();
                    async move { Ok::<_, Infallible>(server.route(req).await) }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    if err.is_incomplete_message() {
                        debug!("Client disconnected (normal): {}", err);
                    } else {
                        error!("Error serving connection: {}", err);
                    }
                }
            });
        }
    }

    /// Answer one HTTP request
    pub async fn route<B>(&self, req: Request<B>) -> Response<Full<Bytes>>
    where
        B: Body,
        B::Error: Into<BoxError>,
    {
        let method = req.method().clone();
        debug!("Handling {} {}", method, req.uri().path());

        let mut response = if req.uri().path() != self.config.rpc_path {
            plain(StatusCode::NOT_FOUND, "Not Found")
        } else if method == Method::POST {
            let limit = self.config.max_body_size;
            self.engine
                .handle(req.map(|body| Limited::new(body, limit)))
                .await
        } else if method == Method::OPTIONS && self.config.enable_cors {
            let mut response = Response::new(Full::new(Bytes::new()));
            *response.status_mut() = StatusCode::NO_CONTENT;
            response
        } else {
            let allow = if self.config.enable_cors {
                CorsLayer::ALLOWED_METHODS
            } else {
                "POST"
            };
            let mut response = plain(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed");
            response
                .headers_mut()
                .insert(ALLOW, HeaderValue::from_static(allow));
            response
        };

        if self.config.enable_cors {
            CorsLayer::apply_cors_headers(response.headers_mut());
        }
        response
    }
}

/// Pause after a failed accept before trying again
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// Accept the next connection, logging and retrying failed attempts
async fn accept_next<F, Fut, T>(mut accept: F) -> T
where
    F: FnMut() -> Fut,
    Fut: Future<Output = io::Result<T>>,
{
    loop {
        match accept().await {
            Ok(conn) => return conn,
            Err(err) => {
                error!("Failed to accept connection: {}", err);
                tokio::time::sleep(ACCEPT_BACKOFF).await;
            }
        }
    }
}

fn plain(status: StatusCode, text: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(text.as_bytes())));
    *response.status_mut() = status;
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}
