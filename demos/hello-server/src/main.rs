//! # Hello RPC Server
//!
//! A small server showing method registration, root and group middleware,
//! and error reporting.
//!
//! ## Usage
//! ```bash
//! RUST_LOG=debug cargo run --package hello-server -- --bind 127.0.0.1:8000 --dump-errors
//! ```
//!
//! ```bash
//! curl -X POST http://127.0.0.1:8000/rpc \
//!   -H "Content-Type: application/json" \
//!   -d '{"id": 1, "method": "Hello", "params": "Alice"}'
//!
//! curl -X POST http://127.0.0.1:8000/rpc \
//!   -H "Content-Type: application/json" \
//!   -H "X-Api-Key: letmein" \
//!   -d '[{"id": 1, "method": "Now"}, {"id": 2, "method": "Admin.Stats"}]'
//! ```

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Parser;
use rpc_dispatch::{CallResult, Engine, Next, Params, RequestContext, RpcError, from_fn, rpc_error};
use rpc_dispatch_server::RpcServer;
use serde::Deserialize;
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to listen on
    #[arg(short, long, default_value = "127.0.0.1:8000")]
    bind: SocketAddr,

    /// Path of the RPC endpoint
    #[arg(short, long, default_value = "/rpc")]
    path: String,

    /// Include wrapped error causes in responses
    #[arg(long, default_value = "false")]
    dump_errors: bool,

    /// API key required by the Admin.* methods
    #[arg(long, default_value = "letmein")]
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct GreetParams {
    name: String,
    #[serde(default)]
    greeting: Option<String>,
}

async fn hello(_ctx: RequestContext, name: String) -> Result<Value, RpcError> {
    Ok(json!({"message": format!("Hello, {}", name)}))
}

async fn greet(_ctx: RequestContext, params: GreetParams) -> Result<Value, RpcError> {
    if params.name.trim().is_empty() {
        return Err(RpcError::invalid_params("name must be present")
            .with_data(json!({"name": "must be present"})));
    }
    let greeting = params.greeting.as_deref().unwrap_or("Hello");
    Ok(json!({"message": format!("{}, {}", greeting, params.name)}))
}

async fn now(_ctx: RequestContext) -> Result<DateTime<Utc>, RpcError> {
    Ok(Utc::now())
}

async fn divide(_ctx: RequestContext, operands: (f64, f64)) -> Result<f64, RpcError> {
    let (dividend, divisor) = operands;
    if divisor == 0.0 {
        return Err(rpc_error!("division_by_zero", "cannot divide {} by zero", dividend));
    }
    Ok(dividend / divisor)
}

/// Logs each call with its duration
fn timing(
    ctx: RequestContext,
    params: Params,
    next: Next,
) -> impl Future<Output = CallResult> + Send + 'static {
    let method = ctx.method().to_string();
    let started = Instant::now();
    async move {
        let result = next.run(ctx, params).await;
        info!(
            method = %method,
            ok = result.is_ok(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "call finished"
        );
        result
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let calls = Arc::new(AtomicU64::new(0));

    let mut engine = Engine::new();
    let admin = engine.group();

    engine.use_middleware(from_fn(timing));

    let counter = Arc::clone(&calls);
    engine.use_middleware(from_fn(move |ctx, params, next: Next| {
        counter.fetch_add(1, Ordering::Relaxed);
        next.run(ctx, params)
    }));

    let api_key = Arc::new(args.api_key);
    engine
        .scope(admin)
        .use_middleware(from_fn(move |ctx: RequestContext, params, next: Next| {
            let api_key = Arc::clone(&api_key);
            async move {
                let presented = ctx
                    .request()
                    .headers
                    .get("x-api-key")
                    .and_then(|v| v.to_str().ok());
                if presented != Some(api_key.as_str()) {
                    return Err(RpcError::unauthorized("missing or invalid api key").into());
                }
                next.run(ctx, params).await
            }
        }));

    engine
        .register("Hello", hello)
        .register("Greet", greet)
        .register("Now", now)
        .register("Divide", divide);

    let stats = Arc::clone(&calls);
    engine
        .scope(admin)
        .register("Admin.Stats", move |_ctx: RequestContext| {
            let stats = Arc::clone(&stats);
            async move { Ok::<_, RpcError>(json!({"calls": stats.load(Ordering::Relaxed)})) }
        });

    let server = RpcServer::builder(engine)
        .bind_address(args.bind)
        .rpc_path(args.path)
        .dump_errors(args.dump_errors)
        .build();

    info!(
        "Serving {} on http://{}{}",
        server.engine().method_names().join(", "),
        server.config().bind_address,
        server.config().rpc_path
    );
    server.run().await?;
    Ok(())
}
