//! Simple Calculator Example
//!
//! Registers two arithmetic methods on an [`Engine`] and feeds it in-memory
//! HTTP requests, printing each response body.

use bytes::Bytes;
use http::Request;
use http_body_util::{BodyExt, Full};
use rpc_dispatch::{Engine, RequestContext, RpcError};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct Operands {
    a: f64,
    b: f64,
}

async fn add(_ctx: RequestContext, ops: Operands) -> Result<f64, RpcError> {
    Ok(ops.a + ops.b)
}

async fn divide(_ctx: RequestContext, ops: Operands) -> Result<f64, RpcError> {
    if ops.b == 0.0 {
        return Err(RpcError::invalid_params("division by zero"));
    }
    Ok(ops.a / ops.b)
}

async fn call(engine: &Engine, body: &'static str) {
    let request = Request::post("/rpc")
        .body(Full::new(Bytes::from_static(body.as_bytes())))
        .expect("valid request");
    let response = engine.handle(request).await;
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("infallible body")
        .to_bytes();
    println!("{} -> {}\n{}", body, status, String::from_utf8_lossy(&bytes));
}

#[tokio::main]
async fn main() {
    let mut engine = Engine::new();
    engine.register("add", add).register("divide", divide);

    call(&engine, r#"{"id": 1, "method": "add", "params": {"a": 2, "b": 3}}"#).await;
    call(&engine, r#"{"id": 2, "method": "divide", "params": {"a": 1, "b": 0}}"#).await;
    call(
        &engine,
        r#"[{"id": 3, "method": "add", "params": {"a": 1, "b": 1}}, {"id": 4, "method": "subtract"}]"#,
    )
    .await;
    call(&engine, r#"{"id": 5, "method": "add", "params": {"a": "one"}}"#).await;
}
