//! Test modules for the rpc-dispatch crate
//!
//! End-to-end suites driving [`Engine::handle`](crate::Engine::handle) with
//! in-memory HTTP requests.

pub mod middleware_tests;

use bytes::Bytes;
use http::{Request, StatusCode};
use http_body_util::{BodyExt, Full};
use serde_json::Value;

use crate::Engine;

/// A POST carrying `body`, as a client would send it
pub(crate) fn post(body: &str) -> Request<Full<Bytes>> {
    Request::post("/rpc")
        .header("content-type", "application/json")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap()
}

/// Run `request` through `engine`, returning the status and the decoded body
pub(crate) async fn send(engine: &Engine, request: Request<Full<Bytes>>) -> (StatusCode, Value) {
    let response = engine.handle(request).await;
    let status = response.status();
    assert_eq!(
        response.headers()["content-type"],
        "application/json; charset=utf-8"
    );
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&body).unwrap())
}

pub(crate) async fn call(engine: &Engine, body: &str) -> (StatusCode, Value) {
    send(engine, post(body)).await
}
