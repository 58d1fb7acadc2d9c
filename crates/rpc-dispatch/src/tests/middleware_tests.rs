//! Middleware and group tests: composition order, scoping and context flow

use http::{Request, StatusCode};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::{call, post, send};
use crate::{BoxError, Engine, Next, Params, RequestContext, RpcError, from_fn};

async fn noop(_ctx: RequestContext) -> Result<(), RpcError> {
    Ok(())
}

async fn hello(_ctx: RequestContext, name: String) -> Result<String, RpcError> {
    Ok(format!("Hello, {}!", name))
}

fn counting(counter: Arc<AtomicUsize>) -> impl Fn(Next) -> Next + Send + Sync + 'static {
    from_fn(move |ctx, params, next: Next| {
        counter.fetch_add(1, Ordering::SeqCst);
        next.run(ctx, params)
    })
}

fn recording(
    tag: &'static str,
    log: Arc<Mutex<Vec<String>>>,
) -> impl Fn(Next) -> Next + Send + Sync + 'static {
    from_fn(move |ctx, params, next: Next| {
        let log = Arc::clone(&log);
        async move {
            log.lock().unwrap().push(format!("{tag} in"));
            let result = next.run(ctx, params).await;
            log.lock().unwrap().push(format!("{tag} out"));
            result
        }
    })
}

#[tokio::test]
async fn test_middleware() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut engine = Engine::new();
    engine.use_middleware(counting(Arc::clone(&calls)));
    engine.register("Hello", hello);

    let (status, body) = call(&engine, r#"{"id": 1, "method": "Hello", "params": "John"}"#).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"id": 1, "result": "Hello, John!"}));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_middleware_groups() {
    let calls = Arc::new(AtomicUsize::new(0));
    let g1_calls = Arc::new(AtomicUsize::new(0));
    let g2_calls = Arc::new(AtomicUsize::new(0));

    let mut engine = Engine::new();
    let g1 = engine.group();
    let g2 = engine.group();

    // Root middleware added after the groups exist still applies to them
    engine.use_middleware(counting(Arc::clone(&calls)));
    engine
        .scope(g1)
        .use_middleware(counting(Arc::clone(&g1_calls)));
    engine
        .scope(g2)
        .use_middleware(counting(Arc::clone(&g2_calls)));
    engine.scope(g1).register("G1", noop);
    engine.scope(g2).register("G2", noop);

    let (status, _) = call(&engine, r#"{"id": 1, "method": "G1"}"#).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(g1_calls.load(Ordering::SeqCst), 1);
    assert_eq!(g2_calls.load(Ordering::SeqCst), 0);

    let (status, _) = call(&engine, r#"{"id": 1, "method": "G2"}"#).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(g1_calls.load(Ordering::SeqCst), 1);
    assert_eq!(g2_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_parent_middleware_surrounds_child() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut engine = Engine::new();
    let child = engine.group();
    let grandchild = engine.scope(child).group();

    engine.use_middleware(recording("root-a", Arc::clone(&log)));
    engine.use_middleware(recording("root-b", Arc::clone(&log)));
    engine
        .scope(child)
        .use_middleware(recording("child", Arc::clone(&log)));
    engine
        .scope(grandchild)
        .use_middleware(recording("grandchild", Arc::clone(&log)));

    let handler_log = Arc::clone(&log);
    engine.scope(grandchild).register("Leaf", move |_ctx: RequestContext| {
        let log = Arc::clone(&handler_log);
        async move {
            log.lock().unwrap().push("handler".to_string());
            Ok::<_, RpcError>("leaf")
        }
    });

    let (_, body) = call(&engine, r#"{"id": 1, "method": "Leaf"}"#).await;
    assert_eq!(body, json!({"id": 1, "result": "leaf"}));
    assert_eq!(
        *log.lock().unwrap(),
        vec![
            "root-a in",
            "root-b in",
            "child in",
            "grandchild in",
            "handler",
            "grandchild out",
            "child out",
            "root-b out",
            "root-a out",
        ]
    );
}

#[tokio::test]
async fn test_sibling_groups_are_isolated() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut engine = Engine::new();
    let admin = engine.group();
    engine
        .scope(admin)
        .use_middleware(recording("admin", Arc::clone(&log)));
    engine.register("Public", noop);
    engine.scope(admin).register("Private", noop);

    call(&engine, r#"{"id": 1, "method": "Public"}"#).await;
    assert!(log.lock().unwrap().is_empty());

    call(&engine, r#"{"id": 1, "method": "Private"}"#).await;
    assert_eq!(*log.lock().unwrap(), vec!["admin in", "admin out"]);
}

#[tokio::test]
async fn test_middleware_sees_decoded_params() {
    let seen = Arc::new(Mutex::new(None));
    let mut engine = Engine::new();

    let recorder = Arc::clone(&seen);
    engine.use_middleware(from_fn(move |ctx, mut params: Params, next: Next| {
        *recorder.lock().unwrap() = params.get::<String>().cloned();
        if let Some(name) = params.get_mut::<String>() {
            name.push_str(" Smith");
        }
        next.run(ctx, params)
    }));
    engine.register("Hello", hello);

    let (_, body) = call(&engine, r#"{"id": 1, "method": "Hello", "params": "Alice"}"#).await;
    assert_eq!(seen.lock().unwrap().as_deref(), Some("Alice"));
    assert_eq!(body["result"], "Hello, Alice Smith!");
}

#[tokio::test]
async fn test_middleware_short_circuit() {
    let mut engine = Engine::new();
    engine.use_middleware(from_fn(|ctx: RequestContext, params, next: Next| async move {
        if ctx.request().headers.get("authorization").is_none() {
            return Err(RpcError::unauthorized("missing credentials").into());
        }
        next.run(ctx, params).await
    }));
    engine.register("Hello", hello);

    let body = r#"{"id": 1, "method": "Hello", "params": "Alice"}"#;
    let (status, response) = call(&engine, body).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        response,
        json!({"id": 1, "error": {"name": "unauthorized", "message": "missing credentials"}})
    );

    let request = Request::post("/rpc")
        .header("authorization", "Bearer token")
        .body(post(body).into_body())
        .unwrap();
    let (_, response) = send(&engine, request).await;
    assert_eq!(response, json!({"id": 1, "result": "Hello, Alice!"}));
}

#[tokio::test]
async fn test_middleware_rewrites_result() {
    let mut engine = Engine::new();
    engine.use_middleware(from_fn(|ctx, params, next: Next| async move {
        let result = next.run(ctx, params).await?;
        Ok::<_, BoxError>(json!({"wrapped": result}))
    }));
    engine.register("Hello", hello);

    let (_, body) = call(&engine, r#"{"id": 1, "method": "Hello", "params": "Bob"}"#).await;
    assert_eq!(body["result"], json!({"wrapped": "Hello, Bob!"}));
}

#[derive(Clone)]
struct Caller(&'static str);

#[tokio::test]
async fn test_extensions_flow_to_handler() {
    let mut engine = Engine::new();
    engine.use_middleware(from_fn(|mut ctx: RequestContext, params, next: Next| {
        ctx.extensions_mut().insert(Caller("middleware"));
        next.run(ctx, params)
    }));
    engine.register("WhoCalled", |ctx: RequestContext| async move {
        let caller = ctx.extensions().get::<Caller>().map(|c| c.0);
        Ok::<_, RpcError>(caller)
    });

    let (_, body) = call(&engine, r#"{"id": 1, "method": "WhoCalled"}"#).await;
    assert_eq!(body["result"], "middleware");
}

#[tokio::test]
async fn test_context() {
    let seen: Arc<Mutex<Option<(String, String, Option<String>)>>> = Arc::new(Mutex::new(None));
    let mut engine = Engine::new();

    let recorder = Arc::clone(&seen);
    engine.register("Do", move |ctx: RequestContext| {
        let recorder = Arc::clone(&recorder);
        async move {
            let content_type = ctx
                .request()
                .headers
                .get("content-type")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            *recorder.lock().unwrap() = Some((
                ctx.method().to_string(),
                ctx.request().uri.path().to_string(),
                content_type,
            ));
            Ok::<_, RpcError>(Value::Null)
        }
    });

    let (status, _) = call(&engine, r#"{"id": 1, "method": "Do"}"#).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        seen.lock().unwrap().clone(),
        Some((
            "Do".to_string(),
            "/rpc".to_string(),
            Some("application/json".to_string())
        ))
    );
}

#[test]
#[should_panic(expected = "rpc-dispatch: method already registered: Do")]
fn test_prevent_dupe_methods() {
    let mut engine = Engine::new();
    engine.register("Do", noop);
    let group = engine.group();
    engine.scope(group).register("Do", noop);
}

#[test]
#[should_panic(expected = "rpc-dispatch: middleware must be registered before methods")]
fn test_prevent_middleware_after_register() {
    let mut engine = Engine::new();
    engine.register("Do", noop);
    engine.use_middleware(|next: Next| next);
}

#[test]
#[should_panic(expected = "rpc-dispatch: middleware must be registered before methods")]
fn test_prevent_group_middleware_after_register() {
    let mut engine = Engine::new();
    let group = engine.group();
    engine.register("Do", noop);
    engine.scope(group).use_middleware(|next: Next| next);
}
