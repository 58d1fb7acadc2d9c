//! The request engine: method registry plus the per-exchange lifecycle
//!
//! An exchange moves through these stages:
//!
//! 1. read the body (`invalid_request` and HTTP 400 on failure)
//! 2. split it into records (`parse_error`, `empty batch` or duplicate ids
//!    answer HTTP 400 with a single error)
//! 3. dispatch every record independently: validate the id, look up the
//!    method, decode its parameter, run the pipeline; a panic in any of
//!    these steps fails only that record
//! 4. answer HTTP 200 with one response per record, in request order

use bytes::Bytes;
use futures::FutureExt;
use futures::future::join_all;
use http::request::Parts;
use http::{HeaderValue, Request, Response, StatusCode, header};
use http_body::Body;
use http_body_util::{BodyExt, Full};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::context::RequestContext;
use crate::error::{BoxError, ConfigError, Panicked, RpcError};
use crate::group::{GroupId, GroupTree, Scope};
use crate::method::{Method, MethodHandler};
use crate::middleware::{Middleware, Params};
use crate::request::{RequestRecord, parse_requests};
use crate::response::{Envelope, ResponseRecord};

const CONTENT_TYPE_JSON: &str = "application/json; charset=utf-8";

/// Written when an envelope cannot be serialized
const FALLBACK_BODY: &str =
    "{\n  \"error\": {\n    \"name\": \"internal_error\",\n    \"message\": \"internal error\"\n  },\n  \"id\": null\n}\n";

/// Engine settings
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Expose wrapped causes of errors as `details`; for local debugging only
    pub dump_errors: bool,
}

/// Routes request records to registered methods
///
/// Registration takes `&mut self`; serving takes `&self`, so a configured
/// engine is typically shared behind an `Arc`.
///
/// ```rust
/// use rpc_dispatch::{Engine, RequestContext, RpcError};
/// use serde_json::{Value, json};
///
/// async fn hello(_ctx: RequestContext, name: String) -> Result<Value, RpcError> {
///     Ok(json!({"message": format!("Hello, {}", name)}))
/// }
///
/// let mut engine = Engine::new();
/// engine.register("Hello", hello);
/// assert!(engine.has_method("Hello"));
/// ```
pub struct Engine {
    config: EngineConfig,
    methods: HashMap<String, Method>,
    groups: GroupTree,
}

impl Engine {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            config,
            methods: HashMap::new(),
            groups: GroupTree::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn set_dump_errors(&mut self, dump_errors: bool) {
        self.config.dump_errors = dump_errors;
    }

    pub fn dump_errors(&self) -> bool {
        self.config.dump_errors
    }

    /// Create a child of the root group
    pub fn group(&mut self) -> GroupId {
        self.scope(GroupId::ROOT).group()
    }

    /// Registration view of `group`
    pub fn scope(&mut self, group: GroupId) -> Scope<'_> {
        Scope::new(self, group)
    }

    /// Add root middleware. Panics if any method is already registered.
    pub fn use_middleware(&mut self, layer: impl Middleware) -> &mut Self {
        if let Err(err) = self.try_use_middleware(layer) {
            panic!("rpc-dispatch: {}", err);
        }
        self
    }

    pub fn try_use_middleware(&mut self, layer: impl Middleware) -> Result<(), ConfigError> {
        self.try_use_middleware_in(GroupId::ROOT, layer)
    }

    /// Register a method in the root group. Panics on a duplicate name.
    pub fn register<Args, H>(&mut self, name: &str, handler: H) -> &mut Self
    where
        H: MethodHandler<Args>,
    {
        if let Err(err) = self.try_register(name, handler) {
            panic!("rpc-dispatch: {}", err);
        }
        self
    }

    pub fn try_register<Args, H>(&mut self, name: &str, handler: H) -> Result<(), ConfigError>
    where
        H: MethodHandler<Args>,
    {
        self.try_register_in(GroupId::ROOT, name, handler)
    }

    pub(crate) fn try_group_in(&mut self, parent: GroupId) -> Result<GroupId, ConfigError> {
        self.groups.add_child(parent)
    }

    pub(crate) fn try_use_middleware_in(
        &mut self,
        group: GroupId,
        layer: impl Middleware,
    ) -> Result<(), ConfigError> {
        if !self.methods.is_empty() {
            return Err(ConfigError::MiddlewareAfterRegistration);
        }
        self.groups.push_middleware(group, Arc::new(layer))
    }

    pub(crate) fn try_register_in<Args, H>(
        &mut self,
        group: GroupId,
        name: &str,
        handler: H,
    ) -> Result<(), ConfigError>
    where
        H: MethodHandler<Args>,
    {
        if self.methods.contains_key(name) {
            return Err(ConfigError::DuplicateMethod(name.to_string()));
        }
        let groups = &self.groups;
        let method = Method::resolve(name, handler, |raw| groups.compose(group, raw))?;
        debug!(method = name, group = group.index(), "registered method");
        self.methods.insert(name.to_string(), method);
        Ok(())
    }

    /// Registered method names, sorted
    pub fn method_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.methods.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    pub fn method(&self, name: &str) -> Option<&Method> {
        self.methods.get(name)
    }

    /// Answer one HTTP exchange
    pub async fn handle<B>(&self, request: Request<B>) -> Response<Full<Bytes>>
    where
        B: Body,
        B::Error: Into<BoxError>,
    {
        let (parts, body) = request.into_parts();

        let body = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(err) => {
                return self.reject(RpcError::invalid_request("could not read body").wrap(err));
            }
        };

        let records = match parse_requests(&body) {
            Ok(records) => records,
            Err(err) => return self.reject(err),
        };

        let head = Arc::new(parts);
        let responses = join_all(
            records
                .iter()
                .map(|record| self.dispatch(Arc::clone(&head), record)),
        )
        .await;

        self.respond(StatusCode::OK, &Envelope::from_records(responses))
    }

    async fn dispatch(&self, head: Arc<Parts>, record: &RequestRecord) -> ResponseRecord {
        let id = record.request_id();
        let outcome = match id {
            Some(_) => self.invoke(head, record).await,
            None => Err(RpcError::invalid_request("id must be number or string")),
        };

        match outcome {
            Ok(result) => ResponseRecord::success(id, result),
            Err(err) => {
                debug!(method = %record.method, error = %err, "method returned an error");
                ResponseRecord::error(id, err.to_error_object(self.config.dump_errors))
            }
        }
    }

    /// Run one record with panics contained; a panic anywhere in
    /// `call`, including inside a parameter's `Deserialize`, only
    /// fails this record
    async fn invoke(&self, head: Arc<Parts>, record: &RequestRecord) -> Result<Value, RpcError> {
        match AssertUnwindSafe(self.call(head, record)).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(payload) => {
                let panicked = Panicked::from_payload(payload);
                error!(method = %record.method, "handler panicked: {}", panicked.0);
                Err(RpcError::internal(panicked))
            }
        }
    }

    async fn call(&self, head: Arc<Parts>, record: &RequestRecord) -> Result<Value, RpcError> {
        let method = self
            .methods
            .get(&record.method)
            .ok_or_else(|| RpcError::method_not_found(&record.method))?;

        let params = match method.param_shape() {
            Some(shape) => {
                let raw = record.params_text().as_bytes();
                shape
                    .decode(raw)
                    .map_err(|err| RpcError::parse_field_error("cannot parse params", err, raw))?
            }
            None => Params::none(),
        };

        debug!(method = %record.method, id = %record.id, "dispatching");
        let ctx = RequestContext::new(&record.method, head);
        method
            .pipeline()
            .run(ctx, params)
            .await
            .map_err(RpcError::from_fault)
    }

    /// Answer a payload that never reached dispatch
    fn reject(&self, err: RpcError) -> Response<Full<Bytes>> {
        warn!(error = %err, "rejected request payload");
        let record = ResponseRecord::error(None, err.to_error_object(self.config.dump_errors));
        self.respond(StatusCode::BAD_REQUEST, &Envelope::Single(record))
    }

    fn respond(&self, status: StatusCode, envelope: &Envelope) -> Response<Full<Bytes>> {
        let (status, body) = match envelope.to_body() {
            Ok(body) => (status, Bytes::from(body)),
            Err(err) => {
                error!(error = %err, "failed to serialize response");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Bytes::from_static(FALLBACK_BODY.as_bytes()),
                )
            }
        };

        let mut response = Response::new(Full::new(body));
        *response.status_mut() = status;
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(CONTENT_TYPE_JSON),
        );
        response
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("methods", &self.method_names())
            .field("groups", &self.groups.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::Next;

    async fn noop(_ctx: RequestContext) -> Result<(), RpcError> {
        Ok(())
    }

    fn passthrough(next: Next) -> Next {
        next
    }

    #[test]
    fn test_introspection() {
        let mut engine = Engine::new();
        engine.register("B", noop).register("A", noop);

        assert_eq!(engine.method_names(), vec!["A", "B"]);
        assert!(engine.has_method("A"));
        assert!(!engine.has_method("C"));
        assert_eq!(engine.method("B").map(Method::name), Some("B"));
    }

    #[test]
    fn test_try_register_duplicate() {
        let mut engine = Engine::new();
        engine.try_register("Do", noop).unwrap();
        let group = engine.group();
        assert_eq!(
            engine.scope(group).try_register("Do", noop),
            Err(ConfigError::DuplicateMethod("Do".to_string()))
        );
    }

    #[test]
    fn test_try_use_middleware_after_register() {
        let mut engine = Engine::new();
        let group = engine.group();
        engine.try_use_middleware(passthrough).unwrap();
        engine.scope(group).try_register("Do", noop).unwrap();

        assert_eq!(
            engine.try_use_middleware(passthrough),
            Err(ConfigError::MiddlewareAfterRegistration)
        );
        assert_eq!(
            engine.scope(group).try_use_middleware(passthrough),
            Err(ConfigError::MiddlewareAfterRegistration)
        );
    }

    #[test]
    fn test_config() {
        let mut engine = Engine::with_config(EngineConfig { dump_errors: true });
        assert!(engine.dump_errors());
        engine.set_dump_errors(false);
        assert!(!engine.config().dump_errors);
        assert!(format!("{:?}", engine).contains("dump_errors: false"));
    }
}
