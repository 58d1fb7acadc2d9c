//! Pipelines and the middleware that wraps them
//!
//! A method's pipeline is a [`Next`]: a shared async function from
//! `(RequestContext, Params)` to a JSON result or an error. Middleware is a
//! transformation from one `Next` to another, applied once when the method
//! is registered. The composed pipeline is cached on the method, so nothing
//! is re-wrapped per request.
//!
//! # Examples
//!
//! ```rust
//! use rpc_dispatch::middleware::{Next, from_fn};
//! use rpc_dispatch::{Engine, RequestContext, RpcError, Params};
//!
//! let mut engine = Engine::new();
//!
//! // Closure form: receives the next pipeline, returns a new one
//! engine.use_middleware(|next: Next| {
//!     Next::new(move |ctx: RequestContext, params: Params| {
//!         let next = next.clone();
//!         async move {
//!             tracing::debug!(method = ctx.method(), "calling");
//!             next.run(ctx, params).await
//!         }
//!     })
//! });
//!
//! // `from_fn` form: short-circuit before reaching the handler
//! engine.use_middleware(from_fn(|ctx: RequestContext, params: Params, next: Next| async move {
//!     if ctx.request().headers.get("authorization").is_none() {
//!         return Err(RpcError::unauthorized("missing credentials").into());
//!     }
//!     next.run(ctx, params).await
//! }));
//! ```

use futures::future::BoxFuture;
use serde_json::Value;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::context::RequestContext;
use crate::error::BoxError;

/// Outcome of running a pipeline
pub type CallResult = Result<Value, BoxError>;

/// Decoded method parameter, type-erased so middleware of any method shares
/// one signature. Empty for methods that take no parameter.
#[derive(Default)]
pub struct Params(Option<Box<dyn Any + Send>>);

impl Params {
    pub fn none() -> Self {
        Self(None)
    }

    pub fn new<T: Any + Send>(value: T) -> Self {
        Self(Some(Box::new(value)))
    }

    pub fn is_none(&self) -> bool {
        self.0.is_none()
    }

    /// Borrow the parameter if it is a `T`
    pub fn get<T: Any>(&self) -> Option<&T> {
        self.0.as_ref()?.downcast_ref::<T>()
    }

    /// Mutably borrow the parameter if it is a `T`
    pub fn get_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.0.as_mut()?.downcast_mut::<T>()
    }

    /// Take the parameter out as a `T`, handing `self` back on mismatch
    pub fn take<T: Any>(self) -> Result<T, Self> {
        match self.0 {
            Some(boxed) => match boxed.downcast::<T>() {
                Ok(value) => Ok(*value),
                Err(boxed) => Err(Self(Some(boxed))),
            },
            None => Err(Self(None)),
        }
    }
}

impl fmt::Debug for Params {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(_) => f.write_str("Params(..)"),
            None => f.write_str("Params(None)"),
        }
    }
}

/// A callable pipeline stage: the rest of the chain, down to the handler
#[derive(Clone)]
pub struct Next {
    inner: Arc<dyn Fn(RequestContext, Params) -> BoxFuture<'static, CallResult> + Send + Sync>,
}

impl Next {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(RequestContext, Params) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CallResult> + Send + 'static,
    {
        Self {
            inner: Arc::new(move |ctx, params| Box::pin(f(ctx, params))),
        }
    }

    /// Invoke the remainder of the pipeline
    pub fn run(&self, ctx: RequestContext, params: Params) -> BoxFuture<'static, CallResult> {
        (self.inner)(ctx, params)
    }
}

impl fmt::Debug for Next {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next").finish_non_exhaustive()
    }
}

/// A layer wrapping a pipeline in another pipeline
///
/// Implemented for every `Fn(Next) -> Next`. The returned pipeline may
/// inspect or replace the parameters, skip `next` entirely, or post-process
/// what `next` returns.
pub trait Middleware: Send + Sync + 'static {
    fn wrap(&self, next: Next) -> Next;
}

impl<F> Middleware for F
where
    F: Fn(Next) -> Next + Send + Sync + 'static,
{
    fn wrap(&self, next: Next) -> Next {
        self(next)
    }
}

/// Build a middleware from an async function that receives `next` explicitly
pub fn from_fn<F, Fut>(f: F) -> impl Fn(Next) -> Next + Send + Sync + 'static
where
    F: Fn(RequestContext, Params, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = CallResult> + Send + 'static,
{
    let f = Arc::new(f);
    move |next: Next| {
        let f = Arc::clone(&f);
        Next::new(move |ctx, params| f(ctx, params, next.clone()))
    }
}

/// Wrap `next` in `layers`; the first-added layer ends up outermost
pub(crate) fn apply_layers(mut next: Next, layers: &[Arc<dyn Middleware>]) -> Next {
    for layer in layers.iter().rev() {
        next = layer.wrap(next);
    }
    next
}
