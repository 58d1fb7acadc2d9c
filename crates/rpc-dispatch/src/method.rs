//! Method resolution: turning handler functions into uniform pipelines
//!
//! Handlers are plain async functions of one of two shapes:
//!
//! ```text
//! async fn(RequestContext) -> Result<R, E>
//! async fn(RequestContext, P) -> Result<R, E>
//! ```
//!
//! where `R: Serialize`, `E: Into<BoxError>` and `P: DeserializeOwned`.
//! [`MethodHandler`] is implemented for exactly these shapes, so a handler
//! with any other signature is rejected by the compiler at the registration
//! call site.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;
use std::future::Future;
use thiserror::Error;

use crate::context::RequestContext;
use crate::error::{BoxError, ConfigError};
use crate::json_errors::FieldError;
use crate::middleware::{CallResult, Next, Params};

/// A function usable as an RPC method
///
/// `Args` is `()` for handlers without a parameter and `(P,)` for handlers
/// taking a `P`; it only exists to keep the two blanket impls apart and is
/// always inferred.
pub trait MethodHandler<Args>: Send + Sync + 'static {
    /// Decoder for the declared parameter, `None` for parameterless handlers
    fn param_shape(&self) -> Option<ParamShape>;

    /// The raw (unwrapped) pipeline stage invoking this handler
    fn into_next(self) -> Next;
}

impl<F, Fut, R, E> MethodHandler<()> for F
where
    F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
    R: Serialize,
    E: Into<BoxError>,
{
    fn param_shape(&self) -> Option<ParamShape> {
        None
    }

    fn into_next(self) -> Next {
        Next::new(move |ctx, _params| {
            let call = self(ctx);
            async move { finish(call.await) }
        })
    }
}

impl<F, Fut, P, R, E> MethodHandler<(P,)> for F
where
    F: Fn(RequestContext, P) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
    P: DeserializeOwned + Send + 'static,
    R: Serialize,
    E: Into<BoxError>,
{
    fn param_shape(&self) -> Option<ParamShape> {
        Some(ParamShape::of::<P>())
    }

    fn into_next(self) -> Next {
        Next::new(move |ctx, params: Params| {
            let call = params
                .take::<P>()
                .map(|params| self(ctx, params))
                .map_err(|_| ParamsMismatch {
                    expected: std::any::type_name::<P>(),
                });
            async move {
                match call {
                    Ok(call) => finish(call.await),
                    Err(mismatch) => Err(mismatch.into()),
                }
            }
        })
    }
}

fn finish<R: Serialize, E: Into<BoxError>>(result: Result<R, E>) -> CallResult {
    let value = result.map_err(Into::into)?;
    serde_json::to_value(value).map_err(Into::into)
}

/// Middleware replaced the decoded parameter with a value of another type
#[derive(Debug, Error)]
#[error("params are not of the declared type {expected}")]
pub struct ParamsMismatch {
    expected: &'static str,
}

/// The declared parameter type of a method
///
/// Decoding always produces a fresh value of the concrete type; a boxed
/// parameter (`Box<T>`) is decoded through its pointee by serde.
#[derive(Clone, Copy)]
pub struct ParamShape {
    type_name: &'static str,
    decode: fn(&[u8]) -> Result<Params, FieldError>,
}

impl ParamShape {
    pub fn of<P: DeserializeOwned + Send + 'static>() -> Self {
        Self {
            type_name: std::any::type_name::<P>(),
            decode: decode_into::<P>,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Decode one raw JSON value into a new parameter value, tracking the
    /// path of a failing field
    pub fn decode(&self, raw: &[u8]) -> Result<Params, FieldError> {
        (self.decode)(raw)
    }
}

impl fmt::Debug for ParamShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ParamShape").field(&self.type_name).finish()
    }
}

fn decode_into<P: DeserializeOwned + Send + 'static>(raw: &[u8]) -> Result<Params, FieldError> {
    let mut de = serde_json::Deserializer::from_slice(raw);
    serde_path_to_error::deserialize::<_, P>(&mut de).map(Params::new)
}

/// A registered method: its name, parameter shape and composed pipeline
pub struct Method {
    name: String,
    param_shape: Option<ParamShape>,
    pipeline: Next,
}

impl Method {
    /// Resolve `handler` into a method whose pipeline is produced by `compose`
    /// from the handler's raw stage.
    pub(crate) fn resolve<Args, H, C>(
        name: &str,
        handler: H,
        compose: C,
    ) -> Result<Self, ConfigError>
    where
        H: MethodHandler<Args>,
        C: FnOnce(Next) -> Result<Next, ConfigError>,
    {
        let param_shape = handler.param_shape();
        Ok(Self {
            name: name.to_string(),
            param_shape,
            pipeline: compose(handler.into_next())?,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn param_shape(&self) -> Option<&ParamShape> {
        self.param_shape.as_ref()
    }

    pub fn pipeline(&self) -> &Next {
        &self.pipeline
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method")
            .field("name", &self.name)
            .field("param_shape", &self.param_shape)
            .finish_non_exhaustive()
    }
}
