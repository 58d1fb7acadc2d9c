//! Per-call context handed to middleware and handlers

use http::Extensions;
use http::request::Parts;
use std::sync::Arc;

/// Context for one dispatched request record
///
/// Gives access to the method being dispatched and the head of the inbound
/// HTTP request the record arrived in. Middleware can attach typed values
/// for handlers further down the pipeline through [`extensions_mut`].
///
/// # Examples
///
/// ```rust
/// use rpc_dispatch::RequestContext;
///
/// #[derive(Clone)]
/// struct UserId(u64);
///
/// let mut ctx = RequestContext::from_method("GetUser");
/// ctx.extensions_mut().insert(UserId(7));
///
/// assert_eq!(ctx.method(), "GetUser");
/// assert_eq!(ctx.extensions().get::<UserId>().map(|u| u.0), Some(7));
/// ```
///
/// [`extensions_mut`]: RequestContext::extensions_mut
#[derive(Debug, Clone)]
pub struct RequestContext {
    method: Arc<str>,
    request: Arc<Parts>,
    extensions: Extensions,
}

impl RequestContext {
    pub(crate) fn new(method: &str, request: Arc<Parts>) -> Self {
        Self {
            method: Arc::from(method),
            request,
            extensions: Extensions::new(),
        }
    }

    /// Context not tied to a real HTTP exchange (the request head is empty).
    /// Useful when exercising middleware directly.
    pub fn from_method(method: &str) -> Self {
        let (parts, ()) = http::Request::new(()).into_parts();
        Self::new(method, Arc::new(parts))
    }

    /// Name of the method being dispatched
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Head (method, uri, headers) of the inbound HTTP request
    pub fn request(&self) -> &Parts {
        &self.request
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }
}
