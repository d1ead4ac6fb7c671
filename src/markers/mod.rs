//! Built-in markers for declaring HTTP-backed remote interfaces.
//!
//! A marker only names handlers; the handlers' `init` turns it into method
//! configuration and chain registrations. Everything here goes through the
//! same [`HandlerResolver`](crate::handlers::HandlerResolver) as user code.
//!
//! ```rust,ignore
//! use callbox::descriptor::{Interface, MethodSpec, ParamSpec, ReturnKind};
//! use callbox::markers::{Endpoint, PathParam, Request, Retry};
//!
//! let users = Interface::new("Users")
//!     .marker(Endpoint::named("users"))
//!     .method(
//!         MethodSpec::new("get", ReturnKind::Json)
//!             .marker(Request::get("/users/{id}"))
//!             .marker(Retry::default())
//!             .param(ParamSpec::value("id").marker(PathParam::new())),
//!     );
//! ```

mod endpoint;
mod params;
mod request;
mod response;
mod retry;

pub use endpoint::{Endpoint, Timeout};
pub use params::{Binding, BindingTarget, Body, BodyEncoding, HeaderParam, PathParam, QueryParam};
pub use request::{Header, PathTemplate, Request, Segment};
pub use response::{ExpectStatus, ResponseAs};
pub use retry::{Retry, RetryPolicy};

use std::any::Any;

use crate::handlers::{Handler, HandlerType, Marker};

/// Dispatch priorities of the built-in handlers
pub mod priority {
    /// Marks the call retryable before anything else runs
    pub const RETRY: i32 = i32::MIN;
    pub const TRANSPORT: i32 = -100;
    pub const BIND_PARAMS: i32 = -50;
    pub const REQUEST_LINE: i32 = 50;
    pub const JSON: i32 = 100;
    pub const TEXT: i32 = 110;
    pub const BYTES: i32 = 120;
}

/// Context keys written and read by the built-in handlers
pub mod keys {
    use bytes::Bytes;
    use mime::Mime;
    use reqwest::header::HeaderMap;
    use reqwest::{Method, StatusCode, Url};
    use std::collections::HashMap;

    use super::params::Binding;
    use super::request::PathTemplate;
    use super::retry::RetryPolicy;
    use crate::context::Key;

    // Method configuration
    pub const BASE_URL: Key<Url> = Key::new("callbox.http.base_url");
    pub const HTTP_METHOD: Key<Method> = Key::new("callbox.http.method");
    pub const PATH_TEMPLATE: Key<PathTemplate> = Key::new("callbox.http.path_template");
    pub const STATIC_HEADERS: Key<HeaderMap> = Key::new("callbox.http.static_headers");
    pub const BINDINGS: Key<Vec<Binding>> = Key::new("callbox.http.bindings");
    pub const RETRY_POLICY: Key<RetryPolicy> = Key::new("callbox.retry.policy");
    pub const SUCCESS_STATUSES: Key<Vec<StatusCode>> = Key::new("callbox.http.success_statuses");
    pub const RESPONSE_CONTENT_TYPE: Key<Mime> = Key::new("callbox.http.response_content_type");

    // Request context
    pub const PATH_VARS: Key<HashMap<String, String>> = Key::new("callbox.http.path_vars");
    pub const QUERY: Key<Vec<(String, String)>> = Key::new("callbox.http.query");
    pub const PARAM_HEADERS: Key<HeaderMap> = Key::new("callbox.http.param_headers");
    pub const BODY: Key<Bytes> = Key::new("callbox.http.body");
    /// Final request URL, assembled in Before
    pub const URL: Key<Url> = Key::new("callbox.http.url");
    /// Final request headers, assembled in Before
    pub const HEADERS: Key<HeaderMap> = Key::new("callbox.http.headers");
}

/// Attach arbitrary handler types to an interface, method, return value or
/// parameter
#[derive(Debug, Clone, Default)]
pub struct Intercept {
    handlers: Vec<HandlerType>,
}

impl Intercept {
    pub fn with<H: Handler>() -> Self {
        Self::default().and::<H>()
    }

    pub fn and<H: Handler>(mut self) -> Self {
        self.handlers.push(HandlerType::of::<H>());
        self
    }

    /// An abstract handler type, resolved through its candidates
    pub fn resolving(mut self, handler_type: HandlerType) -> Self {
        self.handlers.push(handler_type);
        self
    }
}

impl Marker for Intercept {
    fn handlers(&self) -> Vec<HandlerType> {
        self.handlers.clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
