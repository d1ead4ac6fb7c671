use async_trait::async_trait;
use reqwest::Method;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::any::Any;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use super::keys::{
    BASE_URL, BINDINGS, HEADERS, HTTP_METHOD, PARAM_HEADERS, PATH_TEMPLATE, PATH_VARS, QUERY,
    STATIC_HEADERS, URL,
};
use super::params::BindingTarget;
use super::priority;
use crate::descriptor::{InitContext, MethodDescriptor};
use crate::error::{CallError, DescriptorError};
use crate::handlers::{Handler, HandlerType, Interceptor, Marker, Phase};
use crate::invoker::Invocation;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Var(String),
}

/// Path below the endpoint's base URL, with `{name}` segments filled from
/// path parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    segments: Vec<Segment>,
}

impl PathTemplate {
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Var(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }
}

impl FromStr for PathTemplate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut segments = Vec::new();
        for raw in s.split('/').filter(|segment| !segment.is_empty()) {
            let segment = match raw.strip_prefix('{').and_then(|rest| rest.strip_suffix('}')) {
                Some(name) => {
                    let valid = !name.is_empty()
                        && name
                            .chars()
                            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
                    if !valid {
                        return Err(format!("invalid path variable '{}'", raw));
                    }
                    if segments.contains(&Segment::Var(name.to_string())) {
                        return Err(format!("path variable '{}' appears twice", name));
                    }
                    Segment::Var(name.to_string())
                }
                None if raw.contains(['{', '}']) => {
                    return Err(format!("unbalanced braces in segment '{}'", raw));
                }
                None => Segment::Literal(raw.to_string()),
            };
            segments.push(segment);
        }
        Ok(Self { segments })
    }
}

impl fmt::Display for PathTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("/");
        }
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => write!(f, "/{}", text)?,
                Segment::Var(name) => write!(f, "/{{{}}}", name)?,
            }
        }
        Ok(())
    }
}

/// HTTP verb and path of a method
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    method: Method,
    path: String,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn head(path: impl Into<String>) -> Self {
        Self::new(Method::HEAD, path)
    }
}

impl Marker for Request {
    fn handlers(&self) -> Vec<HandlerType> {
        vec![HandlerType::of::<RequestLine>()]
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Assembles the final URL and headers from the method configuration and
/// whatever the parameter binder put in the request context
pub(crate) struct RequestLine;

#[async_trait]
impl Interceptor for RequestLine {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn phases(&self) -> &'static [Phase] {
        &[Phase::Before]
    }

    fn priority(&self) -> i32 {
        priority::REQUEST_LINE
    }

    fn init(&self, ctx: &mut InitContext<'_>) -> Result<(), DescriptorError> {
        let request = ctx.marker_as::<Request>()?;
        let template = request
            .path
            .parse::<PathTemplate>()
            .map_err(|reason| ctx.malformed(reason))?;

        let config = ctx.config_mut();
        config.put(&HTTP_METHOD, request.method.clone());
        config.put(&PATH_TEMPLATE, template);
        ctx.register();
        Ok(())
    }

    fn verify(&self, descriptor: &MethodDescriptor) -> Result<(), DescriptorError> {
        let config = descriptor.config();
        if !config.contains_key(&BASE_URL) {
            return Err(descriptor.malformed("Request", "no endpoint declared"));
        }

        let Some(template) = config.get(&PATH_TEMPLATE) else {
            return Ok(());
        };
        let bindings = config.get(&BINDINGS).map(Vec::as_slice).unwrap_or_default();
        for variable in template.variables() {
            let bound = bindings.iter().any(|binding| {
                matches!(&binding.target, BindingTarget::Path(name) if name == variable)
            });
            if !bound {
                return Err(descriptor.malformed(
                    "Request",
                    format!("path variable '{}' in {} has no path parameter", variable, template),
                ));
            }
        }
        Ok(())
    }

    async fn before(&self, inv: &mut Invocation<'_>) -> Result<(), CallError> {
        let config = inv.config();
        let base = config.get(&BASE_URL).ok_or_else(|| {
            CallError::Encode(format!("{} has no endpoint", inv.descriptor().id()))
        })?;

        let mut url = base.clone();
        // An empty template leaves the base path untouched, trailing slash included
        let template = config
            .get(&PATH_TEMPLATE)
            .filter(|template| !template.segments().is_empty());
        if let Some(template) = template {
            let vars = inv.request.get(&PATH_VARS);
            let mut path = url
                .path_segments_mut()
                .map_err(|_| CallError::Encode(format!("base url {} cannot carry a path", base)))?;
            path.pop_if_empty();
            for segment in template.segments() {
                match segment {
                    Segment::Literal(text) => {
                        path.push(text);
                    }
                    Segment::Var(name) => {
                        let value = vars.and_then(|vars| vars.get(name)).ok_or_else(|| {
                            CallError::Encode(format!("missing path variable '{}'", name))
                        })?;
                        path.push(value);
                    }
                }
            }
        }

        if let Some(query) = inv.request.get(&QUERY) {
            if !query.is_empty() {
                url.query_pairs_mut().extend_pairs(query.iter());
            }
        }

        let mut headers = config.get(&STATIC_HEADERS).cloned().unwrap_or_default();
        if let Some(bound) = inv.request.get(&PARAM_HEADERS) {
            headers.extend(bound.clone());
        }

        debug!(method = ?config.get(&HTTP_METHOD), url = %url, "assembled request line");
        inv.request.put(&URL, url);
        inv.request.put(&HEADERS, headers);
        Ok(())
    }
}

impl Handler for RequestLine {
    const NAME: &'static str = "callbox.request_line";

    fn construct() -> Result<Self, String> {
        Ok(RequestLine)
    }
}

/// A header sent with every call of the interface or method
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    name: String,
    value: String,
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

impl Marker for Header {
    fn handlers(&self) -> Vec<HandlerType> {
        vec![HandlerType::of::<StaticHeaders>()]
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub(crate) struct StaticHeaders;

impl Interceptor for StaticHeaders {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn phases(&self) -> &'static [Phase] {
        &[]
    }

    fn init(&self, ctx: &mut InitContext<'_>) -> Result<(), DescriptorError> {
        let header = ctx.marker_as::<Header>()?;
        let name = HeaderName::from_bytes(header.name.as_bytes())
            .map_err(|_| ctx.malformed(format!("invalid header name {}", header.name)))?;
        let value = HeaderValue::from_str(&header.value)
            .map_err(|_| ctx.malformed(format!("invalid value for header {}", header.name)))?;

        ctx.config_mut()
            .get_or_insert_with(&STATIC_HEADERS, HeaderMap::new)
            .append(name, value);
        Ok(())
    }
}

impl Handler for StaticHeaders {
    const NAME: &'static str = "callbox.static_headers";

    fn construct() -> Result<Self, String> {
        Ok(StaticHeaders)
    }
}
