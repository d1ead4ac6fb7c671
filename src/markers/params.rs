use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;

use super::keys::{BINDINGS, BODY, PARAM_HEADERS, PATH_VARS, QUERY};
use super::priority;
use crate::context::keys::CHARSET;
use crate::data::Arg;
use crate::descriptor::InitContext;
use crate::error::{CallError, DescriptorError};
use crate::handlers::{Handler, HandlerType, Interceptor, Marker, Phase};
use crate::invoker::Invocation;

/// Where a bound parameter ends up in the request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingTarget {
    Path(String),
    Query(String),
    Header(HeaderName),
    Body(BodyEncoding),
}

/// One parameter bound to a part of the request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub index: usize,
    pub target: BindingTarget,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyEncoding {
    Json,
    /// Encoded with the method's charset
    Text,
    /// Bytes or a string, sent as-is
    Raw,
}

macro_rules! named_param {
    ($(#[$doc:meta])* $ty:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Default, PartialEq)]
        pub struct $ty {
            name: Option<String>,
            default: Option<Value>,
        }

        impl $ty {
            /// Bound under the parameter's own name
            pub fn new() -> Self {
                Self::default()
            }

            pub fn named(name: impl Into<String>) -> Self {
                Self {
                    name: Some(name.into()),
                    default: None,
                }
            }

            /// Used when the argument is null
            pub fn default_value(mut self, value: impl Into<Value>) -> Self {
                self.default = Some(value.into());
                self
            }
        }

        impl Marker for $ty {
            fn handlers(&self) -> Vec<HandlerType> {
                vec![HandlerType::of::<ParamBinder>()]
            }

            fn as_any(&self) -> &dyn Any {
                self
            }
        }
    };
}

named_param!(
    /// Fills a `{name}` segment of the request path
    PathParam
);
named_param!(
    /// Adds a query pair; arrays add one pair per element
    QueryParam
);
named_param!(
    /// Sets a request header
    HeaderParam
);

/// Sends the argument as the request body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Body(BodyEncoding);

impl Body {
    pub fn json() -> Self {
        Self(BodyEncoding::Json)
    }

    pub fn text() -> Self {
        Self(BodyEncoding::Text)
    }

    pub fn raw() -> Self {
        Self(BodyEncoding::Raw)
    }
}

impl Marker for Body {
    fn handlers(&self) -> Vec<HandlerType> {
        vec![HandlerType::of::<ParamBinder>()]
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Copies bound arguments into the request context ahead of the request line
pub(crate) struct ParamBinder;

impl ParamBinder {
    fn binding(ctx: &InitContext<'_>) -> Result<(BindingTarget, Option<Value>), DescriptorError> {
        let param = ctx.require_parameter()?;
        let marker = ctx.marker();
        let own_name = |name: &Option<String>| name.clone().unwrap_or_else(|| param.name().to_string());

        if let Some(path) = marker.downcast_ref::<PathParam>() {
            return Ok((BindingTarget::Path(own_name(&path.name)), path.default.clone()));
        }
        if let Some(query) = marker.downcast_ref::<QueryParam>() {
            return Ok((BindingTarget::Query(own_name(&query.name)), query.default.clone()));
        }
        if let Some(header) = marker.downcast_ref::<HeaderParam>() {
            let name = own_name(&header.name);
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| ctx.malformed(format!("invalid header name {}", name)))?;
            return Ok((BindingTarget::Header(name), header.default.clone()));
        }
        if let Some(Body(encoding)) = marker.downcast_ref::<Body>() {
            return Ok((BindingTarget::Body(*encoding), None));
        }
        Err(ctx.malformed("not a parameter binding marker"))
    }
}

#[async_trait]
impl Interceptor for ParamBinder {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn phases(&self) -> &'static [Phase] {
        &[Phase::Before]
    }

    fn priority(&self) -> i32 {
        priority::BIND_PARAMS
    }

    fn init(&self, ctx: &mut InitContext<'_>) -> Result<(), DescriptorError> {
        let (target, default) = Self::binding(ctx)?;
        let index = ctx.require_parameter()?.index();

        let bindings = ctx.config().get(&BINDINGS);
        if let BindingTarget::Body(_) = target {
            let has_body = bindings
                .map(|all| all.iter().any(|b| matches!(b.target, BindingTarget::Body(_))))
                .unwrap_or(false);
            if has_body {
                return Err(ctx.malformed("only one parameter can be the request body"));
            }
        }

        if let Some(value) = default {
            ctx.set_default(value)?;
        }
        ctx.config_mut()
            .get_or_insert_with(&BINDINGS, Vec::new)
            .push(Binding { index, target });
        ctx.register();
        Ok(())
    }

    async fn before(&self, inv: &mut Invocation<'_>) -> Result<(), CallError> {
        let Some(bindings) = inv.config().get(&BINDINGS) else {
            return Ok(());
        };
        let charset = inv.config().get(&CHARSET).copied().unwrap_or_default();

        let mut path_vars = HashMap::new();
        let mut query = Vec::new();
        let mut headers = HeaderMap::new();
        let mut body = None;

        for binding in bindings {
            let param = &inv.descriptor().params()[binding.index];
            let arg = inv.arg(binding.index).cloned().unwrap_or_default();
            let arg = match (arg.is_null(), param.default_value()) {
                (true, Some(default)) => Arg::Value(default.clone()),
                _ => arg,
            };

            match &binding.target {
                BindingTarget::Path(name) => {
                    if let Some(value) = arg.render() {
                        path_vars.insert(name.clone(), value);
                    }
                }
                BindingTarget::Query(name) => match &arg {
                    Arg::Value(Value::Array(items)) => {
                        for item in items.iter().filter(|item| !item.is_null()) {
                            let value = match item {
                                Value::String(s) => s.clone(),
                                other => other.to_string(),
                            };
                            query.push((name.clone(), value));
                        }
                    }
                    other => {
                        if let Some(value) = other.render() {
                            query.push((name.clone(), value));
                        }
                    }
                },
                BindingTarget::Header(name) => {
                    if let Some(value) = arg.render() {
                        let value = HeaderValue::from_str(&value).map_err(|_| {
                            CallError::Encode(format!("invalid value for header {}", name))
                        })?;
                        headers.insert(name.clone(), value);
                    }
                }
                BindingTarget::Body(encoding) => {
                    if !arg.is_null() {
                        body = Some(encode_body(*encoding, &arg, charset)?);
                    }
                }
            }
        }

        if let Some((bytes, content_type)) = body {
            headers.entry(CONTENT_TYPE).or_insert(content_type);
            inv.request.put(&BODY, bytes);
        } else {
            inv.request.remove(&BODY);
        }
        inv.request.put(&PATH_VARS, path_vars);
        inv.request.put(&QUERY, query);
        inv.request.put(&PARAM_HEADERS, headers);
        Ok(())
    }
}

impl Handler for ParamBinder {
    const NAME: &'static str = "callbox.param_binder";

    fn construct() -> Result<Self, String> {
        Ok(ParamBinder)
    }
}

fn encode_body(
    encoding: BodyEncoding,
    arg: &Arg,
    charset: crate::parsers::Charset,
) -> Result<(Bytes, HeaderValue), CallError> {
    match encoding {
        BodyEncoding::Json => {
            let bytes = match arg {
                Arg::Bytes(raw) => raw.clone(),
                Arg::Value(value) => serde_json::to_vec(value)
                    .map(Bytes::from)
                    .map_err(|e| CallError::Encode(e.to_string()))?,
                Arg::Null | Arg::Callback(_) => {
                    return Err(CallError::Encode("json body needs a value".into()));
                }
            };
            Ok((bytes, HeaderValue::from_static("application/json")))
        }
        BodyEncoding::Text => {
            let text = arg
                .render()
                .ok_or_else(|| CallError::Encode("text body needs a value".into()))?;
            let content_type = HeaderValue::from_str(&format!(
                "text/plain; charset={}",
                charset.as_str()
            ))
            .map_err(|e| CallError::Encode(e.to_string()))?;
            Ok((charset.encode(&text)?, content_type))
        }
        BodyEncoding::Raw => {
            let bytes = match arg {
                Arg::Bytes(raw) => raw.clone(),
                Arg::Value(Value::String(s)) => Bytes::copy_from_slice(s.as_bytes()),
                other => {
                    return Err(CallError::Encode(format!(
                        "raw body needs bytes or a string, got {:?}",
                        other
                    )));
                }
            };
            Ok((bytes, HeaderValue::from_static("application/octet-stream")))
        }
    }
}
