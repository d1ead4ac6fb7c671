use reqwest::Url;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::any::Any;
use std::collections::BTreeMap;
use std::time::Duration;

use super::keys::{BASE_URL, STATIC_HEADERS};
use super::response::StatusCheck;
use crate::context::keys::TIMEOUT;
use crate::descriptor::InitContext;
use crate::error::DescriptorError;
use crate::handlers::{Handler, HandlerType, Interceptor, Marker, Phase};
use crate::parsers::{BytesParser, JsonParser, TextParser};
use crate::transport::TRANSPORT;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    Url(String),
    Named(String),
}

/// Where an interface's calls go. Also pulls in the transport, the status
/// check and the response parsers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    target: Target,
}

impl Endpoint {
    pub fn url(base: impl Into<String>) -> Self {
        Self {
            target: Target::Url(base.into()),
        }
    }

    /// An `[endpoints.<name>]` section of the configuration
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            target: Target::Named(name.into()),
        }
    }
}

impl Marker for Endpoint {
    fn handlers(&self) -> Vec<HandlerType> {
        vec![
            HandlerType::of::<EndpointSetup>(),
            TRANSPORT,
            HandlerType::of::<StatusCheck>(),
            HandlerType::of::<JsonParser>(),
            HandlerType::of::<TextParser>(),
            HandlerType::of::<BytesParser>(),
        ]
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub(crate) struct EndpointSetup;

impl Interceptor for EndpointSetup {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn phases(&self) -> &'static [Phase] {
        &[]
    }

    fn init(&self, ctx: &mut InitContext<'_>) -> Result<(), DescriptorError> {
        let endpoint = ctx.marker_as::<Endpoint>()?;
        let (base_url, headers, timeout) = match &endpoint.target {
            Target::Url(url) => (url.clone(), BTreeMap::new(), None),
            Target::Named(name) => {
                let section = ctx.settings().endpoint(name).ok_or_else(|| {
                    DescriptorError::UnknownEndpoint {
                        endpoint: name.clone(),
                        method: ctx.method_id().to_string(),
                    }
                })?;
                (
                    section.base_url.clone(),
                    section.headers.clone(),
                    section.timeout.map(|t| t.as_duration()),
                )
            }
        };

        let url = Url::parse(&base_url)
            .map_err(|e| ctx.malformed(format!("invalid base url {}: {}", base_url, e)))?;
        if url.cannot_be_a_base() {
            return Err(ctx.malformed(format!("base url {} cannot carry a path", base_url)));
        }

        let mut parsed = HeaderMap::new();
        for (name, value) in &headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| ctx.malformed(format!("invalid header name {}", name)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|_| ctx.malformed(format!("invalid value for header {}", name)))?;
            parsed.insert(name, value);
        }

        let config = ctx.config_mut();
        config.put(&BASE_URL, url);
        config
            .get_or_insert_with(&STATIC_HEADERS, HeaderMap::new)
            .extend(parsed);
        if let Some(timeout) = timeout {
            config.put(&TIMEOUT, timeout);
        }
        Ok(())
    }
}

impl Handler for EndpointSetup {
    const NAME: &'static str = "callbox.endpoint";

    fn construct() -> Result<Self, String> {
        Ok(EndpointSetup)
    }
}

/// Per-method transport timeout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeout(Duration);

impl Timeout {
    pub fn new(duration: Duration) -> Self {
        Self(duration)
    }

    pub fn millis(ms: u64) -> Self {
        Self(Duration::from_millis(ms))
    }
}

impl Marker for Timeout {
    fn handlers(&self) -> Vec<HandlerType> {
        vec![HandlerType::of::<TimeoutSetup>()]
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub(crate) struct TimeoutSetup;

impl Interceptor for TimeoutSetup {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn phases(&self) -> &'static [Phase] {
        &[]
    }

    fn init(&self, ctx: &mut InitContext<'_>) -> Result<(), DescriptorError> {
        let Timeout(duration) = *ctx.marker_as::<Timeout>()?;
        if duration.is_zero() {
            return Err(ctx.malformed("timeout must be greater than zero"));
        }
        ctx.config_mut().put(&TIMEOUT, duration);
        Ok(())
    }
}

impl Handler for TimeoutSetup {
    const NAME: &'static str = "callbox.timeout";

    fn construct() -> Result<Self, String> {
        Ok(TimeoutSetup)
    }
}
