use async_trait::async_trait;
use mime::Mime;
use reqwest::StatusCode;
use std::any::Any;

use super::keys::{RESPONSE_CONTENT_TYPE, SUCCESS_STATUSES};
use crate::descriptor::InitContext;
use crate::error::{CallError, DescriptorError};
use crate::handlers::{Handler, HandlerType, Interceptor, Marker, Phase};
use crate::invoker::Invocation;

/// Replaces the default 2xx success rule with an explicit list of statuses
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectStatus(Vec<u16>);

impl ExpectStatus {
    pub fn codes(codes: impl IntoIterator<Item = u16>) -> Self {
        Self(codes.into_iter().collect())
    }
}

impl Marker for ExpectStatus {
    fn handlers(&self) -> Vec<HandlerType> {
        vec![HandlerType::of::<StatusCheck>()]
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Success means an expected status: 2xx unless `ExpectStatus` says otherwise
pub(crate) struct StatusCheck;

#[async_trait]
impl Interceptor for StatusCheck {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn phases(&self) -> &'static [Phase] {
        &[Phase::SuccessCheck]
    }

    fn init(&self, ctx: &mut InitContext<'_>) -> Result<(), DescriptorError> {
        if let Some(ExpectStatus(codes)) = ctx.marker().downcast_ref::<ExpectStatus>() {
            if codes.is_empty() {
                return Err(ctx.malformed("at least one status code is required"));
            }
            let statuses = codes
                .iter()
                .map(|&code| {
                    StatusCode::from_u16(code)
                        .map_err(|_| ctx.malformed(format!("invalid status code {}", code)))
                })
                .collect::<Result<Vec<_>, _>>()?;
            ctx.config_mut().put(&SUCCESS_STATUSES, statuses);
        }
        ctx.register();
        Ok(())
    }

    async fn success_check(&self, inv: &Invocation<'_>) -> Result<bool, CallError> {
        let Some(status) = inv.response.status else {
            return Ok(false);
        };
        Ok(match inv.config().get(&SUCCESS_STATUSES) {
            Some(expected) => expected.contains(&status),
            None => status.is_success(),
        })
    }
}

impl Handler for StatusCheck {
    const NAME: &'static str = "callbox.status_check";

    fn construct() -> Result<Self, String> {
        Ok(StatusCheck)
    }
}

/// Content type the parsers should assume, whatever the server sends
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseAs(String);

impl ResponseAs {
    pub fn mime(content_type: impl Into<String>) -> Self {
        Self(content_type.into())
    }
}

impl Marker for ResponseAs {
    fn handlers(&self) -> Vec<HandlerType> {
        vec![HandlerType::of::<ResponseType>()]
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub(crate) struct ResponseType;

impl Interceptor for ResponseType {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn phases(&self) -> &'static [Phase] {
        &[]
    }

    fn init(&self, ctx: &mut InitContext<'_>) -> Result<(), DescriptorError> {
        let ResponseAs(content_type) = ctx.marker_as::<ResponseAs>()?;
        if ctx.parameter().is_some() {
            return Err(ctx.malformed("response type cannot be attached to a parameter"));
        }
        let mime = content_type
            .parse::<Mime>()
            .map_err(|e| ctx.malformed(format!("invalid content type {}: {}", content_type, e)))?;
        ctx.config_mut().put(&RESPONSE_CONTENT_TYPE, mime);
        Ok(())
    }
}

impl Handler for ResponseType {
    const NAME: &'static str = "callbox.response_type";

    fn construct() -> Result<Self, String> {
        Ok(ResponseType)
    }
}
