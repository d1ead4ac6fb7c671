use async_trait::async_trait;
use reqwest::StatusCode;
use std::any::Any;
use std::time::Duration;
use tracing::debug;

use super::keys::RETRY_POLICY;
use super::priority;
use crate::context::keys::RETRYABLE;
use crate::descriptor::InitContext;
use crate::error::{CallError, DescriptorError};
use crate::handlers::{Handler, HandlerType, Interceptor, Marker, Phase};
use crate::invoker::Invocation;

/// Makes a method retryable.
///
/// Failed statuses in `statuses` and transient errors are retried while the
/// attempt number is within `max_retries`. Before retry `n`, the call sleeps
/// `backoff * n`. The engine's attempt ceiling applies regardless.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Retry {
    max_retries: u32,
    backoff: Duration,
    statuses: Vec<u16>,
}

impl Default for Retry {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: Duration::ZERO,
            statuses: vec![429, 502, 503, 504],
        }
    }
}

impl Retry {
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn statuses(mut self, statuses: impl IntoIterator<Item = u16>) -> Self {
        self.statuses = statuses.into_iter().collect();
        self
    }
}

impl Marker for Retry {
    fn handlers(&self) -> Vec<HandlerType> {
        vec![HandlerType::of::<RetryHandler>()]
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Resolved form of [`Retry`], kept in the method configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
    pub statuses: Vec<StatusCode>,
}

impl RetryPolicy {
    fn within_budget(&self, attempt: u32) -> bool {
        attempt <= self.max_retries
    }
}

pub(crate) struct RetryHandler;

impl RetryHandler {
    fn policy<'a>(inv: &Invocation<'a>) -> Option<&'a RetryPolicy> {
        inv.config().get(&RETRY_POLICY)
    }
}

#[async_trait]
impl Interceptor for RetryHandler {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn phases(&self) -> &'static [Phase] {
        &[Phase::Before, Phase::RetryCheck, Phase::OnError, Phase::OnRetry]
    }

    fn priority(&self) -> i32 {
        priority::RETRY
    }

    fn init(&self, ctx: &mut InitContext<'_>) -> Result<(), DescriptorError> {
        let retry = ctx.marker_as::<Retry>()?;
        let statuses = retry
            .statuses
            .iter()
            .map(|&code| {
                StatusCode::from_u16(code)
                    .map_err(|_| ctx.malformed(format!("invalid status code {}", code)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        ctx.config_mut().put(
            &RETRY_POLICY,
            RetryPolicy {
                max_retries: retry.max_retries,
                backoff: retry.backoff,
                statuses,
            },
        );
        ctx.register();
        Ok(())
    }

    async fn before(&self, inv: &mut Invocation<'_>) -> Result<(), CallError> {
        inv.request.put(&RETRYABLE, true);
        Ok(())
    }

    async fn retry_check(&self, inv: &Invocation<'_>) -> Result<bool, CallError> {
        let Some(policy) = Self::policy(inv) else {
            return Ok(false);
        };
        let retryable_status = inv
            .response
            .status
            .is_some_and(|status| policy.statuses.contains(&status));
        Ok(retryable_status && policy.within_budget(inv.attempt()))
    }

    async fn on_error(&self, inv: &mut Invocation<'_>, error: &CallError) -> bool {
        match Self::policy(inv) {
            Some(policy) => error.is_transient() && policy.within_budget(inv.attempt()),
            None => false,
        }
    }

    async fn on_retry(&self, inv: &mut Invocation<'_>) -> Result<(), CallError> {
        let Some(policy) = Self::policy(inv) else {
            return Ok(());
        };
        let delay = policy.backoff.saturating_mul(inv.attempt());
        if !delay.is_zero() {
            debug!(attempt = inv.attempt(), delay = ?delay, "backing off before retry");
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }
}

impl Handler for RetryHandler {
    const NAME: &'static str = "callbox.retry";

    fn construct() -> Result<Self, String> {
        Ok(RetryHandler)
    }
}
