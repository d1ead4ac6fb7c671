//! The call state machine.
//!
//! One call runs attempts in a loop. Each attempt goes through
//! Before, Invoke and After, re-raises any cause the transport parked, then
//! checks success. A failed check or a raised error may lead to another
//! attempt when the method declared retry support and the chain agrees.
//! OnFinish runs after every attempt; the request context is cleared once,
//! after the last one.

mod invocation;

pub use invocation::{CallOptions, DEFAULT_TIMEOUT, Invocation};

use std::sync::Arc;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::context::keys;
use crate::data::{Arg, Data};
use crate::descriptor::MethodDescriptor;
use crate::error::CallError;
use crate::observability::Metrics;

/// Hard cap on attempts per call, whatever the retry policy says
pub const MAX_ATTEMPTS: u32 = 10;

enum Step {
    Return(Option<Data>),
    Retry,
}

/// Drives calls through a method's handler chain
#[derive(Debug, Clone, Default)]
pub struct Invoker {
    metrics: Arc<Metrics>,
}

impl Invoker {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self { metrics }
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Run one call. `Ok(None)` is a call that produced no data, not an error.
    pub async fn invoke(
        &self,
        descriptor: &MethodDescriptor,
        args: &[Arg],
        options: &CallOptions,
    ) -> Result<Option<Data>, CallError> {
        if args.len() != descriptor.params().len() {
            return Err(CallError::Arity {
                method: descriptor.id().to_string(),
                expected: descriptor.params().len(),
                actual: args.len(),
            });
        }

        let trace_id = options
            .trace_id
            .clone()
            .unwrap_or_else(|| Uuid::now_v7().to_string());
        let span = info_span!("rpc", trace_id = %trace_id, method = %descriptor.id());

        // Retries see the arguments as they were when the call started
        let args = args.to_vec();
        self.run(descriptor, &args, options, trace_id)
            .instrument(span)
            .await
    }

    async fn run(
        &self,
        descriptor: &MethodDescriptor,
        args: &[Arg],
        options: &CallOptions,
        trace_id: String,
    ) -> Result<Option<Data>, CallError> {
        let mut inv = Invocation::new(descriptor, args, options, trace_id);
        self.metrics.call_started();

        let outcome = self.drive(&mut inv).await;

        descriptor.chain().on_call_complete(&mut inv).await;
        inv.response.complete();

        match &outcome {
            Ok(data) => {
                self.metrics.call_succeeded();
                debug!(
                    attempts = inv.attempt(),
                    has_data = data.is_some(),
                    "call completed"
                );
            }
            Err(err) => {
                self.metrics.call_failed();
                warn!(attempts = inv.attempt(), error = %err, "call failed");
            }
        }
        outcome
    }

    async fn drive(&self, inv: &mut Invocation<'_>) -> Result<Option<Data>, CallError> {
        let chain = inv.descriptor().chain();
        let outcome = loop {
            let step = self.attempt(inv).await;
            chain.on_finish(inv).await;
            match step {
                Ok(Step::Retry) => self.metrics.retry(),
                Ok(Step::Return(data)) => break Ok(data),
                Err(err) => break Err(err),
            }
        };
        inv.request.clear();
        outcome
    }

    async fn attempt(&self, inv: &mut Invocation<'_>) -> Result<Step, CallError> {
        let attempt = inv.request.next_attempt();
        if attempt > MAX_ATTEMPTS {
            warn!(attempt, max = MAX_ATTEMPTS, "retry ceiling reached");
            return Err(CallError::RetryCeiling(MAX_ATTEMPTS));
        }
        self.metrics.attempt();
        debug!(attempt, "starting attempt");

        match self.exchange(inv).await {
            Ok(step) => Ok(step),
            Err(err) => self.recover(inv, err).await,
        }
    }

    async fn exchange(&self, inv: &mut Invocation<'_>) -> Result<Step, CallError> {
        let descriptor = inv.descriptor();
        let chain = descriptor.chain();

        chain.before(inv).await?;
        chain.invoke(inv).await?;
        chain.after(inv).await?;

        if let Some(cause) = inv.response.take_cause() {
            return Err(cause);
        }

        if chain.success_check(inv).await?
            && !descriptor.returns().is_unit()
            && inv.response.data.is_some()
        {
            chain.on_success(inv).await?;
            return Ok(Step::Return(inv.response.data.clone()));
        }

        chain.on_fail(inv).await?;
        let retryable = inv.request.value(&keys::RETRYABLE);
        let retry = retryable && chain.retry_check(inv).await?;
        if !retry {
            debug!(status = ?inv.response.status, "returning unsuccessful result");
            return Ok(Step::Return(inv.response.data.clone()));
        }

        info!(attempt = inv.attempt(), status = ?inv.response.status, "retrying unsuccessful result");
        chain.on_retry(inv).await?;
        Ok(Step::Retry)
    }

    async fn recover(&self, inv: &mut Invocation<'_>, err: CallError) -> Result<Step, CallError> {
        let chain = inv.descriptor().chain();
        let retryable = inv.request.value(&keys::RETRYABLE);
        let retry = chain.on_error(inv, &err).await && retryable;

        if retry {
            info!(attempt = inv.attempt(), error = %err, "retrying after error");
            chain.on_retry(inv).await?;
            return Ok(Step::Retry);
        }

        let fatal = inv.response.fatal_causes();
        if !fatal.is_empty() {
            return Err(CallError::aggregate(fatal));
        }

        debug!(error = %err, "no fatal cause recorded; returning present data");
        Ok(Step::Return(inv.response.data.clone()))
    }
}
