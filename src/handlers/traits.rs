use async_trait::async_trait;
use std::fmt;

use crate::descriptor::{InitContext, MethodDescriptor};
use crate::error::{CallError, DescriptorError};
use crate::invoker::Invocation;

/// Lifecycle dispatch points of one call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Before,
    Invoke,
    After,
    SuccessCheck,
    OnSuccess,
    OnFail,
    RetryCheck,
    OnRetry,
    OnError,
    OnFinish,
    OnCallComplete,
}

impl Phase {
    pub const ALL: [Phase; 11] = [
        Phase::Before,
        Phase::Invoke,
        Phase::After,
        Phase::SuccessCheck,
        Phase::OnSuccess,
        Phase::OnFail,
        Phase::RetryCheck,
        Phase::OnRetry,
        Phase::OnError,
        Phase::OnFinish,
        Phase::OnCallComplete,
    ];

    pub(crate) const fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Before => "before",
            Phase::Invoke => "invoke",
            Phase::After => "after",
            Phase::SuccessCheck => "success_check",
            Phase::OnSuccess => "on_success",
            Phase::OnFail => "on_fail",
            Phase::RetryCheck => "retry_check",
            Phase::OnRetry => "on_retry",
            Phase::OnError => "on_error",
            Phase::OnFinish => "on_finish",
            Phase::OnCallComplete => "on_call_complete",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A participant in the call lifecycle.
///
/// Only the phases listed by [`phases`](Interceptor::phases) are dispatched;
/// the remaining methods keep their no-op defaults. Implementations are shared
/// across methods and concurrent calls, so per-method settings belong in the
/// descriptor's configuration context and per-call state in the invocation.
#[async_trait]
pub trait Interceptor: Send + Sync {
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    fn phases(&self) -> &'static [Phase];

    /// Lower runs first within a phase
    fn priority(&self) -> i32 {
        0
    }

    /// Called once per marker occurrence while the method descriptor is built
    fn init(&self, ctx: &mut InitContext<'_>) -> Result<(), DescriptorError> {
        ctx.register();
        Ok(())
    }

    /// Called once per method after every marker has been initialised, to
    /// reject configurations that only fail when markers are combined
    fn verify(&self, _descriptor: &MethodDescriptor) -> Result<(), DescriptorError> {
        Ok(())
    }

    async fn before(&self, _inv: &mut Invocation<'_>) -> Result<(), CallError> {
        Ok(())
    }

    async fn invoke(&self, _inv: &mut Invocation<'_>) -> Result<(), CallError> {
        Ok(())
    }

    async fn after(&self, _inv: &mut Invocation<'_>) -> Result<(), CallError> {
        Ok(())
    }

    async fn success_check(&self, _inv: &Invocation<'_>) -> Result<bool, CallError> {
        Ok(true)
    }

    async fn on_success(&self, _inv: &mut Invocation<'_>) -> Result<(), CallError> {
        Ok(())
    }

    async fn on_fail(&self, _inv: &mut Invocation<'_>) -> Result<(), CallError> {
        Ok(())
    }

    async fn retry_check(&self, _inv: &Invocation<'_>) -> Result<bool, CallError> {
        Ok(false)
    }

    async fn on_retry(&self, _inv: &mut Invocation<'_>) -> Result<(), CallError> {
        Ok(())
    }

    /// Classify a failure; `true` asks for another attempt
    async fn on_error(&self, _inv: &mut Invocation<'_>, _error: &CallError) -> bool {
        false
    }

    async fn on_finish(&self, _inv: &mut Invocation<'_>) {}

    async fn on_call_complete(&self, _inv: &mut Invocation<'_>) {}
}

/// An interceptor that the resolver can construct on its own.
///
/// `NAME` identifies the singleton; `LABELS` and `PRIMARY` take part in
/// choosing between several implementations of one abstract handler type.
pub trait Handler: Interceptor + Sized + 'static {
    const NAME: &'static str;
    const LABELS: &'static [&'static str] = &[];
    const PRIMARY: bool = false;

    fn construct() -> Result<Self, String>;
}
