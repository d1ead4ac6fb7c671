use std::fmt;
use std::sync::Arc;

use super::traits::{Interceptor, Phase};
use crate::data::Arg;
use crate::error::CallError;
use crate::invoker::Invocation;

#[derive(Clone)]
struct Entry {
    priority: i32,
    handler: Arc<dyn Interceptor>,
}

/// Per-method handler lists, one per phase, plus the positions of
/// callback-typed parameters.
///
/// Within a phase, handlers run by ascending priority; equal priorities keep
/// registration order. Handlers passed as call arguments join a phase only if
/// they declare it. They run ahead of the registered ones for the exchange
/// phases and after them for the outcome phases.
#[derive(Clone, Default)]
pub struct HandlerChain {
    phases: [Vec<Entry>; 11],
    callback_indices: Vec<usize>,
}

impl HandlerChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `handler` to every phase it declares
    pub fn register(&mut self, handler: &Arc<dyn Interceptor>) {
        for phase in handler.phases() {
            self.register_phase(*phase, handler);
        }
    }

    /// Add `handler` to one phase. Registering the same instance twice in a
    /// phase is a no-op.
    pub fn register_phase(&mut self, phase: Phase, handler: &Arc<dyn Interceptor>) {
        let entries = &mut self.phases[phase.index()];
        if entries
            .iter()
            .any(|entry| std::ptr::addr_eq(Arc::as_ptr(&entry.handler), Arc::as_ptr(handler)))
        {
            return;
        }
        entries.push(Entry {
            priority: handler.priority(),
            handler: handler.clone(),
        });
        // stable: equal priorities keep registration order
        entries.sort_by_key(|entry| entry.priority);
    }

    pub(crate) fn add_callback_index(&mut self, index: usize) {
        if !self.callback_indices.contains(&index) {
            self.callback_indices.push(index);
        }
    }

    pub fn callback_indices(&self) -> &[usize] {
        &self.callback_indices
    }

    pub fn handlers(&self, phase: Phase) -> impl Iterator<Item = &Arc<dyn Interceptor>> {
        self.phases[phase.index()].iter().map(|entry| &entry.handler)
    }

    /// Names of the registered handlers for `phase`, in dispatch order
    pub fn names(&self, phase: Phase) -> Vec<&'static str> {
        self.handlers(phase).map(|handler| handler.name()).collect()
    }

    fn callbacks<'a>(
        &'a self,
        args: &'a [Arg],
        phase: Phase,
    ) -> impl Iterator<Item = &'a Arc<dyn Interceptor>> + 'a {
        self.callback_indices
            .iter()
            .filter_map(move |&index| args.get(index)?.as_callback())
            .filter(move |handler| handler.phases().contains(&phase))
    }

    pub async fn before(&self, inv: &mut Invocation<'_>) -> Result<(), CallError> {
        self.run_callbacks_first(Phase::Before, inv).await
    }

    pub async fn invoke(&self, inv: &mut Invocation<'_>) -> Result<(), CallError> {
        self.run_callbacks_first(Phase::Invoke, inv).await
    }

    pub async fn after(&self, inv: &mut Invocation<'_>) -> Result<(), CallError> {
        self.run_callbacks_first(Phase::After, inv).await
    }

    pub async fn on_success(&self, inv: &mut Invocation<'_>) -> Result<(), CallError> {
        self.run_registered_first(Phase::OnSuccess, inv).await
    }

    pub async fn on_fail(&self, inv: &mut Invocation<'_>) -> Result<(), CallError> {
        self.run_registered_first(Phase::OnFail, inv).await
    }

    pub async fn on_retry(&self, inv: &mut Invocation<'_>) -> Result<(), CallError> {
        self.run_registered_first(Phase::OnRetry, inv).await
    }

    /// `false` from any handler ends the check
    pub async fn success_check(&self, inv: &Invocation<'_>) -> Result<bool, CallError> {
        let args = inv.args();
        for handler in self.callbacks(args, Phase::SuccessCheck) {
            if !handler.success_check(inv).await? {
                return Ok(false);
            }
        }
        for handler in self.handlers(Phase::SuccessCheck) {
            if !handler.success_check(inv).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// `true` from any handler ends the check
    pub async fn retry_check(&self, inv: &Invocation<'_>) -> Result<bool, CallError> {
        let args = inv.args();
        for handler in self.callbacks(args, Phase::RetryCheck) {
            if handler.retry_check(inv).await? {
                return Ok(true);
            }
        }
        for handler in self.handlers(Phase::RetryCheck) {
            if handler.retry_check(inv).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// `true` from any handler ends the classification
    pub async fn on_error(&self, inv: &mut Invocation<'_>, error: &CallError) -> bool {
        let args = inv.args();
        for handler in self.handlers(Phase::OnError) {
            if handler.on_error(inv, error).await {
                return true;
            }
        }
        for handler in self.callbacks(args, Phase::OnError) {
            if handler.on_error(inv, error).await {
                return true;
            }
        }
        false
    }

    pub async fn on_finish(&self, inv: &mut Invocation<'_>) {
        let args = inv.args();
        for handler in self.handlers(Phase::OnFinish) {
            handler.on_finish(inv).await;
        }
        for handler in self.callbacks(args, Phase::OnFinish) {
            handler.on_finish(inv).await;
        }
    }

    pub async fn on_call_complete(&self, inv: &mut Invocation<'_>) {
        let args = inv.args();
        for handler in self.handlers(Phase::OnCallComplete) {
            handler.on_call_complete(inv).await;
        }
        for handler in self.callbacks(args, Phase::OnCallComplete) {
            handler.on_call_complete(inv).await;
        }
    }

    async fn run_callbacks_first(
        &self,
        phase: Phase,
        inv: &mut Invocation<'_>,
    ) -> Result<(), CallError> {
        let args = inv.args();
        for handler in self.callbacks(args, phase) {
            dispatch(handler, phase, inv).await?;
        }
        for handler in self.handlers(phase) {
            dispatch(handler, phase, inv).await?;
        }
        Ok(())
    }

    async fn run_registered_first(
        &self,
        phase: Phase,
        inv: &mut Invocation<'_>,
    ) -> Result<(), CallError> {
        let args = inv.args();
        for handler in self.handlers(phase) {
            dispatch(handler, phase, inv).await?;
        }
        for handler in self.callbacks(args, phase) {
            dispatch(handler, phase, inv).await?;
        }
        Ok(())
    }
}

/// Runs one of the fallible action phases
async fn dispatch(
    handler: &Arc<dyn Interceptor>,
    phase: Phase,
    inv: &mut Invocation<'_>,
) -> Result<(), CallError> {
    match phase {
        Phase::Before => handler.before(inv).await,
        Phase::Invoke => handler.invoke(inv).await,
        Phase::After => handler.after(inv).await,
        Phase::OnSuccess => handler.on_success(inv).await,
        Phase::OnFail => handler.on_fail(inv).await,
        Phase::OnRetry => handler.on_retry(inv).await,
        // checks, classification and completion have dedicated dispatchers
        Phase::SuccessCheck
        | Phase::RetryCheck
        | Phase::OnError
        | Phase::OnFinish
        | Phase::OnCallComplete => Ok(()),
    }
}

impl fmt::Debug for HandlerChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for phase in Phase::ALL {
            let names = self.names(phase);
            if !names.is_empty() {
                map.entry(&phase.as_str(), &names);
            }
        }
        map.entry(&"callbacks", &self.callback_indices);
        map.finish()
    }
}
