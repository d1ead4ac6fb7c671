use std::time::Duration;

use crate::context::{RequestContext, ResponseContext, TypedContext, keys};
use crate::data::Arg;
use crate::descriptor::MethodDescriptor;

/// Fallback when neither the call nor the method carries a timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-call overrides
#[derive(Debug, Clone, Default, bon::Builder)]
pub struct CallOptions {
    /// Correlation id for logs; a UUIDv7 is generated when absent
    #[builder(into)]
    pub trace_id: Option<String>,
    /// Overrides the method's configured timeout
    pub timeout: Option<Duration>,
}

/// State of one call in flight: the shared method descriptor, the argument
/// snapshot and the call-local contexts.
///
/// Descriptor and arguments are handed out with the invocation's own
/// lifetime, so handlers can keep reading them while mutating the contexts.
pub struct Invocation<'a> {
    descriptor: &'a MethodDescriptor,
    args: &'a [Arg],
    options: &'a CallOptions,
    pub request: RequestContext,
    pub response: ResponseContext,
}

impl<'a> Invocation<'a> {
    pub fn new(
        descriptor: &'a MethodDescriptor,
        args: &'a [Arg],
        options: &'a CallOptions,
        trace_id: impl Into<String>,
    ) -> Self {
        Self {
            descriptor,
            args,
            options,
            request: RequestContext::new(trace_id),
            response: ResponseContext::new(),
        }
    }

    pub fn descriptor(&self) -> &'a MethodDescriptor {
        self.descriptor
    }

    /// Static configuration written by the method's handlers at build time
    pub fn config(&self) -> &'a TypedContext {
        self.descriptor.config()
    }

    pub fn args(&self) -> &'a [Arg] {
        self.args
    }

    pub fn arg(&self, index: usize) -> Option<&'a Arg> {
        self.args.get(index)
    }

    pub fn options(&self) -> &'a CallOptions {
        self.options
    }

    /// Call options first, then the method configuration
    pub fn timeout(&self) -> Duration {
        self.options
            .timeout
            .or_else(|| self.config().get(&keys::TIMEOUT).copied())
            .unwrap_or(DEFAULT_TIMEOUT)
    }

    pub fn attempt(&self) -> u32 {
        self.request.attempt()
    }

    pub fn trace_id(&self) -> &str {
        self.request.trace_id()
    }
}
