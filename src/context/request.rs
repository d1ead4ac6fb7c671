use std::ops::{Deref, DerefMut};

use super::typed::TypedContext;

/// Per-call scratch space shared by every attempt of one call.
///
/// The attempt counter lives outside the map, so clearing the map between
/// calls never resets it.
#[derive(Debug)]
pub struct RequestContext {
    values: TypedContext,
    attempt: u32,
    trace_id: String,
}

impl RequestContext {
    pub fn new(trace_id: impl Into<String>) -> Self {
        Self {
            values: TypedContext::new(),
            attempt: 0,
            trace_id: trace_id.into(),
        }
    }

    /// 1-based number of the attempt in progress (0 before the first)
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub(crate) fn next_attempt(&mut self) -> u32 {
        self.attempt += 1;
        self.attempt
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }
}

impl Deref for RequestContext {
    type Target = TypedContext;

    fn deref(&self) -> &Self::Target {
        &self.values
    }
}

impl DerefMut for RequestContext {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.values
    }
}
