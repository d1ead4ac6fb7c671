use bytes::Bytes;
use reqwest::header::{CONTENT_TYPE, HeaderMap};
use reqwest::{StatusCode, Version};
use std::fmt;
use std::ops::{Deref, DerefMut};

use super::typed::TypedContext;
use crate::data::Data;
use crate::error::CallError;

type Deferred = Box<dyn FnOnce() + Send + Sync>;

/// Per-call response state filled in by the transport and the parsers.
pub struct ResponseContext {
    values: TypedContext,
    pub status: Option<StatusCode>,
    pub version: Option<Version>,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
    pub data: Option<Data>,
    cause: Option<CallError>,
    fatal_causes: Vec<CallError>,
    deferred: Vec<Deferred>,
    completed: bool,
}

impl ResponseContext {
    pub fn new() -> Self {
        Self {
            values: TypedContext::new(),
            status: None,
            version: None,
            headers: HeaderMap::new(),
            body: None,
            data: None,
            cause: None,
            fatal_causes: Vec::new(),
            deferred: Vec::new(),
            completed: false,
        }
    }

    /// Record the failure of the current exchange; the engine raises it once
    /// the After phase has run. A later cause replaces an earlier one.
    pub fn set_cause(&mut self, cause: CallError) {
        self.cause = Some(cause);
    }

    pub fn cause(&self) -> Option<&CallError> {
        self.cause.as_ref()
    }

    pub fn take_cause(&mut self) -> Option<CallError> {
        self.cause.take()
    }

    /// Record an error the caller must see even if the call is not retried
    pub fn add_fatal_cause(&mut self, cause: CallError) {
        self.fatal_causes.push(cause);
    }

    pub fn fatal_causes(&self) -> &[CallError] {
        &self.fatal_causes
    }

    /// Run `callback` once the call has completed, or right away if it already has
    pub fn defer<F>(&mut self, callback: F)
    where
        F: FnOnce() + Send + Sync + 'static,
    {
        if self.completed {
            callback();
        } else {
            self.deferred.push(Box::new(callback));
        }
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub(crate) fn complete(&mut self) {
        if self.completed {
            return;
        }
        self.completed = true;
        for callback in self.deferred.drain(..) {
            callback();
        }
    }

    pub fn content_type(&self) -> Option<mime::Mime> {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse().ok())
    }

    /// Drop everything a previous attempt left behind; transports call this
    /// before starting a new exchange. Fatal causes are kept.
    pub fn reset_exchange(&mut self) {
        self.status = None;
        self.version = None;
        self.headers.clear();
        self.body = None;
        self.data = None;
        self.cause = None;
    }
}

impl Default for ResponseContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ResponseContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseContext")
            .field("values", &self.values)
            .field("status", &self.status)
            .field("version", &self.version)
            .field("body_len", &self.body.as_ref().map(Bytes::len))
            .field("data", &self.data)
            .field("cause", &self.cause)
            .field("fatal_causes", &self.fatal_causes)
            .field("deferred", &self.deferred.len())
            .field("completed", &self.completed)
            .finish()
    }
}

impl Deref for ResponseContext {
    type Target = TypedContext;

    fn deref(&self) -> &Self::Target {
        &self.values
    }
}

impl DerefMut for ResponseContext {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.values
    }
}
