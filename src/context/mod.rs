//! Typed key/value stores used for per-method configuration and per-call state.
//!
//! - [`TypedContext`] - the map itself, addressed by phantom-typed [`Key`]s
//! - [`RequestContext`] - call scratch space plus the attempt counter
//! - [`ResponseContext`] - exchange results, causes and deferred callbacks

mod key;
mod request;
mod response;
mod typed;

pub use key::Key;
pub use request::RequestContext;
pub use response::ResponseContext;
pub use typed::TypedContext;

/// Keys the engine itself reads.
pub mod keys {
    use std::time::Duration;

    use super::Key;
    use crate::parsers::Charset;

    /// Set by the retry marker's Before handler; without it no retry happens.
    pub const RETRYABLE: Key<bool> = Key::new("callbox.retryable");

    /// Per-method timeout, seeded from `client.timeout`
    pub const TIMEOUT: Key<Duration> = Key::new("callbox.timeout");

    /// Per-method fallback charset, seeded from `client.charset`
    pub const CHARSET: Key<Charset> = Key::new("callbox.charset");
}
