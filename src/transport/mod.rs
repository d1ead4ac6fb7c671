//! Transport collaborators.
//!
//! Markers depend on the abstract [`TRANSPORT`] handler type. Concrete
//! transports register themselves as its candidates and are picked by the
//! resolver (priority labels first, then the primary flag).

pub mod http;

pub use http::{HttpConfig, ReqwestTransport};

use crate::handlers::{HandlerResolver, HandlerType};

/// Abstract handler type every HTTP-facing marker asks for
pub const TRANSPORT: HandlerType = HandlerType::abstract_named("transport");

/// Register the transports that ship with the crate
pub fn register_builtins(resolver: &HandlerResolver) {
    resolver.register_candidate(&TRANSPORT, HandlerType::of::<ReqwestTransport>());
}
