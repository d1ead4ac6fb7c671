//! Handler model for the call lifecycle
//!
//! ## Key Components
//!
//! - [`Interceptor`] - phase callbacks a handler may implement
//! - [`Handler`] - an interceptor the resolver can construct by itself
//! - [`HandlerType`] / [`Marker`] - declared handlers and the metadata naming them
//! - [`HandlerResolver`] - singleton cache and candidate selection
//! - [`HandlerChain`] - per-method, per-phase dispatch lists
//!
//! ## Example
//!
//! ```rust,ignore
//! use callbox::handlers::{HandlerResolver, HandlerType};
//!
//! let resolver = HandlerResolver::with_builtins();
//! resolver.set_priorities("reqwest");
//! let transport = resolver.resolve(&callbox::transport::TRANSPORT)?;
//! ```

mod chain;
mod registry;
mod traits;
mod types;

pub use chain::HandlerChain;
pub use registry::{HandlerResolver, ResolveError, parse_priorities};
pub use traits::{Handler, Interceptor, Phase};
pub use types::{Factory, HandlerType, Marker};
