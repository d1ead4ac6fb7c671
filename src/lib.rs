pub mod client;
pub mod config;
pub mod context;
pub mod data;
pub mod descriptor;
pub mod error;
pub mod handlers;
pub mod humanize;
pub mod invoker;
pub mod markers;
pub mod observability;
pub mod parsers;
pub mod transport;

pub use client::{ClientBuilder, RemoteClient};
pub use data::{Arg, Data};
pub use error::{CallError, DescriptorError};
pub use invoker::{CallOptions, Invocation, Invoker};
