//! Remote interface declarations and the per-method descriptors built from them

mod interface;
mod method;
mod param;

pub use interface::{Interface, MethodSpec, ParamKind, ParamSpec, ReturnKind};
pub use method::{InitContext, MethodDescriptor};
pub use param::ParameterDescriptor;
