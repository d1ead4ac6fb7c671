use std::any::Any;
use std::fmt;
use std::sync::Arc;

use super::traits::{Handler, Interceptor};

pub type Factory = fn() -> Result<Arc<dyn Interceptor>, String>;

/// Declared identity of a handler, as listed by markers.
#[derive(Clone)]
pub struct HandlerType {
    name: &'static str,
    kind: HandlerKind,
}

#[derive(Clone)]
enum HandlerKind {
    Concrete {
        factory: Factory,
        labels: &'static [&'static str],
        primary: bool,
    },
    Abstract,
}

impl HandlerType {
    pub fn of<H: Handler>() -> Self {
        Self {
            name: H::NAME,
            kind: HandlerKind::Concrete {
                factory: construct::<H>,
                labels: H::LABELS,
                primary: H::PRIMARY,
            },
        }
    }

    /// A capability with no constructor of its own; resolved through the
    /// candidates registered for it
    pub const fn abstract_named(name: &'static str) -> Self {
        Self {
            name,
            kind: HandlerKind::Abstract,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_abstract(&self) -> bool {
        matches!(self.kind, HandlerKind::Abstract)
    }

    pub fn labels(&self) -> &'static [&'static str] {
        match self.kind {
            HandlerKind::Concrete { labels, .. } => labels,
            HandlerKind::Abstract => &[],
        }
    }

    pub fn is_primary(&self) -> bool {
        matches!(self.kind, HandlerKind::Concrete { primary: true, .. })
    }

    pub(crate) fn factory(&self) -> Option<Factory> {
        match self.kind {
            HandlerKind::Concrete { factory, .. } => Some(factory),
            HandlerKind::Abstract => None,
        }
    }
}

fn construct<H: Handler>() -> Result<Arc<dyn Interceptor>, String> {
    H::construct().map(|handler| Arc::new(handler) as Arc<dyn Interceptor>)
}

impl PartialEq for HandlerType {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for HandlerType {}

impl fmt::Debug for HandlerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            HandlerKind::Concrete { labels, primary, .. } => f
                .debug_struct("HandlerType")
                .field("name", &self.name)
                .field("labels", labels)
                .field("primary", primary)
                .finish(),
            HandlerKind::Abstract => write!(f, "HandlerType(abstract {})", self.name),
        }
    }
}

/// Declarative metadata attached to an interface, method, return value or
/// parameter. The marker only names its handlers; what it means is decided
/// by their `init`.
pub trait Marker: Send + Sync + fmt::Debug + 'static {
    fn handlers(&self) -> Vec<HandlerType>;

    fn as_any(&self) -> &dyn Any;
}

impl dyn Marker {
    pub fn downcast_ref<M: Marker>(&self) -> Option<&M> {
        self.as_any().downcast_ref::<M>()
    }
}
