use std::sync::Arc;

use crate::handlers::Marker;

/// What a method hands back to its caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReturnKind {
    /// No value; such calls always take the failure branch of the lifecycle
    Unit,
    #[default]
    Json,
    Text,
    Bytes,
}

impl ReturnKind {
    pub fn is_unit(self) -> bool {
        matches!(self, ReturnKind::Unit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParamKind {
    #[default]
    Value,
    /// The argument is an [`Interceptor`](crate::handlers::Interceptor)
    /// joining the chain for one call
    Callback,
}

/// Declaration of a remote interface: a name, interface-wide markers and the
/// methods it exposes.
#[derive(Debug, Clone)]
pub struct Interface {
    name: String,
    markers: Vec<Arc<dyn Marker>>,
    methods: Vec<MethodSpec>,
}

impl Interface {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            markers: Vec::new(),
            methods: Vec::new(),
        }
    }

    pub fn marker(mut self, marker: impl Marker) -> Self {
        self.markers.push(Arc::new(marker));
        self
    }

    pub fn method(mut self, method: MethodSpec) -> Self {
        self.methods.push(method);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn markers(&self) -> &[Arc<dyn Marker>] {
        &self.markers
    }

    pub fn methods(&self) -> &[MethodSpec] {
        &self.methods
    }
}

#[derive(Debug, Clone)]
pub struct MethodSpec {
    name: String,
    returns: ReturnKind,
    markers: Vec<Arc<dyn Marker>>,
    return_markers: Vec<Arc<dyn Marker>>,
    params: Vec<ParamSpec>,
}

impl MethodSpec {
    pub fn new(name: impl Into<String>, returns: ReturnKind) -> Self {
        Self {
            name: name.into(),
            returns,
            markers: Vec::new(),
            return_markers: Vec::new(),
            params: Vec::new(),
        }
    }

    pub fn marker(mut self, marker: impl Marker) -> Self {
        self.markers.push(Arc::new(marker));
        self
    }

    /// Marker attached to the return value rather than the method
    pub fn return_marker(mut self, marker: impl Marker) -> Self {
        self.return_markers.push(Arc::new(marker));
        self
    }

    pub fn param(mut self, param: ParamSpec) -> Self {
        self.params.push(param);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn returns(&self) -> ReturnKind {
        self.returns
    }

    pub fn markers(&self) -> &[Arc<dyn Marker>] {
        &self.markers
    }

    pub fn return_markers(&self) -> &[Arc<dyn Marker>] {
        &self.return_markers
    }

    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }
}

#[derive(Debug, Clone)]
pub struct ParamSpec {
    name: String,
    kind: ParamKind,
    markers: Vec<Arc<dyn Marker>>,
}

impl ParamSpec {
    pub fn value(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ParamKind::Value,
            markers: Vec::new(),
        }
    }

    pub fn callback(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ParamKind::Callback,
            markers: Vec::new(),
        }
    }

    pub fn marker(mut self, marker: impl Marker) -> Self {
        self.markers.push(Arc::new(marker));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ParamKind {
        self.kind
    }

    pub fn markers(&self) -> &[Arc<dyn Marker>] {
        &self.markers
    }
}
