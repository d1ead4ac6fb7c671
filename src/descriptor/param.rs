use serde_json::Value;
use std::sync::Arc;

use super::interface::{ParamKind, ParamSpec};
use crate::handlers::Marker;

/// Static facts about one method parameter
#[derive(Debug, Clone)]
pub struct ParameterDescriptor {
    index: usize,
    name: String,
    kind: ParamKind,
    markers: Vec<Arc<dyn Marker>>,
    pub(crate) default: Option<Value>,
}

impl ParameterDescriptor {
    pub(crate) fn from_spec(index: usize, spec: &ParamSpec) -> Self {
        Self {
            index,
            name: spec.name().to_string(),
            kind: spec.kind(),
            markers: spec.markers().to_vec(),
            default: None,
        }
    }

    pub fn index(&self) -> usize {
        self.index
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

    /// Value used when the argument is null
    pub fn default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }
}
