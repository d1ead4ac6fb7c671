use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

use super::interface::{Interface, MethodSpec, ParamKind, ReturnKind};
use super::param::ParameterDescriptor;
use crate::config::Config;
use crate::context::{TypedContext, keys};
use crate::error::DescriptorError;
use crate::handlers::{HandlerChain, HandlerResolver, Interceptor, Marker, Phase};
use crate::parsers::Charset;

/// Everything known about one remote method before it is ever called.
///
/// Built once per method when the client is built and shared read-only by
/// every concurrent call afterwards.
pub struct MethodDescriptor {
    id: String,
    interface: String,
    name: String,
    returns: ReturnKind,
    params: Vec<ParameterDescriptor>,
    config: TypedContext,
    chain: HandlerChain,
}

impl MethodDescriptor {
    pub fn build(
        interface: &Interface,
        method: &MethodSpec,
        resolver: &HandlerResolver,
        settings: &Config,
    ) -> Result<Self, DescriptorError> {
        let mut descriptor = Self {
            id: format!("{}.{}", interface.name(), method.name()),
            interface: interface.name().to_string(),
            name: method.name().to_string(),
            returns: method.returns(),
            params: method
                .params()
                .iter()
                .enumerate()
                .map(|(index, spec)| ParameterDescriptor::from_spec(index, spec))
                .collect(),
            config: TypedContext::new(),
            chain: HandlerChain::new(),
        };

        descriptor
            .config
            .put(&keys::TIMEOUT, settings.client.timeout.as_duration());
        if let Some(charset) = Charset::from_label(&settings.client.charset) {
            descriptor.config.put(&keys::CHARSET, charset);
        }

        // Declaration order: interface, method, return value, parameters
        let mut markers: Vec<(Option<usize>, Arc<dyn Marker>)> = interface
            .markers()
            .iter()
            .chain(method.markers())
            .chain(method.return_markers())
            .map(|marker| (None, marker.clone()))
            .collect();
        for param in &descriptor.params {
            if param.kind() == ParamKind::Callback {
                descriptor.chain.add_callback_index(param.index());
                continue;
            }
            markers.extend(
                param
                    .markers()
                    .iter()
                    .map(|marker| (Some(param.index()), marker.clone())),
            );
        }

        let mut initialised: Vec<Arc<dyn Interceptor>> = Vec::new();
        for (parameter, marker) in &markers {
            for handler_type in marker.handlers() {
                let handler = resolver.resolve(&handler_type)?;
                if !initialised.iter().any(|seen| Arc::ptr_eq(seen, &handler)) {
                    initialised.push(handler.clone());
                }
                trace!(
                    method = %descriptor.id,
                    handler = handler.name(),
                    marker = ?marker,
                    "initialising handler"
                );
                let mut ctx = InitContext {
                    descriptor: &mut descriptor,
                    parameter: *parameter,
                    marker: marker.as_ref(),
                    handler: &handler,
                    settings,
                };
                handler.init(&mut ctx)?;
            }
        }

        for handler in &initialised {
            handler.verify(&descriptor)?;
        }

        debug!(method = %descriptor.id, chain = ?descriptor.chain, "built method descriptor");
        Ok(descriptor)
    }

    /// `Interface.method`
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn returns(&self) -> ReturnKind {
        self.returns
    }

    pub fn params(&self) -> &[ParameterDescriptor] {
        &self.params
    }

    pub fn config(&self) -> &TypedContext {
        &self.config
    }

    pub fn chain(&self) -> &HandlerChain {
        &self.chain
    }

    /// Construction error for a marker whose configuration does not fit the
    /// rest of the method
    pub fn malformed(&self, marker: &str, reason: impl Into<String>) -> DescriptorError {
        DescriptorError::MalformedMarker {
            marker: marker.to_string(),
            method: self.id.clone(),
            reason: reason.into(),
        }
    }
}

impl fmt::Debug for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDescriptor")
            .field("id", &self.id)
            .field("returns", &self.returns)
            .field("params", &self.params)
            .field("config", &self.config)
            .field("chain", &self.chain)
            .finish()
    }
}

/// What a handler sees while one marker occurrence is initialised
pub struct InitContext<'a> {
    descriptor: &'a mut MethodDescriptor,
    parameter: Option<usize>,
    marker: &'a dyn Marker,
    handler: &'a Arc<dyn Interceptor>,
    settings: &'a Config,
}

impl<'a> InitContext<'a> {
    /// Register the handler under every phase it declares
    pub fn register(&mut self) {
        self.descriptor.chain.register(self.handler);
    }

    /// Register the handler under a single phase
    pub fn register_phase(&mut self, phase: Phase) {
        self.descriptor.chain.register_phase(phase, self.handler);
    }

    pub fn descriptor(&self) -> &MethodDescriptor {
        self.descriptor
    }

    pub fn method_id(&self) -> &str {
        &self.descriptor.id
    }

    pub fn config(&self) -> &TypedContext {
        &self.descriptor.config
    }

    pub fn config_mut(&mut self) -> &mut TypedContext {
        &mut self.descriptor.config
    }

    /// The parameter the marker is attached to, if any
    pub fn parameter(&self) -> Option<&ParameterDescriptor> {
        self.parameter
            .and_then(|index| self.descriptor.params.get(index))
    }

    pub fn marker(&self) -> &'a dyn Marker {
        self.marker
    }

    /// The marker as its concrete type
    pub fn marker_as<M: Marker>(&self) -> Result<&'a M, DescriptorError> {
        let marker: &'a dyn Marker = self.marker;
        marker.downcast_ref::<M>().ok_or_else(|| {
            self.malformed(format!(
                "expected {} marker, got {:?}",
                std::any::type_name::<M>(),
                marker
            ))
        })
    }

    /// Like [`parameter`](Self::parameter), but a marker that only makes
    /// sense on a parameter is malformed elsewhere
    pub fn require_parameter(&self) -> Result<&ParameterDescriptor, DescriptorError> {
        self.parameter()
            .ok_or_else(|| self.malformed("marker must be attached to a parameter"))
    }

    /// Value the parameter takes when its argument is null
    pub fn set_default(&mut self, value: Value) -> Result<(), DescriptorError> {
        let index = self.require_parameter()?.index();
        self.descriptor.params[index].default = Some(value);
        Ok(())
    }

    pub fn returns(&self) -> ReturnKind {
        self.descriptor.returns
    }

    pub fn settings(&self) -> &'a Config {
        self.settings
    }

    pub fn malformed(&self, reason: impl Into<String>) -> DescriptorError {
        DescriptorError::MalformedMarker {
            marker: format!("{:?}", self.marker),
            method: self.descriptor.id.clone(),
            reason: reason.into(),
        }
    }
}
