//! Compiling an [`Interface`] into a callable client

use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::Config;
use crate::data::{Arg, Data};
use crate::descriptor::{Interface, MethodDescriptor};
use crate::error::{CallError, DescriptorError};
use crate::handlers::HandlerResolver;
use crate::invoker::{CallOptions, Invoker};
use crate::observability::Metrics;

/// Builds a [`RemoteClient`] from configuration and a handler resolver
pub struct ClientBuilder {
    config: Config,
    resolver: Arc<HandlerResolver>,
    metrics: Arc<Metrics>,
}

impl ClientBuilder {
    /// Uses the process-wide resolver; see [`resolver`](Self::resolver)
    pub fn new(config: Config) -> Self {
        Self {
            config,
            resolver: HandlerResolver::global(),
            metrics: Arc::new(Metrics::new()),
        }
    }

    pub fn resolver(mut self, resolver: Arc<HandlerResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Build a descriptor for every method up front. Any marker or
    /// resolution problem fails here rather than at call time.
    pub fn build(self, interface: Interface) -> Result<RemoteClient, DescriptorError> {
        if let Some(priorities) = &self.config.client.priorities {
            self.resolver.set_priorities(priorities);
        }

        let mut methods = HashMap::with_capacity(interface.methods().len());
        for method in interface.methods() {
            if methods.contains_key(method.name()) {
                return Err(DescriptorError::DuplicateMethod(format!(
                    "{}.{}",
                    interface.name(),
                    method.name()
                )));
            }
            let descriptor =
                MethodDescriptor::build(&interface, method, &self.resolver, &self.config)?;
            methods.insert(method.name().to_string(), Arc::new(descriptor));
        }

        info!(
            interface = interface.name(),
            methods = methods.len(),
            "built remote client"
        );
        Ok(RemoteClient {
            interface: interface.name().to_string(),
            methods,
            invoker: Invoker::new(self.metrics),
        })
    }
}

/// Lookup table from method name to its prebuilt descriptor. Every call
/// routes through the [`Invoker`].
#[derive(Debug, Clone)]
pub struct RemoteClient {
    interface: String,
    methods: HashMap<String, Arc<MethodDescriptor>>,
    invoker: Invoker,
}

impl RemoteClient {
    pub fn interface(&self) -> &str {
        &self.interface
    }

    pub fn descriptor(&self, method: &str) -> Option<&Arc<MethodDescriptor>> {
        self.methods.get(method)
    }

    pub fn methods(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        self.invoker.metrics()
    }

    pub async fn invoke(&self, method: &str, args: Vec<Arg>) -> Result<Option<Data>, CallError> {
        self.invoke_with(method, args, CallOptions::default()).await
    }

    pub async fn invoke_with(
        &self,
        method: &str,
        args: Vec<Arg>,
        options: CallOptions,
    ) -> Result<Option<Data>, CallError> {
        let descriptor = self
            .methods
            .get(method)
            .ok_or_else(|| CallError::UnknownMethod(format!("{}.{}", self.interface, method)))?;
        debug!(method = descriptor.id(), args = args.len(), "dispatching call");
        self.invoker.invoke(descriptor, &args, &options).await
    }

    /// Invoke and decode the result into `T`; a call without data is a decode error
    pub async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        args: Vec<Arg>,
    ) -> Result<T, CallError> {
        match self.invoke(method, args).await? {
            Some(data) => data.decode(),
            None => Err(CallError::Decode(format!(
                "{}.{} returned no data",
                self.interface, method
            ))),
        }
    }
}
