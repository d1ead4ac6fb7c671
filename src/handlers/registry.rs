use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::{Arc, LazyLock, OnceLock};
use thiserror::Error;
use tracing::{debug, warn};

use super::traits::{Handler, Interceptor};
use super::types::HandlerType;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no implementation registered for handler type {0}")]
    NoImplementation(&'static str),

    #[error(
        "ambiguous handler type {name}: candidates {candidates:?} match neither the configured priorities nor a single primary"
    )]
    Ambiguous {
        name: &'static str,
        candidates: Vec<&'static str>,
    },

    #[error("failed to construct handler {name}: {reason}")]
    Construction { name: &'static str, reason: String },

    #[error("candidate cycle while resolving handler type {0}")]
    Cycle(&'static str),
}

/// Split a priority list on `,` or `;`, trimming entries and dropping blanks
pub fn parse_priorities(list: &str) -> Vec<String> {
    list.split([',', ';'])
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}

static GLOBAL: LazyLock<Arc<HandlerResolver>> =
    LazyLock::new(|| Arc::new(HandlerResolver::with_builtins()));

/// Maps handler types to process-wide singleton instances.
///
/// Concrete types are built by their own constructor. Abstract types are
/// resolved through registered candidates: one candidate wins outright,
/// several are narrowed by the configured priority labels and then by the
/// primary flag.
pub struct HandlerResolver {
    singletons: RwLock<HashMap<&'static str, Arc<dyn Interceptor>>>,
    candidates: RwLock<HashMap<&'static str, Vec<HandlerType>>>,
    construction: Mutex<()>,
    priorities: OnceLock<Vec<String>>,
}

impl HandlerResolver {
    pub fn new() -> Self {
        Self {
            singletons: RwLock::new(HashMap::new()),
            candidates: RwLock::new(HashMap::new()),
            construction: Mutex::new(()),
            priorities: OnceLock::new(),
        }
    }

    /// A resolver that already knows the built-in transport candidates
    pub fn with_builtins() -> Self {
        let resolver = Self::new();
        crate::transport::register_builtins(&resolver);
        resolver
    }

    /// Process-wide resolver shared by clients that are not given their own
    pub fn global() -> Arc<HandlerResolver> {
        GLOBAL.clone()
    }

    /// Declare `candidate` as an implementation of `abstract_type`
    pub fn register_candidate(&self, abstract_type: &HandlerType, candidate: HandlerType) {
        let mut candidates = self.candidates.write();
        let entry = candidates.entry(abstract_type.name()).or_default();
        if !entry.contains(&candidate) {
            debug!(
                abstract_type = abstract_type.name(),
                candidate = candidate.name(),
                "registered handler candidate"
            );
            entry.push(candidate);
        }
    }

    /// Use a pre-built instance as the singleton for `H`
    pub fn install<H: Handler>(&self, handler: Arc<H>) {
        self.singletons.write().insert(H::NAME, handler);
    }

    /// Set the priority list used to break ties between candidates.
    ///
    /// The first list wins for the life of the resolver; returns whether this
    /// call was the one that set it.
    pub fn set_priorities(&self, list: &str) -> bool {
        let parsed = parse_priorities(list);
        let set = self.priorities.set(parsed.clone()).is_ok();
        if !set && self.priorities() != parsed.as_slice() {
            warn!(
                requested = list,
                active = ?self.priorities(),
                "handler priorities already set; keeping the first list"
            );
        }
        set
    }

    pub fn priorities(&self) -> &[String] {
        self.priorities.get().map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn resolve(&self, handler_type: &HandlerType) -> Result<Arc<dyn Interceptor>, ResolveError> {
        let mut visiting = Vec::new();
        self.resolve_inner(handler_type, &mut visiting)
    }

    fn resolve_inner(
        &self,
        handler_type: &HandlerType,
        visiting: &mut Vec<&'static str>,
    ) -> Result<Arc<dyn Interceptor>, ResolveError> {
        let name = handler_type.name();
        if let Some(handler) = self.singletons.read().get(name) {
            return Ok(handler.clone());
        }
        if visiting.contains(&name) {
            return Err(ResolveError::Cycle(name));
        }
        visiting.push(name);

        let handler = match handler_type.factory() {
            Some(factory) => self.construct(name, factory)?,
            None => {
                let candidate = self.select(handler_type)?;
                let handler = self.resolve_inner(&candidate, visiting)?;
                self.singletons
                    .write()
                    .entry(name)
                    .or_insert(handler)
                    .clone()
            }
        };

        visiting.pop();
        Ok(handler)
    }

    fn construct(
        &self,
        name: &'static str,
        factory: super::types::Factory,
    ) -> Result<Arc<dyn Interceptor>, ResolveError> {
        let _guard = self.construction.lock();
        // Another caller may have finished while we waited for the lock
        if let Some(handler) = self.singletons.read().get(name) {
            return Ok(handler.clone());
        }

        let handler = factory().map_err(|reason| ResolveError::Construction { name, reason })?;
        debug!(handler = name, "constructed handler singleton");
        self.singletons.write().insert(name, handler.clone());
        Ok(handler)
    }

    fn select(&self, abstract_type: &HandlerType) -> Result<HandlerType, ResolveError> {
        let name = abstract_type.name();
        let candidates = self
            .candidates
            .read()
            .get(name)
            .cloned()
            .unwrap_or_default();

        match candidates.as_slice() {
            [] => Err(ResolveError::NoImplementation(name)),
            [only] => Ok(only.clone()),
            _ => self.disambiguate(name, &candidates),
        }
    }

    fn disambiguate(
        &self,
        name: &'static str,
        candidates: &[HandlerType],
    ) -> Result<HandlerType, ResolveError> {
        let priorities = self.priorities();
        let labeled: Vec<&HandlerType> = candidates
            .iter()
            .filter(|candidate| {
                candidate.labels().iter().any(|label| {
                    priorities
                        .iter()
                        .any(|wanted| wanted.eq_ignore_ascii_case(label))
                })
            })
            .collect();
        if let [winner] = labeled.as_slice() {
            debug!(abstract_type = name, chosen = winner.name(), "selected candidate by priority label");
            return Ok((*winner).clone());
        }

        let primary: Vec<&HandlerType> = candidates.iter().filter(|c| c.is_primary()).collect();
        if let [winner] = primary.as_slice() {
            debug!(abstract_type = name, chosen = winner.name(), "selected primary candidate");
            return Ok((*winner).clone());
        }

        Err(ResolveError::Ambiguous {
            name,
            candidates: candidates.iter().map(HandlerType::name).collect(),
        })
    }
}

impl Default for HandlerResolver {
    fn default() -> Self {
        Self::new()
    }
}
