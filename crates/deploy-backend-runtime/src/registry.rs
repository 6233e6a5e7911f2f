//! Runtime registry.
//!
//! The registry is an explicit list built once at startup and passed to
//! whatever needs runtime resolution. Lookups walk the list in registration
//! order and return the first runtime whose `matches` accepts the tag.

use std::sync::Arc;

use tracing::warn;

use deploy_backend_common::NodeConfig;

use crate::node::NodeRuntime;
use crate::runtime::Runtime;

/// Ordered set of available runtimes.
///
/// Cheap to clone; clones share the runtime instances.
#[derive(Clone, Default)]
pub struct RuntimeRegistry {
    runtimes: Vec<Arc<dyn Runtime>>,
}

impl RuntimeRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the built-in runtimes.
    pub fn with_defaults(node: &NodeConfig) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(NodeRuntime::new(node.clone())));
        registry
    }

    /// Append a runtime. Earlier registrations win on overlapping tags.
    pub fn register(&mut self, runtime: Arc<dyn Runtime>) -> &mut Self {
        self.runtimes.push(runtime);
        self
    }

    /// Find the runtime for a tag.
    pub fn resolve(&self, runtime: &str) -> Option<&Arc<dyn Runtime>> {
        let mut matching = self.runtimes.iter().filter(|r| r.matches(runtime));
        let first = matching.next()?;

        let shadowed: Vec<&str> = matching.map(|r| r.name()).collect();
        if !shadowed.is_empty() {
            warn!(
                runtime,
                selected = first.name(),
                shadowed = ?shadowed,
                "Multiple runtimes match tag, using the first registered"
            );
        }

        Some(first)
    }

    /// Names of the registered runtimes, in registration order.
    pub fn runtimes(&self) -> impl Iterator<Item = &str> {
        self.runtimes.iter().map(|r| r.name())
    }

    pub fn len(&self) -> usize {
        self.runtimes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runtimes.is_empty()
    }
}

impl std::fmt::Debug for RuntimeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.runtimes()).finish()
    }
}
