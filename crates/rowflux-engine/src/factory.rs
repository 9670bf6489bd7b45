//! Stage factory registry: the plugin-resolution seam.
//!
//! The engine never discovers stage implementations itself; callers hand it
//! a registry mapping stage-kind identifiers to factories. Built-in kinds
//! cover the shipped stages; anything else (including sub-flow boundaries,
//! which capture a [`crate::dispatcher::GraphLink`]) is registered by the
//! caller.

use std::collections::HashMap;
use std::sync::Arc;

use rowflux_types::graph::StageDescriptor;

use crate::error::EngineError;
use crate::stage::Stage;
use crate::stages::{Barrier, CollectorSink, FieldFilter, Passthrough, PriorityMerge, RowGenerator};

type FactoryFn = dyn Fn(&StageDescriptor) -> Result<Box<dyn Stage>, EngineError> + Send + Sync;

/// Maps a stage-kind identifier to a factory producing stage instances.
pub struct StageRegistry {
    factories: HashMap<String, Arc<FactoryFn>>,
}

impl StageRegistry {
    /// An empty registry with no kinds at all.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// A registry with every built-in stage kind registered.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register("row-generator", |_| {
            Ok(Box::new(RowGenerator::new()) as Box<dyn Stage>)
        });
        registry.register("passthrough", |_| Ok(Box::new(Passthrough)));
        registry.register("field-filter", |_| Ok(Box::new(FieldFilter::new())));
        registry.register("collector", |_| Ok(Box::new(CollectorSink::new())));
        registry.register("barrier", |_| Ok(Box::new(Barrier::new())));
        registry.register("priority-merge", |_| Ok(Box::new(PriorityMerge::new())));
        registry
    }

    /// Register (or replace) a factory for `kind`.
    pub fn register<F>(&mut self, kind: impl Into<String>, factory: F)
    where
        F: Fn(&StageDescriptor) -> Result<Box<dyn Stage>, EngineError> + Send + Sync + 'static,
    {
        self.factories.insert(kind.into(), Arc::new(factory));
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    /// Instantiate a stage for one descriptor copy.
    ///
    /// # Errors
    ///
    /// Returns a graph-fatal error for an unknown stage kind, or whatever the
    /// factory itself reports.
    pub fn create(&self, descriptor: &StageDescriptor) -> Result<Box<dyn Stage>, EngineError> {
        let factory = self.factories.get(&descriptor.kind).ok_or_else(|| {
            EngineError::Graph(format!(
                "unknown stage kind '{}' for stage '{}'",
                descriptor.kind, descriptor.name
            ))
        })?;
        factory(descriptor)
    }
}

impl Default for StageRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_kinds_present() {
        let registry = StageRegistry::builtin();
        for kind in [
            "row-generator",
            "passthrough",
            "field-filter",
            "collector",
            "barrier",
            "priority-merge",
        ] {
            assert!(registry.contains(kind), "missing builtin kind {kind}");
        }
    }

    #[test]
    fn test_unknown_kind_is_graph_fatal() {
        let registry = StageRegistry::builtin();
        let descriptor = StageDescriptor::new("x", "no-such-kind");
        let err = registry.create(&descriptor).unwrap_err();
        assert!(matches!(err, EngineError::Graph(_)));
        assert!(format!("{err}").contains("no-such-kind"));
    }

    #[test]
    fn test_custom_registration_overrides() {
        let mut registry = StageRegistry::new();
        assert!(!registry.contains("passthrough"));
        registry.register("passthrough", |_| Ok(Box::new(Passthrough)));
        assert!(registry.contains("passthrough"));
        assert!(registry
            .create(&StageDescriptor::new("p", "passthrough"))
            .is_ok());
    }
}
