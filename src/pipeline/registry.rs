//! Process-wide lookup of compiled pipelines by name.

use super::StageGraph;
use crate::errors::StageflowError;
use dashmap::DashMap;
use std::sync::{Arc, LazyLock};

/// Keyed map of compiled graphs.
///
/// Registration is idempotent for the exact same graph instance; binding
/// a name to a different graph requires an explicit overwrite.
#[derive(Default)]
pub struct PipelineRegistry {
    graphs: DashMap<String, Arc<StageGraph>>,
}

impl PipelineRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a graph under a name.
    ///
    /// # Errors
    ///
    /// Returns an error when the name is already bound to a different
    /// graph instance. Re-registering the identical instance is a no-op.
    pub fn register(
        &self,
        name: impl Into<String>,
        graph: Arc<StageGraph>,
    ) -> Result<(), StageflowError> {
        let name = name.into();
        if let Some(existing) = self.graphs.get(&name) {
            if Arc::ptr_eq(existing.value(), &graph) {
                return Ok(());
            }
            return Err(StageflowError::PipelineConflict(name));
        }
        self.graphs.insert(name, graph);
        Ok(())
    }

    /// Registers a graph, replacing any existing binding.
    pub fn register_overwrite(&self, name: impl Into<String>, graph: Arc<StageGraph>) {
        self.graphs.insert(name.into(), graph);
    }

    /// Looks a pipeline up by name.
    ///
    /// # Errors
    ///
    /// Returns [`StageflowError::PipelineNotFound`] when the name is not
    /// bound.
    pub fn get(&self, name: &str) -> Result<Arc<StageGraph>, StageflowError> {
        self.graphs
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StageflowError::PipelineNotFound(name.to_string()))
    }

    /// True when the name is bound.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.graphs.contains_key(name)
    }

    /// All registered names, sorted.
    #[must_use]
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.graphs.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Removes a binding, returning the graph when one existed.
    pub fn remove(&self, name: &str) -> Option<Arc<StageGraph>> {
        self.graphs.remove(name).map(|(_, graph)| graph)
    }

    /// Number of registered pipelines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.graphs.len()
    }

    /// True when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.graphs.is_empty()
    }
}

static GLOBAL_REGISTRY: LazyLock<PipelineRegistry> = LazyLock::new(PipelineRegistry::new);

/// The process-wide default registry.
#[must_use]
pub fn global_registry() -> &'static PipelineRegistry {
    &GLOBAL_REGISTRY
}
