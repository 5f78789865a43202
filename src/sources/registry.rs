//! Source registry - the fixed set of adapters for a process lifetime
//!
//! Populated once at startup and read-only afterwards, so it is shared
//! as a plain `Arc` with no locking.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::error::{PipelineError, PipelineResult};
use crate::sources::SourceAdapter;
use crate::types::SourceKind;

/// One registered source. Immutable after registration.
#[derive(Clone)]
pub struct SourceDescriptor {
    name: String,
    kind: SourceKind,
    adapter: Arc<dyn SourceAdapter>,
    enabled: bool,
}

impl SourceDescriptor {
    pub fn new(adapter: Arc<dyn SourceAdapter>) -> Self {
        Self {
            name: adapter.name().to_string(),
            kind: adapter.kind(),
            adapter,
            enabled: true,
        }
    }

    /// Register the source but keep it out of pipeline runs.
    pub fn disabled(adapter: Arc<dyn SourceAdapter>) -> Self {
        Self {
            enabled: false,
            ..Self::new(adapter)
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    pub fn adapter(&self) -> Arc<dyn SourceAdapter> {
        self.adapter.clone()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl fmt::Debug for SourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceDescriptor")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("enabled", &self.enabled)
            .finish()
    }
}

/// Registry of configured sources, iterated in registration order.
#[derive(Default)]
pub struct SourceRegistry {
    sources: Vec<SourceDescriptor>,
    index: HashMap<String, usize>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a source. Fails if the name is already taken.
    pub fn register(&mut self, descriptor: SourceDescriptor) -> PipelineResult<()> {
        if self.index.contains_key(descriptor.name()) {
            return Err(PipelineError::DuplicateSource(descriptor.name().to_string()));
        }
        debug!(source = %descriptor.name(), kind = %descriptor.kind(), "Registered source");
        self.index
            .insert(descriptor.name().to_string(), self.sources.len());
        self.sources.push(descriptor);
        Ok(())
    }

    /// Enabled sources in registration order. The order is only used for
    /// deterministic iteration, never for correctness.
    pub fn list(&self) -> Vec<&SourceDescriptor> {
        self.sources.iter().filter(|d| d.is_enabled()).collect()
    }

    /// Look up a source by name.
    pub fn get(&self, name: &str) -> PipelineResult<&SourceDescriptor> {
        self.index
            .get(name)
            .map(|&i| &self.sources[i])
            .ok_or_else(|| PipelineError::UnknownSource(name.to_string()))
    }

    /// Names of the enabled sources, in registration order.
    pub fn enabled_names(&self) -> Vec<String> {
        self.list().iter().map(|d| d.name().to_string()).collect()
    }

    /// Number of enabled sources.
    pub fn len(&self) -> usize {
        self.list().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
