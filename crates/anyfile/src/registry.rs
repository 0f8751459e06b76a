// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;
use std::sync::{Arc, LazyLock};

use parking_lot::RwLock;

use crate::adapter::{FileSource, StorageAdapter};
use crate::{BlobAdapter, Error, LocalFsAdapter, Result};

/// How an [`AdapterRegistry`] picks the adapter for a file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Resolution {
    /// The first adapter, in resolution order, whose [`supports`](StorageAdapter::supports)
    /// probe accepts the file.
    #[default]
    Probe,
    /// The first adapter, in resolution order, whose environment tag equals this one.
    Environment(String),
}

impl Resolution {
    /// Resolves by environment tag.
    #[must_use]
    pub fn environment(tag: impl Into<String>) -> Self {
        Self::Environment(tag.into())
    }
}

impl From<&str> for Resolution {
    fn from(tag: &str) -> Self {
        Self::environment(tag)
    }
}

impl From<Option<&str>> for Resolution {
    fn from(tag: Option<&str>) -> Self {
        tag.map_or(Self::Probe, Self::environment)
    }
}

static GLOBAL: LazyLock<AdapterRegistry> = LazyLock::new(AdapterRegistry::with_defaults);

/// An ordered set of storage adapters.
///
/// The most recently registered adapter is consulted first. Registering the same
/// adapter twice keeps both entries; the older one is shadowed by the newer.
///
/// Clones share the same adapter list. Resolution is a one-shot lookup, so adapters
/// registered later only affect files resolved afterwards.
///
/// # Examples
///
/// ```
/// use anyfile::{AdapterRegistry, BlobAdapter, FileMetadata, FileSource, Resolution};
///
/// let registry = AdapterRegistry::new();
/// registry.register(BlobAdapter::new());
///
/// let source = FileSource::new(FileMetadata::new("a.txt"));
/// assert!(registry.resolve(&source, &Resolution::environment("node")).is_err());
/// ```
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: Arc<RwLock<Vec<Arc<dyn StorageAdapter>>>>,
}

impl AdapterRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding a [`LocalFsAdapter`] and a [`BlobAdapter`].
    ///
    /// The blob adapter is registered last and therefore probed first.
    #[must_use]
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        registry.register(LocalFsAdapter::new());
        registry.register(BlobAdapter::new());
        registry
    }

    /// The process-wide registry, created with [`with_defaults`](Self::with_defaults) on first use.
    #[must_use]
    pub fn global() -> &'static Self {
        &GLOBAL
    }

    /// Adds an adapter ahead of every adapter registered so far.
    pub fn register(&self, adapter: impl StorageAdapter + 'static) {
        self.register_shared(Arc::new(adapter));
    }

    /// Adds an already shared adapter ahead of every adapter registered so far.
    pub fn register_shared(&self, adapter: Arc<dyn StorageAdapter>) {
        tracing::debug!(environment = adapter.environment(), "registering storage adapter");
        self.adapters.write().insert(0, adapter);
    }

    /// Number of registered adapters, shadowed duplicates included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.adapters.read().len()
    }

    /// Returns `true` if no adapter is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.adapters.read().is_empty()
    }

    /// Environment tags in resolution order.
    #[must_use]
    pub fn environments(&self) -> Vec<String> {
        self.adapters.read().iter().map(|a| a.environment().to_owned()).collect()
    }

    /// Picks the adapter for `source`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedEnvironment`] if no adapter declares the requested
    /// environment tag, or [`Error::NoCompatibleAdapter`] if no adapter's probe accepts
    /// the file.
    pub fn resolve(&self, source: &FileSource, resolution: &Resolution) -> Result<Arc<dyn StorageAdapter>> {
        let adapters = self.adapters.read();
        let found = match resolution {
            Resolution::Environment(tag) => adapters
                .iter()
                .find(|a| a.environment() == tag)
                .ok_or_else(|| Error::UnsupportedEnvironment { environment: tag.clone() })?,
            Resolution::Probe => adapters
                .iter()
                .find(|a| a.supports(source))
                .ok_or_else(|| Error::NoCompatibleAdapter {
                    name: source.meta().name(),
                })?,
        };

        tracing::debug!(
            name = %source.meta().name(),
            environment = found.environment(),
            ?resolution,
            "resolved storage adapter"
        );
        Ok(Arc::clone(found))
    }
}

impl fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("environments", &self.environments())
            .finish()
    }
}
