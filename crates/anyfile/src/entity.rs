// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::borrow::Cow;
use std::sync::Arc;

use bytes::Bytes;
use serde_json::Value;

use crate::adapter::{ChunkStream, FileSource, META_FIELD, StorageAdapter};
use crate::observable::{Event, Observable, Payload, READ_COMPLETED, SubscriptionId, WRITE_COMPLETED};
use crate::{AdapterRegistry, Blob, FileMetadata, MetadataPatch, ReadOptions, Resolution, Result, SharedMetadata, StreamOptions, WriteMode};

/// A file whose bytes live wherever its storage adapter keeps them.
///
/// The adapter is resolved once, when the entity is built, and kept for the entity's
/// lifetime. Every I/O operation is delegated to it; the entity adds notifications:
///
/// | Operation | Event after success | Payload |
/// |-----------|---------------------|---------|
/// | [`read`](Self::read) | [`READ_COMPLETED`] | the bytes read |
/// | [`write`](Self::write) and friends | [`META_CHANGED`](crate::META_CHANGED) then [`WRITE_COMPLETED`] | metadata, then nothing |
/// | [`update_meta_size`](Self::update_meta_size), [`update_meta`](Self::update_meta), [`refresh_meta`](Self::refresh_meta) | [`META_CHANGED`](crate::META_CHANGED) | metadata |
///
/// Failed operations emit nothing and return the adapter's error untouched.
///
/// # Examples
///
/// ```no_run
/// use anyfile::{FileEntity, FileMetadata, WriteMode};
///
/// # async fn example() -> anyfile::Result<()> {
/// let file = FileEntity::new(FileMetadata::new("notes.txt").with_content_type("text/plain"))?;
/// file.write("hello", WriteMode::Replace).await?;
/// assert_eq!(file.read().await?, "hello");
/// assert_eq!(file.meta().size, 5);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct FileEntity {
    source: FileSource,
    adapter: Arc<dyn StorageAdapter>,
}

impl FileEntity {
    /// Creates an entity served by whichever adapter of the global registry accepts it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoCompatibleAdapter`](crate::Error::NoCompatibleAdapter) if no
    /// adapter accepts the file.
    pub fn new(meta: impl Into<SharedMetadata>) -> Result<Self> {
        Self::builder(meta).build()
    }

    /// Creates an entity served by the global registry's adapter for `environment`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedEnvironment`](crate::Error::UnsupportedEnvironment)
    /// if no adapter declares the tag.
    pub fn for_environment(meta: impl Into<SharedMetadata>, environment: impl Into<String>) -> Result<Self> {
        Self::builder(meta).environment(environment).build()
    }

    /// Creates an entity wrapping an immutable blob, such as a file picked in a browser.
    ///
    /// A recorded size of zero is taken from the blob's length.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoCompatibleAdapter`](crate::Error::NoCompatibleAdapter) if no
    /// adapter of the global registry serves blobs.
    pub fn from_blob(blob: Blob, meta: impl Into<SharedMetadata>) -> Result<Self> {
        Self::builder(meta).blob(blob).build()
    }

    /// Starts building an entity with full control over resolution.
    #[must_use]
    pub fn builder(meta: impl Into<SharedMetadata>) -> FileEntityBuilder {
        FileEntityBuilder {
            meta: meta.into(),
            registry: None,
            resolution: Resolution::Probe,
            blob: None,
            observable: None,
        }
    }

    /// Reads the whole file. Shorthand for [`read_with`](Self::read_with) with default options.
    ///
    /// # Errors
    ///
    /// Propagates the adapter's error.
    pub async fn read(&self) -> Result<Bytes> {
        self.read_with(ReadOptions::new()).await
    }

    /// Reads the range described by `options` and emits [`READ_COMPLETED`] with the bytes.
    ///
    /// # Errors
    ///
    /// Propagates the adapter's error.
    pub async fn read_with(&self, options: ReadOptions) -> Result<Bytes> {
        let bytes = self.adapter.read(&self.source, options).await?;
        self.source.observable().trigger(READ_COMPLETED, Payload::Bytes(bytes.clone()));
        Ok(bytes)
    }

    /// Writes `data` with the given policy and emits [`WRITE_COMPLETED`].
    ///
    /// # Errors
    ///
    /// Propagates the adapter's error, such as
    /// [`Error::Immutable`](crate::Error::Immutable) for blob-backed files.
    pub async fn write(&self, data: impl Into<Bytes>, mode: WriteMode) -> Result<()> {
        let data = data.into();
        match mode {
            WriteMode::Replace => self.adapter.write_replace(&self.source, data).await?,
            WriteMode::At(offset) => self.adapter.write_at(&self.source, data, offset).await?,
        }
        self.source.observable().trigger(WRITE_COMPLETED, Payload::None);
        Ok(())
    }

    /// Truncates the file and rewrites it with `data`.
    ///
    /// # Errors
    ///
    /// Propagates the adapter's error.
    pub async fn write_replace(&self, data: impl Into<Bytes>) -> Result<()> {
        self.write(data, WriteMode::Replace).await
    }

    /// Writes `data` at `offset`, keeping bytes beyond it.
    ///
    /// The recorded size afterwards is `data`'s length, not the file's; use
    /// [`refresh_meta`](Self::refresh_meta) to learn the file's length.
    ///
    /// # Errors
    ///
    /// Propagates the adapter's error.
    pub async fn write_at(&self, data: impl Into<Bytes>, offset: u64) -> Result<()> {
        self.write(data, WriteMode::At(offset)).await
    }

    /// Streams the file in chunks. Dropping the stream releases its storage handle.
    #[must_use]
    pub fn stream(&self, options: StreamOptions) -> ChunkStream {
        self.adapter.stream(&self.source, options)
    }

    /// Releases adapter-held resources.
    ///
    /// # Errors
    ///
    /// Propagates the adapter's error.
    pub async fn close(&self) -> Result<()> {
        self.adapter.close(&self.source).await
    }

    /// Records a size learned out of band and emits [`META_CHANGED`](crate::META_CHANGED).
    pub fn update_meta_size(&self, size: u64) {
        let _ = self.update_meta(MetadataPatch::new().size(size));
    }

    /// Merges `patch` into the metadata and emits [`META_CHANGED`](crate::META_CHANGED).
    pub fn update_meta(&self, patch: MetadataPatch) -> FileMetadata {
        let _ = self.source.meta().update(patch);
        self.source.publish_meta()
    }

    /// Replaces the recorded size with the storage's true length and emits [`META_CHANGED`](crate::META_CHANGED).
    ///
    /// # Errors
    ///
    /// Propagates the adapter's error.
    pub async fn refresh_meta(&self) -> Result<FileMetadata> {
        let len = self.adapter.len(&self.source).await?;
        Ok(self.update_meta(MetadataPatch::new().size(len)))
    }

    /// Returns a copy of the current metadata.
    #[must_use]
    pub fn meta(&self) -> FileMetadata {
        self.source.meta().snapshot()
    }

    /// Returns the shared metadata handle. Entities built from a clone of it see each
    /// other's size updates.
    #[must_use]
    pub const fn shared_meta(&self) -> &SharedMetadata {
        self.source.meta()
    }

    /// Environment tag of the resolved adapter.
    #[must_use]
    pub fn environment(&self) -> &str {
        self.adapter.environment()
    }

    /// Subscribes `handler` to events named `event`.
    pub fn on<F>(&self, event: impl Into<Cow<'static, str>>, handler: F) -> SubscriptionId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.source.observable().on(event, handler)
    }

    /// Removes a subscription made with [`on`](Self::on).
    pub fn off(&self, id: SubscriptionId) -> bool {
        self.source.observable().off(id)
    }

    /// The notifier this entity emits on.
    #[must_use]
    pub const fn observable(&self) -> &Observable {
        self.source.observable()
    }
}

/// Configures how a [`FileEntity`] resolves its adapter.
#[derive(Debug)]
#[must_use]
pub struct FileEntityBuilder {
    meta: SharedMetadata,
    registry: Option<AdapterRegistry>,
    resolution: Resolution,
    blob: Option<Blob>,
    observable: Option<Observable>,
}

impl FileEntityBuilder {
    /// Resolves against `registry` instead of [`AdapterRegistry::global`].
    pub fn registry(mut self, registry: AdapterRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Resolves by environment tag instead of by probing.
    pub fn environment(mut self, environment: impl Into<String>) -> Self {
        self.resolution = Resolution::Environment(environment.into());
        self
    }

    /// Sets the resolution strategy.
    pub fn resolution(mut self, resolution: Resolution) -> Self {
        self.resolution = resolution;
        self
    }

    /// Wraps an immutable blob holding the file's bytes.
    pub fn blob(mut self, blob: Blob) -> Self {
        self.blob = Some(blob);
        self
    }

    /// Emits events on `observable`, for example one shared with a wrapping entity.
    pub fn observable(mut self, observable: Observable) -> Self {
        self.observable = Some(observable);
        self
    }

    /// Resolves the adapter and creates the entity.
    ///
    /// # Errors
    ///
    /// Returns a resolution error if no adapter matches; no entity is created.
    pub fn build(self) -> Result<FileEntity> {
        let mut source = FileSource::new(self.meta);
        if let Some(blob) = self.blob {
            source = source.with_blob(blob);
        }
        if let Some(observable) = self.observable {
            source = source.with_observable(observable);
        }

        let registry = match &self.registry {
            Some(registry) => registry,
            None => AdapterRegistry::global(),
        };
        let adapter = registry.resolve(&source, &self.resolution)?;

        if let Some(blob) = source.blob()
            && source.meta().size() == 0
        {
            source.meta().set_size(blob.len());
        }

        let meta = source.meta().snapshot();
        source
            .observable()
            .set_field(META_FIELD, serde_json::to_value(&meta).unwrap_or(Value::Null));

        Ok(FileEntity { source, adapter })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::{BlobAdapter, Error, META_CHANGED};

    static_assertions::assert_impl_all!(FileEntity: Send, Sync, Clone);

    fn blob_registry() -> AdapterRegistry {
        let registry = AdapterRegistry::new();
        registry.register(BlobAdapter::new());
        registry
    }

    #[test]
    fn failed_resolution_builds_nothing() {
        let err = FileEntity::builder(FileMetadata::new("a.txt"))
            .registry(blob_registry())
            .build()
            .unwrap_err();
        assert!(err.is_resolution());
    }

    #[test]
    fn construction_publishes_meta_field() {
        let entity = FileEntity::builder(FileMetadata::new("a.txt").with_size(3))
            .registry(blob_registry())
            .blob(Blob::from(&b"abc"[..]))
            .build()
            .unwrap();

        let meta = entity.observable().get("meta").unwrap();
        assert_eq!(meta["name"], "a.txt");
        assert_eq!(meta["size"], 3);
    }

    #[test]
    fn meta_field_follows_writes_and_size_updates() {
        let dir = tempfile::TempDir::new().unwrap();
        let registry = AdapterRegistry::new();
        registry.register(crate::LocalFsAdapter::new());
        let entity = FileEntity::builder(FileMetadata::new(dir.path().join("a.txt").to_string_lossy()))
            .registry(registry)
            .build()
            .unwrap();
        let tracked_size = || entity.observable().get("meta").unwrap()["size"].as_u64();

        futures::executor::block_on(entity.write_replace("hello")).unwrap();
        assert_eq!(tracked_size(), Some(5));

        entity.update_meta_size(99);
        assert_eq!(tracked_size(), Some(99));
        assert_eq!(entity.meta().size, 99);
    }

    #[test]
    fn meta_field_keeps_other_tracked_fields() {
        let observable = Observable::new();
        observable.set_field("owner", Value::from("wrapper"));

        let entity = FileEntity::builder(FileMetadata::new("a.txt"))
            .registry(blob_registry())
            .blob(Blob::from(&b"abc"[..]))
            .observable(observable.clone())
            .build()
            .unwrap();
        entity.update_meta_size(7);

        assert_eq!(observable.get("owner"), Some(Value::from("wrapper")));
        assert_eq!(observable.get("meta").unwrap()["size"], 7);
    }

    #[test]
    fn blob_length_seeds_unknown_size() {
        let entity = FileEntity::builder(FileMetadata::new("b.txt"))
            .registry(blob_registry())
            .blob(Blob::from(&b"abc"[..]))
            .build()
            .unwrap();

        assert_eq!(entity.meta().size, 3);
        assert_eq!(futures::executor::block_on(entity.read()).unwrap(), "abc");
    }

    #[test]
    fn recorded_size_wins_over_blob_length() {
        let entity = FileEntity::builder(FileMetadata::new("b.txt").with_size(2))
            .registry(blob_registry())
            .blob(Blob::from(&b"abc"[..]))
            .build()
            .unwrap();

        assert_eq!(futures::executor::block_on(entity.read()).unwrap(), "ab");
    }

    #[test]
    fn update_meta_size_notifies() {
        let entity = FileEntity::builder(FileMetadata::new("a.txt"))
            .registry(blob_registry())
            .blob(Blob::from(&b"abc"[..]))
            .build()
            .unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _ = entity.on(META_CHANGED, move |event| sink.lock().unwrap().push(event.payload().clone()));

        entity.update_meta_size(42);

        assert_eq!(entity.meta().size, 42);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(matches!(&seen[0], Payload::Metadata(m) if m.size == 42));
    }

    #[test]
    fn failed_write_emits_nothing() {
        let entity = FileEntity::builder(FileMetadata::new("a.txt"))
            .registry(blob_registry())
            .blob(Blob::from(&b"abc"[..]))
            .build()
            .unwrap();
        let fired = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&fired);
        let _ = entity.on(WRITE_COMPLETED, move |_| *counter.lock().unwrap() += 1);

        let err = futures::executor::block_on(entity.write_replace("x")).unwrap_err();

        assert!(matches!(err, Error::Immutable { .. }));
        assert_eq!(*fired.lock().unwrap(), 0);
    }

    #[test]
    fn off_stops_delivery() {
        let entity = FileEntity::builder(FileMetadata::new("a.txt"))
            .registry(blob_registry())
            .blob(Blob::from(&b"abc"[..]))
            .build()
            .unwrap();
        let fired = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&fired);
        let id = entity.on(META_CHANGED, move |_| *counter.lock().unwrap() += 1);

        entity.update_meta_size(1);
        assert!(entity.off(id));
        entity.update_meta_size(2);

        assert_eq!(*fired.lock().unwrap(), 1);
    }
}
