// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The contract every storage backend implements.
//!
//! A [`StorageAdapter`] is stateless with respect to any single file. Everything it
//! needs to know about a file arrives through a [`FileSource`]: the shared metadata
//! (whose `name` doubles as the storage locator for filesystem adapters), the native
//! blob handle if the file wraps one, and the notifier used to announce metadata
//! changes.

use std::fmt::Debug;

use bytes::Bytes;
use futures::future::BoxFuture;
use futures::stream::BoxStream;

use serde_json::Value;

use crate::observable::{META_CHANGED, Observable, Payload};
use crate::{Blob, FileMetadata, Result, ReadOptions, SharedMetadata, StreamOptions};

/// Tracked field holding the file's current metadata.
pub(crate) const META_FIELD: &str = "meta";

/// A lazy, finite, forward-only sequence of byte chunks.
///
/// Dropping the stream releases whatever storage handle it holds, whether or not
/// it was read to the end.
pub type ChunkStream = BoxStream<'static, Result<Bytes>>;

/// What a storage adapter sees of a file.
#[derive(Clone, Debug)]
pub struct FileSource {
    meta: SharedMetadata,
    blob: Option<Blob>,
    observable: Observable,
}

impl FileSource {
    /// Creates a source for storage located by `meta.name`.
    #[must_use]
    pub fn new(meta: impl Into<SharedMetadata>) -> Self {
        Self {
            meta: meta.into(),
            blob: None,
            observable: Observable::new(),
        }
    }

    /// Attaches a native immutable blob holding the file's bytes.
    #[must_use]
    pub fn with_blob(mut self, blob: Blob) -> Self {
        self.blob = Some(blob);
        self
    }

    /// Uses `observable` for notifications instead of a private one.
    #[must_use]
    pub fn with_observable(mut self, observable: Observable) -> Self {
        self.observable = observable;
        self
    }

    /// Returns the shared metadata handle.
    #[must_use]
    pub const fn meta(&self) -> &SharedMetadata {
        &self.meta
    }

    /// Returns the native blob, if the file wraps one.
    #[must_use]
    pub const fn blob(&self) -> Option<&Blob> {
        self.blob.as_ref()
    }

    /// Returns the notifier for this file.
    #[must_use]
    pub const fn observable(&self) -> &Observable {
        &self.observable
    }

    /// Records the length of a completed write and announces it with [`META_CHANGED`].
    pub fn record_written(&self, len: u64) {
        self.meta.set_size(len);
        let _ = self.publish_meta();
    }

    /// Copies the current metadata into the `meta` tracked field, then emits
    /// [`META_CHANGED`]. Returns the published metadata.
    pub fn publish_meta(&self) -> FileMetadata {
        let meta = self.meta.snapshot();
        self.observable
            .set_field(META_FIELD, serde_json::to_value(&meta).unwrap_or(Value::Null));
        self.observable.trigger(META_CHANGED, Payload::Metadata(meta.clone()));
        meta
    }
}

/// A storage backend able to serve files in one execution environment.
///
/// Implementations surface low-level failures as [`Error`](crate::Error) values and
/// never retry. Futures are boxed so that adapters can live behind
/// `Arc<dyn StorageAdapter>` in an [`AdapterRegistry`](crate::AdapterRegistry).
pub trait StorageAdapter: Send + Sync + Debug {
    /// The environment tag used for explicit resolution, such as `"node"`.
    fn environment(&self) -> &str;

    /// Capability probe used when no environment tag was requested.
    fn supports(&self, source: &FileSource) -> bool;

    /// Reads the bytes in the range described by `options`.
    ///
    /// Returns only the bytes that exist: a range that runs past the end of the
    /// storage yields a shorter result, never padding.
    fn read<'a>(&'a self, source: &'a FileSource, options: ReadOptions) -> BoxFuture<'a, Result<Bytes>>;

    /// Truncates the storage and rewrites it entirely with `data`.
    ///
    /// On success the metadata size becomes `data.len()` and [`META_CHANGED`] fires.
    fn write_replace<'a>(&'a self, source: &'a FileSource, data: Bytes) -> BoxFuture<'a, Result<()>>;

    /// Writes `data` at `offset` without truncating any bytes beyond it.
    ///
    /// On success the metadata size becomes `data.len()` (the written chunk, not the
    /// resulting storage length) and [`META_CHANGED`] fires.
    fn write_at<'a>(&'a self, source: &'a FileSource, data: Bytes, offset: u64) -> BoxFuture<'a, Result<()>>;

    /// Streams the file in chunks of at most `options.chunk_size` bytes, from offset zero
    /// until the metadata size has been consumed or the storage ends early.
    fn stream(&self, source: &FileSource, options: StreamOptions) -> ChunkStream;

    /// Queries the true current length of the storage.
    fn len<'a>(&'a self, source: &'a FileSource) -> BoxFuture<'a, Result<u64>>;

    /// Releases any adapter-held resources for the file.
    fn close<'a>(&'a self, source: &'a FileSource) -> BoxFuture<'a, Result<()>>;
}
