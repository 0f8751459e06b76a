// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::Debug;
use std::io::ErrorKind;
use std::sync::Arc;

use bytes::Bytes;
use futures::future::{self, BoxFuture};
use futures::{FutureExt as _, StreamExt as _, stream};

use crate::adapter::{ChunkStream, FileSource, StorageAdapter};
use crate::{Error, ReadOptions, Result, SharedMetadata, StreamOptions};

/// Backing store of an immutable [`Blob`].
///
/// Implement this to expose bytes held by a host platform (a browser `File`, a memory
/// mapped region, a pre-fetched download) without copying them up front. Decoding is
/// asynchronous and may fail.
pub trait BlobSource: Send + Sync + Debug {
    /// Total number of bytes in the source.
    fn len(&self) -> u64;

    /// Decodes the bytes in `start..end`. Both bounds are within `0..=len()`.
    fn read_range(&self, start: u64, end: u64) -> BoxFuture<'_, std::io::Result<Bytes>>;
}

impl BlobSource for Bytes {
    fn len(&self) -> u64 {
        self.len() as u64
    }

    fn read_range(&self, start: u64, end: u64) -> BoxFuture<'_, std::io::Result<Bytes>> {
        let result = usize::try_from(start)
            .and_then(|start| usize::try_from(end).map(|end| start..end))
            .map(|range| self.slice(range))
            .map_err(|e| std::io::Error::new(ErrorKind::InvalidInput, e));
        future::ready(result).boxed()
    }
}

/// An immutable, cheaply sliceable view of bytes.
///
/// Slicing never copies: a slice shares the source with the blob it came from and
/// only narrows the range. Bytes are produced by [`read`](Self::read).
#[derive(Clone, Debug)]
pub struct Blob {
    source: Arc<dyn BlobSource>,
    start: u64,
    end: u64,
}

impl Blob {
    /// Wraps a blob source, covering all of its bytes.
    #[must_use]
    pub fn new(source: impl BlobSource + 'static) -> Self {
        let end = source.len();
        Self {
            source: Arc::new(source),
            start: 0,
            end,
        }
    }

    /// Creates an in-memory blob.
    #[must_use]
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Self::new(bytes.into())
    }

    /// Number of bytes covered by this blob.
    #[must_use]
    pub const fn len(&self) -> u64 {
        self.end - self.start
    }

    /// Returns `true` if the blob covers no bytes.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the sub-blob covering `start..end`, relative to this blob.
    ///
    /// Out-of-range bounds are clamped to the blob, and an `end` before `start`
    /// yields an empty blob, matching the web `Blob.slice` contract.
    #[must_use]
    pub fn slice(&self, start: u64, end: u64) -> Self {
        let len = self.len();
        let start = start.min(len);
        let end = end.clamp(start, len);
        Self {
            source: Arc::clone(&self.source),
            start: self.start + start,
            end: self.start + end,
        }
    }

    /// Decodes the bytes covered by this blob.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] if the source reports a failure.
    pub async fn read(&self) -> Result<Bytes> {
        self.source.read_range(self.start, self.end).await.map_err(Error::Decode)
    }
}

impl From<Bytes> for Blob {
    fn from(bytes: Bytes) -> Self {
        Self::new(bytes)
    }
}

impl From<Vec<u8>> for Blob {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(Bytes::from(bytes))
    }
}

impl From<&'static [u8]> for Blob {
    fn from(bytes: &'static [u8]) -> Self {
        Self::new(Bytes::from_static(bytes))
    }
}

/// Serves files that wrap an immutable [`Blob`], as handed out by browser file pickers.
///
/// Reads slice the blob and decode the slice. Writes always fail with
/// [`Error::Immutable`]: the storage model has no way to mutate bytes. Streams are
/// built from successive reads of `chunk_size` bytes.
#[derive(Clone, Copy, Debug, Default)]
pub struct BlobAdapter;

impl BlobAdapter {
    /// Environment tag declared by this adapter.
    pub const ENVIRONMENT: &'static str = "browser";

    /// Creates the adapter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl StorageAdapter for BlobAdapter {
    fn environment(&self) -> &str {
        Self::ENVIRONMENT
    }

    fn supports(&self, source: &FileSource) -> bool {
        source.blob().is_some()
    }

    fn read<'a>(&'a self, source: &'a FileSource, options: ReadOptions) -> BoxFuture<'a, Result<Bytes>> {
        async move {
            let blob = require_blob(source)?;
            read_slice(blob, source.meta(), options).await
        }
        .boxed()
    }

    fn write_replace<'a>(&'a self, source: &'a FileSource, _data: Bytes) -> BoxFuture<'a, Result<()>> {
        future::ready(Err(immutable(source))).boxed()
    }

    fn write_at<'a>(&'a self, source: &'a FileSource, _data: Bytes, _offset: u64) -> BoxFuture<'a, Result<()>> {
        future::ready(Err(immutable(source))).boxed()
    }

    fn stream(&self, source: &FileSource, options: StreamOptions) -> ChunkStream {
        let chunk_size = match options.validated_chunk_size() {
            Ok(chunk_size) => chunk_size.get() as u64,
            Err(e) => return stream::once(future::ready(Err(e))).boxed(),
        };
        let blob = match require_blob(source) {
            Ok(blob) => blob.clone(),
            Err(e) => return stream::once(future::ready(Err(e))).boxed(),
        };
        let meta = source.meta().clone();

        stream::try_unfold(0_u64, move |position| {
            let blob = blob.clone();
            let meta = meta.clone();
            async move {
                if position >= meta.size() {
                    return Ok(None);
                }
                let len = chunk_size.min(meta.size().saturating_sub(position));
                let chunk = read_slice(&blob, &meta, ReadOptions::range(position, len)).await?;
                if chunk.is_empty() {
                    // Metadata claims more bytes than the blob holds.
                    return Ok(None);
                }
                let next = position + chunk.len() as u64;
                Ok(Some((chunk, next)))
            }
        })
        .boxed()
    }

    fn len<'a>(&'a self, source: &'a FileSource) -> BoxFuture<'a, Result<u64>> {
        future::ready(require_blob(source).map(Blob::len)).boxed()
    }

    fn close<'a>(&'a self, _source: &'a FileSource) -> BoxFuture<'a, Result<()>> {
        future::ready(Ok(())).boxed()
    }
}

fn require_blob(source: &FileSource) -> Result<&Blob> {
    source.blob().ok_or_else(|| {
        Error::Decode(std::io::Error::new(
            ErrorKind::NotFound,
            format!("{} does not wrap a blob", source.meta().name()),
        ))
    })
}

fn immutable(source: &FileSource) -> Error {
    Error::Immutable {
        name: source.meta().name(),
    }
}

async fn read_slice(blob: &Blob, meta: &SharedMetadata, options: ReadOptions) -> Result<Bytes> {
    let end = options
        .length
        .map_or_else(|| meta.size(), |length| options.offset.saturating_add(length));
    let bytes = blob.slice(options.offset, end).read().await?;
    tracing::trace!(offset = options.offset, len = bytes.len(), "blob read");
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FileMetadata;

    fn source(data: &'static [u8]) -> FileSource {
        FileSource::new(FileMetadata::new("picked.bin").with_size(data.len() as u64)).with_blob(Blob::from(data))
    }

    #[test]
    fn slice_clamps_like_web_blobs() {
        let blob = Blob::from(&b"0123456789"[..]);
        assert_eq!(blob.slice(2, 5).len(), 3);
        assert_eq!(blob.slice(8, 100).len(), 2);
        assert_eq!(blob.slice(20, 30).len(), 0);
        assert!(blob.slice(6, 3).is_empty());

        let nested = blob.slice(2, 8).slice(1, 3);
        let bytes = futures::executor::block_on(nested.read()).unwrap();
        assert_eq!(&bytes[..], b"34");
    }

    #[test]
    fn supports_only_blob_backed_files() {
        let adapter = BlobAdapter::new();
        assert!(adapter.supports(&source(b"abc")));
        assert!(!adapter.supports(&FileSource::new(FileMetadata::new("a.txt"))));
    }

    #[test]
    fn read_defaults_to_metadata_size() {
        let adapter = BlobAdapter::new();
        let source = source(b"hello world");
        source.meta().set_size(5);

        let bytes = futures::executor::block_on(adapter.read(&source, ReadOptions::new())).unwrap();
        assert_eq!(&bytes[..], b"hello");

        let bytes = futures::executor::block_on(adapter.read(&source, ReadOptions::range(6, 100))).unwrap();
        assert_eq!(&bytes[..], b"world");
    }

    #[test]
    fn writes_are_always_rejected() {
        let adapter = BlobAdapter::new();
        let source = source(b"abc");

        let err = futures::executor::block_on(adapter.write_replace(&source, Bytes::new())).unwrap_err();
        assert!(matches!(err, Error::Immutable { ref name } if name == "picked.bin"));

        let err = futures::executor::block_on(adapter.write_at(&source, Bytes::from_static(b"x"), 1)).unwrap_err();
        assert!(matches!(err, Error::Immutable { .. }));
    }

    #[test]
    fn stream_stops_when_metadata_overstates_size() {
        let adapter = BlobAdapter::new();
        let source = source(b"abcd");
        source.meta().set_size(1000);

        let chunks: Vec<_> = futures::executor::block_on(adapter.stream(&source, StreamOptions::new(3)).collect());
        let chunks: Vec<Bytes> = chunks.into_iter().collect::<Result<_>>().unwrap();
        assert_eq!(chunks, vec![Bytes::from_static(b"abc"), Bytes::from_static(b"d")]);
    }
}
