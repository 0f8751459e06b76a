// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fs::{File, OpenOptions};
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;
use futures::future::{self, BoxFuture};
use futures::{FutureExt as _, StreamExt as _, stream};

use crate::adapter::{ChunkStream, FileSource, StorageAdapter};
use crate::dispatcher::Dispatcher;
use crate::local_fs_stream::FileChunks;
use crate::{Error, LocalFsOptions, ReadOptions, Result, StreamOptions};

/// Serves files stored on the local filesystem, using the file name as its path.
///
/// Every blocking `std::fs` call runs on a small pool of dedicated threads owned by
/// the adapter, so the adapter works under any async executor. Each read and write
/// opens its own handle and closes it before returning; streams hold one handle for
/// as long as the stream is alive.
///
/// # Write policies
///
/// * [`write_replace`](StorageAdapter::write_replace) truncates and rewrites the file.
/// * [`write_at`](StorageAdapter::write_at) writes in place without truncating. A file
///   that does not exist yet is created holding just the data.
///
/// After either write the recorded size is the length of the data written. For an
/// offset write into a longer file this is smaller than the file; call
/// [`FileEntity::refresh_meta`](crate::FileEntity::refresh_meta) to learn the real length.
#[derive(Debug)]
pub struct LocalFsAdapter {
    dispatcher: Dispatcher,
    options: LocalFsOptions,
    open_streams: Arc<AtomicUsize>,
}

impl LocalFsAdapter {
    /// Environment tag declared by this adapter.
    pub const ENVIRONMENT: &'static str = "node";

    /// Creates an adapter with the default [`LocalFsOptions`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_options(LocalFsOptions::default())
    }

    /// Creates an adapter with the given options.
    #[must_use]
    pub fn with_options(options: LocalFsOptions) -> Self {
        Self {
            dispatcher: Dispatcher::new(options.max_threads, options.idle_timeout),
            options,
            open_streams: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Returns the options this adapter was created with.
    #[must_use]
    pub const fn options(&self) -> &LocalFsOptions {
        &self.options
    }

    /// Number of file handles currently held open by streams from this adapter.
    #[must_use]
    pub fn open_streams(&self) -> usize {
        self.open_streams.load(Ordering::Acquire)
    }

    fn path(&self, source: &FileSource) -> PathBuf {
        let name = source.meta().name();
        if self.options.sanitize_paths {
            crate::path_utils::sanitize_path(&name)
        } else {
            PathBuf::from(name)
        }
    }
}

impl Default for LocalFsAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageAdapter for LocalFsAdapter {
    fn environment(&self) -> &str {
        Self::ENVIRONMENT
    }

    fn supports(&self, source: &FileSource) -> bool {
        cfg!(not(target_family = "wasm")) && source.blob().is_none()
    }

    fn read<'a>(&'a self, source: &'a FileSource, options: ReadOptions) -> BoxFuture<'a, Result<Bytes>> {
        async move {
            let path = self.path(source);
            let (bytes, observed_size) = self
                .dispatcher
                .dispatch(move || read_blocking(&path, options))
                .await?;

            if let Some(size) = observed_size {
                source.meta().set_size(size);
            }

            tracing::trace!(offset = options.offset, len = bytes.len(), "file read");
            Ok(bytes)
        }
        .boxed()
    }

    fn write_replace<'a>(&'a self, source: &'a FileSource, data: Bytes) -> BoxFuture<'a, Result<()>> {
        async move {
            let path = self.path(source);
            let len = data.len() as u64;
            self.dispatcher
                .dispatch(move || std::fs::write(&path, &data).map_err(|e| Error::storage(path, e)))
                .await?;

            tracing::debug!(name = %source.meta().name(), len, "file replaced");
            source.record_written(len);
            Ok(())
        }
        .boxed()
    }

    fn write_at<'a>(&'a self, source: &'a FileSource, data: Bytes, offset: u64) -> BoxFuture<'a, Result<()>> {
        async move {
            let path = self.path(source);
            let len = data.len() as u64;
            let created = self
                .dispatcher
                .dispatch(move || write_at_blocking(&path, &data, offset))
                .await?;

            if created {
                tracing::debug!(name = %source.meta().name(), len, "file did not exist, created it");
            } else {
                tracing::debug!(name = %source.meta().name(), offset, len, "file written in place");
            }
            source.record_written(len);
            Ok(())
        }
        .boxed()
    }

    fn stream(&self, source: &FileSource, options: StreamOptions) -> ChunkStream {
        match options.validated_chunk_size() {
            Ok(chunk_size) => FileChunks::open(
                &self.dispatcher,
                self.path(source),
                source.meta().clone(),
                chunk_size.get(),
                Arc::clone(&self.open_streams),
            )
            .boxed(),
            Err(e) => stream::once(future::ready(Err(e))).boxed(),
        }
    }

    fn len<'a>(&'a self, source: &'a FileSource) -> BoxFuture<'a, Result<u64>> {
        async move {
            let path = self.path(source);
            self.dispatcher
                .dispatch(move || std::fs::metadata(&path).map(|m| m.len()).map_err(|e| Error::storage(path, e)))
                .await
        }
        .boxed()
    }

    fn close<'a>(&'a self, _source: &'a FileSource) -> BoxFuture<'a, Result<()>> {
        // Handles are scoped to each call or stream; nothing is held between them.
        future::ready(Ok(())).boxed()
    }
}

/// Returns the bytes read and, when the length had to be discovered, the file size.
fn read_blocking(path: &Path, options: ReadOptions) -> Result<(Bytes, Option<u64>)> {
    let (wanted, observed_size) = match options.length {
        Some(length) => (length, None),
        None => {
            let size = std::fs::metadata(path).map_err(|e| Error::storage(path, e))?.len();
            (size.saturating_sub(options.offset), Some(size))
        }
    };

    let file = File::open(path).map_err(|e| Error::storage(path, e))?;

    // Never allocate more than the file can provide from this offset.
    let available = file
        .metadata()
        .map_err(|e| Error::storage(path, e))?
        .len()
        .saturating_sub(options.offset);
    let len = usize::try_from(wanted.min(available))
        .map_err(|e| Error::InvalidArgument(format!("read of {wanted} bytes does not fit in memory: {e}")))?;

    let buf = read_best_effort_at(&file, options.offset, len).map_err(|e| Error::storage(path, e))?;
    Ok((Bytes::from(buf), observed_size))
}

/// Returns `true` if the file did not exist and was created.
fn write_at_blocking(path: &Path, data: &[u8], offset: u64) -> Result<bool> {
    match OpenOptions::new().read(true).write(true).open(path) {
        Ok(file) => {
            positional_write_all(&file, data, offset).map_err(|e| Error::storage(path, e))?;
            Ok(false)
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            std::fs::write(path, data).map_err(|e| Error::storage(path, e))?;
            Ok(true)
        }
        Err(e) => Err(Error::storage(path, e)),
    }
}

/// Reads up to `len` bytes at `offset`, stopping early only at end of file.
pub(crate) fn read_best_effort_at(file: &File, offset: u64, len: usize) -> io::Result<Vec<u8>> {
    let mut buf = vec![0_u8; len];
    let mut total = 0;
    while total < len {
        let current_offset = offset.saturating_add(total as u64);
        match positional_read(file, &mut buf[total..], current_offset) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    buf.truncate(total);
    Ok(buf)
}

/// Reads bytes at `offset` without affecting the cursor.
#[cfg(unix)]
fn positional_read(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    use std::os::unix::fs::FileExt;
    file.read_at(buf, offset)
}

/// Reads bytes at `offset` without affecting the cursor.
#[cfg(windows)]
fn positional_read(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    use std::os::windows::fs::FileExt;
    file.seek_read(buf, offset)
}

#[cfg(not(any(unix, windows)))]
fn positional_read(_file: &File, _buf: &mut [u8], _offset: u64) -> io::Result<usize> {
    Err(io::Error::from(ErrorKind::Unsupported))
}

/// Writes bytes at `offset` without affecting the cursor.
#[cfg(unix)]
fn positional_write(file: &File, buf: &[u8], offset: u64) -> io::Result<usize> {
    use std::os::unix::fs::FileExt;
    file.write_at(buf, offset)
}

/// Writes bytes at `offset` without affecting the cursor.
#[cfg(windows)]
fn positional_write(file: &File, buf: &[u8], offset: u64) -> io::Result<usize> {
    use std::os::windows::fs::FileExt;
    file.seek_write(buf, offset)
}

#[cfg(not(any(unix, windows)))]
fn positional_write(_file: &File, _buf: &[u8], _offset: u64) -> io::Result<usize> {
    Err(io::Error::from(ErrorKind::Unsupported))
}

/// Writes all of `buf` at `offset`, retrying on short writes.
fn positional_write_all(file: &File, mut buf: &[u8], mut offset: u64) -> io::Result<()> {
    while !buf.is_empty() {
        match positional_write(file, buf, offset) {
            Ok(0) => return Err(io::Error::new(ErrorKind::WriteZero, "failed to write whole buffer")),
            Ok(n) => {
                buf = &buf[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::FileMetadata;

    fn source_in(dir: &TempDir, name: &str) -> FileSource {
        FileSource::new(FileMetadata::new(dir.path().join(name).to_string_lossy()))
    }

    #[test]
    fn supports_path_backed_files_only() {
        let adapter = LocalFsAdapter::new();
        let plain = FileSource::new(FileMetadata::new("a.txt"));
        let blob = plain.clone().with_blob(crate::Blob::from(&b"x"[..]));

        assert!(adapter.supports(&plain));
        assert!(!adapter.supports(&blob));
    }

    #[test]
    fn read_without_length_discovers_size() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.bin"), b"0123456789").unwrap();
        let adapter = LocalFsAdapter::new();
        let source = source_in(&dir, "a.bin");

        let bytes = futures::executor::block_on(adapter.read(&source, ReadOptions::new().offset(4))).unwrap();

        assert_eq!(&bytes[..], b"456789");
        assert_eq!(source.meta().size(), 10);
    }

    #[test]
    fn read_past_end_is_short_not_padded() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.bin"), b"abc").unwrap();
        let adapter = LocalFsAdapter::new();
        let source = source_in(&dir, "a.bin");

        let bytes = futures::executor::block_on(adapter.read(&source, ReadOptions::range(1, 100))).unwrap();
        assert_eq!(&bytes[..], b"bc");

        let bytes = futures::executor::block_on(adapter.read(&source, ReadOptions::range(10, 4))).unwrap();
        assert!(bytes.is_empty());
        assert_eq!(source.meta().size(), 0, "explicit length must not touch the recorded size");
    }

    #[test]
    fn read_missing_file_is_storage_error() {
        let dir = TempDir::new().unwrap();
        let adapter = LocalFsAdapter::new();
        let source = source_in(&dir, "missing.bin");

        let err = futures::executor::block_on(adapter.read(&source, ReadOptions::new())).unwrap_err();
        assert!(err.is_not_found(), "unexpected error: {err}");
    }

    #[test]
    fn write_at_creates_missing_file() {
        let dir = TempDir::new().unwrap();
        let adapter = LocalFsAdapter::new();
        let source = source_in(&dir, "new.bin");

        futures::executor::block_on(adapter.write_at(&source, Bytes::from_static(b"fresh"), 0)).unwrap();

        assert_eq!(std::fs::read(dir.path().join("new.bin")).unwrap(), b"fresh");
        assert_eq!(source.meta().size(), 5);
    }

    #[test]
    fn write_into_missing_directory_fails() {
        let dir = TempDir::new().unwrap();
        let adapter = LocalFsAdapter::new();
        let source = source_in(&dir, "no/such/dir/file.bin");

        let err = futures::executor::block_on(adapter.write_replace(&source, Bytes::from_static(b"x"))).unwrap_err();
        assert!(matches!(err, Error::Storage { .. }));
        assert_eq!(source.meta().size(), 0);
    }

    #[test]
    fn write_at_on_directory_is_storage_error() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let adapter = LocalFsAdapter::new();
        let source = source_in(&dir, "sub");

        let err = futures::executor::block_on(adapter.write_at(&source, Bytes::from_static(b"x"), 0)).unwrap_err();

        assert!(matches!(err, Error::Storage { .. }), "unexpected error: {err}");
        assert!(!err.is_not_found());
        assert!(dir.path().join("sub").is_dir());
        assert_eq!(source.meta().size(), 0);
    }

    #[test]
    fn unsanitized_paths_are_used_verbatim() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub").join("a.txt"), b"nested").unwrap();
        let adapter = LocalFsAdapter::with_options(LocalFsOptions::new().sanitize_paths(false));
        let name = format!("{}/sub/./a.txt", dir.path().display());
        let source = FileSource::new(FileMetadata::new(name));

        let bytes = futures::executor::block_on(adapter.read(&source, ReadOptions::new())).unwrap();
        assert_eq!(&bytes[..], b"nested");
    }

    #[test]
    fn len_reports_storage_length() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.bin"), b"12345678").unwrap();
        let adapter = LocalFsAdapter::new();
        let source = source_in(&dir, "a.bin");

        assert_eq!(futures::executor::block_on(adapter.len(&source)).unwrap(), 8);
    }
}
