// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use core::num::NonZeroUsize;
use core::time::Duration;

use crate::{Error, Result};

/// Chunk size used by [`StreamOptions::default`]: 64 KiB.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Options for a bounded read.
///
/// By default a read starts at offset zero and covers the rest of the file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[non_exhaustive]
pub struct ReadOptions {
    /// Byte offset to start reading at.
    pub offset: u64,
    /// Number of bytes to read. `None` reads through to the end of the file.
    pub length: Option<u64>,
}

impl ReadOptions {
    /// Reads the whole file.
    #[must_use]
    pub const fn new() -> Self {
        Self { offset: 0, length: None }
    }

    /// Reads `length` bytes starting at `offset`.
    #[must_use]
    pub const fn range(offset: u64, length: u64) -> Self {
        Self {
            offset,
            length: Some(length),
        }
    }

    /// Sets the starting offset.
    #[must_use]
    pub const fn offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    /// Sets the number of bytes to read.
    #[must_use]
    pub const fn length(mut self, length: u64) -> Self {
        self.length = Some(length);
        self
    }
}

/// How a write lands in storage.
///
/// The two policies are deliberately separate operations: a replace write never
/// preserves old bytes, while an offset write never truncates them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WriteMode {
    /// Truncates the storage and rewrites it entirely with the new data.
    #[default]
    Replace,
    /// Writes the data at the given offset, keeping any bytes beyond it.
    /// Storage that does not exist yet is created holding just the data.
    At(u64),
}

/// Options for chunked streaming.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub struct StreamOptions {
    /// Maximum number of bytes in each chunk.
    pub chunk_size: usize,
}

impl StreamOptions {
    /// Creates options with the given chunk size.
    #[must_use]
    pub const fn new(chunk_size: usize) -> Self {
        Self { chunk_size }
    }

    /// Returns the chunk size, rejecting zero.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the chunk size is zero.
    pub fn validated_chunk_size(&self) -> Result<NonZeroUsize> {
        NonZeroUsize::new(self.chunk_size).ok_or_else(|| Error::InvalidArgument("chunk_size must be at least 1".to_string()))
    }
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

/// Configuration for [`LocalFsAdapter`](crate::LocalFsAdapter).
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub struct LocalFsOptions {
    /// Upper bound on worker threads performing blocking filesystem calls.
    pub max_threads: usize,
    /// How long a surplus worker thread waits for work before exiting.
    pub idle_timeout: Duration,
    /// Whether file names are normalized before use as paths: backslashes become `/`,
    /// `.` components are dropped and `..` components collapse lexically.
    pub sanitize_paths: bool,
}

impl LocalFsOptions {
    /// Default for [`max_threads`](Self::max_threads).
    pub const DEFAULT_MAX_THREADS: usize = 4;

    /// Default for [`idle_timeout`](Self::idle_timeout).
    pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(10);

    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the worker thread limit. Values below one are raised to one.
    #[must_use]
    pub fn max_threads(mut self, max_threads: usize) -> Self {
        self.max_threads = max_threads.max(1);
        self
    }

    /// Sets the idle timeout for surplus worker threads.
    #[must_use]
    pub const fn idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Enables or disables path normalization.
    #[must_use]
    pub const fn sanitize_paths(mut self, sanitize_paths: bool) -> Self {
        self.sanitize_paths = sanitize_paths;
        self
    }
}

impl Default for LocalFsOptions {
    fn default() -> Self {
        Self {
            max_threads: Self::DEFAULT_MAX_THREADS,
            idle_timeout: Self::DEFAULT_IDLE_TIMEOUT,
            sanitize_paths: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_options_default_to_whole_file() {
        assert_eq!(ReadOptions::default(), ReadOptions::new());
        assert_eq!(ReadOptions::new().offset, 0);
        assert_eq!(ReadOptions::new().length, None);
        assert_eq!(ReadOptions::new().offset(4).length(2), ReadOptions::range(4, 2));
    }

    #[test]
    fn stream_chunk_size_defaults_to_64k() {
        assert_eq!(StreamOptions::default().chunk_size, 65_536);
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        let err = StreamOptions::new(0).validated_chunk_size().unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert_eq!(StreamOptions::new(3).validated_chunk_size().unwrap().get(), 3);
    }

    #[test]
    fn write_mode_defaults_to_replace() {
        assert_eq!(WriteMode::default(), WriteMode::Replace);
    }

    #[test]
    fn local_fs_options_clamp_threads() {
        let options = LocalFsOptions::new().max_threads(0).sanitize_paths(false);
        assert_eq!(options.max_threads, 1);
        assert!(!options.sanitize_paths);
        assert_eq!(options.idle_timeout, LocalFsOptions::DEFAULT_IDLE_TIMEOUT);
    }
}
