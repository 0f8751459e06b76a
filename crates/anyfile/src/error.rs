// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::io::ErrorKind;
use std::path::PathBuf;

use thiserror::Error;

/// Any error raised while resolving a storage adapter or performing file I/O through one.
///
/// Adapters raise these; [`FileEntity`](crate::FileEntity) passes them to the caller untouched.
/// Nothing in this crate retries an operation that failed.
///
/// # Thread safety
///
/// This type is thread-safe.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// No registered adapter declares the requested environment tag.
    #[error("no adapter found for environment: {environment}")]
    UnsupportedEnvironment {
        /// The environment tag that was requested.
        environment: String,
    },

    /// Capability probing found no adapter able to serve the file.
    #[error("no compatible adapter found for {name}")]
    NoCompatibleAdapter {
        /// Name of the file that could not be served.
        name: String,
    },

    /// The underlying storage could not be opened, read or written.
    #[error("storage access failed for {}: {source}", .path.display())]
    Storage {
        /// The storage location that was being accessed.
        path: PathBuf,
        /// The error reported by the operating system.
        #[source]
        source: std::io::Error,
    },

    /// An immutable blob could not be decoded into bytes.
    #[error("failed to decode blob: {0}")]
    Decode(#[source] std::io::Error),

    /// A write was attempted against storage that can never be mutated.
    #[error("{name} is backed by immutable storage and cannot be written")]
    Immutable {
        /// Name of the file that was the target of the write.
        name: String,
    },

    /// An option value is outside of its permitted range.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// A specialized `Result` for file operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Storage {
            path: path.into(),
            source,
        }
    }

    /// Returns `true` if the error was caused by storage that does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Storage { source, .. } if source.kind() == ErrorKind::NotFound)
    }

    /// Returns `true` if the error is a resolution failure, meaning no usable entity was built.
    #[must_use]
    pub const fn is_resolution(&self) -> bool {
        matches!(self, Self::UnsupportedEnvironment { .. } | Self::NoCompatibleAdapter { .. })
    }
}

/// Represents a file error as a standard I/O error, for callers that interoperate with
/// `std::io` based APIs.
impl From<Error> for std::io::Error {
    fn from(value: Error) -> Self {
        match value {
            Error::Storage { source, .. } | Error::Decode(source) => source,
            Error::Immutable { .. } => Self::new(ErrorKind::PermissionDenied, value),
            Error::InvalidArgument(_) => Self::new(ErrorKind::InvalidInput, value),
            Error::UnsupportedEnvironment { .. } | Error::NoCompatibleAdapter { .. } => Self::new(ErrorKind::Unsupported, value),
        }
    }
}
