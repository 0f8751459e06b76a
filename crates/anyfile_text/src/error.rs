// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use thiserror::Error;

/// Errors raised by text and JSON documents.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The underlying file operation failed.
    #[error(transparent)]
    File(#[from] anyfile::Error),

    /// The content could not be parsed or serialized as JSON.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// A specialized `Result` for document operations.
pub type Result<T> = std::result::Result<T, Error>;
