// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! One file abstraction over storage that behaves very differently underneath.
//!
//! A [`FileEntity`] is a file described by [`FileMetadata`] whose bytes live wherever
//! its [`StorageAdapter`] keeps them. Two adapters ship with the crate:
//!
//! | Adapter | Environment tag | Storage model |
//! |---------|-----------------|---------------|
//! | [`LocalFsAdapter`] | `"node"` | Random-access files on the local filesystem, located by `meta.name` |
//! | [`BlobAdapter`] | `"browser"` | Immutable, sliceable [`Blob`]s, such as files handed out by a browser file picker |
//!
//! Callers read, write and stream through the same interface no matter which adapter
//! serves a file. Writes against a blob fail with [`Error::Immutable`].
//!
//! # Resolving an adapter
//!
//! An [`AdapterRegistry`] holds the available adapters, newest first. A file's adapter
//! is picked exactly once, when the entity is built, using one of two strategies
//! expressed by [`Resolution`]:
//!
//! * [`Resolution::Probe`] asks each adapter whether it [`supports`](StorageAdapter::supports)
//!   the file and takes the first that does.
//! * [`Resolution::Environment`] takes the first adapter declaring the requested tag.
//!
//! [`FileEntity::new`] resolves against [`AdapterRegistry::global`]. Tests and embedders
//! that need isolation build their own registry and pass it to
//! [`FileEntity::builder`].
//!
//! # Quick start
//!
//! ```no_run
//! # async fn example() -> anyfile::Result<()> {
//! use anyfile::{FileEntity, FileMetadata, StreamOptions, WriteMode};
//! use futures::TryStreamExt;
//!
//! let file = FileEntity::new(FileMetadata::new("/var/data/log.txt"))?;
//!
//! file.write("first line\n", WriteMode::Replace).await?;
//! file.write("FIRST", WriteMode::At(0)).await?;
//!
//! let mut chunks = file.stream(StreamOptions::new(4096));
//! while let Some(chunk) = chunks.try_next().await? {
//!     println!("{} bytes", chunk.len());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Notifications
//!
//! Every entity carries an [`Observable`]. After a successful operation the entity
//! emits [`READ_COMPLETED`], [`WRITE_COMPLETED`] or [`META_CHANGED`]; subscribe with
//! [`FileEntity::on`].
//!
//! # Metadata sharing
//!
//! Metadata is held in a [`SharedMetadata`] handle. Entities built from clones of the
//! same handle observe each other's size updates; use
//! [`SharedMetadata::detached`] for an independent copy.
//!
//! # Blocking I/O
//!
//! [`LocalFsAdapter`] performs blocking filesystem calls on a small pool of dedicated
//! threads, so the crate works with any async executor and never blocks the caller's.

pub use crate::adapter::{ChunkStream, FileSource, StorageAdapter};
pub use crate::blob::{Blob, BlobAdapter, BlobSource};
pub use crate::entity::{FileEntity, FileEntityBuilder};
pub use crate::error::{Error, Result};
pub use crate::local_fs::LocalFsAdapter;
pub use crate::metadata::{FileMetadata, MetadataPatch, SharedMetadata, now_millis};
pub use crate::observable::{CHANGE, Event, META_CHANGED, Observable, Payload, READ_COMPLETED, SubscriptionId, WRITE_COMPLETED};
pub use crate::options::{DEFAULT_CHUNK_SIZE, LocalFsOptions, ReadOptions, StreamOptions, WriteMode};
pub use crate::path_utils::sanitize_path;
pub use crate::registry::{AdapterRegistry, Resolution};

mod adapter;
mod blob;
mod dispatcher;
mod entity;
mod error;
mod local_fs;
mod local_fs_stream;
mod metadata;
mod observable;
mod options;
mod path_utils;
mod registry;
