// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Describes a file independently of where its bytes live.
///
/// The serialized form is `{ "name", "size", "type", "last_modified" }`, with
/// `last_modified` in milliseconds since the Unix epoch.
///
/// `size` is only authoritative after the first successful read or write through an
/// adapter. If the storage is modified by someone else afterwards, `size` goes stale
/// until [`FileEntity::refresh_meta`](crate::FileEntity::refresh_meta) or
/// [`FileEntity::update_meta_size`](crate::FileEntity::update_meta_size) is called.
///
/// `last_modified` is informational and never touched by the I/O paths; stamp it
/// explicitly through [`MetadataPatch`] when freshness tracking is needed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub struct FileMetadata {
    /// Identifier of the file. Filesystem adapters use it as the storage path.
    pub name: String,
    /// Length of the file in bytes.
    pub size: u64,
    /// Content-type hint, used by parsers rather than adapters.
    #[serde(rename = "type")]
    pub content_type: String,
    /// Last modification time, in milliseconds since the Unix epoch.
    pub last_modified: u64,
}

impl FileMetadata {
    /// Creates metadata for `name` with zero size, no content type and no timestamp.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Sets the size in bytes.
    #[must_use]
    pub const fn with_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    /// Sets the content-type hint.
    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    /// Sets the last-modified timestamp, in epoch milliseconds.
    #[must_use]
    pub const fn with_last_modified(mut self, last_modified: u64) -> Self {
        self.last_modified = last_modified;
        self
    }

    /// Merges every field present in `patch` into this metadata.
    pub fn apply(&mut self, patch: MetadataPatch) {
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(size) = patch.size {
            self.size = size;
        }
        if let Some(content_type) = patch.content_type {
            self.content_type = content_type;
        }
        if let Some(last_modified) = patch.last_modified {
            self.last_modified = last_modified;
        }
    }
}

/// A partial update for [`FileMetadata`]. Fields left as `None` are not changed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct MetadataPatch {
    /// New name.
    pub name: Option<String>,
    /// New size in bytes.
    pub size: Option<u64>,
    /// New content-type hint.
    #[serde(rename = "type")]
    pub content_type: Option<String>,
    /// New last-modified timestamp, in epoch milliseconds.
    pub last_modified: Option<u64>,
}

impl MetadataPatch {
    /// Creates an empty patch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Replaces the size.
    #[must_use]
    pub const fn size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    /// Replaces the content type.
    #[must_use]
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Replaces the last-modified timestamp.
    #[must_use]
    pub const fn last_modified(mut self, last_modified: u64) -> Self {
        self.last_modified = Some(last_modified);
        self
    }
}

/// A shared, lock-protected handle to one [`FileMetadata`] value.
///
/// Cloning the handle shares the metadata: a size update made through any clone is
/// visible through all of them. Use [`detached`](Self::detached) for an independent copy.
///
/// No ordering is provided between writers that share a handle. Two entities writing
/// the same physical storage through one handle race at the storage layer and the
/// recorded size is whichever update lands last.
#[derive(Clone, Default)]
pub struct SharedMetadata {
    inner: Arc<RwLock<FileMetadata>>,
}

impl SharedMetadata {
    /// Wraps `meta` in a new, unshared handle.
    #[must_use]
    pub fn new(meta: FileMetadata) -> Self {
        Self {
            inner: Arc::new(RwLock::new(meta)),
        }
    }

    /// Returns a copy of the current metadata.
    #[must_use]
    pub fn snapshot(&self) -> FileMetadata {
        self.inner.read().clone()
    }

    /// Returns the current name.
    #[must_use]
    pub fn name(&self) -> String {
        self.inner.read().name.clone()
    }

    /// Returns the current size in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.inner.read().size
    }

    /// Returns the current content type.
    #[must_use]
    pub fn content_type(&self) -> String {
        self.inner.read().content_type.clone()
    }

    /// Records a new size.
    pub fn set_size(&self, size: u64) {
        self.inner.write().size = size;
    }

    /// Applies `patch` and returns the resulting metadata.
    pub fn update(&self, patch: MetadataPatch) -> FileMetadata {
        let mut meta = self.inner.write();
        meta.apply(patch);
        meta.clone()
    }

    /// Creates a new handle holding a copy of the current metadata, not shared with `self`.
    #[must_use]
    pub fn detached(&self) -> Self {
        Self::new(self.snapshot())
    }

    /// Returns `true` if both handles point at the same metadata value.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl From<FileMetadata> for SharedMetadata {
    fn from(meta: FileMetadata) -> Self {
        Self::new(meta)
    }
}

impl fmt::Debug for SharedMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SharedMetadata").field(&*self.inner.read()).finish()
    }
}

/// Returns the current time in milliseconds since the Unix epoch.
///
/// Clocks set before 1970 report zero.
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

#[cfg(test)]
mod tests {
    use static_assertions::assert_impl_all;

    use super::*;

    #[test]
    fn thread_safe_types() {
        assert_impl_all!(FileMetadata: Send, Sync);
        assert_impl_all!(SharedMetadata: Send, Sync, Clone);
    }

    #[test]
    fn serializes_to_wire_shape() {
        let meta = FileMetadata::new("a.txt")
            .with_size(5)
            .with_content_type("text/plain")
            .with_last_modified(1_700_000_000_000);

        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "name": "a.txt",
                "size": 5,
                "type": "text/plain",
                "last_modified": 1_700_000_000_000_u64,
            })
        );

        let back: FileMetadata = serde_json::from_value(json).unwrap();
        assert_eq!(back, meta);
    }

    #[test]
    fn patch_only_touches_present_fields() {
        let mut meta = FileMetadata::new("a.txt").with_size(3).with_content_type("text/plain");
        meta.apply(MetadataPatch::new().size(9).last_modified(42));

        assert_eq!(meta.name, "a.txt");
        assert_eq!(meta.size, 9);
        assert_eq!(meta.content_type, "text/plain");
        assert_eq!(meta.last_modified, 42);
    }

    #[test]
    fn clones_share_and_detached_copies_do_not() {
        let shared = SharedMetadata::new(FileMetadata::new("a.bin"));
        let alias = shared.clone();
        let detached = shared.detached();

        alias.set_size(12);

        assert_eq!(shared.size(), 12);
        assert_eq!(detached.size(), 0);
        assert!(shared.ptr_eq(&alias));
        assert!(!shared.ptr_eq(&detached));
    }

    #[test]
    fn now_millis_is_after_2020() {
        assert!(now_millis() > 1_577_836_800_000);
    }
}
