// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use anyfile::{FileEntity, ReadOptions, WriteMode};

use crate::{Result, decode, encode};

/// A file holding UTF-8 text.
#[derive(Clone, Debug)]
pub struct TextFile {
    file: FileEntity,
}

impl TextFile {
    /// Wraps an entity.
    #[must_use]
    pub const fn new(file: FileEntity) -> Self {
        Self { file }
    }

    /// Reads the range described by `options` as text. Invalid UTF-8 is replaced,
    /// not rejected.
    ///
    /// # Errors
    ///
    /// Returns [`Error::File`](crate::Error::File) if the read fails.
    pub async fn read_text(&self, options: ReadOptions) -> Result<String> {
        let bytes = self.file.read_with(options).await?;
        Ok(decode(&bytes))
    }

    /// Writes `content` as UTF-8 with the given policy.
    ///
    /// # Errors
    ///
    /// Returns [`Error::File`](crate::Error::File) if the write fails.
    pub async fn write_text(&self, content: &str, mode: WriteMode) -> Result<()> {
        self.file.write(encode(content), mode).await?;
        Ok(())
    }

    /// The underlying entity.
    #[must_use]
    pub const fn entity(&self) -> &FileEntity {
        &self.file
    }

    /// Unwraps the underlying entity.
    #[must_use]
    pub fn into_entity(self) -> FileEntity {
        self.file
    }
}

impl From<FileEntity> for TextFile {
    fn from(file: FileEntity) -> Self {
        Self::new(file)
    }
}
