// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use anyfile::{FileEntity, Payload};
use serde_json::{Map, Value};

use crate::{DATA_CLEANED, DATA_LOADED, DATA_UPDATED, Result, decode};

/// A JSON document kept in memory and persisted through a [`FileEntity`].
///
/// | Method | Touches storage | Event |
/// |--------|-----------------|-------|
/// | [`load`](Self::load) | reads | [`DATA_LOADED`] |
/// | [`save`](Self::save), [`patch`](Self::patch), [`replace`](Self::replace) | writes | `write.completed` (from the entity) |
/// | [`update`](Self::update) | no | [`DATA_UPDATED`] |
/// | [`clean`](Self::clean) | no | [`DATA_CLEANED`] |
///
/// Merges are shallow: top-level keys of the patch replace those of the document.
/// If the document is not an object, a merge starts from an empty one.
///
/// # Examples
///
/// ```no_run
/// use anyfile::{FileEntity, FileMetadata};
/// use anyfile_text::JsonFile;
/// use serde_json::json;
///
/// # async fn example() -> anyfile_text::Result<()> {
/// let mut settings = JsonFile::new(FileEntity::new(FileMetadata::new("settings.json"))?);
/// settings.load().await?;
/// settings.patch(json!({ "theme": "dark" }).as_object().cloned().unwrap_or_default()).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct JsonFile {
    file: FileEntity,
    data: Option<Value>,
    pretty: bool,
}

impl JsonFile {
    /// Wraps an entity. The document starts out as an empty object.
    #[must_use]
    pub fn new(file: FileEntity) -> Self {
        Self {
            file,
            data: Some(Value::Object(Map::new())),
            pretty: true,
        }
    }

    /// Chooses between two-space indented output (the default) and compact output.
    #[must_use]
    pub const fn pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    /// The in-memory document. `None` after loading malformed content.
    #[must_use]
    pub const fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    /// Reads and parses the file, then emits [`DATA_LOADED`].
    ///
    /// Malformed content is not an error: the document becomes `None` and the event
    /// still fires, with no payload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::File`](crate::Error::File) if the read fails.
    pub async fn load(&mut self) -> Result<()> {
        let bytes = self.file.read().await?;
        match serde_json::from_str::<Value>(&decode(&bytes)) {
            Ok(value) => {
                self.data = Some(value.clone());
                self.file.observable().trigger(DATA_LOADED, Payload::Json(value));
            }
            Err(e) => {
                tracing::debug!(name = %self.file.meta().name, error = %e, "discarding malformed JSON");
                self.data = None;
                self.file.observable().trigger(DATA_LOADED, Payload::None);
            }
        }
        Ok(())
    }

    /// Stores `data` and persists the document. With `overwrite` the document becomes
    /// `data`; otherwise `data` is merged into it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::File`](crate::Error::File) if the write fails.
    pub async fn save(&mut self, data: Map<String, Value>, overwrite: bool) -> Result<()> {
        if overwrite {
            self.data = Some(Value::Object(data));
        } else {
            self.merge(data);
        }
        self.persist().await
    }

    /// Merges `partial` into the document and persists it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::File`](crate::Error::File) if the write fails.
    pub async fn patch(&mut self, partial: Map<String, Value>) -> Result<()> {
        self.save(partial, false).await
    }

    /// Replaces the document with any JSON value and persists it.
    ///
    /// The in-memory document only changes once the write has succeeded.
    ///
    /// # Errors
    ///
    /// Returns [`Error::File`](crate::Error::File) if the write fails.
    pub async fn replace(&mut self, value: Value) -> Result<()> {
        let bytes = self.serialize(Some(&value))?;
        self.file.write_replace(bytes).await?;
        self.data = Some(value);
        Ok(())
    }

    /// Merges `partial` into the in-memory document without persisting it, then emits
    /// [`DATA_UPDATED`].
    pub fn update(&mut self, partial: Map<String, Value>) {
        self.merge(partial);
        self.file.observable().trigger(DATA_UPDATED, self.payload());
    }

    /// Empties the in-memory document without persisting it, then emits [`DATA_CLEANED`].
    pub fn clean(&mut self) {
        self.data = Some(Value::Object(Map::new()));
        self.file.observable().trigger(DATA_CLEANED, self.payload());
    }

    /// The underlying entity.
    #[must_use]
    pub const fn entity(&self) -> &FileEntity {
        &self.file
    }

    fn merge(&mut self, partial: Map<String, Value>) {
        let mut object = match self.data.take() {
            Some(Value::Object(object)) => object,
            _ => Map::new(),
        };
        object.extend(partial);
        self.data = Some(Value::Object(object));
    }

    async fn persist(&self) -> Result<()> {
        let bytes = self.serialize(self.data.as_ref())?;
        self.file.write_replace(bytes).await?;
        Ok(())
    }

    fn serialize(&self, value: Option<&Value>) -> Result<Vec<u8>> {
        let value = value.unwrap_or(&Value::Null);
        let bytes = if self.pretty {
            serde_json::to_vec_pretty(value)?
        } else {
            serde_json::to_vec(value)?
        };
        Ok(bytes)
    }

    fn payload(&self) -> Payload {
        self.data.clone().map_or(Payload::None, Payload::Json)
    }
}

impl From<FileEntity> for JsonFile {
    fn from(file: FileEntity) -> Self {
        Self::new(file)
    }
}
