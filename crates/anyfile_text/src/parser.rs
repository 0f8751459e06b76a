// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use anyfile::FileEntity;
use serde_json::Value;

use crate::{Result, decode};

/// Turns the content of a file into a typed value.
pub trait Parser: Send + Sync {
    /// The parsed value.
    type Output;

    /// Returns `true` if this parser understands the file, judging by its metadata.
    fn can_handle(&self, file: &FileEntity) -> bool;

    /// Reads the whole file and parses it.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails or the content is malformed.
    fn parse(&self, file: &FileEntity) -> impl Future<Output = Result<Self::Output>> + Send;
}

/// Parses JSON documents into [`serde_json::Value`].
///
/// Unlike [`JsonFile::load`](crate::JsonFile::load), malformed content is reported as
/// [`Error::Json`](crate::Error::Json).
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonParser;

impl JsonParser {
    /// Content type recognized by [`can_handle`](Parser::can_handle).
    pub const CONTENT_TYPE: &'static str = "application/json";

    /// Creates the parser.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Parser for JsonParser {
    type Output = Value;

    fn can_handle(&self, file: &FileEntity) -> bool {
        let meta = file.meta();
        meta.content_type == Self::CONTENT_TYPE || meta.name.ends_with(".json")
    }

    async fn parse(&self, file: &FileEntity) -> Result<Value> {
        let bytes = file.read().await?;
        Ok(serde_json::from_str(&decode(&bytes))?)
    }
}
