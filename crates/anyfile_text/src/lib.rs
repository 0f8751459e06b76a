// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Text and JSON documents on top of [`anyfile`] entities.
//!
//! These types only use an entity's read and write operations, so they work with
//! any storage adapter. Persisting always uses full-replace writes.
//!
//! * [`TextFile`] reads and writes UTF-8 text.
//! * [`JsonFile`] keeps a JSON document in memory with shallow-merge updates and
//!   persists it on demand.
//! * [`Parser`] and [`JsonParser`] parse a file's content once, reporting malformed
//!   content as an error.

pub use crate::codec::{decode, encode};
pub use crate::error::{Error, Result};
pub use crate::json_file::JsonFile;
pub use crate::parser::{JsonParser, Parser};
pub use crate::text_file::TextFile;

mod codec;
mod error;
mod json_file;
mod parser;
mod text_file;

/// Emitted by [`JsonFile::load`]. Carries the parsed document, or nothing if the
/// content was malformed.
pub const DATA_LOADED: &str = "data.loaded";

/// Emitted by [`JsonFile::update`]. Carries the updated document.
pub const DATA_UPDATED: &str = "data.updated";

/// Emitted by [`JsonFile::clean`]. Carries the emptied document.
pub const DATA_CLEANED: &str = "data.cleaned";
