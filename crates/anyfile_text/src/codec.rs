// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use bytes::Bytes;

/// Encodes text as UTF-8 bytes.
#[must_use]
pub fn encode(text: &str) -> Bytes {
    Bytes::copy_from_slice(text.as_bytes())
}

/// Decodes UTF-8 bytes, replacing invalid sequences with `U+FFFD`.
#[must_use]
pub fn decode(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}
