// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![allow(clippy::unwrap_used, reason = "Tests use unwrap for brevity")]
#![allow(clippy::missing_panics_doc, reason = "Tests")]
#![allow(unused_results, reason = "Tests")]
#![allow(missing_docs, reason = "Tests")]

use std::sync::{Arc, Mutex};

use anyfile::{AdapterRegistry, FileEntity, FileMetadata, LocalFsAdapter, Payload, ReadOptions, WRITE_COMPLETED, WriteMode};
use anyfile_text::{DATA_LOADED, JsonFile, TextFile};
use serde_json::{Map, Value, json};
use tempfile::TempDir;

fn entity(tmp: &TempDir, name: &str) -> FileEntity {
    let registry = AdapterRegistry::new();
    registry.register(LocalFsAdapter::new());
    FileEntity::builder(FileMetadata::new(tmp.path().join(name).to_string_lossy()))
        .registry(registry)
        .build()
        .unwrap()
}

fn object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap()
}

fn record(file: &FileEntity, event: &'static str) -> Arc<Mutex<Vec<Payload>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    file.on(event, move |e| sink.lock().unwrap().push(e.payload().clone()));
    seen
}

mod json_file {
    use super::*;

    #[tokio::test]
    async fn merging_saves_accumulate() {
        let tmp = TempDir::new().unwrap();
        let mut doc = JsonFile::new(entity(&tmp, "doc.json"));

        doc.save(object(json!({ "a": 1 })), false).await.unwrap();
        doc.save(object(json!({ "b": 2 })), false).await.unwrap();

        let mut reloaded = JsonFile::new(entity(&tmp, "doc.json"));
        reloaded.load().await.unwrap();
        assert_eq!(reloaded.data(), Some(&json!({ "a": 1, "b": 2 })));
    }

    #[tokio::test]
    async fn overwriting_save_drops_old_keys() {
        let tmp = TempDir::new().unwrap();
        let mut doc = JsonFile::new(entity(&tmp, "doc.json"));

        doc.save(object(json!({ "a": 1 })), false).await.unwrap();
        doc.save(object(json!({ "b": 2 })), true).await.unwrap();
        doc.load().await.unwrap();

        assert_eq!(doc.data(), Some(&json!({ "b": 2 })));
    }

    #[tokio::test]
    async fn malformed_content_loads_as_none() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("bad.json"), b"{ definitely not json").unwrap();
        let file = entity(&tmp, "bad.json");
        let loaded = record(&file, DATA_LOADED);
        let mut doc = JsonFile::new(file);

        doc.load().await.unwrap();

        assert_eq!(doc.data(), None);
        assert_eq!(*loaded.lock().unwrap(), vec![Payload::None]);
    }

    #[tokio::test]
    async fn load_announces_parsed_document() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("doc.json"), br#"{"x":true}"#).unwrap();
        let file = entity(&tmp, "doc.json");
        let loaded = record(&file, DATA_LOADED);
        let mut doc = JsonFile::new(file);

        doc.load().await.unwrap();

        assert_eq!(*loaded.lock().unwrap(), vec![Payload::Json(json!({ "x": true }))]);
    }

    #[tokio::test]
    async fn persisting_fires_write_completed_once() {
        let tmp = TempDir::new().unwrap();
        let file = entity(&tmp, "doc.json");
        let writes = record(&file, WRITE_COMPLETED);
        let mut doc = JsonFile::new(file);

        doc.patch(object(json!({ "a": 1 }))).await.unwrap();

        assert_eq!(writes.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn output_is_pretty_by_default() {
        let tmp = TempDir::new().unwrap();
        let mut doc = JsonFile::new(entity(&tmp, "doc.json"));

        doc.replace(json!({ "a": 1 })).await.unwrap();

        let written = std::fs::read_to_string(tmp.path().join("doc.json")).unwrap();
        assert_eq!(written, "{\n  \"a\": 1\n}");
        assert_eq!(doc.entity().meta().size, written.len() as u64);
    }

    #[tokio::test]
    async fn update_and_clean_stay_in_memory() {
        let tmp = TempDir::new().unwrap();
        let mut doc = JsonFile::new(entity(&tmp, "doc.json")).pretty(false);
        doc.replace(json!({ "a": 1 })).await.unwrap();

        doc.update(object(json!({ "b": 2 })));
        doc.clean();

        assert_eq!(doc.data(), Some(&json!({})));
        assert_eq!(std::fs::read_to_string(tmp.path().join("doc.json")).unwrap(), r#"{"a":1}"#);
    }
}

mod text_file {
    use super::*;

    #[tokio::test]
    async fn text_round_trips() {
        let tmp = TempDir::new().unwrap();
        let text = TextFile::new(entity(&tmp, "notes.txt"));

        text.write_text("héllo wörld", WriteMode::Replace).await.unwrap();

        assert_eq!(text.read_text(ReadOptions::new()).await.unwrap(), "héllo wörld");
        assert_eq!(text.entity().meta().size, "héllo wörld".len() as u64);
    }

    #[tokio::test]
    async fn partial_reads_decode_lossily() {
        let tmp = TempDir::new().unwrap();
        let text = TextFile::new(entity(&tmp, "notes.txt"));
        text.write_text("é", WriteMode::Replace).await.unwrap();

        let half = text.read_text(ReadOptions::range(0, 1)).await.unwrap();

        assert_eq!(half, "\u{FFFD}");
    }

    #[tokio::test]
    async fn offset_writes_patch_in_place() {
        let tmp = TempDir::new().unwrap();
        let text = TextFile::from(entity(&tmp, "notes.txt"));
        text.write_text("hello world", WriteMode::Replace).await.unwrap();

        text.write_text("W", WriteMode::At(6)).await.unwrap();

        assert_eq!(text.read_text(ReadOptions::new()).await.unwrap(), "hello World");
    }
}
