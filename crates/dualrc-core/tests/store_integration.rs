//! Integration tests for the file-backed store.
//!
//! Every test works on a real file in its own temporary directory and goes
//! through the public API only: open a store, read and write values, then
//! open a second store on the same file to check what was persisted.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dualrc_core::domain::autogen::SECTION_START;
use dualrc_core::{
    ConfigMap, ConfigSource, ConfigStore, FileBacking, LoadPolicy, Lookup, ScriptSandbox,
};
use serde_json::{json, Value};
use uuid::Uuid;

fn temp_dir() -> PathBuf {
    std::env::temp_dir().join(format!("dualrc_it_{}", Uuid::new_v4()))
}

fn store_at(path: &Path) -> ConfigStore {
    ConfigStore::with_backing(FileBacking::new(path))
}

fn map(value: Value) -> ConfigMap {
    match value {
        Value::Object(m) => m,
        other => panic!("expected object, got {other}"),
    }
}

#[tokio::test]
async fn test_missing_file_starts_empty_and_first_set_creates_it() {
    // Arrange
    let dir = temp_dir();
    let path = dir.join("nested").join("app.rc");
    let store = store_at(&path);

    // Act
    let before = store.load_config().await.unwrap();
    store.set_one("port", json!(4005)).await.unwrap();

    // Assert
    assert!(before.is_empty());
    let written = std::fs::read_to_string(&path).expect("file must exist after set");
    assert!(written.contains(SECTION_START));
    assert_eq!(store_at(&path).get_one("port").await.unwrap(), Some(json!(4005)));

    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn test_document_form_is_converted_to_a_section_on_first_save() {
    let dir = temp_dir();
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("doc.json");
    std::fs::write(&path, "{\n  \"a\": 1,\n  \"list\": [1, 2]\n}\n").unwrap();

    let store = store_at(&path);
    assert_eq!(store.get_one("a").await.unwrap(), Some(json!(1)));
    store.set_one("b", json!("two")).await.unwrap();

    let written = std::fs::read_to_string(&path).unwrap();
    assert!(written.trim_start().starts_with("// @@@AUTOGENERATED"));

    // The rewritten file is script form and still holds every value.
    let reopened = store_at(&path).load_config().await.unwrap();
    assert_eq!(
        Value::Object(reopened),
        json!({ "a": 1, "list": [1, 2], "b": "two" })
    );

    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn test_script_text_survives_saves() {
    // Arrange
    let dir = temp_dir();
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("app.rc");
    let script = "// hand-written settings\nlet base = 4000;\nset_config(#{ port: base + 5, host: \"localhost\" });\n";
    std::fs::write(&path, script).unwrap();
    let store = store_at(&path);

    // Act
    store.set_one("verbose", json!(true)).await.unwrap();
    store.set_one("port", json!(9000)).await.unwrap();

    // Assert
    let written = std::fs::read_to_string(&path).unwrap();
    assert!(written.starts_with(script));
    assert_eq!(written.matches(SECTION_START).count(), 1);

    // Saved values come after the hand-written call and win on reload.
    let reopened = store_at(&path).load_config().await.unwrap();
    assert_eq!(
        Value::Object(reopened),
        json!({ "host": "localhost", "port": 9000, "verbose": true })
    );

    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn test_script_with_invalid_utf8_keeps_its_text() {
    // Arrange
    let dir = temp_dir();
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("latin1.rc");
    let body = "let base = 4000;\nset_config(#{ port: base + 5 });\n";
    let mut bytes = b"// caf\xE9\n".to_vec();
    bytes.extend_from_slice(body.as_bytes());
    std::fs::write(&path, &bytes).unwrap();
    let store = store_at(&path);

    // Act
    let loaded = store.load_config().await.unwrap();
    store.set_one("verbose", json!(true)).await.unwrap();

    // Assert
    assert_eq!(Value::Object(loaded), json!({ "port": 4005 }));
    let written = String::from_utf8_lossy(&std::fs::read(&path).unwrap()).into_owned();
    assert!(written.contains(body), "script text was lost: {written:?}");
    let reopened = store_at(&path).load_config().await.unwrap();
    assert_eq!(Value::Object(reopened), json!({ "port": 4005, "verbose": true }));

    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn test_text_after_the_section_is_kept() {
    let dir = temp_dir();
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("app.rc");

    store_at(&path).set_one("a", json!(1)).await.unwrap();
    let mut text = std::fs::read_to_string(&path).unwrap();
    text.push_str("set_config(#{ tail: true });\n");
    std::fs::write(&path, &text).unwrap();

    let store = store_at(&path);
    store.set_one("a", json!(2)).await.unwrap();

    let written = std::fs::read_to_string(&path).unwrap();
    assert!(written.ends_with("set_config(#{ tail: true });\n"));
    let reopened = store_at(&path).load_config().await.unwrap();
    assert_eq!(Value::Object(reopened), json!({ "a": 2, "tail": true }));

    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn test_script_runs_once_until_reevaluated() {
    // Arrange
    let dir = temp_dir();
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("app.rc");
    std::fs::write(&path, "print(\"loading\");\nset_config(#{ a: 1 });\n").unwrap();

    let runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&runs);
    let sandbox = ScriptSandbox::new().with_print_sink(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let store = store_at(&path).with_sandbox(sandbox);

    // Act
    for _ in 0..3 {
        store.get("a").await.unwrap();
    }
    store.set_one("b", json!(2)).await.unwrap();
    store.invalidate().await;
    store.get("a").await.unwrap();
    let after_invalidate = runs.load(Ordering::SeqCst);

    store.reevaluate().await;
    let cfg = store.load_config().await.unwrap();

    // Assert
    assert_eq!(after_invalidate, 1);
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert_eq!(Value::Object(cfg), json!({ "a": 1, "b": 2 }));

    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn test_script_profiles_can_be_applied_and_persist() {
    let dir = temp_dir();
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("app.rc");
    std::fs::write(
        &path,
        "set_config(#{ jobs: 1, color: true });\n\
         set_profile(\"ci\", #{ jobs: 16, color: false });\n\
         set_profile(\"empty\");\n",
    )
    .unwrap();

    let store = store_at(&path);
    assert_eq!(store.profile_names().await.unwrap(), ["ci", "empty"]);

    store.use_profile("ci").await.unwrap();
    store.use_profile("no-such-profile").await.unwrap();

    let reopened = store_at(&path).load_config().await.unwrap();
    assert_eq!(Value::Object(reopened), json!({ "jobs": 16, "color": false }));

    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn test_single_key_and_key_list_queries() {
    let dir = temp_dir();
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("q.json");
    std::fs::write(&path, "{\"x\": 42, \"n\": null}").unwrap();
    let store = store_at(&path);

    assert_eq!(store.get("x").await.unwrap(), Lookup::One(Some(json!(42))));
    assert_eq!(store.get("missing").await.unwrap(), Lookup::One(None));

    let many = store.get("x, y ,n,x").await.unwrap();
    assert_eq!(
        many,
        Lookup::Many(vec![
            ("x".to_string(), Some(json!(42))),
            ("y".to_string(), None),
            ("n".to_string(), Some(Value::Null)),
        ])
    );

    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn test_set_many_merges_in_one_save() {
    let dir = temp_dir();
    let path = dir.join("app.rc");
    let store = store_at(&path);

    store.set_one("keep", json!("me")).await.unwrap();
    store
        .set_many(map(json!({ "a": { "nested": [1, 2] }, "keep": "changed" })))
        .await
        .unwrap();

    let reopened = store_at(&path).load_config().await.unwrap();
    assert_eq!(
        Value::Object(reopened),
        json!({ "keep": "changed", "a": { "nested": [1, 2] } })
    );

    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn test_broken_script_is_empty_by_default_and_error_when_strict() {
    let dir = temp_dir();
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("broken.rc");
    std::fs::write(&path, "set_config(#{ a: 1 });\nlet = ;\n").unwrap();

    let lenient = store_at(&path);
    assert!(lenient.load_config().await.unwrap().is_empty());

    let strict = store_at(&path).with_policy(LoadPolicy::Strict);
    let err = strict.load_config().await.unwrap_err();
    assert!(err.to_string().contains("broken.rc"), "unexpected error: {err}");

    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn test_store_is_usable_through_the_trait() {
    let dir = temp_dir();
    let path = dir.join("app.rc");
    let store = store_at(&path);
    let source: &dyn ConfigSource = &store;

    source.set_one("k", json!(1)).await.unwrap();
    source.set_profile("p", &map(json!({ "k": 2 })));
    source.use_profile("p").await.unwrap();

    assert_eq!(source.get_one("k").await.unwrap(), Some(json!(2)));
    assert_eq!(store.path(), path);

    std::fs::remove_dir_all(&dir).ok();
}
