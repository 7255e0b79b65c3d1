//! Project-level persistence: init, reopen, fork, and configured exporters.

use std::fs;

use lix_core::clock::ManualClock;
use lix_core::config::{CONFIG_FILE, LIX_DIR};
use lix_core::{Edit, ErrorCode, History, Lix, LixError};
use serde_json::{Value, json};
use tempfile::TempDir;

const BASE_TS_US: i64 = 1_708_012_200_000_000;

fn open(dir: &TempDir) -> Lix {
    Lix::open_as(dir.path(), Some("anna"))
        .unwrap()
        .with_clock(Box::new(ManualClock::new(BASE_TS_US)))
}

#[test]
fn open_without_init_fails() {
    let dir = TempDir::new().unwrap();
    let err = Lix::open(dir.path()).unwrap_err();
    assert!(matches!(err, LixError::NotInitialized(_)));
    assert_eq!(err.code(), ErrorCode::NotInitialized);
    assert!(err.hint().is_some());
}

#[test]
fn values_survive_reopen() {
    let dir = TempDir::new().unwrap();
    Lix::init(dir.path()).unwrap();
    assert!(dir.path().join(LIX_DIR).join(CONFIG_FILE).exists());

    let first = {
        let mut lix = open(&dir);
        lix.commit("add", vec![Edit::set("variant", "greeting", json!({"text": "hi"}))])
            .unwrap();
        lix.commit("drop", vec![Edit::delete("variant", "farewell")])
            .unwrap()
    };
    assert_eq!(first.commit.author, "anna");

    let lix = open(&dir);
    assert_eq!(
        lix.current_value("greeting").unwrap(),
        Some(json!({"text": "hi"}))
    );
    assert_eq!(lix.current_value("farewell").unwrap(), None);
    let log = lix.log().unwrap();
    assert_eq!(log.len(), 2);
    assert_eq!(log[0].id, first.commit.id);
    assert_eq!(log[1].id, first.commit.parent_ids[0]);
}

#[test]
fn init_twice_keeps_history() {
    let dir = TempDir::new().unwrap();
    let mut lix = Lix::init(dir.path()).unwrap();
    lix.set_author("anna");
    lix.commit("add", vec![Edit::set("variant", "e1", json!(1))])
        .unwrap();
    drop(lix);

    let again = Lix::init(dir.path()).unwrap();
    assert_eq!(again.current_value("e1").unwrap(), Some(json!(1)));
}

#[test]
fn identical_content_is_stored_once() {
    let dir = TempDir::new().unwrap();
    Lix::init(dir.path()).unwrap();
    let mut lix = open(&dir);
    let a = lix
        .commit("a", vec![Edit::set("variant", "e1", json!({"k": 1, "j": 2}))])
        .unwrap();
    let b = lix
        .commit("b", vec![Edit::set("variant", "e2", json!({"j": 2, "k": 1}))])
        .unwrap();
    assert_eq!(a.changes[0].snapshot_id, b.changes[0].snapshot_id);

    let count: i64 = lix
        .history()
        .connection()
        .query_row("SELECT COUNT(*) FROM snapshots", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 1);
}

#[test]
fn branches_persist_and_isolate() {
    let dir = TempDir::new().unwrap();
    Lix::init(dir.path()).unwrap();
    {
        let mut lix = open(&dir);
        lix.commit("base", vec![Edit::set("variant", "e1", json!("base"))])
            .unwrap();
        lix.create_branch("draft", None).unwrap();
        lix.switch_branch("draft").unwrap();
        lix.commit("draft", vec![Edit::set("variant", "e1", json!("draft"))])
            .unwrap();
    }

    let mut lix = open(&dir);
    assert_eq!(lix.history().active_branch().unwrap().name, "draft");
    assert_eq!(lix.current_value("e1").unwrap(), Some(json!("draft")));
    lix.switch_branch("main").unwrap();
    assert_eq!(lix.current_value("e1").unwrap(), Some(json!("base")));

    let names: Vec<String> = lix.branches().unwrap().into_iter().map(|b| b.name).collect();
    assert_eq!(names, vec!["draft".to_string(), "main".to_string()]);
    assert!(lix.switch_branch("nope").unwrap_err().is_not_found());
}

#[test]
fn fork_then_detect_divergence() {
    let origin_dir = TempDir::new().unwrap();
    let fork_dir = TempDir::new().unwrap();
    Lix::init(origin_dir.path()).unwrap();

    let mut origin = open(&origin_dir);
    origin
        .commit("base", vec![Edit::set("variant", "e1", json!("v0"))])
        .unwrap();
    let (fork, report) = origin.fork_to(fork_dir.path()).unwrap();
    assert_eq!(report.commits_copied, 1);
    drop(fork);

    let mut fork = open(&fork_dir);
    let theirs = fork
        .commit("fork edit", vec![Edit::set("variant", "e1", json!("foo"))])
        .unwrap();
    let ours = origin
        .commit("origin edit", vec![Edit::set("variant", "e1", json!("bar"))])
        .unwrap();

    let report = origin.detect_conflicts_from(fork.history()).unwrap();
    assert_eq!(report.conflicts.len(), 1);
    assert_eq!(report.conflicts[0].change_id, ours.changes[0].id);
    assert_eq!(report.conflicts[0].conflicting_change_id, theirs.changes[0].id);

    assert_eq!(origin.record_conflicts(&report.conflicts).unwrap(), 1);
    drop(origin);
    let origin = open(&origin_dir);
    assert_eq!(origin.conflicts().unwrap(), report.conflicts);
}

#[test]
fn detecting_against_itself_finds_nothing() {
    let dir = TempDir::new().unwrap();
    Lix::init(dir.path()).unwrap();
    let mut lix = open(&dir);
    lix.commit("base", vec![Edit::set("variant", "e1", json!("v0"))])
        .unwrap();

    let report = lix.detect_conflicts_from(lix.history()).unwrap();
    assert_eq!(report.candidates, 0);
    assert!(report.conflicts.is_empty());
}

#[test]
fn fork_into_populated_directory_is_rejected() {
    let a = TempDir::new().unwrap();
    let b = TempDir::new().unwrap();
    Lix::init(a.path()).unwrap();
    Lix::init(b.path()).unwrap();
    let mut other = open(&b);
    other
        .commit("x", vec![Edit::set("variant", "e1", json!(1))])
        .unwrap();

    let err = open(&a).fork_to(b.path()).unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidInput);
}

#[test]
fn configured_jsonl_exporter_receives_commits() {
    let dir = TempDir::new().unwrap();
    Lix::init(dir.path()).unwrap();
    fs::write(
        dir.path().join(LIX_DIR).join(CONFIG_FILE),
        "[export]\njsonl = \"exports/changes.jsonl\"\n",
    )
    .unwrap();

    let mut lix = open(&dir);
    let outcome = lix
        .commit(
            "two",
            vec![
                Edit::set("variant", "e1", json!("hi")),
                Edit::delete("variant", "e2"),
            ],
        )
        .unwrap();
    assert!(outcome.export.is_clean());
    assert_eq!(outcome.export.succeeded, vec!["jsonl".to_string()]);

    let body = fs::read_to_string(dir.path().join("exports").join("changes.jsonl")).unwrap();
    let lines: Vec<Value> = body
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["commit_id"], outcome.commit.id.as_str());
    assert_eq!(lines[0]["content"], "hi");
    assert!(lines[1]["snapshot_id"].is_null());
}

#[test]
fn configured_file_mirror_tracks_current_values() {
    let dir = TempDir::new().unwrap();
    Lix::init(dir.path()).unwrap();
    fs::write(
        dir.path().join(LIX_DIR).join(CONFIG_FILE),
        "[export]\nfiles = \"mirror\"\n",
    )
    .unwrap();

    let mut lix = open(&dir);
    let outcome = lix
        .commit(
            "seed",
            vec![
                Edit::set("variant", "greeting/en", json!({"text": "Hello"})),
                Edit::set("variant", "greeting_en", json!("other")),
            ],
        )
        .unwrap();
    assert_eq!(outcome.export.succeeded, vec!["file-mirror".to_string()]);

    lix.commit("drop", vec![Edit::delete("variant", "greeting_en")])
        .unwrap();

    let mirror = dir.path().join("mirror").join("variant");
    let kept: Value = serde_json::from_slice(&fs::read(mirror.join("greeting%2Fen.json")).unwrap()).unwrap();
    assert_eq!(kept["text"], "Hello");
    assert!(!mirror.join("greeting_en.json").exists());
}

#[test]
fn malformed_config_is_reported() {
    let dir = TempDir::new().unwrap();
    Lix::init(dir.path()).unwrap();
    fs::write(dir.path().join(LIX_DIR).join(CONFIG_FILE), "[storage\n").unwrap();
    let err = Lix::open(dir.path()).unwrap_err();
    assert_eq!(err.code(), ErrorCode::ConfigParseError);
}
