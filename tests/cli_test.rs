//! CLI end-to-end tests
//!
//! Tests for the flavmux command-line interface against generated fixtures.

use assert_cmd::prelude::*;
use flavmux_media::{
    testing::{sound_track, video_track, FixtureBuilder},
    BoxTree, ComposeOptions, Composer, MediaKind, MemorySink,
};
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use tempfile::{tempdir, TempDir};

/// Get a command for the flavmux binary
#[allow(deprecated)]
fn flavmux_cmd() -> Command {
    Command::cargo_bin("flavmux").unwrap()
}

/// Write a two-track fixture (video and sound) into a fresh directory.
fn fixture_file() -> (TempDir, PathBuf) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("input.mp4");
    let data = FixtureBuilder::new()
        .track(video_track(2))
        .track(sound_track(2))
        .build();
    fs::write(&path, data).unwrap();
    (dir, path)
}

fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_cli_no_args_shows_help() {
    let mut cmd = flavmux_cmd();
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_cli_version_command() {
    let mut cmd = flavmux_cmd();
    cmd.arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("flavmux"))
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_cli_codecs_lists_builtins() {
    let mut cmd = flavmux_cmd();
    cmd.arg("codecs")
        .assert()
        .success()
        .stdout(predicate::str::contains("raw5"))
        .stdout(predicate::str::contains("rmix"));
}

#[test]
fn test_cli_inspect_text() {
    let (_dir, path) = fixture_file();

    let mut cmd = flavmux_cmd();
    cmd.arg("inspect")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("moov"))
        .stdout(predicate::str::contains("mdat"))
        .stdout(predicate::str::contains("Tracks: 2"))
        .stdout(predicate::str::contains("avc1"));
}

#[test]
fn test_cli_inspect_json() {
    let (_dir, path) = fixture_file();

    let output = flavmux_cmd()
        .args(["inspect", "--json"])
        .arg(&path)
        .output()
        .unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["boxes"][0]["box_type"], "ftyp");
    let tracks = json["tracks"].as_array().unwrap();
    assert_eq!(tracks.len(), 2);
    assert_eq!(tracks[0]["kind"], "video");
    assert_eq!(tracks[0]["chunks"], 2);
    assert_eq!(tracks[1]["kind"], "sound");
    assert_eq!(tracks[1]["samples"], 6);
}

#[test]
fn test_cli_inspect_missing_file() {
    let dir = tempdir().unwrap();

    let mut cmd = flavmux_cmd();
    cmd.arg("inspect")
        .arg(dir.path().join("nope.mp4"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn test_cli_inspect_rejects_garbage() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("garbage.mp4");
    fs::write(&path, b"not an mp4 file").unwrap();

    let mut cmd = flavmux_cmd();
    cmd.arg("inspect").arg(&path).assert().failure();
}

#[test]
fn test_cli_compose_matches_library() {
    let (dir, path) = fixture_file();
    let output = dir.path().join("out.mp4");

    let mut cmd = flavmux_cmd();
    cmd.arg("compose")
        .arg(&path)
        .arg("-o")
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("Criteria track: vide"))
        .stdout(predicate::str::contains("Laid out 4 chunks"));

    let sink = Arc::new(MemorySink::new());
    let tree = BoxTree::open(&path, sink.as_ref()).unwrap();
    let mut composer = Composer::new(tree, ComposeOptions::default(), sink).unwrap();
    composer.compose_all().unwrap();

    assert_eq!(fs::read(&output).unwrap(), composer.tree().to_bytes().to_vec());
}

#[test]
fn test_cli_compose_in_place_with_kinds() {
    let (_dir, path) = fixture_file();

    let mut cmd = flavmux_cmd();
    cmd.args(["compose", "--kinds", "soun"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Criteria track: soun"))
        .stdout(predicate::str::contains("Laid out 2 chunks"));

    let tree = BoxTree::open(&path, &MemorySink::new()).unwrap();
    assert_eq!(tree.mdat().unwrap().payload.len(), 24);
}

#[test]
fn test_cli_compose_rejects_unknown_kind() {
    let (_dir, path) = fixture_file();

    let mut cmd = flavmux_cmd();
    cmd.args(["compose", "--kinds", "smel"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("smel"));
}

#[test]
fn test_cli_add_track_then_extract() {
    let (dir, path) = fixture_file();
    let frames = write_file(dir.path(), "frames.json", "[[1,2,3,4,5],[6,7,8,9,10]]");
    let output = dir.path().join("tasty.mp4");

    let mut cmd = flavmux_cmd();
    cmd.args(["add-track", "--kind", "taste", "--codec", "raw5", "--fps", "2"])
        .arg("--frames")
        .arg(&frames)
        .arg(&path)
        .arg("-o")
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("Added tast track with 2 frames"));

    let tree = BoxTree::open(&output, &MemorySink::new()).unwrap();
    let composer = Composer::new(tree, ComposeOptions::default(), Arc::new(MemorySink::new())).unwrap();
    assert_eq!(
        composer.kinds(),
        vec![MediaKind::Video, MediaKind::Sound, MediaKind::Taste]
    );

    let mut cmd = flavmux_cmd();
    cmd.args(["extract", "--kind", "tast"])
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("[[1,2,3,4,5],[6,7,8,9,10]]"));
}

#[test]
fn test_cli_add_track_uint16() {
    let (dir, path) = fixture_file();
    let frames = write_file(dir.path(), "frames.json", "[[1000,2],[65535]]");

    let mut cmd = flavmux_cmd();
    cmd.args(["add-track", "--kind", "scnt", "--codec", "rmix", "--dtype", "uint16"])
        .arg("--frames")
        .arg(&frames)
        .arg(&path)
        .assert()
        .success();

    let mut cmd = flavmux_cmd();
    cmd.args(["extract", "--kind", "scent"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("[[1000,2],[65535]]"));
}

#[test]
fn test_cli_add_track_bad_frame_leaves_file_alone() {
    let (dir, path) = fixture_file();
    let before = fs::read(&path).unwrap();
    let frames = write_file(dir.path(), "frames.json", "[[1,2,3,4]]");

    let mut cmd = flavmux_cmd();
    cmd.args(["add-track", "--kind", "tast", "--codec", "raw5"])
        .arg("--frames")
        .arg(&frames)
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("expected 5 elements"));

    assert_eq!(fs::read(&path).unwrap(), before);
}

#[test]
fn test_cli_add_track_value_out_of_range() {
    let (dir, path) = fixture_file();
    let frames = write_file(dir.path(), "frames.json", "[[1,2,3,4,300]]");

    let mut cmd = flavmux_cmd();
    cmd.args(["add-track", "--kind", "tast", "--codec", "raw5"])
        .arg("--frames")
        .arg(&frames)
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("out of range"));
}

#[test]
fn test_cli_add_existing_kind_fails() {
    let (dir, path) = fixture_file();
    let frames = write_file(dir.path(), "frames.json", "[[1,2,3,4,5]]");

    let mut cmd = flavmux_cmd();
    cmd.args(["add-track", "--kind", "video", "--codec", "raw5"])
        .arg("--frames")
        .arg(&frames)
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("already"));
}

#[test]
fn test_cli_extract_absent_kind() {
    let (_dir, path) = fixture_file();

    let mut cmd = flavmux_cmd();
    cmd.args(["extract", "--kind", "scnt"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("no scnt track"));
}

#[test]
fn test_cli_validate_config() {
    let dir = tempdir().unwrap();
    let config = write_file(
        dir.path(),
        "flavmux.toml",
        "[compose]\npriority = [\"tast\", \"vide\"]\n\n[ingest]\nchunk_samples = 10\n",
    );

    let mut cmd = flavmux_cmd();
    cmd.arg("validate")
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid"))
        .stdout(predicate::str::contains("Priority: tast, vide"))
        .stdout(predicate::str::contains("Chunk samples: 10"));
}

#[test]
fn test_cli_validate_invalid_config() {
    let dir = tempdir().unwrap();
    let config = write_file(dir.path(), "flavmux.toml", "[ingest]\nchunk_samples = 0\n");

    let mut cmd = flavmux_cmd();
    cmd.arg("validate").arg(&config).assert().failure();
}

#[test]
fn test_cli_config_priority_changes_criteria() {
    let (dir, path) = fixture_file();
    let config = write_file(dir.path(), "flavmux.toml", "[compose]\npriority = [\"soun\"]\n");

    let mut cmd = flavmux_cmd();
    cmd.arg("--config")
        .arg(&config)
        .arg("compose")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Criteria track: soun"));
}

#[test]
fn test_cli_inspect_and_extract_honour_config() {
    let (dir, path) = fixture_file();
    let config = write_file(dir.path(), "flavmux.toml", "[compose]\npriority = [\"smel\"]\n");

    for args in [vec!["inspect"], vec!["extract", "--kind", "vide"]] {
        let mut cmd = flavmux_cmd();
        cmd.arg("--config")
            .arg(&config)
            .args(&args)
            .arg(&path)
            .assert()
            .failure()
            .stderr(predicate::str::contains("smel"));
    }

    let config = write_file(dir.path(), "streaming.toml", "[compose]\nstreaming = true\n");
    let mut cmd = flavmux_cmd();
    cmd.arg("--config")
        .arg(&config)
        .arg("inspect")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Tracks: 2"));
}

#[test]
fn test_cli_add_track_output_reopens() {
    let (dir, path) = fixture_file();
    let frames = write_file(dir.path(), "frames.json", "[[1,2,3,4,5]]");

    let mut cmd = flavmux_cmd();
    cmd.args(["add-track", "--kind", "tast", "--codec", "raw5"])
        .arg("--frames")
        .arg(&frames)
        .arg(&path)
        .assert()
        .success();

    let mut cmd = flavmux_cmd();
    cmd.arg("inspect")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Tracks: 3"))
        .stdout(predicate::str::contains("raw5"));
}
