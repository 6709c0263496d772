use serde_json::{json, Value};
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

fn pose_wrap(cwd: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_pose-wrap"))
        .current_dir(cwd)
        .env_remove("RUST_LOG")
        .args(args)
        .output()
        .unwrap()
}

fn write(dir: &Path, name: &str, contents: &str) {
    let path = dir.join(name);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
}

fn read_json(path: &Path) -> Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn wraps_frames_into_session_file() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "A_a1_1280x720_0_keypoints.json", r#"{"x":1}"#);
    write(dir.path(), "A_a1_1280x720_1_keypoints.json", r#"{"x":2}"#);

    let out = pose_wrap(
        dir.path(),
        &[
            "-o",
            "out",
            "A_a1_1280x720_0_keypoints.json",
            "A_a1_1280x720_1_keypoints.json",
        ],
    );

    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    assert_eq!(
        read_json(&dir.path().join("out/A.json")),
        json!([{"id": "A", "camera": "a1", "width": 1280, "height": 720, "frames": {"0": {"x": 1}, "1": {"x": 2}}}])
    );
}

#[test]
fn skipped_only_inputs_still_exit_zero() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "not_a_match.txt", "{}");

    let out = pose_wrap(dir.path(), &["-o", "out", "not_a_match.txt"]);

    assert_eq!(out.status.code(), Some(0));
    assert_eq!(std::fs::read_dir(dir.path().join("out")).unwrap().count(), 0);
    assert!(String::from_utf8_lossy(&out.stderr).contains("no wrapper files were written"));
}

#[test]
fn regex_missing_groups_fails_before_processing() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "S_a_1x1_0_keypoints.json", "{}");

    let out = pose_wrap(
        dir.path(),
        &["-o", "out", "-r", r"(?P<id>.+)_keypoints\.json", "S_a_1x1_0_keypoints.json"],
    );

    assert_eq!(out.status.code(), Some(2));
    assert!(!dir.path().join("out").exists());
}

#[test]
fn custom_regex_is_used() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "s1-left-800-600-9.json", r#"{"k":true}"#);

    let out = pose_wrap(
        dir.path(),
        &[
            "-r",
            r"(?P<id>\w+)-(?P<camera>\w+)-(?P<width>\d+)-(?P<height>\d+)-(?P<frame>\d+)\.json$",
            "s1-left-800-600-9.json",
        ],
    );

    assert!(out.status.success());
    let wrapper = read_json(&dir.path().join("s1.json"));
    assert_eq!(wrapper[0]["camera"], "left");
    assert_eq!(wrapper[0]["frames"]["9"], json!({"k": true}));
}

#[test]
fn dirname_preset_and_quoted_glob() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "S7_b_640x480/clip_000000000000_keypoints.json", "{}");
    write(dir.path(), "S7_b_640x480/clip_000000000001_keypoints.json", "{}");

    let out = pose_wrap(
        dir.path(),
        &["-p", "dirname", "-o", "out", "S7_b_640x480/*_keypoints.json"],
    );

    assert!(out.status.success());
    let wrapper = read_json(&dir.path().join("out/S7.json"));
    assert_eq!(wrapper[0]["width"], 640);
    assert_eq!(wrapper[0]["frames"].as_object().unwrap().len(), 2);
}

#[test]
fn config_file_sets_suffix_and_explicit_missing_config_fails() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "S_a_1x1_0_keypoints.json", "{}");
    write(
        dir.path(),
        "pose-wrap.toml",
        "[output]\ndir = \"wrapped\"\nsuffix = \".openpose.json\"\n",
    );

    let out = pose_wrap(dir.path(), &["S_a_1x1_0_keypoints.json"]);
    assert!(out.status.success());
    assert!(dir.path().join("wrapped/S.openpose.json").is_file());

    let out = pose_wrap(dir.path(), &["-c", "missing.toml", "S_a_1x1_0_keypoints.json"]);
    assert_eq!(out.status.code(), Some(2));
}

#[test]
fn output_dir_blocked_by_file_is_config_error() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "S_a_1x1_0_keypoints.json", "{}");
    write(dir.path(), "blocker", "");

    let out = pose_wrap(dir.path(), &["-o", "blocker/out", "S_a_1x1_0_keypoints.json"]);

    assert_eq!(out.status.code(), Some(2));
}
