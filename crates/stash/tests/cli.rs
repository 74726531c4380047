mod common;

use common::{stderr, stdout, TestStore};

#[test]
fn no_arguments_is_a_usage_error() {
    let store = TestStore::new();
    let output = store.run(&[], "");
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn unknown_flag_is_a_usage_error() {
    let store = TestStore::new();
    let output = store.run(&["--bogus"], "");
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn get_without_files_is_a_usage_error() {
    let store = TestStore::new();
    let output = store.run(&["get"], "");
    assert_eq!(output.status.code(), Some(2));

    let output = store.run(&["set"], "");
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn version_is_printed() {
    let store = TestStore::new();
    let output = store.run(&["--version"], "");
    assert!(output.status.success());
    assert!(stdout(&output).starts_with("stash "));
}

#[test]
fn help_mentions_the_subcommands() {
    let store = TestStore::new();
    let output = store.run(&["--help"], "");
    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.contains("init"));
    assert!(out.contains("get"));
    assert!(out.contains("set"));
}

#[test]
fn dir_flag_overrides_the_environment() {
    let store = TestStore::new();
    let other = store.root.parent().unwrap().join("other");
    std::fs::create_dir(&other).unwrap();

    // STASH_DIR points at `store.root`; `-C` must win and leave it empty.
    let output = store.run(
        &["-C", other.to_str().unwrap(), "init"],
        "hunter2\nhunter2\n",
    );
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(other.join(".stash/key").is_file());
    assert!(!store.root.join(".stash/key").exists());
}

#[test]
fn nonexistent_root_is_an_operational_error() {
    let store = TestStore::new();
    let missing = store.root.parent().unwrap().join("nowhere");

    let output = store.run(&["-C", missing.to_str().unwrap(), "get", "entry"], "");
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("Error: No such directory: "));
}

#[test]
fn missing_engine_is_reported_not_a_panic() {
    use std::io::Write;

    // No fake gpg on PATH at all: launching the engine must surface as an
    // ordinary operational error.
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("store");
    std::fs::create_dir(&root).unwrap();

    let mut child = std::process::Command::new(env!("CARGO_BIN_EXE_stash"))
        .args(["init"])
        .env("PATH", "")
        .env("STASH_DIR", &root)
        .env("XDG_CONFIG_HOME", dir.path().join("xdg"))
        .env("HOME", dir.path().join("home"))
        .stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .spawn()
        .expect("spawn stash");
    let _ = child
        .stdin
        .take()
        .unwrap()
        .write_all(b"hunter2\nhunter2\n");
    let output = child.wait_with_output().expect("wait for stash");

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("failed to launch `gpg`"));
}
