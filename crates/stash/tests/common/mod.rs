//! Shared fixture: a temp store root plus a fake `gpg` on PATH.

#![allow(dead_code)]

use std::fs;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use tempfile::TempDir;

/// Minimal stand-in for gpg honoring the invocation contract the tool
/// relies on: `--batch --no-tty`, `--symmetric`/`--decrypt`,
/// `--passphrase-fd N`, `--cipher-algo`. "Ciphertext" is a passphrase-tagged
/// header plus the payload, which makes wrong-passphrase decryption fail
/// with a non-zero exit just like the real engine.
const FAKE_GPG: &str = r#"#!/bin/sh
mode=
fd=
while [ $# -gt 0 ]; do
    case "$1" in
        --symmetric) mode=encrypt ;;
        --decrypt) mode=decrypt ;;
        --passphrase-fd) shift; fd="$1" ;;
        --cipher-algo) shift ;;
    esac
    shift
done
if [ -z "$mode" ] || [ -z "$fd" ]; then
    echo "fake-gpg: bad invocation" >&2
    exit 2
fi
pass=$(eval "cat <&$fd")
case "$mode" in
encrypt)
    printf 'FAKEGPG:%s\n' "$pass"
    cat
    ;;
decrypt)
    IFS= read -r header
    if [ "$header" != "FAKEGPG:$pass" ]; then
        echo "fake-gpg: decryption failed: No secret key" >&2
        exit 2
    fi
    cat
    ;;
esac
"#;

pub struct TestStore {
    dir: TempDir,
    pub root: PathBuf,
    bin_dir: PathBuf,
}

impl TestStore {
    pub fn new() -> TestStore {
        let dir = TempDir::new().expect("tempdir");
        let root = dir.path().join("store");
        fs::create_dir(&root).unwrap();
        let bin_dir = dir.path().join("bin");
        fs::create_dir(&bin_dir).unwrap();
        write_executable(&bin_dir.join("gpg"), FAKE_GPG);
        TestStore { dir, root, bin_dir }
    }

    /// Run the stash binary against this store, feeding `stdin` to the
    /// prompts. The fake gpg is first on PATH and the user config dir is
    /// pointed into the fixture so the host machine can't leak in.
    pub fn run(&self, args: &[&str], stdin: &str) -> Output {
        let path = format!(
            "{}:{}",
            self.bin_dir.display(),
            std::env::var("PATH").unwrap_or_default()
        );
        let mut child = Command::new(env!("CARGO_BIN_EXE_stash"))
            .args(args)
            .env("PATH", path)
            .env("STASH_DIR", &self.root)
            .env("XDG_CONFIG_HOME", self.dir.path().join("xdg"))
            .env("HOME", self.dir.path().join("home"))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .expect("spawn stash");
        if !stdin.is_empty() {
            // The child may legitimately exit before reading everything.
            let _ = child.stdin.take().unwrap().write_all(stdin.as_bytes());
        }
        child.wait_with_output().expect("wait for stash")
    }

    /// Initialize the store and pin the password generator to a command
    /// that yields no candidates, so `set` prompts deterministically.
    pub fn init(&self, passphrase: &str) {
        let output = self.run(&["init"], &format!("{passphrase}\n{passphrase}\n"));
        assert!(
            output.status.success(),
            "init failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        self.write_config("password-generator = \"false\"\n");
    }

    pub fn write_config(&self, contents: &str) {
        let stash_dir = self.root.join(".stash");
        fs::create_dir_all(&stash_dir).unwrap();
        fs::write(stash_dir.join("config.toml"), contents).unwrap();
    }

    pub fn set_secret(&self, entry: &str, passphrase: &str, secret: &str) {
        let output = self.run(
            &["set", entry],
            &format!("{passphrase}\n{secret}\n{secret}\n"),
        );
        assert!(
            output.status.success(),
            "set failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
    }
}

pub fn write_executable(path: &Path, body: &str) {
    fs::write(path, body).unwrap();
    let mut perms = fs::metadata(path).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms).unwrap();
}

pub fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

pub fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}
