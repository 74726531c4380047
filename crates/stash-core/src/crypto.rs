//! Symmetric encryption and decryption through the gpg engine.
//!
//! Two operations, each one engine invocation with a fixed channel topology.
//! The passphrase only ever travels over the dedicated passphrase channel,
//! never on the command line and never through the environment. Output is
//! always armored so the stored files stay diff-friendly text.

use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::process::ExitStatus;

use thiserror::Error;
use tracing::debug;

use crate::engine::{Attachment, Channel, EngineError, Gpg};

#[derive(Debug, Error)]
pub enum CryptoError {
    /// The engine process could not be started or driven at all.
    #[error(transparent)]
    Engine(#[from] EngineError),
    /// The engine ran and exited non-zero. A wrong passphrase and corrupt
    /// input land here indistinguishably; the diagnostic text is whatever
    /// the engine printed and is never parsed.
    #[error("encryption engine failed (exit code {code})")]
    EngineFailed { code: i32, diagnostic: String },
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// The seam between the store and the engine. The store only ever needs
/// these two operations, so tests can swap in a double and count calls.
pub trait SecretCipher {
    /// Encrypt `plaintext` under `passphrase` into `dest`. The destination
    /// is either fully replaced or left untouched, never half-written.
    fn encrypt(&self, dest: &Path, passphrase: &[u8], plaintext: &[u8])
        -> Result<(), CryptoError>;

    /// Decrypt `source` with `passphrase`, returning the plaintext bytes.
    fn decrypt(&self, source: &Path, passphrase: &[u8]) -> Result<Vec<u8>, CryptoError>;
}

/// The real engine: symmetric gpg with a configurable cipher algorithm.
pub struct GpgCipher {
    program: PathBuf,
    cipher_algo: String,
}

impl GpgCipher {
    pub fn new(cipher_algo: impl Into<String>) -> Self {
        Self::with_program("gpg", cipher_algo)
    }

    pub fn with_program(program: impl Into<PathBuf>, cipher_algo: impl Into<String>) -> Self {
        GpgCipher {
            program: program.into(),
            cipher_algo: cipher_algo.into(),
        }
    }

    fn encrypt_to(
        &self,
        out: File,
        passphrase: &[u8],
        plaintext: &[u8],
    ) -> Result<(), CryptoError> {
        let mut diagnostic = tempfile::tempfile()?;
        let mut gpg = Gpg::with_program(
            &self.program,
            ["--armor", "--cipher-algo", self.cipher_algo.as_str()],
        );
        gpg.spawn(
            &["--symmetric"],
            &[Channel::Stdin, Channel::Passphrase],
            vec![
                (Channel::Stdout, Attachment::File(out)),
                (Channel::Stderr, Attachment::File(diagnostic.try_clone()?)),
            ],
        )?;

        // The passphrase goes first and its channel is closed before any
        // payload I/O; gpg reads it before touching stdin.
        let mut secret = gpg.take(Channel::Passphrase)?;
        secret.write_all(passphrase)?;
        drop(secret);

        let mut stdin = gpg.take(Channel::Stdin)?;
        stdin.write_all(plaintext)?;
        drop(stdin);

        let status = gpg.wait()?;
        if !status.success() {
            return Err(engine_failed(status, &mut diagnostic));
        }
        Ok(())
    }
}

impl SecretCipher for GpgCipher {
    fn encrypt(
        &self,
        dest: &Path,
        passphrase: &[u8],
        plaintext: &[u8],
    ) -> Result<(), CryptoError> {
        // Ciphertext is staged next to the destination and renamed over it
        // only on success, so a failed run leaves the old content intact.
        let staging = staging_path(dest);
        let out = File::create(&staging)?;
        match self.encrypt_to(out, passphrase, plaintext) {
            Ok(()) => fs::rename(&staging, dest).map_err(|err| {
                let _ = fs::remove_file(&staging);
                CryptoError::Io(err)
            }),
            Err(err) => {
                let _ = fs::remove_file(&staging);
                Err(err)
            }
        }
    }

    fn decrypt(&self, source: &Path, passphrase: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let source = File::open(source)?;
        let mut diagnostic = tempfile::tempfile()?;
        let mut gpg = Gpg::with_program(&self.program, ["--armor"]);
        gpg.spawn(
            &["--decrypt"],
            &[Channel::Stdout, Channel::Passphrase],
            vec![
                (Channel::Stdin, Attachment::File(source)),
                (Channel::Stderr, Attachment::File(diagnostic.try_clone()?)),
            ],
        )?;

        let mut secret = gpg.take(Channel::Passphrase)?;
        secret.write_all(passphrase)?;
        drop(secret);

        let mut plaintext = Vec::new();
        gpg.take(Channel::Stdout)?.read_to_end(&mut plaintext)?;

        let status = gpg.wait()?;
        if !status.success() {
            return Err(engine_failed(status, &mut diagnostic));
        }
        Ok(plaintext)
    }
}

fn engine_failed(status: ExitStatus, diagnostic: &mut File) -> CryptoError {
    let mut text = String::new();
    let _ = diagnostic.seek(SeekFrom::Start(0));
    let _ = diagnostic.read_to_string(&mut text);
    let text = text.trim().to_string();
    debug!(%status, "engine diagnostic: {text}");
    CryptoError::EngineFailed {
        code: status.code().unwrap_or(-1),
        diagnostic: text,
    }
}

fn staging_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}
