//! The secret store: master-key lifecycle and entry access.
//!
//! Entries are plaintext-named files under the root whose content is engine
//! ciphertext of the secret under the master key. The master key is a long
//! random byte string, hex-encoded and sealed with the user's passphrase at
//! `.stash/key`; it exists unsealed only in the memory of the command that
//! unlocked it.

use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;
use tracing::debug;
use zeroize::{Zeroize, Zeroizing};

use crate::config::{Config, ConfigError};
use crate::crypto::{CryptoError, SecretCipher};
use crate::generator;
use crate::hooks;
use crate::prompt::PassphraseSource;

const INIT_MESSAGE: &str = "\
Please pick a master passphrase. It is used to encrypt a very long
random key, which in turn is used to encrypt all the private data in
this directory.

Make sure you remember the master passphrase and that it's strong
enough for your privacy needs.
";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("The master key already exists")]
    AlreadyInitialized,
    #[error("Run `stash init` first")]
    NotInitialized,
    #[error("No such directory: {}", .0.display())]
    NoSuchRoot(PathBuf),
    #[error("File does not exist: {0}")]
    MissingEntry(String),
    #[error("The following files do not exist: {}", .0.join(", "))]
    MissingEntries(Vec<String>),
    #[error("Target is a directory: {0}")]
    TargetIsDirectory(String),
    #[error("Cannot create directory: {0}")]
    CannotCreateDirectory(String),
    #[error("Empty passphrase is not allowed")]
    EmptyPassphrase,
    #[error("Inputs did not match")]
    PassphraseMismatch,
    #[error("Unable to unlock the encryption key")]
    UnlockFailed,
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Well-known locations inside a store rooted at `root`.
pub struct StorePaths {
    pub root: PathBuf,
}

impl StorePaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        StorePaths { root: root.into() }
    }

    pub fn stash_dir(&self) -> PathBuf {
        self.root.join(".stash")
    }

    pub fn key_file(&self) -> PathBuf {
        self.stash_dir().join("key")
    }

    pub fn hooks_dir(&self) -> PathBuf {
        self.stash_dir().join("hooks")
    }

    pub fn entry(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

/// The unsealed master key. Lives only in memory, wiped on drop.
pub struct MasterKey(Zeroizing<Vec<u8>>);

impl MasterKey {
    fn new(bytes: Vec<u8>) -> Self {
        MasterKey(Zeroizing::new(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterKey(..)")
    }
}

/// One store with its collaborators injected: the cipher doing the actual
/// cryptography and the source of interactive passphrases.
pub struct Store<'a> {
    paths: StorePaths,
    config: Config,
    cipher: &'a dyn SecretCipher,
    prompt: &'a mut dyn PassphraseSource,
}

impl<'a> Store<'a> {
    pub fn open(
        root: impl Into<PathBuf>,
        config: Config,
        cipher: &'a dyn SecretCipher,
        prompt: &'a mut dyn PassphraseSource,
    ) -> Result<Self, StoreError> {
        let root = root.into();
        if !root.is_dir() {
            return Err(StoreError::NoSuchRoot(root));
        }
        Ok(Store {
            paths: StorePaths::new(root),
            config,
            cipher,
            prompt,
        })
    }

    pub fn paths(&self) -> &StorePaths {
        &self.paths
    }

    pub fn entry_exists(&self, entry: &str) -> bool {
        self.paths.entry(entry).exists()
    }

    /// Generate and seal a fresh master key. Fails if one already exists.
    pub fn init(&mut self) -> Result<(), StoreError> {
        if self.paths.key_file().exists() {
            return Err(StoreError::AlreadyInitialized);
        }

        println!("{INIT_MESSAGE}");
        let passphrase =
            self.read_new_passphrase("Enter the master passphrase: ", "Confirm: ")?;

        println!();
        print!(
            "Generating a master key ({} bits)... ",
            self.config.key_length * 8
        );
        io::stdout().flush()?;

        let mut key = vec![0u8; self.config.key_length];
        OsRng.fill_bytes(&mut key);
        let key_hex = Zeroizing::new(hex::encode(&key));
        key.zeroize();

        if let Some(parent) = self.paths.key_file().parent() {
            fs::create_dir_all(parent)?;
        }
        self.cipher
            .encrypt(&self.paths.key_file(), passphrase.as_bytes(), key_hex.as_bytes())?;
        println!("done");

        hooks::install_samples(&self.paths.hooks_dir())?;
        Ok(())
    }

    /// Decrypt the named entries. Existence of every entry is checked before
    /// the passphrase prompt; a failing entry yields `None` and the rest are
    /// still attempted.
    pub fn get(
        &mut self,
        entries: &[String],
    ) -> Result<Vec<(String, Option<Vec<u8>>)>, StoreError> {
        self.ensure_entries_exist(entries)?;
        let key = self.unlock()?;

        let mut results = Vec::with_capacity(entries.len());
        for entry in entries {
            let path = self.paths.entry(entry);
            let secret = match self.cipher.decrypt(&path, key.as_bytes()) {
                Ok(secret) if !secret.is_empty() => Some(secret),
                Ok(_) => None,
                Err(err) => {
                    debug!("decrypting {entry} failed: {err}");
                    None
                }
            };
            results.push((entry.clone(), secret));
        }
        Ok(results)
    }

    /// Create or overwrite the named entries. Target validation and parent
    /// directory creation happen before the passphrase prompt.
    pub fn set(&mut self, entries: &[String]) -> Result<(), StoreError> {
        for entry in entries {
            let path = self.paths.entry(entry);
            if let Some(parent) = Path::new(entry).parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(self.paths.root.join(parent)).map_err(|_| {
                        StoreError::CannotCreateDirectory(parent.display().to_string())
                    })?;
                }
            }
            if path.is_dir() {
                return Err(StoreError::TargetIsDirectory(entry.clone()));
            }
        }

        let key = self.unlock()?;
        println!();

        for entry in entries {
            let secret = self.read_secret_for(entry)?;
            self.cipher
                .encrypt(&self.paths.entry(entry), key.as_bytes(), &secret)?;
            hooks::run_post_set(&self.paths.root, &self.paths.hooks_dir(), entry);
            println!();
        }
        Ok(())
    }

    /// Unseal the master key with an interactively supplied passphrase.
    pub fn unlock(&mut self) -> Result<MasterKey, StoreError> {
        if !self.paths.key_file().is_file() {
            return Err(StoreError::NotInitialized);
        }
        let passphrase = self.read_passphrase("Enter the master passphrase: ")?;
        let key = match self
            .cipher
            .decrypt(&self.paths.key_file(), passphrase.as_bytes())
        {
            Ok(key) => key,
            // Wrong passphrase and a corrupt key file are deliberately
            // indistinguishable here.
            Err(CryptoError::EngineFailed { .. }) => return Err(StoreError::UnlockFailed),
            Err(err) => return Err(err.into()),
        };
        if key.is_empty() {
            return Err(StoreError::UnlockFailed);
        }
        Ok(MasterKey::new(key))
    }

    fn ensure_entries_exist(&self, entries: &[String]) -> Result<(), StoreError> {
        let missing: Vec<String> = entries
            .iter()
            .filter(|entry| !self.paths.entry(entry).is_file())
            .cloned()
            .collect();
        match missing.as_slice() {
            [] => Ok(()),
            [one] => Err(StoreError::MissingEntry(one.clone())),
            _ => Err(StoreError::MissingEntries(missing)),
        }
    }

    fn read_passphrase(&mut self, prompt: &str) -> Result<Zeroizing<String>, StoreError> {
        let input = Zeroizing::new(self.prompt.read_passphrase(prompt)?);
        if input.is_empty() {
            return Err(StoreError::EmptyPassphrase);
        }
        Ok(input)
    }

    fn read_new_passphrase(
        &mut self,
        prompt: &str,
        confirm: &str,
    ) -> Result<Zeroizing<String>, StoreError> {
        let first = self.read_passphrase(prompt)?;
        let second = Zeroizing::new(self.prompt.read_passphrase(confirm)?);
        if *first != *second {
            return Err(StoreError::PassphraseMismatch);
        }
        Ok(first)
    }

    /// Prompt for the new secret of one entry, offering generated candidates
    /// when the configured generator produces any. Entering the number of a
    /// candidate stores that candidate's bytes verbatim; any other input is
    /// the secret itself, confirmed by double entry.
    fn read_secret_for(&mut self, entry: &str) -> Result<Zeroizing<Vec<u8>>, StoreError> {
        let candidates = generator::candidates(&self.config.password_generator);
        if candidates.is_empty() {
            let secret = self
                .read_new_passphrase(&format!("Type a new secret for {entry}: "), "Confirm: ")?;
            return Ok(Zeroizing::new(secret.as_bytes().to_vec()));
        }

        for (index, candidate) in candidates.iter().enumerate() {
            println!("{}. {}", index, String::from_utf8_lossy(candidate));
        }
        println!();

        let input = self.read_passphrase(&format!(
            "Select a number from the list or type a new secret for {entry}: "
        ))?;
        if let Ok(index) = input.parse::<usize>() {
            if let Some(candidate) = candidates.get(index) {
                return Ok(Zeroizing::new(candidate.clone()));
            }
        }

        let confirm = Zeroizing::new(self.prompt.read_passphrase("Confirm: ")?);
        if *input != *confirm {
            return Err(StoreError::PassphraseMismatch);
        }
        Ok(Zeroizing::new(input.as_bytes().to_vec()))
    }
}
