//! Tool configuration.
//!
//! A fixed set of typed options with defaults, overlaid from TOML files in
//! well-known locations. Later files win; missing files are skipped; unknown
//! keys are ignored.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_CIPHER: &str = "AES256";
pub const DEFAULT_KEY_LENGTH: usize = 64;
pub const DEFAULT_PASSWORD_GENERATOR: &str = "pwgen -nc 12 10";

#[derive(Debug, Clone)]
pub struct Config {
    /// Cipher algorithm handed to the engine's `--cipher-algo`.
    pub cipher: String,
    /// Master key length in bytes.
    pub key_length: usize,
    /// Shell command producing password candidates, one per word.
    pub password_generator: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            cipher: DEFAULT_CIPHER.to_string(),
            key_length: DEFAULT_KEY_LENGTH,
            password_generator: DEFAULT_PASSWORD_GENERATOR.to_string(),
        }
    }
}

/// Partial settings parsed from one file.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
struct Overlay {
    cipher: Option<String>,
    key_length: Option<usize>,
    password_generator: Option<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("cannot parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl Config {
    /// Defaults overlaid with the user-level file, then the store-local one.
    pub fn load(root: &Path) -> Result<Config, ConfigError> {
        let mut config = Config::default();
        for path in config_files(root) {
            if !path.is_file() {
                continue;
            }
            let text = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
                path: path.clone(),
                source,
            })?;
            let overlay: Overlay =
                toml::from_str(&text).map_err(|source| ConfigError::Parse {
                    path: path.clone(),
                    source,
                })?;
            config.apply(overlay);
        }
        Ok(config)
    }

    fn apply(&mut self, overlay: Overlay) {
        if let Some(cipher) = overlay.cipher {
            self.cipher = cipher;
        }
        if let Some(key_length) = overlay.key_length {
            self.key_length = key_length;
        }
        if let Some(password_generator) = overlay.password_generator {
            self.password_generator = password_generator;
        }
    }
}

fn config_files(root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    if let Some(dir) = dirs::config_dir() {
        files.push(dir.join("stash").join("config.toml"));
    }
    files.push(root.join(".stash").join("config.toml"));
    files
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.cipher, "AES256");
        assert_eq!(config.key_length, 64);
        assert_eq!(config.password_generator, "pwgen -nc 12 10");
    }

    #[test]
    fn store_local_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let stash_dir = dir.path().join(".stash");
        fs::create_dir_all(&stash_dir).unwrap();
        fs::write(
            stash_dir.join("config.toml"),
            "cipher = \"TWOFISH\"\nkey-length = 32\n",
        )
        .unwrap();

        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.cipher, "TWOFISH");
        assert_eq!(config.key_length, 32);
        // Untouched keys keep their defaults.
        assert_eq!(config.password_generator, "pwgen -nc 12 10");
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let stash_dir = dir.path().join(".stash");
        fs::create_dir_all(&stash_dir).unwrap();
        fs::write(stash_dir.join("config.toml"), "future-option = true\n").unwrap();

        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.cipher, "AES256");
    }

    #[test]
    fn malformed_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let stash_dir = dir.path().join(".stash");
        fs::create_dir_all(&stash_dir).unwrap();
        fs::write(stash_dir.join("config.toml"), "cipher = [not toml").unwrap();

        let err = Config::load(dir.path()).expect_err("parse error expected");
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn missing_files_mean_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.key_length, 64);
    }
}
