//! stash-core - the guts of the stash secret store.
//!
//! Secrets live as individually encrypted, plaintext-named files under a
//! root directory. A long random master key encrypts every entry; the key
//! itself is sealed with the user's passphrase. All actual cryptography is
//! delegated to an external gpg process driven over explicit pipes, with the
//! passphrase streamed over a dedicated descriptor so it never appears on a
//! command line or in an environment.

pub mod config;
pub mod crypto;
pub mod engine;
pub mod generator;
pub mod hooks;
pub mod prompt;
pub mod store;

pub use config::{Config, ConfigError};
pub use crypto::{CryptoError, GpgCipher, SecretCipher};
pub use engine::{Attachment, Channel, EngineError, Gpg};
pub use prompt::{PassphraseSource, ScriptedPrompt, TerminalPrompt};
pub use store::{MasterKey, Store, StoreError, StorePaths};
