//! stash - store secrets in gpg-encrypted files.
//!
//! Each entry is one encrypted file under the store root, addressed by its
//! path. `init` creates a sealed master key, `set` writes entries, `get`
//! reads them back; a bare path does whichever of the two makes sense.
//!
//! Exit codes: 0 on success, 1 on operational failure, 2 on usage errors.

use std::env;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use stash_core::{Config, GpgCipher, Store, StoreError, TerminalPrompt};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "stash", version)]
#[command(about = "Store passwords and other sensitive information in gpg-encrypted files")]
#[command(after_help = "\
When using `set`, files and directories are created automatically if
they don't already exist.")]
struct Cli {
    /// Store root (defaults to $STASH_DIR, then the current directory)
    #[arg(short = 'C', long = "dir", value_name = "DIR", global = true)]
    dir: Option<PathBuf>,

    /// Machine-readable output: print secrets only
    #[arg(short, long, global = true)]
    raw: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create and seal a new master key
    Init,
    /// Decrypt and print entries
    Get {
        #[arg(required = true, value_name = "FILE")]
        entries: Vec<String>,
    },
    /// Create or overwrite entries
    Set {
        #[arg(required = true, value_name = "FILE")]
        entries: Vec<String>,
    },
    /// Bare paths: get them if they exist, set them otherwise
    #[command(external_subcommand)]
    Implicit(Vec<String>),
}

enum CommandError {
    Store(StoreError),
    /// Already printed per-entry diagnostics; only the exit code is left.
    Reported,
}

impl From<StoreError> for CommandError {
    fn from(err: StoreError) -> Self {
        CommandError::Store(err)
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(CommandError::Store(err)) => {
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
        Err(CommandError::Reported) => ExitCode::FAILURE,
    }
}

fn run(cli: Cli) -> Result<(), CommandError> {
    let root = resolve_root(cli.dir);
    let config = Config::load(&root).map_err(StoreError::from)?;
    let cipher = GpgCipher::new(config.cipher.clone());
    let mut prompt = TerminalPrompt;
    let mut store = Store::open(root, config, &cipher, &mut prompt)?;

    match cli.command {
        Commands::Init => Ok(store.init()?),
        Commands::Get { entries } => get(&mut store, &entries, cli.raw),
        Commands::Set { entries } => Ok(store.set(&entries)?),
        Commands::Implicit(entries) => {
            let exists = entries
                .first()
                .map(|entry| store.entry_exists(entry))
                .unwrap_or(false);
            if exists {
                get(&mut store, &entries, cli.raw)
            } else {
                Ok(store.set(&entries)?)
            }
        }
    }
}

fn get(store: &mut Store, entries: &[String], raw: bool) -> Result<(), CommandError> {
    let results = store.get(entries)?;

    if !raw {
        println!();
    }
    let mut failed = false;
    for (entry, secret) in results {
        match secret {
            Some(bytes) => {
                if raw {
                    let mut out = io::stdout();
                    let _ = out.write_all(&bytes);
                    let _ = out.write_all(b"\n");
                } else {
                    println!("{entry}: {}\n", String::from_utf8_lossy(&bytes));
                }
            }
            None => {
                failed = true;
                eprintln!("Error: Failed to decrypt {entry}");
            }
        }
    }
    if failed {
        return Err(CommandError::Reported);
    }
    Ok(())
}

fn resolve_root(flag: Option<PathBuf>) -> PathBuf {
    if let Some(dir) = flag {
        return dir;
    }
    if let Some(dir) = env::var_os("STASH_DIR") {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }
    PathBuf::from(".")
}
