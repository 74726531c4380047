//! Lifecycle hooks.
//!
//! Executables under the store's hook directory run after the event they are
//! named for. Only `post-set` is wired today. Hooks are best-effort: by the
//! time one runs the entry is already written, so a missing, non-executable
//! or failing hook never fails the command.

use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::process::Command;

use tracing::{debug, warn};

pub const POST_SET: &str = "post-set";

const POST_SET_SAMPLE: &str = "\
#!/bin/sh

# Sample post-set hook: commit every change to git. To activate, rename
# this file to `post-set` and keep it executable.
#
# The entry path is passed as the first argument, STASH_DIR points at the
# store root, and the working directory is the store root.

# git add \"$1\" && git commit -m \"Save $1.\"
";

/// Write the sample hook into the hook directory, marked executable.
pub fn install_samples(hooks_dir: &Path) -> io::Result<()> {
    fs::create_dir_all(hooks_dir)?;
    let sample = hooks_dir.join(format!("{POST_SET}.sample"));
    fs::write(&sample, POST_SET_SAMPLE)?;
    let mut perms = fs::metadata(&sample)?.permissions();
    perms.set_mode(perms.mode() | 0o100);
    fs::set_permissions(&sample, perms)
}

/// Run the post-set hook for an entry, if one is installed.
pub fn run_post_set(root: &Path, hooks_dir: &Path, entry: &str) {
    let hook = hooks_dir.join(POST_SET);
    let metadata = match fs::metadata(&hook) {
        Ok(metadata) => metadata,
        Err(_) => return,
    };
    if !metadata.is_file() || metadata.permissions().mode() & 0o111 == 0 {
        debug!(hook = %hook.display(), "post-set hook not executable, skipping");
        return;
    }

    // The hook runs with the store root as its working directory, so both
    // paths have to be absolute.
    let hook = hook.canonicalize().unwrap_or(hook);
    let root_abs = root
        .canonicalize()
        .unwrap_or_else(|_| root.to_path_buf());

    match Command::new(&hook)
        .arg(entry)
        .env("STASH_DIR", &root_abs)
        .current_dir(root)
        .status()
    {
        Ok(status) if status.success() => {}
        Ok(status) => warn!(hook = %hook.display(), %status, "post-set hook failed"),
        Err(err) => warn!(hook = %hook.display(), "post-set hook could not run: {err}"),
    }
}
