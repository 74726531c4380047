//! GnuPG subprocess driver.
//!
//! gpg is spoken to over up to four simultaneously open byte streams: the
//! standard three plus a numbered passphrase descriptor (`--passphrase-fd`).
//! This module owns the descriptor bookkeeping. Every pipe end is wrapped in
//! an owning handle the moment the kernel hands it over, so every exit path,
//! including a failed spawn, closes each end exactly once. Parent-held ends
//! carry `FD_CLOEXEC` and so never leak into the child; the parent's copies
//! of child-held ends are dropped right after the spawn.
//!
//! Ordering discipline: pipes have bounded kernel buffers. Callers must
//! finish writing and *drop* every input handle (passphrase, stdin) before
//! draining an output handle, and must drain outputs before [`Gpg::wait`].
//! The payloads exchanged here (passphrases, single secrets) stay far below
//! the default buffer size, which is what makes the strictly sequential
//! order deadlock-free. Streaming large payloads in both directions at once
//! would need a poll-based loop instead; [`Gpg::wait`] does not sequence
//! caller I/O for you.

use std::collections::HashMap;
use std::ffi::OsString;
use std::fmt;
use std::fs::File;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};

use thiserror::Error;
use tracing::debug;

/// Flags every invocation starts with: no terminal, no interactivity.
const PREAMBLE: &[&str] = &["--batch", "--no-tty"];

/// Logical byte streams attached to one gpg invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Stdin,
    Stdout,
    Stderr,
    /// gpg's dedicated passphrase descriptor, wired via `--passphrase-fd N`.
    Passphrase,
}

impl Channel {
    /// True when the parent writes this stream and the child reads it.
    fn parent_writes(self) -> bool {
        matches!(self, Channel::Stdin | Channel::Passphrase)
    }

    fn name(self) -> &'static str {
        match self {
            Channel::Stdin => "stdin",
            Channel::Stdout => "stdout",
            Channel::Stderr => "stderr",
            Channel::Passphrase => "passphrase",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A caller-supplied stream wired into the child in place of a fresh pipe.
pub enum Attachment {
    File(File),
    Fd(OwnedFd),
}

impl Attachment {
    fn into_file(self) -> File {
        match self {
            Attachment::File(file) => file,
            Attachment::Fd(fd) => File::from(fd),
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("an engine invocation is already in flight")]
    Busy,
    #[error("channel {0} both created and attached")]
    ChannelCollision(Channel),
    #[error("channel {0} is not open")]
    ChannelClosed(Channel),
    #[error("failed to launch `{program}`: {source}")]
    Launch { program: String, source: io::Error },
    #[error("no engine invocation in flight")]
    NotRunning,
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// One gpg process at a time, addressed through named channels.
///
/// `spawn` wires the requested channel topology and starts the child;
/// [`Gpg::take`] hands out the parent-held pipe ends; [`Gpg::wait`] closes
/// whatever is still open and reaps the exit status. After `wait` (or a
/// failed spawn) the instance is idle again and can be reused.
pub struct Gpg {
    program: PathBuf,
    args: Vec<OsString>,
    handles: HashMap<Channel, File>,
    child: Option<Child>,
}

impl Gpg {
    pub fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Self::with_program("gpg", args)
    }

    pub fn with_program<P, I, S>(program: P, args: I) -> Self
    where
        P: Into<PathBuf>,
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Gpg {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            handles: HashMap::new(),
            child: None,
        }
    }

    /// Launch the engine with fresh pipes for every channel in `create` and
    /// the caller-supplied streams in `attach` wired in directly.
    ///
    /// Standard channels not mentioned in either list are inherited from the
    /// parent. The final command line is: program, `--passphrase-fd N`
    /// flags, the non-interactive preamble, the instance arguments, then
    /// `op_args`.
    pub fn spawn(
        &mut self,
        op_args: &[&str],
        create: &[Channel],
        attach: Vec<(Channel, Attachment)>,
    ) -> Result<(), EngineError> {
        if self.child.is_some() || !self.handles.is_empty() {
            return Err(EngineError::Busy);
        }
        for (channel, _) in &attach {
            if create.contains(channel) {
                return Err(EngineError::ChannelCollision(*channel));
            }
        }

        let mut cmd = Command::new(&self.program);
        let mut fd_args: Vec<OsString> = Vec::new();
        // Parent copies of child-held ends. They stay open across the spawn
        // so the descriptor numbers in fd_args remain valid, and are dropped
        // right after.
        let mut child_ends: Vec<File> = Vec::new();
        let mut handles = HashMap::new();

        for &channel in create {
            let (read, write) = pipe()?;
            let (ours, theirs) = if channel.parent_writes() {
                (write, read)
            } else {
                (read, write)
            };
            set_cloexec(&ours, true)?;
            let theirs = File::from(theirs);
            match channel {
                Channel::Stdin => {
                    cmd.stdin(Stdio::from(theirs));
                }
                Channel::Stdout => {
                    cmd.stdout(Stdio::from(theirs));
                }
                Channel::Stderr => {
                    cmd.stderr(Stdio::from(theirs));
                }
                Channel::Passphrase => {
                    fd_args.push("--passphrase-fd".into());
                    fd_args.push(theirs.as_raw_fd().to_string().into());
                    child_ends.push(theirs);
                }
            }
            handles.insert(channel, File::from(ours));
        }

        for (channel, attachment) in attach {
            let file = attachment.into_file();
            match channel {
                Channel::Stdin => {
                    cmd.stdin(Stdio::from(file));
                }
                Channel::Stdout => {
                    cmd.stdout(Stdio::from(file));
                }
                Channel::Stderr => {
                    cmd.stderr(Stdio::from(file));
                }
                Channel::Passphrase => {
                    set_cloexec(&file, false)?;
                    fd_args.push("--passphrase-fd".into());
                    fd_args.push(file.as_raw_fd().to_string().into());
                    child_ends.push(file);
                }
            }
        }

        cmd.args(&fd_args);
        cmd.args(PREAMBLE);
        cmd.args(&self.args);
        cmd.args(op_args);

        debug!(program = %self.program.display(), ?op_args, "spawning engine");
        let child = cmd.spawn().map_err(|source| EngineError::Launch {
            program: self.program.display().to_string(),
            source,
        })?;
        // The child owns its ends now; dropping our copies lets EOF
        // propagate once the parent-held write ends close.
        drop(child_ends);

        self.handles = handles;
        self.child = Some(child);
        Ok(())
    }

    /// Take ownership of the parent-held end of a created channel. Dropping
    /// the returned handle closes it, which is how the child sees EOF.
    pub fn take(&mut self, channel: Channel) -> Result<File, EngineError> {
        self.handles
            .remove(&channel)
            .ok_or(EngineError::ChannelClosed(channel))
    }

    /// Close any parent-held ends still open and block for the exit status.
    pub fn wait(&mut self) -> Result<ExitStatus, EngineError> {
        let mut child = self.child.take().ok_or(EngineError::NotRunning)?;
        self.handles.clear();
        Ok(child.wait()?)
    }
}

impl Drop for Gpg {
    fn drop(&mut self) {
        // Dropped mid-invocation: close our pipe ends and reap the child so
        // it neither blocks forever on a pipe nor lingers as a zombie.
        if let Some(mut child) = self.child.take() {
            self.handles.clear();
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

fn pipe() -> io::Result<(OwnedFd, OwnedFd)> {
    let mut fds = [0i32; 2];
    if unsafe { libc::pipe(fds.as_mut_ptr()) } == -1 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: on success the kernel handed us two fresh descriptors that
    // nothing else owns yet.
    let read = unsafe { OwnedFd::from_raw_fd(fds[0]) };
    let write = unsafe { OwnedFd::from_raw_fd(fds[1]) };
    Ok((read, write))
}

fn set_cloexec<F: AsRawFd>(fd: &F, on: bool) -> io::Result<()> {
    let flags = unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_GETFD) };
    if flags == -1 {
        return Err(io::Error::last_os_error());
    }
    let flags = if on {
        flags | libc::FD_CLOEXEC
    } else {
        flags & !libc::FD_CLOEXEC
    };
    if unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_SETFD, flags) } == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
