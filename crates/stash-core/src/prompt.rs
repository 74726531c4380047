//! Interactive passphrase input.
//!
//! The store talks to a [`PassphraseSource`] instead of the terminal
//! directly, so tests can script the whole dialogue.

use std::collections::VecDeque;
use std::io::{self, BufRead, Write};
use std::os::fd::AsRawFd;

pub trait PassphraseSource {
    /// Read one passphrase. The prompt has no trailing newline.
    fn read_passphrase(&mut self, prompt: &str) -> io::Result<String>;
}

/// Prompts on the controlling terminal with echo disabled. When stdin is not
/// a terminal the prompt goes to stderr and a line is read from stdin, which
/// is how scripted callers (and the integration tests) drive it.
pub struct TerminalPrompt;

impl PassphraseSource for TerminalPrompt {
    fn read_passphrase(&mut self, prompt: &str) -> io::Result<String> {
        if stdin_is_tty() {
            return rpassword::prompt_password(prompt);
        }
        let mut err = io::stderr();
        write!(err, "{prompt}")?;
        err.flush()?;
        let mut line = String::new();
        io::stdin().lock().read_line(&mut line)?;
        Ok(line.trim_end_matches(&['\r', '\n'][..]).to_string())
    }
}

fn stdin_is_tty() -> bool {
    unsafe { libc::isatty(io::stdin().as_raw_fd()) != 0 }
}

/// Scripted responses, for tests.
pub struct ScriptedPrompt {
    responses: VecDeque<String>,
}

impl ScriptedPrompt {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ScriptedPrompt {
            responses: responses.into_iter().map(Into::into).collect(),
        }
    }
}

impl PassphraseSource for ScriptedPrompt {
    fn read_passphrase(&mut self, _prompt: &str) -> io::Result<String> {
        self.responses.pop_front().ok_or_else(|| {
            io::Error::new(io::ErrorKind::UnexpectedEof, "no scripted response left")
        })
    }
}
