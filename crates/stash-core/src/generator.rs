//! Password-candidate generation via an external command.

use std::process::Command;

use tracing::debug;

/// Run the configured generator through the shell and split its stdout on
/// whitespace. Any failure (spawn error, non-zero exit, empty output) yields
/// no candidates; the caller falls back to plain prompting.
pub fn candidates(command: &str) -> Vec<Vec<u8>> {
    if command.trim().is_empty() {
        return Vec::new();
    }
    let output = match Command::new("sh").arg("-c").arg(command).output() {
        Ok(output) => output,
        Err(err) => {
            debug!("password generator failed to start: {err}");
            return Vec::new();
        }
    };
    if !output.status.success() {
        debug!(status = ?output.status, "password generator failed");
        return Vec::new();
    }
    output
        .stdout
        .split(|byte| byte.is_ascii_whitespace())
        .filter(|word| !word.is_empty())
        .map(|word| word.to_vec())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_stdout_into_words() {
        let words = candidates("printf 'alpha beta\\ngamma'");
        assert_eq!(words, vec![b"alpha".to_vec(), b"beta".to_vec(), b"gamma".to_vec()]);
    }

    #[test]
    fn failing_command_yields_nothing() {
        assert!(candidates("false").is_empty());
    }

    #[test]
    fn empty_command_yields_nothing() {
        assert!(candidates("").is_empty());
        assert!(candidates("   ").is_empty());
    }

    #[test]
    fn empty_output_yields_nothing() {
        assert!(candidates("true").is_empty());
    }
}
