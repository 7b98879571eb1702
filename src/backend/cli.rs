//! Claude CLI subprocess backend.
//!
//! Each completion request spawns one `claude` process: the prompt goes in on
//! stdin and the result comes back on stdout, as a whole document
//! (`--output-format text`) or as newline-delimited JSON fragments
//! (`--output-format stream-json`). Subprocesses are spawned with
//! kill-on-drop so an abandoned request cannot leak a child.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::BackendConfig;

/// Failures raised by the CLI backend.
#[derive(Error, Debug)]
pub enum BackendError {
    /// The binary could not be located at startup.
    #[error("Claude CLI not found at '{0}'; install it or set CLAUDE_CLI_PATH")]
    CliNotFound(String),

    /// Spawning the subprocess or talking to its pipes failed.
    #[error("Claude CLI I/O failure: {0}")]
    Io(#[from] std::io::Error),

    /// The subprocess exited with a non-zero status.
    #[error("Claude CLI exited with status {status}: {stderr}")]
    Failed { status: i32, stderr: String },

    /// The subprocess did not finish within the configured deadline.
    #[error("Claude CLI timed out after {0}s")]
    Timeout(u64),
}

/// One event on a streaming completion channel.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// A fragment of assistant text, in production order.
    Fragment(String),

    /// The subprocess finished cleanly; no more fragments follow.
    Done,

    /// The subprocess failed after zero or more fragments.
    Error(String),
}

/// Handle to a resolved Claude CLI binary.
///
/// Holds the binary path and invocation limits; all per-request state lives
/// in the spawned subprocess.
#[derive(Debug, Clone)]
pub struct ClaudeCli {
    path: PathBuf,
    timeout: Duration,
}

impl ClaudeCli {
    /// Resolve the configured binary and build a handle.
    ///
    /// Fails with [`BackendError::CliNotFound`] when an explicit path does
    /// not exist or a bare name cannot be found on `$PATH`.
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let path = which(&config.cli_path)
            .ok_or_else(|| BackendError::CliNotFound(config.cli_path.clone()))?;
        Ok(Self {
            path,
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    /// Locate a CLI binary without building a handle (used by `check`).
    pub fn locate(command: &str) -> Option<PathBuf> {
        which(command)
    }

    /// Resolved path of the binary.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Subprocess invocation shared by both output modes.
    fn command(&self, model: &str, output_format: &str) -> Command {
        let mut cmd = Command::new(&self.path);
        cmd.arg("-p")
            .arg("--model")
            .arg(model)
            .arg("--output-format")
            .arg(output_format)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    /// Run one whole-response completion.
    ///
    /// Blocks until the subprocess exits or the deadline passes; a timeout
    /// kills the child via kill-on-drop.
    pub async fn complete(&self, prompt: &str, model: &str) -> Result<String, BackendError> {
        debug!(model, prompt_bytes = prompt.len(), "Spawning CLI for full completion");
        let mut child = self.command(model, "text").spawn()?;

        let mut stdin = child.stdin.take().expect("stdin piped at spawn");
        stdin.write_all(prompt.as_bytes()).await?;
        // Close the pipe so the CLI sees EOF and starts responding.
        drop(stdin);

        let secs = self.timeout.as_secs();
        let output = timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| BackendError::Timeout(secs))??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(BackendError::Failed {
                status: output.status.code().unwrap_or(-1),
                stderr,
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Start a streaming completion.
    ///
    /// Returns the receiving end of a bounded channel of [`StreamEvent`]s;
    /// fragments arrive in the order the CLI produced them. Dropping the
    /// receiver stops the reader task and kills the subprocess.
    pub fn stream(&self, prompt: String, model: &str) -> Result<mpsc::Receiver<StreamEvent>, BackendError> {
        debug!(model, prompt_bytes = prompt.len(), "Spawning CLI for streaming completion");
        let mut child = self.command(model, "stream-json").spawn()?;

        let mut stdin = child.stdin.take().expect("stdin piped at spawn");
        let stdout = child.stdout.take().expect("stdout piped at spawn");

        let (tx, rx) = mpsc::channel(32);

        tokio::spawn(async move {
            if let Err(e) = stdin.write_all(prompt.as_bytes()).await {
                warn!("Failed to write prompt to CLI stdin: {e}");
                let _ = tx.send(StreamEvent::Error(e.to_string())).await;
                return;
            }
            drop(stdin);

            let mut lines = BufReader::new(stdout).lines();
            loop {
                let line = match lines.next_line().await {
                    Ok(Some(line)) => line,
                    Ok(None) => break, // EOF: the CLI closed stdout.
                    Err(e) => {
                        let _ = tx.send(StreamEvent::Error(e.to_string())).await;
                        return;
                    }
                };

                let Some(fragment) = parse_stream_line(&line) else {
                    continue;
                };

                if tx.send(StreamEvent::Fragment(fragment)).await.is_err() {
                    // Receiver dropped, stop reading. The child is killed
                    // when it goes out of scope.
                    debug!("Fragment receiver dropped, abandoning CLI stream");
                    return;
                }
            }

            match child.wait().await {
                Ok(status) if status.success() => {
                    debug!("CLI stream complete");
                    let _ = tx.send(StreamEvent::Done).await;
                }
                Ok(status) => {
                    let stderr = read_stderr(&mut child).await;
                    let _ = tx
                        .send(StreamEvent::Error(format!(
                            "CLI exited with status {}: {stderr}",
                            status.code().unwrap_or(-1)
                        )))
                        .await;
                }
                Err(e) => {
                    let _ = tx.send(StreamEvent::Error(e.to_string())).await;
                }
            }
        });

        Ok(rx)
    }
}

/// Drain whatever the exited child wrote to stderr.
async fn read_stderr(child: &mut tokio::process::Child) -> String {
    let mut buf = String::new();
    if let Some(mut stderr) = child.stderr.take() {
        let _ = stderr.read_to_string(&mut buf).await;
    }
    buf.trim().to_string()
}

/// Extract the text fragment from one line of `stream-json` output.
///
/// The CLI has shipped several shapes for this format; accept the known ones
/// (`content`, `text`, `delta.text`) and fall back to treating non-JSON lines
/// as raw text. Returns `None` for lines carrying no fragment (blank lines,
/// unrelated JSON events, empty strings).
pub(crate) fn parse_stream_line(line: &str) -> Option<String> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => {
            let candidates = [
                value.get("content"),
                value.get("text"),
                value.get("delta").and_then(|delta| delta.get("text")),
            ];
            for text in candidates.into_iter().flatten() {
                match text.as_str() {
                    Some(s) if !s.is_empty() => return Some(s.to_string()),
                    _ => {}
                }
            }
            None
        }
        Err(_) if !trimmed.starts_with('{') => Some(trimmed.to_string()),
        Err(_) => None,
    }
}

/// Locate an executable the way a shell would.
///
/// Absolute and home-relative paths are checked directly; bare names are
/// searched through each `$PATH` entry.
fn which(command: &str) -> Option<PathBuf> {
    if command.starts_with('/') || command.starts_with('~') {
        let path = PathBuf::from(command);
        return path.exists().then_some(path);
    }

    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(command))
        .find(|candidate| candidate.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_content_field() {
        assert_eq!(
            parse_stream_line(r#"{"content":"hello"}"#),
            Some("hello".to_string())
        );
    }

    #[test]
    fn test_parse_text_field() {
        assert_eq!(
            parse_stream_line(r#"{"text":"hi there"}"#),
            Some("hi there".to_string())
        );
    }

    #[test]
    fn test_parse_nested_delta() {
        assert_eq!(
            parse_stream_line(r#"{"delta":{"text":"chunk"}}"#),
            Some("chunk".to_string())
        );
    }

    #[test]
    fn test_content_takes_precedence() {
        assert_eq!(
            parse_stream_line(r#"{"content":"a","text":"b"}"#),
            Some("a".to_string())
        );
    }

    #[test]
    fn test_raw_line_forwarded() {
        assert_eq!(
            parse_stream_line("plain words"),
            Some("plain words".to_string())
        );
    }

    #[test]
    fn test_blank_and_unrelated_lines_skipped() {
        assert_eq!(parse_stream_line(""), None);
        assert_eq!(parse_stream_line("   "), None);
        assert_eq!(parse_stream_line(r#"{"type":"message_start"}"#), None);
        assert_eq!(parse_stream_line(r#"{"content":""}"#), None);
        assert_eq!(parse_stream_line(r#"{"content":42}"#), None);
    }

    #[test]
    fn test_malformed_json_object_skipped() {
        assert_eq!(parse_stream_line(r#"{"content": unterminated"#), None);
    }

    #[test]
    fn test_which_absolute_path() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("claude");
        std::fs::write(&file, "#!/bin/sh\n").unwrap();

        let found = which(file.to_str().unwrap());
        assert_eq!(found, Some(file));
    }

    #[test]
    fn test_which_missing() {
        assert_eq!(which("/nonexistent/claude-binary"), None);
        assert_eq!(which("definitely-not-a-real-binary-9c4f"), None);
    }

    #[test]
    fn test_cli_not_found_error() {
        let config = BackendConfig {
            cli_path: "/nonexistent/claude-binary".to_string(),
            timeout_secs: 5,
        };
        assert!(matches!(
            ClaudeCli::new(&config),
            Err(BackendError::CliNotFound(_))
        ));
    }
}
