//! Timed `git` subprocess invocation
//!
//! Operations that libgit2 does not cover well (hard-linked local clones,
//! forced checkouts, `ls-remote`) shell out to the git CLI. Every call is
//! bounded by a timeout; a call that exceeds it is killed and reported as
//! [`GitError::Timeout`].

use std::ffi::{OsStr, OsString};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, instrument};

use keel_core::config::DEFAULT_GIT_TIMEOUT_SECS;
use keel_core::error::GitError;

use crate::repository::Result;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Builder for a single git invocation
#[derive(Debug, Clone)]
pub struct GitCommand {
    dir: PathBuf,
    args: Vec<OsString>,
    timeout: Duration,
}

impl GitCommand {
    /// Run git inside `dir`
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            args: Vec::new(),
            timeout: Duration::from_secs(DEFAULT_GIT_TIMEOUT_SECS),
        }
    }

    /// Append one argument
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    /// Append several arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    /// Override the default timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Human-readable form used in errors and logs
    pub fn display(&self) -> String {
        let mut parts = vec!["git".to_string()];
        parts.extend(self.args.iter().map(|a| a.to_string_lossy().into_owned()));
        parts.join(" ")
    }

    /// Run to completion and return trimmed stdout
    #[instrument(skip(self), fields(command = %self.display(), dir = %self.dir.display()))]
    pub fn run(&self) -> Result<String> {
        let start = Instant::now();
        let command = self.display();

        let mut child = Command::new("git")
            .args(&self.args)
            .current_dir(&self.dir)
            .env("GIT_TERMINAL_PROMPT", "0")
            .env("LC_ALL", "C")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| GitError::Spawn {
                command: command.clone(),
                source,
            })?;

        // Drain both pipes on their own threads so a chatty process cannot
        // block on a full pipe while we poll for exit.
        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if start.elapsed() >= self.timeout => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(GitError::Timeout {
                        command,
                        timeout: self.timeout,
                    });
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(source) => return Err(GitError::Spawn { command, source }),
            }
        };

        let stdout = stdout.map(join_output).unwrap_or_default();
        let stderr = stderr.map(join_output).unwrap_or_default();

        debug!(
            success = status.success(),
            duration_ms = start.elapsed().as_millis(),
            "git command finished"
        );

        if !status.success() {
            return Err(GitError::CommandFailed {
                command,
                stderr: stderr.trim().to_string(),
            });
        }

        Ok(stdout.trim().to_string())
    }
}

fn drain<R: Read + Send + 'static>(mut reader: R) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = reader.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn join_output(handle: thread::JoinHandle<String>) -> String {
    handle.join().unwrap_or_default()
}
