//! Version control process abstraction

use async_trait::async_trait;
use std::ffi::OsStr;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use crate::config::GitConfig;
use crate::{Error, Result};

/// Result of one external VCS invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutcome {
    /// Exit code, `None` when killed by a signal or timed out
    pub exit_code: Option<i32>,
    /// Captured standard error, trimmed
    pub stderr: String,
    /// The process exceeded its time budget and was killed
    pub timed_out: bool,
}

impl ProcessOutcome {
    pub fn success() -> Self {
        Self {
            exit_code: Some(0),
            stderr: String::new(),
            timed_out: false,
        }
    }

    pub fn failure(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code: Some(exit_code),
            stderr: stderr.into(),
            timed_out: false,
        }
    }

    pub fn timed_out() -> Self {
        Self {
            exit_code: None,
            stderr: String::new(),
            timed_out: true,
        }
    }

    pub fn is_success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }

    /// Short classification of a failure for logs
    pub fn reason(&self) -> &'static str {
        if self.is_success() {
            return "ok";
        }
        if self.timed_out {
            return "timed out";
        }

        let stderr = self.stderr.as_str();
        if stderr.contains("Authentication failed") || stderr.contains("Permission denied") {
            "authentication failed"
        } else if stderr.contains("Could not resolve host") || stderr.contains("unable to access") {
            "network error"
        } else if stderr.contains("not found") || stderr.contains("does not exist") {
            "repository not found"
        } else {
            "git exited with an error"
        }
    }
}

/// Trait for the version control backend used by the runner
#[async_trait]
pub trait Vcs: Send + Sync {
    /// Get the name of this backend
    fn name(&self) -> &'static str;

    /// Shallow clone `url` into `dest`, which must not exist yet
    async fn clone_shallow(&self, url: &str, dest: &Path) -> Result<ProcessOutcome>;

    /// Bring an existing checkout up to date with its remote default branch
    async fn fetch_reset(&self, dest: &Path) -> Result<ProcessOutcome>;
}

/// `Vcs` backed by the git command line
///
/// Arguments are passed as a vector, never through a shell.
#[derive(Debug, Clone)]
pub struct GitCli {
    git_path: String,
    timeout: Duration,
}

impl GitCli {
    pub fn new() -> Self {
        Self::from_config(&GitConfig::default())
    }

    pub fn from_config(config: &GitConfig) -> Self {
        Self {
            git_path: config.git_path.clone(),
            timeout: config.timeout,
        }
    }

    /// Use a custom git executable
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.git_path = path.into();
        self
    }

    fn build_command(&self, args: &[&OsStr], workdir: Option<&Path>) -> Command {
        let mut cmd = Command::new(&self.git_path);
        cmd.args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = workdir {
            cmd.current_dir(dir);
        }

        cmd
    }

    async fn run(&self, mut cmd: Command) -> Result<ProcessOutcome> {
        let child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::Git(format!(
                    "git executable not found at '{}'",
                    self.git_path
                ))
            } else {
                Error::Io(e)
            }
        })?;

        // Dropping the child on timeout kills it.
        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => {
                let output = output?;
                Ok(ProcessOutcome {
                    exit_code: output.status.code(),
                    stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                    timed_out: false,
                })
            }
            Err(_) => Ok(ProcessOutcome::timed_out()),
        }
    }
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Vcs for GitCli {
    fn name(&self) -> &'static str {
        "git"
    }

    async fn clone_shallow(&self, url: &str, dest: &Path) -> Result<ProcessOutcome> {
        // git clone --depth=1 -- <url> <dest>
        let cmd = self.build_command(
            &[
                OsStr::new("clone"),
                OsStr::new("--depth=1"),
                OsStr::new("--"),
                OsStr::new(url),
                dest.as_os_str(),
            ],
            None,
        );
        self.run(cmd).await
    }

    async fn fetch_reset(&self, dest: &Path) -> Result<ProcessOutcome> {
        let fetched = self
            .run(self.build_command(&[OsStr::new("fetch")], Some(dest)))
            .await?;
        if !fetched.is_success() {
            return Ok(fetched);
        }

        self.run(self.build_command(
            &[
                OsStr::new("reset"),
                OsStr::new("--hard"),
                OsStr::new("origin/HEAD"),
            ],
            Some(dest),
        ))
        .await
    }
}
