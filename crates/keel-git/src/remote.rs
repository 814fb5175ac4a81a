//! Remote operations

use std::collections::BTreeSet;
use std::time::Duration;

use tracing::{info, instrument};

use keel_core::error::GitError;

use crate::command::GitCommand;
use crate::repository::{GitRepo, Result};

impl GitRepo {
    /// Get list of remote names
    pub fn remotes(&self) -> Result<Vec<String>> {
        let remotes = self.repo.remotes()?;
        Ok(remotes
            .iter()
            .filter_map(|r| r.map(|s| s.to_string()))
            .collect())
    }

    /// Check if a remote exists
    pub fn has_remote(&self, name: &str) -> Result<bool> {
        Ok(self.remotes()?.contains(&name.to_string()))
    }

    /// Get the URL for a remote
    pub fn remote_url(&self, name: &str) -> Result<Option<String>> {
        match self.repo.find_remote(name) {
            Ok(remote) => Ok(remote.url().map(|s| s.to_string())),
            Err(e) if e.code() == git2::ErrorCode::NotFound => {
                Err(GitError::RemoteNotFound(name.to_string()))
            }
            Err(e) => Err(GitError::Git2(e)),
        }
    }

    /// Tag names published on a remote, via `git ls-remote`
    #[instrument(skip(self))]
    pub fn remote_tags(&self, remote: &str, timeout: Duration) -> Result<BTreeSet<String>> {
        if !self.has_remote(remote)? {
            return Err(GitError::RemoteNotFound(remote.to_string()));
        }

        let output = GitCommand::new(self.path())
            .args(["ls-remote", "--tags", "--refs", remote])
            .timeout(timeout)
            .run()?;

        let tags: BTreeSet<String> = output
            .lines()
            .filter_map(|line| line.split_whitespace().nth(1))
            .filter_map(|r| r.strip_prefix("refs/tags/"))
            .map(|s| s.to_string())
            .collect();

        info!(remote, count = tags.len(), "listed remote tags");
        Ok(tags)
    }

    /// Local tags starting with `prefix` that the remote does not have
    pub fn missing_remote_tags(
        &self,
        remote: &str,
        prefix: &str,
        timeout: Duration,
    ) -> Result<Vec<String>> {
        let published = self.remote_tags(remote, timeout)?;
        Ok(self
            .tags()?
            .into_iter()
            .map(|t| t.name)
            .filter(|name| name.starts_with(prefix) && !published.contains(name))
            .collect())
    }
}
