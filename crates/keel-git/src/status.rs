//! Repository status operations

use git2::{BranchType, Status, StatusOptions};
use tracing::debug;

use keel_core::DirtyCounts;

use crate::repository::{GitRepo, Result};
use crate::types::{Upstream, UpstreamStatus};

const STAGED: Status = Status::INDEX_NEW
    .union(Status::INDEX_MODIFIED)
    .union(Status::INDEX_DELETED)
    .union(Status::INDEX_RENAMED)
    .union(Status::INDEX_TYPECHANGE);

const UNSTAGED: Status = Status::WT_MODIFIED
    .union(Status::WT_DELETED)
    .union(Status::WT_RENAMED)
    .union(Status::WT_TYPECHANGE)
    .union(Status::CONFLICTED);

impl GitRepo {
    /// Count staged, unstaged and untracked entries.
    ///
    /// `subtree` restricts the count to one directory (relative to the
    /// workdir, `/`-separated, empty for the whole tree). Entries under any
    /// of `excluded` (same form) are ignored; nested modules are excluded
    /// this way.
    pub fn dirty_counts(&self, subtree: Option<&str>, excluded: &[String]) -> Result<DirtyCounts> {
        let mut opts = StatusOptions::new();
        opts.include_untracked(true)
            .recurse_untracked_dirs(true)
            .include_ignored(false)
            .exclude_submodules(true);
        let subtree = subtree.filter(|s| !s.is_empty());
        if let Some(dir) = subtree {
            opts.pathspec(dir);
        }

        let statuses = self.repo.statuses(Some(&mut opts))?;
        let mut counts = DirtyCounts::default();

        for entry in statuses.iter() {
            let Some(path) = entry.path() else { continue };
            if let Some(dir) = subtree {
                if !is_within(path, dir) {
                    continue;
                }
            }
            if excluded.iter().any(|ex| is_within(path, ex)) {
                continue;
            }

            let status = entry.status();
            if status.intersects(STAGED) {
                counts.staged += 1;
            }
            if status.intersects(UNSTAGED) {
                counts.unstaged += 1;
            }
            if status.contains(Status::WT_NEW) {
                counts.untracked += 1;
            }
        }

        debug!(
            subtree = subtree.unwrap_or(""),
            staged = counts.staged,
            unstaged = counts.unstaged,
            untracked = counts.untracked,
            "computed dirty counts"
        );
        Ok(counts)
    }

    /// Get the current branch name
    pub fn current_branch(&self) -> Result<Option<String>> {
        let head = match self.repo.head() {
            Ok(head) => head,
            Err(e) if e.code() == git2::ErrorCode::UnbornBranch => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if head.is_branch() {
            Ok(head.shorthand().map(|s| s.to_string()))
        } else {
            // Detached HEAD
            Ok(None)
        }
    }

    /// Get the upstream of the current branch, if one is configured
    pub fn upstream(&self) -> Result<Option<Upstream>> {
        let Some(branch_name) = self.current_branch()? else {
            return Ok(None);
        };
        let branch = self.repo.find_branch(&branch_name, BranchType::Local)?;
        let upstream = match branch.upstream() {
            Ok(upstream) => upstream,
            Err(e) if e.code() == git2::ErrorCode::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let local_ref = format!("refs/heads/{}", branch_name);
        let remote = self
            .repo
            .branch_upstream_remote(&local_ref)
            .ok()
            .and_then(|buf| buf.as_str().map(|s| s.to_string()))
            .unwrap_or_default();

        let full_name = upstream.name()?.unwrap_or_default().to_string();
        let branch = full_name
            .strip_prefix(&format!("{}/", remote))
            .unwrap_or(&full_name)
            .to_string();

        Ok(Some(Upstream { remote, branch }))
    }

    /// Branch, upstream and ahead/behind counts in one call
    pub fn upstream_status(&self) -> Result<UpstreamStatus> {
        let branch = self.current_branch()?;
        let upstream = self.upstream()?;

        let (ahead, behind) = match (&branch, &upstream) {
            (Some(name), Some(_)) => {
                let local = self.repo.find_branch(name, BranchType::Local)?;
                let remote = local.upstream()?;
                match (local.get().target(), remote.get().target()) {
                    (Some(l), Some(r)) => self.repo.graph_ahead_behind(l, r)?,
                    _ => (0, 0),
                }
            }
            _ => (0, 0),
        };

        Ok(UpstreamStatus {
            branch,
            upstream,
            ahead,
            behind,
        })
    }
}

/// Whether a `/`-separated repository path lies inside `dir`
fn is_within(path: &str, dir: &str) -> bool {
    if dir.is_empty() {
        return true;
    }
    let dir = dir.trim_end_matches('/');
    path == dir || path.strip_prefix(dir).is_some_and(|rest| rest.starts_with('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{commit_all, write};
    use git2::Repository;
    use tempfile::TempDir;

    fn setup_repo() -> (TempDir, GitRepo) {
        let temp = TempDir::new().unwrap();
        let repo = Repository::init(temp.path()).unwrap();
        write(temp.path(), "file.txt", "content");
        write(temp.path(), "api/go.mod", "module example.com/api\n");
        write(temp.path(), "api/nested/go.mod", "module example.com/api/nested\n");
        commit_all(&repo, "Initial commit");

        let git_repo = GitRepo::open(temp.path()).unwrap();
        (temp, git_repo)
    }

    #[test]
    fn test_fresh_commit_is_clean() {
        let (_temp, repo) = setup_repo();
        assert!(!repo.dirty_counts(None, &[]).unwrap().is_dirty());
    }

    #[test]
    fn test_untracked_file_is_dirty() {
        let (temp, repo) = setup_repo();
        std::fs::write(temp.path().join("new_file.txt"), "new").unwrap();
        assert!(repo.dirty_counts(None, &[]).unwrap().is_dirty());
    }

    #[test]
    fn test_dirty_counts_by_kind() {
        let (temp, repo) = setup_repo();
        std::fs::write(temp.path().join("file.txt"), "modified").unwrap();
        std::fs::write(temp.path().join("untracked.txt"), "new").unwrap();
        write(temp.path(), "staged.txt", "staged");
        let mut index = repo.inner().index().unwrap();
        index.add_path(std::path::Path::new("staged.txt")).unwrap();
        index.write().unwrap();

        let counts = repo.dirty_counts(None, &[]).unwrap();
        assert_eq!(counts.staged, 1);
        assert_eq!(counts.unstaged, 1);
        assert_eq!(counts.untracked, 1);
    }

    #[test]
    fn test_dirty_counts_restricted_to_subtree() {
        let (temp, repo) = setup_repo();
        std::fs::write(temp.path().join("file.txt"), "modified").unwrap();

        let counts = repo.dirty_counts(Some("api"), &[]).unwrap();
        assert!(!counts.is_dirty());

        write(temp.path(), "api/client.go", "package api\n");
        let counts = repo.dirty_counts(Some("api"), &[]).unwrap();
        assert_eq!(counts.untracked, 1);
    }

    #[test]
    fn test_dirty_counts_excludes_nested_modules() {
        let (temp, repo) = setup_repo();
        write(temp.path(), "api/nested/extra.go", "package nested\n");

        let counts = repo
            .dirty_counts(Some("api"), &["api/nested".to_string()])
            .unwrap();
        assert!(!counts.is_dirty());

        let counts = repo.dirty_counts(Some("api/nested"), &[]).unwrap();
        assert_eq!(counts.untracked, 1);
    }

    #[test]
    fn test_sibling_prefix_is_not_within() {
        assert!(is_within("api/x.go", "api"));
        assert!(!is_within("apis/x.go", "api"));
        assert!(is_within("anything", ""));
    }

    #[test]
    fn test_current_branch() {
        let (_temp, repo) = setup_repo();
        let branch = repo.current_branch().unwrap();
        // Git might default to 'master' or 'main' depending on config
        assert!(branch.is_some());
    }

    #[test]
    fn test_no_upstream() {
        let (_temp, repo) = setup_repo();
        let status = repo.upstream_status().unwrap();
        assert!(status.upstream.is_none());
        assert_eq!((status.ahead, status.behind), (0, 0));
    }
}
