//! Keel Git - Git operations for release readiness
//!
//! This crate wraps the user's repositories (status, upstream, tags) and
//! manages locked, fetch-refreshed mirrors used to inspect historical
//! revisions without touching the user's working tree.

pub mod command;
mod remote;
mod repository;
mod status;
mod tags;
pub mod types;
pub mod worktree;

pub use command::GitCommand;
pub use repository::{find_repository_root, GitRepo, Result};
pub use types::{TagInfo, Upstream, UpstreamStatus};
pub use worktree::{CacheOptions, CachedWorktree};

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::Path;

    use git2::{Repository, Signature};

    /// Stage everything under the workdir and commit it on HEAD
    pub fn commit_all(repo: &Repository, message: &str) -> git2::Oid {
        let sig = Signature::now("Test", "test@example.com").unwrap();
        let mut index = repo.index().unwrap();
        index
            .add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)
            .unwrap();
        index.write().unwrap();
        let tree_id = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();

        let parents = match repo.head().ok().and_then(|h| h.peel_to_commit().ok()) {
            Some(parent) => vec![parent],
            None => vec![],
        };
        let parent_refs: Vec<&git2::Commit> = parents.iter().collect();
        repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parent_refs)
            .unwrap()
    }

    /// Write a file, creating parent directories
    pub fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }
}
