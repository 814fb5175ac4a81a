//! Tag operations

use git2::Oid;
use semver::Version;
use tracing::{debug, instrument};

use crate::repository::{GitRepo, Result};
use crate::types::TagInfo;

impl GitRepo {
    /// Get all tags, sorted by name
    #[instrument(skip(self))]
    pub fn tags(&self) -> Result<Vec<TagInfo>> {
        let mut tags = Vec::new();

        for name in self.repo.tag_names(None)?.iter().flatten() {
            let reference = match self.repo.find_reference(&format!("refs/tags/{}", name)) {
                Ok(reference) => reference,
                Err(e) => {
                    debug!(tag = name, error = %e, "skipping unreadable tag");
                    continue;
                }
            };
            // Tags on trees or blobs carry no release meaning
            let Ok(commit) = reference.peel_to_commit() else {
                continue;
            };
            let mut info = TagInfo::new(name, commit.id().to_string());
            if let Ok(tag) = reference.peel_to_tag() {
                if let Some(msg) = tag.message() {
                    info = info.with_message(msg.trim());
                }
            }
            tags.push(info);
        }

        tags.sort_by(|a, b| a.name.cmp(&b.name));
        debug!(count = tags.len(), "listed all tags");
        Ok(tags)
    }

    /// Whether `commit` is HEAD or one of its ancestors
    pub fn is_ancestor_of_head(&self, commit: &str) -> Result<bool> {
        let head = self.head_commit()?.id();
        let commit = Oid::from_str(commit)?;
        if head == commit {
            return Ok(true);
        }
        Ok(self.repo.graph_descendant_of(head, commit)?)
    }

    /// Tags in a module's namespace that parse as semantic versions
    pub fn module_tags(&self, prefix: &str) -> Result<Vec<(TagInfo, Version)>> {
        Ok(self
            .tags()?
            .into_iter()
            .filter_map(|t| t.module_version(prefix).map(|v| (t, v)))
            .collect())
    }

    /// Highest semantic-version tag in `prefix`'s namespace reachable from HEAD.
    ///
    /// Tags on commits that are not ancestors of HEAD (other branches,
    /// future releases) are ignored.
    #[instrument(skip(self))]
    pub fn latest_reachable_tag(&self, prefix: &str) -> Result<Option<TagInfo>> {
        let mut candidates = Vec::new();
        for (tag, version) in self.module_tags(prefix)? {
            if self.is_ancestor_of_head(&tag.commit_hash)? {
                candidates.push((tag, version));
            }
        }

        candidates.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.name.cmp(&b.0.name)));
        let result = candidates.into_iter().next().map(|(t, _)| t);
        debug!(prefix, latest = ?result.as_ref().map(|t| &t.name), "found latest reachable tag");
        Ok(result)
    }

    /// Module tags pointing exactly at HEAD
    pub fn module_tags_at_head(&self, prefix: &str) -> Result<Vec<TagInfo>> {
        let head = self.head_commit()?.id().to_string();
        Ok(self
            .module_tags(prefix)?
            .into_iter()
            .map(|(t, _)| t)
            .filter(|t| t.commit_hash == head)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{commit_all, write};
    use git2::{Repository, Signature};
    use tempfile::TempDir;

    fn setup_repo_with_tag() -> (TempDir, Repository) {
        let temp = TempDir::new().unwrap();
        let repo = Repository::init(temp.path()).unwrap();
        write(temp.path(), "file.txt", "content");
        let oid = commit_all(&repo, "Initial commit");

        {
            let commit = repo.find_commit(oid).unwrap();
            repo.tag_lightweight("v1.0.0", commit.as_object(), false)
                .unwrap();
        }
        (temp, repo)
    }

    #[test]
    fn test_list_tags() {
        let (temp, _repo) = setup_repo_with_tag();
        let repo = GitRepo::open(temp.path()).unwrap();
        let tags = repo.tags().unwrap();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].name, "v1.0.0");
    }

    #[test]
    fn test_annotated_tag_message() {
        let (temp, raw) = setup_repo_with_tag();
        let sig = Signature::now("Test", "test@example.com").unwrap();
        let head = raw.head().unwrap().peel_to_commit().unwrap();
        raw.tag("v1.1.0", head.as_object(), &sig, "Release 1.1\n", false)
            .unwrap();

        let repo = GitRepo::open(temp.path()).unwrap();
        let tag = repo
            .tags()
            .unwrap()
            .into_iter()
            .find(|t| t.name == "v1.1.0")
            .unwrap();
        assert_eq!(tag.message.as_deref(), Some("Release 1.1"));
        assert_eq!(tag.commit_hash, head.id().to_string());
    }

    #[test]
    fn test_latest_reachable_tag_picks_highest_semver() {
        let (temp, raw) = setup_repo_with_tag();
        write(temp.path(), "file.txt", "second");
        let second = commit_all(&raw, "second");
        let commit = raw.find_commit(second).unwrap();
        raw.tag_lightweight("v1.10.0", commit.as_object(), false)
            .unwrap();
        raw.tag_lightweight("v1.9.0", commit.as_object(), false)
            .unwrap();
        raw.tag_lightweight("not-a-version", commit.as_object(), false)
            .unwrap();

        let repo = GitRepo::open(temp.path()).unwrap();
        let latest = repo.latest_reachable_tag("").unwrap().unwrap();
        assert_eq!(latest.name, "v1.10.0");
    }

    #[test]
    fn test_latest_reachable_tag_ignores_unreachable() {
        let (temp, raw) = setup_repo_with_tag();
        let base = raw.head().unwrap().peel_to_commit().unwrap();

        // A commit on a side branch, tagged higher than anything on HEAD
        let sig = Signature::now("Test", "test@example.com").unwrap();
        let tree = base.tree().unwrap();
        let side = raw
            .commit(None, &sig, &sig, "side", &tree, &[&base])
            .unwrap();
        let side_commit = raw.find_commit(side).unwrap();
        raw.tag_lightweight("v2.0.0", side_commit.as_object(), false)
            .unwrap();

        let repo = GitRepo::open(temp.path()).unwrap();
        let latest = repo.latest_reachable_tag("").unwrap().unwrap();
        assert_eq!(latest.name, "v1.0.0");
        assert!(!repo.is_ancestor_of_head(&side.to_string()).unwrap());
    }

    #[test]
    fn test_module_prefix_namespace() {
        let (temp, raw) = setup_repo_with_tag();
        let head = raw.head().unwrap().peel_to_commit().unwrap();
        raw.tag_lightweight("api/v0.3.0", head.as_object(), false)
            .unwrap();

        let repo = GitRepo::open(temp.path()).unwrap();
        let latest = repo.latest_reachable_tag("api/").unwrap().unwrap();
        assert_eq!(latest.name, "api/v0.3.0");

        let root = repo.latest_reachable_tag("").unwrap().unwrap();
        assert_eq!(root.name, "v1.0.0");

        let at_head = repo.module_tags_at_head("api/").unwrap();
        assert_eq!(at_head.len(), 1);
    }
}
