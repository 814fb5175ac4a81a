//! Locked, fetch-refreshed mirrors of local repositories
//!
//! A [`CachedWorktree`] gives the analysis engine a scratch checkout of a
//! source repository so that historical revisions can be inspected without
//! touching the user's working tree or index.
//!
//! The mirror lives under a cache root, keyed by the source's canonical
//! path. It is created with a hard-linked local clone, so the cache root
//! must share a filesystem with the source. Exclusive access is enforced by
//! atomically creating a lock directory next to the mirror; a second holder
//! fails immediately instead of waiting. A process that dies while holding
//! the lock leaves the directory behind and it has to be removed by hand.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};

use keel_core::config::{Config, DEFAULT_GIT_TIMEOUT_SECS};
use keel_core::error::{CacheError, GitError};

use crate::command::GitCommand;

/// Remote-tracking namespace that mirror branches are fetched into
const TRACKING_NAMESPACE: &str = "refs/remotes/source";

/// Where mirrors live and how long each git step may take
#[derive(Debug, Clone)]
pub struct CacheOptions {
    /// Directory holding mirrors and their lock markers
    pub cache_root: PathBuf,
    /// Timeout for each git subprocess
    pub timeout: Duration,
}

impl CacheOptions {
    /// Options with the default git timeout
    pub fn new(cache_root: impl Into<PathBuf>) -> Self {
        Self {
            cache_root: cache_root.into(),
            timeout: Duration::from_secs(DEFAULT_GIT_TIMEOUT_SECS),
        }
    }

    /// Options derived from loaded configuration
    pub fn from_config(config: &Config) -> Self {
        Self {
            cache_root: config.cache.dir.clone(),
            timeout: config.git.timeout(),
        }
    }

    /// Override the timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// A locked mirror of one source repository
#[derive(Debug)]
pub struct CachedWorktree {
    source: PathBuf,
    cache_root: PathBuf,
    mirror: PathBuf,
    lock: PathBuf,
    timeout: Duration,
    locked: bool,
}

impl CachedWorktree {
    /// Deterministic cache key for a canonical source path.
    ///
    /// The directory name keeps mirrors recognisable; the hash keeps
    /// same-named repositories in different places apart.
    pub fn cache_key(source: &Path) -> String {
        let label: String = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "root".to_string())
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                    c
                } else {
                    '_'
                }
            })
            .collect();

        let mut hasher = Sha256::new();
        hasher.update(source.to_string_lossy().as_bytes());
        let digest = format!("{:x}", hasher.finalize());

        format!("{}-{}", label, &digest[..16])
    }

    /// Acquire the mirror for `source`, cloning it on first use and
    /// refreshing it from the source every time.
    ///
    /// Fails with [`CacheError::Locked`] when another handle holds the
    /// mirror. Any failure after the lock is taken releases it again.
    #[instrument(skip(options), fields(source = %source.display()))]
    pub fn open(source: &Path, options: &CacheOptions) -> Result<Self, CacheError> {
        let source = source
            .canonicalize()
            .map_err(|_| CacheError::SourceNotFound(source.to_path_buf()))?;
        if !source.join(".git").exists() {
            return Err(CacheError::SourceNotFound(source));
        }

        fs::create_dir_all(&options.cache_root).map_err(|e| CacheError::Io {
            path: options.cache_root.clone(),
            source: e,
        })?;
        let cache_root = options
            .cache_root
            .canonicalize()
            .map_err(|e| CacheError::Io {
                path: options.cache_root.clone(),
                source: e,
            })?;

        check_same_device(&cache_root, &source)?;

        let key = Self::cache_key(&source);
        let mirror = cache_root.join(&key);
        let lock = cache_root.join(format!("{}.lock", key));

        match fs::create_dir(&lock) {
            Ok(()) => debug!(lock = %lock.display(), "acquired mirror lock"),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(CacheError::Locked(lock));
            }
            Err(e) => return Err(CacheError::Io { path: lock, source: e }),
        }

        // From here on, dropping `worktree` releases the lock
        let mut worktree = Self {
            source,
            cache_root,
            mirror,
            lock,
            timeout: options.timeout,
            locked: true,
        };
        worktree.prepare()?;

        info!(mirror = %worktree.mirror.display(), "cached worktree ready");
        Ok(worktree)
    }

    fn prepare(&mut self) -> Result<(), CacheError> {
        if !self.mirror.join(".git").exists() {
            if self.mirror.exists() {
                warn!(mirror = %self.mirror.display(), "removing incomplete mirror");
                fs::remove_dir_all(&self.mirror).map_err(|e| CacheError::Io {
                    path: self.mirror.clone(),
                    source: e,
                })?;
            }
            self.clone_source()?;
        }
        self.refresh()?;
        self.verify()
    }

    fn clone_source(&self) -> Result<(), CacheError> {
        info!(source = %self.source.display(), mirror = %self.mirror.display(), "cloning mirror");
        self.git_in(&self.cache_root)
            .args(["clone", "--local", "--no-checkout", "--quiet"])
            .arg(&self.source)
            .arg(&self.mirror)
            .run()
            .map_err(step("clone"))?;
        Ok(())
    }

    /// Fetch every branch and tag from the source.
    ///
    /// Branches land in a remote-tracking namespace so repeated detached
    /// checkouts never collide with a local branch.
    fn refresh(&self) -> Result<(), CacheError> {
        debug!(mirror = %self.mirror.display(), "refreshing mirror");
        self.git_in(&self.mirror)
            .args(["fetch", "--prune", "--force", "--quiet"])
            .arg(&self.source)
            .arg(format!("+refs/heads/*:{}/*", TRACKING_NAMESPACE))
            .arg("+refs/tags/*:refs/tags/*")
            .run()
            .map_err(step("fetch"))?;
        Ok(())
    }

    /// Guard against a cache path that was redirected or corrupted
    fn verify(&self) -> Result<(), CacheError> {
        let canonical = self.mirror.canonicalize().map_err(|e| CacheError::Io {
            path: self.mirror.clone(),
            source: e,
        })?;
        if !canonical.starts_with(&self.cache_root) {
            return Err(CacheError::NotContained {
                mirror: canonical,
                cache_root: self.cache_root.clone(),
            });
        }

        let git_dir = canonical.join(".git");
        let is_dir = fs::symlink_metadata(&git_dir)
            .map(|m| m.is_dir())
            .unwrap_or(false);
        if !is_dir {
            return Err(CacheError::NotARepository(canonical));
        }
        Ok(())
    }

    /// Force the mirror to exactly `rev`'s tree and remove untracked files.
    ///
    /// `rev` may be a tag, a commit hash or a fetched branch such as
    /// `source/main`.
    #[instrument(skip(self), fields(mirror = %self.mirror.display()))]
    pub fn checkout(&mut self, rev: &str) -> Result<&Path, CacheError> {
        if !self.locked {
            return Err(CacheError::Closed(self.source.clone()));
        }
        self.verify()?;

        self.git_in(&self.mirror)
            .args(["checkout", "--force", "--detach", "--quiet", rev])
            .run()
            .map_err(step("checkout"))?;
        self.git_in(&self.mirror)
            .args(["clean", "-ffdx", "--quiet"])
            .run()
            .map_err(step("clean"))?;

        info!(rev, "checked out revision in mirror");
        Ok(self.mirror.as_path())
    }

    /// Commit hash the mirror currently has checked out
    pub fn head(&self) -> Result<String, CacheError> {
        self.git_in(&self.mirror)
            .args(["rev-parse", "HEAD"])
            .run()
            .map_err(step("rev-parse"))
    }

    /// Release the lock. Safe to call more than once.
    pub fn close(&mut self) -> Result<(), CacheError> {
        if !self.locked {
            return Ok(());
        }
        self.locked = false;
        match fs::remove_dir(&self.lock) {
            Ok(()) => {
                debug!(lock = %self.lock.display(), "released mirror lock");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::Io {
                path: self.lock.clone(),
                source: e,
            }),
        }
    }

    /// Mirror working directory
    pub fn path(&self) -> &Path {
        &self.mirror
    }

    /// A directory inside the mirror, e.g. a module's relative path
    pub fn tree(&self, relative: &str) -> PathBuf {
        if relative.is_empty() {
            self.mirror.clone()
        } else {
            self.mirror.join(relative)
        }
    }

    /// Canonical path of the source repository
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Location of the lock marker
    pub fn lock_path(&self) -> &Path {
        &self.lock
    }

    /// Whether this handle still holds the lock
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    fn git_in(&self, dir: &Path) -> GitCommand {
        GitCommand::new(dir).timeout(self.timeout)
    }
}

impl Drop for CachedWorktree {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "failed to release mirror lock");
        }
    }
}

fn step(name: &'static str) -> impl Fn(GitError) -> CacheError {
    move |source| CacheError::Step { step: name, source }
}

#[cfg(unix)]
fn check_same_device(cache_root: &Path, source: &Path) -> Result<(), CacheError> {
    use std::os::unix::fs::MetadataExt;

    let device = |path: &Path| {
        fs::metadata(path)
            .map(|m| m.dev())
            .map_err(|e| CacheError::Io {
                path: path.to_path_buf(),
                source: e,
            })
    };

    if device(cache_root)? != device(source)? {
        return Err(CacheError::CrossDevice {
            cache_root: cache_root.to_path_buf(),
            source_repo: source.to_path_buf(),
        });
    }
    Ok(())
}

#[cfg(not(unix))]
fn check_same_device(cache_root: &Path, _source: &Path) -> Result<(), CacheError> {
    debug!(cache_root = %cache_root.display(), "device check unavailable on this platform");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{commit_all, write};
    use git2::Repository;
    use tempfile::TempDir;

    struct Fixture {
        // Source and cache share one temp dir so they share a device
        _temp: TempDir,
        source: PathBuf,
        options: CacheOptions,
        repo: Repository,
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("project");
        std::fs::create_dir_all(&source).unwrap();
        let repo = Repository::init(&source).unwrap();

        write(&source, "go.mod", "module example.com/project\n");
        write(&source, "a.go", "package project\n\nfunc A() {}\n");
        let first = commit_all(&repo, "first");
        repo.tag_lightweight("v1.0.0", &repo.find_object(first, None).unwrap(), false)
            .unwrap();

        write(&source, "b.go", "package project\n\nfunc B() {}\n");
        let second = commit_all(&repo, "second");
        repo.tag_lightweight("v1.1.0", &repo.find_object(second, None).unwrap(), false)
            .unwrap();

        let options = CacheOptions::new(temp.path().join("cache"));
        Fixture {
            _temp: temp,
            source,
            options,
            repo,
        }
    }

    #[test]
    fn test_cache_key_is_stable_and_distinct() {
        let a = CachedWorktree::cache_key(Path::new("/work/one/project"));
        let b = CachedWorktree::cache_key(Path::new("/work/two/project"));
        assert!(a.starts_with("project-"));
        assert_ne!(a, b);
        assert_eq!(a, CachedWorktree::cache_key(Path::new("/work/one/project")));
    }

    #[test]
    fn test_checkout_switches_trees_without_leaking_files() {
        let fx = fixture();
        let mut wt = CachedWorktree::open(&fx.source, &fx.options).unwrap();

        let tree = wt.checkout("v1.1.0").unwrap().to_path_buf();
        assert!(tree.join("b.go").exists());

        std::fs::write(tree.join("scratch.txt"), "leftover").unwrap();
        std::fs::write(tree.join("a.go"), "package project\n").unwrap();

        let tree = wt.checkout("v1.0.0").unwrap().to_path_buf();
        assert!(tree.join("a.go").exists());
        assert!(!tree.join("b.go").exists());
        assert!(!tree.join("scratch.txt").exists());
        assert_eq!(
            std::fs::read_to_string(tree.join("a.go")).unwrap(),
            "package project\n\nfunc A() {}\n"
        );
    }

    #[test]
    fn test_source_worktree_untouched() {
        let fx = fixture();
        write(&fx.source, "wip.go", "package project\n");
        let mut wt = CachedWorktree::open(&fx.source, &fx.options).unwrap();
        wt.checkout("v1.0.0").unwrap();

        assert!(fx.source.join("wip.go").exists());
        assert!(fx.source.join("b.go").exists());
        let head = fx.repo.head().unwrap().peel_to_commit().unwrap();
        assert_eq!(head.message(), Some("second"));
    }

    #[test]
    fn test_second_open_is_rejected_while_locked() {
        let fx = fixture();
        let mut first = CachedWorktree::open(&fx.source, &fx.options).unwrap();

        let second = CachedWorktree::open(&fx.source, &fx.options);
        assert!(matches!(second, Err(CacheError::Locked(_))));

        // The first handle is unaffected
        assert!(first.is_locked());
        assert!(first.checkout("v1.0.0").is_ok());
    }

    #[test]
    fn test_close_is_idempotent_and_allows_reopen() {
        let fx = fixture();
        let mut wt = CachedWorktree::open(&fx.source, &fx.options).unwrap();
        let lock = wt.lock_path().to_path_buf();
        let first_head = {
            wt.checkout("v1.1.0").unwrap();
            wt.head().unwrap()
        };

        wt.close().unwrap();
        wt.close().unwrap();
        assert!(!lock.exists());
        assert!(matches!(wt.checkout("v1.0.0"), Err(CacheError::Closed(_))));

        let mut again = CachedWorktree::open(&fx.source, &fx.options).unwrap();
        again.checkout("v1.1.0").unwrap();
        assert_eq!(again.head().unwrap(), first_head);
        assert_eq!(again.path(), wt.path());
    }

    #[test]
    fn test_drop_releases_lock() {
        let fx = fixture();
        let lock = {
            let wt = CachedWorktree::open(&fx.source, &fx.options).unwrap();
            wt.lock_path().to_path_buf()
        };
        assert!(!lock.exists());
        assert!(CachedWorktree::open(&fx.source, &fx.options).is_ok());
    }

    #[test]
    fn test_refresh_picks_up_new_source_commits() {
        let fx = fixture();
        drop(CachedWorktree::open(&fx.source, &fx.options).unwrap());

        write(&fx.source, "c.go", "package project\n\nfunc C() {}\n");
        let third = commit_all(&fx.repo, "third");
        fx.repo
            .tag_lightweight("v1.2.0", &fx.repo.find_object(third, None).unwrap(), false)
            .unwrap();

        let mut wt = CachedWorktree::open(&fx.source, &fx.options).unwrap();
        let tree = wt.checkout("v1.2.0").unwrap();
        assert!(tree.join("c.go").exists());
    }

    #[test]
    fn test_unknown_revision_fails_and_keeps_lock_until_close() {
        let fx = fixture();
        let mut wt = CachedWorktree::open(&fx.source, &fx.options).unwrap();
        let err = wt.checkout("v9.9.9").unwrap_err();
        assert!(matches!(err, CacheError::Step { step: "checkout", .. }));

        let lock = wt.lock_path().to_path_buf();
        drop(wt);
        assert!(!lock.exists());
    }

    #[test]
    fn test_missing_source() {
        let temp = TempDir::new().unwrap();
        let options = CacheOptions::new(temp.path().join("cache"));
        let result = CachedWorktree::open(&temp.path().join("nope"), &options);
        assert!(matches!(result, Err(CacheError::SourceNotFound(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_redirected_mirror_is_rejected_and_unlocked() {
        let fx = fixture();
        let source = fx.source.canonicalize().unwrap();
        std::fs::create_dir_all(&fx.options.cache_root).unwrap();
        let cache_root = fx.options.cache_root.canonicalize().unwrap();

        // Point the mirror slot at a clone outside the cache root
        let outside = TempDir::new_in(fx.source.parent().unwrap()).unwrap();
        let elsewhere = outside.path().join("elsewhere");
        GitCommand::new(outside.path())
            .args(["clone", "--quiet"])
            .arg(&source)
            .arg(&elsewhere)
            .run()
            .unwrap();
        let slot = cache_root.join(CachedWorktree::cache_key(&source));
        std::os::unix::fs::symlink(&elsewhere, &slot).unwrap();

        let err = CachedWorktree::open(&fx.source, &fx.options).unwrap_err();
        assert!(matches!(err, CacheError::NotContained { .. }));

        let lock = cache_root.join(format!("{}.lock", CachedWorktree::cache_key(&source)));
        assert!(!lock.exists());
    }
}
