//! [`AuditLog`] backed by a git working tree and the `git` CLI.
//!
//! Entries are files committed at the top level of the tree. A mutation is
//! staged, committed with a fixed author, and pushed to `origin`; if any
//! step fails the working tree and branch are reset to the previous head.
//! Only committed files are entries, and on open a clone is reset to what
//! `origin` has, so untracked files and unpushed commits are never read.

use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info, instrument, warn};

use super::{commit_message, validate_name, AuditLog, CommitId};
use crate::config::RgetConfig;
use crate::error::RgetError;

/// How to open a [`GitAuditLog`].
#[derive(Debug, Clone)]
pub struct GitAuditOptions {
    /// Working tree.
    pub dir: PathBuf,
    /// Remote to clone from when `dir` is absent. Without one a local
    /// repository is initialized and nothing is pushed.
    pub remote: Option<String>,
    /// Commit author name.
    pub author_name: String,
    /// Commit author email.
    pub author_email: String,
}

impl GitAuditOptions {
    /// Options from the process configuration.
    #[must_use]
    pub fn from_config(config: &RgetConfig) -> Self {
        Self {
            dir: config.cache_dir.clone(),
            remote: config.git_remote.clone(),
            author_name: config.author_name.clone(),
            author_email: config.author_email.clone(),
        }
    }
}

/// Git-backed audit log.
#[derive(Debug)]
pub struct GitAuditLog {
    dir: PathBuf,
    author_name: String,
    author_email: String,
    has_remote: bool,
}

fn run_git<I, S>(dir: Option<&Path>, args: I) -> Result<String, RgetError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let args: Vec<_> = args.into_iter().map(|a| a.as_ref().to_os_string()).collect();
    let mut cmd = Command::new("git");
    if let Some(dir) = dir {
        cmd.arg("-C").arg(dir);
    }
    let output = cmd
        .args(&args)
        .env("GIT_TERMINAL_PROMPT", "0")
        .output()
        .map_err(|e| RgetError::CacheUnavailable {
            message: format!("failed to run git: {e}"),
        })?;

    if !output.status.success() {
        let subcommand = args
            .iter()
            .map(|a| a.to_string_lossy())
            .find(|a| !a.starts_with('-') && !a.contains('='))
            .unwrap_or_default();
        return Err(RgetError::CacheUnavailable {
            message: format!(
                "git {subcommand} failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

impl GitAuditLog {
    /// Open the working tree, cloning or initializing it if absent.
    ///
    /// An existing clone is fetched and hard reset to its upstream; commits
    /// that never reached `origin` are dropped. A failed fetch is logged and
    /// the last fetched upstream used. Untracked files are removed.
    #[instrument(skip(options), fields(dir = %options.dir.display()))]
    pub fn open(options: GitAuditOptions) -> Result<Self, RgetError> {
        let existed = options.dir.exists();
        if !existed {
            match &options.remote {
                Some(remote) => {
                    info!(remote = %remote, "Cloning audit repository");
                    run_git(
                        None,
                        [
                            OsStr::new("clone"),
                            OsStr::new("--quiet"),
                            OsStr::new("--"),
                            OsStr::new(remote),
                            options.dir.as_os_str(),
                        ],
                    )?;
                }
                None => {
                    info!("Initializing local audit repository");
                    fs::create_dir_all(&options.dir)?;
                    run_git(Some(&options.dir), ["init", "--quiet"])?;
                }
            }
        }

        let mut log = Self {
            dir: options.dir,
            author_name: options.author_name,
            author_email: options.author_email,
            has_remote: false,
        };
        log.has_remote = log.git(["remote", "get-url", "origin"]).is_ok();

        if existed {
            if !log.dir.join(".git").exists() {
                return Err(RgetError::CacheUnavailable {
                    message: format!("{} is not a git working tree", log.dir.display()),
                });
            }
            log.sync()?;
        }
        Ok(log)
    }

    /// Bring the working tree back to the published state.
    fn sync(&self) -> Result<(), RgetError> {
        if self.has_remote {
            if let Err(e) = self.git(["fetch", "--quiet", "origin"]) {
                warn!(error = %e, "Fetch failed; using last fetched audit state");
            }
            let upstream = self.git(["rev-parse", "--verify", "--quiet", "@{upstream}"]).ok();
            match (upstream, self.head()) {
                (Some(upstream), head) => {
                    if head.as_deref() != Some(upstream.as_str()) {
                        info!(head = ?head, upstream = %upstream, "Resetting audit tree to upstream");
                    }
                    self.git(["reset", "--quiet", "--hard", upstream.as_str()])?;
                }
                (None, Some(head)) => {
                    warn!(head = %head, "Nothing was ever pushed; discarding local commits");
                    self.git(["update-ref", "-d", "HEAD"])?;
                    self.git(["read-tree", "--empty"])?;
                }
                (None, None) => {}
            }
        } else if self.head().is_some() {
            self.git(["reset", "--quiet", "--hard", "HEAD"])?;
        }
        self.git(["clean", "--quiet", "--force", "-d"])?;
        Ok(())
    }

    /// Working tree path.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn git<I, S>(&self, args: I) -> Result<String, RgetError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        run_git(Some(&self.dir), args)
    }

    fn head(&self) -> Option<String> {
        self.git(["rev-parse", "--verify", "--quiet", "HEAD"]).ok()
    }

    fn commit(&self, message: &str) -> Result<CommitId, RgetError> {
        let user_name = format!("user.name={}", self.author_name);
        let user_email = format!("user.email={}", self.author_email);
        self.git([
            "-c",
            user_name.as_str(),
            "-c",
            user_email.as_str(),
            "-c",
            "commit.gpgsign=false",
            "commit",
            "--quiet",
            "--allow-empty",
            "-m",
            message,
        ])?;
        Ok(CommitId(self.git(["rev-parse", "HEAD"])?))
    }

    /// Stage with `stage`, commit, push; roll back on any failure.
    fn mutate(
        &self,
        verb: &str,
        name: &str,
        stage: impl FnOnce(&Self) -> Result<(), RgetError>,
    ) -> Result<CommitId, RgetError> {
        let prev = self.head();
        let result = stage(self)
            .and_then(|()| self.commit(&commit_message(verb, name)))
            .and_then(|id| {
                if self.has_remote {
                    self.git(["push", "--quiet", "--set-upstream", "origin", "HEAD"])?;
                }
                Ok(id)
            });

        match result {
            Ok(id) => {
                info!(commit = %id, "{}: {}", verb, name);
                Ok(id)
            }
            Err(e) => {
                warn!(name = %name, error = %e, "Audit commit failed; rolling back");
                match self.rollback(prev.as_deref(), name) {
                    Ok(()) => Err(match e {
                        RgetError::CacheUnavailable { .. } => e,
                        other => RgetError::CacheUnavailable {
                            message: other.to_string(),
                        },
                    }),
                    Err(re) => Err(RgetError::CacheDiverged {
                        message: format!("{e}; rollback failed: {re}"),
                    }),
                }
            }
        }
    }

    fn rollback(&self, prev: Option<&str>, name: &str) -> Result<(), RgetError> {
        let path = self.dir.join(name);
        match prev {
            Some(rev) => {
                self.git(["reset", "--quiet", "--hard", rev])?;
                if !self.is_tracked(name) && path.exists() {
                    fs::remove_file(&path)?;
                }
            }
            None => {
                // Unborn branch: drop the commit ref if one was made.
                let _ = self.git(["update-ref", "-d", "HEAD"]);
                self.git(["read-tree", "--empty"])?;
                if path.exists() {
                    fs::remove_file(&path)?;
                }
            }
        }
        debug!(name = %name, "Rolled back");
        Ok(())
    }

    /// Committed entry names, sorted.
    fn list(&self) -> Result<Vec<String>, RgetError> {
        if self.head().is_none() {
            return Ok(Vec::new());
        }
        // `<mode> <type> <object>\t<name>`, NUL separated.
        let out = self.git(["ls-tree", "-z", "HEAD"])?;
        let mut names: Vec<String> = out
            .split('\0')
            .filter_map(|line| {
                let (meta, name) = line.split_once('\t')?;
                (meta.split(' ').nth(1) == Some("blob") && !name.starts_with('.'))
                    .then(|| name.to_string())
            })
            .collect();
        names.sort();
        Ok(names)
    }

    fn is_tracked(&self, name: &str) -> bool {
        self.git(["ls-files", "--error-unmatch", "--", name]).is_ok()
    }
}

impl AuditLog for GitAuditLog {
    fn append(&mut self, name: &str, data: &[u8]) -> Result<CommitId, RgetError> {
        validate_name(name)?;
        self.mutate("put", name, |log| {
            fs::write(log.dir.join(name), data)?;
            log.git(["add", "--", name])?;
            Ok(())
        })
    }

    fn remove(&mut self, name: &str) -> Result<CommitId, RgetError> {
        validate_name(name)?;
        if !self.is_tracked(name) {
            return Err(RgetError::NotFound { name: name.into() });
        }
        self.mutate("delete", name, |log| {
            log.git(["rm", "--quiet", "--", name])?;
            Ok(())
        })
    }

    fn read(&self, name: &str) -> Result<Vec<u8>, RgetError> {
        validate_name(name)?;
        if !self.is_tracked(name) {
            return Err(RgetError::NotFound { name: name.into() });
        }
        fs::read(self.dir.join(name)).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => RgetError::NotFound { name: name.into() },
            _ => e.into(),
        })
    }

    fn prefix_scan(&self, prefix: &str) -> Result<Vec<String>, RgetError> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|name| name.starts_with(prefix))
            .collect())
    }

    fn entries(&self) -> Result<BTreeMap<String, Vec<u8>>, RgetError> {
        self.list()?
            .into_iter()
            .map(|name| {
                let data = fs::read(self.dir.join(&name))?;
                Ok((name, data))
            })
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Create an empty bare repository to act as `origin`.
    pub(crate) fn init_remote(root: &Path) -> PathBuf {
        let remote = root.join("remote.git");
        run_git(None, [OsStr::new("init"), OsStr::new("--bare"), OsStr::new("--quiet"), remote.as_os_str()]).unwrap();
        remote
    }

    /// Commit subjects in `remote`, newest first.
    pub(crate) fn remote_subjects(remote: &Path) -> Vec<String> {
        let out = run_git(
            None,
            [
                OsStr::new("--git-dir"),
                remote.as_os_str(),
                OsStr::new("log"),
                OsStr::new("--all"),
                OsStr::new("--format=%s"),
            ],
        )
        .unwrap_or_default();
        out.lines().map(String::from).collect()
    }

    pub(crate) fn options(dir: PathBuf, remote: Option<&Path>) -> GitAuditOptions {
        GitAuditOptions {
            dir,
            remote: remote.map(|r| r.display().to_string()),
            author_name: "Merkle County Recorder".into(),
            author_email: "security@merklecounty.com".into(),
        }
    }

    #[test]
    fn test_put_commits_and_pushes() {
        let tmp = tempfile::tempdir().unwrap();
        let remote = init_remote(tmp.path());
        let mut log = GitAuditLog::open(options(tmp.path().join("cache"), Some(&remote))).unwrap();

        log.append("dummy1", b"one").unwrap();
        log.append("dummy2", b"two").unwrap();

        assert_eq!(log.read("dummy1").unwrap(), b"one");
        assert_eq!(remote_subjects(&remote), ["put: dummy2", "put: dummy1"]);

        let author = run_git(
            None,
            [
                OsStr::new("--git-dir"),
                remote.as_os_str(),
                OsStr::new("log"),
                OsStr::new("-1"),
                OsStr::new("--format=%an <%ae>"),
            ],
        )
        .unwrap();
        assert_eq!(author, "Merkle County Recorder <security@merklecounty.com>");
    }

    #[test]
    fn test_identical_put_still_commits() {
        let tmp = tempfile::tempdir().unwrap();
        let remote = init_remote(tmp.path());
        let mut log = GitAuditLog::open(options(tmp.path().join("cache"), Some(&remote))).unwrap();

        log.append("same", b"x").unwrap();
        log.append("same", b"x").unwrap();
        assert_eq!(remote_subjects(&remote).len(), 2);
    }

    #[test]
    fn test_remove() {
        let tmp = tempfile::tempdir().unwrap();
        let remote = init_remote(tmp.path());
        let mut log = GitAuditLog::open(options(tmp.path().join("cache"), Some(&remote))).unwrap();

        log.append("gone", b"x").unwrap();
        log.remove("gone").unwrap();
        assert!(matches!(log.read("gone"), Err(RgetError::NotFound { .. })));
        assert!(matches!(log.remove("gone"), Err(RgetError::NotFound { .. })));
        assert_eq!(remote_subjects(&remote), ["delete: gone", "put: gone"]);
    }

    #[test]
    fn test_push_failure_rolls_back() {
        let tmp = tempfile::tempdir().unwrap();
        let remote = init_remote(tmp.path());
        let mut log = GitAuditLog::open(options(tmp.path().join("cache"), Some(&remote))).unwrap();
        log.append("kept", b"x").unwrap();
        let head = log.head();

        let missing = tmp.path().join("missing.git");
        log.git([OsStr::new("remote"), OsStr::new("set-url"), OsStr::new("origin"), missing.as_os_str()])
            .unwrap();

        let err = log.append("lost", b"y").unwrap_err();
        assert!(matches!(err, RgetError::CacheUnavailable { .. }));
        assert!(matches!(log.read("lost"), Err(RgetError::NotFound { .. })));
        assert_eq!(log.head(), head);
        assert_eq!(log.prefix_scan("").unwrap(), ["kept"]);

        let err = log.remove("kept").unwrap_err();
        assert!(matches!(err, RgetError::CacheUnavailable { .. }));
        assert_eq!(log.read("kept").unwrap(), b"x");
    }

    #[test]
    fn test_first_push_failure_leaves_unborn_branch() {
        let tmp = tempfile::tempdir().unwrap();
        let remote = init_remote(tmp.path());
        let mut log = GitAuditLog::open(options(tmp.path().join("cache"), Some(&remote))).unwrap();

        let missing = tmp.path().join("missing.git");
        log.git([OsStr::new("remote"), OsStr::new("set-url"), OsStr::new("origin"), missing.as_os_str()])
            .unwrap();

        assert!(log.append("lost", b"y").is_err());
        assert!(log.head().is_none());
        assert!(log.entries().unwrap().is_empty());
    }

    #[test]
    fn test_reopen_sees_pushed_entries() {
        let tmp = tempfile::tempdir().unwrap();
        let remote = init_remote(tmp.path());
        {
            let mut writer = GitAuditLog::open(options(tmp.path().join("a"), Some(&remote))).unwrap();
            writer.append("dummy1", b"1").unwrap();
        }
        let reader = GitAuditLog::open(options(tmp.path().join("b"), Some(&remote))).unwrap();
        assert_eq!(reader.read("dummy1").unwrap(), b"1");

        let mut writer = GitAuditLog::open(options(tmp.path().join("a"), Some(&remote))).unwrap();
        writer.append("dummy2", b"2").unwrap();

        let reader = GitAuditLog::open(options(tmp.path().join("b"), Some(&remote))).unwrap();
        assert_eq!(reader.prefix_scan("dummy").unwrap(), ["dummy1", "dummy2"]);
    }

    #[test]
    fn test_reopen_ignores_unaudited_state() {
        let tmp = tempfile::tempdir().unwrap();
        let remote = init_remote(tmp.path());
        let dir = tmp.path().join("cache");
        {
            let mut log = GitAuditLog::open(options(dir.clone(), Some(&remote))).unwrap();
            log.append("kept", b"x").unwrap();

            fs::write(dir.join("stray"), b"unaudited").unwrap();
            fs::write(dir.join("ghost"), b"local only").unwrap();
            log.git(["add", "--", "ghost"]).unwrap();
            log.commit("put: ghost").unwrap();
        }

        let log = GitAuditLog::open(options(dir.clone(), Some(&remote))).unwrap();
        assert_eq!(remote_subjects(&remote), ["put: kept"]);
        assert!(matches!(log.read("stray"), Err(RgetError::NotFound { .. })));
        assert!(matches!(log.read("ghost"), Err(RgetError::NotFound { .. })));
        assert_eq!(log.entries().unwrap().into_keys().collect::<Vec<_>>(), ["kept"]);
        assert!(!dir.join("stray").exists());
    }

    #[test]
    fn test_untracked_file_is_not_an_entry() {
        let tmp = tempfile::tempdir().unwrap();
        let mut log = GitAuditLog::open(options(tmp.path().join("local"), None)).unwrap();
        log.append("kept", b"x").unwrap();
        fs::write(log.dir().join("stray"), b"unaudited").unwrap();

        assert!(matches!(log.read("stray"), Err(RgetError::NotFound { .. })));
        assert_eq!(log.prefix_scan("").unwrap(), ["kept"]);
        assert!(matches!(log.remove("stray"), Err(RgetError::NotFound { .. })));
    }

    #[test]
    fn test_never_pushed_commits_dropped_on_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let remote = init_remote(tmp.path());
        let dir = tmp.path().join("cache");
        {
            let log = GitAuditLog::open(options(dir.clone(), Some(&remote))).unwrap();
            fs::write(dir.join("ghost"), b"local only").unwrap();
            log.git(["add", "--", "ghost"]).unwrap();
            log.commit("put: ghost").unwrap();
        }

        let log = GitAuditLog::open(options(dir, Some(&remote))).unwrap();
        assert!(log.head().is_none());
        assert!(log.entries().unwrap().is_empty());
        assert!(remote_subjects(&remote).is_empty());
    }

    #[test]
    fn test_open_refuses_plain_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let err = GitAuditLog::open(options(tmp.path().to_path_buf(), None)).unwrap_err();
        assert!(matches!(err, RgetError::CacheUnavailable { .. }));
    }

    #[test]
    fn test_local_only_repository() {
        let tmp = tempfile::tempdir().unwrap();
        let mut log = GitAuditLog::open(options(tmp.path().join("local"), None)).unwrap();
        log.append("dummy1", b"1").unwrap();
        assert_eq!(log.entries().unwrap().len(), 1);
        assert!(!log.has_remote);
    }

    #[test]
    fn test_invalid_names_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let mut log = GitAuditLog::open(options(tmp.path().join("local"), None)).unwrap();
        assert!(matches!(log.append("../x", b"1"), Err(RgetError::InvalidName { .. })));
        assert!(matches!(log.read(".git"), Err(RgetError::InvalidName { .. })));
    }
}
