pub mod git;
pub mod license;

pub use git::{CloneDepth, CommitInfo, GitCli, VersionControl};
pub use license::{LicenseLookup, LicenseOrigin, LicenseResolver};

use crate::config::MinerConfig;
use crate::error::FetchError;
use crate::model::{RepoInfo, RepositoryCandidate};
use chrono::NaiveDate;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitSelection {
    InWindow,
    HeadFallback,
}

/// A working copy checked out at the chosen commit.
///
/// The directory stays on disk until [`CheckedOutCommit::remove`] is called, so
/// extraction can be retried against it.
#[derive(Debug)]
pub struct CheckedOutCommit {
    pub candidate: RepositoryCandidate,
    pub commit_sha: String,
    pub license: Option<String>,
    pub license_origin: LicenseOrigin,
    pub working_copy: PathBuf,
    pub selection: CommitSelection,
}

impl CheckedOutCommit {
    pub fn repo_info(&self) -> RepoInfo {
        RepoInfo {
            name: self.candidate.name.clone(),
            owner: self.candidate.owner.clone(),
            full_name: self.candidate.full_name(),
            url: self.candidate.html_url.clone(),
            commit_sha: self.commit_sha.clone(),
            license: self.license.clone(),
            stars: self.candidate.stars,
        }
    }

    pub fn remove(self) -> Result<(), FetchError> {
        remove_dir(&self.working_copy)
    }
}

#[derive(Debug, Clone)]
pub struct FetcherOptions {
    pub since: NaiveDate,
    pub until: NaiveDate,
    pub fallback_to_head: bool,
    pub shallow: bool,
}

impl FetcherOptions {
    pub fn from_config(config: &MinerConfig) -> Self {
        Self {
            since: config.since_date,
            until: config.until_date,
            fallback_to_head: config.fallback_to_head,
            shallow: config.shallow,
        }
    }
}

#[derive(Clone)]
pub struct Fetcher {
    vcs: Arc<dyn VersionControl>,
    licenses: LicenseResolver,
    options: FetcherOptions,
}

impl Fetcher {
    pub fn new(vcs: Arc<dyn VersionControl>, licenses: LicenseResolver, options: FetcherOptions) -> Self {
        Self {
            vcs,
            licenses,
            options,
        }
    }

    /// Clone into `clone_root/owner__name` and check out the selected commit.
    ///
    /// On failure the partial directory is removed here, since no
    /// `CheckedOutCommit` exists for the caller to clean up.
    pub fn fetch(
        &self,
        candidate: &RepositoryCandidate,
        clone_root: &Path,
    ) -> Result<CheckedOutCommit, FetchError> {
        let dest = clone_root.join(working_copy_name(candidate));
        if dest.exists() {
            tracing::debug!(path = %dest.display(), "removing stale working copy");
            remove_dir(&dest)?;
        }
        fs::create_dir_all(clone_root).map_err(|source| FetchError::Io {
            path: clone_root.to_path_buf(),
            source,
        })?;

        match self.clone_and_checkout(candidate, &dest) {
            Ok(checked_out) => Ok(checked_out),
            Err(err) => {
                if dest.exists() {
                    if let Err(cleanup) = remove_dir(&dest) {
                        tracing::warn!(path = %dest.display(), error = %cleanup, "cleanup after failed fetch");
                    }
                }
                Err(err)
            }
        }
    }

    fn clone_and_checkout(
        &self,
        candidate: &RepositoryCandidate,
        dest: &Path,
    ) -> Result<CheckedOutCommit, FetchError> {
        let depth = if self.options.shallow {
            CloneDepth::ShallowSince(self.options.since)
        } else {
            CloneDepth::Blobless
        };
        self.vcs.clone_repo(&candidate.clone_url, dest, depth)?;

        let (commit, selection) = self.select_commit(dest)?;
        self.vcs.checkout(dest, &commit.sha)?;
        let (license, license_origin) = self.licenses.resolve(candidate);

        tracing::info!(
            repo = %candidate.full_name(),
            sha = %commit.sha,
            committed_at = commit.timestamp,
            selection = ?selection,
            license = license.as_deref().unwrap_or("unknown"),
            "checked out"
        );
        Ok(CheckedOutCommit {
            candidate: candidate.clone(),
            commit_sha: commit.sha,
            license,
            license_origin,
            working_copy: dest.to_path_buf(),
            selection,
        })
    }

    fn select_commit(&self, repo: &Path) -> Result<(CommitInfo, CommitSelection), FetchError> {
        let commits = self
            .vcs
            .list_commits(repo, self.options.since, self.options.until)?;
        if let Some(latest) = commits.into_iter().max_by_key(|c| c.timestamp) {
            return Ok((latest, CommitSelection::InWindow));
        }
        if self.options.fallback_to_head {
            return Ok((self.vcs.head(repo)?, CommitSelection::HeadFallback));
        }
        Err(FetchError::NoCommitsInWindow {
            since: self.options.since.to_string(),
            until: self.options.until.to_string(),
        })
    }
}

pub fn working_copy_name(candidate: &RepositoryCandidate) -> String {
    let safe = |s: &str| -> String {
        s.chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' || c == '_' { c } else { '_' })
            .collect()
    };
    format!("{}__{}", safe(&candidate.owner), safe(&candidate.name))
}

fn remove_dir(path: &Path) -> Result<(), FetchError> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(FetchError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FakeVcs {
        commits: Vec<CommitInfo>,
        checked_out: Mutex<Vec<String>>,
        fail_clone: bool,
    }

    impl VersionControl for FakeVcs {
        fn clone_repo(&self, url: &str, dest: &Path, _depth: CloneDepth) -> Result<(), FetchError> {
            fs::create_dir_all(dest).unwrap();
            if self.fail_clone {
                return Err(FetchError::CloneFailed {
                    url: url.to_string(),
                    reason: "denied".into(),
                });
            }
            Ok(())
        }

        fn list_commits(&self, _repo: &Path, _s: NaiveDate, _u: NaiveDate) -> Result<Vec<CommitInfo>, FetchError> {
            Ok(self.commits.clone())
        }

        fn head(&self, _repo: &Path) -> Result<CommitInfo, FetchError> {
            Ok(CommitInfo {
                sha: "ffffffff".into(),
                timestamp: 1,
            })
        }

        fn checkout(&self, _repo: &Path, sha: &str) -> Result<(), FetchError> {
            self.checked_out.lock().unwrap().push(sha.to_string());
            Ok(())
        }
    }

    fn candidate() -> RepositoryCandidate {
        RepositoryCandidate {
            owner: "acme".into(),
            name: "lib".into(),
            html_url: "https://github.com/acme/lib".into(),
            clone_url: "https://github.com/acme/lib.git".into(),
            stars: 10,
            pushed_at: None,
            default_branch: None,
            license_key: Some("mit".into()),
        }
    }

    fn options(fallback_to_head: bool) -> FetcherOptions {
        FetcherOptions {
            since: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            until: NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
            fallback_to_head,
            shallow: false,
        }
    }

    #[test]
    fn picks_most_recent_commit_in_window() {
        let vcs = Arc::new(FakeVcs {
            commits: vec![
                CommitInfo { sha: "aaaaaaaa".into(), timestamp: 10 },
                CommitInfo { sha: "bbbbbbbb".into(), timestamp: 30 },
                CommitInfo { sha: "cccccccc".into(), timestamp: 20 },
            ],
            checked_out: Mutex::new(Vec::new()),
            fail_clone: false,
        });
        let fetcher = Fetcher::new(vcs.clone(), LicenseResolver::default(), options(true));
        let dir = tempfile::tempdir().unwrap();
        let checkout = fetcher.fetch(&candidate(), dir.path()).unwrap();
        assert_eq!(checkout.commit_sha, "bbbbbbbb");
        assert_eq!(checkout.selection, CommitSelection::InWindow);
        assert_eq!(checkout.license.as_deref(), Some("mit"));
        assert!(checkout.working_copy.ends_with("acme__lib"));

        let path = checkout.working_copy.clone();
        checkout.remove().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn empty_window_respects_fallback_policy() {
        let vcs = Arc::new(FakeVcs {
            commits: Vec::new(),
            checked_out: Mutex::new(Vec::new()),
            fail_clone: false,
        });
        let dir = tempfile::tempdir().unwrap();

        let fetcher = Fetcher::new(vcs.clone(), LicenseResolver::default(), options(true));
        let checkout = fetcher.fetch(&candidate(), dir.path()).unwrap();
        assert_eq!(checkout.selection, CommitSelection::HeadFallback);
        checkout.remove().unwrap();

        let strict = Fetcher::new(vcs, LicenseResolver::default(), options(false));
        let err = strict.fetch(&candidate(), dir.path()).unwrap_err();
        assert_eq!(err.reason_key(), "no_commits_in_window");
        assert!(!dir.path().join("acme__lib").exists());
    }

    #[test]
    fn failed_clone_leaves_no_directory() {
        let vcs = Arc::new(FakeVcs {
            commits: Vec::new(),
            checked_out: Mutex::new(Vec::new()),
            fail_clone: true,
        });
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Fetcher::new(vcs, LicenseResolver::default(), options(true));
        let err = fetcher.fetch(&candidate(), dir.path()).unwrap_err();
        assert_eq!(err.reason_key(), "clone_failed");
        assert!(!dir.path().join("acme__lib").exists());
    }
}
