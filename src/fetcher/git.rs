use crate::error::FetchError;
use chrono::NaiveDate;
use std::path::Path;
use std::process::{Command, Output};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    pub sha: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloneDepth {
    /// Only history after the given date.
    ShallowSince(NaiveDate),
    /// Full history, blobs fetched on checkout.
    Blobless,
}

pub trait VersionControl: Send + Sync {
    fn clone_repo(&self, url: &str, dest: &Path, depth: CloneDepth) -> Result<(), FetchError>;
    /// Commits in the inclusive date window, newest first.
    fn list_commits(
        &self,
        repo: &Path,
        since: NaiveDate,
        until: NaiveDate,
    ) -> Result<Vec<CommitInfo>, FetchError>;
    fn head(&self, repo: &Path) -> Result<CommitInfo, FetchError>;
    fn checkout(&self, repo: &Path, sha: &str) -> Result<(), FetchError>;
}

/// `VersionControl` backed by the `git` executable.
#[derive(Debug, Default, Clone, Copy)]
pub struct GitCli;

impl GitCli {
    fn run(&self, repo: Option<&Path>, args: &[String]) -> Result<Output, FetchError> {
        let mut command = Command::new("git");
        if let Some(repo) = repo {
            command.arg("-C").arg(repo);
        }
        command
            .args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .output()
            .map_err(|err| FetchError::Git(format!("spawn git: {err}")))
    }
}

impl VersionControl for GitCli {
    fn clone_repo(&self, url: &str, dest: &Path, depth: CloneDepth) -> Result<(), FetchError> {
        let mut args = vec![
            "clone".to_string(),
            "--quiet".to_string(),
            "--no-tags".to_string(),
            "--no-checkout".to_string(),
        ];
        match depth {
            CloneDepth::ShallowSince(since) => {
                args.push(format!("--shallow-since={}", since.format("%Y-%m-%d")))
            }
            CloneDepth::Blobless => args.push("--filter=blob:none".to_string()),
        }
        args.push(url.to_string());
        args.push(dest.to_string_lossy().to_string());

        let output = self.run(None, &args)?;
        if !output.status.success() {
            return Err(FetchError::CloneFailed {
                url: url.to_string(),
                reason: stderr_line(&output),
            });
        }
        Ok(())
    }

    fn list_commits(
        &self,
        repo: &Path,
        since: NaiveDate,
        until: NaiveDate,
    ) -> Result<Vec<CommitInfo>, FetchError> {
        let args = vec![
            "log".to_string(),
            "--format=%H %ct".to_string(),
            format!("--since={} 00:00:00", since.format("%Y-%m-%d")),
            format!("--until={} 23:59:59", until.format("%Y-%m-%d")),
            "HEAD".to_string(),
        ];
        let output = self.run(Some(repo), &args)?;
        if !output.status.success() {
            return Err(FetchError::Git(format!("git log: {}", stderr_line(&output))));
        }
        Ok(parse_log(&String::from_utf8_lossy(&output.stdout)))
    }

    fn head(&self, repo: &Path) -> Result<CommitInfo, FetchError> {
        let args = vec![
            "log".to_string(),
            "-1".to_string(),
            "--format=%H %ct".to_string(),
            "HEAD".to_string(),
        ];
        let output = self.run(Some(repo), &args)?;
        if !output.status.success() {
            return Err(FetchError::Git(format!("git log -1: {}", stderr_line(&output))));
        }
        parse_log(&String::from_utf8_lossy(&output.stdout))
            .into_iter()
            .next()
            .ok_or_else(|| FetchError::Git("repository has no HEAD commit".to_string()))
    }

    fn checkout(&self, repo: &Path, sha: &str) -> Result<(), FetchError> {
        let args = vec![
            "-c".to_string(),
            "advice.detachedHead=false".to_string(),
            "checkout".to_string(),
            "--quiet".to_string(),
            "--force".to_string(),
            sha.to_string(),
        ];
        let output = self.run(Some(repo), &args)?;
        if !output.status.success() {
            return Err(FetchError::CheckoutFailed {
                sha: sha.to_string(),
                reason: stderr_line(&output),
            });
        }
        Ok(())
    }
}

/// Parse `%H %ct` lines. Malformed lines are dropped.
pub fn parse_log(stdout: &str) -> Vec<CommitInfo> {
    stdout
        .lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let sha = parts.next()?;
            let timestamp = parts.next()?.parse().ok()?;
            if sha.len() < 7 || !sha.chars().all(|c| c.is_ascii_hexdigit()) {
                return None;
            }
            Some(CommitInfo {
                sha: sha.to_string(),
                timestamp,
            })
        })
        .collect()
}

fn stderr_line(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let line = stderr
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .unwrap_or("")
        .trim();
    if line.is_empty() {
        format!("exit status {}", output.status)
    } else {
        line.to_string()
    }
}
