// Configuration module for methodmine
// Defaults, then an optional YAML file, then METHODMINE_* environment variables.
// CLI flags are applied last by main.

use anyhow::{Context, Result, bail};
use chrono::{Duration, NaiveDate, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const DEFAULT_EXCLUDE_GLOBS: &[&str] = &[
    "**/generated/**",
    "**/generated-sources/**",
    "**/target/**",
    "**/build/**",
    "**/*Generated*.java",
];

/// Miner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MinerConfig {
    /// Minimum stargazer count for discovered repositories (METHODMINE_MIN_STARS)
    pub minimum_stars: u64,
    /// Search language filter (METHODMINE_LANGUAGE)
    pub language: String,
    /// Start of the push/commit window, inclusive (METHODMINE_SINCE)
    pub since_date: NaiveDate,
    /// End of the push/commit window, inclusive (METHODMINE_UNTIL)
    pub until_date: NaiveDate,
    /// Stop dispatching repositories once this many methods are written (METHODMINE_TARGET_METHODS)
    pub target_methods: u64,
    /// Records per chunk file (METHODMINE_CHUNK_SIZE)
    pub chunk_size: usize,
    pub output_dir: PathBuf,
    pub clone_dir: PathBuf,
    /// Compiled grammar library exporting `tree_sitter_java`; unset uses the bundled grammar.
    pub grammar_path: Option<PathBuf>,
    /// Remove working copies once a repository reaches DONE or SKIPPED
    pub cleanup: bool,
    /// Concurrent repository pipelines (METHODMINE_WORKERS)
    pub worker_count: usize,
    pub max_repos: usize,
    pub min_tokens: usize,
    pub max_tokens: usize,
    pub max_file_bytes: u64,
    pub exclude_globs: Vec<String>,
    /// Use HEAD when the window holds no commits
    pub fallback_to_head: bool,
    /// Clone with --shallow-since instead of a blobless full clone
    pub shallow: bool,
    pub max_rate_limit_retries: u32,
    pub max_rate_limit_wait_secs: u64,
    pub extraction_retries: u32,
    pub license_cache_path: Option<PathBuf>,
    pub api_base_url: String,
    pub test_mode: bool,
    pub test_sample_repos: usize,
    #[serde(skip)]
    pub github_token: Option<String>,
}

impl Default for MinerConfig {
    fn default() -> Self {
        let today = Utc::now().date_naive();
        Self {
            minimum_stars: 5000,
            language: "java".to_string(),
            since_date: today - Duration::days(365),
            until_date: today,
            target_methods: 25_000,
            chunk_size: 5000,
            output_dir: PathBuf::from("methods_out"),
            clone_dir: PathBuf::from("repos_clone"),
            grammar_path: None,
            cleanup: false,
            worker_count: 1,
            max_repos: 500,
            min_tokens: 3,
            max_tokens: 2000,
            max_file_bytes: 1024 * 1024,
            exclude_globs: DEFAULT_EXCLUDE_GLOBS.iter().map(|s| s.to_string()).collect(),
            fallback_to_head: true,
            shallow: false,
            max_rate_limit_retries: 5,
            max_rate_limit_wait_secs: 3600,
            extraction_retries: 1,
            license_cache_path: None,
            api_base_url: "https://api.github.com".to_string(),
            test_mode: false,
            test_sample_repos: 5,
            github_token: None,
        }
    }
}

impl MinerConfig {
    /// Resolve defaults, an optional YAML file and environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_yaml_file(path)?,
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        Self::from_yaml_str(&raw).with_context(|| format!("parse config {}", path.display()))
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml_ng::from_str(raw)?)
    }

    fn apply_env(&mut self) {
        override_from_env("METHODMINE_MIN_STARS", &mut self.minimum_stars);
        override_from_env("METHODMINE_LANGUAGE", &mut self.language);
        override_from_env("METHODMINE_SINCE", &mut self.since_date);
        override_from_env("METHODMINE_UNTIL", &mut self.until_date);
        override_from_env("METHODMINE_TARGET_METHODS", &mut self.target_methods);
        override_from_env("METHODMINE_CHUNK_SIZE", &mut self.chunk_size);
        override_from_env("METHODMINE_WORKERS", &mut self.worker_count);
        override_from_env("METHODMINE_MAX_REPOS", &mut self.max_repos);
        override_from_env("METHODMINE_API_BASE_URL", &mut self.api_base_url);
        if let Ok(dir) = env::var("METHODMINE_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = env::var("METHODMINE_CLONE_DIR") {
            self.clone_dir = PathBuf::from(dir);
        }
        self.github_token = env::var("GITHUB_TOKEN").ok().filter(|t| !t.trim().is_empty());
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            bail!("chunk_size must be at least 1");
        }
        if self.worker_count == 0 {
            bail!("worker_count must be at least 1");
        }
        if self.since_date > self.until_date {
            bail!(
                "since_date {} is after until_date {}",
                self.since_date,
                self.until_date
            );
        }
        if self.min_tokens > self.max_tokens {
            bail!(
                "min_tokens {} exceeds max_tokens {}",
                self.min_tokens,
                self.max_tokens
            );
        }
        self.exclude_set()?;
        Ok(())
    }

    pub fn exclude_set(&self) -> Result<GlobSet> {
        build_glob_set(&self.exclude_globs)
    }

    pub fn license_cache_path(&self) -> PathBuf {
        self.license_cache_path
            .clone()
            .unwrap_or_else(|| self.clone_dir.join(".methodmine").join("licenses.sqlite"))
    }

    /// Repositories to mine, honouring test mode sampling.
    pub fn repo_budget(&self) -> usize {
        if self.test_mode {
            self.max_repos.min(self.test_sample_repos.max(3))
        } else {
            self.max_repos
        }
    }
}

pub fn build_glob_set(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).with_context(|| format!("invalid glob {pattern}"))?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}

fn override_from_env<T>(key: &str, slot: &mut T)
where
    T: FromStr + Display,
{
    let Ok(val) = env::var(key) else {
        return;
    };
    match val.parse() {
        Ok(parsed) => *slot = parsed,
        Err(_) => tracing::warn!(
            "Invalid {} value: {}, using default: {}",
            key,
            val,
            slot
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MinerConfig::default();
        assert_eq!(config.minimum_stars, 5000);
        assert_eq!(config.chunk_size, 5000);
        assert_eq!(config.worker_count, 1);
        assert_eq!(config.until_date - config.since_date, Duration::days(365));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn yaml_overrides_selected_fields() {
        let config = MinerConfig::from_yaml_str(
            "minimum_stars: 100\nchunk_size: 2\nsince_date: 2024-01-01\nuntil_date: 2024-06-30\ncleanup: true\n",
        )
        .unwrap();
        assert_eq!(config.minimum_stars, 100);
        assert_eq!(config.chunk_size, 2);
        assert!(config.cleanup);
        assert_eq!(config.since_date, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(config.max_tokens, 2000);
    }

    #[test]
    fn validate_rejects_inverted_window() {
        let mut config = MinerConfig::default();
        config.since_date = NaiveDate::from_ymd_opt(2025, 1, 2).unwrap();
        config.until_date = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_chunk_size() {
        let mut config = MinerConfig::default();
        config.chunk_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn default_excludes_match_generated_sources() {
        let set = MinerConfig::default().exclude_set().unwrap();
        assert!(set.is_match("module/target/generated-sources/Foo.java"));
        assert!(set.is_match("src/main/java/FooGenerated.java"));
        assert!(!set.is_match("src/main/java/com/acme/Foo.java"));
    }

    #[test]
    fn test_mode_samples_at_least_three_repos() {
        let mut config = MinerConfig::default();
        config.test_mode = true;
        config.test_sample_repos = 1;
        assert_eq!(config.repo_budget(), 3);
    }
}
