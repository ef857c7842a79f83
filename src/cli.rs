use crate::config::MinerConfig;
use chrono::NaiveDate;
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "methodmine",
    version,
    about = "Mine Java methods and static metrics from public repositories",
    after_help = r#"Examples:
  methodmine mine --min-stars 5000 --since 2024-01-01 --until 2024-12-31 --target-methods 25000
  methodmine mine --config mine.yaml --workers 4 --cleanup
  methodmine discover --min-stars 20000 --max-repos 10
  methodmine extract --repo ../some-java-project --output-dir out
  methodmine status --output-dir methods_out
"#
)]
pub struct Args {
    /// YAML configuration file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// Dotenv file loaded before configuration is resolved.
    #[arg(long, global = true)]
    pub env_file: Option<PathBuf>,
    /// Debug logging (RUST_LOG takes precedence).
    #[arg(short, long, global = true)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Discover, fetch, extract and write until the target is reached.
    Mine {
        #[command(flatten)]
        opts: MineOpts,
    },
    /// Print discovered candidates as JSON lines.
    Discover {
        #[command(flatten)]
        opts: MineOpts,
    },
    /// Extract methods from a local checkout into the output directory.
    Extract {
        #[arg(long)]
        repo: PathBuf,
        /// Repository name recorded in the output (defaults to the directory name).
        #[arg(long)]
        name: Option<String>,
        #[arg(long, default_value = "local")]
        owner: String,
        #[command(flatten)]
        opts: MineOpts,
    },
    /// Print the resume state of an output directory.
    Status {
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
}

/// Flags that override configuration values.
#[derive(ClapArgs, Debug, Default, Clone)]
pub struct MineOpts {
    #[arg(long)]
    pub min_stars: Option<u64>,
    #[arg(long)]
    pub language: Option<String>,
    #[arg(long)]
    pub since: Option<NaiveDate>,
    #[arg(long)]
    pub until: Option<NaiveDate>,
    #[arg(long)]
    pub target_methods: Option<u64>,
    #[arg(long)]
    pub chunk_size: Option<usize>,
    #[arg(long)]
    pub output_dir: Option<PathBuf>,
    #[arg(long)]
    pub clone_dir: Option<PathBuf>,
    #[arg(long)]
    pub workers: Option<usize>,
    #[arg(long)]
    pub max_repos: Option<usize>,
    /// Shared library with a compiled Java grammar.
    #[arg(long)]
    pub grammar_path: Option<PathBuf>,
    /// Remove working copies after each repository.
    #[arg(long)]
    pub cleanup: bool,
    /// Clone with --shallow-since instead of a blobless clone.
    #[arg(long)]
    pub shallow: bool,
    /// Skip repositories with no commits in the window instead of using HEAD.
    #[arg(long)]
    pub no_head_fallback: bool,
    /// Mine a small sample of repositories.
    #[arg(long)]
    pub test_mode: bool,
}

impl MineOpts {
    pub fn apply(&self, config: &mut MinerConfig) {
        if let Some(value) = self.min_stars {
            config.minimum_stars = value;
        }
        if let Some(value) = &self.language {
            config.language = value.clone();
        }
        if let Some(value) = self.since {
            config.since_date = value;
        }
        if let Some(value) = self.until {
            config.until_date = value;
        }
        if let Some(value) = self.target_methods {
            config.target_methods = value;
        }
        if let Some(value) = self.chunk_size {
            config.chunk_size = value;
        }
        if let Some(value) = &self.output_dir {
            config.output_dir = value.clone();
        }
        if let Some(value) = &self.clone_dir {
            config.clone_dir = value.clone();
        }
        if let Some(value) = self.workers {
            config.worker_count = value;
        }
        if let Some(value) = self.max_repos {
            config.max_repos = value;
        }
        if let Some(value) = &self.grammar_path {
            config.grammar_path = Some(value.clone());
        }
        config.cleanup |= self.cleanup;
        config.shallow |= self.shallow;
        config.test_mode |= self.test_mode;
        if self.no_head_fallback {
            config.fallback_to_head = false;
        }
    }
}
