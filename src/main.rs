use anyhow::{Context, Result};
use clap::Parser;
use methodmine::cli::{self, Command, MineOpts};
use methodmine::config::MinerConfig;
use methodmine::db::LicenseCache;
use methodmine::discovery::{Discovery, DiscoveryOptions, SearchQuery};
use methodmine::fetcher::{
    Fetcher, FetcherOptions, GitCli, LicenseLookup, LicenseResolver, VersionControl,
};
use methodmine::github::GitHubClient;
use methodmine::grammar::JavaGrammar;
use methodmine::logging;
use methodmine::metrics::MetricEngine;
use methodmine::model::RepoInfo;
use methodmine::pipeline::Orchestrator;
use methodmine::writer::{RecordSink, ResumeState};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::Ordering;

fn main() -> Result<()> {
    let args = cli::Args::parse();
    load_env_file(args.env_file.as_deref())?;
    logging::init(args.verbose);

    match args.command {
        Command::Mine { opts } => {
            let config = resolve_config(args.config.as_deref(), &opts)?;
            let grammar = JavaGrammar::load(config.grammar_path.as_deref())?;
            let client = Arc::new(GitHubClient::from_config(&config)?);

            let cache = match LicenseCache::open(&config.license_cache_path()) {
                Ok(cache) => Some(cache),
                Err(err) => {
                    tracing::warn!(error = %err, "license cache unavailable; continuing without it");
                    None
                }
            };
            let remote: Arc<dyn LicenseLookup> = client.clone();
            let licenses = LicenseResolver::new(cache, Some(remote));
            let fetcher = Fetcher::new(Arc::new(GitCli), licenses, FetcherOptions::from_config(&config));

            let (sink, resume) = RecordSink::open(&config.output_dir, config.chunk_size)?;
            if resume.total_emitted > 0 {
                tracing::info!(
                    records = resume.total_emitted,
                    next_chunk = resume.next_chunk_index,
                    "resuming output directory"
                );
            }
            let orchestrator = Orchestrator::new(
                config,
                grammar,
                MetricEngine::default(),
                fetcher,
                Arc::new(sink),
            )?;

            let cancel = orchestrator.cancel_flag();
            ctrlc::set_handler(move || {
                cancel.store(true, Ordering::SeqCst);
            })
            .context("install interrupt handler")?;

            let summary = orchestrator.run(client.as_ref())?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Discover { opts } => {
            let config = resolve_config(args.config.as_deref(), &opts)?;
            let client = GitHubClient::from_config(&config)?;
            let mut discovery = Discovery::new(
                &client,
                SearchQuery::from_config(&config),
                DiscoveryOptions::from_config(&config),
            );
            for candidate in discovery.by_ref() {
                match candidate {
                    Ok(candidate) => println!("{}", serde_json::to_string(&candidate)?),
                    Err(err) => {
                        tracing::warn!(error = %err, "discovery stopped");
                        break;
                    }
                }
            }
            let stats = discovery.stats();
            tracing::info!(pages = stats.pages, retries = stats.retries, "discovery finished");
        }
        Command::Extract {
            repo,
            name,
            owner,
            opts,
        } => {
            let config = resolve_config(args.config.as_deref(), &opts)?;
            let grammar = JavaGrammar::load(config.grammar_path.as_deref())?;
            let root = repo
                .canonicalize()
                .with_context(|| format!("resolve {}", repo.display()))?;
            let name = name.unwrap_or_else(|| dir_name(&root));
            let commit_sha = match GitCli.head(&root) {
                Ok(head) => head.sha,
                Err(err) => {
                    tracing::debug!(error = %err, "not a git checkout");
                    "unknown".to_string()
                }
            };
            let info = RepoInfo {
                full_name: format!("{owner}/{name}"),
                name,
                owner,
                url: root.display().to_string(),
                commit_sha,
                license: None,
                stars: 0,
            };

            let (sink, _) = RecordSink::open(&config.output_dir, config.chunk_size)?;
            let fetcher = Fetcher::new(
                Arc::new(GitCli),
                LicenseResolver::default(),
                FetcherOptions::from_config(&config),
            );
            let orchestrator = Orchestrator::new(
                config,
                grammar,
                MetricEngine::default(),
                fetcher,
                Arc::new(sink),
            )?;
            let summary = orchestrator.extract_local(&root, info)?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Status { output_dir } => {
            let output_dir = match output_dir {
                Some(dir) => dir,
                None => MinerConfig::load(args.config.as_deref())?.output_dir,
            };
            let state = ResumeState::discover(&output_dir)?;
            println!("{}", serde_json::to_string_pretty(&state)?);
        }
    }

    Ok(())
}

fn load_env_file(path: Option<&Path>) -> Result<()> {
    match path {
        Some(path) => {
            dotenv::from_path(path).with_context(|| format!("load env file {}", path.display()))?;
        }
        None => {
            dotenv::dotenv().ok();
        }
    }
    Ok(())
}

fn resolve_config(path: Option<&Path>, opts: &MineOpts) -> Result<MinerConfig> {
    let mut config = MinerConfig::load(path)?;
    opts.apply(&mut config);
    config.validate()?;
    Ok(config)
}

fn dir_name(root: &Path) -> String {
    root.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| root.display().to_string())
}
