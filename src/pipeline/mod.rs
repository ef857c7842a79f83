//! Run orchestration.
//!
//! The calling thread drives discovery and hands one repository at a time to
//! an idle worker. Workers announce themselves on a ready channel before each
//! job, so the `target_methods` check always sees the output of every finished
//! repository before the next one is dispatched.

pub mod state;
pub mod stats;

use crate::config::MinerConfig;
use crate::discovery::{Discovery, DiscoveryOptions, SearchApi, SearchQuery};
use crate::error::{DiscoveryError, MineError, WriterError};
use crate::extractor::{ExtractedFile, ExtractorOptions, MethodExtractor, stable_id};
use crate::fetcher::{CheckedOutCommit, Fetcher};
use crate::grammar::JavaGrammar;
use crate::metrics::MetricEngine;
use crate::model::{FileInfo, MethodRecord, RepoInfo, RepositoryCandidate};
use crate::writer::RecordSink;
use state::{RepoState, RepoTracker};
use stats::{RepoReport, RunSummary};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};
use std::thread;

const INTERRUPTED: &str = "interrupted";

/// Whether a tree walk saw every file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TreeWalk {
    Complete,
    Interrupted,
}

/// Turn one file's methods into output records.
pub fn build_records(repo: &RepoInfo, file: ExtractedFile) -> Vec<MethodRecord> {
    let split = stable_id::dataset_split(&repo.full_name);
    file.methods
        .into_iter()
        .map(|method| MethodRecord {
            dataset_split: split,
            id: stable_id::method_id(
                &repo.full_name,
                &repo.commit_sha,
                &method.rel_path,
                method.start_byte,
                method.end_byte,
            ),
            repo: repo.clone(),
            file: FileInfo::java(method.rel_path),
            method: method.info,
            code_tokens: method.code_tokens,
            metrics: method.metrics,
        })
        .collect()
}

pub struct Orchestrator {
    config: MinerConfig,
    grammar: JavaGrammar,
    engine: MetricEngine,
    extractor_options: ExtractorOptions,
    fetcher: Fetcher,
    sink: Arc<RecordSink>,
    cancel: Arc<AtomicBool>,
}

impl Orchestrator {
    pub fn new(
        config: MinerConfig,
        grammar: JavaGrammar,
        engine: MetricEngine,
        fetcher: Fetcher,
        sink: Arc<RecordSink>,
    ) -> anyhow::Result<Self> {
        let extractor_options = ExtractorOptions::from_config(&config)?;
        Ok(Self {
            config,
            grammar,
            engine,
            extractor_options,
            fetcher,
            sink,
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Flag checked between repositories and between files.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Discover and mine until the target, the budget or the source runs out.
    pub fn run(&self, api: &dyn SearchApi) -> Result<RunSummary, MineError> {
        let mut discovery = Discovery::new(
            api,
            SearchQuery::from_config(&self.config),
            DiscoveryOptions::from_config(&self.config),
        );
        let mut summary = self.run_candidates(discovery.by_ref())?;
        let stats = discovery.stats();
        summary.retries.search = u64::from(stats.retries);
        summary.retries.rate_limit_waits = u64::from(stats.rate_limit_waits);
        Ok(summary)
    }

    pub fn run_candidates<I>(&self, candidates: I) -> Result<RunSummary, MineError>
    where
        I: Iterator<Item = Result<RepositoryCandidate, DiscoveryError>>,
    {
        let started_with = self.sink.total_emitted()?;
        let abort = AtomicBool::new(false);
        let reports: Mutex<Vec<RepoReport>> = Mutex::new(Vec::new());
        let mut summary = RunSummary {
            output_dir: self.config.output_dir.display().to_string(),
            ..Default::default()
        };

        let worker_result: Result<(), MineError> = thread::scope(|scope| {
            let (ready_tx, ready_rx) = mpsc::channel::<usize>();
            let (job_tx, job_rx) = mpsc::sync_channel::<RepositoryCandidate>(0);
            let job_rx = Arc::new(Mutex::new(job_rx));

            let mut handles = Vec::new();
            for worker in 0..self.config.worker_count.max(1) {
                let ready_tx = ready_tx.clone();
                let job_rx = Arc::clone(&job_rx);
                let abort = &abort;
                let reports = &reports;
                handles.push(scope.spawn(move || {
                    self.worker_loop(worker, ready_tx, job_rx, abort, reports)
                }));
            }
            drop(ready_tx);

            self.dispatch(candidates, &ready_rx, &job_tx, &abort, &mut summary);
            drop(job_tx);

            let mut first_error = None;
            for handle in handles {
                match handle.join() {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => {
                        first_error.get_or_insert(err);
                    }
                    Err(_) => {
                        first_error.get_or_insert(MineError::Config("worker thread panicked".into()));
                    }
                }
            }
            match first_error {
                Some(err) => Err(err),
                None => Ok(()),
            }
        });

        let progress = self.sink.close();
        worker_result?;
        let progress = progress?;

        let reports = reports.into_inner().map_err(|_| WriterError::Poisoned)?;
        for report in &reports {
            summary.absorb(report);
        }
        summary.total_in_corpus = progress.total_emitted;
        summary.methods.emitted = progress.total_emitted - started_with;
        summary.chunks_written = progress.chunks_written;
        summary.target_reached = progress.total_emitted >= self.config.target_methods;
        summary.cancelled = self.cancelled();
        tracing::info!(
            repos = summary.repositories.dispatched,
            emitted = summary.methods.emitted,
            chunks = summary.chunks_written,
            "run finished"
        );
        Ok(summary)
    }

    fn dispatch<I>(
        &self,
        mut candidates: I,
        ready_rx: &Receiver<usize>,
        job_tx: &mpsc::SyncSender<RepositoryCandidate>,
        abort: &AtomicBool,
        summary: &mut RunSummary,
    ) where
        I: Iterator<Item = Result<RepositoryCandidate, DiscoveryError>>,
    {
        while let Ok(worker) = ready_rx.recv() {
            if self.cancelled() {
                tracing::warn!("interrupted; no further repositories will be dispatched");
                break;
            }
            if abort.load(Ordering::SeqCst) {
                break;
            }
            match self.sink.total_emitted() {
                Ok(total) if total >= self.config.target_methods => {
                    tracing::info!(total, target = self.config.target_methods, "target reached");
                    break;
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::error!(error = %err, "record sink unavailable");
                    break;
                }
            }
            match candidates.next() {
                Some(Ok(candidate)) => {
                    tracing::debug!(worker, repo = %candidate.full_name(), stars = candidate.stars, "dispatch");
                    summary.repositories.dispatched += 1;
                    if job_tx.send(candidate).is_err() {
                        break;
                    }
                }
                Some(Err(err)) => {
                    tracing::warn!(error = %err, "discovery unavailable; finishing with what we have");
                    summary.discovery_unavailable = true;
                    break;
                }
                None => break,
            }
        }
    }

    fn worker_loop(
        &self,
        worker: usize,
        ready_tx: mpsc::Sender<usize>,
        job_rx: Arc<Mutex<Receiver<RepositoryCandidate>>>,
        abort: &AtomicBool,
        reports: &Mutex<Vec<RepoReport>>,
    ) -> Result<(), MineError> {
        let mut extractor =
            MethodExtractor::new(&self.grammar, self.engine.clone(), self.extractor_options.clone())?;
        let clone_root = self.config.clone_dir.join(format!("worker-{worker}"));
        loop {
            if ready_tx.send(worker).is_err() {
                return Ok(());
            }
            let job = {
                let rx = job_rx.lock().map_err(|_| WriterError::Poisoned)?;
                rx.recv()
            };
            let Ok(candidate) = job else {
                return Ok(());
            };
            match self.mine_repository(&candidate, &clone_root, &mut extractor) {
                Ok(report) => {
                    if let Ok(mut reports) = reports.lock() {
                        reports.push(report);
                    }
                }
                Err(err) => {
                    tracing::error!(repo = %candidate.full_name(), error = %err, "fatal error");
                    abort.store(true, Ordering::SeqCst);
                    return Err(err);
                }
            }
        }
    }

    /// Fetch, extract and clean up one repository. Only systemic errors escape.
    fn mine_repository(
        &self,
        candidate: &RepositoryCandidate,
        clone_root: &Path,
        extractor: &mut MethodExtractor,
    ) -> Result<RepoReport, MineError> {
        let full_name = candidate.full_name();
        let mut tracker = RepoTracker::new(full_name.clone());
        let mut report = RepoReport::new(full_name.clone());

        let checkout = match self.fetcher.fetch(candidate, clone_root) {
            Ok(checkout) => checkout,
            Err(err) => {
                tracing::warn!(repo = %full_name, error = %err, "fetch failed; skipping");
                report.skip_reason = Some(err.reason_key().to_string());
                self.finish(&mut tracker, &mut report, RepoState::Skipped);
                return Ok(report);
            }
        };
        report.commit_sha = Some(checkout.commit_sha.clone());
        report.license = checkout.license.clone();
        report.license_origin = Some(checkout.license_origin);
        report.commit_selection = Some(checkout.selection);
        self.finish(&mut tracker, &mut report, RepoState::Cloned);
        self.finish(&mut tracker, &mut report, RepoState::Extracting);

        let mut attempt = 0u32;
        let outcome = loop {
            match self.extract_checkout(&checkout, extractor, &mut report) {
                Ok(walk) => break Ok(walk),
                Err(err) if err.is_fatal() => break Err(err),
                Err(err) if attempt < self.config.extraction_retries => {
                    attempt += 1;
                    report.extraction_retries += 1;
                    tracing::warn!(repo = %full_name, attempt, error = %err, "retrying extraction");
                }
                Err(err) => break Err(err),
            }
        };

        let result = match outcome {
            Ok(TreeWalk::Interrupted) => {
                tracing::warn!(repo = %full_name, methods = report.methods.emitted, "repository left partial");
                report.skip_reason = Some(INTERRUPTED.to_string());
                self.finish(&mut tracker, &mut report, RepoState::Skipped);
                Ok(())
            }
            Ok(TreeWalk::Complete) => {
                self.finish(&mut tracker, &mut report, RepoState::Done);
                tracing::info!(
                    repo = %full_name,
                    methods = report.methods.emitted,
                    files = report.files.parsed,
                    "repository done"
                );
                Ok(())
            }
            Err(err) if err.is_fatal() => Err(err),
            Err(err) => {
                tracing::warn!(repo = %full_name, error = %err, "extraction failed; skipping");
                report.skip_reason = Some(skip_reason(&err));
                self.finish(&mut tracker, &mut report, RepoState::Skipped);
                Ok(())
            }
        };

        self.release(checkout);
        result.map(|_| report)
    }

    fn extract_checkout(
        &self,
        checkout: &CheckedOutCommit,
        extractor: &mut MethodExtractor,
        report: &mut RepoReport,
    ) -> Result<TreeWalk, MineError> {
        let repo = checkout.repo_info();
        self.extract_tree(&checkout.working_copy, &repo, extractor, report)
    }

    fn extract_tree(
        &self,
        root: &Path,
        repo: &RepoInfo,
        extractor: &mut MethodExtractor,
        report: &mut RepoReport,
    ) -> Result<TreeWalk, MineError> {
        let (files, scan) = extractor.files(root)?;
        report.files.record_scan(&scan);
        for file in files {
            if self.cancelled() {
                tracing::warn!(repo = %repo.full_name, "interrupted between files");
                return Ok(TreeWalk::Interrupted);
            }
            match file.outcome {
                Ok(extracted) => {
                    report.files.parsed += 1;
                    report.methods.filtered_by_tokens += extracted.filtered as u64;
                    for method in &extracted.methods {
                        report.complexity.record(method.strategy);
                    }
                    let records = build_records(repo, extracted);
                    let outcome = self.sink.submit(&records)?;
                    report.methods.emitted += outcome.written;
                    report.methods.duplicates += outcome.duplicates;
                }
                Err(err) => {
                    tracing::warn!(repo = %repo.full_name, path = %file.rel_path, error = %err, "file skipped");
                    report.files.skip(err.reason_key());
                }
            }
        }
        Ok(TreeWalk::Complete)
    }

    fn finish(&self, tracker: &mut RepoTracker, report: &mut RepoReport, next: RepoState) {
        match tracker.advance(next) {
            Ok(()) => report.state = tracker.state(),
            Err(err) => tracing::error!(error = %err, "state machine violation"),
        }
    }

    fn release(&self, checkout: CheckedOutCommit) {
        if !self.config.cleanup {
            return;
        }
        let path = checkout.working_copy.clone();
        if let Err(err) = checkout.remove() {
            tracing::warn!(path = %path.display(), error = %err, "working copy cleanup failed");
        }
    }

    /// Run extraction, metrics and output over a local directory. No network.
    pub fn extract_local(&self, root: &Path, repo: RepoInfo) -> Result<RunSummary, MineError> {
        let started_with = self.sink.total_emitted()?;
        let mut extractor =
            MethodExtractor::new(&self.grammar, self.engine.clone(), self.extractor_options.clone())?;
        let mut report = RepoReport::new(repo.full_name.clone());
        report.commit_sha = Some(repo.commit_sha.clone());
        report.license = repo.license.clone();

        let outcome = self.extract_tree(root, &repo, &mut extractor, &mut report);
        let progress = self.sink.close()?;
        report.state = match outcome? {
            TreeWalk::Complete => RepoState::Done,
            TreeWalk::Interrupted => {
                report.skip_reason = Some(INTERRUPTED.to_string());
                RepoState::Skipped
            }
        };

        let mut summary = RunSummary {
            output_dir: self.config.output_dir.display().to_string(),
            ..Default::default()
        };
        summary.repositories.dispatched = 1;
        summary.absorb(&report);
        summary.total_in_corpus = progress.total_emitted;
        summary.methods.emitted = progress.total_emitted - started_with;
        summary.chunks_written = progress.chunks_written;
        summary.cancelled = self.cancelled();
        Ok(summary)
    }
}

fn skip_reason(err: &MineError) -> String {
    match err {
        MineError::Extract(err) => err.reason_key().to_string(),
        MineError::Fetch(err) => err.reason_key().to_string(),
        _ => "extraction_failed".to_string(),
    }
}
