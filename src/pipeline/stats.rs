use super::state::RepoState;
use crate::extractor::scan::ScanOutcome;
use crate::fetcher::{CommitSelection, LicenseOrigin};
use crate::metrics::complexity::ComplexityStrategy;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, Serialize)]
pub struct FileCounts {
    pub parsed: u64,
    pub skipped: u64,
    pub excluded: u64,
    /// Directory entries the walker could not read, so their files were never seen.
    pub walk_errors: u64,
    pub skipped_by_reason: BTreeMap<String, u64>,
}

impl FileCounts {
    pub fn skip(&mut self, reason: &str) {
        self.skipped += 1;
        *self.skipped_by_reason.entry(reason.to_string()).or_insert(0) += 1;
    }

    pub fn record_scan(&mut self, scan: &ScanOutcome) {
        self.excluded += scan.excluded as u64;
        self.walk_errors += scan.walk_errors as u64;
    }

    fn merge(&mut self, other: &FileCounts) {
        self.parsed += other.parsed;
        self.skipped += other.skipped;
        self.excluded += other.excluded;
        self.walk_errors += other.walk_errors;
        for (reason, count) in &other.skipped_by_reason {
            *self.skipped_by_reason.entry(reason.clone()).or_insert(0) += count;
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MethodCounts {
    pub emitted: u64,
    pub duplicates: u64,
    pub filtered_by_tokens: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ComplexityCounts {
    pub analyzer: u64,
    pub heuristic: u64,
}

impl ComplexityCounts {
    pub fn record(&mut self, strategy: ComplexityStrategy) {
        match strategy {
            ComplexityStrategy::Analyzer(_) => self.analyzer += 1,
            ComplexityStrategy::Heuristic => self.heuristic += 1,
        }
    }
}

/// Outcome of one repository.
#[derive(Debug, Clone, Serialize)]
pub struct RepoReport {
    pub full_name: String,
    pub state: RepoState,
    pub commit_sha: Option<String>,
    pub license: Option<String>,
    pub license_origin: Option<LicenseOrigin>,
    pub commit_selection: Option<CommitSelection>,
    pub skip_reason: Option<String>,
    pub files: FileCounts,
    pub methods: MethodCounts,
    pub complexity: ComplexityCounts,
    pub extraction_retries: u32,
}

impl RepoReport {
    pub fn new(full_name: impl Into<String>) -> Self {
        Self {
            full_name: full_name.into(),
            state: RepoState::Pending,
            commit_sha: None,
            license: None,
            license_origin: None,
            commit_selection: None,
            skip_reason: None,
            files: FileCounts::default(),
            methods: MethodCounts::default(),
            complexity: ComplexityCounts::default(),
            extraction_retries: 0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RepoCounts {
    pub dispatched: u64,
    pub done: u64,
    pub skipped: u64,
    pub skipped_by_reason: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RetryCounts {
    pub extraction: u64,
    pub search: u64,
    pub rate_limit_waits: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub output_dir: String,
    pub repositories: RepoCounts,
    pub files: FileCounts,
    pub methods: MethodCounts,
    /// Records in the corpus, including earlier runs.
    pub total_in_corpus: u64,
    pub complexity: ComplexityCounts,
    pub retries: RetryCounts,
    pub licenses_unknown: u64,
    /// Where each checked-out repository's license came from.
    pub licenses_by_origin: BTreeMap<String, u64>,
    /// Repositories mined at HEAD because the window had no commits.
    pub head_fallbacks: u64,
    pub chunks_written: u32,
    pub target_reached: bool,
    pub discovery_unavailable: bool,
    pub cancelled: bool,
}

impl RunSummary {
    pub fn absorb(&mut self, report: &RepoReport) {
        match report.state {
            RepoState::Done => self.repositories.done += 1,
            RepoState::Skipped => {
                self.repositories.skipped += 1;
                let reason = report.skip_reason.as_deref().unwrap_or("unknown");
                *self
                    .repositories
                    .skipped_by_reason
                    .entry(reason.to_string())
                    .or_insert(0) += 1;
            }
            _ => {}
        }
        if report.commit_sha.is_some() && report.license.is_none() {
            self.licenses_unknown += 1;
        }
        if let Some(origin) = report.license_origin {
            *self
                .licenses_by_origin
                .entry(origin.as_str().to_string())
                .or_insert(0) += 1;
        }
        if report.commit_selection == Some(CommitSelection::HeadFallback) {
            self.head_fallbacks += 1;
        }
        self.files.merge(&report.files);
        self.methods.emitted += report.methods.emitted;
        self.methods.duplicates += report.methods.duplicates;
        self.methods.filtered_by_tokens += report.methods.filtered_by_tokens;
        self.complexity.analyzer += report.complexity.analyzer;
        self.complexity.heuristic += report.complexity.heuristic;
        self.retries.extraction += u64::from(report.extraction_retries);
    }
}
