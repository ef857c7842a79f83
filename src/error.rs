//! Error taxonomy for the mining pipeline.
//!
//! Each component owns a typed error. `MineError` aggregates them and maps every
//! variant onto an [`ErrorClass`], which decides how far a failure propagates:
//! transient remote failures are retried, per-item and per-repository failures are
//! counted and skipped, and only systemic failures abort the run.

use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    TransientRemote,
    PerItem,
    PerRepository,
    Systemic,
}

#[derive(Debug, Error)]
pub enum GrammarError {
    #[error("java grammar is incompatible with the tree-sitter runtime: {0}")]
    Incompatible(String),
    #[error("cannot load java grammar from {path}: {reason}")]
    Load { path: PathBuf, reason: String },
}

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("search api rate limited (reset at {reset_at:?})")]
    RateLimited { reset_at: Option<i64> },
    #[error("search api transport error: {0}")]
    Transport(String),
    #[error("search api returned HTTP {status}: {message}")]
    Http { status: u16, message: String },
    #[error("search api response could not be decoded: {0}")]
    Decode(String),
    #[error("search source unavailable after {attempts} attempts: {last}")]
    SourceUnavailable { attempts: u32, last: String },
}

impl DiscoveryError {
    pub fn is_transient(&self) -> bool {
        match self {
            DiscoveryError::RateLimited { .. } | DiscoveryError::Transport(_) => true,
            DiscoveryError::Http { status, .. } => *status >= 500,
            DiscoveryError::Decode(_) | DiscoveryError::SourceUnavailable { .. } => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("clone of {url} failed: {reason}")]
    CloneFailed { url: String, reason: String },
    #[error("no commits between {since} and {until}")]
    NoCommitsInWindow { since: String, until: String },
    #[error("checkout of {sha} failed: {reason}")]
    CheckoutFailed { sha: String, reason: String },
    #[error("git command failed: {0}")]
    Git(String),
    #[error("working copy io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl FetchError {
    pub fn reason_key(&self) -> &'static str {
        match self {
            FetchError::CloneFailed { .. } => "clone_failed",
            FetchError::NoCommitsInWindow { .. } => "no_commits_in_window",
            FetchError::CheckoutFailed { .. } => "checkout_failed",
            FetchError::Git(_) => "git_error",
            FetchError::Io { .. } => "working_copy_io",
        }
    }
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{path} is {size} bytes, over the {limit} byte limit")]
    TooLarge { path: String, size: u64, limit: u64 },
    #[error("parser produced no tree for {0}")]
    Parse(String),
    #[error("{path} has a syntax error near line {line}")]
    Syntax { path: String, line: usize },
    #[error("cannot walk working copy {path}: {reason}")]
    Walk { path: PathBuf, reason: String },
    #[error("parser setup failed: {0}")]
    Parser(String),
}

impl ExtractError {
    pub fn reason_key(&self) -> &'static str {
        match self {
            ExtractError::Read { .. } => "unreadable",
            ExtractError::TooLarge { .. } => "too_large",
            ExtractError::Parse(_) => "parse_failed",
            ExtractError::Syntax { .. } => "syntax_error",
            ExtractError::Walk { .. } => "walk_failed",
            ExtractError::Parser(_) => "parser_setup",
        }
    }
}

#[derive(Debug, Error)]
pub enum WriterError {
    #[error("output directory {path} is not usable: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("chunk file {path} already exists")]
    ChunkExists { path: PathBuf },
    #[error("write to {path} failed: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("record serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("record sink lock poisoned")]
    Poisoned,
}

#[derive(Debug, Error)]
pub enum MineError {
    #[error(transparent)]
    Grammar(#[from] GrammarError),
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error(transparent)]
    Writer(#[from] WriterError),
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl MineError {
    pub fn class(&self) -> ErrorClass {
        match self {
            MineError::Grammar(_) | MineError::Writer(_) | MineError::Config(_) => {
                ErrorClass::Systemic
            }
            MineError::Discovery(err) if err.is_transient() => ErrorClass::TransientRemote,
            MineError::Discovery(DiscoveryError::SourceUnavailable { .. }) => {
                ErrorClass::PerRepository
            }
            MineError::Discovery(_) => ErrorClass::TransientRemote,
            MineError::Fetch(_) => ErrorClass::PerRepository,
            MineError::Extract(ExtractError::Walk { .. }) => ErrorClass::PerRepository,
            MineError::Extract(ExtractError::Parser(_)) => ErrorClass::Systemic,
            MineError::Extract(_) => ErrorClass::PerItem,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.class() == ErrorClass::Systemic
    }
}
