use serde::Serialize;
use thiserror::Error;

/// Lifecycle of one repository in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RepoState {
    Pending,
    Cloned,
    Extracting,
    Done,
    Skipped,
}

impl RepoState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RepoState::Done | RepoState::Skipped)
    }

    pub fn can_transition(self, next: RepoState) -> bool {
        use RepoState::*;
        matches!(
            (self, next),
            (Pending, Cloned)
                | (Pending, Skipped)
                | (Cloned, Extracting)
                | (Cloned, Skipped)
                | (Extracting, Done)
                | (Extracting, Skipped)
        )
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("{repo}: invalid transition {from:?} -> {to:?}")]
pub struct InvalidTransition {
    pub repo: String,
    pub from: RepoState,
    pub to: RepoState,
}

#[derive(Debug, Clone)]
pub struct RepoTracker {
    repo: String,
    state: RepoState,
}

impl RepoTracker {
    pub fn new(repo: impl Into<String>) -> Self {
        Self {
            repo: repo.into(),
            state: RepoState::Pending,
        }
    }

    pub fn state(&self) -> RepoState {
        self.state
    }

    pub fn advance(&mut self, next: RepoState) -> Result<(), InvalidTransition> {
        if !self.state.can_transition(next) {
            return Err(InvalidTransition {
                repo: self.repo.clone(),
                from: self.state,
                to: next,
            });
        }
        tracing::debug!(repo = %self.repo, from = ?self.state, to = ?next, "repo state");
        self.state = next;
        Ok(())
    }
}
