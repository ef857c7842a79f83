//! Chunked JSONL output.
//!
//! Chunk files are `methods_chunk_<n>.jsonl` with `n` starting at 1. A chunk is
//! created with `create_new` on its first record and is never reopened once the
//! writer has moved past it, so resuming always starts a fresh file after the
//! highest existing index.

use crate::error::WriterError;
use crate::model::MethodRecord;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const CHUNK_PREFIX: &str = "methods_chunk_";
const CHUNK_SUFFIX: &str = ".jsonl";
const PROGRESS_EVERY: u64 = 100;

pub fn chunk_file_name(index: u32) -> String {
    format!("{CHUNK_PREFIX}{index}{CHUNK_SUFFIX}")
}

pub fn parse_chunk_index(file_name: &str) -> Option<u32> {
    file_name
        .strip_prefix(CHUNK_PREFIX)?
        .strip_suffix(CHUNK_SUFFIX)?
        .parse()
        .ok()
}

#[derive(Deserialize)]
struct RecordId {
    id: String,
}

/// What an output directory already holds.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResumeState {
    pub existing_chunks: Vec<u32>,
    pub next_chunk_index: u32,
    pub total_emitted: u64,
    /// Lines that could not be decoded, typically a record cut short by a crash.
    pub unreadable_lines: u64,
    #[serde(skip)]
    pub seen_ids: HashSet<String>,
}

impl ResumeState {
    pub fn discover(dir: &Path) -> Result<Self, WriterError> {
        let mut state = ResumeState {
            next_chunk_index: 1,
            ..Default::default()
        };
        if !dir.exists() {
            return Ok(state);
        }
        let entries = fs::read_dir(dir).map_err(|source| WriterError::Directory {
            path: dir.to_path_buf(),
            source,
        })?;
        for entry in entries {
            let entry = entry.map_err(|source| WriterError::Directory {
                path: dir.to_path_buf(),
                source,
            })?;
            let name = entry.file_name();
            if let Some(index) = name.to_str().and_then(parse_chunk_index) {
                state.existing_chunks.push(index);
            }
        }
        state.existing_chunks.sort_unstable();

        for index in state.existing_chunks.clone() {
            let path = dir.join(chunk_file_name(index));
            state.load_chunk(&path)?;
        }
        state.next_chunk_index = state.existing_chunks.last().map(|i| i + 1).unwrap_or(1);
        Ok(state)
    }

    fn load_chunk(&mut self, path: &Path) -> Result<(), WriterError> {
        let file = File::open(path).map_err(|source| WriterError::Directory {
            path: path.to_path_buf(),
            source,
        })?;
        for (line_no, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|source| WriterError::Directory {
                path: path.to_path_buf(),
                source,
            })?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<RecordId>(&line) {
                Ok(record) => {
                    if self.seen_ids.insert(record.id) {
                        self.total_emitted += 1;
                    }
                }
                Err(err) => {
                    tracing::warn!(
                        path = %path.display(),
                        line = line_no + 1,
                        error = %err,
                        "ignoring unreadable record"
                    );
                    self.unreadable_lines += 1;
                }
            }
        }
        Ok(())
    }
}

/// Shared counters, mutated only under the sink lock.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MiningProgress {
    pub total_emitted: u64,
    pub chunk_index: u32,
    pub chunk_records: usize,
    pub chunks_written: u32,
    pub duplicates: u64,
}

impl MiningProgress {
    pub fn resumed(state: &ResumeState) -> Self {
        Self {
            total_emitted: state.total_emitted,
            chunk_index: state.next_chunk_index,
            ..Default::default()
        }
    }
}

struct OpenChunk {
    path: PathBuf,
    writer: BufWriter<File>,
}

pub struct ChunkWriter {
    dir: PathBuf,
    chunk_size: usize,
    current: Option<OpenChunk>,
}

impl ChunkWriter {
    pub fn new(dir: &Path, chunk_size: usize) -> Result<Self, WriterError> {
        fs::create_dir_all(dir).map_err(|source| WriterError::Directory {
            path: dir.to_path_buf(),
            source,
        })?;
        Ok(Self {
            dir: dir.to_path_buf(),
            chunk_size: chunk_size.max(1),
            current: None,
        })
    }

    pub fn append(
        &mut self,
        progress: &mut MiningProgress,
        record: &MethodRecord,
    ) -> Result<(), WriterError> {
        let line = serde_json::to_string(record)?;
        let chunk = match self.current.take() {
            Some(chunk) => chunk,
            None => self.open_chunk(progress.chunk_index)?,
        };
        let chunk = self.current.insert(chunk);
        chunk
            .writer
            .write_all(line.as_bytes())
            .and_then(|_| chunk.writer.write_all(b"\n"))
            .map_err(|source| WriterError::Write {
                path: chunk.path.clone(),
                source,
            })?;
        progress.chunk_records += 1;
        progress.total_emitted += 1;
        if progress.chunk_records >= self.chunk_size {
            self.rotate(progress)?;
        }
        Ok(())
    }

    /// Flush and close the open chunk, if any. The next record starts a new file.
    pub fn rotate(&mut self, progress: &mut MiningProgress) -> Result<(), WriterError> {
        let Some(mut chunk) = self.current.take() else {
            return Ok(());
        };
        chunk.writer.flush().map_err(|source| WriterError::Write {
            path: chunk.path.clone(),
            source,
        })?;
        tracing::debug!(path = %chunk.path.display(), records = progress.chunk_records, "chunk closed");
        progress.chunk_index += 1;
        progress.chunk_records = 0;
        progress.chunks_written += 1;
        Ok(())
    }

    fn open_chunk(&self, index: u32) -> Result<OpenChunk, WriterError> {
        let path = self.dir.join(chunk_file_name(index));
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|source| {
                if source.kind() == std::io::ErrorKind::AlreadyExists {
                    WriterError::ChunkExists { path: path.clone() }
                } else {
                    WriterError::Write {
                        path: path.clone(),
                        source,
                    }
                }
            })?;
        Ok(OpenChunk {
            path,
            writer: BufWriter::new(file),
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubmitOutcome {
    pub written: u64,
    pub duplicates: u64,
}

struct SinkState {
    writer: ChunkWriter,
    progress: MiningProgress,
    seen: HashSet<String>,
}

/// The single exclusive-access point for output. Workers submit whole files.
pub struct RecordSink {
    state: Mutex<SinkState>,
}

impl RecordSink {
    pub fn open(dir: &Path, chunk_size: usize) -> Result<(Self, ResumeState), WriterError> {
        let mut resume = ResumeState::discover(dir)?;
        let writer = ChunkWriter::new(dir, chunk_size)?;
        let progress = MiningProgress::resumed(&resume);
        let seen = std::mem::take(&mut resume.seen_ids);
        if !resume.existing_chunks.is_empty() {
            tracing::info!(
                chunks = resume.existing_chunks.len(),
                emitted = resume.total_emitted,
                next_chunk = resume.next_chunk_index,
                "resuming output"
            );
        }
        Ok((
            Self {
                state: Mutex::new(SinkState {
                    writer,
                    progress,
                    seen,
                }),
            },
            resume,
        ))
    }

    pub fn submit(&self, records: &[MethodRecord]) -> Result<SubmitOutcome, WriterError> {
        let mut guard = self.state.lock().map_err(|_| WriterError::Poisoned)?;
        let SinkState {
            writer,
            progress,
            seen,
        } = &mut *guard;
        let mut outcome = SubmitOutcome::default();
        for record in records {
            if !seen.insert(record.id.clone()) {
                progress.duplicates += 1;
                outcome.duplicates += 1;
                continue;
            }
            writer.append(progress, record)?;
            outcome.written += 1;
            if progress.total_emitted % PROGRESS_EVERY == 0 {
                tracing::info!(emitted = progress.total_emitted, chunk = progress.chunk_index, "progress");
            }
        }
        Ok(outcome)
    }

    pub fn total_emitted(&self) -> Result<u64, WriterError> {
        let guard = self.state.lock().map_err(|_| WriterError::Poisoned)?;
        Ok(guard.progress.total_emitted)
    }

    /// Flush the partial chunk. Later submissions open a new chunk.
    pub fn close(&self) -> Result<MiningProgress, WriterError> {
        let mut guard = self.state.lock().map_err(|_| WriterError::Poisoned)?;
        let SinkState {
            writer, progress, ..
        } = &mut *guard;
        writer.rotate(progress)?;
        Ok(progress.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_names_round_trip() {
        assert_eq!(chunk_file_name(7), "methods_chunk_7.jsonl");
        assert_eq!(parse_chunk_index("methods_chunk_12.jsonl"), Some(12));
        assert_eq!(parse_chunk_index("methods_chunk_x.jsonl"), None);
        assert_eq!(parse_chunk_index("other.jsonl"), None);
    }

    #[test]
    fn discover_on_missing_dir_starts_at_one() {
        let dir = tempfile::tempdir().unwrap();
        let state = ResumeState::discover(&dir.path().join("absent")).unwrap();
        assert_eq!(state.next_chunk_index, 1);
        assert_eq!(state.total_emitted, 0);
    }

    #[test]
    fn discover_skips_truncated_trailing_line() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(chunk_file_name(2)),
            "{\"id\":\"m_a\"}\n{\"id\":\"m_b\"}\n{\"id\":\"m_",
        )
        .unwrap();
        let state = ResumeState::discover(dir.path()).unwrap();
        assert_eq!(state.existing_chunks, vec![2]);
        assert_eq!(state.next_chunk_index, 3);
        assert_eq!(state.total_emitted, 2);
        assert_eq!(state.unreadable_lines, 1);
        assert!(state.seen_ids.contains("m_b"));
    }
}
