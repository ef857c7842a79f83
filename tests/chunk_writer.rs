use methodmine::metrics::MetricSuite;
use methodmine::model::{DatasetSplit, FileInfo, MethodInfo, MethodRecord, RepoInfo};
use methodmine::writer::{RecordSink, ResumeState, chunk_file_name};
use std::fs;
use std::path::Path;

fn record(n: usize) -> MethodRecord {
    MethodRecord {
        dataset_split: DatasetSplit::Train,
        id: format!("m_{n:016x}"),
        repo: RepoInfo {
            name: "lib".into(),
            owner: "acme".into(),
            full_name: "acme/lib".into(),
            url: "https://github.com/acme/lib".into(),
            commit_sha: "abc".into(),
            license: None,
            stars: 1,
        },
        file: FileInfo::java("src/A.java"),
        method: MethodInfo {
            name: format!("m{n}"),
            qualified_name: format!("A.m{n}"),
            start_line: n,
            end_line: n,
            signature: format!("void m{n}()"),
            original_code: format!("void m{n}() {{}}"),
            doc_comment: None,
        },
        code_tokens: vec!["void".into(), format!("m{n}"), "(".into(), ")".into()],
        metrics: MetricSuite {
            cyclomatic_complexity: 1,
            n_ast_nodes: 8,
            ast_depth: 3,
            n_identifiers: 1,
            vocab_size: 4,
            n_whitespaces: 1,
            n_words: 2,
            nloc: 1,
            token_counts: 4,
        },
    }
}

fn line_counts(dir: &Path, chunks: u32) -> Vec<usize> {
    (1..=chunks)
        .map(|i| {
            fs::read_to_string(dir.join(chunk_file_name(i)))
                .unwrap()
                .lines()
                .count()
        })
        .collect()
}

#[test]
fn chunks_rotate_at_chunk_size() {
    let dir = tempfile::tempdir().unwrap();
    let (sink, resume) = RecordSink::open(dir.path(), 2).unwrap();
    assert_eq!(resume.next_chunk_index, 1);

    let records: Vec<_> = (0..5).map(record).collect();
    let outcome = sink.submit(&records).unwrap();
    assert_eq!(outcome.written, 5);
    let progress = sink.close().unwrap();

    assert_eq!(progress.total_emitted, 5);
    assert_eq!(progress.chunks_written, 3);
    assert_eq!(line_counts(dir.path(), 3), vec![2, 2, 1]);
    assert!(!dir.path().join(chunk_file_name(4)).exists());
}

#[test]
fn every_line_is_one_record() {
    let dir = tempfile::tempdir().unwrap();
    let (sink, _) = RecordSink::open(dir.path(), 10).unwrap();
    sink.submit(&[record(1), record(2)]).unwrap();
    sink.close().unwrap();

    let text = fs::read_to_string(dir.path().join(chunk_file_name(1))).unwrap();
    let parsed: Vec<MethodRecord> = text
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(parsed, vec![record(1), record(2)]);
}

#[test]
fn resume_appends_new_chunks_without_touching_old_ones() {
    let dir = tempfile::tempdir().unwrap();
    {
        let (sink, _) = RecordSink::open(dir.path(), 2).unwrap();
        let records: Vec<_> = (0..6).map(record).collect();
        sink.submit(&records).unwrap();
        sink.close().unwrap();
    }
    let before: Vec<Vec<u8>> = (1..=3)
        .map(|i| fs::read(dir.path().join(chunk_file_name(i))).unwrap())
        .collect();

    let (sink, resume) = RecordSink::open(dir.path(), 2).unwrap();
    assert_eq!(resume.existing_chunks, vec![1, 2, 3]);
    assert_eq!(resume.next_chunk_index, 4);
    assert_eq!(resume.total_emitted, 6);

    let outcome = sink.submit(&[record(3), record(6)]).unwrap();
    assert_eq!(outcome.written, 1);
    assert_eq!(outcome.duplicates, 1);
    let progress = sink.close().unwrap();
    assert_eq!(progress.total_emitted, 7);

    let after: Vec<Vec<u8>> = (1..=3)
        .map(|i| fs::read(dir.path().join(chunk_file_name(i))).unwrap())
        .collect();
    assert_eq!(before, after);
    assert_eq!(line_counts(dir.path(), 4), vec![2, 2, 2, 1]);
}

#[test]
fn ids_are_unique_across_the_corpus() {
    let dir = tempfile::tempdir().unwrap();
    let (sink, _) = RecordSink::open(dir.path(), 3).unwrap();
    sink.submit(&[record(1), record(2), record(1)]).unwrap();
    sink.submit(&[record(2), record(3)]).unwrap();
    sink.close().unwrap();

    let state = ResumeState::discover(dir.path()).unwrap();
    assert_eq!(state.total_emitted, 3);
    assert_eq!(state.seen_ids.len(), 3);
}

#[test]
fn existing_chunk_file_is_never_overwritten() {
    let dir = tempfile::tempdir().unwrap();
    let (sink, _) = RecordSink::open(dir.path(), 2).unwrap();
    // Appears after the resume scan, e.g. from a concurrent run.
    fs::write(dir.path().join(chunk_file_name(1)), "keep\n").unwrap();
    let err = sink.submit(&[record(1)]).unwrap_err();
    assert!(matches!(
        err,
        methodmine::error::WriterError::ChunkExists { .. }
    ));
    assert_eq!(
        fs::read_to_string(dir.path().join(chunk_file_name(1))).unwrap(),
        "keep\n"
    );
}
