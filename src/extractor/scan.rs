use crate::error::ExtractError;
use globset::GlobSet;
use ignore::WalkBuilder;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

pub const JAVA_EXTENSIONS: &[&str] = &["java"];

#[derive(Debug, Clone)]
pub struct ScannedFile {
    pub rel_path: String,
    pub abs_path: PathBuf,
    pub size: u64,
}

#[derive(Debug, Default)]
pub struct ScanOutcome {
    pub files: Vec<ScannedFile>,
    /// Java files matched by the exclude globs.
    pub excluded: usize,
    /// Directory entries the walker could not read.
    pub walk_errors: usize,
}

/// Collect Java files under `repo_root`, sorted by relative path.
///
/// Ignore files are not honoured: a checkout is mined as committed, and the
/// exclude globs are the only path filter.
pub fn scan_java_files(repo_root: &Path, exclude: &GlobSet) -> Result<ScanOutcome, ExtractError> {
    if !repo_root.is_dir() {
        return Err(ExtractError::Walk {
            path: repo_root.to_path_buf(),
            reason: "not a directory".to_string(),
        });
    }
    let mut outcome = ScanOutcome::default();
    let walker = WalkBuilder::new(repo_root)
        .ignore(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .parents(false)
        .hidden(false)
        .filter_entry(|entry| !is_ignored_entry(entry))
        .build();

    for entry in walker {
        let entry = match entry {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(root = %repo_root.display(), error = %err, "walk error");
                outcome.walk_errors += 1;
                continue;
            }
        };
        if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
            continue;
        }
        let path = entry.path();
        if !is_java(path) {
            continue;
        }
        let Ok(rel_path) = crate::util::normalize_rel_path(repo_root, path) else {
            continue;
        };
        if exclude.is_match(&rel_path) {
            tracing::debug!(path = %rel_path, "excluded by glob");
            outcome.excluded += 1;
            continue;
        }
        let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
        outcome.files.push(ScannedFile {
            rel_path,
            abs_path: path.to_path_buf(),
            size,
        });
    }
    outcome.files.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
    Ok(outcome)
}

pub fn is_java(path: &Path) -> bool {
    path.extension()
        .and_then(OsStr::to_str)
        .map(|ext| JAVA_EXTENSIONS.contains(&ext))
        .unwrap_or(false)
}

fn is_ignored_entry(entry: &ignore::DirEntry) -> bool {
    entry.file_name() == OsStr::new(".git") || entry.file_name() == OsStr::new(".methodmine")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::build_glob_set;
    use std::fs;

    #[test]
    fn scans_only_java_and_applies_excludes() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("src/main/java/a")).unwrap();
        fs::create_dir_all(root.join("target/generated-sources")).unwrap();
        fs::create_dir_all(root.join(".git")).unwrap();
        fs::write(root.join("src/main/java/a/B.java"), "class B {}").unwrap();
        fs::write(root.join("src/main/java/a/A.java"), "class A {}").unwrap();
        fs::write(root.join("src/main/java/a/notes.txt"), "x").unwrap();
        fs::write(root.join("target/generated-sources/G.java"), "class G {}").unwrap();
        fs::write(root.join(".git/H.java"), "class H {}").unwrap();

        let exclude = build_glob_set(&["**/target/**".to_string()]).unwrap();
        let outcome = scan_java_files(root, &exclude).unwrap();
        let paths: Vec<&str> = outcome.files.iter().map(|f| f.rel_path.as_str()).collect();
        assert_eq!(paths, vec!["src/main/java/a/A.java", "src/main/java/a/B.java"]);
        assert_eq!(outcome.excluded, 1);
    }

    #[test]
    fn missing_root_is_a_walk_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = scan_java_files(&dir.path().join("absent"), &GlobSet::empty()).unwrap_err();
        assert!(matches!(err, ExtractError::Walk { .. }));
    }
}
