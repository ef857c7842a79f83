use crate::metrics::MetricSuite;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Repository as reported by the search API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryCandidate {
    pub owner: String,
    pub name: String,
    pub html_url: String,
    pub clone_url: String,
    pub stars: u64,
    pub pushed_at: Option<DateTime<Utc>>,
    pub default_branch: Option<String>,
    pub license_key: Option<String>,
}

impl RepositoryCandidate {
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

    /// Uniqueness key across search pages.
    pub fn key(&self) -> (String, String) {
        (self.owner.to_lowercase(), self.name.to_lowercase())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetSplit {
    Train,
    Val,
    Test,
}

impl DatasetSplit {
    pub fn as_str(self) -> &'static str {
        match self {
            DatasetSplit::Train => "train",
            DatasetSplit::Val => "val",
            DatasetSplit::Test => "test",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoInfo {
    pub name: String,
    pub owner: String,
    pub full_name: String,
    pub url: String,
    pub commit_sha: String,
    pub license: Option<String>,
    pub stars: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub path: String,
    pub language: String,
}

impl FileInfo {
    pub fn java(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            language: "Java".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodInfo {
    pub name: String,
    pub qualified_name: String,
    pub start_line: usize,
    pub end_line: usize,
    pub signature: String,
    pub original_code: String,
    pub doc_comment: Option<String>,
}

/// One line of the output corpus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodRecord {
    pub dataset_split: DatasetSplit,
    pub id: String,
    pub repo: RepoInfo,
    pub file: FileInfo,
    pub method: MethodInfo,
    pub code_tokens: Vec<String>,
    pub metrics: MetricSuite,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> MethodRecord {
        MethodRecord {
            dataset_split: DatasetSplit::Val,
            id: "m_0123456789abcdef".to_string(),
            repo: RepoInfo {
                name: "lib".to_string(),
                owner: "acme".to_string(),
                full_name: "acme/lib".to_string(),
                url: "https://github.com/acme/lib".to_string(),
                commit_sha: "abc".to_string(),
                license: None,
                stars: 10,
            },
            file: FileInfo::java("src/A.java"),
            method: MethodInfo {
                name: "m".to_string(),
                qualified_name: "A.m".to_string(),
                start_line: 1,
                end_line: 1,
                signature: "void m()".to_string(),
                original_code: "void m() {}".to_string(),
                doc_comment: None,
            },
            code_tokens: vec!["void".into(), "m".into(), "(".into(), ")".into(), "{".into(), "}".into()],
            metrics: MetricSuite {
                cyclomatic_complexity: 1,
                n_ast_nodes: 9,
                ast_depth: 3,
                n_identifiers: 1,
                vocab_size: 6,
                n_whitespaces: 2,
                n_words: 3,
                nloc: 1,
                token_counts: 6,
            },
        }
    }

    #[test]
    fn record_serializes_with_top_level_key_order() {
        let json = serde_json::to_string(&sample_record()).unwrap();
        let keys = [
            "\"dataset_split\":\"val\"",
            "\"id\"",
            "\"repo\"",
            "\"file\"",
            "\"method\"",
            "\"code_tokens\"",
            "\"metrics\"",
        ];
        let mut last = 0;
        for key in keys {
            let pos = json.find(key).unwrap();
            assert!(pos >= last, "{key} out of order");
            last = pos;
        }
        assert!(json.contains("\"license\":null"));
        assert!(json.contains("\"doc_comment\":null"));
        assert!(json.contains("\"language\":\"Java\""));
    }

    #[test]
    fn candidate_key_is_case_insensitive() {
        let a = RepositoryCandidate {
            owner: "Acme".into(),
            name: "Lib".into(),
            html_url: String::new(),
            clone_url: String::new(),
            stars: 1,
            pushed_at: None,
            default_branch: None,
            license_key: None,
        };
        let mut b = a.clone();
        b.owner = "acme".into();
        b.name = "lib".into();
        assert_eq!(a.key(), b.key());
        assert_eq!(a.full_name(), "Acme/Lib");
    }
}
