//! Method extraction over a working copy.
//!
//! [`MethodExtractor::files`] walks the checkout once and then parses files
//! lazily, one per `next()` call. Every file yields its own `Result`, so a bad
//! file is reported and skipped while the walk carries on.

pub mod java;
pub mod scan;
pub mod stable_id;

use crate::config::MinerConfig;
use crate::error::{ExtractError, GrammarError};
use crate::grammar::JavaGrammar;
use crate::metrics::complexity::ComplexityStrategy;
use crate::metrics::{MetricEngine, MetricSuite};
use crate::model::MethodInfo;
use globset::GlobSet;
use java::JavaExtractor;
use scan::{ScanOutcome, ScannedFile};
use std::path::Path;

#[derive(Debug, Clone)]
pub struct ExtractorOptions {
    pub min_tokens: usize,
    pub max_tokens: usize,
    pub max_file_bytes: u64,
    pub exclude: GlobSet,
}

impl ExtractorOptions {
    pub fn from_config(config: &MinerConfig) -> anyhow::Result<Self> {
        Ok(Self {
            min_tokens: config.min_tokens,
            max_tokens: config.max_tokens,
            max_file_bytes: config.max_file_bytes,
            exclude: config.exclude_set()?,
        })
    }
}

/// A method with its metrics, detached from the syntax tree.
#[derive(Debug, Clone)]
pub struct ExtractedMethod {
    pub rel_path: String,
    pub start_byte: usize,
    pub end_byte: usize,
    pub info: MethodInfo,
    pub code_tokens: Vec<String>,
    pub metrics: MetricSuite,
    pub strategy: ComplexityStrategy,
}

#[derive(Debug, Clone, Default)]
pub struct ExtractedFile {
    pub rel_path: String,
    pub methods: Vec<ExtractedMethod>,
    /// Methods dropped by the token bounds.
    pub filtered: usize,
}

#[derive(Debug)]
pub struct FileResult {
    pub rel_path: String,
    pub outcome: Result<ExtractedFile, ExtractError>,
}

pub struct MethodExtractor {
    parser: JavaExtractor,
    engine: MetricEngine,
    options: ExtractorOptions,
}

impl MethodExtractor {
    pub fn new(
        grammar: &JavaGrammar,
        engine: MetricEngine,
        options: ExtractorOptions,
    ) -> Result<Self, GrammarError> {
        Ok(Self {
            parser: JavaExtractor::new(grammar)?,
            engine,
            options,
        })
    }

    /// Walk `root` and return a lazy per-file iterator plus the scan counters.
    pub fn files<'a>(&'a mut self, root: &Path) -> Result<(FileIter<'a>, ScanOutcome), ExtractError> {
        let mut outcome = scan::scan_java_files(root, &self.options.exclude)?;
        let files = std::mem::take(&mut outcome.files);
        Ok((
            FileIter {
                extractor: self,
                files: files.into_iter(),
            },
            outcome,
        ))
    }

    pub fn extract_file(&mut self, file: &ScannedFile) -> Result<ExtractedFile, ExtractError> {
        if file.size > self.options.max_file_bytes {
            return Err(ExtractError::TooLarge {
                path: file.rel_path.clone(),
                size: file.size,
                limit: self.options.max_file_bytes,
            });
        }
        let source = crate::util::read_lossy(&file.abs_path).map_err(|source| ExtractError::Read {
            path: file.rel_path.clone(),
            source,
        })?;
        self.extract_source(&file.rel_path, &source)
    }

    pub fn extract_source(&mut self, rel_path: &str, source: &str) -> Result<ExtractedFile, ExtractError> {
        let tree = self.parser.parse(rel_path, source)?;
        let bytes = source.as_bytes();
        let table = self.engine.analyze_file(rel_path, source);
        let mut extracted = ExtractedFile {
            rel_path: rel_path.to_string(),
            ..Default::default()
        };

        for site in java::method_sites(&tree, bytes) {
            let measured = self
                .engine
                .measure(site.node, bytes, table.as_ref(), &site.name, site.name_at);
            let count = measured.code_tokens.len();
            if count < self.options.min_tokens || count > self.options.max_tokens {
                tracing::debug!(path = rel_path, method = %site.qualified_name, tokens = count, "outside token bounds");
                extracted.filtered += 1;
                continue;
            }
            let start_byte = site.node.start_byte();
            let end_byte = site.node.end_byte();
            let original_code = crate::util::slice_bytes(source, start_byte, end_byte)
                .unwrap_or_default()
                .to_string();
            extracted.methods.push(ExtractedMethod {
                rel_path: rel_path.to_string(),
                start_byte,
                end_byte,
                info: MethodInfo {
                    name: site.name,
                    qualified_name: site.qualified_name,
                    start_line: site.start_line,
                    end_line: site.end_line,
                    signature: site.signature,
                    original_code,
                    doc_comment: site.doc_comment,
                },
                code_tokens: measured.code_tokens,
                metrics: measured.metrics,
                strategy: measured.strategy,
            });
        }
        Ok(extracted)
    }
}

pub struct FileIter<'a> {
    extractor: &'a mut MethodExtractor,
    files: std::vec::IntoIter<ScannedFile>,
}

impl Iterator for FileIter<'_> {
    type Item = FileResult;

    fn next(&mut self) -> Option<Self::Item> {
        let file = self.files.next()?;
        let outcome = self.extractor.extract_file(&file);
        Some(FileResult {
            rel_path: file.rel_path,
            outcome,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.files.size_hint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor(min_tokens: usize, max_tokens: usize) -> MethodExtractor {
        let grammar = JavaGrammar::bundled().unwrap();
        MethodExtractor::new(
            &grammar,
            MetricEngine::default(),
            ExtractorOptions {
                min_tokens,
                max_tokens,
                max_file_bytes: 1024,
                exclude: GlobSet::empty(),
            },
        )
        .unwrap()
    }

    #[test]
    fn token_bounds_filter_methods() {
        let mut ex = extractor(7, 20);
        let out = ex
            .extract_source("A.java", "class A {\n void a() {}\n int b(int x) { return x + 1; }\n}\n")
            .unwrap();
        assert_eq!(out.methods.len(), 1);
        assert_eq!(out.methods[0].info.name, "b");
        assert_eq!(out.filtered, 1);
    }

    #[test]
    fn analyzer_supplies_complexity_when_it_knows_the_method() {
        let mut ex = extractor(1, 2000);
        let out = ex
            .extract_source("A.java", "class A {\n int m(int x) {\n  if (x > 0 && x < 5) { return 1; }\n  return 0;\n }\n}\n")
            .unwrap();
        let method = &out.methods[0];
        assert_eq!(method.strategy, ComplexityStrategy::Analyzer(3));
        assert_eq!(method.metrics.cyclomatic_complexity, 3);
        assert!(method.info.original_code.starts_with("int m(int x)"));
    }

    #[test]
    fn oversized_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Big.java");
        std::fs::write(&path, "class Big {}").unwrap();
        let mut ex = extractor(1, 2000);
        let err = ex
            .extract_file(&ScannedFile {
                rel_path: "Big.java".into(),
                abs_path: path,
                size: 4096,
            })
            .unwrap_err();
        assert_eq!(err.reason_key(), "too_large");
    }
}
