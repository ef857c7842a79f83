pub mod complexity;

use crate::syntax::{self, NodeKind};
use complexity::{
    ComplexityAnalyzer, ComplexityStrategy, ComplexityTable, LexicalAnalyzer, NamePosition,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tree_sitter::Node;

/// Fixed metric map of one method. Field order is the serialized key order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricSuite {
    pub cyclomatic_complexity: u32,
    pub n_ast_nodes: u64,
    pub ast_depth: u32,
    pub n_identifiers: u64,
    pub vocab_size: u64,
    pub n_whitespaces: u64,
    pub n_words: u64,
    pub nloc: u64,
    pub token_counts: u64,
}

#[derive(Debug, Clone)]
pub struct Measured {
    pub metrics: MetricSuite,
    pub code_tokens: Vec<String>,
    pub strategy: ComplexityStrategy,
}

/// Computes the metric suite, using a per-file complexity table when one is available.
#[derive(Clone)]
pub struct MetricEngine {
    analyzer: Option<Arc<dyn ComplexityAnalyzer>>,
}

impl Default for MetricEngine {
    fn default() -> Self {
        Self::new(Arc::new(LexicalAnalyzer))
    }
}

impl MetricEngine {
    pub fn new(analyzer: Arc<dyn ComplexityAnalyzer>) -> Self {
        Self {
            analyzer: Some(analyzer),
        }
    }

    pub fn heuristic_only() -> Self {
        Self { analyzer: None }
    }

    /// Run the analyzer once for a whole file. `None` means every method in the
    /// file falls back to the heuristic.
    pub fn analyze_file(&self, path: &str, source: &str) -> Option<ComplexityTable> {
        let analyzer = self.analyzer.as_ref()?;
        match analyzer.analyze(source) {
            Ok(table) => Some(table),
            Err(err) => {
                tracing::debug!(path, error = %err, "complexity analyzer failed; using heuristic");
                None
            }
        }
    }

    pub fn measure(
        &self,
        node: Node<'_>,
        source: &[u8],
        table: Option<&ComplexityTable>,
        name: &str,
        name_at: NamePosition,
    ) -> Measured {
        let strategy = ComplexityStrategy::select(table, name, name_at);
        let code_tokens = syntax::code_tokens(node, source);
        let metrics = compute_metrics(node, source, &code_tokens, strategy);
        Measured {
            metrics,
            code_tokens,
            strategy,
        }
    }
}

/// Pure over (subtree, source span); `strategy` only affects `cyclomatic_complexity`.
pub fn compute_metrics(
    node: Node<'_>,
    source: &[u8],
    code_tokens: &[String],
    strategy: ComplexityStrategy,
) -> MetricSuite {
    let shape = tree_shape(node, source);
    let span = span_text(node, source);
    let vocab: HashSet<&str> = code_tokens.iter().map(String::as_str).collect();

    MetricSuite {
        cyclomatic_complexity: strategy.resolve(node, source),
        n_ast_nodes: shape.nodes,
        ast_depth: shape.depth,
        n_identifiers: shape.identifiers,
        vocab_size: vocab.len() as u64,
        n_whitespaces: span.chars().filter(|ch| ch.is_whitespace()).count() as u64,
        n_words: span.split_whitespace().count() as u64,
        nloc: span.lines().filter(|line| !line.trim().is_empty()).count() as u64,
        token_counts: code_tokens.len() as u64,
    }
}

struct TreeShape {
    nodes: u64,
    depth: u32,
    identifiers: u64,
}

fn tree_shape(node: Node<'_>, source: &[u8]) -> TreeShape {
    let mut shape = TreeShape {
        nodes: 0,
        depth: 0,
        identifiers: 0,
    };
    let mut stack = vec![(node, 0u32)];
    while let Some((current, depth)) = stack.pop() {
        shape.nodes += 1;
        shape.depth = shape.depth.max(depth);
        if NodeKind::classify(current, source) == NodeKind::Identifier {
            shape.identifiers += 1;
        }
        let mut cursor = current.walk();
        for child in current.children(&mut cursor) {
            stack.push((child, depth + 1));
        }
    }
    shape
}

fn span_text<'a>(node: Node<'_>, source: &'a [u8]) -> std::borrow::Cow<'a, str> {
    let end = node.end_byte().min(source.len());
    let start = node.start_byte().min(end);
    String::from_utf8_lossy(&source[start..end])
}
