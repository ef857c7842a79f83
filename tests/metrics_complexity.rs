use globset::GlobSet;
use methodmine::extractor::{ExtractedFile, ExtractorOptions, MethodExtractor};
use methodmine::grammar::JavaGrammar;
use methodmine::metrics::MetricEngine;
use methodmine::metrics::complexity::{
    AnalyzerError, ComplexityAnalyzer, ComplexityStrategy, ComplexityTable, LexicalAnalyzer,
    NamePosition,
};
use std::sync::Arc;

fn extract(engine: MetricEngine, source: &str) -> ExtractedFile {
    let grammar = JavaGrammar::bundled().unwrap();
    let options = ExtractorOptions {
        min_tokens: 1,
        max_tokens: 10_000,
        max_file_bytes: 1 << 20,
        exclude: GlobSet::empty(),
    };
    let mut extractor = MethodExtractor::new(&grammar, engine, options).unwrap();
    extractor.extract_source("Sample.java", source).unwrap()
}

const CLASSIFY: &str = r#"
class Sample {
    String classify(int n) {
        if (n < 0) {
            return "negative";
        } else if (n == 0) {
            return "zero";
        } else {
            return "positive";
        }
    }
}
"#;

#[test]
fn heuristic_counts_terminal_else() {
    let file = extract(MetricEngine::heuristic_only(), CLASSIFY);
    let method = &file.methods[0];
    assert_eq!(method.strategy, ComplexityStrategy::Heuristic);
    assert_eq!(method.metrics.cyclomatic_complexity, 4);
}

#[test]
fn analyzer_counts_decision_points_only() {
    let file = extract(MetricEngine::default(), CLASSIFY);
    let method = &file.methods[0];
    assert_eq!(method.strategy, ComplexityStrategy::Analyzer(3));
    assert_eq!(method.metrics.cyclomatic_complexity, 3);
}

#[test]
fn strategies_agree_on_everything_but_complexity() {
    let analyzed = extract(MetricEngine::default(), CLASSIFY);
    let heuristic = extract(MetricEngine::heuristic_only(), CLASSIFY);
    let mut a = analyzed.methods[0].metrics.clone();
    let b = heuristic.methods[0].metrics.clone();
    a.cyclomatic_complexity = b.cyclomatic_complexity;
    assert_eq!(a, b);
    assert_eq!(analyzed.methods[0].code_tokens, heuristic.methods[0].code_tokens);
}

#[test]
fn loops_and_short_circuits() {
    let source = r#"
class Loops {
    int count(java.util.List<Integer> xs) {
        int n = 0;
        for (int x : xs) {
            while (x > 10 || x < -10) {
                x = x / 2;
            }
            n += x > 0 && x % 2 == 0 ? 1 : 0;
        }
        return n;
    }
}
"#;
    for engine in [MetricEngine::default(), MetricEngine::heuristic_only()] {
        let file = extract(engine, source);
        // for, while, ||, &&, ?
        assert_eq!(file.methods[0].metrics.cyclomatic_complexity, 6);
    }
}

#[test]
fn switch_cases_and_catches() {
    let source = r#"
class Switches {
    int code(String s) {
        try {
            switch (s) {
                case "a": return 1;
                case "b": return 2;
                default: return 0;
            }
        } catch (IllegalStateException e) {
            return -1;
        } catch (RuntimeException e) {
            return -2;
        }
    }
}
"#;
    let file = extract(MetricEngine::default(), source);
    assert_eq!(file.methods[0].metrics.cyclomatic_complexity, 5);
    let heuristic = extract(MetricEngine::heuristic_only(), source);
    assert_eq!(heuristic.methods[0].metrics.cyclomatic_complexity, 5);
}

#[test]
fn analyzer_failure_falls_back_per_file() {
    struct Failing;
    impl ComplexityAnalyzer for Failing {
        fn analyze(&self, _source: &str) -> Result<ComplexityTable, AnalyzerError> {
            Err(AnalyzerError::UnbalancedBraces { line: 1 })
        }
    }
    let file = extract(MetricEngine::new(Arc::new(Failing)), CLASSIFY);
    assert_eq!(file.methods[0].strategy, ComplexityStrategy::Heuristic);
    assert_eq!(file.methods[0].metrics.cyclomatic_complexity, 4);
}

#[test]
fn analyzer_table_is_keyed_by_name_position() {
    let source = "class Twice {\n  int f(int a) { return a; }\n  int f(int a, int b) {\n    if (a > b) { return a; }\n    return b;\n  }\n}\n";
    let table = LexicalAnalyzer.analyze(source).unwrap();
    let at = |line, column| NamePosition { line, column };
    assert_eq!(table.lookup("f", at(2, 6)), Some(1));
    assert_eq!(table.lookup("f", at(3, 6)), Some(2));
    assert_eq!(table.lookup("f", at(4, 6)), None);
}

#[test]
fn overloads_sharing_a_line_keep_their_own_complexity() {
    let source = "class A {\n int f(int a) { if (a > 0 && a < 9) return 1; return 0; } int f() { return 0; }\n}\n";
    let file = extract(MetricEngine::default(), source);
    let complexities: Vec<(String, ComplexityStrategy, u32)> = file
        .methods
        .iter()
        .map(|m| (m.info.signature.clone(), m.strategy, m.metrics.cyclomatic_complexity))
        .collect();
    assert_eq!(
        complexities,
        vec![
            ("int f(int a)".to_string(), ComplexityStrategy::Analyzer(3), 3),
            ("int f()".to_string(), ComplexityStrategy::Analyzer(1), 1),
        ]
    );
}

#[test]
fn comment_between_else_and_if_is_not_a_terminal_else() {
    let source = r#"
class Sample {
    String classify(int n) {
        if (n < 0) {
            return "negative";
        } else /* zero next */ if (n == 0) {
            return "zero";
        } else {
            return "positive";
        }
    }
}
"#;
    let file = extract(MetricEngine::heuristic_only(), source);
    assert_eq!(file.methods[0].metrics.cyclomatic_complexity, 4);
}
