//! Cyclomatic complexity strategies.
//!
//! The primary path is [`LexicalAnalyzer`], a token-stream analyzer that runs once
//! per file and reports a table of functions keyed by name and the position of
//! the name token. When a method has no row in that table (the analyzer failed or
//! did not recognise the declaration), [`heuristic_complexity`] counts branch
//! nodes in the method's syntax subtree instead.

use crate::syntax::NodeKind;
use thiserror::Error;
use tree_sitter::Node;

/// Position of a name token: 1-based line, 0-based byte column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NamePosition {
    pub line: usize,
    pub column: usize,
}

impl NamePosition {
    pub fn of(node: Node<'_>) -> Self {
        let point = node.start_position();
        Self {
            line: point.row + 1,
            column: point.column,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionComplexity {
    pub name: String,
    pub name_at: NamePosition,
    pub end_line: usize,
    pub complexity: u32,
}

#[derive(Debug, Clone, Default)]
pub struct ComplexityTable {
    rows: Vec<FunctionComplexity>,
}

impl ComplexityTable {
    pub fn rows(&self) -> &[FunctionComplexity] {
        &self.rows
    }

    /// Complexity of the single row at `at`. Zero or several matches yield `None`.
    pub fn lookup(&self, name: &str, at: NamePosition) -> Option<u32> {
        let mut matches = self
            .rows
            .iter()
            .filter(|row| row.name_at == at && row.name == name);
        let row = matches.next()?;
        match matches.next() {
            Some(_) => None,
            None => Some(row.complexity),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AnalyzerError {
    #[error("unbalanced braces at line {line}")]
    UnbalancedBraces { line: usize },
    #[error("unterminated {what} starting at line {line}")]
    Unterminated { what: &'static str, line: usize },
}

pub trait ComplexityAnalyzer: Send + Sync {
    fn analyze(&self, source: &str) -> Result<ComplexityTable, AnalyzerError>;
}

/// Strategy chosen for one method before any counting happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComplexityStrategy {
    Analyzer(u32),
    Heuristic,
}

impl ComplexityStrategy {
    pub fn select(table: Option<&ComplexityTable>, name: &str, at: NamePosition) -> Self {
        match table.and_then(|table| table.lookup(name, at)) {
            Some(value) => ComplexityStrategy::Analyzer(value),
            None => ComplexityStrategy::Heuristic,
        }
    }

    pub fn resolve(self, node: Node<'_>, source: &[u8]) -> u32 {
        match self {
            ComplexityStrategy::Analyzer(value) => value,
            ComplexityStrategy::Heuristic => heuristic_complexity(node, source),
        }
    }
}

/// Branch count over the subtree, plus one.
pub fn heuristic_complexity(node: Node<'_>, source: &[u8]) -> u32 {
    let mut branches = 0u32;
    let mut stack = vec![node];
    while let Some(current) = stack.pop() {
        if let NodeKind::Branch(_) = NodeKind::classify(current, source) {
            branches += 1;
        }
        let mut cursor = current.walk();
        for child in current.children(&mut cursor) {
            stack.push(child);
        }
    }
    branches + 1
}

const CONDITION_WORDS: &[&str] = &["if", "for", "while", "case", "catch"];
const CONDITION_OPERATORS: &[&str] = &["&&", "||"];
const NON_FUNCTION_WORDS: &[&str] = &[
    "if",
    "for",
    "while",
    "switch",
    "catch",
    "synchronized",
    "try",
    "return",
    "new",
    "else",
    "do",
    "super",
    "this",
    "throw",
    "assert",
];

#[derive(Debug, Clone, PartialEq, Eq)]
enum Tok {
    Word(String),
    Punct(&'static str),
    Literal,
}

#[derive(Debug, Clone)]
struct Lexeme {
    tok: Tok,
    line: usize,
    column: usize,
}

enum Frame {
    Block,
    Function(usize),
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LexicalAnalyzer;

impl ComplexityAnalyzer for LexicalAnalyzer {
    fn analyze(&self, source: &str) -> Result<ComplexityTable, AnalyzerError> {
        let lexemes = lex(source)?;
        let mut rows: Vec<FunctionComplexity> = Vec::new();
        let mut frames: Vec<Frame> = Vec::new();

        for (idx, lexeme) in lexemes.iter().enumerate() {
            match &lexeme.tok {
                Tok::Punct("{") => match function_header(&lexemes, idx) {
                    Some((name, name_at)) => {
                        rows.push(FunctionComplexity {
                            name,
                            name_at,
                            end_line: lexeme.line,
                            complexity: 1,
                        });
                        frames.push(Frame::Function(rows.len() - 1));
                    }
                    None => frames.push(Frame::Block),
                },
                Tok::Punct("}") => match frames.pop() {
                    Some(Frame::Function(row)) => rows[row].end_line = lexeme.line,
                    Some(Frame::Block) => {}
                    None => return Err(AnalyzerError::UnbalancedBraces { line: lexeme.line }),
                },
                tok if counts_as_condition(tok, &lexemes, idx) => {
                    if let Some(row) = innermost_function(&frames) {
                        rows[row].complexity += 1;
                    }
                }
                _ => {}
            }
        }

        if !frames.is_empty() {
            let line = lexemes.last().map(|l| l.line).unwrap_or(1);
            return Err(AnalyzerError::UnbalancedBraces { line });
        }
        Ok(ComplexityTable { rows })
    }
}

fn innermost_function(frames: &[Frame]) -> Option<usize> {
    frames.iter().rev().find_map(|frame| match frame {
        Frame::Function(row) => Some(*row),
        Frame::Block => None,
    })
}

fn counts_as_condition(tok: &Tok, lexemes: &[Lexeme], idx: usize) -> bool {
    match tok {
        Tok::Word(word) => CONDITION_WORDS.contains(&word.as_str()),
        Tok::Punct("?") => !is_wildcard(lexemes, idx),
        Tok::Punct(op) => CONDITION_OPERATORS.contains(op),
        Tok::Literal => false,
    }
}

// `List<? extends T>` and friends are generics, not ternaries.
fn is_wildcard(lexemes: &[Lexeme], idx: usize) -> bool {
    match lexemes.get(idx + 1).map(|l| &l.tok) {
        Some(Tok::Punct(">")) | Some(Tok::Punct(",")) => true,
        Some(Tok::Word(word)) => word == "extends" || word == "super",
        _ => false,
    }
}

/// `name ( ... ) [throws A, B] {` with `idx` at the opening brace.
fn function_header(lexemes: &[Lexeme], idx: usize) -> Option<(String, NamePosition)> {
    let mut j = idx.checked_sub(1)?;
    if lexemes[j].tok != Tok::Punct(")") {
        loop {
            match &lexemes[j].tok {
                Tok::Word(word) if word == "throws" => {
                    j = j.checked_sub(1)?;
                    break;
                }
                Tok::Word(_) | Tok::Punct(",") | Tok::Punct(".") | Tok::Punct("<")
                | Tok::Punct(">") => {
                    j = j.checked_sub(1)?;
                }
                _ => return None,
            }
        }
        if lexemes[j].tok != Tok::Punct(")") {
            return None;
        }
    }

    let mut depth = 0usize;
    let open = loop {
        match lexemes[j].tok {
            Tok::Punct(")") => depth += 1,
            Tok::Punct("(") => {
                depth -= 1;
                if depth == 0 {
                    break j;
                }
            }
            _ => {}
        }
        j = j.checked_sub(1)?;
    };

    let name_idx = open.checked_sub(1)?;
    let Tok::Word(name) = &lexemes[name_idx].tok else {
        return None;
    };
    if NON_FUNCTION_WORDS.contains(&name.as_str()) {
        return None;
    }
    if let Some(prev) = name_idx.checked_sub(1).map(|p| &lexemes[p].tok) {
        match prev {
            Tok::Word(word) if word == "new" || word == "record" => return None,
            Tok::Punct("@") | Tok::Punct(".") => return None,
            _ => {}
        }
    }
    let lexeme = &lexemes[name_idx];
    Some((
        name.clone(),
        NamePosition {
            line: lexeme.line,
            column: lexeme.column,
        },
    ))
}

struct LineTracker {
    line: usize,
    line_start: usize,
}

impl LineTracker {
    fn newline(&mut self, byte: usize) {
        self.line += 1;
        self.line_start = byte + 1;
    }
}

fn lex(source: &str) -> Result<Vec<Lexeme>, AnalyzerError> {
    let chars: Vec<char> = source.chars().collect();
    let offsets: Vec<usize> = source.char_indices().map(|(byte, _)| byte).collect();
    let mut out = Vec::new();
    let mut pos = LineTracker {
        line: 1,
        line_start: 0,
    };
    let mut i = 0usize;

    while i < chars.len() {
        let ch = chars[i];
        if ch == '\n' {
            pos.newline(offsets[i]);
            i += 1;
            continue;
        }
        if ch.is_whitespace() {
            i += 1;
            continue;
        }
        let line = pos.line;
        let column = offsets[i] - pos.line_start;
        if ch == '/' && chars.get(i + 1) == Some(&'/') {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
            continue;
        }
        if ch == '/' && chars.get(i + 1) == Some(&'*') {
            i += 2;
            loop {
                if i + 1 >= chars.len() {
                    return Err(AnalyzerError::Unterminated {
                        what: "comment",
                        line,
                    });
                }
                if chars[i] == '*' && chars[i + 1] == '/' {
                    i += 2;
                    break;
                }
                if chars[i] == '\n' {
                    pos.newline(offsets[i]);
                }
                i += 1;
            }
            continue;
        }
        if ch == '"' || ch == '\'' {
            let text_block = ch == '"' && chars.get(i + 1) == Some(&'"') && chars.get(i + 2) == Some(&'"');
            i = skip_literal(&chars, &offsets, i, text_block, &mut pos).ok_or(AnalyzerError::Unterminated {
                what: if ch == '"' { "string" } else { "char literal" },
                line,
            })?;
            out.push(Lexeme {
                tok: Tok::Literal,
                line,
                column,
            });
            continue;
        }
        if ch.is_alphanumeric() || ch == '_' || ch == '$' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '$')
            {
                i += 1;
            }
            out.push(Lexeme {
                tok: Tok::Word(chars[start..i].iter().collect()),
                line,
                column,
            });
            continue;
        }
        let two: String = chars[i..(i + 2).min(chars.len())].iter().collect();
        let punct = match two.as_str() {
            "&&" => Some("&&"),
            "||" => Some("||"),
            "->" => Some("->"),
            "::" => Some("::"),
            _ => None,
        };
        if let Some(op) = punct {
            out.push(Lexeme {
                tok: Tok::Punct(op),
                line,
                column,
            });
            i += 2;
            continue;
        }
        out.push(Lexeme {
            tok: Tok::Punct(single_punct(ch)),
            line,
            column,
        });
        i += 1;
    }
    Ok(out)
}

fn skip_literal(
    chars: &[char],
    offsets: &[usize],
    start: usize,
    text_block: bool,
    pos: &mut LineTracker,
) -> Option<usize> {
    let quote = chars[start];
    let mut i = if text_block { start + 3 } else { start + 1 };
    while i < chars.len() {
        let ch = chars[i];
        if ch == '\\' {
            i += 2;
            continue;
        }
        if ch == '\n' {
            if !text_block {
                return None;
            }
            pos.newline(offsets[i]);
        }
        if text_block {
            if ch == '"' && chars.get(i + 1) == Some(&'"') && chars.get(i + 2) == Some(&'"') {
                return Some(i + 3);
            }
        } else if ch == quote {
            return Some(i + 1);
        }
        i += 1;
    }
    None
}

fn single_punct(ch: char) -> &'static str {
    match ch {
        '{' => "{",
        '}' => "}",
        '(' => "(",
        ')' => ")",
        '<' => "<",
        '>' => ">",
        ',' => ",",
        '.' => ".",
        '?' => "?",
        '@' => "@",
        ';' => ";",
        _ => "op",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(line: usize, column: usize) -> NamePosition {
        NamePosition { line, column }
    }

    #[test]
    fn table_rows_for_methods_and_constructors() {
        let source = r#"
class Foo {
    Foo(int x) {
        if (x > 0 && x < 10) { }
    }

    int bar(int y) throws java.io.IOException {
        for (int i = 0; i < y; i++) {
            y = y > 2 ? 1 : 0;
        }
        return y;
    }
}
"#;
        let table = LexicalAnalyzer.analyze(source).unwrap();
        assert_eq!(table.rows().len(), 2);
        assert_eq!(table.lookup("Foo", at(3, 4)), Some(3));
        assert_eq!(table.lookup("bar", at(7, 8)), Some(3));
        assert_eq!(table.rows()[1].end_line, 12);
    }

    #[test]
    fn else_if_counts_once() {
        let source = "class A { int m(int x) { if (x > 0) { return 1; } else if (x < 0) { return 2; } else { return 3; } } }";
        let table = LexicalAnalyzer.analyze(source).unwrap();
        assert_eq!(table.lookup("m", at(1, 14)), Some(3));
    }

    #[test]
    fn ignores_keywords_in_strings_and_comments() {
        let source = "class A {\n  // if while for\n  void m() { String s = \"if && ||\"; char c = '?'; }\n}";
        let table = LexicalAnalyzer.analyze(source).unwrap();
        assert_eq!(table.lookup("m", at(3, 7)), Some(1));
    }

    #[test]
    fn generic_wildcards_are_not_ternaries() {
        let source = "class A { void m(java.util.List<? extends Number> xs, java.util.Map<?, ?> m) { } }";
        let table = LexicalAnalyzer.analyze(source).unwrap();
        assert_eq!(table.lookup("m", at(1, 15)), Some(1));
    }

    #[test]
    fn anonymous_class_methods_get_their_own_row() {
        let source = "class A {\n void m() {\n  Runnable r = new Runnable() {\n   public void run() { if (true) {} }\n  };\n }\n}";
        let table = LexicalAnalyzer.analyze(source).unwrap();
        assert_eq!(table.lookup("m", at(2, 6)), Some(1));
        assert_eq!(table.lookup("run", at(4, 15)), Some(2));
    }

    #[test]
    fn unbalanced_source_is_an_error() {
        let err = LexicalAnalyzer.analyze("class A { void m() { ").unwrap_err();
        assert!(matches!(err, AnalyzerError::UnbalancedBraces { .. }));
        let err = LexicalAnalyzer.analyze("class A { } }").unwrap_err();
        assert!(matches!(err, AnalyzerError::UnbalancedBraces { .. }));
    }

    #[test]
    fn unterminated_string_is_an_error() {
        let err = LexicalAnalyzer
            .analyze("class A { String s = \"oops; }")
            .unwrap_err();
        assert!(matches!(err, AnalyzerError::Unterminated { .. }));
    }

    #[test]
    fn missing_row_selects_heuristic() {
        let table = ComplexityTable::default();
        assert_eq!(
            ComplexityStrategy::select(Some(&table), "m", at(1, 0)),
            ComplexityStrategy::Heuristic
        );
        assert_eq!(
            ComplexityStrategy::select(None, "m", at(1, 0)),
            ComplexityStrategy::Heuristic
        );
    }

    #[test]
    fn overloads_on_one_line_get_separate_rows() {
        let source = "class A {\n int f(int a) { if (a > 0 && a < 9) return 1; return 0; } int f() { return 0; }\n}";
        let table = LexicalAnalyzer.analyze(source).unwrap();
        assert_eq!(table.rows().len(), 2);
        assert_eq!(table.lookup("f", at(2, 5)), Some(3));
        assert_eq!(table.lookup("f", at(2, 62)), Some(1));
        assert_eq!(table.lookup("f", at(2, 0)), None);
    }

    #[test]
    fn duplicate_rows_are_ambiguous() {
        let row = FunctionComplexity {
            name: "f".into(),
            name_at: at(1, 4),
            end_line: 1,
            complexity: 2,
        };
        let table = ComplexityTable {
            rows: vec![row.clone(), FunctionComplexity { complexity: 5, ..row }],
        };
        assert_eq!(table.lookup("f", at(1, 4)), None);
        assert_eq!(
            ComplexityStrategy::select(Some(&table), "f", at(1, 4)),
            ComplexityStrategy::Heuristic
        );
    }

    #[test]
    fn record_headers_are_not_functions() {
        let source = "record P(int x) {\n P {\n  if (x < 0) throw new IllegalArgumentException();\n }\n int twice() { return x * 2; }\n}";
        let table = LexicalAnalyzer.analyze(source).unwrap();
        let names: Vec<&str> = table.rows().iter().map(|row| row.name.as_str()).collect();
        assert_eq!(names, vec!["twice"]);
    }
}
