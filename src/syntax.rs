//! Closed classification of tree-sitter-java node kinds.
//!
//! The extractor and the metric engine only ever look at nodes through
//! [`NodeKind`], so every construct they care about is matched exhaustively in
//! one place instead of scattered string comparisons.

use tree_sitter::Node;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Branch {
    If,
    /// Terminal `else`; an `else if` is counted by its nested `if_statement`.
    Else,
    For,
    While,
    Do,
    Case,
    Catch,
    Ternary,
    LogicalAnd,
    LogicalOr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommentKind {
    Doc,
    Block,
    Line,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Program,
    Package,
    TypeDeclaration,
    AnonymousClassBody,
    MethodDeclaration,
    ConstructorDeclaration,
    Branch(Branch),
    Identifier,
    Literal,
    Comment(CommentKind),
    Modifiers,
    Annotation,
    Other,
}

impl NodeKind {
    pub fn classify(node: Node<'_>, source: &[u8]) -> NodeKind {
        match node.kind() {
            "program" => NodeKind::Program,
            "package_declaration" => NodeKind::Package,
            "class_declaration"
            | "interface_declaration"
            | "enum_declaration"
            | "record_declaration"
            | "annotation_type_declaration" => NodeKind::TypeDeclaration,
            "class_body" if is_anonymous_body(node) => NodeKind::AnonymousClassBody,
            "method_declaration" => NodeKind::MethodDeclaration,
            "constructor_declaration" | "compact_constructor_declaration" => {
                NodeKind::ConstructorDeclaration
            }
            "if_statement" => NodeKind::Branch(Branch::If),
            "else" if is_terminal_else(node) => NodeKind::Branch(Branch::Else),
            "for_statement" | "enhanced_for_statement" => NodeKind::Branch(Branch::For),
            "while_statement" => NodeKind::Branch(Branch::While),
            "do_statement" => NodeKind::Branch(Branch::Do),
            "case" if !node.is_named() => NodeKind::Branch(Branch::Case),
            "catch_clause" => NodeKind::Branch(Branch::Catch),
            "conditional_expression" => NodeKind::Branch(Branch::Ternary),
            "&&" => NodeKind::Branch(Branch::LogicalAnd),
            "||" => NodeKind::Branch(Branch::LogicalOr),
            "identifier" | "type_identifier" => NodeKind::Identifier,
            "decimal_integer_literal"
            | "hex_integer_literal"
            | "octal_integer_literal"
            | "binary_integer_literal"
            | "decimal_floating_point_literal"
            | "hex_floating_point_literal"
            | "string_literal"
            | "text_block"
            | "character_literal"
            | "true"
            | "false"
            | "null_literal" => NodeKind::Literal,
            "block_comment" => {
                let text = node.utf8_text(source).unwrap_or("");
                if is_doc_comment(text) {
                    NodeKind::Comment(CommentKind::Doc)
                } else {
                    NodeKind::Comment(CommentKind::Block)
                }
            }
            "line_comment" => NodeKind::Comment(CommentKind::Line),
            "modifiers" => NodeKind::Modifiers,
            "marker_annotation" | "annotation" => NodeKind::Annotation,
            _ => NodeKind::Other,
        }
    }

    pub fn is_method(self) -> bool {
        matches!(
            self,
            NodeKind::MethodDeclaration | NodeKind::ConstructorDeclaration
        )
    }

    /// Literals are emitted as one token even when the grammar splits them.
    pub fn is_atomic_token(self) -> bool {
        matches!(self, NodeKind::Literal)
    }
}

pub fn is_doc_comment(text: &str) -> bool {
    text.starts_with("/**") && text != "/**/"
}

/// Lexical tokens of a subtree in source order.
///
/// Leaves become tokens, literals are kept whole even when the grammar splits
/// them into fragments, comments are dropped and so are zero-width nodes the
/// parser inserted during error recovery.
pub fn code_tokens(node: Node<'_>, source: &[u8]) -> Vec<String> {
    let mut out = Vec::new();
    let mut stack = vec![node];
    while let Some(current) = stack.pop() {
        let kind = NodeKind::classify(current, source);
        if let NodeKind::Comment(_) = kind {
            continue;
        }
        if current.is_missing() || current.start_byte() == current.end_byte() {
            continue;
        }
        if kind.is_atomic_token() || current.child_count() == 0 {
            if let Ok(text) = current.utf8_text(source) {
                out.push(text.to_string());
            }
            continue;
        }
        let mut cursor = current.walk();
        let children: Vec<Node<'_>> = current.children(&mut cursor).collect();
        stack.extend(children.into_iter().rev());
    }
    out
}

fn is_anonymous_body(node: Node<'_>) -> bool {
    node.parent()
        .map(|parent| matches!(parent.kind(), "object_creation_expression" | "enum_constant"))
        .unwrap_or(false)
}

// Comments between `else` and `if` are siblings too, so ask the parent for its alternative.
fn is_terminal_else(node: Node<'_>) -> bool {
    node.parent()
        .filter(|parent| parent.kind() == "if_statement")
        .and_then(|parent| parent.child_by_field_name("alternative"))
        .map(|alternative| alternative.kind() != "if_statement")
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::JavaGrammar;

    fn kinds_of(source: &str) -> Vec<NodeKind> {
        let grammar = JavaGrammar::bundled().unwrap();
        let mut parser = grammar.parser().unwrap();
        let tree = parser.parse(source, None).unwrap();
        let mut out = Vec::new();
        let mut stack = vec![tree.root_node()];
        while let Some(node) = stack.pop() {
            out.push(NodeKind::classify(node, source.as_bytes()));
            let mut cursor = node.walk();
            for child in node.children(&mut cursor) {
                stack.push(child);
            }
        }
        out
    }

    #[test]
    fn classifies_else_if_chain() {
        let kinds = kinds_of(
            "class A { int m(int x) { if (x > 0) { return 1; } else if (x < 0) { return 2; } else { return 3; } } }",
        );
        let ifs = kinds
            .iter()
            .filter(|k| **k == NodeKind::Branch(Branch::If))
            .count();
        let elses = kinds
            .iter()
            .filter(|k| **k == NodeKind::Branch(Branch::Else))
            .count();
        assert_eq!(ifs, 2);
        assert_eq!(elses, 1);
    }

    #[test]
    fn comment_after_else_keeps_else_if_chain() {
        let kinds = kinds_of(
            "class A { int m(int x) { if (x > 0) { return 1; } else /* neg */ if (x < 0) { return 2; } else { return 3; } } }",
        );
        let elses = kinds
            .iter()
            .filter(|k| **k == NodeKind::Branch(Branch::Else))
            .count();
        assert_eq!(elses, 1);
    }

    #[test]
    fn classifies_doc_comments() {
        let kinds = kinds_of("class A { /** doc */ void a() {} /* plain */ void b() {} }");
        assert!(kinds.contains(&NodeKind::Comment(CommentKind::Doc)));
        assert!(kinds.contains(&NodeKind::Comment(CommentKind::Block)));
    }

    #[test]
    fn anonymous_class_body_is_recognised() {
        let kinds = kinds_of("class A { Runnable r = new Runnable() { public void run() {} }; }");
        assert!(kinds.contains(&NodeKind::AnonymousClassBody));
    }

    #[test]
    fn tokens_keep_literals_whole_and_drop_comments() {
        let source = "class A { void m() { /* note */ String s = \"a b\"; } }";
        let grammar = JavaGrammar::bundled().unwrap();
        let mut parser = grammar.parser().unwrap();
        let tree = parser.parse(source, None).unwrap();
        let tokens = code_tokens(tree.root_node(), source.as_bytes());
        assert!(tokens.contains(&"\"a b\"".to_string()));
        assert!(!tokens.iter().any(|t| t.contains("note")));
        assert_eq!(tokens.first().map(String::as_str), Some("class"));
        assert_eq!(tokens.last().map(String::as_str), Some("}"));
    }

    #[test]
    fn empty_block_comment_is_not_doc() {
        assert!(!is_doc_comment("/**/"));
        assert!(is_doc_comment("/** x */"));
    }
}
