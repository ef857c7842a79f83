use crate::error::{ExtractError, GrammarError};
use crate::grammar::JavaGrammar;
use crate::metrics::complexity::NamePosition;
use crate::syntax::{CommentKind, NodeKind};
use tree_sitter::{Node, Parser, Tree};

const ANONYMOUS_SEGMENT: &str = "<anonymous>";

/// A method or constructor located in a parsed file.
#[derive(Debug, Clone)]
pub struct MethodSite<'tree> {
    pub node: Node<'tree>,
    pub name: String,
    pub qualified_name: String,
    pub name_at: NamePosition,
    pub start_line: usize,
    pub end_line: usize,
    pub signature: String,
    pub doc_comment: Option<String>,
}

pub struct JavaExtractor {
    parser: Parser,
}

impl JavaExtractor {
    pub fn new(grammar: &JavaGrammar) -> Result<Self, GrammarError> {
        Ok(Self {
            parser: grammar.parser()?,
        })
    }

    /// Parse one file. Trees with error or missing nodes are rejected whole.
    pub fn parse(&mut self, rel_path: &str, source: &str) -> Result<Tree, ExtractError> {
        let tree = self
            .parser
            .parse(source, None)
            .ok_or_else(|| ExtractError::Parse(rel_path.to_string()))?;
        let root = tree.root_node();
        if root.has_error() {
            return Err(ExtractError::Syntax {
                path: rel_path.to_string(),
                line: first_error_line(root).unwrap_or(1),
            });
        }
        Ok(tree)
    }
}

/// Every method and constructor in `tree`, in source order.
pub fn method_sites<'tree>(tree: &'tree Tree, source: &[u8]) -> Vec<MethodSite<'tree>> {
    let root = tree.root_node();
    let package = package_name(root, source);
    let mut scopes: Vec<Vec<String>> = vec![package.into_iter().collect()];
    let mut sites = Vec::new();
    let mut stack: Vec<(Node<'tree>, usize)> = vec![(root, 0)];

    while let Some((node, scope)) = stack.pop() {
        let kind = NodeKind::classify(node, source);
        let child_scope = match kind {
            NodeKind::TypeDeclaration => {
                let name = field_text(node, "name", source).unwrap_or_else(|| ANONYMOUS_SEGMENT.to_string());
                push_scope(&mut scopes, scope, name)
            }
            NodeKind::AnonymousClassBody => push_scope(&mut scopes, scope, ANONYMOUS_SEGMENT.to_string()),
            NodeKind::MethodDeclaration | NodeKind::ConstructorDeclaration => {
                if let Some(site) = build_site(node, &scopes[scope], source) {
                    sites.push(site);
                }
                scope
            }
            _ => scope,
        };
        let mut cursor = node.walk();
        let children: Vec<Node<'tree>> = node.named_children(&mut cursor).collect();
        for child in children.into_iter().rev() {
            stack.push((child, child_scope));
        }
    }
    sites
}

fn push_scope(scopes: &mut Vec<Vec<String>>, parent: usize, name: String) -> usize {
    let mut path = scopes[parent].clone();
    path.push(name);
    scopes.push(path);
    scopes.len() - 1
}

fn build_site<'tree>(node: Node<'tree>, scope: &[String], source: &[u8]) -> Option<MethodSite<'tree>> {
    let name_node = node.child_by_field_name("name")?;
    let name = name_node.utf8_text(source).ok()?.to_string();
    let mut qualified = scope.to_vec();
    qualified.push(name.clone());
    Some(MethodSite {
        node,
        qualified_name: qualified.join("."),
        name,
        name_at: NamePosition::of(name_node),
        start_line: node.start_position().row + 1,
        end_line: node.end_position().row + 1,
        signature: signature(node, source),
        doc_comment: doc_comment(node, source),
    })
}

fn package_name(root: Node<'_>, source: &[u8]) -> Option<String> {
    let mut cursor = root.walk();
    let package = root
        .named_children(&mut cursor)
        .find(|child| NodeKind::classify(*child, source) == NodeKind::Package)?;
    let mut inner = package.walk();
    let name = package
        .named_children(&mut inner)
        .find(|child| matches!(child.kind(), "scoped_identifier" | "identifier"))?;
    name.utf8_text(source).ok().map(|text| text.to_string())
}

fn field_text(node: Node<'_>, field: &str, source: &[u8]) -> Option<String> {
    node.child_by_field_name(field)
        .and_then(|child| child.utf8_text(source).ok())
        .map(|text| text.to_string())
}

/// Javadoc directly above the declaration, with no blank line in between.
pub fn doc_comment(node: Node<'_>, source: &[u8]) -> Option<String> {
    let prev = node.prev_sibling()?;
    if NodeKind::classify(prev, source) != NodeKind::Comment(CommentKind::Doc) {
        return None;
    }
    let gap = source.get(prev.end_byte()..node.start_byte())?;
    if gap.iter().filter(|b| **b == b'\n').count() > 1 {
        return None;
    }
    prev.utf8_text(source).ok().map(|text| text.to_string())
}

/// Declaration text without annotations or body, whitespace collapsed.
pub fn signature(node: Node<'_>, source: &[u8]) -> String {
    let start = node.start_byte();
    let end = node
        .child_by_field_name("body")
        .map(|body| body.start_byte())
        .unwrap_or_else(|| node.end_byte());

    let mut skipped: Vec<(usize, usize)> = Vec::new();
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if NodeKind::classify(child, source) != NodeKind::Modifiers {
            continue;
        }
        let mut inner = child.walk();
        for modifier in child.named_children(&mut inner) {
            match NodeKind::classify(modifier, source) {
                NodeKind::Annotation | NodeKind::Comment(_) => {
                    skipped.push((modifier.start_byte(), modifier.end_byte()))
                }
                _ => {}
            }
        }
    }

    let mut text = Vec::with_capacity(end.saturating_sub(start));
    let mut pos = start;
    for (from, to) in skipped {
        if from > pos {
            text.extend_from_slice(&source[pos..from.min(end)]);
        }
        pos = pos.max(to);
    }
    if pos < end {
        text.extend_from_slice(&source[pos..end]);
    }
    let raw = String::from_utf8_lossy(&text);
    crate::util::collapse_whitespace(raw.trim_end_matches(|c: char| c == ';' || c.is_whitespace()))
}

fn first_error_line(root: Node<'_>) -> Option<usize> {
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if node.is_error() || node.is_missing() {
            return Some(node.start_position().row + 1);
        }
        if !node.has_error() {
            continue;
        }
        let mut cursor = node.walk();
        let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
        stack.extend(children.into_iter().rev());
    }
    None
}
