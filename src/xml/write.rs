//! Writer for the lexicon XML dialect.
//!
//! Output is deterministic: attributes in stored order, two-space
//! indentation, `\n` line endings. Elements with any text child are written
//! inline so no whitespace is injected into character data; element-only
//! content gets one child per line.
//!
//! [`write_node`] is also the canonical form behind record fingerprints, so
//! any change here invalidates stored fingerprints.

use crate::model::tree::{NodeId, Tree};

const INDENT: &str = "  ";

/// Serialize a whole document, declaration included.
#[must_use]
pub fn write_document(tree: &Tree) -> String {
    let mut out = String::with_capacity(1024);
    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    write_into(&mut out, tree, tree.root(), 0);
    out.push('\n');
    out
}

/// Serialize one subtree without a declaration.
#[must_use]
pub fn write_node(tree: &Tree, node: NodeId) -> String {
    let mut out = String::new();
    write_into(&mut out, tree, node, 0);
    out
}

fn write_into(out: &mut String, tree: &Tree, node: NodeId, depth: usize) {
    if let Some(text) = tree.text(node) {
        push_escaped_text(out, text);
        return;
    }
    if let Some(comment) = tree.comment(node) {
        out.push_str("<!--");
        out.push_str(comment);
        out.push_str("-->");
        return;
    }

    let tag = tree.tag(node).unwrap_or_default();
    out.push('<');
    out.push_str(tag);
    if let Some(attrs) = tree.attributes(node) {
        for (name, value) in attrs {
            out.push(' ');
            out.push_str(name);
            out.push_str("=\"");
            push_escaped_attribute(out, value);
            out.push('"');
        }
    }

    let children = tree.children(node);
    if children.is_empty() {
        out.push_str("/>");
        return;
    }
    out.push('>');

    let inline = children.iter().any(|&c| tree.is_text(c));
    if inline {
        for &child in children {
            write_into(out, tree, child, depth + 1);
        }
    } else {
        for &child in children {
            out.push('\n');
            push_indent(out, depth + 1);
            write_into(out, tree, child, depth + 1);
        }
        out.push('\n');
        push_indent(out, depth);
    }
    out.push_str("</");
    out.push_str(tag);
    out.push('>');
}

fn push_indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push_str(INDENT);
    }
}

fn push_escaped_text(out: &mut String, text: &str) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
}

fn push_escaped_attribute(out: &mut String, value: &str) {
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            // Raw newlines in attribute values do not survive reparsing.
            '\n' => out.push_str("&#10;"),
            _ => out.push(ch),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
