//! Strict reader for the lexicon XML dialect.
//!
//! Parses the subset of XML the merge operates on: elements, attributes,
//! character data, and comments. A leading XML declaration is tolerated and
//! skipped. Everything else (doctypes, processing instructions in content,
//! CDATA sections) is rejected with a position, so the offending file can be
//! fixed at the source.
//!
//! Two normalizations happen on the way in:
//!
//! - text runs consisting only of XML whitespace are treated as formatting
//!   and dropped; the writer re-indents on the way out;
//! - `\r\n` and lone `\r` become `\n` in text and attribute values.

use thiserror::Error;

use crate::model::tree::{NodeId, Tree};
use crate::model::types::is_name_char;

/// Nesting limit. Deeper documents are rejected rather than risking the
/// parser's stack.
const MAX_DEPTH: usize = 256;

// ---------------------------------------------------------------------------
// ParseError
// ---------------------------------------------------------------------------

/// A syntax or structure error, with a 1-based position into the input.
#[derive(Debug, Error)]
pub enum ParseError {
    /// Input ended in the middle of a construct.
    #[error("line {line}, column {column}: unexpected end of input in {context}")]
    UnexpectedEof {
        line: usize,
        column: usize,
        context: &'static str,
    },
    /// The byte at the position does not start the expected construct.
    #[error("line {line}, column {column}: expected {expected}")]
    Expected {
        line: usize,
        column: usize,
        expected: &'static str,
    },
    /// A closing tag does not match the innermost open element.
    #[error(
        "line {line}, column {column}: mismatched closing tag </{found}>, expected </{expected}>"
    )]
    MismatchedClosingTag {
        line: usize,
        column: usize,
        expected: String,
        found: String,
    },
    /// The same attribute name appears twice in one start tag.
    #[error("line {line}, column {column}: duplicate attribute {name:?}")]
    DuplicateAttribute {
        line: usize,
        column: usize,
        name: String,
    },
    /// An `&...;` reference that is not a known entity or a valid character
    /// reference.
    #[error("line {line}, column {column}: unknown or malformed entity reference")]
    BadEntity { line: usize, column: usize },
    /// Markup found after the root element was closed.
    #[error("line {line}, column {column}: markup after the document root")]
    TrailingContent { line: usize, column: usize },
    /// A construct outside the supported dialect (doctype, CDATA, ...).
    #[error("line {line}, column {column}: unsupported markup starting at {found:?}")]
    UnsupportedMarkup {
        line: usize,
        column: usize,
        found: String,
    },
    /// The input holds no element at all.
    #[error("document contains no root element")]
    MissingRoot,
    /// Elements nested beyond [`MAX_DEPTH`].
    #[error("line {line}, column {column}: elements nested deeper than {}", MAX_DEPTH)]
    TooDeep { line: usize, column: usize },
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Parse a full document into a [`Tree`].
///
/// # Errors
/// Returns a [`ParseError`] with a position on any input outside the
/// dialect.
pub fn parse_document(input: &str) -> Result<Tree, ParseError> {
    let mut reader = Reader::new(input);
    reader.skip_prolog()?;
    if reader.eof() {
        return Err(ParseError::MissingRoot);
    }
    if reader.peek() != Some(b'<') {
        return Err(reader.err_expected("the root element"));
    }
    if reader.starts_with("<!") {
        let (line, column) = reader.position();
        let found: String = reader.input[reader.pos..].chars().take(9).collect();
        return Err(ParseError::UnsupportedMarkup {
            line,
            column,
            found,
        });
    }
    let open = reader.read_open_tag()?;
    let mut tree = Tree::new(open.name);
    for (name, value) in &open.attributes {
        tree.set_attribute(tree.root(), name, value);
    }
    if !open.self_closing {
        let root = tree.root();
        reader.read_children(&mut tree, root, open.name, 1)?;
    }
    reader.skip_epilog()?;
    Ok(tree)
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

/// A parsed start tag. The name borrows the input; attribute values are
/// decoded into owned strings.
struct OpenTag<'a> {
    name: &'a str,
    attributes: Vec<(&'a str, String)>,
    self_closing: bool,
}

struct Reader<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Reader<'a> {
    const fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn peek(&self) -> Option<u8> {
        self.input.as_bytes().get(self.pos).copied()
    }

    fn starts_with(&self, s: &str) -> bool {
        self.input[self.pos..].starts_with(s)
    }

    fn eof(&self) -> bool {
        self.pos >= self.input.len()
    }

    /// 1-based (line, column) of the current position. Columns count
    /// characters, not bytes. Only computed on the error path.
    fn position(&self) -> (usize, usize) {
        let upto = &self.input[..self.pos];
        let line = upto.matches('\n').count() + 1;
        let column = upto
            .rfind('\n')
            .map_or_else(|| upto.chars().count(), |i| upto[i + 1..].chars().count())
            + 1;
        (line, column)
    }

    fn err_eof(&self, context: &'static str) -> ParseError {
        let (line, column) = self.position();
        ParseError::UnexpectedEof {
            line,
            column,
            context,
        }
    }

    fn err_expected(&self, expected: &'static str) -> ParseError {
        let (line, column) = self.position();
        ParseError::Expected {
            line,
            column,
            expected,
        }
    }

    // -----------------------------------------------------------------------
    // Prolog and epilog
    // -----------------------------------------------------------------------

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\r' | b'\n')) {
            self.pos += 1;
        }
    }

    /// Skip a BOM, the XML declaration, and any comments before the root.
    /// Comments outside the root element carry no merge-relevant content and
    /// are dropped.
    fn skip_prolog(&mut self) -> Result<(), ParseError> {
        if self.starts_with("\u{feff}") {
            self.pos += '\u{feff}'.len_utf8();
        }
        loop {
            self.skip_whitespace();
            if self.starts_with("<?") {
                match self.input[self.pos..].find("?>") {
                    Some(i) => self.pos += i + 2,
                    None => return Err(self.err_eof("the XML declaration")),
                }
            } else if self.starts_with("<!--") {
                self.read_comment()?;
            } else {
                return Ok(());
            }
        }
    }

    fn skip_epilog(&mut self) -> Result<(), ParseError> {
        loop {
            self.skip_whitespace();
            if self.eof() {
                return Ok(());
            }
            if self.starts_with("<!--") {
                self.read_comment()?;
                continue;
            }
            let (line, column) = self.position();
            return Err(ParseError::TrailingContent { line, column });
        }
    }

    // -----------------------------------------------------------------------
    // Names, tags, attributes
    // -----------------------------------------------------------------------

    /// Read an XML name. The accepted alphabet matches
    /// [`crate::model::types::TagName`] so every parsed tag is addressable
    /// in the strategy registry.
    fn read_name(&mut self) -> Result<&'a str, ParseError> {
        let start = self.pos;
        match self.peek() {
            Some(b) if b.is_ascii_alphabetic() || b == b'_' => self.pos += 1,
            _ => return Err(self.err_expected("a name")),
        }
        while let Some(b) = self.peek() {
            if b.is_ascii() && is_name_char(char::from(b)) {
                self.pos += 1;
            } else {
                break;
            }
        }
        Ok(&self.input[start..self.pos])
    }

    /// Read `<name attr="value" ...>` or `<name .../>`. Assumes the reader
    /// is positioned at `<`.
    fn read_open_tag(&mut self) -> Result<OpenTag<'a>, ParseError> {
        self.pos += 1;
        let name = self.read_name()?;
        let mut attributes: Vec<(&'a str, String)> = Vec::new();
        loop {
            let before = self.pos;
            self.skip_whitespace();
            let had_whitespace = self.pos != before;
            match self.peek() {
                Some(b'>') => {
                    self.pos += 1;
                    return Ok(OpenTag {
                        name,
                        attributes,
                        self_closing: false,
                    });
                }
                Some(b'/') => {
                    self.pos += 1;
                    if self.peek() == Some(b'>') {
                        self.pos += 1;
                        return Ok(OpenTag {
                            name,
                            attributes,
                            self_closing: true,
                        });
                    }
                    return Err(self.err_expected("'>' after '/'"));
                }
                Some(_) if had_whitespace => {
                    let attr_name = self.read_name()?;
                    if attributes.iter().any(|(n, _)| *n == attr_name) {
                        let (line, column) = self.position();
                        return Err(ParseError::DuplicateAttribute {
                            line,
                            column,
                            name: attr_name.to_owned(),
                        });
                    }
                    self.skip_whitespace();
                    if self.peek() != Some(b'=') {
                        return Err(self.err_expected("'=' after an attribute name"));
                    }
                    self.pos += 1;
                    self.skip_whitespace();
                    let value = self.read_attribute_value()?;
                    attributes.push((attr_name, value));
                }
                Some(_) => return Err(self.err_expected("whitespace before an attribute")),
                None => return Err(self.err_eof("a start tag")),
            }
        }
    }

    fn read_attribute_value(&mut self) -> Result<String, ParseError> {
        let quote = match self.peek() {
            Some(q @ (b'"' | b'\'')) => q,
            _ => return Err(self.err_expected("a quoted attribute value")),
        };
        self.pos += 1;
        let mut value = String::new();
        loop {
            match self.peek() {
                None => return Err(self.err_eof("an attribute value")),
                Some(q) if q == quote => {
                    self.pos += 1;
                    return Ok(value);
                }
                Some(b'&') => value.push(self.read_entity()?),
                Some(b'<') => return Err(self.err_expected("'&lt;' instead of a raw '<'")),
                Some(b'\r') => {
                    self.pos += 1;
                    if self.peek() == Some(b'\n') {
                        self.pos += 1;
                    }
                    value.push('\n');
                }
                Some(_) => {
                    let start = self.pos;
                    while let Some(b) = self.peek() {
                        if b == quote || matches!(b, b'&' | b'<' | b'\r') {
                            break;
                        }
                        self.pos += 1;
                    }
                    value.push_str(&self.input[start..self.pos]);
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Content
    // -----------------------------------------------------------------------

    /// Read element content into `parent` until the matching closing tag.
    fn read_children(
        &mut self,
        tree: &mut Tree,
        parent: NodeId,
        parent_tag: &str,
        depth: usize,
    ) -> Result<(), ParseError> {
        if depth > MAX_DEPTH {
            let (line, column) = self.position();
            return Err(ParseError::TooDeep { line, column });
        }
        loop {
            let text = self.read_text()?;
            if !is_formatting_whitespace(&text) {
                let node = tree.new_text(&text);
                tree.append_child(parent, node);
            }
            if self.eof() {
                return Err(self.err_eof("element content"));
            }
            if self.starts_with("</") {
                self.pos += 2;
                let close_pos = self.pos;
                let close = self.read_name()?;
                if close != parent_tag {
                    self.pos = close_pos;
                    let (line, column) = self.position();
                    return Err(ParseError::MismatchedClosingTag {
                        line,
                        column,
                        expected: parent_tag.to_owned(),
                        found: close.to_owned(),
                    });
                }
                self.skip_whitespace();
                if self.peek() != Some(b'>') {
                    return Err(self.err_expected("'>' in a closing tag"));
                }
                self.pos += 1;
                return Ok(());
            }
            if self.starts_with("<!--") {
                let content = self.read_comment()?;
                let node = tree.new_comment(content);
                tree.append_child(parent, node);
                continue;
            }
            if self.starts_with("<!") || self.starts_with("<?") {
                let (line, column) = self.position();
                let found: String = self.input[self.pos..].chars().take(9).collect();
                return Err(ParseError::UnsupportedMarkup {
                    line,
                    column,
                    found,
                });
            }
            let open = self.read_open_tag()?;
            let node = tree.new_element(open.name);
            for (name, value) in &open.attributes {
                tree.set_attribute(node, name, value);
            }
            tree.append_child(parent, node);
            if !open.self_closing {
                self.read_children(tree, node, open.name, depth + 1)?;
            }
        }
    }

    /// Decode character data up to the next `<` or end of input.
    fn read_text(&mut self) -> Result<String, ParseError> {
        let mut text = String::new();
        while let Some(b) = self.peek() {
            match b {
                b'<' => break,
                b'&' => text.push(self.read_entity()?),
                b'\r' => {
                    self.pos += 1;
                    if self.peek() == Some(b'\n') {
                        self.pos += 1;
                    }
                    text.push('\n');
                }
                _ => {
                    let start = self.pos;
                    while let Some(b) = self.peek() {
                        if matches!(b, b'<' | b'&' | b'\r') {
                            break;
                        }
                        self.pos += 1;
                    }
                    text.push_str(&self.input[start..self.pos]);
                }
            }
        }
        Ok(text)
    }

    /// Read `<!--` ... `-->`, returning the raw interior. Assumes the reader
    /// is positioned at `<!--`.
    fn read_comment(&mut self) -> Result<&'a str, ParseError> {
        self.pos += 4;
        let start = self.pos;
        match self.input[self.pos..].find("-->") {
            Some(i) => {
                self.pos += i + 3;
                Ok(&self.input[start..start + i])
            }
            None => Err(self.err_eof("a comment")),
        }
    }

    fn read_entity(&mut self) -> Result<char, ParseError> {
        match decode_entity(&self.input[self.pos..]) {
            Some((ch, len)) => {
                self.pos += len;
                Ok(ch)
            }
            None => {
                let (line, column) = self.position();
                Err(ParseError::BadEntity { line, column })
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Decode one entity or character reference at the head of `s` (which starts
/// with `&`). Returns the character and the consumed byte length.
fn decode_entity(s: &str) -> Option<(char, usize)> {
    let rest = s.strip_prefix('&')?;
    // The longest supported reference body is 8 bytes ("#x10FFFF").
    let end = rest.bytes().take(12).position(|b| b == b';')?;
    if end == 0 {
        return None;
    }
    let name = &rest[..end];
    let ch = match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        _ => {
            let code = if let Some(hex) = name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
                u32::from_str_radix(hex, 16).ok()?
            } else if let Some(dec) = name.strip_prefix('#') {
                dec.parse::<u32>().ok()?
            } else {
                return None;
            };
            char::from_u32(code)?
        }
    };
    Some((ch, end + 2))
}

/// XML whitespace only (space, tab, CR, LF). Empty runs count.
fn is_formatting_whitespace(text: &str) -> bool {
    text.bytes().all(|b| matches!(b, b' ' | b'\t' | b'\r' | b'\n'))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
#[allow(clippy::all, clippy::pedantic, clippy::nursery)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_document() {
        let tree = parse_document("<lexicon/>").unwrap();
        assert_eq!(tree.tag(tree.root()), Some("lexicon"));
        assert!(tree.children(tree.root()).is_empty());
    }

    #[test]
    fn parses_declaration_and_root_attributes() {
        let tree = parse_document(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<lexicon version=\"0.13\"/>",
        )
        .unwrap();
        assert_eq!(tree.attribute(tree.root(), "version"), Some("0.13"));
    }

    #[test]
    fn parses_nested_elements_in_order() {
        let tree = parse_document(
            "<lexicon>\n  <entry id=\"e1\"><form lang=\"en\"><text>apple</text></form></entry>\n  <entry id=\"e2\"/>\n</lexicon>",
        )
        .unwrap();
        let entries: Vec<NodeId> = tree.element_children(tree.root()).collect();
        assert_eq!(entries.len(), 2);
        assert_eq!(tree.attribute(entries[0], "id"), Some("e1"));
        assert_eq!(tree.attribute(entries[1], "id"), Some("e2"));

        let form = tree.children(entries[0])[0];
        assert_eq!(tree.tag(form), Some("form"));
        let text_el = tree.children(form)[0];
        let text = tree.first_text_child(text_el).unwrap();
        assert_eq!(tree.text(text), Some("apple"));
    }

    #[test]
    fn drops_formatting_whitespace_only() {
        let tree = parse_document("<a>\n  <b/>\n</a>").unwrap();
        assert_eq!(tree.children(tree.root()).len(), 1);
    }

    #[test]
    fn keeps_significant_text_with_spaces() {
        let tree = parse_document("<text> a b </text>").unwrap();
        let t = tree.first_text_child(tree.root()).unwrap();
        assert_eq!(tree.text(t), Some(" a b "));
    }

    #[test]
    fn attribute_order_preserved() {
        let tree = parse_document("<entry id=\"e1\" date-created=\"x\" date-modified=\"y\"/>")
            .unwrap();
        let names: Vec<&str> = tree
            .attributes(tree.root())
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();
        assert_eq!(names, ["id", "date-created", "date-modified"]);
    }

    #[test]
    fn single_quoted_attributes() {
        let tree = parse_document("<entry id='e1'/>").unwrap();
        assert_eq!(tree.attribute(tree.root(), "id"), Some("e1"));
    }

    #[test]
    fn decodes_entities_in_text_and_attributes() {
        let tree =
            parse_document("<note title=\"a &amp; b &#x2192; c\">x &lt; y &gt; z &apos;q&apos;</note>")
                .unwrap();
        assert_eq!(
            tree.attribute(tree.root(), "title"),
            Some("a & b \u{2192} c")
        );
        let t = tree.first_text_child(tree.root()).unwrap();
        assert_eq!(tree.text(t), Some("x < y > z 'q'"));
    }

    #[test]
    fn normalizes_crlf_in_text() {
        let tree = parse_document("<note>line one\r\nline two\rline three</note>").unwrap();
        let t = tree.first_text_child(tree.root()).unwrap();
        assert_eq!(tree.text(t), Some("line one\nline two\nline three"));
    }

    #[test]
    fn keeps_comments_in_content() {
        let tree = parse_document("<entry><!-- checked by MR --><sense/></entry>").unwrap();
        let kids = tree.children(tree.root());
        assert_eq!(kids.len(), 2);
        assert_eq!(tree.comment(kids[0]), Some(" checked by MR "));
        assert!(tree.is_element(kids[1]));
    }

    #[test]
    fn drops_comments_outside_root() {
        let tree = parse_document("<!-- header --><a/><!-- footer -->").unwrap();
        assert!(tree.children(tree.root()).is_empty());
    }

    #[test]
    fn unicode_text_passes_through() {
        let tree = parse_document("<form lang=\"sw\"><text>chakula čokoláda 食べ物</text></form>")
            .unwrap();
        let text_el = tree.children(tree.root())[0];
        let t = tree.first_text_child(text_el).unwrap();
        assert_eq!(tree.text(t), Some("chakula čokoláda 食べ物"));
    }

    // -- errors --

    #[test]
    fn rejects_mismatched_closing_tag() {
        let err = parse_document("<a><b></a></a>").unwrap_err();
        match err {
            ParseError::MismatchedClosingTag {
                expected, found, ..
            } => {
                assert_eq!(expected, "b");
                assert_eq!(found, "a");
            }
            other => panic!("wrong error: {other}"),
        }
    }

    #[test]
    fn rejects_duplicate_attribute() {
        let err = parse_document("<a id=\"1\" id=\"2\"/>").unwrap_err();
        assert!(matches!(err, ParseError::DuplicateAttribute { ref name, .. } if name == "id"));
    }

    #[test]
    fn rejects_unknown_entity() {
        let err = parse_document("<a>&nbsp;</a>").unwrap_err();
        assert!(matches!(err, ParseError::BadEntity { .. }));
    }

    #[test]
    fn rejects_unterminated_element() {
        let err = parse_document("<a><b>").unwrap_err();
        assert!(matches!(err, ParseError::UnexpectedEof { .. }));
    }

    #[test]
    fn rejects_trailing_markup() {
        let err = parse_document("<a/><b/>").unwrap_err();
        assert!(matches!(err, ParseError::TrailingContent { .. }));
    }

    #[test]
    fn rejects_cdata_section() {
        let err = parse_document("<a><![CDATA[x]]></a>").unwrap_err();
        assert!(matches!(err, ParseError::UnsupportedMarkup { .. }));
    }

    #[test]
    fn rejects_doctype() {
        let err = parse_document("<!DOCTYPE lexicon><a/>").unwrap_err();
        assert!(matches!(err, ParseError::UnsupportedMarkup { .. }));
    }

    #[test]
    fn rejects_empty_input() {
        assert!(matches!(parse_document(""), Err(ParseError::MissingRoot)));
        assert!(matches!(
            parse_document("   \n  "),
            Err(ParseError::MissingRoot)
        ));
    }

    #[test]
    fn rejects_raw_angle_in_attribute() {
        let err = parse_document("<a x=\"1<2\"/>").unwrap_err();
        assert!(matches!(err, ParseError::Expected { .. }));
    }

    #[test]
    fn error_position_is_one_based() {
        let err = parse_document("<a>\n  <b></c></b>\n</a>").unwrap_err();
        match err {
            ParseError::MismatchedClosingTag { line, column, .. } => {
                assert_eq!(line, 2);
                // "  <b></" is 7 chars; the name starts at column 8.
                assert_eq!(column, 8);
            }
            other => panic!("wrong error: {other}"),
        }
    }

    #[test]
    fn rejects_runaway_nesting() {
        let mut doc = String::new();
        for _ in 0..300 {
            doc.push_str("<a>");
        }
        for _ in 0..300 {
            doc.push_str("</a>");
        }
        let err = parse_document(&doc).unwrap_err();
        assert!(matches!(err, ParseError::TooDeep { .. }));
    }

    // -- decode_entity --

    #[test]
    fn decode_entity_named_and_numeric() {
        assert_eq!(decode_entity("&amp;x"), Some(('&', 5)));
        assert_eq!(decode_entity("&#65;"), Some(('A', 5)));
        assert_eq!(decode_entity("&#x41;"), Some(('A', 6)));
        assert_eq!(decode_entity("&bogus;"), None);
        assert_eq!(decode_entity("&;"), None);
        assert_eq!(decode_entity("&#x110000;"), None);
        assert_eq!(decode_entity("&unterminated"), None);
    }
}
