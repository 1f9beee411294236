//! Streaming namespace-aware XML parser.
//!
//! Single pass over a borrowed byte slice. Events carry spans into the
//! input wherever possible; values that had to be entity-decoded arrive as
//! `Cow::Owned` and must be copied by the handler if they outlive the
//! event. Element events report the byte offsets of their tags so callers
//! can later rewrite the stream around them.

use crate::core::entities::decode_text;
use crate::core::scanner::Scanner;
use crate::error::{Error, Result};
use crate::ns::{NsContext, NsId, NsRepository};
use std::borrow::Cow;

/// An element reported by [`SaxParser`].
///
/// `begin_pos` is the offset of the tag's `<`; `end_pos` is one past its
/// `>`. A self-closing tag emits both a start and an end event carrying
/// the same positions.
#[derive(Debug, Clone, Copy)]
pub struct SaxElement<'a> {
    /// Resolved namespace of the element.
    pub ns: NsId,
    /// Namespace alias (prefix) as written in the stream; empty if none.
    pub alias: &'a [u8],
    /// Local element name.
    pub name: &'a [u8],
    pub begin_pos: usize,
    pub end_pos: usize,
}

/// An attribute reported before its element's start event.
#[derive(Debug, Clone)]
pub struct SaxAttribute<'a> {
    /// Resolved namespace; unprefixed attributes are in no namespace.
    pub ns: NsId,
    /// Namespace alias (prefix) as written; empty if none.
    pub alias: &'a [u8],
    /// Local attribute name.
    pub name: &'a [u8],
    /// Decoded value, quotes stripped. Owned iff decoding materialized a
    /// buffer (the transient case).
    pub value: Cow<'a, [u8]>,
    /// Byte range of the raw value between the quotes.
    pub value_span: (usize, usize),
}

/// Receiver of parse events, in document order.
///
/// Attribute events for an element fire before its `start_element`, which
/// in turn precedes any child or character event.
pub trait SaxHandler<'a> {
    fn doctype(&mut self, _content: &'a [u8]) {}
    fn start_declaration(&mut self, _name: &'a [u8]) {}
    fn end_declaration(&mut self, _name: &'a [u8]) {}
    fn start_element(&mut self, _elem: &SaxElement<'a>) {}
    fn end_element(&mut self, _elem: &SaxElement<'a>) {}
    fn attribute(&mut self, _attr: &SaxAttribute<'a>) {}
    fn characters(&mut self, _value: Cow<'a, [u8]>) {}
}

struct Scope<'a> {
    alias: &'a [u8],
    name: &'a [u8],
    /// Length of the declaration stack when this element opened.
    decl_mark: usize,
}

/// Streaming SAX parser over a byte slice.
pub struct SaxParser<'a, 'h, H: SaxHandler<'a>> {
    scanner: Scanner<'a>,
    handler: &'h mut H,
    repo: &'h mut NsRepository,
    cxt: NsContext,
    scopes: Vec<Scope<'a>>,
    /// Prefixes declared by currently open elements, innermost last.
    decls: Vec<&'a [u8]>,
    /// Attributes of the tag being parsed, emitted once bindings settle.
    pending_attrs: Vec<SaxAttribute<'a>>,
}

impl<'a, 'h, H: SaxHandler<'a>> SaxParser<'a, 'h, H> {
    pub fn new(input: &'a [u8], repo: &'h mut NsRepository, handler: &'h mut H) -> Self {
        SaxParser {
            scanner: Scanner::new(input),
            handler,
            repo,
            cxt: NsContext::new(),
            scopes: Vec::new(),
            decls: Vec::new(),
            pending_attrs: Vec::new(),
        }
    }

    /// Drive the parse to completion.
    pub fn parse(mut self) -> Result<()> {
        self.skip_bom()?;

        loop {
            if self.scopes.is_empty() {
                self.scanner.skip_whitespace();
            }
            match self.scanner.peek() {
                None => break,
                Some(b'<') => self.markup()?,
                Some(_) if !self.scopes.is_empty() => self.characters()?,
                Some(_) => {
                    return Err(Error::malformed_xml(
                        "content is not allowed outside the root element",
                        self.scanner.position(),
                    ))
                }
            }
        }

        if !self.scopes.is_empty() {
            return Err(Error::malformed_xml(
                "unexpected end of stream with open elements",
                self.scanner.position(),
            ));
        }
        Ok(())
    }

    fn skip_bom(&mut self) -> Result<()> {
        if self.scanner.starts_with(&[0xEF, 0xBB, 0xBF]) {
            self.scanner.advance(3);
        } else if let Some(b) = self.scanner.peek() {
            if b >= 0x80 {
                return Err(Error::malformed_xml(
                    "unsupported encoding; only 8-bit encodings are supported",
                    0,
                ));
            }
        }
        Ok(())
    }

    /// Text content up to the next '<'.
    fn characters(&mut self) -> Result<()> {
        let start = self.scanner.position();
        let end = self.scanner.find_byte(b'<').ok_or_else(|| {
            Error::malformed_xml("unexpected end of stream in text content", start)
        })?;
        let raw = self.scanner.slice(start, end);
        self.scanner.set_position(end);
        if !raw.is_empty() {
            let value = decode_text(raw, start)?;
            self.handler.characters(value);
        }
        Ok(())
    }

    /// Markup beginning at '<'.
    fn markup(&mut self) -> Result<()> {
        let begin = self.scanner.position();
        self.scanner.advance(1);

        match self.scanner.peek() {
            Some(b'/') => self.close_tag(begin),
            Some(b'!') => self.bang(begin),
            Some(b'?') => self.instruction(),
            Some(_) => self.open_tag(begin),
            None => Err(Error::malformed_xml(
                "unexpected end of stream after '<'",
                begin,
            )),
        }
    }

    fn open_tag(&mut self, begin: usize) -> Result<()> {
        let (alias, name) = self.qname()?;
        let decl_mark = self.decls.len();
        self.pending_attrs.clear();

        let mut self_close = false;
        loop {
            self.scanner.skip_whitespace();
            match self.scanner.peek() {
                None => {
                    return Err(Error::malformed_xml(
                        "unexpected end of stream inside a tag",
                        self.scanner.position(),
                    ))
                }
                Some(b'>') => {
                    self.scanner.advance(1);
                    break;
                }
                Some(b'/') => {
                    if self.scanner.peek_at(1) == Some(b'>') {
                        self.scanner.advance(2);
                        self_close = true;
                        break;
                    }
                    return Err(Error::malformed_xml(
                        "stray '/' inside a tag",
                        self.scanner.position(),
                    ));
                }
                Some(_) => self.attribute()?,
            }
        }

        let end = self.scanner.position();
        let elem = SaxElement {
            ns: self.cxt.resolve(alias),
            alias,
            name,
            begin_pos: begin,
            end_pos: end,
        };

        // All xmlns declarations of this tag are bound; resolve and flush
        // the buffered attributes in document order.
        let mut pending = std::mem::take(&mut self.pending_attrs);
        for attr in pending.iter_mut() {
            attr.ns = if attr.alias.is_empty() {
                NsId::NONE
            } else {
                self.cxt.resolve(attr.alias)
            };
            self.handler.attribute(attr);
        }
        pending.clear();
        self.pending_attrs = pending;

        self.handler.start_element(&elem);

        if self_close {
            self.handler.end_element(&elem);
            self.pop_decls(decl_mark);
        } else {
            self.scopes.push(Scope { alias, name, decl_mark });
        }
        Ok(())
    }

    fn close_tag(&mut self, begin: usize) -> Result<()> {
        self.scanner.advance(1); // '/'
        let (alias, name) = self.qname()?;
        self.scanner.skip_whitespace();
        if self.scanner.peek() != Some(b'>') {
            return Err(Error::malformed_xml(
                "closing tag must end with '>'",
                self.scanner.position(),
            ));
        }
        self.scanner.advance(1);
        let end = self.scanner.position();

        let scope = self.scopes.pop().ok_or_else(|| {
            Error::malformed_xml("closing tag without a matching open tag", begin)
        })?;
        if scope.alias != alias || scope.name != name {
            return Err(Error::malformed_xml("mismatched closing tag", begin));
        }

        // Resolve while this element's own declarations are still bound.
        let elem = SaxElement {
            ns: self.cxt.resolve(alias),
            alias,
            name,
            begin_pos: begin,
            end_pos: end,
        };
        self.handler.end_element(&elem);
        self.pop_decls(scope.decl_mark);
        Ok(())
    }

    fn pop_decls(&mut self, mark: usize) {
        while self.decls.len() > mark {
            let prefix = self.decls.pop().unwrap_or_default();
            self.cxt.pop(prefix);
        }
    }

    /// One attribute inside a tag. Namespace declarations are consumed
    /// here; ordinary attributes are buffered until the tag closes.
    fn attribute(&mut self) -> Result<()> {
        let (alias, name) = self.qname()?;
        self.scanner.skip_whitespace();
        if self.scanner.peek() != Some(b'=') {
            return Err(Error::malformed_xml(
                "attribute must have a value",
                self.scanner.position(),
            ));
        }
        self.scanner.advance(1);
        self.scanner.skip_whitespace();

        let quote = match self.scanner.peek() {
            Some(q @ (b'"' | b'\'')) => q,
            _ => {
                return Err(Error::malformed_xml(
                    "attribute value must be quoted",
                    self.scanner.position(),
                ))
            }
        };
        self.scanner.advance(1);
        let vs = self.scanner.position();
        let ve = self.scanner.find_byte(quote).ok_or_else(|| {
            Error::malformed_xml("attribute value has no closing quote", vs)
        })?;
        let raw = self.scanner.slice(vs, ve);
        self.scanner.set_position(ve + 1);

        let value = decode_text(raw, vs)?;

        if alias == b"xmlns" {
            // Prefixed namespace declaration: xmlns:p="uri"
            self.declare(name, &value, vs)?;
        } else if alias.is_empty() && name == b"xmlns" {
            // Default namespace declaration.
            self.declare(b"", &value, vs)?;
        } else {
            self.pending_attrs.push(SaxAttribute {
                ns: NsId::UNKNOWN,
                alias,
                name,
                value,
                value_span: (vs, ve),
            });
        }
        Ok(())
    }

    fn declare(&mut self, prefix: &'a [u8], uri: &[u8], offset: usize) -> Result<()> {
        let uri = std::str::from_utf8(uri)
            .map_err(|_| Error::malformed_xml("namespace URI is not valid UTF-8", offset))?;
        self.cxt.push(self.repo, prefix, uri);
        self.decls.push(prefix);
        Ok(())
    }

    /// `name` or `prefix:name`.
    fn qname(&mut self) -> Result<(&'a [u8], &'a [u8])> {
        let first = self.scanner.read_name().ok_or_else(|| {
            Error::malformed_xml(
                "name must begin with a letter or '_'",
                self.scanner.position(),
            )
        })?;
        if self.scanner.peek() == Some(b':') {
            self.scanner.advance(1);
            let second = self.scanner.read_name().ok_or_else(|| {
                Error::malformed_xml(
                    "name must begin with a letter or '_'",
                    self.scanner.position(),
                )
            })?;
            Ok((first, second))
        } else {
            Ok((b"", first))
        }
    }

    /// `<!...`: comment, CDATA, or DOCTYPE.
    fn bang(&mut self, begin: usize) -> Result<()> {
        self.scanner.advance(1); // '!'
        if self.scanner.starts_with(b"--") {
            self.comment(begin)
        } else if self.scanner.starts_with(b"[CDATA[") {
            self.cdata(begin)
        } else if self.scanner.starts_with(b"DOCTYPE") {
            self.doctype(begin)
        } else {
            Err(Error::malformed_xml("unrecognized markup after '<!'", begin))
        }
    }

    fn comment(&mut self, begin: usize) -> Result<()> {
        self.scanner.advance(2); // '--'
        loop {
            let dash = self.scanner.find_byte(b'-').ok_or_else(|| {
                Error::malformed_xml("unterminated comment", begin)
            })?;
            self.scanner.set_position(dash);
            if self.scanner.starts_with(b"--") {
                if self.scanner.peek_at(2) == Some(b'>') {
                    self.scanner.advance(3);
                    return Ok(());
                }
                return Err(Error::malformed_xml(
                    "'--' must not occur in a comment except in its terminator",
                    dash,
                ));
            }
            self.scanner.advance(1);
        }
    }

    fn cdata(&mut self, begin: usize) -> Result<()> {
        self.scanner.advance(7); // '[CDATA['
        let start = self.scanner.position();
        loop {
            let bracket = self.scanner.find_byte(b']').ok_or_else(|| {
                Error::malformed_xml("unterminated CDATA section", begin)
            })?;
            self.scanner.set_position(bracket);
            if self.scanner.starts_with(b"]]>") {
                let content = self.scanner.slice(start, bracket);
                self.scanner.advance(3);
                if !self.scopes.is_empty() && !content.is_empty() {
                    self.handler.characters(Cow::Borrowed(content));
                }
                return Ok(());
            }
            self.scanner.advance(1);
        }
    }

    fn doctype(&mut self, begin: usize) -> Result<()> {
        self.scanner.advance(7); // 'DOCTYPE'
        let start = self.scanner.position();
        let end = self.scanner.find_byte(b'>').ok_or_else(|| {
            Error::malformed_xml("unterminated DOCTYPE declaration", begin)
        })?;
        let content = crate::core::scanner::trim(self.scanner.slice(start, end));
        self.scanner.set_position(end + 1);
        self.handler.doctype(content);
        Ok(())
    }

    /// `<?...?>`: XML declaration or processing instruction.
    fn instruction(&mut self) -> Result<()> {
        let begin = self.scanner.position() - 1;
        self.scanner.advance(1); // '?'
        let name = self.scanner.read_name().ok_or_else(|| {
            Error::malformed_xml("processing instruction must have a target", begin)
        })?;
        let is_decl = name == b"xml";
        if is_decl {
            self.handler.start_declaration(name);
        }
        loop {
            let q = self.scanner.find_byte(b'?').ok_or_else(|| {
                Error::malformed_xml("unterminated processing instruction", begin)
            })?;
            self.scanner.set_position(q);
            if self.scanner.peek_at(1) == Some(b'>') {
                self.scanner.advance(2);
                break;
            }
            self.scanner.advance(1);
        }
        if is_decl {
            self.handler.end_declaration(name);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Collector {
        events: Vec<String>,
    }

    impl<'a> SaxHandler<'a> for Collector {
        fn start_element(&mut self, e: &SaxElement<'a>) {
            self.events.push(format!(
                "start {} ({}..{})",
                String::from_utf8_lossy(e.name),
                e.begin_pos,
                e.end_pos
            ));
        }
        fn end_element(&mut self, e: &SaxElement<'a>) {
            self.events.push(format!(
                "end {} ({}..{})",
                String::from_utf8_lossy(e.name),
                e.begin_pos,
                e.end_pos
            ));
        }
        fn attribute(&mut self, a: &SaxAttribute<'a>) {
            self.events.push(format!(
                "attr {}={}",
                String::from_utf8_lossy(a.name),
                String::from_utf8_lossy(&a.value)
            ));
        }
        fn characters(&mut self, value: Cow<'a, [u8]>) {
            self.events
                .push(format!("chars {}", String::from_utf8_lossy(&value)));
        }
        fn doctype(&mut self, content: &'a [u8]) {
            self.events
                .push(format!("doctype {}", String::from_utf8_lossy(content)));
        }
    }

    fn parse_ok(input: &[u8]) -> Vec<String> {
        let mut repo = NsRepository::new();
        let mut collector = Collector::default();
        SaxParser::new(input, &mut repo, &mut collector)
            .parse()
            .unwrap();
        collector.events
    }

    fn parse_err(input: &[u8]) -> Error {
        let mut repo = NsRepository::new();
        let mut collector = Collector::default();
        SaxParser::new(input, &mut repo, &mut collector)
            .parse()
            .unwrap_err()
    }

    #[test]
    fn test_simple_document() {
        let events = parse_ok(b"<root>hello</root>");
        assert_eq!(
            events,
            vec!["start root (0..6)", "chars hello", "end root (11..18)"]
        );
    }

    #[test]
    fn test_self_closing_positions_identical() {
        let events = parse_ok(b"<r><it/></r>");
        assert_eq!(events[1], "start it (3..8)");
        assert_eq!(events[2], "end it (3..8)");
    }

    #[test]
    fn test_attributes_fire_before_start() {
        let events = parse_ok(b"<r a=\"1\" b='2'/>");
        assert_eq!(events, vec!["attr a=1", "attr b=2", "start r (0..16)", "end r (0..16)"]);
    }

    #[test]
    fn test_entities_in_text() {
        let events = parse_ok(b"<t>a&amp;b&#x3C;c</t>");
        assert_eq!(events[1], "chars a&b<c");
    }

    #[test]
    fn test_entities_in_attribute() {
        let events = parse_ok(b"<t v=\"a&lt;b\"/>");
        assert_eq!(events[0], "attr v=a<b");
    }

    #[test]
    fn test_cdata_is_characters() {
        let events = parse_ok(b"<t><![CDATA[1 < 2 & 3]]></t>");
        assert_eq!(events[1], "chars 1 < 2 & 3");
    }

    #[test]
    fn test_comment_and_pi_are_skipped() {
        let events = parse_ok(b"<?xml version=\"1.0\"?><!-- c --><r/><!-- d -->");
        assert_eq!(events, vec!["start r (31..35)", "end r (31..35)"]);
    }

    #[test]
    fn test_doctype() {
        let events = parse_ok(b"<!DOCTYPE html><r/>");
        assert_eq!(events[0], "doctype html");
    }

    #[test]
    fn test_bom_is_consumed() {
        let mut input = vec![0xEF, 0xBB, 0xBF];
        input.extend_from_slice(b"<r/>");
        let events = parse_ok(&input);
        assert_eq!(events[0], "start r (3..7)");
    }

    #[test]
    fn test_non_ascii_lead_byte_rejected() {
        assert!(matches!(parse_err(&[0xFE, 0xFF, b'<', b'r', b'/', b'>']),
            Error::MalformedXml { offset: 0, .. }));
    }

    #[test]
    fn test_namespace_resolution() {
        struct NsCheck {
            elem_ns: Vec<NsId>,
        }
        impl<'a> SaxHandler<'a> for NsCheck {
            fn start_element(&mut self, e: &SaxElement<'a>) {
                self.elem_ns.push(e.ns);
            }
        }
        let mut repo = NsRepository::new();
        let mut h = NsCheck { elem_ns: Vec::new() };
        SaxParser::new(
            b"<a xmlns=\"urn:d\" xmlns:p=\"urn:p\"><p:b/><c/></a>",
            &mut repo,
            &mut h,
        )
        .parse()
        .unwrap();
        let d = repo.intern("urn:d");
        let p = repo.intern("urn:p");
        assert_eq!(h.elem_ns, vec![d, p, d]);
    }

    #[test]
    fn test_nested_default_namespace_pops() {
        struct NsCheck {
            ns: Vec<NsId>,
        }
        impl<'a> SaxHandler<'a> for NsCheck {
            fn start_element(&mut self, e: &SaxElement<'a>) {
                self.ns.push(e.ns);
            }
        }
        let mut repo = NsRepository::new();
        let mut h = NsCheck { ns: Vec::new() };
        SaxParser::new(
            b"<a xmlns=\"urn:1\"><b xmlns=\"urn:2\"/><c/></a>",
            &mut repo,
            &mut h,
        )
        .parse()
        .unwrap();
        let u1 = repo.intern("urn:1");
        let u2 = repo.intern("urn:2");
        assert_eq!(h.ns, vec![u1, u2, u1]);
    }

    #[test]
    fn test_unquoted_attribute_rejected() {
        assert!(matches!(parse_err(b"<r a=1/>"), Error::MalformedXml { .. }));
    }

    #[test]
    fn test_bad_name_start_rejected() {
        assert!(matches!(parse_err(b"<1tag/>"), Error::MalformedXml { .. }));
    }

    #[test]
    fn test_double_hyphen_in_comment_rejected() {
        assert!(matches!(
            parse_err(b"<r><!-- a -- b --></r>"),
            Error::MalformedXml { .. }
        ));
    }

    #[test]
    fn test_unterminated_comment_rejected() {
        assert!(matches!(
            parse_err(b"<r><!-- never ends"),
            Error::MalformedXml { .. }
        ));
    }

    #[test]
    fn test_eof_mid_tag_rejected() {
        assert!(matches!(parse_err(b"<r a=\"1\""), Error::MalformedXml { .. }));
    }

    #[test]
    fn test_mismatched_close_rejected() {
        assert!(matches!(parse_err(b"<a></b>"), Error::MalformedXml { .. }));
    }

    #[test]
    fn test_empty_reference_rejected() {
        assert!(matches!(parse_err(b"<a>&;</a>"), Error::MalformedXml { .. }));
    }
}
