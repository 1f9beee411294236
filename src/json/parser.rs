//! Event-driven JSON parser.
//!
//! Strict JSON: no trailing commas, no comments, no hex numbers, and no
//! leading zeros in the integer part of a number. String values arrive as
//! `Cow::Borrowed` when no escape needed decoding, `Cow::Owned` otherwise.

use crate::core::number::parse_numeric_json;
use crate::core::scanner::Scanner;
use crate::error::{Error, Result};
use std::borrow::Cow;

/// Receiver of parse events, in document order.
pub trait JsonHandler<'a> {
    fn begin_parse(&mut self) {}
    fn end_parse(&mut self) {}
    fn begin_array(&mut self) {}
    fn end_array(&mut self) {}
    fn begin_object(&mut self) {}
    fn object_key(&mut self, _key: Cow<'a, [u8]>) {}
    fn end_object(&mut self) {}
    fn boolean(&mut self, _value: bool) {}
    fn null(&mut self) {}
    fn string(&mut self, _value: Cow<'a, [u8]>) {}
    fn number(&mut self, _value: f64) {}
}

/// Streaming JSON parser over a byte slice.
pub struct JsonParser<'a, 'h, H: JsonHandler<'a>> {
    scanner: Scanner<'a>,
    handler: &'h mut H,
}

impl<'a, 'h, H: JsonHandler<'a>> JsonParser<'a, 'h, H> {
    pub fn new(input: &'a [u8], handler: &'h mut H) -> Self {
        JsonParser { scanner: Scanner::new(input), handler }
    }

    /// Drive the parse to completion.
    pub fn parse(mut self) -> Result<()> {
        self.handler.begin_parse();
        self.scanner.skip_whitespace();
        if self.scanner.is_eof() {
            return Err(Error::json_parse("empty input", 0));
        }
        self.value()?;
        self.scanner.skip_whitespace();
        if !self.scanner.is_eof() {
            return Err(Error::json_parse(
                "unexpected content after the document",
                self.scanner.position(),
            ));
        }
        self.handler.end_parse();
        Ok(())
    }

    fn value(&mut self) -> Result<()> {
        match self.scanner.peek() {
            Some(b'{') => self.object(),
            Some(b'[') => self.array(),
            Some(b'"') => {
                let s = self.string_token()?;
                self.handler.string(s);
                Ok(())
            }
            Some(b't') => self.literal(b"true", |h| h.boolean(true)),
            Some(b'f') => self.literal(b"false", |h| h.boolean(false)),
            Some(b'n') => self.literal(b"null", |h| h.null()),
            Some(b'-' | b'0'..=b'9') => self.number(),
            Some(_) => Err(Error::json_parse(
                "unexpected character at start of a value",
                self.scanner.position(),
            )),
            None => Err(Error::json_parse(
                "unexpected end of input",
                self.scanner.position(),
            )),
        }
    }

    fn object(&mut self) -> Result<()> {
        self.scanner.advance(1); // '{'
        self.handler.begin_object();
        self.scanner.skip_whitespace();
        if self.scanner.peek() == Some(b'}') {
            self.scanner.advance(1);
            self.handler.end_object();
            return Ok(());
        }
        loop {
            self.scanner.skip_whitespace();
            if self.scanner.peek() != Some(b'"') {
                return Err(Error::json_parse(
                    "object key must be a string",
                    self.scanner.position(),
                ));
            }
            let key = self.string_token()?;
            self.handler.object_key(key);

            self.scanner.skip_whitespace();
            if self.scanner.peek() != Some(b':') {
                return Err(Error::json_parse(
                    "':' expected after object key",
                    self.scanner.position(),
                ));
            }
            self.scanner.advance(1);
            self.scanner.skip_whitespace();
            self.value()?;

            self.scanner.skip_whitespace();
            match self.scanner.peek() {
                Some(b',') => self.scanner.advance(1),
                Some(b'}') => {
                    self.scanner.advance(1);
                    self.handler.end_object();
                    return Ok(());
                }
                _ => {
                    return Err(Error::json_parse(
                        "',' or '}' expected in object",
                        self.scanner.position(),
                    ))
                }
            }
        }
    }

    fn array(&mut self) -> Result<()> {
        self.scanner.advance(1); // '['
        self.handler.begin_array();
        self.scanner.skip_whitespace();
        if self.scanner.peek() == Some(b']') {
            self.scanner.advance(1);
            self.handler.end_array();
            return Ok(());
        }
        loop {
            self.scanner.skip_whitespace();
            self.value()?;
            self.scanner.skip_whitespace();
            match self.scanner.peek() {
                Some(b',') => self.scanner.advance(1),
                Some(b']') => {
                    self.scanner.advance(1);
                    self.handler.end_array();
                    return Ok(());
                }
                _ => {
                    return Err(Error::json_parse(
                        "',' or ']' expected in array",
                        self.scanner.position(),
                    ))
                }
            }
        }
    }

    fn literal(&mut self, word: &'static [u8], emit: impl FnOnce(&mut H)) -> Result<()> {
        if !self.scanner.starts_with(word) {
            return Err(Error::json_parse(
                "unrecognized literal",
                self.scanner.position(),
            ));
        }
        self.scanner.advance(word.len());
        emit(self.handler);
        Ok(())
    }

    fn number(&mut self) -> Result<()> {
        let start = self.scanner.position();
        let parsed = parse_numeric_json(self.scanner.remaining());
        if parsed.value.is_nan() {
            return Err(Error::json_parse("invalid number", start));
        }
        self.scanner.advance(parsed.consumed);
        self.handler.number(parsed.value);
        Ok(())
    }

    /// A string token including both quotes; returns the decoded content.
    fn string_token(&mut self) -> Result<Cow<'a, [u8]>> {
        let open = self.scanner.position();
        self.scanner.advance(1); // '"'
        let start = self.scanner.position();

        let mut buf: Vec<u8> = Vec::new();
        let mut seg = start;

        loop {
            let boundary = self.scanner.find_byte2(b'"', b'\\').ok_or_else(|| {
                Error::json_parse("unterminated string", open)
            })?;
            let b = self.scanner.slice(boundary, boundary + 1)[0];
            if b == b'"' {
                self.scanner.set_position(boundary + 1);
                if buf.is_empty() && seg == start {
                    return Ok(Cow::Borrowed(self.scanner.slice(start, boundary)));
                }
                buf.extend_from_slice(self.scanner.slice(seg, boundary));
                return Ok(Cow::Owned(buf));
            }

            // Escape sequence.
            buf.extend_from_slice(self.scanner.slice(seg, boundary));
            self.scanner.set_position(boundary + 1);
            self.escape(&mut buf)?;
            seg = self.scanner.position();
        }
    }

    /// Decode one escape sequence (cursor just past the backslash).
    fn escape(&mut self, buf: &mut Vec<u8>) -> Result<()> {
        let at = self.scanner.position() - 1;
        let code = self.scanner.peek().ok_or_else(|| {
            Error::json_parse("unterminated escape sequence", at)
        })?;
        self.scanner.advance(1);
        let b = match code {
            b'"' => b'"',
            b'\\' => b'\\',
            b'/' => b'/',
            b'b' => 0x08,
            b'f' => 0x0C,
            b'n' => b'\n',
            b'r' => b'\r',
            b't' => b'\t',
            b'u' => {
                let cp = self.unicode_escape(at)?;
                let mut utf8 = [0u8; 4];
                buf.extend_from_slice(cp.encode_utf8(&mut utf8).as_bytes());
                return Ok(());
            }
            _ => return Err(Error::json_parse("unrecognized escape sequence", at)),
        };
        buf.push(b);
        Ok(())
    }

    /// `\uXXXX`, combining UTF-16 surrogate pairs.
    fn unicode_escape(&mut self, at: usize) -> Result<char> {
        let hi = self.hex4(at)?;
        let cp = match hi {
            0xD800..=0xDBFF => {
                if !self.scanner.starts_with(b"\\u") {
                    return Err(Error::json_parse("unpaired high surrogate", at));
                }
                self.scanner.advance(2);
                let lo = self.hex4(at)?;
                if !(0xDC00..=0xDFFF).contains(&lo) {
                    return Err(Error::json_parse("invalid low surrogate", at));
                }
                0x10000 + ((hi - 0xD800) << 10) + (lo - 0xDC00)
            }
            0xDC00..=0xDFFF => {
                return Err(Error::json_parse("unpaired low surrogate", at));
            }
            _ => hi,
        };
        char::from_u32(cp).ok_or_else(|| Error::json_parse("invalid unicode escape", at))
    }

    fn hex4(&mut self, at: usize) -> Result<u32> {
        let mut value: u32 = 0;
        for _ in 0..4 {
            let b = self.scanner.peek().ok_or_else(|| {
                Error::json_parse("truncated unicode escape", at)
            })?;
            let digit = (b as char)
                .to_digit(16)
                .ok_or_else(|| Error::json_parse("invalid hex digit in unicode escape", at))?;
            value = value * 16 + digit;
            self.scanner.advance(1);
        }
        Ok(value)
    }
}
