//! XML Entity Decoding
//!
//! Handles the five predefined entities (&lt; &gt; &amp; &quot; &apos;)
//! and numeric character references (&#123; &#x7B;). Unknown named
//! entities pass through verbatim. Uses Cow for zero-copy when no
//! entities are present.

use crate::error::{Error, Result};
use memchr::memchr;
use std::borrow::Cow;

/// Decode entity references in text or attribute content.
///
/// Returns `Cow::Borrowed` when no decoding was needed (the zero-copy fast
/// path) and `Cow::Owned` when a buffer had to be materialized, in which
/// case callers must copy if the value outlives the event.
///
/// `base` is the byte offset of `input` within the enclosing stream, used
/// for error reporting.
pub fn decode_text(input: &[u8], base: usize) -> Result<Cow<'_, [u8]>> {
    // Fast path: SIMD check for any reference at all.
    if memchr(b'&', input).is_none() {
        return Ok(Cow::Borrowed(input));
    }

    let mut result = Vec::with_capacity(input.len());
    let mut pos = 0;

    while pos < input.len() {
        match memchr(b'&', &input[pos..]) {
            Some(amp) => {
                result.extend_from_slice(&input[pos..pos + amp]);
                pos += amp;

                let semi = memchr(b';', &input[pos..]).ok_or_else(|| {
                    Error::malformed_xml(
                        "character reference is not terminated by ';'",
                        base + pos,
                    )
                })?;

                let entity = &input[pos + 1..pos + semi];
                if entity.is_empty() {
                    return Err(Error::malformed_xml("empty character reference", base + pos));
                }

                match decode_entity(entity, base + pos)? {
                    Some(decoded) => result.extend_from_slice(decoded.as_bytes()),
                    // Unknown named entity: keep "&name;" as written.
                    None => result.extend_from_slice(&input[pos..pos + semi + 1]),
                }
                pos += semi + 1;
            }
            None => {
                result.extend_from_slice(&input[pos..]);
                break;
            }
        }
    }

    Ok(Cow::Owned(result))
}

/// Decode a single reference body (without '&' and ';').
///
/// Returns `Ok(None)` for an unknown named entity.
fn decode_entity(entity: &[u8], offset: usize) -> Result<Option<SmallUtf8>> {
    if entity[0] == b'#' {
        return decode_numeric_entity(&entity[1..], offset).map(Some);
    }

    let ch = match entity {
        b"lt" => '<',
        b"gt" => '>',
        b"amp" => '&',
        b"quot" => '"',
        b"apos" => '\'',
        _ => return Ok(None),
    };
    Ok(Some(SmallUtf8::from_char(ch)))
}

/// Decode a numeric character reference body (without the leading '#').
fn decode_numeric_entity(entity: &[u8], offset: usize) -> Result<SmallUtf8> {
    let codepoint = if entity.first() == Some(&b'x') || entity.first() == Some(&b'X') {
        parse_radix(&entity[1..], 16)
    } else {
        parse_radix(entity, 10)
    }
    .ok_or_else(|| Error::xml_structure("invalid numeric character reference", offset))?;

    if codepoint > 0x10FFFF {
        return Err(Error::xml_structure(
            "character reference beyond U+10FFFF",
            offset,
        ));
    }

    char::from_u32(codepoint)
        .map(SmallUtf8::from_char)
        .ok_or_else(|| Error::xml_structure("character reference is not a valid scalar", offset))
}

fn parse_radix(digits: &[u8], radix: u32) -> Option<u32> {
    if digits.is_empty() {
        return None;
    }
    let mut value: u32 = 0;
    for &b in digits {
        let d = (b as char).to_digit(radix)?;
        value = value.checked_mul(radix)?.checked_add(d)?;
    }
    Some(value)
}

/// A single code point encoded as UTF-8, without heap allocation.
struct SmallUtf8 {
    buf: [u8; 4],
    len: usize,
}

impl SmallUtf8 {
    fn from_char(c: char) -> Self {
        let mut buf = [0u8; 4];
        let len = c.encode_utf8(&mut buf).len();
        SmallUtf8 { buf, len }
    }

    fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}

/// Escape text for XML output.
pub fn encode_text(input: &str) -> Cow<'_, str> {
    if !input
        .bytes()
        .any(|b| matches!(b, b'<' | b'>' | b'&' | b'"' | b'\''))
    {
        return Cow::Borrowed(input);
    }

    let mut result = String::with_capacity(input.len() + 16);
    for c in input.chars() {
        match c {
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            '&' => result.push_str("&amp;"),
            '"' => result.push_str("&quot;"),
            '\'' => result.push_str("&apos;"),
            _ => result.push(c),
        }
    }
    Cow::Owned(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_entities() {
        let result = decode_text(b"Hello, World!", 0).unwrap();
        assert!(matches!(result, Cow::Borrowed(_)));
        assert_eq!(result.as_ref(), b"Hello, World!");
    }

    #[test]
    fn test_predefined_entities() {
        let result = decode_text(b"&lt;hello&gt; &amp; &quot;w&apos;d&quot;", 0).unwrap();
        assert_eq!(result.as_ref(), b"<hello> & \"w'd\"");
    }

    #[test]
    fn test_numeric_decimal() {
        let result = decode_text(b"&#65;&#66;&#67;", 0).unwrap();
        assert_eq!(result.as_ref(), b"ABC");
    }

    #[test]
    fn test_numeric_hex() {
        let result = decode_text(b"&#x41;&#x42;&#x43;", 0).unwrap();
        assert_eq!(result.as_ref(), b"ABC");
    }

    #[test]
    fn test_supplementary_plane() {
        let result = decode_text("&#x1F600;".as_bytes(), 0).unwrap();
        assert_eq!(std::str::from_utf8(result.as_ref()).unwrap(), "\u{1F600}");
    }

    #[test]
    fn test_unknown_entity_passes_through() {
        let result = decode_text(b"a&unknown;b", 0).unwrap();
        assert_eq!(result.as_ref(), b"a&unknown;b");
    }

    #[test]
    fn test_empty_reference_fails() {
        assert!(matches!(
            decode_text(b"a&;b", 10),
            Err(Error::MalformedXml { offset: 11, .. })
        ));
    }

    #[test]
    fn test_out_of_range_codepoint_fails() {
        assert!(matches!(
            decode_text(b"&#x110000;", 0),
            Err(Error::XmlStructure { .. })
        ));
    }

    #[test]
    fn test_unterminated_reference_fails() {
        assert!(matches!(
            decode_text(b"a&amp", 0),
            Err(Error::MalformedXml { .. })
        ));
    }

    #[test]
    fn test_encode_text() {
        let result = encode_text("<hello> & \"world\"");
        assert_eq!(result.as_ref(), "&lt;hello&gt; &amp; &quot;world&quot;");
    }
}
