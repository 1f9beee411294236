//! Numeric text parsing shared by JSON, attribute values, and `set_auto`.
//!
//! Scans sign, integer, fraction, and exponent parts to find the extent
//! of the number, then converts the consumed slice with the standard
//! correctly-rounded float conversion, so values survive a
//! format-then-reparse round trip bitwise. Returns NaN on failure so
//! callers can treat "not a number" uniformly.

/// Outcome of a numeric parse: the value (NaN on failure) and the number
/// of bytes consumed.
#[derive(Debug, Clone, Copy)]
pub struct Parsed {
    pub value: f64,
    pub consumed: usize,
}

impl Parsed {
    fn failed(consumed: usize) -> Self {
        Parsed { value: f64::NAN, consumed }
    }
}

/// Parse a number in generic mode: leading zeros in the integer part are
/// accepted ("007" parses as 7).
pub fn parse_numeric(bytes: &[u8]) -> Parsed {
    parse_impl(bytes, true)
}

/// Parse a number in JSON mode: an integer part of more than one digit
/// must not begin with '0'; such input yields NaN.
pub fn parse_numeric_json(bytes: &[u8]) -> Parsed {
    parse_impl(bytes, false)
}

fn parse_impl(bytes: &[u8], allow_leading_zeros: bool) -> Parsed {
    let mut pos = 0;

    skip_sign(bytes, &mut pos);

    let mut has_digit = false;
    let mut before_decimal_pt = true;
    let mut digit_count = 0usize;
    let mut first_digit = 0u8;

    while pos < bytes.len() {
        let b = bytes[pos];

        if b == b'.' {
            if !before_decimal_pt {
                // Second '.' terminates the parse.
                break;
            }
            before_decimal_pt = false;
            pos += 1;
            continue;
        }

        if has_digit && (b == b'e' || b == b'E') {
            pos += 1;
            if !consume_exponent(bytes, &mut pos) {
                // No digits followed the 'e'; leave it unconsumed.
                pos -= 1;
            }
            break;
        }

        if !b.is_ascii_digit() {
            break;
        }

        has_digit = true;
        if before_decimal_pt {
            if digit_count == 0 {
                first_digit = b - b'0';
            }
            digit_count += 1;
        }
        pos += 1;
    }

    if !has_digit {
        return Parsed::failed(pos);
    }

    if !allow_leading_zeros && digit_count > 1 && first_digit == 0 {
        return Parsed::failed(pos);
    }

    let value = std::str::from_utf8(&bytes[..pos])
        .ok()
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(f64::NAN);
    Parsed { value, consumed: pos }
}

fn skip_sign(bytes: &[u8], pos: &mut usize) {
    if matches!(bytes.get(*pos), Some(b'+') | Some(b'-')) {
        *pos += 1;
    }
}

/// Consume an exponent's optional sign and digits; false when no digit
/// follows (the cursor is restored to just past the 'e').
fn consume_exponent(bytes: &[u8], pos: &mut usize) -> bool {
    let restore = *pos;
    skip_sign(bytes, pos);

    let mut valid = false;
    while let Some(b) = bytes.get(*pos) {
        if !b.is_ascii_digit() {
            break;
        }
        valid = true;
        *pos += 1;
    }

    if !valid {
        *pos = restore;
    }
    valid
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value(s: &str) -> f64 {
        parse_numeric(s.as_bytes()).value
    }

    #[test]
    fn test_integers() {
        assert_eq!(value("0"), 0.0);
        assert_eq!(value("42"), 42.0);
        assert_eq!(value("-7"), -7.0);
        assert_eq!(value("+13"), 13.0);
    }

    #[test]
    fn test_fractions() {
        assert_eq!(value("3.25"), 3.25);
        assert_eq!(value("-0.5"), -0.5);
    }

    #[test]
    fn test_exponents() {
        assert_eq!(value("2e3"), 2000.0);
        assert_eq!(value("2.5e-2"), 0.025);
        assert_eq!(value("1E2"), 100.0);
    }

    #[test]
    fn test_exponent_without_digits_is_ignored() {
        let p = parse_numeric(b"12e");
        assert_eq!(p.value, 12.0);
        assert_eq!(p.consumed, 2);
    }

    #[test]
    fn test_no_digits_is_nan() {
        assert!(value("abc").is_nan());
        assert!(value("-").is_nan());
        assert!(value("").is_nan());
    }

    #[test]
    fn test_consumed_stops_at_junk() {
        let p = parse_numeric(b"12.5abc");
        assert_eq!(p.value, 12.5);
        assert_eq!(p.consumed, 4);
    }

    #[test]
    fn test_second_dot_terminates() {
        let p = parse_numeric(b"1.2.3");
        assert_eq!(p.value, 1.2);
        assert_eq!(p.consumed, 3);
    }

    #[test]
    fn test_leading_zeros_generic() {
        assert_eq!(value("007"), 7.0);
    }

    #[test]
    fn test_leading_zeros_json_is_nan() {
        assert!(parse_numeric_json(b"01").value.is_nan());
        assert!(parse_numeric_json(b"007").value.is_nan());
        // A lone zero and a zero integer part are fine.
        assert_eq!(parse_numeric_json(b"0").value, 0.0);
        assert_eq!(parse_numeric_json(b"0.5").value, 0.5);
    }

    #[test]
    fn test_shortest_repr_roundtrip() {
        for d in [0.1, 1.0 / 3.0, 6.02214076e23, f64::MIN_POSITIVE, f64::MAX] {
            let s = format!("{d}");
            let p = parse_numeric(s.as_bytes());
            assert_eq!(p.value.to_bits(), d.to_bits(), "failed for {s}");
        }
    }
}
