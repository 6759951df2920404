//! Restores escaped JSON text inside rendered, ANSI-colorized log lines.
//!
//! The colorized renderer prints string attributes with `Debug` escaping, so
//! an attribute that already holds JSON text comes out as
//! `"{\"key\":\"value\"}"`. [`unescape_json_in_line`] peels exactly one such
//! layer of quoting back off while copying color sequences through untouched.
//!
//! # Algorithm
//!
//! A single left-to-right pass over an explicit state machine:
//!
//! | State     | Entered on                               | Leaves on                         |
//! |-----------|------------------------------------------|-----------------------------------|
//! | `Normal`  | start, or after a sequence/segment       | `ESC [`, or `"` before `{` / `[`  |
//! | `Ansi`    | `ESC [`                                  | `m` (inclusive) or end of input   |
//! | `Segment` | `"` followed by `{` or `[` and one more  | unescaped `"` or end of input     |
//!
//! A segment is replaced by its unquoted contents only when an escaped quote
//! (`\"`) was seen inside it and unquoting succeeds. Otherwise the opening
//! quote is copied on its own and scanning resumes at the following byte.
//! Nothing is ever dropped: any input the rules do not cover is copied as-is.

use std::borrow::Cow;

const ESC: u8 = 0x1b;

#[derive(Debug, Clone, Copy)]
enum State {
    Normal,
    Ansi {
        start: usize,
    },
    Segment {
        start: usize,
        escaped: bool,
        escaped_quote: bool,
    },
}

/// Unescape JSON strings in `line` while preserving ANSI color sequences.
///
/// Returns the input unchanged (borrowed) when it holds no candidate segment.
pub fn unescape_json_in_line(line: &[u8]) -> Cow<'_, [u8]> {
    if !(0..line.len()).any(|i| opens_segment(line, i)) {
        return Cow::Borrowed(line);
    }

    let mut out = Vec::with_capacity(line.len());
    let mut state = State::Normal;
    let mut i = 0;

    loop {
        let current = line.get(i).copied();
        state = match (state, current) {
            (State::Normal, None) => break,
            (State::Normal, Some(ESC)) if line.get(i + 1) == Some(&b'[') => {
                let start = i;
                i += 2;
                State::Ansi { start }
            }
            (State::Normal, Some(b'"')) if opens_segment(line, i) => {
                let start = i;
                i += 1;
                State::Segment {
                    start,
                    escaped: false,
                    escaped_quote: false,
                }
            }
            (State::Normal, Some(byte)) => {
                out.push(byte);
                i += 1;
                State::Normal
            }

            (State::Ansi { start }, Some(b'm')) => {
                i += 1;
                out.extend_from_slice(&line[start..i]);
                State::Normal
            }
            (State::Ansi { start }, None) => {
                out.extend_from_slice(&line[start..]);
                break;
            }
            (ansi @ State::Ansi { .. }, Some(_)) => {
                i += 1;
                ansi
            }

            (
                State::Segment {
                    start,
                    escaped_quote,
                    ..
                },
                None,
            ) => {
                i = close_segment(line, start, line.len(), escaped_quote, &mut out);
                State::Normal
            }
            (
                State::Segment {
                    start,
                    escaped: true,
                    escaped_quote,
                },
                Some(_),
            ) => {
                i += 1;
                State::Segment {
                    start,
                    escaped: false,
                    escaped_quote,
                }
            }
            (
                State::Segment {
                    start,
                    escaped: false,
                    escaped_quote,
                },
                Some(b'\\'),
            ) => {
                let escaped_quote = escaped_quote || line.get(i + 1) == Some(&b'"');
                i += 1;
                State::Segment {
                    start,
                    escaped: true,
                    escaped_quote,
                }
            }
            (
                State::Segment {
                    start,
                    escaped: false,
                    escaped_quote,
                },
                Some(b'"'),
            ) => {
                i = close_segment(line, start, i + 1, escaped_quote, &mut out);
                State::Normal
            }
            (segment @ State::Segment { .. }, Some(_)) => {
                i += 1;
                segment
            }
        };
    }

    Cow::Owned(out)
}

/// A `"` opens a candidate when followed by `{` or `[` and at least one more byte.
fn opens_segment(line: &[u8], i: usize) -> bool {
    line[i] == b'"' && i + 2 < line.len() && matches!(line[i + 1], b'{' | b'[')
}

/// Emit the segment `line[start..end]` and return where scanning resumes.
fn close_segment(
    line: &[u8],
    start: usize,
    end: usize,
    escaped_quote: bool,
    out: &mut Vec<u8>,
) -> usize {
    if escaped_quote
        && end > start + 1
        && let Some(unquoted) = unquote(&line[start..end])
    {
        out.extend_from_slice(&unquoted);
        return end;
    }

    out.push(line[start]);
    start + 1
}

/// Undo string-literal quoting of a `"`-delimited byte string.
///
/// Accepts the escapes produced by both `Debug` formatting (`\u{1f600}`, `\0`)
/// and C-style quoting (`\x7f`, `\u00e9`, `\U0001f600`, `\101`). Returns
/// `None` for a missing delimiter, an unknown or truncated escape, a raw
/// newline, or an escape that does not name a valid scalar value. Bytes
/// outside escapes are copied verbatim, including invalid UTF-8.
fn unquote(quoted: &[u8]) -> Option<Vec<u8>> {
    let inner = quoted.strip_prefix(b"\"")?.strip_suffix(b"\"")?;
    if inner.contains(&b'\n') {
        return None;
    }

    let mut out = Vec::with_capacity(inner.len());
    let mut rest = inner;

    while let Some((&byte, tail)) = rest.split_first() {
        if byte != b'\\' {
            out.push(byte);
            rest = tail;
            continue;
        }

        let (&kind, tail) = tail.split_first()?;
        rest = tail;
        match kind {
            b'"' => out.push(b'"'),
            b'\\' => out.push(b'\\'),
            b'/' => out.push(b'/'),
            b'a' => out.push(0x07),
            b'b' => out.push(0x08),
            b'f' => out.push(0x0c),
            b'n' => out.push(b'\n'),
            b'r' => out.push(b'\r'),
            b't' => out.push(b'\t'),
            b'v' => out.push(0x0b),
            b'x' => {
                let (digits, tail) = split_hex(rest, 2)?;
                out.push(u8::try_from(digits).ok()?);
                rest = tail;
            }
            b'u' if rest.first() == Some(&b'{') => {
                let close = rest.iter().position(|&b| b == b'}')?;
                let digits = &rest[1..close];
                if digits.is_empty() || digits.len() > 6 {
                    return None;
                }
                let (value, _) = split_hex(digits, digits.len())?;
                push_char(&mut out, value)?;
                rest = &rest[close + 1..];
            }
            b'u' => {
                let (value, tail) = split_hex(rest, 4)?;
                push_char(&mut out, value)?;
                rest = tail;
            }
            b'U' => {
                let (value, tail) = split_hex(rest, 8)?;
                push_char(&mut out, value)?;
                rest = tail;
            }
            b'0'..=b'7' => {
                let octal = rest
                    .get(..2)
                    .filter(|digits| digits.iter().all(|&b| matches!(b, b'0'..=b'7')));
                match octal {
                    Some(digits) => {
                        let value = digits
                            .iter()
                            .fold(u32::from(kind - b'0'), |acc, d| acc * 8 + u32::from(d - b'0'));
                        out.push(u8::try_from(value).ok()?);
                        rest = &rest[2..];
                    }
                    None if kind == b'0' => out.push(0),
                    None => return None,
                }
            }
            _ => return None,
        }
    }

    Some(out)
}

/// Parse exactly `len` hex digits from the front of `bytes`.
fn split_hex(bytes: &[u8], len: usize) -> Option<(u32, &[u8])> {
    let digits = bytes.get(..len)?;
    let mut value: u32 = 0;
    for &digit in digits {
        let nibble = char::from(digit).to_digit(16)?;
        value = value.checked_mul(16)?.checked_add(nibble)?;
    }
    Some((value, &bytes[len..]))
}

fn push_char(out: &mut Vec<u8>, value: u32) -> Option<()> {
    let ch = char::from_u32(value)?;
    let mut buf = [0u8; 4];
    out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
    Some(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use proptest::prelude::*;
    use rstest::rstest;

    use super::*;

    fn scan(input: &[u8]) -> Vec<u8> {
        unescape_json_in_line(input).into_owned()
    }

    #[rstest]
    #[case::empty_line(b"", b"")]
    #[case::plain_text(b"Hello World", b"Hello World")]
    #[case::escaped_object(br#""{\"key\":\"value\"}""#, br#"{"key":"value"}"#)]
    #[case::escaped_array(br#""[\"item1\",\"item2\"]""#, br#"["item1","item2"]"#)]
    #[case::ansi_only(b"\x1b[31mRed Text\x1b[0m", b"\x1b[31mRed Text\x1b[0m")]
    #[case::ansi_around_escaped_json(
        b"\x1b[32m\"{\\\"status\\\":\\\"ok\\\"}\"\x1b[0m",
        b"\x1b[32m{\"status\":\"ok\"}\x1b[0m"
    )]
    #[case::nested_objects(
        br#""{\"user\":{\"name\":\"John\",\"age\":30}}""#,
        br#"{"user":{"name":"John","age":30}}"#
    )]
    #[case::quoted_plain_string(br#""simple string""#, br#""simple string""#)]
    #[case::raw_json_untouched(br#"{"key":"value"}"#, br#"{"key":"value"}"#)]
    #[case::mixed_content(
        b"prefix \x1b[33m\"{\\\"data\\\":[1,2,3]}\"\x1b[0m suffix",
        b"prefix \x1b[33m{\"data\":[1,2,3]}\x1b[0m suffix"
    )]
    #[case::special_characters(
        br#""{\"message\":\"Hello\\nWorld\\t!\"}""#,
        br#"{"message":"Hello\nWorld\t!"}"#
    )]
    #[case::stacked_ansi(b"\x1b[1m\x1b[31mBold Red\x1b[0m", b"\x1b[1m\x1b[31mBold Red\x1b[0m")]
    #[case::trailing_quote(br#"end with ""#, br#"end with ""#)]
    #[case::escaped_backslash(br#""{\"path\":\"C:\\\\Users\"}""#, br#"{"path":"C:\\Users"}"#)]
    #[case::truncated_ansi(b"\x1b[31", b"\x1b[31")]
    #[case::unescaped_number_array(br#""[1,2,3,4,5]""#, br#""[1,2,3,4,5]""#)]
    #[case::timestamped_line(
        br#"2023-10-01 INFO "{\"request\":{\"method\":\"GET\"}}""#,
        br#"2023-10-01 INFO {"request":{"method":"GET"}}"#
    )]
    fn test_unescape_json_in_line(#[case] input: &[u8], #[case] expected: &[u8]) {
        assert_eq!(
            String::from_utf8_lossy(&scan(input)),
            String::from_utf8_lossy(expected)
        );
    }

    #[rstest]
    #[case::unterminated_segment(br#"x "{\"a\":1"#)]
    #[case::bad_escape_inside(br#""{\"a\":\q}""#)]
    #[case::quote_then_brace_at_end(br#"tail "{"#)]
    #[case::dangling_backslash(br#""{\""#)]
    #[case::escape_only_at_end(b"\x1b[")]
    fn test_malformed_input_copied_verbatim(#[case] input: &[u8]) {
        assert_eq!(scan(input), input);
    }

    #[test]
    fn test_borrows_when_nothing_to_do() {
        let line = b"\x1b[2m2024-01-01\x1b[0m INFO message key=\"value\"";
        assert!(matches!(unescape_json_in_line(line), Cow::Borrowed(_)));
    }

    #[test]
    fn test_only_first_layer_is_peeled() {
        let line = br#""{\"outer\":\"{\\\"inner\\\":1}\"}""#;
        let once = scan(line);
        assert_eq!(once, br#"{"outer":"{\"inner\":1}"}"#);
        assert_eq!(scan(&once), br#"{"outer":{"inner":1}}"#);
    }

    #[test]
    fn test_fallback_rescans_following_bytes() {
        // The outer candidate has no escaped quote; the inner one does.
        let line = br#""[ "{\"a\":1}" ]""#;
        assert_eq!(scan(line), br#""[ {"a":1} ]""#);
    }

    #[test]
    fn test_debug_escapes_round_trip() {
        let payload = "{\"emoji\":\"\u{7}\u{1f600}\",\"nul\":\"\0\"}";
        let rendered = format!("{payload:?}");
        assert_eq!(scan(rendered.as_bytes()), payload.as_bytes());
    }

    #[rstest]
    #[case(br#""\x41\u00e9\U0001F600\101""#, "A\u{e9}\u{1f600}A")]
    #[case(br#""a\/b""#, "a/b")]
    #[case(br#""\u{48}\u{49}""#, "HI")]
    fn test_unquote_escapes(#[case] quoted: &[u8], #[case] expected: &str) {
        assert_eq!(unquote(quoted).unwrap(), expected.as_bytes());
    }

    #[rstest]
    #[case::missing_quotes(b"abc")]
    #[case::single_quote(b"\"")]
    #[case::raw_newline(b"\"a\nb\"")]
    #[case::surrogate(br#""\ud800""#)]
    #[case::short_hex(br#""\x4""#)]
    #[case::empty_braces(br#""\u{}""#)]
    #[case::octal_overflow(br#""\777""#)]
    #[case::single_quote_escape(br#""\'""#)]
    fn test_unquote_rejects(#[case] quoted: &[u8]) {
        assert_eq!(unquote(quoted), None);
    }

    fn ansi_sequence() -> impl Strategy<Value = Vec<u8>> {
        "[0-9;]{0,6}".prop_map(|params| {
            let mut seq = vec![ESC, b'['];
            seq.extend_from_slice(params.as_bytes());
            seq.push(b'm');
            seq
        })
    }

    /// Any byte except backslash and ESC, biased towards segment delimiters.
    fn unescaped_byte() -> impl Strategy<Value = u8> {
        prop_oneof![
            Just(b'"'),
            Just(b'{'),
            Just(b'['),
            Just(b'}'),
            Just(b']'),
            any::<u8>().prop_filter("no escape bytes", |&b| b != b'\\' && b != ESC),
        ]
    }

    proptest! {
        #[test]
        fn prop_unescaped_text_is_identity(input in proptest::collection::vec(unescaped_byte(), 0..256)) {
            prop_assert_eq!(scan(&input), input);
        }

        #[test]
        fn prop_ansi_and_text_is_identity(
            parts in proptest::collection::vec(
                prop_oneof![ansi_sequence(), "[ -!#-~]{0,12}".prop_map(String::into_bytes)],
                0..16,
            )
        ) {
            let input = parts.concat();
            prop_assert_eq!(scan(&input), input);
        }

        #[test]
        fn prop_debug_quoted_json_is_restored(
            map in proptest::collection::btree_map("[a-z0-9]{1,8}", "[a-zA-Z0-9 ]{0,8}", 1..5)
        ) {
            let map: BTreeMap<String, String> = map;
            let json = serde_json::to_string(&map).unwrap();
            let rendered = format!("\x1b[3mpayload\x1b[0m={json:?}");

            let once = scan(rendered.as_bytes());
            let expected = format!("\x1b[3mpayload\x1b[0m={json}");
            prop_assert_eq!(&once, expected.as_bytes());
            prop_assert_eq!(scan(&once), once.clone());
        }
    }
}
