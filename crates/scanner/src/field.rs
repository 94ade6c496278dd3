//! First-pass field boundaries.

use std::ops::Range;

/// Where one field lies in the buffer it was scanned from.
///
/// The sign of the length says whether the field contains escape sequences
/// that must be rewritten before its value is used: negative means it does.
/// Only valid for the buffer and pass that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldLocation {
    pub start: usize,
    pub len: isize,
}

impl FieldLocation {
    pub fn new(range: Range<usize>, needs_unescape: bool) -> Self {
        let len = (range.end - range.start) as isize;
        Self { start: range.start, len: if needs_unescape { -len } else { len } }
    }

    /// Field length in raw (still escaped) bytes.
    pub fn len(&self) -> usize {
        self.len.unsigned_abs()
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn needs_unescape(&self) -> bool {
        self.len < 0
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.start + self.len()
    }

    /// Raw bytes of the field. Out-of-bounds locations yield an empty slice.
    pub fn raw<'a>(&self, buffer: &'a [u8]) -> &'a [u8] {
        buffer.get(self.range()).unwrap_or_default()
    }

    /// The field's value bytes: borrowed as-is when nothing needs rewriting,
    /// otherwise unescaped into `scratch`.
    pub fn value<'a>(&self, buffer: &'a [u8], escape: Option<u8>, scratch: &'a mut Vec<u8>) -> &'a [u8] {
        let raw = self.raw(buffer);
        match escape {
            Some(escape) if self.needs_unescape() => {
                scratch.clear();
                unescape(raw, escape, scratch);
                scratch
            },
            _ => raw,
        }
    }
}

/// Append `raw` to `out`, dropping each escape byte and keeping the byte
/// after it literally. A trailing lone escape byte is kept.
pub fn unescape(raw: &[u8], escape: u8, out: &mut Vec<u8>) {
    out.reserve(raw.len());
    let mut rest = raw;
    while let Some(i) = memchr::memchr(escape, rest) {
        out.extend_from_slice(&rest[..i]);
        match rest.get(i + 1) {
            Some(&next) => {
                out.push(next);
                rest = &rest[i + 2..];
            },
            None => {
                out.push(escape);
                rest = &[];
            },
        }
    }
    out.extend_from_slice(rest);
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(br"plain", b"plain")]
    #[case(br"a\,b", b"a,b")]
    #[case(br"\\", br"\")]
    #[case(br"\\\,", br"\,")]
    #[case(br"tab\", br"tab\")]
    #[case(b"", b"")]
    fn unescape_drops_escapes(#[case] raw: &[u8], #[case] expected: &[u8]) {
        let mut out = Vec::new();
        unescape(raw, b'\\', &mut out);
        assert_eq!(out, expected);
    }

    #[test]
    fn sign_encodes_unescaping() {
        let buffer = br"x,a\,b,y";
        let escaped = FieldLocation::new(2..6, true);
        assert_eq!(escaped.len, -4);
        assert_eq!(escaped.len(), 4);
        assert!(escaped.needs_unescape());
        let mut scratch = Vec::new();
        let mut expected = Vec::new();
        unescape(escaped.raw(buffer), b'\\', &mut expected);
        assert_eq!(escaped.value(buffer, Some(b'\\'), &mut scratch), expected.as_slice());

        let plain = FieldLocation::new(0..1, false);
        assert!(!plain.needs_unescape());
        let mut scratch = Vec::new();
        assert_eq!(plain.value(buffer, Some(b'\\'), &mut scratch), b"x");
        assert!(scratch.is_empty());
    }

    #[test]
    fn empty_and_out_of_bounds() {
        let empty = FieldLocation::new(3..3, false);
        assert!(empty.is_empty());
        assert_eq!(empty.raw(b"abc"), b"");
        assert_eq!(FieldLocation::new(2..9, false).raw(b"abc"), b"");
    }
}
