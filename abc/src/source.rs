use std::borrow::Cow;

use thiserror::Error;
use tracing::warn;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// How to treat bytes that are not valid UTF-8.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DecodePolicy {
    /// Reject the file.
    #[default]
    Strict,
    /// Replace invalid sequences with U+FFFD.
    Lossy,
}

#[derive(Debug, Error)]
pub enum ParseError {
    /// Input handed to the parser is not text.
    #[error("{file_path}: not valid UTF-8 (invalid byte at offset {valid_up_to})")]
    NotText {
        file_path: String,
        valid_up_to: usize,
    },
}

/// Turns raw file contents into text, dropping a leading byte-order mark.
pub fn decode_source<'a>(
    bytes: &'a [u8],
    file_path: &str,
    policy: DecodePolicy,
) -> Result<Cow<'a, str>, ParseError> {
    let (bom_len, bytes) = match bytes.strip_prefix(UTF8_BOM) {
        Some(rest) => (UTF8_BOM.len(), rest),
        None => (0, bytes),
    };

    match std::str::from_utf8(bytes) {
        Ok(text) => Ok(Cow::Borrowed(text)),
        Err(err) => {
            let valid_up_to = bom_len + err.valid_up_to();
            match policy {
                DecodePolicy::Strict => Err(ParseError::NotText {
                    file_path: file_path.to_owned(),
                    valid_up_to,
                }),
                DecodePolicy::Lossy => {
                    warn!(file_path, valid_up_to, "replacing invalid UTF-8 sequences");
                    Ok(String::from_utf8_lossy(bytes))
                }
            }
        }
    }
}

/// Rewrites `\r\n` and lone `\r` line endings as `\n`.
pub fn normalize_line_endings(text: &str) -> Cow<'_, str> {
    if !text.contains('\r') {
        return Cow::Borrowed(text);
    }
    Cow::Owned(text.replace("\r\n", "\n").replace('\r', "\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_strips_bom() {
        let text = decode_source(b"\xEF\xBB\xBFX:1\n", "a.abc", DecodePolicy::Strict).unwrap();
        assert_eq!(text, "X:1\n");
    }

    #[test]
    fn test_decode_strict_rejects_binary() {
        let err = decode_source(b"X:1\n\xFF\xFE", "books/1/bad.abc", DecodePolicy::Strict)
            .unwrap_err();

        let ParseError::NotText {
            file_path,
            valid_up_to,
        } = err;
        assert_eq!(file_path, "books/1/bad.abc");
        assert_eq!(valid_up_to, 4);
    }

    #[test]
    fn test_decode_lossy_replaces_invalid_bytes() {
        let text = decode_source(b"T:Caf\xE9\n", "a.abc", DecodePolicy::Lossy).unwrap();
        assert_eq!(text, "T:Caf\u{FFFD}\n");
    }

    #[test]
    fn test_normalize_line_endings() {
        assert!(matches!(normalize_line_endings("a\nb\n"), Cow::Borrowed(_)));
        assert_eq!(normalize_line_endings("a\r\nb\rc\n"), "a\nb\nc\n");
    }
}
