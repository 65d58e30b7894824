//! Source chunks and string escape decoding.

/// A run of source text that survived preprocessing.
///
/// `offset`, `line` and `column` locate the first byte of `text` in the
/// file identified by `file`, so tokens lexed from the chunk keep their
/// original positions across `#include` boundaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceChunk {
    pub file: u32,
    pub offset: u32,
    pub line: u32,
    pub column: u32,
    pub text: String,
}

impl SourceChunk {
    /// A chunk covering a whole file.
    pub fn whole(file: u32, text: impl Into<String>) -> Self {
        Self {
            file,
            offset: 0,
            line: 1,
            column: 1,
            text: text.into(),
        }
    }
}

/// A malformed escape sequence, at `offset` bytes into the decoded text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscapeError {
    pub offset: usize,
    pub sequence: String,
}

#[derive(Clone, Copy)]
enum EscapeState {
    Text,
    Backslash(usize),
    Hex(usize),
    HexSecond(usize, u8),
}

/// Decode the body of a string literal (without quotes).
///
/// Supports `\n \t \r \0 \\ \" \'` and `\xHH`.
pub fn unescape(text: &str) -> Result<Vec<u8>, EscapeError> {
    let mut out = Vec::with_capacity(text.len());
    let mut state = EscapeState::Text;
    for (i, byte) in text.bytes().enumerate() {
        state = match (state, byte) {
            (EscapeState::Text, b'\\') => EscapeState::Backslash(i),
            (EscapeState::Text, b) => {
                out.push(b);
                EscapeState::Text
            }
            (EscapeState::Backslash(start), b'x') => EscapeState::Hex(start),
            (EscapeState::Backslash(start), b) => {
                let decoded = match b {
                    b'n' => b'\n',
                    b't' => b'\t',
                    b'r' => b'\r',
                    b'0' => 0,
                    b'\\' => b'\\',
                    b'"' => b'"',
                    b'\'' => b'\'',
                    _ => return Err(escape_error(text, start, i + 1)),
                };
                out.push(decoded);
                EscapeState::Text
            }
            (EscapeState::Hex(start), b) => match hex_value(b) {
                Some(high) => EscapeState::HexSecond(start, high),
                None => return Err(escape_error(text, start, i + 1)),
            },
            (EscapeState::HexSecond(start, high), b) => match hex_value(b) {
                Some(low) => {
                    out.push(high << 4 | low);
                    EscapeState::Text
                }
                None => return Err(escape_error(text, start, i + 1)),
            },
        };
    }
    match state {
        EscapeState::Text => Ok(out),
        EscapeState::Backslash(start) | EscapeState::Hex(start) | EscapeState::HexSecond(start, _) => {
            Err(escape_error(text, start, text.len()))
        }
    }
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

fn escape_error(text: &str, start: usize, end: usize) -> EscapeError {
    let end = (start..=end.min(text.len()))
        .rev()
        .find(|&e| text.is_char_boundary(e))
        .unwrap_or(start);
    EscapeError {
        offset: start,
        sequence: text[start..end].to_string(),
    }
}
