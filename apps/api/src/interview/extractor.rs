//! Incremental Field Extractor — best-effort preview of one string field while the
//! structured payload is still streaming in.
//!
//! The buffer is usually NOT valid JSON yet, so this never parses. It finds the most
//! recent `"<field>":` marker, takes what follows up to the point where the value
//! visibly ends (or the end of the buffer), and decodes the escapes it can.
//!
//! Called on every chunk: one marker search plus one forward pass, O(buffer length).

/// Field whose value is previewed during task generation.
pub const INSTRUCTIONS_FIELD: &str = "instructions";

/// Returns the partial value of `field`, or `None` if its key has not appeared yet.
///
/// If the key appears more than once the most recent occurrence wins.
pub fn extract_partial(buffer: &str, field: &str) -> Option<String> {
    let value_start = find_last_marker(buffer, field)?;
    let rest = buffer[value_start..].trim_start();
    let rest = rest.strip_prefix('"').unwrap_or(rest);
    let end = find_value_end(rest);
    Some(unescape_lossy(&rest[..end]))
}

pub fn extract_instructions(buffer: &str) -> Option<String> {
    extract_partial(buffer, INSTRUCTIONS_FIELD)
}

/// Byte offset just past the colon of the last complete `"<field>"\s*:` marker.
fn find_last_marker(buffer: &str, field: &str) -> Option<usize> {
    let key = format!("\"{field}\"");
    let mut search_end = buffer.len();

    while let Some(pos) = buffer[..search_end].rfind(&key) {
        let after_key = &buffer[pos + key.len()..];
        if let Some(value) = after_key.trim_start().strip_prefix(':') {
            return Some(buffer.len() - value.len());
        }
        // Key restated but its colon has not arrived; fall back to the previous one.
        search_end = pos;
    }
    None
}

/// Index of the quote that ends the value, or the full length if it is still open.
fn find_value_end(value: &str) -> usize {
    let bytes = value.as_bytes();
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' => escaped = true,
            b'"' if closes_value(&bytes[i + 1..]) => return i,
            _ => {}
        }
    }
    bytes.len()
}

/// True when an unescaped quote is followed by `}` or by `,` and the next key.
/// End of buffer counts as a match: the delimiter is still in flight.
fn closes_value(after: &[u8]) -> bool {
    let rest = skip_whitespace(after);
    match rest.first() {
        None | Some(b'}') => true,
        Some(b',') => matches!(skip_whitespace(&rest[1..]).first(), None | Some(b'"')),
        _ => false,
    }
}

fn skip_whitespace(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    &bytes[start..]
}

/// Decodes JSON string escapes. Stray or incomplete escapes are dropped.
pub(crate) fn unescape_lossy(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(pos) = rest.find('\\') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        let consumed = match after.chars().next() {
            None => 0,
            Some('"') => push(&mut out, '"'),
            Some('n') => push(&mut out, '\n'),
            Some('t') => push(&mut out, '\t'),
            Some('r') => push(&mut out, '\r'),
            Some('b') => push(&mut out, '\u{8}'),
            Some('f') => push(&mut out, '\u{c}'),
            Some('\\') => push(&mut out, '\\'),
            Some('/') => push(&mut out, '/'),
            Some('u') => 1 + decode_unicode(&after[1..], &mut out),
            // Unpaired escape: keep the character, drop the backslash.
            Some(other) => {
                out.push(other);
                other.len_utf8()
            }
        };
        rest = &after[consumed..];
    }
    out.push_str(rest);
    out
}

fn push(out: &mut String, c: char) -> usize {
    out.push(c);
    1
}

/// Decodes the hex part of a `\u` escape. Returns the bytes consumed.
fn decode_unicode(hex: &str, out: &mut String) -> usize {
    let Some(code) = parse_hex4(hex) else {
        return hex.bytes().take(4).take_while(|b| b.is_ascii_hexdigit()).count();
    };

    if (0xD800..0xDC00).contains(&code) {
        let low = hex[4..].strip_prefix("\\u").and_then(parse_hex4);
        if let Some(low) = low.filter(|low| (0xDC00..0xE000).contains(low)) {
            let combined = 0x10000 + ((code - 0xD800) << 10) + (low - 0xDC00);
            if let Some(c) = char::from_u32(combined) {
                out.push(c);
            }
            return 10;
        }
        return 4;
    }

    if let Some(c) = char::from_u32(code) {
        out.push(c);
    }
    4
}

fn parse_hex4(s: &str) -> Option<u32> {
    let hex = s.get(..4)?;
    if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u32::from_str_radix(hex, 16).ok()
}

/// Raw text accumulated for one generation call.
#[derive(Debug, Default)]
pub struct StreamingBuffer {
    text: String,
    chunks: usize,
}

impl StreamingBuffer {
    pub fn push(&mut self, chunk: &str) {
        self.text.push_str(chunk);
        self.chunks += 1;
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks
    }

    pub fn preview(&self, field: &str) -> Option<String> {
        extract_partial(&self.text, field)
    }

    pub fn into_text(self) -> String {
        self.text
    }
}
