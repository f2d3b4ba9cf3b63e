//! URL normalization and URI text encoding for payload fields.
//!
//! `encode` follows the browser `encodeURI`/`decodeURI` pair so that a URL
//! reaches the collector in one readable form whether or not the page handed
//! it over already escaped.

use url::Url;

/// Characters `decodeURI` leaves escaped and `encodeURI` leaves bare.
const RESERVED: &[u8] = b";/?:@&=+$,#";

/// Characters `encodeURI` never escapes besides ASCII alphanumerics.
const UNESCAPED_MARKS: &[u8] = b"-_.!~*'()";

/// Reduce a URL to its path and query. Input that does not parse as an
/// absolute URL is taken to be relative already.
pub fn parse_url(url: &str, exclude_query: bool) -> String {
    let normalized = match Url::parse(url) {
        Ok(parsed) => match parsed.query() {
            Some(query) if !query.is_empty() => format!("{}?{}", parsed.path(), query),
            _ => parsed.path().to_string(),
        },
        Err(_) => url.to_string(),
    };

    if exclude_query {
        match normalized.split_once('?') {
            Some((path, _)) => path.to_string(),
            None => normalized,
        }
    } else {
        normalized
    }
}

/// Normalize a URL or referrer for the wire. Empty input yields `None`.
/// Escaped input comes back decoded, bare input comes back encoded, and
/// input with a malformed escape comes back untouched.
pub fn encode(value: Option<&str>) -> Option<String> {
    let value = value.filter(|v| !v.is_empty())?;
    match decode_uri(value) {
        Some(decoded) if decoded != value => Some(decoded),
        Some(_) => Some(encode_uri(value)),
        None => Some(value.to_string()),
    }
}

/// `encodeURI`: percent-encode every UTF-8 byte outside the unreserved and
/// reserved URI sets.
pub fn encode_uri(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        let bare = ch.is_ascii_alphanumeric()
            || (ch.is_ascii() && {
                let byte = ch as u8;
                UNESCAPED_MARKS.contains(&byte) || RESERVED.contains(&byte)
            });
        if bare {
            out.push(ch);
        } else {
            let mut buf = [0u8; 4];
            for byte in ch.encode_utf8(&mut buf).bytes() {
                out.push_str(&format!("%{:02X}", byte));
            }
        }
    }
    out
}

/// `decodeURI`: resolve percent escapes into UTF-8 text, keeping escapes of
/// reserved characters as they are. Returns `None` for a malformed escape
/// or an escaped byte sequence that is not valid UTF-8.
pub fn decode_uri(value: &str) -> Option<String> {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'%' {
            out.push(bytes[i]);
            i += 1;
            continue;
        }

        let lead = escaped_byte(bytes, i)?;
        if lead < 0x80 {
            if RESERVED.contains(&lead) {
                out.extend_from_slice(&bytes[i..i + 3]);
            } else {
                out.push(lead);
            }
            i += 3;
            continue;
        }

        let width = utf8_width(lead)?;
        let mut sequence = vec![lead];
        for n in 1..width {
            let next = escaped_byte(bytes, i + 3 * n)?;
            if next & 0xC0 != 0x80 {
                return None;
            }
            sequence.push(next);
        }
        let decoded = std::str::from_utf8(&sequence).ok()?;
        out.extend_from_slice(decoded.as_bytes());
        i += 3 * width;
    }

    String::from_utf8(out).ok()
}

/// Decode the `%XX` escape starting at `at`.
fn escaped_byte(bytes: &[u8], at: usize) -> Option<u8> {
    if bytes.get(at) != Some(&b'%') {
        return None;
    }
    let hi = hex_value(*bytes.get(at + 1)?)?;
    let lo = hex_value(*bytes.get(at + 2)?)?;
    Some(hi << 4 | lo)
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

fn utf8_width(lead: u8) -> Option<usize> {
    match lead {
        0xC2..=0xDF => Some(2),
        0xE0..=0xEF => Some(3),
        0xF0..=0xF4 => Some(4),
        _ => None,
    }
}
