//! Route label normalization.
//!
//! Maps raw request paths onto a bounded set of labels so the metrics
//! registry does not grow with every distinct resource identifier.

/// Placeholder for identifier-like segments
pub const ID_PLACEHOLDER: &str = ":id";

/// Label for the empty path and `/`
pub const ROOT_LABEL: &str = "/";

/// Label for input that cannot be interpreted as a path
pub const UNKNOWN_LABEL: &str = "unknown";

const MAX_SEGMENTS: usize = 8;
const MAX_SEGMENT_LEN: usize = 64;
const OVERFLOW_SEGMENT: &str = "*";

/// Normalize a request path (query string already stripped) into a route label.
///
/// Never fails: anything that does not look like a path becomes `"unknown"`.
pub fn normalize(raw_path: &str) -> String {
    if raw_path.is_empty() {
        return ROOT_LABEL.to_string();
    }

    if !raw_path.starts_with('/') || raw_path.chars().any(is_rejected_char) {
        return UNKNOWN_LABEL.to_string();
    }

    let segments: Vec<&str> = raw_path
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect();

    if segments.is_empty() {
        return ROOT_LABEL.to_string();
    }

    let mut label = String::with_capacity(raw_path.len());
    for (index, segment) in segments.iter().enumerate() {
        label.push('/');
        if index == MAX_SEGMENTS {
            label.push_str(OVERFLOW_SEGMENT);
            break;
        }
        // Case matters when spotting random ids, so classify before lowercasing
        if looks_like_identifier(segment) {
            label.push_str(ID_PLACEHOLDER);
        } else {
            label.push_str(&segment.to_ascii_lowercase());
        }
    }

    label
}

fn is_rejected_char(c: char) -> bool {
    c.is_whitespace() || c.is_control() || c == '?' || c == '#'
}

/// Whether a raw segment is a resource identifier rather than a route word.
fn looks_like_identifier(segment: &str) -> bool {
    if segment == ID_PLACEHOLDER || segment == OVERFLOW_SEGMENT {
        return false;
    }

    segment.len() > MAX_SEGMENT_LEN
        || segment.bytes().all(|b| b.is_ascii_digit())
        || is_uuid(segment)
        || is_long_hex(segment)
        || is_opaque_token(segment)
        || is_short_random_id(segment)
}

fn is_uuid(segment: &str) -> bool {
    const GROUPS: [usize; 5] = [8, 4, 4, 4, 12];

    let parts: Vec<&str> = segment.split('-').collect();
    parts.len() == GROUPS.len()
        && parts
            .iter()
            .zip(GROUPS)
            .all(|(part, len)| part.len() == len && part.bytes().all(|b| b.is_ascii_hexdigit()))
}

// Object ids, digests and similar
fn is_long_hex(segment: &str) -> bool {
    segment.len() >= 16 && segment.bytes().all(|b| b.is_ascii_hexdigit())
}

// Padding and separators seen in base64, base64url, JWT and similar tokens
fn is_token_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'=' | b'+' | b'.' | b'~')
}

// Slugs made only of letters are kept; long tokens mixing letters and digits are not
fn is_opaque_token(segment: &str) -> bool {
    segment.len() >= 20
        && segment.bytes().all(is_token_byte)
        && segment.bytes().any(|b| b.is_ascii_digit())
        && segment.bytes().any(|b| b.is_ascii_alphabetic())
}

// base62 and nanoid style short ids: mixed case with at least one digit
fn is_short_random_id(segment: &str) -> bool {
    segment.len() >= 8
        && segment
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        && segment.bytes().any(|b| b.is_ascii_digit())
        && segment.bytes().any(|b| b.is_ascii_lowercase())
        && segment.bytes().any(|b| b.is_ascii_uppercase())
}
