//! Filesystem-safe names for series and chapters.
//!
//! Titles scraped from the web are transliterated to ASCII, stripped of
//! characters that are illegal in file or directory names, and collapsed
//! onto single spaces. Two distinct titles may still sanitize to the same
//! name; collisions are not detected.

use std::cmp::Ordering;

/// Used when a title sanitizes to nothing.
const FALLBACK_NAME: &str = "Untitled";

/// Characters removed from names (control characters are handled separately).
const INVALID_CHARS: &[char] = &[':', '*', '?', '\\', '/', '"', '<', '>', '|', '«', '»'];

/// Normalizes a human-readable title into a safe path segment.
pub fn sanitize(name: &str) -> String {
    let ascii = deunicode::deunicode(name);

    let mut cleaned = String::with_capacity(ascii.len());
    for c in ascii.chars() {
        if c.is_whitespace() {
            cleaned.push(' ');
        } else if c.is_control() || INVALID_CHARS.contains(&c) {
            continue;
        } else {
            cleaned.push(c);
        }
    }

    let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    let trimmed = collapsed.trim_end_matches(|c: char| c == '.' || c.is_whitespace());

    if trimmed.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Zero-padded file stem for the page at `position` (1-based) of `total`.
///
/// The width is the digit count of `total`, so lexicographic and numeric
/// order agree within one chapter.
pub fn page_stem(position: usize, total: usize) -> String {
    let width = total.max(1).to_string().len();
    format!("{:0width$}", position, width = width)
}

/// Compares two names treating digit runs as numbers ("Chapter 2" < "Chapter 10").
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = a.chars().peekable();
    let mut right = b.chars().peekable();

    loop {
        match (left.peek().copied(), right.peek().copied()) {
            (None, None) => return a.cmp(b),
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(l), Some(r)) if l.is_ascii_digit() && r.is_ascii_digit() => {
                let l_num = take_digits(&mut left);
                let r_num = take_digits(&mut right);
                let l_trim = l_num.trim_start_matches('0');
                let r_trim = r_num.trim_start_matches('0');
                let ord = l_trim
                    .len()
                    .cmp(&r_trim.len())
                    .then_with(|| l_trim.cmp(r_trim));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            (Some(l), Some(r)) => {
                let ord = l.to_ascii_lowercase().cmp(&r.to_ascii_lowercase());
                if ord != Ordering::Equal {
                    return ord;
                }
                left.next();
                right.next();
            }
        }
    }
}

fn take_digits(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut digits = String::new();
    while let Some(c) = chars.peek().copied() {
        if !c.is_ascii_digit() {
            break;
        }
        digits.push(c);
        chars.next();
    }
    digits
}
