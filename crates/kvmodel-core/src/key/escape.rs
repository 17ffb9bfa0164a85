//! Key fragment escaping.
//!
//! Reserved separators (`:` and space) never appear literally inside a
//! fragment, and `%` is doubled so the encoding stays reversible.

/// Escape one key fragment.
///
/// `%` becomes `%%`, a space becomes `%20`, and `:` becomes `%3A`.
#[must_use]
pub fn escape(fragment: &str) -> String {
    let mut out = String::with_capacity(fragment.len());

    for ch in fragment.chars() {
        match ch {
            '%' => out.push_str("%%"),
            ' ' => out.push_str("%20"),
            ':' => out.push_str("%3A"),
            other => out.push(other),
        }
    }

    out
}

/// Reverse [`escape`].
///
/// Decoding is a single left-to-right scan; sequential string replacement is
/// not an inverse (`"%3A"` escapes to `"%%3A"`, which must decode back to
/// `"%3A"`, not `"%:"`). Unknown escape sequences are kept verbatim.
#[must_use]
pub fn unescape(fragment: &str) -> String {
    let mut out = String::with_capacity(fragment.len());
    let mut rest = fragment;

    while let Some(pos) = rest.find('%') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if let Some(after) = tail.strip_prefix("%%") {
            out.push('%');
            rest = after;
        } else if let Some(after) = tail.strip_prefix("%20") {
            out.push(' ');
            rest = after;
        } else if let Some(after) = tail.strip_prefix("%3A") {
            out.push(':');
            rest = after;
        } else {
            out.push('%');
            rest = &tail[1..];
        }
    }

    out.push_str(rest);
    out
}
