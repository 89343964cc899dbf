//! AdBlock pattern to regex translation.
//!
//! The output is regex *syntax* only. Nothing is compiled here, so that many
//! rule patterns can be joined into a few large alternations first.

/// AdBlock `^` separator: anything but a letter, digit, `_`, `-`, `.` or `%`,
/// or the end of the address.
pub const SEPARATOR: &str = r"(?:[^\w\-.%]|$)";

/// `||` start-of-domain prefix: optional scheme, optional `//` authority
/// marker with any subdomain labels, anchored at the start of the URL.
pub const DOMAIN_ANCHOR: &str = r"^(?:[^:/?#]+:)?(?://(?:[^/?#]*\.)?)?";

/// Pattern matching any string
pub const MATCH_ANY: &str = ".*";

/// Returns the body of a `/.../` regex rule, if `text` is one
pub fn regex_literal(text: &str) -> Option<&str> {
    if text.len() >= 2 && text.starts_with('/') && text.ends_with('/') {
        Some(&text[1..text.len() - 1])
    } else {
        None
    }
}

/// Translate AdBlock pattern text into regex syntax
pub fn to_pattern(text: &str) -> String {
    if text.is_empty() {
        return MATCH_ANY.to_string();
    }

    if let Some(body) = regex_literal(text) {
        return body.to_string();
    }

    let (prefix, rest) = if let Some(rest) = text.strip_prefix("||") {
        (DOMAIN_ANCHOR, rest)
    } else if let Some(rest) = text.strip_prefix('|') {
        ("^", rest)
    } else {
        ("", text)
    };

    let (body, suffix) = match rest.strip_suffix('|') {
        Some(body) => (body, "$"),
        None => (rest, ""),
    };

    let mut out = String::with_capacity(prefix.len() + body.len() * 2 + suffix.len());
    out.push_str(prefix);

    let mut literal = String::new();
    for ch in body.chars() {
        let operator = match ch {
            '^' => SEPARATOR,
            '*' => MATCH_ANY,
            // Stray pipes inside the body are literal, never alternation.
            '|' => r"\|",
            _ => {
                literal.push(ch);
                continue;
            }
        };
        flush_literal(&mut out, &mut literal);
        out.push_str(operator);
    }
    flush_literal(&mut out, &mut literal);

    out.push_str(suffix);
    out
}

fn flush_literal(out: &mut String, literal: &mut String) {
    if !literal.is_empty() {
        out.push_str(&regex::escape(literal));
        literal.clear();
    }
}
