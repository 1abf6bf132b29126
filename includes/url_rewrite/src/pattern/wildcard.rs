use crate::error::PatternError;

const META: &[char] = &[
    '\\', '.', '+', '*', '?', '(', ')', '|', '[', ']', '{', '}', '^', '$', '#', '&', '-', '~',
];

/// Translate a wildcard expression into an equivalent anchored regex.
///
/// `*` becomes a capture group matching any run of characters, `?` matches
/// exactly one character and `\` escapes `*`, `?` or `\`. Any other character
/// is matched literally.
pub(crate) fn translate(pattern: &str) -> Result<String, PatternError> {
    let mut regex = String::with_capacity(pattern.len() * 2 + 2);
    regex.push('^');
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '*' => regex.push_str("(.*)"),
            '?' => regex.push('.'),
            '\\' => match chars.next() {
                Some(e @ ('*' | '?' | '\\')) => push_literal(&mut regex, e),
                _ => return Err(PatternError::InvalidWildcard(pattern.to_owned())),
            },
            c => push_literal(&mut regex, c),
        }
    }
    regex.push('$');
    Ok(regex)
}

#[inline]
fn push_literal(regex: &mut String, c: char) {
    if META.contains(&c) {
        regex.push('\\');
    }
    regex.push(c);
}
