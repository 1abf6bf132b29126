//! Configuration front-ends producing ordered [`Rule`](crate::Rule) lists.
//!
//! * [`UrlRewriteFileParser`] reads the IIS URL Rewrite xml schema.
//! * [`ModRewriteFileParser`] reads `mod_rewrite` directives.
//!
//! A failure anywhere aborts the whole parse.
mod apache;
mod iis;

pub use apache::ModRewriteFileParser;
pub use iis::UrlRewriteFileParser;

use crate::error::ParseErrorKind;

/// Byte offset of the closing `quote`, skipping backslash escaped quotes.
pub(crate) fn end_quote(s: &str, start: usize, quote: char) -> Option<usize> {
    let mut backslashes = 0;
    for (i, c) in s[start..].char_indices() {
        if c == quote && backslashes % 2 == 0 {
            return Some(start + i);
        }
        match c == '\\' {
            true => backslashes += 1,
            false => backslashes = 0,
        }
    }
    None
}

/// Split a directive line on whitespace, honoring single and double quotes.
pub(crate) fn tokenize(s: &str) -> Result<Vec<String>, ParseErrorKind> {
    let mut tokens = Vec::new();
    let mut rest = s.trim_start();
    while let Some(first) = rest.chars().next() {
        if first == '"' || first == '\'' {
            let end = end_quote(rest, 1, first)
                .ok_or_else(|| ParseErrorKind::UnclosedQuotation(rest.to_owned()))?;
            tokens.push(rest[1..end].to_owned());
            rest = rest[end + 1..].trim_start();
            continue;
        }
        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        tokens.push(rest[..end].to_owned());
        rest = rest[end..].trim_start();
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize() {
        assert_eq!(
            tokenize("  RewriteRule ^(.*)$   /index?p=$1  [L]").unwrap(),
            vec!["RewriteRule", "^(.*)$", "/index?p=$1", "[L]"]
        );
        assert_eq!(
            tokenize(r#"RewriteCond %{HTTP_USER_AGENT} "Mozilla \"5\" x" [NC]"#).unwrap(),
            vec!["RewriteCond", "%{HTTP_USER_AGENT}", r#"Mozilla \"5\" x"#, "[NC]"]
        );
        assert_eq!(tokenize("a 'b c'").unwrap(), vec!["a", "b c"]);
        assert!(tokenize("").unwrap().is_empty());
    }

    #[test]
    fn test_unclosed_quote() {
        let err = tokenize(r#"RewriteRule "^/open /closed"#).unwrap_err();
        assert!(matches!(err, ParseErrorKind::UnclosedQuotation(_)));
    }
}
