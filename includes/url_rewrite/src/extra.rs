use std::str::FromStr;

use crate::error::ParseErrorKind;

#[inline]
pub(crate) fn split_query(uri: &str) -> (String, &str) {
    uri.split_once('?')
        .map(|(b, q)| (b.to_owned(), q))
        .unwrap_or_else(|| (uri.to_owned(), ""))
}

#[inline]
pub(crate) fn join_query(mut uri: String, query: &str) -> String {
    if query.is_empty() {
        return uri;
    }
    match uri.contains('?') {
        true => uri.push('&'),
        false => uri.push('?'),
    }
    uri.push_str(query);
    uri
}

/// Concatenate two query strings, either may be empty.
#[inline]
pub(crate) fn merge_query(first: &str, second: &str) -> String {
    match (first.is_empty(), second.is_empty()) {
        (true, _) => second.to_owned(),
        (_, true) => first.to_owned(),
        _ => format!("{first}&{second}"),
    }
}

/// Singular `RewriteEngine` directive.
///
/// Enables/disables every rule that follows it until the next
/// `RewriteEngine` directive.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum State {
    #[default]
    On,
    Off,
}

impl FromStr for State {
    type Err = ParseErrorKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "on" => Ok(Self::On),
            "off" => Ok(Self::Off),
            _ => Err(ParseErrorKind::InvalidEngineState(s.to_owned())),
        }
    }
}
