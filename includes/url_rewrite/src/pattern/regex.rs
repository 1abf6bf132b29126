//! Injectable regular-expression capability.
//!
//! Any [`RegexCompiler`] must provide numbered capture groups (group `0` is the
//! whole match), `^`/`$` anchors and a case-insensitive compile flag. The
//! default [`AutomataCompiler`] is backed by `regex-automata`'s meta engine.

use std::fmt::Debug;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex_automata::{
    MatchKind,
    meta::{self, Regex},
    util,
};

use crate::error::PatternError;

static DEFAULT: Lazy<Arc<dyn RegexCompiler>> = Lazy::new(|| Arc::new(AutomataCompiler));

/// Shared handle to the default [`AutomataCompiler`].
#[inline]
pub fn default_compiler() -> Arc<dyn RegexCompiler> {
    Arc::clone(&DEFAULT)
}

/// Capture groups produced by a successful match.
///
/// Groups that did not participate in the match are stored as empty strings
/// and indexes past the end resolve to an empty string.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Captures(Vec<String>);

impl Captures {
    pub fn new(groups: Vec<String>) -> Self {
        Self(groups)
    }

    /// Retrieve group `index` or an empty string when out of range.
    #[inline]
    pub fn get(&self, index: usize) -> &str {
        self.0.get(index).map(|s| s.as_str()).unwrap_or("")
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|s| s.as_str())
    }

    pub(crate) fn extend<'a>(&mut self, groups: impl Iterator<Item = &'a str>) {
        self.0.extend(groups.map(|s| s.to_owned()));
    }
}

impl<S: Into<String>> FromIterator<S> for Captures {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// A compiled regular expression.
pub trait CompiledRegex: Debug + Send + Sync {
    /// Original pattern source the expression was compiled from
    fn as_str(&self) -> &str;

    /// Whether the expression was compiled case-insensitive
    fn ignore_case(&self) -> bool;

    /// Match `input`, returning every capture group on success.
    fn captures(&self, input: &str) -> Option<Captures>;
}

/// Compiles pattern sources into [`CompiledRegex`] instances.
pub trait RegexCompiler: Debug + Send + Sync {
    fn compile(
        &self,
        pattern: &str,
        ignore_case: bool,
    ) -> Result<Arc<dyn CompiledRegex>, PatternError>;
}

/// [`RegexCompiler`] backed by [`regex_automata::meta::Regex`].
#[derive(Clone, Copy, Debug, Default)]
pub struct AutomataCompiler;

impl RegexCompiler for AutomataCompiler {
    fn compile(
        &self,
        pattern: &str,
        ignore_case: bool,
    ) -> Result<Arc<dyn CompiledRegex>, PatternError> {
        let regex = Regex::builder()
            .configure(
                meta::Config::new()
                    .nfa_size_limit(Some(10 * (1 << 20)))
                    .hybrid_cache_capacity(2 * (1 << 20))
                    .match_kind(MatchKind::LeftmostFirst)
                    .utf8_empty(true),
            )
            .syntax(util::syntax::Config::new().case_insensitive(ignore_case))
            .build(pattern)
            .map_err(|err| PatternError::InvalidRegex {
                pattern: pattern.to_owned(),
                reason: err.to_string(),
            })?;
        Ok(Arc::new(AutomataRegex {
            source: pattern.to_owned(),
            ignore_case,
            regex,
        }))
    }
}

#[derive(Debug)]
struct AutomataRegex {
    source: String,
    ignore_case: bool,
    regex: Regex,
}

impl CompiledRegex for AutomataRegex {
    fn as_str(&self) -> &str {
        &self.source
    }

    fn ignore_case(&self) -> bool {
        self.ignore_case
    }

    fn captures(&self, input: &str) -> Option<Captures> {
        let mut caps = self.regex.create_captures();
        self.regex.captures(input, &mut caps);
        if !caps.is_match() {
            return None;
        }
        Some(
            caps.iter()
                .map(|span| span.map(|span| &input[span]).unwrap_or(""))
                .collect(),
        )
    }
}
