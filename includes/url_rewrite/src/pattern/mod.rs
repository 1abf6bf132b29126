//! Compiled match patterns used by rules and conditions.
use std::sync::Arc;

mod compare;
mod regex;
mod wildcard;

pub use compare::{FileTest, IntegerOp, LexicalOp};
pub use regex::{AutomataCompiler, Captures, CompiledRegex, RegexCompiler, default_compiler};

use crate::error::PatternError;

/// Source syntax of a rule or condition pattern.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PatternSyntax {
    #[default]
    EcmaScript,
    Wildcard,
    ExactMatch,
}

/// Outcome of evaluating a [`Matcher`] against an input.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MatchResults {
    pub success: bool,
    pub captures: Captures,
}

impl MatchResults {
    #[inline]
    fn matched(captures: Captures) -> Self {
        Self {
            success: true,
            captures,
        }
    }

    #[inline]
    fn from_bool(success: bool) -> Self {
        Self {
            success,
            captures: Captures::default(),
        }
    }
}

/// Compiled matching strategy.
#[derive(Clone, Debug)]
pub enum MatchKind {
    /// Always succeeds with no captures
    Any,
    Regex(Arc<dyn CompiledRegex>),
    Exact(String),
    Lexical(LexicalOp, String),
    Integer(IntegerOp, i64),
    FileTest(FileTest),
}

impl PartialEq for MatchKind {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Any, Self::Any) => true,
            (Self::Regex(a), Self::Regex(b)) => {
                a.as_str() == b.as_str() && a.ignore_case() == b.ignore_case()
            }
            (Self::Exact(a), Self::Exact(b)) => a == b,
            (Self::Lexical(a, x), Self::Lexical(b, y)) => a == b && x == y,
            (Self::Integer(a, x), Self::Integer(b, y)) => a == b && x == y,
            (Self::FileTest(a), Self::FileTest(b)) => a == b,
            _ => false,
        }
    }
}

/// A compiled pattern with fixed case-sensitivity and optional negation.
#[derive(Clone, Debug, PartialEq)]
pub struct Matcher {
    kind: MatchKind,
    ignore_case: bool,
    negate: bool,
}

impl Matcher {
    /// Compile a pattern of the given syntax.
    ///
    /// Wildcards are translated into a regex exactly once, here.
    pub fn compile(
        compiler: &dyn RegexCompiler,
        pattern: &str,
        syntax: PatternSyntax,
        ignore_case: bool,
        negate: bool,
    ) -> Result<Self, PatternError> {
        let kind = match syntax {
            PatternSyntax::EcmaScript => MatchKind::Regex(compiler.compile(pattern, ignore_case)?),
            PatternSyntax::Wildcard => {
                let translated = wildcard::translate(pattern)?;
                MatchKind::Regex(compiler.compile(&translated, ignore_case)?)
            }
            PatternSyntax::ExactMatch => MatchKind::Exact(pattern.to_owned()),
        };
        Ok(Self {
            kind,
            ignore_case,
            negate,
        })
    }

    /// Build a matcher from an already compiled strategy.
    pub fn new(kind: MatchKind, ignore_case: bool, negate: bool) -> Self {
        Self {
            kind,
            ignore_case,
            negate,
        }
    }

    /// Matcher that succeeds for every input.
    pub fn any() -> Self {
        Self::new(MatchKind::Any, false, false)
    }

    #[inline]
    pub fn kind(&self) -> &MatchKind {
        &self.kind
    }

    #[inline]
    pub fn ignore_case(&self) -> bool {
        self.ignore_case
    }

    #[inline]
    pub fn is_negated(&self) -> bool {
        self.negate
    }

    /// Evaluate the input string.
    ///
    /// Negated matchers flip the result and never carry captures.
    pub fn evaluate(&self, input: &str) -> MatchResults {
        let result = match &self.kind {
            MatchKind::Any => MatchResults::from_bool(true),
            MatchKind::Regex(regex) => match regex.captures(input) {
                Some(captures) => MatchResults::matched(captures),
                None => MatchResults::from_bool(false),
            },
            MatchKind::Exact(value) => {
                let success = match self.ignore_case {
                    true => unicase::eq(input, value.as_str()),
                    false => input == value,
                };
                match success {
                    true => MatchResults::matched(Captures::new(vec![input.to_owned()])),
                    false => MatchResults::from_bool(false),
                }
            }
            MatchKind::Lexical(op, operand) => {
                MatchResults::from_bool(op.compare(input, operand, self.ignore_case))
            }
            MatchKind::Integer(op, operand) => MatchResults::from_bool(op.compare(input, *operand)),
            MatchKind::FileTest(test) => MatchResults::from_bool(test.matches(input)),
        };
        match self.negate {
            true => MatchResults::from_bool(!result.success),
            false => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn regex(pattern: &str, ignore_case: bool, negate: bool) -> Matcher {
        Matcher::compile(
            &AutomataCompiler,
            pattern,
            PatternSyntax::EcmaScript,
            ignore_case,
            negate,
        )
        .unwrap()
    }

    #[test]
    fn test_negation() {
        let matcher = regex("^OFF$", false, true);
        assert!(!matcher.evaluate("OFF").success);
        let result = matcher.evaluate("ON");
        assert!(result.success);
        assert!(result.captures.is_empty());
    }

    #[test]
    fn test_captures() {
        let matcher = regex(r"^article/([0-9]+)/([_0-9a-z-]+)", false, false);
        let result = matcher.evaluate("article/123/my-title");
        assert!(result.success);
        assert_eq!(result.captures.get(1), "123");
        assert_eq!(result.captures.get(2), "my-title");
    }

    #[test]
    fn test_case_fixed_at_compile() {
        assert!(regex("^/Admin", true, false).evaluate("/admin").success);
        assert!(!regex("^/Admin", false, false).evaluate("/admin").success);
    }

    #[test]
    fn test_wildcard() {
        let matcher = Matcher::compile(
            &AutomataCompiler,
            "blog/*/*.html",
            PatternSyntax::Wildcard,
            true,
            false,
        )
        .unwrap();
        let result = matcher.evaluate("Blog/2024/post.html");
        assert!(result.success);
        assert_eq!(result.captures.get(1), "2024");
        assert_eq!(result.captures.get(2), "post");
        assert!(!matcher.evaluate("blog/post.htm").success);

        let err = Matcher::compile(
            &AutomataCompiler,
            "blog\\",
            PatternSyntax::Wildcard,
            true,
            false,
        );
        assert!(matches!(err, Err(PatternError::InvalidWildcard(_))));
    }

    #[test]
    fn test_exact() {
        let matcher = Matcher::compile(
            &AutomataCompiler,
            "index.html",
            PatternSyntax::ExactMatch,
            true,
            false,
        )
        .unwrap();
        assert!(matcher.evaluate("INDEX.html").success);
        assert!(!matcher.evaluate("index.htm").success);
    }

    #[test]
    fn test_equality() {
        assert_eq!(regex("^a$", true, false), regex("^a$", true, false));
        assert_ne!(regex("^a$", true, false), regex("^a$", false, false));
        assert_ne!(regex("^a$", true, false), regex("^a$", true, true));
    }
}
