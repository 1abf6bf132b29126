use std::io::Read;
use std::str::FromStr;
use std::sync::Arc;

use super::tokenize;
use crate::action::{Action, QueryStringPolicy};
use crate::conditions::{Condition, Conditions};
use crate::error::{ParseError, ParseErrorKind, PatternError};
use crate::extra::State;
use crate::pattern::{
    FileTest, IntegerOp, LexicalOp, MatchKind, Matcher, PatternSyntax, RegexCompiler,
    default_compiler,
};
use crate::rule::Rule;
use crate::template::{InputParser, Template};

/// Parser for `mod_rewrite` style directives.
///
/// Supports `RewriteEngine`, `RewriteCond` and `RewriteRule`. Conditions
/// attach to the next rule, `RewriteEngine off` disables every rule that
/// follows until it is switched back on.
///
/// # Example
///
/// ```
/// use url_rewrite::ModRewriteFileParser;
///
/// let rules = ModRewriteFileParser::new()
///     .parse(r#"
///         # legacy blog
///         RewriteCond %{HTTP_HOST} ^www\.(.+)$ [NC]
///         RewriteRule ^/blog/(.*)$ /posts/$1  [L]
///         RewriteRule ^/private   -           [F]
///     "#)
///     .expect("failed to parse rules");
/// assert_eq!(rules.len(), 2);
/// ```
#[derive(Clone, Debug)]
pub struct ModRewriteFileParser {
    compiler: Arc<dyn RegexCompiler>,
}

impl Default for ModRewriteFileParser {
    fn default() -> Self {
        Self {
            compiler: default_compiler(),
        }
    }
}

impl ModRewriteFileParser {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile patterns with a custom regex implementation.
    pub fn with_compiler(compiler: Arc<dyn RegexCompiler>) -> Self {
        Self { compiler }
    }

    /// Read the whole reader into memory and [`parse`](Self::parse) it.
    pub fn parse_reader<R: Read>(&self, mut reader: R) -> Result<Vec<Rule>, ParseError> {
        let mut text = String::new();
        reader.read_to_string(&mut text)?;
        self.parse(&text)
    }

    /// Parse directive text into an ordered rule list.
    pub fn parse(&self, text: &str) -> Result<Vec<Rule>, ParseError> {
        let mut rules = Vec::new();
        let mut pending = Vec::new();
        let mut pending_line = 0;
        let mut state = State::On;
        for (index, line) in text.lines().enumerate() {
            let number = index as u32 + 1;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let at = |kind: ParseErrorKind| ParseError::new(kind).at(number, None);
            let tokens = tokenize(line).map_err(at)?;
            let Some((directive, args)) = tokens.split_first() else {
                continue;
            };
            match directive.to_lowercase().as_str() {
                "rewriteengine" => {
                    let [value] = args else {
                        return Err(at(arity(args, "engine state")));
                    };
                    state = State::from_str(value).map_err(at)?;
                }
                "rewritecond" => {
                    pending.push(self.condition(args).map_err(at)?);
                    pending_line = number;
                }
                "rewriterule" => {
                    let conditions = Conditions::new(std::mem::take(&mut pending));
                    let rule = self
                        .rule(args, number)
                        .map_err(at)?
                        .enabled(state == State::On)
                        .conditions(conditions);
                    rules.push(rule);
                }
                _ => return Err(at(ParseErrorKind::UnknownDirective(directive.to_owned()))),
            }
        }
        if !pending.is_empty() {
            return Err(ParseError::new(ParseErrorKind::DanglingCondition).at(pending_line, None));
        }
        tracing::debug!(rules = rules.len(), "parsed mod_rewrite directives");
        Ok(rules)
    }

    /// `RewriteCond <input> <pattern> [operand] [flags]`
    fn condition(&self, args: &[String]) -> Result<Condition, ParseErrorKind> {
        let mut args = args.iter().peekable();
        let input = args.next().ok_or(ParseErrorKind::MissingArgument("test string"))?;
        let pattern = args.next().ok_or(ParseErrorKind::MissingArgument("condition pattern"))?;

        let (negate, pattern) = match pattern.strip_prefix('!') {
            Some(pattern) => (true, pattern),
            None => (false, pattern.as_str()),
        };
        let operand = match IntegerOp::from_str(pattern) {
            Ok(_) => Some(
                args.next()
                    .ok_or(ParseErrorKind::MissingArgument("comparison operand"))?,
            ),
            Err(_) => None,
        };
        let flags = match args.next() {
            Some(flags) => CondFlags::from_str(flags)?,
            None => CondFlags::default(),
        };
        if let Some(next) = args.next() {
            return Err(ParseErrorKind::UnexpectedArgument(next.to_owned()));
        }

        let kind = match (LexicalOp::split(pattern), operand) {
            (_, Some(operand)) => {
                let value = operand
                    .parse()
                    .map_err(|_| PatternError::InvalidInteger(operand.to_owned()))?;
                Some(MatchKind::Integer(IntegerOp::from_str(pattern)?, value))
            }
            (Some((op, operand)), None) => Some(MatchKind::Lexical(op, operand.to_owned())),
            (None, None) => FileTest::from_str(pattern).ok().map(MatchKind::FileTest),
        };
        let matcher = match kind {
            Some(kind) => Matcher::new(kind, flags.nocase, negate),
            None => Matcher::compile(
                self.compiler.as_ref(),
                pattern,
                PatternSyntax::EcmaScript,
                flags.nocase,
                negate,
            )?,
        };
        let input = InputParser::parse_directive(input)?;
        Ok(Condition::new(input, matcher).or_next(flags.or_next))
    }

    /// `RewriteRule <pattern> <substitution> [flags]`
    fn rule(&self, args: &[String], line: u32) -> Result<Rule, ParseErrorKind> {
        let (pattern, substitution, flags) = match args {
            [pattern, substitution] => (pattern, substitution, RuleFlags::default()),
            [pattern, substitution, flags] => (pattern, substitution, RuleFlags::from_str(flags)?),
            [_, _, _, next, ..] => return Err(ParseErrorKind::UnexpectedArgument(next.to_owned())),
            [] => return Err(ParseErrorKind::MissingArgument("rule pattern")),
            [_] => return Err(ParseErrorKind::MissingArgument("substitution")),
        };
        let (negate, pattern) = match pattern.strip_prefix('!') {
            Some(pattern) => (true, pattern),
            None => (false, pattern.as_str()),
        };
        let matcher = Matcher::compile(
            self.compiler.as_ref(),
            pattern,
            PatternSyntax::EcmaScript,
            flags.nocase,
            negate,
        )?;

        let url = match substitution.as_str() {
            "-" => None,
            s => Some(InputParser::parse_directive(s)?),
        };
        let action = flags.action(url)?;
        Ok(Rule::new(format!("line {line}"), matcher, action)
            .relative(false)
            .stop_processing(flags.last)
            .escape_back_references(flags.escape))
    }
}

#[inline]
fn arity(args: &[String], missing: &'static str) -> ParseErrorKind {
    match args.get(1) {
        Some(next) => ParseErrorKind::UnexpectedArgument(next.to_owned()),
        None => ParseErrorKind::MissingArgument(missing),
    }
}

/// Strip the surrounding brackets of a flag list and split its items.
fn flag_items(s: &str) -> Result<Vec<&str>, ParseErrorKind> {
    let inner = s
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .ok_or_else(|| ParseErrorKind::FlagsMissingBrackets(s.to_owned()))?;
    let items: Vec<&str> = inner
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();
    match items.is_empty() {
        true => Err(ParseErrorKind::FlagsEmpty),
        false => Ok(items),
    }
}

/// Supported `RewriteCond` flags.
#[derive(Debug, Default)]
struct CondFlags {
    nocase: bool,
    or_next: bool,
}

impl FromStr for CondFlags {
    type Err = ParseErrorKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut flags = Self::default();
        for flag in flag_items(s)? {
            match flag.to_lowercase().as_str() {
                "nc" | "nocase" => flags.nocase = true,
                "or" | "ornext" => flags.or_next = true,
                "nv" | "novary" => {
                    return Err(ParseErrorKind::UnsupportedFlag(flag.to_owned()));
                }
                _ => return Err(ParseErrorKind::InvalidFlag(flag.to_owned())),
            }
        }
        Ok(flags)
    }
}

/// Final http-response resolution declared by a rule flag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Resolve {
    Redirect(u16),
    Status(u16),
}

/// Supported `RewriteRule` flags.
#[derive(Debug, Default)]
struct RuleFlags {
    nocase: bool,
    last: bool,
    escape: bool,
    append: bool,
    discard: bool,
    resolve: Option<Resolve>,
}

impl RuleFlags {
    /// Build the rule action from the parsed substitution and flags.
    fn action(&self, url: Option<Template>) -> Result<Action, ParseErrorKind> {
        let query_string = match (self.append, self.discard) {
            (_, true) => QueryStringPolicy::Discard,
            (true, _) => QueryStringPolicy::Append,
            _ => QueryStringPolicy::Preserve,
        };
        Ok(match (self.resolve, url) {
            (Some(Resolve::Status(status_code)), _) => Action::CustomResponse {
                status_code,
                reason: None,
            },
            (Some(Resolve::Redirect(_)), None) => {
                return Err(ParseErrorKind::MissingArgument("redirect target"));
            }
            (Some(Resolve::Redirect(status_code)), Some(url)) => Action::Redirect {
                url,
                status_code,
                query_string,
            },
            (None, Some(url)) => Action::Rewrite { url, query_string },
            (None, None) => Action::None,
        })
    }

    fn set_resolve(&mut self, resolve: Resolve) -> Result<(), ParseErrorKind> {
        match self.resolve.replace(resolve) {
            Some(_) => Err(ParseErrorKind::FlagsMutuallyExclusive),
            None => Ok(()),
        }
    }
}

impl FromStr for RuleFlags {
    type Err = ParseErrorKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut flags = Self::default();
        for flag in flag_items(s)? {
            let (p, s) = match flag.split_once('=') {
                Some((prefix, suffix)) => (prefix, suffix),
                None => (flag, ""),
            };
            match p.to_lowercase().as_str() {
                "nc" | "nocase" => flags.nocase = true,
                "l" | "last" | "end" => flags.last = true,
                "b" => flags.escape = true,
                "ne" | "noescape" => {}
                "qsa" | "qsappend" => flags.append = true,
                "qsd" | "qsdiscard" => flags.discard = true,
                "r" | "redirect" => flags.set_resolve(Resolve::Redirect(parse_status(s, 302)?))?,
                "f" | "forbidden" => flags.set_resolve(Resolve::Status(403))?,
                "g" | "gone" => flags.set_resolve(Resolve::Status(410))?,
                "n" | "next" | "s" | "skip" | "c" | "chain" | "co" | "cookie" | "e" | "env"
                | "h" | "handler" | "p" | "proxy" | "pt" | "passthrough" | "t" | "type"
                | "ns" | "nosubreq" | "qsl" | "qslast" | "dpi" | "discardpath" => {
                    return Err(ParseErrorKind::UnsupportedFlag(flag.to_owned()));
                }
                _ => return Err(ParseErrorKind::InvalidFlag(flag.to_owned())),
            }
        }
        if flags.append && flags.discard {
            return Err(ParseErrorKind::FlagsMutuallyExclusive);
        }
        Ok(flags)
    }
}

#[inline]
fn parse_status(s: &str, default: u16) -> Result<u16, ParseErrorKind> {
    let status = match s.is_empty() {
        true => default,
        false => u16::from_str(s)?,
    };
    match (300..400).contains(&status) {
        true => Ok(status),
        false => Err(ParseErrorKind::InvalidStatus(status)),
    }
}
