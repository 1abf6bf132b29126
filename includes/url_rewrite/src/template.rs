//! Template strings mixing literal text with server variables,
//! back-references and functions.
//!
//! Two front-end syntaxes produce the same [`Template`]:
//!
//! * IIS: `{HTTP_HOST}`, `{R:1}`, `{C:1}`, `{ToLower:{R:1}}`
//! * mod_rewrite: `%{HTTP_HOST}`, `$1`, `%1`
//!
//! All syntax errors surface while parsing. Evaluation never fails.
use std::iter::Peekable;
use std::str::CharIndices;

use percent_encoding::{AsciiSet, CONTROLS, percent_decode_str, utf8_percent_encode};

use crate::context::RewriteContext;
use crate::error::TemplateError;
use crate::pattern::Captures;

// https://url.spec.whatwg.org/#percent-encoded-bytes
const ESCAPE: &AsciiSet = &CONTROLS
    .add(b'~')
    .add(b' ') // fragment encoding
    .add(b'\'')
    .add(b'"')
    .add(b'`')
    .add(b'#') // query encoding
    .add(b'<')
    .add(b'>')
    .add(b'?') // path encoding
    .add(b'^')
    .add(b'{')
    .add(b'}')
    .add(b'/') // user-info encoding
    .add(b':')
    .add(b';')
    .add(b'=')
    .add(b'@')
    .add(b'[')
    .add(b']')
    .add(b'$') // component encoding
    .add(b'%')
    .add(b'&')
    .add(b'+')
    .add(b',');

/// Percent-encode a url component.
#[inline]
pub(crate) fn url_encode(s: &str) -> String {
    utf8_percent_encode(s, ESCAPE).to_string()
}

/// Captures visible to a single rule while its action is resolved.
#[derive(Clone, Debug, Default)]
pub struct BackReferences {
    rule: Captures,
    condition: Captures,
    escape: bool,
}

impl BackReferences {
    pub fn new(rule: Captures, condition: Captures) -> Self {
        Self {
            rule,
            condition,
            escape: false,
        }
    }

    /// Percent-encode back-reference values when they are substituted.
    pub fn escaped(mut self, escape: bool) -> Self {
        self.escape = escape;
        self
    }

    #[inline]
    pub fn rule(&self) -> &Captures {
        &self.rule
    }

    #[inline]
    pub fn condition(&self) -> &Captures {
        &self.condition
    }

    fn push(&self, value: &str, dst: &mut String) {
        match self.escape {
            true => dst.push_str(&url_encode(value)),
            false => dst.push_str(value),
        }
    }
}

/// Function applied to the evaluated value of a nested template.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Function {
    ToLower,
    UrlEncode,
    UrlDecode,
}

impl Function {
    fn apply(&self, value: String) -> String {
        match self {
            Self::ToLower => value.to_lowercase(),
            Self::UrlEncode => url_encode(&value),
            Self::UrlDecode => percent_decode_str(&value).decode_utf8_lossy().into_owned(),
        }
    }
}

/// Single parsed token of a [`Template`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    ServerVariable(String),
    RuleBackReference(usize),
    ConditionBackReference(usize),
    Function(Function, Template),
}

/// Parsed template, evaluated lazily against a request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    /// Template consisting of literal text only.
    pub fn literal<S: Into<String>>(text: S) -> Self {
        Self {
            segments: vec![Segment::Literal(text.into())],
        }
    }

    #[inline]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Resolve every token and concatenate the result.
    ///
    /// Out-of-range back-references resolve to an empty string.
    pub fn evaluate(&self, ctx: &RewriteContext, refs: &BackReferences) -> String {
        let mut dst = String::new();
        self.write(ctx, refs, &mut dst);
        dst
    }

    fn write(&self, ctx: &RewriteContext, refs: &BackReferences, dst: &mut String) {
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => dst.push_str(text),
                Segment::ServerVariable(name) => dst.push_str(&ctx.server_variable(name)),
                Segment::RuleBackReference(index) => refs.push(refs.rule.get(*index), dst),
                Segment::ConditionBackReference(index) => {
                    refs.push(refs.condition.get(*index), dst)
                }
                Segment::Function(function, inner) => {
                    dst.push_str(&function.apply(inner.evaluate(ctx, refs)))
                }
            }
        }
    }
}

/// Parses template strings into [`Template`] instances.
pub struct InputParser;

impl InputParser {
    /// Parse an IIS style template: `{VAR}`, `{R:n}`, `{C:n}` and
    /// `{ToLower|UrlEncode|UrlDecode:...}`.
    pub fn parse_input_string(input: &str) -> Result<Template, TemplateError> {
        let mut chars = input.char_indices().peekable();
        parse_braced(&mut chars, None)
    }

    /// Parse a mod_rewrite style template: `%{VAR}`, `$n`, `%n`, with `\`
    /// escaping the next character.
    pub fn parse_directive(input: &str) -> Result<Template, TemplateError> {
        let mut builder = SegmentBuilder::default();
        let mut chars = input.char_indices().peekable();
        while let Some((offset, c)) = chars.next() {
            match c {
                '\\' => match chars.next() {
                    Some((_, escaped)) => builder.push_char(escaped),
                    None => builder.push_char('\\'),
                },
                '$' => match chars.peek().copied() {
                    Some((_, d)) if d.is_ascii_digit() => {
                        chars.next();
                        builder.push(Segment::RuleBackReference(digit(d)));
                    }
                    Some((_, '{')) => return Err(TemplateError::UnsupportedMap(offset)),
                    _ => builder.push_char('$'),
                },
                '%' => match chars.peek().copied() {
                    Some((_, d)) if d.is_ascii_digit() => {
                        chars.next();
                        builder.push(Segment::ConditionBackReference(digit(d)));
                    }
                    Some((_, '{')) => {
                        chars.next();
                        let name = read_until_close(&mut chars, offset)?;
                        builder.push(Segment::ServerVariable(validate_variable(
                            name, offset, true,
                        )?));
                    }
                    _ => builder.push_char('%'),
                },
                c => builder.push_char(c),
            }
        }
        Ok(builder.finish())
    }
}

type Chars<'a> = Peekable<CharIndices<'a>>;

#[derive(Default)]
struct SegmentBuilder {
    segments: Vec<Segment>,
    literal: String,
}

impl SegmentBuilder {
    #[inline]
    fn push_char(&mut self, c: char) {
        self.literal.push(c);
    }

    fn push(&mut self, segment: Segment) {
        self.flush();
        self.segments.push(segment);
    }

    fn flush(&mut self) {
        if !self.literal.is_empty() {
            let literal = std::mem::take(&mut self.literal);
            self.segments.push(Segment::Literal(literal));
        }
    }

    fn finish(mut self) -> Template {
        self.flush();
        Template {
            segments: self.segments,
        }
    }
}

#[inline]
fn digit(c: char) -> usize {
    c.to_digit(10).unwrap_or_default() as usize
}

/// Parse literal text and `{...}` tokens until the end of input, or until
/// the `}` closing the function opened at `open`.
fn parse_braced(chars: &mut Chars, open: Option<usize>) -> Result<Template, TemplateError> {
    let mut builder = SegmentBuilder::default();
    while let Some((offset, c)) = chars.next() {
        match c {
            '{' => {
                let segment = parse_token(chars, offset)?;
                builder.push(segment);
            }
            '}' if open.is_some() => return Ok(builder.finish()),
            c => builder.push_char(c),
        }
    }
    match open {
        Some(start) => Err(TemplateError::Unterminated(start)),
        None => Ok(builder.finish()),
    }
}

fn parse_token(chars: &mut Chars, start: usize) -> Result<Segment, TemplateError> {
    let mut name = String::new();
    loop {
        match chars.next() {
            None => return Err(TemplateError::Unterminated(start)),
            Some((_, '}')) => {
                if name.is_empty() {
                    return Err(TemplateError::EmptyToken(start));
                }
                return Ok(Segment::ServerVariable(validate_variable(
                    name, start, false,
                )?));
            }
            Some((_, ':')) => break,
            Some((offset, '{')) => {
                return Err(TemplateError::UnexpectedCharacter {
                    character: '{',
                    offset,
                });
            }
            Some((_, c)) => name.push(c),
        }
    }
    let function = match name.to_ascii_lowercase().as_str() {
        "r" => return Ok(Segment::RuleBackReference(back_reference(chars, start)?)),
        "c" => return Ok(Segment::ConditionBackReference(back_reference(chars, start)?)),
        "tolower" => Function::ToLower,
        "urlencode" => Function::UrlEncode,
        "urldecode" => Function::UrlDecode,
        "" => return Err(TemplateError::EmptyToken(start)),
        _ => return Err(TemplateError::UnknownFunction(name)),
    };
    let inner = parse_braced(chars, Some(start))?;
    Ok(Segment::Function(function, inner))
}

fn back_reference(chars: &mut Chars, start: usize) -> Result<usize, TemplateError> {
    let index = read_until_close(chars, start)?;
    index
        .trim()
        .parse::<usize>()
        .map_err(|_| TemplateError::InvalidBackReference(index))
}

fn read_until_close(chars: &mut Chars, start: usize) -> Result<String, TemplateError> {
    let mut value = String::new();
    for (_, c) in chars.by_ref() {
        if c == '}' {
            return Ok(value);
        }
        value.push(c);
    }
    Err(TemplateError::Unterminated(start))
}

fn validate_variable(
    name: String,
    start: usize,
    allow_prefix: bool,
) -> Result<String, TemplateError> {
    if name.is_empty() {
        return Err(TemplateError::EmptyToken(start));
    }
    let valid = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || (allow_prefix && c == ':'));
    match valid {
        true => Ok(name),
        false => Err(TemplateError::InvalidVariable(name)),
    }
}
