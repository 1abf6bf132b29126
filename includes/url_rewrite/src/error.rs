use std::fmt;
use std::num::ParseIntError;

use thiserror::Error;

/// Error raised by a [`Delegate`](crate::action::Delegate) callback.
pub type DelegateError = Box<dyn std::error::Error + Send + Sync>;

/// Errors when running the rule pipeline against a request
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("delegate rule `{rule}` failed")]
    Delegate {
        rule: String,
        #[source]
        source: DelegateError,
    },
}

/// Errors when compiling a match pattern
#[derive(Debug, Error, PartialEq)]
pub enum PatternError {
    #[error("Invalid regex pattern `{pattern}`: {reason}")]
    InvalidRegex { pattern: String, reason: String },

    #[error("Invalid wildcard pattern `{0}`")]
    InvalidWildcard(String),

    #[error("Invalid integer operand `{0}`")]
    InvalidInteger(String),

    #[error("Invalid comparison expression `{0}`")]
    InvalidComparison(String),
}

/// Errors when parsing a template string into tokens
#[derive(Debug, Error, PartialEq)]
pub enum TemplateError {
    #[error("Unterminated token starting at offset {0}")]
    Unterminated(usize),

    #[error("Empty token at offset {0}")]
    EmptyToken(usize),

    #[error("Unknown template function `{0}`")]
    UnknownFunction(String),

    #[error("Invalid back-reference index `{0}`")]
    InvalidBackReference(String),

    #[error("Invalid server variable name `{0}`")]
    InvalidVariable(String),

    #[error("Unexpected character `{character}` at offset {offset}")]
    UnexpectedCharacter { character: char, offset: usize },

    #[error("Rewrite maps are not supported (offset {0})")]
    UnsupportedMap(usize),
}

/// Reason a configuration could not be parsed
#[derive(Debug, Error)]
pub enum ParseErrorKind {
    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed xml: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error("Root element must be <rewrite>, found <{0}>")]
    InvalidRoot(String),

    #[error("Missing required element <{0}>")]
    MissingElement(&'static str),

    #[error("Element <{0}> may only appear once")]
    DuplicateElement(&'static str),

    #[error("Unexpected element <{0}>")]
    UnexpectedElement(String),

    #[error("Missing required attribute `{attribute}` on <{element}>")]
    MissingAttribute {
        element: &'static str,
        attribute: &'static str,
    },

    #[error("Invalid value `{value}` for attribute `{attribute}`")]
    InvalidAttribute {
        attribute: &'static str,
        value: String,
    },

    #[error("Unknown action type `{0}`")]
    UnknownActionType(String),

    #[error("Invalid template: {0}")]
    Template(#[from] TemplateError),

    #[error("Invalid pattern: {0}")]
    Pattern(#[from] PatternError),

    #[error("Unknown directive `{0}`")]
    UnknownDirective(String),

    #[error("Directive is missing its {0}")]
    MissingArgument(&'static str),

    #[error("Unexpected trailing argument `{0}`")]
    UnexpectedArgument(String),

    #[error("Quotation never closed in `{0}`")]
    UnclosedQuotation(String),

    #[error("Flag definitions missing brackets `{0}`")]
    FlagsMissingBrackets(String),

    #[error("Flag list is empty")]
    FlagsEmpty,

    #[error("Flags used are mutually exclusive")]
    FlagsMutuallyExclusive,

    #[error("Invalid flag `{0}`")]
    InvalidFlag(String),

    #[error("Unsupported flag `{0}`")]
    UnsupportedFlag(String),

    #[error("Invalid number in flag definition: {0}")]
    InvalidNumber(#[from] ParseIntError),

    #[error("Invalid redirect status code `{0}`")]
    InvalidStatus(u16),

    #[error("Invalid RewriteEngine state `{0}`")]
    InvalidEngineState(String),

    #[error("RewriteCond is not followed by a RewriteRule")]
    DanglingCondition,
}

/// Where in the configuration a [`ParseError`] occurred
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Location {
    pub rule: Option<String>,
    pub line: Option<u32>,
    pub column: Option<u32>,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(rule) = &self.rule {
            parts.push(format!("rule `{rule}`"));
        }
        if let Some(line) = self.line {
            parts.push(format!("line {line}"));
        }
        if let Some(column) = self.column {
            parts.push(format!("column {column}"));
        }
        match parts.is_empty() {
            true => write!(f, "unknown location"),
            false => write!(f, "{}", parts.join(", ")),
        }
    }
}

/// Errors when parsing rewrite configuration.
///
/// Always aborts the whole load, a partial rule set is never produced.
#[derive(Debug, Error)]
#[error("{kind} ({location})")]
pub struct ParseError {
    #[source]
    pub kind: ParseErrorKind,
    pub location: Location,
}

impl ParseError {
    pub fn new<K: Into<ParseErrorKind>>(kind: K) -> Self {
        Self {
            kind: kind.into(),
            location: Location::default(),
        }
    }

    /// Attach the offending rule name
    pub fn rule(mut self, name: impl Into<String>) -> Self {
        self.location.rule = Some(name.into());
        self
    }

    /// Attach a line/column position
    pub fn at(mut self, line: u32, column: Option<u32>) -> Self {
        self.location.line = Some(line);
        self.location.column = column;
        self
    }
}

macro_rules! from_kind {
    ($($source:ty),*) => {
        $(
            impl From<$source> for ParseError {
                #[inline]
                fn from(value: $source) -> Self {
                    Self::new(value)
                }
            }
        )*
    };
}

from_kind!(
    ParseErrorKind,
    std::io::Error,
    roxmltree::Error,
    TemplateError,
    PatternError,
    ParseIntError
);
