//! Non-regex condition patterns: lexical and integer comparisons plus
//! file attribute tests.

use std::cmp::Ordering;
use std::path::Path;
use std::str::FromStr;

use unicase::UniCase;

use crate::error::PatternError;

/// Lexicographic `CondPattern` operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LexicalOp {
    Less,
    Greater,
    Equal,
    LessOrEqual,
    GreaterOrEqual,
}

impl LexicalOp {
    /// Split an operator prefix from its operand, eg. `>=abc`.
    pub(crate) fn split(expr: &str) -> Option<(Self, &str)> {
        [
            ("<=", Self::LessOrEqual),
            (">=", Self::GreaterOrEqual),
            ("<", Self::Less),
            (">", Self::Greater),
            ("=", Self::Equal),
        ]
        .into_iter()
        .find_map(|(prefix, op)| expr.strip_prefix(prefix).map(|rest| (op, rest)))
    }

    /// Compare `input` against `operand` according to the operator.
    pub fn compare(&self, input: &str, operand: &str, ignore_case: bool) -> bool {
        let order = match ignore_case {
            true => UniCase::new(input).cmp(&UniCase::new(operand)),
            false => input.cmp(operand),
        };
        match self {
            Self::Less => order == Ordering::Less,
            Self::Greater => order == Ordering::Greater,
            Self::Equal => order == Ordering::Equal,
            Self::LessOrEqual => order != Ordering::Greater,
            Self::GreaterOrEqual => order != Ordering::Less,
        }
    }
}

/// Integer comparison operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IntegerOp {
    Equal,
    GreaterThan,
    GreaterOrEqual,
    LesserThan,
    LesserOrEqual,
    NotEqual,
}

impl IntegerOp {
    /// Evaluate integer expression, non-numeric input never matches.
    pub fn compare(&self, input: &str, operand: i64) -> bool {
        let Ok(input) = input.trim().parse::<i64>() else {
            return false;
        };
        match self {
            Self::Equal => input == operand,
            Self::GreaterThan => input > operand,
            Self::GreaterOrEqual => input >= operand,
            Self::LesserThan => input < operand,
            Self::LesserOrEqual => input <= operand,
            Self::NotEqual => input != operand,
        }
    }
}

impl FromStr for IntegerOp {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "-eq" => Ok(Self::Equal),
            "-gt" => Ok(Self::GreaterThan),
            "-ge" => Ok(Self::GreaterOrEqual),
            "-lt" => Ok(Self::LesserThan),
            "-le" => Ok(Self::LesserOrEqual),
            "-ne" => Ok(Self::NotEqual),
            _ => Err(PatternError::InvalidComparison(s.to_owned())),
        }
    }
}

/// File attribute-test expression definition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileTest {
    Dir,
    File,
    Symbolic,
    SizedFile,
    Executable,
}

impl FileTest {
    /// Evaluate the attribute test against the filesystem.
    pub fn matches(&self, path: &str) -> bool {
        let path = Path::new(path);
        match self {
            Self::Dir => path.is_dir(),
            Self::File => path.is_file(),
            Self::Symbolic => path.is_symlink(),
            Self::SizedFile => path.metadata().is_ok_and(|m| m.is_file() && m.len() > 0),
            Self::Executable => is_executable(path),
        }
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .is_ok_and(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

impl FromStr for FileTest {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "-d" => Ok(Self::Dir),
            "-f" => Ok(Self::File),
            "-h" | "-l" | "-L" => Ok(Self::Symbolic),
            "-s" => Ok(Self::SizedFile),
            "-x" => Ok(Self::Executable),
            _ => Err(PatternError::InvalidComparison(s.to_owned())),
        }
    }
}
