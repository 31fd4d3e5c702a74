//! Diagnostics produced while assembling a program.
//!
//! Mirrors the layering the rest of the crate uses for every other concern: a small
//! enum for the thing that actually went wrong (`ParseError`, wrapping the pest
//! grammar's own error type plus numeric-literal failures), and a `Diagnostic` that
//! adds the severity (`Kind`) and source-location context the driver attaches once it
//! knows which `Instruction` was active.

use crate::expr::Rule;
use std::fmt;
use std::num::ParseIntError;

/// Severity of a diagnostic. Only `Error` is always fatal; `Warning` is fatal when
/// the driver is running in strict mode, and `Notice` never is.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Kind {
    Notice,
    Warning,
    Error,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Kind::Notice => "notice",
            Kind::Warning => "warning",
            Kind::Error => "error",
        })
    }
}

/// Failure from the expression grammar: either pest itself rejected the text, or a
/// numeric literal inside it didn't fit its target type.
#[derive(Clone, Debug)]
pub enum ParseError {
    Pest(Box<pest::error::Error<Rule>>),
    ParseInt(ParseIntError),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Pest(err) => write!(f, "{err}"),
            ParseError::ParseInt(err) => write!(f, "{err}"),
        }
    }
}

impl From<pest::error::Error<Rule>> for ParseError {
    fn from(err: pest::error::Error<Rule>) -> ParseError {
        ParseError::Pest(Box::new(err))
    }
}

impl From<ParseIntError> for ParseError {
    fn from(err: ParseIntError) -> ParseError {
        ParseError::ParseInt(err)
    }
}

/// The `(file, line, block, statement)` provenance of a diagnostic, copied from the
/// `Instruction` that was active when it was raised.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Location {
    pub file: String,
    pub line: u32,
    pub block: u32,
    pub statement: String,
}

/// A notice, warning or error ready to be printed to stderr in the format fixed by
/// the CLI-level contract: `kind: message\n<file>:<line>:<block>: <statement>\n`.
#[derive(Clone, Debug)]
pub struct Diagnostic {
    pub kind: Kind,
    pub message: String,
    pub location: Option<Location>,
}

impl Diagnostic {
    pub fn new(kind: Kind, message: impl Into<String>, location: Option<Location>) -> Self {
        Diagnostic { kind, message: message.into(), location }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}: {}", self.kind, self.message)?;
        if let Some(loc) = &self.location {
            writeln!(f, "{}:{}:{}: {}", loc.file, loc.line, loc.block, loc.statement)?;
        }
        Ok(())
    }
}

pub type Result<T> = std::result::Result<T, Diagnostic>;
