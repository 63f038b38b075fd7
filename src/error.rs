use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Error structure representing the basic error scenarios for `pg_analyze`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// The statement is invalid: unknown names, type mismatches, disallowed clause combinations.
    #[error("{0}")]
    Statement(Diagnostic),
    /// An invariant that earlier validation should have guaranteed does not hold.
    #[error("{0}")]
    Internal(String),
    /// Nesting exceeded the configured maximum depth.
    #[error("statement is too complex: nesting depth exceeds {depth}")]
    TooComplex { depth: usize },
    /// The SQL parser handed to the analyzer rejected embedded SQL text.
    #[error("Invalid statement: {0}")]
    Parse(String),
    /// Analyzer configuration could not be loaded.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Convenient Result alias for returning `pg_analyze::Error`.
pub type Result<T> = core::result::Result<T, Error>;

impl From<Diagnostic> for Error {
    fn from(diagnostic: Diagnostic) -> Self {
        Error::Statement(diagnostic)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Config(e.to_string())
    }
}

impl Error {
    /// The diagnostic attached to a statement error, if this is one.
    pub fn diagnostic(&self) -> Option<&Diagnostic> {
        match self {
            Error::Statement(d) => Some(d),
            _ => None,
        }
    }

    /// The SQLSTATE code of this error.
    pub fn code(&self) -> SqlState {
        match self {
            Error::Statement(d) => d.code,
            Error::TooComplex { .. } => SqlState::StatementTooComplex,
            Error::Parse(_) => SqlState::SyntaxError,
            Error::Internal(_) | Error::Config(_) => SqlState::InternalError,
        }
    }
}

/// A user-facing error report with optional detail, hint and cursor position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub code: SqlState,
    pub message: String,
    pub detail: Option<String>,
    pub hint: Option<String>,
    /// 1-based character position in the source text.
    pub position: Option<usize>,
}

impl Diagnostic {
    pub fn new(code: SqlState, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), detail: None, hint: None, position: None }
    }

    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn position(mut self, position: Option<usize>) -> Self {
        self.position = position;
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// SQLSTATE error codes raised during analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SqlState {
    SyntaxError,
    FeatureNotSupported,
    UndefinedColumn,
    UndefinedTable,
    UndefinedObject,
    UndefinedFunction,
    UndefinedParameter,
    AmbiguousParameter,
    AmbiguousFunction,
    AmbiguousColumn,
    AmbiguousAlias,
    DuplicateAlias,
    DuplicateColumn,
    DatatypeMismatch,
    CannotCoerce,
    GroupingError,
    WindowingError,
    InvalidRecursion,
    InvalidCursorDefinition,
    InvalidColumnReference,
    InvalidParameterValue,
    InvalidRowCountInLimitClause,
    InvalidTextRepresentation,
    IndeterminateCollation,
    CollationMismatch,
    WrongObjectType,
    StatementTooComplex,
    InternalError,
}

impl SqlState {
    /// The five-character SQLSTATE code.
    pub fn code(&self) -> &'static str {
        match self {
            SqlState::SyntaxError => "42601",
            SqlState::FeatureNotSupported => "0A000",
            SqlState::UndefinedColumn => "42703",
            SqlState::UndefinedTable => "42P01",
            SqlState::UndefinedObject => "42704",
            SqlState::UndefinedFunction => "42883",
            SqlState::UndefinedParameter => "42P02",
            SqlState::AmbiguousParameter => "42P08",
            SqlState::AmbiguousFunction => "42725",
            SqlState::AmbiguousColumn => "42702",
            SqlState::AmbiguousAlias => "42P09",
            SqlState::DuplicateAlias => "42712",
            SqlState::DuplicateColumn => "42701",
            SqlState::DatatypeMismatch => "42804",
            SqlState::CannotCoerce => "42846",
            SqlState::GroupingError => "42803",
            SqlState::WindowingError => "42P20",
            SqlState::InvalidRecursion => "42P19",
            SqlState::InvalidCursorDefinition => "42P11",
            SqlState::InvalidColumnReference => "42P10",
            SqlState::InvalidParameterValue => "22023",
            SqlState::InvalidRowCountInLimitClause => "2201W",
            SqlState::InvalidTextRepresentation => "22P02",
            SqlState::IndeterminateCollation => "42P22",
            SqlState::CollationMismatch => "42P21",
            SqlState::WrongObjectType => "42809",
            SqlState::StatementTooComplex => "54001",
            SqlState::InternalError => "XX000",
        }
    }
}

impl fmt::Display for SqlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_displays_the_diagnostic_message() {
        let err: Error = Diagnostic::new(SqlState::UndefinedColumn, "column \"x\" does not exist").hint("check the spelling").into();
        assert_eq!(err.to_string(), "column \"x\" does not exist");
        assert_eq!(err.code().code(), "42703");
        assert_eq!(err.diagnostic().and_then(|d| d.hint.as_deref()), Some("check the spelling"));
    }

    #[test]
    fn it_reports_too_complex_as_program_limit() {
        let err = Error::TooComplex { depth: 10 };
        assert_eq!(err.code(), SqlState::StatementTooComplex);
        assert_eq!(err.to_string(), "statement is too complex: nesting depth exceeds 10");
    }
}
