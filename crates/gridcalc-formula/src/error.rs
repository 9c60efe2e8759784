//! Formula error types

use gridcalc_core::CellError;
use thiserror::Error;

/// Result type for formula operations
pub type FormulaResult<T> = std::result::Result<T, FormulaError>;

/// Errors raised while parsing or evaluating formulas
///
/// Ordinary spreadsheet errors (`#DIV/0!`, `#VALUE!`, ...) are *values*
/// and never show up here. A `FormulaError` is either a syntax error found
/// while turning text into a tree, or an internal fault during evaluation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FormulaError {
    /// Malformed formula text
    #[error("Syntax error at position {position}: {message}")]
    Syntax { position: usize, message: String },

    /// Evaluation could not proceed; raised by function implementations
    #[error("Evaluation error: {0}")]
    Evaluation(String),

    /// Invalid argument passed to a function implementation
    #[error("Invalid argument: {0}")]
    Argument(String),

    /// Wrong number of arguments
    #[error("Wrong number of arguments for {function}: expected {expected}, got {actual}")]
    ArgumentCount {
        function: String,
        expected: String,
        actual: usize,
    },
}

impl FormulaError {
    pub(crate) fn syntax(position: usize, message: impl Into<String>) -> Self {
        FormulaError::Syntax {
            position,
            message: message.into(),
        }
    }

    /// Whether this is a parse-time error
    pub fn is_syntax(&self) -> bool {
        matches!(self, FormulaError::Syntax { .. })
    }

    /// The error value a cell shows when this error hits it
    pub fn cell_error(&self) -> CellError {
        match self {
            FormulaError::Syntax { .. } => CellError::Syntax,
            FormulaError::Evaluation(_)
            | FormulaError::Argument(_)
            | FormulaError::ArgumentCount { .. } => CellError::Value,
        }
    }
}

impl From<FormulaError> for gridcalc_core::Error {
    fn from(err: FormulaError) -> Self {
        match err {
            FormulaError::Syntax { .. } => gridcalc_core::Error::FormulaParse(err.to_string()),
            other => gridcalc_core::Error::Other(other.to_string()),
        }
    }
}
