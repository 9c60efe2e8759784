//! User input for a cell

use gridcalc_core::{CellError, CellValue};

/// New content for a cell
#[derive(Debug, Clone, PartialEq, Default)]
pub enum CellInput {
    /// Clear the cell
    #[default]
    Empty,
    /// A literal value
    Value(CellValue),
    /// Formula text, starting with `=`
    Formula(String),
}

impl CellInput {
    /// Interpret text the way a user typing into a cell means it
    ///
    /// `=`-prefixed text is a formula; otherwise numbers, `TRUE`/`FALSE`
    /// and error literals are recognized, and anything else is text.
    /// Blank input clears the cell.
    ///
    /// ```rust
    /// use gridcalc::{CellInput, CellValue};
    ///
    /// assert_eq!(CellInput::parse("=A1*2"), CellInput::Formula("=A1*2".into()));
    /// assert_eq!(CellInput::parse("2.5"), CellInput::Value(CellValue::Number(2.5)));
    /// assert_eq!(CellInput::parse("  "), CellInput::Empty);
    /// ```
    pub fn parse(text: &str) -> Self {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return CellInput::Empty;
        }
        if trimmed.starts_with('=') {
            return CellInput::Formula(trimmed.to_string());
        }

        if let Ok(n) = trimmed.parse::<f64>() {
            if n.is_finite() {
                return CellInput::Value(CellValue::Number(n));
            }
        }
        if trimmed.eq_ignore_ascii_case("TRUE") {
            return CellInput::Value(CellValue::Boolean(true));
        }
        if trimmed.eq_ignore_ascii_case("FALSE") {
            return CellInput::Value(CellValue::Boolean(false));
        }
        if let Some(e) = CellError::from_str(trimmed) {
            return CellInput::Value(CellValue::Error(e));
        }

        CellInput::Value(CellValue::string(text))
    }

    /// Input that reproduces a stored value
    pub fn from_cell_value(value: CellValue) -> Self {
        match value {
            CellValue::Empty => CellInput::Empty,
            CellValue::Formula { text, .. } => CellInput::Formula(text),
            other => CellInput::Value(other),
        }
    }

    pub fn is_formula(&self) -> bool {
        matches!(self, CellInput::Formula(_))
    }
}

impl From<CellValue> for CellInput {
    fn from(value: CellValue) -> Self {
        CellInput::from_cell_value(value)
    }
}

impl From<&str> for CellInput {
    fn from(text: &str) -> Self {
        CellInput::parse(text)
    }
}

impl From<f64> for CellInput {
    fn from(n: f64) -> Self {
        CellInput::Value(CellValue::Number(n))
    }
}
