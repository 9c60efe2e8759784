//! # gridcalc
//!
//! Formula calculation core for spreadsheets.
//!
//! gridcalc parses spreadsheet formulas, evaluates them against a store of
//! cell values and keeps every dependent cell up to date when a cell
//! changes.
//!
//! ## Features
//!
//! - Excel-style formulas: arithmetic, comparison, text concatenation,
//!   cell and range references across sheets
//! - A built-in function library (math, logical, text, information) that
//!   can be replaced or extended
//! - Incremental recalculation in dependency order
//! - Circular references resolve to `#CIRCULAR!` instead of hanging
//!
//! ## Example
//!
//! ```rust
//! use gridcalc::prelude::*;
//!
//! let mut engine = CalculationEngine::new();
//! engine.set("A1", "2").unwrap();
//! engine.set("A2", "3").unwrap();
//! engine.set("A3", "5").unwrap();
//! engine.set("B1", "=SUM(A1:A3)").unwrap();
//!
//! assert_eq!(engine.value("B1").unwrap(), CellValue::Number(10.0));
//! ```

pub mod calculation;
pub mod input;
pub mod prelude;
pub mod store;

pub use calculation::{CalculationEngine, CalculationOptions, RecalcFailure, RecalcReport};
pub use input::CellInput;
pub use store::CellStore;

// Re-export core types
pub use gridcalc_core::{
    CellAddress, CellError, CellRange, CellValue, Error, Result, SharedString, MAX_COLS, MAX_ROWS,
};

// Re-export formula types
pub use gridcalc_formula::evaluator::format_number;
pub use gridcalc_formula::{
    parse_formula, CellKey, CellState, DependencyGraph, EvaluationContext, Expr, FormulaError,
    FormulaResult, FormulaValue, FunctionDef, FunctionRegistry,
};
