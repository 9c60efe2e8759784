//! Prelude module - common imports for gridcalc users
//!
//! ```rust
//! use gridcalc::prelude::*;
//! ```

pub use crate::{
    // Engine
    CalculationEngine,
    CalculationOptions,
    // Cell types
    CellAddress,
    CellError,
    CellInput,
    CellKey,
    CellRange,
    CellState,
    CellValue,
    // Error types
    Error,
    FormulaError,
    // Functions
    FunctionDef,
    FunctionRegistry,
    RecalcReport,
    Result,
};
