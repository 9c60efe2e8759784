//! # gridcalc-formula
//!
//! Formula machinery for gridcalc.
//!
//! This crate provides:
//! - Tokenizing formula text ([`lexer`])
//! - Parsing tokens into an expression tree ([`parser`], [`ast`])
//! - Evaluating expression trees against a cell store ([`evaluator`])
//! - The built-in function library ([`functions`])
//! - The cell dependency graph and recalculation schedule ([`dependency`])
//!
//! ## Example
//!
//! ```rust
//! use gridcalc_formula::{
//!     evaluate, parse_formula, EvaluationContext, FormulaValue, FunctionRegistry,
//! };
//!
//! let functions = FunctionRegistry::new();
//! let ast = parse_formula("=SUM(1,2,3)*2", &functions).unwrap();
//! let ctx = EvaluationContext::simple(&functions);
//! assert_eq!(evaluate(&ast, &ctx).unwrap(), FormulaValue::Number(12.0));
//! ```

pub mod ast;
pub mod dependency;
pub mod error;
pub mod evaluator;
pub mod functions;
pub mod lexer;
pub mod parser;

pub use ast::{
    BinaryOperator, CellReference, Expr, ExprKind, Literal, RangeReference, UnaryOperator,
};
pub use dependency::{CellKey, CellState, DependencyGraph, RecalcSchedule};
pub use error::{FormulaError, FormulaResult};
pub use evaluator::{
    evaluate, evaluate_formula_result, CellLookup, EvaluationContext, FormulaValue,
};
pub use functions::{FunctionDef, FunctionImpl, FunctionRegistry};
pub use lexer::{tokenize, Token, TokenKind};
pub use parser::{parse_formula, parse_tokens};
