//! Formula evaluator
//!
//! Walks an expression tree and produces a [`FormulaValue`]. Spreadsheet
//! errors such as `#DIV/0!` are ordinary values here; `Err` is only
//! returned for internal faults.

use crate::ast::{
    BinaryOperator, CellReference, Expr, ExprKind, Literal, RangeReference, UnaryOperator,
};
use crate::dependency::CellKey;
use crate::error::{FormulaError, FormulaResult};
use crate::functions::FunctionRegistry;
use gridcalc_core::{CellError, CellValue};
use std::cmp::Ordering;

/// Tolerance used when comparing numbers for equality
pub const EPSILON: f64 = 1e-10;

/// Value types during formula evaluation
#[derive(Debug, Clone, PartialEq)]
pub enum FormulaValue {
    Number(f64),
    String(String),
    Boolean(bool),
    Error(CellError),
    Empty,
    /// Cells of a range argument, row by row
    Range(Vec<FormulaValue>),
}

impl FormulaValue {
    /// Convert to number, if possible
    ///
    /// Booleans are 1/0, empty is 0 and text must hold a finite number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FormulaValue::Number(n) => Some(*n),
            FormulaValue::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            FormulaValue::String(s) => parse_number(s),
            FormulaValue::Empty => Some(0.0),
            FormulaValue::Error(_) | FormulaValue::Range(_) => None,
        }
    }

    /// Coerce for arithmetic; errors pass through, anything else is `#VALUE!`
    pub fn to_number(&self) -> Result<f64, CellError> {
        match self {
            FormulaValue::Error(e) => Err(*e),
            other => other.as_number().ok_or(CellError::Value),
        }
    }

    /// Convert to boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FormulaValue::Boolean(b) => Some(*b),
            FormulaValue::Number(n) => Some(*n != 0.0),
            FormulaValue::Empty => Some(false),
            FormulaValue::String(s) => {
                if s.eq_ignore_ascii_case("TRUE") {
                    Some(true)
                } else if s.eq_ignore_ascii_case("FALSE") {
                    Some(false)
                } else {
                    None
                }
            }
            FormulaValue::Error(_) | FormulaValue::Range(_) => None,
        }
    }

    /// Coerce for logical context; errors pass through, anything else is `#VALUE!`
    pub fn to_bool(&self) -> Result<bool, CellError> {
        match self {
            FormulaValue::Error(e) => Err(*e),
            other => other.as_bool().ok_or(CellError::Value),
        }
    }

    /// Convert to string
    pub fn as_string(&self) -> String {
        match self {
            FormulaValue::Number(n) => format_number(*n),
            FormulaValue::String(s) => s.clone(),
            FormulaValue::Boolean(true) => "TRUE".to_string(),
            FormulaValue::Boolean(false) => "FALSE".to_string(),
            FormulaValue::Error(e) => e.to_string(),
            FormulaValue::Empty => String::new(),
            FormulaValue::Range(_) => CellError::Value.to_string(),
        }
    }

    /// Check if this is an error
    pub fn is_error(&self) -> bool {
        matches!(self, FormulaValue::Error(_))
    }

    /// Get the error if this is one
    pub fn get_error(&self) -> Option<CellError> {
        match self {
            FormulaValue::Error(e) => Some(*e),
            _ => None,
        }
    }

    /// First error in this value, looking inside ranges
    pub fn first_error(&self) -> Option<CellError> {
        match self {
            FormulaValue::Error(e) => Some(*e),
            FormulaValue::Range(values) => values.iter().find_map(FormulaValue::get_error),
            _ => None,
        }
    }
}

fn parse_number(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    s.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Format like a spreadsheet: integers without a fraction, no trailing zeros
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// Finite numbers only; `-0` becomes `0`
fn number(n: f64) -> FormulaValue {
    if !n.is_finite() {
        FormulaValue::Error(CellError::Num)
    } else if n == 0.0 {
        FormulaValue::Number(0.0)
    } else {
        FormulaValue::Number(n)
    }
}

impl From<CellValue> for FormulaValue {
    fn from(value: CellValue) -> Self {
        FormulaValue::from(&value)
    }
}

impl From<&CellValue> for FormulaValue {
    fn from(value: &CellValue) -> Self {
        match value.effective_value() {
            CellValue::Empty | CellValue::Formula { .. } => FormulaValue::Empty,
            CellValue::Number(n) => FormulaValue::Number(*n),
            CellValue::String(s) => FormulaValue::String(s.as_str().to_string()),
            CellValue::Boolean(b) => FormulaValue::Boolean(*b),
            CellValue::Error(e) => FormulaValue::Error(*e),
        }
    }
}

impl From<FormulaValue> for CellValue {
    fn from(value: FormulaValue) -> Self {
        match value {
            FormulaValue::Empty => CellValue::Empty,
            FormulaValue::Number(n) => CellValue::Number(n),
            FormulaValue::String(s) => CellValue::String(s.into()),
            FormulaValue::Boolean(b) => CellValue::Boolean(b),
            FormulaValue::Error(e) => CellValue::Error(e),
            FormulaValue::Range(_) => CellValue::Error(CellError::Value),
        }
    }
}

/// Read access to cell values, supplied by whoever owns the cells
pub trait CellLookup {
    /// Map a sheet name to its index; `None` means the current sheet
    fn resolve_sheet(&self, name: Option<&str>, current: usize) -> Option<usize>;

    /// Published value of a cell
    fn cell_value(&self, key: CellKey) -> FormulaValue;
}

/// Lookup with no cells and a single sheet
struct NoCells;

impl CellLookup for NoCells {
    fn resolve_sheet(&self, name: Option<&str>, current: usize) -> Option<usize> {
        match name {
            None => Some(current),
            Some(_) => None,
        }
    }

    fn cell_value(&self, _key: CellKey) -> FormulaValue {
        FormulaValue::Empty
    }
}

static NO_CELLS: NoCells = NoCells;

/// Context for formula evaluation
pub struct EvaluationContext<'a> {
    cells: &'a dyn CellLookup,
    functions: &'a FunctionRegistry,
    current: CellKey,
}

impl<'a> EvaluationContext<'a> {
    /// Create a context evaluating the formula at `current`
    pub fn new(
        cells: &'a dyn CellLookup,
        functions: &'a FunctionRegistry,
        current: CellKey,
    ) -> Self {
        Self {
            cells,
            functions,
            current,
        }
    }

    /// A context without any cells (every reference reads as empty)
    pub fn simple(functions: &'a FunctionRegistry) -> Self {
        Self::new(&NO_CELLS, functions, CellKey::new(0, 0, 0))
    }

    /// The cell whose formula is being evaluated
    pub fn current_cell(&self) -> CellKey {
        self.current
    }

    /// The function library in use
    pub fn functions(&self) -> &'a FunctionRegistry {
        self.functions
    }

    /// Resolve a reference to a cell key; `None` when the sheet is unknown
    pub fn resolve(&self, reference: &CellReference) -> Option<CellKey> {
        let sheet = self
            .cells
            .resolve_sheet(reference.sheet.as_deref(), self.current.sheet)?;
        Some(CellKey::from_address(sheet, &reference.address))
    }

    /// Value of a single referenced cell
    pub fn cell_value(&self, reference: &CellReference) -> FormulaValue {
        match self.resolve(reference) {
            Some(key) => self.cells.cell_value(key),
            None => FormulaValue::Error(CellError::Ref),
        }
    }

    /// Values of a referenced range, row by row
    pub fn range_values(&self, reference: &RangeReference) -> FormulaValue {
        let sheet = match self
            .cells
            .resolve_sheet(reference.sheet.as_deref(), self.current.sheet)
        {
            Some(sheet) => sheet,
            None => return FormulaValue::Error(CellError::Ref),
        };
        FormulaValue::Range(
            reference
                .range
                .cells()
                .map(|address| self.cells.cell_value(CellKey::from_address(sheet, &address)))
                .collect(),
        )
    }
}

/// Evaluate a formula expression
pub fn evaluate(expr: &Expr, ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    match &expr.kind {
        // === Literals ===
        ExprKind::Literal(Literal::Number(n)) => Ok(FormulaValue::Number(*n)),
        ExprKind::Literal(Literal::String(s)) => Ok(FormulaValue::String(s.clone())),
        ExprKind::Literal(Literal::Boolean(b)) => Ok(FormulaValue::Boolean(*b)),
        ExprKind::Literal(Literal::Error(e)) => Ok(FormulaValue::Error(*e)),

        // === References ===
        ExprKind::CellRef(reference) => Ok(ctx.cell_value(reference)),

        // A range only makes sense as a function argument
        ExprKind::RangeRef(_) => Ok(FormulaValue::Error(CellError::Value)),

        // === Operators ===
        ExprKind::BinaryOp { op, left, right } => evaluate_binary_op(*op, left, right, ctx),
        ExprKind::UnaryOp { op, operand } => evaluate_unary_op(*op, operand, ctx),

        // === Functions ===
        ExprKind::Function { name, args } => evaluate_function(name, args, ctx),
    }
}

/// Evaluate a whole formula and shape the result for storing in a cell
///
/// An empty result reads as `0`; a stray range becomes `#VALUE!`.
pub fn evaluate_formula_result(
    expr: &Expr,
    ctx: &EvaluationContext,
) -> FormulaResult<FormulaValue> {
    Ok(match evaluate(expr, ctx)? {
        FormulaValue::Empty => FormulaValue::Number(0.0),
        FormulaValue::Range(_) => FormulaValue::Error(CellError::Value),
        value => value,
    })
}

/// Evaluate a binary operation
fn evaluate_binary_op(
    op: BinaryOperator,
    left: &Expr,
    right: &Expr,
    ctx: &EvaluationContext,
) -> FormulaResult<FormulaValue> {
    let left_val = evaluate(left, ctx)?;
    let right_val = evaluate(right, ctx)?;

    // Propagate errors, left first
    if let Some(e) = left_val.get_error() {
        return Ok(FormulaValue::Error(e));
    }
    if let Some(e) = right_val.get_error() {
        return Ok(FormulaValue::Error(e));
    }

    let arithmetic = |f: fn(f64, f64) -> FormulaValue| -> FormulaValue {
        match (left_val.to_number(), right_val.to_number()) {
            (Ok(l), Ok(r)) => f(l, r),
            (Err(e), _) | (_, Err(e)) => FormulaValue::Error(e),
        }
    };

    let value = match op {
        BinaryOperator::Add => arithmetic(|l, r| number(l + r)),
        BinaryOperator::Subtract => arithmetic(|l, r| number(l - r)),
        BinaryOperator::Multiply => arithmetic(|l, r| number(l * r)),
        BinaryOperator::Divide => arithmetic(|l, r| {
            if r == 0.0 {
                FormulaValue::Error(CellError::Div0)
            } else {
                number(l / r)
            }
        }),
        BinaryOperator::Power => arithmetic(power),

        BinaryOperator::Equal => {
            FormulaValue::Boolean(compare_values(&left_val, &right_val) == Ordering::Equal)
        }
        BinaryOperator::NotEqual => {
            FormulaValue::Boolean(compare_values(&left_val, &right_val) != Ordering::Equal)
        }
        BinaryOperator::LessThan => {
            FormulaValue::Boolean(compare_values(&left_val, &right_val) == Ordering::Less)
        }
        BinaryOperator::LessEqual => {
            FormulaValue::Boolean(compare_values(&left_val, &right_val) != Ordering::Greater)
        }
        BinaryOperator::GreaterThan => {
            FormulaValue::Boolean(compare_values(&left_val, &right_val) == Ordering::Greater)
        }
        BinaryOperator::GreaterEqual => {
            FormulaValue::Boolean(compare_values(&left_val, &right_val) != Ordering::Less)
        }

        BinaryOperator::Concat => {
            FormulaValue::String(left_val.as_string() + &right_val.as_string())
        }
    };

    Ok(value)
}

/// `base ^ exponent` with spreadsheet error rules
pub(crate) fn power(base: f64, exponent: f64) -> FormulaValue {
    if base == 0.0 {
        if exponent == 0.0 {
            return FormulaValue::Error(CellError::Num);
        }
        if exponent < 0.0 {
            return FormulaValue::Error(CellError::Div0);
        }
    }
    number(base.powf(exponent))
}

/// Compare two values for ordering (Excel-style comparison)
///
/// Numbers sort before text, text before booleans. Text compares without
/// regard to case. An empty operand takes the blank form of the other side.
pub fn compare_values(left: &FormulaValue, right: &FormulaValue) -> Ordering {
    fn blank_like(other: &FormulaValue) -> FormulaValue {
        match other {
            FormulaValue::String(_) => FormulaValue::String(String::new()),
            FormulaValue::Boolean(_) => FormulaValue::Boolean(false),
            _ => FormulaValue::Number(0.0),
        }
    }

    fn rank(value: &FormulaValue) -> u8 {
        match value {
            FormulaValue::Number(_) | FormulaValue::Empty => 0,
            FormulaValue::String(_) => 1,
            FormulaValue::Boolean(_) => 2,
            FormulaValue::Error(_) | FormulaValue::Range(_) => 3,
        }
    }

    let (left, right) = match (left, right) {
        (FormulaValue::Empty, FormulaValue::Empty) => return Ordering::Equal,
        (FormulaValue::Empty, other) => (blank_like(other), other.clone()),
        (other, FormulaValue::Empty) => (other.clone(), blank_like(other)),
        (l, r) => (l.clone(), r.clone()),
    };

    match (&left, &right) {
        (FormulaValue::Number(l), FormulaValue::Number(r)) => {
            if (l - r).abs() < EPSILON {
                Ordering::Equal
            } else {
                l.partial_cmp(r).unwrap_or(Ordering::Equal)
            }
        }
        (FormulaValue::String(l), FormulaValue::String(r)) => {
            l.to_lowercase().cmp(&r.to_lowercase())
        }
        (FormulaValue::Boolean(l), FormulaValue::Boolean(r)) => l.cmp(r),
        (l, r) => rank(l).cmp(&rank(r)),
    }
}

/// Evaluate a unary operation
fn evaluate_unary_op(
    op: UnaryOperator,
    operand: &Expr,
    ctx: &EvaluationContext,
) -> FormulaResult<FormulaValue> {
    let val = evaluate(operand, ctx)?;

    // Propagate errors
    if let Some(e) = val.get_error() {
        return Ok(FormulaValue::Error(e));
    }

    Ok(match op {
        UnaryOperator::Plus => val,
        UnaryOperator::Negate => match val.to_number() {
            Ok(n) => number(-n),
            Err(e) => FormulaValue::Error(e),
        },
        UnaryOperator::Percent => match val.to_number() {
            Ok(n) => number(n / 100.0),
            Err(e) => FormulaValue::Error(e),
        },
    })
}

/// Evaluate a function call
fn evaluate_function(
    name: &str,
    args: &[Expr],
    ctx: &EvaluationContext,
) -> FormulaResult<FormulaValue> {
    let func = match ctx.functions().get(name) {
        Some(func) => func,
        None => return Ok(FormulaValue::Error(CellError::Name)),
    };

    if !func.accepts_arg_count(args.len()) {
        return Err(FormulaError::ArgumentCount {
            function: name.to_string(),
            expected: func.arity_description(),
            actual: args.len(),
        });
    }

    // Evaluate arguments; ranges are only expanded here
    let mut evaluated_args = Vec::with_capacity(args.len());
    for arg in args {
        let value = match &arg.kind {
            ExprKind::RangeRef(range) => ctx.range_values(range),
            _ => evaluate(arg, ctx)?,
        };
        evaluated_args.push(value);
    }

    if !func.accepts_errors {
        if let Some(e) = evaluated_args.iter().find_map(FormulaValue::first_error) {
            return Ok(FormulaValue::Error(e));
        }
    }

    let result = (func.implementation)(&evaluated_args, ctx)?;
    Ok(match result {
        FormulaValue::Number(n) => number(n),
        other => other,
    })
}
