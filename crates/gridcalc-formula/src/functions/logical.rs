//! Logical functions

use super::{scalar, value_or_error};
use crate::error::{FormulaError, FormulaResult};
use crate::evaluator::{EvaluationContext, FormulaValue};
use gridcalc_core::CellError;

/// IF(logical_test, value_if_true, [value_if_false])
///
/// Errors in the branch that is not taken do not matter.
pub fn fn_if(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let if_true = args
        .get(1)
        .ok_or_else(|| FormulaError::Argument("IF requires at least 2 arguments".into()))?;
    let if_false = args.get(2);

    let condition = match scalar(args.first()).and_then(FormulaValue::to_bool) {
        Ok(b) => b,
        Err(e) => return Ok(FormulaValue::Error(e)),
    };

    if condition {
        Ok(if_true.clone())
    } else {
        Ok(if_false.cloned().unwrap_or(FormulaValue::Boolean(false)))
    }
}

/// Booleans taken from the arguments of AND/OR
///
/// Direct text must read as TRUE/FALSE; inside ranges only booleans and
/// numbers count. No value at all is `#VALUE!`.
fn collect_bools(args: &[FormulaValue]) -> Result<Vec<bool>, CellError> {
    let mut values = Vec::new();
    for arg in args {
        match arg {
            FormulaValue::Range(cells) => {
                values.extend(cells.iter().filter_map(|v| match v {
                    FormulaValue::Boolean(b) => Some(*b),
                    FormulaValue::Number(n) => Some(*n != 0.0),
                    _ => None,
                }));
            }
            FormulaValue::Empty => {}
            other => values.push(other.to_bool()?),
        }
    }

    if values.is_empty() {
        return Err(CellError::Value);
    }
    Ok(values)
}

/// AND(logical1, [logical2], ...)
pub fn fn_and(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    value_or_error(collect_bools(args).map(|v| FormulaValue::Boolean(v.iter().all(|b| *b))))
}

/// OR(logical1, [logical2], ...)
pub fn fn_or(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    value_or_error(collect_bools(args).map(|v| FormulaValue::Boolean(v.iter().any(|b| *b))))
}

/// NOT(logical)
pub fn fn_not(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    value_or_error(
        scalar(args.first())
            .and_then(FormulaValue::to_bool)
            .map(|b| FormulaValue::Boolean(!b)),
    )
}

/// TRUE()
pub fn fn_true(_args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    Ok(FormulaValue::Boolean(true))
}

/// FALSE()
pub fn fn_false(_args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    Ok(FormulaValue::Boolean(false))
}

/// IFERROR(value, value_if_error)
pub fn fn_iferror(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    match (args.first(), args.get(1)) {
        (Some(FormulaValue::Error(_)), Some(fallback)) => Ok(fallback.clone()),
        (Some(FormulaValue::Range(_)), _) => Ok(FormulaValue::Error(CellError::Value)),
        (Some(value), Some(_)) => Ok(value.clone()),
        _ => Err(FormulaError::Argument(
            "IFERROR requires 2 arguments".into(),
        )),
    }
}
