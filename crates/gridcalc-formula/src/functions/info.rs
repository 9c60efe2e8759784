//! Information functions
//!
//! All of these except `NA` receive error arguments as values.

use crate::error::FormulaResult;
use crate::evaluator::{EvaluationContext, FormulaValue};
use gridcalc_core::CellError;

fn test_value(
    args: &[FormulaValue],
    test: fn(&FormulaValue) -> bool,
) -> FormulaResult<FormulaValue> {
    Ok(match args.first() {
        Some(FormulaValue::Range(_)) | None => FormulaValue::Error(CellError::Value),
        Some(value) => FormulaValue::Boolean(test(value)),
    })
}

/// ISBLANK(value)
pub fn fn_isblank(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    test_value(args, |v| matches!(v, FormulaValue::Empty))
}

/// ISNUMBER(value)
pub fn fn_isnumber(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    test_value(args, |v| matches!(v, FormulaValue::Number(_)))
}

/// ISTEXT(value)
pub fn fn_istext(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    test_value(args, |v| matches!(v, FormulaValue::String(_)))
}

/// ISERROR(value)
pub fn fn_iserror(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    test_value(args, FormulaValue::is_error)
}

/// ISERR(value) - any error except #N/A
pub fn fn_iserr(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    test_value(args, |v| matches!(v, FormulaValue::Error(e) if *e != CellError::Na))
}

/// ISNA(value)
pub fn fn_isna(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    test_value(args, |v| matches!(v, FormulaValue::Error(CellError::Na)))
}

/// NA()
pub fn fn_na(_args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    Ok(FormulaValue::Error(CellError::Na))
}

#[cfg(test)]
mod tests {
    use crate::evaluator::{evaluate_formula_result, EvaluationContext, FormulaValue};
    use crate::functions::FunctionRegistry;
    use crate::parser::parse_formula;
    use gridcalc_core::CellError;
    use pretty_assertions::assert_eq;

    fn eval(formula: &str) -> FormulaValue {
        let functions = FunctionRegistry::new();
        let ast = parse_formula(formula, &functions).unwrap();
        evaluate_formula_result(&ast, &EvaluationContext::simple(&functions)).unwrap()
    }

    #[test]
    fn test_info_functions() {
        assert_eq!(eval("=ISBLANK(A1)"), FormulaValue::Boolean(true));
        assert_eq!(eval("=ISBLANK(\"\")"), FormulaValue::Boolean(false));
        assert_eq!(eval("=ISNUMBER(42)"), FormulaValue::Boolean(true));
        assert_eq!(eval("=ISNUMBER(\"42\")"), FormulaValue::Boolean(false));
        assert_eq!(eval("=ISTEXT(\"42\")"), FormulaValue::Boolean(true));
        assert_eq!(eval("=ISNUMBER(A1:A2)"), FormulaValue::Error(CellError::Value));
    }

    #[test]
    fn test_error_checks() {
        assert_eq!(eval("=ISERROR(1/0)"), FormulaValue::Boolean(true));
        assert_eq!(eval("=ISERROR(1)"), FormulaValue::Boolean(false));
        assert_eq!(eval("=ISERR(1/0)"), FormulaValue::Boolean(true));
        assert_eq!(eval("=ISERR(NA())"), FormulaValue::Boolean(false));
        assert_eq!(eval("=ISNA(NA())"), FormulaValue::Boolean(true));
        assert_eq!(eval("=ISNA(#VALUE!)"), FormulaValue::Boolean(false));
        assert_eq!(eval("=ISNUMBER(1/0)"), FormulaValue::Boolean(false));
        assert_eq!(eval("=NA()"), FormulaValue::Error(CellError::Na));
    }
}
