//! Text functions

use super::{scalar, value_or_error};
use crate::error::FormulaResult;
use crate::evaluator::{EvaluationContext, FormulaValue};
use gridcalc_core::CellError;

fn text_arg(arg: Option<&FormulaValue>) -> Result<String, CellError> {
    scalar(arg).map(FormulaValue::as_string)
}

/// CONCATENATE(text1, [text2], ...) - ranges are not allowed
pub fn fn_concatenate(
    args: &[FormulaValue],
    _ctx: &EvaluationContext,
) -> FormulaResult<FormulaValue> {
    let result = args
        .iter()
        .map(|arg| text_arg(Some(arg)))
        .collect::<Result<String, CellError>>()
        .map(FormulaValue::String);
    value_or_error(result)
}

/// CONCAT(text1, [text2], ...) - ranges are joined cell by cell
pub fn fn_concat(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let mut result = String::new();
    for arg in args {
        match arg {
            FormulaValue::Range(values) => {
                for value in values {
                    result.push_str(&value.as_string());
                }
            }
            other => result.push_str(&other.as_string()),
        }
    }
    Ok(FormulaValue::String(result))
}

/// LEN(text) - length in characters
pub fn fn_len(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    value_or_error(text_arg(args.first()).map(|s| FormulaValue::Number(s.chars().count() as f64)))
}

/// UPPER(text)
pub fn fn_upper(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    value_or_error(text_arg(args.first()).map(|s| FormulaValue::String(s.to_uppercase())))
}

/// LOWER(text)
pub fn fn_lower(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    value_or_error(text_arg(args.first()).map(|s| FormulaValue::String(s.to_lowercase())))
}

/// TRIM(text) - drops leading and trailing spaces, collapses inner runs to one
pub fn fn_trim(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    value_or_error(text_arg(args.first()).map(|s| {
        let trimmed = s.split(' ').filter(|w| !w.is_empty()).collect::<Vec<_>>().join(" ");
        FormulaValue::String(trimmed)
    }))
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

    fn text(s: &str) -> FormulaValue {
        FormulaValue::String(s.into())
    }

    #[test]
    fn test_concatenation_functions() {
        assert_eq!(eval("=CONCATENATE(\"a\",1,TRUE)"), text("a1TRUE"));
        assert_eq!(eval("=CONCATENATE(A1:A2)"), FormulaValue::Error(CellError::Value));
        assert_eq!(eval("=CONCAT(\"x\",A1:A3,2.5)"), text("x2.5"));
    }

    #[test]
    fn test_case_and_length() {
        assert_eq!(eval("=UPPER(\"MiXed\")"), text("MIXED"));
        assert_eq!(eval("=LOWER(\"MiXed\")"), text("mixed"));
        assert_eq!(eval("=LEN(\"héllo\")"), FormulaValue::Number(5.0));
        assert_eq!(eval("=LEN(12.5)"), FormulaValue::Number(4.0));
        assert_eq!(eval("=LEN(A1)"), FormulaValue::Number(0.0));
    }

    #[test]
    fn test_trim_function() {
        assert_eq!(eval("=TRIM(\"  a   b  c \")"), text("a b c"));
        assert_eq!(eval("=TRIM(\"\")"), text(""));
    }

    #[test]
    fn test_text_functions_propagate_errors() {
        assert_eq!(eval("=UPPER(1/0)"), FormulaValue::Error(CellError::Div0));
        assert_eq!(eval("=CONCAT(\"a\",#N/A)"), FormulaValue::Error(CellError::Na));
    }
}
