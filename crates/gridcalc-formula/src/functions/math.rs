//! Math and aggregate functions

use super::{collect_numbers, number_arg, value_or_error};
use crate::error::FormulaResult;
use crate::evaluator::{power, EvaluationContext, FormulaValue};
use gridcalc_core::CellError;

/// SUM(number1, [number2], ...)
pub fn fn_sum(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    value_or_error(collect_numbers(args).map(|n| FormulaValue::Number(n.iter().sum())))
}

/// PRODUCT(number1, [number2], ...)
///
/// Zero when there is nothing to multiply.
pub fn fn_product(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    value_or_error(collect_numbers(args).map(|n| {
        if n.is_empty() {
            FormulaValue::Number(0.0)
        } else {
            FormulaValue::Number(n.iter().product())
        }
    }))
}

/// AVERAGE(number1, [number2], ...)
pub fn fn_average(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    value_or_error(collect_numbers(args).map(|n| {
        if n.is_empty() {
            FormulaValue::Error(CellError::Div0)
        } else {
            FormulaValue::Number(n.iter().sum::<f64>() / n.len() as f64)
        }
    }))
}

/// MIN(number1, [number2], ...)
pub fn fn_min(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    value_or_error(collect_numbers(args).map(|n| {
        FormulaValue::Number(n.into_iter().reduce(f64::min).unwrap_or(0.0))
    }))
}

/// MAX(number1, [number2], ...)
pub fn fn_max(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    value_or_error(collect_numbers(args).map(|n| {
        FormulaValue::Number(n.into_iter().reduce(f64::max).unwrap_or(0.0))
    }))
}

/// COUNT(value1, [value2], ...)
///
/// Direct arguments count when they are numbers, booleans or numeric text;
/// inside ranges only numbers count. Errors are never counted.
pub fn fn_count(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let mut count = 0;

    for arg in args {
        match arg {
            FormulaValue::Number(_) | FormulaValue::Boolean(_) => count += 1,
            FormulaValue::String(_) => {
                if arg.as_number().is_some() {
                    count += 1;
                }
            }
            FormulaValue::Range(values) => {
                count += values
                    .iter()
                    .filter(|v| matches!(v, FormulaValue::Number(_)))
                    .count();
            }
            FormulaValue::Empty | FormulaValue::Error(_) => {}
        }
    }

    Ok(FormulaValue::Number(count as f64))
}

/// COUNTA(value1, [value2], ...) - counts everything that is not empty
pub fn fn_counta(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let count: usize = args
        .iter()
        .map(|arg| match arg {
            FormulaValue::Range(values) => values
                .iter()
                .filter(|v| !matches!(v, FormulaValue::Empty))
                .count(),
            FormulaValue::Empty => 0,
            _ => 1,
        })
        .sum();

    Ok(FormulaValue::Number(count as f64))
}

/// ABS(number)
pub fn fn_abs(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    value_or_error(number_arg(args.first()).map(|n| FormulaValue::Number(n.abs())))
}

/// ROUND(number, num_digits)
///
/// Rounds half away from zero. Negative `num_digits` rounds to the left of
/// the decimal point.
pub fn fn_round(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let number = match number_arg(args.first()) {
        Ok(n) => n,
        Err(e) => return Ok(FormulaValue::Error(e)),
    };
    let num_digits = match number_arg(args.get(1)) {
        Ok(d) => d.trunc().clamp(-308.0, 308.0) as i32,
        Err(e) => return Ok(FormulaValue::Error(e)),
    };

    // Beyond 15 significant digits there is nothing left to round
    if num_digits > 15 {
        return Ok(FormulaValue::Number(number));
    }

    let round_half_away = |x: f64| {
        if x >= 0.0 {
            (x + 0.5).floor()
        } else {
            (x - 0.5).ceil()
        }
    };
    let result = if num_digits >= 0 {
        let multiplier = 10_f64.powi(num_digits);
        round_half_away(number * multiplier) / multiplier
    } else {
        let divisor = 10_f64.powi(-num_digits);
        round_half_away(number / divisor) * divisor
    };

    Ok(FormulaValue::Number(result))
}

/// INT(number) - rounds down to the nearest integer
pub fn fn_int(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    value_or_error(number_arg(args.first()).map(|n| FormulaValue::Number(n.floor())))
}

/// MOD(number, divisor) - the result has the sign of the divisor
pub fn fn_mod(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let result = number_arg(args.first()).and_then(|n| {
        let d = number_arg(args.get(1))?;
        if d == 0.0 {
            return Err(CellError::Div0);
        }
        Ok(FormulaValue::Number(n - d * (n / d).floor()))
    });
    value_or_error(result)
}

/// SQRT(number)
pub fn fn_sqrt(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    value_or_error(number_arg(args.first()).map(|n| {
        if n < 0.0 {
            FormulaValue::Error(CellError::Num)
        } else {
            FormulaValue::Number(n.sqrt())
        }
    }))
}

/// POWER(number, power) - same rules as the `^` operator
pub fn fn_power(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let result = number_arg(args.first())
        .and_then(|base| Ok(power(base, number_arg(args.get(1))?)));
    value_or_error(result)
}

/// PI()
pub fn fn_pi(_args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    Ok(FormulaValue::Number(std::f64::consts::PI))
}
