//! Built-in spreadsheet functions

pub mod info;
pub mod logical;
pub mod math;
pub mod text;

use crate::error::FormulaResult;
use crate::evaluator::{EvaluationContext, FormulaValue};
use ahash::AHashMap;
use gridcalc_core::CellError;
use std::fmt;

/// Function implementation signature
///
/// Implementations are pure: they see the evaluated arguments (ranges as
/// [`FormulaValue::Range`]) and the evaluation context, nothing else.
pub type FunctionImpl = fn(&[FormulaValue], &EvaluationContext) -> FormulaResult<FormulaValue>;

/// Function definition
#[derive(Clone, Copy)]
pub struct FunctionDef {
    /// Function name (uppercase)
    pub name: &'static str,
    /// Minimum arguments
    pub min_args: usize,
    /// Maximum arguments (None = unlimited)
    pub max_args: Option<usize>,
    /// Implementation
    pub implementation: FunctionImpl,
    /// Receives error arguments instead of short-circuiting on them
    pub accepts_errors: bool,
}

impl FunctionDef {
    pub fn new(
        name: &'static str,
        min_args: usize,
        max_args: Option<usize>,
        implementation: FunctionImpl,
    ) -> Self {
        Self {
            name,
            min_args,
            max_args,
            implementation,
            accepts_errors: false,
        }
    }

    /// Mark the function as inspecting error arguments itself
    pub fn accepting_errors(mut self) -> Self {
        self.accepts_errors = true;
        self
    }

    /// Whether a call with `count` arguments is allowed
    pub fn accepts_arg_count(&self, count: usize) -> bool {
        count >= self.min_args && self.max_args.map_or(true, |max| count <= max)
    }

    /// Human readable argument count, e.g. "2 to 3"
    pub fn arity_description(&self) -> String {
        match self.max_args {
            Some(max) if max == self.min_args => format!("exactly {}", max),
            Some(max) => format!("{} to {}", self.min_args, max),
            None => format!("{} or more", self.min_args),
        }
    }
}

impl fmt::Debug for FunctionDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionDef")
            .field("name", &self.name)
            .field("min_args", &self.min_args)
            .field("max_args", &self.max_args)
            .field("accepts_errors", &self.accepts_errors)
            .finish_non_exhaustive()
    }
}

/// Function registry
///
/// Owned by whoever evaluates formulas; there is no global instance.
#[derive(Debug, Clone)]
pub struct FunctionRegistry {
    functions: AHashMap<String, FunctionDef>,
}

impl FunctionRegistry {
    /// Create a new registry with all built-in functions
    pub fn new() -> Self {
        let mut registry = Self::empty();

        registry.register_math_functions();
        registry.register_logical_functions();
        registry.register_text_functions();
        registry.register_info_functions();

        registry
    }

    /// Create a registry with no functions at all
    pub fn empty() -> Self {
        Self {
            functions: AHashMap::new(),
        }
    }

    /// Look up a function by name (case-insensitive)
    pub fn get(&self, name: &str) -> Option<&FunctionDef> {
        self.functions
            .get(name)
            .or_else(|| self.functions.get(&name.to_uppercase()))
    }

    /// Register a function, replacing any previous one with the same name
    pub fn register(&mut self, def: FunctionDef) {
        self.functions.insert(def.name.to_uppercase(), def);
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.functions.values().map(|f| f.name).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    fn register_math_functions(&mut self) {
        self.register(FunctionDef::new("SUM", 1, None, math::fn_sum));
        self.register(FunctionDef::new("PRODUCT", 1, None, math::fn_product));
        self.register(FunctionDef::new("AVERAGE", 1, None, math::fn_average));
        self.register(FunctionDef::new("MIN", 1, None, math::fn_min));
        self.register(FunctionDef::new("MAX", 1, None, math::fn_max));
        // COUNT and COUNTA skip or count errors rather than failing on them
        self.register(FunctionDef::new("COUNT", 1, None, math::fn_count).accepting_errors());
        self.register(FunctionDef::new("COUNTA", 1, None, math::fn_counta).accepting_errors());
        self.register(FunctionDef::new("ABS", 1, Some(1), math::fn_abs));
        self.register(FunctionDef::new("ROUND", 2, Some(2), math::fn_round));
        self.register(FunctionDef::new("INT", 1, Some(1), math::fn_int));
        self.register(FunctionDef::new("MOD", 2, Some(2), math::fn_mod));
        self.register(FunctionDef::new("SQRT", 1, Some(1), math::fn_sqrt));
        self.register(FunctionDef::new("POWER", 2, Some(2), math::fn_power));
        self.register(FunctionDef::new("PI", 0, Some(0), math::fn_pi));
    }

    fn register_logical_functions(&mut self) {
        self.register(FunctionDef::new("IF", 2, Some(3), logical::fn_if).accepting_errors());
        self.register(FunctionDef::new("AND", 1, None, logical::fn_and));
        self.register(FunctionDef::new("OR", 1, None, logical::fn_or));
        self.register(FunctionDef::new("NOT", 1, Some(1), logical::fn_not));
        self.register(FunctionDef::new("TRUE", 0, Some(0), logical::fn_true));
        self.register(FunctionDef::new("FALSE", 0, Some(0), logical::fn_false));
        self.register(
            FunctionDef::new("IFERROR", 2, Some(2), logical::fn_iferror).accepting_errors(),
        );
    }

    fn register_text_functions(&mut self) {
        self.register(FunctionDef::new("CONCATENATE", 1, None, text::fn_concatenate));
        self.register(FunctionDef::new("CONCAT", 1, None, text::fn_concat));
        self.register(FunctionDef::new("LEN", 1, Some(1), text::fn_len));
        self.register(FunctionDef::new("UPPER", 1, Some(1), text::fn_upper));
        self.register(FunctionDef::new("LOWER", 1, Some(1), text::fn_lower));
        self.register(FunctionDef::new("TRIM", 1, Some(1), text::fn_trim));
    }

    fn register_info_functions(&mut self) {
        for def in [
            FunctionDef::new("ISERROR", 1, Some(1), info::fn_iserror),
            FunctionDef::new("ISERR", 1, Some(1), info::fn_iserr),
            FunctionDef::new("ISNA", 1, Some(1), info::fn_isna),
            FunctionDef::new("ISBLANK", 1, Some(1), info::fn_isblank),
            FunctionDef::new("ISNUMBER", 1, Some(1), info::fn_isnumber),
            FunctionDef::new("ISTEXT", 1, Some(1), info::fn_istext),
        ] {
            self.register(def.accepting_errors());
        }
        self.register(FunctionDef::new("NA", 0, Some(0), info::fn_na));
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Numbers an aggregate function works on
///
/// Direct arguments are coerced (text that is not a number is `#VALUE!`,
/// empty is skipped); inside ranges only actual numbers count.
pub(crate) fn collect_numbers(args: &[FormulaValue]) -> Result<Vec<f64>, CellError> {
    let mut numbers = Vec::new();
    for arg in args {
        match arg {
            FormulaValue::Range(values) => {
                numbers.extend(values.iter().filter_map(|v| match v {
                    FormulaValue::Number(n) => Some(*n),
                    _ => None,
                }));
            }
            FormulaValue::Empty => {}
            other => numbers.push(other.to_number()?),
        }
    }
    Ok(numbers)
}

/// A single scalar argument; ranges are `#VALUE!`
pub(crate) fn scalar(arg: Option<&FormulaValue>) -> Result<&FormulaValue, CellError> {
    match arg {
        Some(FormulaValue::Range(_)) | None => Err(CellError::Value),
        Some(value) => Ok(value),
    }
}

/// A single argument coerced to a number
pub(crate) fn number_arg(arg: Option<&FormulaValue>) -> Result<f64, CellError> {
    scalar(arg)?.to_number()
}

/// Turn a computation that may fail with a cell error into a value
pub(crate) fn value_or_error(
    result: Result<FormulaValue, CellError>,
) -> FormulaResult<FormulaValue> {
    Ok(result.unwrap_or_else(FormulaValue::Error))
}
