//! Calculation engine
//!
//! [`CalculationEngine`] owns the cell values, the parsed formulas and the
//! dependency graph. Every edit goes through [`CalculationEngine::update_cell`],
//! which replaces the edited cell's edges and then recalculates the cell and
//! everything downstream of it in dependency order.
//!
//! # Example
//!
//! ```rust
//! use gridcalc::prelude::*;
//!
//! let mut engine = CalculationEngine::new();
//! engine.set("A1", "2").unwrap();
//! engine.set("B1", "=A1*2").unwrap();
//! engine.set("C1", "=B1+1").unwrap();
//!
//! engine.set("A1", "4").unwrap();
//! assert_eq!(engine.value("C1").unwrap(), CellValue::Number(9.0));
//! ```

use crate::input::CellInput;
use crate::store::CellStore;
use ahash::{AHashMap, AHashSet};
use gridcalc_core::{CellAddress, CellError, CellValue, Error, Result, MAX_SHEET_NAME_LEN};
use gridcalc_formula::{
    evaluate_formula_result, parse_formula, CellKey, CellLookup, CellReference, CellState,
    DependencyGraph, EvaluationContext, Expr, FormulaError, FormulaValue, FunctionRegistry,
    RecalcSchedule,
};
use tracing::{debug, trace, warn};

/// Options for recalculation
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CalculationOptions {
    /// Maximum number of scheduling rounds per pass (default: 1000)
    ///
    /// A pass starts in round 1 and every circular reference it has to
    /// break opens another round. An acyclic pass always completes, however
    /// deep its chains are. Cells not reached within the limit show `#CALC!`.
    pub max_iterations: u32,
}

impl Default for CalculationOptions {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
        }
    }
}

/// A cell whose evaluation hit an internal fault
#[derive(Debug, Clone, PartialEq)]
pub struct RecalcFailure {
    pub cell: CellKey,
    pub error: FormulaError,
}

/// What happened during one recalculation pass
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RecalcReport {
    /// Formula cells evaluated, in evaluation order
    pub evaluated: Vec<CellKey>,
    /// Cells that kept their previous value because evaluation failed
    pub failures: Vec<RecalcFailure>,
    /// Cells resolved to `#CIRCULAR!`
    pub circular: Vec<CellKey>,
    /// Cells left at `#CALC!` when the round limit was reached
    pub unfinished: Vec<CellKey>,
    /// Parse error of the edited formula, if it did not parse
    pub syntax_error: Option<FormulaError>,
    /// Number of evaluation waves the pass took
    pub waves: u32,
    /// Number of scheduling rounds the pass took
    pub rounds: u32,
}

impl RecalcReport {
    /// True when every affected cell got a fresh value without faults,
    /// cycles or hitting the round limit
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
            && self.circular.is_empty()
            && self.unfinished.is_empty()
            && self.syntax_error.is_none()
    }
}

/// Formula text together with its parsed tree
#[derive(Debug)]
struct ParsedFormula {
    text: String,
    expr: Expr,
}

/// The calculation engine
#[derive(Debug)]
pub struct CalculationEngine {
    options: CalculationOptions,
    functions: FunctionRegistry,
    sheets: Vec<String>,
    store: CellStore,
    graph: DependencyGraph,
    /// Parsed formulas, keyed by the cell holding them
    parsed: AHashMap<CellKey, ParsedFormula>,
    /// Formula cells referencing a sheet that does not exist (yet)
    unresolved: AHashSet<CellKey>,
}

impl Default for CalculationEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl CalculationEngine {
    /// Engine with the built-in functions, default options and one sheet
    /// named `Sheet1`
    pub fn new() -> Self {
        Self::with_functions(FunctionRegistry::new(), CalculationOptions::default())
    }

    /// Engine with the built-in functions and custom options
    pub fn with_options(options: CalculationOptions) -> Self {
        Self::with_functions(FunctionRegistry::new(), options)
    }

    /// Engine using `functions` as its function library
    pub fn with_functions(functions: FunctionRegistry, options: CalculationOptions) -> Self {
        Self {
            options,
            functions,
            sheets: vec!["Sheet1".to_string()],
            store: CellStore::new(),
            graph: DependencyGraph::new(),
            parsed: AHashMap::new(),
            unresolved: AHashSet::new(),
        }
    }

    pub fn options(&self) -> &CalculationOptions {
        &self.options
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    /// The dependency graph between cells
    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// The stored cell values
    pub fn store(&self) -> &CellStore {
        &self.store
    }

    // === Sheets ===

    /// Add a sheet and return its index with the report of the
    /// recalculation it triggered
    ///
    /// Formulas that referenced a sheet by this name before it existed are
    /// re-linked and recalculated.
    pub fn add_sheet(&mut self, name: &str) -> Result<(usize, RecalcReport)> {
        validate_sheet_name(name)?;
        if self.sheet_index(name).is_some() {
            return Err(Error::DuplicateSheetName(name.to_string()));
        }

        self.sheets.push(name.to_string());
        let index = self.sheets.len() - 1;
        debug!(sheet = name, index, "added sheet");

        let mut report = RecalcReport::default();
        let mut pending: Vec<CellKey> = self.unresolved.drain().collect();
        if !pending.is_empty() {
            pending.sort_unstable();
            for &cell in &pending {
                self.link(cell);
            }
            self.recalculate_from(pending, &mut report);
        }

        Ok((index, report))
    }

    /// Index of a sheet by name (case-insensitive)
    pub fn sheet_index(&self, name: &str) -> Option<usize> {
        self.sheets.iter().position(|s| s.eq_ignore_ascii_case(name))
    }

    /// Sheet names in index order
    pub fn sheet_names(&self) -> &[String] {
        &self.sheets
    }

    /// Resolve `A1`, `Sheet2!B3` or `'My Sheet'!C4` to a cell key;
    /// without a sheet prefix the first sheet is meant
    pub fn cell_key(&self, reference: &str) -> Result<CellKey> {
        let reference = reference.trim();
        let (sheet, address) = match reference.rfind('!') {
            Some(pos) => {
                let name = unquote_sheet_name(&reference[..pos]);
                let sheet = self
                    .sheet_index(&name)
                    .ok_or_else(|| Error::SheetNotFound(name.clone()))?;
                (sheet, &reference[pos + 1..])
            }
            None => (0, reference),
        };

        let address = CellAddress::parse(address)?;
        Ok(CellKey::from_address(sheet, &address))
    }

    /// Display name of a cell, e.g. `Sheet1!B2`
    pub fn cell_name(&self, cell: CellKey) -> String {
        match self.sheets.get(cell.sheet) {
            Some(name) => format!("{}!{}", quote_sheet_name(name), cell.address()),
            None => cell.to_string(),
        }
    }

    // === Cell access ===

    /// Effective value of a cell: the computed result for formulas
    pub fn get_value(&self, cell: CellKey) -> CellValue {
        self.store.effective_value(cell)
    }

    /// Formula text of a cell, if it holds a formula
    pub fn get_formula(&self, cell: CellKey) -> Option<&str> {
        self.store.get(cell).and_then(CellValue::formula_text)
    }

    /// Calculation state of a cell
    pub fn cell_state(&self, cell: CellKey) -> CellState {
        self.graph.state(cell)
    }

    /// Cells that directly reference `cell`, in the order they started to
    pub fn get_dependent_cells(&self, cell: CellKey) -> Vec<CellKey> {
        self.graph.dependents(cell)
    }

    /// Cells the formula at `cell` references
    pub fn get_precedent_cells(&self, cell: CellKey) -> Vec<CellKey> {
        self.graph.precedents(cell)
    }

    /// Every cell that depends on `cell`, directly or not, in the order a
    /// recalculation would visit them
    pub fn get_all_dependents(&self, cell: CellKey) -> Vec<CellKey> {
        let mut schedule = RecalcSchedule::new(&self.graph, [cell]);
        let mut order = Vec::new();

        while !schedule.is_finished() {
            let mut wave = schedule.take_wave(&self.graph);
            if wave.is_empty() {
                wave = schedule.cycle_cells(&self.graph);
                if wave.is_empty() {
                    break;
                }
            }
            for &key in &wave {
                schedule.complete(&self.graph, key);
            }
            order.extend(wave);
        }

        order.retain(|&key| key != cell);
        order
    }

    /// Formula cells with their text, in cell order
    pub fn formula_cells(&self) -> impl Iterator<Item = (CellKey, &str)> + '_ {
        let mut keys: Vec<CellKey> = self.parsed.keys().copied().collect();
        keys.sort_unstable();
        keys.into_iter()
            .filter_map(move |key| self.parsed.get(&key).map(|p| (key, p.text.as_str())))
    }

    // === Editing ===

    /// Store `text` as the formula of `cell`, recalculate and return the
    /// cell's new value
    ///
    /// A formula that does not parse yields `#ERROR!`; the text is kept in
    /// the cell as plain text.
    pub fn evaluate_formula(&mut self, cell: CellKey, text: &str) -> CellValue {
        let report = self.update_cell(cell, CellInput::Formula(text.to_string()));
        if report.syntax_error.is_some() {
            return CellValue::Error(CellError::Syntax);
        }
        self.get_value(cell)
    }

    /// Set a literal value and recalculate
    pub fn set_cell_value(&mut self, cell: CellKey, value: impl Into<CellValue>) -> RecalcReport {
        self.update_cell(cell, CellInput::from_cell_value(value.into()))
    }

    /// Set a formula and recalculate
    pub fn set_cell_formula(&mut self, cell: CellKey, text: &str) -> RecalcReport {
        self.update_cell(cell, CellInput::Formula(text.to_string()))
    }

    /// Clear a cell and recalculate its dependents
    pub fn clear_cell(&mut self, cell: CellKey) -> RecalcReport {
        self.update_cell(cell, CellInput::Empty)
    }

    /// Set a cell from user text, addressed in A1 notation
    pub fn set(&mut self, reference: &str, input: &str) -> Result<RecalcReport> {
        let cell = self.cell_key(reference)?;
        Ok(self.update_cell(cell, CellInput::parse(input)))
    }

    /// Effective value of a cell addressed in A1 notation
    pub fn value(&self, reference: &str) -> Result<CellValue> {
        Ok(self.get_value(self.cell_key(reference)?))
    }

    /// Change the content of a cell and recalculate everything affected
    ///
    /// The cell's references are replaced first; cells referencing it keep
    /// their edges. Then the cell and all its transitive dependents are
    /// recalculated in dependency order.
    pub fn update_cell(&mut self, cell: CellKey, input: CellInput) -> RecalcReport {
        let input = match input {
            CellInput::Value(CellValue::Formula { text, .. }) => CellInput::Formula(text),
            CellInput::Value(CellValue::Empty) => CellInput::Empty,
            other => other,
        };

        let mut report = RecalcReport::default();
        self.unresolved.remove(&cell);

        match input {
            CellInput::Empty => {
                self.parsed.remove(&cell);
                self.graph.clear_precedents(cell);
                self.store.remove(cell);
            }
            CellInput::Value(value) => {
                self.parsed.remove(&cell);
                self.graph.clear_precedents(cell);
                self.store.set(cell, value);
            }
            CellInput::Formula(text) => {
                if let Err(error) = self.install_formula(cell, text) {
                    report.syntax_error = Some(error);
                }
            }
        }

        self.recalculate_from([cell], &mut report);
        report
    }

    /// Re-link every formula and recalculate all of them
    pub fn recalculate_all(&mut self) -> RecalcReport {
        let mut cells: Vec<CellKey> = self.parsed.keys().copied().collect();
        cells.sort_unstable();

        self.unresolved.clear();
        for &cell in &cells {
            self.link(cell);
        }

        let mut report = RecalcReport::default();
        self.recalculate_from(cells, &mut report);
        report
    }

    /// Parse `text` (reusing the cached tree when it is unchanged), store it
    /// and link the cell to what it references
    fn install_formula(
        &mut self,
        cell: CellKey,
        text: String,
    ) -> std::result::Result<(), FormulaError> {
        let cached = matches!(self.parsed.get(&cell), Some(p) if p.text == text);
        if !cached {
            match parse_formula(&text, &self.functions) {
                Ok(expr) => {
                    self.parsed.insert(
                        cell,
                        ParsedFormula {
                            text: text.clone(),
                            expr,
                        },
                    );
                }
                Err(error) => {
                    warn!(cell = %self.cell_name(cell), %error, "formula does not parse");
                    self.parsed.remove(&cell);
                    self.graph.clear_precedents(cell);
                    self.store.set(cell, CellValue::string(&text));
                    return Err(error);
                }
            }
        }

        self.store.set_formula(cell, text);
        self.link(cell);
        Ok(())
    }

    /// Replace the edges of a formula cell with its resolved references
    fn link(&mut self, cell: CellKey) {
        let mut precedents = Vec::new();
        let mut unresolved = false;

        match self.parsed.get(&cell) {
            Some(parsed) => {
                for reference in parsed.expr.dependencies() {
                    match self.resolve_reference(reference, cell.sheet) {
                        Some(key) => precedents.push(key),
                        None => unresolved = true,
                    }
                }
            }
            None => return,
        }

        self.graph.set_precedents(cell, precedents);
        if unresolved {
            self.unresolved.insert(cell);
        } else {
            self.unresolved.remove(&cell);
        }
    }

    fn resolve_reference(&self, reference: &CellReference, current: usize) -> Option<CellKey> {
        let sheet = match reference.sheet.as_deref() {
            Some(name) => self.sheet_index(name)?,
            None => current,
        };
        Some(CellKey::from_address(sheet, &reference.address))
    }

    /// Recalculate `roots` and everything downstream of them
    ///
    /// Ready cells are evaluated wave by wave. When nothing is ready but
    /// cells remain, the cycles blocking them are published as `#CIRCULAR!`
    /// and a new round starts.
    fn recalculate_from(
        &mut self,
        roots: impl IntoIterator<Item = CellKey>,
        report: &mut RecalcReport,
    ) {
        let mut schedule = RecalcSchedule::new(&self.graph, roots);
        let affected = schedule.affected_keys(&self.graph);
        if affected.is_empty() {
            return;
        }
        for &cell in &affected {
            self.graph.set_state(cell, CellState::Dirty);
        }
        debug!(cells = affected.len(), "recalculation started");

        // Every affected cell is evaluated at most once per pass
        let mut budget = affected.len();
        report.rounds += 1;

        while !schedule.is_finished() {
            let wave = schedule.take_wave(&self.graph);
            if wave.is_empty() {
                if report.rounds >= self.options.max_iterations {
                    break;
                }
                let cycle = schedule.cycle_cells(&self.graph);
                if cycle.is_empty() {
                    break;
                }
                report.rounds += 1;
                warn!(cells = cycle.len(), "circular reference");
                for &cell in &cycle {
                    self.store.publish(cell, CellValue::Error(CellError::Circular));
                    self.graph.set_state(cell, CellState::Clean);
                    schedule.complete(&self.graph, cell);
                }
                budget = budget.saturating_sub(cycle.len());
                report.circular.extend(cycle);
                continue;
            }

            if wave.len() > budget {
                break;
            }
            budget -= wave.len();
            report.waves += 1;
            for cell in wave {
                self.recalc_cell(cell, report);
                schedule.complete(&self.graph, cell);
            }
        }

        if !schedule.is_finished() {
            let remaining = schedule.remaining(&self.graph);
            warn!(
                cells = remaining.len(),
                max_iterations = self.options.max_iterations,
                "recalculation stopped at the round limit"
            );
            for cell in remaining {
                if self.parsed.contains_key(&cell) {
                    self.store.publish(cell, CellValue::Error(CellError::RecalcLimit));
                    report.unfinished.push(cell);
                } else {
                    self.graph.set_state(cell, CellState::Clean);
                }
            }
        }

        debug!(
            evaluated = report.evaluated.len(),
            circular = report.circular.len(),
            failures = report.failures.len(),
            waves = report.waves,
            rounds = report.rounds,
            "recalculation finished"
        );
    }

    /// Evaluate one cell and publish the result
    fn recalc_cell(&mut self, cell: CellKey, report: &mut RecalcReport) {
        let parsed = match self.parsed.get(&cell) {
            Some(parsed) => parsed,
            None => {
                self.graph.set_state(cell, CellState::Clean);
                return;
            }
        };

        self.graph.set_state(cell, CellState::Evaluating);
        let lookup = EngineLookup { engine: &*self };
        let ctx = EvaluationContext::new(&lookup, &self.functions, cell);
        let result = evaluate_formula_result(&parsed.expr, &ctx);

        match result {
            Ok(value) => {
                trace!(cell = %self.cell_name(cell), ?value, "evaluated");
                self.store.publish(cell, CellValue::from(value));
                self.graph.set_state(cell, CellState::Clean);
                report.evaluated.push(cell);
            }
            Err(error) => {
                warn!(cell = %self.cell_name(cell), %error, "evaluation failed");
                self.graph.set_state(cell, CellState::Dirty);
                report.failures.push(RecalcFailure { cell, error });
            }
        }
    }
}

/// Read access for the evaluator
struct EngineLookup<'a> {
    engine: &'a CalculationEngine,
}

impl CellLookup for EngineLookup<'_> {
    fn resolve_sheet(&self, name: Option<&str>, current: usize) -> Option<usize> {
        match name {
            Some(name) => self.engine.sheet_index(name),
            None => Some(current),
        }
    }

    fn cell_value(&self, key: CellKey) -> FormulaValue {
        if self.engine.graph.state(key) == CellState::Evaluating {
            return FormulaValue::Error(CellError::Circular);
        }
        self.engine
            .store
            .get(key)
            .map(FormulaValue::from)
            .unwrap_or(FormulaValue::Empty)
    }
}

fn validate_sheet_name(name: &str) -> Result<()> {
    let invalid = name.trim().is_empty()
        || name.chars().count() > MAX_SHEET_NAME_LEN
        || name.starts_with('\'')
        || name.ends_with('\'')
        || name.contains(['[', ']', ':', '*', '?', '/', '\\']);

    if invalid {
        return Err(Error::InvalidSheetName(name.to_string()));
    }
    Ok(())
}

fn needs_quotes(name: &str) -> bool {
    !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn quote_sheet_name(name: &str) -> String {
    if needs_quotes(name) {
        format!("'{}'", name.replace('\'', "''"))
    } else {
        name.to_string()
    }
}

fn unquote_sheet_name(name: &str) -> String {
    match name.strip_prefix('\'').and_then(|n| n.strip_suffix('\'')) {
        Some(inner) => inner.replace("''", "'"),
        None => name.to_string(),
    }
}
