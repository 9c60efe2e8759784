//! Tests for incremental recalculation through the engine

use gridcalc::prelude::*;
use gridcalc::{EvaluationContext, FormulaResult, FormulaValue};
use pretty_assertions::assert_eq;

fn key(engine: &CalculationEngine, a1: &str) -> CellKey {
    engine.cell_key(a1).unwrap()
}

fn number(n: f64) -> CellValue {
    CellValue::Number(n)
}

/// SUM over a range of literal cells
#[test]
fn test_sum_over_range() {
    let mut engine = CalculationEngine::new();
    engine.set("A1", "2").unwrap();
    engine.set("A2", "3").unwrap();
    engine.set("A3", "5").unwrap();

    let b1 = key(&engine, "B1");
    assert_eq!(engine.evaluate_formula(b1, "=SUM(A1:A3)"), number(10.0));

    // Every cell of the range is a precedent
    let a2 = key(&engine, "A2");
    assert_eq!(engine.get_dependent_cells(a2), vec![b1]);
    assert_eq!(engine.get_precedent_cells(b1).len(), 3);
}

#[test]
fn test_division_by_zero_is_a_value() {
    let mut engine = CalculationEngine::new();
    let a1 = key(&engine, "A1");

    let report = engine.set_cell_formula(a1, "=1/0");
    assert!(report.is_clean());
    assert_eq!(engine.get_value(a1), CellValue::Error(CellError::Div0));
}

#[test]
fn test_two_cell_cycle_is_circular() {
    let mut engine = CalculationEngine::new();
    let (a1, b1) = (key(&engine, "A1"), key(&engine, "B1"));

    engine.set_cell_formula(a1, "=B1");
    assert_eq!(engine.get_value(a1), number(0.0));

    let report = engine.set_cell_formula(b1, "=A1");
    assert_eq!(report.circular, vec![a1, b1]);
    assert_eq!(engine.get_value(a1), CellValue::Error(CellError::Circular));
    assert_eq!(engine.get_value(b1), CellValue::Error(CellError::Circular));
    assert_eq!(engine.cell_state(a1), CellState::Clean);
}

#[test]
fn test_self_reference_is_circular() {
    let mut engine = CalculationEngine::new();
    let a1 = key(&engine, "A1");

    assert_eq!(
        engine.evaluate_formula(a1, "=A1+1"),
        CellValue::Error(CellError::Circular)
    );
}

#[test]
fn test_cells_downstream_of_a_cycle_see_the_error() {
    let mut engine = CalculationEngine::new();
    engine.set("C1", "=IFERROR(A1,\"cycle\")").unwrap();
    engine.set("D1", "=A1+1").unwrap();
    engine.set("A1", "=B1").unwrap();
    let report = engine.set("B1", "=A1").unwrap();

    let (c1, d1) = (key(&engine, "C1"), key(&engine, "D1"));
    assert_eq!(report.circular.len(), 2);
    assert!(report.evaluated.contains(&c1));
    assert!(report.evaluated.contains(&d1));
    assert_eq!(engine.value("C1").unwrap(), CellValue::string("cycle"));
    assert_eq!(engine.value("D1").unwrap(), CellValue::Error(CellError::Circular));
}

#[test]
fn test_chain_updates_in_one_pass() {
    let mut engine = CalculationEngine::new();
    engine.set("A1", "2").unwrap();
    engine.set("B1", "=A1*2").unwrap();
    engine.set("C1", "=B1+1").unwrap();
    assert_eq!(engine.value("C1").unwrap(), number(5.0));

    let report = engine.set("A1", "4").unwrap();
    assert_eq!(report.evaluated, vec![key(&engine, "B1"), key(&engine, "C1")]);
    assert_eq!(report.waves, 3);
    assert_eq!(engine.value("B1").unwrap(), number(8.0));
    assert_eq!(engine.value("C1").unwrap(), number(9.0));
}

#[test]
fn test_literal_replaces_formula_edges() {
    let mut engine = CalculationEngine::new();
    let (a1, b1, c1) = (key(&engine, "A1"), key(&engine, "B1"), key(&engine, "C1"));

    engine.set_cell_value(a1, 1.0);
    engine.set_cell_formula(b1, "=A1");
    engine.set_cell_formula(c1, "=B1");
    assert_eq!(engine.get_dependent_cells(a1), vec![b1]);

    engine.set_cell_value(b1, 5.0);
    assert!(engine.get_precedent_cells(b1).is_empty());
    assert!(engine.get_dependent_cells(a1).is_empty());
    assert_eq!(engine.get_dependent_cells(b1), vec![c1]);
    assert_eq!(engine.get_value(c1), number(5.0));
    assert_eq!(engine.get_formula(b1), None);
}

#[test]
fn test_breaking_a_cycle_recomputes_members() {
    let mut engine = CalculationEngine::new();
    engine.set("A1", "=B1*2").unwrap();
    engine.set("B1", "=A1").unwrap();
    assert_eq!(engine.value("A1").unwrap(), CellValue::Error(CellError::Circular));

    let report = engine.set("B1", "7").unwrap();
    assert!(report.is_clean());
    assert_eq!(engine.value("A1").unwrap(), number(14.0));
    assert_eq!(engine.value("B1").unwrap(), number(7.0));
}

/// A running total far deeper than the round limit still completes
#[test]
fn test_deep_chain_recalculates_completely() {
    let mut engine = CalculationEngine::new();
    engine.set("A1", "1").unwrap();
    for row in 2..=1500 {
        engine.set(&format!("A{row}"), &format!("=A{}+1", row - 1)).unwrap();
    }
    assert_eq!(engine.value("A1500").unwrap(), number(1500.0));

    let report = engine.set("A1", "2").unwrap();
    assert!(report.is_clean());
    assert_eq!(report.evaluated.len(), 1499);
    assert_eq!(report.waves, 1500);
    assert_eq!(report.rounds, 1);
    assert_eq!(engine.value("A1500").unwrap(), number(1501.0));
    assert_eq!(engine.cell_state(key(&engine, "A1500")), CellState::Clean);
}

fn build_cycle(engine: &mut CalculationEngine) -> RecalcReport {
    engine.set("A1", "=B1").unwrap();
    engine.set("C1", "=A1+1").unwrap();
    engine.set("B1", "=A1+D1").unwrap();
    engine.set("D1", "5").unwrap()
}

#[test]
fn test_round_limit_leaves_cycle_unresolved() {
    let options = CalculationOptions { max_iterations: 1 };
    let mut engine = CalculationEngine::with_options(options);
    let report = build_cycle(&mut engine);

    let stuck: Vec<CellKey> = ["A1", "B1", "C1"].iter().map(|a| key(&engine, a)).collect();
    let d1 = key(&engine, "D1");
    assert_eq!(report.rounds, 1);
    assert_eq!(report.waves, 1);
    assert!(report.circular.is_empty());
    assert_eq!(report.unfinished, stuck);
    for cell in stuck {
        assert_eq!(engine.get_value(cell), CellValue::Error(CellError::RecalcLimit));
        assert_eq!(engine.cell_state(cell), CellState::Dirty);
    }
    assert_eq!(engine.get_value(d1), number(5.0));
    assert_eq!(engine.cell_state(d1), CellState::Clean);
}

#[test]
fn test_breaking_a_cycle_takes_a_round() {
    let mut engine = CalculationEngine::new();
    let report = build_cycle(&mut engine);

    let (a1, b1) = (key(&engine, "A1"), key(&engine, "B1"));
    assert_eq!(report.rounds, 2);
    assert_eq!(report.circular, vec![a1, b1]);
    assert!(report.unfinished.is_empty());
    assert_eq!(engine.value("C1").unwrap(), CellValue::Error(CellError::Circular));
}

#[test]
fn test_repeated_evaluation_is_bit_identical() {
    let mut engine = CalculationEngine::new();
    engine.set("A1", "0.1").unwrap();
    engine.set("A2", "0.2").unwrap();
    let b1 = key(&engine, "B1");

    let first = engine.evaluate_formula(b1, "=A1+A2/3*PI()");
    let second = engine.evaluate_formula(b1, "=A1+A2/3*PI()");
    match (first, second) {
        (CellValue::Number(x), CellValue::Number(y)) => assert_eq!(x.to_bits(), y.to_bits()),
        other => panic!("expected numbers, got {other:?}"),
    }
}

#[test]
fn test_clear_cell_recalculates_dependents() {
    let mut engine = CalculationEngine::new();
    engine.set("A1", "5").unwrap();
    engine.set("B1", "=A1*2").unwrap();

    let a1 = key(&engine, "A1");
    engine.clear_cell(a1);
    assert_eq!(engine.get_value(a1), CellValue::Empty);
    assert_eq!(engine.value("B1").unwrap(), number(0.0));
}

#[test]
fn test_all_dependents_in_calculation_order() {
    let mut engine = CalculationEngine::new();
    engine.set("A1", "1").unwrap();
    engine.set("C1", "=A1+B1").unwrap();
    engine.set("B1", "=A1").unwrap();
    engine.set("D1", "=C1").unwrap();

    let a1 = key(&engine, "A1");
    let expected: Vec<CellKey> = ["B1", "C1", "D1"].iter().map(|a| key(&engine, a)).collect();
    assert_eq!(engine.get_all_dependents(a1), expected);
    assert!(engine.get_all_dependents(key(&engine, "D1")).is_empty());
}

#[test]
fn test_cross_sheet_references() {
    let mut engine = CalculationEngine::new();
    engine.add_sheet("Data Sheet").unwrap();
    engine.set("'Data Sheet'!A1", "21").unwrap();
    engine.set("A1", "='Data Sheet'!A1*2").unwrap();
    assert_eq!(engine.value("A1").unwrap(), number(42.0));

    engine.set("'data sheet'!A1", "1").unwrap();
    assert_eq!(engine.value("A1").unwrap(), number(2.0));
}

#[test]
fn test_missing_sheet_resolves_when_added() {
    let mut engine = CalculationEngine::new();
    engine.set("A1", "=Later!B2+1").unwrap();
    assert_eq!(engine.value("A1").unwrap(), CellValue::Error(CellError::Ref));

    let (index, report) = engine.add_sheet("Later").unwrap();
    assert_eq!(index, 1);
    assert_eq!(report.evaluated, vec![key(&engine, "A1")]);
    assert_eq!(engine.value("A1").unwrap(), number(1.0));

    engine.set("Later!B2", "41").unwrap();
    assert_eq!(engine.value("A1").unwrap(), number(42.0));
}

#[test]
fn test_syntax_error_has_no_edges() {
    let mut engine = CalculationEngine::new();
    let a1 = key(&engine, "A1");
    engine.set_cell_formula(a1, "=B1+1");
    assert_eq!(engine.get_precedent_cells(a1).len(), 1);

    let report = engine.set_cell_formula(a1, "=B1+(");
    assert!(matches!(report.syntax_error, Some(FormulaError::Syntax { .. })));
    assert!(engine.get_precedent_cells(a1).is_empty());
    assert_eq!(engine.get_value(a1), CellValue::string("=B1+("));
}

fn boom(_args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    Err(FormulaError::Evaluation("boom".into()))
}

#[test]
fn test_internal_fault_keeps_previous_value() {
    let mut functions = FunctionRegistry::new();
    functions.register(FunctionDef::new("BOOM", 1, Some(1), boom));
    let mut engine = CalculationEngine::with_functions(functions, CalculationOptions::default());

    engine.set("A1", "1").unwrap();
    engine.set("B1", "=A1+1").unwrap();
    engine.set("C1", "=B1*10").unwrap();

    let report = engine.set("B1", "=BOOM(A1)").unwrap();
    let (b1, c1) = (key(&engine, "B1"), key(&engine, "C1"));
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].cell, b1);
    assert_eq!(report.evaluated, vec![c1]);
    assert_eq!(engine.get_value(b1), number(2.0));
    assert_eq!(engine.cell_state(b1), CellState::Dirty);
    assert_eq!(engine.get_value(c1), number(20.0));
    assert_eq!(engine.get_formula(b1), Some("=BOOM(A1)"));
}

#[test]
fn test_add_sheet_reports_faults_of_relinked_formulas() {
    let mut functions = FunctionRegistry::new();
    functions.register(FunctionDef::new("BOOM", 1, Some(1), boom));
    let mut engine = CalculationEngine::with_functions(functions, CalculationOptions::default());

    // The #REF! argument short-circuits BOOM until the sheet exists
    engine.set("A1", "=BOOM(Later!A1)").unwrap();
    assert_eq!(engine.value("A1").unwrap(), CellValue::Error(CellError::Ref));

    let (_, report) = engine.add_sheet("Later").unwrap();
    let a1 = key(&engine, "A1");
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].cell, a1);
    assert!(!report.is_clean());
    assert_eq!(engine.cell_state(a1), CellState::Dirty);
}

#[test]
fn test_recalculate_all_visits_every_formula() {
    let mut engine = CalculationEngine::new();
    engine.set("A1", "3").unwrap();
    engine.set("B1", "=A1*A1").unwrap();
    engine.set("B2", "=B1-1").unwrap();
    engine.set("C5", "=LEN(\"abc\")").unwrap();

    let report = engine.recalculate_all();
    assert_eq!(report.evaluated.len(), 3);
    assert!(report.is_clean());

    let formulas: Vec<(String, String)> = engine
        .formula_cells()
        .map(|(cell, text)| (engine.cell_name(cell), text.to_string()))
        .collect();
    assert_eq!(
        formulas,
        vec![
            ("Sheet1!B1".to_string(), "=A1*A1".to_string()),
            ("Sheet1!B2".to_string(), "=B1-1".to_string()),
            ("Sheet1!C5".to_string(), "=LEN(\"abc\")".to_string()),
        ]
    );
}
