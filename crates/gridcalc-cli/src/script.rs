//! Cell-edit scripts
//!
//! One command per line:
//!
//! ```text
//! # comments and blank lines are ignored
//! sheet Data          add a sheet
//! A1 = 10             set a cell to what follows the first `=`
//! B1 = =A1*2          ... which may itself be a formula
//! print B1            write the current value of a cell
//! ```

use anyhow::{bail, Context, Result};
use gridcalc::{format_number, CalculationEngine, CellValue, RecalcReport};
use std::io::Write;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Sheet(String),
    Set { cell: String, input: String },
    Print(String),
}

/// A command with its 1-based line number
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub number: usize,
    pub command: Command,
}

/// `rest` when `line` starts with `keyword` (case-insensitive) and whitespace
fn strip_keyword<'a>(line: &'a str, keyword: &str) -> Option<&'a str> {
    let (head, rest) = line.split_once(char::is_whitespace)?;
    if head.eq_ignore_ascii_case(keyword) {
        Some(rest.trim())
    } else {
        None
    }
}

pub fn parse(text: &str) -> Result<Vec<Line>> {
    let mut lines = Vec::new();

    for (index, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let number = index + 1;

        let command = if let Some(name) = strip_keyword(line, "sheet") {
            Command::Sheet(name.to_string())
        } else if let Some(cell) = strip_keyword(line, "print") {
            Command::Print(cell.to_string())
        } else if let Some((cell, input)) = line.split_once('=') {
            let cell = cell.trim();
            if cell.is_empty() {
                bail!("line {number}: missing cell before '='");
            }
            Command::Set {
                cell: cell.to_string(),
                input: input.trim().to_string(),
            }
        } else {
            bail!("line {number}: expected `CELL = VALUE`, `sheet NAME` or `print CELL`");
        };

        lines.push(Line { number, command });
    }

    Ok(lines)
}

/// Apply every command to `engine`, writing `print` output and formula
/// errors to `out`
pub fn run(engine: &mut CalculationEngine, lines: &[Line], out: &mut impl Write) -> Result<()> {
    for line in lines {
        let number = line.number;
        match &line.command {
            Command::Sheet(name) => {
                let (_, report) = engine
                    .add_sheet(name)
                    .with_context(|| format!("line {number}: cannot add sheet '{name}'"))?;
                write_failures(engine, number, &report, out)?;
            }
            Command::Set { cell, input } => {
                let report = engine
                    .set(cell, input)
                    .with_context(|| format!("line {number}: cannot set '{cell}'"))?;
                if let Some(error) = &report.syntax_error {
                    writeln!(out, "line {number}: {cell}: {error}")?;
                }
                write_failures(engine, number, &report, out)?;
            }
            Command::Print(cell) => {
                let value = engine
                    .value(cell)
                    .with_context(|| format!("line {number}: cannot read '{cell}'"))?;
                writeln!(out, "{cell} = {}", display_value(&value))?;
            }
        }
    }
    Ok(())
}

fn write_failures(
    engine: &CalculationEngine,
    number: usize,
    report: &RecalcReport,
    out: &mut impl Write,
) -> Result<()> {
    for failure in &report.failures {
        let cell = engine.cell_name(failure.cell);
        writeln!(out, "line {number}: {cell}: {}", failure.error)?;
    }
    Ok(())
}

/// A value the way a grid shows it
pub fn display_value(value: &CellValue) -> String {
    match value.effective_value() {
        CellValue::Number(n) => format_number(*n),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn run_text(text: &str) -> String {
        let mut engine = CalculationEngine::new();
        let lines = parse(text).unwrap();
        let mut out = Vec::new();
        run(&mut engine, &lines, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_parse_commands() {
        let text = "# header\n\nsheet My Data\nA1 = 10\nB1 = =A1*2\nprint B1\nC1 =\n";
        let lines = parse(text).unwrap();
        let commands: Vec<Command> = lines.iter().map(|l| l.command.clone()).collect();
        assert_eq!(
            commands,
            vec![
                Command::Sheet("My Data".into()),
                Command::Set { cell: "A1".into(), input: "10".into() },
                Command::Set { cell: "B1".into(), input: "=A1*2".into() },
                Command::Print("B1".into()),
                Command::Set { cell: "C1".into(), input: String::new() },
            ]
        );
        assert_eq!(lines[0].number, 3);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let err = parse("A1 = 1\nwhat is this\n").unwrap_err();
        assert!(err.to_string().starts_with("line 2:"));
        assert!(parse("= 5").is_err());
    }

    #[test]
    fn test_run_prints_recalculated_values() {
        let output = run_text("A1 = 2\nB1 = =A1*2\nC1 = =B1+1\nA1 = 4\nprint B1\nprint C1\n");
        assert_eq!(output, "B1 = 8\nC1 = 9\n");
    }

    #[test]
    fn test_run_reports_syntax_errors() {
        let output = run_text("A1 = =1+\nprint A1\n");
        assert!(output.starts_with("line 1: A1: Syntax error"));
        assert!(output.ends_with("A1 = =1+\n"));
    }

    #[test]
    fn test_run_with_sheets() {
        let output = run_text("sheet Data\nData!A1 = 5\nA1 = =Data!A1/2\nprint A1\n");
        assert_eq!(output, "A1 = 2.5\n");

        let output = run_text("A1 = =Data!A1+1\nsheet Data\nprint A1\n");
        assert_eq!(output, "A1 = 1\n");

        let mut engine = CalculationEngine::new();
        let lines = parse("Missing!A1 = 1").unwrap();
        let err = run(&mut engine, &lines, &mut Vec::new()).unwrap_err();
        assert!(err.to_string().contains("line 1"));
    }

    #[test]
    fn test_display_value() {
        assert_eq!(display_value(&CellValue::Number(3.0)), "3");
        assert_eq!(display_value(&CellValue::Boolean(true)), "TRUE");
        assert_eq!(display_value(&CellValue::Empty), "");
    }
}
