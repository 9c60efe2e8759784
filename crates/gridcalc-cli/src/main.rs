//! gridcalc CLI - evaluate formulas and replay cell edits

mod script;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gridcalc::prelude::*;
use gridcalc::parse_formula;
use serde::Serialize;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gridcalc")]
#[command(author, version, about = "Spreadsheet formula calculator")]
struct Cli {
    /// More log output on stderr (-v, -vv, -vvv); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate standalone formulas, e.g. "=SUM(1,2)*3"
    Eval {
        /// Formulas to evaluate, each on its own
        #[arg(required = true)]
        formulas: Vec<String>,

        /// Print the parsed expression instead of its value
        #[arg(long)]
        tree: bool,
    },

    /// Run a cell-edit script and print the resulting cells
    Run {
        /// Script file (default: stdin)
        script: Option<PathBuf>,

        /// Also list precedents and dependents of each cell
        #[arg(short, long)]
        deps: bool,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,

        /// Maximum scheduling rounds per recalculation (one plus the cycles broken)
        #[arg(long, default_value_t = CalculationOptions::default().max_iterations)]
        max_iterations: u32,
    },

    /// List the built-in functions
    Functions,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Eval { formulas, tree } => eval_formulas(&formulas, tree),
        Commands::Run {
            script,
            deps,
            json,
            max_iterations,
        } => run_script(script.as_ref(), deps, json, max_iterations),
        Commands::Functions => list_functions(),
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn eval_formulas(formulas: &[String], tree: bool) -> Result<()> {
    let mut stdout = io::stdout().lock();

    for formula in formulas {
        if tree {
            let functions = FunctionRegistry::new();
            let expr = parse_formula(formula, &functions)
                .with_context(|| format!("Failed to parse '{}'", formula))?;
            writeln!(stdout, "{}", expr)?;
            continue;
        }

        let mut engine = CalculationEngine::new();
        let value = engine.evaluate_formula(CellKey::new(0, 0, 0), formula);
        writeln!(stdout, "{}", script::display_value(&value))?;
    }
    Ok(())
}

fn run_script(path: Option<&PathBuf>, deps: bool, json: bool, max_iterations: u32) -> Result<()> {
    let text = match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read '{}'", path.display()))?,
        None => {
            let mut text = String::new();
            io::stdin()
                .read_to_string(&mut text)
                .context("Failed to read script from stdin")?;
            text
        }
    };

    let lines = script::parse(&text)?;
    debug!(commands = lines.len(), max_iterations, "running script");
    let mut engine = CalculationEngine::with_options(CalculationOptions { max_iterations });
    let mut stdout = io::stdout().lock();
    script::run(&mut engine, &lines, &mut stdout)?;

    if json {
        serde_json::to_writer_pretty(&mut stdout, &SheetDump::new(&engine))
            .context("Failed to write JSON")?;
        writeln!(stdout)?;
    } else {
        write_cells(&engine, deps, &mut stdout)?;
    }
    Ok(())
}

/// Every non-empty cell, in sheet/row/column order
fn sorted_cells(engine: &CalculationEngine) -> Vec<CellKey> {
    let mut cells: Vec<CellKey> = engine.store().iter().map(|(key, _)| key).collect();
    cells.sort_unstable();
    cells
}

fn cell_names(engine: &CalculationEngine, cells: Vec<CellKey>) -> Vec<String> {
    cells.into_iter().map(|c| engine.cell_name(c)).collect()
}

fn write_cells(engine: &CalculationEngine, deps: bool, out: &mut impl Write) -> Result<()> {
    for cell in sorted_cells(engine) {
        let name = engine.cell_name(cell);
        let value = script::display_value(&engine.get_value(cell));
        match engine.get_formula(cell) {
            Some(formula) => writeln!(out, "{name}\t{formula}\t{value}")?,
            None => writeln!(out, "{name}\t{value}")?,
        }

        if deps {
            let precedents = cell_names(engine, engine.get_precedent_cells(cell));
            let dependents = cell_names(engine, engine.get_dependent_cells(cell));
            if !precedents.is_empty() {
                writeln!(out, "  <- {}", precedents.join(", "))?;
            }
            if !dependents.is_empty() {
                writeln!(out, "  -> {}", dependents.join(", "))?;
            }
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct SheetDump {
    sheets: Vec<String>,
    cells: Vec<CellDump>,
}

#[derive(Serialize)]
struct CellDump {
    cell: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    formula: Option<String>,
    value: CellValue,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    precedents: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    dependents: Vec<String>,
}

impl SheetDump {
    fn new(engine: &CalculationEngine) -> Self {
        let cells = sorted_cells(engine)
            .into_iter()
            .map(|cell| CellDump {
                cell: engine.cell_name(cell),
                formula: engine.get_formula(cell).map(str::to_string),
                value: engine.get_value(cell),
                precedents: cell_names(engine, engine.get_precedent_cells(cell)),
                dependents: cell_names(engine, engine.get_dependent_cells(cell)),
            })
            .collect();

        Self {
            sheets: engine.sheet_names().to_vec(),
            cells,
        }
    }
}

fn list_functions() -> Result<()> {
    let functions = FunctionRegistry::new();
    let mut stdout = io::stdout().lock();

    for name in functions.names() {
        if let Some(def) = functions.get(name) {
            writeln!(stdout, "{:<12} {} arguments", name, def.arity_description())?;
        }
    }
    Ok(())
}
