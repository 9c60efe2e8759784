//! Formula expression tree
//!
//! Every [`Expr`] node carries the distinct cells it reads, computed once
//! when the node is built. Ranges contribute every cell of their rectangle,
//! row by row, and the list keeps first-occurrence order.

use ahash::AHashSet;
use gridcalc_core::{CellAddress, CellError, CellRange};
use std::fmt;
use std::sync::Arc;

/// Cell reference with optional sheet name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CellReference {
    pub sheet: Option<Arc<str>>,
    pub address: CellAddress,
}

impl CellReference {
    pub fn new(sheet: Option<Arc<str>>, address: CellAddress) -> Self {
        Self { sheet, address }
    }

    /// Same cell with the `$` markers dropped
    fn normalized(&self) -> Self {
        Self {
            sheet: self.sheet.clone(),
            address: CellAddress::new(self.address.row, self.address.col),
        }
    }
}

impl fmt::Display for CellReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_sheet_prefix(f, self.sheet.as_deref())?;
        write!(f, "{}", self.address)
    }
}

/// Range reference with optional sheet name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RangeReference {
    pub sheet: Option<Arc<str>>,
    pub range: CellRange,
}

impl RangeReference {
    pub fn new(sheet: Option<Arc<str>>, range: CellRange) -> Self {
        Self { sheet, range }
    }

    /// Every cell of the rectangle as a reference, row by row
    pub fn cells(&self) -> impl Iterator<Item = CellReference> + '_ {
        self.range
            .cells()
            .map(move |address| CellReference::new(self.sheet.clone(), address))
    }
}

impl fmt::Display for RangeReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_sheet_prefix(f, self.sheet.as_deref())?;
        write!(f, "{}:{}", self.range.start, self.range.end)
    }
}

fn write_sheet_prefix(f: &mut fmt::Formatter<'_>, sheet: Option<&str>) -> fmt::Result {
    match sheet {
        None => Ok(()),
        Some(name) if name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') => {
            write!(f, "{}!", name)
        }
        Some(name) => write!(f, "'{}'!", name.replace('\'', "''")),
    }
}

/// Literal values typed by their lexical form
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Number(f64),
    String(String),
    Boolean(bool),
    Error(CellError),
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    // Arithmetic
    Add,
    Subtract,
    Multiply,
    Divide,
    Power,

    // Comparison
    Equal,
    NotEqual,
    LessThan,
    LessEqual,
    GreaterThan,
    GreaterEqual,

    // Text
    Concat,
}

impl BinaryOperator {
    /// Binding power; higher binds tighter
    pub fn precedence(self) -> u8 {
        match self {
            BinaryOperator::Equal
            | BinaryOperator::NotEqual
            | BinaryOperator::LessThan
            | BinaryOperator::LessEqual
            | BinaryOperator::GreaterThan
            | BinaryOperator::GreaterEqual => 1,
            BinaryOperator::Concat => 2,
            BinaryOperator::Add | BinaryOperator::Subtract => 3,
            BinaryOperator::Multiply | BinaryOperator::Divide => 4,
            BinaryOperator::Power => 5,
        }
    }

    pub fn is_right_associative(self) -> bool {
        matches!(self, BinaryOperator::Power)
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Subtract => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
            BinaryOperator::Power => "^",
            BinaryOperator::Equal => "=",
            BinaryOperator::NotEqual => "<>",
            BinaryOperator::LessThan => "<",
            BinaryOperator::LessEqual => "<=",
            BinaryOperator::GreaterThan => ">",
            BinaryOperator::GreaterEqual => ">=",
            BinaryOperator::Concat => "&",
        }
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    /// Prefix `-`
    Negate,
    /// Prefix `+`
    Plus,
    /// Postfix `%`
    Percent,
}

/// Node variants of the expression tree
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Literal(Literal),
    CellRef(CellReference),
    RangeRef(RangeReference),
    BinaryOp {
        op: BinaryOperator,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    UnaryOp {
        op: UnaryOperator,
        operand: Box<Expr>,
    },
    /// Function call; `name` is upper case
    Function { name: String, args: Vec<Expr> },
}

/// Expression tree node with its cached dependency list
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    deps: Arc<[CellReference]>,
    depth: usize,
}

impl Expr {
    pub fn literal(literal: Literal) -> Self {
        Self::leaf(ExprKind::Literal(literal), no_dependencies())
    }

    pub fn number(n: f64) -> Self {
        Self::literal(Literal::Number(n))
    }

    pub fn cell(reference: CellReference) -> Self {
        let deps: Arc<[CellReference]> = Arc::from(vec![reference.normalized()]);
        Self::leaf(ExprKind::CellRef(reference), deps)
    }

    pub fn range(reference: RangeReference) -> Self {
        let deps: Arc<[CellReference]> = reference.cells().collect();
        Self::leaf(ExprKind::RangeRef(reference), deps)
    }

    pub fn binary(op: BinaryOperator, left: Expr, right: Expr) -> Self {
        let deps = merge_dependencies([&left, &right]);
        let depth = 1 + left.depth.max(right.depth);
        Self {
            kind: ExprKind::BinaryOp {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
            deps,
            depth,
        }
    }

    pub fn unary(op: UnaryOperator, operand: Expr) -> Self {
        let deps = operand.deps.clone();
        let depth = 1 + operand.depth;
        Self {
            kind: ExprKind::UnaryOp {
                op,
                operand: Box::new(operand),
            },
            deps,
            depth,
        }
    }

    pub fn function(name: impl Into<String>, args: Vec<Expr>) -> Self {
        let deps = merge_dependencies(args.iter());
        let depth = 1 + args.iter().map(|a| a.depth).max().unwrap_or(0);
        Self {
            kind: ExprKind::Function {
                name: name.into().to_uppercase(),
                args,
            },
            deps,
            depth,
        }
    }

    fn leaf(kind: ExprKind, deps: Arc<[CellReference]>) -> Self {
        Self {
            kind,
            deps,
            depth: 1,
        }
    }

    /// Distinct cells this node reads, ranges expanded
    pub fn dependencies(&self) -> &[CellReference] {
        &self.deps
    }

    /// Height of the subtree rooted here (a leaf is 1)
    pub fn depth(&self) -> usize {
        self.depth
    }
}

fn no_dependencies() -> Arc<[CellReference]> {
    Arc::from(Vec::new())
}

fn merge_dependencies<'a>(children: impl IntoIterator<Item = &'a Expr>) -> Arc<[CellReference]> {
    let children: Vec<&Expr> = children.into_iter().collect();
    match children.iter().filter(|c| !c.deps.is_empty()).count() {
        0 => no_dependencies(),
        1 => children
            .iter()
            .find(|c| !c.deps.is_empty())
            .map(|c| c.deps.clone())
            .unwrap_or_else(no_dependencies),
        _ => {
            let mut seen = AHashSet::new();
            children
                .iter()
                .flat_map(|c| c.deps.iter())
                .filter(|r| seen.insert(*r))
                .cloned()
                .collect()
        }
    }
}

/// Prints the tree back as formula text, parenthesizing every operator
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExprKind::Literal(Literal::Number(n)) => write!(f, "{}", n),
            ExprKind::Literal(Literal::String(s)) => write!(f, "\"{}\"", s.replace('"', "\"\"")),
            ExprKind::Literal(Literal::Boolean(b)) => {
                f.write_str(if *b { "TRUE" } else { "FALSE" })
            }
            ExprKind::Literal(Literal::Error(e)) => write!(f, "{}", e),
            ExprKind::CellRef(r) => write!(f, "{}", r),
            ExprKind::RangeRef(r) => write!(f, "{}", r),
            ExprKind::BinaryOp { op, left, right } => {
                write!(f, "({}{}{})", left, op.symbol(), right)
            }
            ExprKind::UnaryOp { op, operand } => match op {
                UnaryOperator::Negate => write!(f, "(-{})", operand),
                UnaryOperator::Plus => write!(f, "(+{})", operand),
                UnaryOperator::Percent => write!(f, "({}%)", operand),
            },
            ExprKind::Function { name, args } => {
                write!(f, "{}(", name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{}", arg)?;
                }
                f.write_str(")")
            }
        }
    }
}
