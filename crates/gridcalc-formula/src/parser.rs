//! Formula parser
//!
//! A recursive descent parser over the token list, one method per
//! precedence level. From loosest to tightest:
//!
//! 1. Comparison: `=`, `<>`, `<`, `<=`, `>`, `>=`
//! 2. Concatenation: `&`
//! 3. Addition/Subtraction: `+`, `-`
//! 4. Multiplication/Division: `*`, `/`
//! 5. Exponentiation: `^` (right associative)
//! 6. Postfix percent: `%`
//! 7. Prefix sign: `-`, `+`
//! 8. Range: `:`
//! 9. Primary: literals, references, function calls, parentheses

use crate::ast::{
    BinaryOperator, CellReference, Expr, ExprKind, Literal, RangeReference, UnaryOperator,
};
use crate::error::{FormulaError, FormulaResult};
use crate::functions::FunctionRegistry;
use crate::lexer::{tokenize, Token, TokenKind};
use gridcalc_core::CellRange;
use std::sync::Arc;

/// Largest number of cells a single range reference may cover
pub const MAX_RANGE_CELLS: u64 = 1_048_576;

/// Deepest nesting of parentheses, calls and prefix operators
pub const MAX_NESTING: usize = 100;

/// Tallest expression tree accepted
pub const MAX_EXPRESSION_DEPTH: usize = 512;

/// Parse a formula string into an expression tree
///
/// Function names are checked against `functions`, including their
/// argument counts.
///
/// # Example
/// ```rust
/// use gridcalc_formula::{parse_formula, FunctionRegistry};
///
/// let functions = FunctionRegistry::new();
/// let ast = parse_formula("=SUM(A1:A10)", &functions).unwrap();
/// assert_eq!(ast.dependencies().len(), 10);
/// assert!(parse_formula("=SUM(", &functions).is_err());
/// ```
pub fn parse_formula(formula: &str, functions: &FunctionRegistry) -> FormulaResult<Expr> {
    let tokens = tokenize(formula)?;
    parse_tokens(&tokens, functions)
}

/// Parse an already tokenized formula
pub fn parse_tokens(tokens: &[Token], functions: &FunctionRegistry) -> FormulaResult<Expr> {
    if tokens.is_empty() {
        return Err(FormulaError::syntax(0, "formula has no expression"));
    }

    let mut parser = Parser {
        tokens,
        pos: 0,
        nesting: 0,
        functions,
    };
    let expr = parser.parse_expression()?;

    // Make sure we consumed all input
    if let Some(token) = parser.peek() {
        return Err(FormulaError::syntax(
            token.position,
            format!("unexpected '{}' after expression", token.kind),
        ));
    }

    Ok(expr)
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    nesting: usize,
    functions: &'a FunctionRegistry,
}

impl<'a> Parser<'a> {
    // === Token access ===

    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<&'a TokenKind> {
        self.peek().map(|t| &t.kind)
    }

    fn next(&mut self) -> Option<&'a Token> {
        let token = self.tokens.get(self.pos)?;
        self.pos += 1;
        Some(token)
    }

    /// Position used for errors at the end of input
    fn end_position(&self) -> usize {
        self.tokens.last().map_or(0, |t| t.position)
    }

    fn current_position(&self) -> usize {
        self.peek().map_or_else(|| self.end_position(), |t| t.position)
    }

    fn expect_right_paren(&mut self, opened_at: usize) -> FormulaResult<()> {
        match self.next() {
            Some(Token {
                kind: TokenKind::RightParen,
                ..
            }) => Ok(()),
            Some(token) => Err(FormulaError::syntax(
                token.position,
                format!("expected ')' but found '{}'", token.kind),
            )),
            None => Err(FormulaError::syntax(
                opened_at,
                "missing closing parenthesis",
            )),
        }
    }

    fn descend(&mut self) -> FormulaResult<()> {
        self.nesting += 1;
        if self.nesting > MAX_NESTING {
            return Err(FormulaError::syntax(
                self.current_position(),
                format!("formula nested deeper than {} levels", MAX_NESTING),
            ));
        }
        Ok(())
    }

    fn ascend(&mut self) {
        self.nesting -= 1;
    }

    fn binary(&self, op: BinaryOperator, left: Expr, right: Expr) -> FormulaResult<Expr> {
        self.checked(Expr::binary(op, left, right))
    }

    fn checked(&self, expr: Expr) -> FormulaResult<Expr> {
        if expr.depth() > MAX_EXPRESSION_DEPTH {
            return Err(FormulaError::syntax(
                self.current_position(),
                format!("expression deeper than {} levels", MAX_EXPRESSION_DEPTH),
            ));
        }
        Ok(expr)
    }

    // === Expression parsing with precedence ===

    fn parse_expression(&mut self) -> FormulaResult<Expr> {
        self.descend()?;
        let expr = self.parse_comparison();
        self.ascend();
        expr
    }

    fn parse_comparison(&mut self) -> FormulaResult<Expr> {
        let mut left = self.parse_concatenation()?;

        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Equal) => BinaryOperator::Equal,
                Some(TokenKind::NotEqual) => BinaryOperator::NotEqual,
                Some(TokenKind::LessThan) => BinaryOperator::LessThan,
                Some(TokenKind::LessEqual) => BinaryOperator::LessEqual,
                Some(TokenKind::GreaterThan) => BinaryOperator::GreaterThan,
                Some(TokenKind::GreaterEqual) => BinaryOperator::GreaterEqual,
                _ => break,
            };

            self.next();
            let right = self.parse_concatenation()?;
            left = self.binary(op, left, right)?;
        }

        Ok(left)
    }

    fn parse_concatenation(&mut self) -> FormulaResult<Expr> {
        let mut left = self.parse_additive()?;

        while matches!(self.peek_kind(), Some(TokenKind::Ampersand)) {
            self.next();
            let right = self.parse_additive()?;
            left = self.binary(BinaryOperator::Concat, left, right)?;
        }

        Ok(left)
    }

    fn parse_additive(&mut self) -> FormulaResult<Expr> {
        let mut left = self.parse_multiplicative()?;

        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Plus) => BinaryOperator::Add,
                Some(TokenKind::Minus) => BinaryOperator::Subtract,
                _ => break,
            };

            self.next();
            let right = self.parse_multiplicative()?;
            left = self.binary(op, left, right)?;
        }

        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> FormulaResult<Expr> {
        let mut left = self.parse_exponent()?;

        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Star) => BinaryOperator::Multiply,
                Some(TokenKind::Slash) => BinaryOperator::Divide,
                _ => break,
            };

            self.next();
            let right = self.parse_exponent()?;
            left = self.binary(op, left, right)?;
        }

        Ok(left)
    }

    fn parse_exponent(&mut self) -> FormulaResult<Expr> {
        let left = self.parse_percent()?;

        if matches!(self.peek_kind(), Some(TokenKind::Caret)) {
            self.next();
            self.descend()?;
            let right = self.parse_exponent(); // right associative
            self.ascend();
            return self.binary(BinaryOperator::Power, left, right?);
        }

        Ok(left)
    }

    fn parse_percent(&mut self) -> FormulaResult<Expr> {
        let mut expr = self.parse_unary()?;

        while matches!(self.peek_kind(), Some(TokenKind::Percent)) {
            self.next();
            expr = self.checked(Expr::unary(UnaryOperator::Percent, expr))?;
        }

        Ok(expr)
    }

    fn parse_unary(&mut self) -> FormulaResult<Expr> {
        let op = match self.peek_kind() {
            Some(TokenKind::Minus) => UnaryOperator::Negate,
            Some(TokenKind::Plus) => UnaryOperator::Plus,
            _ => return self.parse_range(),
        };

        self.next();
        self.descend()?;
        let operand = self.parse_unary();
        self.ascend();
        Ok(Expr::unary(op, operand?))
    }

    fn parse_range(&mut self) -> FormulaResult<Expr> {
        let start_position = self.current_position();
        let left = self.parse_primary()?;

        if !matches!(self.peek_kind(), Some(TokenKind::Colon)) {
            return Ok(left);
        }
        let colon_position = self.current_position();
        self.next();

        let start = match left.kind {
            ExprKind::CellRef(reference) => reference,
            _ => {
                return Err(FormulaError::syntax(
                    start_position,
                    "range operand must be a cell reference",
                ))
            }
        };

        let end_position = self.current_position();
        let end_sheet = match self.peek_kind() {
            Some(TokenKind::SheetPrefix(name)) => {
                self.next();
                Some(name.as_str())
            }
            _ => None,
        };
        let end_address = match self.next() {
            Some(Token {
                kind: TokenKind::CellRef(address),
                ..
            }) => *address,
            Some(token) => {
                return Err(FormulaError::syntax(
                    token.position,
                    "range operand must be a cell reference",
                ))
            }
            None => {
                return Err(FormulaError::syntax(
                    colon_position,
                    "range is missing its end cell",
                ))
            }
        };

        if let Some(end_sheet) = end_sheet {
            let same_sheet = start
                .sheet
                .as_deref()
                .map_or(false, |s| s.eq_ignore_ascii_case(end_sheet));
            if !same_sheet {
                return Err(FormulaError::syntax(
                    end_position,
                    "range endpoints must be on the same sheet",
                ));
            }
        }

        let range = CellRange::new(start.address, end_address);
        if range.cell_count() > MAX_RANGE_CELLS {
            return Err(FormulaError::syntax(
                start_position,
                format!(
                    "range {} covers more than {} cells",
                    range, MAX_RANGE_CELLS
                ),
            ));
        }

        Ok(Expr::range(RangeReference::new(start.sheet, range)))
    }

    fn parse_primary(&mut self) -> FormulaResult<Expr> {
        let token = match self.next() {
            Some(token) => token,
            None => {
                return Err(FormulaError::syntax(
                    self.end_position(),
                    "unexpected end of formula",
                ))
            }
        };

        match &token.kind {
            TokenKind::Number(n) => Ok(Expr::number(*n)),
            TokenKind::String(s) => Ok(Expr::literal(Literal::String(s.clone()))),
            TokenKind::Boolean(b) => Ok(Expr::literal(Literal::Boolean(*b))),
            TokenKind::Error(e) => Ok(Expr::literal(Literal::Error(*e))),

            TokenKind::LeftParen => {
                let expr = self.parse_expression()?;
                self.expect_right_paren(token.position)?;
                Ok(expr)
            }

            TokenKind::CellRef(address) => Ok(Expr::cell(CellReference::new(None, *address))),

            TokenKind::SheetPrefix(sheet) => match self.next() {
                Some(Token {
                    kind: TokenKind::CellRef(address),
                    ..
                }) => Ok(Expr::cell(CellReference::new(
                    Some(Arc::from(sheet.as_str())),
                    *address,
                ))),
                _ => Err(FormulaError::syntax(
                    token.position,
                    format!("expected a cell reference after '{}!'", sheet),
                )),
            },

            TokenKind::Identifier(name) => self.parse_function_call(name, token.position),

            TokenKind::RightParen => Err(FormulaError::syntax(
                token.position,
                "unmatched closing parenthesis",
            )),

            other => Err(FormulaError::syntax(
                token.position,
                format!("unexpected '{}'", other),
            )),
        }
    }

    fn parse_function_call(&mut self, name: &str, position: usize) -> FormulaResult<Expr> {
        let def = self.functions.get(name).ok_or_else(|| {
            FormulaError::syntax(position, format!("unknown function '{}'", name))
        })?;

        let open_position = self.current_position();
        match self.next() {
            Some(Token {
                kind: TokenKind::LeftParen,
                ..
            }) => {}
            _ => {
                return Err(FormulaError::syntax(
                    position,
                    format!("expected '(' after {}", name),
                ))
            }
        }

        let mut args = Vec::new();
        if matches!(self.peek_kind(), Some(TokenKind::RightParen)) {
            self.next();
        } else {
            loop {
                args.push(self.parse_expression()?);
                match self.next() {
                    Some(Token {
                        kind: TokenKind::Comma,
                        ..
                    }) => continue,
                    Some(Token {
                        kind: TokenKind::RightParen,
                        ..
                    }) => break,
                    Some(token) => {
                        return Err(FormulaError::syntax(
                            token.position,
                            format!("expected ',' or ')' but found '{}'", token.kind),
                        ))
                    }
                    None => {
                        return Err(FormulaError::syntax(
                            open_position,
                            "missing closing parenthesis",
                        ))
                    }
                }
            }
        }

        if !def.accepts_arg_count(args.len()) {
            return Err(FormulaError::syntax(
                position,
                format!(
                    "{} takes {} arguments, got {}",
                    def.name,
                    def.arity_description(),
                    args.len()
                ),
            ));
        }

        Ok(Expr::function(def.name, args))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridcalc_core::{CellAddress, CellError};
    use pretty_assertions::assert_eq;

    fn parse(formula: &str) -> FormulaResult<Expr> {
        parse_formula(formula, &FunctionRegistry::new())
    }

    fn canonical(formula: &str) -> String {
        parse(formula).unwrap().to_string()
    }

    fn error_message(formula: &str) -> String {
        match parse(formula) {
            Err(FormulaError::Syntax { message, .. }) => message,
            other => panic!("expected syntax error for {formula:?}, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_literals() {
        assert_eq!(parse("=42").unwrap().kind, ExprKind::Literal(Literal::Number(42.0)));
        assert_eq!(
            parse("=\"Hello\"").unwrap().kind,
            ExprKind::Literal(Literal::String("Hello".into()))
        );
        assert_eq!(
            parse("=TRUE").unwrap().kind,
            ExprKind::Literal(Literal::Boolean(true))
        );
        assert_eq!(
            parse("=#REF!").unwrap().kind,
            ExprKind::Literal(Literal::Error(CellError::Ref))
        );
    }

    #[test]
    fn test_parse_precedence() {
        assert_eq!(canonical("=1+2*3"), "(1+(2*3))");
        assert_eq!(canonical("=(1+2)*3"), "((1+2)*3)");
        assert_eq!(canonical("=1-2-3"), "((1-2)-3)");
        assert_eq!(canonical("=2^3^2"), "(2^(3^2))");
        assert_eq!(canonical("=-2^2"), "((-2)^2)");
        assert_eq!(canonical("=-50%"), "((-50)%)");
        assert_eq!(canonical("=1&2+3"), "(1&(2+3))");
        assert_eq!(canonical("=1+2>2&1"), "((1+2)>(2&1))");
        assert_eq!(canonical("=2*+3"), "(2*(+3))");
    }

    #[test]
    fn test_parse_cell_references() {
        let expr = parse("=Sheet2!$B$3").unwrap();
        match expr.kind {
            ExprKind::CellRef(r) => {
                assert_eq!(r.sheet.as_deref(), Some("Sheet2"));
                assert_eq!(r.address, CellAddress::with_absolute(2, 1, true, true));
            }
            other => panic!("expected cell reference, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_range_references() {
        let expr = parse("=SUM('Data Sheet'!B2:A1)").unwrap();
        assert_eq!(expr.to_string(), "SUM('Data Sheet'!A1:B2)");
        assert_eq!(expr.dependencies().len(), 4);

        assert!(parse("=SUM(Data!A1:data!B2)").is_ok());
        assert_eq!(
            error_message("=SUM(A1:Other!B2)"),
            "range endpoints must be on the same sheet"
        );
        assert_eq!(
            error_message("=SUM(One!A1:Two!B2)"),
            "range endpoints must be on the same sheet"
        );
        assert_eq!(
            error_message("=SUM(1:A2)"),
            "range operand must be a cell reference"
        );
        assert!(error_message("=SUM(A1:B1048576)").contains("covers more than"));
        assert!(parse("=SUM(A1:A1048576)").is_ok());
    }

    #[test]
    fn test_parse_function_arity() {
        assert!(parse("=PI()").is_ok());
        assert!(parse("=IF(A1,1)").is_ok());
        assert_eq!(error_message("=SUM()"), "SUM takes 1 or more arguments, got 0");
        assert_eq!(error_message("=PI(1)"), "PI takes exactly 0 arguments, got 1");
        assert_eq!(error_message("=IF(1,2,3,4)"), "IF takes 2 to 3 arguments, got 4");
        assert_eq!(error_message("=NOSUCH(1)"), "unknown function 'NOSUCH'");
    }

    #[test]
    fn test_parse_nested_functions() {
        let expr = parse("=if(sum(A1,B1)>10, max(C1:C3), \"small\")").unwrap();
        assert_eq!(
            expr.to_string(),
            "IF((SUM(A1,B1)>10),MAX(C1:C3),\"small\")"
        );
        let deps: Vec<String> = expr.dependencies().iter().map(|r| r.to_string()).collect();
        assert_eq!(deps, vec!["A1", "B1", "C1", "C2", "C3"]);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(error_message("=(1+2"), "missing closing parenthesis");
        assert_eq!(error_message("=1+2)"), "unexpected ')' after expression");
        assert_eq!(error_message("=)"), "unmatched closing parenthesis");
        assert_eq!(error_message("=1+"), "unexpected end of formula");
        assert_eq!(error_message("=1 2"), "unexpected '2' after expression");
        assert_eq!(
            error_message("=Sheet2!+1"),
            "expected a cell reference after 'Sheet2!'"
        );
        assert_eq!(
            error_message("=SUM(1;2)"),
            "unexpected character ';'"
        );
    }

    #[test]
    fn test_nesting_limit() {
        let deep = format!("={}1{}", "(".repeat(MAX_NESTING + 1), ")".repeat(MAX_NESTING + 1));
        assert!(error_message(&deep).contains("nested deeper"));

        let shallow = format!("={}1{}", "(".repeat(50), ")".repeat(50));
        assert!(parse(&shallow).is_ok());

        let long_chain = format!("=1{}", "+1".repeat(MAX_EXPRESSION_DEPTH + 1));
        assert!(error_message(&long_chain).contains("expression deeper"));

        let percents = format!("=1{}", "%".repeat(MAX_EXPRESSION_DEPTH + 1));
        assert!(error_message(&percents).contains("expression deeper"));
    }

    #[test]
    fn test_parse_is_deterministic() {
        let first = parse("=SUM(A1:A3").unwrap_err();
        let second = parse("=SUM(A1:A3").unwrap_err();
        assert_eq!(first, second);
    }
}
