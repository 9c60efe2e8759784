//! Formula tokenizer
//!
//! Turns formula text into a flat list of [`Token`]s. Every token records the
//! byte offset where it starts in the original text so syntax errors can
//! point at the offending spot.

use crate::error::{FormulaError, FormulaResult};
use gridcalc_core::{CellAddress, CellError};
use std::fmt;

/// Longest formula text accepted, in bytes
pub const MAX_FORMULA_LEN: usize = 8192;

/// A token together with its byte offset in the formula text
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub position: usize,
}

/// Token types
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Literals
    Number(f64),
    String(String),
    Boolean(bool),
    Error(CellError),

    // References
    CellRef(CellAddress),
    /// `Sheet2!` or `'My Sheet'!`, name unquoted
    SheetPrefix(String),
    /// Function name (always followed by `(`)
    Identifier(String),

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    Percent,
    Ampersand,
    Equal,
    NotEqual,
    LessThan,
    LessEqual,
    GreaterThan,
    GreaterEqual,
    Colon,
    Comma,

    // Delimiters
    LeftParen,
    RightParen,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Number(n) => write!(f, "{}", n),
            TokenKind::String(s) => write!(f, "\"{}\"", s),
            TokenKind::Boolean(true) => f.write_str("TRUE"),
            TokenKind::Boolean(false) => f.write_str("FALSE"),
            TokenKind::Error(e) => write!(f, "{}", e),
            TokenKind::CellRef(addr) => write!(f, "{}", addr),
            TokenKind::SheetPrefix(name) => write!(f, "{}!", name),
            TokenKind::Identifier(name) => f.write_str(name),
            TokenKind::Plus => f.write_str("+"),
            TokenKind::Minus => f.write_str("-"),
            TokenKind::Star => f.write_str("*"),
            TokenKind::Slash => f.write_str("/"),
            TokenKind::Caret => f.write_str("^"),
            TokenKind::Percent => f.write_str("%"),
            TokenKind::Ampersand => f.write_str("&"),
            TokenKind::Equal => f.write_str("="),
            TokenKind::NotEqual => f.write_str("<>"),
            TokenKind::LessThan => f.write_str("<"),
            TokenKind::LessEqual => f.write_str("<="),
            TokenKind::GreaterThan => f.write_str(">"),
            TokenKind::GreaterEqual => f.write_str(">="),
            TokenKind::Colon => f.write_str(":"),
            TokenKind::Comma => f.write_str(","),
            TokenKind::LeftParen => f.write_str("("),
            TokenKind::RightParen => f.write_str(")"),
        }
    }
}

/// Tokenize a formula
///
/// The text must start with `=` (leading whitespace is ignored); the `=`
/// itself is not part of the output.
///
/// # Example
/// ```rust
/// use gridcalc_formula::{tokenize, TokenKind};
///
/// let tokens = tokenize("=A1+2").unwrap();
/// assert_eq!(tokens.len(), 3);
/// assert_eq!(tokens[1].kind, TokenKind::Plus);
/// assert_eq!(tokens[1].position, 3);
/// ```
pub fn tokenize(formula: &str) -> FormulaResult<Vec<Token>> {
    if formula.len() > MAX_FORMULA_LEN {
        return Err(FormulaError::syntax(
            0,
            format!("formula longer than {} bytes", MAX_FORMULA_LEN),
        ));
    }

    let start = formula.len() - formula.trim_start().len();
    if !formula[start..].starts_with('=') {
        return Err(FormulaError::syntax(start, "formula must start with '='"));
    }

    let mut lexer = Lexer {
        input: formula,
        pos: start + 1,
    };
    let mut tokens = Vec::new();
    while let Some(token) = lexer.next_token()? {
        tokens.push(token);
    }

    if tokens.is_empty() {
        return Err(FormulaError::syntax(start, "formula has no expression"));
    }
    Ok(tokens)
}

struct Lexer<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn next_token(&mut self) -> FormulaResult<Option<Token>> {
        self.skip_whitespace();

        let position = self.pos;
        let c = match self.peek_char() {
            Some(c) => c,
            None => return Ok(None),
        };

        let kind = match c {
            '+' => self.single(TokenKind::Plus),
            '-' => self.single(TokenKind::Minus),
            '*' => self.single(TokenKind::Star),
            '/' => self.single(TokenKind::Slash),
            '^' => self.single(TokenKind::Caret),
            '%' => self.single(TokenKind::Percent),
            '&' => self.single(TokenKind::Ampersand),
            '=' => self.single(TokenKind::Equal),
            ':' => self.single(TokenKind::Colon),
            ',' => self.single(TokenKind::Comma),
            '(' => self.single(TokenKind::LeftParen),
            ')' => self.single(TokenKind::RightParen),
            '<' => {
                self.advance();
                match self.peek_char() {
                    Some('=') => self.single(TokenKind::LessEqual),
                    Some('>') => self.single(TokenKind::NotEqual),
                    _ => TokenKind::LessThan,
                }
            }
            '>' => {
                self.advance();
                match self.peek_char() {
                    Some('=') => self.single(TokenKind::GreaterEqual),
                    _ => TokenKind::GreaterThan,
                }
            }
            '"' => self.scan_string()?,
            '\'' => self.scan_quoted_sheet()?,
            '#' => self.scan_error()?,
            c if c.is_ascii_digit() => self.scan_number()?,
            '.' if self.peek_char_at(1).map_or(false, |c| c.is_ascii_digit()) => {
                self.scan_number()?
            }
            c if c.is_ascii_alphabetic() || c == '_' || c == '$' => self.scan_word()?,
            other => {
                return Err(FormulaError::syntax(
                    position,
                    format!("unexpected character '{}'", other),
                ))
            }
        };

        Ok(Some(Token { kind, position }))
    }

    fn single(&mut self, kind: TokenKind) -> TokenKind {
        self.advance();
        kind
    }

    fn scan_string(&mut self) -> FormulaResult<TokenKind> {
        let start = self.pos;
        self.advance(); // opening quote

        let mut s = String::new();
        loop {
            match self.peek_char() {
                Some('"') if self.peek_char_at(1) == Some('"') => {
                    s.push('"');
                    self.advance();
                    self.advance();
                }
                Some('"') => {
                    self.advance();
                    return Ok(TokenKind::String(s));
                }
                Some(c) => {
                    s.push(c);
                    self.advance();
                }
                None => {
                    return Err(FormulaError::syntax(start, "unterminated string literal"));
                }
            }
        }
    }

    fn scan_quoted_sheet(&mut self) -> FormulaResult<TokenKind> {
        let start = self.pos;
        self.advance(); // opening quote

        let mut name = String::new();
        loop {
            match self.peek_char() {
                Some('\'') if self.peek_char_at(1) == Some('\'') => {
                    name.push('\'');
                    self.advance();
                    self.advance();
                }
                Some('\'') => {
                    self.advance();
                    break;
                }
                Some(c) => {
                    name.push(c);
                    self.advance();
                }
                None => {
                    return Err(FormulaError::syntax(start, "unterminated quoted sheet name"));
                }
            }
        }

        if self.peek_char() != Some('!') {
            return Err(FormulaError::syntax(
                self.pos,
                "expected '!' after quoted sheet name",
            ));
        }
        self.advance();

        if name.is_empty() {
            return Err(FormulaError::syntax(start, "empty sheet name"));
        }
        Ok(TokenKind::SheetPrefix(name))
    }

    fn scan_error(&mut self) -> FormulaResult<TokenKind> {
        let start = self.pos;
        self.advance(); // '#'
        while self.peek_char().map_or(false, |c| {
            c.is_ascii_alphanumeric() || c == '/' || c == '!' || c == '?'
        }) {
            self.advance();
        }

        let text = &self.input[start..self.pos];
        CellError::from_str(text)
            .map(TokenKind::Error)
            .ok_or_else(|| FormulaError::syntax(start, format!("unknown error literal '{}'", text)))
    }

    fn scan_number(&mut self) -> FormulaResult<TokenKind> {
        let start = self.pos;

        self.skip_digits();
        if self.peek_char() == Some('.') {
            self.advance();
            self.skip_digits();
        }

        // Exponent, only when digits actually follow
        if matches!(self.peek_char(), Some('e') | Some('E')) {
            let digits_at = match self.peek_char_at(1) {
                Some('+') | Some('-') => 2,
                _ => 1,
            };
            if self
                .peek_char_at(digits_at)
                .map_or(false, |c| c.is_ascii_digit())
            {
                for _ in 0..digits_at {
                    self.advance();
                }
                self.skip_digits();
            }
        }

        let text = &self.input[start..self.pos];
        text.parse::<f64>()
            .ok()
            .filter(|n| n.is_finite())
            .map(TokenKind::Number)
            .ok_or_else(|| FormulaError::syntax(start, format!("invalid number '{}'", text)))
    }

    /// Cell reference, sheet prefix, boolean or function name
    fn scan_word(&mut self) -> FormulaResult<TokenKind> {
        let start = self.pos;
        while self.peek_char().map_or(false, |c| {
            c.is_ascii_alphanumeric() || c == '_' || c == '$' || c == '.'
        }) {
            self.advance();
        }
        let text = &self.input[start..self.pos];

        if self.peek_char() == Some('!') {
            self.advance();
            return Ok(TokenKind::SheetPrefix(text.to_string()));
        }

        let opens_call = self.peek_char() == Some('(');

        if !opens_call {
            if text.eq_ignore_ascii_case("TRUE") {
                return Ok(TokenKind::Boolean(true));
            }
            if text.eq_ignore_ascii_case("FALSE") {
                return Ok(TokenKind::Boolean(false));
            }
            if looks_like_cell_reference(text) {
                return CellAddress::parse(text).map(TokenKind::CellRef).map_err(|_| {
                    FormulaError::syntax(
                        start,
                        format!("cell reference '{}' is outside the sheet", text),
                    )
                });
            }
            return Err(FormulaError::syntax(
                start,
                format!("unknown name '{}'", text),
            ));
        }

        if text.contains('$') {
            return Err(FormulaError::syntax(
                start,
                format!("invalid function name '{}'", text),
            ));
        }
        Ok(TokenKind::Identifier(text.to_uppercase()))
    }

    // === Helper methods ===

    fn peek_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn peek_char_at(&self, offset: usize) -> Option<char> {
        self.input[self.pos..].chars().nth(offset)
    }

    fn advance(&mut self) {
        if let Some(c) = self.peek_char() {
            self.pos += c.len_utf8();
        }
    }

    fn skip_digits(&mut self) {
        while self.peek_char().map_or(false, |c| c.is_ascii_digit()) {
            self.advance();
        }
    }

    fn skip_whitespace(&mut self) {
        while self.peek_char().map_or(false, |c| c.is_whitespace()) {
            self.advance();
        }
    }
}

/// `[$]letters[$]digits`, nothing else
fn looks_like_cell_reference(text: &str) -> bool {
    let rest = text.strip_prefix('$').unwrap_or(text);
    let letters = rest.len() - rest.trim_start_matches(|c: char| c.is_ascii_alphabetic()).len();
    if letters == 0 {
        return false;
    }
    let rest = &rest[letters..];
    let digits = rest.strip_prefix('$').unwrap_or(rest);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn kinds(formula: &str) -> Vec<TokenKind> {
        tokenize(formula)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    fn error_position(formula: &str) -> usize {
        match tokenize(formula) {
            Err(FormulaError::Syntax { position, .. }) => position,
            other => panic!("expected syntax error for {formula:?}, got {other:?}"),
        }
    }

    #[test]
    fn test_tokenize_operators() {
        assert_eq!(
            kinds("=1<>2<=3>=4<5>6&7%"),
            vec![
                TokenKind::Number(1.0),
                TokenKind::NotEqual,
                TokenKind::Number(2.0),
                TokenKind::LessEqual,
                TokenKind::Number(3.0),
                TokenKind::GreaterEqual,
                TokenKind::Number(4.0),
                TokenKind::LessThan,
                TokenKind::Number(5.0),
                TokenKind::GreaterThan,
                TokenKind::Number(6.0),
                TokenKind::Ampersand,
                TokenKind::Number(7.0),
                TokenKind::Percent,
            ]
        );
    }

    #[test]
    fn test_tokenize_numbers() {
        assert_eq!(
            kinds("=.5+1.25e2-3E-1"),
            vec![
                TokenKind::Number(0.5),
                TokenKind::Plus,
                TokenKind::Number(125.0),
                TokenKind::Minus,
                TokenKind::Number(0.3),
            ]
        );
    }

    #[test]
    fn test_tokenize_references() {
        assert_eq!(
            kinds("=$A$1:b2+Sheet2!C3+'My ''Q'' Sheet'!D4"),
            vec![
                TokenKind::CellRef(CellAddress::with_absolute(0, 0, true, true)),
                TokenKind::Colon,
                TokenKind::CellRef(CellAddress::new(1, 1)),
                TokenKind::Plus,
                TokenKind::SheetPrefix("Sheet2".into()),
                TokenKind::CellRef(CellAddress::new(2, 2)),
                TokenKind::Plus,
                TokenKind::SheetPrefix("My 'Q' Sheet".into()),
                TokenKind::CellRef(CellAddress::new(3, 3)),
            ]
        );
    }

    #[test]
    fn test_tokenize_literals_and_calls() {
        assert_eq!(
            kinds("=sum(\"a\"\"b\",true,#N/A,FALSE())"),
            vec![
                TokenKind::Identifier("SUM".into()),
                TokenKind::LeftParen,
                TokenKind::String("a\"b".into()),
                TokenKind::Comma,
                TokenKind::Boolean(true),
                TokenKind::Comma,
                TokenKind::Error(CellError::Na),
                TokenKind::Comma,
                TokenKind::Identifier("FALSE".into()),
                TokenKind::LeftParen,
                TokenKind::RightParen,
                TokenKind::RightParen,
            ]
        );
    }

    #[test]
    fn test_positions_are_byte_offsets() {
        let tokens = tokenize("  = \"é\" & B2").unwrap();
        let positions: Vec<usize> = tokens.iter().map(|t| t.position).collect();
        assert_eq!(positions, vec![4, 9, 11]);
    }

    #[test]
    fn test_tokenize_errors() {
        assert_eq!(error_position("1+2"), 0);
        assert_eq!(error_position("  =   "), 2);
        assert_eq!(error_position("=\"abc"), 1);
        assert_eq!(error_position("=1+'Sheet"), 3);
        assert_eq!(error_position("=1 ~ 2"), 3);
        assert_eq!(error_position("=FOO+1"), 1);
        assert_eq!(error_position("=A1048577"), 1);
        assert_eq!(error_position("=XFE1"), 1);
        assert_eq!(error_position("=#BOGUS!"), 1);
    }

    #[test]
    fn test_formula_length_limit() {
        let long = format!("={}", "1+".repeat(MAX_FORMULA_LEN / 2) + "1");
        assert!(tokenize(&long).is_err());

        // The limit counts bytes: 4200 two-byte characters are over it
        let wide = format!("=\"{}\"", "é".repeat(4200));
        assert!(wide.chars().count() < MAX_FORMULA_LEN);
        assert!(tokenize(&wide).is_err());
        assert!(tokenize(&format!("=\"{}\"", "é".repeat(4000))).is_ok());
    }
}
