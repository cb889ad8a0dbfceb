//! Per-block field conditions, e.g. `((Data Flags #BITAND# 63) != 0)` or
//! `Has Normals #AND# (BS Vector Flags #BITAND# 4096)`. These are evaluated
//! against the integer values of fields already read from the same block.
//!
//! The syntax is the ad-hoc one embedded in nif.xml: `#`-keywords and symbol
//! operators are interchangeable, field names may contain spaces, and a
//! parenthesized group can hold either value arithmetic or a boolean
//! subexpression. The parser tries the value reading first and backtracks.

use std::collections::BTreeSet;

use thiserror::Error;


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Gt,
    Gte,
    Lt,
    Lte,
    Eq,
    Neq,
}

/// Expression tree. A single recursive [`FieldExpr::eval_value`] walks it;
/// boolean results are 0/1 integers so the two grammars share one node type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Literal(i64),
    Field(String),
    Arg,
    BitAnd(Box<Expr>, Box<Expr>),
    BitOr(Box<Expr>, Box<Expr>),
    Compare(Box<Expr>, CmpOp, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CondParseError {
    #[error("unexpected character {0:?} in condition")]
    UnexpectedChar(char),
    #[error("unknown keyword {0:?} in condition")]
    UnknownKeyword(String),
    #[error("condition ended unexpectedly")]
    UnexpectedEnd,
    #[error("unexpected token at offset {0} in condition")]
    UnexpectedToken(usize),
    #[error("trailing tokens after condition")]
    TrailingTokens,
}

/// A compiled, reusable condition or value expression.
#[derive(Debug, Clone)]
pub struct FieldExpr {
    root: Expr,
}

impl FieldExpr {
    /// Compile a boolean condition. Blank input compiles to "always true".
    pub fn compile(src: &str) -> Result<Self, CondParseError> {
        if src.trim().is_empty() {
            return Ok(Self { root: Expr::Literal(1) });
        }
        let toks = tokenize(src)?;
        let mut parser = Parser { toks, pos: 0 };
        let root = parser.expr()?;
        if parser.pos != parser.toks.len() {
            return Err(CondParseError::TrailingTokens);
        }
        Ok(Self { root })
    }

    /// Compile a value expression (used for arithmetic array lengths such as
    /// `Num UV Sets #BITAND# 63`).
    pub fn compile_value(src: &str) -> Result<Self, CondParseError> {
        let toks = tokenize(src)?;
        let mut parser = Parser { toks, pos: 0 };
        let root = parser.value_expr()?;
        if parser.pos != parser.toks.len() {
            return Err(CondParseError::TrailingTokens);
        }
        Ok(Self { root })
    }

    /// Compile a boolean condition, treating any parse failure as "always
    /// true". Conditions gate field *presence*; when one cannot be
    /// understood, including the field is the recoverable choice.
    pub fn compile_lenient(src: &str) -> Self {
        match Self::compile(src) {
            Ok(expr) => expr,
            Err(err) => {
                log::debug!("treating unparseable condition {src:?} as true: {err}");
                Self { root: Expr::Literal(1) }
            }
        }
    }

    pub fn eval(&self, lookup: &dyn Fn(&str) -> Option<i64>, arg: i64) -> bool {
        self.eval_value(lookup, arg) != 0
    }

    pub fn eval_value(&self, lookup: &dyn Fn(&str) -> Option<i64>, arg: i64) -> i64 {
        eval_node(&self.root, lookup, arg)
    }

    /// The set of field names the expression would read.
    pub fn referenced_fields(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        collect_fields(&self.root, &mut out);
        out
    }
}

fn eval_node(node: &Expr, lookup: &dyn Fn(&str) -> Option<i64>, arg: i64) -> i64 {
    match node {
        Expr::Literal(value) => *value,
        // A missing field reads as 0: "Has X" style gates default to absent.
        Expr::Field(name)    => lookup(name).unwrap_or(0),
        Expr::Arg            => arg,
        Expr::BitAnd(l, r)   => eval_node(l, lookup, arg) & eval_node(r, lookup, arg),
        Expr::BitOr(l, r)    => eval_node(l, lookup, arg) | eval_node(r, lookup, arg),
        Expr::Compare(l, op, r) => {
            let l = eval_node(l, lookup, arg);
            let r = eval_node(r, lookup, arg);
            let result = match op {
                CmpOp::Gt  => l > r,
                CmpOp::Gte => l >= r,
                CmpOp::Lt  => l < r,
                CmpOp::Lte => l <= r,
                CmpOp::Eq  => l == r,
                CmpOp::Neq => l != r,
            };
            i64::from(result)
        }
        Expr::And(l, r) => {
            i64::from(eval_node(l, lookup, arg) != 0 && eval_node(r, lookup, arg) != 0)
        }
        Expr::Or(l, r) => {
            i64::from(eval_node(l, lookup, arg) != 0 || eval_node(r, lookup, arg) != 0)
        }
        Expr::Not(inner) => i64::from(eval_node(inner, lookup, arg) == 0),
    }
}

fn collect_fields(node: &Expr, out: &mut BTreeSet<String>) {
    match node {
        Expr::Literal(_) | Expr::Arg => {}
        Expr::Field(name) => {
            out.insert(name.clone());
        }
        Expr::BitAnd(l, r) | Expr::BitOr(l, r) | Expr::And(l, r) | Expr::Or(l, r) => {
            collect_fields(l, out);
            collect_fields(r, out);
        }
        Expr::Compare(l, _, r) => {
            collect_fields(l, out);
            collect_fields(r, out);
        }
        Expr::Not(inner) => collect_fields(inner, out),
    }
}


#[derive(Debug, Clone, PartialEq, Eq)]
enum Tok {
    Num(i64),
    Ident(String),
    Arg,
    LParen,
    RParen,
    Not,
    And,
    Or,
    BitAnd,
    BitOr,
    Cmp(CmpOp),
}

/// Characters that terminate a free-form field name.
fn is_stop_char(c: char) -> bool {
    matches!(c, '(' | ')' | '!' | '#' | '>' | '<' | '=' | '&' | '|')
}

fn tokenize(src: &str) -> Result<Vec<Tok>, CondParseError> {
    let mut toks = Vec::new();
    let chars: Vec<char> = src.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' => i += 1,
            '(' => {
                toks.push(Tok::LParen);
                i += 1;
            }
            ')' => {
                toks.push(Tok::RParen);
                i += 1;
            }
            '&' if chars.get(i + 1) == Some(&'&') => {
                toks.push(Tok::And);
                i += 2;
            }
            '&' => {
                toks.push(Tok::BitAnd);
                i += 1;
            }
            '|' if chars.get(i + 1) == Some(&'|') => {
                toks.push(Tok::Or);
                i += 2;
            }
            '|' => {
                toks.push(Tok::BitOr);
                i += 1;
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                toks.push(Tok::Cmp(CmpOp::Neq));
                i += 2;
            }
            '!' => {
                toks.push(Tok::Not);
                i += 1;
            }
            '=' if chars.get(i + 1) == Some(&'=') => {
                toks.push(Tok::Cmp(CmpOp::Eq));
                i += 2;
            }
            '=' => return Err(CondParseError::UnexpectedChar('=')),
            '<' | '>' => {
                let op = if chars.get(i + 1) == Some(&'=') {
                    i += 2;
                    if c == '<' { CmpOp::Lte } else { CmpOp::Gte }
                } else {
                    i += 1;
                    if c == '<' { CmpOp::Lt } else { CmpOp::Gt }
                };
                toks.push(Tok::Cmp(op));
            }
            '#' => {
                let end = chars[i + 1..]
                    .iter()
                    .position(|&c| c == '#')
                    .ok_or(CondParseError::UnexpectedChar('#'))?;
                let keyword: String = chars[i..=i + end + 1].iter().collect();
                let tok = match keyword.as_str() {
                    "#OR#"     => Tok::Or,
                    "#AND#"    => Tok::And,
                    "#NOT#"    => Tok::Not,
                    "#BITOR#"  => Tok::BitOr,
                    "#BITAND#" => Tok::BitAnd,
                    "#GT#"     => Tok::Cmp(CmpOp::Gt),
                    "#GTE#"    => Tok::Cmp(CmpOp::Gte),
                    "#LT#"     => Tok::Cmp(CmpOp::Lt),
                    "#LTE#"    => Tok::Cmp(CmpOp::Lte),
                    "#EQ#"     => Tok::Cmp(CmpOp::Eq),
                    "#NEQ#"    => Tok::Cmp(CmpOp::Neq),
                    "#ARG#"    => Tok::Arg,
                    _ => return Err(CondParseError::UnknownKeyword(keyword)),
                };
                toks.push(tok);
                i += end + 2;
            }
            _ => {
                // A number or a free-form field name. Either way the lexeme
                // runs until the next operator character; trailing spaces
                // belong to the whitespace between tokens, not the name.
                let start = i;
                while i < chars.len() && !is_stop_char(chars[i]) {
                    i += 1;
                }
                let lexeme: String = chars[start..i].iter().collect();
                let lexeme = lexeme.trim();
                if lexeme.is_empty() {
                    return Err(CondParseError::UnexpectedChar(c));
                }
                match parse_number(lexeme) {
                    Some(value) => toks.push(Tok::Num(value)),
                    None        => toks.push(Tok::Ident(lexeme.to_owned())),
                }
            }
        }
    }

    Ok(toks)
}

fn parse_number(text: &str) -> Option<i64> {
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest.trim_start()),
        None       => (false, text),
    };

    let magnitude = if let Some(hex) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        i64::from_str_radix(hex, 16).ok()?
    } else {
        digits.parse::<i64>().ok()?
    };

    Some(if negative { -magnitude } else { magnitude })
}

struct Parser {
    toks: Vec<Tok>,
    pos:  usize,
}

impl Parser {
    fn peek(&self) -> Option<&Tok> {
        self.toks.get(self.pos)
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.peek() == Some(tok) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expr(&mut self) -> Result<Expr, CondParseError> {
        let mut node = self.and_expr()?;
        while self.eat(&Tok::Or) {
            node = Expr::Or(Box::new(node), Box::new(self.and_expr()?));
        }
        Ok(node)
    }

    fn and_expr(&mut self) -> Result<Expr, CondParseError> {
        let mut node = self.unary()?;
        while self.eat(&Tok::And) {
            node = Expr::And(Box::new(node), Box::new(self.unary()?));
        }
        Ok(node)
    }

    fn unary(&mut self) -> Result<Expr, CondParseError> {
        if self.eat(&Tok::Not) {
            Ok(Expr::Not(Box::new(self.unary()?)))
        } else {
            self.primary()
        }
    }

    fn primary(&mut self) -> Result<Expr, CondParseError> {
        if self.peek() == Some(&Tok::LParen) {
            let save = self.pos;

            // A parenthesized group is usually value arithmetic, so try that
            // reading first; fall back to a boolean subexpression.
            self.pos += 1;
            if let Ok(inner) = self.value_expr() {
                if self.eat(&Tok::RParen) {
                    return self.comp_tail(inner);
                }
            }
            self.pos = save;

            self.pos += 1;
            let inner = self.expr()?;
            if !self.eat(&Tok::RParen) {
                return Err(CondParseError::UnexpectedToken(self.pos));
            }
            return self.comp_tail(inner);
        }

        let value = self.value_expr()?;
        self.comp_tail(value)
    }

    fn comp_tail(&mut self, left: Expr) -> Result<Expr, CondParseError> {
        if let Some(&Tok::Cmp(op)) = self.peek() {
            self.pos += 1;
            let right = self.value_expr()?;
            Ok(Expr::Compare(Box::new(left), op, Box::new(right)))
        } else {
            Ok(left)
        }
    }

    fn value_expr(&mut self) -> Result<Expr, CondParseError> {
        let mut node = self.bitand_expr()?;
        while self.eat(&Tok::BitOr) {
            node = Expr::BitOr(Box::new(node), Box::new(self.bitand_expr()?));
        }
        Ok(node)
    }

    fn bitand_expr(&mut self) -> Result<Expr, CondParseError> {
        let mut node = self.atom()?;
        while self.eat(&Tok::BitAnd) {
            node = Expr::BitAnd(Box::new(node), Box::new(self.atom()?));
        }
        Ok(node)
    }

    fn atom(&mut self) -> Result<Expr, CondParseError> {
        match self.peek().cloned() {
            Some(Tok::Num(value))  => {
                self.pos += 1;
                Ok(Expr::Literal(value))
            }
            Some(Tok::Ident(name)) => {
                self.pos += 1;
                Ok(Expr::Field(name))
            }
            Some(Tok::Arg) => {
                self.pos += 1;
                Ok(Expr::Arg)
            }
            Some(Tok::LParen) => {
                self.pos += 1;
                let inner = self.value_expr()?;
                if !self.eat(&Tok::RParen) {
                    return Err(CondParseError::UnexpectedToken(self.pos));
                }
                Ok(inner)
            }
            Some(_) => Err(CondParseError::UnexpectedToken(self.pos)),
            None    => Err(CondParseError::UnexpectedEnd),
        }
    }
}
