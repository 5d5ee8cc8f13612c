use super::{CalcEngine, CompiledExpr, InputBitmap, MAX_INPUTS};

/// The crate's default [`CalcEngine`]: a small recursive-descent evaluator
/// over the `A..L` input alphabet supporting the arithmetic, comparison,
/// and logical operators a `CALC(...)` predicate typically needs. Hosts
/// that need a richer calculator supply their own [`CalcEngine`]; this one
/// exists so the crate is usable and testable standalone.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimpleCalc;

impl CalcEngine for SimpleCalc {
    fn compile(&self, text: &str) -> Result<Box<dyn CompiledExpr>, String> {
        let tokens = lex(text)?;
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.parse_expr()?;
        if parser.pos != parser.tokens.len() {
            return Err(format!("unexpected trailing input in `{text}`"));
        }
        let mut referenced = InputBitmap::EMPTY;
        expr.collect_inputs(&mut referenced);
        Ok(Box::new(Compiled { expr, referenced }))
    }
}

struct Compiled {
    expr: Expr,
    referenced: InputBitmap,
}

impl CompiledExpr for Compiled {
    fn evaluate(&self, inputs: &[f64; MAX_INPUTS]) -> f64 {
        self.expr.eval(inputs)
    }

    fn referenced_inputs(&self) -> InputBitmap {
        self.referenced
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Number(f64),
    Input(usize),
    Plus,
    Minus,
    Star,
    Slash,
    Bang,
    AndAnd,
    OrOr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    LParen,
    RParen,
}

fn lex(text: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' => i += 1,
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '&' if chars.get(i + 1) == Some(&'&') => {
                tokens.push(Token::AndAnd);
                i += 2;
            }
            '|' if chars.get(i + 1) == Some(&'|') => {
                tokens.push(Token::OrOr);
                i += 2;
            }
            '=' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Eq);
                i += 2;
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Ne);
                i += 2;
            }
            '!' => {
                tokens.push(Token::Bang);
                i += 1;
            }
            '<' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Le);
                i += 2;
            }
            '<' => {
                tokens.push(Token::Lt);
                i += 1;
            }
            '>' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Ge);
                i += 2;
            }
            '>' => {
                tokens.push(Token::Gt);
                i += 1;
            }
            'A'..='L' if !chars.get(i + 1).is_some_and(|c| c.is_ascii_alphanumeric()) => {
                tokens.push(Token::Input((c as u8 - b'A') as usize));
                i += 1;
            }
            '0'..='9' | '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let value = text
                    .parse::<f64>()
                    .map_err(|_| format!("invalid number literal `{text}`"))?;
                tokens.push(Token::Number(value));
            }
            other => return Err(format!("unexpected character `{other}` in calc expression")),
        }
    }
    Ok(tokens)
}

#[derive(Debug, Clone)]
enum Expr {
    Number(f64),
    Input(usize),
    Neg(Box<Expr>),
    Not(Box<Expr>),
    Bin(BinOp, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, Copy)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl Expr {
    fn eval(&self, inputs: &[f64; MAX_INPUTS]) -> f64 {
        match self {
            Expr::Number(n) => *n,
            Expr::Input(i) => inputs[*i],
            Expr::Neg(e) => -e.eval(inputs),
            Expr::Not(e) => bool_to_f64(e.eval(inputs) == 0.0),
            Expr::Bin(op, lhs, rhs) => {
                let l = lhs.eval(inputs);
                let r = rhs.eval(inputs);
                match op {
                    BinOp::Add => l + r,
                    BinOp::Sub => l - r,
                    BinOp::Mul => l * r,
                    BinOp::Div => l / r,
                    BinOp::Eq => bool_to_f64(l == r),
                    BinOp::Ne => bool_to_f64(l != r),
                    BinOp::Lt => bool_to_f64(l < r),
                    BinOp::Le => bool_to_f64(l <= r),
                    BinOp::Gt => bool_to_f64(l > r),
                    BinOp::Ge => bool_to_f64(l >= r),
                    BinOp::And => bool_to_f64(l != 0.0 && r != 0.0),
                    BinOp::Or => bool_to_f64(l != 0.0 || r != 0.0),
                }
            }
        }
    }

    fn collect_inputs(&self, bits: &mut InputBitmap) {
        match self {
            Expr::Number(_) => {}
            Expr::Input(i) => bits.set(*i),
            Expr::Neg(e) | Expr::Not(e) => e.collect_inputs(bits),
            Expr::Bin(_, l, r) => {
                l.collect_inputs(bits);
                r.collect_inputs(bits);
            }
        }
    }
}

fn bool_to_f64(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.peek();
        self.pos += 1;
        token
    }

    fn parse_expr(&mut self) -> Result<Expr, String> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_and()?;
        while self.peek() == Some(Token::OrOr) {
            self.bump();
            let rhs = self.parse_and()?;
            lhs = Expr::Bin(BinOp::Or, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_comparison()?;
        while self.peek() == Some(Token::AndAnd) {
            self.bump();
            let rhs = self.parse_comparison()?;
            lhs = Expr::Bin(BinOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_comparison(&mut self) -> Result<Expr, String> {
        let lhs = self.parse_additive()?;
        let op = match self.peek() {
            Some(Token::Eq) => BinOp::Eq,
            Some(Token::Ne) => BinOp::Ne,
            Some(Token::Lt) => BinOp::Lt,
            Some(Token::Le) => BinOp::Le,
            Some(Token::Gt) => BinOp::Gt,
            Some(Token::Ge) => BinOp::Ge,
            _ => return Ok(lhs),
        };
        self.bump();
        let rhs = self.parse_additive()?;
        Ok(Expr::Bin(op, Box::new(lhs), Box::new(rhs)))
    }

    fn parse_additive(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => break,
            };
            self.bump();
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::Bin(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                _ => break,
            };
            self.bump();
            let rhs = self.parse_unary()?;
            lhs = Expr::Bin(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, String> {
        match self.peek() {
            Some(Token::Minus) => {
                self.bump();
                Ok(Expr::Neg(Box::new(self.parse_unary()?)))
            }
            Some(Token::Bang) => {
                self.bump();
                Ok(Expr::Not(Box::new(self.parse_unary()?)))
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, String> {
        match self.bump() {
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::Input(i)) => Ok(Expr::Input(i)),
            Some(Token::LParen) => {
                let expr = self.parse_expr()?;
                match self.bump() {
                    Some(Token::RParen) => Ok(expr),
                    _ => Err("expected closing parenthesis".to_owned()),
                }
            }
            other => Err(format!("unexpected token in calc expression: {other:?}")),
        }
    }
}
