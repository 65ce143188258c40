use crate::reader::{RESERVED, Spanned, Token, tokenize};
use crate::runtime::{EvalError, EvalResult};
use serde_json::Value;
use std::rc::Rc;

/// Parsed expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    // === Literals ===
    Literal(Value),
    Array(Vec<Expr>),
    Object(Vec<(Rc<str>, Expr)>),

    // === Access ===
    Ident(Rc<str>),
    Member(Box<Expr>, Rc<str>),
    Index(Box<Expr>, Box<Expr>),
    Call(Box<Expr>, Vec<Expr>),

    // === Operators ===
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Coalesce(Box<Expr>, Box<Expr>),
    Conditional(Box<Expr>, Box<Expr>, Box<Expr>),

    // === Writes ===
    /// `target = value`, or `target op= value` when the operator is present.
    Assign(Box<Expr>, Option<BinaryOp>, Box<Expr>),
    Update {
        target: Box<Expr>,
        delta: f64,
        prefix: bool,
    },

    /// `a; b; c` evaluates every part and yields the last.
    Sequence(Vec<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    Plus,
    TypeOf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Mul,
    Div,
    Mod,
    Add,
    Sub,
    Lt,
    Lte,
    Gt,
    Gte,
    Eq,
    Neq,
    StrictEq,
    StrictNeq,
}

#[derive(Clone, Copy)]
enum Infix {
    Binary(BinaryOp),
    And,
    Or,
    Coalesce,
}

fn infix(token: &Token) -> Option<(u8, Infix)> {
    let Token::Punct(p) = token else {
        return None;
    };
    let entry = match *p {
        "??" => (1, Infix::Coalesce),
        "||" => (2, Infix::Or),
        "&&" => (3, Infix::And),
        "==" => (4, Infix::Binary(BinaryOp::Eq)),
        "!=" => (4, Infix::Binary(BinaryOp::Neq)),
        "===" => (4, Infix::Binary(BinaryOp::StrictEq)),
        "!==" => (4, Infix::Binary(BinaryOp::StrictNeq)),
        "<" => (5, Infix::Binary(BinaryOp::Lt)),
        "<=" => (5, Infix::Binary(BinaryOp::Lte)),
        ">" => (5, Infix::Binary(BinaryOp::Gt)),
        ">=" => (5, Infix::Binary(BinaryOp::Gte)),
        "+" => (6, Infix::Binary(BinaryOp::Add)),
        "-" => (6, Infix::Binary(BinaryOp::Sub)),
        "*" => (7, Infix::Binary(BinaryOp::Mul)),
        "/" => (7, Infix::Binary(BinaryOp::Div)),
        "%" => (7, Infix::Binary(BinaryOp::Mod)),
        _ => return None,
    };
    Some(entry)
}

fn compound(p: &str) -> Option<Option<BinaryOp>> {
    match p {
        "=" => Some(None),
        "+=" => Some(Some(BinaryOp::Add)),
        "-=" => Some(Some(BinaryOp::Sub)),
        "*=" => Some(Some(BinaryOp::Mul)),
        "/=" => Some(Some(BinaryOp::Div)),
        _ => None,
    }
}

/// Parse an expression or `;`-separated statement list.
pub fn compile(source: &str) -> EvalResult<Expr> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        end: source.len(),
    };
    let expr = parser.parse_sequence()?;
    if let Some(t) = parser.peek_spanned() {
        return Err(EvalError::syntax(
            t.offset,
            format!("unexpected token {}", describe(&t.token)),
        ));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    end: usize,
}

impl Parser {
    fn peek_spanned(&self) -> Option<&Spanned> {
        self.tokens.get(self.pos)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn offset(&self) -> usize {
        self.peek_spanned().map_or(self.end, |s| s.offset)
    }

    fn is_punct(&self, p: &str) -> bool {
        matches!(self.peek(), Some(Token::Punct(q)) if *q == p)
    }

    fn eat(&mut self, p: &str) -> bool {
        if self.is_punct(p) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, p: &str) -> EvalResult<()> {
        if self.eat(p) {
            return Ok(());
        }
        let found = self.peek().map_or("end of input".to_string(), describe);
        Err(EvalError::syntax(
            self.offset(),
            format!("expected '{p}' but found {found}"),
        ))
    }

    fn next(&mut self) -> Option<Spanned> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn parse_sequence(&mut self) -> EvalResult<Expr> {
        let mut parts = Vec::new();
        loop {
            while self.eat(";") {}
            if self.peek().is_none() || self.is_punct(")") {
                break;
            }
            parts.push(self.parse_assignment()?);
            if !self.eat(";") {
                break;
            }
        }
        Ok(match parts.len() {
            0 => Expr::Literal(Value::Null),
            1 => parts.remove(0),
            _ => Expr::Sequence(parts),
        })
    }

    fn parse_assignment(&mut self) -> EvalResult<Expr> {
        let offset = self.offset();
        let lhs = self.parse_conditional()?;
        let op = match self.peek() {
            Some(Token::Punct(p)) => compound(p),
            _ => None,
        };
        let Some(op) = op else {
            return Ok(lhs);
        };
        ensure_target(&lhs, offset)?;
        self.pos += 1;
        let rhs = self.parse_assignment()?;
        Ok(Expr::Assign(Box::new(lhs), op, Box::new(rhs)))
    }

    fn parse_conditional(&mut self) -> EvalResult<Expr> {
        let cond = self.parse_binary(0)?;
        if !self.eat("?") {
            return Ok(cond);
        }
        let then = self.parse_assignment()?;
        self.expect(":")?;
        let otherwise = self.parse_assignment()?;
        Ok(Expr::Conditional(
            Box::new(cond),
            Box::new(then),
            Box::new(otherwise),
        ))
    }

    fn parse_binary(&mut self, min_prec: u8) -> EvalResult<Expr> {
        let mut left = self.parse_unary()?;
        while let Some((prec, op)) = self.peek().and_then(infix) {
            if prec <= min_prec {
                break;
            }
            self.pos += 1;
            let right = Box::new(self.parse_binary(prec)?);
            let l = Box::new(left);
            left = match op {
                Infix::Binary(b) => Expr::Binary(b, l, right),
                Infix::And => Expr::And(l, right),
                Infix::Or => Expr::Or(l, right),
                Infix::Coalesce => Expr::Coalesce(l, right),
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> EvalResult<Expr> {
        let offset = self.offset();
        let op = match self.peek() {
            Some(Token::Punct("!")) => Some(UnaryOp::Not),
            Some(Token::Punct("-")) => Some(UnaryOp::Neg),
            Some(Token::Punct("+")) => Some(UnaryOp::Plus),
            Some(Token::Ident(w)) if w == "typeof" => Some(UnaryOp::TypeOf),
            _ => None,
        };
        if let Some(op) = op {
            self.pos += 1;
            let operand = self.parse_unary()?;
            return Ok(Expr::Unary(op, Box::new(operand)));
        }
        let delta = if self.eat("++") {
            Some(1.0)
        } else if self.eat("--") {
            Some(-1.0)
        } else {
            None
        };
        if let Some(delta) = delta {
            let target = self.parse_unary()?;
            ensure_target(&target, offset)?;
            return Ok(Expr::Update {
                target: Box::new(target),
                delta,
                prefix: true,
            });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> EvalResult<Expr> {
        let offset = self.offset();
        let mut expr = self.parse_primary()?;
        loop {
            if self.eat(".") {
                let at = self.offset();
                match self.next().map(|s| s.token) {
                    Some(Token::Ident(name)) => expr = Expr::Member(Box::new(expr), name.into()),
                    _ => return Err(EvalError::syntax(at, "expected property name after '.'")),
                }
            } else if self.eat("[") {
                let key = self.parse_assignment()?;
                self.expect("]")?;
                expr = Expr::Index(Box::new(expr), Box::new(key));
            } else if self.eat("(") {
                let args = self.parse_list(")")?;
                expr = Expr::Call(Box::new(expr), args);
            } else {
                break;
            }
        }
        let delta = if self.is_punct("++") {
            Some(1.0)
        } else if self.is_punct("--") {
            Some(-1.0)
        } else {
            None
        };
        if let Some(delta) = delta {
            ensure_target(&expr, offset)?;
            self.pos += 1;
            expr = Expr::Update {
                target: Box::new(expr),
                delta,
                prefix: false,
            };
        }
        Ok(expr)
    }

    fn parse_list(&mut self, close: &str) -> EvalResult<Vec<Expr>> {
        let mut items = Vec::new();
        while !self.eat(close) {
            items.push(self.parse_assignment()?);
            if !self.eat(",") {
                self.expect(close)?;
                break;
            }
        }
        Ok(items)
    }

    fn parse_primary(&mut self) -> EvalResult<Expr> {
        let offset = self.offset();
        let Some(token) = self.next().map(|s| s.token) else {
            return Err(EvalError::syntax(offset, "unexpected end of input"));
        };
        match token {
            Token::Number(n) => Ok(Expr::Literal(crate::value::number_value(n))),
            Token::Str(s) => Ok(Expr::Literal(Value::String(s))),
            Token::Ident(name) => match name.as_str() {
                "true" => Ok(Expr::Literal(Value::Bool(true))),
                "false" => Ok(Expr::Literal(Value::Bool(false))),
                "null" | "undefined" => Ok(Expr::Literal(Value::Null)),
                w if RESERVED.contains(&w) => Err(EvalError::syntax(
                    offset,
                    format!("unexpected keyword '{w}'"),
                )),
                _ => Ok(Expr::Ident(name.into())),
            },
            Token::Punct("(") => {
                let inner = self.parse_sequence()?;
                self.expect(")")?;
                Ok(inner)
            }
            Token::Punct("[") => Ok(Expr::Array(self.parse_list("]")?)),
            Token::Punct("{") => self.parse_object(),
            other => Err(EvalError::syntax(
                offset,
                format!("unexpected token {}", describe(&other)),
            )),
        }
    }

    fn parse_object(&mut self) -> EvalResult<Expr> {
        let mut entries = Vec::new();
        while !self.eat("}") {
            let offset = self.offset();
            let key: Rc<str> = match self.next().map(|s| s.token) {
                Some(Token::Ident(k)) | Some(Token::Str(k)) => k.into(),
                Some(Token::Number(n)) => crate::value::format_f64(n).into(),
                _ => return Err(EvalError::syntax(offset, "expected property key")),
            };
            let value = if self.eat(":") {
                self.parse_assignment()?
            } else {
                Expr::Ident(key.clone())
            };
            entries.push((key, value));
            if !self.eat(",") {
                self.expect("}")?;
                break;
            }
        }
        Ok(Expr::Object(entries))
    }
}

fn ensure_target(expr: &Expr, offset: usize) -> EvalResult<()> {
    match expr {
        Expr::Ident(_) | Expr::Member(..) | Expr::Index(..) => Ok(()),
        _ => Err(EvalError::syntax(offset, "invalid assignment target")),
    }
}

fn describe(token: &Token) -> String {
    match token {
        Token::Number(n) => crate::value::format_f64(*n),
        Token::Str(s) => format!("'{s}'"),
        Token::Ident(s) => format!("'{s}'"),
        Token::Punct(p) => format!("'{p}'"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ident(name: &str) -> Box<Expr> {
        Box::new(Expr::Ident(name.into()))
    }

    #[test]
    fn test_precedence() {
        let expr = compile("a + b * c").expect("compiles");
        assert_eq!(
            expr,
            Expr::Binary(
                BinaryOp::Add,
                ident("a"),
                Box::new(Expr::Binary(BinaryOp::Mul, ident("b"), ident("c")))
            )
        );
    }

    #[test]
    fn test_coalesce_binds_loosest() {
        let expr = compile("a ?? b || c").expect("compiles");
        assert!(matches!(expr, Expr::Coalesce(_, ref rhs) if matches!(**rhs, Expr::Or(..))));
    }

    #[test]
    fn test_member_call_chain() {
        let expr = compile("$refs.input.focus()").expect("compiles");
        let Expr::Call(callee, args) = expr else {
            panic!("expected call");
        };
        assert!(args.is_empty());
        assert!(matches!(*callee, Expr::Member(_, ref name) if &**name == "focus"));
    }

    #[test]
    fn test_statements_and_compound_assignment() {
        let expr = compile("count += 1; open = !open;").expect("compiles");
        let Expr::Sequence(parts) = expr else {
            panic!("expected sequence");
        };
        assert_eq!(parts.len(), 2);
        assert!(matches!(parts[0], Expr::Assign(_, Some(BinaryOp::Add), _)));
    }

    #[test]
    fn test_object_literal_shorthand_and_trailing_comma() {
        let expr = compile("{ open: false, 'tags': [], name, }").expect("compiles");
        let Expr::Object(entries) = expr else {
            panic!("expected object");
        };
        let keys: Vec<&str> = entries.iter().map(|(k, _)| &**k).collect();
        assert_eq!(keys, vec!["open", "tags", "name"]);
        assert_eq!(entries[0].1, Expr::Literal(json!(false)));
    }

    #[test]
    fn test_rejects_iteration_syntax_and_trailing_tokens() {
        assert!(compile("dog in dogs").expect_err("in is reserved").is_syntax());
        assert!(compile("(item, index) in items").is_err());
        assert!(compile("a b").is_err());
        assert!(compile("1 = 2").is_err());
    }

    #[test]
    fn test_error_offsets_point_at_token() {
        match compile("a + )") {
            Err(EvalError::Syntax { offset, .. }) => assert_eq!(offset, 4),
            other => panic!("unexpected {other:?}"),
        }
    }
}
