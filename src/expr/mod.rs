//! The compile-time expression grammar and evaluator.
//!
//! Parsing is implemented with [pest], the same crate the teacher project uses for
//! its own instruction grammar: `grammar.pest` lays out a standard C-like precedence
//! ladder, one rule per level, each naming its own operator token so the AST builder
//! below never has to re-inspect source text to tell `==` from `!=`. Evaluation walks
//! the resulting tree against the driver's current frames/scope/constants, exactly
//! mirroring `Bass::evaluate`'s node-type switch.

use crate::driver::{Driver, Phase};
use crate::error::{ParseError, Result};
use crate::symbols::{find_scoped, find_scoped_mut, set_scoped, Expression, Level, Variable};
use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser as PestParser;

#[derive(PestParser)]
#[grammar = "expr/grammar.pest"]
pub struct ExprParser;

/// Whether `{pc}`-forward-reference stubs are allowed for an unresolved name.
/// `Strict` is used for `if`/`while` conditions, where a forward reference would
/// silently make the wrong branch look taken.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Evaluation {
    Default,
    Strict,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UnaryOp {
    LogicalNot,
    BitwiseNot,
    Positive,
    Negative,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BinaryOp {
    Multiply,
    Divide,
    Modulo,
    Add,
    Subtract,
    ShiftLeft,
    ShiftRight,
    BitwiseAnd,
    BitwiseOr,
    BitwiseXor,
    Equal,
    NotEqual,
    LessThanEqual,
    GreaterThanEqual,
    LessThan,
    GreaterThan,
    LogicalAnd,
    LogicalOr,
}

/// An expression AST node. `Literal` covers both numeric/character literals and bare
/// identifiers (variable/constant names) — which one it is can only be told by the
/// shape of the text at evaluation time, exactly as in the original.
#[derive(Clone, Debug, PartialEq)]
pub enum Node {
    Null,
    Literal(String),
    Function { name: String, args: Vec<Node> },
    Unary(UnaryOp, Box<Node>),
    Binary(BinaryOp, Box<Node>, Box<Node>),
    Condition(Box<Node>, Box<Node>, Box<Node>),
    Assign(Box<Node>, Box<Node>),
}

pub fn parse(text: &str) -> std::result::Result<Node, ParseError> {
    let mut pairs = ExprParser::parse(Rule::expression, text)?;
    let expr_pair = pairs.next().unwrap().into_inner().next().unwrap();
    Ok(build_expr(expr_pair))
}

fn build_expr(pair: Pair<Rule>) -> Node {
    build_assign(pair.into_inner().next().unwrap())
}

fn build_assign(pair: Pair<Rule>) -> Node {
    let mut inner = pair.into_inner();
    let lhs = build_cond(inner.next().unwrap());
    match inner.next() {
        Some(_op) => {
            let rhs = build_assign(inner.next().unwrap());
            Node::Assign(Box::new(lhs), Box::new(rhs))
        }
        None => lhs,
    }
}

fn build_cond(pair: Pair<Rule>) -> Node {
    let mut inner = pair.into_inner();
    let condition = build_or(inner.next().unwrap());
    match inner.next() {
        Some(true_pair) => {
            let when_true = build_expr(true_pair);
            let when_false = build_cond(inner.next().unwrap());
            Node::Condition(Box::new(condition), Box::new(when_true), Box::new(when_false))
        }
        None => condition,
    }
}

macro_rules! binary_level {
    ($name:ident, $lower:ident, $op_map:expr) => {
        fn $name(pair: Pair<Rule>) -> Node {
            let mut inner = pair.into_inner();
            let mut node = $lower(inner.next().unwrap());
            while let Some(op_pair) = inner.next() {
                let op = ($op_map)(op_pair.as_str());
                let rhs = $lower(inner.next().unwrap());
                node = Node::Binary(op, Box::new(node), Box::new(rhs));
            }
            node
        }
    };
}

binary_level!(build_or, build_and, |_: &str| BinaryOp::LogicalOr);
binary_level!(build_and, build_bitor, |_: &str| BinaryOp::LogicalAnd);
binary_level!(build_bitor, build_bitxor, |_: &str| BinaryOp::BitwiseOr);
binary_level!(build_bitxor, build_bitand, |_: &str| BinaryOp::BitwiseXor);
binary_level!(build_bitand, build_eq, |_: &str| BinaryOp::BitwiseAnd);
binary_level!(build_eq, build_rel, |s: &str| if s == "==" {
    BinaryOp::Equal
} else {
    BinaryOp::NotEqual
});
binary_level!(build_rel, build_shift, |s: &str| match s {
    "<=" => BinaryOp::LessThanEqual,
    ">=" => BinaryOp::GreaterThanEqual,
    "<" => BinaryOp::LessThan,
    _ => BinaryOp::GreaterThan,
});
binary_level!(build_shift, build_add, |s: &str| if s == "<<" {
    BinaryOp::ShiftLeft
} else {
    BinaryOp::ShiftRight
});
binary_level!(build_add, build_mul, |s: &str| if s == "+" {
    BinaryOp::Add
} else {
    BinaryOp::Subtract
});
binary_level!(build_mul, build_unary, |s: &str| match s {
    "*" => BinaryOp::Multiply,
    "/" => BinaryOp::Divide,
    _ => BinaryOp::Modulo,
});

fn build_unary(pair: Pair<Rule>) -> Node {
    let mut inner = pair.into_inner();
    let first = inner.next().unwrap();
    match first.as_rule() {
        Rule::unary_op => {
            let op = match first.as_str() {
                "!" => UnaryOp::LogicalNot,
                "~" => UnaryOp::BitwiseNot,
                "+" => UnaryOp::Positive,
                _ => UnaryOp::Negative,
            };
            Node::Unary(op, Box::new(build_unary(inner.next().unwrap())))
        }
        Rule::primary => build_primary(first),
        _ => unreachable!(),
    }
}

fn build_primary(pair: Pair<Rule>) -> Node {
    let inner = pair.into_inner().next().unwrap();
    match inner.as_rule() {
        Rule::function_call => build_function_call(inner),
        Rule::literal | Rule::identifier => Node::Literal(inner.as_str().to_owned()),
        Rule::expr => build_expr(inner),
        _ => unreachable!(),
    }
}

fn build_function_call(pair: Pair<Rule>) -> Node {
    let mut inner = pair.into_inner();
    let name = inner.next().unwrap().as_str().to_owned();
    let mut args = Vec::new();
    if let Some(arg_list) = inner.next() {
        for arg in arg_list.into_inner() {
            args.push(build_expr(arg));
        }
    }
    Node::Function { name, args }
}

fn relative_label(text: &str) -> Option<(&'static str, i64)> {
    match text {
        "--" => Some(("lastLabel#", -2)),
        "-" => Some(("lastLabel#", -1)),
        "+" => Some(("nextLabel#", 0)),
        "++" => Some(("nextLabel#", 1)),
        _ => None,
    }
}

impl Driver {
    pub fn evaluate(&mut self, text: &str, mode: Evaluation) -> Result<i64> {
        let trimmed = text.trim();

        if trimmed.is_empty() {
            return self.evaluate_node(&Node::Null, mode);
        }

        if let Some((prefix, delta)) = relative_label(trimmed) {
            let counter = if prefix == "lastLabel#" {
                self.last_label_counter as i64 + delta
            } else {
                self.next_label_counter as i64 + delta
            };
            let key = format!("{prefix}{counter}");
            if let Some(value) = self.find_constant(&key) {
                return Ok(value);
            }
            if self.phase == Phase::Query {
                return Ok(self.pc());
            }
            return self.fatal("relative label not declared");
        }

        let node = match parse(trimmed) {
            Ok(node) => node,
            Err(err) => return self.fatal(err.to_string()),
        };
        self.evaluate_node(&node, mode)
    }

    fn evaluate_node(&mut self, node: &Node, mode: Evaluation) -> Result<i64> {
        match node {
            Node::Null => Ok(0),
            Node::Literal(s) => self.evaluate_literal(s, mode),
            Node::Function { name, args } => self.evaluate_function(name, args, mode),
            Node::Unary(op, operand) => {
                let v = self.evaluate_node(operand, mode)?;
                Ok(match op {
                    UnaryOp::LogicalNot => i64::from(v == 0),
                    UnaryOp::BitwiseNot => !v,
                    UnaryOp::Positive => v,
                    UnaryOp::Negative => v.wrapping_neg(),
                })
            }
            Node::Binary(BinaryOp::LogicalAnd, lhs, rhs) => {
                let l = self.evaluate_node(lhs, mode)?;
                if l != 0 {
                    self.evaluate_node(rhs, mode)
                } else {
                    Ok(0)
                }
            }
            Node::Binary(BinaryOp::LogicalOr, lhs, rhs) => {
                let l = self.evaluate_node(lhs, mode)?;
                if l == 0 {
                    self.evaluate_node(rhs, mode)
                } else {
                    Ok(1)
                }
            }
            Node::Binary(op, lhs, rhs) => {
                let l = self.evaluate_node(lhs, mode)?;
                let r = self.evaluate_node(rhs, mode)?;
                self.apply_binary(*op, l, r)
            }
            Node::Condition(cond, when_true, when_false) => {
                if self.evaluate_node(cond, mode)? != 0 {
                    self.evaluate_node(when_true, mode)
                } else {
                    self.evaluate_node(when_false, mode)
                }
            }
            Node::Assign(target, value) => self.evaluate_assign(target, value, mode),
        }
    }

    fn apply_binary(&mut self, op: BinaryOp, l: i64, r: i64) -> Result<i64> {
        Ok(match op {
            BinaryOp::Multiply => l.wrapping_mul(r),
            BinaryOp::Divide => {
                if r == 0 {
                    return self.fatal("division by zero");
                }
                l.wrapping_div(r)
            }
            BinaryOp::Modulo => {
                if r == 0 {
                    return self.fatal("division by zero");
                }
                l.wrapping_rem(r)
            }
            BinaryOp::Add => l.wrapping_add(r),
            BinaryOp::Subtract => l.wrapping_sub(r),
            BinaryOp::ShiftLeft => l.wrapping_shl(r as u32),
            BinaryOp::ShiftRight => l.wrapping_shr(r as u32),
            BinaryOp::BitwiseAnd => l & r,
            BinaryOp::BitwiseOr => l | r,
            BinaryOp::BitwiseXor => l ^ r,
            BinaryOp::Equal => i64::from(l == r),
            BinaryOp::NotEqual => i64::from(l != r),
            BinaryOp::LessThanEqual => i64::from(l <= r),
            BinaryOp::GreaterThanEqual => i64::from(l >= r),
            BinaryOp::LessThan => i64::from(l < r),
            BinaryOp::GreaterThan => i64::from(l > r),
            BinaryOp::LogicalAnd | BinaryOp::LogicalOr => unreachable!("short-circuited above"),
        })
    }

    fn evaluate_literal(&mut self, s: &str, mode: Evaluation) -> Result<i64> {
        if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix('$')) {
            return self.parse_radix(hex, 16);
        }
        if let Some(bin) = s.strip_prefix("0b").or_else(|| s.strip_prefix('%')) {
            return self.parse_radix(bin, 2);
        }
        if let Some(oct) = s.strip_prefix("0o") {
            return self.parse_radix(oct, 8);
        }
        if s.as_bytes().first().is_some_and(u8::is_ascii_digit) {
            return self.parse_radix(s, 10);
        }
        if s.starts_with('\'') {
            return Ok(self.character_literal(s));
        }

        if let Some(variable) = find_scoped::<Variable>(&self.frames, &self.scope, s) {
            return Ok(variable.value);
        }
        if let Some(value) = self.find_constant(s) {
            return Ok(value);
        }
        if mode != Evaluation::Strict && self.phase == Phase::Query {
            return Ok(self.pc());
        }
        self.fatal(format!("unrecognized variable: {s}"))
    }

    fn parse_radix(&mut self, digits: &str, radix: u32) -> Result<i64> {
        match i64::from_str_radix(digits, radix) {
            Ok(value) => Ok(value),
            Err(err) => self.fatal(ParseError::from(err).to_string()),
        }
    }

    /// `'c'` or `'\x'` per the escape table shared with `text()`; any other shape is
    /// a warning, not a hard failure, and evaluates to `0`.
    fn character_literal(&mut self, s: &str) -> i64 {
        let inner = &s[1..s.len() - 1];
        let value = match inner.as_bytes() {
            [c] => Some(*c as i64),
            [b'\\', b's'] => Some(b'\'' as i64),
            [b'\\', b'd'] => Some(b'"' as i64),
            [b'\\', b'c'] => Some(b',' as i64),
            [b'\\', b'b'] => Some(b';' as i64),
            [b'\\', b'n'] => Some(b'\n' as i64),
            [b'\\', b'\\'] => Some(b'\\' as i64),
            _ => None,
        };
        match value {
            Some(v) => v,
            None => {
                let _ = self.warn(format!("unrecognized character constant: {s}"));
                0
            }
        }
    }

    fn evaluate_function(&mut self, name: &str, args: &[Node], mode: Evaluation) -> Result<i64> {
        let mut params = Vec::with_capacity(args.len());
        for arg in args {
            params.push(self.evaluate_node(arg, mode)?);
        }

        if params.is_empty() {
            match name {
                "origin" => return Ok(self.origin),
                "base" => return Ok(self.base),
                "pc" => return Ok(self.pc()),
                _ => {}
            }
        }

        let key = if params.is_empty() { name.to_owned() } else { format!("{name}#{}", params.len()) };
        if let Some(expression) = find_scoped::<Expression>(&self.frames, &self.scope, &key).cloned() {
            if !params.is_empty() {
                self.push_inline_frame();
            }
            for (parameter, value) in expression.parameters.iter().zip(&params) {
                self.set_symbol(Level::Inline, parameter, Variable { value: *value });
            }
            let result = self.evaluate(&expression.value, Evaluation::Default);
            if !params.is_empty() {
                self.pop_frame();
            }
            return result;
        }

        self.fatal(format!("unrecognized expression: {name}"))
    }

    fn evaluate_assign(&mut self, target: &Node, value: &Node, mode: Evaluation) -> Result<i64> {
        let name = match target {
            Node::Literal(s) => s.clone(),
            _ => return self.fatal("invalid assignment target"),
        };
        let v = self.evaluate_node(value, mode)?;
        match find_scoped_mut::<Variable>(&mut self.frames, &self.scope, &name) {
            Some(variable) => {
                variable.value = v;
                Ok(v)
            }
            None => self.fatal(format!("unrecognized variable assignment: {name}")),
        }
    }

    pub(crate) fn set_symbol<T>(&mut self, level: Level, name: &str, value: T)
    where
        crate::symbols::Frame: crate::symbols::HasStore<T>,
    {
        set_scoped(&mut self.frames, &self.scope, level, name, value);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::driver::Driver;

    #[test]
    fn arithmetic_precedence() {
        let mut driver = Driver::new();
        assert_eq!(14, driver.evaluate("2+3*4", Evaluation::Default).unwrap());
    }

    #[test]
    fn ternary_and_comparison() {
        let mut driver = Driver::new();
        assert_eq!(2, driver.evaluate("1==1 ? 2 : 3", Evaluation::Default).unwrap());
    }

    #[test]
    fn logical_and_short_circuits() {
        let mut driver = Driver::new();
        assert_eq!(0, driver.evaluate("0 && (1/0)", Evaluation::Default).unwrap());
    }

    #[test]
    fn logical_or_short_circuits() {
        let mut driver = Driver::new();
        assert_eq!(1, driver.evaluate("1 || (1/0)", Evaluation::Default).unwrap());
    }

    #[test]
    fn hex_and_dollar_prefix_agree() {
        let mut driver = Driver::new();
        assert_eq!(255, driver.evaluate("0xff", Evaluation::Default).unwrap());
        assert_eq!(255, driver.evaluate("$ff", Evaluation::Default).unwrap());
    }

    #[test]
    fn character_literal_escape() {
        let mut driver = Driver::new();
        assert_eq!(b'\n' as i64, driver.evaluate("'\\n'", Evaluation::Default).unwrap());
    }

    #[test]
    fn unresolved_variable_in_strict_mode_is_fatal() {
        let mut driver = Driver::new();
        assert!(driver.evaluate("nope", Evaluation::Strict).is_err());
    }
}
