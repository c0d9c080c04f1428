//! Arithmetic expression-tree grammar.
//!
//! This is the data model the enumerator (`autoinf::expr::enumerator`) walks
//! and that both rule synthesisers (output-shape and input-validity) search
//! over. It carries no enumeration or search logic of its own — only the
//! grammar, structural queries (`height`, `arg_mask`), evaluation, and the
//! textual form rule files are written in.

#![warn(missing_docs)]

use std::fmt;
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A binary arithmetic operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum BinOp {
    /// `a + b`
    Add,
    /// `a - b`
    Sub,
    /// `a * b`
    Mul,
    /// `a / b` (integer division; only produced when division is enabled)
    Div,
}

impl BinOp {
    /// All four operators, in a fixed enumeration order.
    pub const ALL: [BinOp; 4] = [BinOp::Add, BinOp::Sub, BinOp::Mul, BinOp::Div];

    /// The operator's source-level symbol.
    #[must_use]
    pub fn symbol(self) -> char {
        match self {
            BinOp::Add => '+',
            BinOp::Sub => '-',
            BinOp::Mul => '*',
            BinOp::Div => '/',
        }
    }

    fn apply(self, a: i64, b: i64) -> Option<i64> {
        match self {
            BinOp::Add => a.checked_add(b),
            BinOp::Sub => a.checked_sub(b),
            BinOp::Mul => a.checked_mul(b),
            BinOp::Div => {
                if b == 0 {
                    None
                } else {
                    Some(a.wrapping_div(b))
                }
            }
        }
    }
}

/// An arithmetic expression tree.
///
/// Leaves are the literals `1`/`2` (the grammar the enumerator builds from)
/// or argument placeholders `s0, s1, ...`; `Lit` also admits arbitrary
/// integers so the rank-passthrough fallback (`spec.md` §4.5) and parsed
/// rule-file constants can be represented without a second leaf kind.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Expr {
    /// An integer literal leaf.
    Lit(i64),
    /// An argument placeholder `s{index}`.
    Arg(usize),
    /// A binary operator node over two subtrees.
    Bin(BinOp, Box<Expr>, Box<Expr>),
}

impl Expr {
    /// Build a binary node, boxing both children.
    #[must_use]
    pub fn bin(op: BinOp, lhs: Expr, rhs: Expr) -> Expr {
        Expr::Bin(op, Box::new(lhs), Box::new(rhs))
    }

    /// Longest leaf-to-root edge count. Leaves have height 0.
    #[must_use]
    pub fn height(&self) -> u32 {
        match self {
            Expr::Lit(_) | Expr::Arg(_) => 0,
            Expr::Bin(_, l, r) => 1 + l.height().max(r.height()),
        }
    }

    /// The set of argument indices occurring in this subtree, as a bitmask.
    ///
    /// Only the lowest 64 argument slots are representable; `spec.md`'s
    /// hard ceiling (`max_args = 5`) is far below that limit.
    #[must_use]
    pub fn arg_mask(&self) -> u64 {
        match self {
            Expr::Lit(_) => 0,
            Expr::Arg(i) => {
                if *i < 64 {
                    1u64 << i
                } else {
                    0
                }
            }
            Expr::Bin(_, l, r) => l.arg_mask() | r.arg_mask(),
        }
    }

    /// `true` iff any node in this subtree is a [`BinOp::Div`].
    #[must_use]
    pub fn uses_division(&self) -> bool {
        match self {
            Expr::Lit(_) | Expr::Arg(_) => false,
            Expr::Bin(BinOp::Div, _, _) => true,
            Expr::Bin(_, l, r) => l.uses_division() || r.uses_division(),
        }
    }

    /// Evaluate the tree against a vector of argument values, `args[i]`
    /// supplying `s{i}`. Returns `None` on division by zero (or on
    /// overflow, which this implementation treats as an invalid evaluation
    /// rather than panicking).
    #[must_use]
    pub fn evaluate(&self, args: &[i64]) -> Option<i64> {
        match self {
            Expr::Lit(v) => Some(*v),
            Expr::Arg(i) => args.get(*i).copied(),
            Expr::Bin(op, l, r) => {
                let lv = l.evaluate(args)?;
                let rv = r.evaluate(args)?;
                op.apply(lv, rv)
            }
        }
    }
}

impl fmt::Display for Expr {
    /// Fully parenthesized infix form, e.g. `(s0+s1)`. Every binary node is
    /// wrapped so that textual substitution of `s{i}` (as used when
    /// remapping a tree's local argument slots onto chosen operator symbols)
    /// never needs to reason about operator precedence.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Lit(v) => write!(f, "{v}"),
            Expr::Arg(i) => write!(f, "s{i}"),
            Expr::Bin(op, l, r) => write!(f, "({l}{}{r})", op.symbol()),
        }
    }
}

/// An error produced while parsing an [`Expr`] from its [`Display`] form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseExprError(pub String);

impl fmt::Display for ParseExprError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid expression: {}", self.0)
    }
}

impl std::error::Error for ParseExprError {}

impl FromStr for Expr {
    type Err = ParseExprError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.as_bytes();
        let mut pos = 0usize;
        let expr = parse_expr(bytes, &mut pos)
            .ok_or_else(|| ParseExprError(s.to_string()))?;
        if pos != bytes.len() {
            return Err(ParseExprError(s.to_string()));
        }
        Ok(expr)
    }
}

fn parse_expr(bytes: &[u8], pos: &mut usize) -> Option<Expr> {
    if *pos >= bytes.len() {
        return None;
    }
    match bytes[*pos] {
        b'(' => {
            *pos += 1;
            let lhs = parse_expr(bytes, pos)?;
            let op = match bytes.get(*pos)? {
                b'+' => BinOp::Add,
                b'-' => BinOp::Sub,
                b'*' => BinOp::Mul,
                b'/' => BinOp::Div,
                _ => return None,
            };
            *pos += 1;
            let rhs = parse_expr(bytes, pos)?;
            if bytes.get(*pos) != Some(&b')') {
                return None;
            }
            *pos += 1;
            Some(Expr::bin(op, lhs, rhs))
        }
        b's' => {
            *pos += 1;
            let start = *pos;
            while bytes.get(*pos).is_some_and(u8::is_ascii_digit) {
                *pos += 1;
            }
            if *pos == start {
                return None;
            }
            let idx: usize = std::str::from_utf8(&bytes[start..*pos]).ok()?.parse().ok()?;
            Some(Expr::Arg(idx))
        }
        b'-' | b'0'..=b'9' => {
            let start = *pos;
            if bytes[*pos] == b'-' {
                *pos += 1;
            }
            let digits_start = *pos;
            while bytes.get(*pos).is_some_and(u8::is_ascii_digit) {
                *pos += 1;
            }
            if *pos == digits_start {
                return None;
            }
            let lit: i64 = std::str::from_utf8(&bytes[start..*pos]).ok()?.parse().ok()?;
            Some(Expr::Lit(lit))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaf_height_is_zero() {
        assert_eq!(Expr::Lit(1).height(), 0);
        assert_eq!(Expr::Arg(0).height(), 0);
    }

    #[test]
    fn bin_height_is_one_plus_max_child() {
        let e = Expr::bin(BinOp::Add, Expr::Arg(0), Expr::Arg(1));
        assert_eq!(e.height(), 1);
        let e2 = Expr::bin(BinOp::Mul, e.clone(), Expr::Lit(2));
        assert_eq!(e2.height(), 2);
    }

    #[test]
    fn arg_mask_unions_children() {
        let e = Expr::bin(BinOp::Add, Expr::Arg(0), Expr::Arg(2));
        assert_eq!(e.arg_mask(), 0b101);
    }

    #[test]
    fn evaluate_simple_sum() {
        let e = Expr::bin(BinOp::Add, Expr::Arg(0), Expr::Arg(1));
        assert_eq!(e.evaluate(&[3, 4]), Some(7));
    }

    #[test]
    fn evaluate_division_by_zero_is_none() {
        let e = Expr::bin(BinOp::Div, Expr::Arg(0), Expr::Lit(0));
        assert_eq!(e.evaluate(&[3]), None);
    }

    #[test]
    fn display_round_trips_through_parse() {
        let e = Expr::bin(
            BinOp::Sub,
            Expr::bin(BinOp::Add, Expr::Arg(0), Expr::Arg(1)),
            Expr::Lit(2),
        );
        let s = e.to_string();
        let parsed: Expr = s.parse().unwrap();
        assert_eq!(parsed, e);
    }

    #[test]
    fn parse_bare_arg_and_literal() {
        assert_eq!("s3".parse::<Expr>().unwrap(), Expr::Arg(3));
        assert_eq!("2".parse::<Expr>().unwrap(), Expr::Lit(2));
    }
}
