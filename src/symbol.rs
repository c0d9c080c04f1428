//! Symbol naming and the dual integer/string representation (`spec.md` §9,
//! "Symbol naming collisions").
//!
//! Every data structure keys on the integer [`Symbol`]; the `s`/`o` string
//! form is produced only at the external interface (file formats, rule
//! text, debug output).

use std::fmt;

use serde::{Deserialize, Serialize};

/// Which namespace a symbol belongs to: input-shape/attribute symbols
/// (`s0, s1, ...`) or output-shape symbols (`o0, o1, ...`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// An input symbol, printed as `s{index}`.
    Input,
    /// An output symbol, printed as `o{index}`.
    Output,
}

/// An integer-indexed symbol in one of the two namespaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Symbol {
    namespace_is_output: bool,
    index: usize,
}

impl Symbol {
    /// An input symbol `s{index}`.
    #[must_use]
    pub fn input(index: usize) -> Self {
        Symbol {
            namespace_is_output: false,
            index,
        }
    }

    /// An output symbol `o{index}`.
    #[must_use]
    pub fn output(index: usize) -> Self {
        Symbol {
            namespace_is_output: true,
            index,
        }
    }

    /// The symbol's namespace.
    #[must_use]
    pub fn namespace(self) -> Namespace {
        if self.namespace_is_output {
            Namespace::Output
        } else {
            Namespace::Input
        }
    }

    /// The symbol's dense index within its namespace.
    #[must_use]
    pub fn index(self) -> usize {
        self.index
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = if self.namespace_is_output { 'o' } else { 's' };
        write!(f, "{prefix}{}", self.index)
    }
}

/// An error produced while parsing a symbol's external `sN`/`oN` form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid symbol name: {0}")]
pub struct ParseSymbolError(pub String);

impl std::str::FromStr for Symbol {
    type Err = ParseSymbolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        let prefix = chars.next().ok_or_else(|| ParseSymbolError(s.to_string()))?;
        let rest = chars.as_str();
        let index: usize = rest.parse().map_err(|_| ParseSymbolError(s.to_string()))?;
        match prefix {
            's' => Ok(Symbol::input(index)),
            'o' => Ok(Symbol::output(index)),
            _ => Err(ParseSymbolError(s.to_string())),
        }
    }
}

/// A concrete assignment of integer values to input symbols, indexed
/// densely by [`Symbol::index`]. This is the vector form trees are
/// evaluated against — never a map (`spec.md` §9).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolAssignment {
    values: Vec<i64>,
}

impl SymbolAssignment {
    /// Build an assignment from a dense vector of input-symbol values.
    #[must_use]
    pub fn new(values: Vec<i64>) -> Self {
        SymbolAssignment { values }
    }

    /// The value bound to `s{index}`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<i64> {
        self.values.get(index).copied()
    }

    /// The number of bound symbols.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// `true` iff no symbols are bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The assignment as a plain slice, in `s0, s1, ...` order.
    #[must_use]
    pub fn as_slice(&self) -> &[i64] {
        &self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_uses_prefix_by_namespace() {
        assert_eq!(Symbol::input(3).to_string(), "s3");
        assert_eq!(Symbol::output(0).to_string(), "o0");
    }

    #[test]
    fn parse_round_trips() {
        let s: Symbol = "s7".parse().unwrap();
        assert_eq!(s, Symbol::input(7));
        let o: Symbol = "o2".parse().unwrap();
        assert_eq!(o, Symbol::output(2));
    }

    #[test]
    fn parse_rejects_bad_prefix() {
        assert!("x3".parse::<Symbol>().is_err());
    }
}
