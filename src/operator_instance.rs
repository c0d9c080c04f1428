//! The operator instance (OI) model (C3, `spec.md` §3).
//!
//! An OI is the typed skeleton of one traced operator application: an
//! ordered argument list over abstract tensors/integers/opaque values, a
//! dual symbol representation, and the derived `I`/`A`/`O` symbol
//! projections. An OI is created once on record ingestion and never
//! mutated afterwards.

use std::collections::{BTreeMap, BTreeSet};

use autoinf_ir::AttrLiteral;
use serde::{Deserialize, Serialize};

use crate::symbol::Symbol;

/// One OI argument: an abstract tensor (shape of input symbols), an
/// abstract integer (a bare input symbol), an opaque attribute literal, or
/// a list of one of those.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Argument {
    /// A tensor whose shape is a sequence of input symbols.
    Tensor(Vec<Symbol>),
    /// A single symbolic integer attribute.
    Int(Symbol),
    /// An opaque, non-symbolic attribute value.
    Opaque(AttrLiteral),
    /// A homogeneous list of arguments of one of the other three kinds.
    List(Vec<Argument>),
}

impl Argument {
    /// All input symbols transitively occurring in this argument.
    fn symbols_into(&self, out: &mut BTreeSet<Symbol>) {
        match self {
            Argument::Tensor(shape) => out.extend(shape.iter().copied()),
            Argument::Int(s) => {
                out.insert(*s);
            }
            Argument::Opaque(_) => {}
            Argument::List(items) => {
                for item in items {
                    item.symbols_into(out);
                }
            }
        }
    }
}

/// How one argument was passed: by position or by keyword name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PassingMode {
    /// Passed positionally.
    Positional,
    /// Passed by keyword.
    Named,
}

/// One named argument slot of an operator instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedArgument {
    /// The argument's name, as it appears in the operator's signature.
    pub name: String,
    /// Whether this argument was passed positionally or by keyword.
    pub mode: PassingMode,
    /// The argument's value.
    pub value: Argument,
}

/// The typed skeleton of one traced operator application, immutable after
/// construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorInstance {
    /// The operator's identifier (e.g. `"matmul"`, `"reduce_sum"`).
    pub name: String,
    /// A stable identifier for this instance, unique within the record
    /// corpus and used to name on-disk files (`spec.md` §6).
    pub name_index: u64,
    /// The instance's ordered argument list.
    pub arguments: Vec<NamedArgument>,
    /// Output tensor shapes, as sequences of output symbols.
    pub outputs: Vec<Vec<Symbol>>,
    input_symb_2_value: BTreeMap<Symbol, i64>,
    output_symb_2_value: BTreeMap<Symbol, i64>,
}

/// An OI failed its internal consistency invariants (`spec.md` §3).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OperatorInstanceError {
    /// A symbol referenced by an argument or output has no concrete value
    /// recorded.
    #[error("symbol {0} has no recorded value")]
    UnboundSymbol(Symbol),
    /// The dense-index invariant (`spec.md` §3: "the set of symbols is
    /// generated monotonically so indices are dense [0, k)") was violated.
    #[error("symbol indices in namespace are not dense: got {0:?}")]
    NonDenseIndices(Vec<usize>),
}

impl OperatorInstance {
    /// Construct a new operator instance, validating the invariants from
    /// `spec.md` §3.
    pub fn new(
        name: impl Into<String>,
        name_index: u64,
        arguments: Vec<NamedArgument>,
        outputs: Vec<Vec<Symbol>>,
        input_symb_2_value: BTreeMap<Symbol, i64>,
        output_symb_2_value: BTreeMap<Symbol, i64>,
    ) -> Result<Self, OperatorInstanceError> {
        let oi = OperatorInstance {
            name: name.into(),
            name_index,
            arguments,
            outputs,
            input_symb_2_value,
            output_symb_2_value,
        };
        oi.validate()?;
        Ok(oi)
    }

    fn validate(&self) -> Result<(), OperatorInstanceError> {
        for sym in self.input_symbols() {
            if !self.input_symb_2_value.contains_key(&sym) {
                return Err(OperatorInstanceError::UnboundSymbol(sym));
            }
        }
        for sym in self.output_symbols() {
            if !self.output_symb_2_value.contains_key(&sym) {
                return Err(OperatorInstanceError::UnboundSymbol(sym));
            }
        }
        check_dense(self.input_symb_2_value.keys().map(|s| s.index()))?;
        check_dense(self.output_symb_2_value.keys().map(|s| s.index()))?;
        Ok(())
    }

    /// `I ∪ A`: every input symbol occurring anywhere in the argument
    /// list, regardless of whether it appears in a tensor shape.
    #[must_use]
    pub fn input_symbols(&self) -> BTreeSet<Symbol> {
        let mut out = BTreeSet::new();
        for arg in &self.arguments {
            arg.value.symbols_into(&mut out);
        }
        out
    }

    /// `I`: input symbols occurring in at least one tensor's shape.
    #[must_use]
    pub fn tensor_shape_symbols(&self) -> BTreeSet<Symbol> {
        let mut out = BTreeSet::new();
        for arg in &self.arguments {
            if let Argument::Tensor(shape) = &arg.value {
                out.extend(shape.iter().copied());
            }
        }
        out
    }

    /// `A = (I ∪ A) \ I`: input symbols that appear only as standalone
    /// attribute values, never within a tensor shape.
    #[must_use]
    pub fn attribute_only_symbols(&self) -> BTreeSet<Symbol> {
        self.input_symbols()
            .difference(&self.tensor_shape_symbols())
            .copied()
            .collect()
    }

    /// `O`: all output symbols.
    #[must_use]
    pub fn output_symbols(&self) -> BTreeSet<Symbol> {
        self.outputs.iter().flatten().copied().collect()
    }

    /// The originally observed concrete value for an input symbol.
    #[must_use]
    pub fn input_value(&self, sym: Symbol) -> Option<i64> {
        self.input_symb_2_value.get(&sym).copied()
    }

    /// The originally observed concrete value for an output symbol.
    #[must_use]
    pub fn output_value(&self, sym: Symbol) -> Option<i64> {
        self.output_symb_2_value.get(&sym).copied()
    }

    /// `|I ∪ A|`: the operator's input arity, used throughout the mutator
    /// and both synthesisers.
    #[must_use]
    pub fn input_arity(&self) -> usize {
        self.input_symbols().len()
    }

    /// `|O|`: the operator's output arity.
    #[must_use]
    pub fn output_arity(&self) -> usize {
        self.output_symbols().len()
    }
}

fn check_dense(indices: impl Iterator<Item = usize>) -> Result<(), OperatorInstanceError> {
    let mut sorted: Vec<usize> = indices.collect();
    sorted.sort_unstable();
    sorted.dedup();
    for (expected, actual) in sorted.iter().enumerate() {
        if expected != *actual {
            return Err(OperatorInstanceError::NonDenseIndices(sorted));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matmul_oi() -> OperatorInstance {
        // matmul(a: [s0,s1], b: [s2,s3]) -> [o0,o1]
        let args = vec![
            NamedArgument {
                name: "a".into(),
                mode: PassingMode::Positional,
                value: Argument::Tensor(vec![Symbol::input(0), Symbol::input(1)]),
            },
            NamedArgument {
                name: "b".into(),
                mode: PassingMode::Positional,
                value: Argument::Tensor(vec![Symbol::input(2), Symbol::input(3)]),
            },
        ];
        let inputs: BTreeMap<_, _> = [(0, 3), (1, 4), (2, 4), (3, 5)]
            .into_iter()
            .map(|(i, v)| (Symbol::input(i), v))
            .collect();
        let outputs: BTreeMap<_, _> = [(0, 3), (1, 5)]
            .into_iter()
            .map(|(i, v)| (Symbol::output(i), v))
            .collect();
        OperatorInstance::new(
            "matmul",
            0,
            args,
            vec![vec![Symbol::output(0), Symbol::output(1)]],
            inputs,
            outputs,
        )
        .unwrap()
    }

    #[test]
    fn projections_partition_correctly() {
        let oi = matmul_oi();
        assert_eq!(oi.input_arity(), 4);
        assert_eq!(oi.output_arity(), 2);
        assert!(oi.attribute_only_symbols().is_empty());
    }

    #[test]
    fn unbound_symbol_rejected() {
        let args = vec![NamedArgument {
            name: "a".into(),
            mode: PassingMode::Positional,
            value: Argument::Tensor(vec![Symbol::input(0)]),
        }];
        let err = OperatorInstance::new("f", 0, args, vec![], BTreeMap::new(), BTreeMap::new())
            .unwrap_err();
        assert_eq!(err, OperatorInstanceError::UnboundSymbol(Symbol::input(0)));
    }

    #[test]
    fn attribute_only_symbol_detected() {
        let args = vec![
            NamedArgument {
                name: "x".into(),
                mode: PassingMode::Positional,
                value: Argument::Tensor(vec![Symbol::input(0)]),
            },
            NamedArgument {
                name: "axis".into(),
                mode: PassingMode::Named,
                value: Argument::Int(Symbol::input(1)),
            },
        ];
        let inputs: BTreeMap<_, _> = [(0, 4), (1, 0)]
            .into_iter()
            .map(|(i, v)| (Symbol::input(i), v))
            .collect();
        let oi = OperatorInstance::new("f", 0, args, vec![], inputs, BTreeMap::new()).unwrap();
        assert_eq!(oi.attribute_only_symbols(), [Symbol::input(1)].into());
    }
}
