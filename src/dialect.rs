//! The dialect-rule matcher (C8, `spec.md` §4.7), grounded in
//! `examples/original_source/dynofuzz/materialize/torch/dialect.py` and
//! `examples/original_source/autoinf/autoinf/inference/nnsmith_rules.py`:
//! a fixed catalogue of hand-written `requires`/`type_transfer` rule
//! classes, matched against an OI's invocation DB rather than invoked.
//!
//! `spec.md`'s operator instance model (C3) does not carry a per-argument
//! dtype, so matching here works purely over shape vectors; dtype
//! agreement is out of scope for this crate's OI representation (noted in
//! `DESIGN.md`).

use rand::Rng;

use crate::invocation_db::{InputValue, InvocationDb};
use crate::operator_instance::{Argument, OperatorInstance};
use crate::symbol::Symbol;

/// A dialect rule's `requires`/`type_transfer` raised (`spec.md` §7,
/// `RuleTransferError`): a structural mismatch (wrong rank, wrong arity)
/// rather than a failed predicate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("dialect rule structural error: {0}")]
pub struct RuleTransferError(pub String);

/// A hand-written, framework-specific operator rule class (`spec.md`
/// §4.7).
pub trait DialectRule: Send + Sync {
    /// The rule class's registry name (for debug output only; the
    /// dialect-match file stores indices, not names, per `spec.md` §6).
    fn name(&self) -> &str;
    /// Expected input tensor arity.
    fn n_input(&self) -> usize;
    /// Expected output tensor arity.
    fn n_output(&self) -> usize;
    /// Validity predicates over the concrete input shapes.
    fn requires(&self, inputs: &[Vec<i64>]) -> Result<Vec<bool>, RuleTransferError>;
    /// The output shapes this rule class predicts from the concrete
    /// input shapes.
    fn type_transfer(&self, inputs: &[Vec<i64>]) -> Result<Vec<Vec<i64>>, RuleTransferError>;

    /// Reverse-engineer concrete input shapes that would produce
    /// `targets` under [`DialectRule::type_transfer`], used by the graph
    /// generator's backward insertion (`spec.md` §4.8). `None` means this
    /// rule class cannot be inverted and backward insertion should try a
    /// different operator.
    fn backward_shapes(&self, _targets: &[Vec<i64>], _rng: &mut rand::rngs::SmallRng) -> Option<Vec<Vec<i64>>> {
        None
    }
}

/// A unary, shape-identity rule (`dialect.py`'s `Flatten`-adjacent
/// passthrough ops; ReLU, sigmoid, and other elementwise unary operators
/// all share this shape behaviour).
pub struct ElementwiseUnary;

impl DialectRule for ElementwiseUnary {
    fn name(&self) -> &str {
        "elementwise_unary"
    }
    fn n_input(&self) -> usize {
        1
    }
    fn n_output(&self) -> usize {
        1
    }
    fn requires(&self, inputs: &[Vec<i64>]) -> Result<Vec<bool>, RuleTransferError> {
        check_arity(inputs, 1)?;
        Ok(vec![])
    }
    fn type_transfer(&self, inputs: &[Vec<i64>]) -> Result<Vec<Vec<i64>>, RuleTransferError> {
        check_arity(inputs, 1)?;
        Ok(vec![inputs[0].clone()])
    }
    fn backward_shapes(&self, targets: &[Vec<i64>], _rng: &mut rand::rngs::SmallRng) -> Option<Vec<Vec<i64>>> {
        Some(vec![targets.first()?.clone()])
    }
}

/// 2-D matrix multiplication (`nnsmith_rules.py`'s `MatMul`): requires the
/// shared inner dimension to agree; output is `[a.rows, b.cols]`.
pub struct MatMul;

impl DialectRule for MatMul {
    fn name(&self) -> &str {
        "matmul"
    }
    fn n_input(&self) -> usize {
        2
    }
    fn n_output(&self) -> usize {
        1
    }
    fn requires(&self, inputs: &[Vec<i64>]) -> Result<Vec<bool>, RuleTransferError> {
        check_arity(inputs, 2)?;
        let (a, b) = (&inputs[0], &inputs[1]);
        if a.len() != 2 || b.len() != 2 {
            return Err(RuleTransferError("matmul requires rank-2 operands".into()));
        }
        Ok(vec![a[1] == b[0]])
    }
    fn type_transfer(&self, inputs: &[Vec<i64>]) -> Result<Vec<Vec<i64>>, RuleTransferError> {
        check_arity(inputs, 2)?;
        let (a, b) = (&inputs[0], &inputs[1]);
        if a.len() != 2 || b.len() != 2 {
            return Err(RuleTransferError("matmul requires rank-2 operands".into()));
        }
        Ok(vec![vec![a[0], b[1]]])
    }
    fn backward_shapes(&self, targets: &[Vec<i64>], rng: &mut rand::rngs::SmallRng) -> Option<Vec<Vec<i64>>> {
        let out = targets.first()?;
        if out.len() != 2 {
            return None;
        }
        let inner = rng.gen_range(1..=8);
        Some(vec![vec![out[0], inner], vec![inner, out[1]]])
    }
}

/// Reduction over the last dimension (`nnsmith_rules.py`'s reduce family):
/// output drops the final shape element.
pub struct ReduceLastDim;

impl DialectRule for ReduceLastDim {
    fn name(&self) -> &str {
        "reduce_last_dim"
    }
    fn n_input(&self) -> usize {
        1
    }
    fn n_output(&self) -> usize {
        1
    }
    fn requires(&self, inputs: &[Vec<i64>]) -> Result<Vec<bool>, RuleTransferError> {
        check_arity(inputs, 1)?;
        if inputs[0].is_empty() {
            return Err(RuleTransferError("reduce requires rank >= 1".into()));
        }
        Ok(vec![])
    }
    fn type_transfer(&self, inputs: &[Vec<i64>]) -> Result<Vec<Vec<i64>>, RuleTransferError> {
        check_arity(inputs, 1)?;
        let shape = &inputs[0];
        if shape.is_empty() {
            return Err(RuleTransferError("reduce requires rank >= 1".into()));
        }
        Ok(vec![shape[..shape.len() - 1].to_vec()])
    }
    fn backward_shapes(&self, targets: &[Vec<i64>], rng: &mut rand::rngs::SmallRng) -> Option<Vec<Vec<i64>>> {
        let out = targets.first()?;
        let extra = rng.gen_range(1..=8);
        let mut shape = out.clone();
        shape.push(extra);
        Some(vec![shape])
    }
}

/// NumPy-style broadcasting binary op (`dialect.py`'s elementwise binary
/// family): per-dimension, either side may be `1` or the two must agree.
pub struct BroadcastBinary;

impl DialectRule for BroadcastBinary {
    fn name(&self) -> &str {
        "broadcast_binary"
    }
    fn n_input(&self) -> usize {
        2
    }
    fn n_output(&self) -> usize {
        1
    }
    fn requires(&self, inputs: &[Vec<i64>]) -> Result<Vec<bool>, RuleTransferError> {
        check_arity(inputs, 2)?;
        let (a, b) = (&inputs[0], &inputs[1]);
        if a.len() != b.len() {
            return Err(RuleTransferError("broadcast_binary requires equal rank".into()));
        }
        let ok = a.iter().zip(b.iter()).all(|(&x, &y)| x == y || x == 1 || y == 1);
        Ok(vec![ok])
    }
    fn type_transfer(&self, inputs: &[Vec<i64>]) -> Result<Vec<Vec<i64>>, RuleTransferError> {
        check_arity(inputs, 2)?;
        let (a, b) = (&inputs[0], &inputs[1]);
        if a.len() != b.len() {
            return Err(RuleTransferError("broadcast_binary requires equal rank".into()));
        }
        Ok(vec![a.iter().zip(b.iter()).map(|(&x, &y)| x.max(y)).collect()])
    }
    fn backward_shapes(&self, targets: &[Vec<i64>], _rng: &mut rand::rngs::SmallRng) -> Option<Vec<Vec<i64>>> {
        let out = targets.first()?;
        Some(vec![out.clone(), out.clone()])
    }
}

fn check_arity(inputs: &[Vec<i64>], expected: usize) -> Result<(), RuleTransferError> {
    if inputs.len() != expected {
        return Err(RuleTransferError(format!(
            "expected {expected} input tensors, got {}",
            inputs.len()
        )));
    }
    Ok(())
}

/// The fixed catalogue of hand-written rule classes (`spec.md` §4.7),
/// indexed positionally: the dialect-match file stores indices into this
/// list (`spec.md` §6).
#[must_use]
pub fn registry() -> Vec<Box<dyn DialectRule>> {
    vec![
        Box::new(ElementwiseUnary),
        Box::new(MatMul),
        Box::new(ReduceLastDim),
        Box::new(BroadcastBinary),
    ]
}

/// Group an OI's flat `I∪A`-indexed input values into per-tensor shape
/// vectors, in argument order, skipping non-tensor arguments.
pub(crate) fn tensor_input_shapes(oi: &OperatorInstance, inputs: &[InputValue]) -> Option<Vec<Vec<i64>>> {
    let mut out = Vec::new();
    for arg in &oi.arguments {
        if let Argument::Tensor(shape) = &arg.value {
            let mut concrete = Vec::with_capacity(shape.len());
            for sym in shape {
                match inputs.get(sym.index())? {
                    InputValue::Int(v) => concrete.push(*v),
                    InputValue::NonInt => return None,
                }
            }
            out.push(concrete);
        }
    }
    Some(out)
}

/// Group an OI's flat `O`-indexed output values into per-tensor shape
/// vectors (`oi.outputs` is already grouped per tensor).
pub(crate) fn tensor_output_shapes(oi: &OperatorInstance, outputs: &[i64]) -> Vec<Vec<i64>> {
    oi.outputs
        .iter()
        .map(|shape| shape.iter().map(|s: &Symbol| outputs[s.index()]).collect())
        .collect()
}

/// Attempt to match every rule class in `registry` against `oi`'s
/// invocation DB, returning the indices of classes that accept every
/// success and reject every failing record (`spec.md` §4.7).
#[must_use]
pub fn match_dialect(oi: &OperatorInstance, db: &InvocationDb, registry: &[Box<dyn DialectRule>]) -> Vec<usize> {
    let mut matches = Vec::new();
    'rule: for (idx, rule) in registry.iter().enumerate() {
        let input_tensor_count = oi.arguments.iter().filter(|a| matches!(a.value, Argument::Tensor(_))).count();
        if input_tensor_count != rule.n_input() || oi.outputs.len() != rule.n_output() {
            continue;
        }

        for (inputs, outputs) in db.successes() {
            let Some(tensors) = tensor_input_shapes(oi, inputs) else {
                continue 'rule;
            };
            let predicted = match rule.type_transfer(&tensors) {
                Ok(p) => p,
                Err(_) => continue 'rule,
            };
            if predicted != tensor_output_shapes(oi, outputs) {
                continue 'rule;
            }
            let predicates = match rule.requires(&tensors) {
                Ok(p) => p,
                Err(_) => continue 'rule,
            };
            if !predicates.iter().all(|&p| p) {
                continue 'rule;
            }
        }

        for inputs in db.fails() {
            if inputs.iter().any(|v| matches!(v, InputValue::Int(n) if *n < 0) || *v == InputValue::NonInt) {
                continue;
            }
            let Some(tensors) = tensor_input_shapes(oi, inputs) else {
                continue;
            };
            let disqualifies_match = match rule.type_transfer(&tensors) {
                Err(_) => true,
                Ok(_) => match rule.requires(&tensors) {
                    Ok(predicates) => predicates.iter().any(|&p| !p),
                    Err(_) => true,
                },
            };
            if !disqualifies_match {
                continue 'rule;
            }
        }

        matches.push(idx);
    }
    matches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator_instance::{NamedArgument, PassingMode};
    use std::collections::BTreeMap;

    fn matmul_db() -> (OperatorInstance, InvocationDb) {
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
        let outputs: BTreeMap<_, _> = [(0, 3), (1, 5)].into_iter().map(|(i, v)| (Symbol::output(i), v)).collect();
        let oi = OperatorInstance::new(
            "matmul",
            0,
            args,
            vec![vec![Symbol::output(0), Symbol::output(1)]],
            inputs,
            outputs,
        )
        .unwrap();

        let mut db = InvocationDb::new();
        db.add(
            [3i64, 4, 4, 5].into_iter().map(InputValue::Int).collect(),
            Some(vec![3, 5]),
        )
        .unwrap();
        db.add(
            [2i64, 7, 7, 1].into_iter().map(InputValue::Int).collect(),
            Some(vec![2, 1]),
        )
        .unwrap();
        db.add([3i64, 4, 5, 5].into_iter().map(InputValue::Int).collect(), None).unwrap();
        (oi, db)
    }

    #[test]
    fn matmul_matches_only_the_matmul_rule() {
        let (oi, db) = matmul_db();
        let reg = registry();
        let matches = match_dialect(&oi, &db, &reg);
        assert_eq!(matches, vec![1]);
    }
}
