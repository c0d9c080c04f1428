//! The invocation database (C4, `spec.md` §4.3).

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// One input-symbol value: a concrete integer, or "not an integer"
/// (`⊥`, used for non-integer attribute values recorded alongside shape
/// symbols).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputValue {
    /// A concrete integer value.
    Int(i64),
    /// A non-integer attribute value (bottom).
    NonInt,
}

/// A database error: a fatal, per-operator structural inconsistency
/// (`spec.md` §7, `ShapeArityMismatch`).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DbError {
    /// A newly added success tuple's input arity disagrees with every
    /// prior success tuple's arity. Fatal for the operator.
    #[error("input arity mismatch: expected {expected}, got {actual}")]
    ShapeArityMismatch {
        /// The arity every prior success record shares.
        expected: usize,
        /// The arity of the tuple that was rejected.
        actual: usize,
    },
}

/// The per-operator store of success/failure shape tuples (`spec.md`
/// §4.3).
#[derive(Debug, Clone, Default)]
pub struct InvocationDb {
    success: Vec<(Vec<InputValue>, Vec<i64>)>,
    fail: Vec<Vec<InputValue>>,
}

/// The result of [`InvocationDb::analyse`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Analysis {
    /// Unordered pairs `(i, j)` of input-symbol indices whose values are
    /// equal on every success record.
    pub aliases: BTreeSet<(usize, usize)>,
    /// Per-output-index sets of input indices whose variation correlates
    /// with variation in that output.
    pub related: Vec<BTreeSet<usize>>,
    /// Per-output-index sets of input indices proven independent of that
    /// output.
    pub unrelated: Vec<BTreeSet<usize>>,
}

impl InvocationDb {
    /// An empty database.
    #[must_use]
    pub fn new() -> Self {
        InvocationDb::default()
    }

    /// Place a tuple into `success` (when `outputs` is `Some`) or `fail`.
    /// Successful outputs must have the same arity as the first success
    /// record's output or they are dropped (`spec.md` §4.4).
    pub fn add(
        &mut self,
        inputs: Vec<InputValue>,
        outputs: Option<Vec<i64>>,
    ) -> Result<(), DbError> {
        match outputs {
            Some(outputs) => {
                if let Some((_, first_outputs)) = self.success.first() {
                    if first_outputs.len() != outputs.len() {
                        // Differing output arity is silently dropped, not
                        // fatal — only input-arity mismatches are fatal
                        // (`spec.md` §7).
                        return Ok(());
                    }
                }
                if let Some((first_inputs, _)) = self.success.first() {
                    if first_inputs.len() != inputs.len() {
                        return Err(DbError::ShapeArityMismatch {
                            expected: first_inputs.len(),
                            actual: inputs.len(),
                        });
                    }
                }
                self.success.push((inputs, outputs));
            }
            None => self.fail.push(inputs),
        }
        Ok(())
    }

    /// The cardinality of `success` or `fail`.
    #[must_use]
    pub fn count(&self, kind: Kind) -> usize {
        match kind {
            Kind::Success => self.success.len(),
            Kind::Fail => self.fail.len(),
        }
    }

    /// Every success record.
    #[must_use]
    pub fn successes(&self) -> &[(Vec<InputValue>, Vec<i64>)] {
        &self.success
    }

    /// Every failing record's input tuple.
    #[must_use]
    pub fn fails(&self) -> &[Vec<InputValue>] {
        &self.fail
    }

    /// The shared input arity of all success records, if any exist.
    #[must_use]
    pub fn input_arity(&self) -> Option<usize> {
        self.success.first().map(|(i, _)| i.len())
    }

    /// The shared output arity of all success records, if any exist.
    #[must_use]
    pub fn output_arity(&self) -> Option<usize> {
        self.success.first().map(|(_, o)| o.len())
    }

    /// Compute `aliases`, `related[k]`, `unrelated[k]` (`spec.md` §4.3,
    /// "Relatedness heuristic").
    #[must_use]
    pub fn analyse(&self) -> Analysis {
        let Some(input_arity) = self.input_arity() else {
            return Analysis::default();
        };
        let output_arity = self.output_arity().unwrap_or(0);

        let mut aliases = BTreeSet::new();
        for i in 0..input_arity {
            for j in (i + 1)..input_arity {
                if self
                    .success
                    .iter()
                    .all(|(inputs, _)| inputs[i] == inputs[j])
                {
                    aliases.insert((i, j));
                }
            }
        }

        let mut related = vec![BTreeSet::new(); output_arity];
        let mut unrelated = vec![BTreeSet::new(); output_arity];

        // Any input index with a non-integer value on some record is
        // unconditionally unrelated to every output.
        for i in 0..input_arity {
            if self
                .success
                .iter()
                .any(|(inputs, _)| inputs[i] == InputValue::NonInt)
            {
                for k in 0..output_arity {
                    unrelated[k].insert(i);
                }
            }
        }

        for (r_idx, (r_inputs, r_outputs)) in self.success.iter().enumerate() {
            for (r2_inputs, r2_outputs) in self.success.iter().skip(r_idx + 1) {
                let differing: Vec<usize> = (0..input_arity)
                    .filter(|&i| r_inputs[i] != r2_inputs[i])
                    .collect();
                let d = differing.len();
                if d == 0 {
                    continue;
                }
                for k in 0..output_arity {
                    let output_differs = r_outputs[k] != r2_outputs[k];
                    if d <= 3 && output_differs {
                        for &i in &differing {
                            related[k].insert(i);
                        }
                    } else if d == 1 && !output_differs {
                        unrelated[k].insert(differing[0]);
                    }
                }
            }
        }

        Analysis {
            aliases,
            related,
            unrelated,
        }
    }
}

/// Which partition of the invocation DB to query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// The successful-invocation partition.
    Success,
    /// The failing-invocation partition.
    Fail,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(vs: &[i64]) -> Vec<InputValue> {
        vs.iter().map(|&v| InputValue::Int(v)).collect()
    }

    #[test]
    fn arity_mismatch_is_fatal() {
        let mut db = InvocationDb::new();
        db.add(ints(&[1, 2]), Some(vec![1])).unwrap();
        let err = db.add(ints(&[1, 2, 3]), Some(vec![1])).unwrap_err();
        assert_eq!(
            err,
            DbError::ShapeArityMismatch {
                expected: 2,
                actual: 3
            }
        );
    }

    #[test]
    fn aliases_hold_on_every_success_record() {
        let mut db = InvocationDb::new();
        db.add(ints(&[4, 4]), Some(vec![4])).unwrap();
        db.add(ints(&[1, 1]), Some(vec![1])).unwrap();
        db.add(ints(&[7, 9]), Some(vec![7])).unwrap();
        let analysis = db.analyse();
        assert!(!analysis.aliases.contains(&(0, 1)));

        let mut db2 = InvocationDb::new();
        db2.add(ints(&[4, 4]), Some(vec![4])).unwrap();
        db2.add(ints(&[1, 1]), Some(vec![1])).unwrap();
        let analysis2 = db2.analyse();
        assert!(analysis2.aliases.contains(&(0, 1)));
    }

    #[test]
    fn matmul_aliases_and_relatedness() {
        // (s0=3,s1=4,s2=4,s3=5)->(o0=3,o1=5), (s0=2,s1=7,s2=7,s3=1)->(o0=2,o1=1),
        // plus a close neighbour of the first record (differs only in s0,o0)
        // so the relatedness heuristic (Hamming distance <= 3) has signal.
        let mut db = InvocationDb::new();
        db.add(ints(&[3, 4, 4, 5]), Some(vec![3, 5])).unwrap();
        db.add(ints(&[2, 7, 7, 1]), Some(vec![2, 1])).unwrap();
        db.add(ints(&[9, 4, 4, 5]), Some(vec![9, 5])).unwrap();
        let analysis = db.analyse();
        assert!(analysis.aliases.contains(&(1, 2)));
        assert!(analysis.related[0].contains(&0));
    }
}
