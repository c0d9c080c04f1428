//! The mutator: deterministic, bounded neighbourhood exploration (C5,
//! `spec.md` §4.4).

use std::collections::BTreeSet;

use crate::invocation_db::{InputValue, InvocationDb};
use crate::operator_instance::OperatorInstance;
use crate::oracle::{ProbeOutcome, ValidityOracle};
use crate::symbol::SymbolAssignment;

/// Statically configured operator names for which mutation is disabled
/// (`spec.md` §4.4, "Per-operator skip-list").
#[derive(Debug, Clone, Default)]
pub struct SkipList {
    names: BTreeSet<String>,
}

impl SkipList {
    /// Build a skip-list from an iterator of operator names.
    pub fn new(names: impl IntoIterator<Item = String>) -> Self {
        SkipList {
            names: names.into_iter().collect(),
        }
    }

    /// `true` iff mutation is disabled for `operator_name`.
    #[must_use]
    pub fn contains(&self, operator_name: &str) -> bool {
        self.names.contains(operator_name)
    }
}

/// Once an operator has this many successful invocations and at least one
/// mutated record, further mutation for that operator stops (`spec.md`
/// §4.4).
pub const SKIP_THRESHOLD: usize = 100;

/// Run the mutation schedule for one operator instance against its
/// invocation DB, probing the oracle at every step (`spec.md` §4.4).
///
/// `original_input` and `original_output` are the concrete values from the
/// seed record driving this call. `already_mutated` carries whether mutation
/// has already run for this operator across prior calls (e.g. earlier
/// records at the same call-site): once the DB reaches [`SKIP_THRESHOLD`]
/// successes and `*already_mutated` is already `true`, this call is a no-op.
/// Returns the number of new records added to `db`.
pub fn mutate(
    oi: &OperatorInstance,
    original_input: &[i64],
    original_output: &[i64],
    db: &mut InvocationDb,
    oracle: &dyn ValidityOracle,
    skip_list: &SkipList,
    already_mutated: &mut bool,
) -> usize {
    if skip_list.contains(&oi.name) {
        return 0;
    }

    let arity = original_input.len();
    if arity == 0 {
        return 0;
    }

    let success_count = db.count(crate::invocation_db::Kind::Success);
    if success_count >= SKIP_THRESHOLD && *already_mutated {
        return 0;
    }

    let attribute_only: BTreeSet<usize> = oi
        .attribute_only_symbols()
        .into_iter()
        .map(crate::symbol::Symbol::index)
        .collect();

    let mut added = 0usize;

    let mut probe_and_record = |assignment: Vec<i64>, db: &mut InvocationDb, added: &mut usize| {
        let outcome = oracle.probe(oi, &SymbolAssignment::new(assignment.clone()));
        match outcome {
            ProbeOutcome::Ok { inputs, outputs } => {
                if outputs.len() != original_output.len() {
                    return;
                }
                let values = inputs.into_iter().map(InputValue::Int).collect();
                if db.add(values, Some(outputs)).is_ok() {
                    *added += 1;
                }
            }
            ProbeOutcome::Failed { inputs } => {
                let values = inputs.into_iter().map(InputValue::Int).collect();
                let _ = db.add(values, None);
                *added += 1;
            }
            ProbeOutcome::Uncategorised => {}
        }
    };

    // Step 1: attribute-only symbols, probe 0 and -2.
    for &i in &attribute_only {
        for &value in &[0i64, -2] {
            let mut assignment = original_input.to_vec();
            assignment[i] = value;
            probe_and_record(assignment, db, &mut added);
            *already_mutated = true;
        }
    }

    // Step 2: for each ordered pair (i, j): if equal, perturb s_j += 1;
    // additionally swap s_i <-> s_j.
    for i in 0..arity {
        for j in 0..arity {
            if i == j {
                continue;
            }
            if original_input[i] == original_input[j] {
                let mut assignment = original_input.to_vec();
                assignment[j] += 1;
                probe_and_record(assignment, db, &mut added);
                *already_mutated = true;
            }
            let mut swapped = original_input.to_vec();
            swapped.swap(i, j);
            probe_and_record(swapped, db, &mut added);
            *already_mutated = true;
        }
    }

    // Step 3: |I union A| <= 8: every non-empty subset, delta +2.
    if arity <= 8 {
        for mask in 1u32..(1u32 << arity) {
            let mut assignment = original_input.to_vec();
            for i in 0..arity {
                if mask & (1 << i) != 0 {
                    assignment[i] += 2;
                }
            }
            probe_and_record(assignment, db, &mut added);
            *already_mutated = true;
        }
    }

    // Step 4: |I union A| <= 100: each single symbol, deltas {1,2,3}.
    if arity <= 100 {
        for i in 0..arity {
            for &delta in &[1i64, 2, 3] {
                let mut assignment = original_input.to_vec();
                assignment[i] += delta;
                probe_and_record(assignment, db, &mut added);
                *already_mutated = true;
            }
        }
    }

    // Step 5: |I union A| <= 50: each pair, deltas {1,2}.
    if arity <= 50 {
        for i in 0..arity {
            for j in (i + 1)..arity {
                for &delta in &[1i64, 2] {
                    let mut assignment = original_input.to_vec();
                    assignment[i] += delta;
                    assignment[j] += delta;
                    probe_and_record(assignment, db, &mut added);
                    *already_mutated = true;
                }
            }
        }
    }

    added
}
