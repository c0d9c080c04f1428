//! The shape-rule synthesiser (C6, `spec.md` §4.5).

use std::time::{Duration, Instant};

use autoinf_ast::Expr;

use crate::combinatorics::{expand_permutation, k_subsets, substitute_symbols};
use crate::expr::cache::TreeCache;
use crate::invocation_db::InvocationDb;

/// A synthesised output-shape rule: `(output_index, expression_tree,
/// symbol_index_permutation)` (`spec.md` §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeRule {
    /// Which output symbol this rule predicts.
    pub output_index: usize,
    /// The expression tree, in its local `s0, s1, ...` argument slots.
    pub tree: Expr,
    /// The permutation mapping the tree's local argument slots onto the
    /// operator's actual input-symbol indices.
    pub symbol_permutation: Vec<usize>,
}

impl ShapeRule {
    /// Render this rule as the human-readable string the shape-rule file
    /// stores (`spec.md` §6): the tree's `Display` form with local slots
    /// substituted by the chosen input symbols.
    #[must_use]
    pub fn to_rule_string(&self) -> String {
        substitute_symbols(&self.tree, &self.symbol_permutation)
    }
}

/// The at-most-10-per-output ranked rule list a synthesis run produces,
/// plus the rank-passthrough fallback as a distinguished marker
/// (`spec.md` §4.5: "the constant `|I∪A|` is used as a fallback").
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputRules {
    /// Synthesised expression rules, in acceptance (enumeration) order.
    pub rules: Vec<ShapeRule>,
    /// `true` iff no expression matched and every record's `o_k` equals
    /// the operator's input rank, so the rank constant is emitted
    /// instead.
    pub rank_fallback: bool,
}

/// At most this many rules are kept per output symbol (`spec.md` §4.5).
pub const MAX_RULES_PER_OUTPUT: usize = 10;

/// Default per-OI wall-clock synthesis budget (`spec.md` §4.5).
pub const DEFAULT_BUDGET: Duration = Duration::from_secs(100);

/// Synthesise shape rules for every output symbol of one OI's augmented
/// DB (`spec.md` §4.5).
///
/// `input_arity` is the OI's `|I∪A|`, used for the rank-passthrough
/// fallback. `cache` is the pre-built expression-tree enumeration.
#[must_use]
pub fn synthesize(
    db: &InvocationDb,
    input_arity: usize,
    cache: &TreeCache,
    budget: Duration,
) -> Vec<OutputRules> {
    let Some(output_arity) = db.output_arity() else {
        return Vec::new();
    };
    let analysis = db.analyse();
    let start = Instant::now();

    let mut results: Vec<OutputRules> = vec![OutputRules::default(); output_arity];
    let mut solved = vec![false; output_arity];

    'search: for tree in cache.trees() {
        if start.elapsed() >= budget {
            break;
        }
        if solved.iter().all(|&s| s) {
            break;
        }
        let popcount = tree.arg_mask.count_ones() as usize;
        if popcount > input_arity {
            continue;
        }

        for subset in k_subsets(input_arity, popcount) {
            if subset
                .iter()
                .any(|&a| subset.iter().any(|&b| a != b && analysis.aliases.contains(&ordered(a, b))))
            {
                continue;
            }
            // Map the tree's local argument indices (0..popcount, in
            // order of first appearance in the bitmask) onto `subset`.
            let permutation = expand_permutation(tree.arg_mask, &subset, input_arity);

            for output_index in 0..output_arity {
                if solved[output_index] {
                    continue;
                }
                if start.elapsed() >= budget {
                    break 'search;
                }
                if rules_len(&results[output_index]) >= MAX_RULES_PER_OUTPUT {
                    solved[output_index] = true;
                    continue;
                }
                if tree_matches_all_records(db, &tree.expr, &permutation, output_index) {
                    results[output_index].rules.push(ShapeRule {
                        output_index,
                        tree: tree.expr.clone(),
                        symbol_permutation: permutation.clone(),
                    });
                    solved[output_index] = true;
                }
            }
        }
    }

    for output_index in 0..output_arity {
        if results[output_index].rules.is_empty()
            && output_rank_matches_every_record(db, input_arity, output_index)
        {
            results[output_index].rank_fallback = true;
        }
    }

    results
}

fn rules_len(o: &OutputRules) -> usize {
    o.rules.len()
}

fn ordered(a: usize, b: usize) -> (usize, usize) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

fn tree_matches_all_records(
    db: &InvocationDb,
    tree: &Expr,
    permutation: &[usize],
    output_index: usize,
) -> bool {
    use crate::invocation_db::InputValue;

    for (inputs, outputs) in db.successes() {
        let args: Option<Vec<i64>> = permutation
            .iter()
            .map(|&idx| match inputs.get(idx) {
                Some(InputValue::Int(v)) => Some(*v),
                _ => None,
            })
            .collect();
        let Some(args) = args else {
            return false;
        };
        let Some(predicted) = tree.evaluate(&args) else {
            return false;
        };
        let Some(&actual) = outputs.get(output_index) else {
            return false;
        };
        if predicted != actual {
            return false;
        }
    }
    true
}

fn output_rank_matches_every_record(db: &InvocationDb, input_arity: usize, output_index: usize) -> bool {
    db.successes()
        .iter()
        .all(|(_, outputs)| outputs.get(output_index) == Some(&(input_arity as i64)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::enumerator::EnumConfig;
    use crate::invocation_db::InputValue;

    fn ints(vs: &[i64]) -> Vec<InputValue> {
        vs.iter().map(|&v| InputValue::Int(v)).collect()
    }

    #[test]
    fn relu_like_passthrough_rules() {
        let mut db = InvocationDb::new();
        db.add(ints(&[2, 3]), Some(vec![2, 3])).unwrap();
        db.add(ints(&[4, 1]), Some(vec![4, 1])).unwrap();

        let cache = TreeCache::build(EnumConfig {
            max_height: 1,
            max_args: 2,
            enable_div: false,
        });
        let results = synthesize(&db, 2, &cache, Duration::from_secs(5));
        assert_eq!(results.len(), 2);
        assert!(results[0]
            .rules
            .iter()
            .any(|r| r.to_rule_string() == "s0"));
        assert!(results[1]
            .rules
            .iter()
            .any(|r| r.to_rule_string() == "s1"));
    }

    #[test]
    fn reduce_sum_falls_back_to_rank() {
        let mut db = InvocationDb::new();
        db.add(ints(&[2, 3]), Some(vec![2])).unwrap();
        db.add(ints(&[5, 7]), Some(vec![5])).unwrap();
        db.add(ints(&[1, 1]), Some(vec![1])).unwrap();

        let cache = TreeCache::build(EnumConfig {
            max_height: 1,
            max_args: 2,
            enable_div: false,
        });
        let results = synthesize(&db, 2, &cache, Duration::from_secs(5));
        // o0 = s0 already matches, so no rank fallback is needed here;
        // this asserts the shallow rule wins over ever considering rank.
        assert!(results[0].rules.iter().any(|r| r.to_rule_string() == "s0"));
        assert!(!results[0].rank_fallback);
    }

    #[test]
    fn timeout_yields_well_formed_partial_result() {
        let mut db = InvocationDb::new();
        db.add(ints(&[1, 2, 3, 4, 5]), Some(vec![99])).unwrap();
        let cache = TreeCache::build(EnumConfig {
            max_height: 5,
            max_args: 5,
            enable_div: true,
        });
        let start = Instant::now();
        let results = synthesize(&db, 5, &cache, Duration::from_millis(1));
        assert!(start.elapsed() < Duration::from_millis(600));
        assert_eq!(results.len(), 1);
    }
}
