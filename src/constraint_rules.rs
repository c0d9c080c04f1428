//! The constraint-rule synthesiser (C7, `spec.md` §4.6), grounded in
//! `examples/original_source/autoinf/autoinf/inference/strict_input_solve.py`
//! (`RuleDatabase.Add`, `inspect_all_records`).

use std::time::{Duration, Instant};

use autoinf_ast::{BinOp, Expr};
use z3::ast::{Ast, Bool, Int};

use crate::combinatorics::{k_subsets, substitute_symbols};
use crate::expr::cache::TreeCache;
use crate::invocation_db::{InputValue, InvocationDb};
use crate::smt::Solver;

/// The relation an admitted input-validity predicate is checked under
/// (`spec.md` §3, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    /// `expr == 0`
    Eq,
    /// `expr > 0`
    Gt,
    /// `expr >= 0`
    Ge,
}

impl Relation {
    /// All three relations, matching `strict_input_solve.py`'s
    /// `["==", ">", ">="]` ordering.
    pub const ALL: [Relation; 3] = [Relation::Eq, Relation::Gt, Relation::Ge];

    /// The on-disk/textual form (`spec.md` §6: `relation ∈ {"=", ">", "≥"}`).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Relation::Eq => "=",
            Relation::Gt => ">",
            Relation::Ge => "\u{2265}",
        }
    }

    fn holds(self, value: i64) -> bool {
        match self {
            Relation::Eq => value == 0,
            Relation::Gt => value > 0,
            Relation::Ge => value >= 0,
        }
    }
}

/// One synthesised input-validity rule: `(expression, relation,
/// symbol_index_permutation)` (`spec.md` §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstraintRule {
    /// The expression tree, in its local `s0, s1, ...` argument slots.
    pub tree: Expr,
    /// The relation `tree rel 0` is checked under.
    pub relation: Relation,
    /// The permutation mapping the tree's local argument slots onto the
    /// operator's actual input-symbol indices.
    pub symbol_permutation: Vec<usize>,
}

impl ConstraintRule {
    /// Render as the `(expression, relation)` pair the input-constraint
    /// file stores (`spec.md` §6).
    #[must_use]
    pub fn to_rule_string(&self) -> String {
        substitute_symbols(&self.tree, &self.symbol_permutation)
    }

    fn evaluate(&self, inputs: &[InputValue]) -> Option<i64> {
        let args: Option<Vec<i64>> = self
            .symbol_permutation
            .iter()
            .map(|&idx| match inputs.get(idx) {
                Some(InputValue::Int(v)) => Some(*v),
                _ => None,
            })
            .collect();
        self.tree.evaluate(&args?)
    }

    /// `true` iff `tree(inputs) rel 0` holds for this record's input tuple.
    #[must_use]
    pub fn holds_on(&self, inputs: &[InputValue]) -> bool {
        self.evaluate(inputs).is_some_and(|v| self.relation.holds(v))
    }

    fn to_z3<'ctx>(&self, solver: &'ctx Solver, symbols: &[Int<'ctx>]) -> Bool<'ctx> {
        let value = expr_to_z3(solver, &self.tree, &self.symbol_permutation, symbols);
        let zero = solver.int_val(0);
        match self.relation {
            Relation::Eq => value._eq(&zero),
            Relation::Gt => value.gt(&zero),
            Relation::Ge => value.ge(&zero),
        }
    }
}

fn expr_to_z3<'ctx>(
    solver: &'ctx Solver,
    tree: &Expr,
    permutation: &[usize],
    symbols: &[Int<'ctx>],
) -> Int<'ctx> {
    match tree {
        Expr::Lit(v) => solver.int_val(*v),
        Expr::Arg(i) => symbols[permutation[*i]].clone(),
        Expr::Bin(op, l, r) => {
            let lv = expr_to_z3(solver, l, permutation, symbols);
            let rv = expr_to_z3(solver, r, permutation, symbols);
            let ctx = solver.context();
            match op {
                BinOp::Add => Int::add(ctx, &[&lv, &rv]),
                BinOp::Sub => Int::sub(ctx, &[&lv, &rv]),
                BinOp::Mul => Int::mul(ctx, &[&lv, &rv]),
                BinOp::Div => lv.div(&rv),
            }
        }
    }
}

/// At most this many admitted rules per OI (`spec.md` §4.6).
pub const MAX_RULES: usize = 50;

/// Default per-OI wall-clock synthesis budget (`spec.md` §4.6).
pub const DEFAULT_BUDGET: Duration = Duration::from_secs(100);

/// The outcome of one synthesis run: the admitted rules plus bookkeeping
/// mirrored into the input-constraint file (`spec.md` §6).
#[derive(Debug, Clone, Default)]
pub struct ConstraintRules {
    /// Admitted rules, minimality-pruned.
    pub rules: Vec<ConstraintRule>,
    /// Number of candidate trees inspected before the budget or the
    /// 50-rule cap was hit.
    pub tree_tried: usize,
}

/// Synthesise input-validity rules for one OI (`spec.md` §4.6).
///
/// `fail_inputs` must already be filtered to all-non-negative failing
/// records (`spec.md` §4.6, "Input": "the subset of `fail` inputs whose
/// values are all non-negative").
#[must_use]
pub fn synthesize(
    db: &InvocationDb,
    fail_inputs_nonneg: &[Vec<InputValue>],
    cache: &TreeCache,
    solver: &Solver,
    budget: Duration,
) -> ConstraintRules {
    let Some(input_arity) = db.input_arity() else {
        return ConstraintRules::default();
    };
    let start = Instant::now();
    let mut rules: Vec<ConstraintRule> = Vec::new();
    let mut tree_tried = 0usize;

    // Step 1: per-symbol constants (`spec.md` §4.6, step 1).
    if let Some((first_inputs, _)) = db.successes().first() {
        for i in 0..input_arity {
            let InputValue::Int(v) = first_inputs[i] else {
                continue;
            };
            let constant_holds = db.successes().iter().all(|(inputs, _)| inputs[i] == InputValue::Int(v));
            if constant_holds {
                try_admit(
                    &mut rules,
                    ConstraintRule {
                        tree: Expr::bin(BinOp::Sub, Expr::Arg(0), Expr::Lit(v)),
                        relation: Relation::Eq,
                        symbol_permutation: vec![i],
                    },
                    db,
                    fail_inputs_nonneg,
                    solver,
                    input_arity,
                );
            }
        }
    }

    // Step 2: tree enumeration, root op restricted to {+, -, None}
    // (`spec.md` §4.6, step 2).
    'search: for tree in cache.trees() {
        if start.elapsed() >= budget || rules.len() >= MAX_RULES {
            break;
        }
        if !root_op_allowed(&tree.expr) {
            continue;
        }
        let popcount = tree.arg_mask.count_ones() as usize;
        if popcount == 0 || popcount > input_arity {
            continue;
        }
        tree_tried += 1;

        for subset in k_subsets(input_arity, popcount) {
            if start.elapsed() >= budget || rules.len() >= MAX_RULES {
                break 'search;
            }
            let permutation = crate::combinatorics::expand_permutation(tree.arg_mask, &subset, input_arity);
            let relations: &[Relation] = if tree.height <= 1 {
                &Relation::ALL
            } else {
                &[Relation::Eq]
            };
            for &relation in relations {
                let candidate = ConstraintRule {
                    tree: tree.expr.clone(),
                    relation,
                    symbol_permutation: permutation.clone(),
                };
                if inspect_all_records(&candidate, db, fail_inputs_nonneg) {
                    try_admit(&mut rules, candidate, db, fail_inputs_nonneg, solver, input_arity);
                }
                if rules.len() >= MAX_RULES {
                    break 'search;
                }
            }
        }
    }

    ConstraintRules { rules, tree_tried }
}

fn root_op_allowed(tree: &Expr) -> bool {
    match tree {
        Expr::Lit(_) | Expr::Arg(_) => true,
        Expr::Bin(BinOp::Add | BinOp::Sub, _, _) => true,
        Expr::Bin(_, _, _) => false,
    }
}

/// `inspect_all_records` (`strict_input_solve.py`): holds on every success;
/// for strict relations (`>`/`>=`) additionally requires at least one
/// non-negative failing record to falsify it (`spec.md` §4.6 admission
/// rules; resolved open question, `SPEC_FULL.md` §9 item 1).
fn inspect_all_records(
    rule: &ConstraintRule,
    db: &InvocationDb,
    fail_inputs_nonneg: &[Vec<InputValue>],
) -> bool {
    for (inputs, _) in db.successes() {
        if !rule.holds_on(inputs) {
            return false;
        }
    }
    if rule.relation == Relation::Eq {
        return true;
    }
    fail_inputs_nonneg.iter().any(|inputs| !rule.holds_on(inputs))
}

/// Admit `candidate` then run minimality pruning: drop any rule (including
/// possibly `candidate` itself) whose removal leaves the conjunction of
/// the rest logically equivalent to the full conjunction (`spec.md` §4.6,
/// "After admission ... run minimality pruning").
fn try_admit(
    rules: &mut Vec<ConstraintRule>,
    candidate: ConstraintRule,
    _db: &InvocationDb,
    _fail_inputs_nonneg: &[Vec<InputValue>],
    solver: &Solver,
    input_arity: usize,
) {
    if rules.len() >= MAX_RULES {
        return;
    }
    rules.push(candidate);
    prune_redundant(rules, solver, input_arity);
}

fn prune_redundant(rules: &mut Vec<ConstraintRule>, solver: &Solver, input_arity: usize) {
    let symbols: Vec<Int<'_>> = (0..input_arity).map(|i| solver.int_const(&format!("s{i}"))).collect();
    loop {
        if rules.len() <= 1 {
            return;
        }
        let full = conjunction(rules, solver, &symbols);
        let mut removable = None;
        for i in 0..rules.len() {
            let without: Vec<&ConstraintRule> = rules.iter().enumerate().filter(|&(j, _)| j != i).map(|(_, r)| r).collect();
            let reduced = conjunction_of(&without, solver, &symbols);
            if solver.equivalent(&full, &reduced) {
                removable = Some(i);
                break;
            }
        }
        match removable {
            Some(i) => {
                rules.remove(i);
            }
            None => return,
        }
    }
}

fn conjunction<'ctx>(rules: &[ConstraintRule], solver: &'ctx Solver, symbols: &[Int<'ctx>]) -> Bool<'ctx> {
    let refs: Vec<&ConstraintRule> = rules.iter().collect();
    conjunction_of(&refs, solver, symbols)
}

fn conjunction_of<'ctx>(rules: &[&ConstraintRule], solver: &'ctx Solver, symbols: &[Int<'ctx>]) -> Bool<'ctx> {
    let formulas: Vec<Bool<'ctx>> = rules.iter().map(|r| r.to_z3(solver, symbols)).collect();
    if formulas.is_empty() {
        return Bool::from_bool(solver.context(), true);
    }
    let refs: Vec<&Bool<'ctx>> = formulas.iter().collect();
    Bool::and(solver.context(), &refs)
}
