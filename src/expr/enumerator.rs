//! Bottom-up enumeration of arithmetic expression trees with structural
//! deduplication (`spec.md` §4.1).

use std::collections::HashMap;
use std::sync::OnceLock;

use autoinf_ast::{BinOp, Expr};
use rand::{rngs::SmallRng, Rng, SeedableRng};

/// Enumeration bounds and switches (`spec.md` §4.1, "Bounds").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnumConfig {
    /// Hard ceiling on tree height (default 5).
    pub max_height: u32,
    /// Hard ceiling on distinct argument slots (default 5).
    pub max_args: usize,
    /// Whether division nodes are included in the enumeration.
    pub enable_div: bool,
}

impl Default for EnumConfig {
    fn default() -> Self {
        EnumConfig {
            max_height: 5,
            max_args: 5,
            enable_div: true,
        }
    }
}

/// One structurally non-equivalent enumerated tree, annotated with the
/// `(height, arg_bitmask)` pair the synthesisers index by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalTree {
    /// Longest leaf-to-root edge count.
    pub height: u32,
    /// The set of argument indices occurring in this tree.
    pub arg_mask: u64,
    /// The tree itself.
    pub expr: Expr,
}

/// The fixed probe vector every candidate is evaluated against for
/// canonicalization (`spec.md` §4.1, §9 "Probe collision strengthening" —
/// intentionally a single fixed probe; see `SPEC_FULL.md` open question 3).
fn probe_vector(max_args: usize) -> &'static [i64] {
    static PROBE: OnceLock<Vec<i64>> = OnceLock::new();
    let v = PROBE.get_or_init(|| {
        let mut rng = SmallRng::seed_from_u64(0xA17_1F0_u64);
        (0..64).map(|_| rng.gen_range(1_000..1_000_000)).collect()
    });
    &v[..max_args.min(v.len())]
}

/// Enumerate every structurally non-equivalent tree with height `<=
/// config.max_height` and argument set `⊆ {0..config.max_args-1}`, in
/// order of strictly increasing height, then increasing bitmask popcount,
/// then insertion order (`spec.md` §4.1).
///
/// This enumerator is eager rather than a true lazy sequence: canonical
/// deduplication at height `h+1` must compare against every tree accepted
/// at height `h`, so the full set is built bottom-up and returned as a
/// `Vec` whose iteration order already satisfies the ordering contract.
#[must_use]
pub fn enumerate(config: EnumConfig) -> Vec<CanonicalTree> {
    let probe = probe_vector(config.max_args);
    let mut accepted: Vec<CanonicalTree> = Vec::new();
    // Maps arg_mask -> set of evaluation values already accepted for that
    // mask, used to reject probe-equivalent duplicates globally across
    // heights (`spec.md` §4.1: discard iff another accepted tree has the
    // same evaluation *and* the same bitmask, regardless of height).
    let mut seen: HashMap<u64, Vec<i64>> = HashMap::new();

    let mut push_if_new = |height: u32, arg_mask: u64, expr: Expr, accepted: &mut Vec<CanonicalTree>| {
        let Some(value) = expr.evaluate(probe) else {
            return;
        };
        let slot = seen.entry(arg_mask).or_default();
        if slot.contains(&value) {
            return;
        }
        slot.push(value);
        accepted.push(CanonicalTree {
            height,
            arg_mask,
            expr,
        });
    };

    // Height 0: literal leaves {1, 2} and each single-argument leaf.
    push_if_new(0, 0, Expr::Lit(1), &mut accepted);
    push_if_new(0, 0, Expr::Lit(2), &mut accepted);
    for i in 0..config.max_args {
        push_if_new(0, 1u64 << i, Expr::Arg(i), &mut accepted);
    }

    if config.max_height == 0 {
        return sort_by_enum_order(accepted);
    }

    for height in 1..=config.max_height {
        // All trees already accepted at height < `height`, grouped so we
        // can pair subtrees whose max height equals `height - 1`.
        let by_height: Vec<&CanonicalTree> = accepted
            .iter()
            .filter(|t| t.height == height - 1)
            .collect();
        let below: Vec<&CanonicalTree> = accepted
            .iter()
            .filter(|t| t.height < height - 1)
            .collect();

        let mut candidates: Vec<(u32, u64, Expr)> = Vec::new();
        let ops: &[BinOp] = if config.enable_div {
            &BinOp::ALL
        } else {
            &[BinOp::Add, BinOp::Sub, BinOp::Mul]
        };

        // max(h_l, h_r) == height - 1: at least one side must come from
        // `by_height`; the other may come from either group.
        for l in by_height.iter().chain(below.iter()) {
            for r in by_height.iter() {
                if l.height.max(r.height) != height - 1 {
                    continue;
                }
                for &op in ops {
                    let mask = l.arg_mask | r.arg_mask;
                    let tree = Expr::bin(op, l.expr.clone(), r.expr.clone());
                    candidates.push((height, mask, tree));
                }
            }
        }

        for (h, mask, tree) in candidates {
            push_if_new(h, mask, tree, &mut accepted);
        }
    }

    sort_by_enum_order(accepted)
}

fn sort_by_enum_order(mut trees: Vec<CanonicalTree>) -> Vec<CanonicalTree> {
    // `sort_by_key` is stable, so insertion order is preserved among ties.
    trees.sort_by_key(|t| (t.height, t.arg_mask.count_ones()));
    trees
}
