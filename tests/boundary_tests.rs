//! Boundary-condition tests (`spec.md` §8): exact-limit behaviour not
//! already exercised by each component's own `#[cfg(test)]` module.

use std::time::Duration;

use autoinf::constraint_rules;
use autoinf::expr::cache::TreeCache;
use autoinf::expr::enumerator::{enumerate, EnumConfig};
use autoinf::graph_gen::{GenMethod, GraphGenerator, RecordedInvocation};
use autoinf::invocation_db::InvocationDb;
use autoinf::shape_rules;
use autoinf::smt::Solver;

/// `|I∪A| = 0`: an operator instance with no success records yet (no
/// input arity established) must not be treated as "zero input symbols
/// matched" — both synthesisers should return an empty result rather
/// than panicking on an absent arity.
#[test]
fn zero_success_records_yields_empty_synthesis_results() {
    let db = InvocationDb::new();
    let cache = TreeCache::build(EnumConfig {
        max_height: 2,
        max_args: 2,
        enable_div: false,
    });

    let shape_results = shape_rules::synthesize(&db, 0, &cache, Duration::from_secs(1));
    assert!(shape_results.is_empty());

    let solver = Solver::new(Duration::from_millis(200));
    let constraint_results = constraint_rules::synthesize(&db, &[], &cache, &solver, Duration::from_secs(1));
    assert!(constraint_results.rules.is_empty());
    assert_eq!(constraint_results.tree_tried, 0);
}

/// All-negative fail-input exclusion (`spec.md` §4.6, "Input"): a
/// `Gt`/`Ge` rule that would only be falsified by an all-negative failing
/// record must not be admitted once that record is excluded from
/// `fail_inputs_nonneg`, even though the same record would falsify it if
/// included.
#[test]
fn constraint_synthesis_ignores_excluded_negative_fail_records() {
    use autoinf::invocation_db::InputValue;

    let mut db = InvocationDb::new();
    // s0 >= 0 holds on every success record below.
    for v in [0i64, 1, 5, 10] {
        db.add(vec![InputValue::Int(v)], Some(vec![v])).unwrap();
    }
    // The only failing record is all-negative; it must be excluded from
    // `fail_inputs_nonneg` by the caller (mirrors `cli::nonneg_fail_inputs`).
    db.add(vec![InputValue::Int(-3)], None).unwrap();

    let cache = TreeCache::build(EnumConfig {
        max_height: 1,
        max_args: 1,
        enable_div: false,
    });
    let solver = Solver::new(Duration::from_millis(500));

    let with_negative_excluded = constraint_rules::synthesize(&db, &[], &cache, &solver, Duration::from_secs(2));
    // `s0 >= 0` holds on every success record but has nothing in
    // `fail_inputs_nonneg` to falsify it, so admission's falsification
    // requirement for `>`/`>=` rules is never satisfied; `s0 = <const>`
    // never holds across the varying successes either. Nothing is
    // synthesised — the excluded negative record plays no role at all.
    assert!(with_negative_excluded.rules.is_empty());

    // Including that same record (unfiltered) does let a `>=` rule admit,
    // since it is now available to falsify the strict relation, showing
    // the exclusion above genuinely changed the outcome rather than the
    // search just never finding anything.
    let fail_inputs_all: Vec<_> = db.fails().to_vec();
    let with_negative_included = constraint_rules::synthesize(&db, &fail_inputs_all, &cache, &solver, Duration::from_secs(2));
    assert!(with_negative_included.rules.iter().any(|r| r.relation == autoinf::constraint_rules::Relation::Ge));
}

/// `max_nodes = 1`: the graph generator must stop after inserting exactly
/// one node rather than looping or under-producing.
#[test]
fn generator_respects_max_nodes_of_one() {
    let registry = autoinf::dialect::registry();
    let config = autoinf::config::GeneratorConfig {
        max_nodes: 1,
        ..Default::default()
    };
    let mut generator = GraphGenerator::new(&registry, GenMethod::Symbolic, 42, config);
    let records: Vec<RecordedInvocation> = Vec::new();
    let graph = generator.generate(1, &records, None);
    assert!(graph.node_count() <= 1);
}

/// `max_height = 0`: the enumerator must only ever produce height-0
/// leaves, and the disk-backed cache must round-trip that degenerate set
/// without special-casing it.
#[test]
fn max_height_zero_enumerates_only_leaves() {
    let config = EnumConfig {
        max_height: 0,
        max_args: 3,
        enable_div: true,
    };
    let trees = enumerate(config);
    assert!(!trees.is_empty());
    assert!(trees.iter().all(|t| t.height == 0));

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.bin");
    let cache = TreeCache::build(config);
    cache.save(&path).unwrap();
    let loaded = TreeCache::load_or_build(&path, config);
    assert_eq!(loaded.trees().len(), trees.len());
}
