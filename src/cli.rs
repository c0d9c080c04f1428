//! Wiring for the five `autoinf-*` binaries (`spec.md` §1, §6): turns the
//! on-disk record corpus into the augmented DB, then the DB into rule and
//! match files, then those into a generated graph. CLI argument parsing
//! itself is out of scope (`spec.md` §1); every function here takes an
//! already-loaded [`Config`].
//!
//! Every stage reads/writes files through [`crate::files`], each under its
//! own magic tag so a reader can catch a misrouted file early (`spec.md`
//! §6). The augmented-DB file additionally bundles the originating
//! [`OperatorInstance`], not just the two value sets named in `spec.md`
//! §6, since the later stages need its argument/output tensor structure
//! (recorded in `DESIGN.md`).

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use rayon::ThreadPool;
use serde::{Deserialize, Serialize};

use autoinf_ir::{AttrLiteral, Graph, OrderedF64};

use crate::config::Config;
use crate::constraint_rules::{self, ConstraintRule};
use crate::dialect::{self, DialectRule};
use crate::error::AutoinfError;
use crate::expr::cache::TreeCache;
use crate::files;
use crate::graph_gen::{GenMethod, GraphGenerator, RecordedInvocation};
use crate::invocation_db::{InputValue, InvocationDb};
use crate::mutator::{self, SkipList};
use crate::operator_instance::{Argument, NamedArgument, OperatorInstance, OperatorInstanceError, PassingMode};
use crate::oracle::ValidityOracle;
use crate::shape_rules::{self, OutputRules, ShapeRule};
use crate::smt::Solver;
use crate::symbol::Symbol;
use crate::worker_pool::{self, Summary};

/// Magic tag for a traced-invocation record file (`spec.md` §6).
pub const RECORD_MAGIC: [u8; 4] = *b"REC\0";
/// Magic tag for an augmented invocation-DB file.
pub const DB_MAGIC: [u8; 4] = *b"DB__";
/// Magic tag for a shape-rule file.
pub const SHAPE_MAGIC: [u8; 4] = *b"SHAP";
/// Magic tag for an input-constraint file.
pub const CONSTRAINT_MAGIC: [u8; 4] = *b"CONS";
/// Magic tag for a dialect-match file.
pub const DIALECT_MAGIC: [u8; 4] = *b"DIAL";
/// Magic tag for a generated-graph file.
pub const GRAPH_MAGIC: [u8; 4] = *b"GRAF";

/// The on-disk payload of one traced invocation record (`spec.md` §6: "an
/// ordered argument list with per-arg (name, positional-flag, value) and
/// outputs as concrete tensors"). One record file may carry any one of the
/// (possibly several) real traced invocations of the same call-site; the
/// `augment` stage groups records sharing `(name, name_index)` before
/// building the `OperatorInstance` skeleton.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    /// The operator's identifier.
    pub name: String,
    /// The call-site's stable identifier (`spec.md` §6).
    pub name_index: u64,
    /// The invocation's ordered argument list.
    pub arguments: Vec<RawArgument>,
    /// Concrete output tensor shapes, in result order.
    pub outputs: Vec<Vec<i64>>,
}

/// One recorded argument slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawArgument {
    /// The argument's name, as it appears in the operator's signature.
    pub name: String,
    /// Whether this argument was passed positionally.
    pub positional: bool,
    /// The argument's recorded value.
    pub value: RawValue,
}

/// The recorded shape of one argument value, mirroring
/// [`Argument`]'s four-way split plus the concrete attribute kinds
/// [`AttrLiteral`] admits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RawValue {
    /// A tensor, recorded as its concrete shape.
    Tensor(Vec<i64>),
    /// A bare integer attribute.
    Int(i64),
    /// A floating-point attribute.
    Float(f64),
    /// A boolean attribute.
    Bool(bool),
    /// A string attribute.
    Str(String),
    /// An integer-list attribute.
    IntList(Vec<i64>),
    /// A homogeneous list of one of the other kinds.
    List(Vec<RawValue>),
}

/// The augmented-DB file's payload: the originating operator instance plus
/// its augmented success/fail tuple sets (`spec.md` §6, extended per
/// `DESIGN.md`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredDb {
    /// The operator instance the tuples below were collected against.
    pub oi: OperatorInstance,
    /// Augmented success tuples.
    pub success: Vec<(Vec<InputValue>, Vec<i64>)>,
    /// Augmented failing input tuples.
    pub fail: Vec<Vec<InputValue>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredOutputRules {
    output_index: usize,
    rules: Vec<String>,
    rank_fallback: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredConstraintRule {
    rule: String,
    relation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredConstraintRules {
    rules: Vec<StoredConstraintRule>,
    tree_tried: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredDialectMatch {
    matched_indices: Vec<usize>,
    matched_names: Vec<String>,
}

/// Ingest every record file under `config.records_dir`, group by
/// call-site, build each group's `OperatorInstance` and augmented DB via
/// [`mutator::mutate`], and write one augmented-DB file per group
/// (`spec.md` §4.3, §4.4, §6).
pub fn augment(config: &Config, oracle: &dyn ValidityOracle, pool: &ThreadPool) -> Summary {
    let records = load_records(&config.records_dir);
    let mut groups: BTreeMap<(String, u64), Vec<RawRecord>> = BTreeMap::new();
    for record in records {
        if !passes_filters(config, &record.name, record.name_index) {
            continue;
        }
        groups.entry((record.name.clone(), record.name_index)).or_default().push(record);
    }
    let items: Vec<((String, u64), Vec<RawRecord>)> = groups.into_iter().collect();
    let dir = db_dir(config);

    worker_pool::run_all(pool, &items, |((name, name_index), group)| {
        let label = format!("{name} {name_index}");
        let result = (|| -> Result<(), AutoinfError> {
            let first = group.first().ok_or_else(|| AutoinfError::CorruptInput {
                op: name.clone(),
                source: io::Error::new(io::ErrorKind::InvalidData, "empty record group"),
            })?;
            let (oi, ..) = record_to_oi(first)?;

            let mut db = InvocationDb::new();
            let mut already_mutated = false;
            let skip_list = SkipList::default();
            for record in group {
                let Some(inputs) = extract_input_values(&oi, record) else {
                    continue;
                };
                let outputs = extract_output_values(record);
                db.add(inputs.clone(), Some(outputs.clone()))?;

                // Each directly observed record re-seeds mutation around its
                // own concrete values; `already_mutated` carries the
                // per-operator skip state across the group's records
                // (`spec.md` §4.4).
                if let Some(seed_input) = concrete_ints(&inputs) {
                    mutator::mutate(&oi, &seed_input, &outputs, &mut db, oracle, &skip_list, &mut already_mutated);
                }
            }

            let stored = StoredDb {
                success: db.successes().to_vec(),
                fail: db.fails().to_vec(),
                oi,
            };
            files::write_bincode_atomic_magic(&dir.join(format!("{name}_{name_index}.db")), DB_MAGIC, &stored)?;
            Ok(())
        })();
        (label, result)
    })
}

/// Synthesise and write shape rules for every augmented-DB file under
/// `config.out_dir` (C6, `spec.md` §4.5).
pub fn infer_shapes(config: &Config, pool: &ThreadPool) -> Summary {
    let cache = TreeCache::load_or_build(&cache_path(config), config.enumeration.into());
    let items = load_dbs(config);
    let budget = config.timeout();
    let dir = config.out_dir.join("shapes");

    let summary = worker_pool::run_all(pool, &items, |stored| {
        let label = format!("{} {}", stored.oi.name, stored.oi.name_index);
        let result = (|| -> Result<(), AutoinfError> {
            let db = reconstruct_db(stored)?;
            let results = shape_rules::synthesize(&db, stored.oi.input_arity(), &cache, budget);
            let stored_rules: Vec<StoredOutputRules> = results
                .into_iter()
                .enumerate()
                .map(|(output_index, rules)| StoredOutputRules {
                    output_index,
                    rules: rules.rules.iter().map(ShapeRule::to_rule_string).collect(),
                    rank_fallback: rules.rank_fallback,
                })
                .collect();
            let path = dir.join(format!("{}_{}.json", stored.oi.name, stored.oi.name_index));
            files::write_json_atomic(&path, SHAPE_MAGIC, &stored_rules)?;
            Ok(())
        })();
        (label, result)
    });
    let _ = cache.save(&cache_path(config));
    summary
}

/// Synthesise and write input-validity constraints for every augmented-DB
/// file under `config.out_dir` (C7, `spec.md` §4.6).
pub fn infer_constraints(config: &Config, pool: &ThreadPool) -> Summary {
    let cache = TreeCache::load_or_build(&cache_path(config), config.enumeration.into());
    let items = load_dbs(config);
    let smt_timeout = config.smt.timeout();
    let budget = config.timeout();
    let dir = config.out_dir.join("constraints");

    let summary = worker_pool::run_all(pool, &items, |stored| {
        let label = format!("{} {}", stored.oi.name, stored.oi.name_index);
        let result = (|| -> Result<(), AutoinfError> {
            let db = reconstruct_db(stored)?;
            let fail_nonneg = nonneg_fail_inputs(&db);
            let solver = Solver::new(smt_timeout);
            let outcome = constraint_rules::synthesize(&db, &fail_nonneg, &cache, &solver, budget);
            let stored_rules = StoredConstraintRules {
                rules: outcome
                    .rules
                    .iter()
                    .map(|rule: &ConstraintRule| StoredConstraintRule {
                        rule: rule.to_rule_string(),
                        relation: rule.relation.as_str().to_string(),
                    })
                    .collect(),
                tree_tried: outcome.tree_tried,
            };
            let path = dir.join(format!("{}_{}.json", stored.oi.name, stored.oi.name_index));
            files::write_json_atomic(&path, CONSTRAINT_MAGIC, &stored_rules)?;
            Ok(())
        })();
        (label, result)
    });
    let _ = cache.save(&cache_path(config));
    summary
}

/// Match every augmented-DB file against the dialect-rule registry (C8,
/// `spec.md` §4.7).
pub fn match_dialect(config: &Config, pool: &ThreadPool) -> Summary {
    let registry = dialect::registry();
    let items = load_dbs(config);
    let dir = config.out_dir.join("dialect");

    worker_pool::run_all(pool, &items, |stored| {
        let label = format!("{} {}", stored.oi.name, stored.oi.name_index);
        let result = (|| -> Result<(), AutoinfError> {
            let db = reconstruct_db(stored)?;
            let matched = dialect::match_dialect(&stored.oi, &db, &registry);
            let stored_match = StoredDialectMatch {
                matched_names: matched.iter().map(|&i| registry[i].name().to_string()).collect(),
                matched_indices: matched,
            };
            let path = dir.join(format!("{}_{}.json", stored.oi.name, stored.oi.name_index));
            files::write_json_atomic(&path, DIALECT_MAGIC, &stored_match)?;
            Ok(())
        })();
        (label, result)
    })
}

/// Drive the graph generator over every augmented-DB file's replayable
/// invocations, optionally rule-driven by one target operator's mined
/// shape rules (C9, `spec.md` §4.8).
///
/// Rather than round-tripping mined shape rules through a structured file
/// (which would require enabling `autoinf_ast::Expr`'s `serde` feature),
/// this stage recomputes the one target operator's rules directly from its
/// loaded augmented DB, in memory (recorded in `DESIGN.md`). The target is
/// `config.only_op`'s first entry, if any; with no target configured the
/// rule-driven `AutoInf` node is simply never inserted.
pub fn generate(config: &Config, method: GenMethod) -> Result<Graph, AutoinfError> {
    let registry = dialect::registry();
    let dbs = load_dbs(config);

    let mut records = Vec::new();
    for stored in &dbs {
        let db = reconstruct_db(stored)?;
        for (inputs, outputs) in db.successes() {
            let Some(input_shapes) = dialect::tensor_input_shapes(&stored.oi, inputs) else {
                continue;
            };
            let output_shapes = dialect::tensor_output_shapes(&stored.oi, outputs);
            records.push(RecordedInvocation {
                op: stored.oi.name.clone(),
                input_shapes,
                output_shapes,
            });
        }
    }

    let autoinf_rules = match config.only_op.first() {
        Some(target) => dbs
            .iter()
            .find(|stored| &stored.oi.name == target)
            .map(|stored| -> Result<Vec<OutputRules>, AutoinfError> {
                let db = reconstruct_db(stored)?;
                let cache = TreeCache::load_or_build(&cache_path(config), config.enumeration.into());
                Ok(shape_rules::synthesize(&db, stored.oi.input_arity(), &cache, config.timeout()))
            })
            .transpose()?,
        None => None,
    };

    let mut generator = GraphGenerator::new(&registry, method, config.seed, config.generator);
    let graph = generator.generate(config.generator.max_nodes, &records, autoinf_rules.as_deref());
    files::write_bincode_atomic_magic(&graph_path(config), GRAPH_MAGIC, &graph)?;
    Ok(graph)
}

fn passes_filters(config: &Config, name: &str, name_index: u64) -> bool {
    if !config.only_op.is_empty() && !config.only_op.iter().any(|o| o == name) {
        return false;
    }
    if !config.only_instance.is_empty() && !config.only_instance.contains(&name_index) {
        return false;
    }
    true
}

fn load_records(dir: &Path) -> Vec<RawRecord> {
    scan_dir_with_magic::<RawRecord>(dir, RECORD_MAGIC).into_iter().map(|(_, r)| r).collect()
}

fn load_dbs(config: &Config) -> Vec<StoredDb> {
    scan_dir_with_magic::<StoredDb>(&db_dir(config), DB_MAGIC)
        .into_iter()
        .map(|(_, db)| db)
        .filter(|stored| passes_filters(config, &stored.oi.name, stored.oi.name_index))
        .collect()
}

fn scan_dir_with_magic<T: serde::de::DeserializeOwned>(dir: &Path, magic: [u8; 4]) -> Vec<(PathBuf, T)> {
    let mut out = Vec::new();
    let Ok(entries) = fs::read_dir(dir) else {
        return out;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        match files::read_bincode_magic::<T>(&path, magic) {
            Ok(value) => out.push((path, value)),
            Err(err) => tracing::warn!(path = %path.display(), %err, "skipping unreadable file"),
        }
    }
    out
}

fn reconstruct_db(stored: &StoredDb) -> Result<InvocationDb, AutoinfError> {
    let mut db = InvocationDb::new();
    for (inputs, outputs) in &stored.success {
        db.add(inputs.clone(), Some(outputs.clone()))?;
    }
    for inputs in &stored.fail {
        db.add(inputs.clone(), None)?;
    }
    Ok(db)
}

/// `Some` iff every value in `inputs` is a concrete integer, giving a clean
/// mutation seed; any [`InputValue::NonInt`] entry means this record can't
/// drive mutation (though it's still recorded in the DB).
fn concrete_ints(inputs: &[InputValue]) -> Option<Vec<i64>> {
    inputs
        .iter()
        .map(|v| match v {
            InputValue::Int(n) => Some(*n),
            InputValue::NonInt => None,
        })
        .collect()
}

fn nonneg_fail_inputs(db: &InvocationDb) -> Vec<Vec<InputValue>> {
    db.fails()
        .iter()
        .filter(|inputs| inputs.iter().all(|v| matches!(v, InputValue::Int(n) if *n >= 0)))
        .cloned()
        .collect()
}

/// Build the `OperatorInstance` skeleton (and the seed record's original
/// concrete input/output tuples) from the first record observed at a
/// call-site (`spec.md` §3).
fn record_to_oi(record: &RawRecord) -> Result<(OperatorInstance, Vec<i64>, Vec<i64>), OperatorInstanceError> {
    let (arguments, input_symbols, original_input) = build_arguments(record);
    let (outputs, output_symbols, original_output) = build_outputs(record);
    let oi = OperatorInstance::new(record.name.clone(), record.name_index, arguments, outputs, input_symbols, output_symbols)?;
    Ok((oi, original_input, original_output))
}

fn build_arguments(record: &RawRecord) -> (Vec<NamedArgument>, BTreeMap<Symbol, i64>, Vec<i64>) {
    let mut next = 0usize;
    let mut symbols = BTreeMap::new();
    let mut original = Vec::new();
    let arguments = record
        .arguments
        .iter()
        .map(|arg| {
            let mode = if arg.positional { PassingMode::Positional } else { PassingMode::Named };
            let value = build_argument_value(&arg.value, &mut next, &mut symbols, &mut original);
            NamedArgument {
                name: arg.name.clone(),
                mode,
                value,
            }
        })
        .collect();
    (arguments, symbols, original)
}

fn build_argument_value(
    value: &RawValue,
    next: &mut usize,
    symbols: &mut BTreeMap<Symbol, i64>,
    original: &mut Vec<i64>,
) -> Argument {
    match value {
        RawValue::Tensor(shape) => {
            let syms = shape
                .iter()
                .map(|&dim| {
                    let sym = Symbol::input(*next);
                    *next += 1;
                    symbols.insert(sym, dim);
                    original.push(dim);
                    sym
                })
                .collect();
            Argument::Tensor(syms)
        }
        RawValue::Int(v) => {
            let sym = Symbol::input(*next);
            *next += 1;
            symbols.insert(sym, *v);
            original.push(*v);
            Argument::Int(sym)
        }
        RawValue::Float(v) => Argument::Opaque(AttrLiteral::Float(OrderedF64(*v))),
        RawValue::Bool(v) => Argument::Opaque(AttrLiteral::Bool(*v)),
        RawValue::Str(v) => Argument::Opaque(AttrLiteral::Str(v.clone())),
        RawValue::IntList(v) => Argument::Opaque(AttrLiteral::IntList(v.clone())),
        RawValue::List(items) => Argument::List(
            items
                .iter()
                .map(|item| build_argument_value(item, next, symbols, original))
                .collect(),
        ),
    }
}

fn build_outputs(record: &RawRecord) -> (Vec<Vec<Symbol>>, BTreeMap<Symbol, i64>, Vec<i64>) {
    let mut next = 0usize;
    let mut symbols = BTreeMap::new();
    let mut original = Vec::new();
    let outputs = record
        .outputs
        .iter()
        .map(|shape| {
            shape
                .iter()
                .map(|&dim| {
                    let sym = Symbol::output(next);
                    next += 1;
                    symbols.insert(sym, dim);
                    original.push(dim);
                    sym
                })
                .collect()
        })
        .collect();
    (outputs, symbols, original)
}

/// Walk `record`'s arguments in lock-step with `oi`'s already-assigned
/// argument skeleton, producing the dense `InputValue` tuple this record
/// contributes. A value whose kind disagrees with `oi`'s expectation at an
/// integer-attribute slot becomes [`InputValue::NonInt`] rather than
/// aborting the record; a tensor-rank or list-length mismatch aborts it
/// (`None`) since the symbol count can no longer line up.
fn extract_input_values(oi: &OperatorInstance, record: &RawRecord) -> Option<Vec<InputValue>> {
    if oi.arguments.len() != record.arguments.len() {
        return None;
    }
    let mut out = Vec::new();
    for (named, raw) in oi.arguments.iter().zip(&record.arguments) {
        if !collect_input_values_aligned(&named.value, &raw.value, &mut out) {
            return None;
        }
    }
    Some(out)
}

fn collect_input_values_aligned(oi_arg: &Argument, record_value: &RawValue, out: &mut Vec<InputValue>) -> bool {
    match oi_arg {
        Argument::Tensor(shape) => match record_value {
            RawValue::Tensor(dims) if dims.len() == shape.len() => {
                out.extend(dims.iter().map(|&d| InputValue::Int(d)));
                true
            }
            _ => false,
        },
        Argument::Int(_) => {
            match record_value {
                RawValue::Int(v) => out.push(InputValue::Int(*v)),
                _ => out.push(InputValue::NonInt),
            }
            true
        }
        Argument::Opaque(_) => true,
        Argument::List(items) => match record_value {
            RawValue::List(values) if values.len() == items.len() => {
                items.iter().zip(values).all(|(item, value)| collect_input_values_aligned(item, value, out))
            }
            _ => false,
        },
    }
}

fn extract_output_values(record: &RawRecord) -> Vec<i64> {
    record.outputs.iter().flatten().copied().collect()
}

fn db_dir(config: &Config) -> PathBuf {
    config.out_dir.join("db")
}

fn cache_path(config: &Config) -> PathBuf {
    config.out_dir.join("tree_cache.bin")
}

fn graph_path(config: &Config) -> PathBuf {
    config.out_dir.join("graph.bin")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scalar(name: &str, v: i64) -> RawArgument {
        RawArgument {
            name: name.to_string(),
            positional: true,
            value: RawValue::Int(v),
        }
    }

    fn tensor(name: &str, shape: &[i64]) -> RawArgument {
        RawArgument {
            name: name.to_string(),
            positional: true,
            value: RawValue::Tensor(shape.to_vec()),
        }
    }

    #[test]
    fn record_to_oi_assigns_dense_symbols() {
        let record = RawRecord {
            name: "matmul".to_string(),
            name_index: 0,
            arguments: vec![tensor("a", &[3, 4]), tensor("b", &[4, 5])],
            outputs: vec![vec![3, 5]],
        };
        let (oi, original_input, original_output) = record_to_oi(&record).unwrap();
        assert_eq!(oi.input_arity(), 4);
        assert_eq!(original_input, vec![3, 4, 4, 5]);
        assert_eq!(original_output, vec![3, 5]);
    }

    #[test]
    fn extract_input_values_marks_kind_mismatch_as_non_int() {
        let first = RawRecord {
            name: "f".to_string(),
            name_index: 0,
            arguments: vec![tensor("x", &[4]), scalar("axis", 0)],
            outputs: vec![vec![4]],
        };
        let (oi, _, _) = record_to_oi(&first).unwrap();

        let second = RawRecord {
            name: "f".to_string(),
            name_index: 0,
            arguments: vec![
                tensor("x", &[6]),
                RawArgument {
                    name: "axis".to_string(),
                    positional: true,
                    value: RawValue::Str("none".to_string()),
                },
            ],
            outputs: vec![vec![6]],
        };
        let values = extract_input_values(&oi, &second).unwrap();
        assert_eq!(values, vec![InputValue::Int(6), InputValue::NonInt]);
    }

    #[test]
    fn extract_input_values_rejects_rank_mismatch() {
        let first = RawRecord {
            name: "f".to_string(),
            name_index: 0,
            arguments: vec![tensor("x", &[4, 4])],
            outputs: vec![vec![4, 4]],
        };
        let (oi, _, _) = record_to_oi(&first).unwrap();

        let second = RawRecord {
            name: "f".to_string(),
            name_index: 0,
            arguments: vec![tensor("x", &[4])],
            outputs: vec![vec![4]],
        };
        assert!(extract_input_values(&oi, &second).is_none());
    }

    #[test]
    fn passes_filters_respects_only_op_and_only_instance() {
        let config = Config {
            only_op: vec!["matmul".to_string()],
            only_instance: vec![2],
            ..Config::default()
        };
        assert!(passes_filters(&config, "matmul", 2));
        assert!(!passes_filters(&config, "matmul", 3));
        assert!(!passes_filters(&config, "add", 2));
    }
}
