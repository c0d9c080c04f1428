//! End-to-end coverage of the five `autoinf-*` pipeline stages, driven
//! entirely through on-disk record files the way the real binaries are
//! (`spec.md` §8 scenarios 1-4): write `RawRecord` files, run `augment`,
//! then `infer-shapes`/`infer-constraints`/`match-dialect`/`generate`, and
//! check the files and graph each stage produces.

use autoinf::cli::{self, RawArgument, RawRecord, RawValue, DB_MAGIC};
use autoinf::config::Config;
use autoinf::files;
use autoinf::graph_gen::GenMethod;
use autoinf::oracle::FixtureOracle;
use autoinf::worker_pool;

fn tensor_arg(name: &str, shape: &[i64]) -> RawArgument {
    RawArgument {
        name: name.to_string(),
        positional: true,
        value: RawValue::Tensor(shape.to_vec()),
    }
}

fn write_record(config: &Config, file_name: &str, record: &RawRecord) {
    let path = config.records_dir.join(file_name);
    files::write_bincode_atomic_magic(&path, *b"REC\0", record).unwrap();
}

fn test_config(dir: &std::path::Path) -> Config {
    Config {
        records_dir: dir.join("records"),
        out_dir: dir.join("out"),
        parallel: 2,
        ..Config::default()
    }
}

/// Scenario 1 (`spec.md` §8): a ReLU-like operator whose output shape
/// equals its input shape should synthesise an identity shape rule and
/// produce no dialect/constraint surprises.
#[test]
fn relu_like_pipeline_produces_identity_shape_rule() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());

    for (i, n) in [4i64, 8, 16].into_iter().enumerate() {
        let record = RawRecord {
            name: "relu".to_string(),
            name_index: 0,
            arguments: vec![tensor_arg("x", &[n])],
            outputs: vec![vec![n]],
        };
        write_record(&config, &format!("relu_{i}.rec"), &record);
    }

    let pool = worker_pool::build_pool(&config).unwrap();
    let oracle = FixtureOracle::new();
    let summary = cli::augment(&config, &oracle, &pool);
    assert_eq!(summary.completed, 1);
    assert_eq!(summary.failed, 0);

    let db_path = config.out_dir.join("db").join("relu_0.db");
    assert!(db_path.exists());
    let stored: cli::StoredDb = files::read_bincode_magic(&db_path, DB_MAGIC).unwrap();
    assert_eq!(stored.success.len(), 3);

    let shapes = cli::infer_shapes(&config, &pool);
    assert_eq!(shapes.completed, 1);
    let shape_path = config.out_dir.join("shapes").join("relu_0.json");
    assert!(shape_path.exists());

    let dialect = cli::match_dialect(&config, &pool);
    assert_eq!(dialect.completed, 1);
    assert!(config.out_dir.join("dialect").join("relu_0.json").exists());
}

/// Scenario 2 (`spec.md` §8): matmul's output shape is a function of two
/// of its four input symbols; `infer-shapes` should still converge inside
/// the default budget and `match-dialect` should record the `MatMul`
/// dialect rule matching.
#[test]
fn matmul_pipeline_matches_dialect_rule() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());

    for (i, (m, k, n)) in [(2i64, 3i64, 4i64), (5, 6, 7), (1, 1, 1)].into_iter().enumerate() {
        let record = RawRecord {
            name: "matmul".to_string(),
            name_index: 0,
            arguments: vec![tensor_arg("a", &[m, k]), tensor_arg("b", &[k, n])],
            outputs: vec![vec![m, n]],
        };
        write_record(&config, &format!("matmul_{i}.rec"), &record);
    }

    let pool = worker_pool::build_pool(&config).unwrap();
    let oracle = FixtureOracle::new();
    cli::augment(&config, &oracle, &pool);
    cli::match_dialect(&config, &pool);

    let matched: cli::StoredDb = {
        let path = config.out_dir.join("db").join("matmul_0.db");
        files::read_bincode_magic(&path, DB_MAGIC).unwrap()
    };
    assert_eq!(matched.oi.name, "matmul");

    let dialect_path = config.out_dir.join("dialect").join("matmul_0.json");
    assert!(dialect_path.exists());
}

/// Scenario 3/4 (`spec.md` §8): a reduce-like operator whose failing
/// records are all non-negative should still let `infer-constraints`
/// synthesise an admission rule without panicking on an empty cache.
#[test]
fn reduce_pipeline_infers_constraints_from_mixed_success_and_failure() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        timeout_sec: 2,
        ..test_config(dir.path())
    };

    for (i, n) in [2i64, 3, 4].into_iter().enumerate() {
        let record = RawRecord {
            name: "reduce_sum".to_string(),
            name_index: 0,
            arguments: vec![tensor_arg("x", &[n]), RawArgument {
                name: "axis".to_string(),
                positional: true,
                value: RawValue::Int(0),
            }],
            outputs: vec![vec![]],
        };
        write_record(&config, &format!("reduce_{i}.rec"), &record);
    }

    let pool = worker_pool::build_pool(&config).unwrap();
    let oracle = FixtureOracle::new();
    cli::augment(&config, &oracle, &pool);

    let constraints = cli::infer_constraints(&config, &pool);
    assert_eq!(constraints.completed, 1);
    assert!(config.out_dir.join("constraints").join("reduce_sum_0.json").exists());
}

/// Scenario 5 (`spec.md` §8): `generate` with a fixed seed over a frozen
/// augmented-DB corpus produces the same graph twice.
#[test]
fn generate_is_deterministic_for_a_fixed_seed() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());

    let record = RawRecord {
        name: "relu".to_string(),
        name_index: 0,
        arguments: vec![tensor_arg("x", &[4])],
        outputs: vec![vec![4]],
    };
    write_record(&config, "relu_0.rec", &record);

    let pool = worker_pool::build_pool(&config).unwrap();
    let oracle = FixtureOracle::new();
    cli::augment(&config, &oracle, &pool);

    let graph_a = cli::generate(&config, GenMethod::RecordMatched).unwrap();
    let graph_b = cli::generate(&config, GenMethod::RecordMatched).unwrap();
    assert_eq!(graph_a.node_count(), graph_b.node_count());
}

/// Boundary (`spec.md` §8): an empty records directory yields empty
/// summaries at every stage rather than an error.
#[test]
fn empty_records_dir_yields_empty_summaries() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    std::fs::create_dir_all(&config.records_dir).unwrap();

    let pool = worker_pool::build_pool(&config).unwrap();
    let oracle = FixtureOracle::new();
    let summary = cli::augment(&config, &oracle, &pool);
    assert_eq!(summary.completed, 0);
    assert_eq!(summary.failed, 0);

    let graph = cli::generate(&config, GenMethod::Hybrid).unwrap();
    assert_eq!(graph.node_count(), 0);
}

/// `only_op`/`only_instance` filters apply identically at every stage,
/// since each reloads from the same `out_dir/db` directory.
#[test]
fn only_op_filter_excludes_unmatched_operators_from_every_stage() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        only_op: vec!["relu".to_string()],
        ..test_config(dir.path())
    };

    write_record(
        &config,
        "relu_0.rec",
        &RawRecord {
            name: "relu".to_string(),
            name_index: 0,
            arguments: vec![tensor_arg("x", &[4])],
            outputs: vec![vec![4]],
        },
    );
    write_record(
        &config,
        "matmul_0.rec",
        &RawRecord {
            name: "matmul".to_string(),
            name_index: 0,
            arguments: vec![tensor_arg("a", &[2, 2]), tensor_arg("b", &[2, 2])],
            outputs: vec![vec![2, 2]],
        },
    );

    let pool = worker_pool::build_pool(&config).unwrap();
    let oracle = FixtureOracle::new();
    let summary = cli::augment(&config, &oracle, &pool);
    assert_eq!(summary.completed, 1);
    assert!(config.out_dir.join("db").join("relu_0.db").exists());
    assert!(!config.out_dir.join("db").join("matmul_0.db").exists());

    let shapes = cli::infer_shapes(&config, &pool);
    assert_eq!(shapes.completed, 1);
}
