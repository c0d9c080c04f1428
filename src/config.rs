//! Hierarchical configuration (`spec.md` §6, `SPEC_FULL.md` §6 "Config
//! file"): a compiled-in [`Config::default`], overridden by `autoinf.toml`
//! if present, overridden in turn by `AUTOINF_*` environment variables.
//!
//! Every tunable named across §4 (enumeration bounds, synthesis budgets,
//! mutation thresholds, generator limits) and every "common flag" from §6
//! (`records_dir`, `out_dir`, `parallel`, `only_op`, `only_instance`,
//! `timeout_sec`, `seed`) is a field here, so a future external CLI parser
//! (explicitly out of scope per `spec.md` §1) only needs to populate one
//! struct.

use std::path::PathBuf;
use std::time::Duration;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::expr::enumerator::EnumConfig;

/// Top-level configuration for every pipeline stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory the `augment` stage reads traced record files from.
    #[serde(default = "default_records_dir")]
    pub records_dir: PathBuf,
    /// Directory every stage writes its output files to.
    #[serde(default = "default_out_dir")]
    pub out_dir: PathBuf,
    /// Offline worker-pool size (`spec.md` §5, default 32; overridable by
    /// the `PARALLEL` environment variable per §6).
    #[serde(default = "default_parallel")]
    pub parallel: usize,
    /// Restrict a run to these operator names, if non-empty.
    #[serde(default)]
    pub only_op: Vec<String>,
    /// Restrict a run to these `name_index` instances, if non-empty.
    #[serde(default)]
    pub only_instance: Vec<u64>,
    /// Per-operator wall-clock budget, in seconds, shared by C6/C7
    /// synthesis (`spec.md` §4.5, §4.6 default 100s).
    #[serde(default = "default_timeout_sec")]
    pub timeout_sec: u64,
    /// Seed for the mutator's and graph generator's deterministic
    /// pseudorandom sources.
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Expression-tree enumerator bounds (`spec.md` §4.1).
    #[serde(default)]
    pub enumeration: EnumerationConfig,
    /// Mutator tuning (`spec.md` §4.4).
    #[serde(default)]
    pub mutator: MutatorConfig,
    /// Graph-generator tuning (`spec.md` §4.8).
    #[serde(default)]
    pub generator: GeneratorConfig,
    /// SMT adapter tuning (`spec.md` §4.2).
    #[serde(default)]
    pub smt: SmtConfig,
    /// Structured-logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Expression-tree enumeration bounds, serializable mirror of
/// [`EnumConfig`] (kept separate so the enumerator crate boundary doesn't
/// need `serde`-derive on its core type).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumerationConfig {
    /// Hard ceiling on tree height (`spec.md` §4.1 default 5).
    #[serde(default = "default_max_height")]
    pub max_height: u32,
    /// Hard ceiling on distinct argument slots (`spec.md` §4.1 default 5).
    #[serde(default = "default_max_args")]
    pub max_args: usize,
    /// Whether division nodes are enumerated.
    #[serde(default = "default_true")]
    pub enable_div: bool,
}

impl Default for EnumerationConfig {
    fn default() -> Self {
        EnumerationConfig {
            max_height: default_max_height(),
            max_args: default_max_args(),
            enable_div: true,
        }
    }
}

impl From<EnumerationConfig> for EnumConfig {
    fn from(c: EnumerationConfig) -> Self {
        EnumConfig {
            max_height: c.max_height,
            max_args: c.max_args,
            enable_div: c.enable_div,
        }
    }
}

/// Mutation-schedule thresholds (`spec.md` §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutatorConfig {
    /// Once an operator has this many successes and at least one mutated
    /// record, mutation stops for it (default 100).
    #[serde(default = "default_skip_threshold")]
    pub skip_threshold: usize,
    /// Step 3 applies only when `|I∪A| <=` this (default 8).
    #[serde(default = "default_subset_arity_cap")]
    pub subset_arity_cap: usize,
    /// Step 4 applies only when `|I∪A| <=` this (default 100).
    #[serde(default = "default_single_arity_cap")]
    pub single_arity_cap: usize,
    /// Step 5 applies only when `|I∪A| <=` this (default 50).
    #[serde(default = "default_pair_arity_cap")]
    pub pair_arity_cap: usize,
}

impl Default for MutatorConfig {
    fn default() -> Self {
        MutatorConfig {
            skip_threshold: default_skip_threshold(),
            subset_arity_cap: default_subset_arity_cap(),
            single_arity_cap: default_single_arity_cap(),
            pair_arity_cap: default_pair_arity_cap(),
        }
    }
}

/// Graph-generator tuning (`spec.md` §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Per-tensor element-count cap (`spec.md` §4.8 default 2^16).
    #[serde(default = "default_max_elem_per_tensor")]
    pub max_elem_per_tensor: i64,
    /// Default node-count ceiling when a caller doesn't specify one.
    #[serde(default = "default_max_nodes")]
    pub max_nodes: usize,
    /// Default generation wall-clock budget in milliseconds.
    #[serde(default = "default_gen_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        GeneratorConfig {
            max_elem_per_tensor: default_max_elem_per_tensor(),
            max_nodes: default_max_nodes(),
            timeout_ms: default_gen_timeout_ms(),
        }
    }
}

/// SMT adapter tuning (`spec.md` §4.2, §5: "one third of it per call").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmtConfig {
    /// Per-`check_sat` call timeout in milliseconds.
    #[serde(default = "default_smt_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for SmtConfig {
    fn default() -> Self {
        SmtConfig {
            timeout_ms: default_smt_timeout_ms(),
        }
    }
}

impl SmtConfig {
    /// The timeout as a [`Duration`].
    #[must_use]
    pub fn timeout(self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Structured-logging configuration, following the teacher's
/// `tracing`/`tracing-subscriber` setup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `tracing` env-filter directive string (e.g. `"info"`,
    /// `"autoinf=debug"`).
    #[serde(default = "default_log_filter")]
    pub filter: String,
    /// Emit structured JSON instead of human-readable text.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            filter: default_log_filter(),
            json: false,
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_records_dir() -> PathBuf {
    PathBuf::from("records")
}
fn default_out_dir() -> PathBuf {
    PathBuf::from("out")
}
fn default_parallel() -> usize {
    32
}
fn default_timeout_sec() -> u64 {
    100
}
fn default_seed() -> u64 {
    0
}
fn default_max_height() -> u32 {
    5
}
fn default_max_args() -> usize {
    5
}
fn default_skip_threshold() -> usize {
    100
}
fn default_subset_arity_cap() -> usize {
    8
}
fn default_single_arity_cap() -> usize {
    100
}
fn default_pair_arity_cap() -> usize {
    50
}
fn default_max_elem_per_tensor() -> i64 {
    1 << 16
}
fn default_max_nodes() -> usize {
    64
}
fn default_gen_timeout_ms() -> u64 {
    30_000
}
fn default_smt_timeout_ms() -> u64 {
    5_000
}
fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Config {
            records_dir: default_records_dir(),
            out_dir: default_out_dir(),
            parallel: default_parallel(),
            only_op: Vec::new(),
            only_instance: Vec::new(),
            timeout_sec: default_timeout_sec(),
            seed: default_seed(),
            enumeration: EnumerationConfig::default(),
            mutator: MutatorConfig::default(),
            generator: GeneratorConfig::default(),
            smt: SmtConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// The per-OI synthesis budget as a [`Duration`].
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_sec)
    }

    /// Load configuration by layering, in increasing priority:
    /// compiled-in defaults, `autoinf.toml` (if present), then `AUTOINF_*`
    /// environment variables (`SPEC_FULL.md` §6). The `PARALLEL` and
    /// `DEVICE` variables named verbatim in `spec.md` §6 are read
    /// separately by the worker pool and oracle respectively, since they
    /// are unprefixed exceptions to the `AUTOINF_` convention.
    pub fn load() -> Result<Self, figment::Error> {
        let mut config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file("autoinf.toml"))
            .merge(Env::prefixed("AUTOINF_").split("__"))
            .extract()?;
        if let Ok(parallel) = std::env::var("PARALLEL") {
            if let Ok(n) = parallel.parse() {
                config.parallel = n;
            }
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_bounds() {
        let config = Config::default();
        assert_eq!(config.enumeration.max_height, 5);
        assert_eq!(config.enumeration.max_args, 5);
        assert_eq!(config.parallel, 32);
        assert_eq!(config.mutator.skip_threshold, 100);
        assert_eq!(config.generator.max_elem_per_tensor, 1 << 16);
    }

    #[test]
    fn parallel_env_var_overrides_compiled_default() {
        std::env::set_var("PARALLEL", "7");
        let config = Config::load().unwrap();
        assert_eq!(config.parallel, 7);
        std::env::remove_var("PARALLEL");
    }
}
