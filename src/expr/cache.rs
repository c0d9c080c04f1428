//! Disk-memoized expression-tree cache (`spec.md` §4.1: "the canonical set
//! is memoised on disk after first build"; `SPEC_FULL.md` §4.1a).

use serde::{Deserialize, Serialize};

use crate::files::{self, FileError};

use super::enumerator::{enumerate, CanonicalTree, EnumConfig};

/// A serializable tree, mirroring `autoinf_ast::Expr` but independent of
/// it so the cache's on-disk shape is stable even if the grammar crate's
/// internal representation changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedTree {
    height: u32,
    arg_mask: u64,
    text: String,
}

/// The enumerator's output, keyed by the bounds it was built under and
/// owned by whichever synthesiser constructs it (`spec.md` §9: "not a
/// module-level singleton").
#[derive(Debug, Clone)]
pub struct TreeCache {
    config: EnumConfig,
    trees: Vec<CanonicalTree>,
}

impl TreeCache {
    /// Build a fresh cache in memory, without touching disk.
    #[must_use]
    pub fn build(config: EnumConfig) -> Self {
        TreeCache {
            config,
            trees: enumerate(config),
        }
    }

    /// Load a cache from `path` if present and valid for `config`; on any
    /// failure (missing file, corrupt data, mismatched config) silently
    /// rebuild in memory rather than treat it as a hard error (mirrors the
    /// original's `try/except` around `pickle.load`).
    #[must_use]
    pub fn load_or_build(path: &std::path::Path, config: EnumConfig) -> Self {
        match Self::try_load(path, config) {
            Some(cache) => cache,
            None => Self::build(config),
        }
    }

    fn try_load(path: &std::path::Path, config: EnumConfig) -> Option<Self> {
        let stored: StoredCache = files::read_bincode(path).ok()?;
        if stored.max_height != config.max_height
            || stored.max_args != config.max_args
            || stored.enable_div != config.enable_div
        {
            return None;
        }
        let trees = stored
            .trees
            .into_iter()
            .map(|t| {
                Some(CanonicalTree {
                    height: t.height,
                    arg_mask: t.arg_mask,
                    expr: t.text.parse().ok()?,
                })
            })
            .collect::<Option<Vec<_>>>()?;
        Some(TreeCache { config, trees })
    }

    /// Persist this cache to `path` via an atomic write-then-rename.
    pub fn save(&self, path: &std::path::Path) -> Result<(), FileError> {
        let stored = StoredCache {
            max_height: self.config.max_height,
            max_args: self.config.max_args,
            enable_div: self.config.enable_div,
            trees: self
                .trees
                .iter()
                .map(|t| CachedTree {
                    height: t.height,
                    arg_mask: t.arg_mask,
                    text: t.expr.to_string(),
                })
                .collect(),
        };
        files::write_bincode_atomic(path, &stored)
    }

    /// The enumeration bounds this cache was built under.
    #[must_use]
    pub fn config(&self) -> EnumConfig {
        self.config
    }

    /// Every tree in enumeration order.
    #[must_use]
    pub fn trees(&self) -> &[CanonicalTree] {
        &self.trees
    }

    /// The `i`-th tree whose `(height, arg_mask)` matches, in enumeration
    /// order within that slot (`spec.md` §4.1, `get_tree`).
    #[must_use]
    pub fn get_tree(&self, height: u32, arg_mask: u64, i: usize) -> Option<&CanonicalTree> {
        self.trees
            .iter()
            .filter(|t| t.height == height && t.arg_mask == arg_mask)
            .nth(i)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredCache {
    max_height: u32,
    max_args: usize,
    enable_div: bool,
    trees: Vec<CachedTree>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_then_roundtrip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tree_cache.bin");
        let config = EnumConfig {
            max_height: 2,
            max_args: 2,
            enable_div: false,
        };
        let cache = TreeCache::build(config);
        cache.save(&path).unwrap();

        let loaded = TreeCache::load_or_build(&path, config);
        assert_eq!(loaded.trees().len(), cache.trees().len());
    }

    #[test]
    fn missing_file_rebuilds_in_memory() {
        let config = EnumConfig {
            max_height: 1,
            max_args: 1,
            enable_div: false,
        };
        let cache = TreeCache::load_or_build(std::path::Path::new("/nonexistent/path"), config);
        assert_eq!(cache.trees().len(), enumerate(config).len());
    }

    #[test]
    fn mismatched_config_rebuilds() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tree_cache.bin");
        let built = TreeCache::build(EnumConfig {
            max_height: 1,
            max_args: 1,
            enable_div: false,
        });
        built.save(&path).unwrap();

        let other_config = EnumConfig {
            max_height: 2,
            max_args: 1,
            enable_div: false,
        };
        let loaded = TreeCache::load_or_build(&path, other_config);
        assert_eq!(loaded.config(), other_config);
    }
}
