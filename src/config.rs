//! Process-wide configuration.
//!
//! Loaded once at startup from a TOML file and threaded by reference through
//! every operation. Every key is required; a missing key is fatal before any
//! operation runs.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Immutable configuration for all package operations.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Root of `<name>.pkg` recipe files.
    pub recipes_dir: PathBuf,
    /// Cache directory for downloaded sources.
    pub src_cache: PathBuf,
    /// Root of per-package scratch build trees.
    pub build_dir: PathBuf,
    /// Root of per-package DESTDIR staging trees.
    pub staging_dir: PathBuf,
    /// Database root (installed records, manual set, lock).
    pub db_root: PathBuf,
    /// Directory for dated per-stage log files.
    pub log_dir: PathBuf,
    /// Fetch command template; `{output}` and `{url}` placeholders, or both
    /// appended when absent. Tokenized on whitespace, run without a shell.
    pub fetch_cmd: String,
    /// Exported as MAKEFLAGS to build and install scripts.
    pub makeflags: String,
    /// Strip command template, run on ELF files in staging.
    pub strip_cmd: String,
    /// Live install root, conventionally `/`.
    pub install_prefix: PathBuf,
    /// Parallel jobs for compilation; 0 means one per CPU.
    pub jobs: usize,
    /// Enable ANSI coloring on terminal output.
    pub color: bool,
}

impl Config {
    /// Load configuration from a TOML file. Any missing key is an error.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read config file {}", path.display()))?;
        let cfg: Config = toml::from_str(&raw)
            .with_context(|| format!("invalid config file {}", path.display()))?;
        Ok(cfg)
    }

    /// Path of the recipe file for a package.
    pub fn recipe_path(&self, name: &str) -> PathBuf {
        self.recipes_dir.join(format!("{name}.pkg"))
    }

    /// Per-package scratch build directory.
    pub fn build_dir_for(&self, name: &str) -> PathBuf {
        self.build_dir.join(name)
    }

    /// Per-package staging (DESTDIR) directory.
    pub fn staging_dir_for(&self, name: &str) -> PathBuf {
        self.staging_dir.join(name)
    }

    /// Parallel jobs with `0` resolved to the CPU count.
    pub fn effective_jobs(&self) -> usize {
        if self.jobs == 0 {
            num_cpus::get()
        } else {
            self.jobs
        }
    }
}

/// Config rooted at a sandbox directory, for tests across the crate.
#[cfg(test)]
pub(crate) fn sandbox(root: &Path) -> Config {
    let cfg = Config {
        recipes_dir: root.join("recipes"),
        src_cache: root.join("cache"),
        build_dir: root.join("build"),
        staging_dir: root.join("staging"),
        db_root: root.join("db"),
        log_dir: root.join("log"),
        fetch_cmd: "cp {url} {output}".to_string(),
        makeflags: String::new(),
        strip_cmd: "true".to_string(),
        install_prefix: root.join("root"),
        jobs: 1,
        color: false,
    };
    std::fs::create_dir_all(&cfg.recipes_dir).unwrap();
    std::fs::create_dir_all(&cfg.install_prefix).unwrap();
    cfg
}
