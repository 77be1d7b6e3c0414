//! Installed-package database.
//!
//! On-disk layout under `db_root`:
//!
//! ```text
//! installed/<name>/VERSION       version string, one line
//! installed/<name>/files.list    sorted manifest, one path per line
//! installed/<name>/installed_at  epoch seconds
//! state/manual.list              explicitly requested packages
//! state/lock                     exclusive-operation lock
//! ```
//!
//! A package is installed iff its record directory exists and contains a
//! `VERSION` entry. Record replacement goes through a temporary sibling and
//! a rename, so a reader observes either the old record or the new one.
//!
//! Reverse dependencies are computed from the CURRENT recipes of installed
//! packages, not from a stored depends-as-installed relation; recipe edits
//! therefore change orphan and removal decisions.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::lock::{self, DbLock};
use crate::output;
use crate::recipe::{self, Recipe};
use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Handle over the database. Holds the exclusive operation lock for its
/// lifetime; constructing a second handle anywhere fails with
/// [`Error::DatabaseLocked`].
pub struct Database {
    root: PathBuf,
    _lock: DbLock,
}

impl Database {
    /// Open the database, creating the layout on first use, and acquire the
    /// operation lock.
    pub fn open(cfg: &Config) -> Result<Self> {
        let root = cfg.db_root.clone();
        std::fs::create_dir_all(root.join("installed"))?;
        std::fs::create_dir_all(root.join("state"))?;
        let lock = lock::acquire(&root.join("state").join("lock"))?;
        Ok(Database { root, _lock: lock })
    }

    fn record_dir(&self, name: &str) -> Result<PathBuf> {
        // Names become path components; never form a path from a bad one.
        if !recipe::valid_name(name) {
            return Err(Error::RecipeNotFound(name.to_string()));
        }
        Ok(self.root.join("installed").join(name))
    }

    fn manual_path(&self) -> PathBuf {
        self.root.join("state").join("manual.list")
    }

    /// Version of an installed package, or `None` when not installed.
    pub fn installed_version(&self, name: &str) -> Result<Option<String>> {
        let dir = self.record_dir(name)?;
        match std::fs::read_to_string(dir.join("VERSION")) {
            Ok(v) => Ok(Some(v.trim().to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Recorded manifest of an installed package; empty when absent.
    pub fn installed_files(&self, name: &str) -> Result<Vec<PathBuf>> {
        let dir = self.record_dir(name)?;
        match std::fs::read_to_string(dir.join("files.list")) {
            Ok(list) => Ok(list
                .lines()
                .filter(|l| !l.is_empty())
                .map(PathBuf::from)
                .collect()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Install timestamp (epoch seconds) of an installed package.
    pub fn installed_at(&self, name: &str) -> Result<Option<u64>> {
        let dir = self.record_dir(name)?;
        match std::fs::read_to_string(dir.join("installed_at")) {
            Ok(s) => Ok(s.trim().parse().ok()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Atomically replace the record for `name`: build a temporary sibling,
    /// rename any previous record aside, rename the new one into place. The
    /// old record stays observable (under its own name, then the aside name)
    /// until the new one exists; a crash leaves one of the two on disk.
    pub fn register(&self, name: &str, version: &str, files: &[PathBuf]) -> Result<()> {
        let dir = self.record_dir(name)?;
        let tmp = self
            .root
            .join("installed")
            .join(format!(".{name}.tmp.{}", std::process::id()));
        let old = self
            .root
            .join("installed")
            .join(format!(".{name}.old.{}", std::process::id()));

        // Sweep siblings left by an interrupted replacement; the operation
        // lock guarantees no other writer exists.
        for entry in std::fs::read_dir(self.root.join("installed"))? {
            let entry = entry?;
            let fname = entry.file_name().to_string_lossy().to_string();
            if fname.starts_with(&format!(".{name}.tmp."))
                || fname.starts_with(&format!(".{name}.old."))
            {
                std::fs::remove_dir_all(entry.path())?;
            }
        }
        std::fs::create_dir_all(&tmp)?;

        std::fs::write(tmp.join("VERSION"), format!("{version}\n"))?;

        let manifest: BTreeSet<&Path> = files.iter().map(PathBuf::as_path).collect();
        let mut list = std::fs::File::create(tmp.join("files.list"))?;
        for path in &manifest {
            writeln!(list, "{}", path.display())?;
        }
        list.sync_all()?;

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        std::fs::write(tmp.join("installed_at"), format!("{now}\n"))?;

        if dir.exists() {
            std::fs::rename(&dir, &old)?;
        }
        std::fs::rename(&tmp, &dir)?;
        if old.exists() {
            std::fs::remove_dir_all(&old)?;
        }
        Ok(())
    }

    /// Remove the record for `name`; idempotent.
    pub fn unregister(&self, name: &str) -> Result<()> {
        let dir = self.record_dir(name)?;
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Names of all installed packages, sorted.
    pub fn all_installed(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(self.root.join("installed"))? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') {
                continue; // leftover temp sibling
            }
            if entry.path().join("VERSION").is_file() {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    /// Reverse-dependency edges `(dep, dependent)` over the installed set,
    /// read from current recipes. An installed package whose recipe has
    /// vanished contributes no edges and warns.
    pub fn reverse_deps(&self, cfg: &Config) -> Result<Vec<(String, String)>> {
        let mut edges = Vec::new();
        for name in self.all_installed()? {
            match Recipe::load(cfg, &name) {
                Ok(r) => {
                    for dep in r.depends {
                        edges.push((dep, name.clone()));
                    }
                }
                Err(Error::RecipeNotFound(_)) => {
                    output::warning(&format!(
                        "installed package '{name}' has no recipe; its dependencies are unknown"
                    ));
                }
                Err(e) => return Err(e),
            }
        }
        Ok(edges)
    }

    /// Installed packages that currently depend on `name`.
    pub fn dependents_of(&self, cfg: &Config, name: &str) -> Result<Vec<String>> {
        Ok(self
            .reverse_deps(cfg)?
            .into_iter()
            .filter(|(dep, dependent)| dep == name && dependent != name)
            .map(|(_, dependent)| dependent)
            .collect())
    }

    /// The manually-requested set.
    pub fn manual(&self) -> Result<BTreeSet<String>> {
        match std::fs::read_to_string(self.manual_path()) {
            Ok(list) => Ok(list
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(String::from)
                .collect()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeSet::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Add `name` to the manual set; idempotent, kept sorted on disk.
    pub fn mark_manual(&self, name: &str) -> Result<()> {
        let mut set = self.manual()?;
        if !set.insert(name.to_string()) {
            return Ok(());
        }

        let path = self.manual_path();
        let tmp = path.with_extension("list.tmp");
        let mut file = std::fs::File::create(&tmp)?;
        for entry in &set {
            writeln!(file, "{entry}")?;
        }
        file.sync_all()?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Installed packages that are neither needed by an installed package
    /// nor manually requested, sorted.
    pub fn orphans(&self, cfg: &Config) -> Result<Vec<String>> {
        let needed: BTreeSet<String> = self
            .reverse_deps(cfg)?
            .into_iter()
            .map(|(dep, _)| dep)
            .collect();
        let manual = self.manual()?;
        Ok(self
            .all_installed()?
            .into_iter()
            .filter(|name| !needed.contains(name) && !manual.contains(name))
            .collect())
    }
}
