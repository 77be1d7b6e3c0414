//! Install stage: stage under DESTDIR, strip, commit, register.
//!
//! The install script populates a per-package staging tree; ELF binaries in
//! staging are stripped (warnings only); the staging tree is then overlaid
//! onto the live root preserving permissions, symlinks, and hard links; and
//! the resulting manifest is registered atomically.
//!
//! The overlay is best-effort, not transactional: a mid-commit failure can
//! leave a partial overlay on the live root. Re-running the install
//! re-overlays. The database record itself is always atomic.

use crate::build;
use crate::config::Config;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::fetch;
use crate::logging;
use crate::output;
use crate::recipe::Recipe;
use crate::shell;
use std::collections::{BTreeSet, HashMap};
use std::io::Read;
use std::os::unix::fs::MetadataExt;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Fallback install commands when the recipe has no Install script; the
/// first that succeeds wins. Each runs with DESTDIR exported.
const INSTALL_FALLBACKS: &[&str] = &[
    "cmake --install build",
    "make -C build install",
    "make install",
];

/// Working directory of a previously built package; fails with
/// [`Error::NotBuilt`] when the scratch area is missing or empty.
pub fn built_workdir(cfg: &Config, name: &str) -> Result<PathBuf> {
    let scratch = cfg.build_dir_for(name);
    let populated = scratch.is_dir()
        && std::fs::read_dir(&scratch)
            .map(|mut entries| entries.next().is_some())
            .unwrap_or(false);
    if !populated {
        return Err(Error::NotBuilt {
            name: name.to_string(),
        });
    }
    fetch::workdir(&scratch)
}

/// Stage, strip, commit, and register a built package.
pub fn run(cfg: &Config, db: &Database, recipe: &Recipe) -> Result<()> {
    let workdir = built_workdir(cfg, &recipe.name)?;

    let staging = cfg.staging_dir_for(&recipe.name);
    if staging.exists() {
        std::fs::remove_dir_all(&staging)?;
    }
    std::fs::create_dir_all(&staging)?;

    let (log, log_path) = logging::open_stage_log(cfg, "install", &recipe.name)?;
    let mut env = build::script_env(cfg);
    env.push(("DESTDIR", staging.display().to_string()));

    match &recipe.install_script {
        Some(script) => {
            let status = shell::run_script(script, &workdir, &env, &log)?;
            if !status.success() {
                return Err(Error::StageFailed {
                    stage: "install",
                    name: recipe.name.clone(),
                    code: status.code(),
                    log: log_path,
                });
            }
        }
        None => {
            let mut installed = false;
            for candidate in INSTALL_FALLBACKS {
                if shell::run_script(candidate, &workdir, &env, &log)?.success() {
                    installed = true;
                    break;
                }
            }
            if !installed {
                return Err(Error::StageFailed {
                    stage: "install",
                    name: recipe.name.clone(),
                    code: None,
                    log: log_path,
                });
            }
        }
    }

    strip_staging(cfg, &recipe.name, &staging);

    // Best-effort overlay: report a partial commit but still register what
    // staging holds, so ownership is tracked and a re-run can finish the job.
    let committed = commit(&staging, &cfg.install_prefix);
    if let Err(e) = &committed {
        output::warning(&format!(
            "commit into {} failed partway: {e}; re-run install",
            cfg.install_prefix.display()
        ));
    }

    let files = manifest(&staging, &cfg.install_prefix)?;
    db.register(&recipe.name, &recipe.version, &files)?;
    committed
}

/// Strip pass over staging: regular files that are executable or named like
/// libraries, confirmed ELF by content probe. Failures are warnings.
fn strip_staging(cfg: &Config, name: &str, staging: &Path) {
    let base = shell::tokenize(&cfg.strip_cmd);
    if base.is_empty() {
        return;
    }
    let Ok((log, _)) = logging::open_stage_log(cfg, "strip", name) else {
        output::warning("cannot open strip log; skipping strip pass");
        return;
    };

    for entry in WalkDir::new(staging).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let Ok(meta) = entry.metadata() else {
            continue;
        };
        let executable = meta.permissions().mode() & 0o111 != 0;
        if !(executable || library_name(path)) || !is_elf(path) {
            continue;
        }

        let mut argv = base.clone();
        argv.push(path.display().to_string());
        match shell::run_argv(&argv, &log) {
            Ok(status) if status.success() => {}
            _ => output::warning(&format!("strip failed for {}", path.display())),
        }
    }
}

/// Shared (`*.so*`) or static (`*.a`) library name patterns.
fn library_name(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    name.ends_with(".a") || name.ends_with(".so") || name.contains(".so.")
}

/// Content probe for the ELF magic.
fn is_elf(path: &Path) -> bool {
    let Ok(mut file) = std::fs::File::open(path) else {
        return false;
    };
    let mut magic = [0u8; 4];
    matches!(file.read_exact(&mut magic), Ok(())) && magic == [0x7f, b'E', b'L', b'F']
}

/// Overlay the staging tree onto the live root. Permissions ride along with
/// the copies; symlinks are recreated; hard links within staging stay hard
/// links under the root. Existing files are overwritten.
fn commit(staging: &Path, root: &Path) -> Result<()> {
    let mut seen: HashMap<(u64, u64), PathBuf> = HashMap::new();

    for entry in WalkDir::new(staging) {
        let entry = entry.map_err(std::io::Error::other)?;
        let rel = entry
            .path()
            .strip_prefix(staging)
            .map_err(std::io::Error::other)?;
        if rel.as_os_str().is_empty() {
            continue;
        }
        let dest = root.join(rel);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            std::fs::create_dir_all(&dest)?;
        } else if file_type.is_symlink() {
            let target = std::fs::read_link(entry.path())?;
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let _ = std::fs::remove_file(&dest);
            std::os::unix::fs::symlink(&target, &dest)?;
        } else if file_type.is_file() {
            let meta = entry.metadata().map_err(std::io::Error::other)?;
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let _ = std::fs::remove_file(&dest);

            if meta.nlink() > 1 {
                let key = (meta.dev(), meta.ino());
                if let Some(first) = seen.get(&key) {
                    std::fs::hard_link(first, &dest)?;
                    continue;
                }
                seen.insert(key, dest.clone());
            }
            std::fs::copy(entry.path(), &dest)?;
        }
    }
    Ok(())
}

/// Manifest of a staging tree: every file or symlink, rewritten to be
/// rooted at the live install root, sorted and de-duplicated.
fn manifest(staging: &Path, root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = BTreeSet::new();
    for entry in WalkDir::new(staging) {
        let entry = entry.map_err(std::io::Error::other)?;
        let file_type = entry.file_type();
        if !file_type.is_file() && !file_type.is_symlink() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(staging)
            .map_err(std::io::Error::other)?;
        files.insert(root.join(rel));
    }
    Ok(files.into_iter().collect())
}
