//! Composite package operations.
//!
//! Every public operation opens the database (acquiring the exclusive
//! operation lock) exactly once and threads the handle through its internal
//! steps, so composites like `rebuild` never contend with themselves.

use anyhow::{Context, Result, bail};
use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::build;
use crate::config::Config;
use crate::db::Database;
use crate::deps;
use crate::error::Error;
use crate::fetch;
use crate::install;
use crate::output;
use crate::recipe::Recipe;
use crate::version;

/// Print recipe metadata alongside installed state.
pub fn info(cfg: &Config, name: &str) -> Result<()> {
    let db = Database::open(cfg)?;
    let recipe = Recipe::load(cfg, name)?;

    println!("Name:      {}", recipe.name);
    println!("Version:   {}", recipe.version);
    for source in &recipe.sources {
        println!("Source:    {source}");
    }
    if !recipe.depends.is_empty() {
        println!("Depends:   {}", recipe.depends.join(", "));
    }
    println!(
        "Scripts:   build={} install={}",
        if recipe.build_script.is_some() { "recipe" } else { "heuristic" },
        if recipe.install_script.is_some() { "recipe" } else { "heuristic" },
    );

    match db.installed_version(name)? {
        Some(installed) => match db.installed_at(name)? {
            Some(epoch) => println!("Installed: {installed} (at {})", format_epoch(epoch)),
            None => println!("Installed: {installed}"),
        },
        None => println!("Installed: no"),
    }
    Ok(())
}

fn format_epoch(epoch: u64) -> String {
    let fmt = time::macros::format_description!("[year]-[month]-[day] [hour]:[minute]");
    time::OffsetDateTime::from_unix_timestamp(epoch as i64)
        .ok()
        .and_then(|t| t.format(fmt).ok())
        .unwrap_or_else(|| epoch.to_string())
}

/// Build a package, installing any missing dependencies first.
pub fn build(cfg: &Config, name: &str) -> Result<()> {
    let db = Database::open(cfg)?;
    build_with(cfg, &db, name)
}

fn build_with(cfg: &Config, db: &Database, name: &str) -> Result<()> {
    let plan = deps::resolve(cfg, name)?;
    let Some((target, dependencies)) = plan.split_last() else {
        return Ok(());
    };

    ensure_installed(cfg, db, dependencies)?;

    output::action(&format!("building {name}"));
    let workdir = fetch::prepare(cfg, target)?;
    build::run(cfg, target, &workdir)?;
    output::success(&format!("{name} built"));
    Ok(())
}

/// Build and install every not-yet-installed package of a dependency plan,
/// in plan order. An installed dependency of any version satisfies.
fn ensure_installed(cfg: &Config, db: &Database, plan: &[Recipe]) -> Result<()> {
    let mut missing = Vec::new();
    for recipe in plan {
        if db.installed_version(&recipe.name)?.is_none() {
            missing.push(recipe);
        } else {
            output::skip(&format!("{} already installed, skipping", recipe.name));
        }
    }

    let total = missing.len();
    for (i, recipe) in missing.into_iter().enumerate() {
        output::action_numbered(i + 1, total, &format!("installing dependency {}", recipe.name));
        let workdir = fetch::prepare(cfg, recipe)?;
        build::run(cfg, recipe, &workdir)?;
        install::run(cfg, db, recipe)?;
    }
    Ok(())
}

/// Install a previously built package. `install` from the CLI marks the
/// package as manually requested; dependency installs do not.
pub fn install(cfg: &Config, name: &str) -> Result<()> {
    let db = Database::open(cfg)?;
    install_with(cfg, &db, name, true)
}

fn install_with(cfg: &Config, db: &Database, name: &str, explicit: bool) -> Result<()> {
    let recipe = Recipe::load(cfg, name)?;
    output::action(&format!("installing {name}"));
    install::run(cfg, db, &recipe)?;
    if explicit {
        db.mark_manual(name)?;
    }
    output::success(&format!("{name} {} installed", recipe.version));
    Ok(())
}

/// Remove an installed package. Refuses while any installed package still
/// depends on it.
pub fn remove(cfg: &Config, name: &str) -> Result<()> {
    let db = Database::open(cfg)?;
    remove_with(cfg, &db, name)
}

fn remove_with(cfg: &Config, db: &Database, name: &str) -> Result<()> {
    if db.installed_version(name)?.is_none() {
        bail!("'{name}' is not installed");
    }

    let dependents = db.dependents_of(cfg, name)?;
    if !dependents.is_empty() {
        return Err(Error::HasReverseDependents {
            name: name.to_string(),
            dependents,
        }
        .into());
    }

    output::action(&format!("removing {name}"));
    let files = db.installed_files(name)?;
    let mut touched_dirs: BTreeSet<PathBuf> = BTreeSet::new();

    for file in &files {
        // Record ancestors inside the root for the prune pass
        let mut parent = file.parent();
        while let Some(dir) = parent {
            if dir == cfg.install_prefix || !dir.starts_with(&cfg.install_prefix) {
                break;
            }
            touched_dirs.insert(dir.to_path_buf());
            parent = dir.parent();
        }

        match std::fs::symlink_metadata(file) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                if let Err(e) = std::fs::remove_file(file) {
                    output::warning(&format!("cannot remove {}: {e}", file.display()));
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                output::warning(&format!("{} already missing", file.display()));
            }
            Err(e) => {
                output::warning(&format!("cannot stat {}: {e}", file.display()));
            }
        }
    }

    // Prune emptied directories bottom-up; lexicographic reverse order
    // visits children before their parents.
    for dir in touched_dirs.iter().rev() {
        match std::fs::read_dir(dir) {
            Ok(mut entries) => {
                if entries.next().is_none() {
                    if let Err(e) = std::fs::remove_dir(dir) {
                        output::warning(&format!("cannot prune {}: {e}", dir.display()));
                    }
                }
            }
            _ => {}
        }
    }

    db.unregister(name)?;
    output::success(&format!("{name} removed"));
    Ok(())
}

/// Remove (tolerating failure), rebuild, and reinstall a package. The
/// package is absent from the live root between removal and reinstall;
/// rebuild is a maintenance action and accepts that window.
pub fn rebuild(cfg: &Config, name: &str) -> Result<()> {
    let db = Database::open(cfg)?;
    rebuild_with(cfg, &db, name)
}

fn rebuild_with(cfg: &Config, db: &Database, name: &str) -> Result<()> {
    output::action(&format!("rebuilding {name}"));
    if db.installed_version(name)?.is_some()
        && let Err(e) = remove_with(cfg, db, name)
    {
        output::warning(&format!("pre-rebuild removal of '{name}' failed: {e:#}"));
    }
    build_with(cfg, db, name)?;
    install_with(cfg, db, name, false)
}

/// Rebuild every installed package, dependencies first.
pub fn rebuild_system(cfg: &Config) -> Result<()> {
    let db = Database::open(cfg)?;
    let installed = db.all_installed()?;
    if installed.is_empty() {
        output::info("nothing installed");
        return Ok(());
    }

    let order = deps::installed_order(cfg, &installed)?;
    let total = order.len();
    for (i, name) in order.iter().enumerate() {
        output::action_numbered(i + 1, total, &format!("rebuilding {name}"));
        rebuild_with(cfg, &db, name)?;
    }
    output::success(&format!("rebuilt {total} packages"));
    Ok(())
}

/// Upgrade a package when the recipe version is strictly newer; install it
/// outright when missing; report and do nothing otherwise.
pub fn upgrade(cfg: &Config, name: &str) -> Result<()> {
    let db = Database::open(cfg)?;
    let recipe = Recipe::load(cfg, name)?;

    match db.installed_version(name)? {
        None => {
            build_with(cfg, &db, name)?;
            install_with(cfg, &db, name, true)
        }
        Some(installed) if version::is_newer(&recipe.version, &installed) => {
            output::action(&format!("upgrading {name} {installed} -> {}", recipe.version));
            rebuild_with(cfg, &db, name)
        }
        Some(installed) => {
            output::skip(&format!(
                "{name} {installed} is up to date (recipe has {})",
                recipe.version
            ));
            Ok(())
        }
    }
}

/// Print orphans: installed packages that are neither required by an
/// installed package nor manually requested.
pub fn orphans(cfg: &Config) -> Result<()> {
    let db = Database::open(cfg)?;
    let orphans = db.orphans(cfg)?;
    if orphans.is_empty() {
        output::info("no orphans");
    }
    for name in orphans {
        println!("{name}");
    }
    Ok(())
}

/// Remove orphans leaves-first until none remain.
pub fn autoremove(cfg: &Config) -> Result<()> {
    let db = Database::open(cfg)?;
    let mut reaped = 0usize;

    loop {
        let orphans = db.orphans(cfg)?;
        if orphans.is_empty() {
            break;
        }
        let mut removed_this_round = 0usize;
        for name in &orphans {
            if db.dependents_of(cfg, name)?.is_empty() {
                remove_with(cfg, &db, name)?;
                removed_this_round += 1;
            }
        }
        if removed_this_round == 0 {
            break;
        }
        reaped += removed_this_round;
    }

    if reaped == 0 {
        output::info("no orphans");
    } else {
        output::success(&format!("removed {reaped} orphaned packages"));
    }
    Ok(())
}

/// List installed packages with their versions, sorted.
pub fn list_installed(cfg: &Config) -> Result<()> {
    let db = Database::open(cfg)?;
    for name in db.all_installed()? {
        let version = db.installed_version(&name)?.unwrap_or_default();
        output::list_item(&name, &version);
    }
    Ok(())
}

/// Mark an installed package as manually requested, protecting it from
/// orphan reaping.
pub fn mark_manual(cfg: &Config, name: &str) -> Result<()> {
    let db = Database::open(cfg)?;
    if db.installed_version(name)?.is_none() {
        bail!("'{name}' is not installed");
    }
    db.mark_manual(name)?;
    output::success(&format!("{name} marked as manually installed"));
    Ok(())
}

/// Synchronize the recipe tree via its version-control checkout.
pub fn sync(cfg: &Config) -> Result<()> {
    output::action("syncing recipe tree");
    let status = std::process::Command::new("git")
        .arg("-C")
        .arg(&cfg.recipes_dir)
        .args(["pull", "--ff-only"])
        .status()
        .context("failed to run git")?;
    if !status.success() {
        bail!("recipe tree sync failed");
    }
    output::success("recipe tree up to date");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config;

    fn write_recipe(cfg: &Config, name: &str, depends: &str) {
        std::fs::write(
            cfg.recipe_path(name),
            format!("Name: {name}\nVersion: 1.0\nSource: u\nDepends: {depends}\n"),
        )
        .unwrap();
    }

    /// Register a package directly, bypassing the pipeline, with files
    /// already present under the install root.
    fn plant_installed(cfg: &Config, db: &Database, name: &str, rel_files: &[&str]) {
        let mut files = Vec::new();
        for rel in rel_files {
            let path = cfg.install_prefix.join(rel);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, name).unwrap();
            files.push(path);
        }
        db.register(name, "1.0", &files).unwrap();
    }

    #[test]
    fn test_remove_blocked_by_dependent() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config::sandbox(dir.path());
        write_recipe(&cfg, "a", "");
        write_recipe(&cfg, "b", "a");
        {
            let db = Database::open(&cfg).unwrap();
            plant_installed(&cfg, &db, "a", &["usr/lib/a"]);
            plant_installed(&cfg, &db, "b", &["usr/bin/b"]);
        }

        let err = remove(&cfg, "a").unwrap_err();
        match err.downcast_ref::<Error>() {
            Some(Error::HasReverseDependents { dependents, .. }) => {
                assert_eq!(dependents, &vec!["b".to_string()]);
            }
            other => panic!("expected HasReverseDependents, got {other:?}"),
        }

        // a is untouched
        let db = Database::open(&cfg).unwrap();
        assert!(db.installed_version("a").unwrap().is_some());
        assert!(cfg.install_prefix.join("usr/lib/a").is_file());
    }

    #[test]
    fn test_remove_deletes_manifest_and_prunes_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config::sandbox(dir.path());
        write_recipe(&cfg, "a", "");
        {
            let db = Database::open(&cfg).unwrap();
            plant_installed(&cfg, &db, "a", &["usr/bin/a", "usr/share/a/data"]);
        }

        remove(&cfg, "a").unwrap();

        assert!(!cfg.install_prefix.join("usr/bin/a").exists());
        // Emptied directories are pruned, the root itself survives
        assert!(!cfg.install_prefix.join("usr").exists());
        assert!(cfg.install_prefix.exists());

        let db = Database::open(&cfg).unwrap();
        assert_eq!(db.installed_version("a").unwrap(), None);
    }

    #[test]
    fn test_remove_spares_shared_directories() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config::sandbox(dir.path());
        write_recipe(&cfg, "a", "");
        write_recipe(&cfg, "b", "");
        {
            let db = Database::open(&cfg).unwrap();
            plant_installed(&cfg, &db, "a", &["usr/bin/a"]);
            plant_installed(&cfg, &db, "b", &["usr/bin/b"]);
        }

        remove(&cfg, "a").unwrap();

        // usr/bin still hosts b, so it is not pruned
        assert!(cfg.install_prefix.join("usr/bin/b").is_file());
    }

    #[test]
    fn test_remove_with_missing_files_warns_and_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config::sandbox(dir.path());
        write_recipe(&cfg, "a", "");
        {
            let db = Database::open(&cfg).unwrap();
            db.register("a", "1.0", &[cfg.install_prefix.join("usr/bin/gone")])
                .unwrap();
        }

        remove(&cfg, "a").unwrap();
        let db = Database::open(&cfg).unwrap();
        assert_eq!(db.installed_version("a").unwrap(), None);
    }

    #[test]
    fn test_remove_with_empty_manifest_unregisters() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config::sandbox(dir.path());
        write_recipe(&cfg, "a", "");
        {
            let db = Database::open(&cfg).unwrap();
            db.register("a", "1.0", &[]).unwrap();
        }

        remove(&cfg, "a").unwrap();
        let db = Database::open(&cfg).unwrap();
        assert_eq!(db.installed_version("a").unwrap(), None);
    }

    #[test]
    fn test_remove_not_installed() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config::sandbox(dir.path());
        write_recipe(&cfg, "a", "");
        assert!(remove(&cfg, "a").is_err());
    }

    #[test]
    fn test_autoremove_reaps_chains() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config::sandbox(dir.path());
        // c -> b -> a; only c is manual
        write_recipe(&cfg, "a", "");
        write_recipe(&cfg, "b", "a");
        write_recipe(&cfg, "c", "b");
        {
            let db = Database::open(&cfg).unwrap();
            plant_installed(&cfg, &db, "a", &[]);
            plant_installed(&cfg, &db, "b", &[]);
            plant_installed(&cfg, &db, "c", &[]);
            db.mark_manual("c").unwrap();
        }

        // Nothing is orphaned while the chain is intact
        autoremove(&cfg).unwrap();
        {
            let db = Database::open(&cfg).unwrap();
            assert_eq!(db.all_installed().unwrap(), vec!["a", "b", "c"]);
        }

        // Removing c orphans b, which in turn orphans a
        remove(&cfg, "c").unwrap();
        autoremove(&cfg).unwrap();

        let db = Database::open(&cfg).unwrap();
        assert!(db.all_installed().unwrap().is_empty());
        assert!(db.orphans(&cfg).unwrap().is_empty());
    }

    #[test]
    fn test_mark_manual_requires_installed() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config::sandbox(dir.path());
        write_recipe(&cfg, "a", "");
        assert!(mark_manual(&cfg, "a").is_err());

        {
            let db = Database::open(&cfg).unwrap();
            plant_installed(&cfg, &db, "a", &[]);
        }
        mark_manual(&cfg, "a").unwrap();
    }
}
