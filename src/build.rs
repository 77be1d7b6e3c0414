//! Build stage.
//!
//! Runs the recipe's `Build` script, or a heuristic chosen by the project
//! descriptor found in the working directory. Either way the commands run
//! under `sh -eu` with output captured to the dated build log. The build
//! step never touches the live root.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::logging;
use crate::output;
use crate::recipe::Recipe;
use crate::shell;
use std::path::Path;

/// Environment exported to build and install scripts.
pub fn script_env(cfg: &Config) -> Vec<(&'static str, String)> {
    vec![
        ("MAKEFLAGS", cfg.makeflags.clone()),
        ("JOBS", cfg.effective_jobs().to_string()),
    ]
}

/// Heuristic build commands for a working directory without a Build script.
fn heuristic_script(workdir: &Path) -> Option<&'static str> {
    if workdir.join("configure").exists() {
        Some("./configure --prefix=/usr\nmake $MAKEFLAGS")
    } else if workdir.join("meson.build").exists() {
        Some("meson setup build --prefix=/usr\nmeson compile -C build")
    } else if workdir.join("CMakeLists.txt").exists() {
        Some(
            "cmake -B build -DCMAKE_BUILD_TYPE=Release -DCMAKE_INSTALL_PREFIX=/usr\n\
             cmake --build build -- $MAKEFLAGS",
        )
    } else {
        None
    }
}

/// Build a prepared working directory.
pub fn run(cfg: &Config, recipe: &Recipe, workdir: &Path) -> Result<()> {
    let script = match &recipe.build_script {
        Some(script) => script.as_str(),
        None => heuristic_script(workdir).ok_or_else(|| Error::NoBuildStrategy {
            name: recipe.name.clone(),
            dir: workdir.to_path_buf(),
        })?,
    };

    let (log, log_path) = logging::open_stage_log(cfg, "build", &recipe.name)?;
    let spinner = output::spinner(&format!("building {}", recipe.name));
    let status = shell::run_script(script, workdir, &script_env(cfg), &log);
    spinner.finish_and_clear();

    let status = status?;
    if !status.success() {
        return Err(Error::StageFailed {
            stage: "build",
            name: recipe.name.clone(),
            code: status.code(),
            log: log_path,
        });
    }
    Ok(())
}
