//! Error taxonomy for package operations.

use std::path::PathBuf;
use thiserror::Error;

/// Failure kinds that abort the current operation.
///
/// Warnings (strip failures, missing files during removal) are not errors;
/// they are reported through [`crate::output`] and the operation continues.
#[derive(Error, Debug)]
pub enum Error {
    #[error("no recipe for package '{0}'")]
    RecipeNotFound(String),

    #[error("malformed recipe '{name}': {reason}")]
    RecipeMalformed { name: String, reason: String },

    #[error("dependency cycle involving: {}", .0.join(", "))]
    DependencyCycle(Vec<String>),

    #[error("fetch failed for {url}")]
    FetchFailed { url: String },

    #[error("sha256 mismatch for '{}'\n  expected: {expected}\n  got:      {actual}", .file.display())]
    HashMismatch {
        file: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("unsupported archive format: {0}")]
    UnsupportedArchive(String),

    #[error("no build strategy for '{name}': no Build script and no configure/meson.build/CMakeLists.txt in {}", .dir.display())]
    NoBuildStrategy { name: String, dir: PathBuf },

    #[error("cannot remove '{name}': required by {}", .dependents.join(", "))]
    HasReverseDependents {
        name: String,
        dependents: Vec<String>,
    },

    #[error("database is locked by another operation")]
    DatabaseLocked,

    #[error("{stage} stage failed for '{name}' (exit code {code:?}), see {}", .log.display())]
    StageFailed {
        stage: &'static str,
        name: String,
        code: Option<i32>,
        log: PathBuf,
    },

    #[error("'{name}' has not been built (run build first)")]
    NotBuilt { name: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
