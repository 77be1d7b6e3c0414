//! Dated per-stage log files.
//!
//! Every child process writes its output to `log_dir/<YYYYMMDD>_<stage>.log`
//! (UTC date, appended across runs). Diagnostics for failed stages point at
//! the log path.

use crate::config::Config;
use crate::error::Result;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use time::OffsetDateTime;
use time::macros::format_description;

/// Path of today's log file for a stage (`fetch`, `build`, `install`, …).
pub fn stage_log_path(cfg: &Config, stage: &str) -> PathBuf {
    let fmt = format_description!("[year][month][day]");
    let date = OffsetDateTime::now_utc()
        .format(fmt)
        .unwrap_or_else(|_| "00000000".to_string());
    cfg.log_dir.join(format!("{date}_{stage}.log"))
}

/// Open today's log for a stage, creating the log directory as needed, and
/// write a header line naming the package.
pub fn open_stage_log(cfg: &Config, stage: &str, package: &str) -> Result<(File, PathBuf)> {
    std::fs::create_dir_all(&cfg.log_dir)?;
    let path = stage_log_path(cfg, stage);
    let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
    writeln!(file, "--- {stage} {package} ---")?;
    Ok((file, path))
}
